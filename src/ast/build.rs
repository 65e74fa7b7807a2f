//! Shorthand constructors for unannotated program trees.
//!
//! Front ends and tests build `ProgramNode<()>` values through these helpers;
//! every node gets the default location unless [`at`] overrides it.

use std::sync::Arc;

use crate::types::Type;

use super::*;

pub fn null() -> ProgramNode<()> {
    literal(Literal::Null)
}

pub fn boolean(value: bool) -> ProgramNode<()> {
    literal(Literal::Bool(value))
}

pub fn int(value: i64) -> ProgramNode<()> {
    literal(Literal::Int(value))
}

pub fn float(value: f64) -> ProgramNode<()> {
    literal(Literal::Float(value))
}

pub fn text(value: &str) -> ProgramNode<()> {
    literal(Literal::Text(value.to_string()))
}

pub fn literal(value: Literal) -> ProgramNode<()> {
    ProgramNode::Literal(LiteralNode {
        value,
        location: Location::default(),
        info: (),
    })
}

pub fn var(name: &str) -> ProgramNode<()> {
    ProgramNode::Variable(Variable {
        name: name.to_string(),
        location: Location::default(),
        info: (),
    })
}

pub fn param(name: &str) -> Param {
    Param {
        name: name.to_string(),
        annotation: None,
        location: Location::default(),
    }
}

pub fn typed_param(name: &str, ty: Type) -> Param {
    Param {
        annotation: Some(ty),
        ..param(name)
    }
}

pub fn lambda(params: &[&str], body: ProgramNode<()>) -> ProgramNode<()> {
    lambda_with(params.iter().map(|p| param(p)).collect(), body)
}

pub fn lambda_with(params: Vec<Param>, body: ProgramNode<()>) -> ProgramNode<()> {
    ProgramNode::Lambda(Lambda {
        params,
        body: Arc::new(body),
        location: Location::default(),
        info: (),
    })
}

pub fn apply(func: ProgramNode<()>, args: Vec<ProgramNode<()>>) -> ProgramNode<()> {
    ProgramNode::Apply(Apply {
        func: Arc::new(func),
        args: args.into_iter().map(Arc::new).collect(),
        location: Location::default(),
        info: (),
    })
}

pub fn binding(name: &str, value: ProgramNode<()>) -> Binding<()> {
    Binding {
        name: name.to_string(),
        annotation: None,
        value: Arc::new(value),
        measure: None,
        location: Location::default(),
    }
}

impl Binding<()> {
    pub fn annotated(mut self, ty: Type) -> Self {
        self.annotation = Some(ty);
        self
    }

    pub fn measured(mut self, measure: ProgramNode<()>) -> Self {
        self.measure = Some(Arc::new(measure));
        self
    }

    pub fn located(mut self, location: Location) -> Self {
        self.location = location;
        self
    }
}

pub fn let_in(name: &str, value: ProgramNode<()>, body: ProgramNode<()>) -> ProgramNode<()> {
    let_binding(binding(name, value), None, body)
}

pub fn let_binding(
    binding: Binding<()>,
    bound: Option<ProgramNode<()>>,
    body: ProgramNode<()>,
) -> ProgramNode<()> {
    ProgramNode::Let(Let {
        binding,
        bound: bound.map(Arc::new),
        body: Arc::new(body),
        location: Location::default(),
        info: (),
    })
}

pub fn let_rec(
    bindings: Vec<Binding<()>>,
    bound: Option<ProgramNode<()>>,
    body: ProgramNode<()>,
) -> ProgramNode<()> {
    ProgramNode::LetRec(LetRec {
        bindings,
        bound: bound.map(Arc::new),
        body: Arc::new(body),
        location: Location::default(),
        info: (),
    })
}

pub fn cond(
    condition: ProgramNode<()>,
    then_branch: ProgramNode<()>,
    else_branch: ProgramNode<()>,
) -> ProgramNode<()> {
    ProgramNode::Conditional(Conditional {
        condition: Arc::new(condition),
        then_branch: Arc::new(then_branch),
        else_branch: Arc::new(else_branch),
        location: Location::default(),
        info: (),
    })
}

pub fn object(fields: Vec<(&str, ProgramNode<()>)>) -> ProgramNode<()> {
    ProgramNode::ObjectLiteral(ObjectLiteral {
        fields: fields
            .into_iter()
            .map(|(k, v)| (k.to_string(), Arc::new(v)))
            .collect(),
        location: Location::default(),
        info: (),
    })
}

pub fn array(elements: Vec<ProgramNode<()>>) -> ProgramNode<()> {
    ProgramNode::ArrayLiteral(ArrayLiteral {
        elements: elements.into_iter().map(Arc::new).collect(),
        location: Location::default(),
        info: (),
    })
}

pub fn field(object: ProgramNode<()>, name: &str) -> ProgramNode<()> {
    ProgramNode::FieldAccess(FieldAccess {
        object: Arc::new(object),
        field: name.to_string(),
        location: Location::default(),
        info: (),
    })
}

pub fn binop(op: BinOpKind, left: ProgramNode<()>, right: ProgramNode<()>) -> ProgramNode<()> {
    ProgramNode::BinaryOp(BinaryOp {
        op,
        left: Arc::new(left),
        right: Arc::new(right),
        location: Location::default(),
        info: (),
    })
}

pub fn unary(op: UnaryOpKind, operand: ProgramNode<()>) -> ProgramNode<()> {
    ProgramNode::UnaryOp(UnaryOp {
        op,
        operand: Arc::new(operand),
        location: Location::default(),
        info: (),
    })
}

pub fn for_loop(var: &str, count: ProgramNode<()>, body: ProgramNode<()>) -> ProgramNode<()> {
    ProgramNode::Loop(Loop {
        var: var.to_string(),
        count: Arc::new(count),
        body: Arc::new(body),
        location: Location::default(),
        info: (),
    })
}

pub fn effect(
    effect: EffectKind,
    target: ProgramNode<()>,
    fallback: Option<ProgramNode<()>>,
) -> ProgramNode<()> {
    ProgramNode::EffectRequest(EffectRequest {
        effect,
        target: Arc::new(target),
        fallback: fallback.map(Arc::new),
        location: Location::default(),
        info: (),
    })
}

pub fn read_env(name: &str, fallback: Option<ProgramNode<()>>) -> ProgramNode<()> {
    effect(EffectKind::ReadEnv, text(name), fallback)
}

pub fn read_file(path: &str) -> ProgramNode<()> {
    effect(EffectKind::ReadFile, text(path), None)
}

pub fn fetch(url: &str) -> ProgramNode<()> {
    effect(EffectKind::Network, text(url), None)
}

pub fn comment(text: &str, target: ProgramNode<()>) -> ProgramNode<()> {
    ProgramNode::Comment(Comment {
        text: text.to_string(),
        target: Arc::new(target),
        location: Location::default(),
        info: (),
    })
}

/// Replaces the location of the outermost node.
pub fn at(mut node: ProgramNode<()>, location: Location) -> ProgramNode<()> {
    let slot = match &mut node {
        ProgramNode::Literal(n) => &mut n.location,
        ProgramNode::Variable(n) => &mut n.location,
        ProgramNode::Lambda(n) => &mut n.location,
        ProgramNode::Apply(n) => &mut n.location,
        ProgramNode::Let(n) => &mut n.location,
        ProgramNode::LetRec(n) => &mut n.location,
        ProgramNode::Conditional(n) => &mut n.location,
        ProgramNode::ObjectLiteral(n) => &mut n.location,
        ProgramNode::ArrayLiteral(n) => &mut n.location,
        ProgramNode::FieldAccess(n) => &mut n.location,
        ProgramNode::BinaryOp(n) => &mut n.location,
        ProgramNode::UnaryOp(n) => &mut n.location,
        ProgramNode::Loop(n) => &mut n.location,
        ProgramNode::EffectRequest(n) => &mut n.location,
        ProgramNode::Comment(n) => &mut n.location,
    };
    *slot = location;
    node
}
