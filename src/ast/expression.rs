use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::types::Type;

use super::{BinOpKind, EffectKind, Literal, Location, UnaryOpKind};

/// Shared, immutable reference to a child node.
pub type NodeRef<T> = Arc<ProgramNode<T>>;

/// The canonical program tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgramNode<T> {
    Literal(LiteralNode<T>),
    Variable(Variable<T>),
    Lambda(Lambda<T>),
    Apply(Apply<T>),
    Let(Let<T>),
    LetRec(LetRec<T>),
    Conditional(Conditional<T>),
    ObjectLiteral(ObjectLiteral<T>),
    ArrayLiteral(ArrayLiteral<T>),
    FieldAccess(FieldAccess<T>),
    BinaryOp(BinaryOp<T>),
    UnaryOp(UnaryOp<T>),
    Loop(Loop<T>),
    EffectRequest(EffectRequest<T>),
    Comment(Comment<T>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiteralNode<T> {
    pub value: Literal,
    pub location: Location,
    pub info: T,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable<T> {
    pub name: String,
    pub location: Location,
    pub info: T,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    #[serde(rename = "1")]
    pub name: String,
    #[serde(rename = "2", default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<Type>,
    #[serde(rename = "3", default)]
    pub location: Location,
}

/// A function literal. An empty parameter list means the lambda takes a
/// single `null` argument.
#[derive(Debug, Clone, PartialEq)]
pub struct Lambda<T> {
    pub params: Vec<Param>,
    pub body: NodeRef<T>,
    pub location: Location,
    pub info: T,
}

/// Function application. An empty argument list passes `null`.
#[derive(Debug, Clone, PartialEq)]
pub struct Apply<T> {
    pub func: NodeRef<T>,
    pub args: Vec<NodeRef<T>>,
    pub location: Location,
    pub info: T,
}

/// A user-supplied expression over a recursive function's parameters that
/// must decrease, as a natural number, on every recursive call.
pub type Measure<T> = NodeRef<T>;

/// A named value introduced by `let` or `let rec`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: DeserializeOwned"))]
pub struct Binding<T> {
    #[serde(rename = "1")]
    pub name: String,
    #[serde(rename = "2", default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<Type>,
    #[serde(rename = "3")]
    pub value: NodeRef<T>,
    #[serde(rename = "4", default, skip_serializing_if = "Option::is_none")]
    pub measure: Option<Measure<T>>,
    #[serde(rename = "5", default)]
    pub location: Location,
}

/// `let name = value in body`. The binding may refer to itself, in which case
/// it is recursive and needs a termination proof. `bound` is the optional
/// closed upper bound on recursive unrollings.
#[derive(Debug, Clone, PartialEq)]
pub struct Let<T> {
    pub binding: Binding<T>,
    pub bound: Option<NodeRef<T>>,
    pub body: NodeRef<T>,
    pub location: Location,
    pub info: T,
}

/// A group of (possibly mutually) recursive bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct LetRec<T> {
    pub bindings: Vec<Binding<T>>,
    pub bound: Option<NodeRef<T>>,
    pub body: NodeRef<T>,
    pub location: Location,
    pub info: T,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conditional<T> {
    pub condition: NodeRef<T>,
    pub then_branch: NodeRef<T>,
    pub else_branch: NodeRef<T>,
    pub location: Location,
    pub info: T,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectLiteral<T> {
    pub fields: Vec<(String, NodeRef<T>)>,
    pub location: Location,
    pub info: T,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayLiteral<T> {
    pub elements: Vec<NodeRef<T>>,
    pub location: Location,
    pub info: T,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldAccess<T> {
    pub object: NodeRef<T>,
    pub field: String,
    pub location: Location,
    pub info: T,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryOp<T> {
    pub op: BinOpKind,
    pub left: NodeRef<T>,
    pub right: NodeRef<T>,
    pub location: Location,
    pub info: T,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnaryOp<T> {
    pub op: UnaryOpKind,
    pub operand: NodeRef<T>,
    pub location: Location,
    pub info: T,
}

/// `for var in 0..count collect body`, evaluating to an array of `count`
/// elements.
#[derive(Debug, Clone, PartialEq)]
pub struct Loop<T> {
    pub var: String,
    pub count: NodeRef<T>,
    pub body: NodeRef<T>,
    pub location: Location,
    pub info: T,
}

/// A side-effecting operation. `target` names the file, variable or URL;
/// `fallback` is used when an environment read resolves to absent.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectRequest<T> {
    pub effect: EffectKind,
    pub target: NodeRef<T>,
    pub fallback: Option<NodeRef<T>>,
    pub location: Location,
    pub info: T,
}

/// A source comment attached to a node. Evaluates to its target.
#[derive(Debug, Clone, PartialEq)]
pub struct Comment<T> {
    pub text: String,
    pub target: NodeRef<T>,
    pub location: Location,
    pub info: T,
}

impl<T> ProgramNode<T> {
    pub fn location(&self) -> &Location {
        match self {
            ProgramNode::Literal(n) => &n.location,
            ProgramNode::Variable(n) => &n.location,
            ProgramNode::Lambda(n) => &n.location,
            ProgramNode::Apply(n) => &n.location,
            ProgramNode::Let(n) => &n.location,
            ProgramNode::LetRec(n) => &n.location,
            ProgramNode::Conditional(n) => &n.location,
            ProgramNode::ObjectLiteral(n) => &n.location,
            ProgramNode::ArrayLiteral(n) => &n.location,
            ProgramNode::FieldAccess(n) => &n.location,
            ProgramNode::BinaryOp(n) => &n.location,
            ProgramNode::UnaryOp(n) => &n.location,
            ProgramNode::Loop(n) => &n.location,
            ProgramNode::EffectRequest(n) => &n.location,
            ProgramNode::Comment(n) => &n.location,
        }
    }

    pub fn info(&self) -> &T {
        match self {
            ProgramNode::Literal(n) => &n.info,
            ProgramNode::Variable(n) => &n.info,
            ProgramNode::Lambda(n) => &n.info,
            ProgramNode::Apply(n) => &n.info,
            ProgramNode::Let(n) => &n.info,
            ProgramNode::LetRec(n) => &n.info,
            ProgramNode::Conditional(n) => &n.info,
            ProgramNode::ObjectLiteral(n) => &n.info,
            ProgramNode::ArrayLiteral(n) => &n.info,
            ProgramNode::FieldAccess(n) => &n.info,
            ProgramNode::BinaryOp(n) => &n.info,
            ProgramNode::UnaryOp(n) => &n.info,
            ProgramNode::Loop(n) => &n.info,
            ProgramNode::EffectRequest(n) => &n.info,
            ProgramNode::Comment(n) => &n.info,
        }
    }

    pub fn info_mut(&mut self) -> &mut T {
        match self {
            ProgramNode::Literal(n) => &mut n.info,
            ProgramNode::Variable(n) => &mut n.info,
            ProgramNode::Lambda(n) => &mut n.info,
            ProgramNode::Apply(n) => &mut n.info,
            ProgramNode::Let(n) => &mut n.info,
            ProgramNode::LetRec(n) => &mut n.info,
            ProgramNode::Conditional(n) => &mut n.info,
            ProgramNode::ObjectLiteral(n) => &mut n.info,
            ProgramNode::ArrayLiteral(n) => &mut n.info,
            ProgramNode::FieldAccess(n) => &mut n.info,
            ProgramNode::BinaryOp(n) => &mut n.info,
            ProgramNode::UnaryOp(n) => &mut n.info,
            ProgramNode::Loop(n) => &mut n.info,
            ProgramNode::EffectRequest(n) => &mut n.info,
            ProgramNode::Comment(n) => &mut n.info,
        }
    }

    /// Looks through comments to the annotated node.
    pub fn strip_comments(&self) -> &ProgramNode<T> {
        match self {
            ProgramNode::Comment(c) => c.target.strip_comments(),
            other => other,
        }
    }

    pub fn as_lambda(&self) -> Option<&Lambda<T>> {
        match self.strip_comments() {
            ProgramNode::Lambda(lambda) => Some(lambda),
            _ => None,
        }
    }
}

impl<T> Lambda<T> {
    /// Number of arguments a saturated call supplies. Zero-parameter lambdas
    /// take the implicit `null` argument.
    pub fn arity(&self) -> usize {
        self.params.len().max(1)
    }
}
