//! # Type Inference
//!
//! Constraint-based Hindley-Milner inference over program trees.
//!
//! Each node is visited once. The visit assigns the node a type (often a
//! fresh type variable) and records the [`Constraint`]s that type has to
//! satisfy; the annotated copy of the node is built on the way back up.
//! Constraints are solved at every `let` boundary, so the bound value's type
//! is as resolved as possible before it is generalized, and once more at the
//! end of the program, after which the final substitution is applied to every
//! annotation.
//!
//! ## Let-Polymorphism
//!
//! ```text
//! let id = \x -> x in {a: id(1), b: id("x")}
//! ```
//!
//! After solving, `id : ('t0) -> 't0` with `'t0` free neither in the
//! environment nor in a still-deferred constraint, so it is generalized to
//! `forall 't0. ('t0) -> 't0`. The value node of the binding carries that
//! `Forall` as its annotation; every use instantiates fresh variables.
//!
//! Variables mentioned by deferred constraints (an unresolved `Numeric`, say)
//! are not generalized: the constraint would otherwise be lost for the
//! instances.
//!
//! ## Gradual Typing
//!
//! Under [`TypingDiscipline::Gradual`] lambda parameters and recursive
//! self-references without an annotation start out as `Unknown` instead of a
//! fresh variable, and variables still unresolved at the end become
//! `Unknown`.

use std::collections::HashSet;
use std::sync::Arc;

use super::constraint::{Constraint, IDENTIFIER_PATTERN};
use super::discipline::TypingDiscipline;
use super::env::TypeEnv;
use super::error::TypeError;
use super::solve::Solver;
use super::subst::Substitution;
use super::ty::{FieldType, Purity, Type, TypeScheme, TypeVar};
use super::TypedTree;
use crate::ast::*;

pub struct Infer {
    discipline: TypingDiscipline,
    next_var: usize,
    level: usize,
    subst: Substitution,
    pending: Vec<Constraint>,
    /// Effects performed directly by each enclosing lambda body, innermost last.
    effects: Vec<Vec<EffectKind>>,
}

impl Infer {
    pub fn new(discipline: TypingDiscipline) -> Self {
        Infer {
            discipline,
            next_var: 0,
            level: 0,
            subst: Substitution::empty(),
            pending: Vec::new(),
            effects: Vec::new(),
        }
    }

    fn fresh_var(&mut self) -> TypeVar {
        let id = self.next_var;
        self.next_var += 1;
        TypeVar::at_level(id, self.level)
    }

    fn fresh(&mut self) -> Type {
        Type::Var(self.fresh_var())
    }

    /// Type of a binder without annotation.
    fn binder_type(&mut self, annotation: Option<&Type>) -> Type {
        match (annotation, self.discipline) {
            (Some(ty), _) => ty.clone(),
            (None, TypingDiscipline::Gradual) => Type::Unknown,
            (None, _) => self.fresh(),
        }
    }

    fn instantiate(&mut self, scheme: &TypeScheme) -> Type {
        if scheme.vars.is_empty() {
            return scheme.ty.clone();
        }
        let subst = Substitution(
            scheme
                .vars
                .iter()
                .map(|v| (v.clone(), Type::Var(self.fresh_var())))
                .collect(),
        );
        subst.apply(&scheme.ty)
    }

    fn generalize(&self, env: &TypeEnv, ty: &Type) -> TypeScheme {
        let ty = self.subst.apply(ty);
        let mut fixed = env.free_type_vars(&self.subst);
        for constraint in &self.pending {
            for mentioned in constraint.types() {
                fixed.extend(self.subst.apply(mentioned).free_type_vars());
            }
        }
        let mut vars: Vec<TypeVar> = ty
            .free_type_vars()
            .into_iter()
            .filter(|v| !fixed.contains(v))
            .collect();
        vars.sort_by_key(|v| v.id);
        TypeScheme { vars, ty }
    }

    fn require(&mut self, constraint: Constraint) {
        self.pending.push(constraint);
    }

    fn equal(&mut self, left: &Type, right: Type, location: &Location, context: &'static str) {
        self.require(Constraint::equal(left.clone(), right, location, context));
    }

    fn solve_pending(&mut self) -> Result<(), TypeError> {
        let pending = std::mem::take(&mut self.pending);
        self.pending = Solver::new(&mut self.subst).solve(pending, false)?;
        Ok(())
    }

    /// Infers the whole program and returns the fully annotated tree. The
    /// root's annotation is the program's type.
    pub fn infer_program<T>(&mut self, tree: &ProgramNode<T>) -> Result<TypedTree, TypeError> {
        let typed = self.infer(&TypeEnv::empty(), tree)?;
        let pending = std::mem::take(&mut self.pending);
        Solver::new(&mut self.subst).solve(pending, true)?;

        let gradual = self.discipline == TypingDiscipline::Gradual;
        let subst = &self.subst;
        Ok(typed.map_info(&mut |node| {
            let ty = subst.apply(node.info());
            if gradual {
                ty.erase_unresolved()
            } else {
                ty
            }
        }))
    }

    pub fn infer<T>(
        &mut self,
        env: &TypeEnv,
        node: &ProgramNode<T>,
    ) -> Result<ProgramNode<Type>, TypeError> {
        match node {
            ProgramNode::Literal(lit) => {
                let info = match &lit.value {
                    Literal::Null => Type::Unit,
                    Literal::Bool(_) => Type::Bool,
                    Literal::Int(_) => Type::Int,
                    Literal::Float(_) => Type::Float,
                    Literal::Text(_) => Type::Text,
                };
                Ok(ProgramNode::Literal(LiteralNode {
                    value: lit.value.clone(),
                    location: lit.location.clone(),
                    info,
                }))
            }

            ProgramNode::Variable(var) => match env.lookup(&var.name) {
                Some(scheme) => {
                    let scheme = scheme.clone();
                    Ok(ProgramNode::Variable(Variable {
                        name: var.name.clone(),
                        location: var.location.clone(),
                        info: self.instantiate(&scheme),
                    }))
                }
                None => Err(TypeError::unbound_variable(
                    var.name.clone(),
                    var.location.clone(),
                )),
            },

            ProgramNode::Lambda(lambda) => self.infer_lambda(env, lambda),

            ProgramNode::Apply(apply) => {
                let func = self.infer(env, &apply.func)?;
                let args = apply
                    .args
                    .iter()
                    .map(|a| self.infer(env, a).map(Arc::new))
                    .collect::<Result<Vec<_>, _>>()?;
                let arg_tys = if args.is_empty() {
                    vec![Type::Unit]
                } else {
                    args.iter().map(|a| a.info().clone()).collect()
                };
                let ret = self.fresh();
                self.equal(
                    func.info(),
                    Type::func(arg_tys, ret.clone()),
                    &apply.location,
                    "function application",
                );
                Ok(ProgramNode::Apply(Apply {
                    func: Arc::new(func),
                    args,
                    location: apply.location.clone(),
                    info: ret,
                }))
            }

            ProgramNode::Let(node) => self.infer_let(env, node),

            ProgramNode::LetRec(node) => self.infer_let_rec(env, node),

            ProgramNode::Conditional(cond) => {
                let condition = self.infer(env, &cond.condition)?;
                self.equal(condition.info(), Type::Bool, &cond.location, "condition");
                let then_branch = self.infer(env, &cond.then_branch)?;
                let else_branch = self.infer(env, &cond.else_branch)?;
                self.equal(
                    then_branch.info(),
                    else_branch.info().clone(),
                    &cond.location,
                    "branches of conditional",
                );
                let info = then_branch.info().clone();
                Ok(ProgramNode::Conditional(Conditional {
                    condition: Arc::new(condition),
                    then_branch: Arc::new(then_branch),
                    else_branch: Arc::new(else_branch),
                    location: cond.location.clone(),
                    info,
                }))
            }

            ProgramNode::ObjectLiteral(obj) => {
                let mut fields = Vec::with_capacity(obj.fields.len());
                let mut field_types = indexmap::IndexMap::new();
                for (name, value) in &obj.fields {
                    let value = self.infer(env, value)?;
                    field_types.insert(name.clone(), FieldType::required(value.info().clone()));
                    fields.push((name.clone(), Arc::new(value)));
                }
                Ok(ProgramNode::ObjectLiteral(ObjectLiteral {
                    fields,
                    location: obj.location.clone(),
                    info: Type::Object(field_types),
                }))
            }

            ProgramNode::ArrayLiteral(arr) => {
                let elem = self.fresh();
                let mut elements = Vec::with_capacity(arr.elements.len());
                for element in &arr.elements {
                    let element = self.infer(env, element)?;
                    self.equal(
                        element.info(),
                        elem.clone(),
                        element.location(),
                        "array element",
                    );
                    elements.push(Arc::new(element));
                }
                Ok(ProgramNode::ArrayLiteral(ArrayLiteral {
                    elements,
                    location: arr.location.clone(),
                    info: Type::array(elem),
                }))
            }

            ProgramNode::FieldAccess(access) => {
                let object = self.infer(env, &access.object)?;
                let field_ty = self.fresh();
                self.require(Constraint::HasField {
                    object: object.info().clone(),
                    field: access.field.clone(),
                    field_ty: field_ty.clone(),
                    location: access.location.clone(),
                });
                Ok(ProgramNode::FieldAccess(FieldAccess {
                    object: Arc::new(object),
                    field: access.field.clone(),
                    location: access.location.clone(),
                    info: field_ty,
                }))
            }

            ProgramNode::BinaryOp(op) => {
                let left = self.infer(env, &op.left)?;
                let right = self.infer(env, &op.right)?;
                let info = self.binary_op_type(op.op, left.info(), right.info(), &op.location);
                Ok(ProgramNode::BinaryOp(BinaryOp {
                    op: op.op,
                    left: Arc::new(left),
                    right: Arc::new(right),
                    location: op.location.clone(),
                    info,
                }))
            }

            ProgramNode::UnaryOp(op) => {
                let operand = self.infer(env, &op.operand)?;
                let info = self.unary_op_type(op.op, operand.info(), &op.location);
                Ok(ProgramNode::UnaryOp(UnaryOp {
                    op: op.op,
                    operand: Arc::new(operand),
                    location: op.location.clone(),
                    info,
                }))
            }

            ProgramNode::Loop(node) => {
                let count = self.infer(env, &node.count)?;
                self.require(Constraint::Range {
                    ty: count.info().clone(),
                    min: Some(0),
                    max: None,
                    value: literal_int(&node.count),
                    location: node.count.location().clone(),
                });
                let body_env = env.extend(node.var.clone(), TypeScheme::monomorphic(Type::Int));
                let body = self.infer(&body_env, &node.body)?;
                let info = Type::array(body.info().clone());
                Ok(ProgramNode::Loop(Loop {
                    var: node.var.clone(),
                    count: Arc::new(count),
                    body: Arc::new(body),
                    location: node.location.clone(),
                    info,
                }))
            }

            ProgramNode::EffectRequest(effect) => {
                let target = self.infer(env, &effect.target)?;
                if effect.effect == EffectKind::ReadEnv {
                    self.require(Constraint::Pattern {
                        ty: target.info().clone(),
                        pattern: IDENTIFIER_PATTERN.to_string(),
                        value: literal_text(&effect.target),
                        location: effect.target.location().clone(),
                    });
                } else {
                    self.equal(target.info(), Type::Text, &effect.location, "effect target");
                }
                let fallback = match &effect.fallback {
                    Some(fallback) => {
                        let fallback = self.infer(env, fallback)?;
                        self.equal(
                            fallback.info(),
                            Type::Text,
                            &effect.location,
                            "effect fallback",
                        );
                        Some(Arc::new(fallback))
                    }
                    None => None,
                };
                // An environment read without a fallback is `null` when the
                // variable is absent, which only the gradual discipline admits.
                let result = match (effect.effect, &fallback, self.discipline) {
                    (EffectKind::ReadEnv, None, TypingDiscipline::Gradual) => Type::Unknown,
                    (EffectKind::ReadEnv, None, _) => {
                        return Err(TypeError::UnificationFailure {
                            expected: Type::Text,
                            found: Type::Unit,
                            location: effect.location.clone(),
                            context: Some(
                                "an environment read without a fallback may be absent".to_string(),
                            ),
                        })
                    }
                    _ => Type::Text,
                };
                if let Some(frame) = self.effects.last_mut() {
                    frame.push(effect.effect);
                }
                Ok(ProgramNode::EffectRequest(EffectRequest {
                    effect: effect.effect,
                    target: Arc::new(target),
                    fallback,
                    location: effect.location.clone(),
                    info: Type::Effect(effect.effect, Box::new(result)),
                }))
            }

            ProgramNode::Comment(comment) => {
                let target = self.infer(env, &comment.target)?;
                let info = target.info().clone();
                Ok(ProgramNode::Comment(Comment {
                    text: comment.text.clone(),
                    target: Arc::new(target),
                    location: comment.location.clone(),
                    info,
                }))
            }
        }
    }

    fn infer_lambda<T>(
        &mut self,
        env: &TypeEnv,
        lambda: &Lambda<T>,
    ) -> Result<ProgramNode<Type>, TypeError> {
        let mut param_tys = Vec::with_capacity(lambda.params.len());
        let mut bindings = Vec::with_capacity(lambda.params.len());
        for param in &lambda.params {
            let ty = self.binder_type(param.annotation.as_ref());
            bindings.push((param.name.clone(), TypeScheme::monomorphic(ty.clone())));
            param_tys.push(ty);
        }
        if param_tys.is_empty() {
            param_tys.push(Type::Unit);
        }
        let body_env = env.extend_many(bindings);

        self.effects.push(Vec::new());
        let body = self.infer(&body_env, &lambda.body);
        let effects = self.effects.pop().unwrap_or_default();
        let body = body?;

        let info = Type::Function {
            params: param_tys,
            ret: Box::new(body.info().clone()),
            purity: Purity::from_effects(effects),
        };
        Ok(ProgramNode::Lambda(Lambda {
            params: lambda.params.clone(),
            body: Arc::new(body),
            location: lambda.location.clone(),
            info,
        }))
    }

    fn infer_let<T>(&mut self, env: &TypeEnv, node: &Let<T>) -> Result<ProgramNode<Type>, TypeError> {
        let binding = &node.binding;
        let recursive = binding.value.mentions(&binding.name);

        self.level += 1;
        let value_env = if recursive {
            let self_ty = self.binder_type(binding.annotation.as_ref());
            env.extend(binding.name.clone(), TypeScheme::monomorphic(self_ty))
        } else {
            env.clone()
        };
        let typed = self.infer_binding(&value_env, binding);
        self.level -= 1;
        let (value, binding_ty, measure) = typed?;
        if recursive {
            if let Some(scheme) = value_env.lookup(&binding.name) {
                let self_ty = scheme.ty.clone();
                self.equal(&self_ty, binding_ty.clone(), &binding.location, "recursive binding");
            }
        }

        let bound = self.infer_bound(env, node.bound.as_deref())?;
        self.solve_pending()?;

        let scheme = self.generalize(env, &binding_ty);
        let value = quantify(value, &scheme);
        let body_env = env.extend(binding.name.clone(), scheme);
        let body = self.infer(&body_env, &node.body)?;
        let info = body.info().clone();

        Ok(ProgramNode::Let(Let {
            binding: Binding {
                name: binding.name.clone(),
                annotation: binding.annotation.clone(),
                value: Arc::new(value),
                measure,
                location: binding.location.clone(),
            },
            bound,
            body: Arc::new(body),
            location: node.location.clone(),
            info,
        }))
    }

    fn infer_let_rec<T>(
        &mut self,
        env: &TypeEnv,
        node: &LetRec<T>,
    ) -> Result<ProgramNode<Type>, TypeError> {
        self.level += 1;
        let self_tys: Vec<Type> = node
            .bindings
            .iter()
            .map(|b| self.binder_type(b.annotation.as_ref()))
            .collect();
        let value_env = env.extend_many(
            node.bindings
                .iter()
                .zip(&self_tys)
                .map(|(b, ty)| (b.name.clone(), TypeScheme::monomorphic(ty.clone())))
                .collect(),
        );
        let typed = node
            .bindings
            .iter()
            .map(|b| self.infer_binding(&value_env, b))
            .collect::<Result<Vec<_>, _>>();
        self.level -= 1;
        let typed = typed?;

        for ((binding, self_ty), (_, binding_ty, _)) in node.bindings.iter().zip(&self_tys).zip(&typed) {
            self.equal(self_ty, binding_ty.clone(), &binding.location, "recursive binding");
        }

        let bound = self.infer_bound(env, node.bound.as_deref())?;
        self.solve_pending()?;

        let mut bindings = Vec::with_capacity(typed.len());
        let mut schemes = Vec::with_capacity(typed.len());
        for (binding, (value, binding_ty, measure)) in node.bindings.iter().zip(typed) {
            let scheme = self.generalize(env, &binding_ty);
            let value = quantify(value, &scheme);
            schemes.push((binding.name.clone(), scheme));
            bindings.push(Binding {
                name: binding.name.clone(),
                annotation: binding.annotation.clone(),
                value: Arc::new(value),
                measure,
                location: binding.location.clone(),
            });
        }

        let body_env = env.extend_many(schemes);
        let body = self.infer(&body_env, &node.body)?;
        let info = body.info().clone();

        Ok(ProgramNode::LetRec(LetRec {
            bindings,
            bound,
            body: Arc::new(body),
            location: node.location.clone(),
            info,
        }))
    }

    /// Infers a bound value, its declared type and its measure.
    #[allow(clippy::type_complexity)]
    fn infer_binding<T>(
        &mut self,
        env: &TypeEnv,
        binding: &Binding<T>,
    ) -> Result<(ProgramNode<Type>, Type, Option<NodeRef<Type>>), TypeError> {
        let value = self.infer(env, &binding.value)?;
        let binding_ty = match &binding.annotation {
            Some(annotation) => {
                self.require(Constraint::Subtype {
                    sub: value.info().clone(),
                    sup: annotation.clone(),
                    location: binding.location.clone(),
                });
                annotation.clone()
            }
            None => value.info().clone(),
        };

        let measure = match &binding.measure {
            Some(measure) => {
                let params = measure_scope(binding, &value);
                let measure_env = env.extend_many(params);
                let measure = self.infer(&measure_env, measure)?;
                self.equal(
                    measure.info(),
                    Type::Int,
                    measure.location(),
                    "decreasing measure",
                );
                Some(Arc::new(measure))
            }
            None => None,
        };

        Ok((value, binding_ty, measure))
    }

    fn infer_bound<T>(
        &mut self,
        env: &TypeEnv,
        bound: Option<&ProgramNode<T>>,
    ) -> Result<Option<NodeRef<Type>>, TypeError> {
        let Some(bound) = bound else {
            return Ok(None);
        };
        let typed = self.infer(env, bound)?;
        self.require(Constraint::Range {
            ty: typed.info().clone(),
            min: Some(0),
            max: None,
            value: literal_int(bound),
            location: bound.location().clone(),
        });
        Ok(Some(Arc::new(typed)))
    }

    fn binary_op_type(&mut self, op: BinOpKind, left: &Type, right: &Type, location: &Location) -> Type {
        let operands = match op {
            BinOpKind::Add => "operands of `+`",
            BinOpKind::Sub => "operands of `-`",
            BinOpKind::Mul => "operands of `*`",
            BinOpKind::Div => "operands of `/`",
            BinOpKind::Mod => "operands of `%`",
            BinOpKind::Eq | BinOpKind::NotEq => "operands of equality",
            BinOpKind::Lt | BinOpKind::Gt | BinOpKind::LtEq | BinOpKind::GtEq => {
                "operands of comparison"
            }
            BinOpKind::And | BinOpKind::Or => "operands of logical operator",
            BinOpKind::Concat => "operands of `++`",
            BinOpKind::Merge => "operands of `//`",
        };
        match op {
            BinOpKind::Add | BinOpKind::Sub | BinOpKind::Mul | BinOpKind::Div | BinOpKind::Mod => {
                self.equal(left, right.clone(), location, operands);
                self.require(Constraint::custom("Numeric", vec![left.clone()], location));
                left.clone()
            }
            BinOpKind::Eq | BinOpKind::NotEq => {
                self.equal(left, right.clone(), location, operands);
                Type::Bool
            }
            BinOpKind::Lt | BinOpKind::Gt | BinOpKind::LtEq | BinOpKind::GtEq => {
                self.equal(left, right.clone(), location, operands);
                self.require(Constraint::custom("Ordered", vec![left.clone()], location));
                Type::Bool
            }
            BinOpKind::And | BinOpKind::Or => {
                self.equal(left, Type::Bool, location, operands);
                self.equal(right, Type::Bool, location, operands);
                Type::Bool
            }
            BinOpKind::Concat => {
                self.equal(left, right.clone(), location, operands);
                self.require(Constraint::custom("Concatenable", vec![left.clone()], location));
                left.clone()
            }
            BinOpKind::Merge => {
                let result = self.fresh();
                self.require(Constraint::custom(
                    "Merge",
                    vec![left.clone(), right.clone(), result.clone()],
                    location,
                ));
                result
            }
        }
    }

    fn unary_op_type(&mut self, op: UnaryOpKind, operand: &Type, location: &Location) -> Type {
        match op {
            UnaryOpKind::Not => {
                self.equal(operand, Type::Bool, location, "operand of `not`");
                Type::Bool
            }
            UnaryOpKind::Negate => {
                self.require(Constraint::custom("Numeric", vec![operand.clone()], location));
                operand.clone()
            }
            UnaryOpKind::Length => {
                self.require(Constraint::custom("Concatenable", vec![operand.clone()], location));
                Type::Int
            }
            UnaryOpKind::IsEmpty => {
                self.require(Constraint::custom("Concatenable", vec![operand.clone()], location));
                Type::Bool
            }
            UnaryOpKind::Head => {
                let elem = self.fresh();
                self.equal(operand, Type::array(elem.clone()), location, "operand of `head`");
                elem
            }
            UnaryOpKind::Tail => {
                let elem = self.fresh();
                self.equal(operand, Type::array(elem.clone()), location, "operand of `tail`");
                Type::array(elem)
            }
            UnaryOpKind::ToText => Type::Text,
        }
    }
}

/// Parameters a measure may mention, typed from the inferred lambda.
fn measure_scope<T>(binding: &Binding<T>, value: &ProgramNode<Type>) -> Vec<(String, TypeScheme)> {
    let Some(lambda) = binding.value.as_lambda() else {
        return Vec::new();
    };
    let param_tys: Vec<Type> = match value.strip_comments().info() {
        Type::Function { params, .. } => params.clone(),
        _ => Vec::new(),
    };
    lambda
        .params
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let ty = param_tys.get(i).cloned().unwrap_or(Type::Unknown);
            (p.name.clone(), TypeScheme::monomorphic(ty))
        })
        .collect()
}

/// Marks a generalized value with its `Forall`.
fn quantify(mut value: ProgramNode<Type>, scheme: &TypeScheme) -> ProgramNode<Type> {
    if !scheme.vars.is_empty() {
        *value.info_mut() = scheme.to_type();
    }
    value
}

fn literal_int<T>(node: &ProgramNode<T>) -> Option<i64> {
    match node.strip_comments() {
        ProgramNode::Literal(LiteralNode {
            value: Literal::Int(i),
            ..
        }) => Some(*i),
        _ => None,
    }
}

fn literal_text<T>(node: &ProgramNode<T>) -> Option<String> {
    match node.strip_comments() {
        ProgramNode::Literal(LiteralNode {
            value: Literal::Text(s),
            ..
        }) => Some(s.clone()),
        _ => None,
    }
}

/// Type variables occurring anywhere in a typed tree's annotations.
pub fn annotation_vars(tree: &ProgramNode<Type>) -> HashSet<TypeVar> {
    let mut vars = HashSet::new();
    tree.map_info(&mut |node| vars.extend(node.info().free_type_vars()));
    vars
}
