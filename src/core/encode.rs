//! Translation of proven program trees into core terms.

use tracing::{debug, trace};

use crate::ast::{BinOpKind, Binding, Lambda, Literal, Location, Loop, ProgramNode};
use crate::termination::{Proven, ProvenTree, TerminationProof};
use crate::types::{FieldType, Type, TypeVar};

use super::ty::{instantiation, translate_type};
use super::{
    CasePattern, CoreTerm, CoreType, EncodingError, FixGuard, FixMember, Kind, MatchCase, PrimOp,
};

/// Encodes a proven tree as a closed core term (closed unless the tree has
/// free names, which only the dynamic discipline lets through).
pub fn encode(tree: &ProvenTree) -> Result<CoreTerm, EncodingError> {
    let mut encoder = Encoder::default();
    let term = encoder.encode(tree)?;
    debug!(size = term.size(), closed = term.is_closed(), "encoded core term");
    trace!(term = %term, "core term");
    Ok(term)
}

/// A term binder on the encoder's de Bruijn stack.
struct Binder {
    /// `None` for binders the encoder introduces itself.
    name: Option<String>,
    /// Quantified variables and body type of a generalized `let`.
    scheme: Option<(Vec<TypeVar>, Type)>,
}

#[derive(Default)]
struct Encoder {
    names: Vec<Binder>,
    type_scope: Vec<TypeVar>,
}

/// How the fixed point of a recursive group is guarded.
enum GroupKind {
    Fold(Vec<usize>),
    Fuel(i64),
    Measure,
}

impl Encoder {
    fn push(&mut self, name: Option<&str>) {
        self.names.push(Binder {
            name: name.map(str::to_string),
            scheme: None,
        });
    }

    fn push_params(&mut self, lambda: &Lambda<Proven>) {
        if lambda.params.is_empty() {
            self.push(None);
        }
        for param in &lambda.params {
            self.push(Some(&param.name));
        }
    }

    fn mark(&self) -> usize {
        self.names.len()
    }

    fn reset(&mut self, mark: usize) {
        self.names.truncate(mark);
    }

    fn lookup(&self, name: &str) -> Option<(usize, Option<&(Vec<TypeVar>, Type)>)> {
        self.names
            .iter()
            .rev()
            .position(|b| b.name.as_deref() == Some(name))
            .map(|index| {
                let binder = &self.names[self.names.len() - 1 - index];
                (index, binder.scheme.as_ref())
            })
    }

    fn core_type(&self, ty: &Type) -> CoreType {
        translate_type(ty, &self.type_scope)
    }

    fn encode(&mut self, node: &ProvenTree) -> Result<CoreTerm, EncodingError> {
        match node {
            ProgramNode::Literal(lit) => Ok(CoreTerm::Literal(lit.value.clone())),
            ProgramNode::Variable(var) => {
                let term = match self.lookup(&var.name) {
                    Some((index, None)) => CoreTerm::Variable(index),
                    Some((index, Some((vars, body)))) => {
                        let args = instantiation(vars, body, &var.info.ty);
                        args.iter().fold(CoreTerm::Variable(index), |term, arg| {
                            let ty = arg
                                .as_ref()
                                .map_or_else(CoreType::dynamic, |ty| self.core_type(ty));
                            CoreTerm::TypeApplication(Box::new(term), ty)
                        })
                    }
                    // Out of scope on purpose: the evaluator reports it.
                    None => CoreTerm::Variable(self.names.len()),
                };
                Ok(CoreTerm::located(&var.location, term))
            }
            ProgramNode::Lambda(lambda) => self.encode_lambda(lambda),
            ProgramNode::Apply(apply) => {
                let mut term = self.encode(&apply.func)?;
                if apply.args.is_empty() {
                    term = CoreTerm::app(term, CoreTerm::Literal(Literal::Null));
                }
                for arg in &apply.args {
                    term = CoreTerm::app(term, self.encode(arg)?);
                }
                Ok(CoreTerm::located(&apply.location, term))
            }
            ProgramNode::Let(let_node) => {
                let binding = &let_node.binding;
                let Some(proof) = &let_node.info.proof else {
                    return Err(EncodingError::missing_proof(
                        &let_node.location,
                        format!("`{}` reached the encoder without a termination proof", binding.name),
                    ));
                };
                if binding.value.mentions(&binding.name) {
                    return self.encode_group(&[binding], proof, &let_node.body, &let_node.location);
                }
                self.encode_let(binding, &let_node.body)
            }
            ProgramNode::LetRec(group) => {
                let Some(proof) = &group.info.proof else {
                    return Err(EncodingError::missing_proof(
                        &group.location,
                        "recursive group reached the encoder without a termination proof",
                    ));
                };
                let members: Vec<&Binding<Proven>> = group.bindings.iter().collect();
                let recursive = members
                    .iter()
                    .any(|b| members.iter().any(|m| b.value.mentions(&m.name)));
                if recursive {
                    return self.encode_group(&members, proof, &group.body, &group.location);
                }
                self.encode_sequential(&members, &group.body)
            }
            ProgramNode::Conditional(cond) => {
                let scrutinee = self.encode(&cond.condition)?;
                let then_branch = self.encode(&cond.then_branch)?;
                let else_branch = self.encode(&cond.else_branch)?;
                Ok(CoreTerm::located(
                    &cond.location,
                    bool_match(scrutinee, then_branch, else_branch),
                ))
            }
            ProgramNode::ObjectLiteral(obj) => {
                let names = obj.fields.iter().map(|(name, _)| name.clone()).collect();
                let values = obj
                    .fields
                    .iter()
                    .map(|(_, value)| self.encode(value))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(CoreTerm::prim(PrimOp::MakeObject(names), values))
            }
            ProgramNode::ArrayLiteral(arr) => {
                let elements = arr
                    .elements
                    .iter()
                    .map(|e| self.encode(e))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(CoreTerm::prim(PrimOp::MakeArray, elements))
            }
            ProgramNode::FieldAccess(access) => {
                let object = self.encode(&access.object)?;
                Ok(CoreTerm::located(
                    &access.location,
                    CoreTerm::prim(PrimOp::Field(access.field.clone()), vec![object]),
                ))
            }
            ProgramNode::BinaryOp(op) => {
                let left = self.encode(&op.left)?;
                let right = self.encode(&op.right)?;
                let term = match op.op {
                    BinOpKind::And => {
                        bool_match(left, right, CoreTerm::Literal(Literal::Bool(false)))
                    }
                    BinOpKind::Or => {
                        bool_match(left, CoreTerm::Literal(Literal::Bool(true)), right)
                    }
                    kind => CoreTerm::prim(PrimOp::Binary(kind), vec![left, right]),
                };
                Ok(CoreTerm::located(&op.location, term))
            }
            ProgramNode::UnaryOp(op) => {
                let operand = self.encode(&op.operand)?;
                Ok(CoreTerm::located(
                    &op.location,
                    CoreTerm::prim(PrimOp::Unary(op.op), vec![operand]),
                ))
            }
            ProgramNode::Loop(loop_node) => {
                let Some(proof) = &loop_node.info.proof else {
                    return Err(EncodingError::missing_proof(
                        &loop_node.location,
                        format!("loop over `{}` reached the encoder without a proof", loop_node.var),
                    ));
                };
                self.encode_loop(loop_node, proof)
            }
            ProgramNode::EffectRequest(effect) => {
                let target = self.encode(&effect.target)?;
                let fallback = match &effect.fallback {
                    Some(fallback) => Some(Box::new(self.encode(fallback)?)),
                    None => None,
                };
                Ok(CoreTerm::located(
                    &effect.location,
                    CoreTerm::Perform {
                        effect: effect.effect,
                        target: Box::new(target),
                        fallback,
                    },
                ))
            }
            ProgramNode::Comment(comment) => self.encode(&comment.target),
        }
    }

    fn encode_lambda(&mut self, lambda: &Lambda<Proven>) -> Result<CoreTerm, EncodingError> {
        let param_tys = self.param_types(lambda, &lambda.info.ty);
        let mark = self.mark();
        self.push_params(lambda);
        let body = self.encode(&lambda.body);
        self.reset(mark);
        Ok(curry(param_tys, body?))
    }

    /// Core types of a lambda's parameters, one per curried abstraction.
    fn param_types(&self, lambda: &Lambda<Proven>, ty: &Type) -> Vec<CoreType> {
        if lambda.params.is_empty() {
            return vec![CoreType::base("Unit")];
        }
        let inferred = match ty.monotype().strip_effects() {
            Type::Function { params, .. } => Some(params),
            _ => None,
        };
        lambda
            .params
            .iter()
            .enumerate()
            .map(|(i, param)| {
                match (inferred.and_then(|p| p.get(i)), &param.annotation) {
                    (Some(ty), _) => self.core_type(ty),
                    (None, Some(annotation)) => self.core_type(annotation),
                    (None, None) => CoreType::dynamic(),
                }
            })
            .collect()
    }

    /// `let` without recursion, generalized values become type abstractions.
    fn encode_let(
        &mut self,
        binding: &Binding<Proven>,
        body: &ProvenTree,
    ) -> Result<CoreTerm, EncodingError> {
        let (value, scheme) = self.encode_value(binding)?;
        let mark = self.mark();
        self.names.push(Binder {
            name: Some(binding.name.clone()),
            scheme,
        });
        let body = self.encode(body);
        self.reset(mark);
        Ok(CoreTerm::let_in(value, body?))
    }

    fn encode_value(
        &mut self,
        binding: &Binding<Proven>,
    ) -> Result<(CoreTerm, Option<(Vec<TypeVar>, Type)>), EncodingError> {
        let (vars, body_ty) = match &binding.value.info().ty {
            Type::Forall(vars, body) => (vars.clone(), Some((**body).clone())),
            _ => (Vec::new(), None),
        };
        let mark = self.type_scope.len();
        self.type_scope.extend(vars.iter().cloned());
        let value = self.encode(&binding.value);
        self.type_scope.truncate(mark);

        let mut value = value?;
        if let Some(Type::Object(fields)) = &binding.annotation {
            if let Some(defaults) = defaults_object(fields) {
                value = CoreTerm::prim(
                    PrimOp::Binary(BinOpKind::Merge),
                    vec![defaults, value],
                );
            }
        }
        for _ in &vars {
            value = CoreTerm::TypeAbstraction {
                kind: Kind::Star,
                body: Box::new(value),
            };
        }
        Ok((value, body_ty.map(|ty| (vars, ty))))
    }

    fn encode_sequential(
        &mut self,
        members: &[&Binding<Proven>],
        body: &ProvenTree,
    ) -> Result<CoreTerm, EncodingError> {
        let Some((first, rest)) = members.split_first() else {
            return self.encode(body);
        };
        let (value, scheme) = self.encode_value(first)?;
        let mark = self.mark();
        self.names.push(Binder {
            name: Some(first.name.clone()),
            scheme,
        });
        let inner = self.encode_sequential(rest, body);
        self.reset(mark);
        Ok(CoreTerm::let_in(value, inner?))
    }

    /// Encodes a recursive group as one fixed point over a packed input,
    /// followed by a wrapper per member and the `let` body.
    fn encode_group(
        &mut self,
        members: &[&Binding<Proven>],
        proof: &TerminationProof,
        body: &ProvenTree,
        location: &Location,
    ) -> Result<CoreTerm, EncodingError> {
        let names = || {
            members
                .iter()
                .map(|m| format!("`{}`", m.name))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let kind = match proof {
            TerminationProof::Structural { parameters, .. } => GroupKind::Fold(parameters.clone()),
            TerminationProof::Bounded { max_steps } => {
                let fuel = i64::try_from(*max_steps).map_err(|_| {
                    EncodingError::unsupported(location, format!("bound {max_steps} is too large"))
                })?;
                GroupKind::Fuel(fuel)
            }
            TerminationProof::WellFounded { .. } => GroupKind::Measure,
            TerminationProof::Total => {
                return Err(EncodingError::missing_proof(
                    location,
                    format!("recursive {} is only proven total", names()),
                ))
            }
            TerminationProof::Productive { .. } | TerminationProof::StrongNormalizationByTyping => {
                return Err(EncodingError::unsupported(
                    location,
                    format!("{} cannot be encoded with a {proof} proof", names()),
                ))
            }
        };

        let mut lambdas = Vec::with_capacity(members.len());
        for member in members {
            match member.value.strip_comments().as_lambda() {
                Some(lambda) => lambdas.push(lambda),
                None => {
                    return Err(EncodingError::unsupported(
                        &member.location,
                        format!("recursive binding `{}` is not a function", member.name),
                    ))
                }
            }
        }
        let fix_members: Vec<FixMember> = members
            .iter()
            .zip(&lambdas)
            .map(|(m, l)| FixMember {
                name: m.name.clone(),
                arity: l.arity(),
            })
            .collect();
        let member_tys: Vec<CoreType> = members
            .iter()
            .map(|m| self.core_type(m.value.info().ty.monotype()))
            .collect();
        let param_tys: Vec<Vec<CoreType>> = lambdas
            .iter()
            .zip(members)
            .map(|(l, m)| self.param_types(l, &m.value.info().ty))
            .collect();
        let input_ty = CoreType::TypeConstructor {
            name: "Call".to_string(),
            kind: Kind::Row(fix_members.iter().map(|m| m.name.clone()).collect()),
            args: member_tys.clone(),
        };
        let result_ty = common_result(&member_tys, &fix_members);
        let fix_ty = CoreType::arrow(input_ty.clone(), result_ty);

        let (decreasing, guard) = match kind {
            GroupKind::Fold(decreasing) => (Some(decreasing), None),
            GroupKind::Fuel(fuel) => (
                None,
                Some(FixGuard::Fuel(Box::new(CoreTerm::Literal(Literal::Int(fuel))))),
            ),
            GroupKind::Measure => {
                let mut measures = Vec::with_capacity(members.len());
                for (member, lambda) in members.iter().zip(&lambdas) {
                    let Some(measure) = &member.measure else {
                        return Err(EncodingError::missing_proof(
                            &member.location,
                            format!("`{}` has no decreasing measure", member.name),
                        ));
                    };
                    let mark = self.mark();
                    self.push_params(lambda);
                    let encoded = self.encode(measure);
                    self.reset(mark);
                    measures.push(encoded?);
                }
                (None, Some(FixGuard::Measure(measures)))
            }
        };

        // \self. let <wrappers> in \input. match input { ... }
        let mark = self.mark();
        self.push(None);
        let mut wrappers = Vec::with_capacity(members.len());
        for (i, member) in fix_members.iter().enumerate() {
            wrappers.push(wrapper(member, &member_tys[i], &param_tys[i], i));
            self.push(Some(&member.name));
        }
        self.push(None);
        let mut cases = Vec::with_capacity(members.len());
        for (member, lambda) in fix_members.iter().zip(&lambdas) {
            let case_mark = self.mark();
            self.push_params(lambda);
            let case_body = self.encode(&lambda.body);
            self.reset(case_mark);
            match case_body {
                Ok(body) => cases.push(MatchCase {
                    pattern: CasePattern::Constructor {
                        name: member.name.clone(),
                        arity: member.arity,
                    },
                    body,
                }),
                Err(err) => {
                    self.reset(mark);
                    return Err(err);
                }
            }
        }
        self.reset(mark);
        let dispatch = CoreTerm::lambda(
            input_ty.clone(),
            CoreTerm::Match {
                scrutinee: Box::new(CoreTerm::Variable(0)),
                cases,
            },
        );
        let fix_body = CoreTerm::lambda(
            fix_ty.clone(),
            wrappers
                .into_iter()
                .rev()
                .fold(dispatch, |inner, w| CoreTerm::let_in(w, inner)),
        );

        let fix = match (decreasing, guard) {
            (Some(decreasing), _) => CoreTerm::Fold {
                ty: fix_ty,
                members: fix_members.clone(),
                decreasing,
                body: Box::new(fix_body),
                proof: proof.clone(),
            },
            (None, Some(guard)) => CoreTerm::GuardedFix {
                ty: fix_ty,
                members: fix_members.clone(),
                guard,
                body: Box::new(fix_body),
                proof: proof.clone(),
            },
            (None, None) => {
                return Err(EncodingError::missing_proof(location, "unguarded fixed point"))
            }
        };

        // let fix = ... in let f = <wrapper> in ... body
        let mark = self.mark();
        self.push(None);
        let mut outer = Vec::with_capacity(members.len());
        for (i, member) in fix_members.iter().enumerate() {
            outer.push(wrapper(member, &member_tys[i], &param_tys[i], i));
            self.push(Some(&member.name));
        }
        let body = self.encode(body);
        self.reset(mark);
        let body = outer
            .into_iter()
            .rev()
            .fold(body?, |inner, w| CoreTerm::let_in(w, inner));
        Ok(CoreTerm::located(location, CoreTerm::let_in(fix, body)))
    }

    /// `for i in 0..count collect body` as a fuel-guarded accumulator loop:
    ///
    /// ```text
    /// let n = count in
    /// fix[fuel n] (\self. \input. match input {
    ///     loop i acc => if i >= n then acc else self (loop (i + 1) (acc ++ [let v = i in body]))
    /// }) (loop 0 [])
    /// ```
    fn encode_loop(
        &mut self,
        loop_node: &Loop<Proven>,
        proof: &TerminationProof,
    ) -> Result<CoreTerm, EncodingError> {
        let count = self.encode(&loop_node.count)?;
        let result_ty = self.core_type(&loop_node.info.ty);
        let step_ty = CoreType::arrow(
            CoreType::base("Int"),
            CoreType::arrow(result_ty.clone(), result_ty.clone()),
        );
        let member = FixMember {
            name: loop_node.var.clone(),
            arity: 2,
        };
        let input_ty = CoreType::TypeConstructor {
            name: "Call".to_string(),
            kind: Kind::Row(vec![member.name.clone()]),
            args: vec![step_ty.clone()],
        };

        // Scope inside the case: count, self, input, i, acc.
        let mark = self.mark();
        for _ in 0..5 {
            self.push(None);
        }
        self.push(Some(&loop_node.var));
        let element = self.encode(&loop_node.body);
        self.reset(mark);
        let element = CoreTerm::let_in(CoreTerm::Variable(1), element?);

        let pack = |index: CoreTerm, acc: CoreTerm| CoreTerm::Constructor {
            name: member.name.clone(),
            ty: step_ty.clone(),
            args: vec![index, acc],
        };
        let next = pack(
            CoreTerm::prim(
                PrimOp::Binary(BinOpKind::Add),
                vec![CoreTerm::Variable(1), CoreTerm::Literal(Literal::Int(1))],
            ),
            CoreTerm::prim(
                PrimOp::Binary(BinOpKind::Concat),
                vec![
                    CoreTerm::Variable(0),
                    CoreTerm::prim(PrimOp::MakeArray, vec![element]),
                ],
            ),
        );
        let step = bool_match(
            CoreTerm::prim(
                PrimOp::Binary(BinOpKind::GtEq),
                vec![CoreTerm::Variable(1), CoreTerm::Variable(4)],
            ),
            CoreTerm::Variable(0),
            CoreTerm::app(CoreTerm::Variable(3), next),
        );
        let dispatch = CoreTerm::lambda(
            input_ty.clone(),
            CoreTerm::Match {
                scrutinee: Box::new(CoreTerm::Variable(0)),
                cases: vec![MatchCase {
                    pattern: CasePattern::Constructor {
                        name: member.name.clone(),
                        arity: 2,
                    },
                    body: step,
                }],
            },
        );
        let fix_ty = CoreType::arrow(input_ty, result_ty);
        let fix = CoreTerm::GuardedFix {
            ty: fix_ty.clone(),
            members: vec![member.clone()],
            guard: FixGuard::Fuel(Box::new(CoreTerm::Variable(0))),
            body: Box::new(CoreTerm::lambda(fix_ty, dispatch)),
            proof: proof.clone(),
        };
        let start = pack(
            CoreTerm::Literal(Literal::Int(0)),
            CoreTerm::prim(PrimOp::MakeArray, Vec::new()),
        );
        Ok(CoreTerm::located(
            &loop_node.location,
            CoreTerm::let_in(count, CoreTerm::app(fix, start)),
        ))
    }
}

/// Nests abstractions, first parameter outermost.
fn curry(param_tys: Vec<CoreType>, body: CoreTerm) -> CoreTerm {
    param_tys
        .into_iter()
        .rev()
        .fold(body, |body, ty| CoreTerm::lambda(ty, body))
}

fn bool_match(scrutinee: CoreTerm, then_branch: CoreTerm, else_branch: CoreTerm) -> CoreTerm {
    CoreTerm::Match {
        scrutinee: Box::new(scrutinee),
        cases: vec![
            MatchCase {
                pattern: CasePattern::Literal(Literal::Bool(true)),
                body: then_branch,
            },
            MatchCase {
                pattern: CasePattern::Literal(Literal::Bool(false)),
                body: else_branch,
            },
        ],
    }
}

/// The curried function that packs its arguments and calls the fixed point
/// bound `fix_index` binders above the wrapper.
fn wrapper(member: &FixMember, ty: &CoreType, param_tys: &[CoreType], fix_index: usize) -> CoreTerm {
    let args = (0..member.arity)
        .rev()
        .map(CoreTerm::Variable)
        .collect::<Vec<_>>();
    let call = CoreTerm::app(
        CoreTerm::Variable(fix_index + member.arity),
        CoreTerm::Constructor {
            name: member.name.clone(),
            ty: ty.clone(),
            args,
        },
    );
    curry(param_tys.to_vec(), call)
}

/// Result type shared by all members after all their arguments, or `Dyn`.
fn common_result(member_tys: &[CoreType], members: &[FixMember]) -> CoreType {
    let mut results = member_tys
        .iter()
        .zip(members)
        .map(|(ty, m)| codomain(ty, m.arity));
    let Some(first) = results.next() else {
        return CoreType::dynamic();
    };
    if results.all(|ty| ty == first) {
        first
    } else {
        CoreType::dynamic()
    }
}

fn codomain(ty: &CoreType, arity: usize) -> CoreType {
    let mut current = ty;
    for _ in 0..arity {
        match current {
            CoreType::Arrow(_, codomain) => current = codomain,
            _ => return CoreType::dynamic(),
        }
    }
    current.clone()
}

/// The object of literal defaults an annotation supplies, if any.
fn defaults_object(fields: &indexmap::IndexMap<String, FieldType>) -> Option<CoreTerm> {
    let defaults: Vec<(String, Literal)> = fields
        .iter()
        .filter_map(|(name, field)| field.default.clone().map(|d| (name.clone(), d)))
        .collect();
    if defaults.is_empty() {
        return None;
    }
    let (names, values): (Vec<_>, Vec<_>) = defaults
        .into_iter()
        .map(|(name, value)| (name, CoreTerm::Literal(value)))
        .unzip();
    Some(CoreTerm::prim(PrimOp::MakeObject(names), values))
}
