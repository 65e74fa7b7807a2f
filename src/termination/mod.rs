//! # Termination Analysis
//!
//! Every recursive definition must come with a reason to believe it stops.
//! [`analyze`] walks a typed tree and attaches a [`TerminationProof`] to each
//! binding construct:
//!
//! - a non-recursive `let` is [`TerminationProof::Total`];
//! - a recursive `let` or `let rec` group is classified, in this order, as
//!   structural (every recursive call is on a strict sub-part of one
//!   parameter), bounded (a closed, non-negative iteration bound is given) or
//!   well-founded (every member carries a user-supplied decreasing measure);
//! - a `for` loop is bounded by its count.
//!
//! A recursive binding that fits none of these is rejected with
//! [`TerminationErrorKind::UnprovableRecursion`]. Mutually recursive members
//! are classified together: if one member fails, the group fails.
//!
//! The proofs are read by the core encoder; a recursive binding reaching the
//! encoder without one is an internal error there.

mod bound;
mod structural;

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::ast::{Binding, Location, ProgramNode};
use crate::types::{Type, TypedTree};

use self::bound::Constants;

/// Why a binding construct terminates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationProof {
    /// Every recursive call passes a strict sub-part of the parameter at
    /// `parameters[i]` for group member `i`.
    Structural {
        measure: String,
        parameters: Vec<usize>,
    },
    /// At most `max_steps` unrollings.
    Bounded { max_steps: u64 },
    /// A user measure decreases on every call.
    WellFounded { measure: String },
    /// No recursion at all.
    Total,
    /// Infinite but productive: each step yields output.
    Productive { guarantee: String },
    /// Termination follows from typing in the core calculus.
    StrongNormalizationByTyping,
}

impl fmt::Display for TerminationProof {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TerminationProof::Structural { measure, .. } => write!(f, "structural ({measure})"),
            TerminationProof::Bounded { max_steps } => write!(f, "bounded by {max_steps}"),
            TerminationProof::WellFounded { measure } => write!(f, "well-founded ({measure})"),
            TerminationProof::Total => write!(f, "total"),
            TerminationProof::Productive { guarantee } => write!(f, "productive ({guarantee})"),
            TerminationProof::StrongNormalizationByTyping => {
                write!(f, "strongly normalizing by typing")
            }
        }
    }
}

/// Annotation of a proven tree: the node's type and, on binding constructs
/// and loops, the termination proof.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proven {
    #[serde(rename = "1")]
    pub ty: Type,
    #[serde(rename = "2", default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<TerminationProof>,
}

pub type ProvenTree = ProgramNode<Proven>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminationErrorKind {
    UnprovableRecursion,
}

impl fmt::Display for TerminationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TerminationErrorKind::UnprovableRecursion => write!(f, "UnprovableRecursion"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{location}: cannot prove that `{binding}` terminates: {reason}")]
pub struct TerminationError {
    pub kind: TerminationErrorKind,
    pub binding: String,
    pub location: Location,
    pub reason: String,
}

impl TerminationError {
    fn unprovable(binding: &str, location: &Location, reason: impl Into<String>) -> Self {
        TerminationError {
            kind: TerminationErrorKind::UnprovableRecursion,
            binding: binding.to_string(),
            location: location.clone(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> TerminationErrorKind {
        self.kind
    }

    pub fn location(&self) -> &Location {
        &self.location
    }
}

/// Attaches termination proofs to `tree`, or rejects it.
pub fn analyze(tree: &TypedTree) -> Result<ProvenTree, TerminationError> {
    let mut analyzer = Analyzer::default();
    analyzer.walk(tree)?;
    debug!(proofs = analyzer.proofs.len(), "termination proofs attached");

    let proofs = analyzer.proofs;
    Ok(tree.map_info(&mut |node| Proven {
        ty: node.info().clone(),
        proof: proofs.get(&(node as *const TypedTree)).cloned(),
    }))
}

/// Proofs are keyed by node address. A subtree shared between several
/// parents is analyzed once per occurrence and all occurrences must succeed.
/// Its single recorded proof has to hold in every one of them, see
/// [`Analyzer::record`].
#[derive(Default)]
struct Analyzer {
    proofs: HashMap<*const TypedTree, TerminationProof>,
    constants: Constants,
}

impl Analyzer {
    /// A node seen again under different constants keeps the proof that
    /// covers both occurrences: the larger bound, or a well-founded measure
    /// over any bound.
    fn record(&mut self, node: &TypedTree, proof: TerminationProof) {
        let key = node as *const TypedTree;
        let proof = match (self.proofs.remove(&key), proof) {
            (
                Some(TerminationProof::Bounded { max_steps: seen }),
                TerminationProof::Bounded { max_steps },
            ) => TerminationProof::Bounded {
                max_steps: seen.max(max_steps),
            },
            (Some(seen @ TerminationProof::WellFounded { .. }), _) => seen,
            (_, proof) => proof,
        };
        trace!(location = %node.location(), %proof, "proof");
        self.proofs.insert(key, proof);
    }

    fn walk(&mut self, node: &TypedTree) -> Result<(), TerminationError> {
        match node {
            ProgramNode::Literal(_) | ProgramNode::Variable(_) => Ok(()),
            ProgramNode::Lambda(lambda) => {
                let mark = self.constants.mark();
                self.constants
                    .push_unknown(lambda.params.iter().map(|p| p.name.as_str()));
                let result = self.walk(&lambda.body);
                self.constants.reset(mark);
                result
            }
            ProgramNode::Apply(apply) => {
                self.walk(&apply.func)?;
                apply.args.iter().try_for_each(|arg| self.walk(arg))
            }
            ProgramNode::Let(let_node) => {
                let binding = &let_node.binding;
                let members = [binding];
                let proof = if binding.value.mentions(&binding.name) {
                    self.classify(&members, let_node.bound.as_deref())?
                } else {
                    TerminationProof::Total
                };
                if let Some(bound) = &let_node.bound {
                    self.walk(bound)?;
                }
                self.walk_members(&members)?;

                let value = if proof == TerminationProof::Total {
                    self.constants.eval(&binding.value)
                } else {
                    None
                };
                let mark = self.constants.mark();
                self.constants.push(&binding.name, value);
                let result = self.walk(&let_node.body);
                self.constants.reset(mark);
                result?;

                self.record(node, proof);
                Ok(())
            }
            ProgramNode::LetRec(group) => {
                let members: Vec<&Binding<Type>> = group.bindings.iter().collect();
                let recursive = members
                    .iter()
                    .any(|b| members.iter().any(|m| b.value.mentions(&m.name)));
                let proof = if recursive {
                    self.classify(&members, group.bound.as_deref())?
                } else {
                    TerminationProof::Total
                };
                if let Some(bound) = &group.bound {
                    self.walk(bound)?;
                }
                self.walk_members(&members)?;

                let mark = self.constants.mark();
                self.constants
                    .push_unknown(members.iter().map(|m| m.name.as_str()));
                let result = self.walk(&group.body);
                self.constants.reset(mark);
                result?;

                self.record(node, proof);
                Ok(())
            }
            ProgramNode::Conditional(cond) => {
                self.walk(&cond.condition)?;
                self.walk(&cond.then_branch)?;
                self.walk(&cond.else_branch)
            }
            ProgramNode::ObjectLiteral(obj) => {
                obj.fields.iter().try_for_each(|(_, value)| self.walk(value))
            }
            ProgramNode::ArrayLiteral(arr) => arr.elements.iter().try_for_each(|e| self.walk(e)),
            ProgramNode::FieldAccess(access) => self.walk(&access.object),
            ProgramNode::BinaryOp(op) => {
                self.walk(&op.left)?;
                self.walk(&op.right)
            }
            ProgramNode::UnaryOp(op) => self.walk(&op.operand),
            ProgramNode::Loop(loop_node) => {
                self.walk(&loop_node.count)?;
                let mark = self.constants.mark();
                self.constants.push(&loop_node.var, None);
                let result = self.walk(&loop_node.body);
                self.constants.reset(mark);
                result?;

                let proof = match self.constants.eval(&loop_node.count) {
                    Some(n) if n >= 0 => TerminationProof::Bounded {
                        max_steps: n as u64,
                    },
                    Some(n) => {
                        return Err(TerminationError::unprovable(
                            &loop_node.var,
                            loop_node.count.location(),
                            format!("loop count {n} is negative"),
                        ))
                    }
                    // The count is evaluated once before the first iteration,
                    // so the remaining iterations are a decreasing natural.
                    None => TerminationProof::WellFounded {
                        measure: format!("remaining iterations of `{}`", loop_node.var),
                    },
                };
                self.record(node, proof);
                Ok(())
            }
            ProgramNode::EffectRequest(effect) => {
                self.walk(&effect.target)?;
                match &effect.fallback {
                    Some(fallback) => self.walk(fallback),
                    None => Ok(()),
                }
            }
            ProgramNode::Comment(comment) => self.walk(&comment.target),
        }
    }

    /// Walks the values and measures of a group with the members in scope.
    fn walk_members(&mut self, members: &[&Binding<Type>]) -> Result<(), TerminationError> {
        let mark = self.constants.mark();
        self.constants
            .push_unknown(members.iter().map(|m| m.name.as_str()));
        let mut result = Ok(());
        for member in members {
            result = self.walk(&member.value);
            if result.is_err() {
                break;
            }
            if let Some(measure) = &member.measure {
                let inner = self.constants.mark();
                if let Some(lambda) = member.value.as_lambda() {
                    self.constants
                        .push_unknown(lambda.params.iter().map(|p| p.name.as_str()));
                }
                result = self.walk(measure);
                self.constants.reset(inner);
                if result.is_err() {
                    break;
                }
            }
        }
        self.constants.reset(mark);
        result
    }

    /// Classifies a recursive group: structural, then bounded, then
    /// well-founded.
    fn classify(
        &self,
        members: &[&Binding<Type>],
        bound: Option<&TypedTree>,
    ) -> Result<TerminationProof, TerminationError> {
        let structural = structural::find_decreasing(members);
        if let Ok(parameters) = structural {
            let measure = members
                .iter()
                .zip(&parameters)
                .map(|(member, index)| {
                    let param = member
                        .value
                        .as_lambda()
                        .and_then(|l| l.params.get(*index))
                        .map(|p| p.name.as_str())
                        .unwrap_or("?");
                    format!("`{param}` of `{}`", member.name)
                })
                .collect::<Vec<_>>()
                .join(", ");
            return Ok(TerminationProof::Structural {
                measure: format!("strict sub-part of {measure}"),
                parameters,
            });
        }

        let bound_problem = match bound.map(|b| self.constants.eval(b)) {
            Some(Some(n)) if n >= 0 => {
                return Ok(TerminationProof::Bounded {
                    max_steps: n as u64,
                })
            }
            Some(Some(n)) => Some(format!("iteration bound {n} is negative")),
            Some(None) => Some("iteration bound is not a closed integer".to_string()),
            None => None,
        };

        let names: Vec<&str> = members.iter().map(|m| m.name.as_str()).collect();
        let measures: Option<Vec<String>> = members
            .iter()
            .map(|m| {
                let measure = m.measure.as_ref()?;
                if names.iter().any(|name| measure.mentions(name)) {
                    return None;
                }
                Some(format!("{} for `{}`", measure, m.name))
            })
            .collect();
        if let Some(measures) = measures {
            return Ok(TerminationProof::WellFounded {
                measure: measures.join(", "),
            });
        }

        let culprit = members
            .iter()
            .find(|m| names.iter().any(|name| m.value.mentions(name)))
            .unwrap_or(&members[0]);
        let reason = match (bound_problem, structural) {
            (Some(problem), _) => problem,
            (None, Err(why)) => format!(
                "no parameter decreases structurally ({why}), and neither an iteration bound nor a decreasing measure is given"
            ),
            (None, Ok(_)) => "no termination argument".to_string(),
        };
        Err(TerminationError::unprovable(
            &culprit.name,
            &culprit.location,
            reason,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::ast::build::*;
    use crate::ast::{BinOpKind, Let, ObjectLiteral, UnaryOpKind};
    use crate::types::{check, TypingDiscipline};

    fn prove(tree: &ProgramNode<()>) -> Result<ProvenTree, TerminationError> {
        let typed = check(tree, TypingDiscipline::Dynamic).unwrap();
        analyze(&typed)
    }

    fn root_proof(tree: &ProvenTree) -> Option<TerminationProof> {
        tree.info().proof.clone()
    }

    fn sum_list() -> ProgramNode<()> {
        lambda(
            &["xs"],
            cond(
                unary(UnaryOpKind::IsEmpty, var("xs")),
                int(0),
                binop(
                    BinOpKind::Add,
                    unary(UnaryOpKind::Head, var("xs")),
                    apply(var("sum"), vec![unary(UnaryOpKind::Tail, var("xs"))]),
                ),
            ),
        )
    }

    #[test]
    fn test_non_recursive_let_is_total() {
        let tree = let_in("x", int(5), var("x"));
        let proven = prove(&tree).unwrap();
        assert_eq!(root_proof(&proven), Some(TerminationProof::Total));
    }

    #[test]
    fn test_structural_recursion() {
        let tree = let_in("sum", sum_list(), apply(var("sum"), vec![array(vec![int(1)])]));
        let proven = prove(&tree).unwrap();
        assert!(matches!(
            root_proof(&proven),
            Some(TerminationProof::Structural { parameters, .. }) if parameters == vec![0]
        ));
    }

    #[test]
    fn test_self_call_with_same_argument_is_rejected() {
        let tree = let_in(
            "f",
            at(
                lambda(&["x"], apply(var("f"), vec![var("x")])),
                Location::new("loop.ll", 1, 5),
            ),
            apply(var("f"), vec![int(1)]),
        );
        let err = prove(&tree).unwrap_err();
        assert_eq!(err.kind(), TerminationErrorKind::UnprovableRecursion);
        assert_eq!(err.binding, "f");
    }

    #[test]
    fn test_growing_argument_is_rejected() {
        let tree = let_in(
            "grow",
            lambda(
                &["n"],
                apply(var("grow"), vec![binop(BinOpKind::Add, var("n"), int(1))]),
            ),
            apply(var("grow"), vec![int(0)]),
        );
        assert!(prove(&tree).is_err());
    }

    #[test]
    fn test_bounded_recursion_with_constant_bound() {
        let countdown = lambda(
            &["n"],
            cond(
                binop(BinOpKind::LtEq, var("n"), int(0)),
                int(0),
                apply(var("down"), vec![binop(BinOpKind::Sub, var("n"), int(1))]),
            ),
        );
        let tree = let_in(
            "limit",
            int(10),
            let_binding(
                binding("down", countdown),
                Some(binop(BinOpKind::Add, var("limit"), int(1))),
                apply(var("down"), vec![int(5)]),
            ),
        );
        let proven = prove(&tree).unwrap();
        let ProgramNode::Let(outer) = &proven else {
            panic!("expected let");
        };
        assert_eq!(
            outer.body.info().proof,
            Some(TerminationProof::Bounded { max_steps: 11 })
        );
    }

    #[test]
    fn test_bound_depending_on_input_is_rejected() {
        let body = lambda(&["n"], apply(var("f"), vec![var("n")]));
        let tree = lambda(
            &["k"],
            let_binding(binding("f", body), Some(var("k")), apply(var("f"), vec![int(1)])),
        );
        let err = prove(&tree).unwrap_err();
        assert!(err.reason.contains("closed"));
    }

    #[test]
    fn test_well_founded_with_measure() {
        let countdown = lambda(
            &["n"],
            cond(
                binop(BinOpKind::LtEq, var("n"), int(0)),
                int(0),
                apply(var("down"), vec![binop(BinOpKind::Sub, var("n"), int(1))]),
            ),
        );
        let tree = let_binding(
            binding("down", countdown).measured(var("n")),
            None,
            apply(var("down"), vec![int(3)]),
        );
        let proven = prove(&tree).unwrap();
        assert!(matches!(
            root_proof(&proven),
            Some(TerminationProof::WellFounded { .. })
        ));
    }

    #[test]
    fn test_mutual_group_fails_if_one_member_fails() {
        let even = binding(
            "even",
            lambda(
                &["xs"],
                apply(var("odd"), vec![unary(UnaryOpKind::Tail, var("xs"))]),
            ),
        );
        let odd = binding("odd", lambda(&["xs"], apply(var("even"), vec![var("xs")])));
        let tree = let_rec(vec![even, odd], None, apply(var("even"), vec![array(vec![])]));
        let err = prove(&tree).unwrap_err();
        assert_eq!(err.kind(), TerminationErrorKind::UnprovableRecursion);
    }

    #[test]
    fn test_loop_is_bounded_by_count() {
        let tree = for_loop("i", int(3), var("i"));
        let proven = prove(&tree).unwrap();
        assert_eq!(
            root_proof(&proven),
            Some(TerminationProof::Bounded { max_steps: 3 })
        );
    }

    #[test]
    fn test_nested_recursion_inside_value_is_checked() {
        let inner = let_in(
            "g",
            lambda(&["x"], apply(var("g"), vec![var("x")])),
            var("g"),
        );
        let tree = let_in("outer", inner, int(1));
        assert!(prove(&tree).is_err());
    }

    #[test]
    fn test_shared_subtree_keeps_the_larger_bound() {
        let countdown = lambda(
            &["n"],
            cond(
                binop(BinOpKind::LtEq, var("n"), int(0)),
                int(0),
                apply(var("down"), vec![binop(BinOpKind::Sub, var("n"), int(1))]),
            ),
        );
        let recursion = let_binding(
            binding("down", countdown),
            Some(var("limit")),
            apply(var("down"), vec![int(1)]),
        );
        let typed_in = |limit: i64| {
            check(&let_in("limit", int(limit), recursion.clone()), TypingDiscipline::Dynamic)
                .unwrap()
        };
        let (ProgramNode::Let(small), ProgramNode::Let(large)) = (typed_in(2), typed_in(5)) else {
            panic!("expected two lets");
        };

        // The same recursive node under `limit = 2` and under `limit = 5`.
        let shared = large.body.clone();
        let small = Let {
            body: shared.clone(),
            ..small
        };
        let large = Let {
            body: shared,
            ..large
        };
        let tree = ProgramNode::ObjectLiteral(ObjectLiteral {
            fields: vec![
                ("small".to_string(), Arc::new(ProgramNode::Let(small))),
                ("large".to_string(), Arc::new(ProgramNode::Let(large))),
            ],
            location: Location::default(),
            info: Type::Unknown,
        });

        let proven = analyze(&tree).unwrap();
        let ProgramNode::ObjectLiteral(object) = &proven else {
            panic!("expected an object");
        };
        for (name, field) in &object.fields {
            let ProgramNode::Let(outer) = &**field else {
                panic!("expected a let in {name}");
            };
            assert_eq!(
                outer.body.info().proof,
                Some(TerminationProof::Bounded { max_steps: 5 }),
                "{name}"
            );
        }
    }

    #[test]
    fn test_proofs_survive_on_types() {
        let tree = let_in("x", int(5), binop(BinOpKind::Add, var("x"), int(1)));
        let typed = check(&tree, TypingDiscipline::Static).unwrap();
        let proven = analyze(&typed).unwrap();
        assert_eq!(proven.info().ty, Type::Int);
    }
}
