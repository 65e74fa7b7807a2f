//! # Core Calculus
//!
//! The target of the encoder: a strongly normalizing polymorphic calculus in
//! the F-omega family. Programs that reach this representation have been type
//! checked and carry a termination proof for every recursive binding.
//!
//! ## Pipeline Position
//!
//! ```text
//! ProvenTree → [Encoder] → CoreTerm → Evaluator → Value
//! ```
//!
//! ## Names
//!
//! Term and type variables are de Bruijn indices: `Variable(0)` is the
//! innermost binder, `Variable(1)` the one around it and so on. Binders are
//! `Abstraction`, `Let` (its body sees the value), `TypeAbstraction` (for type
//! variables only) and match cases (one index per constructor argument,
//! the last argument innermost). Alpha-equivalent terms are therefore
//! structurally equal, and the encoder may duplicate or move subterms without
//! any risk of capture.
//!
//! ## Recursion
//!
//! There is no raw self-reference. A recursive group of bindings becomes a
//! single unary fixed point over a *packed* input: a call `f(a, b)` becomes
//! `fix (Constructor("f", [a, b]))`. The fixed point's body has the shape
//!
//! ```text
//! \self. let f = \a. \b. self (f a b) in ... \input. match input { f a b => ..., g x => ... }
//! ```
//!
//! and is wrapped in either
//!
//! - [`CoreTerm::Fold`] for structural recursion: each recursive call must
//!   pass a strictly smaller value in the decreasing position, or
//! - [`CoreTerm::GuardedFix`] with a [`FixGuard`]: a fuel counter for bounded
//!   recursion and loops, or one natural-number measure per member for
//!   well-founded recursion.
//!
//! Both carry the [`TerminationProof`] they were built from. The evaluator
//! checks the guard on every unrolling, independently of the proof.

mod encode;
mod ty;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ast::{BinOpKind, EffectKind, Literal, Location, UnaryOpKind};
use crate::termination::TerminationProof;

pub use encode::encode;
pub use ty::translate_type;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kind {
    /// The kind of types that classify terms.
    Star,
    Arrow(Box<Kind>, Box<Kind>),
    /// The kind of a record row with the given field names.
    Row(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreType {
    TypeVariable(usize),
    Arrow(Box<CoreType>, Box<CoreType>),
    Forall(Kind, Box<CoreType>),
    /// `Array`, `Object` and the packed input of a recursive group.
    TypeConstructor {
        name: String,
        kind: Kind,
        args: Vec<CoreType>,
    },
    /// `Unit`, `Bool`, `Int`, `Float`, `Text`, or `Dyn` for anything the
    /// checker left open.
    BaseType(String),
    /// Recursive type; index 0 in the body refers to the whole type.
    Mu(Box<CoreType>),
    EffectType(Vec<EffectKind>, Box<CoreType>),
}

impl CoreType {
    pub fn base(name: &str) -> Self {
        CoreType::BaseType(name.to_string())
    }

    pub fn dynamic() -> Self {
        CoreType::base("Dyn")
    }

    pub fn arrow(domain: CoreType, codomain: CoreType) -> Self {
        CoreType::Arrow(Box::new(domain), Box::new(codomain))
    }
}

/// One member of a recursive group: its name and the number of arguments
/// packed into its constructor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixMember {
    #[serde(rename = "1")]
    pub name: String,
    #[serde(rename = "2")]
    pub arity: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FixGuard {
    /// Evaluates to the number of unrollings allowed.
    Fuel(Box<CoreTerm>),
    /// One measure per member, with that member's arguments in scope.
    Measure(Vec<CoreTerm>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CasePattern {
    /// Binds `arity` indices.
    Constructor { name: String, arity: usize },
    Literal(Literal),
    Wildcard,
}

impl CasePattern {
    pub fn binds(&self) -> usize {
        match self {
            CasePattern::Constructor { arity, .. } => *arity,
            CasePattern::Literal(_) | CasePattern::Wildcard => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCase {
    #[serde(rename = "1")]
    pub pattern: CasePattern,
    #[serde(rename = "2")]
    pub body: CoreTerm,
}

/// Saturated primitive operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimOp {
    Binary(BinOpKind),
    Unary(UnaryOpKind),
    MakeArray,
    /// Builds an object from its arguments, one per field name.
    MakeObject(Vec<String>),
    Field(String),
}

impl PrimOp {
    pub fn arity(&self) -> Option<usize> {
        match self {
            PrimOp::Binary(_) => Some(2),
            PrimOp::Unary(_) | PrimOp::Field(_) => Some(1),
            PrimOp::MakeObject(fields) => Some(fields.len()),
            PrimOp::MakeArray => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CoreTerm {
    Variable(usize),
    Abstraction {
        param_ty: CoreType,
        body: Box<CoreTerm>,
    },
    Application(Box<CoreTerm>, Box<CoreTerm>),
    TypeAbstraction {
        kind: Kind,
        body: Box<CoreTerm>,
    },
    TypeApplication(Box<CoreTerm>, CoreType),
    Let(Box<CoreTerm>, Box<CoreTerm>),
    GuardedFix {
        ty: CoreType,
        members: Vec<FixMember>,
        guard: FixGuard,
        body: Box<CoreTerm>,
        proof: TerminationProof,
    },
    Fold {
        ty: CoreType,
        members: Vec<FixMember>,
        /// Decreasing argument position per member.
        decreasing: Vec<usize>,
        body: Box<CoreTerm>,
        proof: TerminationProof,
    },
    Constructor {
        name: String,
        ty: CoreType,
        args: Vec<CoreTerm>,
    },
    Match {
        scrutinee: Box<CoreTerm>,
        cases: Vec<MatchCase>,
    },
    Literal(Literal),
    Primitive {
        op: PrimOp,
        args: Vec<CoreTerm>,
    },
    Perform {
        effect: EffectKind,
        target: Box<CoreTerm>,
        fallback: Option<Box<CoreTerm>>,
    },
    /// Source location of the enclosed term; transparent to reduction.
    Located(Location, Box<CoreTerm>),
}

impl CoreTerm {
    pub fn lambda(param_ty: CoreType, body: CoreTerm) -> Self {
        CoreTerm::Abstraction {
            param_ty,
            body: Box::new(body),
        }
    }

    pub fn app(func: CoreTerm, arg: CoreTerm) -> Self {
        CoreTerm::Application(Box::new(func), Box::new(arg))
    }

    pub fn let_in(value: CoreTerm, body: CoreTerm) -> Self {
        CoreTerm::Let(Box::new(value), Box::new(body))
    }

    pub fn prim(op: PrimOp, args: Vec<CoreTerm>) -> Self {
        CoreTerm::Primitive { op, args }
    }

    pub fn located(location: &Location, term: CoreTerm) -> Self {
        CoreTerm::Located(location.clone(), Box::new(term))
    }

    /// Number of term nodes, ignoring location wrappers.
    pub fn size(&self) -> usize {
        match self {
            CoreTerm::Variable(_) | CoreTerm::Literal(_) => 1,
            CoreTerm::Abstraction { body, .. } | CoreTerm::TypeAbstraction { body, .. } => {
                1 + body.size()
            }
            CoreTerm::Application(func, arg) => 1 + func.size() + arg.size(),
            CoreTerm::TypeApplication(term, _) => 1 + term.size(),
            CoreTerm::Let(value, body) => 1 + value.size() + body.size(),
            CoreTerm::GuardedFix { guard, body, .. } => {
                let guard_size = match guard {
                    FixGuard::Fuel(fuel) => fuel.size(),
                    FixGuard::Measure(measures) => measures.iter().map(CoreTerm::size).sum(),
                };
                1 + guard_size + body.size()
            }
            CoreTerm::Fold { body, .. } => 1 + body.size(),
            CoreTerm::Constructor { args, .. } | CoreTerm::Primitive { args, .. } => {
                1 + args.iter().map(CoreTerm::size).sum::<usize>()
            }
            CoreTerm::Match { scrutinee, cases } => {
                1 + scrutinee.size() + cases.iter().map(|c| c.body.size()).sum::<usize>()
            }
            CoreTerm::Perform {
                target, fallback, ..
            } => 1 + target.size() + fallback.as_ref().map_or(0, |f| f.size()),
            CoreTerm::Located(_, term) => term.size(),
        }
    }

    /// Whether any variable escapes the term, i.e. refers past its binders.
    pub fn is_closed(&self) -> bool {
        self.max_free_index(0).is_none()
    }

    fn max_free_index(&self, depth: usize) -> Option<usize> {
        let under = |term: &CoreTerm, binders: usize| term.max_free_index(depth + binders);
        match self {
            CoreTerm::Variable(index) => (*index >= depth).then(|| index - depth),
            CoreTerm::Literal(_) => None,
            CoreTerm::Abstraction { body, .. } => under(body, 1),
            CoreTerm::TypeAbstraction { body, .. } => under(body, 0),
            CoreTerm::TypeApplication(term, _) | CoreTerm::Located(_, term) => under(term, 0),
            CoreTerm::Application(func, arg) => under(func, 0).max(under(arg, 0)),
            CoreTerm::Let(value, body) => under(value, 0).max(under(body, 1)),
            CoreTerm::GuardedFix {
                guard,
                body,
                members,
                ..
            } => {
                let guard_free = match guard {
                    FixGuard::Fuel(fuel) => under(fuel, 0),
                    FixGuard::Measure(measures) => measures
                        .iter()
                        .zip(members)
                        .filter_map(|(m, member)| under(m, member.arity))
                        .max(),
                };
                guard_free.max(under(body, 0))
            }
            CoreTerm::Fold { body, .. } => under(body, 0),
            CoreTerm::Constructor { args, .. } | CoreTerm::Primitive { args, .. } => {
                args.iter().filter_map(|a| under(a, 0)).max()
            }
            CoreTerm::Match { scrutinee, cases } => cases
                .iter()
                .filter_map(|c| under(&c.body, c.pattern.binds()))
                .chain(under(scrutinee, 0))
                .max(),
            CoreTerm::Perform {
                target, fallback, ..
            } => under(target, 0).max(fallback.as_ref().and_then(|f| under(f, 0))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncodingErrorKind {
    MissingProof,
    UnsupportedConstruct,
}

impl fmt::Display for EncodingErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EncodingErrorKind::MissingProof => write!(f, "MissingProof"),
            EncodingErrorKind::UnsupportedConstruct => write!(f, "UnsupportedConstruct"),
        }
    }
}

/// Raised when the analyzer and the encoder disagree; always an internal
/// invariant violation rather than a user error.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{location}: {kind}: {message}")]
pub struct EncodingError {
    pub kind: EncodingErrorKind,
    pub location: Location,
    pub message: String,
}

impl EncodingError {
    pub fn missing_proof(location: &Location, message: impl Into<String>) -> Self {
        EncodingError {
            kind: EncodingErrorKind::MissingProof,
            location: location.clone(),
            message: message.into(),
        }
    }

    pub fn unsupported(location: &Location, message: impl Into<String>) -> Self {
        EncodingError {
            kind: EncodingErrorKind::UnsupportedConstruct,
            location: location.clone(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> EncodingErrorKind {
        self.kind
    }

    pub fn location(&self) -> &Location {
        &self.location
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_identity() {
        let id = CoreTerm::lambda(CoreType::dynamic(), CoreTerm::Variable(0));
        assert!(id.is_closed());
        assert_eq!(id.size(), 2);
    }

    #[test]
    fn test_escaping_variable() {
        let term = CoreTerm::lambda(CoreType::dynamic(), CoreTerm::Variable(1));
        assert!(!term.is_closed());
    }

    #[test]
    fn test_let_binds_in_body_only() {
        let bad = CoreTerm::let_in(CoreTerm::Variable(0), CoreTerm::Literal(Literal::Null));
        assert!(!bad.is_closed());
        let good = CoreTerm::let_in(CoreTerm::Literal(Literal::Int(1)), CoreTerm::Variable(0));
        assert!(good.is_closed());
    }

    #[test]
    fn test_case_binders() {
        let term = CoreTerm::lambda(
            CoreType::dynamic(),
            CoreTerm::Match {
                scrutinee: Box::new(CoreTerm::Variable(0)),
                cases: vec![MatchCase {
                    pattern: CasePattern::Constructor {
                        name: "pair".to_string(),
                        arity: 2,
                    },
                    body: CoreTerm::Variable(2),
                }],
            },
        );
        assert!(term.is_closed());
    }
}
