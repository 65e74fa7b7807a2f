//! # Type Error Definitions
//!
//! Errors raised while checking a program tree:
//!
//! - A variable is used but not defined (`UnboundVariable`)
//! - Two types cannot be unified, including infinite types (`UnificationFailure`)
//! - An object lacks a field that is accessed or required (`MissingField`)
//!
//! Every error carries the location of the node that produced it.

use std::fmt;

use thiserror::Error;

use super::ty::Type;
use super::unify::UnifyError;
use crate::ast::Location;

/// Type error encountered during type checking.
///
/// # Example Error Messages
///
/// ```text
/// config.ll:3:9: unbound variable `prot`
/// config.ll:4:1: cannot unify Int with Text (operand of `+`)
/// config.ll:7:12: field `port` is missing from {host: Text}
/// ```
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TypeError {
    #[error("{location}: unbound variable `{name}`")]
    UnboundVariable { name: String, location: Location },

    #[error("{location}: cannot unify {expected} with {found}{}", note(.context))]
    UnificationFailure {
        expected: Type,
        found: Type,
        location: Location,
        /// What the checker was doing, e.g. "argument of call"
        context: Option<String>,
    },

    #[error("{location}: field `{field}` is missing from {ty}")]
    MissingField {
        field: String,
        ty: Type,
        location: Location,
    },
}

fn note(context: &Option<String>) -> String {
    match context {
        Some(context) => format!(" ({context})"),
        None => String::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeErrorKind {
    UnificationFailure,
    UnboundVariable,
    MissingField,
}

impl fmt::Display for TypeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TypeErrorKind::UnificationFailure => write!(f, "UnificationFailure"),
            TypeErrorKind::UnboundVariable => write!(f, "UnboundVariable"),
            TypeErrorKind::MissingField => write!(f, "MissingField"),
        }
    }
}

impl TypeError {
    pub fn unbound_variable(name: String, location: Location) -> Self {
        TypeError::UnboundVariable { name, location }
    }

    pub fn mismatch(expected: Type, found: Type, location: Location) -> Self {
        TypeError::UnificationFailure {
            expected,
            found,
            location,
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        if let TypeError::UnificationFailure { context: ctx, .. } = &mut self {
            if ctx.is_none() {
                *ctx = Some(context.into());
            }
        }
        self
    }

    pub fn from_unify_error(err: UnifyError, location: Location) -> Self {
        match err {
            UnifyError::Mismatch { expected, found } => {
                TypeError::mismatch(expected, found, location)
            }
            UnifyError::OccursCheck { var, ty } => TypeError::UnificationFailure {
                expected: Type::Var(var),
                found: ty,
                location,
                context: Some("infinite type".to_string()),
            },
            UnifyError::MissingField { field, ty } => TypeError::MissingField {
                field,
                ty,
                location,
            },
        }
    }

    pub fn kind(&self) -> TypeErrorKind {
        match self {
            TypeError::UnboundVariable { .. } => TypeErrorKind::UnboundVariable,
            TypeError::UnificationFailure { .. } => TypeErrorKind::UnificationFailure,
            TypeError::MissingField { .. } => TypeErrorKind::MissingField,
        }
    }

    pub fn location(&self) -> &Location {
        match self {
            TypeError::UnboundVariable { location, .. }
            | TypeError::UnificationFailure { location, .. }
            | TypeError::MissingField { location, .. } => location,
        }
    }
}
