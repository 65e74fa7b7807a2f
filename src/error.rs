use std::fmt;

use thiserror::Error;

use crate::ast::Location;
use crate::config::ConfigError;
use crate::core::{EncodingError, EncodingErrorKind};
use crate::interpreter::{RuntimeError, RuntimeErrorKind};
use crate::termination::{TerminationError, TerminationErrorKind};
use crate::types::{TypeError, TypeErrorKind};
use crate::wire::WireError;

/// Any failure of a pipeline run. The first failing stage aborts the run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error(transparent)]
    Termination(#[from] TerminationError),
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// The error taxonomy, grouped by the stage that reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Type(TypeErrorKind),
    Termination(TerminationErrorKind),
    Encoding(EncodingErrorKind),
    Runtime(RuntimeErrorKind),
    Wire,
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorKind::Type(kind) => write!(f, "TypeError.{kind}"),
            ErrorKind::Termination(kind) => write!(f, "TerminationError.{kind}"),
            ErrorKind::Encoding(kind) => write!(f, "EncodingError.{kind}"),
            ErrorKind::Runtime(kind) => write!(f, "RuntimeError.{kind}"),
            ErrorKind::Wire => write!(f, "WireError"),
            ErrorKind::Config => write!(f, "ConfigError"),
        }
    }
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Type(e) => ErrorKind::Type(e.kind()),
            PipelineError::Termination(e) => ErrorKind::Termination(e.kind()),
            PipelineError::Encoding(e) => ErrorKind::Encoding(e.kind()),
            PipelineError::Runtime(e) => ErrorKind::Runtime(e.kind()),
            PipelineError::Wire(_) => ErrorKind::Wire,
            PipelineError::Config(_) => ErrorKind::Config,
        }
    }

    /// Source location of the offending node. Wire and configuration errors
    /// happen before there is a tree and have none.
    pub fn location(&self) -> Option<&Location> {
        match self {
            PipelineError::Type(e) => Some(e.location()),
            PipelineError::Termination(e) => Some(e.location()),
            PipelineError::Encoding(e) => Some(e.location()),
            PipelineError::Runtime(e) => Some(e.location()),
            PipelineError::Wire(_) | PipelineError::Config(_) => None,
        }
    }

    /// Encoding errors mean the analyzer let something through that the
    /// encoder cannot guard.
    pub fn is_internal(&self) -> bool {
        matches!(self, PipelineError::Encoding(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_location() {
        let location = Location::new("app.ll", 3, 7);
        let err: PipelineError =
            RuntimeError::new(RuntimeErrorKind::EffectForbidden, &location, "network").into();

        assert_eq!(
            err.kind(),
            ErrorKind::Runtime(RuntimeErrorKind::EffectForbidden)
        );
        assert_eq!(err.kind().to_string(), "RuntimeError.EffectForbidden");
        assert_eq!(err.location(), Some(&location));
        assert_eq!(err.to_string(), "app.ll:3:7: EffectForbidden: network");
        assert!(!err.is_internal());
    }

    #[test]
    fn test_wire_errors_have_no_location() {
        let err: PipelineError = crate::wire::from_str::<crate::ast::ProgramNode<()>>(
            r#"{"tag": 42}"#,
        )
        .map_err(PipelineError::from)
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Wire);
        assert_eq!(err.location(), None);
    }
}
