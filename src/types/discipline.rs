use std::fmt;

use serde::{Deserialize, Serialize};

/// How strictly a program is type checked. Selected once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TypingDiscipline {
    /// Full inference; every node must receive a consistent type.
    #[default]
    Static,
    /// Annotated binders are checked as under `Static`; unannotated ones are
    /// `Unknown` and fit anything.
    Gradual,
    /// No checking: every node is annotated `Unknown`.
    Dynamic,
}

impl fmt::Display for TypingDiscipline {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TypingDiscipline::Static => write!(f, "static"),
            TypingDiscipline::Gradual => write!(f, "gradual"),
            TypingDiscipline::Dynamic => write!(f, "dynamic"),
        }
    }
}
