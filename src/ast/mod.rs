//! # Canonical Program Model
//!
//! Every surface syntax accepted by the front end is reduced to one tree shape,
//! [`ProgramNode`]. The tree is pure data: it has no behavior beyond a few
//! structural helpers (free variables, annotation mapping).
//!
//! ## Pipeline Position
//!
//! ```text
//! [Parser] → ProgramNode<()> → Type Checker → ProgramNode<Type>
//!          → Termination Analyzer → ProgramNode<Proven> → Encoder → CoreTerm → Evaluator
//! ```
//!
//! ## The Annotation Parameter `T`
//!
//! Like the core trees of the checker, `ProgramNode` is generic over a per-node
//! annotation stored in `info`:
//!
//! - **Parser output**: `ProgramNode<()>`
//! - **After type checking**: `ProgramNode<Type>` (see [`crate::types::TypedTree`])
//! - **After termination analysis**: `ProgramNode<Proven>` (see [`crate::termination::ProvenTree`])
//!
//! The shape of the tree never changes between stages, only the annotation does.
//!
//! ## Sharing
//!
//! Children are held in [`Arc`], so a subtree may be referenced from several
//! parents and from several concurrent evaluation runs. Nodes are never mutated
//! after construction; stages build new trees instead.

pub mod build;
pub mod expression;
mod visit;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use expression::*;

/// Source location of a node: line, column and the identifier of the unit
/// (file, module, snippet) it originates from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub unit: Arc<str>,
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(unit: impl AsRef<str>, line: u32, column: u32) -> Self {
        Self {
            unit: Arc::from(unit.as_ref()),
            line,
            column,
        }
    }
}

impl Default for Location {
    fn default() -> Self {
        Self::new("", 0, 0)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.unit.is_empty() {
            write!(f, "{}:{}", self.line, self.column)
        } else {
            write!(f, "{}:{}:{}", self.unit, self.line, self.column)
        }
    }
}

/// Scalar constants that may appear directly in a program.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "null"),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Int(i) => write!(f, "{i}"),
            Literal::Float(x) => write!(f, "{x:?}"),
            Literal::Text(s) => write!(f, "{s:?}"),
        }
    }
}

/// The side-effecting operations a program may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EffectKind {
    ReadFile,
    ReadEnv,
    Network,
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EffectKind::ReadFile => write!(f, "readFile"),
            EffectKind::ReadEnv => write!(f, "readEnv"),
            EffectKind::Network => write!(f, "network"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOpKind {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    And,
    Or,
    /// `++` on text or arrays
    Concat,
    /// `//` on objects, right-hand side wins
    Merge,
}

impl BinOpKind {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOpKind::Add => "+",
            BinOpKind::Sub => "-",
            BinOpKind::Mul => "*",
            BinOpKind::Div => "/",
            BinOpKind::Mod => "%",
            BinOpKind::Eq => "==",
            BinOpKind::NotEq => "!=",
            BinOpKind::Lt => "<",
            BinOpKind::Gt => ">",
            BinOpKind::LtEq => "<=",
            BinOpKind::GtEq => ">=",
            BinOpKind::And => "&&",
            BinOpKind::Or => "||",
            BinOpKind::Concat => "++",
            BinOpKind::Merge => "//",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOpKind {
    Not,
    Negate,
    Length,
    Head,
    Tail,
    IsEmpty,
    ToText,
}

impl UnaryOpKind {
    pub fn name(&self) -> &'static str {
        match self {
            UnaryOpKind::Not => "not",
            UnaryOpKind::Negate => "negate",
            UnaryOpKind::Length => "length",
            UnaryOpKind::Head => "head",
            UnaryOpKind::Tail => "tail",
            UnaryOpKind::IsEmpty => "isEmpty",
            UnaryOpKind::ToText => "toText",
        }
    }
}
