//! # LangLang - A Typed Evaluation Pipeline for Configuration Programs
//!
//! LangLang takes a configuration program that has already been parsed into a
//! canonical tree and turns it into plain data. Every program that passes the
//! pipeline is guaranteed to terminate, and every side effect it requests is
//! subject to an explicit policy.
//!
//! ## Pipeline Flow
//!
//! ```text
//! ProgramNode<()>            (from any front end, or from the wire)
//!     ↓
//! [Type Checker] → ProgramNode<Type>      static, gradual or dynamic
//!     ↓
//! [Termination Analyzer] → ProgramNode<Proven>
//!     ↓
//! [Encoder] → CoreTerm       F-omega with guarded fixed points, de Bruijn indices
//!     ↓
//! [Evaluator] → Value        pure, sandbox or unrestricted effects
//! ```
//!
//! ## Key Design Decisions
//!
//! ### One Tree, Many Annotations
//! The program tree is generic over a per-node annotation. The checker and the
//! analyzer never change the shape of the tree, they only replace the
//! annotation, so every later stage can still point at the source location of
//! the node it is complaining about.
//!
//! ### Termination by Construction
//! Recursion is accepted only with a proof: a structurally decreasing
//! parameter, a constant iteration bound, or a user measure. The encoder turns
//! each proof into a guard (a structural fold, fuel, or a measure check), and
//! the evaluator checks the guard again on every unrolling.
//!
//! ### Effects as Policy
//! The language itself never touches the outside world. Reading a file, an
//! environment variable or a URL is a request that the run's
//! [`interpreter::EffectPolicy`] answers, possibly with a mock.
//!
//! ## Module Structure
//!
//! - [`ast`] - Canonical program tree
//! - [`types`] - Types, constraints and the type checker
//! - [`termination`] - Termination proofs
//! - [`core`] - Core calculus and the encoder
//! - [`interpreter`] - Evaluator, effect policies and the reference interpreter
//! - [`pipeline`] - Stage chaining
//! - [`wire`] - JSON wire format between stages
//! - [`config`] - Run configuration
//! - [`error`] - Error taxonomy
//! - [`fmt`] - Pretty printing
//!
//! ## Example
//!
//! ```
//! use langlang::ast::build::*;
//! use langlang::ast::BinOpKind;
//! use langlang::config::PipelineConfig;
//! use langlang::interpreter::Value;
//!
//! // let x = 5 in x + 1
//! let tree = let_in("x", int(5), binop(BinOpKind::Add, var("x"), int(1)));
//! let value = langlang::pipeline::run(&tree, &PipelineConfig::default()).unwrap();
//! assert_eq!(value, Value::Int(6));
//! ```

pub mod ast;
pub mod config;
pub mod core;
pub mod error;
pub mod fmt;
pub mod interpreter;
pub mod pipeline;
pub mod termination;
pub mod types;
pub mod wire;

pub use error::{ErrorKind, PipelineError};
pub use pipeline::{run, Pipeline};

/// A program as it comes out of a front end, before any checking.
pub type ParsedProgram = ast::ProgramNode<()>;
