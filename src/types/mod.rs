//! # Type Layer and Type Checker
//!
//! [`check`] annotates every node of a program tree with its type under the
//! selected [`TypingDiscipline`]. The annotated tree is the input of the
//! termination analyzer; its root annotation is the type of the program.

pub mod constraint;
pub mod discipline;
pub mod env;
pub mod error;
pub mod infer;
mod solve;
pub mod subst;
pub mod ty;
pub mod unify;

use tracing::debug;

use crate::ast::ProgramNode;

pub use constraint::{Constraint, IDENTIFIER_PATTERN};
pub use discipline::TypingDiscipline;
pub use env::TypeEnv;
pub use error::{TypeError, TypeErrorKind};
pub use infer::Infer;
pub use subst::Substitution;
pub use ty::{FieldType, Purity, Type, TypeScheme, TypeVar};

/// A program tree annotated with types.
pub type TypedTree = ProgramNode<Type>;

/// Type checks `tree`.
///
/// Under [`TypingDiscipline::Dynamic`] no constraints are generated and every
/// node is annotated `Unknown`. The checker never performs effects.
pub fn check<T>(tree: &ProgramNode<T>, discipline: TypingDiscipline) -> Result<TypedTree, TypeError> {
    debug!(%discipline, nodes = tree.size(), "type checking");
    match discipline {
        TypingDiscipline::Dynamic => Ok(tree.map_info(&mut |_| Type::Unknown)),
        TypingDiscipline::Static | TypingDiscipline::Gradual => {
            let typed = Infer::new(discipline).infer_program(tree)?;
            debug!(ty = %typed.info(), "program type");
            Ok(typed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;

    #[test]
    fn test_dynamic_annotates_unknown() {
        let tree = let_in("x", int(1), var("y"));
        let typed = check(&tree, TypingDiscipline::Dynamic).unwrap();
        assert_eq!(*typed.info(), Type::Unknown);
        assert_eq!(typed.erase(), tree);
    }
}
