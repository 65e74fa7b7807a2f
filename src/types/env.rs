use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::subst::Substitution;
use super::ty::{TypeScheme, TypeVar};

/// Typing environment: a chain of frames, innermost first.
///
/// Extending never copies or mutates the parent; sibling scopes share it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TypeEnv {
    bindings: HashMap<String, TypeScheme>,
    parent: Option<Arc<TypeEnv>>,
}

impl TypeEnv {
    pub fn empty() -> Self {
        TypeEnv::default()
    }

    pub fn with_bindings(bindings: Vec<(String, TypeScheme)>) -> Self {
        TypeEnv {
            bindings: bindings.into_iter().collect(),
            parent: None,
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&TypeScheme> {
        self.bindings
            .get(name)
            .or_else(|| self.parent.as_ref().and_then(|p| p.lookup(name)))
    }

    pub fn extend(&self, name: String, scheme: TypeScheme) -> TypeEnv {
        self.extend_many(vec![(name, scheme)])
    }

    pub fn extend_many(&self, bindings: Vec<(String, TypeScheme)>) -> TypeEnv {
        TypeEnv {
            bindings: bindings.into_iter().collect(),
            parent: Some(Arc::new(self.clone())),
        }
    }

    /// Type variables free in the environment once `subst` is applied.
    pub fn free_type_vars(&self, subst: &Substitution) -> HashSet<TypeVar> {
        let mut free = HashSet::new();
        let mut frame = Some(self);
        while let Some(env) = frame {
            for scheme in env.bindings.values() {
                for var in subst.apply(&scheme.ty).free_type_vars() {
                    if !scheme.vars.contains(&var) {
                        free.insert(var);
                    }
                }
            }
            frame = env.parent.as_deref();
        }
        free
    }
}
