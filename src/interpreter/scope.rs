use std::sync::Arc;

use super::runtime::RValue;

/// Persistent de Bruijn environment of the core evaluator: index 0 is the
/// most recently pushed value.
#[derive(Debug, Clone, Default)]
pub struct Scope<'t>(Option<Arc<ScopeFrame<'t>>>);

#[derive(Debug)]
struct ScopeFrame<'t> {
    value: RValue<'t>,
    parent: Scope<'t>,
}

impl<'t> Scope<'t> {
    pub fn empty() -> Self {
        Scope(None)
    }

    pub fn push(&self, value: RValue<'t>) -> Self {
        Scope(Some(Arc::new(ScopeFrame {
            value,
            parent: self.clone(),
        })))
    }

    pub fn push_all(&self, values: impl IntoIterator<Item = RValue<'t>>) -> Self {
        values
            .into_iter()
            .fold(self.clone(), |scope, value| scope.push(value))
    }

    pub fn get(&self, index: usize) -> Option<&RValue<'t>> {
        let mut current = self.0.as_ref()?;
        for _ in 0..index {
            current = current.parent.0.as_ref()?;
        }
        Some(&current.value)
    }
}
