use std::sync::Arc;

use crate::ast::NodeRef;

use super::value::{Closure, Value};

/// Persistent name → value mapping used by the reference interpreter.
///
/// Extending returns a new environment that shares its parent; nothing is
/// ever mutated, so an environment may be shared between sibling
/// evaluations and threads.
#[derive(Debug, Clone, Default)]
pub struct Environment(Option<Arc<Frame>>);

#[derive(Debug)]
struct Frame {
    entry: Entry,
    parent: Environment,
}

#[derive(Debug)]
enum Entry {
    Value(String, Value),
    /// A recursive group. Looking up a member yields a closure whose
    /// environment is the one holding this very frame.
    Group(Vec<RecMember>),
}

/// A function of a recursive group.
#[derive(Debug)]
pub struct RecMember {
    pub name: String,
    pub params: Vec<String>,
    pub body: NodeRef<()>,
}

impl Environment {
    pub fn empty() -> Self {
        Environment(None)
    }

    pub fn extend(&self, name: impl Into<String>, value: Value) -> Self {
        Environment(Some(Arc::new(Frame {
            entry: Entry::Value(name.into(), value),
            parent: self.clone(),
        })))
    }

    pub fn extend_group(&self, members: Vec<RecMember>) -> Self {
        Environment(Some(Arc::new(Frame {
            entry: Entry::Group(members),
            parent: self.clone(),
        })))
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        let mut current = self;
        while let Some(frame) = &current.0 {
            match &frame.entry {
                Entry::Value(bound, value) if bound == name => return Some(value.clone()),
                Entry::Group(members) => {
                    if let Some(member) = members.iter().find(|m| m.name == name) {
                        return Some(Value::Closure(Closure::new(
                            member.params.clone(),
                            member.body.clone(),
                            Environment(Some(frame.clone())),
                        )));
                    }
                }
                Entry::Value(..) => {}
            }
            current = &frame.parent;
        }
        None
    }

    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self;
        while let Some(frame) = &current.0 {
            depth += 1;
            current = &frame.parent;
        }
        depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;

    #[test]
    fn test_extend_does_not_touch_parent() {
        let parent = Environment::empty().extend("x", Value::Int(1));
        let child = parent.extend("x", Value::Int(2));
        assert_eq!(parent.lookup("x"), Some(Value::Int(1)));
        assert_eq!(child.lookup("x"), Some(Value::Int(2)));
        assert_eq!(child.depth(), 2);
    }

    #[test]
    fn test_siblings_share_parent() {
        let parent = Environment::empty().extend("base", Value::Int(10));
        let left = parent.extend("y", Value::Int(1));
        let right = parent.extend("y", Value::Int(2));
        assert_eq!(left.lookup("base"), right.lookup("base"));
        assert_ne!(left.lookup("y"), right.lookup("y"));
    }

    #[test]
    fn test_group_member_sees_itself() {
        let env = Environment::empty().extend_group(vec![RecMember {
            name: "f".to_string(),
            params: vec!["x".to_string()],
            body: Arc::new(var("x")),
        }]);
        let Some(Value::Closure(closure)) = env.lookup("f") else {
            panic!("expected closure");
        };
        assert!(matches!(closure.0.env.lookup("f"), Some(Value::Closure(_))));
    }

    #[test]
    fn test_missing_name() {
        assert_eq!(Environment::empty().lookup("nope"), None);
    }
}
