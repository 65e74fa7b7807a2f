//! Structural helpers over program trees: free variables and annotation mapping.

use std::collections::HashSet;
use std::sync::Arc;

use super::expression::*;

impl<T> ProgramNode<T> {
    /// Names referenced by this node that are not bound inside it.
    ///
    /// A `let` binding is in scope of its own value (self reference makes it
    /// recursive), a `LetRec` group is in scope of every member. The `bound`
    /// expression is evaluated outside the group and sees none of it.
    pub fn free_vars(&self) -> HashSet<String> {
        let mut free = HashSet::new();
        self.collect_free(&mut Vec::new(), &mut free);
        free
    }

    /// Whether `name` occurs free in this node.
    pub fn mentions(&self, name: &str) -> bool {
        self.free_vars().contains(name)
    }

    fn collect_free(&self, bound: &mut Vec<String>, free: &mut HashSet<String>) {
        match self {
            ProgramNode::Literal(_) => {}
            ProgramNode::Variable(var) => {
                if !bound.iter().any(|b| b == &var.name) {
                    free.insert(var.name.clone());
                }
            }
            ProgramNode::Lambda(lambda) => {
                let mark = bound.len();
                bound.extend(lambda.params.iter().map(|p| p.name.clone()));
                lambda.body.collect_free(bound, free);
                bound.truncate(mark);
            }
            ProgramNode::Apply(apply) => {
                apply.func.collect_free(bound, free);
                for arg in &apply.args {
                    arg.collect_free(bound, free);
                }
            }
            ProgramNode::Let(node) => {
                if let Some(limit) = &node.bound {
                    limit.collect_free(bound, free);
                }
                let mark = bound.len();
                bound.push(node.binding.name.clone());
                collect_binding(&node.binding, bound, free);
                node.body.collect_free(bound, free);
                bound.truncate(mark);
            }
            ProgramNode::LetRec(node) => {
                if let Some(limit) = &node.bound {
                    limit.collect_free(bound, free);
                }
                let mark = bound.len();
                bound.extend(node.bindings.iter().map(|b| b.name.clone()));
                for binding in &node.bindings {
                    collect_binding(binding, bound, free);
                }
                node.body.collect_free(bound, free);
                bound.truncate(mark);
            }
            ProgramNode::Conditional(cond) => {
                cond.condition.collect_free(bound, free);
                cond.then_branch.collect_free(bound, free);
                cond.else_branch.collect_free(bound, free);
            }
            ProgramNode::ObjectLiteral(obj) => {
                for (_, value) in &obj.fields {
                    value.collect_free(bound, free);
                }
            }
            ProgramNode::ArrayLiteral(arr) => {
                for element in &arr.elements {
                    element.collect_free(bound, free);
                }
            }
            ProgramNode::FieldAccess(access) => access.object.collect_free(bound, free),
            ProgramNode::BinaryOp(op) => {
                op.left.collect_free(bound, free);
                op.right.collect_free(bound, free);
            }
            ProgramNode::UnaryOp(op) => op.operand.collect_free(bound, free),
            ProgramNode::Loop(node) => {
                node.count.collect_free(bound, free);
                bound.push(node.var.clone());
                node.body.collect_free(bound, free);
                bound.pop();
            }
            ProgramNode::EffectRequest(effect) => {
                effect.target.collect_free(bound, free);
                if let Some(fallback) = &effect.fallback {
                    fallback.collect_free(bound, free);
                }
            }
            ProgramNode::Comment(comment) => comment.target.collect_free(bound, free),
        }
    }

    /// Rebuilds the tree with a new annotation computed from each original node.
    ///
    /// The callback sees the node before its children are rebuilt, so it may
    /// use the node's address as a key into a side table.
    pub fn map_info<U>(&self, f: &mut impl FnMut(&ProgramNode<T>) -> U) -> ProgramNode<U> {
        let info = f(self);
        match self {
            ProgramNode::Literal(n) => ProgramNode::Literal(LiteralNode {
                value: n.value.clone(),
                location: n.location.clone(),
                info,
            }),
            ProgramNode::Variable(n) => ProgramNode::Variable(Variable {
                name: n.name.clone(),
                location: n.location.clone(),
                info,
            }),
            ProgramNode::Lambda(n) => ProgramNode::Lambda(Lambda {
                params: n.params.clone(),
                body: map_child(&n.body, f),
                location: n.location.clone(),
                info,
            }),
            ProgramNode::Apply(n) => ProgramNode::Apply(Apply {
                func: map_child(&n.func, f),
                args: n.args.iter().map(|a| map_child(a, f)).collect(),
                location: n.location.clone(),
                info,
            }),
            ProgramNode::Let(n) => ProgramNode::Let(Let {
                binding: map_binding(&n.binding, f),
                bound: n.bound.as_ref().map(|b| map_child(b, f)),
                body: map_child(&n.body, f),
                location: n.location.clone(),
                info,
            }),
            ProgramNode::LetRec(n) => ProgramNode::LetRec(LetRec {
                bindings: n.bindings.iter().map(|b| map_binding(b, f)).collect(),
                bound: n.bound.as_ref().map(|b| map_child(b, f)),
                body: map_child(&n.body, f),
                location: n.location.clone(),
                info,
            }),
            ProgramNode::Conditional(n) => ProgramNode::Conditional(Conditional {
                condition: map_child(&n.condition, f),
                then_branch: map_child(&n.then_branch, f),
                else_branch: map_child(&n.else_branch, f),
                location: n.location.clone(),
                info,
            }),
            ProgramNode::ObjectLiteral(n) => ProgramNode::ObjectLiteral(ObjectLiteral {
                fields: n
                    .fields
                    .iter()
                    .map(|(k, v)| (k.clone(), map_child(v, f)))
                    .collect(),
                location: n.location.clone(),
                info,
            }),
            ProgramNode::ArrayLiteral(n) => ProgramNode::ArrayLiteral(ArrayLiteral {
                elements: n.elements.iter().map(|e| map_child(e, f)).collect(),
                location: n.location.clone(),
                info,
            }),
            ProgramNode::FieldAccess(n) => ProgramNode::FieldAccess(FieldAccess {
                object: map_child(&n.object, f),
                field: n.field.clone(),
                location: n.location.clone(),
                info,
            }),
            ProgramNode::BinaryOp(n) => ProgramNode::BinaryOp(BinaryOp {
                op: n.op,
                left: map_child(&n.left, f),
                right: map_child(&n.right, f),
                location: n.location.clone(),
                info,
            }),
            ProgramNode::UnaryOp(n) => ProgramNode::UnaryOp(UnaryOp {
                op: n.op,
                operand: map_child(&n.operand, f),
                location: n.location.clone(),
                info,
            }),
            ProgramNode::Loop(n) => ProgramNode::Loop(Loop {
                var: n.var.clone(),
                count: map_child(&n.count, f),
                body: map_child(&n.body, f),
                location: n.location.clone(),
                info,
            }),
            ProgramNode::EffectRequest(n) => ProgramNode::EffectRequest(EffectRequest {
                effect: n.effect,
                target: map_child(&n.target, f),
                fallback: n.fallback.as_ref().map(|b| map_child(b, f)),
                location: n.location.clone(),
                info,
            }),
            ProgramNode::Comment(n) => ProgramNode::Comment(Comment {
                text: n.text.clone(),
                target: map_child(&n.target, f),
                location: n.location.clone(),
                info,
            }),
        }
    }

    /// Drops every annotation.
    pub fn erase(&self) -> ProgramNode<()> {
        self.map_info(&mut |_| ())
    }

    /// Number of nodes in the tree, counting shared subtrees once per reference.
    pub fn size(&self) -> usize {
        let mut count = 0;
        self.map_info(&mut |_| count += 1);
        count
    }
}

/// The measure of a binding is an expression over the lambda's parameters.
fn collect_binding<T>(binding: &Binding<T>, bound: &mut Vec<String>, free: &mut HashSet<String>) {
    binding.value.collect_free(bound, free);
    if let Some(measure) = &binding.measure {
        let mark = bound.len();
        if let Some(lambda) = binding.value.as_lambda() {
            bound.extend(lambda.params.iter().map(|p| p.name.clone()));
        }
        measure.collect_free(bound, free);
        bound.truncate(mark);
    }
}

fn map_child<T, U>(
    child: &NodeRef<T>,
    f: &mut impl FnMut(&ProgramNode<T>) -> U,
) -> NodeRef<U> {
    Arc::new(child.map_info(f))
}

fn map_binding<T, U>(
    binding: &Binding<T>,
    f: &mut impl FnMut(&ProgramNode<T>) -> U,
) -> Binding<U> {
    Binding {
        name: binding.name.clone(),
        annotation: binding.annotation.clone(),
        value: map_child(&binding.value, f),
        measure: binding.measure.as_ref().map(|m| map_child(m, f)),
        location: binding.location.clone(),
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::build::*;
    use crate::ast::BinOpKind;

    #[test]
    fn test_free_vars_variable() {
        let free = var("x").free_vars();
        assert_eq!(free.len(), 1);
        assert!(free.contains("x"));
    }

    #[test]
    fn test_free_vars_lambda_binds_params() {
        let node = lambda(&["x"], binop(BinOpKind::Add, var("x"), var("y")));
        let free = node.free_vars();
        assert!(!free.contains("x"));
        assert!(free.contains("y"));
    }

    #[test]
    fn test_free_vars_let_is_self_scoped() {
        let node = let_in("f", lambda(&["n"], apply(var("f"), vec![var("n")])), var("f"));
        assert!(node.free_vars().is_empty());
    }

    #[test]
    fn test_free_vars_loop_binds_var() {
        let node = for_loop("i", int(3), binop(BinOpKind::Add, var("i"), var("k")));
        let free = node.free_vars();
        assert!(!free.contains("i"));
        assert!(free.contains("k"));
    }

    #[test]
    fn test_map_info_preserves_shape() {
        let node = let_in("x", int(5), binop(BinOpKind::Add, var("x"), int(1)));
        let mut counter = 0;
        let numbered = node.map_info(&mut |_| {
            counter += 1;
            counter
        });
        assert_eq!(*numbered.info(), 1);
        assert_eq!(numbered.erase(), node);
        assert_eq!(node.size(), 5);
    }
}
