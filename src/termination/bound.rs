//! Constant folding of iteration bounds.
//!
//! A bound is closed when it is built from integer literals, integer
//! arithmetic and names bound by an enclosing `let` to closed integers.

use crate::ast::{BinOpKind, Literal, LiteralNode, ProgramNode, UnaryOpKind};

/// Names in scope with their constant value, innermost last. `None` shadows
/// an outer constant with something unknown.
#[derive(Debug, Clone, Default)]
pub(super) struct Constants {
    scope: Vec<(String, Option<i64>)>,
}

impl Constants {
    pub(super) fn push(&mut self, name: &str, value: Option<i64>) {
        self.scope.push((name.to_string(), value));
    }

    pub(super) fn push_unknown<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        for name in names {
            self.push(name, None);
        }
    }

    pub(super) fn mark(&self) -> usize {
        self.scope.len()
    }

    pub(super) fn reset(&mut self, mark: usize) {
        self.scope.truncate(mark);
    }

    fn lookup(&self, name: &str) -> Option<i64> {
        self.scope
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| *v)
    }

    /// Folds `node` to an integer, or `None` when it is not closed.
    pub(super) fn eval<T>(&self, node: &ProgramNode<T>) -> Option<i64> {
        match node {
            ProgramNode::Literal(LiteralNode {
                value: Literal::Int(i),
                ..
            }) => Some(*i),
            ProgramNode::Variable(var) => self.lookup(&var.name),
            ProgramNode::Comment(comment) => self.eval(&comment.target),
            ProgramNode::UnaryOp(op) if op.op == UnaryOpKind::Negate => {
                self.eval(&op.operand)?.checked_neg()
            }
            ProgramNode::BinaryOp(op) => {
                let left = self.eval(&op.left)?;
                let right = self.eval(&op.right)?;
                match op.op {
                    BinOpKind::Add => left.checked_add(right),
                    BinOpKind::Sub => left.checked_sub(right),
                    BinOpKind::Mul => left.checked_mul(right),
                    BinOpKind::Div => left.checked_div(right),
                    BinOpKind::Mod => left.checked_rem(right),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;

    #[test]
    fn test_eval_literal_arithmetic() {
        let constants = Constants::default();
        let node = binop(BinOpKind::Mul, int(3), binop(BinOpKind::Add, int(1), int(1)));
        assert_eq!(constants.eval(&node), Some(6));
    }

    #[test]
    fn test_eval_named_constant() {
        let mut constants = Constants::default();
        constants.push("replicas", Some(3));
        assert_eq!(constants.eval(&var("replicas")), Some(3));
    }

    #[test]
    fn test_shadowed_constant_is_unknown() {
        let mut constants = Constants::default();
        constants.push("n", Some(3));
        constants.push_unknown(["n"]);
        assert_eq!(constants.eval(&var("n")), None);
    }

    #[test]
    fn test_division_by_zero_is_not_closed() {
        let constants = Constants::default();
        assert_eq!(constants.eval(&binop(BinOpKind::Div, int(1), int(0))), None);
    }

    #[test]
    fn test_effect_is_not_closed() {
        let constants = Constants::default();
        assert_eq!(constants.eval(&read_env("N", None)), None);
    }
}
