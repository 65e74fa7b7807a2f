//! Pretty printer for program trees.
//!
//! Prints a `ProgramNode` in a neutral expression syntax. It is used for
//! diagnostics (termination measures, error reports) and debugging; no
//! parser reads it back.

use std::fmt::{self, Display, Write};

use super::Formatter;
use crate::ast::{BinOpKind, Binding, ProgramNode, UnaryOpKind};

impl<T> Display for ProgramNode<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut formatter = Formatter::new();
        format_node(self, &mut formatter, 0);
        write!(f, "{}", formatter.finish())
    }
}

fn format_node<T>(node: &ProgramNode<T>, fmt: &mut Formatter, precedence: u8) {
    match node {
        ProgramNode::Literal(lit) => {
            let _ = write!(fmt.buffer, "{}", lit.value);
        }
        ProgramNode::Variable(var) => fmt.write_str(&var.name),
        ProgramNode::Lambda(lambda) => {
            let needs_parens = precedence > 0;
            if needs_parens {
                fmt.write_str("(");
            }
            fmt.write_str("\\");
            if lambda.params.is_empty() {
                fmt.write_str("()");
            }
            for (i, param) in lambda.params.iter().enumerate() {
                if i > 0 {
                    fmt.write_str(" ");
                }
                match &param.annotation {
                    Some(ty) => {
                        let _ = write!(fmt.buffer, "({}: {})", param.name, ty);
                    }
                    None => fmt.write_str(&param.name),
                }
            }
            fmt.write_str(" -> ");
            format_node(&lambda.body, fmt, 0);
            if needs_parens {
                fmt.write_str(")");
            }
        }
        ProgramNode::Apply(apply) => {
            format_node(&apply.func, fmt, 100);
            fmt.write_str("(");
            format_list(apply.args.iter().map(|a| &**a), fmt);
            fmt.write_str(")");
        }
        ProgramNode::Let(node) => {
            fmt.write_str("let ");
            if let Some(bound) = &node.bound {
                fmt.write_str("[bound ");
                format_node(bound, fmt, 0);
                fmt.write_str("] ");
            }
            format_binding(&node.binding, fmt);
            fmt.write_str(" in");
            fmt.write_newline();
            fmt.write_indent();
            format_node(&node.body, fmt, 0);
        }
        ProgramNode::LetRec(node) => {
            fmt.write_str("let rec ");
            if let Some(bound) = &node.bound {
                fmt.write_str("[bound ");
                format_node(bound, fmt, 0);
                fmt.write_str("] ");
            }
            for (i, binding) in node.bindings.iter().enumerate() {
                if i > 0 {
                    fmt.write_newline();
                    fmt.write_indent();
                    fmt.write_str("and ");
                }
                format_binding(binding, fmt);
            }
            fmt.write_str(" in");
            fmt.write_newline();
            fmt.write_indent();
            format_node(&node.body, fmt, 0);
        }
        ProgramNode::Conditional(cond) => {
            fmt.write_str("if ");
            format_node(&cond.condition, fmt, 0);
            fmt.write_str(" then ");
            format_node(&cond.then_branch, fmt, 0);
            fmt.write_str(" else ");
            format_node(&cond.else_branch, fmt, 0);
        }
        ProgramNode::ObjectLiteral(obj) => {
            fmt.write_str("{");
            for (i, (name, value)) in obj.fields.iter().enumerate() {
                if i > 0 {
                    fmt.write_str(", ");
                }
                fmt.write_str(name);
                fmt.write_str(": ");
                format_node(value, fmt, 0);
            }
            fmt.write_str("}");
        }
        ProgramNode::ArrayLiteral(arr) => {
            fmt.write_str("[");
            format_list(arr.elements.iter().map(|e| &**e), fmt);
            fmt.write_str("]");
        }
        ProgramNode::FieldAccess(access) => {
            format_node(&access.object, fmt, 100);
            fmt.write_str(".");
            fmt.write_str(&access.field);
        }
        ProgramNode::BinaryOp(op) => {
            let op_prec = binop_precedence(op.op);
            let needs_parens = op_prec < precedence;
            if needs_parens {
                fmt.write_str("(");
            }
            format_node(&op.left, fmt, op_prec);
            fmt.write_str(" ");
            fmt.write_str(op.op.symbol());
            fmt.write_str(" ");
            format_node(&op.right, fmt, op_prec + 1);
            if needs_parens {
                fmt.write_str(")");
            }
        }
        ProgramNode::UnaryOp(op) => match op.op {
            UnaryOpKind::Not => {
                fmt.write_str("!");
                format_node(&op.operand, fmt, 100);
            }
            UnaryOpKind::Negate => {
                fmt.write_str("-");
                format_node(&op.operand, fmt, 100);
            }
            other => {
                fmt.write_str(other.name());
                fmt.write_str("(");
                format_node(&op.operand, fmt, 0);
                fmt.write_str(")");
            }
        },
        ProgramNode::Loop(node) => {
            let _ = write!(fmt.buffer, "for {} in 0..", node.var);
            format_node(&node.count, fmt, 100);
            fmt.write_str(" collect ");
            format_node(&node.body, fmt, 0);
        }
        ProgramNode::EffectRequest(effect) => {
            let _ = write!(fmt.buffer, "{}(", effect.effect);
            format_node(&effect.target, fmt, 0);
            fmt.write_str(")");
            if let Some(fallback) = &effect.fallback {
                fmt.write_str(" ?? ");
                format_node(fallback, fmt, 100);
            }
        }
        ProgramNode::Comment(comment) => {
            let _ = write!(fmt.buffer, "/* {} */ ", comment.text);
            format_node(&comment.target, fmt, precedence);
        }
    }
}

fn format_binding<T>(binding: &Binding<T>, fmt: &mut Formatter) {
    fmt.write_str(&binding.name);
    if let Some(ty) = &binding.annotation {
        let _ = write!(fmt.buffer, ": {ty}");
    }
    fmt.write_str(" = ");
    format_node(&binding.value, fmt, 0);
    if let Some(measure) = &binding.measure {
        fmt.write_str(" decreasing ");
        format_node(measure, fmt, 0);
    }
}

fn format_list<'a, T: 'a>(items: impl Iterator<Item = &'a ProgramNode<T>>, fmt: &mut Formatter) {
    for (i, item) in items.enumerate() {
        if i > 0 {
            fmt.write_str(", ");
        }
        format_node(item, fmt, 0);
    }
}

fn binop_precedence(kind: BinOpKind) -> u8 {
    match kind {
        BinOpKind::Or => 1,
        BinOpKind::And => 2,
        BinOpKind::Eq
        | BinOpKind::NotEq
        | BinOpKind::Lt
        | BinOpKind::Gt
        | BinOpKind::LtEq
        | BinOpKind::GtEq => 3,
        BinOpKind::Add | BinOpKind::Sub | BinOpKind::Concat | BinOpKind::Merge => 4,
        BinOpKind::Mul | BinOpKind::Div | BinOpKind::Mod => 5,
    }
}
