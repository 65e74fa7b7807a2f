//! Pretty printer for core terms, types and kinds.
//!
//! Variables print as their de Bruijn index (`#0` is the innermost binder).
//! Location wrappers are invisible.

use std::fmt::{self, Display, Write};

use super::Formatter;
use crate::core::{CasePattern, CoreTerm, CoreType, FixGuard, FixMember, Kind, PrimOp};

impl Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Star => write!(f, "*"),
            Kind::Arrow(domain, codomain) => match **domain {
                Kind::Arrow(..) => write!(f, "({domain}) -> {codomain}"),
                _ => write!(f, "{domain} -> {codomain}"),
            },
            Kind::Row(fields) => write!(f, "row{{{}}}", fields.join(", ")),
        }
    }
}

impl Display for CoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreType::TypeVariable(index) => write!(f, "'{index}"),
            CoreType::Arrow(domain, codomain) => match **domain {
                CoreType::Arrow(..) | CoreType::Forall(..) => write!(f, "({domain}) -> {codomain}"),
                _ => write!(f, "{domain} -> {codomain}"),
            },
            CoreType::Forall(kind, body) => write!(f, "forall {kind}. {body}"),
            CoreType::TypeConstructor { name, kind, args } => match kind {
                Kind::Row(fields) => {
                    let fields = fields
                        .iter()
                        .zip(args)
                        .map(|(field, ty)| format!("{field}: {ty}"))
                        .collect::<Vec<_>>();
                    write!(f, "{name}{{{}}}", fields.join(", "))
                }
                _ => {
                    let args = args.iter().map(|a| a.to_string()).collect::<Vec<_>>();
                    write!(f, "{name}<{}>", args.join(", "))
                }
            },
            CoreType::BaseType(name) => write!(f, "{name}"),
            CoreType::Mu(body) => write!(f, "mu. {body}"),
            CoreType::EffectType(effects, result) => {
                let effects = effects.iter().map(|e| e.to_string()).collect::<Vec<_>>();
                write!(f, "!{{{}}} {result}", effects.join(", "))
            }
        }
    }
}

impl Display for CoreTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut formatter = Formatter::new();
        format_term(self, &mut formatter, false);
        write!(f, "{}", formatter.finish())
    }
}

/// `atomic` asks for parentheses around anything that is not a single token.
fn format_term(term: &CoreTerm, fmt: &mut Formatter, atomic: bool) {
    match term {
        CoreTerm::Located(_, inner) => format_term(inner, fmt, atomic),
        CoreTerm::Variable(index) => {
            let _ = write!(fmt.buffer, "#{index}");
        }
        CoreTerm::Literal(value) => {
            let _ = write!(fmt.buffer, "{value}");
        }
        CoreTerm::Abstraction { param_ty, body } => {
            parenthesized(fmt, atomic, |fmt| {
                let _ = write!(fmt.buffer, "\\{param_ty}. ");
                format_term(body, fmt, false);
            });
        }
        CoreTerm::TypeAbstraction { kind, body } => {
            parenthesized(fmt, atomic, |fmt| {
                let _ = write!(fmt.buffer, "/\\{kind}. ");
                format_term(body, fmt, false);
            });
        }
        CoreTerm::Application(func, arg) => {
            parenthesized(fmt, atomic, |fmt| {
                let func_is_app = matches!(strip(func), CoreTerm::Application(..));
                format_term(func, fmt, !func_is_app);
                fmt.write_str(" ");
                format_term(arg, fmt, true);
            });
        }
        CoreTerm::TypeApplication(inner, ty) => {
            format_term(inner, fmt, true);
            let _ = write!(fmt.buffer, " [{ty}]");
        }
        CoreTerm::Let(value, body) => {
            parenthesized(fmt, atomic, |fmt| {
                fmt.write_str("let ");
                format_term(value, fmt, false);
                fmt.write_str(" in");
                fmt.write_newline();
                fmt.write_indent();
                format_term(body, fmt, false);
            });
        }
        CoreTerm::GuardedFix {
            members,
            guard,
            body,
            ..
        } => {
            fmt.write_str("fix[");
            match guard {
                FixGuard::Fuel(fuel) => {
                    fmt.write_str("fuel ");
                    format_term(fuel, fmt, true);
                }
                FixGuard::Measure(measures) => {
                    fmt.write_str("measure ");
                    for (i, measure) in measures.iter().enumerate() {
                        if i > 0 {
                            fmt.write_str(", ");
                        }
                        format_term(measure, fmt, true);
                    }
                }
            }
            fmt.write_str("; ");
            format_members(members, fmt);
            fmt.write_str("] ");
            format_term(body, fmt, true);
        }
        CoreTerm::Fold {
            members,
            decreasing,
            body,
            ..
        } => {
            fmt.write_str("fold[");
            for (i, (member, position)) in members.iter().zip(decreasing).enumerate() {
                if i > 0 {
                    fmt.write_str(", ");
                }
                let _ = write!(fmt.buffer, "{}/{} @{position}", member.name, member.arity);
            }
            fmt.write_str("] ");
            format_term(body, fmt, true);
        }
        CoreTerm::Constructor { name, args, .. } => {
            fmt.write_str(name);
            fmt.write_str("(");
            format_list(args, fmt);
            fmt.write_str(")");
        }
        CoreTerm::Match { scrutinee, cases } => {
            fmt.write_str("match ");
            format_term(scrutinee, fmt, true);
            fmt.write_str(" {");
            fmt.indent();
            for case in cases {
                fmt.write_newline();
                fmt.write_indent();
                match &case.pattern {
                    CasePattern::Constructor { name, arity } => {
                        let _ = write!(fmt.buffer, "{name}/{arity}");
                    }
                    CasePattern::Literal(value) => {
                        let _ = write!(fmt.buffer, "{value}");
                    }
                    CasePattern::Wildcard => fmt.write_str("_"),
                }
                fmt.write_str(" => ");
                format_term(&case.body, fmt, false);
            }
            fmt.dedent();
            fmt.write_newline();
            fmt.write_indent();
            fmt.write_str("}");
        }
        CoreTerm::Primitive { op, args } => format_primitive(op, args, fmt, atomic),
        CoreTerm::Perform {
            effect,
            target,
            fallback,
        } => {
            parenthesized(fmt, atomic && fallback.is_some(), |fmt| {
                let _ = write!(fmt.buffer, "perform {effect}(");
                format_term(target, fmt, false);
                fmt.write_str(")");
                if let Some(fallback) = fallback {
                    fmt.write_str(" ?? ");
                    format_term(fallback, fmt, true);
                }
            });
        }
    }
}

fn format_primitive(op: &PrimOp, args: &[CoreTerm], fmt: &mut Formatter, atomic: bool) {
    match (op, args) {
        (PrimOp::Binary(kind), [left, right]) => {
            parenthesized(fmt, atomic, |fmt| {
                format_term(left, fmt, true);
                let _ = write!(fmt.buffer, " {} ", kind.symbol());
                format_term(right, fmt, true);
            });
        }
        (PrimOp::Unary(kind), [operand]) => {
            let _ = write!(fmt.buffer, "{}(", kind.name());
            format_term(operand, fmt, false);
            fmt.write_str(")");
        }
        (PrimOp::Field(name), [object]) => {
            format_term(object, fmt, true);
            let _ = write!(fmt.buffer, ".{name}");
        }
        (PrimOp::MakeArray, elements) => {
            fmt.write_str("[");
            format_list(elements, fmt);
            fmt.write_str("]");
        }
        (PrimOp::MakeObject(names), values) if names.len() == values.len() => {
            fmt.write_str("{");
            for (i, (name, value)) in names.iter().zip(values).enumerate() {
                if i > 0 {
                    fmt.write_str(", ");
                }
                let _ = write!(fmt.buffer, "{name}: ");
                format_term(value, fmt, false);
            }
            fmt.write_str("}");
        }
        (op, args) => {
            let _ = write!(fmt.buffer, "prim<{op:?}>(");
            format_list(args, fmt);
            fmt.write_str(")");
        }
    }
}

fn format_members(members: &[FixMember], fmt: &mut Formatter) {
    for (i, member) in members.iter().enumerate() {
        if i > 0 {
            fmt.write_str(", ");
        }
        let _ = write!(fmt.buffer, "{}/{}", member.name, member.arity);
    }
}

fn format_list(items: &[CoreTerm], fmt: &mut Formatter) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            fmt.write_str(", ");
        }
        format_term(item, fmt, false);
    }
}

fn parenthesized(fmt: &mut Formatter, parens: bool, inner: impl FnOnce(&mut Formatter)) {
    if parens {
        fmt.write_str("(");
    }
    inner(fmt);
    if parens {
        fmt.write_str(")");
    }
}

fn strip(term: &CoreTerm) -> &CoreTerm {
    match term {
        CoreTerm::Located(_, inner) => strip(inner),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{BinOpKind, Literal};
    use crate::core::{CoreTerm, CoreType, Kind, PrimOp};

    #[test]
    fn test_format_let_and_index() {
        let term = CoreTerm::let_in(
            CoreTerm::Literal(Literal::Int(5)),
            CoreTerm::prim(
                PrimOp::Binary(BinOpKind::Add),
                vec![CoreTerm::Variable(0), CoreTerm::Literal(Literal::Int(1))],
            ),
        );
        assert_eq!(term.to_string(), "let 5 in\n#0 + 1");
    }

    #[test]
    fn test_format_application_is_left_nested() {
        let term = CoreTerm::app(
            CoreTerm::app(CoreTerm::Variable(1), CoreTerm::Variable(0)),
            CoreTerm::Literal(Literal::Null),
        );
        assert_eq!(term.to_string(), "#1 #0 null");
    }

    #[test]
    fn test_format_types() {
        let ty = CoreType::Forall(
            Kind::Star,
            Box::new(CoreType::arrow(
                CoreType::arrow(CoreType::TypeVariable(0), CoreType::base("Int")),
                CoreType::TypeVariable(0),
            )),
        );
        assert_eq!(ty.to_string(), "forall *. ('0 -> Int) -> '0");
    }

    #[test]
    fn test_format_lambda() {
        let term = CoreTerm::lambda(CoreType::base("Int"), CoreTerm::Variable(0));
        assert_eq!(term.to_string(), "\\Int. #0");
    }
}
