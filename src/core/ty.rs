use crate::types::{Purity, Type, TypeVar};

use super::{CoreType, Kind};

/// Translates a checker type into a core type.
///
/// `scope` lists the type variables bound by enclosing type abstractions,
/// innermost last. Variables outside the scope, and `Unknown`, become `Dyn`.
/// Multi-parameter functions are curried; dependent functions lose their
/// dependency.
pub fn translate_type(ty: &Type, scope: &[TypeVar]) -> CoreType {
    let mut scope = scope.to_vec();
    translate(ty, &mut scope)
}

fn translate(ty: &Type, scope: &mut Vec<TypeVar>) -> CoreType {
    match ty {
        Type::Unit => CoreType::base("Unit"),
        Type::Bool => CoreType::base("Bool"),
        Type::Int => CoreType::base("Int"),
        Type::Float => CoreType::base("Float"),
        Type::Text => CoreType::base("Text"),
        Type::Unknown => CoreType::dynamic(),
        Type::Var(var) => match scope.iter().rev().position(|v| v == var) {
            Some(index) => CoreType::TypeVariable(index),
            None => CoreType::dynamic(),
        },
        Type::Array(elem) => CoreType::TypeConstructor {
            name: "Array".to_string(),
            kind: Kind::Arrow(Box::new(Kind::Star), Box::new(Kind::Star)),
            args: vec![translate(elem, scope)],
        },
        Type::Object(fields) => CoreType::TypeConstructor {
            name: "Object".to_string(),
            kind: Kind::Row(fields.keys().cloned().collect()),
            args: fields.values().map(|f| translate(&f.ty, scope)).collect(),
        },
        Type::Function {
            params,
            ret,
            purity,
        } => {
            let mut result = translate(ret, scope);
            if let Purity::Effectful(kinds) = purity {
                result = CoreType::EffectType(kinds.clone(), Box::new(result));
            }
            if params.is_empty() {
                return CoreType::arrow(CoreType::base("Unit"), result);
            }
            params.iter().rev().fold(result, |acc, param| {
                CoreType::arrow(translate(param, scope), acc)
            })
        }
        Type::Forall(vars, body) => {
            let mark = scope.len();
            scope.extend(vars.iter().cloned());
            let mut result = translate(body, scope);
            scope.truncate(mark);
            for _ in vars {
                result = CoreType::Forall(Kind::Star, Box::new(result));
            }
            result
        }
        Type::Effect(kind, inner) => CoreType::EffectType(vec![*kind], Box::new(translate(inner, scope))),
        Type::Recursive(var, body) => {
            scope.push(var.clone());
            let body = translate(body, scope);
            scope.pop();
            CoreType::Mu(Box::new(body))
        }
        Type::Dependent { param_ty, ret, .. } => {
            CoreType::arrow(translate(param_ty, scope), translate(ret, scope))
        }
    }
}

/// Matches `pattern` against `instance`, recording what each of `vars` stands
/// for. Used to recover the type arguments of an instantiated polymorphic
/// binder.
pub(super) fn instantiation(vars: &[TypeVar], pattern: &Type, instance: &Type) -> Vec<Option<Type>> {
    let mut found = vec![None; vars.len()];
    match_type(vars, pattern, instance, &mut found);
    found
}

fn match_type(vars: &[TypeVar], pattern: &Type, instance: &Type, found: &mut [Option<Type>]) {
    match (pattern, instance.strip_effects()) {
        (Type::Var(var), instance) => {
            if let Some(index) = vars.iter().position(|v| v == var) {
                if found[index].is_none() {
                    found[index] = Some(instance.clone());
                }
            }
        }
        (Type::Array(p), Type::Array(i)) => match_type(vars, p, i, found),
        (Type::Object(p), Type::Object(i)) => {
            for (name, field) in p {
                if let Some(other) = i.get(name) {
                    match_type(vars, &field.ty, &other.ty, found);
                }
            }
        }
        (
            Type::Function {
                params: pp,
                ret: pr,
                ..
            },
            Type::Function {
                params: ip,
                ret: ir,
                ..
            },
        ) => {
            for (p, i) in pp.iter().zip(ip) {
                match_type(vars, p, i, found);
            }
            match_type(vars, pr, ir, found);
        }
        (Type::Effect(_, p), i) => match_type(vars, p, i, found),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_curried_function() {
        let ty = Type::func(vec![Type::Int, Type::Text], Type::Bool);
        assert_eq!(
            translate_type(&ty, &[]),
            CoreType::arrow(
                CoreType::base("Int"),
                CoreType::arrow(CoreType::base("Text"), CoreType::base("Bool"))
            )
        );
    }

    #[test]
    fn test_translate_forall_uses_indices() {
        let a = TypeVar::new(0);
        let b = TypeVar::new(1);
        let ty = Type::Forall(
            vec![a.clone(), b.clone()],
            Box::new(Type::func(vec![Type::Var(a)], Type::Var(b))),
        );
        assert_eq!(
            translate_type(&ty, &[]),
            CoreType::Forall(
                Kind::Star,
                Box::new(CoreType::Forall(
                    Kind::Star,
                    Box::new(CoreType::arrow(
                        CoreType::TypeVariable(1),
                        CoreType::TypeVariable(0)
                    ))
                ))
            )
        );
    }

    #[test]
    fn test_free_variable_is_dynamic() {
        assert_eq!(translate_type(&Type::var(7), &[]), CoreType::dynamic());
    }

    #[test]
    fn test_object_row_kind() {
        let ty = Type::object(vec![("host", Type::Text), ("port", Type::Int)]);
        let CoreType::TypeConstructor { kind, args, .. } = translate_type(&ty, &[]) else {
            panic!("expected constructor");
        };
        assert_eq!(kind, Kind::Row(vec!["host".to_string(), "port".to_string()]));
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_instantiation_recovers_arguments() {
        let a = TypeVar::new(0);
        let pattern = Type::func(vec![Type::Var(a.clone())], Type::Var(a.clone()));
        let instance = Type::func(vec![Type::Int], Type::Int);
        assert_eq!(instantiation(&[a], &pattern, &instance), vec![Some(Type::Int)]);
    }
}
