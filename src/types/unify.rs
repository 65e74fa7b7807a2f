use std::fmt;

use super::subst::Substitution;
use super::ty::{FieldType, Type, TypeVar};

/// How many times a recursive type may be unfolded while unifying.
const UNFOLD_FUEL: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub enum UnifyError {
    Mismatch { expected: Type, found: Type },
    OccursCheck { var: TypeVar, ty: Type },
    MissingField { field: String, ty: Type },
}

impl fmt::Display for UnifyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UnifyError::Mismatch { expected, found } => {
                write!(
                    f,
                    "type mismatch: expected {}, found {}",
                    expected.pretty(),
                    found.pretty()
                )
            }
            UnifyError::OccursCheck { var, ty } => {
                write!(
                    f,
                    "occurs check: cannot construct infinite type {} = {}",
                    Type::Var(var.clone()).pretty(),
                    ty.pretty()
                )
            }
            UnifyError::MissingField { field, ty } => {
                write!(f, "field `{field}` is missing from {}", ty.pretty())
            }
        }
    }
}

/// Check if a type variable occurs within a type (occurs check).
///
/// The occurs check prevents the creation of infinite types by ensuring
/// we never create a substitution like `'t0 = ('t0) -> Int`. Recursive
/// types must be written explicitly as `mu`.
fn occurs_in(var: &TypeVar, ty: &Type) -> bool {
    match ty {
        Type::Unit | Type::Bool | Type::Int | Type::Float | Type::Text | Type::Unknown => false,
        Type::Var(v) => v == var,
        Type::Array(elem) => occurs_in(var, elem),
        Type::Object(fields) => fields.values().any(|f| occurs_in(var, &f.ty)),
        Type::Function { params, ret, .. } => {
            params.iter().any(|p| occurs_in(var, p)) || occurs_in(var, ret)
        }
        Type::Forall(vars, body) => !vars.contains(var) && occurs_in(var, body),
        Type::Effect(_, inner) => occurs_in(var, inner),
        Type::Recursive(bound, body) => bound != var && occurs_in(var, body),
        Type::Dependent { param_ty, ret, .. } => occurs_in(var, param_ty) || occurs_in(var, ret),
    }
}

/// Unify two types, finding a substitution that makes them equal.
///
/// This is the core of Hindley-Milner inference, extended for the shapes a
/// configuration language needs:
///
/// ```text
/// Unify(?, T)            = ∅                  // gradual: Unknown fits anything
/// Unify(readEnv<T>, U)   = Unify(T, U)        // effects do not change shape
/// Unify('t0, T)          = [t0 := T]          // unless 't0 occurs in T
/// Unify((A1..An) -> R, (B1..Bn) -> S)
///                        = Unify(R, S) ∘ Unify(An, Bn) ∘ ... ∘ Unify(A1, B1)
/// Unify({a: A, b?: B}, {a: A'})
///                        = Unify(A, A')       // absent fields must be optional
/// Unify(mu v. T, U)      = Unify(T[v := mu v. T], U)
/// ```
///
/// Substitutions are threaded left to right: every step sees the types with
/// the bindings of all previous steps applied, so the composition is
/// idempotent.
///
/// Function purity is not part of unification; a pure function may be passed
/// wherever an effectful one is expected and vice versa.
pub fn unify(t1: &Type, t2: &Type) -> Result<Substitution, UnifyError> {
    unify_with_fuel(t1, t2, UNFOLD_FUEL)
}

fn unify_with_fuel(t1: &Type, t2: &Type, fuel: usize) -> Result<Substitution, UnifyError> {
    match (t1, t2) {
        (Type::Unknown, _) | (_, Type::Unknown) => Ok(Substitution::empty()),

        (Type::Effect(_, inner), other) | (other, Type::Effect(_, inner)) => {
            unify_with_fuel(inner, other, fuel)
        }

        (Type::Forall(_, body), other) | (other, Type::Forall(_, body)) => {
            unify_with_fuel(body, other, fuel)
        }

        (Type::Unit, Type::Unit)
        | (Type::Bool, Type::Bool)
        | (Type::Int, Type::Int)
        | (Type::Float, Type::Float)
        | (Type::Text, Type::Text) => Ok(Substitution::empty()),

        (Type::Var(v1), Type::Var(v2)) if v1 == v2 => Ok(Substitution::empty()),
        (Type::Var(v), t) | (t, Type::Var(v)) => {
            if occurs_in(v, t) {
                Err(UnifyError::OccursCheck {
                    var: v.clone(),
                    ty: t.clone(),
                })
            } else {
                Ok(Substitution::singleton(v.clone(), t.clone()))
            }
        }

        (Type::Array(a), Type::Array(b)) => unify_with_fuel(a, b, fuel),

        (
            Type::Function {
                params: p1,
                ret: r1,
                ..
            },
            Type::Function {
                params: p2,
                ret: r2,
                ..
            },
        ) if p1.len() == p2.len() => {
            let pairs = p1.iter().zip(p2.iter()).chain(std::iter::once((&**r1, &**r2)));
            unify_pairs(pairs, fuel)
        }

        (
            Type::Dependent {
                param_ty, ret: r1, ..
            },
            Type::Function {
                params, ret: r2, ..
            },
        )
        | (
            Type::Function {
                params, ret: r2, ..
            },
            Type::Dependent {
                param_ty, ret: r1, ..
            },
        ) if params.len() == 1 => {
            let pairs = [(&**param_ty, &params[0]), (&**r1, &**r2)];
            unify_pairs(pairs.into_iter(), fuel)
        }

        (
            Type::Dependent {
                param_ty: a1,
                ret: r1,
                ..
            },
            Type::Dependent {
                param_ty: a2,
                ret: r2,
                ..
            },
        ) => unify_pairs([(&**a1, &**a2), (&**r1, &**r2)].into_iter(), fuel),

        (Type::Object(left), Type::Object(right)) => {
            for (name, field) in left {
                if !right.contains_key(name) && !field.may_be_absent() {
                    return Err(UnifyError::MissingField {
                        field: name.clone(),
                        ty: t2.clone(),
                    });
                }
            }
            for (name, field) in right {
                if !left.contains_key(name) && !field.may_be_absent() {
                    return Err(UnifyError::MissingField {
                        field: name.clone(),
                        ty: t1.clone(),
                    });
                }
            }
            let shared = left
                .iter()
                .filter_map(|(name, l)| right.get(name).map(|r| (&l.ty, &r.ty)));
            unify_pairs(shared, fuel)
        }

        (Type::Recursive(v1, b1), Type::Recursive(v2, b2)) if v1 == v2 && b1 == b2 => {
            Ok(Substitution::empty())
        }
        (Type::Recursive(var, body), other) | (other, Type::Recursive(var, body))
            if fuel > 0 =>
        {
            let unfolded = unfold(var, body);
            unify_with_fuel(&unfolded, other, fuel - 1)
        }

        _ => Err(UnifyError::Mismatch {
            expected: t1.clone(),
            found: t2.clone(),
        }),
    }
}

fn unify_pairs<'a>(
    pairs: impl Iterator<Item = (&'a Type, &'a Type)>,
    fuel: usize,
) -> Result<Substitution, UnifyError> {
    let mut subst = Substitution::empty();
    for (a, b) in pairs {
        let step = unify_with_fuel(&subst.apply(a), &subst.apply(b), fuel)?;
        subst = step.compose(&subst);
    }
    Ok(subst)
}

/// One unrolling of `mu var. body`.
pub fn unfold(var: &TypeVar, body: &Type) -> Type {
    let whole = Type::Recursive(var.clone(), Box::new(body.clone()));
    Substitution::singleton(var.clone(), whole).apply(body)
}

/// Width check of an object against the fields an annotation requires.
pub(super) fn unify_width(
    value_fields: &indexmap::IndexMap<String, FieldType>,
    expected_fields: &indexmap::IndexMap<String, FieldType>,
) -> Result<Substitution, UnifyError> {
    for (name, field) in expected_fields {
        if !value_fields.contains_key(name) && !field.may_be_absent() {
            return Err(UnifyError::MissingField {
                field: name.clone(),
                ty: Type::Object(value_fields.clone()),
            });
        }
    }
    let shared = expected_fields
        .iter()
        .filter_map(|(name, e)| value_fields.get(name).map(|v| (&v.ty, &e.ty)));
    unify_pairs(shared, UNFOLD_FUEL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::EffectKind;

    #[test]
    fn test_unify_identical_int() {
        assert_eq!(unify(&Type::Int, &Type::Int), Ok(Substitution::empty()));
    }

    #[test]
    fn test_unify_var_with_concrete() {
        let var = TypeVar::new(0);
        let result = unify(&Type::Var(var.clone()), &Type::Int);
        assert_eq!(result, Ok(Substitution::singleton(var, Type::Int)));
    }

    #[test]
    fn test_unify_same_var() {
        let var = TypeVar::new(0);
        let result = unify(&Type::Var(var.clone()), &Type::Var(var));
        assert_eq!(result, Ok(Substitution::empty()));
    }

    #[test]
    fn test_unify_unknown_is_permissive() {
        let var = TypeVar::new(0);
        assert_eq!(unify(&Type::Unknown, &Type::Text), Ok(Substitution::empty()));
        assert_eq!(
            unify(&Type::Var(var), &Type::Unknown),
            Ok(Substitution::empty())
        );
    }

    #[test]
    fn test_unify_occurs_check() {
        let var = TypeVar::new(0);
        let ty = Type::func(vec![Type::Var(var.clone())], Type::Int);
        let result = unify(&Type::Var(var), &ty);
        assert!(matches!(result, Err(UnifyError::OccursCheck { .. })));
    }

    #[test]
    fn test_unify_function_types_with_vars() {
        let var1 = TypeVar::new(0);
        let var2 = TypeVar::new(1);
        let t1 = Type::func(vec![Type::Var(var1.clone())], Type::Int);
        let t2 = Type::func(vec![Type::Text], Type::Var(var2.clone()));

        let result = unify(&t1, &t2).unwrap();

        assert_eq!(result.apply(&Type::Var(var1)), Type::Text);
        assert_eq!(result.apply(&Type::Var(var2)), Type::Int);
    }

    #[test]
    fn test_unify_threads_substitution() {
        let a = TypeVar::new(0);
        let b = TypeVar::new(1);
        let t1 = Type::func(vec![Type::Var(a.clone()), Type::Var(a.clone())], Type::Var(b.clone()));
        let t2 = Type::func(vec![Type::Int, Type::Var(b.clone())], Type::Int);

        let result = unify(&t1, &t2).unwrap();
        assert_eq!(result.apply(&Type::Var(a)), Type::Int);
        assert_eq!(result.apply(&Type::Var(b)), Type::Int);
    }

    #[test]
    fn test_unify_arity_mismatch() {
        let t1 = Type::func(vec![Type::Int], Type::Int);
        let t2 = Type::func(vec![Type::Int, Type::Int], Type::Int);
        assert!(matches!(unify(&t1, &t2), Err(UnifyError::Mismatch { .. })));
    }

    #[test]
    fn test_unify_effect_is_transparent() {
        let effect = Type::Effect(EffectKind::ReadEnv, Box::new(Type::Text));
        assert_eq!(unify(&effect, &Type::Text), Ok(Substitution::empty()));
    }

    #[test]
    fn test_unify_objects_require_fields() {
        let t1 = Type::object(vec![("a", Type::Int)]);
        let t2 = Type::object(vec![("a", Type::Int), ("b", Type::Int)]);
        assert!(matches!(
            unify(&t1, &t2),
            Err(UnifyError::MissingField { field, .. }) if field == "b"
        ));
    }

    #[test]
    fn test_unify_objects_optional_field_may_be_absent() {
        let t1 = Type::object(vec![("a", Type::var(0))]);
        let mut t2 = Type::object(vec![("a", Type::Int)]);
        if let Type::Object(fields) = &mut t2 {
            fields.insert("b".to_string(), FieldType::optional(Type::Text));
        }
        let result = unify(&t1, &t2).unwrap();
        assert_eq!(result.apply(&Type::var(0)), Type::Int);
    }

    #[test]
    fn test_unify_recursive_unfolds() {
        let v = TypeVar::with_name(9, "list".to_string());
        let list = Type::Recursive(v.clone(), Box::new(Type::array(Type::Var(v))));
        let result = unify(&list, &Type::array(Type::var(0)));
        assert!(result.is_ok());
    }

    #[test]
    fn test_unify_dependent_with_function() {
        let dep = Type::Dependent {
            param: "n".to_string(),
            param_ty: Box::new(Type::Int),
            ret: Box::new(Type::var(0)),
        };
        let func = Type::func(vec![Type::var(1)], Type::Text);
        let result = unify(&dep, &func).unwrap();
        assert_eq!(result.apply(&Type::var(1)), Type::Int);
        assert_eq!(result.apply(&Type::var(0)), Type::Text);
    }

    #[test]
    fn test_unify_mismatch_concrete() {
        let result = unify(&Type::Int, &Type::Text);
        assert!(matches!(result, Err(UnifyError::Mismatch { .. })));
    }
}
