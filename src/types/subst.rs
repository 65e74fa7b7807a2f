use std::collections::HashMap;

use super::ty::{FieldType, Type, TypeVar};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Substitution(pub HashMap<TypeVar, Type>);

impl Substitution {
    pub fn empty() -> Self {
        Substitution(HashMap::new())
    }

    pub fn singleton(var: TypeVar, ty: Type) -> Self {
        let mut map = HashMap::new();
        map.insert(var, ty);
        Substitution(map)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn apply(&self, ty: &Type) -> Type {
        if self.0.is_empty() {
            return ty.clone();
        }
        match ty {
            Type::Unit | Type::Bool | Type::Int | Type::Float | Type::Text | Type::Unknown => {
                ty.clone()
            }
            Type::Var(v) => self.0.get(v).cloned().unwrap_or_else(|| ty.clone()),
            Type::Array(elem) => Type::Array(Box::new(self.apply(elem))),
            Type::Object(fields) => Type::Object(
                fields
                    .iter()
                    .map(|(name, field)| {
                        (
                            name.clone(),
                            FieldType {
                                ty: self.apply(&field.ty),
                                optional: field.optional,
                                default: field.default.clone(),
                            },
                        )
                    })
                    .collect(),
            ),
            Type::Function {
                params,
                ret,
                purity,
            } => Type::Function {
                params: params.iter().map(|p| self.apply(p)).collect(),
                ret: Box::new(self.apply(ret)),
                purity: purity.clone(),
            },
            Type::Forall(vars, body) => {
                let inner = self.without(vars);
                Type::Forall(vars.clone(), Box::new(inner.apply(body)))
            }
            Type::Effect(kind, inner) => Type::Effect(*kind, Box::new(self.apply(inner))),
            Type::Recursive(var, body) => {
                let inner = self.without(std::slice::from_ref(var));
                Type::Recursive(var.clone(), Box::new(inner.apply(body)))
            }
            Type::Dependent {
                param,
                param_ty,
                ret,
            } => Type::Dependent {
                param: param.clone(),
                param_ty: Box::new(self.apply(param_ty)),
                ret: Box::new(self.apply(ret)),
            },
        }
    }

    /// Copy of this substitution that leaves `vars` alone.
    fn without(&self, vars: &[TypeVar]) -> Substitution {
        Substitution(
            self.0
                .iter()
                .filter(|(v, _)| !vars.contains(v))
                .map(|(v, t)| (v.clone(), t.clone()))
                .collect(),
        )
    }

    /// `self.compose(earlier)` behaves like applying `earlier` first and then
    /// `self`.
    pub fn compose(&self, earlier: &Substitution) -> Substitution {
        let mut result: HashMap<TypeVar, Type> = earlier
            .0
            .iter()
            .map(|(var, ty)| (var.clone(), self.apply(ty)))
            .collect();

        for (var, ty) in &self.0 {
            if !result.contains_key(var) {
                result.insert(var.clone(), ty.clone());
            }
        }

        Substitution(result)
    }

    pub fn insert(&mut self, var: TypeVar, ty: Type) {
        self.0.insert(var, ty);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_substitution() {
        let subst = Substitution::empty();
        assert_eq!(subst.apply(&Type::Int), Type::Int);
    }

    #[test]
    fn test_singleton_substitution() {
        let var = TypeVar::new(0);
        let subst = Substitution::singleton(var.clone(), Type::Int);
        assert_eq!(subst.apply(&Type::Var(var)), Type::Int);
    }

    #[test]
    fn test_apply_to_function() {
        let var = TypeVar::new(0);
        let subst = Substitution::singleton(var.clone(), Type::Int);
        let ty = Type::func(vec![Type::Var(var)], Type::Text);
        assert_eq!(subst.apply(&ty), Type::func(vec![Type::Int], Type::Text));
    }

    #[test]
    fn test_apply_to_object_fields() {
        let var = TypeVar::new(0);
        let subst = Substitution::singleton(var.clone(), Type::Bool);
        let ty = Type::object(vec![("flag", Type::Var(var))]);
        assert_eq!(subst.apply(&ty), Type::object(vec![("flag", Type::Bool)]));
    }

    #[test]
    fn test_apply_respects_forall_binders() {
        let var = TypeVar::new(0);
        let subst = Substitution::singleton(var.clone(), Type::Int);
        let ty = Type::Forall(vec![var.clone()], Box::new(Type::Var(var)));
        assert_eq!(subst.apply(&ty), ty);
    }

    #[test]
    fn test_compose_substitutions() {
        let var1 = TypeVar::new(0);
        let var2 = TypeVar::new(1);

        let first = Substitution::singleton(var1.clone(), Type::Var(var2.clone()));
        let second = Substitution::singleton(var2, Type::Int);

        let composed = second.compose(&first);
        assert_eq!(composed.apply(&Type::Var(var1)), Type::Int);
    }

    #[test]
    fn test_compose_keeps_earlier_binding() {
        let var = TypeVar::new(0);

        let first = Substitution::singleton(var.clone(), Type::Int);
        let second = Substitution::singleton(var.clone(), Type::Text);

        let result = second.compose(&first);
        assert_eq!(result.apply(&Type::Var(var)), Type::Int);
    }
}
