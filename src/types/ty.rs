use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ast::{EffectKind, Literal};

/// A unification variable.
///
/// Identity is the `id` alone; `name` is only used for printing and `level`
/// records the `let` nesting depth the variable was created at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeVar {
    #[serde(rename = "1")]
    pub id: usize,
    #[serde(rename = "2", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "3", default)]
    pub level: usize,
}

impl TypeVar {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            name: None,
            level: 0,
        }
    }

    pub fn at_level(id: usize, level: usize) -> Self {
        Self {
            id,
            name: None,
            level,
        }
    }

    pub fn with_name(id: usize, name: String) -> Self {
        Self {
            id,
            name: Some(name),
            level: 0,
        }
    }
}

impl PartialEq for TypeVar {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeVar {}

impl Hash for TypeVar {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Which side effects a function body performs directly.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Purity {
    #[default]
    Pure,
    Effectful(Vec<EffectKind>),
}

impl Purity {
    pub fn from_effects(mut effects: Vec<EffectKind>) -> Self {
        effects.sort();
        effects.dedup();
        if effects.is_empty() {
            Purity::Pure
        } else {
            Purity::Effectful(effects)
        }
    }
}

/// Field of an object type. Optional fields may be absent from a value;
/// a default fills the field in when an annotated binding lacks it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldType {
    #[serde(rename = "1")]
    pub ty: Type,
    #[serde(rename = "2", default)]
    pub optional: bool,
    #[serde(rename = "3", default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Literal>,
}

impl FieldType {
    pub fn required(ty: Type) -> Self {
        Self {
            ty,
            optional: false,
            default: None,
        }
    }

    pub fn optional(ty: Type) -> Self {
        Self {
            ty,
            optional: true,
            default: None,
        }
    }

    pub fn with_default(ty: Type, default: Literal) -> Self {
        Self {
            ty,
            optional: false,
            default: Some(default),
        }
    }

    /// Whether a value may omit this field.
    pub fn may_be_absent(&self) -> bool {
        self.optional || self.default.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Unit,
    Bool,
    Int,
    Float,
    Text,
    Array(Box<Type>),
    Object(IndexMap<String, FieldType>),
    Function {
        params: Vec<Type>,
        ret: Box<Type>,
        purity: Purity,
    },
    Var(TypeVar),
    Forall(Vec<TypeVar>, Box<Type>),
    /// Result of an effect request; transparent to unification.
    Effect(EffectKind, Box<Type>),
    /// `mu v. body`, where occurrences of `v` in `body` refer back to the
    /// whole type.
    Recursive(TypeVar, Box<Type>),
    Dependent {
        param: String,
        param_ty: Box<Type>,
        ret: Box<Type>,
    },
    /// The gradual "don't know": compatible with every type.
    Unknown,
}

impl Type {
    pub fn func(params: Vec<Type>, ret: Type) -> Self {
        Type::Function {
            params,
            ret: Box::new(ret),
            purity: Purity::Pure,
        }
    }

    pub fn array(elem: Type) -> Self {
        Type::Array(Box::new(elem))
    }

    pub fn object(fields: Vec<(&str, Type)>) -> Self {
        Type::Object(
            fields
                .into_iter()
                .map(|(name, ty)| (name.to_string(), FieldType::required(ty)))
                .collect(),
        )
    }

    pub fn var(id: usize) -> Self {
        Type::Var(TypeVar::new(id))
    }

    /// Strips effect wrappers, which never change the shape of a value.
    pub fn strip_effects(&self) -> &Type {
        match self {
            Type::Effect(_, inner) => inner.strip_effects(),
            other => other,
        }
    }

    /// The body of a `Forall`, or the type itself.
    pub fn monotype(&self) -> &Type {
        match self {
            Type::Forall(_, body) => body.monotype(),
            other => other,
        }
    }

    pub fn free_type_vars(&self) -> HashSet<TypeVar> {
        let mut set = HashSet::new();
        self.collect_free(&mut set);
        set
    }

    fn collect_free(&self, set: &mut HashSet<TypeVar>) {
        match self {
            Type::Unit | Type::Bool | Type::Int | Type::Float | Type::Text | Type::Unknown => {}
            Type::Var(v) => {
                set.insert(v.clone());
            }
            Type::Array(elem) => elem.collect_free(set),
            Type::Object(fields) => {
                for field in fields.values() {
                    field.ty.collect_free(set);
                }
            }
            Type::Function { params, ret, .. } => {
                for param in params {
                    param.collect_free(set);
                }
                ret.collect_free(set);
            }
            Type::Forall(vars, body) => {
                let mut inner = body.free_type_vars();
                for var in vars {
                    inner.remove(var);
                }
                set.extend(inner);
            }
            Type::Effect(_, inner) => inner.collect_free(set),
            Type::Recursive(var, body) => {
                let mut inner = body.free_type_vars();
                inner.remove(var);
                set.extend(inner);
            }
            Type::Dependent { param_ty, ret, .. } => {
                param_ty.collect_free(set);
                ret.collect_free(set);
            }
        }
    }

    /// Replaces every free type variable with `Unknown`.
    pub fn erase_unresolved(&self) -> Type {
        let free = self.free_type_vars();
        if free.is_empty() {
            return self.clone();
        }
        let subst = super::Substitution(free.into_iter().map(|v| (v, Type::Unknown)).collect());
        subst.apply(self)
    }

    pub fn pretty(&self) -> String {
        match self {
            Type::Unit => "Unit".to_string(),
            Type::Bool => "Bool".to_string(),
            Type::Int => "Int".to_string(),
            Type::Float => "Float".to_string(),
            Type::Text => "Text".to_string(),
            Type::Unknown => "?".to_string(),
            Type::Var(v) => pretty_var(v),
            Type::Array(elem) => format!("[{}]", elem.pretty()),
            Type::Object(fields) => {
                let fields = fields
                    .iter()
                    .map(|(name, field)| {
                        let marker = if field.optional { "?" } else { "" };
                        match &field.default {
                            Some(default) => {
                                format!("{name}{marker}: {} = {default}", field.ty.pretty())
                            }
                            None => format!("{name}{marker}: {}", field.ty.pretty()),
                        }
                    })
                    .collect::<Vec<_>>();
                format!("{{{}}}", fields.join(", "))
            }
            Type::Function {
                params,
                ret,
                purity,
            } => {
                let params = params.iter().map(Type::pretty).collect::<Vec<_>>();
                let effects = match purity {
                    Purity::Pure => String::new(),
                    Purity::Effectful(kinds) => {
                        let kinds = kinds.iter().map(|k| k.to_string()).collect::<Vec<_>>();
                        format!(" !{{{}}}", kinds.join(", "))
                    }
                };
                format!("({}) -> {}{effects}", params.join(", "), ret.pretty())
            }
            Type::Forall(vars, body) => {
                let vars = vars.iter().map(pretty_var).collect::<Vec<_>>();
                format!("forall {}. {}", vars.join(" "), body.pretty())
            }
            Type::Effect(kind, inner) => format!("{kind}<{}>", inner.pretty()),
            Type::Recursive(var, body) => format!("mu {}. {}", pretty_var(var), body.pretty()),
            Type::Dependent {
                param,
                param_ty,
                ret,
            } => format!("({param}: {}) -> {}", param_ty.pretty(), ret.pretty()),
        }
    }
}

fn pretty_var(v: &TypeVar) -> String {
    match &v.name {
        Some(name) => format!("'{}", name),
        None => format!("'t{}", v.id),
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.pretty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeScheme {
    pub vars: Vec<TypeVar>,
    pub ty: Type,
}

impl TypeScheme {
    pub fn monomorphic(ty: Type) -> Self {
        TypeScheme {
            vars: Vec::new(),
            ty,
        }
    }

    pub fn polymorphic(vars: Vec<TypeVar>, ty: Type) -> Self {
        TypeScheme { vars, ty }
    }

    /// The scheme as a type, `Forall` when it quantifies anything.
    pub fn to_type(&self) -> Type {
        if self.vars.is_empty() {
            self.ty.clone()
        } else {
            Type::Forall(self.vars.clone(), Box::new(self.ty.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_type_vars_concrete() {
        let ty = Type::func(vec![Type::Int], Type::Text);
        assert!(ty.free_type_vars().is_empty());
    }

    #[test]
    fn test_free_type_vars_function() {
        let var1 = TypeVar::new(0);
        let var2 = TypeVar::new(1);
        let ty = Type::func(vec![Type::Var(var1.clone())], Type::Var(var2.clone()));
        let free = ty.free_type_vars();
        assert_eq!(free.len(), 2);
        assert!(free.contains(&var1));
        assert!(free.contains(&var2));
    }

    #[test]
    fn test_free_type_vars_forall_binds() {
        let var = TypeVar::new(0);
        let ty = Type::Forall(
            vec![var.clone()],
            Box::new(Type::func(vec![Type::Var(var.clone())], Type::var(1))),
        );
        let free = ty.free_type_vars();
        assert!(!free.contains(&var));
        assert!(free.contains(&TypeVar::new(1)));
    }

    #[test]
    fn test_type_var_identity_ignores_level() {
        assert_eq!(TypeVar::at_level(3, 1), TypeVar::at_level(3, 4));
    }

    #[test]
    fn test_erase_unresolved() {
        let ty = Type::array(Type::var(0));
        assert_eq!(ty.erase_unresolved(), Type::array(Type::Unknown));
    }

    #[test]
    fn test_pretty_print_function() {
        let ty = Type::func(vec![Type::Int, Type::Text], Type::Bool);
        assert_eq!(ty.pretty(), "(Int, Text) -> Bool");
    }

    #[test]
    fn test_pretty_print_effectful_function() {
        let ty = Type::Function {
            params: vec![Type::Unit],
            ret: Box::new(Type::Text),
            purity: Purity::from_effects(vec![EffectKind::ReadEnv]),
        };
        assert_eq!(ty.pretty(), "(Unit) -> Text !{readEnv}");
    }

    #[test]
    fn test_pretty_print_object() {
        let mut fields = IndexMap::new();
        fields.insert("host".to_string(), FieldType::required(Type::Text));
        fields.insert(
            "port".to_string(),
            FieldType::with_default(Type::Int, Literal::Int(8080)),
        );
        fields.insert("tag".to_string(), FieldType::optional(Type::Text));
        assert_eq!(
            Type::Object(fields).pretty(),
            "{host: Text, port: Int = 8080, tag?: Text}"
        );
    }
}
