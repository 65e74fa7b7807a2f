use std::fmt;

use super::ty::Type;
use crate::ast::Location;

/// Names an environment read may use.
pub const IDENTIFIER_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

/// A requirement on types, produced while walking the tree and discharged by
/// the solver.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    TypeEqual {
        left: Type,
        right: Type,
        location: Location,
        context: &'static str,
    },
    HasField {
        object: Type,
        field: String,
        field_ty: Type,
        location: Location,
    },
    /// Width subtyping: `sub` must provide every field of `sup` that may not
    /// be absent.
    Subtype {
        sub: Type,
        sup: Type,
        location: Location,
    },
    /// `ty` is an integer; `value`, when statically known, lies in `min..=max`.
    Range {
        ty: Type,
        min: Option<i64>,
        max: Option<i64>,
        value: Option<i64>,
        location: Location,
    },
    /// `ty` is text; `value`, when statically known, matches the regular
    /// expression `pattern`.
    Pattern {
        ty: Type,
        pattern: String,
        value: Option<String>,
        location: Location,
    },
    /// Named class constraints: `Numeric`, `Ordered`, `Concatenable` take one
    /// argument, `Merge` takes left, right and result.
    Custom {
        name: &'static str,
        args: Vec<Type>,
        location: Location,
    },
}

impl Constraint {
    pub fn equal(left: Type, right: Type, location: &Location, context: &'static str) -> Self {
        Constraint::TypeEqual {
            left,
            right,
            location: location.clone(),
            context,
        }
    }

    pub fn custom(name: &'static str, args: Vec<Type>, location: &Location) -> Self {
        Constraint::Custom {
            name,
            args,
            location: location.clone(),
        }
    }

    pub fn location(&self) -> &Location {
        match self {
            Constraint::TypeEqual { location, .. }
            | Constraint::HasField { location, .. }
            | Constraint::Subtype { location, .. }
            | Constraint::Range { location, .. }
            | Constraint::Pattern { location, .. }
            | Constraint::Custom { location, .. } => location,
        }
    }

    /// Every type mentioned by the constraint.
    pub fn types(&self) -> Vec<&Type> {
        match self {
            Constraint::TypeEqual { left, right, .. } => vec![left, right],
            Constraint::HasField {
                object, field_ty, ..
            } => vec![object, field_ty],
            Constraint::Subtype { sub, sup, .. } => vec![sub, sup],
            Constraint::Range { ty, .. } | Constraint::Pattern { ty, .. } => vec![ty],
            Constraint::Custom { args, .. } => args.iter().collect(),
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Constraint::TypeEqual { left, right, .. } => write!(f, "{left} ~ {right}"),
            Constraint::HasField {
                object,
                field,
                field_ty,
                ..
            } => write!(f, "{object} has {field}: {field_ty}"),
            Constraint::Subtype { sub, sup, .. } => write!(f, "{sub} <: {sup}"),
            Constraint::Range { ty, min, max, .. } => {
                let min = min.map(|m| m.to_string()).unwrap_or_default();
                let max = max.map(|m| m.to_string()).unwrap_or_default();
                write!(f, "{ty} in {min}..{max}")
            }
            Constraint::Pattern { ty, pattern, .. } => {
                write!(f, "{ty} matches /{pattern}/")
            }
            Constraint::Custom { name, args, .. } => {
                let args = args.iter().map(Type::pretty).collect::<Vec<_>>();
                write!(f, "{name}({})", args.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_display() {
        let c = Constraint::custom("Numeric", vec![Type::var(0)], &Location::default());
        assert_eq!(c.to_string(), "Numeric('t0)");

        let c = Constraint::Pattern {
            ty: Type::Text,
            pattern: IDENTIFIER_PATTERN.to_string(),
            value: None,
            location: Location::default(),
        };
        assert_eq!(c.to_string(), "Text matches /^[A-Za-z_][A-Za-z0-9_]*$/");
    }
}
