//! Constraint solving.
//!
//! Constraints are discharged by unification against one growing
//! substitution. A constraint whose types are still too unresolved to decide
//! (an operator applied to a bare type variable, a field read from an object
//! whose shape is unknown) is deferred and retried after the others made
//! progress. On the final pass deferred class constraints fall back to their
//! defaults and anything still undecided is an error.

use indexmap::IndexMap;
use regex::Regex;

use super::constraint::Constraint;
use super::error::TypeError;
use super::subst::Substitution;
use super::ty::{FieldType, Type};
use super::unify::{unify, unify_width};

enum Outcome {
    Solved,
    Deferred(Constraint),
}

pub(super) struct Solver<'s> {
    subst: &'s mut Substitution,
}

impl<'s> Solver<'s> {
    pub(super) fn new(subst: &'s mut Substitution) -> Self {
        Solver { subst }
    }

    /// Solves as much of `constraints` as possible, returning the ones that
    /// have to wait for more information. With `last` set nothing is left
    /// over: defaults are applied and leftovers are reported.
    pub(super) fn solve(
        &mut self,
        constraints: Vec<Constraint>,
        last: bool,
    ) -> Result<Vec<Constraint>, TypeError> {
        let mut pending = self.saturate(constraints)?;
        if !last || pending.is_empty() {
            return Ok(pending);
        }

        // Defaulting may unblock other constraints, so default one at a time.
        while let Some(index) = pending
            .iter()
            .position(|c| self.default_for(c, &pending).is_some())
        {
            let constraint = pending.remove(index);
            if let Some((var, ty)) = self.default_for(&constraint, &pending) {
                self.bind(var, ty, &constraint)?;
            }
            pending.push(constraint);
            pending = self.saturate(pending)?;
        }

        match pending.into_iter().next() {
            None => Ok(Vec::new()),
            Some(constraint) => Err(self.unresolved(&constraint)),
        }
    }

    fn saturate(&mut self, mut constraints: Vec<Constraint>) -> Result<Vec<Constraint>, TypeError> {
        loop {
            let before = constraints.len();
            let mut deferred = Vec::new();
            for constraint in constraints {
                match self.step(constraint)? {
                    Outcome::Solved => {}
                    Outcome::Deferred(c) => deferred.push(c),
                }
            }
            if deferred.is_empty() || deferred.len() == before {
                return Ok(deferred);
            }
            constraints = deferred;
        }
    }

    fn equate(&mut self, left: &Type, right: &Type, constraint: &Constraint) -> Result<(), TypeError> {
        let left = self.subst.apply(left);
        let right = self.subst.apply(right);
        let step = unify(&left, &right)
            .map_err(|e| TypeError::from_unify_error(e, constraint.location().clone()))?;
        *self.subst = step.compose(self.subst);
        Ok(())
    }

    fn bind(&mut self, var: Type, ty: Type, constraint: &Constraint) -> Result<(), TypeError> {
        self.equate(&var, &ty, constraint)
    }

    fn step(&mut self, constraint: Constraint) -> Result<Outcome, TypeError> {
        match &constraint {
            Constraint::TypeEqual {
                left,
                right,
                context,
                ..
            } => {
                self.equate(left, right, &constraint)
                    .map_err(|e| e.with_context(*context))?;
                Ok(Outcome::Solved)
            }
            Constraint::HasField {
                object,
                field,
                field_ty,
                location,
            } => match self.subst.apply(object).strip_effects() {
                Type::Unknown => Ok(Outcome::Solved),
                Type::Var(_) => Ok(Outcome::Deferred(constraint.clone())),
                Type::Object(fields) => match fields.get(field) {
                    Some(found) => {
                        let found = found.ty.clone();
                        self.equate(&found, field_ty, &constraint)?;
                        Ok(Outcome::Solved)
                    }
                    None => Err(TypeError::MissingField {
                        field: field.clone(),
                        ty: Type::Object(fields.clone()),
                        location: location.clone(),
                    }),
                },
                other => Err(TypeError::MissingField {
                    field: field.clone(),
                    ty: other.clone(),
                    location: location.clone(),
                }),
            },
            Constraint::Subtype { sub, sup, location } => {
                let sub = self.subst.apply(sub);
                let sup = self.subst.apply(sup);
                match (sub.strip_effects(), sup.strip_effects()) {
                    (Type::Object(value_fields), Type::Object(expected)) => {
                        let step = unify_width(value_fields, expected)
                            .map_err(|e| TypeError::from_unify_error(e, location.clone()))?;
                        *self.subst = step.compose(self.subst);
                    }
                    _ => self
                        .equate(&sub, &sup, &constraint)
                        .map_err(|e| e.with_context("annotated binding"))?,
                }
                Ok(Outcome::Solved)
            }
            Constraint::Range {
                ty,
                min,
                max,
                value,
                location,
            } => {
                self.equate(ty, &Type::Int, &constraint)?;
                if let Some(value) = value {
                    let below = min.is_some_and(|min| *value < min);
                    let above = max.is_some_and(|max| *value > max);
                    if below || above {
                        return Err(TypeError::UnificationFailure {
                            expected: Type::Int,
                            found: Type::Int,
                            location: location.clone(),
                            context: Some(format!("{value} is outside {constraint}")),
                        });
                    }
                }
                Ok(Outcome::Solved)
            }
            Constraint::Pattern {
                ty,
                pattern,
                value,
                location,
            } => {
                self.equate(ty, &Type::Text, &constraint)?;
                if let Some(value) = value {
                    let mismatch = |context: String| TypeError::UnificationFailure {
                        expected: Type::Text,
                        found: Type::Text,
                        location: location.clone(),
                        context: Some(context),
                    };
                    let regex = Regex::new(pattern)
                        .map_err(|err| mismatch(format!("invalid pattern /{pattern}/: {err}")))?;
                    if !regex.is_match(value) {
                        return Err(mismatch(format!("{value:?} does not match /{pattern}/")));
                    }
                }
                Ok(Outcome::Solved)
            }
            Constraint::Custom { name, args, .. } => self.step_custom(name, args, &constraint),
        }
    }

    fn step_custom(
        &mut self,
        name: &str,
        args: &[Type],
        constraint: &Constraint,
    ) -> Result<Outcome, TypeError> {
        let args: Vec<Type> = args
            .iter()
            .map(|a| self.subst.apply(a).strip_effects().clone())
            .collect();
        let accepts = match name {
            "Merge" => return self.step_merge(&args, constraint),
            "Numeric" | "Ordered" | "Concatenable" => class_accepts,
            _ => return Err(self.unresolved(constraint)),
        };
        match args.first() {
            Some(Type::Unknown) => Ok(Outcome::Solved),
            Some(Type::Var(_)) => Ok(Outcome::Deferred(constraint.clone())),
            Some(ty) if accepts(name, ty) => Ok(Outcome::Solved),
            Some(ty) => Err(TypeError::UnificationFailure {
                expected: Type::Var(super::TypeVar::with_name(0, name.to_string())),
                found: ty.clone(),
                location: constraint.location().clone(),
                context: Some(format!("{name} operand")),
            }),
            None => Err(self.unresolved(constraint)),
        }
    }

    /// Right-hand fields win; field order is left first, then right-only.
    fn step_merge(&mut self, args: &[Type], constraint: &Constraint) -> Result<Outcome, TypeError> {
        let [left, right, result] = args else {
            return Err(self.unresolved(constraint));
        };
        match (left, right) {
            (Type::Unknown, _) | (_, Type::Unknown) => Ok(Outcome::Solved),
            (Type::Object(l), Type::Object(r)) => {
                let mut merged: IndexMap<String, FieldType> = l.clone();
                for (name, field) in r {
                    merged.insert(name.clone(), field.clone());
                }
                self.equate(result, &Type::Object(merged), constraint)?;
                Ok(Outcome::Solved)
            }
            (Type::Var(_), _) | (_, Type::Var(_)) => Ok(Outcome::Deferred(constraint.clone())),
            (Type::Object(_), other) | (other, _) => Err(TypeError::UnificationFailure {
                expected: Type::Object(IndexMap::new()),
                found: other.clone(),
                location: constraint.location().clone(),
                context: Some("operand of `//`".to_string()),
            }),
        }
    }

    /// The binding that resolves a deferred constraint when nothing else will.
    /// A field read from an unknown object defaults the object to one holding
    /// every field `pending` reads from it.
    fn default_for(&self, constraint: &Constraint, pending: &[Constraint]) -> Option<(Type, Type)> {
        match constraint {
            Constraint::Custom { name, args, .. } => {
                let arg = self.subst.apply(args.first()?);
                let Type::Var(_) = arg.strip_effects() else {
                    return None;
                };
                let ty = match *name {
                    "Numeric" | "Ordered" => Type::Int,
                    "Concatenable" => Type::Text,
                    _ => return None,
                };
                Some((arg.strip_effects().clone(), ty))
            }
            Constraint::HasField {
                object,
                field,
                field_ty,
                ..
            } => {
                let object = self.subst.apply(object);
                let var = object.strip_effects();
                let Type::Var(_) = var else {
                    return None;
                };
                let mut fields = IndexMap::new();
                fields.insert(field.clone(), FieldType::required(field_ty.clone()));
                for other in pending {
                    if let Constraint::HasField {
                        object,
                        field,
                        field_ty,
                        ..
                    } = other
                    {
                        if self.subst.apply(object).strip_effects() == var {
                            fields
                                .entry(field.clone())
                                .or_insert_with(|| FieldType::required(field_ty.clone()));
                        }
                    }
                }
                Some((var.clone(), Type::Object(fields)))
            }
            _ => None,
        }
    }

    fn unresolved(&self, constraint: &Constraint) -> TypeError {
        let (expected, found) = match constraint.types().as_slice() {
            [one] => ((*one).clone(), self.subst.apply(one)),
            [first, second, ..] => (self.subst.apply(first), self.subst.apply(second)),
            [] => (Type::Unknown, Type::Unknown),
        };
        TypeError::UnificationFailure {
            expected,
            found,
            location: constraint.location().clone(),
            context: Some(format!("unresolved constraint {constraint}")),
        }
    }
}

fn class_accepts(class: &str, ty: &Type) -> bool {
    match class {
        "Numeric" => matches!(ty, Type::Int | Type::Float),
        "Ordered" => matches!(ty, Type::Int | Type::Float | Type::Text),
        "Concatenable" => matches!(ty, Type::Text | Type::Array(_)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Location;
    use crate::types::constraint::IDENTIFIER_PATTERN;
    use crate::types::error::TypeErrorKind;

    fn loc() -> Location {
        Location::default()
    }

    #[test]
    fn test_solve_type_equal() {
        let mut subst = Substitution::empty();
        let constraints = vec![Constraint::equal(Type::var(0), Type::Int, &loc(), "test")];
        let left = Solver::new(&mut subst).solve(constraints, true).unwrap();
        assert!(left.is_empty());
        assert_eq!(subst.apply(&Type::var(0)), Type::Int);
    }

    #[test]
    fn test_numeric_is_deferred_then_defaulted() {
        let mut subst = Substitution::empty();
        let constraints = vec![Constraint::custom("Numeric", vec![Type::var(0)], &loc())];
        let left = Solver::new(&mut subst).solve(constraints, false).unwrap();
        assert_eq!(left.len(), 1);
        Solver::new(&mut subst).solve(left, true).unwrap();
        assert_eq!(subst.apply(&Type::var(0)), Type::Int);
    }

    #[test]
    fn test_numeric_rejects_text() {
        let mut subst = Substitution::empty();
        let constraints = vec![Constraint::custom("Numeric", vec![Type::Text], &loc())];
        let err = Solver::new(&mut subst).solve(constraints, true).unwrap_err();
        assert_eq!(err.kind(), TypeErrorKind::UnificationFailure);
    }

    #[test]
    fn test_deferred_constraint_resolved_by_later_equality() {
        let mut subst = Substitution::empty();
        let constraints = vec![
            Constraint::HasField {
                object: Type::var(0),
                field: "port".to_string(),
                field_ty: Type::var(1),
                location: loc(),
            },
            Constraint::equal(
                Type::var(0),
                Type::object(vec![("port", Type::Int)]),
                &loc(),
                "test",
            ),
        ];
        Solver::new(&mut subst).solve(constraints, true).unwrap();
        assert_eq!(subst.apply(&Type::var(1)), Type::Int);
    }

    #[test]
    fn test_fields_of_an_unknown_object_are_defaulted_together() {
        let mut subst = Substitution::empty();
        let read = |field: &str, ty: Type| Constraint::HasField {
            object: Type::var(0),
            field: field.to_string(),
            field_ty: ty,
            location: loc(),
        };
        let constraints = vec![
            read("a", Type::var(1)),
            read("b", Type::var(2)),
            read("a", Type::Int),
        ];
        Solver::new(&mut subst).solve(constraints, true).unwrap();
        assert_eq!(
            subst.apply(&Type::var(0)),
            Type::object(vec![("a", Type::Int), ("b", Type::var(2))])
        );
    }

    #[test]
    fn test_merge_right_wins() {
        let mut subst = Substitution::empty();
        let left = Type::object(vec![("a", Type::Int), ("b", Type::Int)]);
        let right = Type::object(vec![("b", Type::Text), ("c", Type::Int)]);
        let constraints = vec![Constraint::custom(
            "Merge",
            vec![left, right, Type::var(0)],
            &loc(),
        )];
        Solver::new(&mut subst).solve(constraints, true).unwrap();
        assert_eq!(
            subst.apply(&Type::var(0)),
            Type::object(vec![("a", Type::Int), ("b", Type::Text), ("c", Type::Int)])
        );
    }

    #[test]
    fn test_missing_field() {
        let mut subst = Substitution::empty();
        let constraints = vec![Constraint::HasField {
            object: Type::object(vec![("a", Type::Int)]),
            field: "b".to_string(),
            field_ty: Type::var(0),
            location: loc(),
        }];
        let err = Solver::new(&mut subst).solve(constraints, true).unwrap_err();
        assert_eq!(err.kind(), TypeErrorKind::MissingField);
    }

    fn pattern(pattern: &str, value: &str) -> Constraint {
        Constraint::Pattern {
            ty: Type::var(0),
            pattern: pattern.to_string(),
            value: Some(value.to_string()),
            location: loc(),
        }
    }

    #[test]
    fn test_identifier_pattern() {
        for name in ["DB_HOST", "_x1"] {
            let mut subst = Substitution::empty();
            let constraints = vec![pattern(IDENTIFIER_PATTERN, name)];
            assert!(Solver::new(&mut subst).solve(constraints, true).is_ok(), "{name}");
            assert_eq!(subst.apply(&Type::var(0)), Type::Text);
        }
        for name in ["1abc", "a-b", ""] {
            let mut subst = Substitution::empty();
            let constraints = vec![pattern(IDENTIFIER_PATTERN, name)];
            assert!(Solver::new(&mut subst).solve(constraints, true).is_err(), "{name}");
        }
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let mut subst = Substitution::empty();
        let err = Solver::new(&mut subst)
            .solve(vec![pattern("(", "x")], true)
            .unwrap_err();
        assert_eq!(err.kind(), TypeErrorKind::UnificationFailure);
    }

    #[test]
    fn test_range_rejects_negative_literal() {
        let mut subst = Substitution::empty();
        let constraints = vec![Constraint::Range {
            ty: Type::Int,
            min: Some(0),
            max: None,
            value: Some(-1),
            location: loc(),
        }];
        assert!(Solver::new(&mut subst).solve(constraints, true).is_err());
    }
}
