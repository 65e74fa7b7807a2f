//! Operators shared by the core evaluator and the reference interpreter.
//!
//! Every function reports a failure as a message; callers turn it into an
//! `InvalidOperand` runtime error at the operator's location.

use indexmap::IndexMap;

use crate::ast::{BinOpKind, UnaryOpKind};

use super::value::Value;

pub(super) fn binary<F>(op: BinOpKind, left: Value<F>, right: Value<F>) -> Result<Value<F>, String> {
    use Value::*;
    match (op, left, right) {
        (BinOpKind::Add, Int(a), Int(b)) => checked(a.checked_add(b), op),
        (BinOpKind::Sub, Int(a), Int(b)) => checked(a.checked_sub(b), op),
        (BinOpKind::Mul, Int(a), Int(b)) => checked(a.checked_mul(b), op),
        (BinOpKind::Div | BinOpKind::Mod, Int(_), Int(0)) => Err("division by zero".to_string()),
        (BinOpKind::Div, Int(a), Int(b)) => checked(a.checked_div(b), op),
        (BinOpKind::Mod, Int(a), Int(b)) => checked(a.checked_rem(b), op),
        (BinOpKind::Add, Float(a), Float(b)) => Ok(Float(a + b)),
        (BinOpKind::Sub, Float(a), Float(b)) => Ok(Float(a - b)),
        (BinOpKind::Mul, Float(a), Float(b)) => Ok(Float(a * b)),
        (BinOpKind::Div, Float(a), Float(b)) => Ok(Float(a / b)),
        (BinOpKind::Mod, Float(a), Float(b)) => Ok(Float(a % b)),
        (BinOpKind::Eq, a, b) => Ok(Bool(data_eq(&a, &b)?)),
        (BinOpKind::NotEq, a, b) => Ok(Bool(!data_eq(&a, &b)?)),
        (BinOpKind::Lt | BinOpKind::Gt | BinOpKind::LtEq | BinOpKind::GtEq, a, b) => {
            let ordering = match (&a, &b) {
                (Int(x), Int(y)) => x.partial_cmp(y),
                (Float(x), Float(y)) => x.partial_cmp(y),
                (Text(x), Text(y)) => x.partial_cmp(y),
                _ => return Err(mismatch(op, &a, &b)),
            };
            let Some(ordering) = ordering else {
                return Ok(Bool(false));
            };
            Ok(Bool(match op {
                BinOpKind::Lt => ordering.is_lt(),
                BinOpKind::Gt => ordering.is_gt(),
                BinOpKind::LtEq => ordering.is_le(),
                _ => ordering.is_ge(),
            }))
        }
        (BinOpKind::And, Bool(a), Bool(b)) => Ok(Bool(a && b)),
        (BinOpKind::Or, Bool(a), Bool(b)) => Ok(Bool(a || b)),
        (BinOpKind::Concat, Text(a), Text(b)) => Ok(Text(a + &b)),
        (BinOpKind::Concat, Array(mut a), Array(b)) => {
            a.extend(b);
            Ok(Array(a))
        }
        (BinOpKind::Merge, Object(a), Object(b)) => Ok(Object(merge(a, b))),
        (op, a, b) => Err(mismatch(op, &a, &b)),
    }
}

/// Shallow union, right side wins; left keys keep their position and
/// right-only keys are appended in their order.
pub(super) fn merge<F>(
    mut left: IndexMap<String, Value<F>>,
    right: IndexMap<String, Value<F>>,
) -> IndexMap<String, Value<F>> {
    for (name, value) in right {
        left.insert(name, value);
    }
    left
}

pub(super) fn unary<F>(op: UnaryOpKind, operand: Value<F>) -> Result<Value<F>, String> {
    use Value::*;
    match (op, operand) {
        (UnaryOpKind::Not, Bool(b)) => Ok(Bool(!b)),
        (UnaryOpKind::Negate, Int(i)) => i
            .checked_neg()
            .map(Int)
            .ok_or_else(|| "integer overflow in negation".to_string()),
        (UnaryOpKind::Negate, Float(x)) => Ok(Float(-x)),
        (UnaryOpKind::Length, Array(elements)) => Ok(Int(elements.len() as i64)),
        (UnaryOpKind::Length, Text(s)) => Ok(Int(s.chars().count() as i64)),
        (UnaryOpKind::Length, Object(fields)) => Ok(Int(fields.len() as i64)),
        (UnaryOpKind::Head, Array(elements)) => elements
            .into_iter()
            .next()
            .ok_or_else(|| "head of an empty array".to_string()),
        (UnaryOpKind::Tail, Array(elements)) => {
            if elements.is_empty() {
                return Err("tail of an empty array".to_string());
            }
            Ok(Array(elements.into_iter().skip(1).collect()))
        }
        (UnaryOpKind::IsEmpty, Array(elements)) => Ok(Bool(elements.is_empty())),
        (UnaryOpKind::IsEmpty, Text(s)) => Ok(Bool(s.is_empty())),
        (UnaryOpKind::IsEmpty, Object(fields)) => Ok(Bool(fields.is_empty())),
        (UnaryOpKind::ToText, Text(s)) => Ok(Text(s)),
        (UnaryOpKind::ToText, value) if value.is_data() => Ok(Text(value.to_string())),
        (op, value) => Err(format!(
            "`{}` cannot be applied to {}",
            op.name(),
            value.type_name()
        )),
    }
}

pub(super) fn field<F>(object: Value<F>, name: &str) -> Result<Value<F>, String> {
    match object {
        Value::Object(mut fields) => fields
            .swap_remove(name)
            .ok_or_else(|| format!("object has no field `{name}`")),
        other => Err(format!(
            "cannot access field `{name}` of {}",
            other.type_name()
        )),
    }
}

pub(super) fn make_object<F>(names: &[String], values: Vec<Value<F>>) -> Result<Value<F>, String> {
    if names.len() != values.len() {
        return Err(format!(
            "object literal has {} names but {} values",
            names.len(),
            values.len()
        ));
    }
    Ok(Value::Object(names.iter().cloned().zip(values).collect()))
}

/// Structural equality of data; functions cannot be compared.
pub(super) fn data_eq<F>(left: &Value<F>, right: &Value<F>) -> Result<bool, String> {
    use Value::*;
    Ok(match (left, right) {
        (Closure(_), _) | (_, Closure(_)) => {
            return Err("functions cannot be compared".to_string())
        }
        (Null, Null) => true,
        (Bool(a), Bool(b)) => a == b,
        (Int(a), Int(b)) => a == b,
        (Float(a), Float(b)) => a == b,
        (Text(a), Text(b)) => a == b,
        (Array(a), Array(b)) => {
            if a.len() != b.len() {
                return Ok(false);
            }
            for (x, y) in a.iter().zip(b) {
                if !data_eq(x, y)? {
                    return Ok(false);
                }
            }
            true
        }
        (Object(a), Object(b)) => {
            if a.len() != b.len() {
                return Ok(false);
            }
            for (name, x) in a {
                match b.get(name) {
                    Some(y) if data_eq(x, y)? => {}
                    _ => return Ok(false),
                }
            }
            true
        }
        _ => false,
    })
}

fn checked<F>(result: Option<i64>, op: BinOpKind) -> Result<Value<F>, String> {
    result
        .map(Value::Int)
        .ok_or_else(|| format!("integer overflow in `{}`", op.symbol()))
}

fn mismatch<F>(op: BinOpKind, left: &Value<F>, right: &Value<F>) -> String {
    format!(
        "`{}` cannot be applied to {} and {}",
        op.symbol(),
        left.type_name(),
        right.type_name()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::Value;

    fn obj(fields: &[(&str, i64)]) -> Value {
        Value::object(fields.iter().map(|(k, v)| (*k, Value::Int(*v))))
    }

    #[test]
    fn test_merge_right_wins_and_appends() {
        let Value::Object(left) = obj(&[("a", 1), ("b", 2)]) else {
            unreachable!()
        };
        let Value::Object(right) = obj(&[("b", 3), ("c", 4)]) else {
            unreachable!()
        };
        assert_eq!(
            Value::Object(merge(left, right)),
            obj(&[("a", 1), ("b", 3), ("c", 4)])
        );
    }

    #[test]
    fn test_division_by_zero() {
        let err = binary::<()>(BinOpKind::Div, Value::Int(1), Value::Int(0)).unwrap_err();
        assert!(err.contains("division by zero"));
    }

    #[test]
    fn test_overflow_is_reported() {
        assert!(binary::<()>(BinOpKind::Add, Value::Int(i64::MAX), Value::Int(1)).is_err());
    }

    #[test]
    fn test_concat_arrays_and_text() {
        let joined = binary::<()>(
            BinOpKind::Concat,
            Value::text("replica-"),
            Value::text("0"),
        )
        .unwrap();
        assert!(matches!(joined, Value::Text(s) if s == "replica-0"));
        let arrays = binary::<()>(
            BinOpKind::Concat,
            Value::array([Value::Int(1)]),
            Value::array([Value::Int(2)]),
        )
        .unwrap();
        assert!(matches!(arrays, Value::Array(v) if v.len() == 2));
    }

    #[test]
    fn test_tail_of_empty_array() {
        assert!(unary::<()>(UnaryOpKind::Tail, Value::array([])).is_err());
    }

    #[test]
    fn test_to_text() {
        let text = unary::<()>(UnaryOpKind::ToText, Value::Int(2)).unwrap();
        assert!(matches!(text, Value::Text(s) if s == "2"));
    }

    #[test]
    fn test_equality_ignores_field_order() {
        let a = obj(&[("a", 1), ("b", 2)]);
        let b = obj(&[("b", 2), ("a", 1)]);
        assert_eq!(data_eq(&a, &b), Ok(true));
    }

    #[test]
    fn test_missing_field() {
        assert!(field(obj(&[("a", 1)]), "b").is_err());
    }
}
