use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::ast::{Literal, NodeRef};

use super::environment::Environment;

/// The result domain of evaluation.
///
/// `F` is the representation of functions: [`Closure`] for values produced by
/// the reference interpreter and handed to callers, the evaluator's own
/// callable representation while a core term is being reduced. Everything
/// else is plain data; object fields keep their insertion order.
#[derive(Debug, Clone)]
pub enum Value<F = Closure> {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Array(Vec<Value<F>>),
    Object(IndexMap<String, Value<F>>),
    Closure(F),
}

/// A function value of the reference interpreter. Two closures are equal only
/// if they are the same closure.
#[derive(Debug, Clone)]
pub struct Closure(pub Arc<ClosureData>);

#[derive(Debug)]
pub struct ClosureData {
    /// Empty for a lambda that takes a single `null`.
    pub params: Vec<String>,
    pub body: NodeRef<()>,
    pub env: Environment,
}

impl Closure {
    pub fn new(params: Vec<String>, body: NodeRef<()>, env: Environment) -> Self {
        Closure(Arc::new(ClosureData { params, body, env }))
    }
}

impl PartialEq for Closure {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<F: PartialEq> PartialEq for Value<F> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            // Field order is part of the value.
            (Value::Object(a), Value::Object(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x == y)
            }
            (Value::Closure(a), Value::Closure(b)) => a == b,
            _ => false,
        }
    }
}

impl<F> Value<F> {
    pub fn text(value: impl Into<String>) -> Self {
        Value::Text(value.into())
    }

    pub fn array(elements: impl IntoIterator<Item = Value<F>>) -> Self {
        Value::Array(elements.into_iter().collect())
    }

    pub fn object<'a>(fields: impl IntoIterator<Item = (&'a str, Value<F>)>) -> Self {
        Value::Object(
            fields
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        )
    }

    pub fn from_literal(literal: &Literal) -> Self {
        match literal {
            Literal::Null => Value::Null,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(i) => Value::Int(*i),
            Literal::Float(x) => Value::Float(*x),
            Literal::Text(s) => Value::Text(s.clone()),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Closure(_) => "function",
        }
    }

    /// Whether the value contains no functions.
    pub fn is_data(&self) -> bool {
        match self {
            Value::Array(elements) => elements.iter().all(Value::is_data),
            Value::Object(fields) => fields.values().all(Value::is_data),
            Value::Closure(_) => false,
            _ => true,
        }
    }

    /// Structural size: one per node.
    pub fn size(&self) -> u64 {
        match self {
            Value::Array(elements) => 1 + elements.iter().map(Value::size).sum::<u64>(),
            Value::Object(fields) => 1 + fields.values().map(Value::size).sum::<u64>(),
            _ => 1,
        }
    }

    /// Converts to a value with another function representation, failing on
    /// the first function found.
    pub fn into_data<G>(self) -> Option<Value<G>> {
        Some(match self {
            Value::Null => Value::Null,
            Value::Bool(b) => Value::Bool(b),
            Value::Int(i) => Value::Int(i),
            Value::Float(x) => Value::Float(x),
            Value::Text(s) => Value::Text(s),
            Value::Array(elements) => Value::Array(
                elements
                    .into_iter()
                    .map(Value::into_data)
                    .collect::<Option<_>>()?,
            ),
            Value::Object(fields) => Value::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| v.into_data().map(|v| (k, v)))
                    .collect::<Option<_>>()?,
            ),
            Value::Closure(_) => return None,
        })
    }

    /// Reads plain JSON. Integers that fit `i64` stay integers.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(elements) => {
                Value::Array(elements.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(fields) => Value::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl<F> Serialize for Value<F> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(x) => serializer.serialize_f64(*x),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Array(elements) => {
                let mut seq = serializer.serialize_seq(Some(elements.len()))?;
                for element in elements {
                    seq.serialize_element(element)?;
                }
                seq.end()
            }
            Value::Object(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (name, value) in fields {
                    map.serialize_entry(name, value)?;
                }
                map.end()
            }
            Value::Closure(_) => Err(S::Error::custom("functions cannot be serialized")),
        }
    }
}

impl<F> fmt::Display for Value<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Array(elements) => {
                write!(f, "[")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{element}")?;
                }
                write!(f, "]")
            }
            Value::Object(fields) => {
                write!(f, "{{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {value}")?;
                }
                write!(f, "}}")
            }
            Value::Closure(_) => write!(f, "<function>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_preserves_field_order() {
        let value: Value = Value::object([("b", Value::Int(1)), ("a", Value::Int(2))]);
        assert_eq!(serde_json::to_string(&value).unwrap(), r#"{"b":1,"a":2}"#);
    }

    #[test]
    fn test_object_equality_is_ordered() {
        let ab: Value = Value::object([("a", Value::Int(1)), ("b", Value::Int(2))]);
        let ba: Value = Value::object([("b", Value::Int(2)), ("a", Value::Int(1))]);
        assert_ne!(ab, ba);
    }

    #[test]
    fn test_closure_identity() {
        let body: NodeRef<()> = Arc::new(crate::ast::build::null());
        let first = Closure::new(vec![], body.clone(), Environment::empty());
        let second = Closure::new(vec![], body, Environment::empty());
        assert_eq!(Value::Closure(first.clone()), Value::Closure(first.clone()));
        assert_ne!(Value::Closure(first), Value::Closure(second));
    }

    #[test]
    fn test_closure_is_not_data() {
        let body: NodeRef<()> = Arc::new(crate::ast::build::null());
        let value: Value = Value::array([Value::Closure(Closure::new(
            vec![],
            body,
            Environment::empty(),
        ))]);
        assert!(!value.is_data());
        assert!(value.clone().into_data::<Closure>().is_none());
        assert!(serde_json::to_string(&value).is_err());
    }

    #[test]
    fn test_from_json() {
        let json = serde_json::json!({"port": 8080, "ratio": 0.5, "tags": ["a"]});
        let value: Value = Value::from_json(json);
        assert_eq!(
            value,
            Value::object([
                ("port", Value::Int(8080)),
                ("ratio", Value::Float(0.5)),
                ("tags", Value::array([Value::text("a")])),
            ])
        );
    }
}
