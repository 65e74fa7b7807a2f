//! # Inter-Stage Wire Format
//!
//! When stages run as separate processes, trees travel as JSON. Every tagged
//! union is an *envelope*
//!
//! ```json
//! {"tag": 5, "fields": {"1": ..., "3": ...}}
//! ```
//!
//! and every plain record is a field map `{"1": ..., "2": ...}`. Variant tags
//! and field numbers are fixed forever: new variants and fields get new
//! numbers, existing ones are never renumbered or reused. A field whose value
//! is `null` or that is missing decodes as absent, and fields a reader does
//! not know are skipped.
//!
//! The format is the `serde` representation of the tree types. Records derive
//! it next to their definitions with numbered field names; the envelopes of
//! the tagged unions are written out in this module.
//!
//! ## Numbering
//!
//! | type | tags |
//! |------|------|
//! | `ProgramNode` | 1 Literal, 2 Variable, 3 Lambda, 4 Apply, 5 Let, 6 Conditional, 7 ObjectLiteral, 8 ArrayLiteral, 9 BinaryOp, 10 EffectRequest, 11 Comment, 12 LetRec, 13 FieldAccess, 14 UnaryOp, 15 Loop |
//! | `Type` | 1 Unit, 2 Bool, 3 Int, 4 Float, 5 Text, 6 Array, 7 Object, 8 Function, 9 Var, 10 Forall, 11 Effect, 12 Recursive, 13 Dependent, 14 Unknown |
//! | `TerminationProof` | 1 Structural, 2 Bounded, 3 Total, 4 Productive, 5 StrongNormalizationByTyping, 6 WellFounded |
//! | `CoreTerm` | 1 Variable, 2 Abstraction, 3 Application, 4 TypeAbstraction, 5 TypeApplication, 6 Let, 7 GuardedFix, 8 Constructor, 9 Match, 10 Literal, 11 Primitive, 12 Perform, 13 Fold, 14 Located |
//! | `CoreType` | 1 TypeVariable, 2 Arrow, 3 Forall, 4 TypeConstructor, 5 BaseType, 6 Mu, 7 EffectType |
//! | `Kind` | 1 Star, 2 Arrow, 3 Row |
//!
//! Program nodes use field 1 for the location and field 2 for the annotation;
//! variant fields start at 3.

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::ser::{self, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::error::Category;
use serde_json::{Map, Value as Json};
use thiserror::Error;

use crate::ast::*;
use crate::core::{CasePattern, CoreTerm, CoreType, FixGuard, Kind, PrimOp};
use crate::termination::TerminationProof;
use crate::types::{FieldType, Purity, Type};

#[derive(Debug, Error)]
pub enum WireError {
    /// The input is not JSON, or ends early.
    #[error("invalid JSON: {0}")]
    Json(serde_json::Error),
    /// Well-formed JSON that is not a message: an unknown tag, a missing
    /// field or a value of the wrong shape.
    #[error("malformed message: {0}")]
    Malformed(serde_json::Error),
}

impl From<serde_json::Error> for WireError {
    fn from(err: serde_json::Error) -> Self {
        match err.classify() {
            Category::Data => WireError::Malformed(err),
            Category::Io | Category::Syntax | Category::Eof => WireError::Json(err),
        }
    }
}

pub fn to_string<V: Serialize>(value: &V) -> Result<String, WireError> {
    Ok(serde_json::to_string(value)?)
}

pub fn from_str<V: DeserializeOwned>(input: &str) -> Result<V, WireError> {
    Ok(serde_json::from_str(input)?)
}

/// Fields of an outgoing envelope or record. Absent values are left out.
struct Outgoing {
    map: Map<String, Json>,
    error: Option<serde_json::Error>,
}

impl Outgoing {
    fn new() -> Self {
        Outgoing {
            map: Map::new(),
            error: None,
        }
    }

    fn with<V: Serialize + ?Sized>(mut self, number: u32, value: &V) -> Self {
        match serde_json::to_value(value) {
            Ok(Json::Null) => {}
            Ok(json) => {
                self.map.insert(number.to_string(), json);
            }
            Err(err) => {
                self.error.get_or_insert(err);
            }
        }
        self
    }

    fn envelope<S: Serializer>(self, tag: u64, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Envelope {
            tag: u64,
            #[serde(skip_serializing_if = "Map::is_empty")]
            fields: Map<String, Json>,
        }

        match self.error {
            Some(err) => Err(ser::Error::custom(err)),
            None => Envelope {
                tag,
                fields: self.map,
            }
            .serialize(serializer),
        }
    }

    fn record<S: Serializer>(self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.error {
            Some(err) => Err(ser::Error::custom(err)),
            None => self.map.serialize(serializer),
        }
    }
}

/// Fields of one received envelope or record.
struct Incoming {
    context: &'static str,
    map: Map<String, Json>,
}

impl Incoming {
    fn envelope<'de, D: Deserializer<'de>>(
        deserializer: D,
        context: &'static str,
    ) -> Result<(u64, Self), D::Error> {
        #[derive(Deserialize)]
        struct Envelope {
            tag: u64,
            #[serde(default)]
            fields: Option<Map<String, Json>>,
        }

        let envelope = Envelope::deserialize(deserializer)?;
        Ok((
            envelope.tag,
            Incoming {
                context,
                map: envelope.fields.unwrap_or_default(),
            },
        ))
    }

    fn record<'de, D: Deserializer<'de>>(
        deserializer: D,
        context: &'static str,
    ) -> Result<Self, D::Error> {
        Ok(Incoming {
            context,
            map: Map::deserialize(deserializer)?,
        })
    }

    fn take(&mut self, number: u32) -> Option<Json> {
        self.map
            .remove(&number.to_string())
            .filter(|json| !json.is_null())
    }

    /// A required field. Types that decode from `null` (the unit annotation)
    /// also decode from a missing field.
    fn get<V: DeserializeOwned>(&mut self, number: u32) -> Result<V, serde_json::Error> {
        match self.take(number) {
            Some(json) => serde_json::from_value(json),
            None => serde_json::from_value(Json::Null).map_err(|_| {
                de::Error::custom(format_args!("{} is missing field {number}", self.context))
            }),
        }
    }

    fn opt<V: DeserializeOwned>(&mut self, number: u32) -> Result<Option<V>, serde_json::Error> {
        self.take(number).map(serde_json::from_value).transpose()
    }

    fn unknown(&self, tag: u64) -> serde_json::Error {
        de::Error::custom(format_args!("unknown {} tag {tag}", self.context))
    }
}

/// Runs the field reads of one message, reporting failures through the
/// outer deserializer.
fn decode<T, E: de::Error>(read: impl FnOnce() -> Result<T, serde_json::Error>) -> Result<T, E> {
    read().map_err(E::custom)
}

/// Fieldless enums travel as envelopes without fields.
macro_rules! unit_enum_wire {
    ($ty:ty, $context:literal, { $($variant:path = $tag:literal),* $(,)? }) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let tag: u64 = match self {
                    $($variant => $tag,)*
                };
                Outgoing::new().envelope(tag, serializer)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let (tag, fields) = Incoming::envelope(deserializer, $context)?;
                match tag {
                    $($tag => Ok($variant),)*
                    tag => Err(de::Error::custom(fields.unknown(tag))),
                }
            }
        }
    };
}

unit_enum_wire!(BinOpKind, "binary operator", {
    BinOpKind::Add = 1,
    BinOpKind::Sub = 2,
    BinOpKind::Mul = 3,
    BinOpKind::Div = 4,
    BinOpKind::Mod = 5,
    BinOpKind::Eq = 6,
    BinOpKind::NotEq = 7,
    BinOpKind::Lt = 8,
    BinOpKind::Gt = 9,
    BinOpKind::LtEq = 10,
    BinOpKind::GtEq = 11,
    BinOpKind::And = 12,
    BinOpKind::Or = 13,
    BinOpKind::Concat = 14,
    BinOpKind::Merge = 15,
});

unit_enum_wire!(UnaryOpKind, "unary operator", {
    UnaryOpKind::Not = 1,
    UnaryOpKind::Negate = 2,
    UnaryOpKind::Length = 3,
    UnaryOpKind::Head = 4,
    UnaryOpKind::Tail = 5,
    UnaryOpKind::IsEmpty = 6,
    UnaryOpKind::ToText = 7,
});

/// [`EffectKind`] on the wire. Its own `serde` form is the name used in
/// configuration files.
#[derive(Clone, Copy)]
struct Effect(EffectKind);

impl Serialize for Effect {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let tag = match self.0 {
            EffectKind::ReadFile => 1,
            EffectKind::ReadEnv => 2,
            EffectKind::Network => 3,
        };
        Outgoing::new().envelope(tag, serializer)
    }
}

impl<'de> Deserialize<'de> for Effect {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (tag, fields) = Incoming::envelope(deserializer, "effect kind")?;
        match tag {
            1 => Ok(Effect(EffectKind::ReadFile)),
            2 => Ok(Effect(EffectKind::ReadEnv)),
            3 => Ok(Effect(EffectKind::Network)),
            tag => Err(de::Error::custom(fields.unknown(tag))),
        }
    }
}

fn effects(kinds: &[EffectKind]) -> Vec<Effect> {
    kinds.iter().copied().map(Effect).collect()
}

fn from_effects(effects: Vec<Effect>) -> Vec<EffectKind> {
    effects.into_iter().map(|Effect(kind)| kind).collect()
}

impl Serialize for Location {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Outgoing::new()
            .with(1, &*self.unit)
            .with(2, &self.line)
            .with(3, &self.column)
            .record(serializer)
    }
}

impl<'de> Deserialize<'de> for Location {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut f = Incoming::record(deserializer, "location")?;
        decode(|| {
            let unit: Option<String> = f.opt(1)?;
            Ok(Location::new(unit.unwrap_or_default(), f.get(2)?, f.get(3)?))
        })
    }
}

impl Serialize for Literal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let (tag, fields) = match self {
            Literal::Null => (1, Outgoing::new()),
            Literal::Bool(b) => (2, Outgoing::new().with(1, b)),
            Literal::Int(i) => (3, Outgoing::new().with(1, i)),
            Literal::Float(x) => (4, Outgoing::new().with(1, x)),
            Literal::Text(s) => (5, Outgoing::new().with(1, s)),
        };
        fields.envelope(tag, serializer)
    }
}

impl<'de> Deserialize<'de> for Literal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (tag, mut f) = Incoming::envelope(deserializer, "literal")?;
        decode(|| {
            Ok(match tag {
                1 => Literal::Null,
                2 => Literal::Bool(f.get(1)?),
                3 => Literal::Int(f.get(1)?),
                4 => Literal::Float(f.get(1)?),
                5 => Literal::Text(f.get(1)?),
                tag => return Err(f.unknown(tag)),
            })
        })
    }
}

impl Serialize for Purity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Purity::Pure => Outgoing::new().envelope(1, serializer),
            Purity::Effectful(kinds) => Outgoing::new()
                .with(1, &effects(kinds))
                .envelope(2, serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Purity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (tag, mut f) = Incoming::envelope(deserializer, "purity")?;
        decode(|| match tag {
            1 => Ok(Purity::Pure),
            2 => Ok(Purity::Effectful(from_effects(f.get(1)?))),
            tag => Err(f.unknown(tag)),
        })
    }
}

impl Serialize for Type {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = Outgoing::new();
        let (tag, fields) = match self {
            Type::Unit => (1, fields),
            Type::Bool => (2, fields),
            Type::Int => (3, fields),
            Type::Float => (4, fields),
            Type::Text => (5, fields),
            Type::Array(elem) => (6, fields.with(1, elem)),
            Type::Object(object) => {
                let pairs: Vec<(&String, &FieldType)> = object.iter().collect();
                (7, fields.with(1, &pairs))
            }
            Type::Function {
                params,
                ret,
                purity,
            } => (8, fields.with(1, params).with(2, ret).with(3, purity)),
            Type::Var(var) => (9, fields.with(1, var)),
            Type::Forall(vars, body) => (10, fields.with(1, vars).with(2, body)),
            Type::Effect(kind, result) => (11, fields.with(1, &Effect(*kind)).with(2, result)),
            Type::Recursive(var, body) => (12, fields.with(1, var).with(2, body)),
            Type::Dependent {
                param,
                param_ty,
                ret,
            } => (13, fields.with(1, param).with(2, param_ty).with(3, ret)),
            Type::Unknown => (14, fields),
        };
        fields.envelope(tag, serializer)
    }
}

impl<'de> Deserialize<'de> for Type {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (tag, mut f) = Incoming::envelope(deserializer, "type")?;
        decode(|| {
            Ok(match tag {
                1 => Type::Unit,
                2 => Type::Bool,
                3 => Type::Int,
                4 => Type::Float,
                5 => Type::Text,
                6 => Type::Array(f.get(1)?),
                7 => {
                    let pairs: Vec<(String, FieldType)> = f.opt(1)?.unwrap_or_default();
                    Type::Object(pairs.into_iter().collect())
                }
                8 => Type::Function {
                    params: f.get(1)?,
                    ret: f.get(2)?,
                    purity: f.opt(3)?.unwrap_or_default(),
                },
                9 => Type::Var(f.get(1)?),
                10 => Type::Forall(f.get(1)?, f.get(2)?),
                11 => {
                    let Effect(kind) = f.get(1)?;
                    Type::Effect(kind, f.get(2)?)
                }
                12 => Type::Recursive(f.get(1)?, f.get(2)?),
                13 => Type::Dependent {
                    param: f.get(1)?,
                    param_ty: f.get(2)?,
                    ret: f.get(3)?,
                },
                14 => Type::Unknown,
                tag => return Err(f.unknown(tag)),
            })
        })
    }
}

impl Serialize for TerminationProof {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = Outgoing::new();
        let (tag, fields) = match self {
            TerminationProof::Structural {
                measure,
                parameters,
            } => (1, fields.with(1, measure).with(2, parameters)),
            TerminationProof::Bounded { max_steps } => (2, fields.with(1, max_steps)),
            TerminationProof::Total => (3, fields),
            TerminationProof::Productive { guarantee } => (4, fields.with(1, guarantee)),
            TerminationProof::StrongNormalizationByTyping => (5, fields),
            TerminationProof::WellFounded { measure } => (6, fields.with(1, measure)),
        };
        fields.envelope(tag, serializer)
    }
}

impl<'de> Deserialize<'de> for TerminationProof {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (tag, mut f) = Incoming::envelope(deserializer, "termination proof")?;
        decode(|| {
            Ok(match tag {
                1 => TerminationProof::Structural {
                    measure: f.get(1)?,
                    parameters: f.get(2)?,
                },
                2 => TerminationProof::Bounded {
                    max_steps: f.get(1)?,
                },
                3 => TerminationProof::Total,
                4 => TerminationProof::Productive {
                    guarantee: f.get(1)?,
                },
                5 => TerminationProof::StrongNormalizationByTyping,
                6 => TerminationProof::WellFounded {
                    measure: f.get(1)?,
                },
                tag => return Err(f.unknown(tag)),
            })
        })
    }
}

impl<T: Serialize> Serialize for ProgramNode<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = Outgoing::new()
            .with(1, self.location())
            .with(2, self.info());
        let (tag, fields) = match self {
            ProgramNode::Literal(n) => (1, fields.with(3, &n.value)),
            ProgramNode::Variable(n) => (2, fields.with(3, &n.name)),
            ProgramNode::Lambda(n) => (3, fields.with(3, &n.params).with(4, &n.body)),
            ProgramNode::Apply(n) => (4, fields.with(3, &n.func).with(4, &n.args)),
            ProgramNode::Let(n) => (
                5,
                fields.with(3, &n.binding).with(4, &n.bound).with(5, &n.body),
            ),
            ProgramNode::Conditional(n) => (
                6,
                fields
                    .with(3, &n.condition)
                    .with(4, &n.then_branch)
                    .with(5, &n.else_branch),
            ),
            ProgramNode::ObjectLiteral(n) => (7, fields.with(3, &n.fields)),
            ProgramNode::ArrayLiteral(n) => (8, fields.with(3, &n.elements)),
            ProgramNode::BinaryOp(n) => (
                9,
                fields.with(3, &n.op).with(4, &n.left).with(5, &n.right),
            ),
            ProgramNode::EffectRequest(n) => (
                10,
                fields
                    .with(3, &Effect(n.effect))
                    .with(4, &n.target)
                    .with(5, &n.fallback),
            ),
            ProgramNode::Comment(n) => (11, fields.with(3, &n.text).with(4, &n.target)),
            ProgramNode::LetRec(n) => (
                12,
                fields.with(3, &n.bindings).with(4, &n.bound).with(5, &n.body),
            ),
            ProgramNode::FieldAccess(n) => (13, fields.with(3, &n.object).with(4, &n.field)),
            ProgramNode::UnaryOp(n) => (14, fields.with(3, &n.op).with(4, &n.operand)),
            ProgramNode::Loop(n) => (
                15,
                fields.with(3, &n.var).with(4, &n.count).with(5, &n.body),
            ),
        };
        fields.envelope(tag, serializer)
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for ProgramNode<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (tag, mut f) = Incoming::envelope(deserializer, "program node")?;
        decode(|| {
            let location: Location = f.opt(1)?.unwrap_or_default();
            let info: T = f.get(2)?;
            Ok(match tag {
                1 => ProgramNode::Literal(LiteralNode {
                    value: f.get(3)?,
                    location,
                    info,
                }),
                2 => ProgramNode::Variable(Variable {
                    name: f.get(3)?,
                    location,
                    info,
                }),
                3 => ProgramNode::Lambda(Lambda {
                    params: f.opt(3)?.unwrap_or_default(),
                    body: f.get(4)?,
                    location,
                    info,
                }),
                4 => ProgramNode::Apply(Apply {
                    func: f.get(3)?,
                    args: f.opt(4)?.unwrap_or_default(),
                    location,
                    info,
                }),
                5 => ProgramNode::Let(Let {
                    binding: f.get(3)?,
                    bound: f.opt(4)?,
                    body: f.get(5)?,
                    location,
                    info,
                }),
                6 => ProgramNode::Conditional(Conditional {
                    condition: f.get(3)?,
                    then_branch: f.get(4)?,
                    else_branch: f.get(5)?,
                    location,
                    info,
                }),
                7 => ProgramNode::ObjectLiteral(ObjectLiteral {
                    fields: f.opt(3)?.unwrap_or_default(),
                    location,
                    info,
                }),
                8 => ProgramNode::ArrayLiteral(ArrayLiteral {
                    elements: f.opt(3)?.unwrap_or_default(),
                    location,
                    info,
                }),
                9 => ProgramNode::BinaryOp(BinaryOp {
                    op: f.get(3)?,
                    left: f.get(4)?,
                    right: f.get(5)?,
                    location,
                    info,
                }),
                10 => {
                    let Effect(effect) = f.get(3)?;
                    ProgramNode::EffectRequest(EffectRequest {
                        effect,
                        target: f.get(4)?,
                        fallback: f.opt(5)?,
                        location,
                        info,
                    })
                }
                11 => ProgramNode::Comment(Comment {
                    text: f.get(3)?,
                    target: f.get(4)?,
                    location,
                    info,
                }),
                12 => ProgramNode::LetRec(LetRec {
                    bindings: f.get(3)?,
                    bound: f.opt(4)?,
                    body: f.get(5)?,
                    location,
                    info,
                }),
                13 => ProgramNode::FieldAccess(FieldAccess {
                    object: f.get(3)?,
                    field: f.get(4)?,
                    location,
                    info,
                }),
                14 => ProgramNode::UnaryOp(UnaryOp {
                    op: f.get(3)?,
                    operand: f.get(4)?,
                    location,
                    info,
                }),
                15 => ProgramNode::Loop(Loop {
                    var: f.get(3)?,
                    count: f.get(4)?,
                    body: f.get(5)?,
                    location,
                    info,
                }),
                tag => return Err(f.unknown(tag)),
            })
        })
    }
}

impl Serialize for Kind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = Outgoing::new();
        let (tag, fields) = match self {
            Kind::Star => (1, fields),
            Kind::Arrow(domain, codomain) => (2, fields.with(1, domain).with(2, codomain)),
            Kind::Row(names) => (3, fields.with(1, names)),
        };
        fields.envelope(tag, serializer)
    }
}

impl<'de> Deserialize<'de> for Kind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (tag, mut f) = Incoming::envelope(deserializer, "kind")?;
        decode(|| {
            Ok(match tag {
                1 => Kind::Star,
                2 => Kind::Arrow(f.get(1)?, f.get(2)?),
                3 => Kind::Row(f.opt(1)?.unwrap_or_default()),
                tag => return Err(f.unknown(tag)),
            })
        })
    }
}

impl Serialize for CoreType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = Outgoing::new();
        let (tag, fields) = match self {
            CoreType::TypeVariable(index) => (1, fields.with(1, index)),
            CoreType::Arrow(domain, codomain) => (2, fields.with(1, domain).with(2, codomain)),
            CoreType::Forall(kind, body) => (3, fields.with(1, kind).with(2, body)),
            CoreType::TypeConstructor { name, kind, args } => {
                (4, fields.with(1, name).with(2, kind).with(3, args))
            }
            CoreType::BaseType(name) => (5, fields.with(1, name)),
            CoreType::Mu(body) => (6, fields.with(1, body)),
            CoreType::EffectType(kinds, result) => {
                (7, fields.with(1, &effects(kinds)).with(2, result))
            }
        };
        fields.envelope(tag, serializer)
    }
}

impl<'de> Deserialize<'de> for CoreType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (tag, mut f) = Incoming::envelope(deserializer, "core type")?;
        decode(|| {
            Ok(match tag {
                1 => CoreType::TypeVariable(f.get(1)?),
                2 => CoreType::Arrow(f.get(1)?, f.get(2)?),
                3 => CoreType::Forall(f.get(1)?, f.get(2)?),
                4 => CoreType::TypeConstructor {
                    name: f.get(1)?,
                    kind: f.get(2)?,
                    args: f.opt(3)?.unwrap_or_default(),
                },
                5 => CoreType::BaseType(f.get(1)?),
                6 => CoreType::Mu(f.get(1)?),
                7 => CoreType::EffectType(from_effects(f.get(1)?), f.get(2)?),
                tag => return Err(f.unknown(tag)),
            })
        })
    }
}

impl Serialize for FixGuard {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FixGuard::Fuel(fuel) => Outgoing::new().with(1, fuel).envelope(1, serializer),
            FixGuard::Measure(measures) => {
                Outgoing::new().with(1, measures).envelope(2, serializer)
            }
        }
    }
}

impl<'de> Deserialize<'de> for FixGuard {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (tag, mut f) = Incoming::envelope(deserializer, "guard")?;
        decode(|| match tag {
            1 => Ok(FixGuard::Fuel(f.get(1)?)),
            2 => Ok(FixGuard::Measure(f.get(1)?)),
            tag => Err(f.unknown(tag)),
        })
    }
}

impl Serialize for CasePattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = Outgoing::new();
        let (tag, fields) = match self {
            CasePattern::Constructor { name, arity } => (1, fields.with(1, name).with(2, arity)),
            CasePattern::Literal(literal) => (2, fields.with(1, literal)),
            CasePattern::Wildcard => (3, fields),
        };
        fields.envelope(tag, serializer)
    }
}

impl<'de> Deserialize<'de> for CasePattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (tag, mut f) = Incoming::envelope(deserializer, "case pattern")?;
        decode(|| {
            Ok(match tag {
                1 => CasePattern::Constructor {
                    name: f.get(1)?,
                    arity: f.get(2)?,
                },
                2 => CasePattern::Literal(f.get(1)?),
                3 => CasePattern::Wildcard,
                tag => return Err(f.unknown(tag)),
            })
        })
    }
}

impl Serialize for PrimOp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = Outgoing::new();
        let (tag, fields) = match self {
            PrimOp::Binary(op) => (1, fields.with(1, op)),
            PrimOp::Unary(op) => (2, fields.with(1, op)),
            PrimOp::MakeArray => (3, fields),
            PrimOp::MakeObject(names) => (4, fields.with(1, names)),
            PrimOp::Field(name) => (5, fields.with(1, name)),
        };
        fields.envelope(tag, serializer)
    }
}

impl<'de> Deserialize<'de> for PrimOp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (tag, mut f) = Incoming::envelope(deserializer, "primitive")?;
        decode(|| {
            Ok(match tag {
                1 => PrimOp::Binary(f.get(1)?),
                2 => PrimOp::Unary(f.get(1)?),
                3 => PrimOp::MakeArray,
                4 => PrimOp::MakeObject(f.opt(1)?.unwrap_or_default()),
                5 => PrimOp::Field(f.get(1)?),
                tag => return Err(f.unknown(tag)),
            })
        })
    }
}

impl Serialize for CoreTerm {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = Outgoing::new();
        let (tag, fields) = match self {
            CoreTerm::Variable(index) => (1, fields.with(1, index)),
            CoreTerm::Abstraction { param_ty, body } => {
                (2, fields.with(1, param_ty).with(2, body))
            }
            CoreTerm::Application(func, arg) => (3, fields.with(1, func).with(2, arg)),
            CoreTerm::TypeAbstraction { kind, body } => (4, fields.with(1, kind).with(2, body)),
            CoreTerm::TypeApplication(term, ty) => (5, fields.with(1, term).with(2, ty)),
            CoreTerm::Let(value, body) => (6, fields.with(1, value).with(2, body)),
            CoreTerm::GuardedFix {
                ty,
                members,
                guard,
                body,
                proof,
            } => (
                7,
                fields
                    .with(1, ty)
                    .with(2, members)
                    .with(3, guard)
                    .with(4, body)
                    .with(5, proof),
            ),
            CoreTerm::Constructor { name, ty, args } => {
                (8, fields.with(1, name).with(2, ty).with(3, args))
            }
            CoreTerm::Match { scrutinee, cases } => {
                (9, fields.with(1, scrutinee).with(2, cases))
            }
            CoreTerm::Literal(literal) => (10, fields.with(1, literal)),
            CoreTerm::Primitive { op, args } => (11, fields.with(1, op).with(2, args)),
            CoreTerm::Perform {
                effect,
                target,
                fallback,
            } => (
                12,
                fields
                    .with(1, &Effect(*effect))
                    .with(2, target)
                    .with(3, fallback),
            ),
            CoreTerm::Fold {
                ty,
                members,
                decreasing,
                body,
                proof,
            } => (
                13,
                fields
                    .with(1, ty)
                    .with(2, members)
                    .with(3, decreasing)
                    .with(4, body)
                    .with(5, proof),
            ),
            CoreTerm::Located(location, term) => (14, fields.with(1, location).with(2, term)),
        };
        fields.envelope(tag, serializer)
    }
}

impl<'de> Deserialize<'de> for CoreTerm {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (tag, mut f) = Incoming::envelope(deserializer, "core term")?;
        decode(|| {
            Ok(match tag {
                1 => CoreTerm::Variable(f.get(1)?),
                2 => CoreTerm::Abstraction {
                    param_ty: f.get(1)?,
                    body: f.get(2)?,
                },
                3 => CoreTerm::Application(f.get(1)?, f.get(2)?),
                4 => CoreTerm::TypeAbstraction {
                    kind: f.get(1)?,
                    body: f.get(2)?,
                },
                5 => CoreTerm::TypeApplication(f.get(1)?, f.get(2)?),
                6 => CoreTerm::Let(f.get(1)?, f.get(2)?),
                7 => CoreTerm::GuardedFix {
                    ty: f.get(1)?,
                    members: f.get(2)?,
                    guard: f.get(3)?,
                    body: f.get(4)?,
                    proof: f.get(5)?,
                },
                8 => CoreTerm::Constructor {
                    name: f.get(1)?,
                    ty: f.get(2)?,
                    args: f.opt(3)?.unwrap_or_default(),
                },
                9 => CoreTerm::Match {
                    scrutinee: f.get(1)?,
                    cases: f.opt(2)?.unwrap_or_default(),
                },
                10 => CoreTerm::Literal(f.get(1)?),
                11 => CoreTerm::Primitive {
                    op: f.get(1)?,
                    args: f.opt(2)?.unwrap_or_default(),
                },
                12 => {
                    let Effect(effect) = f.get(1)?;
                    CoreTerm::Perform {
                        effect,
                        target: f.get(2)?,
                        fallback: f.opt(3)?,
                    }
                }
                13 => CoreTerm::Fold {
                    ty: f.get(1)?,
                    members: f.get(2)?,
                    decreasing: f.opt(3)?.unwrap_or_default(),
                    body: f.get(4)?,
                    proof: f.get(5)?,
                },
                14 => CoreTerm::Located(f.get(1)?, f.get(2)?),
                tag => return Err(f.unknown(tag)),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::ast::build::*;
    use crate::termination::analyze;
    use crate::types::{check, TypingDiscipline};

    fn round_trip<V: Serialize + DeserializeOwned + PartialEq + std::fmt::Debug>(value: &V) {
        let text = to_string(value).unwrap();
        let decoded: V = from_str(&text).unwrap();
        assert_eq!(&decoded, value);
    }

    fn sample() -> ProgramNode<()> {
        let_rec(
            vec![binding(
                "len",
                lambda(
                    &["xs"],
                    cond(
                        unary(UnaryOpKind::IsEmpty, var("xs")),
                        int(0),
                        binop(
                            BinOpKind::Add,
                            int(1),
                            apply(var("len"), vec![unary(UnaryOpKind::Tail, var("xs"))]),
                        ),
                    ),
                ),
            )],
            None,
            comment(
                "result",
                object(vec![
                    ("n", apply(var("len"), vec![array(vec![int(1), float(2.5)])])),
                    ("host", read_env("DB_HOST", Some(text("localhost")))),
                    ("names", for_loop("i", int(2), field(var("cfg"), "name"))),
                ]),
            ),
        )
    }

    #[test]
    fn test_literal_numbering_is_stable() {
        let node = at(int(5), Location::new("a.ll", 1, 2));
        assert_eq!(
            serde_json::to_value(&node).unwrap(),
            json!({
                "tag": 1,
                "fields": {
                    "1": {"1": "a.ll", "2": 1, "3": 2},
                    "3": {"tag": 3, "fields": {"1": 5}}
                }
            })
        );
    }

    #[test]
    fn test_effect_kind_keeps_its_config_name() {
        let node = read_env("HOME", None);
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["fields"]["3"], json!({"tag": 2}));
        assert_eq!(
            serde_json::to_value(EffectKind::ReadEnv).unwrap(),
            json!("readEnv")
        );
    }

    #[test]
    fn test_program_round_trip() {
        round_trip(&sample());
    }

    #[test]
    fn test_typed_and_proven_round_trip() {
        let tree = let_in("x", int(5), binop(BinOpKind::Add, var("x"), int(1)));
        let typed = check(&tree, TypingDiscipline::Static).unwrap();
        round_trip(&typed);
        let proven = analyze(&typed).unwrap();
        round_trip(&proven);
    }

    #[test]
    fn test_core_round_trip() {
        let tree = let_in("x", int(5), binop(BinOpKind::Add, var("x"), int(1)));
        let typed = check(&tree, TypingDiscipline::Static).unwrap();
        let proven = analyze(&typed).unwrap();
        let term = crate::core::encode(&proven).unwrap();
        round_trip(&term);
    }

    #[test]
    fn test_unknown_tag() {
        let err = from_str::<ProgramNode<()>>(r#"{"tag": 99, "fields": {}}"#).unwrap_err();
        assert!(matches!(err, WireError::Malformed(_)));
        assert!(err.to_string().contains("unknown program node tag 99"), "{err}");
    }

    #[test]
    fn test_missing_field() {
        let err = from_str::<ProgramNode<()>>(r#"{"tag": 2, "fields": {}}"#).unwrap_err();
        assert!(err.to_string().contains("program node is missing field 3"), "{err}");
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let node: ProgramNode<()> =
            from_str(r#"{"tag": 2, "fields": {"3": "x", "40": true}}"#).unwrap();
        assert_eq!(node, var("x"));
    }
}
