use indexmap::IndexMap;
use tracing::debug;

use crate::ast::{BinOpKind, Binding, Location, NodeRef, ProgramNode};
use crate::types::Type;

use super::environment::{Environment, RecMember};
use super::host::Host;
use super::ops;
use super::value::{Closure, Value};
use super::{Context, EffectPolicy, RuntimeError, RuntimeErrorKind};

/// Evaluates a program tree directly by name, without checking or encoding.
///
/// Guards are not enforced here; only a negative loop count is rejected, as
/// the core evaluator rejects it.
pub fn evaluate_reference(
    tree: &ProgramNode<()>,
    policy: &EffectPolicy,
    host: &dyn Host,
) -> Result<Value, RuntimeError> {
    let mut cx = Context::new(policy, host);
    let value = tree.eval(&Environment::empty(), &mut cx)?;
    debug!(policy = policy.name(), "evaluated program tree");
    if value.is_data() {
        Ok(value)
    } else {
        Err(RuntimeError::new(
            RuntimeErrorKind::NotData,
            tree.location(),
            format!("the result ({}) contains a function", value.type_name()),
        ))
    }
}

impl ProgramNode<()> {
    fn eval(&self, env: &Environment, cx: &mut Context<'_>) -> Result<Value, RuntimeError> {
        let location = self.location();
        let error = |kind, message: String| RuntimeError::new(kind, location, message);
        match self {
            ProgramNode::Literal(lit) => Ok(Value::from_literal(&lit.value)),
            ProgramNode::Variable(var) => env.lookup(&var.name).ok_or_else(|| {
                error(
                    RuntimeErrorKind::UnboundVariable,
                    format!("`{}` is not bound", var.name),
                )
            }),
            ProgramNode::Lambda(lambda) => Ok(Value::Closure(Closure::new(
                lambda.params.iter().map(|p| p.name.clone()).collect(),
                lambda.body.clone(),
                env.clone(),
            ))),
            ProgramNode::Apply(apply) => {
                let mut func = apply.func.eval(env, cx)?;
                if apply.args.is_empty() {
                    return call(func, Value::Null, location, cx);
                }
                for arg in &apply.args {
                    let arg = arg.eval(env, cx)?;
                    func = call(func, arg, location, cx)?;
                }
                Ok(func)
            }
            ProgramNode::Let(let_node) => {
                let binding = &let_node.binding;
                if binding.value.mentions(&binding.name) {
                    let env = extend_group(env, &[binding])?;
                    return let_node.body.eval(&env, cx);
                }
                let value = bind_value(binding, env, cx)?;
                let_node.body.eval(&env.extend(&binding.name, value), cx)
            }
            ProgramNode::LetRec(group) => {
                let members: Vec<&Binding<()>> = group.bindings.iter().collect();
                let recursive = members
                    .iter()
                    .any(|b| members.iter().any(|m| b.value.mentions(&m.name)));
                let mut scope = env.clone();
                if recursive {
                    scope = extend_group(env, &members)?;
                } else {
                    for binding in members {
                        let value = bind_value(binding, &scope, cx)?;
                        scope = scope.extend(&binding.name, value);
                    }
                }
                group.body.eval(&scope, cx)
            }
            ProgramNode::Conditional(cond) => match cond.condition.eval(env, cx)? {
                Value::Bool(true) => cond.then_branch.eval(env, cx),
                Value::Bool(false) => cond.else_branch.eval(env, cx),
                other => Err(error(
                    RuntimeErrorKind::InvalidOperand,
                    format!("condition must be bool, found {}", other.type_name()),
                )),
            },
            ProgramNode::ObjectLiteral(obj) => {
                let mut fields = IndexMap::with_capacity(obj.fields.len());
                for (name, value) in &obj.fields {
                    fields.insert(name.clone(), value.eval(env, cx)?);
                }
                Ok(Value::Object(fields))
            }
            ProgramNode::ArrayLiteral(arr) => arr
                .elements
                .iter()
                .map(|e| e.eval(env, cx))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            ProgramNode::FieldAccess(access) => {
                let object = access.object.eval(env, cx)?;
                ops::field(object, &access.field)
                    .map_err(|message| error(RuntimeErrorKind::InvalidOperand, message))
            }
            ProgramNode::BinaryOp(op) => {
                let left = op.left.eval(env, cx)?;
                match (op.op, left) {
                    (BinOpKind::And, Value::Bool(false)) => Ok(Value::Bool(false)),
                    (BinOpKind::Or, Value::Bool(true)) => Ok(Value::Bool(true)),
                    (BinOpKind::And | BinOpKind::Or, Value::Bool(_)) => op.right.eval(env, cx),
                    (BinOpKind::And | BinOpKind::Or, other) => Err(error(
                        RuntimeErrorKind::InvalidOperand,
                        format!(
                            "`{}` needs bool operands, found {}",
                            op.op.symbol(),
                            other.type_name()
                        ),
                    )),
                    (kind, left) => {
                        let right = op.right.eval(env, cx)?;
                        ops::binary(kind, left, right)
                            .map_err(|message| error(RuntimeErrorKind::InvalidOperand, message))
                    }
                }
            }
            ProgramNode::UnaryOp(op) => {
                let operand = op.operand.eval(env, cx)?;
                ops::unary(op.op, operand)
                    .map_err(|message| error(RuntimeErrorKind::InvalidOperand, message))
            }
            ProgramNode::Loop(loop_node) => {
                let count = match loop_node.count.eval(env, cx)? {
                    Value::Int(count) => count,
                    other => {
                        return Err(error(
                            RuntimeErrorKind::InvalidOperand,
                            format!("loop count must be an int, found {}", other.type_name()),
                        ))
                    }
                };
                if count < 0 {
                    return Err(error(
                        RuntimeErrorKind::TerminationViolation,
                        format!("loop over `{}` has negative count {count}", loop_node.var),
                    ));
                }
                (0..count)
                    .map(|i| loop_node.body.eval(&env.extend(&loop_node.var, Value::Int(i)), cx))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array)
            }
            ProgramNode::EffectRequest(request) => {
                let target = match request.target.eval(env, cx)? {
                    Value::Text(target) => target,
                    other => {
                        return Err(error(
                            RuntimeErrorKind::InvalidOperand,
                            format!(
                                "`{}` needs a text target, found {}",
                                request.effect,
                                other.type_name()
                            ),
                        ))
                    }
                };
                match cx.policy.perform(request.effect, &target, cx.host, location)? {
                    Some(result) => Ok(Value::Text(result)),
                    None => match &request.fallback {
                        Some(fallback) => fallback.eval(env, cx),
                        None => Ok(Value::Null),
                    },
                }
            }
            ProgramNode::Comment(comment) => comment.target.eval(env, cx),
        }
    }
}

/// Applies a function to one argument. Closures are curried: a closure with
/// parameters left over evaluates to a closure over the rest.
fn call(
    func: Value,
    arg: Value,
    location: &Location,
    cx: &mut Context<'_>,
) -> Result<Value, RuntimeError> {
    let closure = match func {
        Value::Closure(closure) => closure,
        other => {
            return Err(RuntimeError::new(
                RuntimeErrorKind::NotCallable,
                location,
                format!("{} is not callable", other.type_name()),
            ))
        }
    };
    let data = &closure.0;
    match data.params.split_first() {
        None => data.body.eval(&data.env, cx),
        Some((first, [])) => data.body.eval(&data.env.extend(first, arg), cx),
        Some((first, rest)) => Ok(Value::Closure(Closure::new(
            rest.to_vec(),
            data.body.clone(),
            data.env.extend(first, arg),
        ))),
    }
}

fn bind_value(
    binding: &Binding<()>,
    env: &Environment,
    cx: &mut Context<'_>,
) -> Result<Value, RuntimeError> {
    let value = binding.value.eval(env, cx)?;
    let Some(Type::Object(fields)) = &binding.annotation else {
        return Ok(value);
    };
    let defaults: IndexMap<String, Value> = fields
        .iter()
        .filter_map(|(name, field)| {
            field
                .default
                .as_ref()
                .map(|d| (name.clone(), Value::from_literal(d)))
        })
        .collect();
    if defaults.is_empty() {
        return Ok(value);
    }
    ops::binary(BinOpKind::Merge, Value::Object(defaults), value).map_err(|message| {
        RuntimeError::new(RuntimeErrorKind::InvalidOperand, &binding.location, message)
    })
}

fn extend_group(env: &Environment, members: &[&Binding<()>]) -> Result<Environment, RuntimeError> {
    let mut group = Vec::with_capacity(members.len());
    for member in members {
        let Some(lambda) = member.value.as_lambda() else {
            return Err(RuntimeError::new(
                RuntimeErrorKind::InvalidOperand,
                &member.location,
                format!("recursive binding `{}` is not a function", member.name),
            ));
        };
        group.push(RecMember {
            name: member.name.clone(),
            params: lambda.params.iter().map(|p| p.name.clone()).collect(),
            body: NodeRef::clone(&lambda.body),
        });
    }
    Ok(env.extend_group(group))
}
