use std::mem;
use std::sync::Arc;

use tracing::trace;

use crate::core::{CasePattern, CoreTerm, FixGuard, FixMember, MatchCase, PrimOp};

use super::ops;
use super::runtime::{Callable, FixCheck, FixValue, FuelBudget, GuardState, RValue};
use super::scope::Scope;
use super::value::Value;
use super::{Context, RuntimeErrorKind, RuntimeError};

impl CoreTerm {
    pub(crate) fn eval<'t>(
        &'t self,
        scope: &Scope<'t>,
        cx: &mut Context<'_>,
    ) -> Result<RValue<'t>, RuntimeError> {
        match self {
            CoreTerm::Variable(index) => scope.get(*index).cloned().ok_or_else(|| {
                cx.error(
                    RuntimeErrorKind::UnboundVariable,
                    format!("index {index} is not bound"),
                )
            }),
            CoreTerm::Abstraction { body, .. } => Ok(Value::Closure(Callable::Closure {
                body: &**body,
                env: scope.clone(),
            })),
            CoreTerm::Application(func, arg) => {
                let func = func.eval(scope, cx)?;
                let arg = arg.eval(scope, cx)?;
                apply(func, arg, cx)
            }
            // Types are erased.
            CoreTerm::TypeAbstraction { body, .. } => body.eval(scope, cx),
            CoreTerm::TypeApplication(term, _) => term.eval(scope, cx),
            CoreTerm::Let(value, body) => {
                let value = value.eval(scope, cx)?;
                body.eval(&scope.push(value), cx)
            }
            CoreTerm::GuardedFix {
                members,
                guard,
                body,
                ..
            } => {
                let (check, state) = match guard {
                    FixGuard::Fuel(fuel) => match fuel.eval(scope, cx)? {
                        Value::Int(fuel) => (FixCheck::Fuel(fuel), GuardState::Fuel(None)),
                        other => {
                            return Err(cx.error(
                                RuntimeErrorKind::InvalidOperand,
                                format!("fuel must be an int, found {}", other.type_name()),
                            ))
                        }
                    },
                    FixGuard::Measure(measures) => {
                        (FixCheck::Measure(measures), GuardState::Below(None))
                    }
                };
                Ok(fix_value(body, scope, members, check, state, cx))
            }
            CoreTerm::Fold {
                members,
                decreasing,
                body,
                ..
            } => Ok(fix_value(
                body,
                scope,
                members,
                FixCheck::Structural(decreasing),
                GuardState::Below(None),
                cx,
            )),
            CoreTerm::Constructor { name, args, .. } => {
                let args = args
                    .iter()
                    .map(|arg| arg.eval(scope, cx))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Closure(Callable::Packed {
                    name: name.as_str(),
                    args,
                }))
            }
            CoreTerm::Match { scrutinee, cases } => {
                let value = scrutinee.eval(scope, cx)?;
                let Some(case) = cases.iter().find(|case| accepts(&case.pattern, &value)) else {
                    return Err(cx.error(
                        RuntimeErrorKind::InvalidOperand,
                        format!("no case accepts {}", value.type_name()),
                    ));
                };
                eval_case(case, value, scope, cx)
            }
            CoreTerm::Literal(literal) => Ok(Value::from_literal(literal)),
            CoreTerm::Primitive { op, args } => {
                let args = args
                    .iter()
                    .map(|arg| arg.eval(scope, cx))
                    .collect::<Result<Vec<_>, _>>()?;
                primitive(op, args)
                    .map_err(|message| cx.error(RuntimeErrorKind::InvalidOperand, message))
            }
            CoreTerm::Perform {
                effect,
                target,
                fallback,
            } => {
                let target = match target.eval(scope, cx)? {
                    Value::Text(target) => target,
                    other => {
                        return Err(cx.error(
                            RuntimeErrorKind::InvalidOperand,
                            format!("`{effect}` needs a text target, found {}", other.type_name()),
                        ))
                    }
                };
                match cx.policy.perform(*effect, &target, cx.host, &cx.location)? {
                    Some(result) => Ok(Value::Text(result)),
                    None => match fallback {
                        Some(fallback) => fallback.eval(scope, cx),
                        None => Ok(Value::Null),
                    },
                }
            }
            CoreTerm::Located(location, term) => {
                let outer = mem::replace(&mut cx.location, location.clone());
                let result = term.eval(scope, cx);
                cx.location = outer;
                result
            }
        }
    }
}

fn fix_value<'t>(
    body: &'t CoreTerm,
    scope: &Scope<'t>,
    members: &'t [FixMember],
    check: FixCheck<'t>,
    state: GuardState,
    cx: &Context<'_>,
) -> RValue<'t> {
    let fix = FixValue {
        body,
        env: scope.clone(),
        members,
        check,
        location: cx.location.clone(),
    };
    Value::Closure(Callable::Fix(Arc::new(fix), state))
}

fn apply<'t>(
    func: RValue<'t>,
    arg: RValue<'t>,
    cx: &mut Context<'_>,
) -> Result<RValue<'t>, RuntimeError> {
    match func {
        Value::Closure(Callable::Closure { body, env }) => body.eval(&env.push(arg), cx),
        Value::Closure(Callable::Fix(fix, state)) => unroll(fix, state, arg, cx),
        other => Err(cx.error(
            RuntimeErrorKind::NotCallable,
            format!("{} is not callable", other.type_name()),
        )),
    }
}

/// One activation of a fixed point on a packed input.
fn unroll<'t>(
    fix: Arc<FixValue<'t>>,
    state: GuardState,
    input: RValue<'t>,
    cx: &mut Context<'_>,
) -> Result<RValue<'t>, RuntimeError> {
    let (member, args) = match &input {
        Value::Closure(Callable::Packed { name, args }) => {
            match fix.members.iter().position(|m| m.name == *name) {
                Some(member) => (member, args),
                None => {
                    return Err(cx.error(
                        RuntimeErrorKind::InvalidOperand,
                        format!("`{name}` is not a member of this fixed point"),
                    ))
                }
            }
        }
        other => {
            return Err(cx.error(
                RuntimeErrorKind::InvalidOperand,
                format!("a fixed point needs a packed call, found {}", other.type_name()),
            ))
        }
    };
    let next = next_state(&fix, state, member, args, cx)?;
    cx.activations += 1;
    trace!(member = %fix.members[member].name, ?next, "unrolling");

    let this = Value::Closure(Callable::Fix(fix.clone(), next));
    let function = fix.body.eval(&fix.env, cx)?;
    let dispatch = apply(function, this, cx)?;
    apply(dispatch, input, cx)
}

/// Checks the guard of an activation and returns the state its recursive
/// calls run under.
fn next_state<'t>(
    fix: &FixValue<'t>,
    state: GuardState,
    member: usize,
    args: &[RValue<'t>],
    cx: &mut Context<'_>,
) -> Result<GuardState, RuntimeError> {
    let name = &fix.members[member].name;
    let violation = |message: String| {
        RuntimeError::new(RuntimeErrorKind::TerminationViolation, &fix.location, message)
    };
    let measure = match (&fix.check, &state) {
        (FixCheck::Fuel(fuel), GuardState::Fuel(budget)) => {
            let budget = budget
                .clone()
                .unwrap_or_else(|| Arc::new(FuelBudget::new(*fuel)));
            if budget.burn() < 0 {
                return Err(violation(format!("`{name}` ran out of fuel")));
            }
            return Ok(GuardState::Fuel(Some(budget)));
        }
        (FixCheck::Measure(measures), GuardState::Below(_)) => {
            let Some(measure) = measures.get(member) else {
                return Err(violation(format!("`{name}` has no measure")));
            };
            match measure.eval(&fix.env.push_all(args.iter().cloned()), cx)? {
                Value::Int(value) if value >= 0 => value as u64,
                other => {
                    return Err(violation(format!(
                        "measure of `{name}` must be a natural number, found {other}"
                    )))
                }
            }
        }
        (FixCheck::Structural(decreasing), GuardState::Below(_)) => {
            match decreasing.get(member).and_then(|position| args.get(*position)) {
                Some(arg) => arg.size(),
                None => return Err(violation(format!("`{name}` has no decreasing argument"))),
            }
        }
        (_, state) => {
            return Err(violation(format!(
                "guard state {state:?} does not fit the fixed point of `{name}`"
            )))
        }
    };
    if let GuardState::Below(Some(bound)) = state {
        if measure >= bound {
            return Err(violation(format!(
                "`{name}` did not decrease: {measure} is not below {bound}"
            )));
        }
    }
    Ok(GuardState::Below(Some(measure)))
}

fn accepts(pattern: &CasePattern, value: &RValue<'_>) -> bool {
    match (pattern, value) {
        (CasePattern::Wildcard, _) => true,
        (CasePattern::Literal(literal), value) => Value::from_literal(literal) == *value,
        (
            CasePattern::Constructor { name, arity },
            Value::Closure(Callable::Packed { name: packed, args }),
        ) => name == packed && *arity == args.len(),
        _ => false,
    }
}

fn eval_case<'t>(
    case: &'t MatchCase,
    value: RValue<'t>,
    scope: &Scope<'t>,
    cx: &mut Context<'_>,
) -> Result<RValue<'t>, RuntimeError> {
    match (&case.pattern, value) {
        (CasePattern::Constructor { .. }, Value::Closure(Callable::Packed { args, .. })) => {
            case.body.eval(&scope.push_all(args), cx)
        }
        _ => case.body.eval(scope, cx),
    }
}

fn primitive<'t>(op: &'t PrimOp, mut args: Vec<RValue<'t>>) -> Result<RValue<'t>, String> {
    if let Some(arity) = op.arity() {
        if args.len() != arity {
            return Err(format!("primitive expects {arity} operands, got {}", args.len()));
        }
    }
    match op {
        PrimOp::Binary(kind) => {
            let right = args.pop();
            let left = args.pop();
            match (left, right) {
                (Some(left), Some(right)) => ops::binary(*kind, left, right),
                _ => Err(format!("`{}` needs two operands", kind.symbol())),
            }
        }
        PrimOp::Unary(kind) => match args.pop() {
            Some(operand) => ops::unary(*kind, operand),
            None => Err(format!("`{}` needs an operand", kind.name())),
        },
        PrimOp::MakeArray => Ok(Value::Array(args)),
        PrimOp::MakeObject(names) => ops::make_object(names, args),
        PrimOp::Field(name) => match args.pop() {
            Some(object) => ops::field(object, name),
            None => Err(format!("access of `{name}` needs an object")),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::path::Path;

    use super::*;
    use crate::ast::{BinOpKind, EffectKind, Literal, Location};
    use crate::core::{CoreType, Kind};
    use crate::interpreter::{evaluate_with_host, EffectPolicy, Host, Value};
    use crate::termination::TerminationProof;

    struct NoHost;

    impl Host for NoHost {
        fn read_file(&self, path: &Path) -> io::Result<String> {
            panic!("unexpected file read of {}", path.display())
        }

        fn env_var(&self, name: &str) -> Option<String> {
            panic!("unexpected environment read of {name}")
        }

        fn fetch(&self, url: &str) -> Result<String, String> {
            panic!("unexpected fetch of {url}")
        }
    }

    fn run(term: &CoreTerm) -> Result<Value, RuntimeError> {
        evaluate_with_host(term, &EffectPolicy::pure(), &NoHost)
    }

    fn int(i: i64) -> CoreTerm {
        CoreTerm::Literal(Literal::Int(i))
    }

    fn add(left: CoreTerm, right: CoreTerm) -> CoreTerm {
        CoreTerm::prim(PrimOp::Binary(BinOpKind::Add), vec![left, right])
    }

    /// `fix (\self. \input. match input { count n => if n <= 0 then 0 else 1 + self (count (n - 1)) })`
    fn countdown(guard: Option<FixGuard>) -> CoreTerm {
        let member = FixMember {
            name: "count".to_string(),
            arity: 1,
        };
        let recurse = CoreTerm::app(
            CoreTerm::Variable(2),
            CoreTerm::Constructor {
                name: "count".to_string(),
                ty: CoreType::dynamic(),
                args: vec![CoreTerm::prim(
                    PrimOp::Binary(BinOpKind::Sub),
                    vec![CoreTerm::Variable(0), int(1)],
                )],
            },
        );
        let case_body = CoreTerm::Match {
            scrutinee: Box::new(CoreTerm::prim(
                PrimOp::Binary(BinOpKind::LtEq),
                vec![CoreTerm::Variable(0), int(0)],
            )),
            cases: vec![
                MatchCase {
                    pattern: CasePattern::Literal(Literal::Bool(true)),
                    body: int(0),
                },
                MatchCase {
                    pattern: CasePattern::Wildcard,
                    body: add(int(1), recurse),
                },
            ],
        };
        let body = CoreTerm::lambda(
            CoreType::dynamic(),
            CoreTerm::lambda(
                CoreType::dynamic(),
                CoreTerm::Match {
                    scrutinee: Box::new(CoreTerm::Variable(0)),
                    cases: vec![MatchCase {
                        pattern: CasePattern::Constructor {
                            name: "count".to_string(),
                            arity: 1,
                        },
                        body: case_body,
                    }],
                },
            ),
        );
        match guard {
            Some(guard) => CoreTerm::GuardedFix {
                ty: CoreType::dynamic(),
                members: vec![member],
                guard,
                body: Box::new(body),
                proof: TerminationProof::Bounded { max_steps: 0 },
            },
            None => CoreTerm::Fold {
                ty: CoreType::dynamic(),
                members: vec![member],
                decreasing: vec![0],
                body: Box::new(body),
                proof: TerminationProof::Structural {
                    measure: "n".to_string(),
                    parameters: vec![0],
                },
            },
        }
    }

    fn call(fix: CoreTerm, n: i64) -> CoreTerm {
        CoreTerm::app(
            fix,
            CoreTerm::Constructor {
                name: "count".to_string(),
                ty: CoreType::dynamic(),
                args: vec![int(n)],
            },
        )
    }

    #[test]
    fn test_beta_reduction() {
        let term = CoreTerm::app(
            CoreTerm::lambda(CoreType::base("Int"), add(CoreTerm::Variable(0), int(1))),
            int(41),
        );
        assert_eq!(run(&term), Ok(Value::Int(42)));
    }

    #[test]
    fn test_let_shadows() {
        let term = CoreTerm::let_in(int(1), CoreTerm::let_in(int(2), CoreTerm::Variable(0)));
        assert_eq!(run(&term), Ok(Value::Int(2)));
    }

    #[test]
    fn test_types_are_erased() {
        let id = CoreTerm::TypeAbstraction {
            kind: Kind::Star,
            body: Box::new(CoreTerm::lambda(CoreType::TypeVariable(0), CoreTerm::Variable(0))),
        };
        let term = CoreTerm::app(CoreTerm::TypeApplication(Box::new(id), CoreType::base("Int")), int(7));
        assert_eq!(run(&term), Ok(Value::Int(7)));
    }

    #[test]
    fn test_unbound_index() {
        let err = run(&CoreTerm::located(&Location::new("t", 3, 4), CoreTerm::Variable(0))).unwrap_err();
        assert_eq!(err.kind(), RuntimeErrorKind::UnboundVariable);
        assert_eq!(err.location(), &Location::new("t", 3, 4));
    }

    #[test]
    fn test_not_callable() {
        let err = run(&CoreTerm::app(int(1), int(2))).unwrap_err();
        assert_eq!(err.kind(), RuntimeErrorKind::NotCallable);
    }

    #[test]
    fn test_fuel_allows_exactly_the_bound() {
        let fix = countdown(Some(FixGuard::Fuel(Box::new(int(3)))));
        assert_eq!(run(&call(fix, 3)), Ok(Value::Int(3)));
    }

    #[test]
    fn test_fuel_exhausted() {
        let fix = countdown(Some(FixGuard::Fuel(Box::new(int(2)))));
        let err = run(&call(fix, 3)).unwrap_err();
        assert_eq!(err.kind(), RuntimeErrorKind::TerminationViolation);
    }

    #[test]
    fn test_each_outermost_call_gets_its_own_fuel() {
        let fix = countdown(Some(FixGuard::Fuel(Box::new(int(3)))));
        let term = CoreTerm::let_in(
            fix,
            add(call(CoreTerm::Variable(0), 3), call(CoreTerm::Variable(0), 3)),
        );
        assert_eq!(run(&term), Ok(Value::Int(6)));
    }

    #[test]
    fn test_measure_must_decrease() {
        // A constant measure never decreases.
        let fix = countdown(Some(FixGuard::Measure(vec![int(5)])));
        let err = run(&call(fix, 2)).unwrap_err();
        assert_eq!(err.kind(), RuntimeErrorKind::TerminationViolation);

        let fix = countdown(Some(FixGuard::Measure(vec![CoreTerm::Variable(0)])));
        assert_eq!(run(&call(fix, 4)), Ok(Value::Int(4)));
    }

    #[test]
    fn test_structural_guard_rejects_same_size() {
        // Ints all have size one, so the first recursive call is rejected.
        let err = run(&call(countdown(None), 2)).unwrap_err();
        assert_eq!(err.kind(), RuntimeErrorKind::TerminationViolation);
        assert_eq!(run(&call(countdown(None), 0)), Ok(Value::Int(0)));
    }

    #[test]
    fn test_perform_fallback_only_when_absent() {
        let term = CoreTerm::Perform {
            effect: EffectKind::ReadEnv,
            target: Box::new(CoreTerm::Literal(Literal::Text("HOME".to_string()))),
            fallback: Some(Box::new(CoreTerm::Variable(9))),
        };
        // The fallback would fail if it were evaluated.
        assert_eq!(
            run(&term),
            Ok(Value::text(crate::interpreter::PURE_ENV_MOCK))
        );
    }

    #[test]
    fn test_function_result_is_not_data() {
        let err = run(&CoreTerm::lambda(CoreType::dynamic(), CoreTerm::Variable(0))).unwrap_err();
        assert_eq!(err.kind(), RuntimeErrorKind::NotData);
    }
}
