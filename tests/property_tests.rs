//! Properties that must hold for every accepted program

use langlang::ast::build::*;
use langlang::ast::{BinOpKind, ProgramNode, UnaryOpKind};
use langlang::config::{PipelineConfig, PolicyKind};
use langlang::interpreter::{evaluate_reference, EffectPolicy, SystemHost, Value};
use langlang::{Pipeline, PipelineError};
use proptest::prelude::*;

fn arithmetic() -> impl Strategy<Value = BinOpKind> {
    prop_oneof![
        Just(BinOpKind::Add),
        Just(BinOpKind::Sub),
        Just(BinOpKind::Mul),
    ]
}

/// Integer-valued programs over one free name `x`. Every other name is
/// bound by the construct that introduces it, and only used inside it.
fn int_program() -> impl Strategy<Value = ProgramNode<()>> {
    let leaf = prop_oneof![(-50i64..50).prop_map(int), Just(var("x"))];
    leaf.prop_recursive(5, 48, 3, |inner| {
        prop_oneof![
            (arithmetic(), inner.clone(), inner.clone()).prop_map(|(op, a, b)| binop(op, a, b)),
            (inner.clone(), inner.clone(), inner.clone()).prop_map(|(a, b, c)| {
                cond(binop(BinOpKind::Lt, a, b), c, int(0))
            }),
            (inner.clone(), inner.clone())
                .prop_map(|(a, b)| let_in("y", a, binop(BinOpKind::Add, var("y"), b))),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| {
                apply(lambda(&["z"], binop(BinOpKind::Sub, var("z"), b)), vec![a])
            }),
            (1i64..4, inner.clone()).prop_map(|(n, a)| {
                unary(
                    UnaryOpKind::Head,
                    for_loop("i", int(n), binop(BinOpKind::Mul, var("i"), a)),
                )
            }),
            inner.clone().prop_map(|a| field(object(vec![("v", a), ("w", int(1))]), "v")),
            inner.prop_map(|a| unary(UnaryOpKind::Negate, a)),
        ]
    })
}

fn closed(x: i64, body: ProgramNode<()>) -> ProgramNode<()> {
    let_in("x", int(x), body)
}

fn pure_pipeline() -> Pipeline {
    let mut config = PipelineConfig::default();
    config.effects.policy = PolicyKind::Pure;
    Pipeline::new(config)
}

fn sum_of(elements: &[i64]) -> ProgramNode<()> {
    let sum = lambda(
        &["xs"],
        cond(
            unary(UnaryOpKind::IsEmpty, var("xs")),
            int(0),
            binop(
                BinOpKind::Add,
                unary(UnaryOpKind::Head, var("xs")),
                apply(var("sum"), vec![unary(UnaryOpKind::Tail, var("xs"))]),
            ),
        ),
    );
    let_in(
        "sum",
        sum,
        apply(
            var("sum"),
            vec![array(elements.iter().copied().map(int).collect())],
        ),
    )
}

fn agree(
    core: Result<Value, PipelineError>,
    reference: Result<Value, langlang::interpreter::RuntimeError>,
) -> Result<(), TestCaseError> {
    match (core, reference) {
        (Ok(left), Ok(right)) => prop_assert_eq!(left, right),
        (Err(PipelineError::Runtime(left)), Err(right)) => {
            prop_assert_eq!(left.kind(), right.kind())
        }
        (core, reference) => {
            prop_assert!(false, "core gave {core:?}, reference gave {reference:?}")
        }
    }
    Ok(())
}

proptest! {
    #[test]
    fn prop_evaluation_is_deterministic(x in -20i64..20, body in int_program()) {
        let pipeline = pure_pipeline();
        let tree = closed(x, body);
        let first = pipeline.run(&tree).map_err(|err| err.to_string());
        let second = pipeline.run(&tree).map_err(|err| err.to_string());
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_core_agrees_with_reference(x in -20i64..20, body in int_program()) {
        let pipeline = pure_pipeline();
        let tree = closed(x, body);
        let host = SystemHost::default();
        let core = pipeline.run_with_host(&tree, &host);
        let reference = evaluate_reference(&tree, &EffectPolicy::pure(), &host);
        agree(core, reference)?;
    }

    #[test]
    fn prop_structural_sum_agrees(elements in prop::collection::vec(-1000i64..1000, 0..12)) {
        let pipeline = pure_pipeline();
        let tree = sum_of(&elements);
        let value = pipeline.run(&tree).unwrap();
        prop_assert_eq!(&value, &Value::Int(elements.iter().sum()));

        let reference = evaluate_reference(&tree, &EffectPolicy::pure(), &SystemHost::default());
        prop_assert_eq!(Ok(value), reference);
    }

    #[test]
    fn prop_loop_length_matches_count(n in 0i64..20) {
        let tree = unary(UnaryOpKind::Length, for_loop("i", int(n), var("i")));
        prop_assert_eq!(pure_pipeline().run(&tree).unwrap(), Value::Int(n));
    }
}
