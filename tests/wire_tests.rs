//! Programs and core terms crossing a process boundary as JSON

use std::io::Write;
use std::process::{Command, Stdio};

use langlang::ast::build::*;
use langlang::ast::{BinOpKind, Location, ProgramNode, UnaryOpKind};
use langlang::config::PipelineConfig;
use langlang::core::CoreTerm;
use langlang::interpreter::{evaluate, EffectPolicy, Value};
use langlang::termination::ProvenTree;
use langlang::wire::{self, WireError};
use langlang::{Pipeline, ParsedProgram};

fn replicas() -> ParsedProgram {
    let_in(
        "count",
        int(3),
        object(vec![
            ("name", text("api")),
            (
                "replicas",
                for_loop(
                    "i",
                    int(3),
                    binop(
                        BinOpKind::Concat,
                        text("replica-"),
                        unary(UnaryOpKind::ToText, var("i")),
                    ),
                ),
            ),
            ("count", var("count")),
        ]),
    )
}

#[test]
fn decoded_program_runs_like_the_original() {
    let pipeline = Pipeline::default();
    let tree = replicas();

    let json = wire::to_string(&tree).unwrap();
    let decoded: ParsedProgram = wire::from_str(&json).unwrap();

    assert_eq!(decoded, tree);
    assert_eq!(pipeline.run(&decoded).unwrap(), pipeline.run(&tree).unwrap());
}

#[test]
fn core_term_survives_the_wire() {
    let pipeline = Pipeline::default();
    let typed = pipeline.check(&replicas()).unwrap();
    let proven = pipeline.analyze(&typed).unwrap();
    let term = pipeline.encode(&proven).unwrap();

    let decoded: CoreTerm = wire::from_str(&wire::to_string(&term).unwrap()).unwrap();
    assert_eq!(decoded, term);

    let value = evaluate(&decoded, &EffectPolicy::pure()).unwrap();
    assert_eq!(
        serde_json::to_string(&value).unwrap(),
        r#"{"name":"api","replicas":["replica-0","replica-1","replica-2"],"count":3}"#
    );
}

#[test]
fn proven_tree_carries_proofs_across() {
    let pipeline = Pipeline::default();
    let typed = pipeline.check(&replicas()).unwrap();
    let proven = pipeline.analyze(&typed).unwrap();

    let decoded: ProvenTree = wire::from_str(&wire::to_string(&proven).unwrap()).unwrap();
    assert_eq!(proven, decoded);
    assert_eq!(
        pipeline.encode(&decoded).unwrap(),
        pipeline.encode(&proven).unwrap()
    );
}

#[test]
fn handwritten_envelope_decodes() {
    let json = r#"{
        "tag": 9,
        "fields": {
            "1": {"1": "hand.ll", "2": 1, "3": 1},
            "3": {"tag": 1},
            "4": {"tag": 1, "fields": {"3": {"tag": 3, "fields": {"1": 40}}}},
            "5": {"tag": 1, "fields": {"3": {"tag": 3, "fields": {"1": 2}}}}
        }
    }"#;
    let tree: ParsedProgram = wire::from_str(json).unwrap();
    assert_eq!(tree.location(), &Location::new("hand.ll", 1, 1));
    assert_eq!(Pipeline::default().run(&tree).unwrap(), Value::Int(42));
}

#[test]
fn garbage_is_rejected() {
    let err = wire::from_str::<ProgramNode<()>>("{\"tag\": ").unwrap_err();
    assert!(matches!(err, WireError::Json(_)));

    let err = wire::from_str::<ProgramNode<()>>("[1, 2]").unwrap_err();
    assert!(matches!(err, WireError::Malformed(_)));

    let err = wire::from_str::<ProgramNode<()>>(r#"{"tag": 1, "fields": {"3": 7}}"#).unwrap_err();
    assert!(matches!(err, WireError::Malformed(_)));
}

#[test]
fn binary_evaluates_program_from_stdin() {
    let input = wire::to_string(&replicas()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("langlang.json");
    std::fs::write(&config, r#"{"effects": {"policy": "pure"}}"#).unwrap();

    let mut child = Command::new(env!("CARGO_BIN_EXE_langlang-eval"))
        .env(langlang::config::CONFIG_ENV, &config)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(input.as_bytes())
        .unwrap();
    let output = child.wait_with_output().unwrap();

    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["replicas"][2], "replica-2");
    assert_eq!(value["count"], 3);
}

#[test]
fn binary_reports_kind_and_location() {
    let tree = let_binding(
        binding("f", lambda(&["x"], apply(var("f"), vec![var("x")])))
            .located(Location::new("loop.ll", 2, 5)),
        None,
        apply(var("f"), vec![int(1)]),
    );
    let input = wire::to_string(&tree).unwrap();

    let mut child = Command::new(env!("CARGO_BIN_EXE_langlang-eval"))
        .env_remove(langlang::config::CONFIG_ENV)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(input.as_bytes())
        .unwrap();
    let output = child.wait_with_output().unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("TerminationError.UnprovableRecursion"), "{stderr}");
    assert!(stderr.contains("loop.ll"), "{stderr}");
}

#[test]
fn config_default_matches_pipeline_default() {
    assert_eq!(Pipeline::default().config(), &PipelineConfig::default());
}
