//! Effect policies observed through whole pipeline runs

use std::fs;
use std::io;
use std::path::Path;

use langlang::ast::build::*;
use langlang::ast::{BinOpKind, EffectKind};
use langlang::config::{PipelineConfig, PolicyKind};
use langlang::interpreter::{Host, RuntimeErrorKind, Value, PURE_ENV_MOCK, PURE_FILE_MOCK};
use langlang::pipeline::run_with_host;
use langlang::types::{TypeErrorKind, TypingDiscipline};
use langlang::ErrorKind;

/// Panics on every access to the outside world.
struct RevokedHost;

impl Host for RevokedHost {
    fn read_file(&self, path: &Path) -> io::Result<String> {
        panic!("file access under a revoked host: {}", path.display())
    }

    fn env_var(&self, name: &str) -> Option<String> {
        panic!("environment access under a revoked host: {name}")
    }

    fn fetch(&self, url: &str) -> Result<String, String> {
        panic!("network access under a revoked host: {url}")
    }
}

/// Real file system, fixed environment, no network.
struct FakeEnv;

impl Host for FakeEnv {
    fn read_file(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn env_var(&self, name: &str) -> Option<String> {
        match name {
            "DB_HOST" => Some("db.internal".to_string()),
            _ => None,
        }
    }

    fn fetch(&self, url: &str) -> Result<String, String> {
        Err(format!("no route to {url}"))
    }
}

fn with_policy(policy: PolicyKind) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.effects.policy = policy;
    config
}

#[test]
fn pure_policy_never_touches_the_host() {
    let tree = object(vec![
        ("file", read_file("/etc/passwd")),
        ("home", read_env("HOME", None)),
        ("host", read_env("DB_HOST", Some(text("localhost")))),
    ]);
    let mut config = with_policy(PolicyKind::Pure);
    config.typing = TypingDiscipline::Gradual;
    let value = run_with_host(&tree, &config, &RevokedHost).unwrap();
    assert_eq!(
        value,
        Value::object([
            ("file", Value::text(PURE_FILE_MOCK)),
            ("home", Value::text(PURE_ENV_MOCK)),
            ("host", Value::text(PURE_ENV_MOCK)),
        ])
    );
}

#[test]
fn pure_policy_rejects_unmocked_network() {
    let tree = fetch("https://example.com/config.json");
    let err = run_with_host(&tree, &with_policy(PolicyKind::Pure), &RevokedHost).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Runtime(RuntimeErrorKind::EffectNotMocked));
}

#[test]
fn pure_policy_uses_configured_mocks() {
    let mut config = with_policy(PolicyKind::Pure);
    config
        .effects
        .mocks
        .insert(EffectKind::Network, r#"{"ok":true}"#.to_string());
    let tree = fetch("https://example.com/health");
    let value = run_with_host(&tree, &config, &RevokedHost).unwrap();
    assert_eq!(value, Value::text(r#"{"ok":true}"#));
}

#[test]
fn sandbox_reads_files_below_allowed_root() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("replicas.txt");
    fs::write(&path, "3").unwrap();

    let mut config = with_policy(PolicyKind::Sandbox);
    config.effects.allowed_paths = vec![dir.path().to_path_buf()];

    let tree = binop(
        BinOpKind::Concat,
        text("replicas="),
        read_file(&path.to_string_lossy()),
    );
    let value = run_with_host(&tree, &config, &FakeEnv).unwrap();
    assert_eq!(value, Value::text("replicas=3"));
}

#[test]
fn sandbox_forbids_files_outside_allowed_root() {
    let allowed = tempfile::tempdir().unwrap();
    let other = tempfile::tempdir().unwrap();
    let secret = other.path().join("secret");
    fs::write(&secret, "hunter2").unwrap();

    let mut config = with_policy(PolicyKind::Sandbox);
    config.effects.allowed_paths = vec![allowed.path().to_path_buf()];

    let escape = allowed.path().join("..").join(
        other
            .path()
            .file_name()
            .expect("temporary directories have a name"),
    );
    let tree = read_file(&escape.join("secret").to_string_lossy());
    let err = run_with_host(&tree, &config, &FakeEnv).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Runtime(RuntimeErrorKind::EffectForbidden));
}

#[test]
fn sandbox_relative_root_stays_below_working_directory() {
    let outside = tempfile::tempdir().unwrap();
    let secret = outside.path().join("secret");
    fs::write(&secret, "hunter2").unwrap();

    let mut config = with_policy(PolicyKind::Sandbox);
    config.effects.allowed_paths = vec![".".into()];

    for target in [secret.to_string_lossy().into_owned(), "../../outside.txt".to_string()] {
        let err = run_with_host(&read_file(&target), &config, &FakeEnv).unwrap_err();
        assert_eq!(
            err.kind(),
            ErrorKind::Runtime(RuntimeErrorKind::EffectForbidden),
            "{target}"
        );
    }

    let value = run_with_host(&read_file("Cargo.toml"), &config, &FakeEnv).unwrap();
    assert!(matches!(value, Value::Text(text) if text.contains("[package]")));
}

#[test]
fn sandbox_missing_allowed_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = with_policy(PolicyKind::Sandbox);
    config.effects.allowed_paths = vec![dir.path().to_path_buf()];

    let tree = read_file(&dir.path().join("absent.json").to_string_lossy());
    let err = run_with_host(&tree, &config, &FakeEnv).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Runtime(RuntimeErrorKind::EffectFailed));
}

#[test]
fn sandbox_allowed_env_name_reads_host() {
    let mut config = with_policy(PolicyKind::Sandbox);
    config.effects.allowed_env_names.insert("DB_HOST".to_string());

    let tree = read_env("DB_HOST", Some(text("localhost")));
    let value = run_with_host(&tree, &config, &FakeEnv).unwrap();
    assert_eq!(value, Value::text("db.internal"));
}

#[test]
fn sandbox_absent_env_without_default_is_null() {
    let tree = read_env("DB_HOST", None);
    let mut config = with_policy(PolicyKind::Sandbox);
    config.typing = TypingDiscipline::Gradual;
    let value = run_with_host(&tree, &config, &RevokedHost).unwrap();
    assert_eq!(value, Value::Null);

    // Static typing wants the absent case handled up front.
    let err = run_with_host(&tree, &with_policy(PolicyKind::Sandbox), &RevokedHost).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Type(TypeErrorKind::UnificationFailure));
}

#[test]
fn sandbox_forbids_network() {
    let tree = fetch("https://example.com");
    let err = run_with_host(&tree, &with_policy(PolicyKind::Sandbox), &RevokedHost).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Runtime(RuntimeErrorKind::EffectForbidden));
}

#[test]
fn unrestricted_reports_failed_fetch() {
    let tree = fetch("https://example.com");
    let err = run_with_host(&tree, &with_policy(PolicyKind::Unrestricted), &FakeEnv).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Runtime(RuntimeErrorKind::EffectFailed));
}

#[test]
fn effect_inside_loop_runs_once_per_iteration() {
    let tree = for_loop("i", int(2), read_env("REGION", Some(text("eu"))));
    let value = run_with_host(&tree, &with_policy(PolicyKind::Sandbox), &RevokedHost).unwrap();
    assert_eq!(value, Value::array([Value::text("eu"), Value::text("eu")]));
}
