//! Effect policies.
//!
//! A policy is chosen once per evaluation run and decides what every effect
//! request of that run does:
//!
//! | effect    | pure            | sandbox                         | unrestricted |
//! |-----------|-----------------|---------------------------------|--------------|
//! | read file | mock            | only below an allowed root      | host         |
//! | read env  | mock            | allowed names, else absent      | host         |
//! | network   | mock if present | forbidden                       | host         |
//!
//! Only the sandbox and unrestricted policies ever call the [`Host`].

use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::path::{Component, Path, PathBuf};

use tracing::{trace, warn};

use crate::ast::{EffectKind, Location};
use crate::config::{EffectConfig, PolicyKind};

use super::host::Host;
use super::{RuntimeError, RuntimeErrorKind};

pub const PURE_FILE_MOCK: &str = "<pure:file>";
pub const PURE_ENV_MOCK: &str = "<pure:env>";

#[derive(Debug, Clone, PartialEq)]
pub enum EffectPolicy {
    /// Every effect returns its mock; an effect without one fails.
    Pure { mocks: BTreeMap<EffectKind, String> },
    Sandbox {
        allowed_paths: Vec<PathBuf>,
        allowed_env_names: BTreeSet<String>,
        /// Where relative roots and targets resolve, captured when the policy
        /// is built. Without one, only absolute paths can ever match.
        base: Option<PathBuf>,
    },
    Unrestricted,
}

impl EffectPolicy {
    pub fn pure() -> Self {
        EffectPolicy::Pure {
            mocks: default_mocks(),
        }
    }

    pub fn sandbox(
        allowed_paths: impl IntoIterator<Item = PathBuf>,
        allowed_env_names: impl IntoIterator<Item = String>,
    ) -> Self {
        EffectPolicy::Sandbox {
            allowed_paths: allowed_paths.into_iter().collect(),
            allowed_env_names: allowed_env_names.into_iter().collect(),
            base: env::current_dir().ok(),
        }
    }

    pub fn from_config(config: &EffectConfig) -> Self {
        match config.policy {
            PolicyKind::Pure => EffectPolicy::Pure {
                mocks: config.mocks.clone(),
            },
            PolicyKind::Sandbox => EffectPolicy::sandbox(
                config.allowed_paths.iter().cloned(),
                config.allowed_env_names.iter().cloned(),
            ),
            PolicyKind::Unrestricted => EffectPolicy::Unrestricted,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EffectPolicy::Pure { .. } => "pure",
            EffectPolicy::Sandbox { .. } => "sandbox",
            EffectPolicy::Unrestricted => "unrestricted",
        }
    }

    /// Performs one effect. `Ok(None)` means the result is absent (an unset
    /// or disallowed environment variable).
    pub(super) fn perform(
        &self,
        effect: EffectKind,
        target: &str,
        host: &dyn Host,
        location: &Location,
    ) -> Result<Option<String>, RuntimeError> {
        trace!(policy = self.name(), %effect, target, "effect");
        match self {
            EffectPolicy::Pure { mocks } => match mocks.get(&effect) {
                Some(mock) => Ok(Some(mock.clone())),
                None => Err(RuntimeError::new(
                    RuntimeErrorKind::EffectNotMocked,
                    location,
                    format!("`{effect}` of {target:?} has no mock under the pure policy"),
                )),
            },
            EffectPolicy::Sandbox {
                allowed_paths,
                allowed_env_names,
                base,
            } => match effect {
                EffectKind::ReadFile => {
                    let base = base.as_deref();
                    let path = resolve(Path::new(target), base).filter(|path| {
                        allowed_paths
                            .iter()
                            .filter_map(|root| resolve(root, base))
                            .any(|root| path.starts_with(root))
                    });
                    let Some(path) = path else {
                        return Err(RuntimeError::new(
                            RuntimeErrorKind::EffectForbidden,
                            location,
                            format!("reading {target:?} is outside the sandbox"),
                        ));
                    };
                    read_file(host, &path, location).map(Some)
                }
                EffectKind::ReadEnv => {
                    if allowed_env_names.contains(target) {
                        Ok(host.env_var(target))
                    } else {
                        warn!(name = target, %location, "environment variable not allowed, resolving to absent");
                        Ok(None)
                    }
                }
                EffectKind::Network => Err(RuntimeError::new(
                    RuntimeErrorKind::EffectForbidden,
                    location,
                    format!("network access to {target:?} is forbidden in the sandbox"),
                )),
            },
            EffectPolicy::Unrestricted => match effect {
                EffectKind::ReadFile => read_file(host, Path::new(target), location).map(Some),
                EffectKind::ReadEnv => Ok(host.env_var(target)),
                EffectKind::Network => host.fetch(target).map(Some).map_err(|message| {
                    RuntimeError::new(RuntimeErrorKind::EffectFailed, location, message)
                }),
            },
        }
    }
}

impl Default for EffectPolicy {
    fn default() -> Self {
        EffectPolicy::from_config(&EffectConfig::default())
    }
}

pub fn default_mocks() -> BTreeMap<EffectKind, String> {
    BTreeMap::from([
        (EffectKind::ReadFile, PURE_FILE_MOCK.to_string()),
        (EffectKind::ReadEnv, PURE_ENV_MOCK.to_string()),
    ])
}

fn read_file(host: &dyn Host, path: &Path, location: &Location) -> Result<String, RuntimeError> {
    host.read_file(path).map_err(|err| {
        RuntimeError::new(
            RuntimeErrorKind::EffectFailed,
            location,
            format!("reading {}: {err}", path.display()),
        )
    })
}

/// Makes `path` absolute against `base` and normalizes it. `None` when there
/// is no base for a relative path.
fn resolve(path: &Path, base: Option<&Path>) -> Option<PathBuf> {
    let joined = if path.has_root() {
        path.to_path_buf()
    } else {
        base?.join(path)
    };
    let resolved = normalize(&joined);
    resolved.has_root().then_some(resolved)
}

/// Resolves `.` and `..` without touching the file system. A `..` that would
/// climb above the start of a relative path is kept.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop = matches!(
                    normalized.components().next_back(),
                    Some(Component::Normal(_))
                );
                if can_pop {
                    normalized.pop();
                } else if !normalized.has_root() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    /// Fails the test on any host access.
    struct RevokedHost;

    impl Host for RevokedHost {
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

    struct FixedHost;

    impl Host for FixedHost {
        fn read_file(&self, path: &Path) -> io::Result<String> {
            Ok(format!("contents of {}", path.display()))
        }

        fn env_var(&self, name: &str) -> Option<String> {
            (name == "DB_HOST").then(|| "db.internal".to_string())
        }

        fn fetch(&self, url: &str) -> Result<String, String> {
            Err(format!("{url} unreachable"))
        }
    }

    fn here() -> Location {
        Location::new("effects.ll", 1, 1)
    }

    #[test]
    fn test_pure_uses_mocks() {
        let policy = EffectPolicy::pure();
        let result = policy.perform(EffectKind::ReadEnv, "HOME", &RevokedHost, &here());
        assert_eq!(result, Ok(Some(PURE_ENV_MOCK.to_string())));
    }

    #[test]
    fn test_pure_network_is_not_mocked() {
        let policy = EffectPolicy::pure();
        let err = policy
            .perform(EffectKind::Network, "http://example.com", &RevokedHost, &here())
            .unwrap_err();
        assert_eq!(err.kind(), RuntimeErrorKind::EffectNotMocked);
    }

    #[test]
    fn test_sandbox_disallowed_env_is_absent() {
        let policy = EffectPolicy::sandbox(vec![], vec![]);
        let result = policy.perform(EffectKind::ReadEnv, "DB_HOST", &RevokedHost, &here());
        assert_eq!(result, Ok(None));
    }

    #[test]
    fn test_sandbox_allowed_env_reads_host() {
        let policy = EffectPolicy::sandbox(vec![], vec!["DB_HOST".to_string()]);
        let result = policy.perform(EffectKind::ReadEnv, "DB_HOST", &FixedHost, &here());
        assert_eq!(result, Ok(Some("db.internal".to_string())));
    }

    #[test]
    fn test_sandbox_path_escape_is_forbidden() {
        let policy = EffectPolicy::sandbox(vec![PathBuf::from("/srv/config")], vec![]);
        let err = policy
            .perform(
                EffectKind::ReadFile,
                "/srv/config/../secrets/key",
                &RevokedHost,
                &here(),
            )
            .unwrap_err();
        assert_eq!(err.kind(), RuntimeErrorKind::EffectForbidden);
    }

    #[test]
    fn test_sandbox_prefix_is_component_wise() {
        let policy = EffectPolicy::sandbox(vec![PathBuf::from("/srv/config")], vec![]);
        let err = policy
            .perform(EffectKind::ReadFile, "/srv/configuration", &RevokedHost, &here())
            .unwrap_err();
        assert_eq!(err.kind(), RuntimeErrorKind::EffectForbidden);
    }

    #[test]
    fn test_sandbox_allowed_file() {
        let policy = EffectPolicy::sandbox(vec![PathBuf::from("/srv/config")], vec![]);
        let result = policy.perform(
            EffectKind::ReadFile,
            "/srv/config/./app.json",
            &FixedHost,
            &here(),
        );
        assert_eq!(result, Ok(Some("contents of /srv/config/app.json".to_string())));
    }

    #[test]
    fn test_sandbox_network_is_forbidden() {
        let policy = EffectPolicy::sandbox(vec![], vec![]);
        let err = policy
            .perform(EffectKind::Network, "http://example.com", &RevokedHost, &here())
            .unwrap_err();
        assert_eq!(err.kind(), RuntimeErrorKind::EffectForbidden);
    }

    #[test]
    fn test_unrestricted_fetch_failure() {
        let err = EffectPolicy::Unrestricted
            .perform(EffectKind::Network, "http://example.com", &FixedHost, &here())
            .unwrap_err();
        assert_eq!(err.kind(), RuntimeErrorKind::EffectFailed);
    }

    fn rooted_at(base: Option<&str>, roots: &[&str]) -> EffectPolicy {
        EffectPolicy::Sandbox {
            allowed_paths: roots.iter().map(PathBuf::from).collect(),
            allowed_env_names: BTreeSet::new(),
            base: base.map(PathBuf::from),
        }
    }

    #[test]
    fn test_sandbox_relative_root_resolves_against_base() {
        let policy = rooted_at(Some("/srv/app"), &["."]);
        let result = policy.perform(EffectKind::ReadFile, "conf/app.json", &FixedHost, &here());
        assert_eq!(
            result,
            Ok(Some("contents of /srv/app/conf/app.json".to_string()))
        );

        for escape in ["/etc/shadow", "../../outside.txt", "conf/../../x"] {
            let err = policy
                .perform(EffectKind::ReadFile, escape, &RevokedHost, &here())
                .unwrap_err();
            assert_eq!(err.kind(), RuntimeErrorKind::EffectForbidden, "{escape}");
        }
    }

    #[test]
    fn test_sandbox_relative_root_without_base_matches_nothing() {
        let policy = rooted_at(None, &[".", ""]);
        for target in ["/etc/shadow", "app.json"] {
            let err = policy
                .perform(EffectKind::ReadFile, target, &RevokedHost, &here())
                .unwrap_err();
            assert_eq!(err.kind(), RuntimeErrorKind::EffectForbidden, "{target}");
        }
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize(Path::new("../x")), PathBuf::from("../x"));
        assert_eq!(normalize(Path::new("/..")), PathBuf::from("/"));
    }
}
