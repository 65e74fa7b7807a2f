//! Run configuration.
//!
//! A [`PipelineConfig`] is fixed at the start of a run. It is read from JSON
//! with camelCase keys; every key is optional:
//!
//! ```json
//! {
//!   "typing": "gradual",
//!   "effects": {
//!     "policy": "sandbox",
//!     "allowedPaths": ["/etc/app"],
//!     "allowedEnvNames": ["DB_HOST"],
//!     "networkTimeoutMs": 5000
//!   }
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::ast::EffectKind;
use crate::interpreter::default_mocks;
use crate::types::TypingDiscipline;

/// Names the configuration file [`PipelineConfig::load_from_env`] reads.
pub const CONFIG_ENV: &str = "LANGLANG_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    pub typing: TypingDiscipline,
    pub effects: EffectConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PolicyKind {
    Pure,
    #[default]
    Sandbox,
    Unrestricted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EffectConfig {
    pub policy: PolicyKind,
    /// Roots below which the sandbox may read files. Relative roots resolve
    /// against the working directory at the time the policy is built.
    pub allowed_paths: Vec<PathBuf>,
    /// Environment variables the sandbox may read.
    pub allowed_env_names: BTreeSet<String>,
    /// Results of effects under the pure policy.
    pub mocks: BTreeMap<EffectKind, String>,
    pub network_timeout_ms: u64,
}

impl Default for EffectConfig {
    fn default() -> Self {
        EffectConfig {
            policy: PolicyKind::default(),
            allowed_paths: Vec::new(),
            allowed_env_names: BTreeSet::new(),
            mocks: default_mocks(),
            network_timeout_ms: 10_000,
        }
    }
}

impl EffectConfig {
    pub fn network_timeout(&self) -> Duration {
        Duration::from_millis(self.network_timeout_ms)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl PipelineConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&contents)?;
        debug!(path = %path.display(), typing = %config.typing, "loaded configuration");
        Ok(config)
    }

    /// Loads the file named by `LANGLANG_CONFIG`, or the defaults if the
    /// variable is not set.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        match env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }
}
