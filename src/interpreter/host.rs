use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::time::Duration;

use tracing::trace;
use ureq::AgentBuilder;

/// The outside world as seen by effect policies. Every real file, environment
/// or network access of an evaluation goes through one of these calls.
pub trait Host {
    fn read_file(&self, path: &Path) -> io::Result<String>;

    /// `None` when the variable is not set.
    fn env_var(&self, name: &str) -> Option<String>;

    fn fetch(&self, url: &str) -> Result<String, String>;
}

/// The real file system, process environment and network.
#[derive(Debug, Clone)]
pub struct SystemHost {
    timeout: Duration,
}

impl SystemHost {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SystemHost {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl Host for SystemHost {
    fn read_file(&self, path: &Path) -> io::Result<String> {
        trace!(path = %path.display(), "reading file");
        fs::read_to_string(path)
    }

    fn env_var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn fetch(&self, url: &str) -> Result<String, String> {
        trace!(url, timeout_ms = self.timeout.as_millis() as u64, "fetching");
        let agent = AgentBuilder::new().timeout(self.timeout).build();
        let response = agent.get(url).call().map_err(|err| match err {
            ureq::Error::Status(status, _) => format!("{url} answered with status {status}"),
            ureq::Error::Transport(transport) => format!("request to {url} failed: {transport}"),
        })?;
        let mut body = String::new();
        response
            .into_reader()
            .read_to_string(&mut body)
            .map_err(|err| format!("reading the response of {url} failed: {err}"))?;
        Ok(body)
    }
}
