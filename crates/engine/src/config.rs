//! Engine configuration
//!
//! Resolution order: built-in defaults, then an optional TOML file, then
//! `TESTFORGE_*` environment variables. Command-line flags are applied on
//! top by the binary.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::playwright::PlaywrightConfig;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory scanned for `*.json` suite files
    pub suites_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub screenshot_dir: PathBuf,
    /// Persisted variable registry; `None` keeps variables in memory only
    pub registry_path: Option<PathBuf>,
    /// Suites run in parallel when no target is given
    pub max_concurrency: usize,
    pub retry: RetryPolicy,
    pub http_timeout_ms: u64,
    /// Upper bound for one `customCode` plugin run
    pub custom_code_timeout_ms: u64,
    pub playwright: PlaywrightConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            suites_dir: PathBuf::from("test-suites"),
            reports_dir: PathBuf::from("test-results"),
            screenshot_dir: PathBuf::from("test-results/screenshots"),
            registry_path: Some(testforge_common::default_registry_path()),
            max_concurrency: 3,
            retry: RetryPolicy::default(),
            http_timeout_ms: 30_000,
            custom_code_timeout_ms: 30_000,
            playwright: PlaywrightConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults, then `path` if given, then environment overrides
    pub fn load(path: Option<&Path>) -> EngineResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> EngineResult<Self> {
        debug!("Loading config from {}", path.display());
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> EngineResult<()> {
        if let Some(dir) = lookup("TESTFORGE_SUITES_DIR") {
            self.suites_dir = dir.into();
        }
        if let Some(dir) = lookup("TESTFORGE_REPORTS_DIR") {
            self.reports_dir = dir.into();
        }
        if let Some(path) = lookup("TESTFORGE_REGISTRY") {
            self.registry_path = if path.is_empty() { None } else { Some(path.into()) };
        }
        if let Some(n) = lookup("TESTFORGE_MAX_CONCURRENCY") {
            self.max_concurrency = n
                .parse()
                .map_err(|_| EngineError::Config(format!("TESTFORGE_MAX_CONCURRENCY: '{}' is not a number", n)))?;
        }
        if let Some(flag) = lookup("TESTFORGE_HEADLESS") {
            self.playwright.headless = !matches!(flag.to_lowercase().as_str(), "0" | "false" | "no");
        }
        self.validate()
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.max_concurrency == 0 {
            return Err(EngineError::Config("max_concurrency must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn custom_code_timeout(&self) -> Duration {
        Duration::from_millis(self.custom_code_timeout_ms)
    }
}
