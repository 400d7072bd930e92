use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::rules::policy::Policy;

/// Top-level configuration from `.hostcheck.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub policy: Policy,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Worker threads for check evaluation (0 = one per CPU).
    #[serde(default)]
    pub workers: usize,
    /// Stop scheduling checks after this many milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl EngineConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Extra catalog files or directories.
    #[serde(default)]
    pub paths: Vec<PathBuf>,
    /// Include the built-in checks.
    #[serde(default = "default_builtin")]
    pub builtin: bool,
}

fn default_builtin() -> bool {
    true
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            builtin: true,
        }
    }
}

impl Config {
    /// Load config from a TOML file. Returns default if file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Generate a starter config file.
    pub fn starter_toml() -> &'static str {
        r#"# hostcheck configuration

[policy]
# Minimum anomaly severity to fail the run (info, low, medium, high, critical).
fail_on = "low"

# Check IDs to ignore entirely.
# ignore_checks = ["CIS-LOGGING-LOGFILE-PERMISSIONS"]

# Do not fail the run when a check could not be evaluated.
# allow_errors = false

# Per-check severity overrides.
# [policy.overrides]
# "CIS-LOGGING-AUTH-REMOTE" = "medium"

[engine]
# Worker threads (0 = one per CPU).
workers = 0
# timeout_ms = 30000

[catalog]
# Include the built-in checks.
builtin = true
# Additional check files or directories.
# paths = ["/etc/hostcheck/checks.d"]
"#
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Severity;

    #[test]
    fn missing_file_gives_defaults() {
        let config = Config::load(Path::new("/nonexistent/.hostcheck.toml")).unwrap();
        assert_eq!(config.policy.fail_on, Severity::Low);
        assert!(config.catalog.builtin);
        assert_eq!(config.engine.workers, 0);
    }

    #[test]
    fn starter_config_parses() {
        let config: Config = toml::from_str(Config::starter_toml()).unwrap();
        assert_eq!(config.policy.fail_on, Severity::Low);
        assert!(config.catalog.paths.is_empty());
    }

    #[test]
    fn loads_overrides_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".hostcheck.toml");
        std::fs::write(
            &path,
            r#"
[policy]
fail_on = "high"
ignore_checks = ["CIS-X"]
allow_errors = true

[policy.overrides]
"CIS-Y" = "info"

[engine]
workers = 2
timeout_ms = 1500

[catalog]
builtin = false
paths = ["checks"]
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.policy.fail_on, Severity::High);
        assert!(config.policy.ignore_checks.contains("CIS-X"));
        assert!(config.policy.allow_errors);
        assert_eq!(config.policy.overrides["CIS-Y"], Severity::Info);
        assert_eq!(config.engine.timeout(), Some(Duration::from_millis(1500)));
        assert!(!config.catalog.builtin);
        assert_eq!(config.catalog.paths, vec![PathBuf::from("checks")]);
    }
}
