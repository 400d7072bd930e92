//! hostcheck: host compliance checking engine.
//!
//! Raw host artifacts (configuration files, stat listings) are parsed into
//! structured facts, a declarative catalog of checks is evaluated against
//! them, and each check is classified as not applicable, clean, anomalous
//! or errored.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::PathBuf;
//! use hostcheck::{run, RunOptions};
//!
//! let options = RunOptions::default();
//! let report = run(&[PathBuf::from("web1.json")], &options).unwrap();
//! println!("Pass: {}, Anomalies: {}", report.verdict.pass, report.verdict.effective_anomalies);
//! ```

pub mod config;
pub mod error;
pub mod facts;
pub mod output;
pub mod parser;
pub mod rules;
pub mod snapshot;

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use config::{CatalogConfig, Config};
use error::{CheckError, Result};
use facts::SchemaRegistry;
use output::OutputFormat;
use rules::policy::PolicyVerdict;
use rules::{CancelToken, Catalog, CatalogSource, CheckEngine, CheckResult, EvaluationOptions};
use snapshot::Snapshot;

pub use facts::{FactRecord, HostData};
pub use rules::{evaluate, ResultSet};

/// Options for a run invocation.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Path to config file (defaults to `.hostcheck.toml` in the working directory).
    pub config_path: Option<PathBuf>,
    /// Catalog files or directories, in addition to those in the config.
    pub catalog_paths: Vec<PathBuf>,
    /// Skip the built-in checks regardless of config.
    pub no_builtin: bool,
    /// CLI override for worker count.
    pub workers: Option<usize>,
    /// CLI override for the run timeout.
    pub timeout: Option<Duration>,
    /// CLI override for fail_on threshold.
    pub fail_on_override: Option<rules::Severity>,
    /// Output format.
    pub format: OutputFormat,
    pub cancel: CancelToken,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            config_path: None,
            catalog_paths: Vec::new(),
            no_builtin: false,
            workers: None,
            timeout: None,
            fail_on_override: None,
            format: OutputFormat::Console,
            cancel: CancelToken::new(),
        }
    }
}

/// Complete run report.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub hosts: Vec<String>,
    pub catalog: Vec<CatalogSource>,
    /// Results after policy (ignored checks removed, overrides applied),
    /// ordered by host then check id.
    pub results: Vec<CheckResult>,
    pub skipped: usize,
    pub cancelled: bool,
    pub verdict: PolicyVerdict,
}

impl RunReport {
    pub fn anomalies(&self) -> impl Iterator<Item = &CheckResult> {
        self.results.iter().filter(|r| r.is_anomaly())
    }

    pub fn errors(&self) -> impl Iterator<Item = &CheckResult> {
        self.results.iter().filter(|r| r.is_error())
    }
}

/// Build the catalog described by `config`.
pub fn load_catalog(config: &CatalogConfig, registry: &SchemaRegistry) -> Result<Catalog> {
    let mut catalog = if config.builtin {
        Catalog::builtin(registry)?
    } else {
        Catalog::default()
    };
    for path in &config.paths {
        catalog.merge(Catalog::load_path(path, registry)?)?;
    }
    if catalog.is_empty() {
        return Err(CheckError::Config("no checks loaded".into()));
    }
    Ok(catalog)
}

/// Run a complete evaluation: load config and catalog, load snapshots,
/// evaluate, apply policy.
pub fn run(snapshots: &[PathBuf], options: &RunOptions) -> Result<RunReport> {
    let started_at = Utc::now();

    // Load config
    let config_path = options
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(".hostcheck.toml"));
    let mut config = Config::load(&config_path)?;

    // Apply CLI overrides
    if let Some(fail_on) = options.fail_on_override {
        config.policy.fail_on = fail_on;
    }
    if options.no_builtin {
        config.catalog.builtin = false;
    }
    config.catalog.paths.extend(options.catalog_paths.iter().cloned());

    let registry = SchemaRegistry::builtin();
    let catalog = load_catalog(&config.catalog, &registry)?;
    let sources = catalog.sources().to_vec();

    let hosts = snapshots
        .iter()
        .map(|path| Snapshot::load(path, &registry))
        .collect::<Result<Vec<HostData>>>()?;

    let engine = CheckEngine::new(catalog);
    let evaluation = EvaluationOptions {
        workers: options.workers.unwrap_or(config.engine.workers),
        timeout: options.timeout.or_else(|| config.engine.timeout()),
        cancel: options.cancel.clone(),
    };
    let run = engine.evaluate_hosts(&hosts, &evaluation)?;

    // Apply policy (ignore checks, overrides)
    let all_results = run.results();
    let results = config.policy.apply(&all_results);
    let verdict = config.policy.evaluate(&all_results);

    Ok(RunReport {
        run_id: Uuid::new_v4(),
        started_at,
        hosts: hosts.into_iter().map(|h| h.host).collect(),
        catalog: sources,
        results,
        skipped: run.skipped,
        cancelled: run.cancelled,
        verdict,
    })
}

/// Render a run report in the specified format.
pub fn render_report(report: &RunReport, format: OutputFormat) -> Result<String> {
    output::render(report, format)
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn write_snapshot(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    }

    fn options(dir: &Path) -> RunOptions {
        RunOptions {
            config_path: Some(dir.join("missing.toml")),
            ..Default::default()
        }
    }

    #[test]
    fn compliant_host_passes() {
        let dir = tempfile::tempdir().unwrap();
        let snap = write_snapshot(
            dir.path(),
            "good.json",
            r#"{
                "files": {"LinuxRsyslogConfigs": {"/etc/rsyslog.conf": "*.* @@loghost.example.com:514\n"}},
                "stat": {"LinuxRsyslogConfigs": "81a4 0 0 42 /etc/rsyslog.conf\n"}
            }"#,
        );
        let report = run(&[snap], &options(dir.path())).unwrap();
        assert_eq!(report.hosts, vec!["good"]);
        assert_eq!(report.anomalies().count(), 0);
        assert!(report.verdict.pass);
    }

    #[test]
    fn world_writable_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        let snap = write_snapshot(
            dir.path(),
            "bad.json",
            r#"{
                "host": "bad-host",
                "files": {"LinuxRsyslogConfigs": {"/etc/rsyslog.conf": "*.* /var/log/messages\n"}},
                "stat": {"LinuxRsyslogConfigs": "81b6 0 0 42 /etc/rsyslog.conf\n"}
            }"#,
        );
        let report = run(&[snap], &options(dir.path())).unwrap();
        let ids: Vec<&str> = report.anomalies().map(|r| r.check_id.as_str()).collect();
        assert_eq!(ids, vec!["CIS-LOGGING-AUTH-REMOTE", "CIS-LOGGING-FILE-PERMISSIONS"]);
        assert!(!report.verdict.pass);
        assert!(render_report(&report, OutputFormat::Json)
            .unwrap()
            .contains("bad-host"));
    }

    #[test]
    fn ignored_checks_are_removed_from_report() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join(".hostcheck.toml");
        fs::write(
            &config,
            "[policy]\nignore_checks = [\"CIS-LOGGING-AUTH-REMOTE\"]\n",
        )
        .unwrap();
        let snap = write_snapshot(
            dir.path(),
            "h.json",
            r#"{"files": {"LinuxRsyslogConfigs": {"/etc/rsyslog.conf": "*.* /var/log/messages\n"}}}"#,
        );
        let report = run(
            &[snap],
            &RunOptions {
                config_path: Some(config),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(report.verdict.pass);
        assert!(report
            .results
            .iter()
            .all(|r| r.check_id != "CIS-LOGGING-AUTH-REMOTE"));
    }

    #[test]
    fn no_checks_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let opts = RunOptions {
            no_builtin: true,
            ..options(dir.path())
        };
        assert!(matches!(run(&[], &opts), Err(CheckError::Config(_))));
    }
}
