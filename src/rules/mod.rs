pub mod builtin;
pub mod catalog;
pub mod check;
pub mod matcher;
pub mod policy;
pub mod result;
pub mod results;
pub mod template;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use rayon::prelude::*;

use crate::error::{CheckError, Result};
use crate::facts::HostData;

pub use catalog::{Catalog, CatalogSource};
pub use check::{Check, Hint, Method};
pub use matcher::{Matcher, Operator, Trigger};
pub use result::{CheckMetadata, CheckResult, CheckState, Severity, EXPECTED_STATE_NOT_FOUND};
pub use results::ResultSet;

/// Evaluate every check in `catalog` against one host, in catalog order.
pub fn evaluate(catalog: &Catalog, host: &HostData) -> ResultSet {
    let mut results = ResultSet::new(host.host.as_str());
    for check in catalog.checks() {
        results.insert(check.evaluate(host));
    }
    results
}

/// Run-level cancellation flag shared between the caller and the workers.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Scheduling options for a multi-host run.
#[derive(Debug, Clone, Default)]
pub struct EvaluationOptions {
    /// Worker threads; 0 lets rayon pick.
    pub workers: usize,
    /// Stop scheduling new work after this long.
    pub timeout: Option<Duration>,
    pub cancel: CancelToken,
}

/// Results of evaluating a catalog against several hosts.
#[derive(Debug, Clone, Default)]
pub struct EvaluationRun {
    pub hosts: BTreeMap<String, ResultSet>,
    /// (host, check) pairs never started because the run was cancelled.
    pub skipped: usize,
    pub cancelled: bool,
}

impl EvaluationRun {
    /// All results across hosts, ordered by host then check id.
    pub fn results(&self) -> Vec<CheckResult> {
        self.hosts
            .values()
            .flat_map(|set| set.iter().cloned())
            .collect()
    }
}

/// The check engine evaluates a shared, read-only catalog against host data.
pub struct CheckEngine {
    catalog: Arc<Catalog>,
}

impl CheckEngine {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Evaluate all checks against one host on the calling thread.
    pub fn evaluate(&self, host: &HostData) -> ResultSet {
        evaluate(&self.catalog, host)
    }

    /// Evaluate every (host, check) pair on a bounded worker pool.
    ///
    /// Each result is published once complete. When the run is cancelled or
    /// the timeout passes, pairs not yet started are skipped.
    pub fn evaluate_hosts(&self, hosts: &[HostData], options: &EvaluationOptions) -> Result<EvaluationRun> {
        let mut seen = BTreeSet::new();
        for host in hosts {
            if !seen.insert(host.host.as_str()) {
                return Err(CheckError::Config(format!(
                    "host '{}' appears more than once in the run",
                    host.host
                )));
            }
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.workers)
            .build()
            .map_err(|e| CheckError::Internal(format!("failed to build worker pool: {e}")))?;

        let deadline = options.timeout.map(|t| Instant::now() + t);
        let checks = self.catalog.checks();
        let pairs: Vec<(usize, usize)> = (0..hosts.len())
            .flat_map(|h| (0..checks.len()).map(move |c| (h, c)))
            .collect();

        let collector: Mutex<BTreeMap<String, ResultSet>> = Mutex::new(
            hosts
                .iter()
                .map(|h| (h.host.clone(), ResultSet::new(h.host.as_str())))
                .collect(),
        );
        let skipped = AtomicUsize::new(0);

        pool.install(|| {
            pairs.par_iter().for_each(|&(h, c)| {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    options.cancel.cancel();
                }
                if options.cancel.is_cancelled() {
                    skipped.fetch_add(1, Ordering::Relaxed);
                    return;
                }

                let host = &hosts[h];
                let result = checks[c].evaluate(host);

                let mut published = collector.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(set) = published.get_mut(&host.host) {
                    set.insert(result);
                }
            });
        });

        let run = EvaluationRun {
            hosts: collector.into_inner().unwrap_or_else(PoisonError::into_inner),
            skipped: skipped.into_inner(),
            cancelled: options.cancel.is_cancelled(),
        };

        tracing::info!(
            hosts = hosts.len(),
            checks = checks.len(),
            skipped = run.skipped,
            cancelled = run.cancelled,
            "evaluation finished"
        );

        Ok(run)
    }

    /// List metadata for all loaded checks.
    pub fn list_checks(&self) -> Vec<CheckMetadata> {
        self.catalog.list_checks()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::schema::LINUX_RSYSLOG_CONFIGS;
    use crate::facts::stat::create_stat;
    use crate::facts::SchemaRegistry;

    fn engine() -> CheckEngine {
        CheckEngine::new(Catalog::builtin(&SchemaRegistry::builtin()).unwrap())
    }

    fn hosts() -> Vec<HostData> {
        (0..4)
            .map(|i| {
                HostData::from_records(
                    format!("host{i}"),
                    vec![create_stat(
                        LINUX_RSYSLOG_CONFIGS,
                        "/etc/rsyslog.conf",
                        0,
                        0,
                        if i % 2 == 0 { 0o100644 } else { 0o100666 },
                    )],
                )
            })
            .collect()
    }

    #[test]
    fn parallel_run_matches_sequential_evaluation() {
        let engine = engine();
        let hosts = hosts();
        let options = EvaluationOptions {
            workers: 3,
            ..Default::default()
        };
        let run = engine.evaluate_hosts(&hosts, &options).unwrap();

        assert!(!run.cancelled);
        assert_eq!(run.skipped, 0);
        assert_eq!(run.hosts.len(), 4);
        for host in &hosts {
            assert_eq!(run.hosts[&host.host], engine.evaluate(host));
        }
        assert!(run.hosts["host1"].is_anomalous("CIS-LOGGING-FILE-PERMISSIONS"));
        assert!(run.hosts["host0"].is_undetected("CIS-LOGGING-FILE-PERMISSIONS"));
    }

    #[test]
    fn cancelled_run_publishes_nothing() {
        let engine = engine();
        let options = EvaluationOptions::default();
        options.cancel.cancel();
        let run = engine.evaluate_hosts(&hosts(), &options).unwrap();

        assert!(run.cancelled);
        assert_eq!(run.skipped, 4 * engine.catalog().len());
        assert!(run.hosts.values().all(ResultSet::is_empty));
    }

    #[test]
    fn expired_deadline_skips_work() {
        let engine = engine();
        let options = EvaluationOptions {
            timeout: Some(Duration::ZERO),
            ..Default::default()
        };
        let run = engine.evaluate_hosts(&hosts(), &options).unwrap();
        assert!(run.cancelled);
        assert!(run.results().is_empty());
    }

    #[test]
    fn duplicate_host_names_are_rejected() {
        let engine = engine();
        let hosts = vec![HostData::new("dup"), HostData::new("dup")];
        assert!(engine
            .evaluate_hosts(&hosts, &EvaluationOptions::default())
            .is_err());
    }
}
