use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::{CheckResult, Severity};

/// Policy verdict: the final pass/fail decision after applying
/// ignore list and severity overrides to raw check results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyVerdict {
    pub pass: bool,
    pub total_anomalies: usize,
    pub effective_anomalies: usize,
    pub errors: usize,
    pub highest_severity: Option<Severity>,
    pub fail_threshold: Severity,
}

/// Policy configuration loaded from `.hostcheck.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// Minimum severity of an anomaly that fails the run.
    #[serde(default = "default_fail_on")]
    pub fail_on: Severity,
    /// Check IDs to ignore entirely.
    #[serde(default)]
    pub ignore_checks: HashSet<String>,
    /// Per-check severity overrides.
    #[serde(default)]
    pub overrides: HashMap<String, Severity>,
    /// Do not fail the run on checks that could not be evaluated.
    #[serde(default)]
    pub allow_errors: bool,
}

fn default_fail_on() -> Severity {
    Severity::Low
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            fail_on: default_fail_on(),
            ignore_checks: HashSet::new(),
            overrides: HashMap::new(),
            allow_errors: false,
        }
    }
}

impl Policy {
    fn severity_of(&self, result: &CheckResult) -> Severity {
        self.overrides
            .get(&result.check_id)
            .copied()
            .unwrap_or(result.severity)
    }

    /// Evaluate results against this policy and produce a verdict.
    pub fn evaluate(&self, results: &[CheckResult]) -> PolicyVerdict {
        let kept: Vec<&CheckResult> = results
            .iter()
            .filter(|r| !self.ignore_checks.contains(&r.check_id))
            .collect();

        let effective: Vec<Severity> = kept
            .iter()
            .filter(|r| r.is_anomaly())
            .map(|r| self.severity_of(r))
            .collect();
        let errors = kept.iter().filter(|r| r.is_error()).count();

        let highest = effective.iter().copied().max();
        let failed = effective.iter().any(|&sev| sev >= self.fail_on)
            || (errors > 0 && !self.allow_errors);

        PolicyVerdict {
            pass: !failed,
            total_anomalies: results.iter().filter(|r| r.is_anomaly()).count(),
            effective_anomalies: effective.len(),
            errors,
            highest_severity: highest,
            fail_threshold: self.fail_on,
        }
    }

    /// Filter results: remove ignored checks, apply overrides.
    pub fn apply(&self, results: &[CheckResult]) -> Vec<CheckResult> {
        results
            .iter()
            .filter(|r| !self.ignore_checks.contains(&r.check_id))
            .map(|r| {
                let mut r = r.clone();
                r.severity = self.severity_of(&r);
                r
            })
            .collect()
    }
}
