//! Per-host result aggregation and queries.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::result::{CheckResult, CheckState};

/// All check results for one host in one run, keyed by check id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSet {
    pub host: String,
    results: BTreeMap<String, CheckResult>,
}

impl ResultSet {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            results: BTreeMap::new(),
        }
    }

    /// Publish a finished result, replacing any earlier result for the same check.
    pub fn insert(&mut self, result: CheckResult) -> Option<CheckResult> {
        self.results.insert(result.check_id.clone(), result)
    }

    pub fn get(&self, check_id: &str) -> Option<&CheckResult> {
        self.results.get(check_id)
    }

    /// Results in check id order.
    pub fn iter(&self) -> impl Iterator<Item = &CheckResult> {
        self.results.values()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn anomalies(&self) -> impl Iterator<Item = &CheckResult> {
        self.iter().filter(|r| r.is_anomaly())
    }

    pub fn errors(&self) -> impl Iterator<Item = &CheckResult> {
        self.iter().filter(|r| r.is_error())
    }

    /// True unless the check was evaluated and flagged (anomaly or error).
    pub fn is_undetected(&self, check_id: &str) -> bool {
        self.get(check_id)
            .map_or(true, |r| matches!(r.state, CheckState::NotApplicable | CheckState::Clean))
    }

    /// True if the check was not evaluated or had no facts to look at.
    pub fn is_not_applicable(&self, check_id: &str) -> bool {
        self.get(check_id)
            .map_or(true, |r| r.state == CheckState::NotApplicable)
    }

    pub fn is_anomalous(&self, check_id: &str) -> bool {
        self.get(check_id).is_some_and(CheckResult::is_anomaly)
    }

    /// Anomaly with exactly `symptom`, where every pattern in `found` matches
    /// at least one evidence string. Patterns are regexes; an invalid regex is
    /// matched as a literal substring.
    pub fn detected_anomaly(&self, check_id: &str, symptom: &str, found: &[&str]) -> bool {
        let Some(result) = self.get(check_id) else {
            return false;
        };
        result.symptom() == Some(symptom)
            && found.iter().all(|pattern| {
                result
                    .findings()
                    .iter()
                    .any(|evidence| evidence_matches(evidence, pattern))
            })
    }

    /// Anomaly with exactly `symptom` and exactly the evidence in `found`, in order.
    pub fn detected_anomaly_exact(&self, check_id: &str, symptom: &str, found: &[&str]) -> bool {
        self.get(check_id).is_some_and(|result| {
            result.symptom() == Some(symptom)
                && result.findings().len() == found.len()
                && result.findings().iter().zip(found).all(|(a, b)| a == b)
        })
    }

    /// Whether any evidence string of the check matches `pattern`.
    pub fn evidence_contains(&self, check_id: &str, pattern: &str) -> bool {
        self.get(check_id).is_some_and(|result| {
            result
                .findings()
                .iter()
                .any(|evidence| evidence_matches(evidence, pattern))
        })
    }
}

fn evidence_matches(evidence: &str, pattern: &str) -> bool {
    match Regex::new(pattern) {
        Ok(re) => re.is_match(evidence),
        Err(_) => evidence.contains(pattern),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::result::Severity;

    fn result(check_id: &str, state: CheckState) -> CheckResult {
        CheckResult {
            check_id: check_id.into(),
            host: "h".into(),
            severity: Severity::High,
            state,
        }
    }

    fn sample() -> ResultSet {
        let mut set = ResultSet::new("h");
        set.insert(result("NA", CheckState::NotApplicable));
        set.insert(result("OK", CheckState::Clean));
        set.insert(result(
            "BAD",
            CheckState::Anomaly {
                symptom: "Found: bad things.".into(),
                findings: vec!["/test/rw user: 0".into(), "/test/x (weird".into()],
                remediation: None,
            },
        ));
        set.insert(result(
            "ERR",
            CheckState::Error {
                message: "boom".into(),
            },
        ));
        set
    }

    #[test]
    fn undetected_covers_missing_not_applicable_and_clean() {
        let set = sample();
        assert!(set.is_undetected("NA"));
        assert!(set.is_undetected("OK"));
        assert!(set.is_undetected("NEVER-RAN"));
        assert!(!set.is_undetected("BAD"));
        assert!(!set.is_undetected("ERR"));
        assert!(set.is_not_applicable("NA"));
        assert!(!set.is_not_applicable("OK"));
    }

    #[test]
    fn anomaly_queries() {
        let set = sample();
        assert!(set.is_anomalous("BAD"));
        assert!(!set.is_anomalous("ERR"));
        assert!(set.detected_anomaly("BAD", "Found: bad things.", &["/test/rw"]));
        assert!(set.detected_anomaly("BAD", "Found: bad things.", &["(weird"]));
        assert!(!set.detected_anomaly("BAD", "Found: other.", &[]));
        assert!(!set.detected_anomaly("BAD", "Found: bad things.", &["/test/ro"]));
        assert!(set.evidence_contains("BAD", r"user: \d"));
        assert!(!set.evidence_contains("OK", "."));
    }

    #[test]
    fn exact_detection_requires_identical_evidence() {
        let set = sample();
        assert!(set.detected_anomaly_exact(
            "BAD",
            "Found: bad things.",
            &["/test/rw user: 0", "/test/x (weird"]
        ));
        assert!(!set.detected_anomaly_exact("BAD", "Found: bad things.", &["/test/rw user: 0"]));
    }

    #[test]
    fn iteration_is_ordered_by_check_id() {
        let set = sample();
        let ids: Vec<&str> = set.iter().map(|r| r.check_id.as_str()).collect();
        assert_eq!(ids, vec!["BAD", "ERR", "NA", "OK"]);
        assert_eq!(set.anomalies().count(), 1);
        assert_eq!(set.errors().count(), 1);
    }
}
