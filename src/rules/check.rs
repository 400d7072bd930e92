//! Check model and classification.

use serde::Serialize;

use super::matcher::{select, Matcher, Trigger};
use super::result::{CheckMetadata, CheckResult, CheckState, Severity, EXPECTED_STATE_NOT_FOUND};
use super::template::EvidenceTemplate;
use crate::error::{CheckError, Result};
use crate::facts::{FactRecord, HostData};

/// Human-readable text attached to a check or method.
#[derive(Debug, Clone, Serialize)]
pub struct Hint {
    pub problem: String,
    pub fix: Option<String>,
    /// Evidence format, as written in the catalog.
    pub format: Option<String>,
}

impl Hint {
    /// Symptom line for a fired method.
    pub fn symptom(&self, trigger: Trigger) -> String {
        if trigger.is_absence() {
            format!("Missing attribute: {}", self.problem)
        } else {
            format!("Found: {}", self.problem)
        }
    }
}

/// One alternative way for a host to violate a check.
#[derive(Debug, Clone)]
pub struct Method {
    pub name: Option<String>,
    /// Record kind the matchers apply to.
    pub record: String,
    pub matchers: Vec<Matcher>,
    pub trigger: Trigger,
    /// Method hint, with unset fields inherited from the check hint.
    pub hint: Hint,
    /// Compiled evidence format for the method's record kind.
    pub format: EvidenceTemplate,
}

/// A validated, immutable compliance check.
#[derive(Debug, Clone)]
pub struct Check {
    pub check_id: String,
    /// Artifact whose records the check evaluates.
    pub artifact: String,
    pub description: Option<String>,
    pub severity: Severity,
    pub hint: Hint,
    pub methods: Vec<Method>,
}

impl Check {
    pub fn metadata(&self) -> CheckMetadata {
        CheckMetadata {
            id: self.check_id.clone(),
            artifact: self.artifact.clone(),
            severity: self.severity,
            problem: self.hint.problem.clone(),
            description: self.description.clone(),
            methods: self.methods.len(),
        }
    }

    /// Classify this check against one host's facts.
    pub fn evaluate(&self, host: &HostData) -> CheckResult {
        let state = match self.classify(host.records(&self.artifact)) {
            Ok(state) => state,
            Err(error) => {
                tracing::warn!(host = %host.host, %error, "check evaluation failed");
                CheckState::Error {
                    message: error.to_string(),
                }
            }
        };

        CheckResult {
            check_id: self.check_id.clone(),
            host: host.host.clone(),
            severity: self.severity,
            state,
        }
    }

    fn classify(&self, records: &[FactRecord]) -> Result<CheckState> {
        if records.is_empty() {
            return Ok(CheckState::NotApplicable);
        }

        let mut symptoms: Vec<String> = Vec::new();
        let mut findings: Vec<String> = Vec::new();
        let mut remediation: Option<String> = None;

        for method in &self.methods {
            let candidates: Vec<&FactRecord> =
                records.iter().filter(|r| r.kind == method.record).collect();
            let selection = select(&method.matchers, method.trigger, &candidates, &method.format)
                .map_err(|message| CheckError::Evaluation {
                    check_id: self.check_id.clone(),
                    message,
                })?;

            if !selection.fires() {
                continue;
            }

            let symptom = method.hint.symptom(method.trigger);
            if !symptoms.contains(&symptom) {
                symptoms.push(symptom);
            }
            if remediation.is_none() {
                remediation = method.hint.fix.clone();
            }

            let evidence: Vec<String> = if method.trigger.is_absence() {
                vec![EXPECTED_STATE_NOT_FOUND.to_string()]
            } else {
                selection.selected.into_iter().map(|s| s.evidence).collect()
            };
            for item in evidence {
                if !findings.contains(&item) {
                    findings.push(item);
                }
            }
        }

        if symptoms.is_empty() {
            return Ok(CheckState::Clean);
        }

        Ok(CheckState::Anomaly {
            symptom: symptoms.join("\n"),
            findings,
            remediation,
        })
    }
}
