use serde::{Deserialize, Serialize};

/// Evidence emitted by an absence-triggered method that fired.
pub const EXPECTED_STATE_NOT_FOUND: &str = "Expected state was not found";

/// Outcome of one check against one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Check identifier (e.g., "CIS-LOGGING-AUTH-REMOTE").
    pub check_id: String,
    /// Host the facts were collected from.
    pub host: String,
    /// Severity declared by the check.
    pub severity: Severity,
    #[serde(flatten)]
    pub state: CheckState,
}

/// Classification of a check result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CheckState {
    /// No facts of the check's artifact were present.
    NotApplicable,
    /// Facts were present and no method fired.
    Clean,
    /// At least one method fired.
    Anomaly {
        symptom: String,
        /// Evidence strings, in method-then-record order, de-duplicated.
        findings: Vec<String>,
        remediation: Option<String>,
    },
    /// The check could not be evaluated (malformed record, etc).
    Error { message: String },
}

impl CheckResult {
    pub fn is_anomaly(&self) -> bool {
        matches!(self.state, CheckState::Anomaly { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self.state, CheckState::Error { .. })
    }

    pub fn symptom(&self) -> Option<&str> {
        match &self.state {
            CheckState::Anomaly { symptom, .. } => Some(symptom),
            _ => None,
        }
    }

    pub fn findings(&self) -> &[String] {
        match &self.state {
            CheckState::Anomaly { findings, .. } => findings,
            _ => &[],
        }
    }
}

impl std::fmt::Display for CheckState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotApplicable => write!(f, "not applicable"),
            Self::Clean => write!(f, "clean"),
            Self::Anomaly { .. } => write!(f, "anomaly"),
            Self::Error { .. } => write!(f, "error"),
        }
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn from_str_lenient(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "info" => Some(Self::Info),
            "low" => Some(Self::Low),
            "medium" | "med" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" | "crit" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Metadata about a loaded check, used for `list-checks` output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckMetadata {
    pub id: String,
    pub artifact: String,
    pub severity: Severity,
    pub problem: String,
    pub description: Option<String>,
    pub methods: usize,
}
