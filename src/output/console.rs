use crate::rules::{CheckResult, CheckState, Severity};
use crate::RunReport;

/// Render a run report as console output, grouped by host, anomalies
/// ordered by severity (critical first) then check id.
pub fn render(report: &RunReport) -> String {
    let mut output = String::new();

    if report.cancelled {
        output.push_str(&format!(
            "\n  Run cancelled: {} check(s) not evaluated.\n",
            report.skipped
        ));
    }

    for host in &report.hosts {
        let mut flagged: Vec<&CheckResult> = report
            .results
            .iter()
            .filter(|r| &r.host == host && (r.is_anomaly() || r.is_error()))
            .collect();

        if flagged.is_empty() {
            output.push_str(&format!("\n  {host}: no anomalies detected.\n"));
            continue;
        }

        flagged.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| a.check_id.cmp(&b.check_id))
        });

        output.push_str(&format!("\n  {host}: {} check(s) flagged:\n\n", flagged.len()));

        for result in flagged {
            let severity_tag = match result.severity {
                Severity::Critical => "[CRITICAL]",
                Severity::High => "[HIGH]    ",
                Severity::Medium => "[MEDIUM]  ",
                Severity::Low => "[LOW]     ",
                Severity::Info => "[INFO]    ",
            };

            match &result.state {
                CheckState::Anomaly {
                    symptom,
                    findings,
                    remediation,
                } => {
                    output.push_str(&format!("  {} {}\n", severity_tag, result.check_id));
                    for line in symptom.lines() {
                        output.push_str(&format!("           {}\n", line));
                    }
                    for found in findings {
                        output.push_str(&format!("           found: {}\n", found));
                    }
                    if let Some(remediation) = remediation {
                        output.push_str(&format!("           fix: {}\n", remediation));
                    }
                }
                CheckState::Error { message } => {
                    output.push_str(&format!("  [ERROR]    {}\n", result.check_id));
                    output.push_str(&format!("           {}\n", message));
                }
                CheckState::NotApplicable | CheckState::Clean => {}
            }
            output.push('\n');
        }
    }

    // Verdict
    let status = if report.verdict.pass { "PASS" } else { "FAIL" };
    output.push_str(&format!(
        "\n  Result: {} (threshold: {}, highest: {}, errors: {})\n\n",
        status,
        report.verdict.fail_threshold,
        report
            .verdict
            .highest_severity
            .map(|s| s.to_string())
            .unwrap_or_else(|| "none".into()),
        report.verdict.errors,
    ));

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::policy::Policy;

    fn report(results: Vec<CheckResult>) -> RunReport {
        let verdict = Policy::default().evaluate(&results);
        RunReport {
            run_id: uuid::Uuid::nil(),
            started_at: chrono::Utc::now(),
            hosts: vec!["web1".into()],
            catalog: vec![],
            results,
            skipped: 0,
            cancelled: false,
            verdict,
        }
    }

    #[test]
    fn clean_host_says_so() {
        let out = render(&report(vec![]));
        assert!(out.contains("web1: no anomalies detected."));
        assert!(out.contains("Result: PASS"));
    }

    #[test]
    fn anomaly_lists_symptom_and_evidence() {
        let out = render(&report(vec![CheckResult {
            check_id: "CIS-LOGGING-FILE-PERMISSIONS".into(),
            host: "web1".into(),
            severity: Severity::High,
            state: CheckState::Anomaly {
                symptom: "Found: Log configurations can be modified by non-privileged users."
                    .into(),
                findings: vec!["/test/rw user: 0, group: 0, mode: -rw-rw-rw-".into()],
                remediation: Some("chmod go-w".into()),
            },
        }]));
        assert!(out.contains("[HIGH]     CIS-LOGGING-FILE-PERMISSIONS"));
        assert!(out.contains("found: /test/rw user: 0, group: 0, mode: -rw-rw-rw-"));
        assert!(out.contains("fix: chmod go-w"));
        assert!(out.contains("Result: FAIL"));
    }
}
