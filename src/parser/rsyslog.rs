//! rsyslog / sysklogd configuration parser.
//!
//! Emits one `RsyslogRule` record per `selector action` line. Comments,
//! blank lines, `$` directives and RainerScript statements are ignored.
//! Malformed rule lines (missing action, unparsable selector) are skipped
//! without emitting a partial record.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

use super::FactParser;
use crate::facts::schema::{LINUX_RSYSLOG_CONFIGS, RSYSLOG_RULE};
use crate::facts::{FactRecord, Value};

pub struct RsyslogParser {
    artifact: String,
}

impl RsyslogParser {
    pub fn new(artifact: impl Into<String>) -> Self {
        Self {
            artifact: artifact.into(),
        }
    }
}

impl Default for RsyslogParser {
    fn default() -> Self {
        Self::new(LINUX_RSYSLOG_CONFIGS)
    }
}

static RULE_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<selector>\S+)\s+(?P<action>\S.*?)\s*$").unwrap());

static SELECTOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<facilities>[A-Za-z0-9*]+(?:,[A-Za-z0-9*]+)*)\.(?P<priority>[!=<>]*[A-Za-z*]+)$")
        .unwrap()
});

static REMOTE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<proto>@@?)(?:\([^)]*\))?(?P<host>\[[^\]]+\]|[^:;\s\[]+)(?::(?P<port>\d+))?(?:;(?P<template>\S+))?$",
    )
    .unwrap()
});

static MODULE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^:(?P<module>om[a-z0-9]+):(?P<rest>.*)$").unwrap());

struct Action {
    transport: &'static str,
    destination: String,
    port: Option<i64>,
    template: Option<String>,
}

impl FactParser for RsyslogParser {
    fn artifact(&self) -> &str {
        &self.artifact
    }

    fn parse(&self, source: &str, content: &str) -> Vec<FactRecord> {
        let mut records = Vec::new();

        for line in logical_lines(content) {
            let trimmed = line.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('$') {
                continue;
            }
            if is_rainerscript(trimmed) {
                continue;
            }

            let Some(caps) = RULE_LINE_RE.captures(trimmed) else {
                tracing::debug!(source, line = trimmed, "skipping rsyslog line without action");
                continue;
            };

            let Some(selector) = parse_selector(&caps["selector"]) else {
                tracing::debug!(source, line = trimmed, "skipping rsyslog line with bad selector");
                continue;
            };

            let action = parse_action(&caps["action"]);

            let mut record = FactRecord::new(self.artifact.as_str(), RSYSLOG_RULE, source)
                .with("facilities", Value::Set(selector.facilities))
                .with("excluded", Value::Set(selector.excluded))
                .with("priority", selector.priority)
                .with("transport", action.transport)
                .with("destination", action.destination)
                .with("line", trimmed);
            if let Some(port) = action.port {
                record = record.with("port", port);
            }
            if let Some(template) = action.template {
                record = record.with("template", template);
            }
            records.push(record);
        }

        records
    }
}

/// Join backslash-continued physical lines.
fn logical_lines(content: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut pending = String::new();

    for raw in content.lines() {
        match raw.trim_end().strip_suffix('\\') {
            Some(head) => {
                pending.push_str(head);
                pending.push(' ');
            }
            None => {
                pending.push_str(raw);
                lines.push(std::mem::take(&mut pending));
            }
        }
    }
    if !pending.trim().is_empty() {
        lines.push(pending);
    }

    lines
}

fn is_rainerscript(line: &str) -> bool {
    const STATEMENTS: [&str; 8] = [
        "module(", "input(", "global(", "template(", "ruleset(", "action(", "if ", "}",
    ];
    STATEMENTS.iter().any(|s| line.starts_with(s))
}

struct Selector {
    facilities: BTreeSet<String>,
    /// Facilities selected with priority `none`. A wildcard in `facilities`
    /// does not cover these.
    excluded: BTreeSet<String>,
    priority: String,
}

/// Parse `fac1,fac2.prio;fac3.prio` into the selected facilities, the
/// facilities excluded with priority `none`, and the first selector's
/// priority.
fn parse_selector(selector: &str) -> Option<Selector> {
    let mut facilities = BTreeSet::new();
    let mut excluded = BTreeSet::new();
    let mut first_priority = None;

    for part in selector.split(';').filter(|p| !p.is_empty()) {
        let caps = SELECTOR_RE.captures(part)?;
        let priority = caps["priority"].to_lowercase();
        for facility in caps["facilities"].split(',') {
            let facility = facility.to_lowercase();
            if priority == "none" {
                excluded.insert(facility);
            } else {
                facilities.insert(facility);
            }
        }
        first_priority.get_or_insert(priority);
    }

    for facility in &excluded {
        facilities.remove(facility);
    }

    first_priority.map(|priority| Selector {
        facilities,
        excluded,
        priority,
    })
}

fn parse_action(action: &str) -> Action {
    if let Some(caps) = REMOTE_RE.captures(action) {
        let transport = if &caps["proto"] == "@@" { "TCP" } else { "UDP" };
        let host = caps["host"].trim_start_matches('[').trim_end_matches(']');
        return Action {
            transport,
            destination: host.to_string(),
            port: caps.name("port").and_then(|p| p.as_str().parse().ok()),
            template: caps.name("template").map(|t| t.as_str().to_string()),
        };
    }

    if let Some(caps) = MODULE_RE.captures(action) {
        return Action {
            transport: "MODULE",
            destination: format!("{}:{}", &caps["module"], &caps["rest"]),
            port: None,
            template: None,
        };
    }

    let (target, template) = match action.split_once(';') {
        Some((target, template)) => (target, Some(template.to_string())),
        None => (action, None),
    };

    let (transport, destination) = match target.chars().next() {
        Some('/') => ("FILE", target),
        Some('-') if target[1..].starts_with('/') => ("FILE", &target[1..]),
        Some('|') => ("PIPE", &target[1..]),
        Some('^') => ("SCRIPT", &target[1..]),
        Some('~') => ("DISCARD", target),
        _ if target == "stop" => ("DISCARD", target),
        _ if target == "*" => ("WALL", target),
        _ => ("USERS", target),
    };

    Action {
        transport,
        destination: destination.to_string(),
        port: None,
        template,
    }
}
