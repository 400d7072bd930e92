//! Host snapshots: a local JSON bundle of raw artifact content and/or
//! pre-parsed facts for one host.
//!
//! ```json
//! {
//!   "host": "web1",
//!   "files": { "LinuxRsyslogConfigs": { "/etc/rsyslog.conf": "*.* @@loghost:514" } },
//!   "stat": { "LinuxRsyslogConfigs": "81a4 0 0 1024 /etc/rsyslog.conf" },
//!   "facts": [
//!     { "artifact": "LinuxLogFiles", "kind": "StatEntry", "origin": "/var/log/messages",
//!       "attributes": { "path": "/var/log/messages", "uid": 0, "gid": 4, "mode": "0100640" } }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{CheckError, Result};
use crate::facts::{FactRecord, HostData, SchemaRegistry};
use crate::parser::stat::StatParser;
use crate::parser::parser_for_artifact;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Snapshot {
    /// Host name; defaults to the snapshot file stem.
    #[serde(default)]
    pub host: Option<String>,
    /// artifact -> source path -> raw content.
    #[serde(default)]
    pub files: BTreeMap<String, BTreeMap<String, String>>,
    /// artifact -> `stat -c '%f %u %g %s %n'` output.
    #[serde(default)]
    pub stat: BTreeMap<String, String>,
    /// Records injected without a parser.
    #[serde(default)]
    pub facts: Vec<FactDocument>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FactDocument {
    pub artifact: String,
    pub kind: String,
    pub origin: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl Snapshot {
    /// Load a snapshot file and turn it into host data.
    pub fn load(path: &Path, registry: &SchemaRegistry) -> Result<HostData> {
        let text = std::fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&text).map_err(|e| CheckError::Snapshot {
            file: path.display().to_string(),
            message: e.to_string(),
        })?;
        let default_host = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".into());
        snapshot.into_host_data(&default_host, &path.display().to_string(), registry)
    }

    /// Parse raw content and coerce injected facts against the registry.
    pub fn into_host_data(
        self,
        default_host: &str,
        label: &str,
        registry: &SchemaRegistry,
    ) -> Result<HostData> {
        let fail = |message: String| CheckError::Snapshot {
            file: label.to_string(),
            message,
        };

        let mut data = HostData::new(self.host.unwrap_or_else(|| default_host.to_string()));

        for (artifact, files) in &self.files {
            if !registry.has_artifact(artifact) {
                return Err(fail(format!("unknown artifact '{artifact}'")));
            }
            let parser = parser_for_artifact(artifact)
                .ok_or_else(|| fail(format!("no content parser for artifact '{artifact}'")))?;
            for (source, content) in files {
                data.add_file(parser.as_ref(), source, content);
            }
        }

        for (artifact, listing) in &self.stat {
            if !registry.has_artifact(artifact) {
                return Err(fail(format!("unknown artifact '{artifact}'")));
            }
            data.add_file(&StatParser::new(artifact.as_str()), "stat", listing);
        }

        for fact in self.facts {
            let kinds = registry
                .artifact_kinds(&fact.artifact)
                .ok_or_else(|| fail(format!("unknown artifact '{}'", fact.artifact)))?;
            if !kinds.contains(&fact.kind) {
                return Err(fail(format!(
                    "artifact '{}' does not yield '{}' records",
                    fact.artifact, fact.kind
                )));
            }
            let schema = registry
                .kind(&fact.kind)
                .ok_or_else(|| fail(format!("unknown record kind '{}'", fact.kind)))?;

            let mut record = FactRecord::new(fact.artifact, fact.kind.as_str(), fact.origin);
            for (name, raw) in &fact.attributes {
                let value = schema.coerce(name, raw).map_err(fail)?;
                record = record.with(name.as_str(), value);
            }
            if let Err(problem) = schema.conform(&record) {
                tracing::warn!(snapshot = label, %problem, "injected fact does not conform to its schema");
            }
            data.add(record);
        }

        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::Value;

    const SNAPSHOT: &str = r#"{
        "host": "web1",
        "files": { "LinuxRsyslogConfigs": { "/etc/rsyslog.conf": "*.* /var/log/messages\n" } },
        "stat": { "LinuxRsyslogConfigs": "81b6 0 0 10 /etc/rsyslog.conf\n" },
        "facts": [
            { "artifact": "LinuxLogFiles", "kind": "StatEntry", "origin": "/var/log/messages",
              "attributes": { "path": "/var/log/messages", "uid": 0, "gid": 4, "mode": "0100640" } }
        ]
    }"#;

    #[test]
    fn loads_files_stat_and_facts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.json");
        std::fs::write(&path, SNAPSHOT).unwrap();

        let data = Snapshot::load(&path, &SchemaRegistry::builtin()).unwrap();
        assert_eq!(data.host, "web1");
        let rsyslog = data.records("LinuxRsyslogConfigs");
        assert_eq!(rsyslog.len(), 2);
        assert_eq!(rsyslog[0].kind, "RsyslogRule");
        assert_eq!(rsyslog[1].kind, "StatEntry");
        assert_eq!(
            data.records("LinuxLogFiles")[0].get("mode"),
            Some(&Value::Mode(0o100640))
        );
    }

    #[test]
    fn host_defaults_to_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db7.json");
        std::fs::write(&path, "{}").unwrap();
        let data = Snapshot::load(&path, &SchemaRegistry::builtin()).unwrap();
        assert_eq!(data.host, "db7");
        assert!(data.is_empty());
    }

    #[test]
    fn rejects_unknown_kind_and_attribute() {
        let registry = SchemaRegistry::builtin();
        let bad_kind: Snapshot = serde_json::from_str(
            r#"{"facts": [{"artifact": "LinuxLogFiles", "kind": "RsyslogRule", "origin": "x"}]}"#,
        )
        .unwrap();
        assert!(bad_kind.into_host_data("h", "t", &registry).is_err());

        let bad_attr: Snapshot = serde_json::from_str(
            r#"{"facts": [{"artifact": "LinuxLogFiles", "kind": "StatEntry", "origin": "x",
                "attributes": {"owner": "root"}}]}"#,
        )
        .unwrap();
        assert!(bad_attr.into_host_data("h", "t", &registry).is_err());
    }

    #[test]
    fn non_conforming_fact_is_kept_for_evaluation() {
        let registry = SchemaRegistry::builtin();
        let partial: Snapshot = serde_json::from_str(
            r#"{"facts": [{"artifact": "LinuxLogFiles", "kind": "StatEntry", "origin": "x",
                "attributes": {"path": "x"}}]}"#,
        )
        .unwrap();
        let data = partial.into_host_data("h", "t", &registry).unwrap();
        assert_eq!(data.records("LinuxLogFiles").len(), 1);
    }

    #[test]
    fn rejects_artifact_without_content_parser() {
        let snapshot: Snapshot =
            serde_json::from_str(r#"{"files": {"LinuxLogFiles": {"/var/log/x": "data"}}}"#).unwrap();
        assert!(snapshot
            .into_host_data("h", "t", &SchemaRegistry::builtin())
            .is_err());
    }
}
