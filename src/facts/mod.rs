//! Structured host facts.
//!
//! Parsers turn raw artifact content into `FactRecord`s. Checks consume
//! `HostData`, which groups the records of one host by artifact. Records are
//! never mutated after a parser (or a test) produces them.

pub mod schema;
pub mod stat;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::parser::FactParser;

pub use schema::{AttributeSpec, KindSchema, SchemaRegistry, ValueType};

/// Attribute value carried by a fact record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Str(String),
    Int(i64),
    Set(BTreeSet<String>),
    /// Raw POSIX `st_mode`, including file type bits.
    Mode(u32),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Str(_) => ValueType::Str,
            Self::Int(_) => ValueType::Int,
            Self::Set(_) => ValueType::Set,
            Self::Mode(_) => ValueType::Mode,
        }
    }

    /// Build a set value from any iterator of strings.
    pub fn set<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Set(items.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{s}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Set(items) => {
                let joined: Vec<&str> = items.iter().map(String::as_str).collect();
                write!(f, "{}", joined.join(", "))
            }
            Self::Mode(mode) => write!(f, "{}", stat::symbolic_mode(*mode)),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

/// One structured datum produced from raw host content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactRecord {
    /// Artifact (fact type) this record was collected under, e.g. `LinuxRsyslogConfigs`.
    pub artifact: String,
    /// Record schema name, e.g. `RsyslogRule` or `StatEntry`.
    pub kind: String,
    /// Where the record came from (source path or synthetic label).
    pub origin: String,
    attributes: BTreeMap<String, Value>,
}

impl FactRecord {
    pub fn new(
        artifact: impl Into<String>,
        kind: impl Into<String>,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            artifact: artifact.into(),
            kind: kind.into(),
            origin: origin.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style attribute setter used by parsers while constructing a record.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }
}

/// All facts gathered for one host, grouped by artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostData {
    pub host: String,
    facts: BTreeMap<String, Vec<FactRecord>>,
}

impl HostData {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            facts: BTreeMap::new(),
        }
    }

    /// Build host data from synthetic records, bypassing any parser.
    pub fn from_records<I>(host: impl Into<String>, records: I) -> Self
    where
        I: IntoIterator<Item = FactRecord>,
    {
        let mut data = Self::new(host);
        data.extend(records);
        data
    }

    /// Build host data by running `parser` over `(source_label, content)` pairs.
    pub fn from_files<I, S, C>(host: impl Into<String>, parser: &dyn FactParser, files: I) -> Self
    where
        I: IntoIterator<Item = (S, C)>,
        S: AsRef<str>,
        C: AsRef<str>,
    {
        let mut data = Self::new(host);
        for (source, content) in files {
            data.add_file(parser, source.as_ref(), content.as_ref());
        }
        data
    }

    /// Parse one artifact file and add the resulting records.
    pub fn add_file(&mut self, parser: &dyn FactParser, source: &str, content: &str) {
        let records = parser.parse(source, content);
        tracing::debug!(
            host = %self.host,
            artifact = parser.artifact(),
            source,
            records = records.len(),
            "parsed artifact file"
        );
        self.extend(records);
    }

    pub fn add(&mut self, record: FactRecord) {
        self.facts
            .entry(record.artifact.clone())
            .or_default()
            .push(record);
    }

    pub fn extend<I>(&mut self, records: I)
    where
        I: IntoIterator<Item = FactRecord>,
    {
        for record in records {
            self.add(record);
        }
    }

    /// Records collected for `artifact`, in insertion order.
    pub fn records(&self, artifact: &str) -> &[FactRecord] {
        self.facts.get(artifact).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn artifacts(&self) -> impl Iterator<Item = &str> {
        self.facts.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.facts.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_grouped_by_artifact_in_order() {
        let data = HostData::from_records(
            "web1",
            vec![
                stat::create_stat("LinuxLogFiles", "/var/log/a", 0, 0, 0o100640),
                stat::create_stat("LinuxRsyslogConfigs", "/etc/rsyslog.conf", 0, 0, 0o100644),
                stat::create_stat("LinuxLogFiles", "/var/log/b", 0, 0, 0o100600),
            ],
        );
        let origins: Vec<&str> = data
            .records("LinuxLogFiles")
            .iter()
            .map(|r| r.origin.as_str())
            .collect();
        assert_eq!(origins, vec!["/var/log/a", "/var/log/b"]);
        assert_eq!(data.len(), 3);
        assert!(data.records("Missing").is_empty());
    }

    #[test]
    fn set_value_display_is_sorted() {
        let v = Value::set(["authpriv", "auth"]);
        assert_eq!(v.to_string(), "auth, authpriv");
    }
}
