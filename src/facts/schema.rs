//! Declared shapes of fact records.
//!
//! Every artifact lists the record kinds it may yield and every kind lists
//! its attributes. The catalog is validated against this registry at load
//! time so evaluation never has to guess at record shapes.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::{stat, FactRecord, Value};

pub const LINUX_RSYSLOG_CONFIGS: &str = "LinuxRsyslogConfigs";
pub const LINUX_LOG_FILES: &str = "LinuxLogFiles";
pub const RSYSLOG_RULE: &str = "RsyslogRule";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Str,
    Int,
    Set,
    Mode,
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Str => write!(f, "string"),
            Self::Int => write!(f, "integer"),
            Self::Set => write!(f, "set"),
            Self::Mode => write!(f, "mode"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSpec {
    pub value_type: ValueType,
    pub required: bool,
}

/// Attribute schema of one record kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindSchema {
    pub name: String,
    attributes: BTreeMap<String, AttributeSpec>,
}

impl KindSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn required(mut self, attribute: &str, value_type: ValueType) -> Self {
        self.attributes.insert(
            attribute.to_string(),
            AttributeSpec {
                value_type,
                required: true,
            },
        );
        self
    }

    pub fn optional(mut self, attribute: &str, value_type: ValueType) -> Self {
        self.attributes.insert(
            attribute.to_string(),
            AttributeSpec {
                value_type,
                required: false,
            },
        );
        self
    }

    pub fn attribute(&self, name: &str) -> Option<AttributeSpec> {
        self.attributes.get(name).copied()
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    /// Convert a loosely typed JSON value into this kind's declared type for `attribute`.
    pub fn coerce(&self, attribute: &str, raw: &serde_json::Value) -> Result<Value, String> {
        let spec = self
            .attribute(attribute)
            .ok_or_else(|| format!("unknown attribute '{attribute}' for kind {}", self.name))?;

        let coerced = match (spec.value_type, raw) {
            (ValueType::Str, serde_json::Value::String(s)) => Some(Value::Str(s.clone())),
            (ValueType::Int, serde_json::Value::Number(n)) => n.as_i64().map(Value::Int),
            (ValueType::Set, serde_json::Value::String(s)) => Some(Value::set([s.as_str()])),
            (ValueType::Set, serde_json::Value::Array(items)) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<BTreeSet<String>>>()
                .map(Value::Set),
            (ValueType::Mode, serde_json::Value::Number(n)) => {
                n.as_u64().and_then(|m| u32::try_from(m).ok()).map(Value::Mode)
            }
            (ValueType::Mode, serde_json::Value::String(s)) => stat::parse_octal(s).map(Value::Mode),
            _ => None,
        };

        coerced.ok_or_else(|| {
            format!(
                "attribute '{attribute}' of kind {} expects a {} value, got {raw}",
                self.name, spec.value_type
            )
        })
    }

    /// Verify a record carries every required attribute with its declared type.
    pub fn conform(&self, record: &FactRecord) -> Result<(), String> {
        for (name, spec) in &self.attributes {
            match record.get(name) {
                None if spec.required => {
                    return Err(format!(
                        "record {} lacks required attribute '{name}'",
                        record.origin
                    ))
                }
                Some(value) if value.value_type() != spec.value_type => {
                    return Err(format!(
                        "record {} attribute '{name}' is {}, expected {}",
                        record.origin,
                        value.value_type(),
                        spec.value_type
                    ))
                }
                _ => {}
            }
        }
        if let Some(extra) = record
            .attributes()
            .keys()
            .find(|name| !self.attributes.contains_key(name.as_str()))
        {
            return Err(format!(
                "record {} has undeclared attribute '{extra}'",
                record.origin
            ));
        }
        Ok(())
    }
}

/// Registry of artifacts and record kinds known to the engine.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    kinds: BTreeMap<String, KindSchema>,
    artifacts: BTreeMap<String, Vec<String>>,
}

impl SchemaRegistry {
    /// An empty registry, for callers that declare every schema themselves.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the built-in record kinds and artifacts.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register_kind(
            KindSchema::new(stat::STAT_ENTRY)
                .required("path", ValueType::Str)
                .required("uid", ValueType::Int)
                .required("gid", ValueType::Int)
                .required("mode", ValueType::Mode)
                .optional("size", ValueType::Int),
        );
        registry.register_kind(
            KindSchema::new(RSYSLOG_RULE)
                .required("facilities", ValueType::Set)
                .required("excluded", ValueType::Set)
                .required("priority", ValueType::Str)
                .required("transport", ValueType::Str)
                .required("destination", ValueType::Str)
                .optional("port", ValueType::Int)
                .optional("template", ValueType::Str)
                .required("line", ValueType::Str),
        );
        registry.register_artifact(LINUX_RSYSLOG_CONFIGS, [RSYSLOG_RULE, stat::STAT_ENTRY]);
        registry.register_artifact(LINUX_LOG_FILES, [stat::STAT_ENTRY]);
        registry
    }

    pub fn register_kind(&mut self, schema: KindSchema) {
        self.kinds.insert(schema.name.clone(), schema);
    }

    pub fn register_artifact<I, S>(&mut self, artifact: &str, kinds: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.artifacts
            .insert(artifact.to_string(), kinds.into_iter().map(Into::into).collect());
    }

    pub fn kind(&self, name: &str) -> Option<&KindSchema> {
        self.kinds.get(name)
    }

    /// Record kinds the artifact may yield, or `None` for an unknown artifact.
    pub fn artifact_kinds(&self, artifact: &str) -> Option<&[String]> {
        self.artifacts.get(artifact).map(Vec::as_slice)
    }

    pub fn has_artifact(&self, artifact: &str) -> bool {
        self.artifacts.contains_key(artifact)
    }

    pub fn artifacts(&self) -> impl Iterator<Item = &str> {
        self.artifacts.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builtin_registry_declares_rsyslog_artifact() {
        let registry = SchemaRegistry::builtin();
        let kinds = registry.artifact_kinds(LINUX_RSYSLOG_CONFIGS).unwrap();
        assert!(kinds.iter().any(|k| k == RSYSLOG_RULE));
        assert!(kinds.iter().any(|k| k == stat::STAT_ENTRY));
        assert!(registry.artifact_kinds("NoSuchArtifact").is_none());
    }

    #[test]
    fn coerce_mode_from_octal_string_and_number() {
        let registry = SchemaRegistry::builtin();
        let stat_kind = registry.kind(stat::STAT_ENTRY).unwrap();
        assert_eq!(
            stat_kind.coerce("mode", &json!("0100644")).unwrap(),
            Value::Mode(0o100644)
        );
        assert_eq!(
            stat_kind.coerce("mode", &json!(33188)).unwrap(),
            Value::Mode(0o100644)
        );
        assert!(stat_kind.coerce("uid", &json!("root")).is_err());
        assert!(stat_kind.coerce("owner", &json!(0)).is_err());
    }

    #[test]
    fn coerce_set_from_string_or_array() {
        let registry = SchemaRegistry::builtin();
        let rule = registry.kind(RSYSLOG_RULE).unwrap();
        assert_eq!(
            rule.coerce("facilities", &json!("auth")).unwrap(),
            Value::set(["auth"])
        );
        assert_eq!(
            rule.coerce("facilities", &json!(["auth", "kern"])).unwrap(),
            Value::set(["kern", "auth"])
        );
        assert!(rule.coerce("facilities", &json!([1, 2])).is_err());
    }

    #[test]
    fn conform_rejects_missing_required_attribute() {
        let registry = SchemaRegistry::builtin();
        let stat_kind = registry.kind(stat::STAT_ENTRY).unwrap();
        let partial = FactRecord::new(LINUX_LOG_FILES, stat::STAT_ENTRY, "/var/log/x")
            .with("path", "/var/log/x")
            .with("uid", 0_i64);
        let err = stat_kind.conform(&partial).unwrap_err();
        assert!(err.contains("gid"));

        let full = stat::create_stat(LINUX_LOG_FILES, "/var/log/x", 0, 0, 0o100600);
        assert!(stat_kind.conform(&full).is_ok());
    }
}
