//! Declarative check catalog.
//!
//! Checks are YAML documents, one per check, optionally several per file
//! separated by `---`:
//!
//! ```yaml
//! check_id: CIS-LOGGING-AUTH-REMOTE
//! artifact: LinuxRsyslogConfigs
//! severity: high
//! hint:
//!   problem: No remote destination for auth logs.
//! method:
//!   - record: RsyslogRule
//!     trigger: none
//!     match:
//!       - {attribute: facilities, op: any_of, value: ["*", auth, authpriv]}
//!       - {attribute: excluded, op: none_of, value: [auth, authpriv]}
//!       - {attribute: transport, op: any_of, value: [TCP, UDP]}
//! ```
//!
//! Empty documents are skipped. Every other document is validated against
//! the `SchemaRegistry`. A catalog either loads completely or not at all.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use super::builtin;
use super::check::{Check, Hint, Method};
use super::matcher::{Matcher, Operator, RawExpected, Trigger};
use super::result::{CheckMetadata, Severity};
use super::template::EvidenceTemplate;
use crate::error::{CheckError, Result};
use crate::facts::SchemaRegistry;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CheckDocument {
    check_id: String,
    artifact: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    severity: Severity,
    hint: HintDocument,
    #[serde(default)]
    method: Vec<MethodDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HintDocument {
    problem: String,
    #[serde(default)]
    fix: Option<String>,
    #[serde(default)]
    format: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct MethodHintDocument {
    #[serde(default)]
    problem: Option<String>,
    #[serde(default)]
    fix: Option<String>,
    #[serde(default)]
    format: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MethodDocument {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    record: Option<String>,
    #[serde(default)]
    trigger: Trigger,
    #[serde(rename = "match", default)]
    matchers: Vec<MatcherDocument>,
    #[serde(default)]
    hint: Option<MethodHintDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MatcherDocument {
    attribute: String,
    op: Operator,
    #[serde(default)]
    value: Option<serde_yaml::Value>,
}

/// A file (or embedded document set) the catalog was loaded from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSource {
    pub name: String,
    pub sha256: String,
    pub checks: usize,
}

/// Validated, immutable set of checks.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    checks: Vec<Check>,
    sources: Vec<CatalogSource>,
}

impl Catalog {
    /// Parse and validate a YAML stream of check documents.
    pub fn from_yaml_str(text: &str, source_name: &str, registry: &SchemaRegistry) -> Result<Self> {
        let mut checks: Vec<Check> = Vec::new();

        for (idx, document) in serde_yaml::Deserializer::from_str(text).enumerate() {
            let invalid = |e: serde_yaml::Error| {
                CheckError::validation(source_name, format!("document {}", idx + 1), e.to_string())
            };
            // Empty and comment-only documents (e.g. after a trailing `---`).
            let value = serde_yaml::Value::deserialize(document).map_err(invalid)?;
            if value.is_null() {
                continue;
            }
            let doc: CheckDocument = serde_yaml::from_value(value).map_err(invalid)?;
            let check = compile(doc, source_name, registry)?;
            if checks.iter().any(|c| c.check_id == check.check_id) {
                return Err(CheckError::validation(
                    source_name,
                    &check.check_id,
                    "duplicate check id",
                ));
            }
            checks.push(check);
        }

        let source = CatalogSource {
            name: source_name.to_string(),
            sha256: hex::encode(Sha256::digest(text.as_bytes())),
            checks: checks.len(),
        };
        tracing::debug!(source = source_name, checks = checks.len(), "loaded check documents");

        Ok(Self {
            checks,
            sources: vec![source],
        })
    }

    /// Load a catalog file, or every `*.yaml`/`*.yml` file under a directory
    /// in file name order.
    pub fn load_path(path: &Path, registry: &SchemaRegistry) -> Result<Self> {
        let mut catalog = Self::default();

        if path.is_file() {
            let text = std::fs::read_to_string(path)?;
            catalog.merge(Self::from_yaml_str(&text, &path.display().to_string(), registry)?)?;
            return Ok(catalog);
        }

        if !path.is_dir() {
            return Err(CheckError::Config(format!(
                "catalog path does not exist: {}",
                path.display()
            )));
        }

        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry.map_err(|e| CheckError::Io(e.into()))?;
            let is_yaml = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == "yaml" || e == "yml");
            if !entry.file_type().is_file() || !is_yaml {
                continue;
            }
            let text = std::fs::read_to_string(entry.path())?;
            let loaded = Self::from_yaml_str(&text, &entry.path().display().to_string(), registry)?;
            catalog.merge(loaded)?;
        }

        tracing::info!(
            path = %path.display(),
            checks = catalog.len(),
            files = catalog.sources.len(),
            "loaded check catalog"
        );
        Ok(catalog)
    }

    /// The checks shipped with the crate.
    pub fn builtin(registry: &SchemaRegistry) -> Result<Self> {
        let mut catalog = Self::default();
        for (name, text) in builtin::BUILTIN_CATALOGS {
            catalog.merge(Self::from_yaml_str(text, name, registry)?)?;
        }
        Ok(catalog)
    }

    /// Add another catalog's checks. Fails without modifying `self` if any
    /// check id is already present.
    pub fn merge(&mut self, other: Catalog) -> Result<()> {
        let existing: BTreeSet<&str> = self.checks.iter().map(|c| c.check_id.as_str()).collect();
        if let Some(dup) = other
            .checks
            .iter()
            .find(|c| existing.contains(c.check_id.as_str()))
        {
            let source = other
                .sources
                .first()
                .map(|s| s.name.clone())
                .unwrap_or_default();
            return Err(CheckError::validation(
                source,
                &dup.check_id,
                "check id already defined by another catalog source",
            ));
        }

        self.checks.extend(other.checks);
        self.sources.extend(other.sources);
        Ok(())
    }

    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    pub fn get(&self, check_id: &str) -> Option<&Check> {
        self.checks.iter().find(|c| c.check_id == check_id)
    }

    pub fn sources(&self) -> &[CatalogSource] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// List metadata for all loaded checks.
    pub fn list_checks(&self) -> Vec<CheckMetadata> {
        self.checks.iter().map(Check::metadata).collect()
    }
}

fn compile(doc: CheckDocument, source: &str, registry: &SchemaRegistry) -> Result<Check> {
    let check_id = doc.check_id.trim().to_string();
    let invalid = |message: String| CheckError::validation(source, check_id.clone(), message);

    if check_id.is_empty() {
        return Err(invalid("check_id must not be empty".into()));
    }
    let kinds = registry
        .artifact_kinds(&doc.artifact)
        .ok_or_else(|| invalid(format!("unknown artifact '{}'", doc.artifact)))?;
    if doc.method.is_empty() {
        return Err(invalid("check declares no methods".into()));
    }
    if doc.hint.problem.trim().is_empty() {
        return Err(invalid("hint.problem must not be empty".into()));
    }

    let hint = Hint {
        problem: doc.hint.problem,
        fix: doc.hint.fix,
        format: doc.hint.format,
    };

    let mut methods = Vec::with_capacity(doc.method.len());
    for (idx, method) in doc.method.into_iter().enumerate() {
        let label = method
            .name
            .clone()
            .unwrap_or_else(|| format!("method {}", idx + 1));

        let record = match (method.record, kinds) {
            (Some(record), _) => record,
            (None, [only]) => only.clone(),
            (None, _) => {
                return Err(invalid(format!(
                    "{label}: artifact '{}' yields several record kinds; set 'record'",
                    doc.artifact
                )))
            }
        };
        if !kinds.contains(&record) {
            return Err(invalid(format!(
                "{label}: artifact '{}' does not yield '{record}' records",
                doc.artifact
            )));
        }
        let kind = registry
            .kind(&record)
            .ok_or_else(|| invalid(format!("{label}: unknown record kind '{record}'")))?;

        let mut matchers = Vec::with_capacity(method.matchers.len());
        for m in method.matchers {
            let spec = kind.attribute(&m.attribute).ok_or_else(|| {
                invalid(format!(
                    "{label}: unknown attribute '{}' for {record}",
                    m.attribute
                ))
            })?;
            let raw = m
                .value
                .map(raw_expected)
                .transpose()
                .map_err(|e| invalid(format!("{label}: {e}")))?;
            let matcher = Matcher::compile(&m.attribute, spec, m.op, raw)
                .map_err(|e| invalid(format!("{label}: {e}")))?;
            matchers.push(matcher);
        }

        let overrides = method.hint.unwrap_or_default();
        let method_hint = Hint {
            problem: overrides.problem.unwrap_or_else(|| hint.problem.clone()),
            fix: overrides.fix.or_else(|| hint.fix.clone()),
            format: overrides.format.or_else(|| hint.format.clone()),
        };
        let format = match &method_hint.format {
            Some(text) => EvidenceTemplate::compile(text, kind)
                .map_err(|e| invalid(format!("{label}: {e}")))?,
            None => EvidenceTemplate::default(),
        };

        methods.push(Method {
            name: method.name,
            record,
            matchers,
            trigger: method.trigger,
            hint: method_hint,
            format,
        });
    }

    Ok(Check {
        check_id,
        artifact: doc.artifact,
        description: doc.description,
        severity: doc.severity,
        hint,
        methods,
    })
}

fn raw_expected(value: serde_yaml::Value) -> std::result::Result<RawExpected, String> {
    match value {
        serde_yaml::Value::Sequence(items) => items
            .into_iter()
            .map(|item| scalar(item).ok_or_else(|| "list values must be scalars".to_string()))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(RawExpected::List),
        serde_yaml::Value::Number(n) if n.as_i64().is_some() => {
            Ok(RawExpected::Int(n.as_i64().unwrap_or_default()))
        }
        other => scalar(other)
            .map(RawExpected::Text)
            .ok_or_else(|| "value must be a scalar or a list of scalars".to_string()),
    }
}

fn scalar(value: serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::builtin()
    }

    fn load(yaml: &str) -> Result<Catalog> {
        Catalog::from_yaml_str(yaml, "test.yaml", &registry())
    }

    fn validation_message(result: Result<Catalog>) -> String {
        match result {
            Err(CheckError::Validation { message, .. }) => message,
            Err(other) => panic!("expected validation error, got {other}"),
            Ok(_) => panic!("expected validation error, catalog loaded"),
        }
    }

    const VALID: &str = r#"
check_id: A
artifact: LinuxLogFiles
hint: {problem: p}
method:
  - match: [{attribute: mode, op: bits_any, value: "0002"}]
---
check_id: B
artifact: LinuxRsyslogConfigs
hint: {problem: q}
method:
  - record: RsyslogRule
    trigger: none
    match: [{attribute: transport, op: equals, value: TCP}]
"#;

    #[test]
    fn loads_multi_document_stream() {
        let catalog = load(VALID).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("B").unwrap().methods[0].trigger, Trigger::None);
        assert_eq!(catalog.sources()[0].checks, 2);
        assert_eq!(catalog.sources()[0].sha256.len(), 64);
    }

    #[test]
    fn empty_and_comment_only_documents_are_skipped() {
        let catalog = load("# nothing yet\n").unwrap();
        assert!(catalog.is_empty());
        assert_eq!(catalog.sources()[0].checks, 0);

        assert!(load("").unwrap().is_empty());

        let trailing = format!("{VALID}---\n");
        assert_eq!(load(&trailing).unwrap().len(), 2);

        let between = VALID.replacen("---\n", "---\n# disabled for now\n---\n", 1);
        assert_eq!(load(&between).unwrap().len(), 2);
    }

    #[test]
    fn rejects_unknown_artifact() {
        let msg = validation_message(load(
            "check_id: X\nartifact: NoSuchArtifact\nhint: {problem: p}\nmethod:\n  - match: []\n",
        ));
        assert!(msg.contains("unknown artifact"));
    }

    #[test]
    fn rejects_unknown_attribute() {
        let msg = validation_message(load(
            "check_id: X\nartifact: LinuxLogFiles\nhint: {problem: p}\nmethod:\n  - match: [{attribute: owner, op: present}]\n",
        ));
        assert!(msg.contains("unknown attribute 'owner'"));
    }

    #[test]
    fn rejects_operator_type_mismatch() {
        let msg = validation_message(load(
            "check_id: X\nartifact: LinuxLogFiles\nhint: {problem: p}\nmethod:\n  - match: [{attribute: path, op: gt, value: 3}]\n",
        ));
        assert!(msg.contains("cannot be applied"));
    }

    #[test]
    fn rejects_ambiguous_record_kind() {
        let msg = validation_message(load(
            "check_id: X\nartifact: LinuxRsyslogConfigs\nhint: {problem: p}\nmethod:\n  - match: []\n",
        ));
        assert!(msg.contains("set 'record'"));
    }

    #[test]
    fn rejects_check_without_methods_and_bad_format() {
        let msg = validation_message(load(
            "check_id: X\nartifact: LinuxLogFiles\nhint: {problem: p}\n",
        ));
        assert!(msg.contains("no methods"));

        let msg = validation_message(load(
            "check_id: X\nartifact: LinuxLogFiles\nhint: {problem: p, format: \"{owner}\"}\nmethod:\n  - match: []\n",
        ));
        assert!(msg.contains("owner"));
    }

    #[test]
    fn rejects_malformed_yaml_and_unknown_fields() {
        assert!(load("check_id: [unclosed\n").is_err());
        let msg = validation_message(load(
            "check_id: X\nartifact: LinuxLogFiles\nhint: {problem: p}\nmethods: []\n",
        ));
        assert!(msg.contains("methods"));
    }

    #[test]
    fn duplicate_ids_fail_whole_load() {
        let yaml = format!("{VALID}---\ncheck_id: A\nartifact: LinuxLogFiles\nhint: {{problem: p}}\nmethod:\n  - match: []\n");
        let msg = validation_message(load(&yaml));
        assert!(msg.contains("duplicate"));
    }

    #[test]
    fn merge_is_atomic() {
        let mut catalog = load(VALID).unwrap();
        let other = load(
            "check_id: C\nartifact: LinuxLogFiles\nhint: {problem: p}\nmethod:\n  - match: []\n---\ncheck_id: A\nartifact: LinuxLogFiles\nhint: {problem: p}\nmethod:\n  - match: []\n",
        );
        // Duplicate inside the second source is rejected before merge.
        assert!(other.is_err());

        let other = load("check_id: A\nartifact: LinuxLogFiles\nhint: {problem: p}\nmethod:\n  - match: []\n")
            .unwrap();
        assert!(catalog.merge(other).is_err());
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn load_directory_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("b.yaml"),
            "check_id: SECOND\nartifact: LinuxLogFiles\nhint: {problem: p}\nmethod:\n  - match: []\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("a.yml"),
            "check_id: FIRST\nartifact: LinuxLogFiles\nhint: {problem: p}\nmethod:\n  - match: []\n",
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        fs::write(dir.path().join("c.yaml"), "# placeholder\n").unwrap();

        let catalog = Catalog::load_path(dir.path(), &registry()).unwrap();
        let ids: Vec<&str> = catalog.checks().iter().map(|c| c.check_id.as_str()).collect();
        assert_eq!(ids, vec!["FIRST", "SECOND"]);
    }

    #[test]
    fn load_directory_fails_on_any_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("a.yaml"),
            "check_id: OK\nartifact: LinuxLogFiles\nhint: {problem: p}\nmethod:\n  - match: []\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("b.yaml"),
            "check_id: BAD\nartifact: Nope\nhint: {problem: p}\nmethod:\n  - match: []\n",
        )
        .unwrap();
        assert!(Catalog::load_path(dir.path(), &registry()).is_err());
    }

    #[test]
    fn builtin_catalog_is_valid() {
        let catalog = Catalog::builtin(&registry()).unwrap();
        assert!(catalog.get("CIS-LOGGING-AUTH-REMOTE").is_some());
        assert!(catalog.get("CIS-LOGGING-FILE-PERMISSIONS").is_some());
    }
}
