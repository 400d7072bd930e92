//! Evidence format templates: `"{path} user: {uid}, mode: {mode}"`.

use crate::facts::{FactRecord, KindSchema};

/// Placeholder that always resolves to the record origin.
pub const ORIGIN_FIELD: &str = "origin";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Field(String),
}

/// Compiled evidence template. Placeholders are checked against the record
/// kind when the catalog is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceTemplate {
    parts: Vec<Part>,
}

impl Default for EvidenceTemplate {
    fn default() -> Self {
        Self {
            parts: vec![Part::Field(ORIGIN_FIELD.into())],
        }
    }
}

impl EvidenceTemplate {
    pub fn compile(format: &str, kind: &KindSchema) -> Result<Self, String> {
        let mut parts = Vec::new();
        let mut rest = format;

        while let Some(open) = rest.find('{') {
            if open > 0 {
                parts.push(Part::Literal(rest[..open].to_string()));
            }
            let after = &rest[open + 1..];
            let close = after
                .find('}')
                .ok_or_else(|| format!("unclosed '{{' in format \"{format}\""))?;
            let field = after[..close].trim();
            if field.is_empty() {
                return Err(format!("empty placeholder in format \"{format}\""));
            }
            if field != ORIGIN_FIELD && kind.attribute(field).is_none() {
                return Err(format!(
                    "format placeholder '{field}' is not an attribute of {}",
                    kind.name
                ));
            }
            parts.push(Part::Field(field.to_string()));
            rest = &after[close + 1..];
        }
        if rest.contains('}') {
            return Err(format!("unmatched '}}' in format \"{format}\""));
        }
        if !rest.is_empty() {
            parts.push(Part::Literal(rest.to_string()));
        }

        Ok(Self { parts })
    }

    /// Render against a record. Absent optional attributes render as empty text.
    pub fn render(&self, record: &FactRecord) -> String {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Field(name) if name == ORIGIN_FIELD => out.push_str(&record.origin),
                Part::Field(name) => {
                    if let Some(value) = record.get(name) {
                        out.push_str(&value.to_string());
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::stat::{create_stat, STAT_ENTRY};
    use crate::facts::SchemaRegistry;

    fn stat_kind() -> KindSchema {
        SchemaRegistry::builtin().kind(STAT_ENTRY).unwrap().clone()
    }

    #[test]
    fn renders_stat_evidence() {
        let template =
            EvidenceTemplate::compile("{path} user: {uid}, group: {gid}, mode: {mode}", &stat_kind())
                .unwrap();
        let record = create_stat("LinuxRsyslogConfigs", "/test/rw", 0, 0, 0o100666);
        assert_eq!(
            template.render(&record),
            "/test/rw user: 0, group: 0, mode: -rw-rw-rw-"
        );
    }

    #[test]
    fn default_template_renders_origin() {
        let record = create_stat("LinuxLogFiles", "/var/log/x", 0, 0, 0o100600);
        assert_eq!(EvidenceTemplate::default().render(&record), "/var/log/x");
    }

    #[test]
    fn rejects_unknown_placeholder_and_bad_braces() {
        assert!(EvidenceTemplate::compile("{owner}", &stat_kind()).is_err());
        assert!(EvidenceTemplate::compile("{path", &stat_kind()).is_err());
        assert!(EvidenceTemplate::compile("path}", &stat_kind()).is_err());
        assert!(EvidenceTemplate::compile("{}", &stat_kind()).is_err());
    }
}
