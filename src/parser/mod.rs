pub mod rsyslog;
pub mod stat;

use crate::facts::schema::LINUX_RSYSLOG_CONFIGS;
use crate::facts::FactRecord;

/// Artifact parser trait. Each parser turns the raw content of one collected
/// file into structured fact records.
///
/// Parsers never fail: malformed input is skipped (or produces a partial
/// record, if the parser documents that) and an empty result means the file
/// carried no relevant facts.
pub trait FactParser: Send + Sync {
    /// Artifact the produced records are tagged with.
    fn artifact(&self) -> &str;

    fn parse(&self, source: &str, content: &str) -> Vec<FactRecord>;
}

/// Get the content parser registered for an artifact.
pub fn parser_for_artifact(artifact: &str) -> Option<Box<dyn FactParser>> {
    match artifact {
        LINUX_RSYSLOG_CONFIGS => Some(Box::new(rsyslog::RsyslogParser::default())),
        _ => None,
    }
}
