//! Stat listing parser.
//!
//! Reads the output of `stat -c '%f %u %g %s %n' <paths...>`: raw mode in hex,
//! owner uid, group gid, size in bytes, then the path (which may contain
//! spaces). One `StatEntry` per well-formed line; other lines are skipped.

use super::FactParser;
use crate::facts::stat::create_stat;
use crate::facts::FactRecord;

pub struct StatParser {
    artifact: String,
}

impl StatParser {
    pub fn new(artifact: impl Into<String>) -> Self {
        Self {
            artifact: artifact.into(),
        }
    }
}

impl FactParser for StatParser {
    fn artifact(&self) -> &str {
        &self.artifact
    }

    fn parse(&self, source: &str, content: &str) -> Vec<FactRecord> {
        let mut records = Vec::new();

        for (line_idx, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match parse_line(trimmed) {
                Some((mode, uid, gid, size, path)) => {
                    records.push(
                        create_stat(&self.artifact, path, uid, gid, mode).with("size", size),
                    );
                }
                None => {
                    tracing::debug!(source, line = line_idx + 1, "skipping malformed stat line");
                }
            }
        }

        records
    }
}

fn parse_line(line: &str) -> Option<(u32, i64, i64, i64, &str)> {
    let (mode, rest) = next_field(line)?;
    let (uid, rest) = next_field(rest)?;
    let (gid, rest) = next_field(rest)?;
    let (size, rest) = next_field(rest)?;
    // The path is the rest of the line and may itself contain spaces.
    let path = rest.trim();
    if path.is_empty() {
        return None;
    }
    Some((
        u32::from_str_radix(mode, 16).ok()?,
        uid.parse().ok()?,
        gid.parse().ok()?,
        size.parse().ok()?,
        path,
    ))
}

/// Split off the next whitespace-delimited field, skipping any run of
/// separators before it.
fn next_field(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start();
    if s.is_empty() {
        return None;
    }
    Some(s.split_at(s.find(char::is_whitespace).unwrap_or(s.len())))
}
