//! Filesystem metadata records.

use super::{FactRecord, Value};

pub const STAT_ENTRY: &str = "StatEntry";

const S_IFMT: u32 = 0o170000;
const S_IFSOCK: u32 = 0o140000;
const S_IFLNK: u32 = 0o120000;
const S_IFREG: u32 = 0o100000;
const S_IFBLK: u32 = 0o060000;
const S_IFDIR: u32 = 0o040000;
const S_IFCHR: u32 = 0o020000;
const S_IFIFO: u32 = 0o010000;

const S_ISUID: u32 = 0o4000;
const S_ISGID: u32 = 0o2000;
const S_ISVTX: u32 = 0o1000;

/// Create a `StatEntry` record for `path` under `artifact`.
pub fn create_stat(artifact: &str, path: &str, uid: i64, gid: i64, mode: u32) -> FactRecord {
    FactRecord::new(artifact, STAT_ENTRY, path)
        .with("path", path)
        .with("uid", uid)
        .with("gid", gid)
        .with("mode", Value::Mode(mode))
}

/// Render a mode the way `ls -l` does, e.g. `0o100640` -> `-rw-r-----`.
pub fn symbolic_mode(mode: u32) -> String {
    let file_type = match mode & S_IFMT {
        S_IFSOCK => 's',
        S_IFLNK => 'l',
        S_IFBLK => 'b',
        S_IFDIR => 'd',
        S_IFCHR => 'c',
        S_IFIFO => 'p',
        S_IFREG => '-',
        _ => '-',
    };

    let mut out = String::with_capacity(10);
    out.push(file_type);

    for (shift, special, marker) in [(6, S_ISUID, 's'), (3, S_ISGID, 's'), (0, S_ISVTX, 't')] {
        let bits = (mode >> shift) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        let exec = bits & 0o1 != 0;
        out.push(match (mode & special != 0, exec) {
            (true, true) => marker,
            (true, false) => marker.to_ascii_uppercase(),
            (false, true) => 'x',
            (false, false) => '-',
        });
    }

    out
}

/// Parse an octal mode string. Accepts `0640`, `100640` and `0o640`.
pub fn parse_octal(s: &str) -> Option<u32> {
    let trimmed = s.trim();
    let digits = trimmed
        .strip_prefix("0o")
        .or_else(|| trimmed.strip_prefix("0O"))
        .unwrap_or(trimmed);
    if digits.is_empty() {
        return None;
    }
    u32::from_str_radix(digits, 8).ok()
}
