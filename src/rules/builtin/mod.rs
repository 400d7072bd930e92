//! Check catalogs embedded in the binary.

/// `(source name, YAML text)` for every built-in catalog file.
pub const BUILTIN_CATALOGS: &[(&str, &str)] = &[
    ("builtin/rsyslog.yaml", include_str!("rsyslog.yaml")),
    ("builtin/logfiles.yaml", include_str!("logfiles.yaml")),
];
