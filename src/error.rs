use thiserror::Error;

pub type Result<T> = std::result::Result<T, CheckError>;

#[derive(Error, Debug)]
pub enum CheckError {
    #[error("Catalog validation error in {source_name} ({check_id}): {message}")]
    Validation {
        source_name: String,
        check_id: String,
        message: String,
    },

    #[error("Evaluation error ({check_id}): {message}")]
    Evaluation { check_id: String, message: String },

    #[error("Snapshot error in {file}: {message}")]
    Snapshot { file: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CheckError {
    pub(crate) fn validation(
        source_name: impl Into<String>,
        check_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation {
            source_name: source_name.into(),
            check_id: check_id.into(),
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        2
    }
}
