use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutomationError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ledger store error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Environment variable error: {0}")]
    Env(#[from] std::env::VarError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Calendar feed error: {0}")]
    Feed(String),

    #[error("Lead extraction failed for event '{event_id}': {reason}")]
    Extraction { event_id: String, reason: String },

    #[error("Build File creation failed: {0}")]
    FileCreation(String),

    #[error("Assessment link generation failed: {0}")]
    LinkGeneration(String),

    #[error("Build File validation failed for '{file_id}': {reason}")]
    Validation { file_id: String, reason: String },

    #[error("No Build File found for {leader} <{email}>; Phase 1 appears to have never completed")]
    BuildFileNotFound { leader: String, email: String },

    #[error("Ledger unavailable: {0}")]
    LedgerUnavailable(String),
}

pub type Result<T> = std::result::Result<T, AutomationError>;
