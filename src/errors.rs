use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serde JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("version conflict in collection {collection}; retry the operation")]
    VersionConflict { collection: String },

    #[error("duplicate value in collection {collection}{}", .field.as_ref().map(|f| format!(" (field: {f})")).unwrap_or_default())]
    DuplicateValue { collection: String, field: Option<String> },

    #[error("Translation error: {0}")]
    Translation(String),

    #[error("Store error during {op}: {message}")]
    Store { op: &'static str, message: String },
}

impl DbError {
    /// Only version conflicts are worth re-running; everything else is final.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}
