//! Error type shared by the library modules.

/// Errors that can occur while loading, reconciling or storing game records.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid alias config: {0}")]
    AliasConfig(#[from] toml::de::Error),

    #[error("{file}: missing required column '{column}'")]
    MissingColumn { file: String, column: String },

    #[error("synthetic identifier '{0}' collides with a catalog identifier")]
    IdentifierCollision(String),
}

impl ReconcileError {
    pub fn missing_column(file: impl Into<String>, column: impl Into<String>) -> Self {
        Self::MissingColumn {
            file: file.into(),
            column: column.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
