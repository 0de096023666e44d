use thiserror::Error;

/// Custom Result type for this crate.
pub type Result<T> = std::result::Result<T, GlossaError>;

/// Enum representing all possible errors in the glossa_rs library.
#[derive(Error, Debug)]
pub enum GlossaError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Data directory not found or could not be determined")]
    DataDirNotFound,

    /// A natural-key collision on create ("existing gloss", "existing login", ...).
    #[error("Existing {entity}: {key}")]
    Duplicate { entity: &'static str, key: String },

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("Invalid login or password")]
    InvalidCredentials,

    /// A required reference (corpus -> idiom, word -> sentence, ...) is missing or dangling.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Idiom hierarchy cycle: {0}")]
    CycleDetected(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal error: {0}")]
    Internal(String), // For unexpected situations
}

impl GlossaError {
    pub(crate) fn duplicate(entity: &'static str, key: impl Into<String>) -> Self {
        GlossaError::Duplicate {
            entity,
            key: key.into(),
        }
    }

    pub(crate) fn not_found(entity: &'static str, key: impl ToString) -> Self {
        GlossaError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// True for the "already exists" outcome of an add-operation.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, GlossaError::Duplicate { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, GlossaError::NotFound { .. })
    }
}
