use thiserror::Error;

/// Key used for errors that do not belong to a single request field.
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

#[derive(Error, Debug)]
pub enum ClassroomError {
    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Signature verification failed: {0}")]
    Signature(String),

    #[error("Gateway error ({service}): {message}")]
    Gateway { service: &'static str, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {message}")]
    Database { message: String },

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClassroomError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ClassroomError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn non_field(message: impl Into<String>) -> Self {
        Self::invalid(NON_FIELD_ERRORS, message)
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        ClassroomError::NotFound(what.into())
    }

    pub fn gateway(service: &'static str, message: impl Into<String>) -> Self {
        ClassroomError::Gateway {
            service,
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for ClassroomError {
    fn from(e: rusqlite::Error) -> Self {
        ClassroomError::Database {
            message: e.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClassroomError>;
