use miette::Diagnostic;
use sea_orm::{DbErr, SqlErr};
use serde::Serialize;
use thiserror::Error;

/// A single field-level problem reported by request or attribute validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum ConsentError {
    #[error("Validation failed: {message}")]
    #[diagnostic(
        code(consent_mgt::validation),
        help("Correct the request and try again")
    )]
    Validation {
        message: String,
        fields: Vec<FieldError>,
    },

    #[error("Conflict: {0}")]
    #[diagnostic(code(consent_mgt::conflict))]
    Conflict(String),

    #[error("Not found: {0}")]
    #[diagnostic(code(consent_mgt::not_found))]
    NotFound(String),

    #[error("Database error while {context}: {source}")]
    #[diagnostic(code(consent_mgt::db))]
    Database {
        context: String,
        #[source]
        source: DbErr,
    },

    #[error("Serialization error: {0}")]
    #[diagnostic(code(consent_mgt::serde))]
    Serde(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    #[diagnostic(code(consent_mgt::config))]
    Config(#[from] config::ConfigError),

    #[error("Extension error: {0}")]
    #[diagnostic(code(consent_mgt::extension))]
    Extension(String),

    #[error("{0}")]
    #[diagnostic(code(consent_mgt::other))]
    Other(String),
}

impl ConsentError {
    pub fn validation(message: impl Into<String>) -> Self {
        ConsentError::Validation {
            message: message.into(),
            fields: Vec::new(),
        }
    }

    /// Builds a validation error out of collected field errors.
    pub fn invalid_fields(message: impl Into<String>, fields: Vec<FieldError>) -> Self {
        let message = message.into();
        let detail = fields
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        ConsentError::Validation {
            message: if detail.is_empty() {
                message
            } else {
                format!("{message}: {detail}")
            },
            fields,
        }
    }

    /// Classifies a raw storage error. Unique-constraint violations surface as
    /// conflicts, everything else as a database failure carrying `context`.
    pub fn from_db(context: impl Into<String>, err: DbErr) -> Self {
        let context = context.into();
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(detail)) => {
                ConsentError::Conflict(format!("{context}: {detail}"))
            }
            _ => ConsentError::Database {
                context,
                source: err,
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ConsentError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ConsentError::Conflict(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ConsentError::Validation { .. })
    }
}

/// Attach an operation context to storage results at the service boundary.
pub trait DbResultExt<T> {
    fn context(self, context: impl FnOnce() -> String) -> Result<T, ConsentError>;
}

impl<T> DbResultExt<T> for Result<T, DbErr> {
    fn context(self, context: impl FnOnce() -> String) -> Result<T, ConsentError> {
        self.map_err(|e| ConsentError::from_db(context(), e))
    }
}
