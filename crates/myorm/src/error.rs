//! Error types for myorm

use thiserror::Error;

/// Result type alias for myorm operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for building and executing statements
#[derive(Debug, Error)]
pub enum OrmError {
    /// Missing or invalid data-source definition
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Builder state is insufficient for the requested action
    #[error("Build error: {0}")]
    BuildValidation(String),

    /// A where input could not be normalized into a condition
    #[error("Normalization error: {0}")]
    Normalization(String),

    /// Driver-level failure
    #[cfg(feature = "mysql")]
    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),

    /// Statement execution failure reported by an executor
    #[error("Execution error: {0}")]
    Execution(String),

    /// Unique constraint violation
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// Foreign key constraint violation
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Check constraint violation
    #[error("Check constraint violation: {0}")]
    CheckViolation(String),

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl OrmError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a build validation error
    pub fn build(message: impl Into<String>) -> Self {
        Self::BuildValidation(message.into())
    }

    /// Create a normalization error
    pub fn normalization(message: impl Into<String>) -> Self {
        Self::Normalization(message.into())
    }

    /// Create an execution error
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Check if this is a unique violation error
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_))
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this error was raised before any I/O took place
    pub fn is_build_error(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::BuildValidation(_) | Self::Normalization(_)
        )
    }

    /// Classify a sqlx error into a more specific OrmError
    #[cfg(feature = "mysql")]
    pub fn from_db_error(err: sqlx::Error) -> Self {
        use sqlx::error::ErrorKind;

        if let Some(db_err) = err.as_database_error() {
            let code = db_err.code().map(|c| c.into_owned()).unwrap_or_default();
            let message = format!("{}: {}", code, db_err.message());
            match db_err.kind() {
                ErrorKind::UniqueViolation => return Self::UniqueViolation(message),
                ErrorKind::ForeignKeyViolation => return Self::ForeignKeyViolation(message),
                ErrorKind::CheckViolation => return Self::CheckViolation(message),
                _ => {}
            }
        }
        Self::Query(err)
    }
}

impl From<serde_json::Error> for OrmError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_errors_are_pre_io() {
        assert!(OrmError::build("Empty target").is_build_error());
        assert!(OrmError::normalization("bad shape").is_build_error());
        assert!(OrmError::configuration("missing").is_build_error());
        assert!(!OrmError::execution("boom").is_build_error());
    }

    #[test]
    fn decode_message_names_column() {
        let err = OrmError::decode("age", "expected integer");
        assert_eq!(
            err.to_string(),
            "Decode error on column 'age': expected integer"
        );
    }
}
