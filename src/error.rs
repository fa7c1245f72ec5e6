use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// Application-level error for the CLI and server entry points.
///
/// Validation problems are never reported through this type; they become
/// issues inside a [`ValidationReport`](crate::report::ValidationReport).
#[derive(Error, Debug)]
pub enum XsdError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Input could not be read: {path} - {source}")]
    InputUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File system traversal error: {path} - {reason}")]
    FileSystemTraversal { path: PathBuf, reason: String },

    #[error("Worker pool error: {details}")]
    Concurrency { details: String },
}

/// Failure to obtain or compile one schema document
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Could not find file '{}'.", path.display())]
    NotFound { path: PathBuf },

    #[error("Could not read file '{}': {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("The schema file '{}' is not well-formed: {details}", path.display())]
    Malformed { path: PathBuf, details: String },

    #[error("The schema file '{}' is invalid: {details}", path.display())]
    Invalid { path: PathBuf, details: String },

    #[error(
        "The targetNamespace parameter '{expected}' should be the same value as the targetNamespace '{actual}' of the schema."
    )]
    NamespaceMismatch { expected: String, actual: String },

    #[error("Remote schema locations are not supported: '{location}'.")]
    UnsupportedLocation { location: String },
}

impl SchemaError {
    pub fn from_io(path: PathBuf, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => SchemaError::NotFound { path },
            _ => SchemaError::Unreadable { path, source: err },
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, XsdError>;

/// Schema result type alias
pub type SchemaResult<T> = std::result::Result<T, SchemaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_display() {
        let not_found = SchemaError::NotFound {
            path: PathBuf::from("/schemas/foo.xsd"),
        };
        assert_eq!(not_found.to_string(), "Could not find file '/schemas/foo.xsd'.");

        let mismatch = SchemaError::NamespaceMismatch {
            expected: "urn:a".to_string(),
            actual: "urn:b".to_string(),
        };
        assert!(mismatch.to_string().contains("'urn:a'"));
        assert!(mismatch.to_string().contains("'urn:b'"));
    }

    #[test]
    fn test_from_io_maps_not_found() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert!(matches!(
            SchemaError::from_io(PathBuf::from("a.xsd"), err),
            SchemaError::NotFound { .. }
        ));

        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(matches!(
            SchemaError::from_io(PathBuf::from("a.xsd"), err),
            SchemaError::Unreadable { .. }
        ));
    }

    #[test]
    fn test_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err: XsdError = io_error.into();
        assert!(err.to_string().contains("IO error"));

        let schema_err: XsdError = SchemaError::UnsupportedLocation {
            location: "http://example.com/a.xsd".to_string(),
        }
        .into();
        assert!(schema_err.to_string().contains("http://example.com/a.xsd"));
    }
}
