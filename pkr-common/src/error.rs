//! Common error types for PKR

use thiserror::Error;

/// Common result type for PKR operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the reconciliation engine and its collaborators
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Registry snapshot could not be encoded or decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file could not be parsed
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source row too short to carry a name
    #[error("Malformed row at line {line}: {width} cell(s)")]
    MalformedRow { line: usize, width: usize },

    /// Categorical field outside its allowed set. Aborts the run.
    #[error("Strange entry at line {line}: {field} = {value:?}")]
    UnexpectedValue {
        line: usize,
        field: &'static str,
        value: String,
    },

    /// Row has no cell at the grouping column
    #[error("Row at line {line} has no group key at column {index}")]
    MissingGroupKey { line: usize, index: usize },

    /// Collaborator rejected the operation; not worth retrying
    #[error("{operation} failed: {message}")]
    Sink { operation: String, message: String },

    /// Collaborator failed in a way that may succeed on retry
    /// (quota, 5xx, connection reset)
    #[error("{operation} failed (transient): {message}")]
    Transient { operation: String, message: String },

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Whether a retry policy may re-attempt the failed operation
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_errors_are_retryable() {
        let transient = Error::Transient {
            operation: "write_rows".into(),
            message: "429".into(),
        };
        let sink = Error::Sink {
            operation: "write_rows".into(),
            message: "403".into(),
        };
        let categorical = Error::UnexpectedValue {
            line: 3,
            field: "litter",
            value: "Maybe".into(),
        };

        assert!(transient.is_transient());
        assert!(!sink.is_transient());
        assert!(!categorical.is_transient());
    }

    #[test]
    fn test_unexpected_value_message_names_value() {
        let err = Error::UnexpectedValue {
            line: 7,
            field: "litter",
            value: "Maybe".into(),
        };
        assert_eq!(err.to_string(), "Strange entry at line 7: litter = \"Maybe\"");
    }
}
