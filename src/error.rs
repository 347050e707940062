//! ORM error types
//!
//! Every failure surfaced by the crate is one of four kinds:
//!
//! - **Build**: a queryset or expression was composed incorrectly. Raised
//!   while building, never at execution time.
//! - **Server**: the database rejected the statement.
//! - **Transport**: the request never produced a usable response
//!   (connection refused, timeout, interrupted stream, pool exhausted).
//! - **Decode**: a wire value could not be converted by its field codec.
//!
//! Nothing in the crate retries on its own. Transport errors may be retried
//! by the caller; server errors are deterministic and should not be.

use thiserror::Error;

/// Boxed source error carried by transport failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while building or executing queries
#[derive(Error, Debug)]
pub enum OrmError {
    /// Malformed expression or queryset composition
    #[error("Build error: {0}")]
    Build(String),

    /// The database rejected the statement
    #[error("Server error {code}: {message} (statement: {statement})")]
    Server {
        code: u32,
        message: String,
        statement: String,
    },

    /// Connection, timeout or stream failure
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        statement: Option<String>,
        #[source]
        source: Option<BoxError>,
    },

    /// A wire value could not be converted to its field type
    #[error("Decode error in column `{column}`: {message}")]
    Decode {
        column: String,
        value: Option<String>,
        message: String,
        statement: Option<String>,
    },

    /// Invalid connection configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl OrmError {
    /// Create a build error
    pub fn build(message: impl Into<String>) -> Self {
        OrmError::Build(message.into())
    }

    /// Create a transport error without an underlying source
    pub fn transport(message: impl Into<String>) -> Self {
        OrmError::Transport {
            message: message.into(),
            statement: None,
            source: None,
        }
    }

    /// Create a transport error wrapping a lower-level error
    pub fn transport_from<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        OrmError::Transport {
            message: message.into(),
            statement: None,
            source: Some(Box::new(source)),
        }
    }

    /// Create a decode error for a column
    pub fn decode(
        column: impl Into<String>,
        value: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        OrmError::Decode {
            column: column.into(),
            value: value.map(str::to_string),
            message: message.into(),
            statement: None,
        }
    }

    /// Attach the statement text if the error doesn't carry one yet
    pub fn with_statement(self, text: &str) -> Self {
        match self {
            OrmError::Transport {
                message,
                statement: None,
                source,
            } => OrmError::Transport {
                message,
                statement: Some(text.to_string()),
                source,
            },
            OrmError::Decode {
                column,
                value,
                message,
                statement: None,
            } => OrmError::Decode {
                column,
                value,
                message,
                statement: Some(text.to_string()),
            },
            other => other,
        }
    }

    /// The statement that produced this error, when known
    pub fn statement(&self) -> Option<&str> {
        match self {
            OrmError::Server { statement, .. } => Some(statement),
            OrmError::Transport { statement, .. } | OrmError::Decode { statement, .. } => {
                statement.as_deref()
            }
            _ => None,
        }
    }

    /// Whether the caller may reasonably retry the same request
    pub fn is_retryable(&self) -> bool {
        matches!(self, OrmError::Transport { .. })
    }
}

/// Result type for ORM operations
pub type OrmResult<T> = Result<T, OrmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OrmError::build("unknown field `nope`");
        assert_eq!(err.to_string(), "Build error: unknown field `nope`");

        let err = OrmError::Server {
            code: 62,
            message: "Syntax error".to_string(),
            statement: "SELEC 1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Server error 62: Syntax error (statement: SELEC 1)"
        );
    }

    #[test]
    fn test_with_statement_only_fills_missing() {
        let err = OrmError::decode("age", Some("x"), "invalid integer").with_statement("SELECT 1");
        assert_eq!(err.statement(), Some("SELECT 1"));

        let err = err.with_statement("SELECT 2");
        assert_eq!(err.statement(), Some("SELECT 1"));
    }

    #[test]
    fn test_only_transport_errors_are_retryable() {
        assert!(OrmError::transport("connection refused").is_retryable());
        assert!(!OrmError::build("bad").is_retryable());
        assert!(!OrmError::Server {
            code: 60,
            message: "Table doesn't exist".to_string(),
            statement: "SELECT 1".to_string(),
        }
        .is_retryable());
    }
}
