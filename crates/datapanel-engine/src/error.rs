//! Error types for the engine
//!
//! Provides error handling for:
//! - Panel evaluation (script, SQL, HTTP, parse failures)
//! - Controller operations (document edits, configuration)
//!
//! An [`EvalError`] never crosses a panel boundary: the controller records it
//! in the failing panel's cache slot as its exception text.

use datapanel_model::{DataFormat, EntityId, ModelError, ProgramLanguage, SqlDriver};

/// Failure while evaluating a single panel
#[derive(Debug, Clone, thiserror::Error)]
pub enum EvalError {
    /// Panel content did not parse as its declared format
    #[error("could not parse {format}: {message}")]
    Format {
        /// Declared format
        format: DataFormat,
        /// Parser message
        message: String,
    },

    /// Script raised or exited unsuccessfully
    #[error("script failed: {0}")]
    Script(String),

    /// No runtime registered for the program language
    #[error("no script runtime registered for {0}")]
    NoRuntime(ProgramLanguage),

    /// SQL engine rejected or failed the query
    #[error("sql error: {0}")]
    Sql(String),

    /// No SQL engine registered for the driver
    #[error("no sql engine registered for {0}")]
    NoSqlEngine(SqlDriver),

    /// Request could not be sent or the response could not be read
    #[error("http request failed: {0}")]
    Transport(String),

    /// Server answered with a non-success status
    #[error("http request returned status {status}: {body}")]
    HttpStatus {
        /// Status code
        status: u16,
        /// Leading part of the response body
        body: String,
    },

    /// `connectorId` names no project connector
    #[error("connector not found: {0}")]
    ConnectorNotFound(EntityId),

    /// `connectorId` names a connector of the other family
    #[error("connector {id} is not a {expected} connector")]
    ConnectorMismatch {
        /// Connector id
        id: EntityId,
        /// Required family
        expected: &'static str,
    },

    /// Execution exceeded its time budget
    #[error("timed out after {0}s")]
    Timeout(u64),

    /// Panel index outside the page
    #[error("panel index {index} out of range (page has {len} panels)")]
    PanelOutOfRange {
        /// Requested index
        index: usize,
        /// Page size
        len: usize,
    },
}

impl EvalError {
    /// Create a format error
    #[inline]
    pub fn format(format: DataFormat, message: impl std::fmt::Display) -> Self {
        Self::Format {
            format,
            message: message.to_string(),
        }
    }

    /// Whether retrying the same run could succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Timeout(_) | Self::HttpStatus { status: 500..=599, .. }
        )
    }
}

/// Controller and configuration errors
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Document edit failed
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// A run could not be started
    #[error("evaluation error: {0}")]
    Eval(#[from] EvalError),

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(String),

    /// Reading a file failed
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failed
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eval_error_display() {
        let err = EvalError::HttpStatus {
            status: 404,
            body: "not found".to_string(),
        };
        assert_eq!(err.to_string(), "http request returned status 404: not found");

        let err = EvalError::format(DataFormat::Json, "expected value at line 1");
        assert_eq!(err.to_string(), "could not parse json: expected value at line 1");
    }

    #[test]
    fn eval_error_is_retryable() {
        assert!(EvalError::Transport("reset".to_string()).is_retryable());
        assert!(EvalError::HttpStatus { status: 503, body: String::new() }.is_retryable());
        assert!(!EvalError::HttpStatus { status: 404, body: String::new() }.is_retryable());
        assert!(!EvalError::Sql("no such table".to_string()).is_retryable());
    }

    #[test]
    fn engine_error_from_model() {
        let err: EngineError = ModelError::UnknownPanelType("chart".to_string()).into();
        assert!(err.to_string().contains("invalid panel type"));
    }
}
