//! Error types for the document model
//!
//! Only caller mistakes are errors here. Stale or malformed persisted data is
//! never an error: the normalizer repairs it and reports what it did through
//! [`crate::normalize::NormalizeIssue`].

/// Document model errors
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// A panel was requested with a type outside the closed variant set
    #[error("invalid panel type: '{0}'")]
    UnknownPanelType(String),

    /// A connector was requested with a type outside the closed variant set
    #[error("invalid connector type: '{0}'")]
    UnknownConnectorType(String),

    /// An enum-valued field was given a value outside its option set
    #[error("invalid value '{value}' for {field}")]
    InvalidOption {
        /// Field being parsed
        field: &'static str,
        /// Rejected value
        value: String,
    },

    /// Page lookup failed
    #[error("page not found: {0}")]
    PageNotFound(String),

    /// Panel index outside the page
    #[error("panel index {index} out of range (page has {len} panels)")]
    PanelIndexOutOfRange {
        /// Requested index
        index: usize,
        /// Number of panels on the page
        len: usize,
    },

    /// Connector lookup failed
    #[error("connector not found: {0}")]
    ConnectorNotFound(String),

    /// An edit tried to change a panel's variant in place
    #[error("panel type change from {from} to {to} must go through retyping")]
    VariantChange {
        /// Current panel type
        from: &'static str,
        /// Requested panel type
        to: &'static str,
    },

    /// JSON (de)serialization failed
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ModelError {
    /// Create an invalid-option error
    #[inline]
    pub fn invalid_option(field: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidOption {
            field,
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_error_display() {
        let err = ModelError::UnknownPanelType("chart".to_string());
        assert_eq!(err.to_string(), "invalid panel type: 'chart'");

        let err = ModelError::PanelIndexOutOfRange { index: 4, len: 3 };
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn invalid_option_builder() {
        let err = ModelError::invalid_option("http method", "PATCH");
        assert!(matches!(err, ModelError::InvalidOption { field: "http method", .. }));
    }
}
