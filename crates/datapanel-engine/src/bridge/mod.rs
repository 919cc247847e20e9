//! Execution bridges
//!
//! The evaluator reaches the outside world only through these traits:
//! - [`SqlEngine`] runs a query with earlier panel values exposed as
//!   relations
//! - [`HttpTransport`] sends one request
//! - [`ScriptRuntime`] runs program panel source with a [`PanelBridge`]
//!
//! Built-in implementations: [`InMemorySqlEngine`] (SQLite),
//! [`ReqwestTransport`], [`ProcessScriptRuntime`] (node / python3).

pub mod http;
pub mod script;
pub mod sql;

pub use http::ReqwestTransport;
pub use script::{PanelBridge, ProcessScriptRuntime};
pub use sql::InMemorySqlEngine;

use crate::error::EvalError;
use datapanel_model::{HttpConnectorConfig, HttpHeader, HttpMethod, SqlConnectorConfig};
use serde_json::Value;

/// Earlier panel value exposed to SQL as `"DM_getPanel(index)"`
#[derive(Debug, Clone, PartialEq)]
pub struct PanelRelation {
    /// Panel position
    pub index: usize,
    /// Panel value
    pub value: Value,
}

impl PanelRelation {
    /// Relation name the query refers to
    #[must_use]
    pub fn table_name(&self) -> String {
        format!("DM_getPanel({})", self.index)
    }
}

/// SQL execution seam
#[async_trait::async_trait]
pub trait SqlEngine: Send + Sync {
    /// Run `query` and return its rows as an array of objects
    async fn query(
        &self,
        connection: &SqlConnectorConfig,
        query: &str,
        relations: Vec<PanelRelation>,
    ) -> Result<Value, EvalError>;
}

/// Outgoing HTTP request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Method
    pub method: HttpMethod,
    /// URL
    pub url: String,
    /// Ordered headers
    pub headers: Vec<HttpHeader>,
}

impl From<&HttpConnectorConfig> for HttpRequest {
    fn from(config: &HttpConnectorConfig) -> Self {
        Self {
            method: config.method,
            url: config.url.clone(),
            headers: config.headers.clone(),
        }
    }
}

/// Response as seen by the evaluator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code
    pub status: u16,
    /// Body text
    pub body: String,
}

impl HttpResponse {
    /// Response with status and body
    #[inline]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Whether the status is 2xx
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP seam
#[async_trait::async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send `request`; only transport failures are errors, any status is a
    /// response
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, EvalError>;
}

/// Program panel seam
#[async_trait::async_trait]
pub trait ScriptRuntime: Send + Sync {
    /// Run `source`; earlier panels are read and the result is published
    /// through `bridge`
    ///
    /// A returned value takes precedence over anything published with
    /// `set_panel`.
    async fn run(&self, source: &str, bridge: &PanelBridge) -> Result<Option<Value>, EvalError>;
}
