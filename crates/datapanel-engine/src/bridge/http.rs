//! HTTP transport over reqwest

use super::{HttpRequest, HttpResponse, HttpTransport};
use crate::config::EngineConfig;
use crate::error::EvalError;
use datapanel_model::HttpMethod;
use std::time::Duration;

/// Transport backed by a shared `reqwest::Client`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout_secs: u64,
}

impl ReqwestTransport {
    /// Build a client with the configured timeout and user agent
    ///
    /// # Errors
    /// - `EvalError::Transport` if the TLS backend cannot be initialized
    pub fn new(config: &EngineConfig) -> Result<Self, EvalError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| EvalError::Transport(e.to_string()))?;
        Ok(Self::with_client(client, config.http_timeout_secs))
    }

    /// Wrap an existing client
    #[must_use]
    pub fn with_client(client: reqwest::Client, timeout_secs: u64) -> Self {
        Self {
            client,
            timeout_secs,
        }
    }
}

fn method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Head => reqwest::Method::HEAD,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

#[async_trait::async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, EvalError> {
        let mut builder = self.client.request(method(request.method), &request.url);
        for header in &request.headers {
            if header.name.is_empty() {
                continue;
            }
            builder = builder.header(header.name.as_str(), header.value.as_str());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                EvalError::Timeout(self.timeout_secs)
            } else {
                EvalError::Transport(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| EvalError::Transport(e.to_string()))?;
        tracing::debug!(url = %request.url, status, bytes = body.len(), "http response");
        Ok(HttpResponse::new(status, body))
    }
}
