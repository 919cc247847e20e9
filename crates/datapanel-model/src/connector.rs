//! Connector variants
//!
//! A connector is reusable configuration for an external system. The family
//! is closed: SQL databases and HTTP endpoints. The `type` discriminator and
//! the populated payload are the same enum tag, so they cannot disagree.

use crate::error::ModelError;
use crate::id::EntityId;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Connector discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorKind {
    /// Database connector
    Sql,
    /// HTTP endpoint connector
    Http,
}

impl ConnectorKind {
    /// Every connector kind, in declaration order
    pub const ALL: [ConnectorKind; 2] = [ConnectorKind::Sql, ConnectorKind::Http];

    /// Wire name of the kind
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectorKind::Sql => "sql",
            ConnectorKind::Http => "http",
        }
    }
}

impl FromStr for ConnectorKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sql" => Ok(ConnectorKind::Sql),
            "http" => Ok(ConnectorKind::Http),
            other => Err(ModelError::UnknownConnectorType(other.to_string())),
        }
    }
}

impl std::fmt::Display for ConnectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SQL engine a connector talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SqlDriver {
    /// Remote PostgreSQL server
    Postgres,
    /// Embedded engine holding only the panel relations
    #[default]
    InMemory,
}

impl SqlDriver {
    /// Wire name of the driver
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SqlDriver::Postgres => "postgres",
            SqlDriver::InMemory => "in-memory",
        }
    }
}

impl FromStr for SqlDriver {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "postgres" => Ok(SqlDriver::Postgres),
            "in-memory" => Ok(SqlDriver::InMemory),
            other => Err(ModelError::invalid_option("sql driver", other)),
        }
    }
}

impl std::fmt::Display for SqlDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP request method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET
    #[default]
    Get,
    /// HEAD
    Head,
    /// PUT
    Put,
    /// POST
    Post,
    /// DELETE
    Delete,
}

impl HttpMethod {
    /// Wire name of the method
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Put => "PUT",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl FromStr for HttpMethod {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(HttpMethod::Get),
            "HEAD" => Ok(HttpMethod::Head),
            "PUT" => Ok(HttpMethod::Put),
            "POST" => Ok(HttpMethod::Post),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(ModelError::invalid_option("http method", other)),
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request header
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpHeader {
    /// Header name
    pub name: String,
    /// Header value
    pub value: String,
}

impl HttpHeader {
    /// Create a header
    #[inline]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// SQL connection settings
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SqlConnectorConfig {
    /// Engine kind
    #[serde(rename = "type")]
    pub driver: SqlDriver,
    /// Database name
    pub database: String,
    /// Login user
    pub username: String,
    /// Login password
    pub password: String,
    /// Server address
    pub address: String,
}

impl SqlConnectorConfig {
    /// Settings for the embedded engine
    #[inline]
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }
}

/// HTTP request settings
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HttpConnectorConfig {
    /// Request URL
    pub url: String,
    /// Request method
    pub method: HttpMethod,
    /// Ordered request headers
    pub headers: Vec<HttpHeader>,
}

impl HttpConnectorConfig {
    /// GET request to `url`
    #[inline]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// With method
    #[inline]
    #[must_use]
    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    /// With an extra header
    #[inline]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(HttpHeader::new(name, value));
        self
    }
}

/// Type-tagged connector payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConnectorPayload {
    /// Database settings
    Sql {
        /// SQL payload
        sql: SqlConnectorConfig,
    },
    /// HTTP settings
    Http {
        /// HTTP payload
        http: HttpConnectorConfig,
    },
}

impl ConnectorPayload {
    /// Fully defaulted payload for `kind`
    #[must_use]
    pub fn default_for(kind: ConnectorKind) -> Self {
        match kind {
            ConnectorKind::Sql => ConnectorPayload::Sql {
                sql: SqlConnectorConfig::default(),
            },
            ConnectorKind::Http => ConnectorPayload::Http {
                http: HttpConnectorConfig::default(),
            },
        }
    }

    /// Discriminator of this payload
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ConnectorKind {
        match self {
            ConnectorPayload::Sql { .. } => ConnectorKind::Sql,
            ConnectorPayload::Http { .. } => ConnectorKind::Http,
        }
    }
}

/// A named, reusable connector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorInfo {
    /// Immutable identity
    pub id: EntityId,
    /// Display name
    pub name: String,
    /// Variant payload, carrying the `type` tag
    #[serde(flatten)]
    pub payload: ConnectorPayload,
}

impl ConnectorInfo {
    /// Default name for connectors created without one
    pub const DEFAULT_NAME: &'static str = "Untitled Connector";

    /// Fully defaulted connector of `kind`
    #[must_use]
    pub fn new(kind: ConnectorKind) -> Self {
        Self {
            id: EntityId::new(),
            name: Self::DEFAULT_NAME.to_string(),
            payload: ConnectorPayload::default_for(kind),
        }
    }

    /// Connector from a textual type
    ///
    /// # Errors
    /// - `ModelError::UnknownConnectorType` if `kind` is not a connector type
    pub fn from_type_name(kind: &str) -> Result<Self, ModelError> {
        Ok(Self::new(kind.parse()?))
    }

    /// SQL connector
    #[must_use]
    pub fn sql(name: impl Into<String>, sql: SqlConnectorConfig) -> Self {
        Self {
            id: EntityId::new(),
            name: name.into(),
            payload: ConnectorPayload::Sql { sql },
        }
    }

    /// HTTP connector
    #[must_use]
    pub fn http(name: impl Into<String>, http: HttpConnectorConfig) -> Self {
        Self {
            id: EntityId::new(),
            name: name.into(),
            payload: ConnectorPayload::Http { http },
        }
    }

    /// Connector discriminator
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ConnectorKind {
        self.payload.kind()
    }

    /// SQL settings, if this is an SQL connector
    #[inline]
    #[must_use]
    pub fn as_sql(&self) -> Option<&SqlConnectorConfig> {
        match &self.payload {
            ConnectorPayload::Sql { sql } => Some(sql),
            ConnectorPayload::Http { .. } => None,
        }
    }

    /// HTTP settings, if this is an HTTP connector
    #[inline]
    #[must_use]
    pub fn as_http(&self) -> Option<&HttpConnectorConfig> {
        match &self.payload {
            ConnectorPayload::Http { http } => Some(http),
            ConnectorPayload::Sql { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn connector_defaults_are_complete() {
        let sql = ConnectorInfo::new(ConnectorKind::Sql);
        assert_eq!(sql.name, "Untitled Connector");
        assert_eq!(sql.as_sql(), Some(&SqlConnectorConfig::default()));
        assert_eq!(sql.as_sql().unwrap().driver, SqlDriver::InMemory);

        let http = ConnectorInfo::new(ConnectorKind::Http);
        let config = http.as_http().unwrap();
        assert_eq!(config.url, "");
        assert_eq!(config.method, HttpMethod::Get);
        assert!(config.headers.is_empty());
    }

    #[test]
    fn connector_wire_shape() {
        let connector = ConnectorInfo::sql(
            "warehouse",
            SqlConnectorConfig {
                driver: SqlDriver::Postgres,
                database: "analytics".to_string(),
                ..SqlConnectorConfig::default()
            },
        );
        let value = serde_json::to_value(&connector).unwrap();

        assert_eq!(value["type"], json!("sql"));
        assert_eq!(value["sql"]["type"], json!("postgres"));
        assert_eq!(value["sql"]["database"], json!("analytics"));
        assert!(value.get("http").is_none());

        let back: ConnectorInfo = serde_json::from_value(value).unwrap();
        assert_eq!(back, connector);
    }

    #[test]
    fn connector_kind_parse() {
        assert_eq!("http".parse::<ConnectorKind>().unwrap(), ConnectorKind::Http);
        assert!(matches!(
            ConnectorInfo::from_type_name("ftp"),
            Err(ModelError::UnknownConnectorType(t)) if t == "ftp"
        ));
    }

    #[test]
    fn http_method_wire_names() {
        for method in [
            HttpMethod::Get,
            HttpMethod::Head,
            HttpMethod::Put,
            HttpMethod::Post,
            HttpMethod::Delete,
        ] {
            let value = serde_json::to_value(method).unwrap();
            assert_eq!(value, json!(method.as_str()));
            assert_eq!(method.as_str().parse::<HttpMethod>().unwrap(), method);
        }
    }
}
