//! Panel variants
//!
//! A panel is a base record (`id`, `name`, `content`) plus exactly one
//! type-tagged payload:
//! - `literal`: `content` is CSV or JSON text
//! - `program`: `content` is JavaScript or Python source
//! - `sql`: `content` is a query over earlier panels or a database
//! - `http`: the payload describes a request, the response is the value
//! - `table` / `graph`: derived from another panel by `panelSource` index
//!
//! Panels never change variant in place. Changing type builds a new panel
//! with [`PanelInfo::retyped`].

use crate::connector::{HttpConnectorConfig, SqlConnectorConfig};
use crate::error::ModelError;
use crate::id::EntityId;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Panel discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PanelKind {
    /// Literal text data
    Literal,
    /// Script
    Program,
    /// Row/column projection of another panel
    Table,
    /// Chart of another panel
    Graph,
    /// HTTP request
    Http,
    /// SQL query
    Sql,
}

impl PanelKind {
    /// Every panel kind, in declaration order
    pub const ALL: [PanelKind; 6] = [
        PanelKind::Literal,
        PanelKind::Program,
        PanelKind::Table,
        PanelKind::Graph,
        PanelKind::Http,
        PanelKind::Sql,
    ];

    /// Wire name of the kind
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PanelKind::Literal => "literal",
            PanelKind::Program => "program",
            PanelKind::Table => "table",
            PanelKind::Graph => "graph",
            PanelKind::Http => "http",
            PanelKind::Sql => "sql",
        }
    }
}

impl FromStr for PanelKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "literal" => Ok(PanelKind::Literal),
            "program" => Ok(PanelKind::Program),
            "table" => Ok(PanelKind::Table),
            "graph" => Ok(PanelKind::Graph),
            "http" => Ok(PanelKind::Http),
            "sql" => Ok(PanelKind::Sql),
            other => Err(ModelError::UnknownPanelType(other.to_string())),
        }
    }
}

impl std::fmt::Display for PanelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text data format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    /// Comma separated values with a header row
    #[default]
    Csv,
    /// JSON document
    Json,
}

impl DataFormat {
    /// Wire name of the format
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DataFormat::Csv => "csv",
            DataFormat::Json => "json",
        }
    }
}

impl std::fmt::Display for DataFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Program panel language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgramLanguage {
    /// JavaScript
    #[default]
    Javascript,
    /// Python
    Python,
}

impl ProgramLanguage {
    /// Wire name of the language
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgramLanguage::Javascript => "javascript",
            ProgramLanguage::Python => "python",
        }
    }
}

impl std::fmt::Display for ProgramLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chart type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphType {
    /// Bar chart
    #[default]
    Bar,
}

/// Literal panel payload
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LiteralConfig {
    /// How `content` is parsed
    #[serde(rename = "type")]
    pub format: DataFormat,
}

/// Program panel payload
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProgramConfig {
    /// Language of `content`
    #[serde(rename = "type")]
    pub language: ProgramLanguage,
}

/// One projected table column
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TableColumn {
    /// Header text
    pub label: String,
    /// Row field shown in the column
    pub field: String,
}

impl TableColumn {
    /// Create a column
    #[inline]
    pub fn new(label: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            field: field.into(),
        }
    }
}

/// Table panel payload
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableConfig {
    /// Ordered projected columns
    pub columns: Vec<TableColumn>,
    /// Index of the panel the rows come from
    pub panel_source: usize,
}

/// Graph y axis
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GraphY {
    /// Row field plotted
    pub field: String,
    /// Axis label
    pub label: String,
}

impl GraphY {
    /// Create a y axis
    #[inline]
    pub fn new(field: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            label: label.into(),
        }
    }
}

/// Graph panel payload
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphConfig {
    /// Index of the panel the rows come from
    pub panel_source: usize,
    /// Y axis
    pub y: GraphY,
    /// Row field used for the x axis
    pub x: String,
    /// Chart type
    #[serde(rename = "type")]
    pub graph_type: GraphType,
}

/// SQL panel payload: an embedded connection, optionally overridden by a
/// project connector
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlPanelConfig {
    /// Embedded connection settings
    #[serde(flatten)]
    pub connection: SqlConnectorConfig,
    /// Project connector to use instead of the embedded settings
    pub connector_id: Option<EntityId>,
}

/// HTTP panel payload: an embedded request, optionally overridden by a
/// project connector
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpPanelConfig {
    /// Embedded request settings
    #[serde(flatten)]
    pub request: HttpConnectorConfig,
    /// How the response body is parsed
    #[serde(rename = "type")]
    pub format: DataFormat,
    /// Project connector to use instead of the embedded settings
    pub connector_id: Option<EntityId>,
}

/// Type-tagged panel payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PanelPayload {
    /// Literal text
    Literal {
        /// Literal payload
        literal: LiteralConfig,
    },
    /// Script
    Program {
        /// Program payload
        program: ProgramConfig,
    },
    /// Table projection
    Table {
        /// Table payload
        table: TableConfig,
    },
    /// Chart
    Graph {
        /// Graph payload
        graph: GraphConfig,
    },
    /// HTTP request
    Http {
        /// HTTP payload
        http: HttpPanelConfig,
    },
    /// SQL query
    Sql {
        /// SQL payload
        sql: SqlPanelConfig,
    },
}

impl PanelPayload {
    /// Fully defaulted payload for `kind`
    #[must_use]
    pub fn default_for(kind: PanelKind) -> Self {
        match kind {
            PanelKind::Literal => PanelPayload::Literal {
                literal: LiteralConfig::default(),
            },
            PanelKind::Program => PanelPayload::Program {
                program: ProgramConfig::default(),
            },
            PanelKind::Table => PanelPayload::Table {
                table: TableConfig::default(),
            },
            PanelKind::Graph => PanelPayload::Graph {
                graph: GraphConfig::default(),
            },
            PanelKind::Http => PanelPayload::Http {
                http: HttpPanelConfig::default(),
            },
            PanelKind::Sql => PanelPayload::Sql {
                sql: SqlPanelConfig::default(),
            },
        }
    }

    /// Discriminator of this payload
    #[inline]
    #[must_use]
    pub fn kind(&self) -> PanelKind {
        match self {
            PanelPayload::Literal { .. } => PanelKind::Literal,
            PanelPayload::Program { .. } => PanelKind::Program,
            PanelPayload::Table { .. } => PanelKind::Table,
            PanelPayload::Graph { .. } => PanelKind::Graph,
            PanelPayload::Http { .. } => PanelKind::Http,
            PanelPayload::Sql { .. } => PanelKind::Sql,
        }
    }
}

/// A panel on a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelInfo {
    /// Immutable identity
    pub id: EntityId,
    /// Display name
    pub name: String,
    /// Source text, meaning depends on the variant
    pub content: String,
    /// Variant payload, carrying the `type` tag
    #[serde(flatten)]
    pub payload: PanelPayload,
}

impl PanelInfo {
    /// Fully defaulted panel of `kind`
    #[must_use]
    pub fn new(kind: PanelKind) -> Self {
        Self::with_payload("", "", PanelPayload::default_for(kind))
    }

    /// Panel from a textual type
    ///
    /// # Errors
    /// - `ModelError::UnknownPanelType` if `kind` is not a panel type
    pub fn from_type_name(kind: &str) -> Result<Self, ModelError> {
        Ok(Self::new(kind.parse()?))
    }

    /// Panel with an explicit payload
    #[must_use]
    pub fn with_payload(
        name: impl Into<String>,
        content: impl Into<String>,
        payload: PanelPayload,
    ) -> Self {
        Self {
            id: EntityId::new(),
            name: name.into(),
            content: content.into(),
            payload,
        }
    }

    /// Literal panel
    #[must_use]
    pub fn literal(name: impl Into<String>, format: DataFormat, content: impl Into<String>) -> Self {
        Self::with_payload(
            name,
            content,
            PanelPayload::Literal {
                literal: LiteralConfig { format },
            },
        )
    }

    /// Program panel
    #[must_use]
    pub fn program(
        name: impl Into<String>,
        language: ProgramLanguage,
        content: impl Into<String>,
    ) -> Self {
        Self::with_payload(
            name,
            content,
            PanelPayload::Program {
                program: ProgramConfig { language },
            },
        )
    }

    /// SQL panel with an embedded connection
    #[must_use]
    pub fn sql(
        name: impl Into<String>,
        connection: SqlConnectorConfig,
        content: impl Into<String>,
    ) -> Self {
        Self::with_payload(
            name,
            content,
            PanelPayload::Sql {
                sql: SqlPanelConfig {
                    connection,
                    connector_id: None,
                },
            },
        )
    }

    /// HTTP panel with an embedded request
    #[must_use]
    pub fn http(name: impl Into<String>, request: HttpConnectorConfig, format: DataFormat) -> Self {
        Self::with_payload(
            name,
            "",
            PanelPayload::Http {
                http: HttpPanelConfig {
                    request,
                    format,
                    connector_id: None,
                },
            },
        )
    }

    /// Table panel over `panel_source`
    #[must_use]
    pub fn table(name: impl Into<String>, columns: Vec<TableColumn>, panel_source: usize) -> Self {
        Self::with_payload(
            name,
            "",
            PanelPayload::Table {
                table: TableConfig {
                    columns,
                    panel_source,
                },
            },
        )
    }

    /// Bar graph over `panel_source`
    #[must_use]
    pub fn graph(
        name: impl Into<String>,
        panel_source: usize,
        x: impl Into<String>,
        y: GraphY,
    ) -> Self {
        Self::with_payload(
            name,
            "",
            PanelPayload::Graph {
                graph: GraphConfig {
                    panel_source,
                    y,
                    x: x.into(),
                    graph_type: GraphType::Bar,
                },
            },
        )
    }

    /// Panel discriminator
    #[inline]
    #[must_use]
    pub fn kind(&self) -> PanelKind {
        self.payload.kind()
    }

    /// Declared upstream index for table and graph panels
    #[inline]
    #[must_use]
    pub fn panel_source(&self) -> Option<usize> {
        match &self.payload {
            PanelPayload::Table { table } => Some(table.panel_source),
            PanelPayload::Graph { graph } => Some(graph.panel_source),
            PanelPayload::Literal { .. }
            | PanelPayload::Program { .. }
            | PanelPayload::Http { .. }
            | PanelPayload::Sql { .. } => None,
        }
    }

    /// Brand-new panel of `kind` keeping only this panel's name and content
    ///
    /// The result has a fresh id and every type-specific field at the new
    /// variant's defaults.
    #[must_use]
    pub fn retyped(&self, kind: PanelKind) -> Self {
        Self::with_payload(
            self.name.clone(),
            self.content.clone(),
            PanelPayload::default_for(kind),
        )
    }
}
