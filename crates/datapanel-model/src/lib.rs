//! DataPanel document model
//!
//! The versionable document behind a panel notebook:
//! - [`ProjectState`] holds ordered [`ProjectPage`]s and global connectors
//! - [`PanelInfo`] and [`ConnectorInfo`] are closed, type-tagged variants
//! - [`normalize`] reconciles a persisted document with the current schema
//!
//! # Example
//!
//! ```rust
//! use datapanel_model::{normalize, PanelKind};
//! use serde_json::json;
//!
//! let raw = json!({
//!     "projectName": "Old",
//!     "pages": [{"panels": [{"type": "sql", "sql": {"database": "d"}}]}]
//! });
//! let project = normalize(&raw);
//!
//! assert_eq!(project.project_name, "Old");
//! assert_eq!(project.pages[0].panels[0].kind(), PanelKind::Sql);
//! ```

#![warn(unreachable_pub)]

pub mod connector;
pub mod error;
pub mod id;
pub mod normalize;
pub mod panel;
pub mod project;

pub use connector::{
    ConnectorInfo, ConnectorKind, ConnectorPayload, HttpConnectorConfig, HttpHeader, HttpMethod,
    SqlConnectorConfig, SqlDriver,
};
pub use error::ModelError;
pub use id::EntityId;
pub use normalize::{normalize, normalize_with_report, Family, IssueKind, NormalizeIssue, Normalized};
pub use panel::{
    DataFormat, GraphConfig, GraphType, GraphY, HttpPanelConfig, LiteralConfig, PanelInfo,
    PanelKind, PanelPayload, ProgramConfig, ProgramLanguage, SqlPanelConfig, TableColumn,
    TableConfig,
};
pub use project::{ProjectPage, ProjectState};
