//! Projects and pages
//!
//! A project holds ordered pages and global connectors. A page holds an
//! ordered panel list; the order is both display order and dependency order:
//! a panel may only reference panels at a strictly smaller index.

use crate::connector::{ConnectorInfo, SqlConnectorConfig};
use crate::error::ModelError;
use crate::id::EntityId;
use crate::panel::{DataFormat, GraphY, PanelInfo};
use serde::{Deserialize, Serialize};

/// An ordered list of panels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectPage {
    /// Immutable identity
    pub id: EntityId,
    /// Display name
    pub name: String,
    /// Panels in dependency order
    pub panels: Vec<PanelInfo>,
}

impl ProjectPage {
    /// Page with `panels`
    #[must_use]
    pub fn new(name: impl Into<String>, panels: Vec<PanelInfo>) -> Self {
        Self {
            id: EntityId::new(),
            name: name.into(),
            panels,
        }
    }

    /// Number of panels
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.panels.len()
    }

    /// Whether the page has no panels
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }

    /// Panel at `index`
    ///
    /// # Errors
    /// - `ModelError::PanelIndexOutOfRange` if `index` is past the end
    pub fn panel(&self, index: usize) -> Result<&PanelInfo, ModelError> {
        self.panels.get(index).ok_or(ModelError::PanelIndexOutOfRange {
            index,
            len: self.panels.len(),
        })
    }

    /// Insert `panel` at `index` (`index == len` appends)
    ///
    /// # Errors
    /// - `ModelError::PanelIndexOutOfRange` if `index > len`
    pub fn insert_panel(&mut self, index: usize, panel: PanelInfo) -> Result<(), ModelError> {
        if index > self.panels.len() {
            return Err(ModelError::PanelIndexOutOfRange {
                index,
                len: self.panels.len(),
            });
        }
        self.panels.insert(index, panel);
        Ok(())
    }

    /// Remove and return the panel at `index`
    ///
    /// # Errors
    /// - `ModelError::PanelIndexOutOfRange` if `index` is past the end
    pub fn remove_panel(&mut self, index: usize) -> Result<PanelInfo, ModelError> {
        self.panel(index)?;
        Ok(self.panels.remove(index))
    }

    /// Move the panel at `from` so that it ends up at `to`
    ///
    /// Panel sources are not rewritten: references keep pointing at
    /// positions, so a move can make them invalid.
    ///
    /// # Errors
    /// - `ModelError::PanelIndexOutOfRange` if either index is past the end
    pub fn move_panel(&mut self, from: usize, to: usize) -> Result<(), ModelError> {
        self.panel(from)?;
        self.panel(to)?;
        let panel = self.panels.remove(from);
        self.panels.insert(to, panel);
        Ok(())
    }

    /// Replace the panel at `index` wholesale, returning the old one
    ///
    /// # Errors
    /// - `ModelError::PanelIndexOutOfRange` if `index` is past the end
    pub fn replace_panel(&mut self, index: usize, panel: PanelInfo) -> Result<PanelInfo, ModelError> {
        self.panel(index)?;
        Ok(std::mem::replace(&mut self.panels[index], panel))
    }
}

impl Default for ProjectPage {
    fn default() -> Self {
        Self::new("", Vec::new())
    }
}

/// The whole document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectState {
    /// Immutable identity
    pub id: EntityId,
    /// Display name
    pub project_name: String,
    /// Ordered pages
    pub pages: Vec<ProjectPage>,
    /// Global connectors
    pub connectors: Vec<ConnectorInfo>,
}

impl ProjectState {
    /// Project with `pages`
    #[must_use]
    pub fn new(project_name: impl Into<String>, pages: Vec<ProjectPage>) -> Self {
        Self {
            id: EntityId::new(),
            project_name: project_name.into(),
            pages,
            connectors: Vec::new(),
        }
    }

    /// The seeded "new project" document
    ///
    /// One page that parses CSV text, transforms it with in-memory SQL and
    /// charts the result.
    #[must_use]
    pub fn example() -> Self {
        let page = ProjectPage::new(
            "CSV Discovery Example",
            vec![
                PanelInfo::literal("Raw CSV Text", DataFormat::Csv, "name,age\nMorgan,12\nJames,17"),
                PanelInfo::sql(
                    "Transform with SQL",
                    SqlConnectorConfig::in_memory(),
                    "SELECT name, age+5 AS age FROM DM_getPanel(0);",
                ),
                PanelInfo::graph("Display", 1, "name", GraphY::new("age", "Age")),
            ],
        );
        Self::new("Example project", vec![page])
    }

    /// Page by id
    ///
    /// # Errors
    /// - `ModelError::PageNotFound` if no page has `id`
    pub fn page(&self, id: &EntityId) -> Result<&ProjectPage, ModelError> {
        self.pages
            .iter()
            .find(|p| &p.id == id)
            .ok_or_else(|| ModelError::PageNotFound(id.to_string()))
    }

    /// Mutable page by id
    ///
    /// # Errors
    /// - `ModelError::PageNotFound` if no page has `id`
    pub fn page_mut(&mut self, id: &EntityId) -> Result<&mut ProjectPage, ModelError> {
        self.pages
            .iter_mut()
            .find(|p| &p.id == id)
            .ok_or_else(|| ModelError::PageNotFound(id.to_string()))
    }

    /// Serialize to a JSON value
    ///
    /// # Errors
    /// - `ModelError::Json` if serialization fails
    pub fn to_value(&self) -> Result<serde_json::Value, ModelError> {
        Ok(serde_json::to_value(self)?)
    }
}

impl Default for ProjectState {
    fn default() -> Self {
        Self::new("", Vec::new())
    }
}
