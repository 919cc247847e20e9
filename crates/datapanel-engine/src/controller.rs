//! Document controller
//!
//! Owns the current document, one result cache per page and the evaluator.
//! Every document edit goes through here so the caches stay aligned with
//! panel positions:
//! - insert/remove/move shift the page's slots with their panels
//! - a type change empties the slot of the replaced panel
//! - same-kind edits keep the slot until the panel is run again
//!
//! Runs never hold the document lock across an await: the page, the
//! connectors and a cache snapshot are captured when the run starts.

use crate::cache::{PageResults, PanelResult};
use crate::error::EngineError;
use crate::evaluator::{EvalContext, Evaluator};
use dashmap::DashMap;
use datapanel_model::{
    normalize, ConnectorInfo, EntityId, ModelError, PanelInfo, PanelKind, ProjectPage, ProjectState,
};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;

/// Document plus per-page results
#[derive(Debug)]
pub struct ProjectController {
    state: RwLock<ProjectState>,
    results: DashMap<EntityId, Arc<PageResults>>,
    evaluator: Arc<Evaluator>,
}

impl ProjectController {
    /// Controller over `state`
    #[must_use]
    pub fn new(state: ProjectState, evaluator: Evaluator) -> Self {
        let results = DashMap::new();
        for page in &state.pages {
            results.insert(page.id.clone(), Arc::new(PageResults::new(page.len())));
        }
        Self {
            state: RwLock::new(state),
            results,
            evaluator: Arc::new(evaluator),
        }
    }

    /// Controller over the seeded example project
    #[must_use]
    pub fn new_example(evaluator: Evaluator) -> Self {
        Self::new(ProjectState::example(), evaluator)
    }

    /// Controller over a persisted document of any schema age
    #[must_use]
    pub fn from_raw(raw: &Value, evaluator: Evaluator) -> Self {
        Self::new(normalize(raw), evaluator)
    }

    /// Controller over persisted JSON text
    ///
    /// # Errors
    /// - `EngineError::Json` if the text is not JSON at all
    pub fn from_json_str(text: &str, evaluator: Evaluator) -> Result<Self, EngineError> {
        let raw: Value = serde_json::from_str(text)?;
        Ok(Self::from_raw(&raw, evaluator))
    }

    /// Evaluator in use
    #[inline]
    #[must_use]
    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// Copy of the current document
    #[must_use]
    pub fn snapshot(&self) -> ProjectState {
        self.state.read().clone()
    }

    /// Current document as pretty JSON
    ///
    /// # Errors
    /// - `EngineError::Json` if serialization fails
    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string_pretty(&*self.state.read())?)
    }

    fn page_results(&self, page: &ProjectPage) -> Arc<PageResults> {
        self.results
            .entry(page.id.clone())
            .or_insert_with(|| Arc::new(PageResults::new(page.len())))
            .clone()
    }

    /// Apply `edit` to a page under the document write lock
    fn edit_page<T>(
        &self,
        page_id: &EntityId,
        edit: impl FnOnce(&mut ProjectPage, &PageResults) -> Result<T, ModelError>,
    ) -> Result<T, EngineError> {
        let mut state = self.state.write();
        let page = state.page_mut(page_id)?;
        let cache = self.page_results(page);
        Ok(edit(page, &cache)?)
    }

    // Pages

    /// Append an empty page, returning its id
    pub fn add_page(&self, name: impl Into<String>) -> EntityId {
        let page = ProjectPage::new(name, Vec::new());
        let id = page.id.clone();
        let mut state = self.state.write();
        self.results.insert(id.clone(), Arc::new(PageResults::new(0)));
        state.pages.push(page);
        tracing::info!(page = %id, "page added");
        id
    }

    /// Remove a page and its results
    ///
    /// # Errors
    /// - `ModelError::PageNotFound` if no page has `page_id`
    pub fn remove_page(&self, page_id: &EntityId) -> Result<ProjectPage, EngineError> {
        let mut state = self.state.write();
        let position = state
            .pages
            .iter()
            .position(|p| &p.id == page_id)
            .ok_or_else(|| ModelError::PageNotFound(page_id.to_string()))?;
        self.results.remove(page_id);
        Ok(state.pages.remove(position))
    }

    /// Rename a page
    ///
    /// # Errors
    /// - `ModelError::PageNotFound` if no page has `page_id`
    pub fn rename_page(&self, page_id: &EntityId, name: impl Into<String>) -> Result<(), EngineError> {
        self.state.write().page_mut(page_id)?.name = name.into();
        Ok(())
    }

    // Panels

    /// Append a panel, returning its index
    ///
    /// # Errors
    /// - `ModelError::PageNotFound` if no page has `page_id`
    pub fn add_panel(&self, page_id: &EntityId, panel: PanelInfo) -> Result<usize, EngineError> {
        self.edit_page(page_id, |page, cache| {
            let index = page.len();
            page.insert_panel(index, panel)?;
            cache.insert_slot(index);
            Ok(index)
        })
    }

    /// Insert a panel at `index`, shifting later panels
    ///
    /// # Errors
    /// - `ModelError::PageNotFound` if no page has `page_id`
    /// - `ModelError::PanelIndexOutOfRange` if `index > len`
    pub fn insert_panel(
        &self,
        page_id: &EntityId,
        index: usize,
        panel: PanelInfo,
    ) -> Result<(), EngineError> {
        self.edit_page(page_id, |page, cache| {
            page.insert_panel(index, panel)?;
            cache.insert_slot(index);
            Ok(())
        })
    }

    /// Remove the panel at `index`
    ///
    /// # Errors
    /// - `ModelError::PageNotFound` if no page has `page_id`
    /// - `ModelError::PanelIndexOutOfRange` if there is no panel at `index`
    pub fn remove_panel(&self, page_id: &EntityId, index: usize) -> Result<PanelInfo, EngineError> {
        self.edit_page(page_id, |page, cache| {
            let removed = page.remove_panel(index)?;
            cache.remove_slot(index);
            Ok(removed)
        })
    }

    /// Move the panel at `from` to `to`; its result moves with it
    ///
    /// # Errors
    /// - `ModelError::PageNotFound` if no page has `page_id`
    /// - `ModelError::PanelIndexOutOfRange` if either index is past the end
    pub fn move_panel(&self, page_id: &EntityId, from: usize, to: usize) -> Result<(), EngineError> {
        self.edit_page(page_id, |page, cache| {
            page.move_panel(from, to)?;
            cache.move_slot(from, to);
            Ok(())
        })
    }

    /// Replace the panel at `index` with an edited panel of the same kind
    ///
    /// The panel keeps its id.
    ///
    /// # Errors
    /// - `ModelError::PageNotFound` if no page has `page_id`
    /// - `ModelError::PanelIndexOutOfRange` if there is no panel at `index`
    /// - `ModelError::VariantChange` if `panel` is of another kind
    pub fn update_panel(
        &self,
        page_id: &EntityId,
        index: usize,
        mut panel: PanelInfo,
    ) -> Result<(), EngineError> {
        self.edit_page(page_id, |page, _| {
            let current = page.panel(index)?;
            if current.kind() != panel.kind() {
                return Err(ModelError::VariantChange {
                    from: current.kind().as_str(),
                    to: panel.kind().as_str(),
                });
            }
            panel.id = current.id.clone();
            page.replace_panel(index, panel)?;
            Ok(())
        })
    }

    /// Replace the panel at `index` with a new panel of type `kind`
    ///
    /// Only name and content carry over. Returns the new panel's id.
    ///
    /// # Errors
    /// - `ModelError::UnknownPanelType` if `kind` is not a panel type
    /// - `ModelError::PageNotFound` if no page has `page_id`
    /// - `ModelError::PanelIndexOutOfRange` if there is no panel at `index`
    pub fn change_panel_type(
        &self,
        page_id: &EntityId,
        index: usize,
        kind: &str,
    ) -> Result<EntityId, EngineError> {
        let kind: PanelKind = kind.parse()?;
        self.edit_page(page_id, |page, cache| {
            let replacement = page.panel(index)?.retyped(kind);
            let id = replacement.id.clone();
            page.replace_panel(index, replacement)?;
            cache.reset_slot(index);
            tracing::info!(page = %page.id, index, %kind, "panel type changed");
            Ok(id)
        })
    }

    // Connectors

    /// Add a global connector, returning its id
    pub fn add_connector(&self, connector: ConnectorInfo) -> EntityId {
        let id = connector.id.clone();
        self.state.write().connectors.push(connector);
        id
    }

    /// Replace the connector with the same id, keeping its kind
    ///
    /// # Errors
    /// - `ModelError::ConnectorNotFound` if no connector has that id
    /// - `ModelError::VariantChange` if `connector` is of another kind
    pub fn update_connector(&self, connector: ConnectorInfo) -> Result<(), EngineError> {
        let mut state = self.state.write();
        let current = state
            .connectors
            .iter_mut()
            .find(|c| c.id == connector.id)
            .ok_or_else(|| ModelError::ConnectorNotFound(connector.id.to_string()))?;
        if current.kind() != connector.kind() {
            return Err(ModelError::VariantChange {
                from: current.kind().as_str(),
                to: connector.kind().as_str(),
            }
            .into());
        }
        *current = connector;
        Ok(())
    }

    /// Remove a global connector
    ///
    /// Panels referring to it keep the reference and fail when run.
    ///
    /// # Errors
    /// - `ModelError::ConnectorNotFound` if no connector has `id`
    pub fn remove_connector(&self, id: &EntityId) -> Result<ConnectorInfo, EngineError> {
        let mut state = self.state.write();
        let position = state
            .connectors
            .iter()
            .position(|c| &c.id == id)
            .ok_or_else(|| ModelError::ConnectorNotFound(id.to_string()))?;
        Ok(state.connectors.remove(position))
    }

    // Running

    /// Run the panel at `index` and record its outcome
    ///
    /// A panel failure is not an error here: it is recorded in the slot and
    /// returned as part of the [`PanelResult`]. If another run of the same
    /// panel started later, or the page layout changed meanwhile, this run's
    /// outcome is dropped and the current slot is returned.
    ///
    /// # Errors
    /// - `ModelError::PageNotFound` if no page has `page_id`
    /// - `ModelError::PanelIndexOutOfRange` if there is no panel at `index`
    pub async fn run_panel(&self, page_id: &EntityId, index: usize) -> Result<PanelResult, EngineError> {
        let (ctx, cache, ticket) = {
            let state = self.state.read();
            let page = state.page(page_id)?;
            page.panel(index)?;
            let cache = self.page_results(page);
            let ticket = cache.begin_run(index)?;
            let ctx = EvalContext::new(page.clone(), state.connectors.clone(), cache.view());
            (ctx, cache, ticket)
        };

        let outcome = self.evaluator.evaluate(&ctx, index).await;
        if !cache.complete(ticket, outcome) {
            tracing::debug!(page = %page_id, index, "run superseded");
        }
        Ok(cache.get(index))
    }

    /// Run every panel of a page once, in index order
    ///
    /// Each panel sees the fresh results of the panels before it.
    ///
    /// # Errors
    /// - `ModelError::PageNotFound` if no page has `page_id`
    pub async fn run_page(&self, page_id: &EntityId) -> Result<Vec<PanelResult>, EngineError> {
        let len = self.state.read().page(page_id)?.len();
        for index in 0..len {
            self.run_panel(page_id, index).await?;
        }
        self.results(page_id)
    }

    /// Snapshot of a page's results, one per panel
    ///
    /// # Errors
    /// - `ModelError::PageNotFound` if no page has `page_id`
    pub fn results(&self, page_id: &EntityId) -> Result<Vec<PanelResult>, EngineError> {
        let state = self.state.read();
        let page = state.page(page_id)?;
        Ok(self.page_results(page).snapshot())
    }
}
