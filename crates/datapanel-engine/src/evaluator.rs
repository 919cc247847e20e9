//! Panel evaluator
//!
//! Computes one panel's value from its own definition and the cached values
//! of earlier panels on the same page. The evaluator never writes to the
//! cache; it reads a [`CacheView`] snapshot and returns an outcome.
//!
//! # Dependency rule
//!
//! A panel at index `i` can only see panels at indices `< i` whose last run
//! succeeded. Anything else (forward, self, failed, never run, out of
//! range) reads as absent and is not an error in itself.

use crate::bridge::{
    sql::rewrite_panel_refs, HttpRequest, HttpTransport, InMemorySqlEngine, PanelBridge,
    PanelRelation, ProcessScriptRuntime, ReqwestTransport, ScriptRuntime, SqlEngine,
};
use crate::cache::CacheView;
use crate::config::EngineConfig;
use crate::derive;
use crate::error::EvalError;
use crate::format;
use datapanel_model::{
    ConnectorInfo, EntityId, HttpConnectorConfig, HttpPanelConfig, PanelInfo, PanelPayload,
    ProgramLanguage, ProjectPage, SqlConnectorConfig, SqlDriver, SqlPanelConfig,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::Instrument;

/// Longest response body excerpt kept in an HTTP status error
const BODY_EXCERPT_CHARS: usize = 200;

/// Everything a run may read, captured when the run starts
#[derive(Debug, Clone)]
pub struct EvalContext {
    page: ProjectPage,
    connectors: Vec<ConnectorInfo>,
    view: CacheView,
}

impl EvalContext {
    /// Create a context
    #[must_use]
    pub fn new(page: ProjectPage, connectors: Vec<ConnectorInfo>, view: CacheView) -> Self {
        Self {
            page,
            connectors,
            view,
        }
    }

    /// Page being evaluated
    #[inline]
    #[must_use]
    pub fn page(&self) -> &ProjectPage {
        &self.page
    }

    /// Cache snapshot
    #[inline]
    #[must_use]
    pub fn view(&self) -> &CacheView {
        &self.view
    }

    /// Upstream value for the panel at `reader`
    fn upstream(&self, reader: usize, source: usize) -> Option<&Value> {
        let value = self.view.get_before(source, reader);
        if value.is_none() {
            tracing::debug!(reader, source, "upstream panel has no value");
        }
        value
    }

    fn connector(&self, id: &EntityId) -> Result<&ConnectorInfo, EvalError> {
        self.connectors
            .iter()
            .find(|c| &c.id == id)
            .ok_or_else(|| EvalError::ConnectorNotFound(id.clone()))
    }

    fn sql_connection<'a>(&'a self, config: &'a SqlPanelConfig) -> Result<&'a SqlConnectorConfig, EvalError> {
        match &config.connector_id {
            None => Ok(&config.connection),
            Some(id) => self.connector(id)?.as_sql().ok_or_else(|| EvalError::ConnectorMismatch {
                id: id.clone(),
                expected: "sql",
            }),
        }
    }

    fn http_request<'a>(&'a self, config: &'a HttpPanelConfig) -> Result<&'a HttpConnectorConfig, EvalError> {
        match &config.connector_id {
            None => Ok(&config.request),
            Some(id) => self.connector(id)?.as_http().ok_or_else(|| EvalError::ConnectorMismatch {
                id: id.clone(),
                expected: "http",
            }),
        }
    }
}

/// Evaluator with its registered bridges
pub struct Evaluator {
    config: EngineConfig,
    sql_engines: HashMap<SqlDriver, Arc<dyn SqlEngine>>,
    http: Option<Arc<dyn HttpTransport>>,
    runtimes: HashMap<ProgramLanguage, Arc<dyn ScriptRuntime>>,
}

impl std::fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator")
            .field("config", &self.config)
            .field("sql_engines", &self.sql_engines.keys().collect::<Vec<_>>())
            .field("http", &self.http.is_some())
            .field("runtimes", &self.runtimes.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Evaluator {
    /// Evaluator with every built-in bridge
    ///
    /// If the HTTP client cannot be built, HTTP panels fail at run time.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let http: Option<Arc<dyn HttpTransport>> = match ReqwestTransport::new(&config) {
            Ok(transport) => Some(Arc::new(transport)),
            Err(e) => {
                tracing::warn!(error = %e, "http transport unavailable");
                None
            }
        };
        let runtimes = [
            ProcessScriptRuntime::javascript(&config),
            ProcessScriptRuntime::python(&config),
        ];

        let mut evaluator = Self::offline(config);
        for runtime in runtimes {
            evaluator = evaluator.with_script_runtime(runtime.language(), Arc::new(runtime));
        }
        evaluator.http = http;
        evaluator
    }

    /// Evaluator with only the in-memory SQL engine
    #[must_use]
    pub fn offline(config: EngineConfig) -> Self {
        Self {
            config,
            sql_engines: HashMap::new(),
            http: None,
            runtimes: HashMap::new(),
        }
        .with_sql_engine(SqlDriver::InMemory, Arc::new(InMemorySqlEngine::new()))
    }

    /// With the SQL engine serving `driver`
    #[must_use]
    pub fn with_sql_engine(mut self, driver: SqlDriver, engine: Arc<dyn SqlEngine>) -> Self {
        self.sql_engines.insert(driver, engine);
        self
    }

    /// With the HTTP transport
    #[must_use]
    pub fn with_http_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.http = Some(transport);
        self
    }

    /// With the script runtime serving `language`
    #[must_use]
    pub fn with_script_runtime(
        mut self,
        language: ProgramLanguage,
        runtime: Arc<dyn ScriptRuntime>,
    ) -> Self {
        self.runtimes.insert(language, runtime);
        self
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Compute the value of the panel at `index`
    ///
    /// # Errors
    /// - `EvalError::PanelOutOfRange` if the page has no panel at `index`
    /// - any other `EvalError` raised by the panel's own evaluation
    pub async fn evaluate(&self, ctx: &EvalContext, index: usize) -> Result<Value, EvalError> {
        let panel = ctx.page.panels.get(index).ok_or(EvalError::PanelOutOfRange {
            index,
            len: ctx.page.len(),
        })?;

        let span = tracing::info_span!(
            "panel_run",
            page = %ctx.page.id,
            index,
            kind = %panel.kind()
        );
        async {
            tracing::info!(name = %panel.name, "panel run started");
            let outcome = self.dispatch(ctx, index, panel).await;
            match &outcome {
                Ok(_) => tracing::info!("panel run finished"),
                Err(e) => {
                    tracing::info!(error = %e, retryable = e.is_retryable(), "panel run raised");
                }
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn dispatch(
        &self,
        ctx: &EvalContext,
        index: usize,
        panel: &PanelInfo,
    ) -> Result<Value, EvalError> {
        match &panel.payload {
            PanelPayload::Literal { literal } => {
                format::parse(literal.format, &panel.content, self.config.csv_infer_types)
            }
            PanelPayload::Program { program } => {
                let runtime = self
                    .runtimes
                    .get(&program.language)
                    .ok_or(EvalError::NoRuntime(program.language))?;
                let bridge = PanelBridge::new(ctx.view.clone(), index);
                let returned = runtime.run(&panel.content, &bridge).await?;
                Ok(returned
                    .or_else(|| bridge.take_published())
                    .unwrap_or(Value::Null))
            }
            PanelPayload::Sql { sql } => self.eval_sql(ctx, index, panel, sql).await,
            PanelPayload::Http { http } => self.eval_http(ctx, http).await,
            PanelPayload::Table { table } => {
                Ok(derive::table(table, ctx.upstream(index, table.panel_source)))
            }
            PanelPayload::Graph { graph } => {
                Ok(derive::graph(graph, ctx.upstream(index, graph.panel_source)))
            }
        }
    }

    async fn eval_sql(
        &self,
        ctx: &EvalContext,
        index: usize,
        panel: &PanelInfo,
        config: &SqlPanelConfig,
    ) -> Result<Value, EvalError> {
        let connection = ctx.sql_connection(config)?;
        let engine = self
            .sql_engines
            .get(&connection.driver)
            .ok_or(EvalError::NoSqlEngine(connection.driver))?;

        let (_, referenced) = rewrite_panel_refs(&panel.content)?;
        let relations = referenced
            .into_iter()
            .filter_map(|i| {
                ctx.upstream(index, i).map(|value| PanelRelation {
                    index: i,
                    value: value.clone(),
                })
            })
            .collect();

        engine.query(connection, &panel.content, relations).await
    }

    async fn eval_http(&self, ctx: &EvalContext, config: &HttpPanelConfig) -> Result<Value, EvalError> {
        let transport = self
            .http
            .as_ref()
            .ok_or_else(|| EvalError::Transport("no http transport configured".to_string()))?;
        let request = HttpRequest::from(ctx.http_request(config)?);

        let response = transport.send(request).await?;
        if !response.is_success() {
            return Err(EvalError::HttpStatus {
                status: response.status,
                body: response.body.chars().take(BODY_EXCERPT_CHARS).collect(),
            });
        }
        format::parse(config.format, &response.body, self.config.csv_infer_types)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::HttpResponse;
    use datapanel_model::{
        ConnectorKind, DataFormat, GraphY, HttpMethod, ProjectState, TableColumn,
    };
    use parking_lot::Mutex;
    use serde_json::json;

    struct StaticTransport {
        response: HttpResponse,
        seen: Mutex<Vec<HttpRequest>>,
    }

    #[async_trait::async_trait]
    impl HttpTransport for StaticTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, EvalError> {
            self.seen.lock().push(request);
            Ok(self.response.clone())
        }
    }

    struct ReturningRuntime;

    #[async_trait::async_trait]
    impl ScriptRuntime for ReturningRuntime {
        async fn run(&self, source: &str, bridge: &PanelBridge) -> Result<Option<Value>, EvalError> {
            match source {
                "return" => Ok(Some(json!("returned"))),
                "both" => {
                    bridge.set_panel(json!("published"));
                    Ok(Some(json!("returned")))
                }
                "publish-input" => {
                    bridge.set_panel(bridge.get_panel(0).unwrap_or(Value::Null));
                    Ok(None)
                }
                _ => Ok(None),
            }
        }
    }

    fn context(panels: Vec<PanelInfo>, values: Vec<Option<Value>>) -> EvalContext {
        EvalContext::new(
            ProjectPage::new("p", panels),
            Vec::new(),
            CacheView::from_values(values),
        )
    }

    fn evaluator() -> Evaluator {
        Evaluator::offline(EngineConfig::new())
            .with_script_runtime(ProgramLanguage::Javascript, Arc::new(ReturningRuntime))
    }

    #[tokio::test]
    async fn literal_csv() {
        let ctx = context(
            vec![PanelInfo::literal("l", DataFormat::Csv, "name,age\nMorgan,12")],
            vec![None],
        );
        let value = evaluator().evaluate(&ctx, 0).await.unwrap();
        assert_eq!(value, json!([{"name": "Morgan", "age": 12}]));
    }

    #[tokio::test]
    async fn out_of_range_index() {
        let ctx = context(Vec::new(), Vec::new());
        let err = evaluator().evaluate(&ctx, 2).await.unwrap_err();
        assert!(matches!(err, EvalError::PanelOutOfRange { index: 2, len: 0 }));
    }

    #[tokio::test]
    async fn program_value_precedence() {
        let eval = evaluator();
        let panels = vec![
            PanelInfo::literal("l", DataFormat::Json, "[1]"),
            PanelInfo::program("a", ProgramLanguage::Javascript, "both"),
            PanelInfo::program("b", ProgramLanguage::Javascript, "publish-input"),
            PanelInfo::program("c", ProgramLanguage::Javascript, "nothing"),
        ];
        let ctx = context(panels, vec![Some(json!([1])), None, None, None]);

        assert_eq!(eval.evaluate(&ctx, 1).await.unwrap(), json!("returned"));
        assert_eq!(eval.evaluate(&ctx, 2).await.unwrap(), json!([1]));
        assert_eq!(eval.evaluate(&ctx, 3).await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn program_without_runtime() {
        let ctx = context(
            vec![PanelInfo::program("p", ProgramLanguage::Python, "print(1)")],
            vec![None],
        );
        let err = evaluator().evaluate(&ctx, 0).await.unwrap_err();
        assert!(matches!(err, EvalError::NoRuntime(ProgramLanguage::Python)));
    }

    #[tokio::test]
    async fn sql_sees_only_earlier_panels() {
        let panels = vec![
            PanelInfo::literal("l", DataFormat::Csv, "x\n1"),
            PanelInfo::sql("q", SqlConnectorConfig::in_memory(), "SELECT x FROM DM_getPanel(2)"),
            PanelInfo::literal("later", DataFormat::Csv, "x\n2"),
        ];
        let ctx = context(panels, vec![Some(json!([{"x": 1}])), None, Some(json!([{"x": 2}]))]);
        let err = evaluator().evaluate(&ctx, 1).await.unwrap_err();
        assert!(err.to_string().contains("no such table"), "{err}");
    }

    #[tokio::test]
    async fn sql_without_engine_for_driver() {
        let connection = SqlConnectorConfig {
            driver: SqlDriver::Postgres,
            ..SqlConnectorConfig::default()
        };
        let ctx = context(vec![PanelInfo::sql("q", connection, "SELECT 1")], vec![None]);
        let err = evaluator().evaluate(&ctx, 0).await.unwrap_err();
        assert!(matches!(err, EvalError::NoSqlEngine(SqlDriver::Postgres)));
    }

    #[tokio::test]
    async fn table_and_graph_over_upstream() {
        let rows = json!([{"name": "Morgan", "age": 17}]);
        let panels = vec![
            PanelInfo::literal("l", DataFormat::Json, rows.to_string()),
            PanelInfo::table("t", vec![TableColumn::new("Name", "name")], 0),
            PanelInfo::graph("g", 0, "name", GraphY::new("age", "Age")),
            PanelInfo::table("forward", Vec::new(), 3),
        ];
        let ctx = context(panels, vec![Some(rows), None, None, None]);
        let eval = evaluator();

        assert_eq!(eval.evaluate(&ctx, 1).await.unwrap(), json!([{"name": "Morgan"}]));
        assert_eq!(
            eval.evaluate(&ctx, 2).await.unwrap()["series"],
            json!([{"x": "Morgan", "y": 17}])
        );
        assert_eq!(eval.evaluate(&ctx, 3).await.unwrap(), json!([]));
    }

    #[tokio::test]
    async fn http_uses_connector_and_parses_body() {
        let transport = Arc::new(StaticTransport {
            response: HttpResponse::new(200, "{\"ok\": true}"),
            seen: Mutex::new(Vec::new()),
        });
        let eval = evaluator().with_http_transport(transport.clone());

        let mut project = ProjectState::default();
        let connector = ConnectorInfo::http(
            "api",
            HttpConnectorConfig::get("https://api.test/v1").with_method(HttpMethod::Post),
        );
        let mut panel = PanelInfo::http("h", HttpConnectorConfig::get("https://ignored.test"), DataFormat::Json);
        if let PanelPayload::Http { http } = &mut panel.payload {
            http.connector_id = Some(connector.id.clone());
        }
        project.connectors.push(connector);

        let ctx = EvalContext::new(
            ProjectPage::new("p", vec![panel]),
            project.connectors.clone(),
            CacheView::default(),
        );
        assert_eq!(eval.evaluate(&ctx, 0).await.unwrap(), json!({"ok": true}));

        let seen = transport.seen.lock();
        assert_eq!(seen[0].url, "https://api.test/v1");
        assert_eq!(seen[0].method, HttpMethod::Post);
    }

    #[tokio::test]
    async fn http_status_and_connector_errors() {
        let transport = Arc::new(StaticTransport {
            response: HttpResponse::new(404, "missing"),
            seen: Mutex::new(Vec::new()),
        });
        let eval = evaluator().with_http_transport(transport);

        let ctx = context(
            vec![PanelInfo::http("h", HttpConnectorConfig::get("https://x.test"), DataFormat::Csv)],
            vec![None],
        );
        let err = eval.evaluate(&ctx, 0).await.unwrap_err();
        assert!(matches!(err, EvalError::HttpStatus { status: 404, ref body } if body == "missing"));

        let sql_connector = ConnectorInfo::new(ConnectorKind::Sql);
        let mut panel = PanelInfo::http("h", HttpConnectorConfig::default(), DataFormat::Csv);
        if let PanelPayload::Http { http } = &mut panel.payload {
            http.connector_id = Some(sql_connector.id.clone());
        }
        let ctx = EvalContext::new(
            ProjectPage::new("p", vec![panel]),
            vec![sql_connector],
            CacheView::default(),
        );
        let err = eval.evaluate(&ctx, 0).await.unwrap_err();
        assert!(matches!(err, EvalError::ConnectorMismatch { expected: "http", .. }));
    }

    #[tokio::test]
    async fn http_without_transport() {
        let ctx = context(
            vec![PanelInfo::http("h", HttpConnectorConfig::get("https://x.test"), DataFormat::Csv)],
            vec![None],
        );
        let err = evaluator().evaluate(&ctx, 0).await.unwrap_err();
        assert!(matches!(err, EvalError::Transport(_)));
    }
}
