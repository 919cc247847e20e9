//! Testing utilities for the DataPanel workspace
//!
//! Scriptable bridge fakes and document fixtures.

#![allow(missing_docs)]

use datapanel_engine::{
    EngineConfig, EvalError, Evaluator, HttpRequest, HttpResponse, HttpTransport, PanelBridge,
    ScriptRuntime,
};
use datapanel_model::{
    DataFormat, EntityId, GraphY, HttpConnectorConfig, PanelInfo, ProgramLanguage, ProjectPage,
    ProjectState, SqlConnectorConfig, TableColumn,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;

/// HTTP transport answering from a per-URL table
#[derive(Debug, Default)]
pub struct FakeHttpTransport {
    routes: Mutex<HashMap<String, Result<HttpResponse, EvalError>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeHttpTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer `url` with `status` and `body` until changed
    pub fn respond(&self, url: &str, status: u16, body: &str) {
        self.routes
            .lock()
            .insert(url.to_string(), Ok(HttpResponse::new(status, body)));
    }

    /// Fail requests to `url` with a transport error until changed
    pub fn fail(&self, url: &str, message: &str) {
        self.routes
            .lock()
            .insert(url.to_string(), Err(EvalError::Transport(message.to_string())));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait::async_trait]
impl HttpTransport for FakeHttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, EvalError> {
        let answer = self.routes.lock().get(&request.url).cloned();
        self.requests.lock().push(request.clone());
        answer.unwrap_or_else(|| Err(EvalError::Transport(format!("no route for {}", request.url))))
    }
}

type ScriptFn = dyn Fn(&str, &PanelBridge) -> Result<Option<Value>, EvalError> + Send + Sync;

/// Script runtime backed by a closure
pub struct FnScriptRuntime {
    body: Box<ScriptFn>,
}

impl FnScriptRuntime {
    pub fn new(
        body: impl Fn(&str, &PanelBridge) -> Result<Option<Value>, EvalError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            body: Box::new(body),
        })
    }

    /// Runtime that understands a tiny command language:
    /// - `copy N` publishes panel N (or null)
    /// - `return <json>` returns the JSON value
    /// - `raise <message>` fails
    /// - anything else publishes nothing
    pub fn commands() -> Arc<Self> {
        Self::new(|source, bridge| {
            let source = source.trim();
            if let Some(index) = source.strip_prefix("copy ") {
                let index: usize = index
                    .trim()
                    .parse()
                    .map_err(|_| EvalError::Script(format!("bad index: {index}")))?;
                bridge.set_panel(bridge.get_panel(index).unwrap_or(Value::Null));
                Ok(None)
            } else if let Some(json) = source.strip_prefix("return ") {
                serde_json::from_str(json)
                    .map(Some)
                    .map_err(|e| EvalError::Script(e.to_string()))
            } else if let Some(message) = source.strip_prefix("raise ") {
                Err(EvalError::Script(message.to_string()))
            } else {
                Ok(None)
            }
        })
    }
}

#[async_trait::async_trait]
impl ScriptRuntime for FnScriptRuntime {
    async fn run(&self, source: &str, bridge: &PanelBridge) -> Result<Option<Value>, EvalError> {
        (self.body)(source, bridge)
    }
}

/// Script runtime whose runs block until released
///
/// A script `wait NAME` waits for [`GatedScriptRuntime::release`] of `NAME`
/// and then returns the string `NAME`.
#[derive(Debug, Default)]
pub struct GatedScriptRuntime {
    gates: Mutex<HashMap<String, Arc<Notify>>>,
}

impl GatedScriptRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn gate(&self, name: &str) -> Arc<Notify> {
        self.gates
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    pub fn release(&self, name: &str) {
        self.gate(name).notify_one();
    }
}

#[async_trait::async_trait]
impl ScriptRuntime for GatedScriptRuntime {
    async fn run(&self, source: &str, _bridge: &PanelBridge) -> Result<Option<Value>, EvalError> {
        let Some(name) = source.trim().strip_prefix("wait ") else {
            return Ok(None);
        };
        self.gate(name).notified().await;
        Ok(Some(Value::String(name.to_string())))
    }
}

/// Evaluator with the in-memory SQL engine and the given fakes
pub fn evaluator_with(
    http: Option<Arc<dyn HttpTransport>>,
    scripts: Option<Arc<dyn ScriptRuntime>>,
) -> Evaluator {
    let mut evaluator = Evaluator::offline(EngineConfig::new());
    if let Some(http) = http {
        evaluator = evaluator.with_http_transport(http);
    }
    if let Some(scripts) = scripts {
        evaluator = evaluator
            .with_script_runtime(ProgramLanguage::Javascript, scripts.clone())
            .with_script_runtime(ProgramLanguage::Python, scripts);
    }
    evaluator
}

/// `name,age` CSV used across tests
pub const PEOPLE_CSV: &str = "name,age\nMorgan,12\nJames,17";

/// Page: CSV literal, in-memory SQL over it, table over the SQL
pub fn pipeline_page() -> ProjectPage {
    ProjectPage::new(
        "Pipeline",
        vec![
            PanelInfo::literal("People", DataFormat::Csv, PEOPLE_CSV),
            PanelInfo::sql(
                "Older",
                SqlConnectorConfig::in_memory(),
                "SELECT name, age+5 AS age FROM DM_getPanel(0);",
            ),
            PanelInfo::table("Names", vec![TableColumn::new("Name", "name")], 1),
        ],
    )
}

/// Page: HTTP panel against `url` followed by a graph over it
pub fn http_page(url: &str) -> ProjectPage {
    ProjectPage::new(
        "Remote",
        vec![
            PanelInfo::http("Fetch", HttpConnectorConfig::get(url), DataFormat::Json),
            PanelInfo::graph("Chart", 0, "name", GraphY::new("age", "Age")),
        ],
    )
}

/// Project holding `pages`, returning the first page's id
pub fn project_with(pages: Vec<ProjectPage>) -> (ProjectState, Option<EntityId>) {
    let first = pages.first().map(|p| p.id.clone());
    (ProjectState::new("Test project", pages), first)
}
