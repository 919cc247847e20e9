//! Program panel runtime
//!
//! Scripts see two functions:
//! - `DM_getPanel(i)` returns the value of an earlier panel, or
//!   `undefined` / `None` when it has none
//! - `DM_setPanel(v)` publishes the panel's value
//!
//! [`ProcessScriptRuntime`] runs each script as a fresh `node` or `python3`
//! process. Earlier panel values are written to a JSON file in a temporary
//! directory, a generated prelude defines the two functions over it, and
//! the published value is read back from a second JSON file on exit.

use super::ScriptRuntime;
use crate::cache::CacheView;
use crate::config::EngineConfig;
use crate::error::EvalError;
use datapanel_model::ProgramLanguage;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

/// Capability handed to a running script
#[derive(Debug)]
pub struct PanelBridge {
    view: CacheView,
    reader: usize,
    published: Mutex<Option<Value>>,
}

impl PanelBridge {
    /// Bridge for the panel at `reader` over a cache snapshot
    #[must_use]
    pub fn new(view: CacheView, reader: usize) -> Self {
        Self {
            view,
            reader,
            published: Mutex::new(None),
        }
    }

    /// Value of an earlier panel whose last run succeeded
    #[must_use]
    pub fn get_panel(&self, index: usize) -> Option<Value> {
        let value = self.view.get_before(index, self.reader).cloned();
        if value.is_none() {
            tracing::debug!(reader = self.reader, index, "panel value not available");
        }
        value
    }

    /// Publish the panel value, replacing any earlier one
    pub fn set_panel(&self, value: Value) {
        *self.published.lock() = Some(value);
    }

    /// Take the last published value
    #[must_use]
    pub fn take_published(&self) -> Option<Value> {
        self.published.lock().take()
    }

    /// Every readable earlier value keyed by its index
    #[must_use]
    pub fn readable(&self) -> Map<String, Value> {
        (0..self.reader)
            .filter_map(|i| self.view.get(i).map(|v| (i.to_string(), v.clone())))
            .collect()
    }

    /// Position of the running panel
    #[inline]
    #[must_use]
    pub fn reader(&self) -> usize {
        self.reader
    }
}

#[derive(Debug, Default, Deserialize)]
struct Published {
    #[serde(default)]
    set: bool,
    #[serde(default)]
    value: Value,
}

/// Runs scripts in an interpreter subprocess
#[derive(Debug, Clone)]
pub struct ProcessScriptRuntime {
    language: ProgramLanguage,
    binary: String,
    timeout_secs: u64,
}

impl ProcessScriptRuntime {
    /// Runtime for `language` using `binary`
    pub fn new(language: ProgramLanguage, binary: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            language,
            binary: binary.into(),
            timeout_secs,
        }
    }

    /// JavaScript runtime from configuration
    #[must_use]
    pub fn javascript(config: &EngineConfig) -> Self {
        Self::new(
            ProgramLanguage::Javascript,
            config.node_binary.clone(),
            config.script_timeout_secs,
        )
    }

    /// Python runtime from configuration
    #[must_use]
    pub fn python(config: &EngineConfig) -> Self {
        Self::new(
            ProgramLanguage::Python,
            config.python_binary.clone(),
            config.script_timeout_secs,
        )
    }

    /// Language served
    #[inline]
    #[must_use]
    pub fn language(&self) -> ProgramLanguage {
        self.language
    }

    fn script_name(&self) -> &'static str {
        match self.language {
            ProgramLanguage::Javascript => "panel.js",
            ProgramLanguage::Python => "panel.py",
        }
    }
}

/// Source prelude defining `DM_getPanel` and `DM_setPanel`
///
/// Paths are embedded as JSON string literals, which both languages accept.
fn prelude(language: ProgramLanguage, inputs: &Path, output: &Path) -> Result<String, EvalError> {
    let literal = |path: &Path| {
        serde_json::to_string(&path.to_string_lossy()).map_err(|e| EvalError::Script(e.to_string()))
    };
    let inputs = literal(inputs)?;
    let output = literal(output)?;

    Ok(match language {
        ProgramLanguage::Javascript => format!(
            "const __dm_fs = require('fs');\n\
             const __dm_inputs = JSON.parse(__dm_fs.readFileSync({inputs}, 'utf8'));\n\
             let __dm_result = {{ set: false, value: null }};\n\
             function DM_getPanel(i) {{ return __dm_inputs[String(i)]; }}\n\
             function DM_setPanel(v) {{ __dm_result = {{ set: true, value: v === undefined ? null : v }}; }}\n\
             process.on('exit', () => {{ __dm_fs.writeFileSync({output}, JSON.stringify(__dm_result)); }});\n"
        ),
        ProgramLanguage::Python => format!(
            "import json as __dm_json, atexit as __dm_atexit\n\
             with open({inputs}) as __dm_f:\n    __dm_inputs = __dm_json.load(__dm_f)\n\
             __dm_result = {{'set': False, 'value': None}}\n\
             def DM_getPanel(i):\n    return __dm_inputs.get(str(i))\n\
             def DM_setPanel(v):\n    __dm_result['set'] = True\n    __dm_result['value'] = v\n\
             def __dm_write():\n    with open({output}, 'w') as f:\n        __dm_json.dump(__dm_result, f)\n\
             __dm_atexit.register(__dm_write)\n"
        ),
    })
}

fn script_error(e: impl std::fmt::Display) -> EvalError {
    EvalError::Script(e.to_string())
}

#[async_trait::async_trait]
impl ScriptRuntime for ProcessScriptRuntime {
    async fn run(&self, source: &str, bridge: &PanelBridge) -> Result<Option<Value>, EvalError> {
        let dir = tempfile::tempdir().map_err(script_error)?;
        let inputs_path = dir.path().join("inputs.json");
        let output_path = dir.path().join("output.json");
        let script_path = dir.path().join(self.script_name());

        let readable = bridge.readable();
        tracing::debug!(
            reader = bridge.reader(),
            language = %self.language.as_str(),
            inputs = readable.len(),
            "starting script process"
        );
        let inputs = serde_json::to_vec(&readable).map_err(script_error)?;
        tokio::fs::write(&inputs_path, inputs).await.map_err(script_error)?;

        let mut script = prelude(self.language, &inputs_path, &output_path)?;
        script.push_str(source);
        script.push('\n');
        tokio::fs::write(&script_path, script).await.map_err(script_error)?;

        let mut command = tokio::process::Command::new(&self.binary);
        command
            .arg(&script_path)
            .current_dir(dir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(Duration::from_secs(self.timeout_secs), command.output())
            .await
            .map_err(|_| EvalError::Timeout(self.timeout_secs))?
            .map_err(|e| EvalError::Script(format!("could not start {}: {e}", self.binary)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = stderr.trim();
            return Err(EvalError::Script(if message.is_empty() {
                format!("{} exited with {}", self.binary, output.status)
            } else {
                message.to_string()
            }));
        }

        let published: Published = match tokio::fs::read(&output_path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(script_error)?,
            Err(_) => Published::default(),
        };
        if published.set {
            bridge.set_panel(published.value);
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn view() -> CacheView {
        CacheView::from_values(vec![Some(json!([1])), None, Some(json!("two")), Some(json!(3))])
    }

    #[test]
    fn bridge_reads_only_earlier_panels() {
        let bridge = PanelBridge::new(view(), 3);
        assert_eq!(bridge.get_panel(0), Some(json!([1])));
        assert_eq!(bridge.get_panel(1), None);
        assert_eq!(bridge.get_panel(3), None);

        let readable = bridge.readable();
        assert_eq!(readable.len(), 2);
        assert_eq!(readable["2"], json!("two"));
    }

    #[test]
    fn bridge_keeps_last_published() {
        let bridge = PanelBridge::new(CacheView::default(), 0);
        assert_eq!(bridge.take_published(), None);
        bridge.set_panel(json!(1));
        bridge.set_panel(json!(2));
        assert_eq!(bridge.take_published(), Some(json!(2)));
    }

    #[test]
    fn prelude_embeds_paths() {
        let js = prelude(ProgramLanguage::Javascript, Path::new("/tmp/in.json"), Path::new("/tmp/out.json")).unwrap();
        assert!(js.contains("readFileSync(\"/tmp/in.json\""));
        assert!(js.contains("function DM_setPanel"));

        let py = prelude(ProgramLanguage::Python, Path::new("/tmp/in.json"), Path::new("/tmp/out.json")).unwrap();
        assert!(py.contains("open(\"/tmp/out.json\", 'w')"));
        assert!(py.contains("def DM_getPanel(i):"));
    }

    #[tokio::test]
    async fn missing_interpreter_is_script_error() {
        let runtime = ProcessScriptRuntime::new(
            ProgramLanguage::Python,
            "/nonexistent/datapanel-python",
            5,
        );
        let bridge = PanelBridge::new(CacheView::default(), 0);
        let err = runtime.run("DM_setPanel(1)", &bridge).await.unwrap_err();
        assert!(matches!(err, EvalError::Script(m) if m.contains("could not start")));
    }
}
