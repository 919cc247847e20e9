//! DataPanel engine
//!
//! Runs panels on demand against a per-page result cache:
//! - [`Evaluator`] computes one panel's value from earlier panels' cached
//!   values, reaching external systems only through [`bridge`] traits
//! - [`PageResults`] holds the last value, exception and run time per panel
//! - [`ProjectController`] owns the document and keeps caches aligned with
//!   edits
//!
//! # Example
//!
//! ```rust,no_run
//! use datapanel_engine::{EngineConfig, Evaluator, ProjectController};
//!
//! # async fn example() -> Result<(), datapanel_engine::EngineError> {
//! let controller = ProjectController::new_example(Evaluator::new(EngineConfig::default()));
//! let page = controller.snapshot().pages[0].id.clone();
//!
//! for result in controller.run_page(&page).await? {
//!     println!("{:?} {:?}", result.value, result.exception);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod bridge;
pub mod cache;
pub mod config;
pub mod controller;
pub mod derive;
pub mod error;
pub mod evaluator;
pub mod format;

pub use bridge::{
    HttpRequest, HttpResponse, HttpTransport, InMemorySqlEngine, PanelBridge, PanelRelation,
    ProcessScriptRuntime, ReqwestTransport, ScriptRuntime, SqlEngine,
};
pub use cache::{CacheView, PageResults, PanelResult, RunTicket};
pub use config::EngineConfig;
pub use controller::ProjectController;
pub use error::{EngineError, EvalError};
pub use evaluator::{EvalContext, Evaluator};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
