//! testforge execution engine
//!
//! Runs declarative JSON test suites of two kinds:
//! - API suites: HTTP/SOAP requests checked by status, JSONPath, XPath and
//!   JSON-schema assertions
//! - UI suites: keyword steps driven through a browser automation backend
//!   (Playwright over a JSON-lines bridge)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Orchestrator                          │
//! │    ├── ExecutionTarget::parse("suite[:case[:data]]")        │
//! │    ├── SuiteFile::discover / find                           │
//! │    ├── matches_filters(suite, filters)                      │
//! │    └── run_all() -> buffer_unordered(max_concurrency)       │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │  ApiExecutor                 │  UiInterpreter               │
//! │    ├── PreProcessor          │    ├── PreProcessor          │
//! │    ├── VariableScope inject  │    ├── Keyword dispatch      │
//! │    ├── reqwest send          │    ├── locator::resolve      │
//! │    ├── schema / JSONPath     │    ├── BrowserSession        │
//! │    └── XPath (SOAP)          │    │     └── AutomationDriver │
//! │                              │    └── CustomRegistry        │
//! ├──────────────────────────────┴──────────────────────────────┤
//! │  Reporter -> <suite>-<timestamp>.json   RunSummary -> stdout │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod assertion;
pub mod config;
pub mod database;
pub mod error;
pub mod filter;
pub mod playwright;
pub mod preprocess;
pub mod reporter;
pub mod retry;
pub mod runner;
pub mod schema;
pub mod suite;
pub mod target;
pub mod ui;
pub mod variables;
pub mod xpath;

pub use api::ApiExecutor;
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use filter::SuiteFilters;
pub use playwright::{PlaywrightConfig, PlaywrightFactory};
pub use preprocess::PreProcessor;
pub use reporter::{Report, ReportEntry, ReportSummary, Reporter, RunSummary, Status};
pub use retry::RetryPolicy;
pub use runner::{Orchestrator, RunOutcome};
pub use suite::SuiteFile;
pub use target::{ExecutionTarget, TargetType};
pub use ui::{CustomRegistry, UiInterpreter};
pub use variables::{VariableScope, VariableStore};
