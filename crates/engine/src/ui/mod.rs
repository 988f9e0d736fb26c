//! UI step interpreter
//!
//! Steps of a test case run in order against one [`BrowserSession`]:
//! - `enabled: false` steps are reported SKIPPED without running
//! - after any failure, every later `skipOnFailure` step is SKIPPED
//! - every other step runs under the configured [`RetryPolicy`]; the final
//!   failure is reported with a best-effort screenshot

pub mod actions;
pub mod custom;
pub mod keyword;
pub mod locator;
pub mod session;
pub mod table;

use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use testforge_common::{value_to_text, LocatorDefinition, Scope, TestCase, TestStep, TestSuite};
use tracing::{debug, info, warn};

use crate::error::EngineResult;
use crate::preprocess::PreProcessor;
use crate::reporter::{ReportEntry, Status, UnitKind};
use crate::retry::RetryPolicy;
use crate::variables::{VariableScope, VariableStore};

pub use actions::StepContext;
pub use custom::{CodePlugin, CustomRegistry, CustomStep, PageObject};
pub use keyword::Keyword;
pub use session::{AutomationDriver, BrowserSession, CallTarget, DriverCall, DriverFactory, PageId};

pub struct UiInterpreter {
    factory: Arc<dyn DriverFactory>,
    vars: VariableStore,
    preprocessor: Arc<PreProcessor>,
    custom: Arc<CustomRegistry>,
    retry: RetryPolicy,
    screenshot_dir: PathBuf,
    code_timeout: Duration,
}

impl UiInterpreter {
    pub fn new(factory: Arc<dyn DriverFactory>, vars: VariableStore) -> Self {
        Self {
            factory,
            vars,
            preprocessor: Arc::new(PreProcessor::default()),
            custom: Arc::new(CustomRegistry::default()),
            retry: RetryPolicy::default(),
            screenshot_dir: PathBuf::from("test-results/screenshots"),
            code_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_preprocessor(mut self, preprocessor: Arc<PreProcessor>) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    pub fn with_custom(mut self, custom: Arc<CustomRegistry>) -> Self {
        self.custom = custom;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_screenshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.screenshot_dir = dir.into();
        self
    }

    pub fn with_code_timeout(mut self, timeout: Duration) -> Self {
        self.code_timeout = timeout;
        self
    }

    pub async fn run_suite(&self, suite: &TestSuite) -> Vec<ReportEntry> {
        let mut entries = Vec::new();
        for case in &suite.test_cases {
            entries.extend(self.run_test_case(suite, case).await);
        }
        entries
    }

    pub async fn run_test_case(&self, suite: &TestSuite, case: &TestCase) -> Vec<ReportEntry> {
        info!("Running test case: {} ({} steps)", case.name, case.test_steps.len());

        let vars = self.vars.scope(&suite.id, &case.id);
        let mut session = BrowserSession::new(self.factory.clone(), self.screenshot_dir.clone());
        let mut entries = Vec::with_capacity(case.test_steps.len());
        let mut failed = false;

        for (index, step) in case.test_steps.iter().enumerate() {
            let mut entry = new_entry(suite, case, index, step);

            if !step.enabled {
                debug!("Step '{}' disabled", step.id);
                entry.status = Status::Skipped;
                entry.error = Some("step disabled".to_string());
            } else if failed && step.skip_on_failure {
                info!("Skipping step '{}' after an earlier failure", step.id);
                entry.status = Status::Skipped;
                entry.error = Some("skipped after an earlier failure".to_string());
            } else {
                self.run_step(&mut session, suite, case, step, &vars, &mut entry).await;
                failed |= entry.status == Status::Fail;
            }

            entries.push(entry);
        }

        if let Err(e) = session.close().await {
            warn!("Failed to close browser for '{}': {}", case.name, e);
        }
        entries
    }

    async fn run_step(
        &self,
        session: &mut BrowserSession,
        suite: &TestSuite,
        case: &TestCase,
        step: &TestStep,
        vars: &VariableScope,
        entry: &mut ReportEntry,
    ) {
        let started = Instant::now();
        let attempts = self.retry.attempts();
        let mut result = Ok(None);

        for attempt in 1..=attempts {
            result = self.execute_step(session, suite, step, vars).await;
            match &result {
                Ok(_) => break,
                Err(e) if attempt < attempts => {
                    let delay = self.retry.delay_after(attempt);
                    warn!(
                        "Step '{}' attempt {}/{} failed: {}; retrying in {:?}",
                        step.id, attempt, attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(_) => {}
            }
        }

        let keyword = Keyword::parse(&step.keyword).ok();
        let counts_assertion = keyword.map(|k| k.is_assertion()).unwrap_or(false);
        entry.duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(_) => {
                entry.status = Status::Pass;
                if counts_assertion {
                    entry.assertions_passed = 1;
                }
            }
            Err(e) => {
                warn!("Step '{}' failed: {}", step.id, e);
                entry.status = Status::Fail;
                entry.error = Some(e.to_string());
                if counts_assertion {
                    entry.assertions_failed = 1;
                }
                if session.is_open() {
                    match session.screenshot(&format!("{}-{}-failure", case.id, step.id)).await {
                        Ok(path) => entry.screenshot = Some(path),
                        Err(e) => debug!("Failure screenshot not captured: {}", e),
                    }
                }
            }
        }
    }

    async fn execute_step(
        &self,
        session: &mut BrowserSession,
        suite: &TestSuite,
        step: &TestStep,
        vars: &VariableScope,
    ) -> EngineResult<Option<Value>> {
        self.preprocessor.run_all(&step.pre_process, vars).await?;

        let keyword = Keyword::parse(&step.keyword)?;
        let step = inject_step(step, vars)?;
        debug!("Step '{}': {}", step.id, keyword);

        let mut ctx = StepContext {
            session,
            step: &step,
            vars,
            base_url: &suite.base_url,
            custom: &self.custom,
            code_timeout: self.code_timeout,
        };
        let output = actions::execute(keyword, &mut ctx).await?;

        if let Some(output) = &output {
            store_outputs(&step, keyword, output, vars);
        }
        Ok(output)
    }
}

fn new_entry(suite: &TestSuite, case: &TestCase, index: usize, step: &TestStep) -> ReportEntry {
    ReportEntry {
        suite_id: suite.id.clone(),
        suite_name: suite.suite_name.clone(),
        test_case_id: case.id.clone(),
        test_case_name: case.name.clone(),
        unit: UnitKind::TestStep,
        index,
        name: match &step.description {
            Some(description) => format!("{} ({})", step.id, description),
            None => format!("{} ({})", step.id, step.keyword),
        },
        status: Status::Fail,
        assertions_passed: 0,
        assertions_failed: 0,
        duration_ms: 0,
        error: None,
        response: None,
        screenshot: None,
    }
}

/// Copy of the step with `{{var}}` placeholders resolved
fn inject_step(step: &TestStep, vars: &VariableScope) -> EngineResult<TestStep> {
    let mut step = step.clone();
    step.value = step.value.as_ref().map(|v| vars.inject_value(v));
    step.options = step
        .options
        .iter()
        .map(|(k, v)| (k.clone(), vars.inject_value(v)))
        .collect();
    if let Some(def) = &step.locator {
        let injected = vars.inject_value(&serde_json::to_value(def)?);
        step.locator = Some(serde_json::from_value::<LocatorDefinition>(injected)?);
    }
    if let Some(call) = &mut step.custom_function {
        call.args = call.args.iter().map(|a| vars.inject_value(a)).collect();
    }
    Ok(step)
}

/// Apply `store` (global) and `localStore` (local) directives to a step output
fn store_outputs(step: &TestStep, keyword: Keyword, output: &Value, vars: &VariableScope) {
    let marker = keyword.output_marker();
    for (directives, scope) in [(&step.store, Scope::Global), (&step.local_store, Scope::Local)] {
        for (name, source) in directives {
            match extract(marker, source, output) {
                Some(value) => {
                    debug!("Stored {} variable '{}' from {}", scope, name, source);
                    vars.set(scope, name, &value_to_text(&value));
                }
                None => warn!(
                    "Step '{}': '{}' does not match output {:?}; '{}' not stored",
                    step.id, source, marker, name
                ),
            }
        }
    }
}

fn extract(marker: Option<&str>, source: &str, output: &Value) -> Option<Value> {
    if marker == Some(source) {
        return Some(output.clone());
    }
    if marker == Some("$result") {
        let path = source.strip_prefix("$result.").unwrap_or(source);
        if path.starts_with('$') {
            return None;
        }
        return custom::result_path(output, path);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_by_marker_and_path() {
        assert_eq!(extract(Some("$text"), "$text", &json!("Hi")), Some(json!("Hi")));
        assert_eq!(extract(Some("$text"), "$url", &json!("Hi")), None);

        let result = json!({"order": {"id": "A-1", "lines": [{"sku": "X"}]}});
        assert_eq!(extract(Some("$result"), "$result", &result), Some(result.clone()));
        assert_eq!(extract(Some("$result"), "order.id", &result), Some(json!("A-1")));
        assert_eq!(extract(Some("$result"), "$result.order.lines.0.sku", &result), Some(json!("X")));
        assert_eq!(extract(Some("$result"), "$text", &result), None);
    }

    #[test]
    fn test_inject_step_resolves_locator_and_value() {
        let vars = VariableStore::new().scope("s", "t");
        vars.set_global("user", "alice");
        let step: TestStep = serde_json::from_value(json!({
            "id": "s1",
            "keyword": "fill",
            "value": "{{user}}@example.com",
            "options": {"timeout": "{{missing}}"},
            "locator": {"strategy": "css", "value": "#{{user}}"}
        }))
        .unwrap();
        let injected = inject_step(&step, &vars).unwrap();
        assert_eq!(injected.value, Some(json!("alice@example.com")));
        assert_eq!(injected.options["timeout"], json!(""));
        assert_eq!(injected.locator.unwrap().value, "#alice");
    }
}
