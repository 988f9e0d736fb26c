//! Target resolution and run orchestration
//!
//! A run either addresses one target (suite, test case, or a single API test
//! data item) or, without a target, every suite file in the suites
//! directory. Suites run concurrently up to `max_concurrency`; everything
//! inside a suite is sequential. Local variables of every suite are swept
//! once at the very end of the run.

use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use testforge_common::{SuiteType, TestSuite, VariableRegistry};
use tracing::{debug, error, info, warn};

use crate::api::ApiExecutor;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::filter::{matches_filters, SuiteFilters};
use crate::playwright::PlaywrightFactory;
use crate::preprocess::PreProcessor;
use crate::reporter::{ReportEntry, ReportSummary, Reporter, RunSummary};
use crate::suite::SuiteFile;
use crate::target::{ExecutionTarget, TargetType};
use crate::ui::{CustomRegistry, DriverFactory, UiInterpreter};
use crate::variables::VariableStore;

/// Result of a whole run
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub summary: RunSummary,
    pub reports: Vec<PathBuf>,
    /// Suites rejected by the filters
    pub skipped_suites: Vec<String>,
}

enum SuiteRun {
    Completed { summary: ReportSummary, report: PathBuf },
    Filtered(String),
}

pub struct Orchestrator {
    config: EngineConfig,
    vars: VariableStore,
    preprocessor: Arc<PreProcessor>,
    driver_factory: Arc<dyn DriverFactory>,
    custom: Arc<CustomRegistry>,
    filters: SuiteFilters,
}

impl Orchestrator {
    /// Orchestrator with the Playwright driver and the configured registry
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let vars = match &config.registry_path {
            Some(path) => VariableStore::with_registry(VariableRegistry::open(path)?),
            None => VariableStore::new(),
        };
        let driver_factory = Arc::new(PlaywrightFactory::new(config.playwright.clone()));
        Ok(Self {
            config,
            vars,
            preprocessor: Arc::new(PreProcessor::default()),
            driver_factory,
            custom: Arc::new(CustomRegistry::default()),
            filters: SuiteFilters::new(),
        })
    }

    pub fn with_driver_factory(mut self, factory: Arc<dyn DriverFactory>) -> Self {
        self.driver_factory = factory;
        self
    }

    pub fn with_custom(mut self, custom: CustomRegistry) -> Self {
        self.custom = Arc::new(custom);
        self
    }

    pub fn with_preprocessor(mut self, preprocessor: PreProcessor) -> Self {
        self.preprocessor = Arc::new(preprocessor);
        self
    }

    pub fn with_filters(mut self, filters: SuiteFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_variables(mut self, vars: VariableStore) -> Self {
        self.vars = vars;
        self
    }

    pub fn variables(&self) -> &VariableStore {
        &self.vars
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run `target` (or every suite), print the summary and sweep local variables
    pub async fn run(&self, target: Option<&str>) -> EngineResult<RunOutcome> {
        let started = Instant::now();

        let result = match target {
            Some(address) => match ExecutionTarget::parse(address) {
                Ok(target) => self.run_target(&target).await,
                Err(e) => Err(e),
            },
            None => self.run_all().await,
        };

        match self.vars.cleanup_locals() {
            Ok(removed) => debug!("Removed {} local variable(s)", removed),
            Err(e) => warn!("Local variable cleanup failed: {}", e),
        }

        let summary = closing_summary(&result, started.elapsed().as_millis() as u64);
        summary.print();
        let mut outcome = result?;
        outcome.summary = summary;
        Ok(outcome)
    }

    /// Run a single suite, test case or test data item
    pub async fn run_target(&self, target: &ExecutionTarget) -> EngineResult<RunOutcome> {
        info!("Running target: {}", target.label());

        let file = SuiteFile::find(&self.config.suites_dir, &target.suite_id, &target.suite_name)?;

        let mut outcome = RunOutcome::default();
        match self.run_suite_file(&file, target).await? {
            SuiteRun::Completed { summary, report } => {
                outcome.summary.add(&summary);
                outcome.reports.push(report);
            }
            SuiteRun::Filtered(name) => outcome.skipped_suites.push(name),
        }
        Ok(outcome)
    }

    /// Run every discovered suite under the concurrency limit
    pub async fn run_all(&self) -> EngineResult<RunOutcome> {
        let paths = SuiteFile::discover(&self.config.suites_dir)?;
        let limit = self.config.max_concurrency.max(1);
        info!("Running {} suite file(s), up to {} at a time", paths.len(), limit);

        let runs: Vec<(PathBuf, EngineResult<SuiteRun>)> = stream::iter(paths)
            .map(|path| async move {
                let result = match SuiteFile::from_file(&path) {
                    Ok(file) => {
                        let target = ExecutionTarget::suite(&file.suite.id, &file.suite.suite_name);
                        self.run_suite_file(&file, &target).await
                    }
                    Err(e) => Err(e),
                };
                (path, result)
            })
            .buffer_unordered(limit)
            .collect()
            .await;

        let mut outcome = RunOutcome::default();
        for (path, result) in runs {
            match result {
                Ok(SuiteRun::Completed { summary, report }) => {
                    outcome.summary.add(&summary);
                    outcome.reports.push(report);
                }
                Ok(SuiteRun::Filtered(name)) => outcome.skipped_suites.push(name),
                Err(e) => {
                    error!("Suite {} failed: {}", path.display(), e);
                    outcome.summary.add_failed_suite();
                }
            }
        }
        outcome.reports.sort();
        Ok(outcome)
    }

    async fn run_suite_file(&self, file: &SuiteFile, target: &ExecutionTarget) -> EngineResult<SuiteRun> {
        let suite = &file.suite;
        if !matches_filters(suite, &self.filters) {
            info!("Skipping suite '{}': does not match filters", suite.suite_name);
            return Ok(SuiteRun::Filtered(suite.suite_name.clone()));
        }

        let mut reporter = Reporter::new(suite);
        let entries = match target.target_type {
            TargetType::Suite => self.execute_suite(file, suite).await?,
            TargetType::TestCase => {
                let view = self.single_case_view(suite, target)?;
                self.execute_suite(file, &view).await?
            }
            TargetType::TestData => self.execute_test_data(file, target).await?,
        };
        reporter.extend(entries);

        let report = reporter.finish();
        let path = report.write_to(&self.config.reports_dir)?;
        info!(
            "Suite '{}': {} passed, {} failed, {} skipped",
            report.summary.suite_name, report.summary.passed, report.summary.failed, report.summary.skipped
        );
        Ok(SuiteRun::Completed {
            summary: report.summary,
            report: path,
        })
    }

    async fn execute_suite(&self, file: &SuiteFile, suite: &TestSuite) -> EngineResult<Vec<ReportEntry>> {
        Ok(match suite.suite_type {
            SuiteType::Api => self.api_executor(file)?.run_suite(suite).await,
            SuiteType::Ui => self.ui_interpreter().run_suite(suite).await,
        })
    }

    async fn execute_test_data(&self, file: &SuiteFile, target: &ExecutionTarget) -> EngineResult<Vec<ReportEntry>> {
        let suite = &file.suite;
        if suite.suite_type == SuiteType::Ui {
            return Err(EngineError::UnsupportedTarget(format!(
                "test data targets apply to API suites only; '{}' is a UI suite",
                suite.suite_name
            )));
        }

        let view = self.single_case_view(suite, target)?;
        let case = &view.test_cases[0];
        let name = target.test_data_name.as_deref().unwrap_or_default();
        let index = target
            .test_data_index
            .filter(|&i| i < case.test_data.len())
            .or_else(|| case.test_data.iter().position(|d| !name.is_empty() && d.name == name))
            .ok_or_else(|| EngineError::TestDataNotFound {
                case: case.name.clone(),
                data: format!("{}:{}", target.test_data_index.unwrap_or_default(), name),
            })?;

        let entry = self.api_executor(file)?.run_test_data(&view, case, index).await?;
        Ok(vec![entry])
    }

    fn single_case_view(&self, suite: &TestSuite, target: &ExecutionTarget) -> EngineResult<TestSuite> {
        let case_id = target.test_case_id.as_deref().unwrap_or_default();
        let case_name = target.test_case_name.as_deref().unwrap_or_default();
        let case = suite
            .test_cases
            .iter()
            .find(|c| c.is_identified_by(case_id, case_name))
            .ok_or_else(|| EngineError::TestCaseNotFound {
                suite: suite.suite_name.clone(),
                case: format!("{}:{}", case_id, case_name),
            })?;
        Ok(suite.with_single_case(case.clone()))
    }

    fn api_executor(&self, file: &SuiteFile) -> EngineResult<ApiExecutor> {
        Ok(
            ApiExecutor::new(self.vars.clone(), self.preprocessor.clone(), self.config.http_timeout())?
                .with_base_dir(file.base_dir()),
        )
    }

    fn ui_interpreter(&self) -> UiInterpreter {
        UiInterpreter::new(self.driver_factory.clone(), self.vars.clone())
            .with_preprocessor(self.preprocessor.clone())
            .with_custom(self.custom.clone())
            .with_retry(self.config.retry.clone())
            .with_screenshot_dir(self.config.screenshot_dir.clone())
            .with_code_timeout(self.config.custom_code_timeout())
    }
}

/// Totals printed at the end of a run; an unresolvable target prints zeros
fn closing_summary(result: &EngineResult<RunOutcome>, elapsed_ms: u64) -> RunSummary {
    let mut summary = match result {
        Ok(outcome) => outcome.summary.clone(),
        Err(_) => RunSummary::default(),
    };
    summary.execution_time_ms = elapsed_ms;
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closing_summary_for_unresolved_target() {
        let result: EngineResult<RunOutcome> = Err(EngineError::TargetFormat("a > b > c > d".into()));
        let summary = closing_summary(&result, 4);
        assert_eq!(summary.render(), "Total: 0\n0 passed\n0 failed\nExecution time: 4ms");
    }

    #[test]
    fn test_closing_summary_keeps_totals() {
        let mut outcome = RunOutcome::default();
        outcome.summary.total = 3;
        outcome.summary.passed = 2;
        outcome.summary.failed = 1;
        let summary = closing_summary(&Ok(outcome), 9);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.execution_time_ms, 9);
    }
}
