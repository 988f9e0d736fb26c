//! Run Command

use anyhow::{anyhow, Result};
use clap::{Args, ValueEnum};
use serde_json::json;
use std::path::PathBuf;
use testforge_engine::filter::parse_filter_args;
use testforge_engine::playwright::Browser;
use testforge_engine::{EngineConfig, Orchestrator, RetryPolicy};
use tracing::info;

use crate::output::{print_info, print_warning, OutputFormat};

#[derive(Args)]
pub struct RunArgs {
    /// Target: suiteId:suiteName[ > testCaseId:testCaseName[ > index:testDataName]]
    target: Option<String>,

    /// Suite filter as key=value (applicationName, testType or a tag key); repeatable
    #[arg(short, long = "filter", value_name = "KEY=VALUE")]
    filters: Vec<String>,

    /// Directory containing suite files
    #[arg(long)]
    suites_dir: Option<PathBuf>,

    /// Directory for report files
    #[arg(long)]
    reports_dir: Option<PathBuf>,

    /// Suites run in parallel when no target is given
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Browser for UI suites
    #[arg(long)]
    browser: Option<BrowserArg>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Run every UI step exactly once
    #[arg(long)]
    no_retry: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum BrowserArg {
    Chromium,
    Firefox,
    Webkit,
}

impl From<BrowserArg> for Browser {
    fn from(arg: BrowserArg) -> Self {
        match arg {
            BrowserArg::Chromium => Browser::Chromium,
            BrowserArg::Firefox => Browser::Firefox,
            BrowserArg::Webkit => Browser::Webkit,
        }
    }
}

impl RunArgs {
    /// Command-line flags win over file and environment settings
    fn apply(&self, config: &mut EngineConfig) {
        if let Some(dir) = &self.suites_dir {
            config.suites_dir = dir.clone();
        }
        if let Some(dir) = &self.reports_dir {
            config.reports_dir = dir.clone();
        }
        if let Some(n) = self.concurrency {
            config.max_concurrency = n;
        }
        if let Some(browser) = self.browser {
            config.playwright.browser = browser.into();
        }
        if self.headed {
            config.playwright.headless = false;
        }
        if self.no_retry {
            config.retry = RetryPolicy::none();
        }
    }
}

/// Returns whether every executed unit passed
pub async fn execute(args: RunArgs, mut config: EngineConfig, format: OutputFormat) -> Result<bool> {
    args.apply(&mut config);
    let filters = parse_filter_args(&args.filters).map_err(|e| anyhow!(e))?;

    info!("Suites directory: {}", config.suites_dir.display());
    let orchestrator = Orchestrator::new(config)?.with_filters(filters);
    let outcome = orchestrator.run(args.target.as_deref()).await?;

    match format {
        OutputFormat::Json => {
            let reports: Vec<String> = outcome.reports.iter().map(|p| p.display().to_string()).collect();
            let body = json!({
                "summary": outcome.summary,
                "reports": reports,
                "skippedSuites": outcome.skipped_suites,
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        OutputFormat::Table => {
            for report in &outcome.reports {
                print_info(&format!("Report: {}", report.display()));
            }
            for suite in &outcome.skipped_suites {
                print_warning(&format!("Skipped by filters: {}", suite));
            }
        }
    }

    Ok(outcome.summary.success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        run: RunArgs,
    }

    #[test]
    fn test_flags_override_config() {
        let harness = Harness::parse_from([
            "testforge",
            "s1:Users > tc1:List",
            "-f",
            "suiteType=@smoke",
            "--concurrency",
            "5",
            "--browser",
            "firefox",
            "--headed",
            "--no-retry",
        ]);
        assert_eq!(harness.run.target.as_deref(), Some("s1:Users > tc1:List"));
        assert_eq!(harness.run.filters, vec!["suiteType=@smoke".to_string()]);

        let mut config = EngineConfig::default();
        harness.run.apply(&mut config);
        assert_eq!(config.max_concurrency, 5);
        assert_eq!(config.playwright.browser, Browser::Firefox);
        assert!(!config.playwright.headless);
        assert_eq!(config.retry.max_attempts, 1);
        assert_eq!(config.suites_dir, PathBuf::from("test-suites"));
    }
}
