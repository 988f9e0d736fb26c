//! Error types for the execution engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Suite load error: {0}")]
    SuiteLoad(String),

    #[error("Suite not found: {0}")]
    SuiteNotFound(String),

    #[error("Invalid target format: '{0}' (expected 'suiteId:suiteName[ > testCaseId:testCaseName[ > index:testDataName]]')")]
    TargetFormat(String),

    #[error("Test case not found in suite '{suite}': {case}")]
    TestCaseNotFound { suite: String, case: String },

    #[error("Test data not found in test case '{case}': {data}")]
    TestDataNotFound { case: String, data: String },

    #[error("Target not supported: {0}")]
    UnsupportedTarget(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Step '{step}' requires a locator")]
    MissingLocator { step: String },

    #[error("Step '{step}' requires a value")]
    MissingValue { step: String },

    #[error("Unknown keyword: {0}")]
    UnknownKeyword(String),

    #[error("Unknown locator strategy: {0}")]
    UnknownStrategy(String),

    #[error("Keyword '{0}' is not implemented")]
    Unimplemented(String),

    #[error("Custom function not found: {0}")]
    CustomStepNotFound(String),

    #[error("Custom code timed out: {0}")]
    CustomCodeTimeout(String),

    #[error("Custom code locator error: {0}")]
    CustomCodeLocator(String),

    #[error("Custom code assertion failed: {0}")]
    CustomCodeAssertion(String),

    #[error("Custom code error: {0}")]
    CustomCode(String),

    #[error("Table error: {0}")]
    Table(String),

    #[error("Pre-processor '{function}' failed: {reason}")]
    PreProcess { function: String, reason: String },

    #[error("Database configuration error: {0}")]
    DatabaseConfig(String),

    #[error("Database query failed: {0}")]
    DatabaseQuery(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Playwright not found. Install with: npm i playwright && npx playwright install")]
    PlaywrightNotFound,

    #[error("No active page; run 'openBrowser' first")]
    NoActivePage,

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Common(#[from] testforge_common::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
