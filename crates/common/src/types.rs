//! Core types for testforge suites
//!
//! Suites are authored as JSON documents with camelCase keys. Everything in
//! this module is read-only input to the engine, except [`Variable`] which
//! mirrors a row of the persisted registry.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Suite kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuiteType {
    #[serde(rename = "API", alias = "api")]
    Api,
    #[serde(rename = "UI", alias = "ui")]
    Ui,
}

impl std::fmt::Display for SuiteType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuiteType::Api => write!(f, "API"),
            SuiteType::Ui => write!(f, "UI"),
        }
    }
}

/// Test case kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseType {
    #[serde(rename = "REST", alias = "rest")]
    Rest,
    #[serde(rename = "SOAP", alias = "soap")]
    Soap,
    #[serde(rename = "UI", alias = "ui")]
    Ui,
}

/// A complete test suite loaded from one suite file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSuite {
    #[serde(default)]
    pub id: String,

    pub suite_name: String,

    #[serde(default)]
    pub application_name: String,

    #[serde(rename = "type")]
    pub suite_type: SuiteType,

    #[serde(default)]
    pub base_url: String,

    /// Ordered tag maps, e.g. `[{"suiteType": "@smoke"}]`
    #[serde(default)]
    pub tags: Vec<BTreeMap<String, String>>,

    pub test_cases: Vec<TestCase>,
}

impl TestSuite {
    /// A suite is addressed by either its id or its name
    pub fn is_identified_by(&self, suite_id: &str, suite_name: &str) -> bool {
        (!self.id.is_empty() && self.id == suite_id)
            || (!self.suite_name.is_empty() && self.suite_name == suite_name)
    }

    /// Copy of this suite restricted to a single test case
    pub fn with_single_case(&self, case: TestCase) -> Self {
        Self {
            test_cases: vec![case],
            ..self.clone()
        }
    }

    /// Iterate over `(key, value)` pairs of every tag entry
    pub fn tag_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tags
            .iter()
            .flat_map(|m| m.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }
}

/// A test case: API request items or UI steps depending on its type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    #[serde(default)]
    pub id: String,

    pub name: String,

    #[serde(rename = "type")]
    pub case_type: CaseType,

    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub test_data: Vec<TestData>,

    #[serde(default)]
    pub test_steps: Vec<TestStep>,

    #[serde(default)]
    pub depends_on: Vec<String>,

    #[serde(default)]
    pub priority: Option<Value>,
}

impl TestCase {
    pub fn is_identified_by(&self, case_id: &str, case_name: &str) -> bool {
        (!self.id.is_empty() && self.id == case_id) || (!self.name.is_empty() && self.name == case_name)
    }
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_true() -> bool {
    true
}

/// One concrete API request scenario
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestData {
    #[serde(default)]
    pub name: String,

    #[serde(default = "default_method")]
    pub method: String,

    #[serde(default)]
    pub endpoint: String,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub body: Option<Value>,

    /// Path to a body file, relative to the suite file
    #[serde(default)]
    pub body_file: Option<String>,

    #[serde(default)]
    pub pre_process: Vec<PreProcessStep>,

    #[serde(default)]
    pub assertions: Vec<Assertion>,

    #[serde(default)]
    pub response_schema: Option<Value>,

    /// Takes precedence over `response_schema`
    #[serde(default)]
    pub response_schema_file: Option<String>,

    /// Variable name -> JSONPath into the response body
    #[serde(default)]
    pub store: BTreeMap<String, String>,
}

/// A named pre-processing function run before a request or step
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreProcessStep {
    pub function: String,

    #[serde(default)]
    pub args: Vec<Value>,

    #[serde(default)]
    pub var: Option<String>,

    /// Output key/column -> variable name
    #[serde(default)]
    pub map_to: Option<BTreeMap<String, String>>,

    /// Scope the outputs are written to (global unless stated)
    #[serde(default)]
    pub scope: Option<Scope>,
}

/// One concrete UI automation action
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestStep {
    pub id: String,

    /// Keyword name; parsed into the closed keyword set at execution time
    pub keyword: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub locator: Option<LocatorDefinition>,

    #[serde(default)]
    pub value: Option<Value>,

    #[serde(default)]
    pub options: Map<String, Value>,

    #[serde(default)]
    pub custom_function: Option<CustomFunctionCall>,

    /// Source text kept for authoring tools; execution goes through a
    /// registered code plugin keyed by the step id.
    #[serde(default)]
    pub custom_code: Option<String>,

    #[serde(default)]
    pub pre_process: Vec<PreProcessStep>,

    /// Variable name -> output marker (`$text`, `$url`, ...) or result path
    #[serde(default)]
    pub store: BTreeMap<String, String>,

    #[serde(default)]
    pub local_store: BTreeMap<String, String>,

    #[serde(default)]
    pub skip_on_failure: bool,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl TestStep {
    /// Step value rendered as text; strings are taken verbatim
    pub fn value_text(&self) -> Option<String> {
        self.value.as_ref().map(value_to_text)
    }
}

/// Render a JSON value the way it is written into variables and inputs
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Invocation of a registered custom step or page-object method
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomFunctionCall {
    /// Registry key; `Page.method` addresses a page object
    pub function: String,

    #[serde(default)]
    pub args: Vec<Value>,
}

/// Declarative element locator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocatorDefinition {
    /// role|label|text|placeholder|altText|title|testId|css|xpath|locator
    pub strategy: String,

    #[serde(default)]
    pub value: String,

    #[serde(default)]
    pub options: LocatorOptions,

    /// Single legacy filter, applied before `filters`
    #[serde(default)]
    pub filter: Option<FilterDefinition>,

    #[serde(default)]
    pub filters: Vec<FilterDefinition>,

    #[serde(default)]
    pub chain: Vec<ChainOperation>,

    #[serde(default)]
    pub index: Option<IndexSelector>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocatorOptions {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub exact: Option<bool>,
    #[serde(default)]
    pub checked: Option<bool>,
    #[serde(default)]
    pub disabled: Option<bool>,
    #[serde(default)]
    pub expanded: Option<bool>,
    #[serde(default)]
    pub pressed: Option<bool>,
    #[serde(default)]
    pub selected: Option<bool>,
    #[serde(default)]
    pub include_hidden: Option<bool>,
    #[serde(default)]
    pub level: Option<u32>,
    #[serde(default)]
    pub has_text: Option<String>,
    #[serde(default)]
    pub has_not_text: Option<String>,
}

/// Narrowing filter applied to a locator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FilterDefinition {
    HasText { value: String },
    HasNotText { value: String },
    Has { locator: Box<LocatorDefinition> },
    HasNot { locator: Box<LocatorDefinition> },
    Visible,
    Hidden,
}

/// One step of a locator chain
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChainOperation {
    Locator { locator: Box<LocatorDefinition> },
    Filter { filter: FilterDefinition },
    Nth { index: i64 },
    First,
    Last,
}

/// Terminal index: `"first"`, `"last"` or a zero-based position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexSelector {
    Position(i64),
    Named(IndexKeyword),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKeyword {
    First,
    Last,
}

/// JSON-path / XPath assertion over an API response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assertion {
    #[serde(rename = "type")]
    pub kind: AssertionKind,

    #[serde(default)]
    pub json_path: Option<String>,

    #[serde(default)]
    pub xpath_expression: Option<String>,

    #[serde(default)]
    pub expected: Value,

    #[serde(default)]
    pub match_field: Option<String>,

    #[serde(default)]
    pub match_value: Option<Value>,

    #[serde(default)]
    pub assert_field: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssertionKind {
    Equals,
    NotEquals,
    Contains,
    StartsWith,
    EndsWith,
    GreaterThan,
    LessThan,
    In,
    NotIn,
    IncludesAll,
    Length,
    Size,
    StatusCode,
    Type,
    Exists,
    Regex,
    ArrayObjectMatch,
}

impl std::fmt::Display for AssertionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_default();
        write!(f, "{}", name)
    }
}

/// Variable scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Global,
    Local,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Global => "global",
            Scope::Local => "local",
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Scope {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "global" => Ok(Scope::Global),
            "local" => Ok(Scope::Local),
            other => Err(crate::Error::InvalidConfig(format!("unknown scope: {}", other))),
        }
    }
}

/// A persisted variable
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub id: String,
    pub name: String,
    pub value: String,
    pub scope: Scope,
    #[serde(default)]
    pub suite_id: Option<String>,
    #[serde(default)]
    pub test_case_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}
