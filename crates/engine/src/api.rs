//! API request executor
//!
//! Runs every test data item of an API test case in order. Each item yields
//! exactly one [`ReportEntry`], whatever goes wrong while running it.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use testforge_common::{CaseType, TestCase, TestData, TestSuite};
use tracing::{debug, info, warn};

use crate::assertion::{evaluate_json_assertions, select, AssertionOutcome};
use crate::error::{EngineError, EngineResult};
use crate::preprocess::PreProcessor;
use crate::reporter::{ReportEntry, ResponseSnapshot, Status, UnitKind};
use crate::schema::validate_response_schema;
use crate::variables::{VariableScope, VariableStore};
use crate::xpath::evaluate_xpath_assertions;

/// Request body ready to send
enum RequestBody {
    Json(Value),
    Text(String),
}

/// Executes API test data against live endpoints
pub struct ApiExecutor {
    client: reqwest::Client,
    vars: VariableStore,
    preprocessor: Arc<PreProcessor>,
    base_dir: PathBuf,
}

impl ApiExecutor {
    pub fn new(vars: VariableStore, preprocessor: Arc<PreProcessor>, timeout: Duration) -> EngineResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            vars,
            preprocessor,
            base_dir: PathBuf::from("."),
        })
    }

    /// Directory that `bodyFile` and `responseSchemaFile` are relative to
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
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
        info!("Running test case: {} ({} items)", case.name, case.test_data.len());
        let mut entries = Vec::with_capacity(case.test_data.len());
        for (index, data) in case.test_data.iter().enumerate() {
            entries.push(self.run_data(suite, case, index, data).await);
        }
        entries
    }

    /// Run the test data item at `index` of `case`
    pub async fn run_test_data(&self, suite: &TestSuite, case: &TestCase, index: usize) -> EngineResult<ReportEntry> {
        let data = case.test_data.get(index).ok_or_else(|| EngineError::TestDataNotFound {
            case: case.name.clone(),
            data: index.to_string(),
        })?;
        Ok(self.run_data(suite, case, index, data).await)
    }

    async fn run_data(&self, suite: &TestSuite, case: &TestCase, index: usize, data: &TestData) -> ReportEntry {
        let started = Instant::now();
        let vars = self.vars.scope(&suite.id, &case.id);

        let mut entry = ReportEntry {
            suite_id: suite.id.clone(),
            suite_name: suite.suite_name.clone(),
            test_case_id: case.id.clone(),
            test_case_name: case.name.clone(),
            unit: UnitKind::TestData,
            index,
            name: if data.name.is_empty() {
                format!("{} {}", data.method, data.endpoint)
            } else {
                data.name.clone()
            },
            status: Status::Fail,
            assertions_passed: 0,
            assertions_failed: 0,
            duration_ms: 0,
            error: None,
            response: None,
            screenshot: None,
        };

        let mut outcome = AssertionOutcome::default();
        let result = self
            .execute(suite, case, data, &vars, &mut outcome, &mut entry)
            .await;

        entry.assertions_passed = outcome.passed;
        entry.assertions_failed = outcome.failed;
        entry.duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(()) if outcome.failed == 0 => entry.status = Status::Pass,
            Ok(()) => {
                entry.status = Status::Fail;
                entry.error = Some(outcome.errors.join("; "));
            }
            Err(e) => {
                warn!("Test data '{}' failed: {}", entry.name, e);
                let mut message = e.to_string();
                if !outcome.errors.is_empty() {
                    message = format!("{}; {}", message, outcome.errors.join("; "));
                }
                entry.status = Status::Fail;
                entry.error = Some(message);
            }
        }

        debug!(
            "Test data '{}': {:?} ({} passed, {} failed)",
            entry.name, entry.status, entry.assertions_passed, entry.assertions_failed
        );
        entry
    }

    async fn execute(
        &self,
        suite: &TestSuite,
        case: &TestCase,
        data: &TestData,
        vars: &VariableScope,
        outcome: &mut AssertionOutcome,
        entry: &mut ReportEntry,
    ) -> EngineResult<()> {
        let url = vars.inject(&format!("{}{}", suite.base_url, data.endpoint));
        self.preprocessor.run_all(&data.pre_process, vars).await?;

        let headers: BTreeMap<String, String> = data
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), vars.inject(v)))
            .collect();

        let soap = case.case_type == CaseType::Soap || is_soap_request(&headers);
        let body = self.load_body(data, soap, vars)?;
        let schema = if soap { None } else { self.load_schema(data)? };

        let method = Method::from_bytes(data.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| EngineError::Request(format!("invalid HTTP method: {}", data.method)))?;

        info!("{} {}", method, url);
        let mut request = self.client.request(method, &url).headers(header_map(&headers)?);
        request = match body {
            Some(RequestBody::Json(json)) => request.json(&json),
            Some(RequestBody::Text(text)) => request.body(text),
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| EngineError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        let response_headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
            .collect();
        let text = response
            .text()
            .await
            .map_err(|e| EngineError::Request(e.to_string()))?;
        let parsed: Option<Value> = serde_json::from_str(&text).ok();

        entry.response = Some(ResponseSnapshot::new(status, response_headers, &text, parsed.as_ref()));

        if soap {
            outcome.merge(evaluate_xpath_assertions(&data.assertions, &text, status, vars));
        } else {
            if let Some(schema) = &schema {
                outcome.merge(validate_response_schema(schema, parsed.as_ref()));
            }
            outcome.merge(evaluate_json_assertions(&data.assertions, parsed.as_ref(), status, vars));
        }

        store_values(data, parsed.as_ref(), vars, outcome);
        Ok(())
    }

    fn load_body(&self, data: &TestData, soap: bool, vars: &VariableScope) -> EngineResult<Option<RequestBody>> {
        if let Some(file) = &data.body_file {
            let raw = read_relative(&self.base_dir, file)?;
            if soap {
                return Ok(Some(RequestBody::Text(vars.inject(&raw))));
            }
            let json: Value = serde_json::from_str(&raw)
                .map_err(|e| EngineError::SuiteLoad(format!("body file {}: {}", file, e)))?;
            return Ok(Some(RequestBody::Json(vars.inject_value(&json))));
        }

        Ok(match &data.body {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) if soap => Some(RequestBody::Text(vars.inject(text))),
            Some(json) => Some(RequestBody::Json(vars.inject_value(json))),
        })
    }

    fn load_schema(&self, data: &TestData) -> EngineResult<Option<Value>> {
        if let Some(file) = &data.response_schema_file {
            let raw = read_relative(&self.base_dir, file)?;
            let schema = serde_json::from_str(&raw)
                .map_err(|e| EngineError::SuiteLoad(format!("schema file {}: {}", file, e)))?;
            return Ok(Some(schema));
        }
        Ok(data.response_schema.clone())
    }
}

/// SOAP when the content type mentions xml/soap or a SOAPAction header is set
pub fn is_soap_request(headers: &BTreeMap<String, String>) -> bool {
    headers.iter().any(|(name, value)| {
        let name = name.to_ascii_lowercase();
        if name == "soapaction" {
            return true;
        }
        let value = value.to_ascii_lowercase();
        name == CONTENT_TYPE.as_str() && (value.contains("xml") || value.contains("soap"))
    })
}

fn header_map(headers: &BTreeMap<String, String>) -> EngineResult<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| EngineError::Request(format!("invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| EngineError::Request(format!("invalid header value for '{}': {}", name, e)))?;
        map.insert(name, value);
    }
    Ok(map)
}

fn read_relative(base: &Path, file: &str) -> EngineResult<String> {
    let path = base.join(file);
    std::fs::read_to_string(&path)
        .map_err(|e| EngineError::SuiteLoad(format!("cannot read {}: {}", path.display(), e)))
}

/// Store directives write globals; a path that selects nothing is a failure
fn store_values(data: &TestData, body: Option<&Value>, vars: &VariableScope, outcome: &mut AssertionOutcome) {
    for (name, path) in &data.store {
        let path = vars.inject(path);
        let selected = match body {
            Some(body) => select(body, &path),
            None => Err("response body is not JSON".to_string()),
        };
        match selected {
            Ok(Some(value)) => {
                let text = testforge_common::value_to_text(&value);
                debug!("Stored '{}' from {}", name, path);
                vars.set_global(name, &text);
            }
            Ok(None) => outcome.fail(format!("store {}: nothing matched {}", name, path)),
            Err(e) => outcome.fail(format!("store {}: {}", name, e)),
        }
    }
}
