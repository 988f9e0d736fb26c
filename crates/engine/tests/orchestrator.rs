//! End-to-end runs over suite files on disk

mod support;

use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use testforge_common::{Scope, VariableRegistry};
use testforge_engine::filter::SuiteFilters;
use testforge_engine::{EngineConfig, EngineError, Orchestrator, RetryPolicy, VariableStore};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use support::ScriptedFactory;

struct Workspace {
    _dir: tempfile::TempDir,
    config: EngineConfig,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let suites = dir.path().join("suites");
        std::fs::create_dir_all(&suites).unwrap();
        let config = EngineConfig {
            suites_dir: suites,
            reports_dir: dir.path().join("reports"),
            screenshot_dir: dir.path().join("screenshots"),
            registry_path: None,
            retry: RetryPolicy::none(),
            ..EngineConfig::default()
        };
        Self { _dir: dir, config }
    }

    fn write_suite(&self, file: &str, suite: &Value) {
        std::fs::write(self.config.suites_dir.join(file), suite.to_string()).unwrap();
    }

    fn orchestrator(&self, factory: &ScriptedFactory) -> Orchestrator {
        Orchestrator::new(self.config.clone())
            .unwrap()
            .with_driver_factory(Arc::new(factory.clone()))
    }
}

fn api_suite(base_url: &str) -> Value {
    json!({
        "id": "s-api",
        "suiteName": "Accounts API",
        "applicationName": "Accounts",
        "type": "API",
        "baseUrl": base_url,
        "tags": [{"suiteType": "@smoke"}, {"serviceName": "@accounts"}],
        "testCases": [
            {"id": "tc-list", "name": "List users", "type": "REST",
             "testData": [
                 {"name": "all", "endpoint": "/users", "assertions": [{"type": "statusCode", "expected": 200}]},
                 {"name": "missing", "endpoint": "/nope", "assertions": [{"type": "statusCode", "expected": 200}]}
             ]},
            {"id": "tc-health", "name": "Health", "type": "REST",
             "testData": [{"name": "ping", "endpoint": "/health"}]}
        ]
    })
}

fn ui_suite() -> Value {
    json!({
        "id": "s-ui",
        "suiteName": "Storefront UI",
        "applicationName": "Storefront",
        "type": "UI",
        "baseUrl": "https://shop.example.com",
        "tags": [{"suiteType": "@regression"}],
        "testCases": [
            {"id": "tc-home", "name": "Home", "type": "UI", "testSteps": [
                {"id": "open", "keyword": "goto", "value": "/"},
                {"id": "read", "keyword": "getTitle", "localStore": {"pageTitle": "$title"}}
            ]}
        ]
    })
}

async fn mock_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "up"})))
        .mount(&server)
        .await;
    server
}

fn read_report(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn test_run_all_suites() {
    let server = mock_server().await;
    let ws = Workspace::new();
    ws.write_suite("accounts.json", &api_suite(&server.uri()));
    ws.write_suite("storefront.json", &ui_suite());
    std::fs::write(ws.config.suites_dir.join("broken.json"), "{ not a suite").unwrap();

    let factory = ScriptedFactory::new(|call| match call.method.as_str() {
        "title" => Ok(json!("Shop")),
        _ => Ok(Value::Null),
    });
    let orchestrator = ws.orchestrator(&factory);
    let outcome = orchestrator.run(None).await.unwrap();

    // 3 API items + 2 UI steps + 1 unreadable suite
    assert_eq!(outcome.summary.total, 6);
    assert_eq!(outcome.summary.passed, 4);
    assert_eq!(outcome.summary.failed, 2);
    assert!(!outcome.summary.success());
    assert_eq!(outcome.reports.len(), 2);

    let api_report = outcome
        .reports
        .iter()
        .map(|p| read_report(p))
        .find(|r| r["summary"]["suiteName"] == "Accounts API")
        .unwrap();
    assert_eq!(api_report["summary"]["totalTestCases"], 2);
    assert_eq!(api_report["summary"]["totalDataSets"], 3);
    assert_eq!(api_report["summary"]["failed"], 1);
    assert_eq!(api_report["results"][0]["status"], "PASS");
    assert_eq!(api_report["results"][1]["status"], "FAIL");
    assert_eq!(api_report["results"][1]["response"]["status"], 404);

    // locals are gone once the run is over
    let scope = orchestrator.variables().scope("s-ui", "tc-home");
    assert_eq!(scope.get("pageTitle"), None);
}

#[tokio::test]
async fn test_filters_skip_suites() {
    let server = mock_server().await;
    let ws = Workspace::new();
    ws.write_suite("accounts.json", &api_suite(&server.uri()));
    ws.write_suite("storefront.json", &ui_suite());

    let factory = ScriptedFactory::passive();
    let filters: SuiteFilters = [("suiteType".to_string(), "@smoke".to_string())].into_iter().collect();
    let outcome = ws.orchestrator(&factory).with_filters(filters).run(None).await.unwrap();

    assert_eq!(outcome.skipped_suites, vec!["Storefront UI".to_string()]);
    assert_eq!(outcome.reports.len(), 1);
    assert_eq!(factory.launches(), 0);

    // a filtered target is skipped, not failed
    let filters: SuiteFilters = [("testType".to_string(), "UI".to_string())].into_iter().collect();
    let outcome = ws
        .orchestrator(&factory)
        .with_filters(filters)
        .run(Some("s-api:Accounts API"))
        .await
        .unwrap();
    assert_eq!(outcome.skipped_suites, vec!["Accounts API".to_string()]);
    assert_eq!(outcome.summary.total, 0);
    assert!(outcome.summary.success());
}

#[tokio::test]
async fn test_test_case_target() {
    let server = mock_server().await;
    let ws = Workspace::new();
    ws.write_suite("accounts.json", &api_suite(&server.uri()));

    let outcome = ws
        .orchestrator(&ScriptedFactory::passive())
        .run(Some("unknown:Accounts API > tc-health:whatever"))
        .await
        .unwrap();

    assert_eq!(outcome.summary.total, 1);
    assert_eq!(outcome.summary.passed, 1);
    let report = read_report(&outcome.reports[0]);
    assert_eq!(report["results"][0]["testCaseId"], "tc-health");

    let err = ws
        .orchestrator(&ScriptedFactory::passive())
        .run(Some("s-api:Accounts API > tc-x:No such case"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::TestCaseNotFound { .. }));
}

#[tokio::test]
async fn test_test_data_target() {
    let server = mock_server().await;
    let ws = Workspace::new();
    ws.write_suite("accounts.json", &api_suite(&server.uri()));
    ws.write_suite("storefront.json", &ui_suite());
    let factory = ScriptedFactory::passive();

    let outcome = ws
        .orchestrator(&factory)
        .run(Some("s-api:Accounts API > tc-list:List users > 1:missing"))
        .await
        .unwrap();
    assert_eq!(outcome.summary.total, 1);
    assert_eq!(outcome.summary.failed, 1);
    let report = read_report(&outcome.reports[0]);
    assert_eq!(report["results"][0]["index"], 1);
    assert_eq!(report["results"][0]["name"], "missing");

    // out-of-range index falls back to the data name
    let outcome = ws
        .orchestrator(&factory)
        .run(Some("s-api:Accounts API > tc-list:List users > 9:all"))
        .await
        .unwrap();
    assert_eq!(outcome.summary.passed, 1);

    let err = ws
        .orchestrator(&factory)
        .run(Some("s-ui:Storefront UI > tc-home:Home > 0:first"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::UnsupportedTarget(_)));
    assert_eq!(factory.launches(), 0);
}

#[tokio::test]
async fn test_invalid_targets() {
    let ws = Workspace::new();
    ws.write_suite("storefront.json", &ui_suite());
    let orchestrator = ws.orchestrator(&ScriptedFactory::passive());

    assert!(matches!(
        orchestrator.run(Some("no-separator")).await,
        Err(EngineError::TargetFormat(_))
    ));
    assert!(matches!(
        orchestrator.run(Some("s-x:Nowhere")).await,
        Err(EngineError::SuiteNotFound(_))
    ));
}

#[tokio::test]
async fn test_registry_locals_swept_after_run() {
    let ws = Workspace::new();
    ws.write_suite("storefront.json", &ui_suite());

    let registry_dir = tempfile::tempdir().unwrap();
    let registry = VariableRegistry::open(registry_dir.path().join("vars.db")).unwrap();
    let vars = VariableStore::with_registry(registry.clone());
    vars.set_global("env", "staging");

    let factory = ScriptedFactory::new(|call| match call.method.as_str() {
        "title" => Ok(json!("Shop")),
        _ => Ok(Value::Null),
    });
    let outcome = ws
        .orchestrator(&factory)
        .with_variables(vars)
        .run(Some("s-ui:Storefront UI"))
        .await
        .unwrap();
    assert_eq!(outcome.summary.passed, 2);

    assert!(registry.list(Some(Scope::Local)).unwrap().is_empty());
    assert_eq!(registry.list(Some(Scope::Global)).unwrap().len(), 1);
}
