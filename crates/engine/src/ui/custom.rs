//! Extension points: registered custom steps, page objects and code plugins
//!
//! `customStep` looks up `customFunction.function` in the registry. A
//! dot-qualified name (`LoginPage.signIn`) resolves the part before the dot
//! to a page-object factory; a fresh instance bound to the active page is
//! created for every call.
//!
//! `customCode` runs the [`CodePlugin`] registered under the step id (or
//! under `options.plugin`). The step's `customCode` source text is never
//! evaluated.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::actions::StepContext;
use super::session::PageId;
use crate::error::{EngineError, EngineResult};

#[async_trait]
pub trait CustomStep: Send + Sync {
    async fn execute(&self, ctx: &mut StepContext<'_>, args: &[Value]) -> EngineResult<Value>;
}

#[async_trait]
pub trait PageObject: Send {
    async fn call(&mut self, method: &str, ctx: &mut StepContext<'_>, args: &[Value]) -> EngineResult<Value>;
}

/// Builds a page object for the given active page
pub type PageObjectFactory = Arc<dyn Fn(&PageId) -> Box<dyn PageObject> + Send + Sync>;

#[async_trait]
pub trait CodePlugin: Send + Sync {
    async fn run(&self, ctx: &mut StepContext<'_>) -> EngineResult<Value>;
}

#[derive(Clone, Default)]
pub struct CustomRegistry {
    steps: HashMap<String, Arc<dyn CustomStep>>,
    page_objects: HashMap<String, PageObjectFactory>,
    code: HashMap<String, Arc<dyn CodePlugin>>,
}

impl CustomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_step(&mut self, name: impl Into<String>, step: impl CustomStep + 'static) -> &mut Self {
        self.steps.insert(name.into(), Arc::new(step));
        self
    }

    pub fn register_page_object<F>(&mut self, class: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&PageId) -> Box<dyn PageObject> + Send + Sync + 'static,
    {
        self.page_objects.insert(class.into(), Arc::new(factory));
        self
    }

    pub fn register_code(&mut self, key: impl Into<String>, plugin: impl CodePlugin + 'static) -> &mut Self {
        self.code.insert(key.into(), Arc::new(plugin));
        self
    }

    pub async fn run_step(&self, name: &str, ctx: &mut StepContext<'_>, args: &[Value]) -> EngineResult<Value> {
        if let Some(step) = self.steps.get(name).cloned() {
            debug!("Custom step '{}'", name);
            return step.execute(ctx, args).await;
        }

        if let Some((class, method)) = name.split_once('.') {
            let factory = self
                .page_objects
                .get(class)
                .cloned()
                .ok_or_else(|| EngineError::CustomStepNotFound(name.to_string()))?;
            let page = ctx.session.page().await?;
            let mut object = factory(&page);
            debug!("Page object {}.{} on {}", class, method, page);
            return object.call(method, ctx, args).await;
        }

        Err(EngineError::CustomStepNotFound(name.to_string()))
    }

    pub async fn run_code(&self, ctx: &mut StepContext<'_>, timeout: Duration) -> EngineResult<Value> {
        let step = ctx.step;
        let plugin = self
            .code
            .get(&step.id)
            .or_else(|| {
                step.options
                    .get("plugin")
                    .and_then(Value::as_str)
                    .and_then(|key| self.code.get(key))
            })
            .cloned()
            .ok_or_else(|| EngineError::CustomStepNotFound(format!("customCode plugin for step '{}'", step.id)))?;

        match tokio::time::timeout(timeout, plugin.run(ctx)).await {
            Err(_) => Err(EngineError::CustomCodeTimeout(format!(
                "step '{}' did not finish within {}ms",
                step.id,
                timeout.as_millis()
            ))),
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(categorize(e)),
        }
    }
}

/// Sort a code plugin failure into timeout, locator or assertion errors
pub fn categorize(error: EngineError) -> EngineError {
    match error {
        EngineError::CustomCodeTimeout(_)
        | EngineError::CustomCodeLocator(_)
        | EngineError::CustomCodeAssertion(_)
        | EngineError::CustomCode(_) => error,
        EngineError::Timeout(msg) => EngineError::CustomCodeTimeout(msg),
        EngineError::AssertionFailed(msg) => EngineError::CustomCodeAssertion(msg),
        other => {
            let message = other.to_string();
            let lower = message.to_lowercase();
            if lower.contains("timeout") || lower.contains("timed out") {
                EngineError::CustomCodeTimeout(message)
            } else if lower.contains("locator")
                || lower.contains("selector")
                || lower.contains("element")
                || lower.contains("strict mode violation")
            {
                EngineError::CustomCodeLocator(message)
            } else if lower.contains("expect") || lower.contains("assert") {
                EngineError::CustomCodeAssertion(message)
            } else {
                EngineError::CustomCode(message)
            }
        }
    }
}

/// Dotted path into a result value; numeric segments index arrays
pub fn result_path(value: &Value, path: &str) -> Option<Value> {
    let mut current = value;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        current = match current {
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            Value::Object(fields) => fields.get(segment)?,
            _ => return None,
        };
    }
    Some(current.clone())
}
