//! Scripted automation driver shared by the integration tests

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use testforge_engine::ui::{AutomationDriver, DriverCall, DriverFactory, PageId};
use testforge_engine::EngineResult;

type Responder = dyn Fn(&DriverCall) -> EngineResult<Value> + Send + Sync;

/// Records every call and answers through a closure
#[derive(Clone)]
pub struct ScriptedFactory {
    calls: Arc<Mutex<Vec<DriverCall>>>,
    launches: Arc<AtomicUsize>,
    respond: Arc<Responder>,
}

#[allow(dead_code)]
impl ScriptedFactory {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(&DriverCall) -> EngineResult<Value> + Send + Sync + 'static,
    {
        Self {
            calls: Arc::default(),
            launches: Arc::default(),
            respond: Arc::new(respond),
        }
    }

    /// Every call answers `null`
    pub fn passive() -> Self {
        Self::new(|_| Ok(Value::Null))
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.calls.lock().clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.method.clone()).collect()
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

impl DriverFactory for ScriptedFactory {
    fn create(&self) -> EngineResult<Box<dyn AutomationDriver>> {
        Ok(Box::new(ScriptedDriver {
            factory: self.clone(),
        }))
    }
}

struct ScriptedDriver {
    factory: ScriptedFactory,
}

#[async_trait]
impl AutomationDriver for ScriptedDriver {
    async fn launch(&mut self) -> EngineResult<PageId> {
        let n = self.factory.launches.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("page-{}", n))
    }

    async fn invoke(&mut self, call: DriverCall) -> EngineResult<Value> {
        self.factory.calls.lock().push(call.clone());
        (self.factory.respond)(&call)
    }

    async fn close(&mut self) -> EngineResult<()> {
        Ok(())
    }
}
