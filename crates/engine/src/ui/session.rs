//! Automation driver seam and the per-test-case browser session

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};

/// Page handle issued by the driver
pub type PageId = String;

/// Object a driver call is addressed to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CallTarget {
    /// Browser context: `newPage`, `pages`
    Context,
    Page { page: PageId },
    Locator { page: PageId, selector: String },
    Keyboard { page: PageId },
    /// Expectation on a locator, or on the page when `selector` is absent
    Expect {
        page: PageId,
        selector: Option<String>,
        negate: bool,
    },
}

/// One primitive invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverCall {
    pub target: CallTarget,
    pub method: String,
    pub args: Vec<Value>,
}

impl DriverCall {
    pub fn new(target: CallTarget, method: &str, args: Vec<Value>) -> Self {
        Self {
            target,
            method: method.to_string(),
            args,
        }
    }

    /// Selector of a locator or expect target
    pub fn selector(&self) -> Option<&str> {
        match &self.target {
            CallTarget::Locator { selector, .. } => Some(selector),
            CallTarget::Expect { selector, .. } => selector.as_deref(),
            _ => None,
        }
    }
}

/// Argument that the driver turns back into a locator on the same page
pub fn locator_arg(selector: &str) -> Value {
    json!({ "$locator": selector })
}

/// Browser automation primitives
#[async_trait]
pub trait AutomationDriver: Send {
    /// Start the browser and return its first page
    async fn launch(&mut self) -> EngineResult<PageId>;

    async fn invoke(&mut self, call: DriverCall) -> EngineResult<Value>;

    async fn close(&mut self) -> EngineResult<()>;
}

/// Creates one driver per browser session
pub trait DriverFactory: Send + Sync {
    fn create(&self) -> EngineResult<Box<dyn AutomationDriver>>;
}

/// One browser and its active page cursor
///
/// The browser is launched lazily on the first page-level call. Tab and
/// popup keywords move the cursor through [`BrowserSession::switch_active_page`].
pub struct BrowserSession {
    factory: Arc<dyn DriverFactory>,
    driver: Option<Box<dyn AutomationDriver>>,
    pages: Vec<PageId>,
    active: Option<PageId>,
    screenshot_dir: PathBuf,
}

impl BrowserSession {
    pub fn new(factory: Arc<dyn DriverFactory>, screenshot_dir: PathBuf) -> Self {
        Self {
            factory,
            driver: None,
            pages: Vec::new(),
            active: None,
            screenshot_dir,
        }
    }

    pub fn is_open(&self) -> bool {
        self.driver.is_some()
    }

    pub async fn open(&mut self) -> EngineResult<()> {
        if self.driver.is_some() {
            return Ok(());
        }
        let mut driver = self.factory.create()?;
        let page = driver.launch().await?;
        info!("Browser launched (page {})", page);
        self.driver = Some(driver);
        self.pages = vec![page.clone()];
        self.active = Some(page);
        Ok(())
    }

    pub async fn close(&mut self) -> EngineResult<()> {
        self.pages.clear();
        self.active = None;
        if let Some(mut driver) = self.driver.take() {
            driver.close().await?;
            info!("Browser closed");
        }
        Ok(())
    }

    /// Active page, launching the browser if needed
    pub async fn page(&mut self) -> EngineResult<PageId> {
        self.open().await?;
        self.active.clone().ok_or(EngineError::NoActivePage)
    }

    pub fn active_page(&self) -> Option<&PageId> {
        self.active.as_ref()
    }

    pub fn main_page(&self) -> Option<&PageId> {
        self.pages.first()
    }

    pub fn pages(&self) -> &[PageId] {
        &self.pages
    }

    /// Make `page` the target of every following step
    pub fn switch_active_page(&mut self, page: PageId) {
        if !self.pages.contains(&page) {
            self.pages.push(page.clone());
        }
        debug!("Active page is now {}", page);
        self.active = Some(page);
    }

    /// Forget a closed page; the cursor falls back to the main page
    pub fn remove_page(&mut self, page: &str) {
        self.pages.retain(|p| p != page);
        if self.active.as_deref() == Some(page) {
            self.active = self.pages.first().cloned();
        }
    }

    pub async fn call(&mut self, call: DriverCall) -> EngineResult<Value> {
        let driver = self.driver.as_mut().ok_or(EngineError::NoActivePage)?;
        debug!("{:?}.{}", call.target, call.method);
        driver.invoke(call).await
    }

    pub async fn context_call(&mut self, method: &str, args: Vec<Value>) -> EngineResult<Value> {
        self.open().await?;
        self.call(DriverCall::new(CallTarget::Context, method, args)).await
    }

    pub async fn page_call(&mut self, method: &str, args: Vec<Value>) -> EngineResult<Value> {
        let page = self.page().await?;
        self.call(DriverCall::new(CallTarget::Page { page }, method, args)).await
    }

    pub async fn locator_call(&mut self, selector: &str, method: &str, args: Vec<Value>) -> EngineResult<Value> {
        let page = self.page().await?;
        let target = CallTarget::Locator {
            page,
            selector: selector.to_string(),
        };
        self.call(DriverCall::new(target, method, args)).await
    }

    pub async fn keyboard_call(&mut self, method: &str, args: Vec<Value>) -> EngineResult<Value> {
        let page = self.page().await?;
        self.call(DriverCall::new(CallTarget::Keyboard { page }, method, args)).await
    }

    pub async fn expect(
        &mut self,
        selector: Option<&str>,
        negate: bool,
        method: &str,
        args: Vec<Value>,
    ) -> EngineResult<()> {
        let page = self.page().await?;
        let target = CallTarget::Expect {
            page,
            selector: selector.map(String::from),
            negate,
        };
        self.call(DriverCall::new(target, method, args)).await?;
        Ok(())
    }

    /// Full-page screenshot of the active page
    pub async fn screenshot(&mut self, name: &str) -> EngineResult<PathBuf> {
        std::fs::create_dir_all(&self.screenshot_dir)?;
        let file: String = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let path = self.screenshot_dir.join(format!("{}.png", file));
        self.page_call(
            "screenshot",
            vec![json!({ "path": path.to_string_lossy(), "fullPage": true })],
        )
        .await?;
        Ok(path)
    }
}
