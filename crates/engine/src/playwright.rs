//! Playwright browser automation
//!
//! [`PlaywrightDriver`] writes a small Node bridge script to a temp dir and
//! keeps it running for the whole browser session. Requests and responses
//! are single JSON lines over the child's stdin/stdout:
//!
//! ```text
//! -> {"id":3,"target":{"kind":"locator","page":"page-1","selector":"css=#go"},"method":"click","args":[{}]}
//! <- {"id":3,"ok":true,"result":null}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::ui::session::{AutomationDriver, DriverCall, DriverFactory, PageId};
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaywrightConfig {
    pub browser: Browser,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Node executable used to run the bridge
    pub node_binary: String,
    /// Default timeout applied to every page action
    pub action_timeout_ms: u64,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            node_binary: "node".to_string(),
            action_timeout_ms: 30_000,
        }
    }
}

const BRIDGE_SCRIPT: &str = r#"
const playwright = require('playwright');
let expect = null;
try { expect = require('@playwright/test').expect; } catch (_) {}
const readline = require('readline');

let browser = null;
let context = null;
const pages = new Map();
let seq = 0;

function idOf(page) {
  if (!page.__testforgeId) {
    const id = 'page-' + (++seq);
    page.__testforgeId = id;
    pages.set(id, page);
    page.on('close', () => pages.delete(id));
  }
  return page.__testforgeId;
}

function pageOf(id) {
  const page = pages.get(id);
  if (!page) throw new Error('Unknown page: ' + id);
  return page;
}

function revive(page, arg) {
  if (arg && typeof arg === 'object' && !Array.isArray(arg) && typeof arg.$locator === 'string') {
    return page.locator(arg.$locator);
  }
  return arg;
}

function plain(value) {
  if (value === undefined) return null;
  if (Buffer.isBuffer(value)) return null;
  if (value && typeof value === 'object' && typeof value.goto === 'function') return idOf(value);
  return value;
}

async function handle(msg) {
  const { target, method } = msg;
  const args = msg.args || [];
  switch (target.kind) {
    case 'launch': {
      const cfg = args[0];
      browser = await playwright[cfg.browser].launch({ headless: cfg.headless });
      context = await browser.newContext({ viewport: { width: cfg.width, height: cfg.height } });
      context.setDefaultTimeout(cfg.timeout);
      return idOf(await context.newPage());
    }
    case 'close': {
      if (browser) await browser.close();
      browser = null;
      return null;
    }
    case 'context': {
      if (method === 'newPage') return idOf(await context.newPage());
      if (method === 'pages') return context.pages().map(idOf);
      return plain(await context[method](...args));
    }
    case 'page': {
      const page = pageOf(target.page);
      if (method === 'waitForPopup') return idOf(await page.waitForEvent('popup', args[0] || {}));
      if (method === 'acceptNextDialog') { page.once('dialog', d => d.accept(args[0])); return null; }
      if (method === 'dismissNextDialog') { page.once('dialog', d => d.dismiss()); return null; }
      return plain(await page[method](...args.map(a => revive(page, a))));
    }
    case 'locator': {
      const page = pageOf(target.page);
      const locator = page.locator(target.selector);
      return plain(await locator[method](...args.map(a => revive(page, a))));
    }
    case 'keyboard':
      return plain(await pageOf(target.page).keyboard[method](...args));
    case 'expect': {
      if (!expect) throw new Error('expect is unavailable; install @playwright/test');
      const page = pageOf(target.page);
      let subject = expect(target.selector ? page.locator(target.selector) : page);
      if (target.negate) subject = subject.not;
      await subject[method](...args);
      return null;
    }
    default:
      throw new Error('Unknown target: ' + target.kind);
  }
}

const rl = readline.createInterface({ input: process.stdin });
rl.on('line', async (line) => {
  let msg;
  try { msg = JSON.parse(line); } catch (_) { return; }
  try {
    const result = await handle(msg);
    process.stdout.write(JSON.stringify({ id: msg.id, ok: true, result }) + '\n');
  } catch (error) {
    process.stdout.write(JSON.stringify({ id: msg.id, ok: false, error: String(error && error.message || error) }) + '\n');
  }
});
rl.on('close', async () => { if (browser) await browser.close(); process.exit(0); });
"#;

#[derive(Debug, Deserialize)]
struct BridgeResponse {
    id: u64,
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

/// Long-lived Node bridge speaking JSON lines
pub struct PlaywrightDriver {
    config: PlaywrightConfig,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: Option<Lines<BufReader<ChildStdout>>>,
    script_dir: Option<tempfile::TempDir>,
    next_id: u64,
}

impl PlaywrightDriver {
    pub fn new(config: PlaywrightConfig) -> Self {
        Self {
            config,
            child: None,
            stdin: None,
            stdout: None,
            script_dir: None,
            next_id: 0,
        }
    }

    /// Check that the `playwright` package resolves for the node binary
    async fn check_playwright_installed(&self) -> EngineResult<()> {
        let status = Command::new(&self.config.node_binary)
            .args(["-e", "require.resolve('playwright')"])
            .envs(node_path())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(EngineError::PlaywrightNotFound),
        }
    }

    async fn spawn(&mut self) -> EngineResult<()> {
        self.check_playwright_installed().await?;

        let dir = tempfile::tempdir()?;
        let script_path = dir.path().join("bridge.js");
        std::fs::write(&script_path, BRIDGE_SCRIPT)?;
        debug!("Starting Playwright bridge: {}", script_path.display());

        let mut child = Command::new(&self.config.node_binary)
            .arg(&script_path)
            .envs(node_path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Driver("bridge stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Driver("bridge stdout unavailable".to_string()))?;

        self.stdin = Some(stdin);
        self.stdout = Some(BufReader::new(stdout).lines());
        self.child = Some(child);
        self.script_dir = Some(dir);
        Ok(())
    }

    async fn request(&mut self, target: Value, method: &str, args: Vec<Value>) -> EngineResult<Value> {
        self.next_id += 1;
        let id = self.next_id;
        let line = serde_json::to_string(&json!({
            "id": id,
            "target": target,
            "method": method,
            "args": args,
        }))?;

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| EngineError::Driver("bridge not running".to_string()))?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;

        let stdout = self
            .stdout
            .as_mut()
            .ok_or_else(|| EngineError::Driver("bridge not running".to_string()))?;
        while let Some(line) = stdout.next_line().await? {
            let response: BridgeResponse = match serde_json::from_str(&line) {
                Ok(response) => response,
                Err(_) => {
                    debug!("[bridge] {}", line);
                    continue;
                }
            };
            if response.id != id {
                warn!("Discarding stale bridge response {}", response.id);
                continue;
            }
            return if response.ok {
                Ok(response.result)
            } else {
                Err(EngineError::Driver(
                    response.error.unwrap_or_else(|| format!("{} failed", method)),
                ))
            };
        }

        Err(EngineError::Driver("Playwright bridge exited".to_string()))
    }
}

/// Let the bridge resolve packages installed in the working directory
fn node_path() -> Vec<(String, String)> {
    let mut paths = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join("node_modules").to_string_lossy().into_owned());
    }
    if let Ok(existing) = std::env::var("NODE_PATH") {
        paths.push(existing);
    }
    let separator = if cfg!(windows) { ";" } else { ":" };
    vec![("NODE_PATH".to_string(), paths.join(separator))]
}

#[async_trait]
impl AutomationDriver for PlaywrightDriver {
    async fn launch(&mut self) -> EngineResult<PageId> {
        if self.child.is_none() {
            self.spawn().await?;
        }
        let config = json!({
            "browser": self.config.browser.as_str(),
            "headless": self.config.headless,
            "width": self.config.viewport_width,
            "height": self.config.viewport_height,
            "timeout": self.config.action_timeout_ms,
        });
        let page = self.request(json!({"kind": "launch"}), "launch", vec![config]).await?;
        info!("Launched {} (headless: {})", self.config.browser.as_str(), self.config.headless);
        page.as_str()
            .map(String::from)
            .ok_or_else(|| EngineError::Driver(format!("launch returned {}", page)))
    }

    async fn invoke(&mut self, call: DriverCall) -> EngineResult<Value> {
        let target = serde_json::to_value(&call.target)?;
        self.request(target, &call.method, call.args).await
    }

    async fn close(&mut self) -> EngineResult<()> {
        if self.child.is_some() {
            if let Err(e) = self.request(json!({"kind": "close"}), "close", vec![]).await {
                warn!("Bridge close failed: {}", e);
            }
        }
        self.stdin = None;
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            child.kill().await.ok();
        }
        self.script_dir = None;
        Ok(())
    }
}

/// Creates a [`PlaywrightDriver`] per browser session
#[derive(Debug, Clone, Default)]
pub struct PlaywrightFactory {
    config: PlaywrightConfig,
}

impl PlaywrightFactory {
    pub fn new(config: PlaywrightConfig) -> Self {
        Self { config }
    }
}

impl DriverFactory for PlaywrightFactory {
    fn create(&self) -> EngineResult<Box<dyn AutomationDriver>> {
        Ok(Box::new(PlaywrightDriver::new(self.config.clone())))
    }
}
