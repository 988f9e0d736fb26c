//! Keyword dispatch
//!
//! Every keyword maps to one or a few driver calls on the active page.
//! Extraction keywords return their output so the interpreter can store it.

use serde_json::{json, Map, Value};
use std::time::Duration;
use testforge_common::{value_to_text, LocatorDefinition, TestStep};
use tracing::{debug, info};

use super::custom::CustomRegistry;
use super::keyword::Keyword;
use super::locator;
use super::session::{locator_arg, BrowserSession, CallTarget, DriverCall};
use super::table;
use crate::assertion::as_number;
use crate::error::{EngineError, EngineResult};
use crate::variables::VariableScope;

/// Everything a keyword handler can touch while running one step
pub struct StepContext<'a> {
    pub session: &'a mut BrowserSession,
    /// Step with variables already injected
    pub step: &'a TestStep,
    pub vars: &'a VariableScope,
    pub base_url: &'a str,
    pub custom: &'a CustomRegistry,
    pub code_timeout: Duration,
}

impl StepContext<'_> {
    /// Resolved selector of the step locator
    pub fn selector(&self) -> EngineResult<String> {
        let def = self.step.locator.as_ref().ok_or_else(|| EngineError::MissingLocator {
            step: self.step.id.clone(),
        })?;
        locator::resolve(def)
    }

    pub fn value(&self) -> EngineResult<String> {
        self.step.value_text().ok_or_else(|| EngineError::MissingValue {
            step: self.step.id.clone(),
        })
    }

    pub fn option(&self, key: &str) -> Option<&Value> {
        self.step.options.get(key)
    }

    pub fn option_text(&self, key: &str) -> Option<String> {
        self.option(key).map(value_to_text)
    }

    pub fn option_number(&self, key: &str) -> Option<f64> {
        self.option(key).and_then(as_number)
    }

    /// `{timeout}` option object for primitives that accept one
    pub fn timeout_options(&self) -> Value {
        let mut opts = Map::new();
        if let Some(timeout) = self.option_number("timeout") {
            opts.insert("timeout".into(), json!(timeout as u64));
        }
        Value::Object(opts)
    }

    /// Relative URLs are resolved against the suite base URL
    pub fn url(&self, target: &str) -> String {
        if target.starts_with('/') && !self.base_url.is_empty() {
            format!("{}{}", self.base_url.trim_end_matches('/'), target)
        } else {
            target.to_string()
        }
    }

    fn value_number(&self) -> EngineResult<f64> {
        let raw = self.step.value.as_ref().ok_or_else(|| EngineError::MissingValue {
            step: self.step.id.clone(),
        })?;
        as_number(raw).ok_or_else(|| EngineError::MissingValue {
            step: self.step.id.clone(),
        })
    }
}

pub async fn execute(keyword: Keyword, ctx: &mut StepContext<'_>) -> EngineResult<Option<Value>> {
    use Keyword::*;

    match keyword {
        OpenBrowser => {
            ctx.session.open().await?;
            if let Some(url) = ctx.step.value_text() {
                let url = ctx.url(&url);
                ctx.session.page_call("goto", vec![json!(url)]).await?;
            }
        }
        CloseBrowser => ctx.session.close().await?,
        NewPage | OpenNewTab => {
            let page = page_id(ctx.session.context_call("newPage", vec![]).await?)?;
            ctx.session.switch_active_page(page);
            if let Some(url) = ctx.step.value_text() {
                let url = ctx.url(&url);
                ctx.session.page_call("goto", vec![json!(url)]).await?;
            }
        }
        ClosePage | CloseTab => close_page(ctx).await?,
        SetViewportSize => {
            let (width, height) = viewport(ctx)?;
            ctx.session
                .page_call("setViewportSize", vec![json!({"width": width, "height": height})])
                .await?;
        }
        Screenshot => {
            let name = ctx.step.value_text().unwrap_or_else(|| ctx.step.id.clone());
            let path = ctx.session.screenshot(&name).await?;
            info!("Screenshot saved: {}", path.display());
        }

        Goto => {
            let url = ctx.url(&ctx.value()?);
            let mut opts = ctx.timeout_options();
            if let Some(wait) = ctx.option("waitUntil") {
                opts["waitUntil"] = wait.clone();
            }
            ctx.session.page_call("goto", vec![json!(url), opts]).await?;
        }
        Reload => page_action(ctx, "reload", vec![]).await?,
        GoBack => page_action(ctx, "goBack", vec![]).await?,
        GoForward => page_action(ctx, "goForward", vec![]).await?,
        WaitForUrl => {
            let url = ctx.value()?;
            page_action(ctx, "waitForURL", vec![json!(url)]).await?
        }
        WaitForLoadState => {
            let state = ctx.step.value_text().unwrap_or_else(|| "load".to_string());
            page_action(ctx, "waitForLoadState", vec![json!(state)]).await?
        }

        Click => element(ctx, "click", vec![]).await?,
        DblClick => element(ctx, "dblclick", vec![]).await?,
        RightClick => {
            let selector = ctx.selector()?;
            let mut opts = ctx.timeout_options();
            opts["button"] = json!("right");
            ctx.session.locator_call(&selector, "click", vec![opts]).await?;
        }
        Fill => {
            let value = ctx.value()?;
            element(ctx, "fill", vec![json!(value)]).await?
        }
        Type => {
            let value = ctx.value()?;
            let selector = ctx.selector()?;
            let mut opts = ctx.timeout_options();
            if let Some(delay) = ctx.option_number("delay") {
                opts["delay"] = json!(delay as u64);
            }
            ctx.session
                .locator_call(&selector, "pressSequentially", vec![json!(value), opts])
                .await?;
        }
        Press => {
            let key = ctx.value()?;
            if ctx.step.locator.is_some() {
                element(ctx, "press", vec![json!(key)]).await?
            } else {
                ctx.session.keyboard_call("press", vec![json!(key)]).await?;
            }
        }
        Clear => element(ctx, "clear", vec![]).await?,
        Check => element(ctx, "check", vec![]).await?,
        Uncheck => element(ctx, "uncheck", vec![]).await?,
        SelectOption => {
            let value = ctx.step.value.clone().ok_or_else(|| EngineError::MissingValue {
                step: ctx.step.id.clone(),
            })?;
            element(ctx, "selectOption", vec![value]).await?
        }
        Hover => element(ctx, "hover", vec![]).await?,
        Focus => element(ctx, "focus", vec![]).await?,
        Blur => element(ctx, "blur", vec![]).await?,
        ScrollIntoView => element(ctx, "scrollIntoViewIfNeeded", vec![]).await?,
        DragAndDrop => {
            let target = ctx.option("target").cloned().ok_or_else(|| EngineError::MissingValue {
                step: ctx.step.id.clone(),
            })?;
            let target: LocatorDefinition = serde_json::from_value(target)?;
            let target = locator::resolve(&target)?;
            element(ctx, "dragTo", vec![locator_arg(&target)]).await?
        }
        UploadFile => {
            let files = ctx.step.value.clone().ok_or_else(|| EngineError::MissingValue {
                step: ctx.step.id.clone(),
            })?;
            element(ctx, "setInputFiles", vec![files]).await?
        }
        Tap => element(ctx, "tap", vec![]).await?,

        WaitForElement => wait_for(ctx, "visible").await?,
        WaitForElementHidden => wait_for(ctx, "hidden").await?,
        WaitForTimeout => {
            let ms = ctx
                .step
                .value
                .as_ref()
                .and_then(as_number)
                .or_else(|| ctx.option_number("timeout"))
                .ok_or_else(|| EngineError::MissingValue {
                    step: ctx.step.id.clone(),
                })?;
            debug!("Waiting {}ms", ms);
            tokio::time::sleep(Duration::from_millis(ms as u64)).await;
        }

        GetText => return query(ctx, "innerText", vec![]).await.map(Some),
        GetAttribute => {
            let name = attribute_name(ctx)?;
            return query(ctx, "getAttribute", vec![json!(name)]).await.map(Some);
        }
        GetTitle => return ctx.session.page_call("title", vec![]).await.map(Some),
        GetUrl => return ctx.session.page_call("url", vec![]).await.map(Some),
        GetValue => return query(ctx, "inputValue", vec![]).await.map(Some),
        GetCount => return query(ctx, "count", vec![]).await.map(Some),

        AssertVisible => expect(ctx, false, "toBeVisible", vec![]).await?,
        AssertHidden => expect(ctx, false, "toBeHidden", vec![]).await?,
        AssertText => {
            let text = ctx.value()?;
            expect(ctx, false, "toHaveText", vec![json!(text)]).await?
        }
        AssertContainsText => {
            let text = ctx.value()?;
            expect(ctx, false, "toContainText", vec![json!(text)]).await?
        }
        AssertValue => {
            let value = ctx.value()?;
            expect(ctx, false, "toHaveValue", vec![json!(value)]).await?
        }
        AssertAttribute => {
            let name = ctx
                .option_text("attribute")
                .or_else(|| ctx.option_text("name"))
                .ok_or_else(|| EngineError::MissingValue {
                    step: ctx.step.id.clone(),
                })?;
            let value = ctx.value()?;
            expect(ctx, false, "toHaveAttribute", vec![json!(name), json!(value)]).await?
        }
        AssertCount => {
            let count = ctx.value_number()? as u64;
            expect(ctx, false, "toHaveCount", vec![json!(count)]).await?
        }
        AssertUrl => {
            let url = ctx.url(&ctx.value()?);
            let opts = ctx.timeout_options();
            ctx.session.expect(None, false, "toHaveURL", vec![json!(url), opts]).await?;
        }
        AssertTitle => {
            let title = ctx.value()?;
            let opts = ctx.timeout_options();
            ctx.session.expect(None, false, "toHaveTitle", vec![json!(title), opts]).await?;
        }
        AssertEnabled => expect(ctx, false, "toBeEnabled", vec![]).await?,
        AssertDisabled => expect(ctx, false, "toBeDisabled", vec![]).await?,
        AssertChecked => expect(ctx, false, "toBeChecked", vec![]).await?,
        AssertNotChecked => expect(ctx, true, "toBeChecked", vec![]).await?,
        AssertFocused => expect(ctx, false, "toBeFocused", vec![]).await?,

        SwitchToPopup => {
            let opts = ctx.timeout_options();
            let popup = page_id(ctx.session.page_call("waitForPopup", vec![opts]).await?)?;
            info!("Switched to popup {}", popup);
            ctx.session.switch_active_page(popup);
        }
        SwitchToTab => {
            let index = ctx.value_number()? as usize;
            let pages = ctx.session.context_call("pages", vec![]).await?;
            let page = pages
                .as_array()
                .and_then(|pages| pages.get(index))
                .cloned()
                .ok_or_else(|| EngineError::Driver(format!("no tab at index {}", index)))?;
            ctx.session.switch_active_page(page_id(page)?);
            page_action(ctx, "bringToFront", vec![]).await?;
        }
        SwitchToMainTab => {
            let main = ctx.session.main_page().cloned().ok_or(EngineError::NoActivePage)?;
            ctx.session.switch_active_page(main);
            page_action(ctx, "bringToFront", vec![]).await?;
        }

        TableGetCell | TableClickCell | TableAssertCell | TableGetRowCount | TableAssertRowCount
        | TableGetColumn | TableFindRow | TableSortBy | TableFilter | TableAssertSorted => {
            return table::execute(keyword, ctx).await;
        }

        AssertEquals | AssertNotEquals | AssertContains | AssertGreaterThan | AssertLessThan => {
            compare(keyword, ctx)?
        }

        AcceptDialog => {
            let args = ctx.step.value_text().map(|text| vec![json!(text)]).unwrap_or_default();
            page_action(ctx, "acceptNextDialog", args).await?
        }
        DismissDialog => page_action(ctx, "dismissNextDialog", vec![]).await?,
        GetAlertText | SwitchToFrame => return Err(EngineError::Unimplemented(keyword.name())),

        CustomStep => {
            let step = ctx.step;
            let call = step.custom_function.as_ref().ok_or_else(|| EngineError::MissingValue {
                step: step.id.clone(),
            })?;
            let custom = ctx.custom;
            return custom.run_step(&call.function, ctx, &call.args).await.map(Some);
        }
        CustomCode => {
            let custom = ctx.custom;
            let timeout = ctx.code_timeout;
            return custom.run_code(ctx, timeout).await.map(Some);
        }
    }

    Ok(None)
}

async fn page_action(ctx: &mut StepContext<'_>, method: &str, args: Vec<Value>) -> EngineResult<()> {
    ctx.session.page_call(method, args).await?;
    Ok(())
}

/// Locator action with the step's timeout option appended
async fn element(ctx: &mut StepContext<'_>, method: &str, mut args: Vec<Value>) -> EngineResult<()> {
    let selector = ctx.selector()?;
    args.push(ctx.timeout_options());
    ctx.session.locator_call(&selector, method, args).await?;
    Ok(())
}

async fn query(ctx: &mut StepContext<'_>, method: &str, args: Vec<Value>) -> EngineResult<Value> {
    let selector = ctx.selector()?;
    ctx.session.locator_call(&selector, method, args).await
}

async fn expect(ctx: &mut StepContext<'_>, negate: bool, method: &str, mut args: Vec<Value>) -> EngineResult<()> {
    let selector = ctx.selector()?;
    args.push(ctx.timeout_options());
    ctx.session.expect(Some(&selector), negate, method, args).await
}

async fn wait_for(ctx: &mut StepContext<'_>, state: &str) -> EngineResult<()> {
    let selector = ctx.selector()?;
    let mut opts = ctx.timeout_options();
    opts["state"] = json!(state);
    ctx.session.locator_call(&selector, "waitFor", vec![opts]).await?;
    Ok(())
}

async fn close_page(ctx: &mut StepContext<'_>) -> EngineResult<()> {
    let target = match ctx.step.value.as_ref().and_then(as_number) {
        Some(index) => ctx.session.pages().get(index as usize).cloned(),
        None => ctx.session.active_page().cloned(),
    }
    .ok_or(EngineError::NoActivePage)?;

    let call = DriverCall::new(CallTarget::Page { page: target.clone() }, "close", vec![]);
    ctx.session.call(call).await?;
    ctx.session.remove_page(&target);
    Ok(())
}

fn attribute_name(ctx: &StepContext<'_>) -> EngineResult<String> {
    ctx.option_text("attribute")
        .or_else(|| ctx.step.value_text())
        .ok_or_else(|| EngineError::MissingValue {
            step: ctx.step.id.clone(),
        })
}

fn viewport(ctx: &StepContext<'_>) -> EngineResult<(u64, u64)> {
    if let (Some(w), Some(h)) = (ctx.option_number("width"), ctx.option_number("height")) {
        return Ok((w as u64, h as u64));
    }
    ctx.step
        .value_text()
        .and_then(|v| {
            let (w, h) = v.split_once('x')?;
            Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
        })
        .ok_or_else(|| EngineError::MissingValue {
            step: ctx.step.id.clone(),
        })
}

fn page_id(value: Value) -> EngineResult<String> {
    value
        .as_str()
        .map(String::from)
        .ok_or_else(|| EngineError::Driver(format!("expected a page handle, got {}", value)))
}

/// Two-operand assertion: `options.actual` against `options.expected` or the step value
fn compare(keyword: Keyword, ctx: &StepContext<'_>) -> EngineResult<()> {
    let actual = ctx.option_text("actual").ok_or_else(|| EngineError::MissingValue {
        step: ctx.step.id.clone(),
    })?;
    let expected = match ctx.option_text("expected") {
        Some(expected) => expected,
        None => ctx.value()?,
    };

    let numbers = || -> EngineResult<(f64, f64)> {
        match (actual.trim().parse::<f64>(), expected.trim().parse::<f64>()) {
            (Ok(a), Ok(e)) => Ok((a, e)),
            _ => Err(EngineError::AssertionFailed(format!(
                "{}: '{}' and '{}' are not both numeric",
                keyword, actual, expected
            ))),
        }
    };

    let ok = match keyword {
        Keyword::AssertEquals => actual == expected,
        Keyword::AssertNotEquals => actual != expected,
        Keyword::AssertContains => actual.contains(&expected),
        Keyword::AssertGreaterThan => {
            let (a, e) = numbers()?;
            a > e
        }
        Keyword::AssertLessThan => {
            let (a, e) = numbers()?;
            a < e
        }
        _ => return Err(EngineError::UnknownKeyword(keyword.name())),
    };

    if ok {
        Ok(())
    } else {
        Err(EngineError::AssertionFailed(format!(
            "{}: actual '{}', expected '{}'",
            keyword, actual, expected
        )))
    }
}
