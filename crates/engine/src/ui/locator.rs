//! Locator resolution
//!
//! A [`LocatorDefinition`] resolves to a single Playwright selector string.
//! Composition order is fixed:
//!
//! 1. base selector from `strategy`, `value` and `options`
//! 2. the legacy `filter`, then every entry of `filters`
//! 3. each `chain` operation
//! 4. the terminal `index`
//!
//! Every stage appends ` >> part` to what came before, so later stages only
//! narrow the accumulated selector. Resolution never touches a browser.

use testforge_common::{ChainOperation, FilterDefinition, IndexKeyword, IndexSelector, LocatorDefinition};

use crate::error::{EngineError, EngineResult};

pub fn resolve(def: &LocatorDefinition) -> EngineResult<String> {
    let mut selector = base(def)?;

    for filter in def.filter.iter().chain(def.filters.iter()) {
        selector = narrow(selector, filter_part(filter)?);
    }

    for op in &def.chain {
        let part = match op {
            ChainOperation::Locator { locator } => resolve(locator)?,
            ChainOperation::Filter { filter } => filter_part(filter)?,
            ChainOperation::Nth { index } => nth(*index),
            ChainOperation::First => nth(0),
            ChainOperation::Last => nth(-1),
        };
        selector = narrow(selector, part);
    }

    if let Some(index) = def.index {
        selector = narrow(selector, index_part(index));
    }

    Ok(selector)
}

fn narrow(selector: String, part: String) -> String {
    format!("{} >> {}", selector, part)
}

fn nth(index: i64) -> String {
    format!("nth={}", index)
}

fn index_part(index: IndexSelector) -> String {
    match index {
        IndexSelector::Position(n) => nth(n),
        IndexSelector::Named(IndexKeyword::First) => nth(0),
        IndexSelector::Named(IndexKeyword::Last) => nth(-1),
    }
}

fn base(def: &LocatorDefinition) -> EngineResult<String> {
    let exact = def.options.exact.unwrap_or(false);
    let value = def.value.as_str();

    let mut selector = match def.strategy.as_str() {
        "role" => role_selector(def),
        "label" => format!("internal:label={}", text_literal(value, exact)),
        "text" => format!("internal:text={}", text_literal(value, exact)),
        "placeholder" => attr_selector("placeholder", value, exact),
        "altText" => attr_selector("alt", value, exact),
        "title" => attr_selector("title", value, exact),
        "testId" => format!("internal:testid=[data-testid={}]", attr_literal(value, true)),
        "css" => format!("css={}", value),
        "xpath" => format!("xpath={}", value),
        "locator" => value.to_string(),
        other => return Err(EngineError::UnknownStrategy(other.to_string())),
    };

    if let Some(text) = &def.options.has_text {
        selector = narrow(selector, format!("internal:has-text={}", text_literal(text, false)));
    }
    if let Some(text) = &def.options.has_not_text {
        selector = narrow(selector, format!("internal:has-not-text={}", text_literal(text, false)));
    }
    Ok(selector)
}

fn role_selector(def: &LocatorDefinition) -> String {
    let opts = &def.options;
    let mut selector = format!("internal:role={}", def.value);

    let flags = [
        ("checked", opts.checked),
        ("disabled", opts.disabled),
        ("selected", opts.selected),
        ("expanded", opts.expanded),
        ("include-hidden", opts.include_hidden),
    ];
    for (attr, flag) in flags {
        if let Some(flag) = flag {
            selector.push_str(&format!("[{}={}]", attr, flag));
        }
    }
    if let Some(level) = opts.level {
        selector.push_str(&format!("[level={}]", level));
    }
    if let Some(name) = &opts.name {
        let exact = opts.exact.unwrap_or(false);
        selector.push_str(&format!("[name={}]", attr_literal(name, exact)));
    }
    if let Some(pressed) = opts.pressed {
        selector.push_str(&format!("[pressed={}]", pressed));
    }
    selector
}

fn filter_part(filter: &FilterDefinition) -> EngineResult<String> {
    Ok(match filter {
        FilterDefinition::HasText { value } => format!("internal:has-text={}", text_literal(value, false)),
        FilterDefinition::HasNotText { value } => {
            format!("internal:has-not-text={}", text_literal(value, false))
        }
        FilterDefinition::Has { locator } => format!("internal:has={}", json_string(&resolve(locator)?)),
        FilterDefinition::HasNot { locator } => {
            format!("internal:has-not={}", json_string(&resolve(locator)?))
        }
        FilterDefinition::Visible => "visible=true".to_string(),
        FilterDefinition::Hidden => "visible=false".to_string(),
    })
}

fn attr_selector(attr: &str, value: &str, exact: bool) -> String {
    format!("internal:attr=[{}={}]", attr, attr_literal(value, exact))
}

/// Quoted text matcher; `s` suffix is case-sensitive exact, `i` is substring
fn text_literal(text: &str, exact: bool) -> String {
    format!("{}{}", json_string(text), if exact { "s" } else { "i" })
}

fn attr_literal(value: &str, exact: bool) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"{}", escaped, if exact { "s" } else { "i" })
}

fn json_string(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn locator(value: serde_json::Value) -> LocatorDefinition {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_base_strategies() {
        let cases = [
            (json!({"strategy": "css", "value": "#login"}), "css=#login"),
            (json!({"strategy": "xpath", "value": "//form"}), "xpath=//form"),
            (json!({"strategy": "locator", "value": "button.primary"}), "button.primary"),
            (json!({"strategy": "text", "value": "Sign in"}), "internal:text=\"Sign in\"i"),
            (
                json!({"strategy": "label", "value": "Email", "options": {"exact": true}}),
                "internal:label=\"Email\"s",
            ),
            (
                json!({"strategy": "placeholder", "value": "Search"}),
                "internal:attr=[placeholder=\"Search\"i]",
            ),
            (json!({"strategy": "altText", "value": "Logo"}), "internal:attr=[alt=\"Logo\"i]"),
            (json!({"strategy": "title", "value": "Close"}), "internal:attr=[title=\"Close\"i]"),
            (
                json!({"strategy": "testId", "value": "submit"}),
                "internal:testid=[data-testid=\"submit\"s]",
            ),
        ];
        for (def, expected) in cases {
            assert_eq!(resolve(&locator(def)).unwrap(), expected);
        }
    }

    #[test]
    fn test_role_options() {
        let def = locator(json!({
            "strategy": "role",
            "value": "checkbox",
            "options": {"name": "Remember \"me\"", "exact": true, "checked": false, "level": 2}
        }));
        assert_eq!(
            resolve(&def).unwrap(),
            r#"internal:role=checkbox[checked=false][level=2][name="Remember \"me\""s]"#
        );

        let def = locator(json!({"strategy": "role", "value": "button", "options": {"hasText": "Save"}}));
        assert_eq!(resolve(&def).unwrap(), "internal:role=button >> internal:has-text=\"Save\"i");
    }

    #[test]
    fn test_filters_then_chain_then_index() {
        let def = locator(json!({
            "strategy": "css",
            "value": "tr",
            "filter": {"type": "hasText", "value": "Alice"},
            "filters": [
                {"type": "has", "locator": {"strategy": "role", "value": "button", "options": {"name": "Edit"}}},
                {"type": "visible"}
            ],
            "chain": [
                {"type": "locator", "locator": {"strategy": "css", "value": "td"}},
                {"type": "filter", "filter": {"type": "hasNotText", "value": "N/A"}},
                {"type": "last"}
            ],
            "index": "first"
        }));
        assert_eq!(
            resolve(&def).unwrap(),
            "css=tr >> internal:has-text=\"Alice\"i \
             >> internal:has=\"internal:role=button[name=\\\"Edit\\\"i]\" \
             >> visible=true >> css=td >> internal:has-not-text=\"N/A\"i >> nth=-1 >> nth=0"
        );
    }

    #[test]
    fn test_numeric_index_and_nth() {
        let def = locator(json!({
            "strategy": "css",
            "value": "li",
            "chain": [{"type": "nth", "index": 2}, {"type": "first"}],
            "index": 3
        }));
        assert_eq!(resolve(&def).unwrap(), "css=li >> nth=2 >> nth=0 >> nth=3");
    }

    #[test]
    fn test_has_not_and_hidden() {
        let def = locator(json!({
            "strategy": "css",
            "value": "div.card",
            "filters": [
                {"type": "hasNot", "locator": {"strategy": "text", "value": "Sold out"}},
                {"type": "hidden"}
            ]
        }));
        assert_eq!(
            resolve(&def).unwrap(),
            "css=div.card >> internal:has-not=\"internal:text=\\\"Sold out\\\"i\" >> visible=false"
        );
    }

    #[test]
    fn test_unknown_strategy_fails() {
        let err = resolve(&locator(json!({"strategy": "shadow", "value": "x"}))).unwrap_err();
        assert!(matches!(err, EngineError::UnknownStrategy(s) if s == "shadow"));

        let nested = locator(json!({
            "strategy": "css",
            "value": "ul",
            "chain": [{"type": "locator", "locator": {"strategy": "bogus", "value": "li"}}]
        }));
        assert!(resolve(&nested).is_err());
    }
}
