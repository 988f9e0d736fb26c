//! JSON-path assertions over API responses
//!
//! Failures never abort evaluation: every assertion is checked and the
//! outcome carries pass/fail counts plus one message per failure.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use testforge_common::{value_to_text, Assertion, AssertionKind};

use crate::variables::VariableScope;

/// Accumulated result of an assertion pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionOutcome {
    pub passed: u32,
    pub failed: u32,
    pub errors: Vec<String>,
}

impl AssertionOutcome {
    pub fn pass(&mut self) {
        self.passed += 1;
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.failed += 1;
        self.errors.push(message.into());
    }

    pub fn record(&mut self, result: Result<(), String>) {
        match result {
            Ok(()) => self.pass(),
            Err(message) => self.fail(message),
        }
    }

    pub fn merge(&mut self, other: AssertionOutcome) {
        self.passed += other.passed;
        self.failed += other.failed;
        self.errors.extend(other.errors);
    }
}

/// Evaluate JSON assertions; `body` is `None` when the response was not JSON
pub fn evaluate_json_assertions(
    assertions: &[Assertion],
    body: Option<&Value>,
    status: u16,
    vars: &VariableScope,
) -> AssertionOutcome {
    let mut outcome = AssertionOutcome::default();
    for assertion in assertions {
        let expected = vars.inject_value(&assertion.expected);
        outcome.record(check(assertion, &expected, body, status));
    }
    outcome
}

/// HTTP status check shared by the JSON and XPath engines
pub fn check_status(expected: &Value, status: u16) -> Result<(), String> {
    match as_number(expected) {
        Some(code) if code == status as f64 => Ok(()),
        _ => Err(format!(
            "statusCode: expected {}, got {}",
            value_to_text(expected),
            status
        )),
    }
}

fn check(assertion: &Assertion, expected: &Value, body: Option<&Value>, status: u16) -> Result<(), String> {
    if assertion.kind == AssertionKind::StatusCode {
        return check_status(expected, status);
    }

    let path = assertion
        .json_path
        .as_deref()
        .ok_or_else(|| format!("{}: missing jsonPath", assertion.kind))?;
    let body = body.ok_or_else(|| format!("{} at {}: response body is not JSON", assertion.kind, path))?;
    let actual = select(body, path)?;
    let kind = assertion.kind;

    let mismatch = |actual: &Option<Value>| {
        format!(
            "{} at {}: expected {}, got {}",
            kind,
            path,
            expected,
            actual.as_ref().map(Value::to_string).unwrap_or_else(|| "undefined".to_string())
        )
    };
    let ensure = |ok: bool| if ok { Ok(()) } else { Err(mismatch(&actual)) };

    match kind {
        AssertionKind::StatusCode => check_status(expected, status),
        AssertionKind::Equals => ensure(actual.as_ref().is_some_and(|a| values_equal(a, expected))),
        AssertionKind::NotEquals => ensure(!actual.as_ref().is_some_and(|a| values_equal(a, expected))),
        AssertionKind::Contains => ensure(match &actual {
            Some(Value::String(s)) => s.contains(&value_to_text(expected)),
            Some(Value::Array(items)) => items.iter().any(|i| values_equal(i, expected)),
            _ => false,
        }),
        AssertionKind::StartsWith => ensure(
            actual
                .as_ref()
                .and_then(Value::as_str)
                .is_some_and(|s| s.starts_with(&value_to_text(expected))),
        ),
        AssertionKind::EndsWith => ensure(
            actual
                .as_ref()
                .and_then(Value::as_str)
                .is_some_and(|s| s.ends_with(&value_to_text(expected))),
        ),
        AssertionKind::GreaterThan => ensure(compare_numbers(&actual, expected, |a, e| a > e)),
        AssertionKind::LessThan => ensure(compare_numbers(&actual, expected, |a, e| a < e)),
        AssertionKind::In => ensure(member_of(&actual, expected)),
        AssertionKind::NotIn => ensure(!member_of(&actual, expected)),
        AssertionKind::IncludesAll => ensure(match (&actual, expected) {
            (Some(Value::Array(items)), Value::Array(wanted)) => wanted
                .iter()
                .all(|w| items.iter().any(|i| values_equal(i, w))),
            _ => false,
        }),
        AssertionKind::Length => {
            let len = match &actual {
                Some(Value::String(s)) => Some(s.chars().count()),
                Some(Value::Array(items)) => Some(items.len()),
                _ => None,
            };
            ensure(matches!((len, as_number(expected)), (Some(l), Some(e)) if l as f64 == e))
        }
        AssertionKind::Size => {
            let size = match &actual {
                Some(Value::Array(items)) => Some(items.len()),
                Some(Value::Object(map)) => Some(map.len()),
                _ => None,
            };
            ensure(matches!((size, as_number(expected)), (Some(s), Some(e)) if s as f64 == e))
        }
        AssertionKind::Type => {
            let wanted = value_to_text(expected);
            ensure(type_name(actual.as_ref()) == wanted || (wanted == "array" && matches!(actual, Some(Value::Array(_)))))
        }
        AssertionKind::Exists => {
            let should_exist = expected.as_bool().unwrap_or(true);
            ensure(actual.is_some() == should_exist)
        }
        AssertionKind::Regex => {
            let pattern = value_to_text(expected);
            let re = Regex::new(&pattern).map_err(|e| format!("regex at {}: invalid pattern '{}': {}", path, pattern, e))?;
            ensure(actual.as_ref().is_some_and(|a| re.is_match(&value_to_text(a))))
        }
        AssertionKind::ArrayObjectMatch => array_object_match(assertion, expected, path, actual.as_ref()),
    }
}

fn array_object_match(assertion: &Assertion, expected: &Value, path: &str, actual: Option<&Value>) -> Result<(), String> {
    let (Some(match_field), Some(match_value), Some(assert_field)) = (
        assertion.match_field.as_deref(),
        assertion.match_value.as_ref(),
        assertion.assert_field.as_deref(),
    ) else {
        return Err(format!(
            "arrayObjectMatch at {}: matchField, matchValue and assertField are required",
            path
        ));
    };

    let Some(Value::Array(items)) = actual else {
        return Err(format!("arrayObjectMatch at {}: value is not an array", path));
    };

    let element = items
        .iter()
        .find(|item| item.get(match_field).is_some_and(|v| values_equal(v, match_value)))
        .ok_or_else(|| {
            format!(
                "arrayObjectMatch at {}: no element with {} == {}",
                path, match_field, match_value
            )
        })?;

    match element.get(assert_field) {
        Some(found) if values_equal(found, expected) => Ok(()),
        found => Err(format!(
            "arrayObjectMatch at {}: field '{}' of element with {} == {} expected {}, got {}",
            path,
            assert_field,
            match_field,
            match_value,
            expected,
            found.map(Value::to_string).unwrap_or_else(|| "undefined".to_string())
        )),
    }
}

/// Query a JSONPath; one match yields the value, several an array, none `None`
pub fn select(body: &Value, path: &str) -> Result<Option<Value>, String> {
    let mut matches = jsonpath_lib::select(body, path)
        .map_err(|e| format!("invalid JSONPath '{}': {:?}", path, e))?;
    Ok(match matches.len() {
        0 => None,
        1 => Some(matches.remove(0).clone()),
        _ => Some(Value::Array(matches.into_iter().cloned().collect())),
    })
}

/// Equality with numbers compared by value (`1 == 1.0`)
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Numeric coercion of numbers and numeric strings
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn compare_numbers(actual: &Option<Value>, expected: &Value, op: impl Fn(f64, f64) -> bool) -> bool {
    match (actual.as_ref().and_then(as_number), as_number(expected)) {
        (Some(a), Some(e)) => op(a, e),
        _ => false,
    }
}

fn member_of(actual: &Option<Value>, expected: &Value) -> bool {
    match (actual, expected) {
        (Some(a), Value::Array(options)) => options.iter().any(|o| values_equal(a, o)),
        _ => false,
    }
}

fn type_name(value: Option<&Value>) -> &'static str {
    match value {
        None => "undefined",
        Some(Value::String(_)) => "string",
        Some(Value::Number(_)) => "number",
        Some(Value::Bool(_)) => "boolean",
        Some(Value::Null | Value::Array(_) | Value::Object(_)) => "object",
    }
}
