//! XPath assertions over XML/SOAP responses
//!
//! Only `equals` and `contains` are meaningful here; both compare against
//! the text content of the first matched node. An expression that matches
//! nothing fails on its own terms, separate from a value mismatch.

use sxd_xpath::Value as XPathValue;
use testforge_common::{value_to_text, Assertion, AssertionKind};

use crate::assertion::{check_status, AssertionOutcome};
use crate::variables::VariableScope;

pub fn evaluate_xpath_assertions(
    assertions: &[Assertion],
    xml: &str,
    status: u16,
    vars: &VariableScope,
) -> AssertionOutcome {
    let mut outcome = AssertionOutcome::default();

    let package = match sxd_document::parser::parse(xml) {
        Ok(package) => Some(package),
        Err(e) => {
            outcome.fail(format!("response is not well-formed XML: {:?}", e));
            None
        }
    };

    for assertion in assertions {
        let expected = vars.inject_value(&assertion.expected);
        if assertion.kind == AssertionKind::StatusCode {
            outcome.record(check_status(&expected, status));
            continue;
        }
        let Some(package) = &package else {
            outcome.fail(format!("{}: no XML document to evaluate", assertion.kind));
            continue;
        };
        let expected = value_to_text(&expected);
        outcome.record(check(assertion, &expected, &package.as_document(), vars));
    }
    outcome
}

fn check(
    assertion: &Assertion,
    expected: &str,
    document: &sxd_document::dom::Document<'_>,
    vars: &VariableScope,
) -> Result<(), String> {
    let expression = assertion
        .xpath_expression
        .as_deref()
        .map(|x| vars.inject(x))
        .ok_or_else(|| format!("{}: missing xpathExpression", assertion.kind))?;

    let actual = first_text(document, &expression)?
        .ok_or_else(|| format!("No node matched XPath '{}'", expression))?;

    let ok = match assertion.kind {
        AssertionKind::Equals => actual == expected,
        AssertionKind::Contains => actual.contains(expected),
        other => {
            return Err(format!(
                "{} is not supported for XPath assertions (use equals or contains)",
                other
            ))
        }
    };

    if ok {
        Ok(())
    } else {
        Err(format!(
            "{} at {}: expected \"{}\", got \"{}\"",
            assertion.kind, expression, expected, actual
        ))
    }
}

/// Text of the first node matched by `expression`; scalars are stringified
pub fn first_text(document: &sxd_document::dom::Document<'_>, expression: &str) -> Result<Option<String>, String> {
    let value = sxd_xpath::evaluate_xpath(document, expression)
        .map_err(|e| format!("invalid XPath '{}': {:?}", expression, e))?;

    Ok(match value {
        XPathValue::Nodeset(nodes) => nodes.document_order_first().map(|n| n.string_value()),
        XPathValue::String(s) => Some(s),
        XPathValue::Number(n) => Some(n.to_string()),
        XPathValue::Boolean(b) => Some(b.to_string()),
    })
}
