//! JSON Schema validation of response bodies
//!
//! A schema failure counts as one failed assertion; it never aborts the
//! test data item.

use serde_json::Value;

use crate::assertion::AssertionOutcome;

pub fn validate_response_schema(schema: &Value, body: Option<&Value>) -> AssertionOutcome {
    let mut outcome = AssertionOutcome::default();

    let Some(body) = body else {
        outcome.fail("schema: response body is not JSON");
        return outcome;
    };

    let validator = match jsonschema::validator_for(schema) {
        Ok(validator) => validator,
        Err(e) => {
            outcome.fail(format!("schema: invalid response schema: {}", e));
            return outcome;
        }
    };

    let errors: Vec<String> = validator
        .iter_errors(body)
        .map(|e| {
            let at = e.instance_path.to_string();
            if at.is_empty() {
                e.to_string()
            } else {
                format!("{} (at {})", e, at)
            }
        })
        .collect();

    if errors.is_empty() {
        outcome.pass();
    } else {
        outcome.fail(format!("schema: {}", errors.join("; ")));
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user_schema() -> Value {
        json!({
            "type": "object",
            "required": ["id", "name"],
            "properties": {"id": {"type": "integer"}, "name": {"type": "string"}}
        })
    }

    #[test]
    fn test_valid_body_passes() {
        let outcome = validate_response_schema(&user_schema(), Some(&json!({"id": 1, "name": "a"})));
        assert_eq!((outcome.passed, outcome.failed), (1, 0));
    }

    #[test]
    fn test_invalid_body_is_one_failure() {
        let outcome = validate_response_schema(&user_schema(), Some(&json!({"id": "x"})));
        assert_eq!((outcome.passed, outcome.failed), (0, 1));
        assert!(outcome.errors[0].starts_with("schema:"));

        let outcome = validate_response_schema(&user_schema(), None);
        assert_eq!(outcome.failed, 1);
    }
}
