//! Pre-processors run before a request or step
//!
//! Each step produces one value and writes it into the variable scope:
//! - `mapTo` copies named keys of an object result into distinct variables
//! - an object result without `var`/`mapTo` is spread key by key
//! - anything else is stored under `var`, or the function name

use chrono::format::{Item, StrftimeItems};
use fake::faker::address::en::{CityName, StreetName};
use fake::faker::company::en::CompanyName;
use fake::faker::internet::en::{Password, SafeEmail, Username};
use fake::faker::lorem::en::Word;
use fake::faker::name::en::{FirstName, LastName, Name};
use fake::faker::phone_number::en::PhoneNumber;
use fake::Fake;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use testforge_common::{value_to_text, PreProcessStep, Scope, StringCipher};
use tracing::debug;

use crate::database::{DatabaseClient, DbConfig, DefaultDatabaseClient};
use crate::error::{EngineError, EngineResult};
use crate::variables::VariableScope;

/// Pre-processing function catalogue
pub struct PreProcessor {
    db: Arc<dyn DatabaseClient>,
    cipher: Option<StringCipher>,
}

impl Default for PreProcessor {
    fn default() -> Self {
        Self::new(Arc::new(DefaultDatabaseClient))
    }
}

impl PreProcessor {
    pub fn new(db: Arc<dyn DatabaseClient>) -> Self {
        Self { db, cipher: None }
    }

    /// Use an explicit cipher instead of `TESTFORGE_ENCRYPTION_KEY`
    pub fn with_cipher(mut self, cipher: StringCipher) -> Self {
        self.cipher = Some(cipher);
        self
    }

    /// Run every step in order; the first failure aborts the rest
    pub async fn run_all(&self, steps: &[PreProcessStep], vars: &VariableScope) -> EngineResult<()> {
        for step in steps {
            let output = self.evaluate(step, vars).await.map_err(|e| match e {
                EngineError::PreProcess { .. } | EngineError::DatabaseConfig(_) => e,
                other => EngineError::PreProcess {
                    function: step.function.clone(),
                    reason: other.to_string(),
                },
            })?;
            store_output(step, output, vars);
        }
        Ok(())
    }

    async fn evaluate(&self, step: &PreProcessStep, vars: &VariableScope) -> EngineResult<Value> {
        let args: Vec<String> = step
            .args
            .iter()
            .map(|a| vars.inject(&value_to_text(a)))
            .collect();
        let arg = |i: usize| args.get(i).map(String::as_str);

        let function = step.function.as_str();
        debug!("Running pre-processor '{}'", function);

        match function {
            "generateFakeData" | "faker" => Ok(Value::String(fake_value(arg(0).unwrap_or("")))),
            f if f.starts_with("faker.") => Ok(Value::String(fake_value(&f["faker.".len()..]))),
            "currentTimestamp" | "timestamp" => Ok(Value::String(timestamp(function, arg(0))?)),
            "encrypt" => {
                let plaintext = arg(0).ok_or_else(|| missing_arg(function, "value to encrypt"))?;
                let encrypted = match &self.cipher {
                    Some(cipher) => cipher.encrypt(plaintext)?,
                    None => StringCipher::from_env()?.encrypt(plaintext)?,
                };
                Ok(Value::String(encrypted))
            }
            "generateUser" => Ok(generate_user()),
            "dbQuery" => {
                let db_name = arg(0).ok_or_else(|| missing_arg(function, "database name"))?;
                let sql = arg(1).ok_or_else(|| missing_arg(function, "query"))?;
                let config = DbConfig::from_env(db_name)?;
                let row = self.db.query_first_row(&config, sql, &args[2..]).await?;
                Ok(row.map(Value::Object).unwrap_or(Value::Null))
            }
            other => Err(EngineError::PreProcess {
                function: other.to_string(),
                reason: "unknown pre-processor function".to_string(),
            }),
        }
    }
}

fn missing_arg(function: &str, what: &str) -> EngineError {
    EngineError::PreProcess {
        function: function.to_string(),
        reason: format!("missing argument: {}", what),
    }
}

fn store_output(step: &PreProcessStep, output: Value, vars: &VariableScope) {
    let scope = step.scope.unwrap_or(Scope::Global);

    if let Some(map_to) = &step.map_to {
        for (key, var) in map_to {
            let value = output.get(key).map(value_to_text).unwrap_or_default();
            vars.set(scope, var, &value);
        }
        return;
    }

    match (&step.var, output) {
        (None, Value::Object(fields)) => {
            for (key, value) in &fields {
                vars.set(scope, key, &value_to_text(value));
            }
        }
        (var, output) => {
            let name = var.as_deref().unwrap_or(step.function.as_str());
            vars.set(scope, name, &value_to_text(&output));
        }
    }
}

/// One fake value from the fixed catalogue
pub fn fake_value(kind: &str) -> String {
    match kind.to_ascii_lowercase().as_str() {
        "name" | "fullname" => Name().fake(),
        "firstname" => FirstName().fake(),
        "lastname" => LastName().fake(),
        "email" => SafeEmail().fake(),
        "username" => Username().fake(),
        "phone" => PhoneNumber().fake(),
        "address" => {
            let number: u16 = (1..9999).fake();
            let street: String = StreetName().fake();
            format!("{} {}", number, street)
        }
        "city" => CityName().fake(),
        "uuid" => uuid::Uuid::new_v4().to_string(),
        "password" => Password(12..16).fake(),
        "company" => CompanyName().fake(),
        _ => {
            let word: String = Word().fake();
            let n: u32 = (1000..9999).fake();
            format!("{}{}", word, n)
        }
    }
}

/// Epoch millis by default; `iso` for RFC 3339, otherwise a strftime pattern
fn timestamp(function: &str, format: Option<&str>) -> EngineResult<String> {
    let now = chrono::Utc::now();
    let text = match format {
        None | Some("") | Some("millis") => now.timestamp_millis().to_string(),
        Some("seconds") => now.timestamp().to_string(),
        Some("iso") => now.to_rfc3339(),
        Some(pattern) => {
            let items: Vec<Item<'_>> = StrftimeItems::new(pattern).collect();
            if items.iter().any(|item| matches!(item, Item::Error)) {
                return Err(EngineError::PreProcess {
                    function: function.to_string(),
                    reason: format!("invalid timestamp format '{}'", pattern),
                });
            }
            now.format_with_items(items.into_iter()).to_string()
        }
    };
    Ok(text)
}

fn generate_user() -> Value {
    let first: String = FirstName().fake();
    let last: String = LastName().fake();
    let suffix: u32 = (100..999).fake();
    let username = format!("{}.{}{}", first, last, suffix).to_lowercase();
    let mut user = Map::new();
    user.insert("firstName".into(), json!(first));
    user.insert("lastName".into(), json!(last));
    user.insert("fullName".into(), json!(format!("{} {}", first, last)));
    user.insert("username".into(), json!(username));
    user.insert("email".into(), json!(format!("{}@example.com", username)));
    user.insert("phone".into(), json!(fake_value("phone")));
    user.insert("password".into(), json!(fake_value("password")));
    user.insert("address".into(), json!(fake_value("address")));
    user.insert("city".into(), json!(fake_value("city")));
    user.insert("company".into(), json!(fake_value("company")));
    Value::Object(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Row;
    use crate::variables::VariableStore;
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    fn step(json: Value) -> PreProcessStep {
        serde_json::from_value(json).unwrap()
    }

    struct FixedRow;

    #[async_trait]
    impl DatabaseClient for FixedRow {
        async fn query_first_row(&self, _: &DbConfig, _: &str, params: &[String]) -> EngineResult<Option<Row>> {
            let mut row = Row::new();
            row.insert("ID".into(), json!(7));
            row.insert("EMAIL".into(), json!(params.first().cloned().unwrap_or_default()));
            Ok(Some(row))
        }
    }

    #[tokio::test]
    async fn test_single_value_uses_var_or_function_name() {
        let vars = VariableStore::new().scope("s", "t");
        let pre = PreProcessor::default();
        pre.run_all(
            &[
                step(json!({"function": "faker.email", "var": "email"})),
                step(json!({"function": "currentTimestamp"})),
            ],
            &vars,
        )
        .await
        .unwrap();
        assert!(vars.get("email").unwrap().contains('@'));
        assert!(vars.get("currentTimestamp").unwrap().parse::<i64>().is_ok());
    }

    #[tokio::test]
    async fn test_object_results_spread_or_map() {
        let vars = VariableStore::new().scope("s", "t");
        let pre = PreProcessor::default();
        pre.run_all(&[step(json!({"function": "generateUser", "scope": "local"}))], &vars)
            .await
            .unwrap();
        assert!(vars.get("email").unwrap().ends_with("@example.com"));
        assert!(vars.get("username").is_some());

        let mapped = step(json!({"function": "generateUser", "mapTo": {"firstName": "buyerFirst"}}));
        assert_eq!(
            mapped.map_to,
            Some(BTreeMap::from([("firstName".to_string(), "buyerFirst".to_string())]))
        );
        let fresh = VariableStore::new().scope("s", "t2");
        pre.run_all(&[mapped], &fresh).await.unwrap();
        assert!(!fresh.get("buyerFirst").unwrap().is_empty());
        assert!(fresh.get("firstName").is_none());
    }

    #[tokio::test]
    async fn test_db_query_maps_columns() {
        std::env::set_var("DB_PREPROCESS_TEST_TYPE", "mysql");
        let vars = VariableStore::new().scope("s", "t");
        vars.set_global("mail", "a@b.c");
        let pre = PreProcessor::new(Arc::new(FixedRow));
        pre.run_all(
            &[step(json!({
                "function": "dbQuery",
                "args": ["preprocess-test", "SELECT id, email FROM users WHERE email = ?", "{{mail}}"],
                "mapTo": {"ID": "userId", "EMAIL": "userEmail"}
            }))],
            &vars,
        )
        .await
        .unwrap();
        assert_eq!(vars.get("userId").as_deref(), Some("7"));
        assert_eq!(vars.get("userEmail").as_deref(), Some("a@b.c"));
    }

    #[tokio::test]
    async fn test_errors_surface() {
        let vars = VariableStore::new().scope("s", "t");
        let pre = PreProcessor::default();
        let err = pre
            .run_all(&[step(json!({"function": "dbQuery", "args": ["no-such-db", "SELECT 1"]}))], &vars)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::DatabaseConfig(_)));

        let err = pre
            .run_all(&[step(json!({"function": "teleport"}))], &vars)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::PreProcess { .. }));
    }

    #[tokio::test]
    async fn test_timestamp_formats() {
        let vars = VariableStore::new().scope("s", "t");
        let pre = PreProcessor::default();
        pre.run_all(
            &[
                step(json!({"function": "currentTimestamp", "args": ["%Y-%m-%d"], "var": "day"})),
                step(json!({"function": "currentTimestamp", "args": ["seconds"], "var": "secs"})),
            ],
            &vars,
        )
        .await
        .unwrap();
        assert_eq!(vars.get("day").unwrap().len(), 10);
        assert!(vars.get("secs").unwrap().parse::<i64>().is_ok());

        let err = pre
            .run_all(
                &[step(json!({"function": "currentTimestamp", "args": ["%Q"], "var": "bad"}))],
                &vars,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::PreProcess { ref function, .. } if function == "currentTimestamp"));
        assert!(vars.get("bad").is_none());
    }

    #[tokio::test]
    async fn test_encrypt_with_explicit_cipher() {
        let vars = VariableStore::new().scope("s", "t");
        vars.set_global("pwd", "hunter2");
        let cipher = StringCipher::new(&[3u8; 32]).unwrap();
        let pre = PreProcessor::default().with_cipher(cipher.clone());
        pre.run_all(&[step(json!({"function": "encrypt", "args": ["{{pwd}}"], "var": "secret"}))], &vars)
            .await
            .unwrap();
        assert_eq!(cipher.decrypt(&vars.get("secret").unwrap()).unwrap(), "hunter2");
    }
}
