//! Database access for the `dbQuery` pre-processor
//!
//! Each named database is configured through `DB_<NAME>_TYPE`, `_HOST`,
//! `_PORT`, `_USER`, `_PASSWORD`, `_NAME` and `_CONNSTRING`. MySQL goes
//! through sqlx; ODBC (DB2 and friends) through odbc-api when the `odbc`
//! feature is enabled.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{EngineError, EngineResult};

/// A single result row, column name -> value
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbKind {
    Mysql,
    Odbc,
}

#[derive(Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub name: String,
    pub kind: DbKind,
    pub host: String,
    pub port: Option<u16>,
    pub user: String,
    pub password: String,
    pub database: String,
    pub connection_string: Option<String>,
}

impl std::fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConfig")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

impl DbConfig {
    /// Read the configuration of database `name` from the process environment
    pub fn from_env(name: &str) -> EngineResult<Self> {
        Self::from_lookup(name, |key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup
    pub fn from_lookup(name: &str, lookup: impl Fn(&str) -> Option<String>) -> EngineResult<Self> {
        let prefix = format!("DB_{}", env_key(name));
        let get = |suffix: &str| lookup(&format!("{}_{}", prefix, suffix)).filter(|v| !v.is_empty());

        let kind = match get("TYPE").map(|t| t.to_lowercase()) {
            Some(t) if t == "mysql" => DbKind::Mysql,
            Some(t) if t == "db2" || t == "odbc" => DbKind::Odbc,
            Some(other) => {
                return Err(EngineError::DatabaseConfig(format!(
                    "unsupported type '{}' for database '{}'",
                    other, name
                )))
            }
            None => {
                return Err(EngineError::DatabaseConfig(format!(
                    "no configuration for database '{}' ({}_TYPE is not set)",
                    name, prefix
                )))
            }
        };

        let port = match get("PORT") {
            Some(p) => Some(p.parse::<u16>().map_err(|_| {
                EngineError::DatabaseConfig(format!("invalid port '{}' for database '{}'", p, name))
            })?),
            None => None,
        };

        Ok(Self {
            name: name.to_string(),
            kind,
            host: get("HOST").unwrap_or_else(|| "localhost".to_string()),
            port,
            user: get("USER").unwrap_or_default(),
            password: get("PASSWORD").unwrap_or_default(),
            database: get("NAME").unwrap_or_default(),
            connection_string: get("CONNSTRING"),
        })
    }

    /// ODBC connection string; an explicit `_CONNSTRING` wins
    pub fn odbc_connection_string(&self) -> String {
        if let Some(conn) = &self.connection_string {
            return conn.clone();
        }
        format!(
            "DRIVER={{IBM DB2 ODBC DRIVER}};DATABASE={};HOSTNAME={};PORT={};PROTOCOL=TCPIP;UID={};PWD={};",
            self.database,
            self.host,
            self.port.unwrap_or(50000),
            self.user,
            self.password
        )
    }
}

fn env_key(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

/// Runs a query and returns its first row
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    async fn query_first_row(&self, config: &DbConfig, sql: &str, params: &[String]) -> EngineResult<Option<Row>>;
}

/// Dispatches to MySQL or ODBC by configuration kind
#[derive(Debug, Default, Clone)]
pub struct DefaultDatabaseClient;

#[async_trait]
impl DatabaseClient for DefaultDatabaseClient {
    async fn query_first_row(&self, config: &DbConfig, sql: &str, params: &[String]) -> EngineResult<Option<Row>> {
        debug!("Querying database '{}' ({:?})", config.name, config.kind);
        match config.kind {
            DbKind::Mysql => mysql_first_row(config, sql, params).await,
            DbKind::Odbc => {
                let conn = config.odbc_connection_string();
                let sql = sql.to_string();
                let params = params.to_vec();
                tokio::task::spawn_blocking(move || odbc_first_row(&conn, &sql, &params))
                    .await
                    .map_err(|e| EngineError::DatabaseQuery(e.to_string()))?
            }
        }
    }
}

async fn mysql_first_row(config: &DbConfig, sql: &str, params: &[String]) -> EngineResult<Option<Row>> {
    use sqlx::mysql::MySqlConnectOptions;
    use sqlx::{Column, Connection, MySqlConnection, Row as _};

    let mut options = MySqlConnectOptions::new()
        .host(&config.host)
        .username(&config.user)
        .password(&config.password)
        .database(&config.database);
    if let Some(port) = config.port {
        options = options.port(port);
    }

    let mut conn = MySqlConnection::connect_with(&options).await.map_err(db_error)?;

    let mut query = sqlx::query(sql);
    for param in params {
        query = query.bind(param.as_str());
    }
    let row = query.fetch_optional(&mut conn).await.map_err(db_error)?;
    conn.close().await.map_err(db_error)?;

    Ok(row.map(|row| {
        row.columns()
            .iter()
            .enumerate()
            .map(|(i, column)| (column.name().to_string(), mysql_cell(&row, i)))
            .collect()
    }))
}

fn mysql_cell(row: &sqlx::mysql::MySqlRow, index: usize) -> Value {
    use sqlx::Row as _;

    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(index) {
        return v.map(|d| Value::from(d.to_string())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    Value::Null
}

fn db_error(e: impl std::fmt::Display) -> EngineError {
    EngineError::DatabaseQuery(e.to_string())
}

#[cfg(feature = "odbc")]
fn odbc_first_row(conn_str: &str, sql: &str, params: &[String]) -> EngineResult<Option<Row>> {
    use odbc_api::buffers::TextRowSet;
    use odbc_api::{ConnectionOptions, Cursor, Environment, IntoParameter, ResultSetMetadata};

    let env = Environment::new().map_err(db_error)?;
    let conn = env
        .connect_with_connection_string(conn_str, ConnectionOptions::default())
        .map_err(db_error)?;

    let params: Vec<_> = params.iter().map(|p| p.as_str().into_parameter()).collect();
    let Some(mut cursor) = conn.execute(sql, params.as_slice()).map_err(db_error)? else {
        return Ok(None);
    };

    let names = cursor
        .column_names()
        .map_err(db_error)?
        .collect::<Result<Vec<String>, _>>()
        .map_err(db_error)?;
    let mut buffers = TextRowSet::for_cursor(1, &mut cursor, Some(4096)).map_err(db_error)?;
    let mut rows = cursor.bind_buffer(&mut buffers).map_err(db_error)?;
    let Some(batch) = rows.fetch().map_err(db_error)? else {
        return Ok(None);
    };

    let row = names
        .into_iter()
        .enumerate()
        .map(|(i, name)| {
            let value = batch
                .at_as_str(i, 0)
                .ok()
                .flatten()
                .map(|s| Value::String(s.to_string()))
                .unwrap_or(Value::Null);
            (name, value)
        })
        .collect();
    Ok(Some(row))
}

#[cfg(not(feature = "odbc"))]
fn odbc_first_row(_conn_str: &str, _sql: &str, _params: &[String]) -> EngineResult<Option<Row>> {
    Err(EngineError::DatabaseConfig(
        "ODBC databases require building testforge-engine with the 'odbc' feature".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_from_environment_keys() {
        let config = DbConfig::from_lookup(
            "orders-db",
            lookup(&[
                ("DB_ORDERS_DB_TYPE", "mysql"),
                ("DB_ORDERS_DB_HOST", "db.local"),
                ("DB_ORDERS_DB_PORT", "3307"),
                ("DB_ORDERS_DB_USER", "qa"),
                ("DB_ORDERS_DB_NAME", "orders"),
            ]),
        )
        .unwrap();
        assert_eq!(config.kind, DbKind::Mysql);
        assert_eq!(config.host, "db.local");
        assert_eq!(config.port, Some(3307));
        assert_eq!(config.database, "orders");
    }

    #[test]
    fn test_missing_config_is_error() {
        let err = DbConfig::from_lookup("ledger", lookup(&[])).unwrap_err();
        assert!(matches!(err, EngineError::DatabaseConfig(msg) if msg.contains("DB_LEDGER_TYPE")));
        let err = DbConfig::from_lookup("x", lookup(&[("DB_X_TYPE", "oracle")])).unwrap_err();
        assert!(matches!(err, EngineError::DatabaseConfig(_)));
    }

    #[test]
    fn test_odbc_connection_string() {
        let config = DbConfig::from_lookup(
            "core",
            lookup(&[("DB_CORE_TYPE", "db2"), ("DB_CORE_HOST", "mainframe"), ("DB_CORE_NAME", "CORE")]),
        )
        .unwrap();
        assert_eq!(config.kind, DbKind::Odbc);
        assert!(config.odbc_connection_string().contains("HOSTNAME=mainframe;PORT=50000"));

        let explicit = DbConfig::from_lookup(
            "core",
            lookup(&[("DB_CORE_TYPE", "odbc"), ("DB_CORE_CONNSTRING", "DSN=core")]),
        )
        .unwrap();
        assert_eq!(explicit.odbc_connection_string(), "DSN=core");
    }
}
