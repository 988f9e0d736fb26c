//! SQLite-backed variable registry
//!
//! Variables outlive a single process here. Global names are unique across
//! the registry; local names are unique within their (suite, test case)
//! pair. Owner columns are stored as empty strings for globals so the
//! uniqueness index can cover both scopes.

use crate::types::{Scope, Variable};
use crate::{Error, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Input for a registry write
#[derive(Debug, Clone)]
pub struct NewVariable {
    pub name: String,
    pub value: String,
    pub scope: Scope,
    pub suite_id: Option<String>,
    pub test_case_id: Option<String>,
}

impl NewVariable {
    pub fn global(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            scope: Scope::Global,
            suite_id: None,
            test_case_id: None,
        }
    }

    pub fn local(
        name: impl Into<String>,
        value: impl Into<String>,
        suite_id: impl Into<String>,
        test_case_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            scope: Scope::Local,
            suite_id: Some(suite_id.into()),
            test_case_id: Some(test_case_id.into()),
        }
    }

    /// Owner columns as stored; empty for globals
    fn owner(&self) -> Result<(String, String)> {
        match self.scope {
            Scope::Global => Ok((String::new(), String::new())),
            Scope::Local => match (&self.suite_id, &self.test_case_id) {
                (Some(s), Some(t)) if !s.is_empty() && !t.is_empty() => Ok((s.clone(), t.clone())),
                _ => Err(Error::MissingLocalOwner(self.name.clone())),
            },
        }
    }
}

/// Persisted variable store shared by every suite of a run
#[derive(Clone)]
pub struct VariableRegistry {
    conn: Arc<Mutex<Connection>>,
}

impl VariableRegistry {
    /// Open or create the registry at path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path.as_ref())?;

        // Concurrent suites share this file
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let registry = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        registry.init_schema()?;

        info!("Opened variable registry at {:?}", path.as_ref());
        Ok(registry)
    }

    /// Open in-memory registry (for testing)
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let registry = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        registry.init_schema()?;
        Ok(registry)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS variables (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                value TEXT NOT NULL,
                scope TEXT NOT NULL,
                suite_id TEXT NOT NULL DEFAULT '',
                test_case_id TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_variables_owner_name
                ON variables(scope, suite_id, test_case_id, name);
            "#,
        )?;

        debug!("Variable registry schema initialized");
        Ok(())
    }

    /// Add a variable, rejecting name collisions unless `allow_override`
    pub fn add(&self, variable: &NewVariable, allow_override: bool) -> Result<Variable> {
        let (suite_id, test_case_id) = variable.owner()?;
        let conn = self.conn.lock();

        let existing = find_exact(&conn, variable.scope, &suite_id, &test_case_id, &variable.name)?;
        if existing.is_some() && !allow_override {
            let suggestion = suggest_free_name(&conn, variable.scope, &suite_id, &test_case_id, &variable.name)?;
            warn!(
                "Rejected {} variable '{}' (suggested '{}')",
                variable.scope, variable.name, suggestion
            );
            return Err(Error::VariableConflict {
                name: variable.name.clone(),
                scope: variable.scope,
                suggestion,
            });
        }

        upsert(&conn, variable, &suite_id, &test_case_id)?;
        find_exact(&conn, variable.scope, &suite_id, &test_case_id, &variable.name)?
            .ok_or_else(|| Error::Internal(format!("variable '{}' vanished after write", variable.name)))
    }

    /// Write a variable, overwriting any previous value (last writer wins)
    pub fn set(&self, variable: &NewVariable) -> Result<()> {
        let (suite_id, test_case_id) = variable.owner()?;
        let conn = self.conn.lock();
        upsert(&conn, variable, &suite_id, &test_case_id)
    }

    /// Resolve a name, local entry of the owner first, then global
    pub fn lookup(
        &self,
        name: &str,
        suite_id: Option<&str>,
        test_case_id: Option<&str>,
    ) -> Result<Option<Variable>> {
        let conn = self.conn.lock();
        if let (Some(s), Some(t)) = (suite_id, test_case_id) {
            if let Some(v) = find_exact(&conn, Scope::Local, s, t, name)? {
                return Ok(Some(v));
            }
        }
        find_exact(&conn, Scope::Global, "", "", name)
    }

    /// List variables, optionally restricted to one scope
    pub fn list(&self, scope: Option<Scope>) -> Result<Vec<Variable>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, value, scope, suite_id, test_case_id, created_at, updated_at
             FROM variables WHERE (?1 IS NULL OR scope = ?1) ORDER BY scope, name",
        )?;
        let rows = stmt
            .query_map(params![scope.map(|s| s.as_str())], map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Delete a variable by name within an owner; returns whether a row went away
    pub fn delete(
        &self,
        scope: Scope,
        suite_id: Option<&str>,
        test_case_id: Option<&str>,
        name: &str,
    ) -> Result<bool> {
        let conn = self.conn.lock();
        let (s, t) = owner_columns(scope, suite_id, test_case_id);
        let n = conn.execute(
            "DELETE FROM variables WHERE scope = ?1 AND suite_id = ?2 AND test_case_id = ?3 AND name = ?4",
            params![scope.as_str(), s, t, name],
        )?;
        Ok(n > 0)
    }

    /// Remove every local variable of every owner
    pub fn delete_all_local(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let n = conn.execute("DELETE FROM variables WHERE scope = 'local'", [])?;
        debug!("Removed {} local variable(s) from registry", n);
        Ok(n)
    }

    /// Remove every global variable
    pub fn clear_global(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let n = conn.execute("DELETE FROM variables WHERE scope = 'global'", [])?;
        debug!("Removed {} global variable(s) from registry", n);
        Ok(n)
    }
}

fn owner_columns<'a>(scope: Scope, suite_id: Option<&'a str>, test_case_id: Option<&'a str>) -> (&'a str, &'a str) {
    match scope {
        Scope::Global => ("", ""),
        Scope::Local => (suite_id.unwrap_or(""), test_case_id.unwrap_or("")),
    }
}

fn upsert(conn: &Connection, variable: &NewVariable, suite_id: &str, test_case_id: &str) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    conn.execute(
        "INSERT INTO variables (id, name, value, scope, suite_id, test_case_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
         ON CONFLICT(scope, suite_id, test_case_id, name)
         DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![
            Uuid::new_v4().to_string(),
            variable.name,
            variable.value,
            variable.scope.as_str(),
            suite_id,
            test_case_id,
            now,
        ],
    )?;
    debug!("Stored {} variable '{}'", variable.scope, variable.name);
    Ok(())
}

fn find_exact(
    conn: &Connection,
    scope: Scope,
    suite_id: &str,
    test_case_id: &str,
    name: &str,
) -> Result<Option<Variable>> {
    let row = conn
        .query_row(
            "SELECT id, name, value, scope, suite_id, test_case_id, created_at, updated_at
             FROM variables WHERE scope = ?1 AND suite_id = ?2 AND test_case_id = ?3 AND name = ?4",
            params![scope.as_str(), suite_id, test_case_id, name],
            map_row,
        )
        .optional()?;
    Ok(row)
}

fn suggest_free_name(
    conn: &Connection,
    scope: Scope,
    suite_id: &str,
    test_case_id: &str,
    base: &str,
) -> Result<String> {
    let mut n = 1u32;
    loop {
        let candidate = format!("{}_{}", base, n);
        if find_exact(conn, scope, suite_id, test_case_id, &candidate)?.is_none() {
            return Ok(candidate);
        }
        n += 1;
    }
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<Variable> {
    let scope: String = row.get(3)?;
    let suite_id: String = row.get(4)?;
    let test_case_id: String = row.get(5)?;
    Ok(Variable {
        id: row.get(0)?,
        name: row.get(1)?,
        value: row.get(2)?,
        scope: if scope == "local" { Scope::Local } else { Scope::Global },
        suite_id: (!suite_id.is_empty()).then_some(suite_id),
        test_case_id: (!test_case_id.is_empty()).then_some(test_case_id),
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_conflict_suggests_suffix() {
        let registry = VariableRegistry::open_memory().unwrap();
        registry.add(&NewVariable::global("token", "a"), false).unwrap();
        registry.add(&NewVariable::global("token_1", "b"), false).unwrap();

        match registry.add(&NewVariable::global("token", "c"), false) {
            Err(Error::VariableConflict { suggestion, .. }) => assert_eq!(suggestion, "token_2"),
            other => panic!("expected conflict, got {:?}", other.map(|v| v.name)),
        }

        let overridden = registry.add(&NewVariable::global("token", "c"), true).unwrap();
        assert_eq!(overridden.value, "c");
    }

    #[test]
    fn test_local_names_are_scoped_to_owner() {
        let registry = VariableRegistry::open_memory().unwrap();
        registry.add(&NewVariable::local("id", "1", "s1", "tc1"), false).unwrap();
        // Same name, different test case
        registry.add(&NewVariable::local("id", "2", "s1", "tc2"), false).unwrap();
        assert!(registry.add(&NewVariable::local("id", "3", "s1", "tc1"), false).is_err());

        let missing_owner = NewVariable {
            suite_id: None,
            ..NewVariable::local("x", "1", "s", "t")
        };
        assert!(matches!(registry.set(&missing_owner), Err(Error::MissingLocalOwner(_))));
    }

    #[test]
    fn test_lookup_prefers_local_and_cleanup() {
        let registry = VariableRegistry::open_memory().unwrap();
        registry.set(&NewVariable::global("user", "global-user")).unwrap();
        registry.set(&NewVariable::local("user", "local-user", "s1", "tc1")).unwrap();

        let found = registry.lookup("user", Some("s1"), Some("tc1")).unwrap().unwrap();
        assert_eq!(found.value, "local-user");
        let found = registry.lookup("user", Some("s1"), Some("tc9")).unwrap().unwrap();
        assert_eq!(found.value, "global-user");

        assert_eq!(registry.delete_all_local().unwrap(), 1);
        assert_eq!(registry.list(Some(Scope::Local)).unwrap().len(), 0);
        assert_eq!(registry.list(None).unwrap().len(), 1);
        assert_eq!(registry.clear_global().unwrap(), 1);
    }

    #[test]
    fn test_open_file_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("vars.db");
        {
            let registry = VariableRegistry::open(&path).unwrap();
            registry.set(&NewVariable::global("base", "http://x")).unwrap();
        }
        let registry = VariableRegistry::open(&path).unwrap();
        assert!(registry.delete(Scope::Global, None, None, "base").unwrap());
    }
}
