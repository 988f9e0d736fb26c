//! Scoped variable store and `{{name}}` template injection
//!
//! A [`VariableStore`] is shared by every suite of a run. Executors work on a
//! [`VariableScope`], a view bound to one (suite, test case) owner that
//! resolves local entries first, then globals, then the persisted registry.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use testforge_common::{NewVariable, Scope, VariableRegistry};
use tracing::{debug, warn};

use crate::error::EngineResult;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("valid placeholder pattern"));

/// Owner of local variables
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalOwner {
    pub suite_id: String,
    pub test_case_id: String,
}

#[derive(Default)]
struct Maps {
    global: HashMap<String, String>,
    local: HashMap<LocalOwner, HashMap<String, String>>,
}

/// Process-wide variable storage, passed explicitly through the engine
#[derive(Clone, Default)]
pub struct VariableStore {
    maps: Arc<RwLock<Maps>>,
    registry: Option<VariableRegistry>,
}

impl VariableStore {
    /// In-memory store without persistence
    pub fn new() -> Self {
        Self::default()
    }

    /// Store backed by the persisted registry
    pub fn with_registry(registry: VariableRegistry) -> Self {
        Self {
            maps: Arc::default(),
            registry: Some(registry),
        }
    }

    pub fn registry(&self) -> Option<&VariableRegistry> {
        self.registry.as_ref()
    }

    /// View bound to one (suite, test case)
    pub fn scope(&self, suite_id: impl Into<String>, test_case_id: impl Into<String>) -> VariableScope {
        VariableScope {
            store: self.clone(),
            owner: LocalOwner {
                suite_id: suite_id.into(),
                test_case_id: test_case_id.into(),
            },
        }
    }

    pub fn set_global(&self, name: &str, value: &str) {
        self.maps.write().global.insert(name.to_string(), value.to_string());
        self.persist(&NewVariable::global(name, value));
    }

    pub fn get_global(&self, name: &str) -> Option<String> {
        self.maps.read().global.get(name).cloned()
    }

    /// Drop every global, in memory and in the registry
    pub fn clear_global(&self) -> EngineResult<()> {
        self.maps.write().global.clear();
        if let Some(registry) = &self.registry {
            registry.clear_global()?;
        }
        Ok(())
    }

    /// End-of-run sweep of every owner's locals, in memory and in the registry
    pub fn cleanup_locals(&self) -> EngineResult<usize> {
        let in_memory = {
            let mut maps = self.maps.write();
            let n = maps.local.values().map(HashMap::len).sum::<usize>();
            maps.local.clear();
            n
        };
        let persisted = match &self.registry {
            Some(registry) => registry.delete_all_local()?,
            None => 0,
        };
        debug!(
            "Local variable cleanup: {} in memory, {} persisted",
            in_memory, persisted
        );
        Ok(in_memory.max(persisted))
    }

    fn persist(&self, variable: &NewVariable) {
        if let Some(registry) = &self.registry {
            if let Err(e) = registry.set(variable) {
                warn!("Failed to persist variable '{}': {}", variable.name, e);
            }
        }
    }
}

/// Variables visible to one test case
#[derive(Clone)]
pub struct VariableScope {
    store: VariableStore,
    owner: LocalOwner,
}

impl VariableScope {
    pub fn owner(&self) -> &LocalOwner {
        &self.owner
    }

    pub fn store(&self) -> &VariableStore {
        &self.store
    }

    /// Resolve a name: local, then global, then the registry (cached back)
    pub fn get(&self, name: &str) -> Option<String> {
        {
            let maps = self.store.maps.read();
            if let Some(v) = maps.local.get(&self.owner).and_then(|m| m.get(name)) {
                return Some(v.clone());
            }
            if let Some(v) = maps.global.get(name) {
                return Some(v.clone());
            }
        }

        let registry = self.store.registry.as_ref()?;
        match registry.lookup(name, Some(&self.owner.suite_id), Some(&self.owner.test_case_id)) {
            Ok(Some(variable)) => {
                let mut maps = self.store.maps.write();
                match variable.scope {
                    Scope::Local => maps
                        .local
                        .entry(self.owner.clone())
                        .or_default()
                        .insert(name.to_string(), variable.value.clone()),
                    Scope::Global => maps.global.insert(name.to_string(), variable.value.clone()),
                };
                Some(variable.value)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Registry lookup for '{}' failed: {}", name, e);
                None
            }
        }
    }

    pub fn set_local(&self, name: &str, value: &str) {
        self.store
            .maps
            .write()
            .local
            .entry(self.owner.clone())
            .or_default()
            .insert(name.to_string(), value.to_string());
        self.store.persist(&NewVariable::local(
            name,
            value,
            self.owner.suite_id.clone(),
            self.owner.test_case_id.clone(),
        ));
    }

    pub fn set_global(&self, name: &str, value: &str) {
        self.store.set_global(name, value);
    }

    pub fn set(&self, scope: Scope, name: &str, value: &str) {
        debug!("Storing {} variable '{}'", scope, name);
        match scope {
            Scope::Local => self.set_local(name, value),
            Scope::Global => self.set_global(name, value),
        }
    }

    /// Replace every `{{name}}`; unresolved names become empty strings
    pub fn inject(&self, template: &str) -> String {
        if !template.contains("{{") {
            return template.to_string();
        }
        PLACEHOLDER
            .replace_all(template, |caps: &Captures<'_>| self.get(&caps[1]).unwrap_or_default())
            .into_owned()
    }

    /// Inject into every string inside a JSON value, keys included
    pub fn inject_value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.inject(s)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.inject_value(v)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (self.inject(k), self.inject_value(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_inject_round_trip() {
        let store = VariableStore::new();
        let scope = store.scope("s1", "tc1");
        scope.set_global("id", "42");
        assert_eq!(scope.inject("user/{{id}}"), "user/42");
        assert_eq!(scope.inject("user/{{ id }}/{{missing}}"), "user/42/");
        assert_eq!(scope.inject("plain text { }"), "plain text { }");
    }

    #[test]
    fn test_local_shadows_global_per_owner() {
        let store = VariableStore::new();
        let a = store.scope("s1", "tc1");
        let b = store.scope("s1", "tc2");
        a.set_global("env", "global");
        a.set_local("env", "local");
        assert_eq!(a.get("env").as_deref(), Some("local"));
        assert_eq!(b.get("env").as_deref(), Some("global"));
    }

    #[test]
    fn test_cleanup_removes_locals_only() {
        let registry = VariableRegistry::open_memory().unwrap();
        let store = VariableStore::with_registry(registry.clone());
        let scope = store.scope("s1", "tc1");
        scope.set_local("token", "abc");
        scope.set_global("base", "http://x");

        store.cleanup_locals().unwrap();

        let fresh = VariableStore::with_registry(registry).scope("s1", "tc1");
        assert_eq!(fresh.get("token"), None);
        assert_eq!(fresh.inject("{{token}}"), "");
        assert_eq!(fresh.get("base").as_deref(), Some("http://x"));
    }

    #[test]
    fn test_registry_fallback_is_cached() {
        let registry = VariableRegistry::open_memory().unwrap();
        registry.set(&NewVariable::global("seeded", "yes")).unwrap();
        let store = VariableStore::with_registry(registry.clone());
        assert_eq!(store.scope("s", "t").get("seeded").as_deref(), Some("yes"));
        registry.clear_global().unwrap();
        assert_eq!(store.get_global("seeded").as_deref(), Some("yes"));
    }

    #[test]
    fn test_inject_value_recurses() {
        let store = VariableStore::new();
        let scope = store.scope("s", "t");
        scope.set_local("name", "Ada");
        let body = json!({"user": {"name": "{{name}}", "tags": ["{{name}}", 1]}});
        assert_eq!(
            scope.inject_value(&body),
            json!({"user": {"name": "Ada", "tags": ["Ada", 1]}})
        );
    }
}
