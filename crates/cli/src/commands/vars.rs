//! Variable Commands

use anyhow::{bail, Result};
use chrono::{TimeZone, Utc};
use clap::{Subcommand, ValueEnum};
use serde::Serialize;
use testforge_common::{NewVariable, Scope, Variable, VariableRegistry};
use testforge_engine::EngineConfig;

use crate::output::{print_list, print_success, print_warning, OutputFormat, TableDisplay};

#[derive(Subcommand)]
pub enum VarsCommands {
    /// List persisted variables
    List {
        /// Only show one scope
        #[arg(short, long)]
        scope: Option<ScopeArg>,
    },

    /// Add a variable; an existing name is rejected unless --override is given
    Set {
        name: String,
        value: String,

        #[arg(short, long, default_value = "global")]
        scope: ScopeArg,

        /// Owning suite id (local variables)
        #[arg(long)]
        suite: Option<String>,

        /// Owning test case id (local variables)
        #[arg(long)]
        case: Option<String>,

        /// Replace an existing variable of the same name
        #[arg(long = "override")]
        allow_override: bool,
    },

    /// Delete one variable
    Delete {
        name: String,

        #[arg(short, long, default_value = "global")]
        scope: ScopeArg,

        #[arg(long)]
        suite: Option<String>,

        #[arg(long)]
        case: Option<String>,
    },

    /// Remove every global variable
    ClearGlobal,

    /// Remove every local variable
    CleanupLocal,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ScopeArg {
    Global,
    Local,
}

impl From<ScopeArg> for Scope {
    fn from(arg: ScopeArg) -> Self {
        match arg {
            ScopeArg::Global => Scope::Global,
            ScopeArg::Local => Scope::Local,
        }
    }
}

/// Variable display wrapper for serialization
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableDisplay {
    pub name: String,
    pub value: String,
    pub scope: String,
    pub suite_id: String,
    pub test_case_id: String,
    pub updated_at: String,
}

impl From<Variable> for VariableDisplay {
    fn from(v: Variable) -> Self {
        Self {
            name: v.name,
            value: v.value,
            scope: v.scope.to_string(),
            suite_id: v.suite_id.unwrap_or_default(),
            test_case_id: v.test_case_id.unwrap_or_default(),
            updated_at: Utc
                .timestamp_opt(v.updated_at, 0)
                .single()
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default(),
        }
    }
}

impl TableDisplay for VariableDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Name", "Value", "Scope", "Suite", "Test Case", "Updated"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.value.clone(),
            self.scope.clone(),
            self.suite_id.clone(),
            self.test_case_id.clone(),
            self.updated_at.clone(),
        ]
    }
}

fn open_registry(config: &EngineConfig) -> Result<VariableRegistry> {
    match &config.registry_path {
        Some(path) => Ok(VariableRegistry::open(path)?),
        None => bail!("no variable registry configured (TESTFORGE_REGISTRY is empty)"),
    }
}

pub fn execute(cmd: VarsCommands, config: &EngineConfig, format: OutputFormat) -> Result<()> {
    let registry = open_registry(config)?;

    match cmd {
        VarsCommands::List { scope } => {
            let items: Vec<VariableDisplay> = registry
                .list(scope.map(Scope::from))?
                .into_iter()
                .map(VariableDisplay::from)
                .collect();
            print_list(&items, format);
        }
        VarsCommands::Set {
            name,
            value,
            scope,
            suite,
            case,
            allow_override,
        } => {
            let variable = match scope {
                ScopeArg::Global => NewVariable::global(&name, value),
                ScopeArg::Local => NewVariable {
                    name: name.clone(),
                    value,
                    scope: Scope::Local,
                    suite_id: suite,
                    test_case_id: case,
                },
            };
            let stored = registry.add(&variable, allow_override)?;
            print_success(&format!("Set {} variable '{}'", stored.scope, stored.name));
        }
        VarsCommands::Delete {
            name,
            scope,
            suite,
            case,
        } => {
            if registry.delete(scope.into(), suite.as_deref(), case.as_deref(), &name)? {
                print_success(&format!("Deleted variable '{}'", name));
            } else {
                print_warning(&format!("No variable named '{}'", name));
            }
        }
        VarsCommands::ClearGlobal => {
            let n = registry.clear_global()?;
            print_success(&format!("Removed {} global variable(s)", n));
        }
        VarsCommands::CleanupLocal => {
            let n = registry.delete_all_local()?;
            print_success(&format!("Removed {} local variable(s)", n));
        }
    }

    Ok(())
}
