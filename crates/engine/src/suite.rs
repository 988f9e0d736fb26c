//! Suite file discovery and loading

use std::path::{Path, PathBuf};
use testforge_common::TestSuite;
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};

/// A suite together with the file it was loaded from
#[derive(Debug, Clone)]
pub struct SuiteFile {
    pub path: PathBuf,
    pub suite: TestSuite,
}

impl SuiteFile {
    pub fn from_json(json: &str) -> EngineResult<TestSuite> {
        let suite: TestSuite = serde_json::from_str(json).map_err(|e| EngineError::SuiteLoad(e.to_string()))?;
        if suite.test_cases.is_empty() {
            return Err(EngineError::SuiteLoad(format!("suite '{}' has no test cases", suite.suite_name)));
        }
        Ok(suite)
    }

    pub fn from_file(path: &Path) -> EngineResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::SuiteLoad(format!("{}: {}", path.display(), e)))?;
        let suite = Self::from_json(&content).map_err(|e| match e {
            EngineError::SuiteLoad(msg) => EngineError::SuiteLoad(format!("{}: {}", path.display(), msg)),
            other => other,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            suite,
        })
    }

    /// Every `*.json` file under `dir`, sorted by path
    pub fn discover(dir: &Path) -> EngineResult<Vec<PathBuf>> {
        if !dir.is_dir() {
            return Err(EngineError::SuiteLoad(format!(
                "suite directory not found: {}",
                dir.display()
            )));
        }

        let mut paths: Vec<PathBuf> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "json")
                    .unwrap_or(false)
            })
            .map(|e| e.into_path())
            .collect();
        paths.sort();

        debug!("Discovered {} suite file(s) in {}", paths.len(), dir.display());
        Ok(paths)
    }

    /// First suite under `dir` whose id or name matches
    pub fn find(dir: &Path, suite_id: &str, suite_name: &str) -> EngineResult<Self> {
        for path in Self::discover(dir)? {
            match Self::from_file(&path) {
                Ok(file) if file.suite.is_identified_by(suite_id, suite_name) => return Ok(file),
                Ok(_) => {}
                Err(e) => warn!("Ignoring unreadable suite file: {}", e),
            }
        }
        Err(EngineError::SuiteNotFound(format!("{}:{}", suite_id, suite_name)))
    }

    /// Directory that relative body and schema files resolve against
    pub fn base_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }
}
