//! Execution target addressing
//!
//! `suiteId:suiteName[ > testCaseId:testCaseName[ > testDataIndex:testDataName]]`

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{EngineError, EngineResult};

const LEVEL_SEPARATOR: &str = " > ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Suite,
    TestCase,
    TestData,
}

/// Parsed address of a suite, a test case or a single test data item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionTarget {
    #[serde(rename = "type")]
    pub target_type: TargetType,
    pub suite_id: String,
    pub suite_name: String,
    pub test_case_id: Option<String>,
    pub test_case_name: Option<String>,
    pub test_data_index: Option<usize>,
    pub test_data_name: Option<String>,
}

impl ExecutionTarget {
    pub fn parse(input: &str) -> EngineResult<Self> {
        let segments: Vec<(&str, &str)> = input
            .split(LEVEL_SEPARATOR)
            .map(|segment| {
                segment
                    .trim()
                    .split_once(':')
                    .map(|(key, name)| (key.trim(), name.trim()))
                    .ok_or_else(|| EngineError::TargetFormat(input.to_string()))
            })
            .collect::<EngineResult<_>>()?;

        match segments.as_slice() {
            [(suite_id, suite_name)] => Ok(Self::suite(suite_id, suite_name)),
            [(suite_id, suite_name), (case_id, case_name)] => Ok(Self {
                target_type: TargetType::TestCase,
                test_case_id: Some(case_id.to_string()),
                test_case_name: Some(case_name.to_string()),
                ..Self::suite(suite_id, suite_name)
            }),
            [(suite_id, suite_name), (case_id, case_name), (index, data_name)] => {
                let index = index
                    .parse::<usize>()
                    .map_err(|_| EngineError::TargetFormat(input.to_string()))?;
                Ok(Self {
                    target_type: TargetType::TestData,
                    test_case_id: Some(case_id.to_string()),
                    test_case_name: Some(case_name.to_string()),
                    test_data_index: Some(index),
                    test_data_name: Some(data_name.to_string()),
                    ..Self::suite(suite_id, suite_name)
                })
            }
            _ => Err(EngineError::TargetFormat(input.to_string())),
        }
    }

    /// Whole-suite target
    pub fn suite(suite_id: &str, suite_name: &str) -> Self {
        Self {
            target_type: TargetType::Suite,
            suite_id: suite_id.to_string(),
            suite_name: suite_name.to_string(),
            test_case_id: None,
            test_case_name: None,
            test_data_index: None,
            test_data_name: None,
        }
    }

    /// Human-readable label for logs and report names
    pub fn label(&self) -> String {
        let mut label = if self.suite_name.is_empty() {
            self.suite_id.clone()
        } else {
            self.suite_name.clone()
        };
        if let Some(case) = self.test_case_name.as_ref().or(self.test_case_id.as_ref()) {
            label.push_str(LEVEL_SEPARATOR);
            label.push_str(case);
        }
        if let Some(index) = self.test_data_index {
            label.push_str(&format!("{}#{}", LEVEL_SEPARATOR, index));
        }
        label
    }
}

impl FromStr for ExecutionTarget {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        Self::parse(s)
    }
}
