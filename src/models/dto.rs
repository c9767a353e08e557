use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::TestState;

/// Service metadata advertised by the host at the watch-directory root.
///
/// `explore_path` and `test_path` are the endpoint directories for the two
/// request kinds. Produced by the host, read-only for the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeDocument {
    pub revit_version: String,
    pub log_file_path: String,
    pub explore_path: PathBuf,
    pub test_path: PathBuf,
}

/// Body of the discovery request dropped at the watch-directory root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeRequest {
    pub timestamp: DateTime<Utc>,
    pub client_name: String,
    pub client_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExploreRequest {
    pub assembly_path: PathBuf,
}

/// Response to an explore request. `message` is populated on partial
/// failure, e.g. when the host could load only part of the assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExploreResponse {
    pub explore_file: PathBuf,
    #[serde(default)]
    pub message: Option<String>,
}

/// A single test case, identified by class and method within an assembly.
///
/// The run attributes (`state`, `message`, `stack_trace`, timestamps) are
/// written by the host as execution proceeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub id: String,
    pub test_class: String,
    pub method_name: String,
    pub assembly_path: String,
    #[serde(default)]
    pub state: TestState,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub stack_trace: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

impl TestCase {
    pub fn new(
        id: impl Into<String>,
        test_class: impl Into<String>,
        method_name: impl Into<String>,
        assembly_path: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            test_class: test_class.into(),
            method_name: method_name.into(),
            assembly_path: assembly_path.into(),
            state: TestState::Unknown,
            message: None,
            stack_trace: None,
            start_time: None,
            end_time: None,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}.{}", self.test_class, self.method_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRequest {
    pub timestamp: DateTime<Utc>,
    pub cases: Vec<TestCase>,
}

/// Response to a test request, pointing at the result document the host
/// will create and keep overwriting until the run reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResponse {
    pub result_file: PathBuf,
}
