use serde::{Deserialize, Serialize};

use super::dto::TestCase;
use super::status::TestState;

/// Aggregate snapshot of a test run, as persisted by the host in
/// `result.json` and overwritten in place while the run proceeds.
///
/// The top-level `state` is `Passed` only when every case passed and
/// `Failed` when any case failed; it stays `Unknown` until all cases have
/// resolved.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunState {
    #[serde(default)]
    pub state: TestState,
    /// Run duration in milliseconds.
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub cases: Vec<TestCase>,
}

impl TestRunState {
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            total: self.cases.len(),
            duration: self.duration,
            ..RunSummary::default()
        };
        for case in &self.cases {
            match case.state {
                TestState::Passed => summary.passed += 1,
                TestState::Failed => summary.failed += 1,
                TestState::Skipped => summary.skipped += 1,
                TestState::Unknown | TestState::Running => {}
            }
        }
        summary
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration: u64,
}

impl RunSummary {
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn result_document_deserializes_with_defaults() {
        let json = r#"{
            "state": "Failed",
            "duration": 1250,
            "output": "2 cases executed",
            "cases": [
                {
                    "id": "1001",
                    "testClass": "WallTests",
                    "methodName": "CreatesWall",
                    "assemblyPath": "C:\\build\\MyTests.dll",
                    "state": "Passed",
                    "startTime": "2024-03-01T10:00:00Z",
                    "endTime": "2024-03-01T10:00:01Z"
                },
                {
                    "id": "1002",
                    "testClass": "WallTests",
                    "methodName": "DeletesWall",
                    "assemblyPath": "C:\\build\\MyTests.dll",
                    "state": "Failed",
                    "message": "assertion failed",
                    "stackTrace": "at WallTests.DeletesWall()"
                }
            ]
        }"#;

        let state: TestRunState = serde_json::from_str(json).unwrap();
        assert_eq!(state.state, TestState::Failed);
        assert!(state.is_terminal());
        assert_eq!(state.cases.len(), 2);
        assert_eq!(state.cases[0].full_name(), "WallTests.CreatesWall");
        assert_eq!(state.cases[1].message.as_deref(), Some("assertion failed"));
        assert!(state.cases[0].start_time.is_some());
        assert!(state.cases[1].start_time.is_none());
    }

    #[test]
    fn unrecognized_state_maps_to_unknown() {
        let case: TestCase = serde_json::from_str(
            r#"{"id":"1","testClass":"T","methodName":"m","assemblyPath":"a.dll","state":"Exploded"}"#,
        )
        .unwrap();
        assert_eq!(case.state, TestState::Unknown);
        assert!(!case.state.is_terminal());
    }

    #[test]
    fn summary_counts_terminal_cases() {
        let mut state = TestRunState {
            state: TestState::Failed,
            duration: 400,
            ..TestRunState::default()
        };
        for (id, case_state) in [
            ("1", TestState::Passed),
            ("2", TestState::Passed),
            ("3", TestState::Failed),
            ("4", TestState::Skipped),
        ] {
            let mut case = TestCase::new(id, "Suite", "method", "MyTests.dll");
            case.state = case_state;
            state.cases.push(case);
        }

        let summary = state.summary();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.passed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert!(!summary.success());
    }
}
