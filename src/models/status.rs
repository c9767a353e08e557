use serde::{Deserialize, Serialize};

/// Execution state of a single test case, and of a whole run.
///
/// The host only moves a case forward: once `Passed` or `Failed` it does not
/// revert to `Unknown`. Unrecognized wire values map to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TestState {
    Running,
    Passed,
    Failed,
    Skipped,
    #[default]
    #[serde(other)]
    Unknown,
}

impl TestState {
    pub fn icon(&self) -> &'static str {
        match self {
            TestState::Unknown => "◌",
            TestState::Running => "⟳",
            TestState::Passed => "✔",
            TestState::Failed => "✘",
            TestState::Skipped => "⊘",
        }
    }

    /// Passed and Failed are final; everything else may still change.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TestState::Passed | TestState::Failed)
    }
}
