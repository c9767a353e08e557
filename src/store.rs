use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;

use crate::models::{HomeDocument, TestRunState};
use crate::transport::read_json;

/// Locate the newest persisted run result that mentions `binary_file_name`.
///
/// Scans every `result.json` beneath the home's test endpoint, newest first
/// by file modification time, and returns the first document with a case
/// whose assembly path contains `binary_file_name`. No directory, no files
/// or no match yields `None`; nothing here performs discovery.
pub fn find_latest_result(home: &HomeDocument, binary_file_name: &str) -> Option<TestRunState> {
    if binary_file_name.is_empty() {
        return None;
    }
    if !home.test_path.is_dir() {
        return None;
    }

    let pattern = home.test_path.join("**").join("result.json");
    let mut candidates: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())
        .ok()?
        .flatten()
        .collect();

    // Newest first. Path order breaks ties and stands in when metadata is
    // unavailable; it only approximates recency, so mtime leads.
    candidates.sort_by(|a, b| match (mtime(a), mtime(b)) {
        (Some(ma), Some(mb)) => mb.cmp(&ma).then_with(|| b.cmp(a)),
        _ => b.cmp(a),
    });

    for path in candidates {
        let Ok(result) = read_json::<TestRunState>(&path) else {
            debug!(file = %path.display(), "skipping unreadable result document");
            continue;
        };
        if result
            .cases
            .iter()
            .any(|case| case.assembly_path.contains(binary_file_name))
        {
            debug!(file = %path.display(), "matching result found");
            return Some(result);
        }
    }

    None
}

fn mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).ok()?.modified().ok()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::models::{TestCase, TestState};

    fn write_result(dir: &Path, assembly_path: &str, output: &str) {
        std::fs::create_dir_all(dir).unwrap();
        let mut case = TestCase::new("1", "Suite", "method", assembly_path);
        case.state = TestState::Passed;
        let result = TestRunState {
            state: TestState::Passed,
            duration: 10,
            output: output.to_string(),
            cases: vec![case],
        };
        std::fs::write(
            dir.join("result.json"),
            serde_json::to_string_pretty(&result).unwrap(),
        )
        .unwrap();
        // Keep modification times strictly ordered across writes.
        std::thread::sleep(Duration::from_millis(20));
    }

    fn home_for(test_path: &Path) -> HomeDocument {
        HomeDocument {
            revit_version: "2024".into(),
            log_file_path: String::new(),
            explore_path: test_path.with_file_name("explore"),
            test_path: test_path.to_path_buf(),
        }
    }

    #[test]
    fn absent_directory_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let home = home_for(&dir.path().join("missing"));
        assert!(find_latest_result(&home, "MyTests.dll").is_none());
    }

    #[test]
    fn returns_only_matching_documents_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let test_path = dir.path().join("test");

        // Written oldest to newest; run-a lands last on purpose so that a
        // lexicographic ordering would get this wrong.
        write_result(&test_path.join("run-z"), "/ci/a/build1/MyTests.dll", "first");
        write_result(&test_path.join("run-a"), "/ci/a/build2/MyTests.dll", "second");
        write_result(&test_path.join("run-m"), "/ci/b/Other.dll", "other");

        let home = home_for(&test_path);

        // run-m is newest overall but does not match; run-a is the newest match.
        let found = find_latest_result(&home, "MyTests.dll").unwrap();
        assert_eq!(found.output, "second");

        assert!(find_latest_result(&home, "Absent.dll").is_none());
        let other = find_latest_result(&home, "Other.dll").unwrap();
        assert_eq!(other.output, "other");
    }

    #[test]
    fn empty_binary_name_matches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let test_path = dir.path().join("test");
        write_result(&test_path.join("run-a"), "/ci/a/MyTests.dll", "first");

        let home = home_for(&test_path);
        assert!(find_latest_result(&home, "").is_none());
    }
}
