//! Versioned build resolver.
//!
//! Running tests straight out of a build output directory would give every
//! rebuild the same identity, so cached results and result matching would go
//! stale silently. Instead the whole build directory is frozen under a
//! version-identified sibling directory and tests run against that copy.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{ClientError, Result};

/// Hex digits of the content digest used as the version identifier.
const VERSION_ID_LEN: usize = 12;

/// Map a test assembly to its frozen, version-identified copy.
///
/// The version directory is `<buildDir>Versions/<version>` next to the build
/// directory; once populated it is treated as immutable and never re-copied.
/// The copy is staged in a temporary directory and published with a single
/// rename, so an observer can never mistake a partial copy for a complete
/// one. Blocking; call through `spawn_blocking` from async code.
pub fn resolve(assembly_path: &Path) -> Result<PathBuf> {
    if !assembly_path.is_file() {
        return Err(ClientError::AssemblyNotFound {
            path: assembly_path.to_path_buf(),
        });
    }

    let build_dir = assembly_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or_else(|| ClientError::AssemblyNotFound {
            path: assembly_path.to_path_buf(),
        })?;
    let file_name = assembly_path.file_name().expect("is_file checked above");

    let version = build_version(assembly_path)?;
    let dir_name = build_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let versions_root = build_dir.with_file_name(format!("{dir_name}Versions"));
    let version_dir = versions_root.join(&version);
    let versioned_assembly = version_dir.join(file_name);

    if versioned_assembly.exists() {
        debug!(path = %versioned_assembly.display(), "versioned build already frozen");
        return Ok(versioned_assembly);
    }

    std::fs::create_dir_all(&versions_root)?;
    let staging = tempfile::Builder::new()
        .prefix(".staging-")
        .tempdir_in(&versions_root)?;
    copy_dir_recursive(build_dir, staging.path())?;

    if let Err(err) = std::fs::rename(staging.path(), &version_dir) {
        // A concurrent resolve may have published first; their copy is as
        // good as ours. The staging directory is cleaned up on drop.
        if !version_dir.exists() {
            return Err(err.into());
        }
    }

    info!(version, path = %version_dir.display(), "build frozen");
    Ok(versioned_assembly)
}

/// Version identifier of a build: a prefix of the SHA-256 of the assembly
/// bytes. Identical bytes resolve to the identical version directory.
fn build_version(assembly_path: &Path) -> Result<String> {
    let bytes = std::fs::read(assembly_path)?;
    let digest = Sha256::digest(&bytes);
    Ok(format!("{digest:x}")[..VERSION_ID_LEN].to_string())
}

fn copy_dir_recursive(source: &Path, target: &Path) -> Result<()> {
    std::fs::create_dir_all(target)?;
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        let dest = target.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &dest)?;
        } else {
            std::fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn fake_build_dir(root: &Path) -> PathBuf {
        let build = root.join("bin").join("Debug");
        std::fs::create_dir_all(build.join("runtimes")).unwrap();
        std::fs::write(build.join("MyTests.dll"), b"assembly-bytes-v1").unwrap();
        std::fs::write(build.join("MyTests.pdb"), b"symbols").unwrap();
        std::fs::write(build.join("runtimes").join("dep.dll"), b"dependency").unwrap();
        build
    }

    #[test]
    fn missing_assembly_is_a_not_found_error() {
        let err = resolve(Path::new("/does/not/exist/MyTests.dll")).unwrap_err();
        assert!(matches!(err, ClientError::AssemblyNotFound { .. }));
    }

    #[test]
    fn resolve_freezes_the_whole_build_directory() {
        let root = tempfile::tempdir().unwrap();
        let build = fake_build_dir(root.path());

        let versioned = resolve(&build.join("MyTests.dll")).unwrap();
        assert!(versioned.ends_with("MyTests.dll"));
        assert!(versioned.exists());

        let version_dir = versioned.parent().unwrap();
        assert!(version_dir.join("MyTests.pdb").exists());
        assert!(version_dir.join("runtimes").join("dep.dll").exists());
        assert_eq!(
            version_dir.parent().unwrap().file_name().unwrap(),
            "DebugVersions"
        );
    }

    #[test]
    fn resolve_is_idempotent_and_never_recopies() {
        let root = tempfile::tempdir().unwrap();
        let build = fake_build_dir(root.path());
        let assembly = build.join("MyTests.dll");

        let first = resolve(&assembly).unwrap();
        // Mutating a sibling after the freeze must not leak into the
        // version directory on a second resolve.
        std::fs::write(build.join("MyTests.pdb"), b"rebuilt-symbols").unwrap();

        let second = resolve(&assembly).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            std::fs::read(first.parent().unwrap().join("MyTests.pdb")).unwrap(),
            b"symbols"
        );
    }

    #[test]
    fn rebuilt_binary_gets_a_distinct_version_directory() {
        let root = tempfile::tempdir().unwrap();
        let build = fake_build_dir(root.path());
        let assembly = build.join("MyTests.dll");

        let first = resolve(&assembly).unwrap();
        std::fs::write(&assembly, b"assembly-bytes-v2").unwrap();
        let second = resolve(&assembly).unwrap();

        assert_ne!(first, second);
        assert!(first.exists());
        assert!(second.exists());
    }

    #[test]
    fn no_staging_directories_survive_a_resolve() {
        let root = tempfile::tempdir().unwrap();
        let build = fake_build_dir(root.path());

        let versioned = resolve(&build.join("MyTests.dll")).unwrap();
        let versions_root = versioned.parent().unwrap().parent().unwrap();

        let entries: Vec<_> = std::fs::read_dir(versions_root)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].starts_with(".staging-"));
    }
}
