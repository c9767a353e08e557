use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    /// Root of the watched protocol directory shared with the host service.
    #[serde(default = "default_watch_dir")]
    pub watch_dir: PathBuf,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub host: HostConfig,
}

/// Identity stamped on every request the client writes.
#[derive(Debug, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_client_name")]
    pub name: String,
    #[serde(default = "default_client_version")]
    pub version: String,
}

/// Optional host process launch settings.
#[derive(Debug, Default, Deserialize)]
pub struct HostConfig {
    /// Command line used to start the host when no service is listening.
    /// Example: "revit.exe /language ENU"
    pub command: Option<String>,
}

impl Config {
    /// Load `rtr.toml` from `dir`, falling back to defaults if absent or invalid.
    pub fn load(dir: &Path) -> Self {
        let path = dir.join("rtr.toml");
        let Ok(content) = std::fs::read_to_string(&path) else {
            return Self::default();
        };
        toml::from_str(&content).unwrap_or_default()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            watch_dir: default_watch_dir(),
            client: ClientConfig::default(),
            host: HostConfig::default(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: default_client_name(),
            version: default_client_version(),
        }
    }
}

#[cfg(windows)]
fn default_watch_dir() -> PathBuf {
    PathBuf::from(r"C:\ProgramData\Revit.TestRunner")
}

#[cfg(not(windows))]
fn default_watch_dir() -> PathBuf {
    std::env::temp_dir().join("revit-testrunner")
}

fn default_client_name() -> String {
    env!("CARGO_PKG_NAME").to_string()
}

fn default_client_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path());
        assert_eq!(config.client.name, env!("CARGO_PKG_NAME"));
        assert!(config.host.command.is_none());
    }

    #[test]
    fn toml_overrides_watch_dir_and_host_command() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("rtr.toml"),
            r#"
watch_dir = "/srv/runner-exchange"

[client]
name = "nightly-ci"

[host]
command = "revit.exe /language ENU"
"#,
        )
        .unwrap();

        let config = Config::load(dir.path());
        assert_eq!(config.watch_dir, PathBuf::from("/srv/runner-exchange"));
        assert_eq!(config.client.name, "nightly-ci");
        assert_eq!(config.client.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(config.host.command.as_deref(), Some("revit.exe /language ENU"));
    }
}
