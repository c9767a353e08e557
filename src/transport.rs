//! Request/response exchange over a watched directory.
//!
//! A request is one JSON file written into an endpoint directory
//! (`<id>.request`); the host answers by writing `<id>.response` next to it.
//! There is no push channel, so the response is polled for with a bounded
//! attempt budget. An exhausted budget means "no counterpart is listening
//! yet" and is a normal outcome, not an error.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{ClientError, Result};

pub const DEFAULT_ATTEMPTS: u32 = 10;
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(200);

static REQUEST_SEQ: AtomicU64 = AtomicU64::new(0);

/// Writes request files into the watched directory and polls for the
/// correspondingly named response files.
#[derive(Debug, Clone)]
pub struct FileClient {
    root: PathBuf,
    client_name: String,
    client_version: String,
}

impl FileClient {
    pub fn new(
        root: impl Into<PathBuf>,
        client_name: impl Into<String>,
        client_version: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            client_name: client_name.into(),
            client_version: client_version.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    pub fn client_version(&self) -> &str {
        &self.client_version
    }

    /// Submit `request` to an endpoint directory and await the response.
    ///
    /// Writes exactly one file per call. Returns `Ok(None)` when the attempt
    /// budget is exhausted or `cancel` fires; a response file that never
    /// becomes readable within the budget is a [`ClientError::MalformedResponse`].
    pub async fn submit<Req, Resp>(
        &self,
        endpoint: &Path,
        request: &Req,
        attempts: u32,
        interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<Option<Resp>>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        std::fs::create_dir_all(endpoint)?;

        let id = next_request_id();
        let request_file = endpoint.join(format!("{id}.request"));
        let response_file = endpoint.join(format!("{id}.response"));

        std::fs::write(&request_file, serde_json::to_string_pretty(request)?)?;
        debug!(file = %request_file.display(), "request written");

        self.await_response(&response_file, attempts, interval, cancel)
            .await
    }

    async fn await_response<Resp>(
        &self,
        response_file: &Path,
        attempts: u32,
        interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<Option<Resp>>
    where
        Resp: DeserializeOwned,
    {
        for attempt in 1..=attempts {
            if cancel.is_cancelled() {
                return Ok(None);
            }

            if response_file.exists() {
                match read_json::<Resp>(response_file) {
                    Ok(response) => {
                        debug!(file = %response_file.display(), attempt, "response received");
                        return Ok(Some(response));
                    }
                    // Possibly still being written; treat as not yet ready.
                    Err(err) if attempt < attempts => {
                        debug!(file = %response_file.display(), %err, "response not yet readable");
                    }
                    Err(err) => {
                        return Err(ClientError::MalformedResponse {
                            path: response_file.to_path_buf(),
                            attempts,
                            reason: err.to_string(),
                        });
                    }
                }
            }

            if attempt < attempts {
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(None),
                    _ = sleep(interval) => {}
                }
            }
        }

        debug!(file = %response_file.display(), attempts, "no response within budget");
        Ok(None)
    }
}

/// Read and deserialize a JSON document in one shot.
///
/// Any failure, missing file included, maps to an error; pollers decide
/// whether that means "not yet ready" or a real fault.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn next_request_id() -> String {
    let seq = REQUEST_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{}_{seq:04}", Utc::now().format("%Y%m%d_%H%M%S_%6f"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_are_unique_and_sortable() {
        let a = next_request_id();
        let b = next_request_id();
        assert_ne!(a, b);
        assert!(a < b);
    }
}
