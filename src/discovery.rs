use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::Result;
use crate::models::{HomeDocument, HomeRequest};
use crate::transport::FileClient;

/// Host start-up is much slower than normal request turnaround, so discovery
/// carries its own budget: 30 attempts at 2 s, about a minute overall.
pub const DISCOVERY_ATTEMPTS: u32 = 30;
pub const DISCOVERY_INTERVAL: Duration = Duration::from_millis(2000);

/// Ask the service to identify itself.
///
/// One request/response exchange against the watch-directory root. `None`
/// means no compatible service answered within the budget; repeated calls
/// are safe and each runs its own full budget.
pub async fn discover_home(
    client: &FileClient,
    attempts: u32,
    interval: Duration,
    cancel: &CancellationToken,
) -> Result<Option<HomeDocument>> {
    let request = HomeRequest {
        timestamp: Utc::now(),
        client_name: client.client_name().to_string(),
        client_version: client.client_version().to_string(),
    };

    let root = client.root().to_path_buf();
    let home: Option<HomeDocument> = client
        .submit(&root, &request, attempts, interval, cancel)
        .await?;

    match &home {
        Some(home) => debug!(revit = %home.revit_version, "runner service discovered"),
        None => debug!("no runner service answered"),
    }

    Ok(home)
}
