use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the protocol client.
///
/// "The service did not respond" is deliberately not represented here; an
/// unavailable counterpart is a normal outcome and shows up as `None` (or a
/// terminal run event) at the call sites.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The test assembly handed to the resolver does not exist.
    #[error("test assembly not found: {}", path.display())]
    AssemblyNotFound { path: PathBuf },

    /// A response file existed but stayed unreadable through the whole
    /// retry budget.
    #[error("response file {} unreadable after {attempts} attempts: {reason}", path.display())]
    MalformedResponse {
        path: PathBuf,
        attempts: u32,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;
