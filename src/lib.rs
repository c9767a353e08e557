//! Client for the file-based protocol of a Revit-hosted test runner service.
//!
//! The host accepts work only through a shared watched directory: requests
//! are JSON files the client drops in, responses and run results are JSON
//! files the host writes back. This crate covers service discovery, the
//! versioned freezing of test builds, explore and run requests, progress
//! polling until a terminal state, and lookup of persisted results.

pub mod config;
pub mod discovery;
pub mod error;
pub mod models;
pub mod resolver;
pub mod runner;
pub mod store;
pub mod transport;

pub use config::Config;
pub use error::ClientError;
pub use models::{
    ExploreRequest, ExploreResponse, HomeDocument, HomeRequest, RunSummary, TestCase,
    TestRequest, TestResponse, TestRunState, TestState,
};
pub use runner::{HostHandle, HostLauncher, RunEvent, TestRunnerClient, Timing};
pub use transport::FileClient;
