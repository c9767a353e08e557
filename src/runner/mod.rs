pub mod launcher;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::discovery::{self, DISCOVERY_ATTEMPTS, DISCOVERY_INTERVAL};
use crate::error::Result;
use crate::models::{
    ExploreRequest, ExploreResponse, HomeDocument, TestCase, TestRequest, TestResponse,
    TestRunState,
};
use crate::resolver;
use crate::transport::{DEFAULT_ATTEMPTS, DEFAULT_INTERVAL, FileClient, read_json};

/// Consecutive unreadable snapshots tolerated before the run is given up.
const MAX_SNAPSHOT_RETRIES: u32 = 10;

/// Events streamed from an in-flight run to its caller.
///
/// Emitted in strictly increasing observation order; the stream ends with
/// either a terminal `Progress` snapshot or a single `Terminated`.
#[derive(Debug)]
pub enum RunEvent {
    /// A self-consistent snapshot of the run, as last read from the result
    /// document. Final when `state.is_terminal()`.
    Progress(TestRunState),
    /// The run ended without a terminal result document.
    Terminated { message: String },
}

/// Starts the external host process. Kept apart from the protocol: the
/// orchestrator invokes it once per workflow, before discovery, and the
/// retry loops know nothing about it.
#[async_trait]
pub trait HostLauncher: Send + Sync {
    /// Make sure a host process is running.
    async fn ensure_running(&self) -> AnyResult<HostHandle>;

    /// Stop a host this launcher started earlier. No-op otherwise.
    async fn shutdown(&self);
}

/// Outcome of [`HostLauncher::ensure_running`].
#[derive(Debug, Clone, Copy)]
pub struct HostHandle {
    /// True when this call started a fresh process (as opposed to finding
    /// one already running).
    pub is_new: bool,
}

/// Poll budgets and intervals, configurable per client.
#[derive(Debug, Clone)]
pub struct Timing {
    pub discovery_attempts: u32,
    pub discovery_interval: Duration,
    /// Budget for request/response exchanges once a service is known.
    pub submit_attempts: u32,
    pub submit_interval: Duration,
    /// Budget for the explore response; the host has to load the assembly
    /// first, which takes longer than normal turnaround.
    pub explore_attempts: u32,
    pub explore_interval: Duration,
    /// Budget for the result document to come into existence after a test
    /// request was accepted.
    pub result_wait_attempts: u32,
    pub result_wait_interval: Duration,
    /// Pause between successive reads of the result document.
    pub progress_interval: Duration,
    /// Pause between discovery rounds of the status watcher.
    pub watch_interval: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            discovery_attempts: DISCOVERY_ATTEMPTS,
            discovery_interval: DISCOVERY_INTERVAL,
            submit_attempts: DEFAULT_ATTEMPTS,
            submit_interval: DEFAULT_INTERVAL,
            explore_attempts: 30,
            explore_interval: Duration::from_millis(1000),
            result_wait_attempts: 10,
            result_wait_interval: Duration::from_millis(200),
            progress_interval: Duration::from_millis(500),
            watch_interval: Duration::from_millis(1000),
        }
    }
}

/// Client for the file-based runner protocol: explore the test cases in an
/// assembly, run selected cases while streaming progress, watch for the
/// service to come up.
///
/// Supports one in-flight run at a time; the home descriptor is rediscovered
/// per workflow and threaded through as a local value, never cached in
/// shared state.
pub struct TestRunnerClient {
    file_client: FileClient,
    timing: Timing,
    launcher: Option<Arc<dyn HostLauncher>>,
}

impl TestRunnerClient {
    pub fn new(config: &Config) -> Self {
        Self {
            file_client: FileClient::new(
                config.watch_dir.clone(),
                config.client.name.clone(),
                config.client.version.clone(),
            ),
            timing: Timing::default(),
            launcher: None,
        }
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn HostLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn file_client(&self) -> &FileClient {
        &self.file_client
    }

    /// Discover the service with the full discovery budget.
    pub async fn discover(&self, cancel: &CancellationToken) -> Result<Option<HomeDocument>> {
        discovery::discover_home(
            &self.file_client,
            self.timing.discovery_attempts,
            self.timing.discovery_interval,
            cancel,
        )
        .await
    }

    /// Enumerate the test cases in an assembly without executing them.
    ///
    /// With `use_latest_build` the assembly is first frozen through the
    /// versioned build resolver and the frozen copy is explored. `Ok(None)`
    /// means no service answered; callers render that, they do not crash.
    pub async fn explore(
        &self,
        assembly_path: &Path,
        use_latest_build: bool,
        cancel: &CancellationToken,
    ) -> Result<Option<ExploreResponse>> {
        let assembly = if use_latest_build {
            let path = assembly_path.to_path_buf();
            tokio::task::spawn_blocking(move || resolver::resolve(&path))
                .await
                .map_err(std::io::Error::other)??
        } else {
            assembly_path.to_path_buf()
        };

        self.launch_host().await;

        let Some(home) = self.discover(cancel).await? else {
            info!("runner service not available");
            return Ok(None);
        };

        let request = ExploreRequest { assembly_path: assembly };
        self.file_client
            .submit(
                &home.explore_path,
                &request,
                self.timing.explore_attempts,
                self.timing.explore_interval,
                cancel,
            )
            .await
    }

    /// Execute `cases` and stream progress over `events` until the run
    /// reaches a terminal state.
    ///
    /// Every outcome flows through the channel: snapshots while the host
    /// executes, a terminal snapshot at the end, or a single
    /// [`RunEvent::Terminated`] when the service is unavailable or the
    /// result document never materializes.
    pub async fn run(
        &self,
        cases: Vec<TestCase>,
        events: &mpsc::UnboundedSender<RunEvent>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let started_fresh = self.launch_host().await;

        let Some(home) = self.discover(cancel).await? else {
            let _ = events.send(RunEvent::Terminated {
                message: "Timeout. Runner service not available!".into(),
            });
            return Ok(());
        };

        let request = TestRequest {
            timestamp: Utc::now(),
            cases,
        };
        let response: Option<TestResponse> = self
            .file_client
            .submit(
                &home.test_path,
                &request,
                self.timing.submit_attempts,
                self.timing.submit_interval,
                cancel,
            )
            .await?;

        let Some(response) = response else {
            let _ = events.send(RunEvent::Terminated {
                message: "Test request was not accepted by the runner service.".into(),
            });
            return Ok(());
        };

        if self.await_result_file(&response.result_file, cancel).await {
            self.stream_progress(&response.result_file, events, cancel)
                .await;
        } else if !cancel.is_cancelled() {
            let _ = events.send(RunEvent::Terminated {
                message: "Tests not executed! Service may not be running.".into(),
            });
        }

        if started_fresh
            && let Some(launcher) = &self.launcher
        {
            launcher.shutdown().await;
        }

        Ok(())
    }

    /// Absorb the host's request-to-start latency: poll for the result
    /// document's existence with a small bounded budget.
    async fn await_result_file(&self, result_file: &Path, cancel: &CancellationToken) -> bool {
        for attempt in 1..=self.timing.result_wait_attempts {
            if cancel.is_cancelled() {
                return false;
            }
            if result_file.exists() {
                return true;
            }
            debug!(attempt, "waiting for result document");
            if attempt < self.timing.result_wait_attempts {
                tokio::select! {
                    _ = cancel.cancelled() => return false,
                    _ = sleep(self.timing.result_wait_interval) => {}
                }
            }
        }
        result_file.exists()
    }

    /// Re-read the result document until its aggregate state turns terminal,
    /// emitting one event per observed snapshot.
    async fn stream_progress(
        &self,
        result_file: &Path,
        events: &mpsc::UnboundedSender<RunEvent>,
        cancel: &CancellationToken,
    ) {
        let mut unreadable_reads = 0u32;

        while !cancel.is_cancelled() {
            match read_json::<TestRunState>(result_file) {
                Ok(snapshot) => {
                    unreadable_reads = 0;
                    let terminal = snapshot.is_terminal();
                    let _ = events.send(RunEvent::Progress(snapshot));
                    if terminal {
                        debug!("run reached terminal state");
                        return;
                    }
                }
                // The host overwrites the document in place; a torn read
                // counts as not yet ready.
                Err(err) => {
                    unreadable_reads += 1;
                    if unreadable_reads >= MAX_SNAPSHOT_RETRIES {
                        let _ = events.send(RunEvent::Terminated {
                            message: format!("Result document unreadable: {err}"),
                        });
                        return;
                    }
                    debug!(%err, "snapshot not readable, retrying");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = sleep(self.timing.progress_interval) => {}
            }
        }
    }

    /// Watch for the service to become available.
    ///
    /// Loops full-budget discovery rounds until one succeeds or `cancel`
    /// fires; the descriptor is delivered at most once, then the loop stops.
    /// A cancelled watch drops the sender, which closes the receiver.
    pub fn watch_status(
        &self,
        cancel: CancellationToken,
    ) -> (JoinHandle<()>, oneshot::Receiver<HomeDocument>) {
        let (tx, rx) = oneshot::channel();
        let client = self.file_client.clone();
        let timing = self.timing.clone();

        let handle = tokio::spawn(async move {
            let home = loop {
                if cancel.is_cancelled() {
                    return;
                }

                match discovery::discover_home(
                    &client,
                    timing.discovery_attempts,
                    timing.discovery_interval,
                    &cancel,
                )
                .await
                {
                    Ok(Some(home)) => break home,
                    Ok(None) => {}
                    Err(err) => warn!(%err, "status probe failed"),
                }

                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = sleep(timing.watch_interval) => {}
                }
            };

            let _ = tx.send(home);
        });

        (handle, rx)
    }

    /// Returns true when the launcher started a fresh host process.
    async fn launch_host(&self) -> bool {
        let Some(launcher) = &self.launcher else {
            return false;
        };
        match launcher.ensure_running().await {
            Ok(handle) => handle.is_new,
            Err(err) => {
                // Discovery will time out on its own if nothing comes up.
                warn!(%err, "failed to start host process");
                false
            }
        }
    }
}
