use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::{HostHandle, HostLauncher};

/// Spawns the host process from a configured command line.
///
/// `ensure_running` reports `is_new` only for the call that actually
/// spawned; a later call that finds the child still alive reports an
/// existing host, so the orchestrator knows whether to shut it down when
/// the run ends.
pub struct ProcessLauncher {
    command: String,
    child: Mutex<Option<HostProcess>>,
}

impl ProcessLauncher {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            child: Mutex::new(None),
        }
    }
}

#[async_trait]
impl HostLauncher for ProcessLauncher {
    async fn ensure_running(&self) -> Result<HostHandle> {
        let mut guard = self.child.lock().unwrap();

        if let Some(process) = guard.as_mut()
            && process.is_alive()
        {
            debug!("host process already running");
            return Ok(HostHandle { is_new: false });
        }

        let words = shell_words::split(&self.command)
            .with_context(|| format!("invalid host command: {}", self.command))?;
        let (program, args) = words
            .split_first()
            .context("host command is empty")?;

        let mut cmd = Command::new(program);
        cmd.args(args);

        // Put the child in its own process group so killing it also takes
        // out any workers the host forks.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.as_std_mut().process_group(0);
        }

        let child = cmd
            .spawn()
            .with_context(|| format!("failed to start host: {program}"))?;
        info!(command = %self.command, pid = child.id(), "host process started");

        *guard = Some(HostProcess::new(child));
        Ok(HostHandle { is_new: true })
    }

    async fn shutdown(&self) {
        let process = self.child.lock().unwrap().take();
        if let Some(mut process) = process {
            info!("stopping host process");
            process.kill();
        }
    }
}

/// Kills the child process (and its whole process group on unix) on drop.
struct HostProcess {
    child: tokio::process::Child,
    #[cfg(unix)]
    pgid: Option<u32>,
}

impl HostProcess {
    fn new(child: tokio::process::Child) -> Self {
        #[cfg(unix)]
        let pgid = child.id();
        Self {
            child,
            #[cfg(unix)]
            pgid,
        }
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn kill(&mut self) {
        #[cfg(unix)]
        if let Some(pgid) = self.pgid {
            unsafe { libc::kill(-(pgid as libc::pid_t), libc::SIGKILL) };
        }
        let _ = self.child.start_kill();
    }
}

impl Drop for HostProcess {
    fn drop(&mut self) {
        if self.is_alive() {
            self.kill();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[cfg(unix)]
    #[tokio::test]
    async fn reports_new_only_on_actual_spawn() {
        let launcher = Arc::new(ProcessLauncher::new("sleep 5"));

        let first = launcher.ensure_running().await.unwrap();
        assert!(first.is_new);

        let second = launcher.ensure_running().await.unwrap();
        assert!(!second.is_new);

        launcher.shutdown().await;
        let third = launcher.ensure_running().await.unwrap();
        assert!(third.is_new);
        launcher.shutdown().await;
    }

    #[tokio::test]
    async fn empty_command_is_rejected() {
        let launcher = ProcessLauncher::new("");
        assert!(launcher.ensure_running().await.is_err());
    }
}
