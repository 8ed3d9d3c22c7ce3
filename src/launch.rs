use std::process::{Child, Command, Stdio};
use std::time::Duration;

use color_eyre::eyre::{Result, WrapErr, eyre};

/// The process whose tree is sampled.
pub enum Workload {
    /// Started by us; reaped once sampling ends.
    Spawned(Child),
    /// An existing process we only observe.
    Attached(u32),
}

impl Workload {
    pub fn spawn(command: &[String], inherit_stdio: bool) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| eyre!("no command given to run"))?;

        let mut cmd = Command::new(program);
        cmd.args(args).stdin(Stdio::null());
        if !inherit_stdio {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }
        let child = cmd
            .spawn()
            .wrap_err_with(|| format!("failed to start {program:?}"))?;
        tracing::info!(pid = child.id(), program = %program, "workload started");
        Ok(Workload::Spawned(child))
    }

    pub fn pid(&self) -> u32 {
        match self {
            Workload::Spawned(child) => child.id(),
            Workload::Attached(pid) => *pid,
        }
    }

    /// Collects the exit status of a spawned workload so it does not linger
    /// as a zombie. Gives up after `timeout` if it is still running.
    pub async fn reap(&mut self, timeout: Duration) {
        let Workload::Spawned(child) = self else {
            return;
        };
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    tracing::debug!(pid = child.id(), %status, "workload reaped");
                    return;
                }
                Ok(None) if tokio::time::Instant::now() < deadline => {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                Ok(None) => {
                    tracing::warn!(pid = child.id(), "workload still running after sampling");
                    return;
                }
                Err(e) => {
                    tracing::warn!(pid = child.id(), error = %e, "failed waiting for workload");
                    return;
                }
            }
        }
    }
}
