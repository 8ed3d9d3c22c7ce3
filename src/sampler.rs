//! The tick loop: walk the tree, read every process, derive CPU usage and
//! append to the per-process histories.

use std::collections::HashSet;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::SampleError;
use crate::report::{CleanupFailure, RunReport};
use crate::stop::StopSignal;
use crate::summary::summarize;
use crate::system::cpu_time::SystemTickSource;
use crate::system::history::{HistoryStore, Sample};
use crate::system::kill::{KillResult, SignalTerminator, Terminator};
use crate::system::procfs::ProcFs;
use crate::system::snapshot::{CpuDelta, SnapshotSource};
use crate::system::table::ProcessTable;
use crate::system::tree::{ChildLister, descendants};

/// Where child pids are looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChildSource {
    /// The `sysinfo` process table, matched by parent pid.
    #[default]
    Sysinfo,
    /// `/proc/<pid>/task/<tid>/children`.
    Procfs,
}

impl ChildSource {
    pub fn from_str_config(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "procfs" | "proc" => ChildSource::Procfs,
            _ => ChildSource::Sysinfo,
        }
    }
}

/// Kernel-facing collaborators of a [`Sampler`].
pub struct Sources {
    pub system_ticks: Box<dyn SystemTickSource>,
    pub snapshots: Box<dyn SnapshotSource>,
    pub children: Box<dyn ChildLister>,
    pub terminator: Box<dyn Terminator>,
}

impl Sources {
    pub fn from_procfs(proc: ProcFs, children: ChildSource) -> Self {
        let lister: Box<dyn ChildLister> = match children {
            ChildSource::Procfs => Box::new(proc.clone()),
            ChildSource::Sysinfo => Box::new(ProcessTable::new()),
        };
        Sources {
            system_ticks: Box::new(proc.clone()),
            snapshots: Box::new(proc),
            children: lister,
            terminator: Box::new(SignalTerminator::default()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SamplerOptions {
    pub interval: Duration,
    pub terminate_on_stop: bool,
}

impl Default for SamplerOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            terminate_on_stop: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerState {
    Idle,
    Running,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum StopReason {
    DurationElapsed,
    Cancelled,
    /// The root process was no longer alive at the start of a tick.
    WorkloadExited,
    /// The system-wide tick source failed.
    Aborted(String),
}

impl StopReason {
    /// Only a run that lasted its full duration covers the whole workload.
    pub fn is_complete(&self) -> bool {
        matches!(self, StopReason::DurationElapsed)
    }
}

/// Counters for a single tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickStats {
    pub tick: u64,
    pub observed: usize,
    /// Pids that exited between the walk and the read.
    pub gone: usize,
    /// Pids whose status could not be parsed.
    pub failed: usize,
    /// Pids whose counters went backwards.
    pub reused: usize,
    pub branch_errors: usize,
}

#[derive(Debug, Clone)]
pub struct TickReport {
    pub stats: TickStats,
    pub samples: Vec<Sample>,
}

#[derive(Debug, Clone)]
pub enum TickOutcome {
    Recorded(TickReport),
    WorkloadExited,
    /// The sampler had already stopped; nothing was read.
    Stopped,
}

pub struct Sampler {
    root: u32,
    sources: Sources,
    options: SamplerOptions,
    state: SamplerState,
    reason: Option<StopReason>,
    store: HistoryStore,
    tick: u64,
    last_walk: Vec<u32>,
}

impl Sampler {
    pub fn new(root: u32, sources: Sources, options: SamplerOptions) -> Self {
        Self {
            root,
            sources,
            options,
            state: SamplerState::Idle,
            reason: None,
            store: HistoryStore::new(),
            tick: 0,
            last_walk: Vec::new(),
        }
    }

    pub fn root(&self) -> u32 {
        self.root
    }

    pub fn state(&self) -> SamplerState {
        self.state
    }

    /// Number of ticks recorded so far.
    pub fn ticks(&self) -> u64 {
        self.tick
    }

    pub fn history(&self) -> &HistoryStore {
        &self.store
    }

    fn stop(&mut self, reason: StopReason) {
        self.state = SamplerState::Stopped;
        if self.reason.is_none() {
            self.reason = Some(reason);
        }
    }

    /// Performs one tick.
    ///
    /// Errors only when the system-wide tick source fails; the sampler is
    /// stopped in that case and earlier ticks remain recorded.
    pub fn tick(&mut self) -> Result<TickOutcome, SampleError> {
        match self.state {
            SamplerState::Stopped => return Ok(TickOutcome::Stopped),
            SamplerState::Idle => {
                tracing::info!(root = self.root, "sampling started");
                self.state = SamplerState::Running;
            }
            SamplerState::Running => {}
        }

        let walk = descendants(&mut *self.sources.children, self.root);
        for err in &walk.errors {
            tracing::warn!(error = %err, "could not list child processes");
        }
        if !walk.contains(self.root) {
            tracing::info!(root = self.root, "workload exited prematurely");
            self.stop(StopReason::WorkloadExited);
            return Ok(TickOutcome::WorkloadExited);
        }
        self.last_walk = walk.pids().to_vec();

        let system_ticks = match self.sources.system_ticks.current_system_ticks() {
            Ok(ticks) => ticks,
            Err(err) => {
                tracing::error!(error = %err, "system cpu ticks unavailable");
                self.stop(StopReason::Aborted(err.to_string()));
                return Err(err);
            }
        };

        self.tick += 1;
        self.store.close_missing(&walk);

        let mut stats = TickStats {
            tick: self.tick,
            branch_errors: walk.errors.len(),
            ..Default::default()
        };
        let mut samples = Vec::with_capacity(walk.len());

        for &pid in walk.pids() {
            let snapshot = match self.sources.snapshots.read_snapshot(pid, system_ticks) {
                Ok(snapshot) => snapshot,
                Err(SampleError::ProcessGone { .. }) => {
                    stats.gone += 1;
                    continue;
                }
                Err(err) => {
                    tracing::warn!(pid, error = %err, "dropping sample");
                    stats.failed += 1;
                    continue;
                }
            };

            let delta = self
                .store
                .previous(pid)
                .map(|prev| snapshot.cpu_since(&prev.snapshot));
            let cpu_percent = match delta {
                None => 0.0,
                Some(CpuDelta::Percent(percent)) => percent,
                Some(CpuDelta::Regressed) => {
                    tracing::warn!(pid, "counters went backwards; treating pid as a new process");
                    self.store.discard(pid);
                    stats.reused += 1;
                    0.0
                }
            };

            let sample = Sample {
                tick: self.tick,
                cpu_percent,
                snapshot,
            };
            samples.push(sample.clone());
            self.store.record(sample);
        }

        stats.observed = samples.len();
        tracing::debug!(
            tick = stats.tick,
            observed = stats.observed,
            gone = stats.gone,
            failed = stats.failed,
            reused = stats.reused,
            "tick recorded"
        );
        Ok(TickOutcome::Recorded(TickReport { stats, samples }))
    }

    /// Ticks every `interval` until `duration` elapses, `stop` fires, the
    /// workload exits or the system tick source fails.
    ///
    /// A stop request is honored between ticks only.
    pub async fn run(
        &mut self,
        duration: Duration,
        stop: &mut StopSignal,
        mut on_tick: impl FnMut(&TickReport),
    ) -> StopReason {
        let deadline = Instant::now() + duration;
        let mut interval = tokio::time::interval(self.options.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reason = loop {
            tokio::select! {
                biased;
                _ = stop.stopped() => break StopReason::Cancelled,
                _ = interval.tick() => {}
            }
            if Instant::now() >= deadline {
                break StopReason::DurationElapsed;
            }
            match self.tick() {
                Ok(TickOutcome::Recorded(report)) => on_tick(&report),
                Ok(TickOutcome::WorkloadExited) => break StopReason::WorkloadExited,
                Ok(TickOutcome::Stopped) => {
                    break self.reason.clone().unwrap_or(StopReason::Cancelled);
                }
                Err(err) => break StopReason::Aborted(err.to_string()),
            }
        };

        tracing::info!(ticks = self.tick, reason = ?reason, "sampling stopped");
        self.stop(reason.clone());
        reason
    }

    /// Stops the sampler, terminates the workload tree if configured and
    /// summarizes everything recorded.
    pub fn finish(mut self) -> RunReport {
        self.stop(StopReason::Cancelled);
        let reason = self.reason.clone().unwrap_or(StopReason::Cancelled);

        let cleanup_failures = if self.options.terminate_on_stop {
            self.terminate_tree()
        } else {
            Vec::new()
        };

        RunReport {
            root: self.root,
            reason,
            ticks: self.tick,
            summaries: summarize(self.store.histories()),
            cleanup_failures,
        }
    }

    /// Signals the root and every known descendant, deepest first and the
    /// root last. Processes that already exited are not failures.
    fn terminate_tree(&mut self) -> Vec<CleanupFailure> {
        let walk = descendants(&mut *self.sources.children, self.root);

        let mut seen = HashSet::new();
        let mut targets: Vec<u32> = walk
            .pids()
            .iter()
            .chain(self.last_walk.iter())
            .copied()
            .chain(self.store.open_pids())
            .filter(|&pid| pid != self.root && seen.insert(pid))
            .collect();
        targets.reverse();
        targets.push(self.root);

        let mut failures = Vec::new();
        for pid in targets {
            match self.sources.terminator.terminate(pid) {
                KillResult::Success(pid, signal) => tracing::debug!(pid, signal, "terminated"),
                KillResult::NotFound(_) => {}
                KillResult::Failed(pid, message) => {
                    tracing::warn!(pid, %message, "cleanup failed");
                    failures.push(CleanupFailure { pid, message });
                }
            }
        }
        failures
    }
}
