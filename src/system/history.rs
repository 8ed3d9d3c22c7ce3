use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use super::snapshot::ProcessSnapshot;
use super::tree::Discovery;

/// One snapshot together with the CPU utilization derived for it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Sample {
    pub tick: u64,
    pub cpu_percent: f64,
    pub snapshot: ProcessSnapshot,
}

/// Every sample recorded for one process instance during a run.
#[derive(Debug, Clone)]
pub struct ProcessHistory {
    pub pid: u32,
    /// Name as first observed.
    pub name: String,
    samples: Vec<Sample>,
}

impl ProcessHistory {
    fn new(first: Sample) -> Self {
        Self {
            pid: first.snapshot.pid,
            name: first.snapshot.name.clone(),
            samples: vec![first],
        }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn first_tick(&self) -> u64 {
        self.samples.first().map(|s| s.tick).unwrap_or_default()
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }
}

/// Histories of every process seen during one run.
///
/// A history is open while its pid keeps showing up in tree walks and is
/// closed for good once the pid is missing from one. Histories are never
/// empty.
#[derive(Debug, Default)]
pub struct HistoryStore {
    entries: BTreeMap<u64, ProcessHistory>,
    open: HashMap<u32, u64>,
    next_id: u64,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last sample of the pid's open history.
    pub fn previous(&self, pid: u32) -> Option<&Sample> {
        let id = self.open.get(&pid)?;
        self.entries.get(id).and_then(ProcessHistory::last)
    }

    /// Appends to the pid's open history, opening a new one if needed.
    pub fn record(&mut self, sample: Sample) {
        let pid = sample.snapshot.pid;
        if let Some(history) = self.open.get(&pid).and_then(|id| self.entries.get_mut(id)) {
            history.samples.push(sample);
            return;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(id, ProcessHistory::new(sample));
        self.open.insert(pid, id);
    }

    /// Drops the pid's open history entirely. Returns whether one existed.
    pub fn discard(&mut self, pid: u32) -> bool {
        match self.open.remove(&pid) {
            Some(id) => self.entries.remove(&id).is_some(),
            None => false,
        }
    }

    /// Closes histories of pids that are absent from `walk`.
    pub fn close_missing(&mut self, walk: &Discovery) {
        self.open.retain(|pid, _| walk.contains(*pid));
    }

    pub fn open_pids(&self) -> impl Iterator<Item = u32> + '_ {
        self.open.keys().copied()
    }

    pub fn histories(&self) -> impl Iterator<Item = &ProcessHistory> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
