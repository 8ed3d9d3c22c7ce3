use std::collections::HashMap;

use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System};

use super::tree::{ChildLister, ChildQuery};
use crate::error::SampleResult;

/// Process table backed by `sysinfo`, re-read at the start of every walk.
pub struct ProcessTable {
    sys: System,
    children: HashMap<u32, Vec<u32>>,
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable {
    pub fn new() -> Self {
        let mut table = ProcessTable {
            sys: System::new(),
            children: HashMap::new(),
        };
        table.reload();
        table
    }

    pub fn system(&self) -> &System {
        &self.sys
    }

    fn reload(&mut self) {
        let _span = tracing::debug_span!("process_table.reload").entered();

        self.sys.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing(),
        );

        self.children.clear();
        for (pid, process) in self.sys.processes() {
            // Threads are listed as tasks of their process, not as children.
            if process.thread_kind().is_some() {
                continue;
            }
            if let Some(parent) = process.parent() {
                self.children
                    .entry(parent.as_u32())
                    .or_default()
                    .push(pid.as_u32());
            }
        }
        for kids in self.children.values_mut() {
            kids.sort_unstable();
        }
    }

    /// Re-reads a single pid, leaving the parent links untouched.
    pub fn refresh_pid(&mut self, pid: u32) {
        let pids = [Pid::from_u32(pid)];
        self.sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&pids),
            true,
            ProcessRefreshKind::nothing(),
        );
    }
}

impl ChildLister for ProcessTable {
    fn refresh(&mut self) {
        self.reload();
    }

    fn is_alive(&mut self, pid: u32) -> bool {
        self.sys
            .process(Pid::from_u32(pid))
            .is_some_and(|p| !matches!(p.status(), ProcessStatus::Zombie | ProcessStatus::Dead))
    }

    fn children(&mut self, pid: u32) -> SampleResult<ChildQuery> {
        Ok(match self.children.get(&pid) {
            Some(kids) if !kids.is_empty() => ChildQuery::Children(kids.clone()),
            _ => ChildQuery::Leaf,
        })
    }
}
