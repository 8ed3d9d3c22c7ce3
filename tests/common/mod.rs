#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;

use treewatch::error::{SampleError, SampleResult};
use treewatch::sampler::Sources;
use treewatch::system::cpu_time::SystemTickSource;
use treewatch::system::kill::{KillResult, Terminator};
use treewatch::system::snapshot::{ProcessSnapshot, SnapshotSource};
use treewatch::system::tree::{ChildLister, ChildQuery};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReadBehavior {
    #[default]
    Ok,
    Gone,
    Malformed,
}

#[derive(Clone, Debug, Default)]
pub struct FakeProc {
    pub parent: u32,
    pub name: String,
    pub user: u64,
    pub kernel: u64,
    pub rss: u64,
    pub read: ReadBehavior,
}

#[derive(Debug, Default)]
pub struct KernelState {
    /// `None` makes the system-wide source unreadable.
    pub system_ticks: Option<u64>,
    pub procs: BTreeMap<u32, FakeProc>,
    pub killed: Vec<u32>,
    pub kill_failures: HashSet<u32>,
}

/// In-memory stand-in for the kernel, shared between the test and the
/// sampler's boxed sources.
#[derive(Clone, Default)]
pub struct FakeKernel(Rc<RefCell<KernelState>>);

impl FakeKernel {
    pub fn new() -> Self {
        let kernel = FakeKernel::default();
        kernel.0.borrow_mut().system_ticks = Some(10_000);
        kernel
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut KernelState) -> R) -> R {
        f(&mut self.0.borrow_mut())
    }

    pub fn spawn(&self, pid: u32, parent: u32, name: &str) {
        self.with(|k| {
            k.procs.insert(
                pid,
                FakeProc {
                    parent,
                    name: name.to_string(),
                    rss: 1024 * 1024,
                    ..Default::default()
                },
            )
        });
    }

    pub fn exit(&self, pid: u32) {
        self.with(|k| k.procs.remove(&pid));
    }

    pub fn proc_mut<R>(&self, pid: u32, f: impl FnOnce(&mut FakeProc) -> R) -> R {
        self.with(|k| f(k.procs.get_mut(&pid).expect("unknown fake pid")))
    }

    /// Advances the system-wide tick total.
    pub fn elapse(&self, ticks: u64) {
        self.with(|k| {
            if let Some(total) = k.system_ticks.as_mut() {
                *total += ticks;
            }
        });
    }

    pub fn burn(&self, pid: u32, user: u64, kernel: u64) {
        self.proc_mut(pid, |p| {
            p.user += user;
            p.kernel += kernel;
        });
    }

    pub fn killed(&self) -> Vec<u32> {
        self.with(|k| k.killed.clone())
    }

    pub fn sources(&self) -> Sources {
        Sources {
            system_ticks: Box::new(self.clone()),
            snapshots: Box::new(self.clone()),
            children: Box::new(self.clone()),
            terminator: Box::new(self.clone()),
        }
    }
}

impl SystemTickSource for FakeKernel {
    fn current_system_ticks(&mut self) -> SampleResult<u64> {
        self.with(|k| k.system_ticks)
            .ok_or_else(|| SampleError::read("/proc/stat", "unreadable"))
    }
}

impl SnapshotSource for FakeKernel {
    fn read_snapshot(&mut self, pid: u32, system_ticks: u64) -> SampleResult<ProcessSnapshot> {
        let Some(p) = self.with(|k| k.procs.get(&pid).cloned()) else {
            return Err(SampleError::ProcessGone { pid });
        };
        match p.read {
            ReadBehavior::Gone => Err(SampleError::ProcessGone { pid }),
            ReadBehavior::Malformed => Err(SampleError::parse(
                format!("/proc/{pid}/status"),
                "couldn't parse: \"garbage\"",
            )),
            ReadBehavior::Ok => Ok(ProcessSnapshot {
                pid,
                name: p.name,
                rss: p.rss,
                rss_peak: p.rss,
                vm_size: p.rss * 2,
                vm_peak: p.rss * 2,
                fd_slots: 64,
                threads: 1,
                user_ticks: p.user,
                kernel_ticks: p.kernel,
                system_ticks,
            }),
        }
    }
}

impl ChildLister for FakeKernel {
    fn is_alive(&mut self, pid: u32) -> bool {
        self.with(|k| k.procs.contains_key(&pid))
    }

    fn children(&mut self, pid: u32) -> SampleResult<ChildQuery> {
        let kids: Vec<u32> = self.with(|k| {
            k.procs
                .iter()
                .filter(|(_, p)| p.parent == pid)
                .map(|(&child, _)| child)
                .collect()
        });
        Ok(if kids.is_empty() {
            ChildQuery::Leaf
        } else {
            ChildQuery::Children(kids)
        })
    }
}

impl Terminator for FakeKernel {
    fn terminate(&mut self, pid: u32) -> KillResult {
        self.with(|k| {
            if k.kill_failures.contains(&pid) {
                return KillResult::Failed(pid, format!("failed to send SIGKILL to PID {pid}"));
            }
            if k.procs.remove(&pid).is_some() {
                k.killed.push(pid);
                KillResult::Success(pid, "SIGKILL")
            } else {
                KillResult::NotFound(pid)
            }
        })
    }
}
