use sysinfo::{Pid, Signal};

use super::table::ProcessTable;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KillResult {
    Success(u32, &'static str),
    Failed(u32, String),
    NotFound(u32),
}

/// Delivers a termination signal to one process.
pub trait Terminator {
    fn terminate(&mut self, pid: u32) -> KillResult;
}

/// Sends `signal` through `sysinfo`, re-reading the pid first so a process
/// that already exited reports [`KillResult::NotFound`].
pub struct SignalTerminator {
    table: ProcessTable,
    signal: Signal,
}

impl SignalTerminator {
    pub fn new(signal: Signal) -> Self {
        Self {
            table: ProcessTable::new(),
            signal,
        }
    }
}

impl Default for SignalTerminator {
    fn default() -> Self {
        Self::new(Signal::Kill)
    }
}

impl Terminator for SignalTerminator {
    fn terminate(&mut self, pid: u32) -> KillResult {
        self.table.refresh_pid(pid);
        kill_process(&self.table, pid, self.signal)
    }
}

pub fn kill_process(table: &ProcessTable, pid: u32, signal: Signal) -> KillResult {
    let sysinfo_pid = Pid::from_u32(pid);
    match table.system().process(sysinfo_pid) {
        Some(process) => {
            let signal_name = match signal {
                Signal::Term => "SIGTERM",
                Signal::Kill => "SIGKILL",
                Signal::Interrupt => "SIGINT",
                _ => "signal",
            };
            match process.kill_with(signal) {
                Some(true) => KillResult::Success(pid, signal_name),
                Some(false) => {
                    KillResult::Failed(pid, format!("failed to send {signal_name} to PID {pid}"))
                }
                None => {
                    if process.kill() {
                        KillResult::Success(pid, signal_name)
                    } else {
                        KillResult::Failed(
                            pid,
                            format!("failed to kill PID {pid} (permission denied?)"),
                        )
                    }
                }
            }
        }
        None => KillResult::NotFound(pid),
    }
}
