use std::path::Path;

use serde::Serialize;

use crate::error::{SampleError, SampleResult};
use crate::format::parse_size;

/// Measured state of one process at one tick.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ProcessSnapshot {
    pub pid: u32,
    pub name: String,
    /// Resident set size in bytes (`VmRSS`).
    pub rss: u64,
    /// Peak resident set size in bytes (`VmHWM`).
    pub rss_peak: u64,
    /// Virtual memory size in bytes (`VmSize`).
    pub vm_size: u64,
    /// Peak virtual memory size in bytes (`VmPeak`).
    pub vm_peak: u64,
    /// Number of file descriptor slots currently allocated (`FDSize`).
    pub fd_slots: u64,
    pub threads: u64,
    pub user_ticks: u64,
    pub kernel_ticks: u64,
    /// System-wide cumulative CPU ticks when this snapshot was taken.
    pub system_ticks: u64,
}

/// Result of comparing a snapshot against the previous one for the same pid.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CpuDelta {
    Percent(f64),
    /// A cumulative counter went backwards: the pid now belongs to a
    /// different process.
    Regressed,
}

impl ProcessSnapshot {
    pub fn process_ticks(&self) -> u64 {
        self.user_ticks.saturating_add(self.kernel_ticks)
    }

    /// CPU utilization between `prev` and `self`, normalized to one core,
    /// so multi-threaded processes may exceed 100.
    pub fn cpu_since(&self, prev: &ProcessSnapshot) -> CpuDelta {
        if self.process_ticks() < prev.process_ticks() || self.vm_peak < prev.vm_peak {
            return CpuDelta::Regressed;
        }
        let used = self.process_ticks() - prev.process_ticks();
        let elapsed = self.system_ticks.saturating_sub(prev.system_ticks);
        if elapsed == 0 {
            return CpuDelta::Percent(0.0);
        }
        CpuDelta::Percent(100.0 * used as f64 / elapsed as f64)
    }
}

/// Reads the counters of a single process.
pub trait SnapshotSource {
    /// Fails with [`SampleError::ProcessGone`] when the process has exited
    /// and with [`SampleError::Parse`] when its status does not look as
    /// expected.
    fn read_snapshot(&mut self, pid: u32, system_ticks: u64) -> SampleResult<ProcessSnapshot>;
}

const MEMORY_KEYS: [&str; 4] = ["VmPeak", "VmSize", "VmHWM", "VmRSS"];

/// Fills name, memory, fd and thread fields from `/proc/<pid>/status` text.
///
/// The kernel drops every `Vm*` line once a process has released its address
/// space on exit, so a status with none of them is reported as
/// [`SampleError::ProcessGone`] for `snapshot.pid`. A status with only some
/// of them is a [`SampleError::Parse`].
pub fn parse_status(path: &Path, contents: &str, snapshot: &mut ProcessSnapshot) -> SampleResult<()> {
    let mut memory_seen = [false; MEMORY_KEYS.len()];
    for line in contents.lines() {
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            return Err(SampleError::parse(path, format!("couldn't parse: {line:?}")));
        };
        let key = key.trim();
        // The command name is copied verbatim by the kernel and may itself
        // contain a colon; no other key can.
        if key.is_empty() || (key != "Name" && value.contains(':')) {
            return Err(SampleError::parse(path, format!("couldn't parse: {line:?}")));
        }
        let value = value.trim();

        match key {
            "Name" => snapshot.name = value.to_string(),
            "FDSize" => snapshot.fd_slots = parse_count(path, key, value)?,
            "Threads" => snapshot.threads = parse_count(path, key, value)?,
            "VmPeak" => snapshot.vm_peak = parse_memory(path, key, value)?,
            "VmSize" => snapshot.vm_size = parse_memory(path, key, value)?,
            "VmHWM" => snapshot.rss_peak = parse_memory(path, key, value)?,
            "VmRSS" => snapshot.rss = parse_memory(path, key, value)?,
            _ => {}
        }
        if let Some(i) = MEMORY_KEYS.iter().position(|k| *k == key) {
            memory_seen[i] = true;
        }
    }

    if !memory_seen.contains(&true) {
        return Err(SampleError::ProcessGone { pid: snapshot.pid });
    }
    let missing: Vec<&str> = MEMORY_KEYS
        .iter()
        .zip(memory_seen)
        .filter(|(_, seen)| !seen)
        .map(|(key, _)| *key)
        .collect();
    if !missing.is_empty() {
        return Err(SampleError::parse(path, format!("missing {}", missing.join(", "))));
    }
    Ok(())
}

/// Returns `(user_ticks, kernel_ticks)` from `/proc/<pid>/stat` text.
pub fn parse_stat_ticks(path: &Path, contents: &str) -> SampleResult<(u64, u64)> {
    // comm is parenthesized and may contain spaces, so count fields from the
    // last ')'. utime and stime are fields 14 and 15 of the whole line.
    let after_comm = contents
        .rfind(')')
        .map(|i| &contents[i + 1..])
        .ok_or_else(|| SampleError::parse(path, "missing command name"))?;
    let fields: Vec<&str> = after_comm.split_whitespace().collect();
    if fields.len() < 13 {
        return Err(SampleError::parse(
            path,
            format!("expected at least 15 fields, found {}", fields.len() + 2),
        ));
    }
    let ticks = |idx: usize, label: &str| {
        fields[idx]
            .parse::<u64>()
            .map_err(|e| SampleError::parse(path, format!("{label} {:?}: {e}", fields[idx])))
    };
    Ok((ticks(11, "utime")?, ticks(12, "stime")?))
}

/// Process state letter (field 3) from `/proc/<pid>/stat` text.
pub fn parse_stat_state(contents: &str) -> Option<char> {
    let after_comm = &contents[contents.rfind(')')? + 1..];
    after_comm.split_whitespace().next()?.chars().next()
}

fn parse_count(path: &Path, key: &str, value: &str) -> SampleResult<u64> {
    value
        .parse()
        .map_err(|e| SampleError::parse(path, format!("{key} {value:?}: {e}")))
}

fn parse_memory(path: &Path, key: &str, value: &str) -> SampleResult<u64> {
    parse_size(value).map_err(|e| SampleError::parse(path, format!("{key}: {e}")))
}
