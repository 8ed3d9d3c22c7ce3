use std::fmt::Write;

use serde::Serialize;

use crate::format::{format_size, pad_cell};
use crate::sampler::StopReason;
use crate::summary::{SortMode, UsageSummary, sort_summaries};
use crate::system::history::Sample;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupFailure {
    pub pid: u32,
    pub message: String,
}

/// Everything a finished run hands to its caller.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub root: u32,
    pub reason: StopReason,
    pub ticks: u64,
    pub summaries: Vec<UsageSummary>,
    pub cleanup_failures: Vec<CleanupFailure>,
}

impl RunReport {
    pub fn is_complete(&self) -> bool {
        self.reason.is_complete()
    }

    pub fn sorted(mut self, mode: SortMode) -> Self {
        sort_summaries(&mut self.summaries, mode);
        self
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    complete: bool,
    interval_secs: u64,
    #[serde(flatten)]
    report: &'a RunReport,
}

fn reason_label(reason: &StopReason) -> String {
    match reason {
        StopReason::DurationElapsed => "duration elapsed".to_string(),
        StopReason::Cancelled => "cancelled".to_string(),
        StopReason::WorkloadExited => "workload exited prematurely".to_string(),
        StopReason::Aborted(cause) => format!("aborted: {cause}"),
    }
}

/// Plain-text report: a header line, then one line per process.
pub fn render_text(report: &RunReport, interval_secs: u64) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        "root {} sampled for {} ticks, stopped: {}",
        report.root,
        report.ticks,
        reason_label(&report.reason)
    );
    if !report.is_complete() {
        out.push_str(" (incomplete)");
    }
    out.push('\n');

    for s in &report.summaries {
        let _ = writeln!(
            out,
            "{}({}): seconds alive: {}  avg CPU: {:.1}%  avg Mem: {}  peak Mem: {}",
            s.name,
            s.pid,
            s.lifetime as u64 * interval_secs,
            s.avg_cpu_percent,
            format_size(s.avg_rss),
            format_size(s.peak_rss)
        );
    }

    for failure in &report.cleanup_failures {
        let _ = writeln!(
            out,
            "cleanup failed for PID {}: {}",
            failure.pid, failure.message
        );
    }
    out
}

pub fn render_json(report: &RunReport, interval_secs: u64) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&JsonReport {
        complete: report.is_complete(),
        interval_secs,
        report,
    })
}

/// Per-process rows of a single tick, for live output.
pub fn render_tick_rows(samples: &[Sample]) -> String {
    let mut out = String::new();
    for sample in samples {
        let s = &sample.snapshot;
        let _ = writeln!(
            out,
            "Pid: {} Name: {} CPU: {} FDSize: {} VmPeak: {} VmSize: {} VmHWM: {} VmRSS: {} Threads: {}",
            pad_cell(&s.pid.to_string()),
            pad_cell(&s.name),
            pad_cell(&format!("{:.1}%", sample.cpu_percent)),
            pad_cell(&s.fd_slots.to_string()),
            pad_cell(&format_size(s.vm_peak)),
            pad_cell(&format_size(s.vm_size)),
            pad_cell(&format_size(s.rss_peak)),
            pad_cell(&format_size(s.rss)),
            s.threads
        );
    }
    out.push('\n');
    out
}
