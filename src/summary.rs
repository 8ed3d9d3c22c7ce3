use serde::Serialize;

use crate::system::history::ProcessHistory;

/// Averages and peaks derived from one process history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageSummary {
    pub pid: u32,
    pub name: String,
    /// Tick at which the process was first observed.
    pub first_tick: u64,
    /// Number of ticks the process was observed alive.
    pub lifetime: usize,
    pub avg_cpu_percent: f64,
    pub avg_rss: u64,
    pub peak_rss: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortMode {
    #[default]
    Pid,
    Cpu,
    Memory,
    Name,
}

impl SortMode {
    pub fn from_str_config(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "cpu" => SortMode::Cpu,
            "memory" | "mem" => SortMode::Memory,
            "name" => SortMode::Name,
            _ => SortMode::Pid,
        }
    }
}

/// Reduces each history to a summary. Empty histories are skipped.
pub fn summarize<'a>(histories: impl IntoIterator<Item = &'a ProcessHistory>) -> Vec<UsageSummary> {
    histories.into_iter().filter_map(summarize_one).collect()
}

fn summarize_one(history: &ProcessHistory) -> Option<UsageSummary> {
    let samples = history.samples();
    if samples.is_empty() {
        return None;
    }
    let count = samples.len();

    let cpu_total: f64 = samples.iter().map(|s| s.cpu_percent).sum();
    let rss_total: u128 = samples.iter().map(|s| u128::from(s.snapshot.rss)).sum();
    let peak_rss = samples.iter().map(|s| s.snapshot.rss).max().unwrap_or(0);

    Some(UsageSummary {
        pid: history.pid,
        name: history.name.clone(),
        first_tick: history.first_tick(),
        lifetime: count,
        avg_cpu_percent: cpu_total / count as f64,
        avg_rss: (rss_total / count as u128) as u64,
        peak_rss,
    })
}

/// Orders summaries for display. Largest first for CPU and memory; pid
/// breaks ties.
pub fn sort_summaries(summaries: &mut [UsageSummary], mode: SortMode) {
    match mode {
        SortMode::Pid => summaries.sort_by_key(|s| (s.pid, s.first_tick)),
        SortMode::Cpu => summaries.sort_by(|a, b| {
            b.avg_cpu_percent
                .total_cmp(&a.avg_cpu_percent)
                .then(a.pid.cmp(&b.pid))
        }),
        SortMode::Memory => {
            summaries.sort_by(|a, b| b.peak_rss.cmp(&a.peak_rss).then(a.pid.cmp(&b.pid)))
        }
        SortMode::Name => summaries.sort_by(|a, b| a.name.cmp(&b.name).then(a.pid.cmp(&b.pid))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::history::{HistoryStore, Sample};
    use crate::system::snapshot::ProcessSnapshot;

    fn record(store: &mut HistoryStore, tick: u64, pid: u32, rss: u64, cpu: f64) {
        store.record(Sample {
            tick,
            cpu_percent: cpu,
            snapshot: ProcessSnapshot {
                pid,
                name: format!("proc{pid}"),
                rss,
                ..Default::default()
            },
        });
    }

    #[test]
    fn averages_and_peaks() {
        let mut store = HistoryStore::new();
        record(&mut store, 1, 10, 1000, 0.0);
        record(&mut store, 2, 10, 3000, 40.0);
        record(&mut store, 3, 10, 2000, 20.0);

        let summaries = summarize(store.histories());
        assert_eq!(summaries.len(), 1);
        let s = &summaries[0];
        assert_eq!(s.pid, 10);
        assert_eq!(s.name, "proc10");
        assert_eq!(s.lifetime, 3);
        assert_eq!(s.first_tick, 1);
        assert_eq!(s.avg_rss, 2000);
        assert_eq!(s.peak_rss, 3000);
        assert!((s.avg_cpu_percent - 20.0).abs() < 1e-9);
    }

    #[test]
    fn no_histories_no_summaries() {
        let store = HistoryStore::new();
        assert!(summarize(store.histories()).is_empty());
    }

    #[test]
    fn sort_modes() {
        let mut store = HistoryStore::new();
        record(&mut store, 1, 3, 100, 5.0);
        record(&mut store, 1, 1, 300, 1.0);
        record(&mut store, 1, 2, 200, 9.0);
        let mut summaries = summarize(store.histories());

        sort_summaries(&mut summaries, SortMode::Pid);
        assert_eq!(summaries.iter().map(|s| s.pid).collect::<Vec<_>>(), [1, 2, 3]);
        sort_summaries(&mut summaries, SortMode::Cpu);
        assert_eq!(summaries.iter().map(|s| s.pid).collect::<Vec<_>>(), [2, 3, 1]);
        sort_summaries(&mut summaries, SortMode::Memory);
        assert_eq!(summaries.iter().map(|s| s.pid).collect::<Vec<_>>(), [1, 2, 3]);
    }

    #[test]
    fn sort_mode_from_config() {
        assert_eq!(SortMode::from_str_config("CPU"), SortMode::Cpu);
        assert_eq!(SortMode::from_str_config("memory"), SortMode::Memory);
        assert_eq!(SortMode::from_str_config("name"), SortMode::Name);
        assert_eq!(SortMode::from_str_config("bogus"), SortMode::Pid);
    }
}
