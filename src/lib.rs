//! Samples CPU and memory usage of a process tree at a fixed cadence and
//! reduces the per-process histories to averages and peaks.

pub mod config;
pub mod error;
pub mod format;
pub mod launch;
pub mod logging;
pub mod report;
pub mod sampler;
pub mod stop;
pub mod summary;
pub mod system;
