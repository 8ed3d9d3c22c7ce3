use std::path::Path;

use crate::error::{SampleError, SampleResult};

/// Source of the system-wide cumulative CPU tick total.
pub trait SystemTickSource {
    fn current_system_ticks(&mut self) -> SampleResult<u64>;
}

/// Sums every numeric field of the first `cpu` aggregate line of
/// `/proc/stat` text.
pub fn parse_system_ticks(path: &Path, contents: &str) -> SampleResult<u64> {
    let line = contents
        .lines()
        .find(|line| line.split_whitespace().next() == Some("cpu"))
        .ok_or_else(|| SampleError::read(path, "no aggregate cpu line"))?;

    let mut total = 0u64;
    let mut fields = 0usize;
    for token in line.split_whitespace().skip(1) {
        if let Ok(n) = token.parse::<u64>() {
            total = total.saturating_add(n);
            fields += 1;
        }
    }
    if fields == 0 {
        return Err(SampleError::read(path, "aggregate cpu line has no numeric fields"));
    }
    Ok(total)
}
