use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SampleError {
    /// A kernel source could not be read, or the system-wide stat source has
    /// no usable aggregate line.
    #[error("failed to read {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    /// The process exited between discovery and the read of its status.
    #[error("process {pid} is gone")]
    ProcessGone { pid: u32 },

    #[error("unexpected content in {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
}

impl SampleError {
    pub fn read(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        SampleError::Read {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn parse(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        SampleError::Parse {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_process_gone(&self) -> bool {
        matches!(self, SampleError::ProcessGone { .. })
    }
}

pub type SampleResult<T> = Result<T, SampleError>;
