use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use super::cpu_time::{SystemTickSource, parse_system_ticks};
use super::snapshot::{ProcessSnapshot, SnapshotSource, parse_stat_state, parse_stat_ticks, parse_status};
use super::tree::{ChildLister, ChildQuery};
use crate::error::{SampleError, SampleResult};

pub const DEFAULT_PROC_ROOT: &str = "/proc";

const ESRCH: i32 = 3;

/// `NotFound` once the pid directory is gone, `ESRCH` when the task exits
/// while the file is open.
fn is_gone(e: &io::Error) -> bool {
    e.kind() == ErrorKind::NotFound || e.raw_os_error() == Some(ESRCH)
}

/// Kernel process information read from a procfs mount.
///
/// The root is configurable so a fixture directory can stand in for `/proc`.
#[derive(Clone, Debug)]
pub struct ProcFs {
    root: PathBuf,
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new(DEFAULT_PROC_ROOT)
    }
}

impl ProcFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn pid_path(&self, pid: u32, file: &str) -> PathBuf {
        self.root.join(pid.to_string()).join(file)
    }

    /// Reads a per-process file. The command name is not guaranteed to be
    /// UTF-8, so invalid bytes are replaced rather than rejected.
    fn read_pid_file(&self, pid: u32, file: &str) -> SampleResult<(PathBuf, String)> {
        let path = self.pid_path(pid, file);
        match fs::read(&path) {
            Ok(bytes) => {
                let contents = String::from_utf8_lossy(&bytes).into_owned();
                Ok((path, contents))
            }
            Err(e) if is_gone(&e) => Err(SampleError::ProcessGone { pid }),
            Err(e) => Err(SampleError::read(&path, e)),
        }
    }

    fn task_children(&self, path: &Path) -> SampleResult<Option<String>> {
        match fs::read_to_string(path) {
            Ok(contents) => Ok(Some(contents)),
            // The thread exited while we were listing.
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SampleError::read(path, e)),
        }
    }
}

impl SystemTickSource for ProcFs {
    fn current_system_ticks(&mut self) -> SampleResult<u64> {
        let path = self.root.join("stat");
        let contents = fs::read_to_string(&path).map_err(|e| SampleError::read(&path, e))?;
        parse_system_ticks(&path, &contents)
    }
}

impl SnapshotSource for ProcFs {
    fn read_snapshot(&mut self, pid: u32, system_ticks: u64) -> SampleResult<ProcessSnapshot> {
        let (status_path, status) = self.read_pid_file(pid, "status")?;
        let (stat_path, stat) = self.read_pid_file(pid, "stat")?;

        let mut snapshot = ProcessSnapshot {
            pid,
            system_ticks,
            ..Default::default()
        };
        parse_status(&status_path, &status, &mut snapshot)?;
        let (user, kernel) = parse_stat_ticks(&stat_path, &stat)?;
        snapshot.user_ticks = user;
        snapshot.kernel_ticks = kernel;
        Ok(snapshot)
    }
}

impl ChildLister for ProcFs {
    fn is_alive(&mut self, pid: u32) -> bool {
        match fs::read(self.pid_path(pid, "stat")) {
            Ok(stat) => {
                let stat = String::from_utf8_lossy(&stat);
                !matches!(parse_stat_state(&stat), Some('Z' | 'X') | None)
            }
            Err(_) => false,
        }
    }

    /// Reads `task/<tid>/children` for every thread of `pid`; children may
    /// have been forked by any of them.
    fn children(&mut self, pid: u32) -> SampleResult<ChildQuery> {
        let task_dir = self.pid_path(pid, "task");
        let entries = match fs::read_dir(&task_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ChildQuery::Leaf),
            Err(e) => return Err(SampleError::read(&task_dir, e)),
        };

        let mut children = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| SampleError::read(&task_dir, e))?;
            let path = entry.path().join("children");
            let Some(contents) = self.task_children(&path)? else {
                continue;
            };
            for token in contents.split_whitespace() {
                let child = token
                    .parse::<u32>()
                    .map_err(|e| SampleError::read(&path, format!("bad child pid {token:?}: {e}")))?;
                if !children.contains(&child) {
                    children.push(child);
                }
            }
        }

        if children.is_empty() {
            Ok(ChildQuery::Leaf)
        } else {
            children.sort_unstable();
            Ok(ChildQuery::Children(children))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_pid_is_gone_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut proc = ProcFs::new(dir.path());
        let err = proc.read_snapshot(4242, 0).unwrap_err();
        assert!(err.is_process_gone());
        assert!(!proc.is_alive(4242));
        assert_eq!(proc.children(4242).unwrap(), ChildQuery::Leaf);
    }

    fn write_process(root: &Path, pid: u32, name: &[u8]) {
        let dir = root.join(pid.to_string());
        fs::create_dir_all(&dir).unwrap();
        let mut status = b"Name:\t".to_vec();
        status.extend_from_slice(name);
        status.extend_from_slice(
            b"\nFDSize:\t64\nVmPeak:\t 400 kB\nVmSize:\t 400 kB\nVmHWM:\t 100 kB\nVmRSS:\t 100 kB\nThreads:\t1\n",
        );
        fs::write(dir.join("status"), status).unwrap();
        let mut stat = format!("{pid} (").into_bytes();
        stat.extend_from_slice(name);
        stat.extend_from_slice(b") S 1 1 1 0 -1 0 0 0 0 0 7 3 0 0 20 0 1 0 5 0 0\n");
        fs::write(dir.join("stat"), stat).unwrap();
    }

    #[test]
    fn non_utf8_name_is_read_lossily() {
        let dir = tempfile::tempdir().unwrap();
        write_process(dir.path(), 77, b"w\xe9rker");

        let mut proc = ProcFs::new(dir.path());
        assert!(proc.is_alive(77));
        let snap = proc.read_snapshot(77, 100).unwrap();
        assert_eq!(snap.name, "w\u{FFFD}rker");
        assert_eq!(snap.rss, 100 * 1024);
        assert_eq!((snap.user_ticks, snap.kernel_ticks), (7, 3));
    }

    #[test]
    fn unreadable_status_is_read_error_not_gone() {
        let dir = tempfile::tempdir().unwrap();
        write_process(dir.path(), 78, b"worker");
        let status = dir.path().join("78").join("status");
        fs::remove_file(&status).unwrap();
        fs::create_dir(&status).unwrap();

        let mut proc = ProcFs::new(dir.path());
        let err = proc.read_snapshot(78, 100).unwrap_err();
        assert!(matches!(err, SampleError::Read { .. }), "{err}");
    }

    #[test]
    fn garbage_in_children_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let task = dir.path().join("79").join("task").join("79");
        fs::create_dir_all(&task).unwrap();
        fs::write(task.join("children"), "80 eighty ").unwrap();

        let mut proc = ProcFs::new(dir.path());
        let err = proc.children(79).unwrap_err();
        assert!(matches!(err, SampleError::Read { .. }), "{err}");
    }

    #[test]
    fn missing_system_stat_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut proc = ProcFs::new(dir.path());
        let err = proc.current_system_ticks().unwrap_err();
        assert!(matches!(err, SampleError::Read { .. }));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn reads_own_process() {
        let mut proc = ProcFs::default();
        let ticks = proc.current_system_ticks().unwrap();
        assert!(ticks > 0);

        let pid = std::process::id();
        assert!(proc.is_alive(pid));
        let snap = proc.read_snapshot(pid, ticks).unwrap();
        assert_eq!(snap.pid, pid);
        assert!(!snap.name.is_empty());
        assert!(snap.rss > 0);
        assert!(snap.threads >= 1);
    }
}
