// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Append-only per-agent log.
///
/// Process stdout, stderr and lifecycle markers all go through one lock so
/// the concurrent line reader never sees two writers' bytes interleaved
/// within a line. The file is never truncated, so a restarted agent's history
/// stays in place.
#[derive(Debug)]
pub struct AgentLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl AgentLog {
    pub fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `line` followed by a newline (unless it already ends with one).
    pub fn append_line(&self, line: &str) -> std::io::Result<()> {
        let mut file = self.file.lock();
        file.write_all(line.as_bytes())?;
        if !line.ends_with('\n') {
            file.write_all(b"\n")?;
        }
        file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appends_without_truncating() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/round-1/w1.log");

        let log = AgentLog::open(&path).unwrap();
        log.append_line("first").unwrap();
        drop(log);

        let reopened = AgentLog::open(&path).unwrap();
        reopened.append_line("second\n").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }
}
