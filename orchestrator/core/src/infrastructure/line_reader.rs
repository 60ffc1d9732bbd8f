// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Line Stream Reader
//!
//! Follows a growing log file and hands each cleaned line to a handler.
//!
//! The loop polls instead of blocking on file events: the file may not exist
//! yet when the reader starts, and it is appended to by a concurrent writer.
//! Each iteration:
//!
//! 1. opens the file if needed (on the very first open, seeks to the last
//!    `tail_window` bytes and discards the partial leading line),
//! 2. reopens from the start if the file shrank or vanished,
//! 3. reads what is available, holding a trailing partial line until its
//!    newline arrives,
//! 4. otherwise sleeps `poll_interval`, waking early on cancellation.
//!
//! Read errors are logged at `debug` and retried.

use regex::Regex;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const DEFAULT_TAIL_WINDOW: u64 = 64 * 1024;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);
const STOP_TIMEOUT: Duration = Duration::from_secs(2);
const READ_CHUNK: usize = 8 * 1024;

static ESCAPE_SEQUENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)", // OSC
        r"|\x1b\[[0-?]*[ -/]*[@-~]",           // CSI
        r"|\x1b[@-Z\\-_]",                     // other two-byte sequences
    ))
    .expect("valid regex")
});

/// Strip escape sequences and non-printable characters, expand tabs to four
/// spaces and trim trailing whitespace. `None` when nothing printable remains.
pub fn clean_line(raw: &str) -> Option<String> {
    let stripped = ESCAPE_SEQUENCE.replace_all(raw, "");
    let mut out = String::with_capacity(stripped.len());
    for c in stripped.chars() {
        match c {
            '\t' => out.push_str("    "),
            '\u{feff}' | '\u{200b}' => {}
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    let trimmed = out.trim_end();
    if trimmed.trim_start().is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub struct LineStreamReader {
    path: PathBuf,
    tail_window: u64,
    poll_interval: Duration,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl LineStreamReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            tail_window: DEFAULT_TAIL_WINDOW,
            poll_interval: DEFAULT_POLL_INTERVAL,
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    pub fn tail_window(mut self, bytes: u64) -> Self {
        self.tail_window = bytes;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Spawn the read loop. A running loop is left untouched.
    pub fn start<F>(&mut self, handler: F)
    where
        F: FnMut(String) + Send + 'static,
    {
        if self.is_running() {
            return;
        }
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
        let tail = TailState::new(self.path.clone(), self.tail_window);
        let cancel = self.cancel.clone();
        let poll = self.poll_interval;
        self.task = Some(tokio::spawn(read_loop(tail, poll, cancel, handler)));
    }

    /// Cancel the loop and wait up to two seconds for it to finish.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(STOP_TIMEOUT, &mut task).await.is_err() {
                warn!(path = %self.path.display(), "Line reader did not stop in time, aborting");
                task.abort();
            }
        }
    }
}

impl Drop for LineStreamReader {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct TailState {
    path: PathBuf,
    tail_window: u64,
    file: Option<File>,
    position: u64,
    first_open: bool,
    skip_partial: bool,
    pending: Vec<u8>,
}

impl TailState {
    fn new(path: PathBuf, tail_window: u64) -> Self {
        Self {
            path,
            tail_window,
            file: None,
            position: 0,
            first_open: true,
            skip_partial: false,
            pending: Vec::new(),
        }
    }

    async fn open(&mut self) -> std::io::Result<()> {
        let mut file = File::open(&self.path).await?;
        let len = file.metadata().await?.len();
        let mut start = 0;
        if self.first_open && len > self.tail_window {
            // Back up one byte so a window that begins exactly on a line
            // boundary only discards the preceding newline.
            start = len - self.tail_window - 1;
            self.skip_partial = true;
        }
        file.seek(SeekFrom::Start(start)).await?;
        self.first_open = false;
        self.position = start;
        self.file = Some(file);
        Ok(())
    }

    fn reset(&mut self) {
        self.file = None;
        self.position = 0;
        self.pending.clear();
        self.skip_partial = false;
    }

    /// Read the next chunk. Returns complete lines, empty when nothing new arrived.
    async fn poll_lines(&mut self, buf: &mut [u8]) -> std::io::Result<Vec<String>> {
        if self.file.is_none() {
            self.open().await?;
        }

        match tokio::fs::metadata(&self.path).await {
            Ok(meta) if meta.len() < self.position => {
                debug!(path = %self.path.display(), "Log file truncated, reopening from start");
                self.reset();
                self.open().await?;
            }
            Ok(_) => {}
            Err(e) => {
                self.reset();
                return Err(e);
            }
        }

        let Some(file) = self.file.as_mut() else {
            return Ok(Vec::new());
        };
        let n = file.read(buf).await?;
        if n == 0 {
            return Ok(Vec::new());
        }
        self.position += n as u64;
        self.pending.extend_from_slice(&buf[..n]);

        let mut lines = Vec::new();
        while let Some(idx) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=idx).collect();
            if self.skip_partial {
                self.skip_partial = false;
                continue;
            }
            lines.push(String::from_utf8_lossy(&raw[..raw.len() - 1]).into_owned());
        }
        Ok(lines)
    }
}

async fn read_loop<F>(
    mut tail: TailState,
    poll: Duration,
    cancel: CancellationToken,
    mut handler: F,
) where
    F: FnMut(String) + Send + 'static,
{
    let mut buf = vec![0u8; READ_CHUNK];
    while !cancel.is_cancelled() {
        match tail.poll_lines(&mut buf).await {
            Ok(lines) if !lines.is_empty() => {
                for line in lines {
                    if let Some(clean) = clean_line(&line) {
                        handler(clean);
                    }
                }
                continue;
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                debug!(path = %tail.path.display(), error = %e, "Log read failed, retrying");
                tail.file = None;
            }
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(poll) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    async fn wait_for(lines: &Arc<Mutex<Vec<String>>>, count: usize) -> Vec<String> {
        for _ in 0..100 {
            {
                let got = lines.lock().unwrap();
                if got.len() >= count {
                    return got.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        lines.lock().unwrap().clone()
    }

    fn collector() -> (Arc<Mutex<Vec<String>>>, impl FnMut(String) + Send + 'static) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = lines.clone();
        (lines, move |line| sink.lock().unwrap().push(line))
    }

    #[test]
    fn test_clean_line() {
        assert_eq!(clean_line("\x1b[32mgreen\x1b[0m").as_deref(), Some("green"));
        assert_eq!(clean_line("a\tb").as_deref(), Some("a    b"));
        assert_eq!(clean_line("\x1b]0;title\x07text\r").as_deref(), Some("text"));
        assert_eq!(clean_line("bell\x07 here  ").as_deref(), Some("bell here"));
        assert_eq!(clean_line("  \t \x1b[2K"), None);
    }

    #[tokio::test]
    async fn test_waits_for_file_and_follows_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.log");
        let (lines, handler) = collector();

        let mut reader = LineStreamReader::new(&path).poll_interval(Duration::from_millis(10));
        reader.start(handler);
        tokio::time::sleep(Duration::from_millis(30)).await;

        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&path).unwrap();
        writeln!(file, "first").unwrap();
        write!(file, "sec").unwrap();
        file.flush().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(wait_for(&lines, 1).await, vec!["first"]);

        writeln!(file, "ond\n\n\x1b[1mthird\x1b[0m").unwrap();
        let got = wait_for(&lines, 3).await;
        assert_eq!(got, vec!["first", "second", "third"]);

        reader.stop().await;
        assert!(!reader.is_running());
    }

    #[tokio::test]
    async fn test_tail_window_skips_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.log");
        {
            let mut file = std::fs::File::create(&path).unwrap();
            for i in 0..1000 {
                writeln!(file, "history line {:04}", i).unwrap();
            }
        }
        let (lines, handler) = collector();
        let mut reader = LineStreamReader::new(&path)
            .tail_window(100)
            .poll_interval(Duration::from_millis(10));
        reader.start(handler);

        let got = wait_for(&lines, 5).await;
        reader.stop().await;
        assert!(got.len() < 10, "replayed {} lines", got.len());
        assert_eq!(got.last().map(String::as_str), Some("history line 0999"));
        assert!(got.iter().all(|l| l.starts_with("history line ")));
    }

    #[tokio::test]
    async fn test_truncation_reopens_from_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rotating.log");
        std::fs::write(&path, "one\ntwo\nthree\n").unwrap();
        let (lines, handler) = collector();
        let mut reader = LineStreamReader::new(&path).poll_interval(Duration::from_millis(10));
        reader.start(handler);
        assert_eq!(wait_for(&lines, 3).await.len(), 3);

        std::fs::write(&path, "new\n").unwrap();
        let got = wait_for(&lines, 4).await;
        reader.stop().await;
        assert_eq!(got.last().map(String::as_str), Some("new"));
    }
}
