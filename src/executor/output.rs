// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Tagged output lines, the bounded conduit carrying them and the sinks that
//! render them.

use std::fmt;
use std::io;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Default conduit capacity.
///
/// Producers block once this many lines are queued and unconsumed.
pub const DEFAULT_CONDUIT_CAPACITY: usize = 1000;

/// Which remote output stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        })
    }
}

/// One line of remote output, tagged with its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    /// Label of the host that produced the line
    pub host: Arc<str>,
    pub stream: StreamKind,
    /// Line text without its terminator
    pub text: String,
}

impl OutputLine {
    pub fn new(host: Arc<str>, stream: StreamKind, text: impl Into<String>) -> Self {
        Self {
            host,
            stream,
            text: text.into(),
        }
    }
}

/// Create a bounded conduit.
///
/// A capacity of zero is raised to one since tokio channels require a
/// non-zero bound.
pub fn conduit(capacity: usize) -> (mpsc::Sender<OutputLine>, mpsc::Receiver<OutputLine>) {
    mpsc::channel(capacity.max(1))
}

/// Destination for output lines.
///
/// A sink is shared by every drain task of a run, so `write_line` must render
/// each line as one indivisible unit.
pub trait OutputSink: Send + Sync {
    fn write_line(&self, line: &OutputLine) -> io::Result<()>;
}

/// Consume `rx` until every sender is gone and the queue is empty, rendering
/// each line exactly once in arrival order.
///
/// Returns the number of lines consumed. A sink write error is logged and
/// draining continues so producers never block on a stalled consumer. Once
/// the sink reports a broken pipe, later lines are discarded without further
/// writes or logs.
pub async fn drain(mut rx: mpsc::Receiver<OutputLine>, sink: Arc<dyn OutputSink>) -> usize {
    let mut count = 0;
    let mut closed = false;
    while let Some(line) = rx.recv().await {
        count += 1;
        if closed {
            continue;
        }
        match sink.write_line(&line) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                tracing::warn!("{} output closed, discarding remaining lines", line.stream);
                closed = true;
            }
            Err(e) => {
                tracing::warn!("failed to write {} line from {}: {}", line.stream, line.host, e);
            }
        }
    }
    count
}

/// Sink that keeps every line in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<OutputLine>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the lines written so far, in write order.
    pub fn lines(&self) -> Vec<OutputLine> {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Lines from `host` on `stream`, in write order.
    pub fn lines_for(&self, host: &str, stream: StreamKind) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|l| &*l.host == host && l.stream == stream)
            .map(|l| l.text)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lines().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl OutputSink for MemorySink {
    fn write_line(&self, line: &OutputLine) -> io::Result<()> {
        let mut lines = self
            .lines
            .lock()
            .map_err(|_| io::Error::other("memory sink lock poisoned"))?;
        lines.push(line.clone());
        Ok(())
    }
}
