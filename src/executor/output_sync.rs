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

//! Console rendering of host output.
//!
//! Many drain tasks write to the terminal at once. Each line is formatted
//! up front and written while holding the std stream lock, so lines from
//! different hosts never interleave mid-line.

use std::io::{self, Write};

use super::output::{OutputLine, OutputSink, StreamKind};

/// Format a line for display.
pub fn format_line(line: &OutputLine, with_prefix: bool) -> String {
    if with_prefix {
        format!("[{}] {}", line.host, line.text)
    } else {
        line.text.clone()
    }
}

/// Sink writing stdout lines to the process stdout and stderr lines to the
/// process stderr.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleSink {
    with_prefix: bool,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self { with_prefix: true }
    }

    /// Omit the `[host]` prefix.
    pub fn without_prefix(mut self) -> Self {
        self.with_prefix = false;
        self
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

fn write_locked<W: Write>(mut out: W, text: &str) -> io::Result<()> {
    writeln!(out, "{text}")?;
    out.flush()
}

impl OutputSink for ConsoleSink {
    fn write_line(&self, line: &OutputLine) -> io::Result<()> {
        let text = format_line(line, self.with_prefix);
        match line.stream {
            StreamKind::Stdout => write_locked(io::stdout().lock(), &text),
            StreamKind::Stderr => write_locked(io::stderr().lock(), &text),
        }
    }
}
