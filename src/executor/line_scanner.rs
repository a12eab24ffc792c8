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

//! Splitting raw output streams into lines.

use futures::Stream;
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::sync::mpsc;

use super::output::{OutputLine, StreamKind};

/// Longest line yielded as a single record. Longer runs without a newline
/// are split into several lines of at most this many bytes.
pub const DEFAULT_MAX_LINE_LEN: usize = 64 * 1024;

/// Errors that end a scan early.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to read {stream}: {source}")]
    Read {
        stream: StreamKind,
        #[source]
        source: io::Error,
    },

    #[error("output consumer went away while scanning {0}")]
    ConduitClosed(StreamKind),
}

/// Lazy line reader over an async byte stream.
///
/// Lines are split on `\n`. The terminator and a preceding `\r` are removed,
/// a final unterminated line is still yielded, and invalid UTF-8 is replaced
/// rather than rejected. A line longer than the maximum length is cut into
/// pieces, so memory per scanner stays bounded whatever the remote writes.
pub struct LineScanner<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
    max_line_len: usize,
}

impl<R: AsyncRead + Unpin> LineScanner<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            buf: Vec::new(),
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }

    /// Set the maximum line length in bytes, at least 1.
    pub fn with_max_line_len(mut self, max_line_len: usize) -> Self {
        self.max_line_len = max_line_len.max(1);
        self
    }

    /// Read the next line. `Ok(None)` means end-of-stream.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        self.buf.clear();
        let n = (&mut self.reader)
            .take(self.max_line_len as u64)
            .read_until(b'\n', &mut self.buf)
            .await?;
        if n == 0 {
            return Ok(None);
        }
        let mut terminated = self.buf.last() == Some(&b'\n');
        if terminated {
            self.buf.pop();
        } else if self.buf.len() == self.max_line_len {
            // A line of exactly the maximum length still owns its terminator.
            if self.reader.fill_buf().await?.first() == Some(&b'\n') {
                self.reader.consume(1);
                terminated = true;
            }
        }
        if terminated && self.buf.last() == Some(&b'\r') {
            self.buf.pop();
        }
        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }

    /// Turn the scanner into a stream of lines.
    ///
    /// The stream ends after end-of-stream or after yielding the first read
    /// error.
    pub fn into_stream(self) -> impl Stream<Item = io::Result<String>> {
        futures::stream::unfold(Some(self), |state| async move {
            let mut scanner = state?;
            match scanner.next_line().await {
                Ok(Some(line)) => Some((Ok(line), Some(scanner))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

/// Scan `reader` to the end, sending each line to `tx` tagged with `host` and
/// `stream`.
///
/// Waits whenever the conduit is full. Returns the number of lines sent.
pub async fn scan_into<R: AsyncRead + Unpin>(
    reader: R,
    host: Arc<str>,
    stream: StreamKind,
    tx: mpsc::Sender<OutputLine>,
) -> Result<usize, ScanError> {
    let mut scanner = LineScanner::new(reader);
    let mut sent = 0;
    loop {
        let text = match scanner.next_line().await {
            Ok(Some(text)) => text,
            Ok(None) => break,
            Err(source) => return Err(ScanError::Read { stream, source }),
        };
        tx.send(OutputLine::new(Arc::clone(&host), stream, text))
            .await
            .map_err(|_| ScanError::ConduitClosed(stream))?;
        sent += 1;
    }
    Ok(sent)
}
