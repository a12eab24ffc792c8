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

//! Running one command on one connected host.
//!
//! Each output stream gets its own pipeline: a scanner task splitting the
//! stream into lines and pushing them into a bounded conduit, and a drain task
//! feeding the conduit to the sink. The session is closed only after the
//! command has finished and both pipelines are joined.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::line_scanner::{scan_into, ScanError};
use super::output::{conduit, drain, OutputSink, StreamKind, DEFAULT_CONDUIT_CAPACITY};
use crate::ssh::provider::{BoxedReader, Connection, ProviderError};

/// Per-session settings.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Capacity of each stream's conduit
    pub channel_capacity: usize,
    /// Upper bound on command run time, `None` for unlimited
    pub command_timeout: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CONDUIT_CAPACITY,
            command_timeout: None,
        }
    }
}

/// Outcome of a completed session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionReport {
    /// Remote exit status, if the server reported one
    pub exit_status: Option<u32>,
    pub stdout_lines: usize,
    pub stderr_lines: usize,
    /// Read failures that ended a stream early
    pub stream_errors: Vec<String>,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to open session: {0}")]
    Open(#[source] ProviderError),

    #[error("command execution failed: {0}")]
    Run(#[source] ProviderError),

    #[error("command timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),

    #[error("cancelled")]
    Cancelled,
}

struct Pipeline {
    stream: StreamKind,
    scanner: JoinHandle<Result<usize, ScanError>>,
    drain: JoinHandle<usize>,
}

impl Pipeline {
    fn spawn(
        reader: BoxedReader,
        host: Arc<str>,
        stream: StreamKind,
        sink: Arc<dyn OutputSink>,
        capacity: usize,
    ) -> Self {
        let (tx, rx) = conduit(capacity);
        let scanner = tokio::spawn(scan_into(reader, host, stream, tx).in_current_span());
        let drain = tokio::spawn(drain(rx, sink).in_current_span());
        Self {
            stream,
            scanner,
            drain,
        }
    }

    /// Wait for both tasks. Returns the rendered line count and the error that
    /// ended the stream, if any.
    async fn join(self) -> (usize, Option<String>) {
        let error = match self.scanner.await {
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                tracing::warn!("{}", e);
                Some(e.to_string())
            }
            Err(e) => {
                tracing::warn!("{} scanner task failed: {}", self.stream, e);
                Some(format!("{} scanner task failed: {e}", self.stream))
            }
        };
        let lines = match self.drain.await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("{} drain task failed: {}", self.stream, e);
                0
            }
        };
        (lines, error)
    }
}

async fn join_pipeline(pipeline: Option<Pipeline>, stream_errors: &mut Vec<String>) -> usize {
    let Some(pipeline) = pipeline else {
        return 0;
    };
    let (lines, error) = pipeline.join().await;
    stream_errors.extend(error);
    lines
}

/// Run `command` over `conn` and stream its output into `sink`.
///
/// The session is opened here and closed before returning, on every path past
/// a successful open. The connection itself belongs to the caller.
pub async fn run_session(
    conn: &mut dyn Connection,
    host: Arc<str>,
    command: &str,
    sink: Arc<dyn OutputSink>,
    options: SessionOptions,
    cancel: &CancellationToken,
) -> Result<SessionReport, SessionError> {
    let mut session = conn.open_session().await.map_err(SessionError::Open)?;

    let stdout = session.take_stdout().map(|reader| {
        Pipeline::spawn(
            reader,
            Arc::clone(&host),
            StreamKind::Stdout,
            Arc::clone(&sink),
            options.channel_capacity,
        )
    });
    let stderr = session.take_stderr().map(|reader| {
        Pipeline::spawn(
            reader,
            Arc::clone(&host),
            StreamKind::Stderr,
            Arc::clone(&sink),
            options.channel_capacity,
        )
    });

    tracing::debug!("running command");
    let outcome = {
        let run = async {
            match options.command_timeout {
                Some(limit) => match tokio::time::timeout(limit, session.run(command)).await {
                    Ok(res) => res.map_err(SessionError::Run),
                    Err(_) => Err(SessionError::Timeout(limit)),
                },
                None => session.run(command).await.map_err(SessionError::Run),
            }
        };
        // `run` is polled first so it owns the stream writers even when the
        // token is already cancelled.
        tokio::select! {
            biased;
            res = run => res,
            _ = cancel.cancelled() => Err(SessionError::Cancelled),
        }
    };
    // The run future is gone, so its stream writers are too: both pipelines
    // will reach end-of-stream.

    let mut stream_errors = Vec::new();
    let stdout_lines = join_pipeline(stdout, &mut stream_errors).await;
    let stderr_lines = join_pipeline(stderr, &mut stream_errors).await;

    if let Err(e) = session.close().await {
        tracing::debug!("failed to close session: {}", e);
    }

    let exit_status = outcome?;
    tracing::debug!(
        "command finished with exit status {:?} ({} stdout, {} stderr lines)",
        exit_status,
        stdout_lines,
        stderr_lines
    );
    Ok(SessionReport {
        exit_status,
        stdout_lines,
        stderr_lines,
        stream_errors,
    })
}
