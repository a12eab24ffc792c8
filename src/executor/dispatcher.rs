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

//! Concurrent fan-out of one command across many hosts.

use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::output::{OutputSink, DEFAULT_CONDUIT_CAPACITY};
use super::result_types::{HostOutcome, HostResult, RunSummary};
use super::session_runner::{run_session, SessionError, SessionOptions};
use crate::host::Host;
use crate::ssh::provider::SessionProvider;

/// Default time allowed for establishing one connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time allowed for the remote command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("no hosts to run on")]
    NoHosts,

    #[error("host '{0}' appears more than once")]
    DuplicateHost(String),
}

/// Runs a command on every host concurrently.
///
/// Each host gets its own task: connect, run the command through
/// [`run_session`], close the connection. A failing host never affects the
/// others, and [`run`](Dispatcher::run) returns once every host has reached a
/// terminal state.
pub struct Dispatcher {
    provider: Arc<dyn SessionProvider>,
    sink: Arc<dyn OutputSink>,
    connect_timeout: Duration,
    command_timeout: Option<Duration>,
    max_parallel: Option<usize>,
    channel_capacity: usize,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub fn new(provider: Arc<dyn SessionProvider>, sink: Arc<dyn OutputSink>) -> Self {
        Self {
            provider,
            sink,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            command_timeout: Some(DEFAULT_COMMAND_TIMEOUT),
            max_parallel: None,
            channel_capacity: DEFAULT_CONDUIT_CAPACITY,
            cancel: CancellationToken::new(),
        }
    }

    /// Set the connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the command timeout. `None` or a zero duration means unlimited.
    pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    /// Bound the number of hosts worked on at once. Zero means unbounded.
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = (max_parallel > 0).then_some(max_parallel);
        self
    }

    /// Set the conduit capacity of each output stream.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Use `token` to cancel outstanding work.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run `command` on every host and wait for all of them.
    ///
    /// Results are returned in the order of `hosts`.
    pub async fn run(&self, hosts: &[Host], command: &str) -> Result<RunSummary, DispatchError> {
        if hosts.is_empty() {
            return Err(DispatchError::NoHosts);
        }
        let mut seen = HashSet::with_capacity(hosts.len());
        if let Some(dup) = hosts.iter().find(|h| !seen.insert(*h)) {
            return Err(DispatchError::DuplicateHost(dup.to_string()));
        }

        let semaphore = self.max_parallel.map(|n| Arc::new(Semaphore::new(n)));
        let command: Arc<str> = Arc::from(command);
        let options = SessionOptions {
            channel_capacity: self.channel_capacity,
            command_timeout: self.command_timeout,
        };

        tracing::info!("running on {} hosts", hosts.len());

        let tasks: Vec<_> = hosts
            .iter()
            .map(|host| {
                let task = HostTask {
                    host: host.clone(),
                    command: Arc::clone(&command),
                    provider: Arc::clone(&self.provider),
                    sink: Arc::clone(&self.sink),
                    connect_timeout: self.connect_timeout,
                    options,
                    cancel: self.cancel.clone(),
                    semaphore: semaphore.clone(),
                };
                let span = tracing::info_span!("host", host = %host);
                tokio::spawn(task.run().instrument(span))
            })
            .collect();

        let results = join_all(tasks).await;

        let results = results
            .into_iter()
            .zip(hosts)
            .map(|(result, host)| match result {
                Ok(host_result) => host_result,
                Err(e) => {
                    tracing::error!("task for {} failed: {}", host, e);
                    HostResult::new(
                        host.clone(),
                        HostOutcome::SessionFailed(format!("task failed: {e}")),
                    )
                }
            })
            .collect();

        Ok(RunSummary::new(results))
    }
}

struct HostTask {
    host: Host,
    command: Arc<str>,
    provider: Arc<dyn SessionProvider>,
    sink: Arc<dyn OutputSink>,
    connect_timeout: Duration,
    options: SessionOptions,
    cancel: CancellationToken,
    semaphore: Option<Arc<Semaphore>>,
}

impl HostTask {
    async fn run(self) -> HostResult {
        let _permit = match &self.semaphore {
            Some(semaphore) => {
                let acquire = Arc::clone(semaphore).acquire_owned();
                let permit = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => None,
                    permit = acquire => permit.ok(),
                };
                match permit {
                    Some(permit) => Some(permit),
                    None => return HostResult::new(self.host, HostOutcome::Cancelled),
                }
            }
            None => None,
        };

        tracing::debug!("connecting");
        let connect = tokio::time::timeout(self.connect_timeout, self.provider.connect(&self.host));
        let connected = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            res = connect => Some(res),
        };
        let mut conn = match connected {
            None => {
                tracing::debug!("cancelled while connecting");
                return HostResult::new(self.host, HostOutcome::Cancelled);
            }
            Some(Ok(Ok(conn))) => conn,
            Some(Ok(Err(e))) => {
                tracing::error!("failed to connect: {}", e);
                return HostResult::new(self.host, HostOutcome::ConnectFailed(e.to_string()));
            }
            Some(Err(_)) => {
                let reason = format!(
                    "connection timed out after {} seconds",
                    self.connect_timeout.as_secs()
                );
                tracing::error!("{}", reason);
                return HostResult::new(self.host, HostOutcome::ConnectFailed(reason));
            }
        };

        let label: Arc<str> = Arc::from(self.host.to_string());
        let session = run_session(
            conn.as_mut(),
            label,
            &self.command,
            self.sink,
            self.options,
            &self.cancel,
        )
        .await;

        if let Err(e) = conn.close().await {
            tracing::debug!("failed to close connection: {}", e);
        }

        match session {
            Ok(report) => {
                tracing::debug!("completed with exit status {:?}", report.exit_status);
                HostResult {
                    host: self.host,
                    outcome: HostOutcome::Completed {
                        exit_status: report.exit_status,
                    },
                    stdout_lines: report.stdout_lines,
                    stderr_lines: report.stderr_lines,
                    stream_errors: report.stream_errors,
                }
            }
            Err(SessionError::Cancelled) => {
                tracing::debug!("cancelled while running");
                HostResult::new(self.host, HostOutcome::Cancelled)
            }
            Err(e) => {
                tracing::error!("{}", e);
                HostResult::new(self.host, HostOutcome::SessionFailed(e.to_string()))
            }
        }
    }
}
