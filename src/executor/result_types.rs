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

//! Result types for a dispatched run.

use owo_colors::OwoColorize;
use std::fmt;

use crate::host::Host;

/// Terminal state of one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostOutcome {
    /// Connected and ran the command to completion.
    Completed { exit_status: Option<u32> },
    /// The connection could not be established.
    ConnectFailed(String),
    /// Connected, but the session could not be opened or the command did not
    /// finish.
    SessionFailed(String),
    /// The run was cancelled before this host finished.
    Cancelled,
}

impl HostOutcome {
    /// Completed with exit status zero.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Self::Completed {
                exit_status: Some(0)
            }
        )
    }
}

impl fmt::Display for HostOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed {
                exit_status: Some(code),
            } => write!(f, "exited with status {code}"),
            Self::Completed { exit_status: None } => {
                f.write_str("exited without reporting a status")
            }
            Self::ConnectFailed(reason) => write!(f, "connection failed: {reason}"),
            Self::SessionFailed(reason) => write!(f, "session failed: {reason}"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Result of running the command on a single host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostResult {
    pub host: Host,
    pub outcome: HostOutcome,
    pub stdout_lines: usize,
    pub stderr_lines: usize,
    /// Output streams that ended on a read error
    pub stream_errors: Vec<String>,
}

impl HostResult {
    pub fn new(host: Host, outcome: HostOutcome) -> Self {
        Self {
            host,
            outcome,
            stdout_lines: 0,
            stderr_lines: 0,
            stream_errors: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

/// Results of a run, one per host in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub results: Vec<HostResult>,
}

impl RunSummary {
    pub fn new(results: Vec<HostResult>) -> Self {
        Self { results }
    }

    pub fn get(&self, host: &Host) -> Option<&HostResult> {
        self.results.iter().find(|r| &r.host == host)
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    /// Hosts that did not complete with exit status zero.
    pub fn failed(&self) -> impl Iterator<Item = &HostResult> {
        self.results.iter().filter(|r| !r.is_success())
    }

    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(HostResult::is_success)
    }

    /// Process exit code: 0 if every host completed with status 0, else 1.
    pub fn exit_code(&self) -> i32 {
        if self.all_succeeded() {
            0
        } else {
            1
        }
    }

    /// Print failed hosts and their reasons to stderr.
    pub fn print_summary(&self) {
        let failed: Vec<&HostResult> = self.failed().collect();
        if failed.is_empty() {
            tracing::debug!("all {} hosts succeeded", self.results.len());
            return;
        }

        eprintln!();
        eprintln!(
            "{} {} of {} hosts failed",
            "●".red(),
            failed.len(),
            self.results.len()
        );
        for result in failed {
            eprintln!(
                "  {} {}",
                result.host.to_string().bold(),
                result.outcome.to_string().red()
            );
            for error in &result.stream_errors {
                eprintln!("    {}", error.dimmed());
            }
        }
    }
}
