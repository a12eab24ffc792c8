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

//! In-memory session provider for executor tests.

#![allow(dead_code)]

use async_trait::async_trait;
use multissh::host::Host;
use multissh::ssh::provider::{
    BoxedReader, Connection, ProviderError, RemoteSession, SessionProvider,
};
use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWriteExt, DuplexStream, ReadBuf};

/// What a mock host does when contacted.
#[derive(Debug, Clone)]
pub enum Behaviour {
    /// Emit the given lines and exit.
    Run {
        stdout: Vec<String>,
        stderr: Vec<String>,
        exit_status: Option<u32>,
        delay: Duration,
    },
    /// Emit raw bytes and exit 0.
    Raw { stdout: Vec<u8>, stderr: Vec<u8> },
    /// Emit stdout lines while the stderr stream fails on first read.
    BrokenStderr { stdout: Vec<String> },
    /// Refuse the connection.
    ConnectFail(String),
    /// Connect, then fail to open a session.
    SessionFail(String),
    /// Never finish connecting.
    HangConnect,
    /// Emit the given stdout lines, then never finish.
    HangRun { stdout: Vec<String> },
}

impl Behaviour {
    pub fn lines(stdout: &[&str], stderr: &[&str], exit_status: u32) -> Self {
        Self::Run {
            stdout: stdout.iter().map(|s| s.to_string()).collect(),
            stderr: stderr.iter().map(|s| s.to_string()).collect(),
            exit_status: Some(exit_status),
            delay: Duration::ZERO,
        }
    }

    pub fn ok(stdout: &[&str]) -> Self {
        Self::lines(stdout, &[], 0)
    }
}

/// Per-host counters shared by the provider and its connections.
#[derive(Debug, Default)]
pub struct Stats {
    connects: Mutex<HashMap<String, usize>>,
    closes: Mutex<HashMap<String, usize>>,
    session_closes: Mutex<HashMap<String, usize>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl Stats {
    fn bump(map: &Mutex<HashMap<String, usize>>, host: &str) {
        *map.lock().unwrap().entry(host.to_string()).or_default() += 1;
    }

    fn get(map: &Mutex<HashMap<String, usize>>, host: &str) -> usize {
        map.lock().unwrap().get(host).copied().unwrap_or(0)
    }

    pub fn connects(&self, host: &str) -> usize {
        Self::get(&self.connects, host)
    }

    pub fn closes(&self, host: &str) -> usize {
        Self::get(&self.closes, host)
    }

    pub fn session_closes(&self, host: &str) -> usize {
        Self::get(&self.session_closes, host)
    }

    /// Highest number of simultaneously open connections.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

pub struct MockProvider {
    behaviours: HashMap<String, Behaviour>,
    pub stats: Arc<Stats>,
}

impl MockProvider {
    pub fn new<I, S>(behaviours: I) -> Self
    where
        I: IntoIterator<Item = (S, Behaviour)>,
        S: Into<String>,
    {
        Self {
            behaviours: behaviours
                .into_iter()
                .map(|(host, b)| (host.into(), b))
                .collect(),
            stats: Arc::new(Stats::default()),
        }
    }
}

#[async_trait]
impl SessionProvider for MockProvider {
    async fn connect(&self, host: &Host) -> Result<Box<dyn Connection>, ProviderError> {
        let behaviour = self
            .behaviours
            .get(host.name())
            .cloned()
            .ok_or_else(|| ProviderError::Unavailable(format!("unknown host {host}")))?;

        match behaviour {
            Behaviour::ConnectFail(reason) => Err(ProviderError::Unavailable(reason)),
            Behaviour::HangConnect => futures::future::pending().await,
            behaviour => {
                Stats::bump(&self.stats.connects, host.name());
                let active = self.stats.active.fetch_add(1, Ordering::SeqCst) + 1;
                self.stats.peak.fetch_max(active, Ordering::SeqCst);
                Ok(Box::new(MockConnection {
                    host: host.name().to_string(),
                    behaviour,
                    stats: Arc::clone(&self.stats),
                }))
            }
        }
    }
}

struct MockConnection {
    host: String,
    behaviour: Behaviour,
    stats: Arc<Stats>,
}

#[async_trait]
impl Connection for MockConnection {
    async fn open_session(&mut self) -> Result<Box<dyn RemoteSession>, ProviderError> {
        if let Behaviour::SessionFail(reason) = &self.behaviour {
            return Err(ProviderError::Unavailable(reason.clone()));
        }
        Ok(Box::new(MockSession::new(
            self.host.clone(),
            self.behaviour.clone(),
            Arc::clone(&self.stats),
        )))
    }

    async fn close(&mut self) -> Result<(), ProviderError> {
        Stats::bump(&self.stats.closes, &self.host);
        self.stats.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

struct MockSession {
    host: String,
    behaviour: Behaviour,
    stats: Arc<Stats>,
    stdout_reader: Option<BoxedReader>,
    stderr_reader: Option<BoxedReader>,
    stdout_writer: Option<DuplexStream>,
    stderr_writer: Option<DuplexStream>,
}

impl MockSession {
    fn new(host: String, behaviour: Behaviour, stats: Arc<Stats>) -> Self {
        // Small pipes so producers feel backpressure.
        let (stdout_writer, stdout_reader) = tokio::io::duplex(64);
        let (stderr_writer, stderr_reader) = tokio::io::duplex(64);
        let stderr_reader: BoxedReader = if matches!(behaviour, Behaviour::BrokenStderr { .. }) {
            Box::new(FailingReader)
        } else {
            Box::new(stderr_reader)
        };
        Self {
            host,
            behaviour,
            stats,
            stdout_reader: Some(Box::new(stdout_reader)),
            stderr_reader: Some(stderr_reader),
            stdout_writer: Some(stdout_writer),
            stderr_writer: Some(stderr_writer),
        }
    }
}

async fn write_lines(writer: &mut DuplexStream, lines: &[String]) -> io::Result<()> {
    for line in lines {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
    }
    Ok(())
}

#[async_trait]
impl RemoteSession for MockSession {
    fn take_stdout(&mut self) -> Option<BoxedReader> {
        self.stdout_reader.take()
    }

    fn take_stderr(&mut self) -> Option<BoxedReader> {
        self.stderr_reader.take()
    }

    async fn run(&mut self, _command: &str) -> Result<Option<u32>, ProviderError> {
        let mut stdout = self.stdout_writer.take().expect("session already ran");
        let mut stderr = self.stderr_writer.take().expect("session already ran");

        match self.behaviour.clone() {
            Behaviour::Run {
                stdout: out,
                stderr: err,
                exit_status,
                delay,
            } => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                // Split every stdout line around a complete stderr line so the
                // two streams interleave mid-line.
                let n = out.len().max(err.len());
                for i in 0..n {
                    match out.get(i) {
                        Some(line) => {
                            let (head, tail) = line.split_at(line.len() / 2);
                            stdout.write_all(head.as_bytes()).await?;
                            if let Some(e) = err.get(i) {
                                write_lines(&mut stderr, std::slice::from_ref(e)).await?;
                            }
                            stdout.write_all(tail.as_bytes()).await?;
                            stdout.write_all(b"\n").await?;
                        }
                        None => {
                            if let Some(e) = err.get(i) {
                                write_lines(&mut stderr, std::slice::from_ref(e)).await?;
                            }
                        }
                    }
                }
                Ok(exit_status)
            }
            Behaviour::Raw {
                stdout: out,
                stderr: err,
            } => {
                stdout.write_all(&out).await?;
                stderr.write_all(&err).await?;
                Ok(Some(0))
            }
            Behaviour::BrokenStderr { stdout: out } => {
                drop(stderr);
                write_lines(&mut stdout, &out).await?;
                Ok(Some(0))
            }
            Behaviour::HangRun { stdout: out } => {
                write_lines(&mut stdout, &out).await?;
                futures::future::pending().await
            }
            other => panic!("unexpected behaviour in run: {other:?}"),
        }
    }

    async fn close(&mut self) -> Result<(), ProviderError> {
        Stats::bump(&self.stats.session_closes, &self.host);
        Ok(())
    }
}

/// Reader whose first read fails.
pub struct FailingReader;

impl AsyncRead for FailingReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "connection reset by peer",
        )))
    }
}

pub fn hosts(names: &[&str]) -> Vec<Host> {
    names.iter().map(|n| Host::parse(n).unwrap()).collect()
}
