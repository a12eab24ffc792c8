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

//! Remote session provider abstraction.
//!
//! The executor never talks to russh directly. It asks a [`SessionProvider`]
//! for a [`Connection`] to a host, opens a [`RemoteSession`] on it and reads
//! the session's output streams while the command runs.
//!
//! # Implementing SessionProvider
//!
//! ```ignore
//! use async_trait::async_trait;
//! use multissh::host::Host;
//! use multissh::ssh::provider::{Connection, ProviderError, SessionProvider};
//!
//! struct Unreachable;
//!
//! #[async_trait]
//! impl SessionProvider for Unreachable {
//!     async fn connect(&self, host: &Host) -> Result<Box<dyn Connection>, ProviderError> {
//!         Err(ProviderError::Unavailable(format!("{host} is unreachable")))
//!     }
//! }
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncRead;

use super::credential::Credential;
use super::tokio_client::{self, Client, ExecSession};
use crate::host::Host;

/// An owned, readable output stream of a remote session.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Errors raised while acquiring or using a remote session.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error(transparent)]
    Ssh(#[from] tokio_client::Error),

    #[error("{0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Source of authenticated connections.
///
/// Implementations must be `Send + Sync`: one provider is shared by every
/// host task of a run.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Establish an authenticated connection to `host`.
    async fn connect(&self, host: &Host) -> Result<Box<dyn Connection>, ProviderError>;
}

/// One live connection to a single host.
#[async_trait]
pub trait Connection: Send {
    /// Open a session channel for running one command.
    async fn open_session(&mut self) -> Result<Box<dyn RemoteSession>, ProviderError>;

    /// Tear down the connection.
    async fn close(&mut self) -> Result<(), ProviderError>;
}

/// A single command execution with separately readable stdout and stderr.
#[async_trait]
pub trait RemoteSession: Send {
    /// Take the stdout stream. Returns `None` once taken.
    fn take_stdout(&mut self) -> Option<BoxedReader>;

    /// Take the stderr stream. Returns `None` once taken.
    fn take_stderr(&mut self) -> Option<BoxedReader>;

    /// Run `command` to completion, returning its exit status if the remote
    /// side reported one.
    ///
    /// The future takes ownership of the stream writers on its first poll.
    /// Both output streams must reach end-of-stream when it completes or is
    /// dropped after being polled.
    async fn run(&mut self, command: &str) -> Result<Option<u32>, ProviderError>;

    /// Close the session.
    async fn close(&mut self) -> Result<(), ProviderError>;
}

/// [`SessionProvider`] backed by russh.
pub struct RusshProvider {
    credential: Arc<Credential>,
    config: Arc<tokio_client::Config>,
}

impl RusshProvider {
    pub fn new(credential: Credential) -> Self {
        Self {
            credential: Arc::new(credential),
            config: Arc::new(tokio_client::Config::default()),
        }
    }
}

#[async_trait]
impl SessionProvider for RusshProvider {
    async fn connect(&self, host: &Host) -> Result<Box<dyn Connection>, ProviderError> {
        let client = Client::connect(
            host.name(),
            host.port(),
            &self.credential.username,
            self.credential.auth.clone(),
            self.credential.server_check.clone(),
            Arc::clone(&self.config),
        )
        .await?;
        tracing::debug!("connected to {} as {}", client.address(), client.username());
        Ok(Box::new(client))
    }
}

#[async_trait]
impl Connection for Client {
    async fn open_session(&mut self) -> Result<Box<dyn RemoteSession>, ProviderError> {
        let session = self.open_exec_session().await?;
        Ok(Box::new(session))
    }

    async fn close(&mut self) -> Result<(), ProviderError> {
        if self.is_closed() {
            return Ok(());
        }
        self.disconnect().await?;
        Ok(())
    }
}

#[async_trait]
impl RemoteSession for ExecSession {
    fn take_stdout(&mut self) -> Option<BoxedReader> {
        ExecSession::take_stdout(self).map(|r| Box::new(r) as BoxedReader)
    }

    fn take_stderr(&mut self) -> Option<BoxedReader> {
        ExecSession::take_stderr(self).map(|r| Box::new(r) as BoxedReader)
    }

    async fn run(&mut self, command: &str) -> Result<Option<u32>, ProviderError> {
        Ok(ExecSession::run(self, command).await?)
    }

    async fn close(&mut self) -> Result<(), ProviderError> {
        Ok(ExecSession::close(self).await?)
    }
}
