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

//! SSH connection establishment.
//!
//! Handles address resolution, connection attempts and the initial handshake.

use russh::client::{Config, Handle, Handler};
use std::net::SocketAddr;
use std::sync::Arc;
use std::{fmt::Debug, io};

use super::authentication::{AuthMethod, ServerCheckMethod};

/// An authenticated SSH connection to a remote server.
///
/// After [`connect`](Client::connect)ing, open command sessions with
/// [`open_exec_session`](Client::open_exec_session).
///
/// # Examples
///
/// ```no_run
/// use multissh::ssh::tokio_client::{AuthMethod, Client, ServerCheckMethod};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), multissh::ssh::tokio_client::Error> {
///     let client = Client::connect(
///         "10.10.10.2",
///         22,
///         "root",
///         AuthMethod::with_password("root"),
///         ServerCheckMethod::NoCheck,
///         Arc::new(russh::client::Config::default()),
///     )
///     .await?;
///     client.disconnect().await
/// }
/// ```
pub struct Client {
    pub(super) connection_handle: Handle<ClientHandler>,
    username: String,
    address: SocketAddr,
}

impl Client {
    /// Open an SSH connection to `host:port` and authenticate.
    ///
    /// If the host resolves to multiple addresses, each is tried in turn until a
    /// connection succeeds. Authentication is only attempted on the first
    /// successful connection.
    pub async fn connect(
        host: &str,
        port: u16,
        username: &str,
        auth: AuthMethod,
        server_check: ServerCheckMethod,
        config: Arc<Config>,
    ) -> Result<Self, super::Error> {
        let socket_addrs = tokio::net::lookup_host((host, port))
            .await
            .map_err(super::Error::AddressInvalid)?;

        let mut connect_res = Err(super::Error::AddressInvalid(io::Error::new(
            io::ErrorKind::InvalidInput,
            "could not resolve to any addresses",
        )));
        for socket_addr in socket_addrs {
            let handler = ClientHandler::new(host.to_string(), socket_addr, server_check.clone());
            match russh::client::connect(config.clone(), socket_addr, handler).await {
                Ok(h) => {
                    connect_res = Ok((socket_addr, h));
                    break;
                }
                Err(e) => {
                    tracing::debug!("connection attempt to {} failed: {}", socket_addr, e);
                    connect_res = Err(e);
                }
            }
        }
        let (address, mut handle) = connect_res?;

        super::authentication::authenticate(&mut handle, username, auth).await?;

        Ok(Self {
            connection_handle: handle,
            username: username.to_string(),
            address,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn address(&self) -> &SocketAddr {
        &self.address
    }

    /// Disconnect from the remote host.
    pub async fn disconnect(&self) -> Result<(), super::Error> {
        self.connection_handle
            .disconnect(russh::Disconnect::ByApplication, "", "")
            .await
            .map_err(super::Error::SshError)
    }

    pub fn is_closed(&self) -> bool {
        self.connection_handle.is_closed()
    }
}

impl Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("username", &self.username)
            .field("address", &self.address)
            .field("connection_handle", &"Handle<ClientHandler>")
            .finish()
    }
}

/// Handler verifying the server's host key.
#[derive(Debug, Clone)]
pub struct ClientHandler {
    hostname: String,
    host: SocketAddr,
    server_check: ServerCheckMethod,
}

impl ClientHandler {
    pub fn new(hostname: String, host: SocketAddr, server_check: ServerCheckMethod) -> Self {
        Self {
            hostname,
            host,
            server_check,
        }
    }
}

impl Handler for ClientHandler {
    type Error = super::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        verify_server_key(
            &self.server_check,
            &self.hostname,
            self.host.port(),
            server_public_key,
        )
    }
}

/// Decide whether `key` is acceptable for `hostname:port` under `method`.
///
/// `Ok(false)` rejects the key without a specific reason. A key that differs
/// from the one recorded for the host is always an error.
pub fn verify_server_key(
    method: &ServerCheckMethod,
    hostname: &str,
    port: u16,
    key: &russh::keys::PublicKey,
) -> Result<bool, super::Error> {
    let checked = match method {
        ServerCheckMethod::NoCheck => return Ok(true),
        ServerCheckMethod::KnownHostsFile(path) | ServerCheckMethod::AcceptNew(path) => {
            russh::keys::check_known_hosts_path(hostname, port, key, path)
        }
        ServerCheckMethod::DefaultKnownHostsFile => {
            russh::keys::check_known_hosts(hostname, port, key)
        }
    };

    match checked {
        Ok(true) => Ok(true),
        Ok(false) => match method {
            ServerCheckMethod::AcceptNew(path) => {
                russh::keys::known_hosts::learn_known_hosts_path(hostname, port, key, path)
                    .map_err(|e| {
                        tracing::warn!("failed to record host key for {}: {}", hostname, e);
                        super::Error::ServerCheckFailed
                    })?;
                tracing::info!("added host key for {} to {:?}", hostname, path);
                Ok(true)
            }
            _ => Ok(false),
        },
        Err(russh::keys::Error::KeyChanged { line }) => Err(super::Error::HostKeyChanged {
            host: hostname.to_string(),
            line,
        }),
        Err(e) => {
            tracing::debug!("host key check for {} failed: {}", hostname, e);
            Err(super::Error::ServerCheckFailed)
        }
    }
}
