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

use std::io;
use thiserror::Error;

/// Errors raised by the SSH client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Keyfile invalid: {0}")]
    KeyInvalid(russh::keys::Error),

    #[error("The key is invalid or was rejected by the server")]
    KeyAuthFailed,

    #[error("Unable to connect to the SSH agent")]
    AgentConnectionFailed,

    #[error("Unable to request identities from the SSH agent")]
    AgentRequestIdentitiesFailed,

    #[error("The SSH agent has no identities")]
    AgentNoIdentities,

    #[error("None of the SSH agent identities were accepted")]
    AgentAuthenticationFailed,

    #[error("Wrong password")]
    PasswordWrong,

    #[error("Invalid address was provided: {0}")]
    AddressInvalid(io::Error),

    #[error("The server host key was not accepted")]
    ServerCheckFailed,

    #[error("Host key for {host} does not match known_hosts line {line}")]
    HostKeyChanged { host: String, line: usize },

    #[error("The session was already used to run a command")]
    SessionAlreadyUsed,

    #[error("SSH error: {0}")]
    SshError(#[from] russh::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}
