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

//! Resolution of the authentication method shared by every host of a run.
//!
//! The method is decided once, before any connection is attempted, so that
//! interactive prompts (key passphrases) happen at most once per invocation.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

use super::tokio_client::AuthMethod;

/// Key files probed when nothing more specific is available.
const DEFAULT_KEY_NAMES: [&str; 3] = ["id_ed25519", "id_rsa", "id_ecdsa"];

/// Inputs for determining the SSH authentication method.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Username for authentication prompts
    pub username: String,
    /// Password from the command line or `MULTISSH_PASSWORD`
    pub password: Option<Zeroizing<String>>,
    /// Explicit private key file
    pub key_path: Option<PathBuf>,
}

impl AuthContext {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: None,
            key_path: None,
        }
    }

    /// Use password authentication. Empty passwords are ignored.
    pub fn with_password(mut self, password: Option<&str>) -> Self {
        self.password = password
            .filter(|p| !p.is_empty())
            .map(|p| Zeroizing::new(p.to_string()));
        self
    }

    pub fn with_key_path(mut self, key_path: Option<PathBuf>) -> Self {
        self.key_path = key_path;
        self
    }

    /// Determine the authentication method.
    ///
    /// Priority:
    /// 1. Password (if provided)
    /// 2. SSH agent (if `SSH_AUTH_SOCK` is set)
    /// 3. Specified key file
    /// 4. Default key locations (~/.ssh/id_ed25519, ~/.ssh/id_rsa, ~/.ssh/id_ecdsa)
    ///
    /// # Errors
    ///
    /// Returns an error if no method is available, the key file cannot be read,
    /// or the passphrase prompt fails.
    pub fn determine_method(&self) -> Result<AuthMethod> {
        if let Some(password) = &self.password {
            tracing::debug!("Using password authentication");
            return Ok(AuthMethod::Password(password.clone()));
        }

        if let Some(auth) = self.agent_auth() {
            return Ok(auth);
        }

        if let Some(ref key_path) = self.key_path {
            return key_file_auth(key_path);
        }

        self.default_key_auth()
    }

    #[cfg(not(target_os = "windows"))]
    fn agent_auth(&self) -> Option<AuthMethod> {
        if std::env::var_os("SSH_AUTH_SOCK").is_some() {
            tracing::debug!("Using SSH agent for authentication");
            return Some(AuthMethod::with_agent());
        }
        None
    }

    #[cfg(target_os = "windows")]
    fn agent_auth(&self) -> Option<AuthMethod> {
        None
    }

    fn default_key_auth(&self) -> Result<AuthMethod> {
        let ssh_dir = directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".ssh"))
            .unwrap_or_else(|| PathBuf::from(".ssh"));

        for name in DEFAULT_KEY_NAMES {
            let candidate = ssh_dir.join(name);
            if candidate.exists() {
                tracing::debug!("Using default key: {:?}", candidate);
                return key_file_auth(&candidate);
            }
        }

        anyhow::bail!(
            "No authentication method available for user '{}'.\n\
             Tried:\n\
             - Password: not provided (-p/--password or MULTISSH_PASSWORD)\n\
             - SSH agent: not available (SSH_AUTH_SOCK not set)\n\
             - Default key files (~/.ssh/id_ed25519, ~/.ssh/id_rsa, ~/.ssh/id_ecdsa): not found\n\
             \n\
             Specify a key file with -k/--private-key or start an SSH agent.",
            self.username
        )
    }
}

/// Build key file authentication, prompting for a passphrase if the key is
/// encrypted.
fn key_file_auth(key_path: &Path) -> Result<AuthMethod> {
    tracing::debug!("Authenticating with key: {:?}", key_path);

    let key_contents = std::fs::read_to_string(key_path)
        .with_context(|| format!("Failed to read SSH key file: {key_path:?}"))?;

    let passphrase = if is_encrypted_key(&key_contents) {
        tracing::debug!("Detected encrypted SSH key, prompting for passphrase");
        Some(Zeroizing::new(
            rpassword::prompt_password(format!("Enter passphrase for key {key_path:?}: "))
                .with_context(|| "Failed to read passphrase")?,
        ))
    } else {
        None
    };

    Ok(AuthMethod::with_key_file(
        key_path,
        passphrase.as_ref().map(|p| p.as_str()),
    ))
}

/// Whether a key file's contents indicate it is passphrase protected.
///
/// PEM keys carry an explicit `ENCRYPTED` header. OpenSSH format keys name
/// their cipher inside the base64 body, so the key is decoded far enough to
/// read it.
fn is_encrypted_key(contents: &str) -> bool {
    if contents.contains("ENCRYPTED") {
        return true;
    }
    if contents.contains("BEGIN OPENSSH PRIVATE KEY") {
        return russh::keys::decode_secret_key(contents, None)
            .is_err_and(|e| matches!(e, russh::keys::Error::KeyIsEncrypted));
    }
    false
}
