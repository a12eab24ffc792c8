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

//! Target host identifiers and node-list parsing.
//!
//! A node list is a comma-delimited string such as `web1,web2.example.com,10.0.0.3:2222`.
//! Each entry must be a hostname, a fully-qualified domain name or an IPv4 address,
//! optionally followed by `:port`.

use std::fmt;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Standard SSH port used when a node does not carry its own.
pub const DEFAULT_SSH_PORT: u16 = 22;

const MAX_HOSTNAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Errors produced while parsing a node list.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HostError {
    #[error("invalid node '{node}': {reason}")]
    Invalid { node: String, reason: String },

    #[error("invalid port number in node '{node}'")]
    InvalidPort { node: String },

    #[error("node list does not contain any hosts")]
    EmptyList,
}

/// A validated remote target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Host {
    name: String,
    port: u16,
}

impl Host {
    pub fn new(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            port,
        }
    }

    /// Parse a single node entry using the standard SSH port as default.
    pub fn parse(node: &str) -> Result<Self, HostError> {
        Self::parse_with_default_port(node, DEFAULT_SSH_PORT)
    }

    /// Parse a single node entry.
    ///
    /// Accepted formats:
    /// - `host`
    /// - `host:port`
    pub fn parse_with_default_port(node: &str, default_port: u16) -> Result<Self, HostError> {
        let node = node.trim();

        let (name, port) = match node.rsplit_once(':') {
            Some((name, port_str)) => {
                let port = port_str
                    .parse::<u16>()
                    .ok()
                    .filter(|p| *p != 0)
                    .ok_or_else(|| HostError::InvalidPort {
                        node: node.to_string(),
                    })?;
                (name, port)
            }
            None => (node, default_port),
        };

        validate_name(name).map_err(|reason| HostError::Invalid {
            node: node.to_string(),
            reason,
        })?;

        Ok(Self::new(name, port))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.port == DEFAULT_SSH_PORT {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}:{}", self.name, self.port)
        }
    }
}

/// Parse a comma-delimited node list.
///
/// Empty entries are skipped and duplicates are dropped, keeping the first
/// occurrence so the caller's ordering is preserved.
pub fn parse_host_list(list: &str, default_port: u16) -> Result<Vec<Host>, HostError> {
    tracing::debug!("parsing node string: {}", list);

    let mut hosts: Vec<Host> = Vec::new();
    for entry in list.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }

        let host = Host::parse_with_default_port(entry, default_port)?;
        if hosts.contains(&host) {
            tracing::debug!("skipping duplicate node: {}", host);
            continue;
        }
        hosts.push(host);
    }

    if hosts.is_empty() {
        return Err(HostError::EmptyList);
    }

    tracing::debug!(
        "node list: {}",
        hosts
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    );
    Ok(hosts)
}

fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("hostname is empty".to_string());
    }

    // Dotted numerics must be a real IPv4 address rather than a hostname.
    if name.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return name
            .parse::<Ipv4Addr>()
            .map(|_| ())
            .map_err(|_| "not a valid IPv4 address".to_string());
    }

    let fqdn = name.strip_suffix('.').unwrap_or(name);
    if fqdn.len() > MAX_HOSTNAME_LEN {
        return Err(format!(
            "hostname exceeds maximum length of {MAX_HOSTNAME_LEN}"
        ));
    }

    for label in fqdn.split('.') {
        if label.is_empty() {
            return Err("hostname contains an empty label".to_string());
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(format!(
                "label '{label}' exceeds maximum length of {MAX_LABEL_LEN}"
            ));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(format!("label '{label}' starts or ends with a hyphen"));
        }
        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(format!("label '{label}' contains invalid characters"));
        }
    }

    Ok(())
}
