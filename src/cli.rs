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

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{expand_tilde, get_current_username, Config};
use crate::executor::{DEFAULT_COMMAND_TIMEOUT, DEFAULT_CONNECT_TIMEOUT};
use crate::host::DEFAULT_SSH_PORT;
use crate::ssh::known_hosts::StrictHostKeyChecking;
use crate::utils::LogFormat;

#[derive(Parser, Debug)]
#[command(
    name = "multissh",
    version,
    about = "Run a command on any number of nodes simultaneously",
    long_about = "multissh runs one shell command on many hosts at once over SSH.\nOutput is streamed line by line as it arrives, prefixed with the host it came from.\nAuthentication uses a password, the SSH agent or a private key, in that order of preference.",
    after_help = "EXAMPLES:\n  Run on three hosts:          multissh -n web1,web2,web3 -c uptime\n  Non-standard port:           multissh -n db1:2222,db2:2222 -c 'df -h'\n  Explicit key, JSON logs:     multissh -n 10.0.0.5 -k ~/.ssh/ops -f json -c 'systemctl is-active nginx'\n\nExit codes: 0 (every host exited 0), 1 (any failure)"
)]
pub struct Cli {
    #[arg(
        short = 'n',
        long,
        help = "Comma-delimited list of hostnames, FQDNs or IPv4 addresses\nEach entry may carry a :port suffix, e.g. 'web1,web2:2222,10.0.0.5'"
    )]
    pub nodes: String,

    #[arg(short = 'c', long, help = "Command to run")]
    pub command: String,

    #[arg(
        short = 'u',
        long,
        env = "MULTISSH_USERNAME",
        help = "Username to connect with [default: config user, then the current user]"
    )]
    pub username: Option<String>,

    #[arg(
        short = 'p',
        long,
        env = "MULTISSH_PASSWORD",
        hide_env_values = true,
        help = "Password for the provided username"
    )]
    pub password: Option<String>,

    #[arg(
        short = 'k',
        long,
        value_parser = existing_file,
        help = "Path to your SSH private key (prompts for passphrase if encrypted)"
    )]
    pub private_key: Option<PathBuf>,

    #[arg(short = 'd', long, help = "Show debug output")]
    pub debug: bool,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value_t = LogFormat::Human,
        help = "Log output format"
    )]
    pub format: LogFormat,

    #[arg(
        long,
        value_parser = clap::value_parser!(u64).range(1..),
        help = "SSH connection timeout in seconds [default: 30]"
    )]
    pub connect_timeout: Option<u64>,

    #[arg(long, help = "Command timeout in seconds, 0 for unlimited [default: 300]")]
    pub timeout: Option<u64>,

    #[arg(long, help = "Maximum number of hosts worked on at once, 0 for unbounded [default: 0]")]
    pub parallel: Option<usize>,

    #[arg(
        long,
        value_enum,
        help = "Host key checking mode [default: accept-new]\n  yes        - Verify against ~/.ssh/known_hosts\n  no         - Accept all host keys\n  accept-new - Record unknown host keys, reject changed ones"
    )]
    pub strict_host_key_checking: Option<StrictHostKeyChecking>,

    #[arg(long, help = "Print output lines without the [host] prefix")]
    pub no_prefix: bool,

    #[arg(
        long,
        help = "Configuration file path [default: ~/.config/multissh/config.yaml]"
    )]
    pub config: Option<PathBuf>,
}

fn existing_file(value: &str) -> Result<PathBuf, String> {
    let path = expand_tilde(&PathBuf::from(value));
    if path.is_file() {
        Ok(path)
    } else {
        Err(format!("file not found: {value}"))
    }
}

impl Cli {
    /// Username: flag or environment, then config, then the current user.
    pub fn username(&self, config: &Config) -> String {
        self.username
            .clone()
            .filter(|u| !u.is_empty())
            .or_else(|| config.defaults.user.clone())
            .unwrap_or_else(get_current_username)
    }

    /// Private key: flag, then config. A configured key must exist.
    pub fn private_key(&self, config: &Config) -> Result<Option<PathBuf>> {
        if let Some(key) = &self.private_key {
            return Ok(Some(key.clone()));
        }
        match config.private_key() {
            Some(key) if !key.is_file() => {
                anyhow::bail!("Configured private key not found: {}", key.display())
            }
            key => Ok(key),
        }
    }

    pub fn default_port(&self, config: &Config) -> u16 {
        config.defaults.port.unwrap_or(DEFAULT_SSH_PORT)
    }

    pub fn connect_timeout(&self, config: &Config) -> Duration {
        self.connect_timeout
            .or(config.defaults.connect_timeout)
            .map(|secs| Duration::from_secs(secs.max(1)))
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT)
    }

    /// Command timeout, `None` when unlimited.
    pub fn command_timeout(&self, config: &Config) -> Option<Duration> {
        match self.timeout.or(config.defaults.timeout) {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => Some(DEFAULT_COMMAND_TIMEOUT),
        }
    }

    pub fn parallel(&self, config: &Config) -> usize {
        self.parallel.or(config.defaults.parallel).unwrap_or(0)
    }

    pub fn strict_mode(&self, config: &Config) -> StrictHostKeyChecking {
        self.strict_host_key_checking
            .or(config.defaults.strict_host_key_checking)
            .unwrap_or_default()
    }
}
