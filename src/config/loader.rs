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

//! Configuration loading.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::types::Config;
use super::utils::expand_tilde;

impl Config {
    /// Load configuration from a file.
    ///
    /// A missing file is not an error: defaults are returned instead.
    pub async fn load(path: &Path) -> Result<Self> {
        let expanded_path = expand_tilde(path);

        if !expanded_path.exists() {
            tracing::debug!(
                "Config file not found at {:?}, using defaults",
                expanded_path
            );
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&expanded_path)
            .await
            .with_context(|| format!("Failed to read configuration file at {}. Please check file permissions and ensure the file is accessible.", expanded_path.display()))?;

        Self::from_yaml(&content).with_context(|| {
            format!(
                "Failed to parse YAML configuration file at {}. Please check the YAML syntax is valid.",
                expanded_path.display()
            )
        })
    }

    /// Load from `path` if given, otherwise from [`default_path`](Self::default_path).
    ///
    /// Only the default location may be absent; an explicitly given file must
    /// exist.
    pub async fn load_with_priority(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let expanded_path = expand_tilde(path);
                if !expanded_path.exists() {
                    anyhow::bail!(
                        "Configuration file not found: {}",
                        expanded_path.display()
                    );
                }
                Self::load(&expanded_path).await
            }
            None => match Self::default_path() {
                Some(path) => Self::load(&path).await,
                None => {
                    tracing::debug!("No configuration directory available, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    /// Parse configuration from YAML text. Empty text yields defaults.
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Config = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// The standard configuration file location, `~/.config/multissh/config.yaml`
    /// on Linux.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "multissh").map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// The configured private key with `~` expanded.
    pub fn private_key(&self) -> Option<PathBuf> {
        self.defaults
            .private_key
            .as_deref()
            .map(|key| expand_tilde(Path::new(key)))
    }
}
