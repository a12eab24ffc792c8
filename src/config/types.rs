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

//! Configuration type definitions.

use serde::{Deserialize, Serialize};

use crate::ssh::known_hosts::StrictHostKeyChecking;

/// Main configuration structure.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub defaults: Defaults,
}

/// Global default settings.
///
/// Every field is optional; command-line flags take precedence.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Defaults {
    pub user: Option<String>,
    pub port: Option<u16>,
    pub private_key: Option<String>,
    /// Connection timeout in seconds.
    pub connect_timeout: Option<u64>,
    /// Command timeout in seconds. 0 disables the timeout.
    pub timeout: Option<u64>,
    /// Maximum number of hosts worked on at once. 0 means unbounded.
    pub parallel: Option<usize>,
    pub strict_host_key_checking: Option<StrictHostKeyChecking>,
}
