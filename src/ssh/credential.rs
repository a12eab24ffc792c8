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

use super::tokio_client::{AuthMethod, ServerCheckMethod};

/// Everything needed to authenticate against any host of a run.
///
/// Resolved once up front and shared read-only by every connection attempt.
#[derive(Debug, Clone)]
pub struct Credential {
    pub username: String,
    pub auth: AuthMethod,
    pub server_check: ServerCheckMethod,
}

impl Credential {
    pub fn new(username: impl Into<String>, auth: AuthMethod) -> Self {
        Self {
            username: username.into(),
            auth,
            server_check: ServerCheckMethod::NoCheck,
        }
    }

    pub fn with_server_check(mut self, server_check: ServerCheckMethod) -> Self {
        self.server_check = server_check;
        self
    }
}
