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

use tracing_subscriber::EnvFilter;

/// Log record format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    /// Human readable text
    #[default]
    Human,
    /// One JSON object per record
    Json,
}

/// Create an environment filter for the requested level
pub fn create_env_filter(debug: bool) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        // Use RUST_LOG if set (allows debugging russh and other dependencies)
        EnvFilter::from_default_env()
    } else if debug {
        // Include russh debug logs for SSH troubleshooting
        EnvFilter::new("multissh=debug,russh=debug")
    } else {
        EnvFilter::new("multissh=info")
    }
}

/// Initialize logging.
///
/// Records go to stderr so they never mix with remote stdout. Calling this
/// more than once is harmless: later calls leave the first subscriber in
/// place.
pub fn init_logging(debug: bool, format: LogFormat) {
    let filter = create_env_filter(debug);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(debug);

    let result = match format {
        LogFormat::Human => builder.try_init(),
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
    };
    if let Err(e) = result {
        tracing::debug!("logging already initialized: {}", e);
    }
}
