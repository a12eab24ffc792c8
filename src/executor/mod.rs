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

//! Concurrent command execution across hosts.

mod dispatcher;
mod result_types;

pub mod line_scanner;
pub mod output;
pub mod output_sync;
pub mod session_runner;

// Re-export public types
pub use dispatcher::{
    DispatchError, Dispatcher, DEFAULT_COMMAND_TIMEOUT, DEFAULT_CONNECT_TIMEOUT,
};
pub use line_scanner::{scan_into, LineScanner, ScanError};
pub use output::{
    conduit, drain, MemorySink, OutputLine, OutputSink, StreamKind, DEFAULT_CONDUIT_CAPACITY,
};
pub use output_sync::ConsoleSink;
pub use result_types::{HostOutcome, HostResult, RunSummary};
pub use session_runner::{run_session, SessionError, SessionOptions, SessionReport};
