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

//! Exec channels with piped standard output and standard error.
//!
//! An [`ExecSession`] wraps one SSH session channel. Its stdout and stderr are
//! exposed as independent byte streams that can be read while the command is
//! running; both streams reach end-of-stream once the channel stops delivering
//! data.

use russh::client::Msg;
use russh::{Channel, ChannelMsg};
use tokio::io::{AsyncWrite, AsyncWriteExt, DuplexStream};

use super::connection::Client;

/// Pipe buffer for each output stream.
///
/// Matches the usual SSH channel packet size so one window of data can be
/// buffered while the reader catches up.
const SSH_STREAM_PIPE_SIZE: usize = 32 * 1024;

/// SSH extended data type code for stderr (RFC 4254 section 5.2).
const SSH_EXTENDED_DATA_STDERR: u32 = 1;

impl Client {
    /// Open a new session channel prepared for a single command execution.
    pub async fn open_exec_session(&self) -> Result<ExecSession, super::Error> {
        let channel = self
            .connection_handle
            .channel_open_session()
            .await
            .map_err(super::Error::SshError)?;
        Ok(ExecSession::new(channel))
    }
}

/// One remote command execution on an SSH session channel.
pub struct ExecSession {
    channel: Channel<Msg>,
    stdout_reader: Option<DuplexStream>,
    stderr_reader: Option<DuplexStream>,
    stdout_writer: Option<DuplexStream>,
    stderr_writer: Option<DuplexStream>,
}

impl ExecSession {
    fn new(channel: Channel<Msg>) -> Self {
        let (stdout_writer, stdout_reader) = tokio::io::duplex(SSH_STREAM_PIPE_SIZE);
        let (stderr_writer, stderr_reader) = tokio::io::duplex(SSH_STREAM_PIPE_SIZE);
        Self {
            channel,
            stdout_reader: Some(stdout_reader),
            stderr_reader: Some(stderr_reader),
            stdout_writer: Some(stdout_writer),
            stderr_writer: Some(stderr_writer),
        }
    }

    /// Take the read side of the remote standard output.
    pub fn take_stdout(&mut self) -> Option<DuplexStream> {
        self.stdout_reader.take()
    }

    /// Take the read side of the remote standard error.
    pub fn take_stderr(&mut self) -> Option<DuplexStream> {
        self.stderr_reader.take()
    }

    /// Execute `command` and pump channel data into the output pipes until the
    /// channel closes.
    ///
    /// Returns the remote exit status, or `None` if the server closed the
    /// channel without reporting one (e.g. the process was killed by a signal).
    /// The pipe writers are owned by this future: when it completes or is
    /// dropped, both readers observe end-of-stream.
    pub async fn run(&mut self, command: &str) -> Result<Option<u32>, super::Error> {
        let stdout = self
            .stdout_writer
            .take()
            .ok_or(super::Error::SessionAlreadyUsed)?;
        let stderr = self
            .stderr_writer
            .take()
            .ok_or(super::Error::SessionAlreadyUsed)?;

        self.channel.exec(true, command).await?;

        let mut pump = OutputPump::new(stdout, stderr);
        // The exit status may arrive before the last data packet, and RFC 4254
        // permits closing without EOF, so only channel closure ends the loop.
        while let Some(msg) = self.channel.wait().await {
            pump.handle(msg).await;
        }
        Ok(pump.finish().await)
    }

    /// Close the session channel.
    pub async fn close(&mut self) -> Result<(), super::Error> {
        self.channel.close().await.map_err(super::Error::SshError)
    }
}

/// Routes the messages of a running exec channel into the output pipes.
struct OutputPump<W> {
    stdout: Option<W>,
    stderr: Option<W>,
    exit_status: Option<u32>,
}

impl<W: AsyncWrite + Unpin> OutputPump<W> {
    fn new(stdout: W, stderr: W) -> Self {
        Self {
            stdout: Some(stdout),
            stderr: Some(stderr),
            exit_status: None,
        }
    }

    async fn handle(&mut self, msg: ChannelMsg) {
        match msg {
            ChannelMsg::Data { ref data } => forward(&mut self.stdout, data, "stdout").await,
            ChannelMsg::ExtendedData { ref data, ext } if ext == SSH_EXTENDED_DATA_STDERR => {
                forward(&mut self.stderr, data, "stderr").await
            }
            ChannelMsg::ExtendedData { ext, .. } => {
                tracing::trace!("ignoring extended data of type {}", ext);
            }
            ChannelMsg::ExitStatus { exit_status } => self.exit_status = Some(exit_status),
            ChannelMsg::ExitSignal {
                ref signal_name, ..
            } => {
                tracing::debug!("remote process terminated by signal {:?}", signal_name);
            }
            _ => {}
        }
    }

    /// Shut down both pipes and return the exit status seen, if any.
    async fn finish(self) -> Option<u32> {
        for mut writer in [self.stdout, self.stderr].into_iter().flatten() {
            let _ = writer.shutdown().await;
        }
        self.exit_status
    }
}

/// Write `data` to `pipe`, dropping the pipe once its reader is gone.
async fn forward<W: AsyncWrite + Unpin>(pipe: &mut Option<W>, data: &[u8], stream: &str) {
    let failed = match pipe {
        Some(writer) => writer.write_all(data).await.is_err(),
        None => false,
    };
    if failed {
        tracing::debug!("{} reader dropped, discarding further output", stream);
        *pipe = None;
    }
}
