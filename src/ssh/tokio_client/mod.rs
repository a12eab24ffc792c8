//! Asynchronous SSH client on top of russh and the tokio runtime.
//!
//! The heart of this module is [`Client`]: connect and authenticate against a
//! host, then open [`ExecSession`]s that run one command each with separately
//! piped stdout and stderr.
//!
//! # Features
//! * Connect to a host by name or IP address
//! * Password, private key file and SSH agent authentication
//! * known_hosts based server key verification
//! * Streaming stdout/stderr of remote commands

pub mod authentication;
pub mod channel_manager;
pub mod connection;
pub mod error;

pub use authentication::{AuthMethod, ServerCheckMethod};
pub use channel_manager::ExecSession;
pub use connection::{Client, ClientHandler};
pub use error::Error;

pub use russh::client::Config;
