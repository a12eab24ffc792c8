pub mod auth;
pub mod credential;
pub mod known_hosts;
pub mod provider;
pub mod tokio_client;

pub use auth::AuthContext;
pub use credential::Credential;
pub use known_hosts::StrictHostKeyChecking;
pub use provider::{Connection, RemoteSession, RusshProvider, SessionProvider};
