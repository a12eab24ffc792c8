pub mod cli;
pub mod config;
pub mod executor;
pub mod host;
pub mod ssh;
pub mod utils;

pub use cli::Cli;
pub use config::Config;
pub use executor::{Dispatcher, RunSummary};
pub use host::Host;
