//! Configuration for the server and dummy client.
//!
//! Settings persist to disk as `config.ron`, accept CLI overrides via clap,
//! and convert into the `nebula-net` listener and connector configurations.

mod cli;
mod config;
mod error;

pub use cli::{CliArgs, default_config_dir};
pub use config::{ClientSection, Config, DebugSection, RoomSection, ServerSection};
pub use error::ConfigError;
