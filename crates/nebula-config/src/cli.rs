//! Command-line argument parsing shared by the server and dummy client.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(version, about = "Nebula TCP game server tools")]
pub struct CliArgs {
    /// Host to bind (server) or connect to (client).
    #[arg(long)]
    pub host: Option<String>,

    /// TCP port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Number of sessions the dummy client opens.
    #[arg(long)]
    pub sessions: Option<usize>,

    /// Log level (error, warn, info, debug, trace) or a full filter string.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl CliArgs {
    /// Config directory from `--config`, or the platform default.
    pub fn config_dir(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(default_config_dir)
    }
}

/// Platform config directory for these tools, falling back to `./.nebula`.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("nebula-net"))
        .unwrap_or_else(|| PathBuf::from(".nebula"))
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    ///
    /// `--host` and `--port` apply to both the server and client sections;
    /// each binary only reads its own.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref host) = args.host {
            self.server.host = host.clone();
            self.client.host = host.clone();
        }
        if let Some(port) = args.port {
            self.server.port = port;
            self.client.port = port;
        }
        if let Some(sessions) = args.sessions {
            self.client.sessions = sessions;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
