// CLI entry point for the Saboteur game server.
//
// Loads an optional TOML config file, layers command-line flags over it, and
// runs the server until the process is killed. A game in progress is saved
// to `--state-file` after every change and picked up again (paused until its
// players reconnect) on the next start.
//
// Logging goes through `tracing`; set `RUST_LOG` to change the level
// (default `info`).

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use saboteur_game::{JsonFileStore, MemoryStore, StateStore};
use saboteur_server::{ConfigError, ServerConfig, start_server};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Saboteur: a hidden-role mission game server for 5 to 10 players.
#[derive(Parser, Debug)]
#[command(name = "saboteur", version)]
struct Cli {
    /// TOML config file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (0 picks a free port)
    #[arg(short, long)]
    port: Option<u16>,

    /// Number of seats (5 to 10)
    #[arg(short = 'n', long)]
    players: Option<usize>,

    /// Leader proposal deadline, in milliseconds
    #[arg(long)]
    proposal_timeout_ms: Option<u64>,

    /// Vote deadline, in milliseconds
    #[arg(long)]
    vote_timeout_ms: Option<u64>,

    /// Sabotage decision deadline, in milliseconds
    #[arg(long)]
    sabotage_timeout_ms: Option<u64>,

    /// Seed for dealing roles (random if omitted)
    #[arg(long)]
    seed: Option<u64>,

    /// Save the game here and restore it on startup
    #[arg(long)]
    state_file: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> Result<ServerConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_toml_file(path)?,
            None => ServerConfig::default(),
        };
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(players) = self.players {
            config.num_players = players;
        }
        if let Some(ms) = self.proposal_timeout_ms {
            config.proposal_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.vote_timeout_ms {
            config.vote_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.sabotage_timeout_ms {
            config.sabotage_timeout = Duration::from_millis(ms);
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if self.state_file.is_some() {
            config.state_file = self.state_file;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match Cli::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let store: Box<dyn StateStore> = match &config.state_file {
        Some(path) => Box::new(JsonFileStore::new(path)),
        None => Box::new(MemoryStore::new()),
    };

    let (handle, addr) = match start_server(config, store) {
        Ok(started) => started,
        Err(e) => {
            error!("failed to start server: {e}");
            return ExitCode::FAILURE;
        }
    };
    info!(%addr, "ready; press Ctrl+C to stop");

    // Runs until killed; the orchestrator only returns on shutdown.
    handle.wait();
    ExitCode::SUCCESS
}
