// Error types for the server crate.
//
// Only `ServerError` reaches `main`; everything that happens after the
// listener is bound is handled inside the server and logged.

use std::io;
use std::path::PathBuf;

use saboteur_game::RulesError;
use saboteur_protocol::PlayerId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("session is full")]
    Full,
    #[error("player {0} is not connected")]
    NotConnected(PlayerId),
    #[error("connection for player {0} is closed")]
    Closed(PlayerId),
    #[error("failed to set up connection: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error(transparent)]
    Rules(#[from] RulesError),
    #[error("{0} timeout must be greater than zero")]
    ZeroTimeout(&'static str),
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },
    #[error("failed to configure listener: {0}")]
    Listener(io::Error),
    #[error("failed to start {name} thread: {source}")]
    Spawn {
        name: &'static str,
        source: io::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors seen by `NetClient`.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connection failed: {0}")]
    Io(#[from] io::Error),
    #[error("rejected by server: {0}")]
    Rejected(String),
    #[error("unexpected first message: {0}")]
    Handshake(String),
}
