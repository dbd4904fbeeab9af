// Server configuration.
//
// `ServerConfig::default()` is a complete, playable configuration (five
// players on 127.0.0.1:7878). A TOML file can override any subset of fields;
// the `saboteur` binary then layers its command-line flags over that. Phase
// timeouts are written in the file as whole milliseconds:
//
//   num_players = 7
//   port = 9000
//   vote_timeout_ms = 20000
//   state_file = "saboteur-state.json"

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use saboteur_game::rules_for;
use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    /// Listen port; 0 lets the OS pick one (tests).
    pub port: u16,
    pub num_players: usize,
    pub proposal_timeout: Duration,
    pub vote_timeout: Duration,
    pub sabotage_timeout: Duration,
    /// Role-deal seed. `None` seeds from the clock.
    pub seed: Option<u64>,
    /// Where the game is persisted. `None` keeps it in memory only.
    pub state_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 7878,
            num_players: 5,
            proposal_timeout: Duration::from_secs(60),
            vote_timeout: Duration::from_secs(30),
            sabotage_timeout: Duration::from_secs(30),
            seed: None,
            state_file: None,
        }
    }
}

/// On-disk shape: every field optional, durations in milliseconds.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    host: Option<String>,
    port: Option<u16>,
    num_players: Option<usize>,
    proposal_timeout_ms: Option<u64>,
    vote_timeout_ms: Option<u64>,
    sabotage_timeout_ms: Option<u64>,
    seed: Option<u64>,
    state_file: Option<PathBuf>,
}

impl ServerConfig {
    /// Defaults overridden by whatever `path` sets.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: FileConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::default().merged(file);
        config.validate()?;
        Ok(config)
    }

    fn merged(mut self, file: FileConfig) -> Self {
        if let Some(host) = file.host {
            self.host = host;
        }
        if let Some(port) = file.port {
            self.port = port;
        }
        if let Some(n) = file.num_players {
            self.num_players = n;
        }
        if let Some(ms) = file.proposal_timeout_ms {
            self.proposal_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = file.vote_timeout_ms {
            self.vote_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = file.sabotage_timeout_ms {
            self.sabotage_timeout = Duration::from_millis(ms);
        }
        if file.seed.is_some() {
            self.seed = file.seed;
        }
        if file.state_file.is_some() {
            self.state_file = file.state_file;
        }
        self
    }

    /// Player count must be in the rule table and every phase needs a
    /// non-zero deadline.
    pub fn validate(&self) -> Result<(), ConfigError> {
        rules_for(self.num_players)?;
        for (name, timeout) in [
            ("proposal", self.proposal_timeout),
            ("vote", self.vote_timeout),
            ("sabotage", self.sabotage_timeout),
        ] {
            if timeout.is_zero() {
                return Err(ConfigError::ZeroTimeout(name));
            }
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
