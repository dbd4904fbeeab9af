// Error types for the game model and its persistence.

use std::io;

use saboteur_protocol::PlayerId;
use thiserror::Error;

/// Table configuration that the rules do not cover.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RulesError {
    #[error("unsupported player count {0} (supported: 5 to 10)")]
    UnsupportedPlayerCount(usize),
    #[error("roster has {got} players, table needs {expected}")]
    RosterSize { expected: usize, got: usize },
}

/// Why a team proposal was not accepted. The leader is asked again without
/// penalty.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ProposalError {
    #[error("team must have {expected} players, got {got}")]
    WrongSize { expected: usize, got: usize },
    #[error("player {0} appears more than once")]
    Duplicate(PlayerId),
    #[error("player {0} is not seated at this table")]
    NotSeated(PlayerId),
    #[error("no mission is open for proposals")]
    NoMission,
}

/// Failure to save or load a snapshot.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state file I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("state file is not a valid snapshot: {0}")]
    Json(#[from] serde_json::Error),
}
