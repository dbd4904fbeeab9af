// Core identifier and vocabulary types shared by the wire protocol, the game
// model (`saboteur_game`), and the server (`saboteur_server`).
//
// `PlayerId` is handed out by the server's session registry: compact,
// starting at 1, never reused within a process. `Generation` tags every phase
// instance so late answers from an expired phase can be told apart from
// answers to the current one.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Server-assigned player identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub u32);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic tag of one phase instance (one proposal request, one vote, one
/// sabotage collection).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Generation(pub u64);

impl Generation {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Hidden faction of a seated player.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Loyal,
    Infiltrator,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Loyal => f.write_str("loyal"),
            Role::Infiltrator => f.write_str("infiltrator"),
        }
    }
}

/// Winning faction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Winner {
    Loyal,
    Infiltrators,
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Winner::Loyal => f.write_str("loyal majority"),
            Winner::Infiltrators => f.write_str("infiltrators"),
        }
    }
}

/// Why the game ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GameOverReason {
    /// Three missions succeeded.
    MissionsSucceeded,
    /// Three missions were sabotaged.
    MissionsFailed,
    /// Five team proposals in a row were voted down.
    FiveRejections,
}

impl fmt::Display for GameOverReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameOverReason::MissionsSucceeded => f.write_str("three missions succeeded"),
            GameOverReason::MissionsFailed => f.write_str("three missions failed"),
            GameOverReason::FiveRejections => f.write_str("five consecutive rejections"),
        }
    }
}

/// Orchestrator phase, reported in every state snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Lobby,
    RoundStart,
    TeamProposal,
    TeamVote,
    MissionSabotage,
    MissionResult,
    /// A seat is empty; waiting for reconnection or a restart.
    Paused,
    GameOver,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Lobby => "lobby",
            Phase::RoundStart => "round start",
            Phase::TeamProposal => "team proposal",
            Phase::TeamVote => "team vote",
            Phase::MissionSabotage => "mission sabotage",
            Phase::MissionResult => "mission result",
            Phase::Paused => "paused",
            Phase::GameOver => "game over",
        };
        f.write_str(name)
    }
}
