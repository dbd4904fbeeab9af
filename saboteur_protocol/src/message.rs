// Protocol messages between game clients and the server.
//
// - `ClientMessage`: sent by a client to the server.
// - `ServerMessage`: sent by the server to one client or broadcast to all.
//
// Both enums are internally tagged with a `"kind"` field in kebab-case and
// use camelCase field names, e.g.
// `{"kind":"vote-cast","playerId":3,"approve":true,"generation":12}`.
//
// Phase requests (`RequestTeam`, `RequestVote`, `RequestSabotage`) carry the
// phase `Generation`; the matching client responses echo it back so the
// server can discard answers that arrive after their phase has closed.

use serde::{Deserialize, Serialize};

use crate::types::{GameOverReason, Generation, PlayerId, Role, Winner};
use crate::view::GameView;

/// Messages sent by a client to the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Start a game from the lobby, or a new one after game over.
    StartGame,
    /// Leader's proposed mission team.
    TeamProposed {
        player_id: PlayerId,
        team: Vec<PlayerId>,
        generation: Generation,
    },
    /// Approve or reject the proposed team.
    VoteCast {
        player_id: PlayerId,
        approve: bool,
        generation: Generation,
    },
    /// Infiltrator on a mission decides whether to sabotage it.
    SabotageChoice {
        player_id: PlayerId,
        sabotage: bool,
        generation: Generation,
    },
    /// Player is leaving gracefully.
    Goodbye,
}

/// Messages sent by the server to clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// First message on every accepted connection.
    ConnectAck { player_id: PlayerId },
    /// Full snapshot, redacted for the receiving player.
    GameState { state: GameView },
    /// A game has started; roles follow as `PlayerRole`.
    StartGame,
    /// Private role assignment.
    PlayerRole { player_id: PlayerId, role: Role },
    /// Ask the leader for a team.
    RequestTeam {
        leader_id: PlayerId,
        mission_size: usize,
        eligible_ids: Vec<PlayerId>,
        generation: Generation,
    },
    /// The leader's valid proposal, announced to everyone before the vote.
    TeamProposed {
        leader_id: PlayerId,
        team: Vec<PlayerId>,
    },
    /// Ask one player to vote on `team`.
    RequestVote {
        player_id: PlayerId,
        team: Vec<PlayerId>,
        generation: Generation,
    },
    /// Published once the vote has closed.
    VoteResult {
        approved: bool,
        approvals: u32,
        rejections: u32,
        votes: Vec<VoteEntry>,
    },
    /// Ask an infiltrator on the team whether to sabotage.
    RequestSabotage {
        player_id: PlayerId,
        generation: Generation,
    },
    MissionOutcome { success: bool, sabotage_count: u32 },
    GameOver {
        winner: Winner,
        reason: GameOverReason,
    },
    /// Free-text notice (timeouts, progress, stale answers).
    Log { text: String },
    /// The client's last message had no effect, and why.
    Rejected { reason: String },
    PlayerJoined { player_id: PlayerId },
    PlayerLeft { player_id: PlayerId },
}

/// One player's vote as published in `VoteResult`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteEntry {
    pub player_id: PlayerId,
    pub approve: bool,
    /// The vote was filled in as a rejection because no answer arrived.
    pub defaulted: bool,
}
