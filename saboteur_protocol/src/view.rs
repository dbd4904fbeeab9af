// Client-facing game snapshot carried by `ServerMessage::GameState`.
//
// Built by `saboteur_game::GameState::view_for`, which redacts every role
// except the viewer's own until the game is over. Votes and sabotage choices
// in progress are never part of the view: responses stay hidden until their
// phase closes, and votes are then published through `VoteResult`.
//
// Per-player data is a list of `SeatView` rather than a map keyed by
// `PlayerId`. The enclosing message enum is internally tagged, and serde
// cannot read integer map keys back through an internally tagged enum.

use serde::{Deserialize, Serialize};

use crate::types::{Phase, PlayerId, Role};

/// One seat at the table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatView {
    pub player_id: PlayerId,
    /// `None` when hidden from the viewer.
    pub role: Option<Role>,
}

/// Snapshot of the authoritative game state as seen by one player.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameView {
    pub phase: Phase,
    pub num_players: usize,
    pub num_infiltrators: usize,
    pub mission_sizes: Vec<usize>,
    pub seats: Vec<SeatView>,
    pub current_round: usize,
    pub leader_index: usize,
    pub leader_id: Option<PlayerId>,
    pub consecutive_rejections: u32,
    pub proposed_team: Option<Vec<PlayerId>>,
    pub mission_outcomes: Vec<bool>,
    pub majority_wins: u32,
    pub minority_wins: u32,
    pub started: bool,
    pub game_over: bool,
}

impl GameView {
    /// Role of `player` as visible in this snapshot.
    pub fn role_of(&self, player: PlayerId) -> Option<Role> {
        self.seats
            .iter()
            .find(|seat| seat.player_id == player)
            .and_then(|seat| seat.role)
    }
}
