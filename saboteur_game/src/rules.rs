// Fixed rule tables and the two counting rules of the game.
//
// Everything that depends on the table size lives here: infiltrator count,
// mission team sizes, and how many sabotage cards fail each mission. The
// tables follow the published rules of the five-mission hidden-role game:
// from seven players up, the fourth mission (index 3) needs two sabotages.
//
// See also: `state.rs`, which copies a `TableRules` into `GameState` at
// construction so a persisted state carries its own rules.

use crate::error::RulesError;

pub const MIN_PLAYERS: usize = 5;
pub const MAX_PLAYERS: usize = 10;
/// Missions per game.
pub const MISSION_COUNT: usize = 5;
/// Missions a faction must win.
pub const WINS_NEEDED: u32 = 3;
/// Rejected proposals in a row that hand the game to the infiltrators.
pub const MAX_CONSECUTIVE_REJECTIONS: u32 = 5;

/// Per-table-size configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableRules {
    pub num_players: usize,
    pub num_infiltrators: usize,
    pub mission_sizes: [usize; MISSION_COUNT],
    pub required_sabotages: [u32; MISSION_COUNT],
}

/// Look up the rules for a table of `num_players`.
pub fn rules_for(num_players: usize) -> Result<TableRules, RulesError> {
    let (num_infiltrators, mission_sizes) = match num_players {
        5 => (2, [2, 3, 2, 3, 3]),
        6 => (2, [2, 3, 4, 3, 4]),
        7 => (3, [2, 3, 3, 4, 4]),
        8 | 9 => (3, [3, 4, 4, 5, 5]),
        10 => (4, [3, 4, 4, 5, 5]),
        other => return Err(RulesError::UnsupportedPlayerCount(other)),
    };
    let required_sabotages = if num_players >= 7 {
        [1, 1, 1, 2, 1]
    } else {
        [1; MISSION_COUNT]
    };
    Ok(TableRules {
        num_players,
        num_infiltrators,
        mission_sizes,
        required_sabotages,
    })
}

/// Strict majority: ties reject.
pub fn team_approved(approvals: u32, rejections: u32) -> bool {
    approvals > rejections
}

/// A mission fails once the sabotage count reaches the required threshold.
pub fn mission_succeeds(sabotages: u32, required: u32) -> bool {
    sabotages < required
}
