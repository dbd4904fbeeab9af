// Authoritative game state and its transitions.
//
// `GameState` is plain data plus pure transition methods. It does no I/O, no
// locking, and no waiting: the server's orchestrator is its only writer and
// calls these methods under the single mutation lock after it has collected
// the answers for a phase. That keeps every rule of the game testable
// without sockets.
//
// Round structure, as driven by the orchestrator:
//   propose_team → record_vote × seats → resolve_vote
//     approved:  record_sabotage × team → resolve_mission
//     rejected:  leader advances, rejection streak grows
//   skip_leader on a proposal timeout (no streak change).
//
// Seats: `roster` holds the player ids seated at game start, in ascending
// order. `leader_index` indexes it cyclically. In a fresh server process the
// roster is `[1, 2, .., N]`.
//
// See also: `rules.rs` for the tables, `store.rs` for persistence,
// `saboteur_server::orchestrator` for the phase machine that drives this.

use std::collections::{BTreeMap, BTreeSet};

use saboteur_prng::DealerRng;
use saboteur_protocol::{GameOverReason, GameView, Phase, PlayerId, Role, SeatView, Winner};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ProposalError, RulesError};
use crate::rules::{self, MAX_CONSECUTIVE_REJECTIONS, WINS_NEEDED};

/// Result of closing a team vote.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VoteTally {
    pub approved: bool,
    pub approvals: u32,
    pub rejections: u32,
}

/// Result of closing a mission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MissionResult {
    pub success: bool,
    pub sabotage_count: u32,
    pub required: u32,
}

/// Winner and reason once the game is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GameOutcome {
    pub winner: Winner,
    pub reason: GameOverReason,
}

/// The authoritative state of one game. Fields are public for inspection and
/// snapshots; mutate only through the methods so the invariants hold.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    pub num_players: usize,
    pub num_infiltrators: usize,
    pub mission_sizes: Vec<usize>,
    pub required_sabotages: Vec<u32>,
    pub roster: Vec<PlayerId>,
    pub roles: BTreeMap<PlayerId, Role>,
    pub current_round: usize,
    pub leader_index: usize,
    pub consecutive_rejections: u32,
    pub proposed_team: Option<BTreeSet<PlayerId>>,
    pub team_votes: BTreeMap<PlayerId, bool>,
    pub sabotage_choices: BTreeMap<PlayerId, bool>,
    pub mission_outcomes: Vec<bool>,
    pub majority_wins: u32,
    pub minority_wins: u32,
    pub started: bool,
}

impl GameState {
    /// A lobby-state game for a table of `num_players`.
    pub fn new(num_players: usize) -> Result<Self, RulesError> {
        let rules = rules::rules_for(num_players)?;
        Ok(Self {
            num_players,
            num_infiltrators: rules.num_infiltrators,
            mission_sizes: rules.mission_sizes.to_vec(),
            required_sabotages: rules.required_sabotages.to_vec(),
            roster: Vec::new(),
            roles: BTreeMap::new(),
            current_round: 0,
            leader_index: 0,
            consecutive_rejections: 0,
            proposed_team: None,
            team_votes: BTreeMap::new(),
            sabotage_choices: BTreeMap::new(),
            mission_outcomes: Vec::new(),
            majority_wins: 0,
            minority_wins: 0,
            started: false,
        })
    }

    /// Seat `roster` and deal roles: a pool of exactly `num_infiltrators`
    /// infiltrators and the rest loyal, shuffled uniformly. Starts the game
    /// from round 0 with the lowest seat leading.
    pub fn assign_roles(
        &mut self,
        mut roster: Vec<PlayerId>,
        rng: &mut DealerRng,
    ) -> Result<(), RulesError> {
        roster.sort_unstable();
        roster.dedup();
        if roster.len() != self.num_players {
            return Err(RulesError::RosterSize {
                expected: self.num_players,
                got: roster.len(),
            });
        }
        self.reset();

        let mut pool = vec![Role::Infiltrator; self.num_infiltrators];
        pool.resize(self.num_players, Role::Loyal);
        rng.shuffle(&mut pool);

        self.roles = roster.iter().copied().zip(pool).collect();
        self.roster = roster;
        self.started = true;
        debug!(players = self.num_players, "roles dealt");
        Ok(())
    }

    /// Back to the lobby: seats, roles and all progress are cleared. The next
    /// `assign_roles` deals fresh roles.
    pub fn reset(&mut self) {
        self.roster.clear();
        self.roles.clear();
        self.current_round = 0;
        self.leader_index = 0;
        self.consecutive_rejections = 0;
        self.proposed_team = None;
        self.team_votes.clear();
        self.sabotage_choices.clear();
        self.mission_outcomes.clear();
        self.majority_wins = 0;
        self.minority_wins = 0;
        self.started = false;
    }

    /// Drop a half-finished proposal so a restored game re-enters the round
    /// at its start. Seats are renumbered 1..=N in roster order, since a
    /// fresh server hands out ids from 1 again; each seat keeps its role.
    pub fn prepare_resume(&mut self) {
        self.proposed_team = None;
        self.team_votes.clear();
        self.sabotage_choices.clear();

        let reseated: Vec<PlayerId> = (1..=self.roster.len() as u32).map(PlayerId).collect();
        self.roles = self
            .roster
            .iter()
            .zip(&reseated)
            .filter_map(|(old, &new)| self.roles.get(old).map(|&role| (new, role)))
            .collect();
        self.roster = reseated;
    }

    pub fn role_of(&self, player: PlayerId) -> Option<Role> {
        self.roles.get(&player).copied()
    }

    pub fn is_seated(&self, player: PlayerId) -> bool {
        self.roles.contains_key(&player)
    }

    pub fn current_leader(&self) -> Option<PlayerId> {
        self.roster.get(self.leader_index).copied()
    }

    /// Team size for the current round, `None` once every mission is played.
    pub fn mission_size(&self) -> Option<usize> {
        self.mission_sizes.get(self.current_round).copied()
    }

    /// Sabotages needed to fail the current mission.
    pub fn required_sabotages(&self) -> u32 {
        self.required_sabotages
            .get(self.current_round)
            .copied()
            .unwrap_or(1)
    }

    /// Check a leader's proposal against the current mission. Order of the
    /// submitted ids does not matter.
    pub fn validate_proposal(&self, team: &[PlayerId]) -> Result<BTreeSet<PlayerId>, ProposalError> {
        let expected = self.mission_size().ok_or(ProposalError::NoMission)?;
        if !self.started || self.is_terminal() {
            return Err(ProposalError::NoMission);
        }
        let mut members = BTreeSet::new();
        for &player in team {
            if !self.is_seated(player) {
                return Err(ProposalError::NotSeated(player));
            }
            if !members.insert(player) {
                return Err(ProposalError::Duplicate(player));
            }
        }
        if members.len() != expected {
            return Err(ProposalError::WrongSize {
                expected,
                got: team.len(),
            });
        }
        Ok(members)
    }

    /// Put a validated team up for the vote. Clears any earlier votes.
    pub fn propose_team(&mut self, team: BTreeSet<PlayerId>) {
        debug!(round = self.current_round, ?team, "team proposed");
        self.proposed_team = Some(team);
        self.team_votes.clear();
    }

    /// Record one seat's vote. Later calls for the same seat overwrite.
    pub fn record_vote(&mut self, voter: PlayerId, approve: bool) {
        if self.is_seated(voter) {
            self.team_votes.insert(voter, approve);
        }
    }

    /// Close the vote. Approval resets the rejection streak and keeps the
    /// team for the mission. Rejection extends the streak, drops the team,
    /// and passes leadership on.
    pub fn resolve_vote(&mut self) -> VoteTally {
        let approvals = self.team_votes.values().filter(|&&v| v).count() as u32;
        let rejections = self.team_votes.len() as u32 - approvals;
        let approved = rules::team_approved(approvals, rejections);
        self.team_votes.clear();

        if approved {
            self.consecutive_rejections = 0;
        } else {
            self.consecutive_rejections += 1;
            self.proposed_team = None;
            self.advance_leader();
        }
        debug!(
            approved,
            approvals,
            rejections,
            streak = self.consecutive_rejections,
            "vote resolved"
        );
        VoteTally {
            approved,
            approvals,
            rejections,
        }
    }

    /// The leader let the proposal deadline pass: leadership moves on, the
    /// rejection streak is untouched.
    pub fn skip_leader(&mut self) {
        self.advance_leader();
    }

    /// Record a team member's sabotage decision. Non-members are ignored.
    pub fn record_sabotage(&mut self, player: PlayerId, sabotage: bool) {
        let on_team = self
            .proposed_team
            .as_ref()
            .is_some_and(|team| team.contains(&player));
        if on_team {
            self.sabotage_choices.insert(player, sabotage);
        }
    }

    /// Close the mission: score it, move to the next round and leader.
    pub fn resolve_mission(&mut self) -> MissionResult {
        let sabotage_count = self.sabotage_choices.values().filter(|&&s| s).count() as u32;
        let required = self.required_sabotages();
        let success = rules::mission_succeeds(sabotage_count, required);

        self.mission_outcomes.push(success);
        if success {
            self.majority_wins += 1;
        } else {
            self.minority_wins += 1;
        }
        self.proposed_team = None;
        self.sabotage_choices.clear();
        self.advance_leader();
        self.current_round += 1;
        debug!(
            round = self.current_round,
            success, sabotage_count, "mission resolved"
        );
        MissionResult {
            success,
            sabotage_count,
            required,
        }
    }

    /// Winner and reason, once the game has ended.
    pub fn outcome(&self) -> Option<GameOutcome> {
        let (winner, reason) = if self.consecutive_rejections >= MAX_CONSECUTIVE_REJECTIONS {
            (Winner::Infiltrators, GameOverReason::FiveRejections)
        } else if self.minority_wins >= WINS_NEEDED {
            (Winner::Infiltrators, GameOverReason::MissionsFailed)
        } else if self.majority_wins >= WINS_NEEDED {
            (Winner::Loyal, GameOverReason::MissionsSucceeded)
        } else {
            return None;
        };
        Some(GameOutcome { winner, reason })
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome().is_some()
    }

    /// Snapshot for `viewer`: only the viewer's own role is visible until the
    /// game is over, then every role is revealed. `None` hides all roles.
    pub fn view_for(&self, viewer: Option<PlayerId>, phase: Phase) -> GameView {
        let game_over = self.started && self.is_terminal();
        let seats = self
            .roster
            .iter()
            .map(|&player_id| SeatView {
                player_id,
                role: if game_over || viewer == Some(player_id) {
                    self.role_of(player_id)
                } else {
                    None
                },
            })
            .collect();
        GameView {
            phase,
            num_players: self.num_players,
            num_infiltrators: self.num_infiltrators,
            mission_sizes: self.mission_sizes.clone(),
            seats,
            current_round: self.current_round,
            leader_index: self.leader_index,
            leader_id: self.current_leader(),
            consecutive_rejections: self.consecutive_rejections,
            proposed_team: self
                .proposed_team
                .as_ref()
                .map(|team| team.iter().copied().collect()),
            mission_outcomes: self.mission_outcomes.clone(),
            majority_wins: self.majority_wins,
            minority_wins: self.minority_wins,
            started: self.started,
            game_over,
        }
    }

    fn advance_leader(&mut self) {
        self.leader_index = (self.leader_index + 1) % self.num_players;
    }
}
