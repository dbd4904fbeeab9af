// The game phase state machine.
//
// The orchestrator runs on its own thread, owns the bus receiver, and is the
// only code that mutates the `GameState`. Each phase is a method that runs
// until the phase is finished and returns the next one:
//
//   Lobby ─start─▶ RoundStart ─▶ TeamProposal ─valid─▶ TeamVote
//                     ▲  │            │ timeout           │ approved
//                     │  │ seat gone  ▼                   ▼
//                     │  └──▶ Paused  RoundStart    MissionSabotage
//                     │                                   ▼
//                     └──────────────────────────── MissionResult
//   TeamVote (5th rejection) / MissionResult (3 wins) ─▶ GameOver ─start─▶ …
//
// Requests to players are fanned out through the registry and answered into
// generation-tagged `ResponseSlots` (see `slots.rs`); the orchestrator waits
// on the bus with `recv_timeout`, never longer than `POLL_INTERVAL`, so the
// phase deadline and the stop flag are both honored. Joins and departures
// are handled in every phase: a departure forfeits any open slot of that
// player, and the next `RoundStart` notices the empty seat and pauses.
//
// Every mutation is followed by `publish`, which hands a snapshot to each
// `StateObserver` (broadcast, persistence) without waiting on their I/O.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use saboteur_game::{GameState, ProposalError};
use saboteur_prng::DealerRng;
use saboteur_protocol::{Generation, Phase, PlayerId, Role, ServerMessage, VoteEntry};
use tracing::{debug, info, warn};

use crate::bus::{BusEvent, BusReceiver};
use crate::config::ServerConfig;
use crate::dispatch::{self, Control, PhaseResponse, Routed};
use crate::observer::StateObserver;
use crate::registry::Registry;
use crate::slots::{ResponseSlots, SlotError};

/// Longest single wait on the bus.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The server is shutting down; unwinds the current phase.
#[derive(Debug)]
struct Halt;

/// Result of asking the leader for a team.
#[derive(Debug, PartialEq, Eq)]
pub enum ProposalOutcome {
    Valid(BTreeSet<PlayerId>),
    Invalid(ProposalError),
    TimedOut,
}

#[derive(Clone, Copy, Debug)]
pub struct PhaseTimeouts {
    pub proposal: Duration,
    pub vote: Duration,
    pub sabotage: Duration,
}

impl From<&ServerConfig> for PhaseTimeouts {
    fn from(config: &ServerConfig) -> Self {
        Self {
            proposal: config.proposal_timeout,
            vote: config.vote_timeout,
            sabotage: config.sabotage_timeout,
        }
    }
}

/// State shared between the orchestrator thread and `ServerHandle`.
#[derive(Clone)]
pub struct Shared {
    pub state: Arc<Mutex<GameState>>,
    pub phase: Arc<Mutex<Phase>>,
    pub keep_running: Arc<AtomicBool>,
}

impl Shared {
    pub fn new(state: GameState, phase: Phase) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            phase: Arc::new(Mutex::new(phase)),
            keep_running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, GameState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: Phase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
    }
}

pub struct Orchestrator {
    shared: Shared,
    registry: Arc<Registry>,
    events: BusReceiver,
    observers: Vec<Box<dyn StateObserver>>,
    timeouts: PhaseTimeouts,
    rng: DealerRng,
    generation: Generation,
}

impl Orchestrator {
    pub fn new(
        shared: Shared,
        registry: Arc<Registry>,
        events: BusReceiver,
        observers: Vec<Box<dyn StateObserver>>,
        timeouts: PhaseTimeouts,
        rng: DealerRng,
    ) -> Self {
        Self {
            shared,
            registry,
            events,
            observers,
            timeouts,
            rng,
            generation: Generation::default(),
        }
    }

    /// Drive the game until the server stops. Starts in whatever phase the
    /// shared state was created with (`Lobby`, or `Paused` after a restore).
    pub fn run(mut self) {
        let mut phase = self.shared.phase();
        info!(%phase, "orchestrator started");
        loop {
            let next = match phase {
                Phase::Lobby => self.lobby(),
                Phase::RoundStart => self.round_start(),
                Phase::TeamProposal => self.team_proposal(),
                Phase::TeamVote => self.team_vote(),
                Phase::MissionSabotage => self.mission_sabotage(),
                Phase::MissionResult => self.mission_result(),
                Phase::Paused => self.paused(),
                Phase::GameOver => self.game_over(),
            };
            match next {
                Ok(next) => phase = next,
                Err(Halt) => break,
            }
        }
        info!("orchestrator stopped");
    }

    // --- phases ---

    fn lobby(&mut self) -> Result<Phase, Halt> {
        self.enter(Phase::Lobby);
        loop {
            let Some(event) = self.next_event(None)? else {
                continue;
            };
            let Some((from, routed)) = self.handle_membership(event) else {
                continue;
            };
            match routed {
                Routed::Control(Control::StartGame) => {
                    if self.try_start_game(from) {
                        return Ok(Phase::RoundStart);
                    }
                }
                Routed::Response { response, .. } => {
                    self.reject(from, format!("{} is not expected in the lobby", response.kind()));
                }
                Routed::Ignored => {}
            }
        }
    }

    fn round_start(&mut self) -> Result<Phase, Halt> {
        if self.shared.state().is_terminal() {
            return Ok(Phase::GameOver);
        }
        self.enter(Phase::RoundStart);

        let (round, leader, missing) = {
            let state = self.shared.state();
            let missing: Vec<PlayerId> = state
                .roster
                .iter()
                .copied()
                .filter(|&p| !self.registry.is_connected(p))
                .collect();
            (state.current_round, state.current_leader(), missing)
        };
        if !missing.is_empty() {
            warn!(?missing, "seated players missing, pausing");
            return Ok(Phase::Paused);
        }
        let Some(leader) = leader else {
            return Ok(Phase::Lobby);
        };
        self.log_all(format!("Round {} begins; player {leader} leads.", round + 1));
        Ok(Phase::TeamProposal)
    }

    fn team_proposal(&mut self) -> Result<Phase, Halt> {
        self.enter(Phase::TeamProposal);
        let (leader, size, eligible) = {
            let state = self.shared.state();
            (state.current_leader(), state.mission_size(), state.roster.clone())
        };
        let (Some(leader), Some(size)) = (leader, size) else {
            return Ok(Phase::RoundStart);
        };

        loop {
            match self.request_proposal(leader, size, &eligible)? {
                ProposalOutcome::Valid(team) => {
                    info!(%leader, ?team, "team proposed");
                    self.shared.state().propose_team(team);
                    self.publish();
                    return Ok(Phase::TeamVote);
                }
                ProposalOutcome::Invalid(reason) => {
                    debug!(%leader, %reason, "invalid proposal, asking again");
                    self.reject(leader, format!("invalid team: {reason}"));
                }
                ProposalOutcome::TimedOut => {
                    self.shared.state().skip_leader();
                    self.publish();
                    self.log_all(format!(
                        "Player {leader} did not propose a team in time; leadership passes on."
                    ));
                    return Ok(Phase::RoundStart);
                }
            }
        }
    }

    fn request_proposal(
        &mut self,
        leader: PlayerId,
        size: usize,
        eligible: &[PlayerId],
    ) -> Result<ProposalOutcome, Halt> {
        let generation = self.next_generation();
        let mut slots = ResponseSlots::open(generation, [leader], self.timeouts.proposal);
        let request = ServerMessage::RequestTeam {
            leader_id: leader,
            mission_size: size,
            eligible_ids: eligible.to_vec(),
            generation,
        };
        if self.registry.send(leader, &request).is_err() {
            slots.forfeit(leader);
        }
        self.collect(&mut slots, Phase::TeamProposal, PhaseResponse::into_team)?;

        let closed = slots.close(Vec::new());
        if !closed.answered(leader) {
            return Ok(ProposalOutcome::TimedOut);
        }
        let team = closed.answers.get(&leader).cloned().unwrap_or_default();
        Ok(match self.shared.state().validate_proposal(&team) {
            Ok(team) => ProposalOutcome::Valid(team),
            Err(reason) => ProposalOutcome::Invalid(reason),
        })
    }

    fn team_vote(&mut self) -> Result<Phase, Halt> {
        self.enter(Phase::TeamVote);
        let (leader, team, seats) = {
            let state = self.shared.state();
            let team: Vec<PlayerId> = state.proposed_team.iter().flatten().copied().collect();
            (state.current_leader(), team, state.roster.clone())
        };
        let Some(leader) = leader else {
            return Ok(Phase::RoundStart);
        };
        self.registry.broadcast(&ServerMessage::TeamProposed {
            leader_id: leader,
            team: team.clone(),
        });

        let generation = self.next_generation();
        let mut slots = ResponseSlots::open(generation, seats.iter().copied(), self.timeouts.vote);
        for &seat in &seats {
            let request = ServerMessage::RequestVote {
                player_id: seat,
                team: team.clone(),
                generation,
            };
            if self.registry.send(seat, &request).is_err() {
                slots.forfeit(seat);
            }
        }
        self.collect(&mut slots, Phase::TeamVote, PhaseResponse::into_vote)?;

        let closed = slots.close(false);
        for &player in closed.timed_out.iter().chain(&closed.forfeited) {
            self.log_all(format!("Player {player} did not vote; counted as a rejection."));
        }
        let votes: Vec<VoteEntry> = closed
            .answers
            .iter()
            .map(|(&player_id, &approve)| VoteEntry {
                player_id,
                approve,
                defaulted: !closed.answered(player_id),
            })
            .collect();

        let (tally, terminal) = {
            let mut state = self.shared.state();
            for (&player, &approve) in &closed.answers {
                state.record_vote(player, approve);
            }
            let tally = state.resolve_vote();
            (tally, state.is_terminal())
        };
        info!(
            approved = tally.approved,
            approvals = tally.approvals,
            rejections = tally.rejections,
            "vote closed"
        );
        self.registry.broadcast(&ServerMessage::VoteResult {
            approved: tally.approved,
            approvals: tally.approvals,
            rejections: tally.rejections,
            votes,
        });
        self.publish();

        Ok(if tally.approved {
            Phase::MissionSabotage
        } else if terminal {
            Phase::GameOver
        } else {
            Phase::RoundStart
        })
    }

    fn mission_sabotage(&mut self) -> Result<Phase, Halt> {
        self.enter(Phase::MissionSabotage);
        let infiltrators: Vec<PlayerId> = {
            let mut state = self.shared.state();
            let team: Vec<PlayerId> = state.proposed_team.iter().flatten().copied().collect();
            let mut infiltrators = Vec::new();
            for member in team {
                match state.role_of(member) {
                    Some(Role::Infiltrator) => infiltrators.push(member),
                    _ => state.record_sabotage(member, false),
                }
            }
            infiltrators
        };

        let generation = self.next_generation();
        let mut slots = ResponseSlots::open(
            generation,
            infiltrators.iter().copied(),
            self.timeouts.sabotage,
        );
        for &player in &infiltrators {
            let request = ServerMessage::RequestSabotage {
                player_id: player,
                generation,
            };
            if self.registry.send(player, &request).is_err() {
                slots.forfeit(player);
            }
        }
        self.collect(&mut slots, Phase::MissionSabotage, PhaseResponse::into_sabotage)?;

        let closed = slots.close(false);
        for &player in &closed.timed_out {
            let _ = self.registry.send(
                player,
                &ServerMessage::Log {
                    text: "No sabotage choice arrived in time; recorded as no sabotage.".into(),
                },
            );
        }
        {
            let mut state = self.shared.state();
            for (&player, &sabotage) in &closed.answers {
                state.record_sabotage(player, sabotage);
            }
        }
        self.publish();
        Ok(Phase::MissionResult)
    }

    fn mission_result(&mut self) -> Result<Phase, Halt> {
        self.enter(Phase::MissionResult);
        let (result, terminal, round) = {
            let mut state = self.shared.state();
            let result = state.resolve_mission();
            (result, state.is_terminal(), state.current_round)
        };
        info!(
            round,
            success = result.success,
            sabotage_count = result.sabotage_count,
            "mission resolved"
        );
        self.registry.broadcast(&ServerMessage::MissionOutcome {
            success: result.success,
            sabotage_count: result.sabotage_count,
        });
        self.publish();
        Ok(if terminal {
            Phase::GameOver
        } else {
            Phase::RoundStart
        })
    }

    fn game_over(&mut self) -> Result<Phase, Halt> {
        let outcome = self.shared.state().outcome();
        if let Some(outcome) = outcome {
            info!(winner = %outcome.winner, reason = %outcome.reason, "game over");
            self.registry.broadcast(&ServerMessage::GameOver {
                winner: outcome.winner,
                reason: outcome.reason,
            });
        }
        self.enter(Phase::GameOver);

        loop {
            let Some(event) = self.next_event(None)? else {
                continue;
            };
            let Some((from, routed)) = self.handle_membership(event) else {
                continue;
            };
            match routed {
                Routed::Control(Control::StartGame) => {
                    if Some(from) != self.registry.host() {
                        self.reject(from, "only the host can start a new game".into());
                        continue;
                    }
                    if self.try_start_game(from) {
                        return Ok(Phase::RoundStart);
                    }
                    self.shared.state().reset();
                    return Ok(Phase::Lobby);
                }
                Routed::Response { response, .. } => {
                    self.reject(from, format!("{} is not expected after the game", response.kind()));
                }
                Routed::Ignored => {}
            }
        }
    }

    /// Waiting for the seated players to come back, or for the host to give
    /// up on this game and start another.
    fn paused(&mut self) -> Result<Phase, Halt> {
        self.enter(Phase::Paused);
        self.log_all(
            "Game paused: waiting for every seated player to reconnect, \
             or for the host to start a new game."
                .into(),
        );
        loop {
            if self.all_seats_connected() {
                self.log_all("All players are back; resuming.".into());
                return Ok(Phase::RoundStart);
            }
            let Some(event) = self.next_event(None)? else {
                continue;
            };
            let Some((from, routed)) = self.handle_membership(event) else {
                continue;
            };
            match routed {
                Routed::Control(Control::StartGame) => {
                    if self.try_start_game(from) {
                        return Ok(Phase::RoundStart);
                    }
                }
                Routed::Response { response, .. } => {
                    self.reject(from, format!("{} is not expected while paused", response.kind()));
                }
                Routed::Ignored => {}
            }
        }
    }

    // --- shared helpers ---

    /// Record the new phase and publish.
    fn enter(&mut self, phase: Phase) {
        debug!(%phase, "entering phase");
        self.shared.set_phase(phase);
        self.publish();
    }

    fn publish(&mut self) {
        let snapshot = self.shared.state().clone();
        let phase = self.shared.phase();
        for observer in &mut self.observers {
            observer.state_changed(&snapshot, phase);
        }
    }

    fn next_generation(&mut self) -> Generation {
        self.generation = self.generation.next();
        self.generation
    }

    fn all_seats_connected(&self) -> bool {
        let state = self.shared.state();
        state.started && state.roster.iter().all(|&p| self.registry.is_connected(p))
    }

    /// Start a game if `from` is the host and the table is full. Rejects to
    /// `from` otherwise.
    fn try_start_game(&mut self, from: PlayerId) -> bool {
        if Some(from) != self.registry.host() {
            self.reject(from, "only the host can start the game".into());
            return false;
        }
        let connected = self.registry.connected_ids();
        let needed = self.shared.state().num_players;
        if connected.len() < needed {
            self.reject(
                from,
                format!("waiting for {needed} players ({} connected)", connected.len()),
            );
            return false;
        }
        let roster: Vec<PlayerId> = connected.into_iter().take(needed).collect();

        let dealt = {
            let mut state = self.shared.state();
            state.reset();
            state.assign_roles(roster, &mut self.rng)
        };
        if let Err(e) = dealt {
            warn!(error = %e, "could not start game");
            self.reject(from, e.to_string());
            return false;
        }

        let (seats, roles): (Vec<PlayerId>, Vec<Option<Role>>) = {
            let state = self.shared.state();
            state
                .roster
                .iter()
                .map(|&p| (p, state.role_of(p)))
                .unzip()
        };
        info!(host = %from, ?seats, "game started");
        self.registry.broadcast(&ServerMessage::StartGame);
        for (player_id, role) in seats.into_iter().zip(roles) {
            if let Some(role) = role {
                let _ = self
                    .registry
                    .send(player_id, &ServerMessage::PlayerRole { player_id, role });
            }
        }
        self.publish();
        true
    }

    /// Wait until every slot is answered or forfeited, or the deadline
    /// passes. Answers of the wrong kind, from the wrong connection, for
    /// another generation, or from a player who was not asked are refused
    /// with a notice and change nothing.
    fn collect<T: Clone>(
        &mut self,
        slots: &mut ResponseSlots<T>,
        phase: Phase,
        extract: fn(PhaseResponse) -> Result<T, PhaseResponse>,
    ) -> Result<(), Halt> {
        while !slots.is_complete() {
            if slots.is_expired(Instant::now()) {
                debug!(generation = slots.generation().0, "deadline passed");
                return Ok(());
            }
            let Some(event) = self.next_event(Some(slots.deadline()))? else {
                continue;
            };
            if let BusEvent::Left(player) = &event {
                slots.forfeit(*player);
            }
            let Some((from, routed)) = self.handle_membership(event) else {
                continue;
            };
            match routed {
                Routed::Control(Control::StartGame) => {
                    self.reject(from, "a game is already in progress".into());
                }
                Routed::Response {
                    claimed,
                    generation,
                    response,
                } => {
                    if claimed != from {
                        self.reject(from, format!("you are player {from}, not player {claimed}"));
                        continue;
                    }
                    let answer = match extract(response) {
                        Ok(answer) => answer,
                        Err(other) => {
                            self.reject(from, format!("{} is not expected during {phase}", other.kind()));
                            continue;
                        }
                    };
                    match slots.accept(generation, from, answer) {
                        Ok(()) => debug!(player_id = %from, generation = generation.0, "answer accepted"),
                        Err(e @ SlotError::Stale { .. }) => {
                            debug!(player_id = %from, error = %e, "stale answer dropped");
                            self.log_to(from, format!("Ignored a late answer: {e}."));
                        }
                        Err(e) => {
                            warn!(player_id = %from, error = %e, %phase, "answer refused");
                            self.reject(from, e.to_string());
                        }
                    }
                }
                Routed::Ignored => {}
            }
        }
        Ok(())
    }

    /// Handle joins and departures; hand back routed messages.
    fn handle_membership(&mut self, event: BusEvent) -> Option<(PlayerId, Routed)> {
        match event {
            BusEvent::Joined(player_id) => {
                info!(%player_id, "player joined");
                self.registry
                    .broadcast(&ServerMessage::PlayerJoined { player_id });
                self.publish();
                None
            }
            BusEvent::Left(player_id) => {
                info!(%player_id, "player left");
                self.registry.remove(player_id);
                self.registry
                    .broadcast(&ServerMessage::PlayerLeft { player_id });
                None
            }
            BusEvent::Message { from, message } => Some((from, dispatch::route(message))),
        }
    }

    /// Next bus event, `None` once `deadline` has passed. Errs with `Halt`
    /// when the server is stopping.
    fn next_event(&self, deadline: Option<Instant>) -> Result<Option<BusEvent>, Halt> {
        loop {
            if !self.shared.keep_running.load(Ordering::SeqCst) {
                return Err(Halt);
            }
            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    (deadline - now).min(POLL_INTERVAL)
                }
                None => POLL_INTERVAL,
            };
            match self.events.recv_timeout(wait) {
                Ok(event) => return Ok(Some(event)),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Err(Halt),
            }
        }
    }

    fn reject(&self, player_id: PlayerId, reason: String) {
        debug!(%player_id, %reason, "rejected");
        let _ = self
            .registry
            .send(player_id, &ServerMessage::Rejected { reason });
    }

    fn log_to(&self, player_id: PlayerId, text: String) {
        let _ = self.registry.send(player_id, &ServerMessage::Log { text });
    }

    fn log_all(&self, text: String) {
        info!("{text}");
        self.registry.broadcast(&ServerMessage::Log { text });
    }
}
