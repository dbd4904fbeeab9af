// Test-only players and tables for end-to-end game tests.
//
// `TestPlayer` wraps the real `NetClient` (from `saboteur_server::client`)
// with blocking "wait for the next message of this kind" helpers, so a test
// can script one player's side of the conversation line by line. `Table`
// starts a real server on port 0, seats `n` test players, and hands them out
// by player id.
//
// Waiting consumes messages in arrival order: anything that arrives before
// the awaited message is discarded, except that role assignments and the
// latest snapshot are remembered. Tests must therefore wait for messages in
// the order the server sends them.
//
// See also: `tests/full_pipeline.rs` for the scenarios.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use saboteur_game::{MemoryStore, StateStore};
use saboteur_protocol::{
    ClientMessage, GameOverReason, GameView, Generation, Phase, PlayerId, Role, ServerMessage,
    VoteEntry, Winner,
};
use saboteur_server::client::NetClient;
use saboteur_server::{ServerConfig, ServerHandle, start_server};

/// How long any single wait may take before the test fails.
const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Config for a test table: ephemeral port, fixed seed, deadlines short
/// enough to exercise timeouts but long enough for a loaded CI machine.
pub fn test_config(num_players: usize) -> ServerConfig {
    ServerConfig {
        port: 0,
        num_players,
        proposal_timeout: Duration::from_secs(3),
        vote_timeout: Duration::from_secs(3),
        sabotage_timeout: Duration::from_secs(3),
        seed: Some(7),
        ..ServerConfig::default()
    }
}

/// Published result of a vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteOutcome {
    pub approved: bool,
    pub approvals: u32,
    pub rejections: u32,
    pub votes: Vec<VoteEntry>,
}

/// A request the player was asked to answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamRequest {
    pub mission_size: usize,
    pub eligible_ids: Vec<PlayerId>,
    pub generation: Generation,
}

pub struct TestPlayer {
    client: NetClient,
    pub id: PlayerId,
    pub role: Option<Role>,
    pub last_view: Option<GameView>,
}

impl TestPlayer {
    pub fn connect(addr: SocketAddr) -> Self {
        let client = NetClient::connect(addr).expect("connect failed");
        Self {
            id: client.player_id(),
            client,
            role: None,
            last_view: None,
        }
    }

    pub fn send(&mut self, msg: &ClientMessage) {
        self.client.send(msg).expect("send failed");
    }

    pub fn send_raw(&mut self, payload: &[u8]) {
        self.client.send_raw(payload).expect("send_raw failed");
    }

    pub fn start_game(&mut self) {
        self.client.send_start_game().expect("send start-game failed");
    }

    pub fn propose(&mut self, team: &[u32], generation: Generation) {
        let team = team.iter().map(|&id| PlayerId(id)).collect();
        self.client
            .propose_team(team, generation)
            .expect("send team-proposed failed");
    }

    pub fn vote(&mut self, approve: bool, generation: Generation) {
        self.client
            .cast_vote(approve, generation)
            .expect("send vote-cast failed");
    }

    pub fn sabotage(&mut self, sabotage: bool, generation: Generation) {
        self.client
            .choose_sabotage(sabotage, generation)
            .expect("send sabotage-choice failed");
    }

    /// Say goodbye and close the connection.
    pub fn leave(&mut self) {
        self.client.disconnect();
    }

    /// Close the socket without a goodbye.
    pub fn vanish(&mut self) {
        self.client.drop_connection();
    }

    fn next_message(&mut self, deadline: Instant) -> Option<ServerMessage> {
        let remaining = deadline.checked_duration_since(Instant::now())?;
        let msg = self.client.recv_timeout(remaining)?;
        match &msg {
            ServerMessage::PlayerRole { player_id, role } if *player_id == self.id => {
                self.role = Some(*role);
            }
            ServerMessage::GameState { state } => self.last_view = Some(state.clone()),
            _ => {}
        }
        Some(msg)
    }

    /// Consume messages until `f` picks one out. Panics after `WAIT_TIMEOUT`.
    pub fn wait_for<R>(&mut self, what: &str, mut f: impl FnMut(ServerMessage) -> Option<R>) -> R {
        let deadline = Instant::now() + WAIT_TIMEOUT;
        loop {
            let Some(msg) = self.next_message(deadline) else {
                panic!("player {} timed out waiting for {what}", self.id);
            };
            if let Some(found) = f(msg) {
                return found;
            }
        }
    }

    /// Whether a message matching `f` arrives within `window`. Consumes
    /// everything it reads.
    pub fn receives_within(&mut self, window: Duration, mut f: impl FnMut(&ServerMessage) -> bool) -> bool {
        let deadline = Instant::now() + window;
        while let Some(msg) = self.next_message(deadline) {
            if f(&msg) {
                return true;
            }
        }
        false
    }

    pub fn wait_for_start(&mut self) -> Role {
        self.wait_for("start-game", |m| matches!(m, ServerMessage::StartGame).then_some(()));
        let id = self.id;
        self.wait_for("player-role", |m| match m {
            ServerMessage::PlayerRole { player_id, role } if player_id == id => Some(role),
            _ => None,
        })
    }

    pub fn wait_for_team_request(&mut self) -> TeamRequest {
        let id = self.id;
        self.wait_for("request-team", |m| match m {
            ServerMessage::RequestTeam {
                leader_id,
                mission_size,
                eligible_ids,
                generation,
            } if leader_id == id => Some(TeamRequest {
                mission_size,
                eligible_ids,
                generation,
            }),
            _ => None,
        })
    }

    pub fn wait_for_vote_request(&mut self) -> (Vec<PlayerId>, Generation) {
        let id = self.id;
        self.wait_for("request-vote", |m| match m {
            ServerMessage::RequestVote {
                player_id,
                team,
                generation,
            } if player_id == id => Some((team, generation)),
            _ => None,
        })
    }

    pub fn wait_for_sabotage_request(&mut self) -> Generation {
        let id = self.id;
        self.wait_for("request-sabotage", |m| match m {
            ServerMessage::RequestSabotage {
                player_id,
                generation,
            } if player_id == id => Some(generation),
            _ => None,
        })
    }

    pub fn wait_for_team_proposed(&mut self) -> (PlayerId, Vec<PlayerId>) {
        self.wait_for("team-proposed", |m| match m {
            ServerMessage::TeamProposed { leader_id, team } => Some((leader_id, team)),
            _ => None,
        })
    }

    pub fn wait_for_vote_result(&mut self) -> VoteOutcome {
        self.wait_for("vote-result", |m| match m {
            ServerMessage::VoteResult {
                approved,
                approvals,
                rejections,
                votes,
            } => Some(VoteOutcome {
                approved,
                approvals,
                rejections,
                votes,
            }),
            _ => None,
        })
    }

    pub fn wait_for_mission_outcome(&mut self) -> (bool, u32) {
        self.wait_for("mission-outcome", |m| match m {
            ServerMessage::MissionOutcome {
                success,
                sabotage_count,
            } => Some((success, sabotage_count)),
            _ => None,
        })
    }

    pub fn wait_for_game_over(&mut self) -> (Winner, GameOverReason) {
        self.wait_for("game-over", |m| match m {
            ServerMessage::GameOver { winner, reason } => Some((winner, reason)),
            _ => None,
        })
    }

    pub fn wait_for_rejected(&mut self) -> String {
        self.wait_for("rejected", |m| match m {
            ServerMessage::Rejected { reason } => Some(reason),
            _ => None,
        })
    }

    pub fn wait_for_log(&mut self, containing: &str) -> String {
        self.wait_for(&format!("log containing {containing:?}"), |m| match m {
            ServerMessage::Log { text } if text.contains(containing) => Some(text),
            _ => None,
        })
    }

    /// Next snapshot reporting `phase`.
    pub fn wait_for_phase(&mut self, phase: Phase) -> GameView {
        self.wait_for(&format!("game-state in {phase}"), |m| match m {
            ServerMessage::GameState { state } if state.phase == phase => Some(state),
            _ => None,
        })
    }
}

/// A running server with `n` connected test players.
pub struct Table {
    pub handle: ServerHandle,
    pub addr: SocketAddr,
    players: Vec<TestPlayer>,
}

impl Table {
    /// Start a server and connect `config.num_players` players.
    pub fn open(config: ServerConfig) -> Self {
        Self::open_with_store(config, MemoryStore::new())
    }

    pub fn open_with_store(config: ServerConfig, store: impl StateStore + 'static) -> Self {
        let n = config.num_players;
        let (handle, addr) = start_server(config, Box::new(store)).expect("server failed to start");
        let mut table = Self {
            handle,
            addr,
            players: Vec::new(),
        };
        for _ in 0..n {
            table.join();
        }
        table
    }

    /// Connect one more player.
    pub fn join(&mut self) -> PlayerId {
        let player = TestPlayer::connect(self.addr);
        let id = player.id;
        self.players.push(player);
        id
    }

    /// Host starts the game; every player waits for its role.
    pub fn start(&mut self) {
        let host = self.players.iter().map(|p| p.id).min().expect("empty table");
        self.player(host.0).start_game();
        for player in &mut self.players {
            player.wait_for_start();
        }
    }

    pub fn player(&mut self, id: u32) -> &mut TestPlayer {
        self.players
            .iter_mut()
            .find(|p| p.id == PlayerId(id))
            .unwrap_or_else(|| panic!("no player {id} at this table"))
    }

    pub fn players(&mut self) -> impl Iterator<Item = &mut TestPlayer> {
        self.players.iter_mut()
    }

    pub fn ids_with_role(&self, role: Role) -> Vec<u32> {
        self.players
            .iter()
            .filter(|p| p.role == Some(role))
            .map(|p| p.id.0)
            .collect()
    }

    /// Every listed player answers the current vote request.
    pub fn vote(&mut self, ballots: &[(u32, bool)]) {
        for &(id, approve) in ballots {
            let player = self.player(id);
            let (_, generation) = player.wait_for_vote_request();
            player.vote(approve, generation);
        }
    }

    /// Wait until the server reports `phase`.
    pub fn wait_for_server_phase(&self, phase: Phase) {
        let deadline = Instant::now() + WAIT_TIMEOUT;
        while self.handle.phase() != phase {
            assert!(Instant::now() < deadline, "server never reached {phase}");
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}
