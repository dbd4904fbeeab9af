// Integration smoke test for the game server's connection handling.
//
// Starts a server on localhost and talks to it through `NetClient`: id
// assignment, join/leave broadcasts, the full-table refusal, lobby-time
// `start-game` checks, malformed frames, and saving/restoring a game through
// a state file. Gameplay itself is covered by the `multiplayer_tests` crate.

use std::time::{Duration, Instant};

use saboteur_game::{GameState, JsonFileStore, MemoryStore, StateStore};
use saboteur_prng::DealerRng;
use saboteur_protocol::{Phase, PlayerId, ServerMessage};
use saboteur_server::client::NetClient;
use saboteur_server::error::ClientError;
use saboteur_server::{ServerConfig, start_server};

fn config(num_players: usize) -> ServerConfig {
    ServerConfig {
        port: 0,
        num_players,
        seed: Some(11),
        ..ServerConfig::default()
    }
}

/// Read messages until `f` picks one out; panics after five seconds.
fn expect<R>(client: &NetClient, what: &str, mut f: impl FnMut(ServerMessage) -> Option<R>) -> R {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let remaining = deadline
            .checked_duration_since(Instant::now())
            .unwrap_or_else(|| panic!("timed out waiting for {what}"));
        let msg = client
            .recv_timeout(remaining)
            .unwrap_or_else(|| panic!("timed out waiting for {what}"));
        if let Some(found) = f(msg) {
            return found;
        }
    }
}

fn rejected(client: &NetClient) -> String {
    expect(client, "rejected", |m| match m {
        ServerMessage::Rejected { reason } => Some(reason),
        _ => None,
    })
}

fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn seat(addr: std::net::SocketAddr, n: usize) -> Vec<NetClient> {
    (0..n)
        .map(|_| NetClient::connect(addr).expect("connect failed"))
        .collect()
}

#[test]
fn ids_joins_and_full_table() {
    let (handle, addr) = start_server(config(5), Box::new(MemoryStore::new())).unwrap();

    let clients = seat(addr, 5);
    let ids: Vec<u32> = clients.iter().map(|c| c.player_id().0).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);

    // The first player hears about everyone who came after.
    for later in 2..=5 {
        let joined = expect(&clients[0], "player-joined", |m| match m {
            ServerMessage::PlayerJoined { player_id } if player_id == PlayerId(later) => {
                Some(player_id)
            }
            _ => None,
        });
        assert_eq!(joined, PlayerId(later));
    }

    match NetClient::connect(addr) {
        Err(ClientError::Rejected(reason)) => assert_eq!(reason, "session is full"),
        Err(other) => panic!("expected a rejection, got {other}"),
        Ok(client) => panic!("sixth player was seated as {}", client.player_id()),
    }
    assert_eq!(handle.connected().len(), 5);
    assert_eq!(handle.phase(), Phase::Lobby);
    handle.stop();
}

#[test]
fn lobby_start_checks() {
    let (handle, addr) = start_server(config(5), Box::new(MemoryStore::new())).unwrap();
    let mut clients = seat(addr, 3);

    clients[1].send_start_game().unwrap();
    assert_eq!(rejected(&clients[1]), "only the host can start the game");

    clients[0].send_start_game().unwrap();
    assert_eq!(rejected(&clients[0]), "waiting for 5 players (3 connected)");

    // A vote in the lobby is refused, not fatal.
    clients[2].cast_vote(true, Default::default()).unwrap();
    let reason = rejected(&clients[2]);
    assert!(reason.contains("not expected in the lobby"), "{reason}");

    assert_eq!(handle.phase(), Phase::Lobby);
    assert!(!handle.state().started);
    handle.stop();
}

#[test]
fn malformed_frame_is_dropped_and_goodbye_is_broadcast() {
    let (handle, addr) = start_server(config(5), Box::new(MemoryStore::new())).unwrap();
    let mut clients = seat(addr, 3);

    clients[1].send_raw(b"{ this is not json").unwrap();
    clients[1].send_raw(br#"{"kind":"no-such-message"}"#).unwrap();
    // Still connected: the next real request gets a real answer.
    clients[1].send_start_game().unwrap();
    assert_eq!(rejected(&clients[1]), "only the host can start the game");

    clients[2].disconnect();
    let left = expect(&clients[0], "player-left", |m| match m {
        ServerMessage::PlayerLeft { player_id } => Some(player_id),
        _ => None,
    });
    assert_eq!(left, PlayerId(3));
    wait_until("player 3 to be dropped", || handle.connected().len() == 2);
    assert_eq!(handle.connected(), vec![PlayerId(1), PlayerId(2)]);

    // The freed seat goes to a new id.
    let newcomer = NetClient::connect(addr).unwrap();
    assert_eq!(newcomer.player_id(), PlayerId(4));
    handle.stop();
}

#[test]
fn game_in_progress_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("game.json");

    let (handle, addr) = start_server(config(5), Box::new(JsonFileStore::new(&path))).unwrap();
    let mut clients = seat(addr, 5);
    clients[0].send_start_game().unwrap();
    expect(&clients[0], "request-team", |m| {
        matches!(m, ServerMessage::RequestTeam { .. }).then_some(())
    });
    let dealt = handle.state();
    assert!(dealt.started);
    handle.stop();
    drop(clients);

    let saved = JsonFileStore::new(&path).load().unwrap().expect("nothing saved");
    assert!(saved.started);
    assert_eq!(saved.roles, dealt.roles);

    let (handle, addr) = start_server(config(5), Box::new(JsonFileStore::new(&path))).unwrap();
    assert_eq!(handle.phase(), Phase::Paused);
    assert_eq!(handle.state().roles, dealt.roles);

    let clients = seat(addr, 5);
    expect(&clients[0], "request-team", |m| match m {
        ServerMessage::RequestTeam { leader_id, .. } => Some(leader_id),
        _ => None,
    });
    wait_until("resume", || handle.phase() == Phase::TeamProposal);
    handle.stop();
}

/// A saved game for a different table size is ignored.
#[test]
fn mismatched_save_starts_fresh() {
    let mut state = GameState::new(6).unwrap();
    state
        .assign_roles((1..=6).map(PlayerId).collect(), &mut DealerRng::new(1))
        .unwrap();
    let (handle, _addr) =
        start_server(config(5), Box::new(MemoryStore::with_state(state))).unwrap();
    assert_eq!(handle.phase(), Phase::Lobby);
    assert!(!handle.state().started);
    handle.stop();
}

/// A saved game whose seats were not numbered 1..N (someone had rejoined
/// under a new id) resumes once N players connect to the new process.
#[test]
fn restored_game_reseats_players_by_position() {
    let mut saved = GameState::new(5).unwrap();
    saved
        .assign_roles(
            [1, 2, 3, 4, 6].into_iter().map(PlayerId).collect(),
            &mut DealerRng::new(4),
        )
        .unwrap();
    let late_role = saved.role_of(PlayerId(6));

    let (handle, addr) =
        start_server(config(5), Box::new(MemoryStore::with_state(saved))).unwrap();
    assert_eq!(handle.phase(), Phase::Paused);
    assert_eq!(handle.state().role_of(PlayerId(5)), late_role);

    let clients = seat(addr, 5);
    let eligible = expect(&clients[0], "request-team", |m| match m {
        ServerMessage::RequestTeam { eligible_ids, .. } => Some(eligible_ids),
        _ => None,
    });
    assert_eq!(eligible, (1..=5).map(PlayerId).collect::<Vec<_>>());
    wait_until("resume", || handle.phase() == Phase::TeamProposal);
    handle.stop();
}
