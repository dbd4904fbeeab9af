// End-to-end game tests.
//
// Each test starts a real server on an ephemeral port, connects real
// `NetClient`s through `TestPlayer`, and plays the server's requests from
// the players' side: proposals, votes, sabotage choices, disconnects. State
// is checked both through what players receive and through
// `ServerHandle::state()`.
//
// Roles are dealt from a fixed seed, but tests never assume who got which
// role: they read the `player-role` messages and pick teams from those.

use std::time::Duration;

use multiplayer_tests::{Table, test_config};
use saboteur_game::{GameState, MemoryStore};
use saboteur_prng::DealerRng;
use saboteur_protocol::{ClientMessage, GameOverReason, Phase, PlayerId, Role, ServerMessage, Winner};

fn ids(raw: &[u32]) -> Vec<PlayerId> {
    raw.iter().map(|&id| PlayerId(id)).collect()
}

// ---------------------------------------------------------------------------
// Rounds
// ---------------------------------------------------------------------------

/// Leader 1 gets a team with one infiltrator approved 3 to 2, the
/// infiltrator sabotages, and the mission fails. Leader 2's bigger team is
/// then voted down 1 to 4.
#[test]
fn sabotaged_mission_then_rejected_proposal() {
    let mut table = Table::open(test_config(5));
    table.start();

    let infiltrators = table.ids_with_role(Role::Infiltrator);
    let loyal = table.ids_with_role(Role::Loyal);
    assert_eq!(infiltrators.len(), 2);
    assert_eq!(loyal.len(), 3);

    let (partner, saboteur) = if infiltrators.contains(&1) {
        (loyal[0], 1)
    } else {
        (infiltrators[0], infiltrators[0])
    };
    let honest_member = if saboteur == 1 { partner } else { 1 };

    let request = table.player(1).wait_for_team_request();
    assert_eq!(request.mission_size, 2);
    assert_eq!(request.eligible_ids, ids(&[1, 2, 3, 4, 5]));
    table.player(1).propose(&[partner, 1], request.generation);

    let (leader, team) = table.player(4).wait_for_team_proposed();
    assert_eq!(leader, PlayerId(1));
    let mut expected_team = ids(&[1, partner]);
    expected_team.sort();
    assert_eq!(team, expected_team);

    table.vote(&[(1, true), (2, true), (3, true), (4, false), (5, false)]);
    let result = table.player(5).wait_for_vote_result();
    assert!(result.approved);
    assert_eq!((result.approvals, result.rejections), (3, 2));
    assert!(result.votes.iter().all(|v| !v.defaulted));

    let generation = table.player(saboteur).wait_for_sabotage_request();
    table.player(saboteur).sabotage(true, generation);

    let mut honest_asked = false;
    let outcome = table.player(honest_member).wait_for("mission-outcome", |m| match m {
        ServerMessage::RequestSabotage { .. } => {
            honest_asked = true;
            None
        }
        ServerMessage::MissionOutcome {
            success,
            sabotage_count,
        } => Some((success, sabotage_count)),
        _ => None,
    });
    assert!(!honest_asked, "loyal team member was asked to sabotage");
    assert_eq!(outcome, (false, 1));

    let state = table.handle.state();
    assert_eq!(state.minority_wins, 1);
    assert_eq!(state.majority_wins, 0);
    assert_eq!(state.mission_outcomes, vec![false]);
    assert_eq!(state.current_round, 1);
    assert_eq!(state.leader_index, 1);

    let request = table.player(2).wait_for_team_request();
    assert_eq!(request.mission_size, 3);
    table.player(2).propose(&[2, 3, 4], request.generation);
    table.vote(&[(1, false), (2, true), (3, false), (4, false), (5, false)]);

    let result = table.player(1).wait_for_vote_result();
    assert!(!result.approved);
    assert_eq!((result.approvals, result.rejections), (1, 4));

    let state = table.handle.state();
    assert_eq!(state.consecutive_rejections, 1);
    assert_eq!(state.leader_index, 2);
    assert_eq!(state.mission_outcomes, vec![false]);
    assert!(state.proposed_team.is_none());

    let request = table.player(3).wait_for_team_request();
    assert_eq!(request.mission_size, 3);
}

/// A player who never votes is counted as rejecting once the deadline
/// passes, and the game moves on without them.
#[test]
fn missing_vote_counts_as_rejection() {
    let mut config = test_config(5);
    config.vote_timeout = Duration::from_millis(500);
    let mut table = Table::open(config);
    table.start();

    let loyal = table.ids_with_role(Role::Loyal);
    let request = table.player(1).wait_for_team_request();
    table.player(1).propose(&loyal[..2], request.generation);

    table.vote(&[(1, true), (2, true), (3, true), (5, false)]);

    let notice = table.player(3).wait_for_log("Player 4 did not vote");
    assert!(notice.contains("rejection"));
    let result = table.player(3).wait_for_vote_result();
    assert!(result.approved);
    assert_eq!((result.approvals, result.rejections), (3, 2));
    let silent = result
        .votes
        .iter()
        .find(|v| v.player_id == PlayerId(4))
        .expect("player 4 missing from vote result");
    assert!(silent.defaulted);
    assert!(!silent.approve);

    // All-loyal team: no sabotage round trip, straight to the next round.
    let (success, sabotage_count) = table.player(2).wait_for_mission_outcome();
    assert!(success);
    assert_eq!(sabotage_count, 0);
    let request = table.player(2).wait_for_team_request();
    assert_eq!(request.mission_size, 3);
}

/// An infiltrator on an approved team who never answers is recorded as not
/// sabotaging, so the mission succeeds once the deadline passes.
#[test]
fn silent_infiltrator_counts_as_no_sabotage() {
    let mut config = test_config(5);
    config.sabotage_timeout = Duration::from_millis(500);
    let mut table = Table::open(config);
    table.start();

    let infiltrators = table.ids_with_role(Role::Infiltrator);
    let loyal = table.ids_with_role(Role::Loyal);
    let (team, silent) = if infiltrators.contains(&1) {
        ([1, loyal[0]], 1)
    } else {
        ([1, infiltrators[0]], infiltrators[0])
    };

    let request = table.player(1).wait_for_team_request();
    table.player(1).propose(&team, request.generation);
    table.vote(&[(1, true), (2, true), (3, true), (4, true), (5, true)]);

    table.player(silent).wait_for_sabotage_request();
    let notice = table.player(silent).wait_for_log("No sabotage choice arrived in time");
    assert!(notice.contains("no sabotage"));

    let outcome = table.player(silent).wait_for_mission_outcome();
    assert_eq!(outcome, (true, 0));
    let state = table.handle.state();
    assert_eq!(state.mission_outcomes, vec![true]);
    assert_eq!(state.majority_wins, 1);
    assert_eq!(state.minority_wins, 0);

    let request = table.player(2).wait_for_team_request();
    assert_eq!(request.mission_size, 3);
}

/// A leader who lets the proposal deadline pass loses the lead without
/// counting as a rejection; their late answer is ignored.
#[test]
fn proposal_timeout_passes_leadership() {
    let mut config = test_config(5);
    config.proposal_timeout = Duration::from_millis(800);
    let mut table = Table::open(config);
    table.start();

    let first = table.player(1).wait_for_team_request();
    table
        .player(3)
        .wait_for_log("Player 1 did not propose a team in time");

    let second = table.player(2).wait_for_team_request();
    assert!(second.generation > first.generation);
    let state = table.handle.state();
    assert_eq!(state.leader_index, 1);
    assert_eq!(state.consecutive_rejections, 0);

    table.player(1).propose(&[1, 2], first.generation);
    let notice = table.player(1).wait_for_log("Ignored a late answer");
    assert!(notice.contains("generation"));
    let state = table.handle.state();
    assert!(state.proposed_team.is_none());
    assert_eq!(state.consecutive_rejections, 0);
}

// ---------------------------------------------------------------------------
// Refused input
// ---------------------------------------------------------------------------

/// Invalid teams go back to the same leader with a fresh generation, and
/// nothing else changes.
#[test]
fn invalid_proposal_reprompts_same_leader() {
    let mut table = Table::open(test_config(5));
    table.start();

    let mut request = table.player(1).wait_for_team_request();
    for (team, complaint) in [
        (vec![1, 1], "more than once"),
        (vec![1, 2, 3], "must have 2 players"),
        (vec![1, 9], "not seated"),
    ] {
        table.player(1).propose(&team, request.generation);
        let reason = table.player(1).wait_for_rejected();
        assert!(reason.contains(complaint), "unexpected reason: {reason}");

        let next = table.player(1).wait_for_team_request();
        assert!(next.generation > request.generation);
        assert_eq!(next.mission_size, 2);
        request = next;
    }

    let state = table.handle.state();
    assert_eq!(state.leader_index, 0);
    assert_eq!(state.consecutive_rejections, 0);
    assert!(state.proposed_team.is_none());

    table.player(1).propose(&[1, 2], request.generation);
    let (leader, team) = table.player(5).wait_for_team_proposed();
    assert_eq!(leader, PlayerId(1));
    assert_eq!(team, ids(&[1, 2]));
}

/// Out-of-turn, impersonated, wrong-phase, stale and duplicate answers are
/// refused and change nothing.
#[test]
fn out_of_turn_and_stale_answers_are_refused() {
    let mut table = Table::open(test_config(5));
    table.start();

    let first = table.player(1).wait_for_team_request();

    table.player(2).send(&ClientMessage::TeamProposed {
        player_id: PlayerId(2),
        team: ids(&[2, 3]),
        generation: first.generation,
    });
    let reason = table.player(2).wait_for_rejected();
    assert!(reason.contains("no answer is expected"), "{reason}");

    table.player(2).send(&ClientMessage::TeamProposed {
        player_id: PlayerId(1),
        team: ids(&[2, 3]),
        generation: first.generation,
    });
    let reason = table.player(2).wait_for_rejected();
    assert_eq!(reason, "you are player 2, not player 1");

    table.player(3).vote(true, first.generation);
    let reason = table.player(3).wait_for_rejected();
    assert!(reason.contains("vote-cast is not expected"), "{reason}");

    table.player(3).start_game();
    let reason = table.player(3).wait_for_rejected();
    assert!(reason.contains("already in progress"), "{reason}");

    // Invalid, then the old generation, then the current one.
    table.player(1).propose(&[1], first.generation);
    table.player(1).wait_for_rejected();
    let second = table.player(1).wait_for_team_request();
    table.player(1).propose(&[1, 3], first.generation);
    table.player(1).wait_for_log("Ignored a late answer");
    assert!(
        !table
            .player(4)
            .receives_within(Duration::from_millis(300), |m| matches!(
                m,
                ServerMessage::TeamProposed { .. }
            ))
    );
    table.player(1).propose(&[1, 3], second.generation);
    let (_, team) = table.player(4).wait_for_team_proposed();
    assert_eq!(team, ids(&[1, 3]));

    let (_, generation) = table.player(1).wait_for_vote_request();
    table.player(1).vote(true, generation);
    table.player(1).vote(false, generation);
    let reason = table.player(1).wait_for_rejected();
    assert!(reason.contains("already answered"), "{reason}");

    table.vote(&[(2, true), (3, true), (4, true), (5, true)]);
    let result = table.player(1).wait_for_vote_result();
    assert_eq!((result.approvals, result.rejections), (5, 0));
}

// ---------------------------------------------------------------------------
// Game end
// ---------------------------------------------------------------------------

/// Five rejected proposals in a row hand the game to the infiltrators, and
/// the final snapshot reveals every role.
#[test]
fn five_rejections_end_the_game() {
    let mut table = Table::open(test_config(5));
    table.start();

    for leader in 1..=5u32 {
        let request = table.player(leader).wait_for_team_request();
        let partner = leader % 5 + 1;
        table.player(leader).propose(&[leader, partner], request.generation);
        table.vote(&[(1, false), (2, false), (3, false), (4, false), (5, false)]);
    }

    for player in table.players() {
        assert_eq!(
            player.wait_for_game_over(),
            (Winner::Infiltrators, GameOverReason::FiveRejections)
        );
    }

    let infiltrators = table.ids_with_role(Role::Infiltrator);
    let view = table.player(2).wait_for_phase(Phase::GameOver);
    assert!(view.game_over);
    for seat in &view.seats {
        let expected = if infiltrators.contains(&seat.player_id.0) {
            Role::Infiltrator
        } else {
            Role::Loyal
        };
        assert_eq!(seat.role, Some(expected));
    }

    let state = table.handle.state();
    assert_eq!(state.consecutive_rejections, 5);
    assert!(state.mission_outcomes.is_empty());
    assert_eq!(table.handle.phase(), Phase::GameOver);
}

/// Three clean missions win it for the loyal players; the host can then
/// start a fresh game at the same table.
#[test]
fn loyal_victory_then_play_again() {
    let mut table = Table::open(test_config(5));
    table.start();
    let loyal = table.ids_with_role(Role::Loyal);

    for (leader, size) in [(1u32, 2usize), (2, 3), (3, 2)] {
        let request = table.player(leader).wait_for_team_request();
        assert_eq!(request.mission_size, size);
        table.player(leader).propose(&loyal[..size], request.generation);
        table.vote(&[(1, true), (2, true), (3, true), (4, true), (5, true)]);
        assert_eq!(table.player(4).wait_for_mission_outcome(), (true, 0));
    }

    assert_eq!(
        table.player(1).wait_for_game_over(),
        (Winner::Loyal, GameOverReason::MissionsSucceeded)
    );
    let state = table.handle.state();
    assert_eq!(state.majority_wins, 3);
    assert_eq!(state.mission_outcomes, vec![true, true, true]);

    table.wait_for_server_phase(Phase::GameOver);
    table.player(2).start_game();
    let reason = table.player(2).wait_for_rejected();
    assert!(reason.contains("only the host"), "{reason}");

    table.start();
    let state = table.handle.state();
    assert!(state.started);
    assert_eq!(state.current_round, 0);
    assert_eq!(state.majority_wins, 0);
    assert!(state.mission_outcomes.is_empty());
    assert_eq!(state.roles.len(), 5);
    let request = table.player(1).wait_for_team_request();
    assert_eq!(request.mission_size, 2);
}

// ---------------------------------------------------------------------------
// Disconnects and restarts
// ---------------------------------------------------------------------------

/// A seat that leaves mid-round is forfeited for the rest of that round; the
/// next round pauses. The host can abandon the paused game and start a new
/// one once the table is full again.
#[test]
fn disconnect_pauses_until_host_restarts() {
    let mut table = Table::open(test_config(5));
    table.start();
    let infiltrators = table.ids_with_role(Role::Infiltrator);

    table.player(5).leave();
    let request = table.player(1).wait_for_team_request();
    table.player(1).propose(&[1, 2], request.generation);
    table.vote(&[(1, true), (2, true), (3, true), (4, true)]);

    let result = table.player(3).wait_for_vote_result();
    assert!(result.approved);
    assert_eq!((result.approvals, result.rejections), (4, 1));
    let gone = result
        .votes
        .iter()
        .find(|v| v.player_id == PlayerId(5))
        .expect("seat 5 missing from vote result");
    assert!(gone.defaulted);

    for member in [1, 2] {
        if infiltrators.contains(&member) {
            let generation = table.player(member).wait_for_sabotage_request();
            table.player(member).sabotage(false, generation);
        }
    }
    assert_eq!(table.player(3).wait_for_mission_outcome(), (true, 0));

    table.player(3).wait_for_log("Game paused");
    table.wait_for_server_phase(Phase::Paused);
    assert_eq!(table.handle.state().current_round, 1);

    table.player(1).start_game();
    let reason = table.player(1).wait_for_rejected();
    assert!(reason.contains("waiting for 5 players"), "{reason}");

    let newcomer = table.join();
    assert_eq!(newcomer, PlayerId(6));
    table.player(1).start_game();
    for id in [1, 2, 3, 4, 6] {
        table.player(id).wait_for_start();
    }

    let state = table.handle.state();
    assert_eq!(state.roster, ids(&[1, 2, 3, 4, 6]));
    assert_eq!(state.current_round, 0);
    assert!(state.mission_outcomes.is_empty());
}

/// A game restored from the store waits, paused, for every seat to be
/// connected again and then carries on from the round it was in.
#[test]
fn restored_game_resumes_when_seats_fill() {
    let mut saved = GameState::new(5).unwrap();
    saved
        .assign_roles(ids(&[1, 2, 3, 4, 5]), &mut DealerRng::new(3))
        .unwrap();
    let team = saved.validate_proposal(&ids(&[1, 2])).unwrap();
    saved.propose_team(team);
    for seat in ids(&[1, 2, 3, 4, 5]) {
        saved.record_vote(seat, true);
    }
    assert!(saved.resolve_vote().approved);
    saved.record_sabotage(PlayerId(1), false);
    saved.record_sabotage(PlayerId(2), false);
    saved.resolve_mission();

    let mut table = Table::open_with_store(test_config(5), MemoryStore::with_state(saved.clone()));

    let request = table.player(2).wait_for_team_request();
    assert_eq!(request.mission_size, 3);

    let state = table.handle.state();
    assert_eq!(state.roles, saved.roles);
    assert_eq!(state.current_round, 1);
    assert_eq!(state.majority_wins, 1);
    assert_eq!(state.leader_index, 1);

    let own_role = table
        .player(4)
        .wait_for_phase(Phase::TeamProposal)
        .role_of(PlayerId(4));
    assert_eq!(own_role, saved.role_of(PlayerId(4)));
}
