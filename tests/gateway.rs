mod common;

use std::time::Duration;

use serde_json::json;

use common::{TestClient, error_messages, seed_match, test_state};
use mindlink_back::{
    dao::match_store::MatchStore,
    dto::ws::ServerMessage,
    state::{SharedState, game::TeamColor, state_machine::MatchStatus},
};

const CODE: &str = "ROOM0001";

/// Red hint-giver, red operative, blue hint-giver and blue operative, all attached.
async fn seated_table(state: &SharedState) -> [TestClient; 4] {
    seed_match(state, CODE);
    let mut clients = [
        TestClient::new("alice"),
        TestClient::new("bob"),
        TestClient::new("carol"),
        TestClient::new("dave"),
    ];
    let seats = [
        (TeamColor::Red, true),
        (TeamColor::Red, false),
        (TeamColor::Blue, true),
        (TeamColor::Blue, false),
    ];

    for (client, (team, hint_giver)) in clients.iter_mut().zip(seats) {
        client
            .send(state, json!({"type": "join_game", "code": CODE}))
            .await;
        client
            .send(
                state,
                json!({"type": "update_team", "code": CODE, "team": team, "is_hint_giver": hint_giver}),
            )
            .await;
    }
    for client in clients.iter_mut() {
        client.drain();
    }
    clients
}

async fn started_table(state: &SharedState) -> [TestClient; 4] {
    let mut clients = seated_table(state).await;
    clients[0]
        .send(state, json!({"type": "start_game", "code": CODE}))
        .await;
    for client in clients.iter_mut() {
        client.drain();
    }
    clients
}

#[tokio::test]
async fn joining_broadcasts_to_the_whole_group() {
    let (state, _store) = test_state().await;
    seed_match(&state, CODE);
    let mut alice = TestClient::new("alice");
    let mut bob = TestClient::new("bob");

    alice
        .send(&state, json!({"type": "join_game", "code": "room0001"}))
        .await;
    bob.send(&state, json!({"type": "join_game", "code": CODE}))
        .await;

    assert_eq!(alice.session.attached(), Some(CODE));
    let seen_by_alice = alice.drain();
    assert_eq!(seen_by_alice.len(), 2);
    assert_eq!(
        seen_by_alice[1],
        ServerMessage::PlayerJoined {
            caller_id: "bob".into(),
            player_name: "BOB".into(),
            total_players: 2,
        }
    );
    assert_eq!(bob.drain().len(), 1);
}

#[tokio::test]
async fn start_pushes_role_projected_boards() {
    let (state, store) = test_state().await;
    let mut clients = seated_table(&state).await;

    clients[0]
        .send(&state, json!({"type": "start_game", "code": CODE}))
        .await;

    for (index, client) in clients.iter_mut().enumerate() {
        let messages = client.drain();
        assert_eq!(
            messages[0],
            ServerMessage::GameStarted {
                first_team: TeamColor::Red
            }
        );
        let ServerMessage::ReceiveCards { cards } = &messages[1] else {
            panic!("expected a board view, got {:?}", messages[1]);
        };
        assert_eq!(cards.len(), 25);
        let hint_giver = index % 2 == 0;
        assert!(cards.iter().all(|card| card.color.is_some() == hint_giver));
    }

    let stored = store
        .find_match(CODE.into())
        .await
        .unwrap()
        .expect("started match should be persisted");
    assert_eq!(stored.status, MatchStatus::Active);
}

#[tokio::test]
async fn operative_guess_reveals_the_card_to_everyone() {
    let (state, _store) = test_state().await;
    let mut clients = started_table(&state).await;

    clients[1]
        .send(
            &state,
            json!({"type": "execute_guess", "code": CODE, "positions": [0]}),
        )
        .await;

    for client in clients.iter_mut() {
        let messages = client.drain();
        let ServerMessage::GuessExecuted {
            revealed_cards,
            is_game_over,
            winner,
            current_team,
        } = &messages[0]
        else {
            panic!("expected a guess broadcast, got {:?}", messages[0]);
        };
        assert_eq!(revealed_cards.len(), 1);
        assert_eq!(revealed_cards[0].position, 0);
        assert!(revealed_cards[0].revealed);
        assert!(revealed_cards[0].color.is_some());
        assert!(!is_game_over);
        assert_eq!(*winner, None);
        assert_eq!(*current_team, Some(TeamColor::Red));
        assert!(matches!(messages[1], ServerMessage::ReceiveCards { .. }));
    }

    let handle = state.registry().get(CODE).unwrap();
    assert_eq!(handle.lock().await.guesses().len(), 1);
}

#[tokio::test]
async fn guessing_a_revealed_card_is_rejected_for_the_caller_only() {
    let (state, _store) = test_state().await;
    let mut clients = started_table(&state).await;
    clients[1]
        .send(
            &state,
            json!({"type": "execute_guess", "code": CODE, "positions": [0]}),
        )
        .await;
    for client in clients.iter_mut() {
        client.drain();
    }

    clients[1]
        .send(
            &state,
            json!({"type": "execute_guess", "code": CODE, "positions": [0]}),
        )
        .await;

    let errors = error_messages(&clients[1].drain());
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("already revealed"));
    for client in clients.iter_mut().skip(2) {
        assert!(client.drain().is_empty());
    }
    assert!(clients[0].drain().is_empty());

    let handle = state.registry().get(CODE).unwrap();
    assert_eq!(handle.lock().await.guesses().len(), 1);
}

#[tokio::test]
async fn hints_from_operatives_are_rejected() {
    let (state, _store) = test_state().await;
    let mut clients = started_table(&state).await;

    clients[1]
        .send(
            &state,
            json!({"type": "give_hint", "code": CODE, "word": "fruit", "count": 2}),
        )
        .await;

    assert_eq!(error_messages(&clients[1].drain()).len(), 1);
    assert!(clients[0].drain().is_empty());
    let handle = state.registry().get(CODE).unwrap();
    assert!(handle.lock().await.hints().is_empty());
}

#[tokio::test]
async fn hint_giver_hint_is_broadcast() {
    let (state, _store) = test_state().await;
    let mut clients = started_table(&state).await;

    clients[0]
        .send(
            &state,
            json!({"type": "give_hint", "code": CODE, "word": "Fruit", "count": 2}),
        )
        .await;

    for client in clients.iter_mut() {
        assert_eq!(
            client.drain(),
            vec![ServerMessage::HintGiven {
                word: "Fruit".into(),
                count: 2,
                team: TeamColor::Red,
            }]
        );
    }

    clients[0]
        .send(
            &state,
            json!({"type": "give_hint", "code": CODE, "word": "again", "count": 1}),
        )
        .await;
    assert_eq!(error_messages(&clients[0].drain()).len(), 1);
}

#[tokio::test]
async fn multi_word_hints_fail_the_shape_check() {
    let (state, _store) = test_state().await;
    let mut clients = started_table(&state).await;

    clients[0]
        .send(
            &state,
            json!({"type": "give_hint", "code": CODE, "word": "two words", "count": 1}),
        )
        .await;

    let errors = error_messages(&clients[0].drain());
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("invalid input"));
}

#[tokio::test]
async fn team_changes_are_refused_once_active() {
    let (state, _store) = test_state().await;
    let mut clients = started_table(&state).await;

    clients[3]
        .send(
            &state,
            json!({"type": "update_team", "code": CODE, "team": "red", "is_hint_giver": false}),
        )
        .await;

    assert_eq!(error_messages(&clients[3].drain()).len(), 1);
    assert!(clients[0].drain().is_empty());
    let handle = state.registry().get(CODE).unwrap();
    let game = handle.lock().await;
    let dave = game.player("dave").unwrap();
    assert_eq!(dave.team, Some(TeamColor::Blue));
    assert!(!dave.is_hint_giver);
    assert_eq!(game.team(TeamColor::Red).members, vec!["alice", "bob"]);
}

#[tokio::test]
async fn trap_passes_the_turn() {
    let (state, _store) = test_state().await;
    let mut clients = started_table(&state).await;

    clients[1]
        .send(
            &state,
            json!({"type": "execute_guess", "code": CODE, "positions": [24]}),
        )
        .await;

    let messages = clients[2].drain();
    assert!(matches!(
        messages[0],
        ServerMessage::GuessExecuted {
            is_game_over: false,
            current_team: Some(TeamColor::Blue),
            ..
        }
    ));

    clients[1]
        .send(
            &state,
            json!({"type": "execute_guess", "code": CODE, "positions": [1]}),
        )
        .await;
    let errors = error_messages(&clients[1].drain());
    assert!(errors.iter().any(|error| error.contains("turn")));
}

#[tokio::test]
async fn last_own_card_wins_exactly_once() {
    let (state, store) = test_state().await;
    let mut clients = started_table(&state).await;

    clients[1]
        .send(
            &state,
            json!({"type": "execute_guess", "code": CODE, "positions": [0, 1, 2, 3, 4, 5, 6, 7, 8]}),
        )
        .await;

    let messages = clients[3].drain();
    let game_overs: Vec<_> = messages
        .iter()
        .filter(|message| {
            matches!(
                message,
                ServerMessage::GuessExecuted {
                    is_game_over: true,
                    ..
                }
            )
        })
        .collect();
    assert_eq!(game_overs.len(), 1);
    assert!(matches!(
        game_overs[0],
        ServerMessage::GuessExecuted {
            winner: Some(TeamColor::Red),
            current_team: None,
            ..
        }
    ));

    clients[1]
        .send(
            &state,
            json!({"type": "execute_guess", "code": CODE, "positions": [9]}),
        )
        .await;
    assert_eq!(error_messages(&clients[1].drain()).len(), 1);
    assert!(clients[3].drain().is_empty());

    let handle = state.registry().get(CODE).unwrap();
    assert_eq!(handle.lock().await.status(), MatchStatus::Over);

    let mut persisted = None;
    for _ in 0..100 {
        if let Some(entity) = store.find_match(CODE.into()).await.unwrap() {
            if entity.winner.is_some() {
                persisted = Some(entity);
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let persisted = persisted.expect("finished match should be persisted");
    assert_eq!(persisted.winner, Some(TeamColor::Red));
    assert_eq!(persisted.status, MatchStatus::Over);
}

#[tokio::test]
async fn ending_drops_the_match_and_keeps_history() {
    let (state, store) = test_state().await;
    let mut clients = started_table(&state).await;

    clients[2]
        .send(&state, json!({"type": "end_game", "code": CODE}))
        .await;

    for client in clients.iter_mut() {
        assert_eq!(
            client.drain(),
            vec![ServerMessage::GameEnded { winner: None }]
        );
    }
    assert!(state.registry().get(CODE).is_none());
    assert_eq!(state.groups().size(CODE), 0);
    assert_eq!(clients[2].session.attached(), None);

    let stored = store.find_match(CODE.into()).await.unwrap().unwrap();
    assert_eq!(stored.status, MatchStatus::Over);
    assert!(stored.ended_at.is_some());
}

#[tokio::test]
async fn unknown_codes_and_bad_frames_only_reach_the_caller() {
    let (state, _store) = test_state().await;
    let mut clients = seated_table(&state).await;

    clients[1]
        .send(&state, json!({"type": "start_game", "code": "NOPE0000"}))
        .await;
    let errors = error_messages(&clients[1].drain());
    assert_eq!(errors, vec!["not found: match `NOPE0000` not found".to_string()]);

    clients[1]
        .send(&state, json!({"type": "dance", "code": CODE}))
        .await;
    let errors = error_messages(&clients[1].drain());
    assert!(errors[0].starts_with("invalid command"));

    assert!(clients[0].drain().is_empty());
}

#[tokio::test]
async fn degraded_storage_blocks_start_with_a_generic_message() {
    let (state, _store) = test_state().await;
    let mut clients = seated_table(&state).await;
    state.clear_match_store().await;

    clients[0]
        .send(&state, json!({"type": "start_game", "code": CODE}))
        .await;

    assert_eq!(
        error_messages(&clients[0].drain()),
        vec!["service temporarily unavailable".to_string()]
    );
    let handle = state.registry().get(CODE).unwrap();
    assert_eq!(handle.lock().await.status(), MatchStatus::Waiting);
}

#[tokio::test]
async fn joining_a_match_removed_while_waiting_for_its_guard_is_not_found() {
    let (state, _store) = test_state().await;
    let handle = seed_match(&state, CODE);
    let guard = handle.lock().await;

    let joiner = tokio::spawn({
        let state = state.clone();
        async move {
            let mut frank = TestClient::new("frank");
            frank
                .send(&state, json!({"type": "join_game", "code": CODE}))
                .await;
            frank
        }
    });
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    state.registry().remove(CODE);
    drop(guard);

    let mut frank = joiner.await.unwrap();
    let errors = error_messages(&frank.drain());
    assert_eq!(errors, vec!["not found: match `ROOM0001` not found".to_string()]);
    assert_eq!(frank.session.attached(), None);
    assert_eq!(state.groups().size(CODE), 0);
    assert_eq!(handle.lock().await.players().count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_operatives_reveal_the_winning_card_once() {
    let (state, _store) = test_state().await;
    let mut clients = seated_table(&state).await;
    let mut erin = TestClient::new("erin");
    erin.send(&state, json!({"type": "join_game", "code": CODE}))
        .await;
    erin.send(
        &state,
        json!({"type": "update_team", "code": CODE, "team": "red", "is_hint_giver": false}),
    )
    .await;
    clients[0]
        .send(&state, json!({"type": "start_game", "code": CODE}))
        .await;
    clients[1]
        .send(
            &state,
            json!({"type": "execute_guess", "code": CODE, "positions": [0, 1, 2, 3, 4, 5, 6, 7]}),
        )
        .await;
    for client in clients.iter_mut() {
        client.drain();
    }
    erin.drain();

    let [_alice, bob, _carol, mut dave] = clients;
    let racers = [bob, erin].map(|mut racer| {
        let state = state.clone();
        tokio::spawn(async move {
            racer
                .send(
                    &state,
                    json!({"type": "execute_guess", "code": CODE, "positions": [8]}),
                )
                .await;
            racer
        })
    });

    let mut errors = 0;
    for racer in racers {
        let mut racer = racer.await.unwrap();
        errors += error_messages(&racer.drain()).len();
    }
    assert_eq!(errors, 1);

    let game_overs = dave
        .drain()
        .into_iter()
        .filter(|message| {
            matches!(
                message,
                ServerMessage::GuessExecuted {
                    is_game_over: true,
                    winner: Some(TeamColor::Red),
                    ..
                }
            )
        })
        .count();
    assert_eq!(game_overs, 1);

    let handle = state.registry().get(CODE).unwrap();
    let game = handle.lock().await;
    assert_eq!(game.status(), MatchStatus::Over);
    let mut positions: Vec<u8> = game.guesses().iter().map(|entry| entry.position).collect();
    positions.sort_unstable();
    positions.dedup();
    assert_eq!(positions, (0..=8).collect::<Vec<u8>>());
    assert_eq!(game.guesses().len(), 9);
}
