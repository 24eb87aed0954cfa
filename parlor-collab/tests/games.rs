//! Integration tests for game session lifecycle, capacity, scoring, and
//! invitations, driven against the in-memory store.

use std::sync::Arc;

use parlor_collab::{
    Collab, Database, DatabaseError, GameError, LogNotifier, MemoryDatabase, NewGame,
    NewRoomParams, PartyEvent, SessionStatus, UserData, Visibility,
};

/// Seats `names` in a fresh room (first one hosts) with a 2-4 player game
/// in the catalog.
async fn setup(names: &[&str]) -> (Collab, Arc<MemoryDatabase>, Vec<UserData>, i32, i32) {
    let database = Arc::new(MemoryDatabase::new());
    let mut users = Vec::new();

    for name in names {
        let user = database
            .create_user(parlor_collab::NewUser {
                username: name.to_string(),
                display_name: name.to_string(),
            })
            .await
            .unwrap();

        users.push(user);
    }

    let game = database
        .create_game(NewGame {
            name: "Charades".to_string(),
            min_players: 2,
            max_players: 4,
        })
        .await
        .unwrap();

    let collab = Collab::new(database.clone(), Arc::new(LogNotifier));

    let room = collab
        .rooms
        .create_room(NewRoomParams {
            name: "game-night".to_string(),
            visibility: Visibility::Public,
            host_id: users[0].id,
        })
        .await
        .unwrap();

    for user in users.iter().skip(1) {
        collab.rooms.join_room(user.id, room.id).await.unwrap();
    }

    (collab, database, users, room.id, game.id)
}

#[tokio::test]
async fn create_session_seats_creator() {
    let (collab, _, users, room_id, game_id) = setup(&["alice", "bob"]).await;

    let details = collab
        .games
        .create_session(game_id, room_id, users[0].id)
        .await
        .unwrap();

    assert_eq!(details.session.status, SessionStatus::Active);
    assert_eq!(details.participants.len(), 1);
    assert_eq!(details.participants[0].user.id, users[0].id);
    assert_eq!(details.participants[0].score, 0);
}

#[tokio::test]
async fn create_session_requires_room_membership() {
    let (collab, database, users, room_id, game_id) = setup(&["alice"]).await;

    let outsider = database
        .create_user(parlor_collab::NewUser {
            username: "mallory".to_string(),
            display_name: "Mallory".to_string(),
        })
        .await
        .unwrap();

    let err = collab
        .games
        .create_session(game_id, room_id, outsider.id)
        .await
        .unwrap_err();

    assert!(matches!(err, GameError::NotInRoom));

    // A member who already left the room is out too
    collab
        .rooms
        .leave_room(users[0].id, room_id, parlor_collab::LeaveReason::Left)
        .await
        .unwrap();

    let err = collab
        .games
        .create_session(game_id, room_id, users[0].id)
        .await
        .unwrap_err();

    assert!(matches!(err, GameError::NotInRoom));
}

#[tokio::test]
async fn one_active_session_per_room_and_game() {
    let (collab, database, users, room_id, game_id) = setup(&["alice", "bob"]).await;

    let first = collab
        .games
        .create_session(game_id, room_id, users[0].id)
        .await
        .unwrap();

    let err = collab
        .games
        .create_session(game_id, room_id, users[1].id)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        GameError::Db(DatabaseError::Conflict { .. })
    ));

    // A different game can run alongside
    let other_game = database
        .create_game(NewGame {
            name: "Trivia".to_string(),
            min_players: 1,
            max_players: 8,
        })
        .await
        .unwrap();

    collab
        .games
        .create_session(other_game.id, room_id, users[1].id)
        .await
        .unwrap();

    // And ending the first frees the slot for its game
    collab
        .games
        .end_session(first.session.id, users[0].id)
        .await
        .unwrap();

    collab
        .games
        .create_session(game_id, room_id, users[0].id)
        .await
        .unwrap();
}

#[tokio::test]
async fn capacity_is_bounded_by_max_players() {
    let (collab, _, users, room_id, game_id) =
        setup(&["alice", "bob", "carol", "dave", "erin"]).await;

    let details = collab
        .games
        .create_session(game_id, room_id, users[0].id)
        .await
        .unwrap();
    let session_id = details.session.id;

    // Seats 2 through 4 fill up
    for user in &users[1..4] {
        collab.games.join_session(session_id, user.id).await.unwrap();
    }

    let details = collab.games.session_details(session_id).await.unwrap();
    assert_eq!(details.participants.len(), 4);

    // The fifth distinct player is turned away
    let err = collab
        .games
        .join_session(session_id, users[4].id)
        .await
        .unwrap_err();

    assert!(matches!(err, GameError::GameFull));
}

#[tokio::test]
async fn join_session_is_idempotent() {
    let (collab, _, users, room_id, game_id) = setup(&["alice", "bob"]).await;

    let details = collab
        .games
        .create_session(game_id, room_id, users[0].id)
        .await
        .unwrap();
    let session_id = details.session.id;

    collab
        .games
        .join_session(session_id, users[1].id)
        .await
        .unwrap();
    let details = collab
        .games
        .join_session(session_id, users[1].id)
        .await
        .unwrap();

    assert_eq!(details.participants.len(), 2);
}

#[tokio::test]
async fn join_session_requires_room_membership() {
    let (collab, database, users, room_id, game_id) = setup(&["alice"]).await;

    let details = collab
        .games
        .create_session(game_id, room_id, users[0].id)
        .await
        .unwrap();

    let outsider = database
        .create_user(parlor_collab::NewUser {
            username: "mallory".to_string(),
            display_name: "Mallory".to_string(),
        })
        .await
        .unwrap();

    let err = collab
        .games
        .join_session(details.session.id, outsider.id)
        .await
        .unwrap_err();

    assert!(matches!(err, GameError::NotInRoom));
}

#[tokio::test]
async fn score_deltas_accumulate_and_commute() {
    let (collab, _, users, room_id, game_id) = setup(&["alice", "bob"]).await;

    let details = collab
        .games
        .create_session(game_id, room_id, users[0].id)
        .await
        .unwrap();
    let session_id = details.session.id;

    collab
        .games
        .join_session(session_id, users[1].id)
        .await
        .unwrap();

    for delta in [5, -2, 3] {
        collab
            .games
            .update_score(session_id, users[0].id, delta)
            .await
            .unwrap();
    }

    // Same deltas, different order, same total
    for delta in [3, 5, -2] {
        collab
            .games
            .update_score(session_id, users[1].id, delta)
            .await
            .unwrap();
    }

    let details = collab.games.session_details(session_id).await.unwrap();

    for participant in &details.participants {
        assert_eq!(participant.score, 6);
    }
}

#[tokio::test]
async fn score_requires_an_open_seat() {
    let (collab, _, users, room_id, game_id) = setup(&["alice", "bob"]).await;

    let details = collab
        .games
        .create_session(game_id, room_id, users[0].id)
        .await
        .unwrap();

    // Bob is in the room but never took a seat
    let err = collab
        .games
        .update_score(details.session.id, users[1].id, 5)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        GameError::Db(DatabaseError::NotFound { .. })
    ));
}

#[tokio::test]
async fn last_leaver_completes_the_session() {
    let (collab, database, users, room_id, game_id) = setup(&["alice"]).await;

    let details = collab
        .games
        .create_session(game_id, room_id, users[0].id)
        .await
        .unwrap();
    let session_id = details.session.id;

    let events = collab.events();
    while events.try_recv().is_ok() {}

    assert!(collab
        .games
        .leave_session(session_id, users[0].id)
        .await
        .unwrap());

    let session = database.game_session_by_id(session_id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert!(session.ended_at.is_some());

    let observed: Vec<_> = events.try_iter().collect();
    assert!(observed
        .iter()
        .any(|e| matches!(e, PartyEvent::GameEnded { .. })));

    // Ending an already completed session is a domain error
    let err = collab
        .games
        .end_session(session_id, users[0].id)
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::AlreadyEnded));

    // And a further leave is a no-op signal
    assert!(!collab
        .games
        .leave_session(session_id, users[0].id)
        .await
        .unwrap());
}

#[tokio::test]
async fn ending_forces_every_seat_out() {
    let (collab, database, users, room_id, game_id) = setup(&["alice", "bob", "carol"]).await;

    let details = collab
        .games
        .create_session(game_id, room_id, users[1].id)
        .await
        .unwrap();
    let session_id = details.session.id;

    collab
        .games
        .join_session(session_id, users[2].id)
        .await
        .unwrap();

    // Carol is neither creator nor host
    let err = collab
        .games
        .end_session(session_id, users[2].id)
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::NotAllowed));

    // The room host may end a session they did not create
    let completed = collab
        .games
        .end_session(session_id, users[0].id)
        .await
        .unwrap();

    assert_eq!(completed.status, SessionStatus::Completed);
    assert!(database
        .open_participants(session_id)
        .await
        .unwrap()
        .is_empty());

    // Joining after the end is refused
    let err = collab
        .games
        .join_session(session_id, users[2].id)
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::SessionNotActive));
}

#[tokio::test]
async fn invites_notify_without_mutating() {
    let (collab, database, users, room_id, game_id) = setup(&["alice", "bob", "carol"]).await;
    let (alice, bob, carol) = (&users[0], &users[1], &users[2]);

    let details = collab
        .games
        .create_session(game_id, room_id, alice.id)
        .await
        .unwrap();
    let session_id = details.session.id;

    let events = collab.events();
    while events.try_recv().is_ok() {}

    // Only seated players invite
    let err = collab
        .games
        .invite(session_id, bob.id, carol.id)
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::NotInSession));

    // The invitee must be in the room
    let outsider = database
        .create_user(parlor_collab::NewUser {
            username: "mallory".to_string(),
            display_name: "Mallory".to_string(),
        })
        .await
        .unwrap();

    let err = collab
        .games
        .invite(session_id, alice.id, outsider.id)
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::NotInRoom));

    collab.games.invite(session_id, alice.id, carol.id).await.unwrap();

    // Purely a notify action: the seat count did not change
    let details = collab.games.session_details(session_id).await.unwrap();
    assert_eq!(details.participants.len(), 1);

    let observed: Vec<_> = events.try_iter().collect();
    assert!(observed.iter().any(|e| matches!(
        e,
        PartyEvent::GameInvite { invitee_id, .. } if *invitee_id == carol.id
    )));

    // Already seated players cannot be invited again
    collab.games.join_session(session_id, carol.id).await.unwrap();
    let err = collab
        .games
        .invite(session_id, alice.id, carol.id)
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::AlreadyInSession));
}
