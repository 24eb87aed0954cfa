//! Integration tests for room membership and the locked-room join
//! request workflow, driven against the in-memory store.

use std::sync::Arc;

use chrono::{Duration, Utc};
use parlor_collab::{
    Collab, Database, DatabaseError, EventReceiver, LeaveReason, LogNotifier, MemoryDatabase,
    NewRoomParams, NewSession, NewUser, PartyEvent, RequestStatus, RoomError, RoomPatch, UserData,
    Visibility,
};

async fn collab_with_users(names: &[&str]) -> (Collab, Arc<MemoryDatabase>, Vec<UserData>) {
    let database = Arc::new(MemoryDatabase::new());
    let mut users = Vec::new();

    for name in names {
        let user = database
            .create_user(NewUser {
                username: name.to_string(),
                display_name: name.to_string(),
            })
            .await
            .unwrap();

        users.push(user);
    }

    let collab = Collab::new(database.clone(), Arc::new(LogNotifier));

    (collab, database, users)
}

fn new_room(name: &str, host_id: i32) -> NewRoomParams {
    NewRoomParams {
        name: name.to_string(),
        visibility: Visibility::Public,
        host_id,
    }
}

fn drain(receiver: &EventReceiver) -> Vec<PartyEvent> {
    receiver.try_iter().collect()
}

fn lock_patch(locked: bool) -> RoomPatch {
    RoomPatch {
        name: None,
        visibility: None,
        is_locked: Some(locked),
    }
}

#[tokio::test]
async fn create_room_seats_host() {
    let (collab, _, users) = collab_with_users(&["alice"]).await;
    let alice = &users[0];

    let room = collab
        .rooms
        .create_room(new_room("game-night", alice.id))
        .await
        .unwrap();

    let details = collab.rooms.room_details(room.id).await.unwrap();

    assert_eq!(details.host.id, alice.id);
    assert_eq!(details.participants.len(), 1);
    assert_eq!(details.participants[0].user.id, alice.id);
    assert!(!details.room.is_locked);
}

#[tokio::test]
async fn room_name_is_unique_per_host() {
    let (collab, _, users) = collab_with_users(&["alice", "bob"]).await;

    collab
        .rooms
        .create_room(new_room("game-night", users[0].id))
        .await
        .unwrap();

    let err = collab
        .rooms
        .create_room(new_room("game-night", users[0].id))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RoomError::Db(DatabaseError::Conflict { .. })
    ));

    // A different host is free to reuse the name
    collab
        .rooms
        .create_room(new_room("game-night", users[1].id))
        .await
        .unwrap();
}

#[tokio::test]
async fn empty_room_name_is_rejected() {
    let (collab, _, users) = collab_with_users(&["alice"]).await;

    let err = collab
        .rooms
        .create_room(new_room("   ", users[0].id))
        .await
        .unwrap_err();

    assert!(matches!(err, RoomError::Validation(_)));
}

#[tokio::test]
async fn join_room_is_idempotent() {
    let (collab, _, users) = collab_with_users(&["alice", "bob"]).await;
    let bob = &users[1];

    let room = collab
        .rooms
        .create_room(new_room("game-night", users[0].id))
        .await
        .unwrap();

    let events = collab.events();
    drain(&events);

    let first = collab.rooms.join_room(bob.id, room.id).await.unwrap();
    let second = collab.rooms.join_room(bob.id, room.id).await.unwrap();

    assert_eq!(first.joined_at, second.joined_at);

    let details = collab.rooms.room_details(room.id).await.unwrap();
    let bobs = details
        .participants
        .iter()
        .filter(|p| p.user.id == bob.id)
        .count();

    assert_eq!(details.participants.len(), 2);
    assert_eq!(bobs, 1);

    // Only the first call actually changed state, so only one echo
    let joins = drain(&events)
        .into_iter()
        .filter(|e| matches!(e, PartyEvent::UserJoinedRoom { .. }))
        .count();

    assert_eq!(joins, 1);
}

#[tokio::test]
async fn leave_and_rejoin_flip_one_membership_row() {
    let (collab, database, users) = collab_with_users(&["alice", "bob"]).await;
    let bob = &users[1];

    let room = collab
        .rooms
        .create_room(new_room("game-night", users[0].id))
        .await
        .unwrap();

    collab.rooms.join_room(bob.id, room.id).await.unwrap();

    assert!(collab
        .rooms
        .leave_room(bob.id, room.id, LeaveReason::Left)
        .await
        .unwrap());

    let row = database.participant(room.id, bob.id).await.unwrap();
    assert!(!row.is_active);
    assert!(row.left_at.is_some());

    collab.rooms.join_room(bob.id, room.id).await.unwrap();

    let row = database.participant(room.id, bob.id).await.unwrap();
    assert!(row.is_active);
    assert!(row.left_at.is_none());

    assert!(collab
        .rooms
        .leave_room(bob.id, room.id, LeaveReason::Left)
        .await
        .unwrap());

    // Leaving again is a no-op signal, not an error
    assert!(!collab
        .rooms
        .leave_room(bob.id, room.id, LeaveReason::Left)
        .await
        .unwrap());

    let details = collab.rooms.room_details(room.id).await.unwrap();
    assert_eq!(details.participants.len(), 1);
}

#[tokio::test]
async fn locked_room_admission_flow() {
    let (collab, database, users) = collab_with_users(&["alice", "bob", "carol"]).await;
    let (alice, bob, carol) = (&users[0], &users[1], &users[2]);

    let room = collab
        .rooms
        .create_room(new_room("game-night", alice.id))
        .await
        .unwrap();

    collab.rooms.join_room(bob.id, room.id).await.unwrap();

    let details = collab.rooms.room_details(room.id).await.unwrap();
    assert_eq!(details.participants.len(), 2);

    collab
        .rooms
        .update_room(room.id, lock_patch(true), alice.id)
        .await
        .unwrap();

    let err = collab.rooms.join_room(carol.id, room.id).await.unwrap_err();
    assert!(matches!(err, RoomError::RoomLocked));

    let request = collab
        .rooms
        .create_join_request(carol.id, room.id)
        .await
        .unwrap();
    assert_eq!(request.status, RequestStatus::Pending);

    let resolved = collab
        .rooms
        .resolve_join_request(request.id, true, alice.id)
        .await
        .unwrap();
    assert_eq!(resolved.status, RequestStatus::Accepted);

    collab.rooms.join_room(carol.id, room.id).await.unwrap();

    let details = collab.rooms.room_details(room.id).await.unwrap();
    assert_eq!(details.participants.len(), 3);

    // The accepted request was consumed by the join
    let err = database.accepted_request(room.id, carol.id).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn host_joins_own_locked_room_freely() {
    let (collab, _, users) = collab_with_users(&["alice"]).await;
    let alice = &users[0];

    let room = collab
        .rooms
        .create_room(new_room("game-night", alice.id))
        .await
        .unwrap();

    collab
        .rooms
        .update_room(room.id, lock_patch(true), alice.id)
        .await
        .unwrap();

    collab
        .rooms
        .leave_room(alice.id, room.id, LeaveReason::Left)
        .await
        .unwrap();

    collab.rooms.join_room(alice.id, room.id).await.unwrap();
}

#[tokio::test]
async fn only_pending_requests_resolve_and_only_once() {
    let (collab, _, users) = collab_with_users(&["alice", "bob", "carol"]).await;
    let (alice, bob, carol) = (&users[0], &users[1], &users[2]);

    let room = collab
        .rooms
        .create_room(new_room("game-night", alice.id))
        .await
        .unwrap();

    collab
        .rooms
        .update_room(room.id, lock_patch(true), alice.id)
        .await
        .unwrap();

    let request = collab
        .rooms
        .create_join_request(carol.id, room.id)
        .await
        .unwrap();

    // A second request while one is pending conflicts
    let err = collab
        .rooms
        .create_join_request(carol.id, room.id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RoomError::Db(DatabaseError::Conflict { .. })
    ));

    // Only the host resolves requests
    let err = collab
        .rooms
        .resolve_join_request(request.id, true, bob.id)
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::NotHost));

    collab
        .rooms
        .resolve_join_request(request.id, false, alice.id)
        .await
        .unwrap();

    let err = collab
        .rooms
        .resolve_join_request(request.id, true, alice.id)
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::RequestAlreadyResolved));
}

#[tokio::test]
async fn update_room_requires_host() {
    let (collab, _, users) = collab_with_users(&["alice", "bob"]).await;

    let room = collab
        .rooms
        .create_room(new_room("game-night", users[0].id))
        .await
        .unwrap();

    let err = collab
        .rooms
        .update_room(room.id, lock_patch(true), users[1].id)
        .await
        .unwrap_err();

    assert!(matches!(err, RoomError::NotHost));
}

#[tokio::test]
async fn admission_predicate() {
    let (collab, _, users) = collab_with_users(&["alice", "bob", "carol"]).await;
    let (alice, bob, carol) = (&users[0], &users[1], &users[2]);

    let room = collab
        .rooms
        .create_room(new_room("game-night", alice.id))
        .await
        .unwrap();

    // Unlocked rooms admit anyone
    assert!(collab
        .rooms
        .can_user_join_room(carol.id, room.id)
        .await
        .unwrap());

    collab.rooms.join_room(bob.id, room.id).await.unwrap();
    collab
        .rooms
        .update_room(room.id, lock_patch(true), alice.id)
        .await
        .unwrap();

    // Host and current members stay admitted after locking
    assert!(collab
        .rooms
        .can_user_join_room(alice.id, room.id)
        .await
        .unwrap());
    assert!(collab
        .rooms
        .can_user_join_room(bob.id, room.id)
        .await
        .unwrap());

    assert!(!collab
        .rooms
        .can_user_join_room(carol.id, room.id)
        .await
        .unwrap());

    let request = collab
        .rooms
        .create_join_request(carol.id, room.id)
        .await
        .unwrap();
    collab
        .rooms
        .resolve_join_request(request.id, true, alice.id)
        .await
        .unwrap();

    assert!(collab
        .rooms
        .can_user_join_room(carol.id, room.id)
        .await
        .unwrap());
}

#[tokio::test]
async fn disconnect_settles_like_explicit_leaves() {
    let (collab, database, users) = collab_with_users(&["alice", "bob", "carol"]).await;
    let (alice, bob, carol) = (&users[0], &users[1], &users[2]);

    let first = collab
        .rooms
        .create_room(new_room("game-night", alice.id))
        .await
        .unwrap();
    let second = collab
        .rooms
        .create_room(new_room("movie-night", bob.id))
        .await
        .unwrap();

    collab.rooms.join_room(carol.id, first.id).await.unwrap();
    collab.rooms.join_room(carol.id, second.id).await.unwrap();

    let events = collab.events();
    drain(&events);

    let left = collab
        .rooms
        .leave_all_rooms(carol.id, LeaveReason::Disconnected)
        .await
        .unwrap();

    assert_eq!(left, vec![first.id, second.id]);
    assert!(database
        .active_rooms_for_user(carol.id)
        .await
        .unwrap()
        .is_empty());

    // Remaining members observe the same user-left event an explicit
    // leave would produce, tagged with the disconnect reason.
    let reasons: Vec<_> = drain(&events)
        .into_iter()
        .filter_map(|e| match e {
            PartyEvent::UserLeftRoom { user_id, reason, .. } if user_id == carol.id => {
                Some(reason)
            }
            _ => None,
        })
        .collect();

    assert_eq!(reasons, vec![LeaveReason::Disconnected; 2]);
}

#[tokio::test]
async fn room_events_follow_commit_order() {
    let (collab, _, users) = collab_with_users(&["alice", "bob"]).await;
    let (alice, bob) = (&users[0], &users[1]);

    let room = collab
        .rooms
        .create_room(new_room("game-night", alice.id))
        .await
        .unwrap();

    let events = collab.events();
    drain(&events);

    collab.rooms.join_room(bob.id, room.id).await.unwrap();
    collab
        .rooms
        .leave_room(bob.id, room.id, LeaveReason::Left)
        .await
        .unwrap();

    let observed = drain(&events);

    assert!(matches!(
        observed[0],
        PartyEvent::UserJoinedRoom { room_id, .. } if room_id == room.id
    ));
    assert!(matches!(
        observed[1],
        PartyEvent::UserLeftRoom { room_id, user_id, .. }
            if room_id == room.id && user_id == bob.id
    ));
}

#[tokio::test]
async fn session_tokens_resolve_until_expiry() {
    let (collab, database, users) = collab_with_users(&["alice"]).await;
    let alice = &users[0];

    let token = parlor_collab::random_string(32);
    database
        .create_session(NewSession {
            token: token.clone(),
            user_id: alice.id,
            expires_at: Utc::now() + Duration::days(7),
        })
        .await
        .unwrap();

    let session = collab.session(&token).await.unwrap();
    assert_eq!(session.user.id, alice.id);

    let stale = parlor_collab::random_string(32);
    database
        .create_session(NewSession {
            token: stale.clone(),
            user_id: alice.id,
            expires_at: Utc::now() - Duration::minutes(1),
        })
        .await
        .unwrap();

    assert!(collab.session(&stale).await.unwrap_err().is_not_found());
}
