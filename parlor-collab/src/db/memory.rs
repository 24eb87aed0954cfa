use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::{
    Database, DatabaseError, DatabaseResult, GameData, GameParticipantData, GameSessionData,
    JoinRequestData, NewGame, NewGameSession, NewJoinRequest, NewRoom, NewSession, NewUser,
    PrimaryKey, RequestStatus, Result, RoomData, RoomParticipantData, SessionData, SessionStatus,
    UpdatedRoom, UserData,
};

/// An in-memory database implementation.
///
/// Backs the test suites and local development without a running postgres
/// instance. Behaves like [crate::PgDatabase]: same uniqueness rules, same
/// error values, same all-or-nothing multi-row writes.
#[derive(Default)]
pub struct MemoryDatabase {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    next_id: PrimaryKey,
    users: Vec<UserData>,
    sessions: Vec<StoredSession>,
    games: Vec<GameData>,
    rooms: Vec<RoomData>,
    participants: Vec<StoredParticipant>,
    requests: Vec<JoinRequestData>,
    game_sessions: Vec<GameSessionData>,
    game_participants: Vec<StoredGameParticipant>,
}

struct StoredSession {
    id: PrimaryKey,
    token: String,
    user_id: PrimaryKey,
    expires_at: DateTime<Utc>,
}

#[derive(Clone)]
struct StoredParticipant {
    id: PrimaryKey,
    room_id: PrimaryKey,
    user_id: PrimaryKey,
    joined_at: DateTime<Utc>,
    left_at: Option<DateTime<Utc>>,
    is_active: bool,
}

#[derive(Clone)]
struct StoredGameParticipant {
    id: PrimaryKey,
    session_id: PrimaryKey,
    user_id: PrimaryKey,
    score: i32,
    joined_at: DateTime<Utc>,
    left_at: Option<DateTime<Utc>>,
}

fn not_found(resource: &'static str, identifier: &'static str) -> DatabaseError {
    DatabaseError::NotFound {
        resource,
        identifier,
    }
}

impl State {
    fn alloc(&mut self) -> PrimaryKey {
        self.next_id += 1;
        self.next_id
    }

    fn user(&self, user_id: PrimaryKey) -> Result<UserData> {
        self.users
            .iter()
            .find(|u| u.id == user_id)
            .cloned()
            .ok_or_else(|| not_found("user", "id"))
    }

    fn participant_data(&self, stored: &StoredParticipant) -> Result<RoomParticipantData> {
        Ok(RoomParticipantData {
            id: stored.id,
            room_id: stored.room_id,
            joined_at: stored.joined_at,
            left_at: stored.left_at,
            is_active: stored.is_active,
            user: self.user(stored.user_id)?,
        })
    }

    fn game_participant_data(
        &self,
        stored: &StoredGameParticipant,
    ) -> Result<GameParticipantData> {
        Ok(GameParticipantData {
            id: stored.id,
            session_id: stored.session_id,
            score: stored.score,
            joined_at: stored.joined_at,
            left_at: stored.left_at,
            user: self.user(stored.user_id)?,
        })
    }

    fn participant(
        &self,
        room_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<RoomParticipantData> {
        let stored = self
            .participants
            .iter()
            .find(|p| p.room_id == room_id && p.user_id == user_id)
            .ok_or_else(|| not_found("room participant", "room:user"))?;

        self.participant_data(stored)
    }

    fn open_participant(
        &self,
        session_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<GameParticipantData> {
        let stored = self
            .game_participants
            .iter()
            .find(|p| p.session_id == session_id && p.user_id == user_id && p.left_at.is_none())
            .ok_or_else(|| not_found("game participant", "session:user"))?;

        self.game_participant_data(stored)
    }
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        self.state.lock().user(user_id)
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        let mut state = self.state.lock();

        if state.users.iter().any(|u| u.username == new_user.username) {
            return Err(DatabaseError::Conflict {
                resource: "user",
                field: "username",
                value: new_user.username,
            });
        }

        let user = UserData {
            id: state.alloc(),
            username: new_user.username,
            display_name: new_user.display_name,
        };

        state.users.push(user.clone());
        Ok(user)
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        let state = self.state.lock();

        let stored = state
            .sessions
            .iter()
            .find(|s| s.token == token && s.expires_at > Utc::now())
            .ok_or_else(|| not_found("session", "token"))?;

        Ok(SessionData {
            id: stored.id,
            token: stored.token.clone(),
            expires_at: stored.expires_at,
            user: state.user(stored.user_id)?,
        })
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        self.session_by_token(&new_session.token)
            .await
            .conflict_or_ok("session", "token", &new_session.token)?;

        let mut state = self.state.lock();
        let user = state.user(new_session.user_id)?;

        let id = state.alloc();
        state.sessions.push(StoredSession {
            id,
            token: new_session.token.clone(),
            user_id: new_session.user_id,
            expires_at: new_session.expires_at,
        });

        Ok(SessionData {
            id,
            token: new_session.token,
            expires_at: new_session.expires_at,
            user,
        })
    }

    async fn game_by_id(&self, game_id: PrimaryKey) -> Result<GameData> {
        self.state
            .lock()
            .games
            .iter()
            .find(|g| g.id == game_id)
            .cloned()
            .ok_or_else(|| not_found("game", "id"))
    }

    async fn list_games(&self) -> Result<Vec<GameData>> {
        Ok(self.state.lock().games.clone())
    }

    async fn create_game(&self, new_game: NewGame) -> Result<GameData> {
        let mut state = self.state.lock();

        let game = GameData {
            id: state.alloc(),
            name: new_game.name,
            min_players: new_game.min_players,
            max_players: new_game.max_players,
        };

        state.games.push(game.clone());
        Ok(game)
    }

    async fn room_by_id(&self, room_id: PrimaryKey) -> Result<RoomData> {
        self.state
            .lock()
            .rooms
            .iter()
            .find(|r| r.id == room_id)
            .cloned()
            .ok_or_else(|| not_found("room", "id"))
    }

    async fn room_by_name_and_host(&self, name: &str, host_id: PrimaryKey) -> Result<RoomData> {
        self.state
            .lock()
            .rooms
            .iter()
            .find(|r| r.name == name && r.host_id == host_id)
            .cloned()
            .ok_or_else(|| not_found("room", "name"))
    }

    async fn list_rooms(&self) -> Result<Vec<RoomData>> {
        Ok(self.state.lock().rooms.clone())
    }

    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData> {
        let mut state = self.state.lock();

        if state
            .rooms
            .iter()
            .any(|r| r.name == new_room.name && r.host_id == new_room.host_id)
        {
            return Err(DatabaseError::Conflict {
                resource: "room",
                field: "name",
                value: new_room.name,
            });
        }

        // Referential integrity first, so neither row is written on failure
        state.user(new_room.host_id)?;

        let room = RoomData {
            id: state.alloc(),
            name: new_room.name,
            visibility: new_room.visibility,
            is_locked: false,
            host_id: new_room.host_id,
            created_at: Utc::now(),
        };

        let participant_id = state.alloc();
        state.participants.push(StoredParticipant {
            id: participant_id,
            room_id: room.id,
            user_id: new_room.host_id,
            joined_at: Utc::now(),
            left_at: None,
            is_active: true,
        });

        state.rooms.push(room.clone());
        Ok(room)
    }

    async fn update_room(&self, updated_room: UpdatedRoom) -> Result<RoomData> {
        let mut state = self.state.lock();

        let room = state
            .rooms
            .iter_mut()
            .find(|r| r.id == updated_room.id)
            .ok_or_else(|| not_found("room", "id"))?;

        if let Some(name) = updated_room.name {
            room.name = name;
        }
        if let Some(visibility) = updated_room.visibility {
            room.visibility = visibility;
        }
        if let Some(is_locked) = updated_room.is_locked {
            room.is_locked = is_locked;
        }

        Ok(room.clone())
    }

    async fn participant(
        &self,
        room_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<RoomParticipantData> {
        self.state.lock().participant(room_id, user_id)
    }

    async fn active_participants(&self, room_id: PrimaryKey) -> Result<Vec<RoomParticipantData>> {
        let state = self.state.lock();

        let mut active: Vec<_> = state
            .participants
            .iter()
            .filter(|p| p.room_id == room_id && p.is_active)
            .cloned()
            .collect();

        active.sort_by_key(|p| (p.joined_at, p.id));

        active
            .iter()
            .map(|p| state.participant_data(p))
            .collect()
    }

    async fn count_active_participants(&self, room_id: PrimaryKey) -> Result<i64> {
        Ok(self
            .state
            .lock()
            .participants
            .iter()
            .filter(|p| p.room_id == room_id && p.is_active)
            .count() as i64)
    }

    async fn insert_participant(
        &self,
        room_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<RoomParticipantData> {
        let mut state = self.state.lock();

        if state
            .participants
            .iter()
            .any(|p| p.room_id == room_id && p.user_id == user_id)
        {
            return Err(DatabaseError::Conflict {
                resource: "room participant",
                field: "room:user",
                value: format!("{}:{}", room_id, user_id),
            });
        }

        state.user(user_id)?;

        let id = state.alloc();
        let stored = StoredParticipant {
            id,
            room_id,
            user_id,
            joined_at: Utc::now(),
            left_at: None,
            is_active: true,
        };

        state.participants.push(stored.clone());
        state.participant_data(&stored)
    }

    async fn reactivate_participant(
        &self,
        room_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<RoomParticipantData> {
        let mut state = self.state.lock();

        let stored = state
            .participants
            .iter_mut()
            .find(|p| p.room_id == room_id && p.user_id == user_id)
            .ok_or_else(|| not_found("room participant", "room:user"))?;

        stored.is_active = true;
        stored.left_at = None;
        stored.joined_at = Utc::now();

        let stored = stored.clone();
        state.participant_data(&stored)
    }

    async fn deactivate_participant(
        &self,
        room_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<RoomParticipantData> {
        let mut state = self.state.lock();

        let stored = state
            .participants
            .iter_mut()
            .find(|p| p.room_id == room_id && p.user_id == user_id && p.is_active)
            .ok_or_else(|| not_found("room participant", "room:user"))?;

        stored.is_active = false;
        stored.left_at = Some(Utc::now());

        let stored = stored.clone();
        state.participant_data(&stored)
    }

    async fn active_rooms_for_user(&self, user_id: PrimaryKey) -> Result<Vec<RoomData>> {
        let state = self.state.lock();

        Ok(state
            .rooms
            .iter()
            .filter(|r| {
                state
                    .participants
                    .iter()
                    .any(|p| p.room_id == r.id && p.user_id == user_id && p.is_active)
            })
            .cloned()
            .collect())
    }

    async fn join_request_by_id(&self, request_id: PrimaryKey) -> Result<JoinRequestData> {
        self.state
            .lock()
            .requests
            .iter()
            .find(|r| r.id == request_id)
            .cloned()
            .ok_or_else(|| not_found("join request", "id"))
    }

    async fn pending_request(
        &self,
        room_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<JoinRequestData> {
        self.state
            .lock()
            .requests
            .iter()
            .find(|r| {
                r.room_id == room_id && r.user_id == user_id && r.status == RequestStatus::Pending
            })
            .cloned()
            .ok_or_else(|| not_found("join request", "room:user"))
    }

    async fn accepted_request(
        &self,
        room_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<JoinRequestData> {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|r| {
                r.room_id == room_id && r.user_id == user_id && r.status == RequestStatus::Accepted
            })
            .max_by_key(|r| r.created_at)
            .cloned()
            .ok_or_else(|| not_found("join request", "room:user"))
    }

    async fn create_join_request(&self, new_request: NewJoinRequest) -> Result<JoinRequestData> {
        self.pending_request(new_request.room_id, new_request.user_id)
            .await
            .conflict_or_ok(
                "join request",
                "room:user",
                format!("{}:{}", new_request.room_id, new_request.user_id).as_str(),
            )?;

        let mut state = self.state.lock();
        state.user(new_request.user_id)?;

        let request = JoinRequestData {
            id: state.alloc(),
            room_id: new_request.room_id,
            user_id: new_request.user_id,
            status: RequestStatus::Pending,
            created_at: Utc::now(),
        };

        state.requests.push(request.clone());
        Ok(request)
    }

    async fn set_request_status(
        &self,
        request_id: PrimaryKey,
        status: RequestStatus,
    ) -> Result<JoinRequestData> {
        let mut state = self.state.lock();

        let request = state
            .requests
            .iter_mut()
            .find(|r| r.id == request_id)
            .ok_or_else(|| not_found("join request", "id"))?;

        request.status = status;
        Ok(request.clone())
    }

    async fn delete_join_request(&self, request_id: PrimaryKey) -> Result<()> {
        self.state.lock().requests.retain(|r| r.id != request_id);
        Ok(())
    }

    async fn game_session_by_id(&self, session_id: PrimaryKey) -> Result<GameSessionData> {
        self.state
            .lock()
            .game_sessions
            .iter()
            .find(|s| s.id == session_id)
            .cloned()
            .ok_or_else(|| not_found("game session", "id"))
    }

    async fn active_session_for_game(
        &self,
        room_id: PrimaryKey,
        game_id: PrimaryKey,
    ) -> Result<GameSessionData> {
        self.state
            .lock()
            .game_sessions
            .iter()
            .find(|s| {
                s.room_id == room_id && s.game_id == game_id && s.status == SessionStatus::Active
            })
            .cloned()
            .ok_or_else(|| not_found("game session", "room:game"))
    }

    async fn active_sessions_for_room(
        &self,
        room_id: PrimaryKey,
    ) -> Result<Vec<GameSessionData>> {
        Ok(self
            .state
            .lock()
            .game_sessions
            .iter()
            .filter(|s| s.room_id == room_id && s.status == SessionStatus::Active)
            .cloned()
            .collect())
    }

    async fn create_game_session(&self, new_session: NewGameSession) -> Result<GameSessionData> {
        self.active_session_for_game(new_session.room_id, new_session.game_id)
            .await
            .conflict_or_ok(
                "game session",
                "room:game",
                format!("{}:{}", new_session.room_id, new_session.game_id).as_str(),
            )?;

        let mut state = self.state.lock();
        state.user(new_session.created_by)?;

        let session = GameSessionData {
            id: state.alloc(),
            room_id: new_session.room_id,
            game_id: new_session.game_id,
            status: SessionStatus::Active,
            created_by: new_session.created_by,
            started_at: Utc::now(),
            ended_at: None,
        };

        let participant_id = state.alloc();
        state.game_participants.push(StoredGameParticipant {
            id: participant_id,
            session_id: session.id,
            user_id: new_session.created_by,
            score: 0,
            joined_at: Utc::now(),
            left_at: None,
        });

        state.game_sessions.push(session.clone());
        Ok(session)
    }

    async fn complete_game_session(&self, session_id: PrimaryKey) -> Result<GameSessionData> {
        let mut state = self.state.lock();
        let now = Utc::now();

        let session = state
            .game_sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or_else(|| not_found("game session", "id"))?;

        session.status = SessionStatus::Completed;
        session.ended_at = Some(now);
        let session = session.clone();

        for participant in state
            .game_participants
            .iter_mut()
            .filter(|p| p.session_id == session_id && p.left_at.is_none())
        {
            participant.left_at = Some(now);
        }

        Ok(session)
    }

    async fn open_participant(
        &self,
        session_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<GameParticipantData> {
        self.state.lock().open_participant(session_id, user_id)
    }

    async fn open_participants(&self, session_id: PrimaryKey) -> Result<Vec<GameParticipantData>> {
        let state = self.state.lock();

        let mut open: Vec<_> = state
            .game_participants
            .iter()
            .filter(|p| p.session_id == session_id && p.left_at.is_none())
            .cloned()
            .collect();

        open.sort_by_key(|p| (p.joined_at, p.id));

        open.iter()
            .map(|p| state.game_participant_data(p))
            .collect()
    }

    async fn count_open_participants(&self, session_id: PrimaryKey) -> Result<i64> {
        Ok(self
            .state
            .lock()
            .game_participants
            .iter()
            .filter(|p| p.session_id == session_id && p.left_at.is_none())
            .count() as i64)
    }

    async fn insert_game_participant(
        &self,
        session_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<GameParticipantData> {
        let mut state = self.state.lock();

        if state
            .game_participants
            .iter()
            .any(|p| p.session_id == session_id && p.user_id == user_id && p.left_at.is_none())
        {
            return Err(DatabaseError::Conflict {
                resource: "game participant",
                field: "session:user",
                value: format!("{}:{}", session_id, user_id),
            });
        }

        state.user(user_id)?;

        let id = state.alloc();
        let stored = StoredGameParticipant {
            id,
            session_id,
            user_id,
            score: 0,
            joined_at: Utc::now(),
            left_at: None,
        };

        state.game_participants.push(stored.clone());
        state.game_participant_data(&stored)
    }

    async fn close_game_participant(
        &self,
        session_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<GameParticipantData> {
        let mut state = self.state.lock();

        let stored = state
            .game_participants
            .iter_mut()
            .find(|p| p.session_id == session_id && p.user_id == user_id && p.left_at.is_none())
            .ok_or_else(|| not_found("game participant", "session:user"))?;

        stored.left_at = Some(Utc::now());

        let stored = stored.clone();
        state.game_participant_data(&stored)
    }

    async fn add_score(
        &self,
        session_id: PrimaryKey,
        user_id: PrimaryKey,
        delta: i32,
    ) -> Result<GameParticipantData> {
        let mut state = self.state.lock();

        let stored = state
            .game_participants
            .iter_mut()
            .find(|p| p.session_id == session_id && p.user_id == user_id && p.left_at.is_none())
            .ok_or_else(|| not_found("game participant", "session:user"))?;

        stored.score += delta;

        let stored = stored.clone();
        state.game_participant_data(&stored)
    }
}
