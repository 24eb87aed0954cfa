use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

mod data;
pub use data::*;

mod pg;
pub use pg::*;

mod memory;
pub use memory::*;

pub type Result<T> = std::result::Result<T, DatabaseError>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// An unknown or internal error happened with the database
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A resource already exists
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        /// The resource in question
        resource: &'static str,
        /// The field that is conflicting
        field: &'static str,
        /// The conflicting value
        value: String,
    },
    /// A resource in the database doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
}

impl DatabaseError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DatabaseError::NotFound { .. })
    }
}

/// Helper trait to reduce boilerplate
pub trait IntoDatabaseError {
    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError;
    fn any(self) -> DatabaseError;
}

/// Helper trait to reduce boilerplate
pub trait DatabaseResult {
    /// Turns the Result into a conflict error if it's Ok()
    fn conflict_or_ok(self, resource: &'static str, field: &'static str, value: &str)
        -> Result<()>;
}

impl<T> DatabaseResult for Result<T> {
    fn conflict_or_ok(
        self,
        resource: &'static str,
        field: &'static str,
        value: &str,
    ) -> Result<()> {
        match self {
            Ok(_) => Err(DatabaseError::Conflict {
                resource,
                field,
                value: value.to_string(),
            }),
            Err(e) => match e {
                DatabaseError::NotFound { .. } => Ok(()),
                e => Err(e),
            },
        }
    }
}

#[derive(Debug)]
pub struct NewUser {
    pub username: String,
    pub display_name: String,
}

#[derive(Debug)]
pub struct NewSession {
    pub token: String,
    pub user_id: PrimaryKey,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewGame {
    pub name: String,
    pub min_players: i32,
    pub max_players: i32,
}

#[derive(Debug)]
pub struct NewRoom {
    pub name: String,
    pub visibility: Visibility,
    /// The host of the new room, added as its first active participant
    pub host_id: PrimaryKey,
}

/// A partial update. Fields left as [None] keep their current value.
#[derive(Debug)]
pub struct UpdatedRoom {
    pub id: PrimaryKey,
    pub name: Option<String>,
    pub visibility: Option<Visibility>,
    pub is_locked: Option<bool>,
}

#[derive(Debug)]
pub struct NewJoinRequest {
    pub room_id: PrimaryKey,
    pub user_id: PrimaryKey,
}

#[derive(Debug)]
pub struct NewGameSession {
    pub room_id: PrimaryKey,
    pub game_id: PrimaryKey,
    /// The creator, added as the session's first participant
    pub created_by: PrimaryKey,
}

/// Represents a type that can fetch and mutate parlor data in a database.
///
/// Write operations that touch more than one row (room + host participant,
/// session + creator participant, ending a session) are atomic: a partial
/// failure must not leave the extra rows behind. Uniqueness rules from the
/// data model are enforced here, so racing inserts surface as [DatabaseError::Conflict].
#[async_trait]
pub trait Database: Send + Sync {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData>;
    async fn create_user(&self, new_user: NewUser) -> Result<UserData>;

    async fn session_by_token(&self, token: &str) -> Result<SessionData>;
    async fn create_session(&self, new_session: NewSession) -> Result<SessionData>;

    async fn game_by_id(&self, game_id: PrimaryKey) -> Result<GameData>;
    async fn list_games(&self) -> Result<Vec<GameData>>;
    async fn create_game(&self, new_game: NewGame) -> Result<GameData>;

    async fn room_by_id(&self, room_id: PrimaryKey) -> Result<RoomData>;
    async fn room_by_name_and_host(&self, name: &str, host_id: PrimaryKey) -> Result<RoomData>;
    async fn list_rooms(&self) -> Result<Vec<RoomData>>;
    /// Inserts the room and an active participant row for the host in one
    /// transaction.
    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData>;
    async fn update_room(&self, updated_room: UpdatedRoom) -> Result<RoomData>;

    /// Returns the membership row for (room, user) whether active or not
    async fn participant(&self, room_id: PrimaryKey, user_id: PrimaryKey)
        -> Result<RoomParticipantData>;
    /// Active participants in join order
    async fn active_participants(&self, room_id: PrimaryKey) -> Result<Vec<RoomParticipantData>>;
    async fn count_active_participants(&self, room_id: PrimaryKey) -> Result<i64>;
    async fn insert_participant(
        &self,
        room_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<RoomParticipantData>;
    /// Flips an existing inactive row back on, refreshing `joined_at`
    async fn reactivate_participant(
        &self,
        room_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<RoomParticipantData>;
    /// Marks the active row inactive, stamping `left_at`. [DatabaseError::NotFound]
    /// if the user holds no active row in the room.
    async fn deactivate_participant(
        &self,
        room_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<RoomParticipantData>;
    async fn active_rooms_for_user(&self, user_id: PrimaryKey) -> Result<Vec<RoomData>>;

    async fn join_request_by_id(&self, request_id: PrimaryKey) -> Result<JoinRequestData>;
    async fn pending_request(
        &self,
        room_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<JoinRequestData>;
    async fn accepted_request(
        &self,
        room_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<JoinRequestData>;
    async fn create_join_request(&self, new_request: NewJoinRequest) -> Result<JoinRequestData>;
    async fn set_request_status(
        &self,
        request_id: PrimaryKey,
        status: RequestStatus,
    ) -> Result<JoinRequestData>;
    async fn delete_join_request(&self, request_id: PrimaryKey) -> Result<()>;

    async fn game_session_by_id(&self, session_id: PrimaryKey) -> Result<GameSessionData>;
    async fn active_session_for_game(
        &self,
        room_id: PrimaryKey,
        game_id: PrimaryKey,
    ) -> Result<GameSessionData>;
    async fn active_sessions_for_room(&self, room_id: PrimaryKey)
        -> Result<Vec<GameSessionData>>;
    /// Inserts the session and a participant row for the creator in one
    /// transaction.
    async fn create_game_session(&self, new_session: NewGameSession) -> Result<GameSessionData>;
    /// Marks the session completed and closes every still-open participant
    /// row, in one transaction.
    async fn complete_game_session(&self, session_id: PrimaryKey) -> Result<GameSessionData>;

    /// Returns the open (not left) participant row for (session, user)
    async fn open_participant(
        &self,
        session_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<GameParticipantData>;
    async fn open_participants(&self, session_id: PrimaryKey)
        -> Result<Vec<GameParticipantData>>;
    async fn count_open_participants(&self, session_id: PrimaryKey) -> Result<i64>;
    async fn insert_game_participant(
        &self,
        session_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<GameParticipantData>;
    /// Stamps `left_at` on the open row. [DatabaseError::NotFound] if the user
    /// holds no open row in the session.
    async fn close_game_participant(
        &self,
        session_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<GameParticipantData>;
    /// Adds `delta` to the open row's score in a single conditional update,
    /// so concurrent deltas commute.
    async fn add_score(
        &self,
        session_id: PrimaryKey,
        user_id: PrimaryKey,
        delta: i32,
    ) -> Result<GameParticipantData>;
}
