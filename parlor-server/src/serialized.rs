//! All schemas that are exposed from endpoints are defined here
//! along with the conversions from collab data

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use parlor_collab::{
    GameData, GameParticipantData, GameSessionData, JoinRequestData, JoinedRoom as CollabJoinedRoom,
    RoomData, RoomDetails as CollabRoomDetails, RoomParticipantData, RoomPatch,
    SessionDetails as CollabSessionDetails, UserData,
};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct User {
    id: i32,
    username: String,
    display_name: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Game {
    id: i32,
    name: String,
    min_players: i32,
    max_players: i32,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Room {
    id: i32,
    name: String,
    visibility: String,
    is_locked: bool,
    host_id: i32,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Participant {
    id: i32,
    joined_at: DateTime<Utc>,
    user: User,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoomDetails {
    room: Room,
    host: User,
    participants: Vec<Participant>,
    sessions: Vec<GameSession>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JoinedRoom {
    room_id: i32,
    user_id: i32,
    joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LeftRoom {
    /// False when the caller held no active membership to give up
    pub left: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JoinRequest {
    id: i32,
    room_id: i32,
    user_id: i32,
    status: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GameSession {
    id: i32,
    room_id: i32,
    game_id: i32,
    status: String,
    created_by: i32,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GamePlayer {
    score: i32,
    joined_at: DateTime<Utc>,
    user: User,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionDetails {
    session: GameSession,
    game: Game,
    participants: Vec<GamePlayer>,
}

/// The fields a room update actually changed, mirrored to subscribers
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoomPatchView {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    visibility: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_locked: Option<bool>,
}

/// Helper trait to convert any type into a serialized version
pub trait ToSerialized<T>
where
    T: Serialize,
{
    fn to_serialized(&self) -> T;
}

impl<I, O> ToSerialized<Vec<O>> for Vec<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Vec<O> {
        self.iter().map(|x| x.to_serialized()).collect()
    }
}

impl ToSerialized<User> for UserData {
    fn to_serialized(&self) -> User {
        User {
            id: self.id,
            username: self.username.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

impl ToSerialized<Game> for GameData {
    fn to_serialized(&self) -> Game {
        Game {
            id: self.id,
            name: self.name.clone(),
            min_players: self.min_players,
            max_players: self.max_players,
        }
    }
}

impl ToSerialized<Room> for RoomData {
    fn to_serialized(&self) -> Room {
        Room {
            id: self.id,
            name: self.name.clone(),
            visibility: self.visibility.as_str().to_string(),
            is_locked: self.is_locked,
            host_id: self.host_id,
            created_at: self.created_at,
        }
    }
}

impl ToSerialized<Participant> for RoomParticipantData {
    fn to_serialized(&self) -> Participant {
        Participant {
            id: self.id,
            joined_at: self.joined_at,
            user: self.user.to_serialized(),
        }
    }
}

impl ToSerialized<RoomDetails> for CollabRoomDetails {
    fn to_serialized(&self) -> RoomDetails {
        RoomDetails {
            room: self.room.to_serialized(),
            host: self.host.to_serialized(),
            participants: self.participants.to_serialized(),
            sessions: self.sessions.to_serialized(),
        }
    }
}

impl ToSerialized<JoinedRoom> for CollabJoinedRoom {
    fn to_serialized(&self) -> JoinedRoom {
        JoinedRoom {
            room_id: self.room_id,
            user_id: self.user_id,
            joined_at: self.joined_at,
        }
    }
}

impl ToSerialized<JoinRequest> for JoinRequestData {
    fn to_serialized(&self) -> JoinRequest {
        JoinRequest {
            id: self.id,
            room_id: self.room_id,
            user_id: self.user_id,
            status: self.status.as_str().to_string(),
            created_at: self.created_at,
        }
    }
}

impl ToSerialized<GameSession> for GameSessionData {
    fn to_serialized(&self) -> GameSession {
        GameSession {
            id: self.id,
            room_id: self.room_id,
            game_id: self.game_id,
            status: self.status.as_str().to_string(),
            created_by: self.created_by,
            started_at: self.started_at,
            ended_at: self.ended_at,
        }
    }
}

impl ToSerialized<GamePlayer> for GameParticipantData {
    fn to_serialized(&self) -> GamePlayer {
        GamePlayer {
            score: self.score,
            joined_at: self.joined_at,
            user: self.user.to_serialized(),
        }
    }
}

impl ToSerialized<SessionDetails> for CollabSessionDetails {
    fn to_serialized(&self) -> SessionDetails {
        SessionDetails {
            session: self.session.to_serialized(),
            game: self.game.to_serialized(),
            participants: self.participants.to_serialized(),
        }
    }
}

impl ToSerialized<RoomPatchView> for RoomPatch {
    fn to_serialized(&self) -> RoomPatchView {
        RoomPatchView {
            name: self.name.clone(),
            visibility: self.visibility.map(|v| v.as_str().to_string()),
            is_locked: self.is_locked,
        }
    }
}
