use chrono::{DateTime, Utc};

/// The type used for primary keys in the database.
pub type PrimaryKey = i32;

/// A parlor account.
///
/// Credential material never lives here, identity issuance is handled by an
/// external service that only writes rows into `users`.
#[derive(Debug, Clone, PartialEq)]
pub struct UserData {
    pub id: PrimaryKey,
    pub username: String,
    pub display_name: String,
}

/// Login session data for authentication
#[derive(Debug, Clone)]
pub struct SessionData {
    pub id: PrimaryKey,
    /// The session token, or key if you will
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// The user that is logged in
    pub user: UserData,
}

/// A catalog game that can be played inside a room
#[derive(Debug, Clone)]
pub struct GameData {
    pub id: PrimaryKey,
    pub name: String,
    pub min_players: i32,
    pub max_players: i32,
}

/// Who can see a room in listings. Locking is tracked separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

/// A parlor room
#[derive(Debug, Clone)]
pub struct RoomData {
    pub id: PrimaryKey,
    /// Unique per host, not globally
    pub name: String,
    pub visibility: Visibility,
    /// A locked room requires a host-approved join request to enter
    pub is_locked: bool,
    pub host_id: PrimaryKey,
    pub created_at: DateTime<Utc>,
}

/// A user's membership row in a room.
///
/// There is exactly one row per (room, user) pair. Leaving flips
/// `is_active` off and stamps `left_at`, re-joining flips it back on.
#[derive(Debug, Clone)]
pub struct RoomParticipantData {
    pub id: PrimaryKey,
    pub room_id: PrimaryKey,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub user: UserData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

/// A request to join a locked room.
///
/// An accepted request is deleted the moment it is redeemed by an actual
/// join. Resolved requests that are never redeemed stay as audit rows.
#[derive(Debug, Clone)]
pub struct JoinRequestData {
    pub id: PrimaryKey,
    pub room_id: PrimaryKey,
    pub user_id: PrimaryKey,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Completed,
    Cancelled,
}

/// One run of a catalog game inside a room
#[derive(Debug, Clone)]
pub struct GameSessionData {
    pub id: PrimaryKey,
    pub room_id: PrimaryKey,
    pub game_id: PrimaryKey,
    pub status: SessionStatus,
    pub created_by: PrimaryKey,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// A user's seat in a game session.
///
/// Unlike room participants, re-joining after a leave inserts a fresh row,
/// so at most one row per (session, user) has `left_at` unset.
#[derive(Debug, Clone)]
pub struct GameParticipantData {
    pub id: PrimaryKey,
    pub session_id: PrimaryKey,
    pub score: i32,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
    pub user: UserData,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "public" => Some(Visibility::Public),
            "private" => Some(Visibility::Private),
            _ => None,
        }
    }
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Rejected => "rejected",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(RequestStatus::Pending),
            "accepted" => Some(RequestStatus::Accepted),
            "rejected" => Some(RequestStatus::Rejected),
            _ => None,
        }
    }
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "active" => Some(SessionStatus::Active),
            "completed" => Some(SessionStatus::Completed),
            "cancelled" => Some(SessionStatus::Cancelled),
            _ => None,
        }
    }
}
