use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, Error as SqlxError, FromRow, PgPool};

use crate::{
    Database, DatabaseError, DatabaseResult, GameData, GameParticipantData, GameSessionData,
    IntoDatabaseError, JoinRequestData, NewGame, NewGameSession, NewJoinRequest, NewRoom,
    NewSession, NewUser, PrimaryKey, RequestStatus, Result, RoomData, RoomParticipantData,
    SessionData, SessionStatus, UpdatedRoom, UserData, Visibility,
};

/// A postgres database implementation for parlor.
///
/// All values are bound parameters, filter and pagination input is never
/// interpolated into query text.
pub struct PgDatabase {
    pool: PgPool,
}

#[derive(FromRow)]
struct UserRow {
    id: PrimaryKey,
    username: String,
    display_name: String,
}

#[derive(FromRow)]
struct AuthSessionRow {
    id: PrimaryKey,
    token: String,
    expires_at: DateTime<Utc>,
    user_id: PrimaryKey,
    username: String,
    display_name: String,
}

#[derive(FromRow)]
struct GameRow {
    id: PrimaryKey,
    name: String,
    min_players: i32,
    max_players: i32,
}

#[derive(FromRow)]
struct RoomRow {
    id: PrimaryKey,
    name: String,
    visibility: String,
    is_locked: bool,
    host_id: PrimaryKey,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct ParticipantRow {
    id: PrimaryKey,
    room_id: PrimaryKey,
    user_id: PrimaryKey,
    joined_at: DateTime<Utc>,
    left_at: Option<DateTime<Utc>>,
    is_active: bool,
    username: String,
    display_name: String,
}

#[derive(FromRow)]
struct RequestRow {
    id: PrimaryKey,
    room_id: PrimaryKey,
    user_id: PrimaryKey,
    status: String,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct GameSessionRow {
    id: PrimaryKey,
    room_id: PrimaryKey,
    game_id: PrimaryKey,
    status: String,
    created_by: PrimaryKey,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

#[derive(FromRow)]
struct GameParticipantRow {
    id: PrimaryKey,
    session_id: PrimaryKey,
    user_id: PrimaryKey,
    score: i32,
    joined_at: DateTime<Utc>,
    left_at: Option<DateTime<Utc>>,
    username: String,
    display_name: String,
}

const PARTICIPANT_COLUMNS: &str = "
    p.id, p.room_id, p.user_id, p.joined_at, p.left_at, p.is_active,
    u.username, u.display_name";

const GAME_PARTICIPANT_COLUMNS: &str = "
    p.id, p.session_id, p.user_id, p.score, p.joined_at, p.left_at,
    u.username, u.display_name";

fn bad_enum(column: &'static str, value: &str) -> DatabaseError {
    DatabaseError::Internal(format!("unexpected {} value {} in database", column, value).into())
}

impl UserRow {
    fn into_data(self) -> UserData {
        UserData {
            id: self.id,
            username: self.username,
            display_name: self.display_name,
        }
    }
}

impl AuthSessionRow {
    fn into_data(self) -> SessionData {
        SessionData {
            id: self.id,
            token: self.token,
            expires_at: self.expires_at,
            user: UserData {
                id: self.user_id,
                username: self.username,
                display_name: self.display_name,
            },
        }
    }
}

impl GameRow {
    fn into_data(self) -> GameData {
        GameData {
            id: self.id,
            name: self.name,
            min_players: self.min_players,
            max_players: self.max_players,
        }
    }
}

impl RoomRow {
    fn into_data(self) -> Result<RoomData> {
        let visibility = Visibility::from_str(&self.visibility)
            .ok_or_else(|| bad_enum("visibility", &self.visibility))?;

        Ok(RoomData {
            id: self.id,
            name: self.name,
            visibility,
            is_locked: self.is_locked,
            host_id: self.host_id,
            created_at: self.created_at,
        })
    }
}

impl ParticipantRow {
    fn into_data(self) -> RoomParticipantData {
        RoomParticipantData {
            id: self.id,
            room_id: self.room_id,
            joined_at: self.joined_at,
            left_at: self.left_at,
            is_active: self.is_active,
            user: UserData {
                id: self.user_id,
                username: self.username,
                display_name: self.display_name,
            },
        }
    }
}

impl RequestRow {
    fn into_data(self) -> Result<JoinRequestData> {
        let status = RequestStatus::from_str(&self.status)
            .ok_or_else(|| bad_enum("status", &self.status))?;

        Ok(JoinRequestData {
            id: self.id,
            room_id: self.room_id,
            user_id: self.user_id,
            status,
            created_at: self.created_at,
        })
    }
}

impl GameSessionRow {
    fn into_data(self) -> Result<GameSessionData> {
        let status = SessionStatus::from_str(&self.status)
            .ok_or_else(|| bad_enum("status", &self.status))?;

        Ok(GameSessionData {
            id: self.id,
            room_id: self.room_id,
            game_id: self.game_id,
            status,
            created_by: self.created_by,
            started_at: self.started_at,
            ended_at: self.ended_at,
        })
    }
}

impl GameParticipantRow {
    fn into_data(self) -> GameParticipantData {
        GameParticipantData {
            id: self.id,
            session_id: self.session_id,
            score: self.score,
            joined_at: self.joined_at,
            left_at: self.left_at,
            user: UserData {
                id: self.user_id,
                username: self.username,
                display_name: self.display_name,
            },
        }
    }
}

impl PgDatabase {
    pub async fn new(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        sqlx::query_as::<_, UserRow>(
            "SELECT id, username, display_name FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("user", "id"))
        .map(UserRow::into_data)
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        sqlx::query_as::<_, UserRow>(
            "SELECT id, username, display_name FROM users WHERE username = $1",
        )
        .bind(&new_user.username)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("user", "username"))
        .map(UserRow::into_data)
        .conflict_or_ok("user", "username", &new_user.username)?;

        sqlx::query_as::<_, UserRow>(
            "INSERT INTO users (username, display_name)
             VALUES ($1, $2)
             RETURNING id, username, display_name",
        )
        .bind(&new_user.username)
        .bind(&new_user.display_name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())
        .map(UserRow::into_data)
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        sqlx::query_as::<_, AuthSessionRow>(
            "SELECT
                sessions.id, sessions.token, sessions.expires_at, sessions.user_id,
                users.username, users.display_name
            FROM sessions
                INNER JOIN users ON sessions.user_id = users.id
            WHERE token = $1 AND expires_at > now()",
        )
        .bind(token)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("session", "token"))
        .map(AuthSessionRow::into_data)
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        self.session_by_token(&new_session.token)
            .await
            .conflict_or_ok("session", "token", &new_session.token)?;

        let token: String = sqlx::query_scalar(
            "INSERT INTO sessions (token, user_id, expires_at)
             VALUES ($1, $2, $3)
             RETURNING token",
        )
        .bind(&new_session.token)
        .bind(new_session.user_id)
        .bind(new_session.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?;

        self.session_by_token(&token).await
    }

    async fn game_by_id(&self, game_id: PrimaryKey) -> Result<GameData> {
        sqlx::query_as::<_, GameRow>(
            "SELECT id, name, min_players, max_players FROM games WHERE id = $1",
        )
        .bind(game_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("game", "id"))
        .map(GameRow::into_data)
    }

    async fn list_games(&self) -> Result<Vec<GameData>> {
        let rows = sqlx::query_as::<_, GameRow>(
            "SELECT id, name, min_players, max_players FROM games ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(rows.into_iter().map(GameRow::into_data).collect())
    }

    async fn create_game(&self, new_game: NewGame) -> Result<GameData> {
        sqlx::query_as::<_, GameRow>(
            "INSERT INTO games (name, min_players, max_players)
             VALUES ($1, $2, $3)
             RETURNING id, name, min_players, max_players",
        )
        .bind(&new_game.name)
        .bind(new_game.min_players)
        .bind(new_game.max_players)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())
        .map(GameRow::into_data)
    }

    async fn room_by_id(&self, room_id: PrimaryKey) -> Result<RoomData> {
        sqlx::query_as::<_, RoomRow>("SELECT * FROM rooms WHERE id = $1")
            .bind(room_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("room", "id"))?
            .into_data()
    }

    async fn room_by_name_and_host(&self, name: &str, host_id: PrimaryKey) -> Result<RoomData> {
        sqlx::query_as::<_, RoomRow>("SELECT * FROM rooms WHERE name = $1 AND host_id = $2")
            .bind(name)
            .bind(host_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("room", "name"))?
            .into_data()
    }

    async fn list_rooms(&self) -> Result<Vec<RoomData>> {
        let rows = sqlx::query_as::<_, RoomRow>("SELECT * FROM rooms ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())?;

        rows.into_iter().map(RoomRow::into_data).collect()
    }

    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData> {
        self.room_by_name_and_host(&new_room.name, new_room.host_id)
            .await
            .conflict_or_ok("room", "name", &new_room.name)?;

        let host = self.user_by_id(new_room.host_id).await?;

        // The host participant row must not be left behind if either
        // insert fails, so both happen in one transaction.
        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        let room_id: PrimaryKey = sqlx::query_scalar(
            "INSERT INTO rooms (name, visibility, is_locked, host_id)
             VALUES ($1, $2, false, $3)
             RETURNING id",
        )
        .bind(&new_room.name)
        .bind(new_room.visibility.as_str())
        .bind(new_room.host_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        sqlx::query(
            "INSERT INTO room_participants (room_id, user_id, is_active)
             VALUES ($1, $2, true)",
        )
        .bind(room_id)
        .bind(host.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        tx.commit().await.map_err(|e| e.any())?;

        self.room_by_id(room_id).await
    }

    async fn update_room(&self, updated_room: UpdatedRoom) -> Result<RoomData> {
        let room = self.room_by_id(updated_room.id).await?;

        sqlx::query(
            "UPDATE rooms SET
                name = $1,
                visibility = $2,
                is_locked = $3
            WHERE id = $4",
        )
        .bind(updated_room.name.unwrap_or(room.name))
        .bind(updated_room.visibility.unwrap_or(room.visibility).as_str())
        .bind(updated_room.is_locked.unwrap_or(room.is_locked))
        .bind(updated_room.id)
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())?;

        self.room_by_id(updated_room.id).await
    }

    async fn participant(
        &self,
        room_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<RoomParticipantData> {
        sqlx::query_as::<_, ParticipantRow>(&format!(
            "SELECT {PARTICIPANT_COLUMNS}
            FROM room_participants p
                INNER JOIN users u ON p.user_id = u.id
            WHERE p.room_id = $1 AND p.user_id = $2"
        ))
        .bind(room_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("room participant", "room:user"))
        .map(ParticipantRow::into_data)
    }

    async fn active_participants(&self, room_id: PrimaryKey) -> Result<Vec<RoomParticipantData>> {
        let rows = sqlx::query_as::<_, ParticipantRow>(&format!(
            "SELECT {PARTICIPANT_COLUMNS}
            FROM room_participants p
                INNER JOIN users u ON p.user_id = u.id
            WHERE p.room_id = $1 AND p.is_active
            ORDER BY p.joined_at, p.id"
        ))
        .bind(room_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(rows.into_iter().map(ParticipantRow::into_data).collect())
    }

    async fn count_active_participants(&self, room_id: PrimaryKey) -> Result<i64> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM room_participants WHERE room_id = $1 AND is_active",
        )
        .bind(room_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn insert_participant(
        &self,
        room_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<RoomParticipantData> {
        self.participant(room_id, user_id).await.conflict_or_ok(
            "room participant",
            "room:user",
            format!("{}:{}", room_id, user_id).as_str(),
        )?;

        sqlx::query(
            "INSERT INTO room_participants (room_id, user_id, is_active)
             VALUES ($1, $2, true)",
        )
        .bind(room_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())?;

        self.participant(room_id, user_id).await
    }

    async fn reactivate_participant(
        &self,
        room_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<RoomParticipantData> {
        sqlx::query(
            "UPDATE room_participants
             SET is_active = true, left_at = NULL, joined_at = now()
             WHERE room_id = $1 AND user_id = $2",
        )
        .bind(room_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())?;

        self.participant(room_id, user_id).await
    }

    async fn deactivate_participant(
        &self,
        room_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<RoomParticipantData> {
        sqlx::query_scalar::<_, PrimaryKey>(
            "UPDATE room_participants
             SET is_active = false, left_at = now()
             WHERE room_id = $1 AND user_id = $2 AND is_active
             RETURNING id",
        )
        .bind(room_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("room participant", "room:user"))?;

        self.participant(room_id, user_id).await
    }

    async fn active_rooms_for_user(&self, user_id: PrimaryKey) -> Result<Vec<RoomData>> {
        let rows = sqlx::query_as::<_, RoomRow>(
            "SELECT r.*
            FROM rooms r
                INNER JOIN room_participants p ON p.room_id = r.id
            WHERE p.user_id = $1 AND p.is_active
            ORDER BY r.id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        rows.into_iter().map(RoomRow::into_data).collect()
    }

    async fn join_request_by_id(&self, request_id: PrimaryKey) -> Result<JoinRequestData> {
        sqlx::query_as::<_, RequestRow>("SELECT * FROM room_join_requests WHERE id = $1")
            .bind(request_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("join request", "id"))?
            .into_data()
    }

    async fn pending_request(
        &self,
        room_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<JoinRequestData> {
        sqlx::query_as::<_, RequestRow>(
            "SELECT * FROM room_join_requests
             WHERE room_id = $1 AND user_id = $2 AND status = 'pending'",
        )
        .bind(room_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("join request", "room:user"))?
        .into_data()
    }

    async fn accepted_request(
        &self,
        room_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<JoinRequestData> {
        sqlx::query_as::<_, RequestRow>(
            "SELECT * FROM room_join_requests
             WHERE room_id = $1 AND user_id = $2 AND status = 'accepted'
             ORDER BY created_at DESC
             LIMIT 1",
        )
        .bind(room_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("join request", "room:user"))?
        .into_data()
    }

    async fn create_join_request(&self, new_request: NewJoinRequest) -> Result<JoinRequestData> {
        self.pending_request(new_request.room_id, new_request.user_id)
            .await
            .conflict_or_ok(
                "join request",
                "room:user",
                format!("{}:{}", new_request.room_id, new_request.user_id).as_str(),
            )?;

        sqlx::query_as::<_, RequestRow>(
            "INSERT INTO room_join_requests (room_id, user_id, status)
             VALUES ($1, $2, 'pending')
             RETURNING *",
        )
        .bind(new_request.room_id)
        .bind(new_request.user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?
        .into_data()
    }

    async fn set_request_status(
        &self,
        request_id: PrimaryKey,
        status: RequestStatus,
    ) -> Result<JoinRequestData> {
        sqlx::query_as::<_, RequestRow>(
            "UPDATE room_join_requests SET status = $1 WHERE id = $2 RETURNING *",
        )
        .bind(status.as_str())
        .bind(request_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("join request", "id"))?
        .into_data()
    }

    async fn delete_join_request(&self, request_id: PrimaryKey) -> Result<()> {
        sqlx::query("DELETE FROM room_join_requests WHERE id = $1")
            .bind(request_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn game_session_by_id(&self, session_id: PrimaryKey) -> Result<GameSessionData> {
        sqlx::query_as::<_, GameSessionRow>("SELECT * FROM game_sessions WHERE id = $1")
            .bind(session_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("game session", "id"))?
            .into_data()
    }

    async fn active_session_for_game(
        &self,
        room_id: PrimaryKey,
        game_id: PrimaryKey,
    ) -> Result<GameSessionData> {
        sqlx::query_as::<_, GameSessionRow>(
            "SELECT * FROM game_sessions
             WHERE room_id = $1 AND game_id = $2 AND status = 'active'",
        )
        .bind(room_id)
        .bind(game_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("game session", "room:game"))?
        .into_data()
    }

    async fn active_sessions_for_room(
        &self,
        room_id: PrimaryKey,
    ) -> Result<Vec<GameSessionData>> {
        let rows = sqlx::query_as::<_, GameSessionRow>(
            "SELECT * FROM game_sessions
             WHERE room_id = $1 AND status = 'active'
             ORDER BY id",
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        rows.into_iter().map(GameSessionRow::into_data).collect()
    }

    async fn create_game_session(&self, new_session: NewGameSession) -> Result<GameSessionData> {
        self.active_session_for_game(new_session.room_id, new_session.game_id)
            .await
            .conflict_or_ok(
                "game session",
                "room:game",
                format!("{}:{}", new_session.room_id, new_session.game_id).as_str(),
            )?;

        // Same failure boundary as create_room: the session must not exist
        // without its creator seated in it.
        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        let session_id: PrimaryKey = sqlx::query_scalar(
            "INSERT INTO game_sessions (room_id, game_id, status, created_by)
             VALUES ($1, $2, 'active', $3)
             RETURNING id",
        )
        .bind(new_session.room_id)
        .bind(new_session.game_id)
        .bind(new_session.created_by)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        sqlx::query(
            "INSERT INTO game_participants (session_id, user_id, score)
             VALUES ($1, $2, 0)",
        )
        .bind(session_id)
        .bind(new_session.created_by)
        .execute(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        tx.commit().await.map_err(|e| e.any())?;

        self.game_session_by_id(session_id).await
    }

    async fn complete_game_session(&self, session_id: PrimaryKey) -> Result<GameSessionData> {
        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        sqlx::query_scalar::<_, PrimaryKey>(
            "UPDATE game_sessions
             SET status = 'completed', ended_at = now()
             WHERE id = $1
             RETURNING id",
        )
        .bind(session_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| e.not_found_or("game session", "id"))?;

        sqlx::query(
            "UPDATE game_participants
             SET left_at = now()
             WHERE session_id = $1 AND left_at IS NULL",
        )
        .bind(session_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        tx.commit().await.map_err(|e| e.any())?;

        self.game_session_by_id(session_id).await
    }

    async fn open_participant(
        &self,
        session_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<GameParticipantData> {
        sqlx::query_as::<_, GameParticipantRow>(&format!(
            "SELECT {GAME_PARTICIPANT_COLUMNS}
            FROM game_participants p
                INNER JOIN users u ON p.user_id = u.id
            WHERE p.session_id = $1 AND p.user_id = $2 AND p.left_at IS NULL"
        ))
        .bind(session_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("game participant", "session:user"))
        .map(GameParticipantRow::into_data)
    }

    async fn open_participants(&self, session_id: PrimaryKey) -> Result<Vec<GameParticipantData>> {
        let rows = sqlx::query_as::<_, GameParticipantRow>(&format!(
            "SELECT {GAME_PARTICIPANT_COLUMNS}
            FROM game_participants p
                INNER JOIN users u ON p.user_id = u.id
            WHERE p.session_id = $1 AND p.left_at IS NULL
            ORDER BY p.joined_at, p.id"
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(rows.into_iter().map(GameParticipantRow::into_data).collect())
    }

    async fn count_open_participants(&self, session_id: PrimaryKey) -> Result<i64> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM game_participants WHERE session_id = $1 AND left_at IS NULL",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn insert_game_participant(
        &self,
        session_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<GameParticipantData> {
        self.open_participant(session_id, user_id).await.conflict_or_ok(
            "game participant",
            "session:user",
            format!("{}:{}", session_id, user_id).as_str(),
        )?;

        sqlx::query(
            "INSERT INTO game_participants (session_id, user_id, score)
             VALUES ($1, $2, 0)",
        )
        .bind(session_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())?;

        self.open_participant(session_id, user_id).await
    }

    async fn close_game_participant(
        &self,
        session_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<GameParticipantData> {
        let id: PrimaryKey = sqlx::query_scalar(
            "UPDATE game_participants
             SET left_at = now()
             WHERE session_id = $1 AND user_id = $2 AND left_at IS NULL
             RETURNING id",
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("game participant", "session:user"))?;

        let row = sqlx::query_as::<_, GameParticipantRow>(&format!(
            "SELECT {GAME_PARTICIPANT_COLUMNS}
            FROM game_participants p
                INNER JOIN users u ON p.user_id = u.id
            WHERE p.id = $1"
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("game participant", "id"))?;

        Ok(row.into_data())
    }

    async fn add_score(
        &self,
        session_id: PrimaryKey,
        user_id: PrimaryKey,
        delta: i32,
    ) -> Result<GameParticipantData> {
        // Additive on purpose: concurrent deltas commute instead of
        // overwriting each other.
        sqlx::query_scalar::<_, PrimaryKey>(
            "UPDATE game_participants
             SET score = score + $3
             WHERE session_id = $1 AND user_id = $2 AND left_at IS NULL
             RETURNING id",
        )
        .bind(session_id)
        .bind(user_id)
        .bind(delta)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("game participant", "session:user"))?;

        self.open_participant(session_id, user_id).await
    }
}

impl IntoDatabaseError for SqlxError {
    fn any(self) -> DatabaseError {
        DatabaseError::Internal(Box::new(self))
    }

    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError {
        match self {
            SqlxError::RowNotFound => DatabaseError::NotFound {
                resource,
                identifier,
            },
            e => Self::any(e),
        }
    }
}
