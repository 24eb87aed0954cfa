use log::info;
use serde_json::json;
use thiserror::Error;

use crate::{
    CollabContext, DatabaseError, GameData, GameParticipantData, GameSessionData, NewGameSession,
    NewNotification, PartyEvent, PrimaryKey, SessionStatus,
};

/// Owns the lifecycle of game sessions nested inside rooms: creation,
/// seats, scoring, ending, and invitations.
pub struct GameManager {
    context: CollabContext,
}

#[derive(Debug, Error)]
pub enum GameError {
    #[error("Game session is not active")]
    SessionNotActive,
    #[error("Game session has already ended")]
    AlreadyEnded,
    #[error("User must be in the room to do this")]
    NotInRoom,
    #[error("User is not a participant of this game session")]
    NotInSession,
    #[error("User is already a participant of this game session")]
    AlreadyInSession,
    #[error("Game is full")]
    GameFull,
    #[error("Only the session creator or the room host can end a game session")]
    NotAllowed,
    #[error(transparent)]
    Db(#[from] DatabaseError),
}

/// A game session with its game and currently seated players
#[derive(Debug, Clone)]
pub struct SessionDetails {
    pub session: GameSessionData,
    pub game: GameData,
    pub participants: Vec<GameParticipantData>,
}

impl GameManager {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    pub async fn game(&self, game_id: PrimaryKey) -> Result<GameData, GameError> {
        Ok(self.context.database.game_by_id(game_id).await?)
    }

    pub async fn list_games(&self) -> Result<Vec<GameData>, GameError> {
        Ok(self.context.database.list_games().await?)
    }

    /// Returns the session with its game and open seats
    pub async fn session_details(
        &self,
        session_id: PrimaryKey,
    ) -> Result<SessionDetails, GameError> {
        let session = self.context.database.game_session_by_id(session_id).await?;
        let game = self.context.database.game_by_id(session.game_id).await?;
        let participants = self.context.database.open_participants(session_id).await?;

        Ok(SessionDetails {
            session,
            game,
            participants,
        })
    }

    /// Starts a session of `game_id` in a room. The creator must be in the
    /// room, and a room runs at most one active session per game.
    pub async fn create_session(
        &self,
        game_id: PrimaryKey,
        room_id: PrimaryKey,
        created_by: PrimaryKey,
    ) -> Result<SessionDetails, GameError> {
        let game = self.context.database.game_by_id(game_id).await?;
        let room = self.context.database.room_by_id(room_id).await?;

        let _guard = self.context.room_locks.acquire(room_id).await;

        self.ensure_in_room(room_id, created_by).await?;

        let session = self
            .context
            .database
            .create_game_session(NewGameSession {
                room_id,
                game_id,
                created_by,
            })
            .await?;

        info!(
            "User {} started a session of {} in room {}",
            created_by, game.name, room.name
        );

        self.context.events.emit(PartyEvent::GameSessionCreated {
            room_id,
            session: session.clone(),
        });

        self.session_details(session.id).await
    }

    /// Seats `user_id` in the session. Idempotent for users already seated.
    pub async fn join_session(
        &self,
        session_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<SessionDetails, GameError> {
        let _guard = self.context.session_locks.acquire(session_id).await;

        let session = self.context.database.game_session_by_id(session_id).await?;

        if session.status != SessionStatus::Active {
            return Err(GameError::SessionNotActive);
        }

        self.ensure_in_room(session.room_id, user_id).await?;

        match self
            .context
            .database
            .open_participant(session_id, user_id)
            .await
        {
            Ok(_) => return self.session_details(session_id).await,
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        let game = self.context.database.game_by_id(session.game_id).await?;
        let seated = self
            .context
            .database
            .count_open_participants(session_id)
            .await?;

        if seated >= game.max_players as i64 {
            return Err(GameError::GameFull);
        }

        let participant = self
            .context
            .database
            .insert_game_participant(session_id, user_id)
            .await?;

        self.context.events.emit(PartyEvent::GamePlayerJoined {
            room_id: session.room_id,
            session_id,
            participant,
        });

        self.session_details(session_id).await
    }

    /// Vacates the caller's seat. Returns false if no seat was open. A
    /// session never stays active with nobody in it: the last leaver
    /// completes it.
    pub async fn leave_session(
        &self,
        session_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<bool, GameError> {
        let _guard = self.context.session_locks.acquire(session_id).await;

        let session = self.context.database.game_session_by_id(session_id).await?;

        match self
            .context
            .database
            .close_game_participant(session_id, user_id)
            .await
        {
            Ok(_) => {}
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        self.context.events.emit(PartyEvent::GamePlayerLeft {
            room_id: session.room_id,
            session_id,
            user_id,
        });

        let remaining = self
            .context
            .database
            .count_open_participants(session_id)
            .await?;

        if remaining == 0 && session.status == SessionStatus::Active {
            self.context
                .database
                .complete_game_session(session_id)
                .await?;

            info!("Game session {} completed, last participant left", session_id);

            self.context.events.emit(PartyEvent::GameEnded {
                room_id: session.room_id,
                session_id,
                ended_by: user_id,
            });
        }

        Ok(true)
    }

    /// Ends the session, vacating every open seat. Only the creator or the
    /// room's host may do this.
    pub async fn end_session(
        &self,
        session_id: PrimaryKey,
        actor_id: PrimaryKey,
    ) -> Result<GameSessionData, GameError> {
        let _guard = self.context.session_locks.acquire(session_id).await;

        let session = self.context.database.game_session_by_id(session_id).await?;
        let room = self.context.database.room_by_id(session.room_id).await?;

        if session.created_by != actor_id && room.host_id != actor_id {
            return Err(GameError::NotAllowed);
        }

        if session.status != SessionStatus::Active {
            return Err(GameError::AlreadyEnded);
        }

        let completed = self
            .context
            .database
            .complete_game_session(session_id)
            .await?;

        info!("User {} ended game session {}", actor_id, session_id);

        self.context.events.emit(PartyEvent::GameEnded {
            room_id: session.room_id,
            session_id,
            ended_by: actor_id,
        });

        Ok(completed)
    }

    /// Adds `delta` to the caller's score. The contract is additive, never
    /// an absolute overwrite, so concurrent updates commute.
    pub async fn update_score(
        &self,
        session_id: PrimaryKey,
        user_id: PrimaryKey,
        delta: i32,
    ) -> Result<GameParticipantData, GameError> {
        let _guard = self.context.session_locks.acquire(session_id).await;

        let session = self.context.database.game_session_by_id(session_id).await?;

        if session.status != SessionStatus::Active {
            return Err(GameError::SessionNotActive);
        }

        let updated = self
            .context
            .database
            .add_score(session_id, user_id, delta)
            .await?;

        self.context.events.emit(PartyEvent::GameScoreUpdated {
            room_id: session.room_id,
            session_id,
            user_id,
            score: updated.score,
            delta,
        });

        Ok(updated)
    }

    /// Invites a room member into a running session. Mutates nothing, the
    /// invitee still joins with an explicit [GameManager::join_session].
    pub async fn invite(
        &self,
        session_id: PrimaryKey,
        inviter_id: PrimaryKey,
        invitee_id: PrimaryKey,
    ) -> Result<(), GameError> {
        let session = self.context.database.game_session_by_id(session_id).await?;

        if session.status != SessionStatus::Active {
            return Err(GameError::SessionNotActive);
        }

        match self
            .context
            .database
            .open_participant(session_id, inviter_id)
            .await
        {
            Ok(_) => {}
            Err(e) if e.is_not_found() => return Err(GameError::NotInSession),
            Err(e) => return Err(e.into()),
        }

        self.ensure_in_room(session.room_id, invitee_id).await?;

        match self
            .context
            .database
            .open_participant(session_id, invitee_id)
            .await
        {
            Ok(_) => return Err(GameError::AlreadyInSession),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        let game = self.context.database.game_by_id(session.game_id).await?;
        let inviter = self.context.database.user_by_id(inviter_id).await?;

        self.context
            .notifier
            .create_notification(NewNotification {
                user_id: invitee_id,
                kind: "game-invite",
                title: format!("{} invited you to {}", inviter.display_name, game.name),
                message: "Join the game from the room to play along".to_string(),
                data: json!({ "session_id": session_id, "room_id": session.room_id }),
            })
            .await;

        self.context.events.emit(PartyEvent::GameInvite {
            invitee_id,
            room_id: session.room_id,
            session_id,
            inviter,
            game,
        });

        Ok(())
    }

    async fn ensure_in_room(
        &self,
        room_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<(), GameError> {
        match self.context.database.participant(room_id, user_id).await {
            Ok(participant) if participant.is_active => Ok(()),
            Ok(_) => Err(GameError::NotInRoom),
            Err(e) if e.is_not_found() => Err(GameError::NotInRoom),
            Err(e) => Err(e.into()),
        }
    }
}
