use chrono::{DateTime, Utc};
use log::info;
use serde_json::json;
use thiserror::Error;

use crate::{
    CollabContext, DatabaseError, GameSessionData, JoinRequestData, LeaveReason, NewJoinRequest,
    NewNotification, NewRoom, PartyEvent, PrimaryKey, RequestStatus, RoomData,
    RoomParticipantData, UpdatedRoom, UserData, Visibility,
};

/// Owns room creation, locking, membership, and the locked-room join
/// request workflow.
pub struct RoomManager {
    context: CollabContext,
}

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("{0}")]
    Validation(String),
    #[error("Only the host can do this")]
    NotHost,
    #[error("Room is locked, request to join or ask for an invite")]
    RoomLocked,
    #[error("Join request has already been resolved")]
    RequestAlreadyResolved,
    #[error(transparent)]
    Db(#[from] DatabaseError),
}

/// Input for [RoomManager::create_room]
#[derive(Debug)]
pub struct NewRoomParams {
    pub name: String,
    pub visibility: Visibility,
    pub host_id: PrimaryKey,
}

/// A partial room update. Only fields present are applied.
#[derive(Debug, Clone)]
pub struct RoomPatch {
    pub name: Option<String>,
    pub visibility: Option<Visibility>,
    pub is_locked: Option<bool>,
}

/// The aggregate view of a room: attributes, host, active participants in
/// join order, and the game sessions currently running inside it.
#[derive(Debug, Clone)]
pub struct RoomDetails {
    pub room: RoomData,
    pub host: UserData,
    pub participants: Vec<RoomParticipantData>,
    pub sessions: Vec<GameSessionData>,
}

/// Returned by [RoomManager::join_room]
#[derive(Debug, Clone)]
pub struct JoinedRoom {
    pub room_id: PrimaryKey,
    pub user_id: PrimaryKey,
    pub joined_at: DateTime<Utc>,
}

impl RoomManager {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Creates a new room with the host as its first active participant
    pub async fn create_room(&self, params: NewRoomParams) -> Result<RoomData, RoomError> {
        let name = params.name.trim();

        if name.is_empty() {
            return Err(RoomError::Validation("Room name must not be empty".into()));
        }

        let room = self
            .context
            .database
            .create_room(NewRoom {
                name: name.to_string(),
                visibility: params.visibility,
                host_id: params.host_id,
            })
            .await?;

        info!("User {} created room {}", params.host_id, room.name);

        Ok(room)
    }

    /// Returns the aggregate view of a room
    pub async fn room_details(&self, room_id: PrimaryKey) -> Result<RoomDetails, RoomError> {
        let room = self.context.database.room_by_id(room_id).await?;
        let host = self.context.database.user_by_id(room.host_id).await?;
        let participants = self.context.database.active_participants(room_id).await?;
        let sessions = self
            .context
            .database
            .active_sessions_for_room(room_id)
            .await?;

        Ok(RoomDetails {
            room,
            host,
            participants,
            sessions,
        })
    }

    pub async fn list_rooms(&self) -> Result<Vec<RoomData>, RoomError> {
        Ok(self.context.database.list_rooms().await?)
    }

    /// Applies a partial update to a room. Host only.
    pub async fn update_room(
        &self,
        room_id: PrimaryKey,
        patch: RoomPatch,
        actor_id: PrimaryKey,
    ) -> Result<RoomData, RoomError> {
        let _guard = self.context.room_locks.acquire(room_id).await;

        let room = self.context.database.room_by_id(room_id).await?;

        if room.host_id != actor_id {
            return Err(RoomError::NotHost);
        }

        if let Some(name) = &patch.name {
            let name = name.trim();

            if name.is_empty() {
                return Err(RoomError::Validation("Room name must not be empty".into()));
            }

            // Renaming re-checks the per-host uniqueness rule
            if name != room.name {
                match self
                    .context
                    .database
                    .room_by_name_and_host(name, room.host_id)
                    .await
                {
                    Ok(existing) => {
                        return Err(DatabaseError::Conflict {
                            resource: "room",
                            field: "name",
                            value: existing.name,
                        }
                        .into())
                    }
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        let updated = self
            .context
            .database
            .update_room(UpdatedRoom {
                id: room_id,
                name: patch.name.clone().map(|n| n.trim().to_string()),
                visibility: patch.visibility,
                is_locked: patch.is_locked,
            })
            .await?;

        self.context
            .events
            .emit(PartyEvent::RoomUpdated { room_id, patch });

        Ok(updated)
    }

    /// Makes `user_id` an active participant of the room.
    ///
    /// Idempotent for users already in the room. For a locked room the
    /// caller must be the host or hold an accepted join request, which is
    /// consumed by this call.
    pub async fn join_room(
        &self,
        user_id: PrimaryKey,
        room_id: PrimaryKey,
    ) -> Result<JoinedRoom, RoomError> {
        let _guard = self.context.room_locks.acquire(room_id).await;

        let room = self.context.database.room_by_id(room_id).await?;

        let existing = match self.context.database.participant(room_id, user_id).await {
            Ok(participant) => Some(participant),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        };

        // Already in the room: nothing to admit, nothing to announce
        if let Some(participant) = existing.as_ref().filter(|p| p.is_active) {
            return Ok(JoinedRoom {
                room_id,
                user_id,
                joined_at: participant.joined_at,
            });
        }

        // Locked-room admission. An accepted request is consumed once the
        // join actually happens, below.
        let mut redeemed_request = None;

        if room.is_locked && room.host_id != user_id {
            match self.context.database.accepted_request(room_id, user_id).await {
                Ok(request) => redeemed_request = Some(request),
                Err(e) if e.is_not_found() => return Err(RoomError::RoomLocked),
                Err(e) => return Err(e.into()),
            }
        }

        let participant = match existing {
            Some(_) => {
                self.context
                    .database
                    .reactivate_participant(room_id, user_id)
                    .await?
            }
            None => {
                self.context
                    .database
                    .insert_participant(room_id, user_id)
                    .await?
            }
        };

        if let Some(request) = redeemed_request {
            self.context.database.delete_join_request(request.id).await?;
        }

        info!("User {} joined room {}", user_id, room.name);

        self.context.events.emit(PartyEvent::UserJoinedRoom {
            room_id,
            participant: participant.clone(),
        });

        Ok(JoinedRoom {
            room_id,
            user_id,
            joined_at: participant.joined_at,
        })
    }

    /// Marks the user's membership inactive. Returns false if the user held
    /// no active membership, which is a no-op rather than an error.
    pub async fn leave_room(
        &self,
        user_id: PrimaryKey,
        room_id: PrimaryKey,
        reason: LeaveReason,
    ) -> Result<bool, RoomError> {
        let _guard = self.context.room_locks.acquire(room_id).await;

        match self
            .context
            .database
            .deactivate_participant(room_id, user_id)
            .await
        {
            Ok(_) => {}
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        self.context.events.emit(PartyEvent::UserLeftRoom {
            room_id,
            user_id,
            reason,
        });

        let remaining = self
            .context
            .database
            .count_active_participants(room_id)
            .await?;

        // Emptied rooms are kept around, only noted
        if remaining == 0 {
            info!("Room {} is now empty", room_id);
        }

        Ok(true)
    }

    /// Settles a user's memberships after their last realtime connection
    /// dropped, leaving the same rows an explicit leave would.
    pub async fn leave_all_rooms(
        &self,
        user_id: PrimaryKey,
        reason: LeaveReason,
    ) -> Result<Vec<PrimaryKey>, RoomError> {
        let rooms = self.context.database.active_rooms_for_user(user_id).await?;
        let mut left = Vec::with_capacity(rooms.len());

        for room in rooms {
            if self.leave_room(user_id, room.id, reason).await? {
                left.push(room.id);
            }
        }

        Ok(left)
    }

    /// Files a request to join a locked room, notifying the host
    pub async fn create_join_request(
        &self,
        user_id: PrimaryKey,
        room_id: PrimaryKey,
    ) -> Result<JoinRequestData, RoomError> {
        let room = self.context.database.room_by_id(room_id).await?;

        let request = self
            .context
            .database
            .create_join_request(NewJoinRequest { room_id, user_id })
            .await?;

        let requester = self.context.database.user_by_id(user_id).await?;

        self.context
            .notifier
            .create_notification(NewNotification {
                user_id: room.host_id,
                kind: "join-request",
                title: format!("{} wants to join {}", requester.display_name, room.name),
                message: "Accept or reject the request to let them in".to_string(),
                data: json!({ "room_id": room_id, "request_id": request.id }),
            })
            .await;

        self.context.events.emit(PartyEvent::JoinRequestCreated {
            host_id: room.host_id,
            request: request.clone(),
        });

        Ok(request)
    }

    /// Resolves a pending join request. Host only, once only. Accepting
    /// does not join the requester, they redeem the request with an
    /// explicit [RoomManager::join_room] call.
    pub async fn resolve_join_request(
        &self,
        request_id: PrimaryKey,
        accept: bool,
        actor_id: PrimaryKey,
    ) -> Result<JoinRequestData, RoomError> {
        let request = self.context.database.join_request_by_id(request_id).await?;
        let room = self.context.database.room_by_id(request.room_id).await?;

        if room.host_id != actor_id {
            return Err(RoomError::NotHost);
        }

        if request.status != RequestStatus::Pending {
            return Err(RoomError::RequestAlreadyResolved);
        }

        let status = if accept {
            RequestStatus::Accepted
        } else {
            RequestStatus::Rejected
        };

        let resolved = self
            .context
            .database
            .set_request_status(request_id, status)
            .await?;

        if accept {
            self.context
                .notifier
                .create_notification(NewNotification {
                    user_id: request.user_id,
                    kind: "join-request-accepted",
                    title: format!("You can now join {}", room.name),
                    message: "Your request to join the room was accepted".to_string(),
                    data: json!({ "room_id": room.id, "request_id": request_id }),
                })
                .await;

            self.context.events.emit(PartyEvent::JoinRequestAccepted {
                user_id: request.user_id,
                room_id: room.id,
                request_id,
            });
        }

        Ok(resolved)
    }

    /// Whether the user would be admitted to the room right now: hosts and
    /// current members always, anyone into an unlocked room, and into a
    /// locked room only holders of an accepted join request. Used by the
    /// gateway before subscribing a connection to the room channel.
    pub async fn can_user_join_room(
        &self,
        user_id: PrimaryKey,
        room_id: PrimaryKey,
    ) -> Result<bool, RoomError> {
        let room = self.context.database.room_by_id(room_id).await?;

        if room.host_id == user_id || !room.is_locked {
            return Ok(true);
        }

        match self.context.database.participant(room_id, user_id).await {
            Ok(participant) if participant.is_active => return Ok(true),
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        match self.context.database.accepted_request(room_id, user_id).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
