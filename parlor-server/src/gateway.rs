use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use dashmap::DashMap;
use log::{error, info, warn};
use parlor_collab::{Collab, EventReceiver, LeaveReason, PartyEvent, PrimaryKey};
use tokio::{sync::mpsc, task::spawn_blocking};

use crate::{
    serialized::ToSerialized,
    ws::{reason_label, ServerEvent},
};

pub type ConnectionId = u64;

/// The realtime broadcast gateway.
///
/// Owns the only mutable in-memory state in the system: which connections
/// are live, which user each belongs to, and which room channels each is
/// subscribed to. This registry reflects transport presence only, the
/// membership truth always lives in the store's participant rows.
pub struct Gateway {
    collab: Arc<Collab>,
    connections: DashMap<ConnectionId, Connection>,
    users: DashMap<PrimaryKey, HashSet<ConnectionId>>,
    next_connection_id: AtomicU64,
}

struct Connection {
    user_id: PrimaryKey,
    sender: mpsc::UnboundedSender<ServerEvent>,
    rooms: HashSet<PrimaryKey>,
}

impl Gateway {
    pub fn new(collab: &Arc<Collab>) -> Arc<Self> {
        Arc::new(Self {
            collab: collab.clone(),
            connections: Default::default(),
            users: Default::default(),
            next_connection_id: AtomicU64::new(1),
        })
    }

    /// Drains committed manager events and fans them out to subscribers.
    /// A single consumer, so per-room delivery order matches commit order.
    pub fn run(self: &Arc<Self>, receiver: EventReceiver) {
        let gateway = self.clone();

        tokio::spawn(async move {
            loop {
                let receiver = receiver.clone();
                let event = match spawn_blocking(move || receiver.recv()).await {
                    Ok(Ok(event)) => event,
                    // Channel closed, the collab system is gone
                    Ok(Err(_)) => break,
                    Err(e) => {
                        error!("Event drain task failed: {}", e);
                        break;
                    }
                };

                gateway.handle_event(event);
            }
        });
    }

    /// Registers a new connection for a user, returning the outbound
    /// channel the transport should forward to the socket.
    pub fn register(
        &self,
        user_id: PrimaryKey,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();

        self.connections.insert(
            connection_id,
            Connection {
                user_id,
                sender,
                rooms: HashSet::new(),
            },
        );

        self.users.entry(user_id).or_default().insert(connection_id);

        (connection_id, receiver)
    }

    /// Removes a connection from both lifecycle maps, then settles the
    /// user's room memberships if this was their last connection: an
    /// abrupt disconnect must leave the same rows an explicit leave would.
    pub async fn handle_disconnect(&self, connection_id: ConnectionId) {
        let Some((_, connection)) = self.connections.remove(&connection_id) else {
            return;
        };

        let user_id = connection.user_id;

        let went_offline = match self.users.get_mut(&user_id) {
            Some(mut set) => {
                set.remove(&connection_id);
                set.is_empty()
            }
            None => false,
        };

        if !went_offline {
            return;
        }

        self.users.remove(&user_id);
        info!("User {} is now offline", user_id);

        match self
            .collab
            .rooms
            .leave_all_rooms(user_id, LeaveReason::Disconnected)
            .await
        {
            Ok(left) if !left.is_empty() => {
                info!("Settled {} room membership(s) for user {}", left.len(), user_id)
            }
            Ok(_) => {}
            Err(e) => error!("Failed to settle memberships for user {}: {}", user_id, e),
        }
    }

    /// Subscribes a connection to a room channel. Admission is checked by
    /// the caller before this.
    pub fn subscribe(&self, connection_id: ConnectionId, room_id: PrimaryKey) {
        if let Some(mut connection) = self.connections.get_mut(&connection_id) {
            connection.rooms.insert(room_id);
        }
    }

    pub fn unsubscribe(&self, connection_id: ConnectionId, room_id: PrimaryKey) {
        if let Some(mut connection) = self.connections.get_mut(&connection_id) {
            connection.rooms.remove(&room_id);
        }
    }

    /// Sends an event to one specific connection
    pub fn send_to_connection(&self, connection_id: ConnectionId, event: ServerEvent) {
        if let Some(connection) = self.connections.get(&connection_id) {
            if connection.sender.send(event).is_err() {
                warn!("Connection {} is gone, dropping event", connection_id);
            }
        }
    }

    /// Sends an event to every live connection of a user, returning
    /// whether the user had at least one. Callers use the return value as
    /// a cheap presence check, not a delivery guarantee.
    pub fn emit_to_user(&self, user_id: PrimaryKey, event: ServerEvent) -> bool {
        let Some(connection_ids) = self.users.get(&user_id) else {
            return false;
        };

        let mut present = false;

        for connection_id in connection_ids.iter() {
            if let Some(connection) = self.connections.get(connection_id) {
                present = true;

                if connection.sender.send(event.clone()).is_err() {
                    warn!("Connection {} is gone, dropping event", connection_id);
                }
            }
        }

        present
    }

    /// Sends an event to every connection subscribed to a room channel,
    /// skipping all of `except`'s connections when set.
    pub fn emit_to_room(
        &self,
        room_id: PrimaryKey,
        event: ServerEvent,
        except: Option<PrimaryKey>,
    ) {
        for connection in self.connections.iter() {
            if !connection.rooms.contains(&room_id) {
                continue;
            }

            if except == Some(connection.user_id) {
                continue;
            }

            if connection.sender.send(event.clone()).is_err() {
                warn!("Connection {} is gone, dropping event", connection.key());
            }
        }
    }

    /// Drops a room channel from every one of a user's connections
    fn unsubscribe_user(&self, user_id: PrimaryKey, room_id: PrimaryKey) {
        for mut connection in self.connections.iter_mut() {
            if connection.user_id == user_id {
                connection.rooms.remove(&room_id);
            }
        }
    }

    fn handle_event(&self, event: PartyEvent) {
        match event {
            PartyEvent::RoomUpdated { room_id, patch } => self.emit_to_room(
                room_id,
                ServerEvent::RoomUpdated {
                    room_id,
                    patch: patch.to_serialized(),
                },
                None,
            ),
            PartyEvent::UserJoinedRoom {
                room_id,
                participant,
            } => {
                // The actor already got a private snapshot, skip the echo
                let actor = participant.user.id;

                self.emit_to_room(
                    room_id,
                    ServerEvent::UserJoined {
                        room_id,
                        participant: participant.to_serialized(),
                    },
                    Some(actor),
                );
            }
            PartyEvent::UserLeftRoom {
                room_id,
                user_id,
                reason,
            } => {
                // The leaver's connections stop hearing the room first
                self.unsubscribe_user(user_id, room_id);

                self.emit_to_room(
                    room_id,
                    ServerEvent::UserLeft {
                        room_id,
                        user_id,
                        reason: reason_label(reason),
                    },
                    None,
                );
            }
            PartyEvent::JoinRequestCreated { host_id, request } => {
                self.emit_to_user(
                    host_id,
                    ServerEvent::JoinRequestCreated {
                        room_id: request.room_id,
                        request: request.to_serialized(),
                    },
                );
            }
            PartyEvent::JoinRequestAccepted {
                user_id,
                room_id,
                request_id,
            } => {
                self.emit_to_user(
                    user_id,
                    ServerEvent::JoinRequestAccepted {
                        room_id,
                        request_id,
                    },
                );
            }
            PartyEvent::GameSessionCreated { room_id, session } => self.emit_to_room(
                room_id,
                ServerEvent::GameSessionCreated {
                    room_id,
                    session: session.to_serialized(),
                },
                None,
            ),
            PartyEvent::GamePlayerJoined {
                room_id,
                session_id,
                participant,
            } => self.emit_to_room(
                room_id,
                ServerEvent::GamePlayerJoined {
                    room_id,
                    session_id,
                    participant: participant.to_serialized(),
                },
                None,
            ),
            PartyEvent::GamePlayerLeft {
                room_id,
                session_id,
                user_id,
            } => self.emit_to_room(
                room_id,
                ServerEvent::GamePlayerLeft {
                    room_id,
                    session_id,
                    user_id,
                },
                None,
            ),
            PartyEvent::GameScoreUpdated {
                room_id,
                session_id,
                user_id,
                score,
                delta,
            } => self.emit_to_room(
                room_id,
                ServerEvent::GameScoreUpdated {
                    room_id,
                    session_id,
                    user_id,
                    score,
                    delta,
                },
                None,
            ),
            PartyEvent::GameEnded {
                room_id,
                session_id,
                ended_by,
            } => self.emit_to_room(
                room_id,
                ServerEvent::GameEnded {
                    room_id,
                    session_id,
                    ended_by,
                },
                None,
            ),
            PartyEvent::GameInvite {
                invitee_id,
                room_id,
                session_id,
                inviter,
                game,
            } => {
                self.emit_to_user(
                    invitee_id,
                    ServerEvent::GameInvite {
                        room_id,
                        session_id,
                        inviter: inviter.to_serialized(),
                        game: game.to_serialized(),
                    },
                );
            }
        }
    }
}
