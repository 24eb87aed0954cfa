use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::Response,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use log::info;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use parlor_collab::{LeaveReason, PrimaryKey, UserData};

use crate::{
    context::ServerContext,
    gateway::ConnectionId,
    serialized::{
        Game, GamePlayer, GameSession, JoinRequest, Participant, RoomDetails, RoomPatchView,
        ToSerialized, User,
    },
    Router,
};

/// Events pushed to subscribed connections
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum ServerEvent {
    /// A room's attributes changed. Carries the applied patch.
    RoomUpdated {
        room_id: PrimaryKey,
        patch: RoomPatchView,
    },
    /// A user became an active participant of a room
    UserJoined {
        room_id: PrimaryKey,
        participant: Participant,
    },
    /// A user stopped being an active participant of a room
    UserLeft {
        room_id: PrimaryKey,
        user_id: PrimaryKey,
        /// "left" or "disconnected"
        reason: &'static str,
    },
    /// A private snapshot of a room, sent to a connection right after it
    /// subscribes to the room's channel
    RoomData { room: RoomDetails },
    /// Someone asked to join a room you host
    JoinRequestCreated {
        room_id: PrimaryKey,
        request: JoinRequest,
    },
    /// Your request to join a room was accepted
    JoinRequestAccepted {
        room_id: PrimaryKey,
        request_id: PrimaryKey,
    },
    /// A new game session started in the room
    GameSessionCreated {
        room_id: PrimaryKey,
        session: GameSession,
    },
    /// A user took a seat in a game session
    GamePlayerJoined {
        room_id: PrimaryKey,
        session_id: PrimaryKey,
        participant: GamePlayer,
    },
    /// A user left a game session
    GamePlayerLeft {
        room_id: PrimaryKey,
        session_id: PrimaryKey,
        user_id: PrimaryKey,
    },
    /// A participant's score changed
    GameScoreUpdated {
        room_id: PrimaryKey,
        session_id: PrimaryKey,
        user_id: PrimaryKey,
        score: i32,
        delta: i32,
    },
    /// A game session reached a terminal state
    GameEnded {
        room_id: PrimaryKey,
        session_id: PrimaryKey,
        ended_by: PrimaryKey,
    },
    /// You were invited into a running game
    GameInvite {
        room_id: PrimaryKey,
        session_id: PrimaryKey,
        inviter: User,
        game: Game,
    },
    /// A room action sent over this connection failed
    RoomError { message: String },
    /// A game action sent over this connection failed
    GameError { message: String },
}

/// Actions clients may send over the gateway connection. Each delegates to
/// the same manager operation the HTTP surface wraps.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type")]
enum ClientMessage {
    SubscribeRoom { room_id: PrimaryKey },
    UnsubscribeRoom { room_id: PrimaryKey },
    LeaveRoom { room_id: PrimaryKey },
    JoinGame { session_id: PrimaryKey },
    LeaveGame { session_id: PrimaryKey },
    EndGame { session_id: PrimaryKey },
    UpdateScore { session_id: PrimaryKey, delta: i32 },
    InviteToGame { session_id: PrimaryKey, user_id: PrimaryKey },
}

#[derive(Debug, Deserialize)]
struct GatewayQuery {
    token: String,
}

pub fn reason_label(reason: LeaveReason) -> &'static str {
    match reason {
        LeaveReason::Left => "left",
        LeaveReason::Disconnected => "disconnected",
    }
}

#[utoipa::path(
    get,
    path = "/v1/gateway",
    tag = "gateway",
    params(
        ("token" = String, Query, description = "Session token")
    ),
    responses(
        (status = 101, description = "Connection upgraded, events follow as JSON text frames", body = ServerEvent)
    )
)]
pub(crate) async fn gateway(
    State(context): State<ServerContext>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, (StatusCode, &'static str)> {
    // Identity is established once, before the upgrade
    let session = context
        .collab
        .session(&query.token)
        .await
        .map_err(|_| (StatusCode::UNAUTHORIZED, "Session does not exist"))?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, context, session.user)))
}

async fn handle_socket(socket: WebSocket, context: ServerContext, user: UserData) {
    let (connection_id, mut events) = context.gateway.register(user.id);

    info!("User {} connected to the gateway", user.username);

    let (mut sink, mut stream) = socket.split();

    let outbound = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let message = serde_json::to_string(&event).expect("serializes properly");

            if sink.send(Message::Text(message)).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(message) => message,
            Err(_) => break,
        };

        match message {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(action) => handle_message(&context, connection_id, &user, action).await,
                Err(e) => context.gateway.send_to_connection(
                    connection_id,
                    ServerEvent::RoomError {
                        message: format!("Unrecognized message: {}", e),
                    },
                ),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    outbound.abort();
    context.gateway.handle_disconnect(connection_id).await;

    info!("User {} disconnected from the gateway", user.username);
}

async fn handle_message(
    context: &ServerContext,
    connection_id: ConnectionId,
    user: &UserData,
    message: ClientMessage,
) {
    match message {
        ClientMessage::SubscribeRoom { room_id } => {
            if let Err(message) = subscribe_room(context, connection_id, user, room_id).await {
                context
                    .gateway
                    .send_to_connection(connection_id, ServerEvent::RoomError { message });
            }
        }
        ClientMessage::UnsubscribeRoom { room_id } => {
            context.gateway.unsubscribe(connection_id, room_id);
        }
        ClientMessage::LeaveRoom { room_id } => {
            let result = context
                .collab
                .rooms
                .leave_room(user.id, room_id, LeaveReason::Left)
                .await;

            if let Err(e) = result {
                context.gateway.send_to_connection(
                    connection_id,
                    ServerEvent::RoomError {
                        message: e.to_string(),
                    },
                );
            }
        }
        ClientMessage::JoinGame { session_id } => {
            report_game_result(
                context,
                connection_id,
                context
                    .collab
                    .games
                    .join_session(session_id, user.id)
                    .await
                    .map(|_| ()),
            );
        }
        ClientMessage::LeaveGame { session_id } => {
            report_game_result(
                context,
                connection_id,
                context
                    .collab
                    .games
                    .leave_session(session_id, user.id)
                    .await
                    .map(|_| ()),
            );
        }
        ClientMessage::EndGame { session_id } => {
            report_game_result(
                context,
                connection_id,
                context
                    .collab
                    .games
                    .end_session(session_id, user.id)
                    .await
                    .map(|_| ()),
            );
        }
        ClientMessage::UpdateScore { session_id, delta } => {
            report_game_result(
                context,
                connection_id,
                context
                    .collab
                    .games
                    .update_score(session_id, user.id, delta)
                    .await
                    .map(|_| ()),
            );
        }
        ClientMessage::InviteToGame {
            session_id,
            user_id,
        } => {
            report_game_result(
                context,
                connection_id,
                context
                    .collab
                    .games
                    .invite(session_id, user.id, user_id)
                    .await,
            );
        }
    }
}

/// Subscribes the connection to a room channel, joining the room the same
/// way the HTTP path does so both entry points agree, and hands the caller
/// a private snapshot of what they just walked into.
async fn subscribe_room(
    context: &ServerContext,
    connection_id: ConnectionId,
    user: &UserData,
    room_id: PrimaryKey,
) -> Result<(), String> {
    let admitted = context
        .collab
        .rooms
        .can_user_join_room(user.id, room_id)
        .await
        .map_err(|e| e.to_string())?;

    if !admitted {
        return Err(parlor_collab::RoomError::RoomLocked.to_string());
    }

    context
        .collab
        .rooms
        .join_room(user.id, room_id)
        .await
        .map_err(|e| e.to_string())?;

    context.gateway.subscribe(connection_id, room_id);

    let details = context
        .collab
        .rooms
        .room_details(room_id)
        .await
        .map_err(|e| e.to_string())?;

    context.gateway.send_to_connection(
        connection_id,
        ServerEvent::RoomData {
            room: details.to_serialized(),
        },
    );

    Ok(())
}

fn report_game_result(
    context: &ServerContext,
    connection_id: ConnectionId,
    result: Result<(), parlor_collab::GameError>,
) {
    if let Err(e) = result {
        context.gateway.send_to_connection(
            connection_id,
            ServerEvent::GameError {
                message: e.to_string(),
            },
        );
    }
}

pub fn router() -> Router {
    Router::new().route("/gateway", get(gateway))
}
