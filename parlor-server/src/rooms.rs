use axum::{
    extract::{Path, State},
    routing::{get, patch, post},
    Json,
};
use parlor_collab::{LeaveReason, NewRoomParams, RoomPatch};

use crate::{
    auth::Session,
    context::ServerContext,
    errors::ServerResult,
    schemas::{NewRoomSchema, ResolveRequestSchema, UpdateRoomSchema, ValidatedJson},
    serialized::{JoinRequest, JoinedRoom, LeftRoom, Room, RoomDetails, ToSerialized},
    Router,
};

#[utoipa::path(
    get,
    path = "/v1/rooms",
    tag = "rooms",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<Room>)
    )
)]
pub(crate) async fn list_rooms(
    _session: Session,
    State(context): State<ServerContext>,
) -> ServerResult<Json<Vec<Room>>> {
    let rooms = context.collab.rooms.list_rooms().await?;

    Ok(Json(rooms.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/rooms/{id}",
    tag = "rooms",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = RoomDetails)
    )
)]
pub(crate) async fn room_details(
    _session: Session,
    State(context): State<ServerContext>,
    Path(room_id): Path<i32>,
) -> ServerResult<Json<RoomDetails>> {
    let details = context.collab.rooms.room_details(room_id).await?;

    Ok(Json(details.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/rooms",
    tag = "rooms",
    request_body = NewRoomSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Room)
    )
)]
pub(crate) async fn create_room(
    session: Session,
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<NewRoomSchema>,
) -> ServerResult<Json<Room>> {
    let room = context
        .collab
        .rooms
        .create_room(NewRoomParams {
            name: body.name,
            visibility: body.visibility.into(),
            host_id: session.user().id,
        })
        .await?;

    Ok(Json(room.to_serialized()))
}

#[utoipa::path(
    patch,
    path = "/v1/rooms/{id}",
    tag = "rooms",
    request_body = UpdateRoomSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Room)
    )
)]
pub(crate) async fn update_room(
    session: Session,
    State(context): State<ServerContext>,
    Path(room_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<UpdateRoomSchema>,
) -> ServerResult<Json<Room>> {
    let patch = RoomPatch {
        name: body.name,
        visibility: body.visibility.map(Into::into),
        is_locked: body.is_locked,
    };

    let room = context
        .collab
        .rooms
        .update_room(room_id, patch, session.user().id)
        .await?;

    Ok(Json(room.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/rooms/{id}/join",
    tag = "rooms",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = JoinedRoom)
    )
)]
pub(crate) async fn join_room(
    session: Session,
    State(context): State<ServerContext>,
    Path(room_id): Path<i32>,
) -> ServerResult<Json<JoinedRoom>> {
    let joined = context
        .collab
        .rooms
        .join_room(session.user().id, room_id)
        .await?;

    Ok(Json(joined.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/rooms/{id}/leave",
    tag = "rooms",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = LeftRoom)
    )
)]
pub(crate) async fn leave_room(
    session: Session,
    State(context): State<ServerContext>,
    Path(room_id): Path<i32>,
) -> ServerResult<Json<LeftRoom>> {
    let left = context
        .collab
        .rooms
        .leave_room(session.user().id, room_id, LeaveReason::Left)
        .await?;

    Ok(Json(LeftRoom { left }))
}

#[utoipa::path(
    post,
    path = "/v1/rooms/{id}/requests",
    tag = "rooms",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = JoinRequest)
    )
)]
pub(crate) async fn create_join_request(
    session: Session,
    State(context): State<ServerContext>,
    Path(room_id): Path<i32>,
) -> ServerResult<Json<JoinRequest>> {
    let request = context
        .collab
        .rooms
        .create_join_request(session.user().id, room_id)
        .await?;

    Ok(Json(request.to_serialized()))
}

#[utoipa::path(
    patch,
    path = "/v1/requests/{id}",
    tag = "rooms",
    request_body = ResolveRequestSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = JoinRequest)
    )
)]
pub(crate) async fn resolve_join_request(
    session: Session,
    State(context): State<ServerContext>,
    Path(request_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<ResolveRequestSchema>,
) -> ServerResult<Json<JoinRequest>> {
    let request = context
        .collab
        .rooms
        .resolve_join_request(request_id, body.accept, session.user().id)
        .await?;

    Ok(Json(request.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/rooms", get(list_rooms))
        .route("/rooms", post(create_room))
        .route("/rooms/:id", get(room_details))
        .route("/rooms/:id", patch(update_room))
        .route("/rooms/:id/join", post(join_room))
        .route("/rooms/:id/leave", post(leave_room))
        .route("/rooms/:id/requests", post(create_join_request))
        .route("/requests/:id", patch(resolve_join_request))
}
