use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json,
};

use crate::{
    auth::Session,
    context::ServerContext,
    errors::ServerResult,
    schemas::{InviteSchema, NewSessionSchema, ScoreSchema, ValidatedJson},
    serialized::{Game, GamePlayer, GameSession, LeftRoom, SessionDetails, ToSerialized},
    Router,
};

#[utoipa::path(
    get,
    path = "/v1/games",
    tag = "games",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<Game>)
    )
)]
pub(crate) async fn list_games(
    _session: Session,
    State(context): State<ServerContext>,
) -> ServerResult<Json<Vec<Game>>> {
    let games = context.collab.games.list_games().await?;

    Ok(Json(games.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/games/{id}",
    tag = "games",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Game)
    )
)]
pub(crate) async fn game(
    _session: Session,
    State(context): State<ServerContext>,
    Path(game_id): Path<i32>,
) -> ServerResult<Json<Game>> {
    let game = context.collab.games.game(game_id).await?;

    Ok(Json(game.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/rooms/{id}/sessions",
    tag = "games",
    request_body = NewSessionSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = SessionDetails)
    )
)]
pub(crate) async fn create_session(
    session: Session,
    State(context): State<ServerContext>,
    Path(room_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<NewSessionSchema>,
) -> ServerResult<Json<SessionDetails>> {
    let details = context
        .collab
        .games
        .create_session(body.game_id, room_id, session.user().id)
        .await?;

    Ok(Json(details.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/sessions/{id}",
    tag = "games",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = SessionDetails)
    )
)]
pub(crate) async fn session_details(
    _session: Session,
    State(context): State<ServerContext>,
    Path(session_id): Path<i32>,
) -> ServerResult<Json<SessionDetails>> {
    let details = context.collab.games.session_details(session_id).await?;

    Ok(Json(details.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/sessions/{id}/join",
    tag = "games",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = SessionDetails)
    )
)]
pub(crate) async fn join_session(
    session: Session,
    State(context): State<ServerContext>,
    Path(session_id): Path<i32>,
) -> ServerResult<Json<SessionDetails>> {
    let details = context
        .collab
        .games
        .join_session(session_id, session.user().id)
        .await?;

    Ok(Json(details.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/sessions/{id}/leave",
    tag = "games",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = LeftRoom)
    )
)]
pub(crate) async fn leave_session(
    session: Session,
    State(context): State<ServerContext>,
    Path(session_id): Path<i32>,
) -> ServerResult<Json<LeftRoom>> {
    let left = context
        .collab
        .games
        .leave_session(session_id, session.user().id)
        .await?;

    Ok(Json(LeftRoom { left }))
}

#[utoipa::path(
    post,
    path = "/v1/sessions/{id}/end",
    tag = "games",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = GameSession)
    )
)]
pub(crate) async fn end_session(
    session: Session,
    State(context): State<ServerContext>,
    Path(session_id): Path<i32>,
) -> ServerResult<Json<GameSession>> {
    let completed = context
        .collab
        .games
        .end_session(session_id, session.user().id)
        .await?;

    Ok(Json(completed.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/sessions/{id}/score",
    tag = "games",
    request_body = ScoreSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = GamePlayer)
    )
)]
pub(crate) async fn update_score(
    session: Session,
    State(context): State<ServerContext>,
    Path(session_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<ScoreSchema>,
) -> ServerResult<Json<GamePlayer>> {
    let participant = context
        .collab
        .games
        .update_score(session_id, session.user().id, body.delta)
        .await?;

    Ok(Json(participant.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/sessions/{id}/invites",
    tag = "games",
    request_body = InviteSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "The invitee was notified.")
    )
)]
pub(crate) async fn invite(
    session: Session,
    State(context): State<ServerContext>,
    Path(session_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<InviteSchema>,
) -> ServerResult<()> {
    context
        .collab
        .games
        .invite(session_id, session.user().id, body.user_id)
        .await?;

    Ok(())
}

pub fn router() -> Router {
    Router::new()
        .route("/games", get(list_games))
        .route("/games/:id", get(game))
        .route("/rooms/:id/sessions", post(create_session))
        .route("/sessions/:id", get(session_details))
        .route("/sessions/:id/join", post(join_session))
        .route("/sessions/:id/leave", post(leave_session))
        .route("/sessions/:id/end", post(end_session))
        .route("/sessions/:id/score", post(update_score))
        .route("/sessions/:id/invites", post(invite))
}
