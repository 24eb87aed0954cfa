use axum::Json;
use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};

use crate::{games, rooms, schemas, serialized, ws};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "parlor API",
        description = "Exposes endpoints to interact with a parlor server"
    ),
    paths(
        rooms::list_rooms,
        rooms::room_details,
        rooms::create_room,
        rooms::update_room,
        rooms::join_room,
        rooms::leave_room,
        rooms::create_join_request,
        rooms::resolve_join_request,
        games::list_games,
        games::game,
        games::create_session,
        games::session_details,
        games::join_session,
        games::leave_session,
        games::end_session,
        games::update_score,
        games::invite,
        ws::gateway,
    ),
    components(schemas(
        serialized::User,
        serialized::Game,
        serialized::Room,
        serialized::Participant,
        serialized::RoomDetails,
        serialized::JoinedRoom,
        serialized::LeftRoom,
        serialized::JoinRequest,
        serialized::GameSession,
        serialized::GamePlayer,
        serialized::SessionDetails,
        serialized::RoomPatchView,
        schemas::VisibilitySchema,
        schemas::NewRoomSchema,
        schemas::UpdateRoomSchema,
        schemas::ResolveRequestSchema,
        schemas::NewSessionSchema,
        schemas::ScoreSchema,
        schemas::InviteSchema,
        ws::ServerEvent,
    )),
    modifiers(&BearerAuth)
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "BearerAuth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

pub(crate) async fn serve_api() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
