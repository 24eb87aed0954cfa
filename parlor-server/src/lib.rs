mod auth;
mod context;
mod docs;
mod errors;
mod games;
mod gateway;
mod rooms;
mod schemas;
mod serialized;
mod ws;

pub mod logging;

use std::{
    env,
    net::{Ipv6Addr, SocketAddr},
    sync::Arc,
};

use axum::routing::get;
use log::info;
use parlor_collab::Collab;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::gateway::Gateway;

pub use context::ServerContext;

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 9080;

pub type Router = axum::Router<ServerContext>;

/// Starts the parlor server
pub async fn run_server(collab: Arc<Collab>) {
    let port = env::var("PARLOR_SERVER_PORT")
        .map(|x| x.parse::<u16>().expect("Port must be a number"))
        .unwrap_or(DEFAULT_PORT);

    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, port).into();

    let gateway = Gateway::new(&collab);
    gateway.run(collab.events());

    let context = ServerContext { collab, gateway };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let version_one_router = Router::new()
        .merge(rooms::router())
        .merge(games::router())
        .merge(ws::router());

    let root_router = axum::Router::new()
        .nest("/v1", version_one_router)
        .route("/api.json", get(docs::serve_api))
        .layer(cors)
        .with_state(context);

    let listener = TcpListener::bind(&addr).await.expect("listens on address");

    info!("Listening on port {}", port);

    axum::serve(listener, root_router.into_make_service())
        .await
        .expect("server runs");
}
