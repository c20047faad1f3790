pub mod config;

use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use courier_api::{AppState, AppStateInner};
use courier_db::Database;
use courier_gateway::connection::{self, Handshake};
use courier_gateway::notify::{NotificationDispatcher, VapidConfigStatus, WebPushSender};
use courier_gateway::presence::Presence;
use courier_gateway::router::DeliveryRouter;

use crate::config::ServerConfig;

/// Pick the push transport from the VAPID settings. Push stays off unless
/// all three keys are present and the client initializes.
pub fn notification_dispatcher(vapid: &VapidConfigStatus) -> (NotificationDispatcher, Option<String>) {
    match vapid {
        VapidConfigStatus::Ready(vapid) => match WebPushSender::new(vapid.clone()) {
            Ok(sender) => (
                NotificationDispatcher::new(Arc::new(sender)),
                Some(vapid.public_key.clone()),
            ),
            Err(e) => {
                warn!("push notifications disabled: failed to init web-push ({})", e);
                (NotificationDispatcher::disabled(), None)
            }
        },
        VapidConfigStatus::Incomplete => {
            warn!("push notifications disabled: incomplete VAPID configuration");
            (NotificationDispatcher::disabled(), None)
        }
        VapidConfigStatus::Missing => (NotificationDispatcher::disabled(), None),
    }
}

/// Assemble shared state: one registry, one router, one database.
pub fn build_state(
    config: &ServerConfig,
    db: Database,
    notifier: NotificationDispatcher,
    vapid_public_key: Option<String>,
) -> AppState {
    let router = DeliveryRouter::new(Presence::new(), notifier)
        .with_ack_timeout(config.emit_ack_timeout);

    Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        router,
        vapid_public_key,
    })
}

pub fn app(state: AppState) -> Router {
    let ws_route = Router::new()
        .route("/socket", get(ws_upgrade))
        .with_state(state.clone());

    Router::new()
        .merge(courier_api::routes(state))
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn ws_upgrade(
    State(state): State<AppState>,
    Query(handshake): Query<Handshake>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let presence = state.router.presence().clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, presence, handshake))
}
