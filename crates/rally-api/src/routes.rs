use axum::{
    Router, middleware,
    routing::{delete, get, post},
};

use crate::auth::AppState;
use crate::middleware::require_auth;
use crate::{gateway, matches, messages, presence, swipes};

pub fn router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/swipe", post(swipes::swipe))
        .route("/matches", get(matches::list_matches))
        .route("/matches/{id}", get(matches::get_match))
        .route(
            "/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route("/messages/typing", post(messages::typing))
        .route("/messages/{id}", delete(messages::delete_message))
        .route("/messages/{id}/latest", get(messages::latest_message))
        .route("/messages/{id}/unread-count", get(messages::unread_count))
        .route("/presence/{id}", get(presence::get_presence))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health))
        .route("/gateway", get(gateway::ws_upgrade))
        .merge(protected_routes)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
