use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use rally_engine::chat::{DEFAULT_PAGE_LIMIT, NewMessage};
use rally_types::api::{Claims, SendMessageRequest, TypingRequest, UnreadCountResponse};
use rally_types::error::Error;
use rally_types::models::{MatchId, MessageId};

use crate::auth::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub match_id: MatchId,
    #[serde(default)]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    DEFAULT_PAGE_LIMIT
}

pub async fn get_messages(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let page = state
        .engine
        .list_messages(claims.sub, query.match_id, query.page, query.limit)
        .await?;
    Ok(Json(page))
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = state
        .engine
        .send_message(
            claims.sub,
            NewMessage {
                match_id: req.match_id,
                content: req.content,
                message_type: req.message_type,
                media_url: req.media_url,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<MessageId>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    state.engine.delete_message(claims.sub, message_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn latest_message(
    State(state): State<AppState>,
    Path(match_id): Path<MatchId>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let latest = state
        .engine
        .latest_message(claims.sub, match_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("no messages on match {}", match_id)))?;
    Ok(Json(latest))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Path(match_id): Path<MatchId>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let unread_count = state.engine.unread_count(claims.sub, match_id).await?;
    Ok(Json(UnreadCountResponse { unread_count }))
}

pub async fn typing(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<TypingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .engine
        .typing(claims.sub, req.match_id, req.is_typing)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
