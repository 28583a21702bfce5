use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};

use rally_types::api::PresenceResponse;
use rally_types::models::PartyId;

use crate::auth::AppState;
use crate::error::ApiError;

pub async fn get_presence(
    State(state): State<AppState>,
    Path(party_id): Path<PartyId>,
) -> Result<impl IntoResponse, ApiError> {
    let online = state.engine.is_online(party_id).await?;
    Ok(Json(PresenceResponse { party_id, online }))
}
