use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};

use rally_types::api::{Claims, MatchListResponse};
use rally_types::models::MatchId;

use crate::auth::AppState;
use crate::error::ApiError;

pub async fn list_matches(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let matches = state.engine.matches_for(claims.sub).await?;
    Ok(Json(MatchListResponse {
        count: matches.len(),
        matches,
    }))
}

pub async fn get_match(
    State(state): State<AppState>,
    Path(match_id): Path<MatchId>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let found = state.engine.get_match(claims.sub, match_id).await?;
    Ok(Json(found))
}
