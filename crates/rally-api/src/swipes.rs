use axum::{Extension, Json, extract::State, response::IntoResponse};

use rally_types::api::{Claims, SwipeRequest};

use crate::auth::AppState;
use crate::error::ApiError;

pub async fn swipe(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SwipeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = state
        .engine
        .swipe(claims.sub, req.swipee_id, req.direction)
        .await?;
    Ok(Json(response))
}
