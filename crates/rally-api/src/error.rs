use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use rally_types::api::ErrorBody;
use rally_types::error::{Error, ErrorKind};

/// Engine error rendered as `{"error", "kind"}` with a status per kind.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorKind::NotAuthorized => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::TransientStore => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        if matches!(kind, ErrorKind::Internal | ErrorKind::TransientStore) {
            error!("Request failed: {}", self.0);
        }

        let body = ErrorBody {
            error: self.0.to_string(),
            kind,
        };
        (status_for(kind), Json(body)).into_response()
    }
}
