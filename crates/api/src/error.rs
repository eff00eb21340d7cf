use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pricecast_core::model::UnknownModel;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Body missing, not JSON, or missing/mistyped fields.
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    UnknownModel(#[from] UnknownModel),

    #[error("prediction failed")]
    Internal(#[source] anyhow::Error),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::UnknownModel(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Internal(err) => {
                sentry_anyhow::capture_anyhow(err);
                tracing::error!(error = %format!("{err:#}"), "request failed");
            }
            other => tracing::debug!(error = %other, "rejected request"),
        }

        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
