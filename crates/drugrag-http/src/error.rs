//! Error responses

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use drugrag_core::RagError;
use serde_json::json;

/// A failed request, rendered as `{"detail": ...}`
#[derive(Debug)]
pub enum ApiError {
    /// Malformed body
    BadRequest(String),
    /// The pipeline ran past the request deadline
    Timeout { secs: u64 },
    Pipeline(RagError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Pipeline(e) => match e {
                RagError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                RagError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
                RagError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
                RagError::Cancelled => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn detail(&self) -> String {
        match self {
            Self::BadRequest(msg) => msg.clone(),
            Self::Timeout { secs } => format!("Query did not complete within {}s", secs),
            Self::Pipeline(RagError::InvalidInput(msg)) => msg.clone(),
            Self::Pipeline(e) => e.to_string(),
        }
    }
}

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        Self::Pipeline(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Query failed with {}: {}", status, self.detail());
        }

        let mut response = (status, Json(json!({ "detail": self.detail() }))).into_response();
        if let Self::Pipeline(RagError::RateLimited {
            retry_after_secs: Some(secs),
        }) = self
        {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
