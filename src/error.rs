use crate::history::StoreError;
use crate::llm::ProviderError;
use crate::models::api::ErrorResponse;
use axum::http::{ header::RETRY_AFTER, HeaderValue, StatusCode };
use axum::response::{ IntoResponse, Response };
use axum::Json;
use log::{ error, warn };
use thiserror::Error;

/// Everything a chat-facing request can fail with. Store failures on the chat path are
/// absorbed by the conversation store and never reach this type; `Store` is only produced by
/// the history lookup.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0}")]
    Validation(String),

    #[error("model provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("rate limit exceeded, retry in {retry_after}s")]
    RateLimited {
        retry_after: u64,
    },

    #[error("{0}")]
    NotFound(String),
}

impl ChatError {
    pub fn status(&self) -> StatusCode {
        match self {
            ChatError::Validation(_) => StatusCode::BAD_REQUEST,
            ChatError::Provider(_) => StatusCode::BAD_GATEWAY,
            ChatError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ChatError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ChatError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ChatError::Provider(e) => error!("Upstream model call failed: {}", e),
            ChatError::Store(e) => error!("History backend failed: {}", e),
            ChatError::Validation(msg) => warn!("Rejected request: {}", msg),
            _ => {}
        }

        let mut response = (status, Json(ErrorResponse { error: self.to_string() })).into_response();
        if let ChatError::RateLimited { retry_after } = self {
            response.headers_mut().insert(RETRY_AFTER, HeaderValue::from(retry_after));
        }
        response
    }
}
