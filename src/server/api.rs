use crate::error::ChatError;
use crate::models::api::{ CancelResponse, ChatRequest, HistoryQuery, HistoryResponse };
use crate::proxy::ChatProxy;
use crate::server::rate_limit::{ client_key, RateDecision, RateLimiter };
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use axum::{
    body::{ Body, Bytes },
    extract::{ Path, Query, Request, State },
    http::{ header::{ CONTENT_TYPE, RETRY_AFTER }, HeaderMap, HeaderName, HeaderValue, Method, StatusCode },
    middleware::{ self, Next },
    response::{ IntoResponse, Response },
    routing::{ get, post },
    Json,
    Router,
};
use futures::StreamExt;
use tower_http::cors::{ AllowHeaders, AllowOrigin, CorsLayer };
use log::{ debug, info };

pub const CONVERSATION_ID_HEADER: &str = "x-conversation-id";

#[derive(Clone)]
pub struct AppState {
    proxy: Arc<ChatProxy>,
    limiter: Arc<RateLimiter>,
    client_header: String,
}

impl AppState {
    pub fn new(proxy: Arc<ChatProxy>, limiter: Arc<RateLimiter>, client_header: impl Into<String>) -> Self {
        Self {
            proxy,
            limiter,
            client_header: client_header.into().to_lowercase(),
        }
    }

    pub fn proxy(&self) -> &Arc<ChatProxy> {
        &self.proxy
    }
}

pub fn build_router(state: AppState) -> Router {
    let mut allowed_headers = vec![CONTENT_TYPE];
    if let Ok(name) = HeaderName::from_bytes(state.client_header.as_bytes()) {
        allowed_headers.push(name);
    }

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AllowHeaders::list(allowed_headers))
        .expose_headers([HeaderName::from_static(CONVERSATION_ID_HEADER), RETRY_AFTER])
        .max_age(Duration::from_secs(86_400));

    Router::new()
        .route("/chat", post(chat_handler))
        .route("/chat/{conversation_id}/cancel", post(cancel_handler))
        .route("/history", get(history_handler))
        .fallback(not_found_handler)
        .layer(cors)
        .layer(middleware::from_fn(preflight))
        .with_state(state)
}

async fn chat_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ChatError> {
    let client = client_key(&headers, &state.client_header);
    if let RateDecision::Limited { retry_after } = state.limiter.check(&client) {
        info!("Rate limit hit for client {}", client);
        return Err(ChatError::RateLimited { retry_after });
    }

    let request: ChatRequest = serde_json::from_slice(&body).map_err(|e|
        ChatError::Validation(format!("invalid request body: {}", e))
    )?;
    let message = request.latest_user_message()?.to_string();
    let conversation_id = request.conversation_id()?;
    let options = request.options.unwrap_or_default();

    let turn = state.proxy.handle_chat_turn(conversation_id, &message, options).await?;
    debug!("Streaming reply for conversation {}", turn.conversation_id);

    let header_value = HeaderValue::from_str(&turn.conversation_id).map_err(|_|
        ChatError::Validation("conversation id is not a valid header value".into())
    )?;
    let body = Body::from_stream(turn.body.map(|chunk| Ok::<_, Infallible>(Bytes::from(chunk))));

    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    headers.insert(HeaderName::from_static(CONVERSATION_ID_HEADER), header_value);
    Ok(response)
}

async fn cancel_handler(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> impl IntoResponse {
    if state.proxy.cancel(&conversation_id) {
        info!("Cancelled generation for conversation {}", conversation_id);
        (StatusCode::OK, Json(CancelResponse { status: "cancelled" }))
    } else {
        (StatusCode::NOT_FOUND, Json(CancelResponse { status: "not found or already complete" }))
    }
}

async fn history_handler(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ChatError> {
    let id = query.id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ChatError::Validation("missing 'id' query parameter".into()))?;

    let conversation = state.proxy
        .history(id).await?
        .ok_or_else(|| ChatError::NotFound(format!("conversation '{}' not found", id)))?;

    Ok(Json(HistoryResponse {
        conversation_id: conversation.id,
        history: conversation.messages,
        last_updated: conversation.last_updated,
    }))
}

async fn not_found_handler() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}

/// Every OPTIONS request is answered `204` with an empty body. The CORS layer underneath still
/// decides the allow headers.
async fn preflight(request: Request, next: Next) -> Response {
    let is_options = request.method() == Method::OPTIONS;
    let mut response = next.run(request).await;
    if !is_options {
        return response;
    }
    *response.status_mut() = StatusCode::NO_CONTENT;
    *response.body_mut() = Body::empty();
    response.headers_mut().remove(CONTENT_TYPE);
    response
}
