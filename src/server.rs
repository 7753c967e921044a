//! HTTP API server.
//!
//! # Endpoints
//!
//! | Method | Path | Auth | Description |
//! |--------|------|------|-------------|
//! | `GET`  | `/health` | public | Health check (returns version) |
//! | `POST` | `/api/chat/` | public | Answer a message |
//! | `GET`  | `/api/faqs/` | public | List the knowledge base |
//! | `POST` | `/api/token/` | public | Exchange credentials for tokens |
//! | `POST` | `/api/token/refresh/` | public | Exchange a refresh token for an access token |
//! | `GET`  | `/api/chat-logs/` | admin | Exchange log, most recent first |
//! | `GET`  | `/api/analytics/` | admin | Analytics report |
//! | `POST` | `/api/admin/faqs/` | admin | Create an FAQ entry |
//! | `PUT`  | `/api/admin/faqs/{id}` | admin | Replace an FAQ entry |
//! | `DELETE` | `/api/admin/faqs/{id}` | admin | Delete an FAQ entry |
//!
//! `/api/admin/chat-logs/` and `/api/admin/analytics/` are accepted as
//! aliases. Every `/api` route passes through the per-client rate limiter.
//!
//! # Error Contract
//!
//! ```json
//! { "error": "Message is required", "code": "bad_request" }
//! ```
//!
//! Codes: `bad_request` (400), `unauthorized` (401), `forbidden` (403),
//! `not_found` (404), `rate_limited` (429), `internal` (500).

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        ConnectInfo, Path, Request, State,
    },
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::analytics::{compute_analytics, AnalyticsReport};
use crate::auth::{self, AuthError, TokenIssuer};
use crate::chat::{ChatError, ChatReply, ChatService};
use crate::config::Config;
use crate::llm::{self, LanguageModel};
use crate::models::{FaqEntry, HistoryTurn, NewFaq, User};
use crate::rate_limit::{FixedWindowLimiter, RateLimited};
use crate::store::{SqliteStore, Store};

/// Message returned with every 429.
pub const RATE_LIMIT_MESSAGE: &str =
    "Too many requests. Please slow down and try again in a minute.";

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    chat: Arc<ChatService>,
    store: Arc<dyn Store>,
    tokens: Arc<TokenIssuer>,
    limiter: Arc<FixedWindowLimiter>,
}

impl AppState {
    pub fn new(
        config: &Config,
        store: Arc<dyn Store>,
        model: Arc<dyn LanguageModel>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            chat: Arc::new(ChatService::new(store.clone(), model, config.chat.clone())),
            store,
            tokens: Arc::new(TokenIssuer::from_config(&config.auth)?),
            limiter: Arc::new(FixedWindowLimiter::from_config(&config.rate_limit)),
        })
    }
}

/// Starts the API server against the configured SQLite database and
/// language-model provider. Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(config).await?);
    let model = llm::create_model(&config.llm)?;
    run_server_with(config, store, model).await
}

/// Starts the API server with explicitly supplied collaborators.
pub async fn run_server_with(
    config: &Config,
    store: Arc<dyn Store>,
    model: Arc<dyn LanguageModel>,
) -> anyhow::Result<()> {
    let model_name = model.model_name().to_string();
    let state = AppState::new(config, store, model)?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(
        bind = %config.server.bind,
        model = %model_name,
        "server listening"
    );
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/chat/", post(handle_chat))
        .route("/faqs/", get(handle_list_faqs))
        .route("/token/", post(handle_token))
        .route("/token/refresh/", post(handle_token_refresh))
        .route("/chat-logs/", get(handle_chat_logs))
        .route("/admin/chat-logs/", get(handle_chat_logs))
        .route("/analytics/", get(handle_analytics))
        .route("/admin/analytics/", get(handle_analytics))
        .route("/admin/faqs/", post(handle_create_faq))
        .route(
            "/admin/faqs/{id}",
            put(handle_update_faq).delete(handle_delete_faq),
        )
        .route(
            "/admin/faqs/{id}/",
            put(handle_update_faq).delete(handle_delete_faq),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            enforce_rate_limit,
        ));

    Router::new()
        .route("/health", get(handle_health))
        .nest("/api", api)
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: String,
}

/// Internal error type that converts into an Axum HTTP response.
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
            code: self.code.to_string(),
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    error!(error = %err, "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: "Internal server error".to_string(),
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        internal(err)
    }
}

impl From<ChatError> for AppError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::EmptyMessage => bad_request(err.to_string()),
            ChatError::Store(e) => internal(e),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingToken
            | AuthError::InvalidToken(_)
            | AuthError::InvalidCredentials => AppError {
                status: StatusCode::UNAUTHORIZED,
                code: "unauthorized",
                message: err.to_string(),
            },
            AuthError::Forbidden => AppError {
                status: StatusCode::FORBIDDEN,
                code: "forbidden",
                message: err.to_string(),
            },
            AuthError::Internal(e) => internal(e),
        }
    }
}

impl From<RateLimited> for AppError {
    fn from(_: RateLimited) -> Self {
        AppError {
            status: StatusCode::TOO_MANY_REQUESTS,
            code: "rate_limited",
            message: RATE_LIMIT_MESSAGE.to_string(),
        }
    }
}

// ============ Middleware ============

/// Client address: first `X-Forwarded-For` hop, else the socket peer.
fn client_key(headers: &HeaderMap, peer: Option<&ConnectInfo<SocketAddr>>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match (forwarded, peer) {
        (Some(ip), _) => ip.to_string(),
        (None, Some(ConnectInfo(addr))) => addr.ip().to_string(),
        (None, None) => "unknown".to_string(),
    }
}

async fn enforce_rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let key = client_key(req.headers(), req.extensions().get::<ConnectInfo<SocketAddr>>());
    match state.limiter.check(&key) {
        Ok(()) => next.run(req).await,
        Err(limited) => {
            warn!(
                client = %key,
                path = %req.uri().path(),
                retry_after_secs = limited.retry_after.as_secs(),
                "rate limit exceeded"
            );
            let retry_after = limited.retry_after.as_secs().max(1).to_string();
            let mut response = AppError::from(limited).into_response();
            if let Ok(value) = retry_after.parse() {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
            response
        }
    }
}

async fn admin(state: &AppState, headers: &HeaderMap) -> Result<User, AppError> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    Ok(auth::require_admin(state.store.as_ref(), &state.tokens, authorization).await?)
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/chat/ ============

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    /// `null` and absent are both treated as no history.
    #[serde(default)]
    history: Option<Vec<HistoryTurn>>,
}

async fn handle_chat(
    State(state): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatReply>, AppError> {
    let Json(req) = body.map_err(|e| bad_request(e.body_text()))?;
    let message = req.message.unwrap_or_default();

    let reply = state
        .chat
        .handle_message(
            &message,
            req.session_id.as_deref(),
            req.history.as_deref().unwrap_or_default(),
        )
        .await?;

    Ok(Json(reply))
}

// ============ GET /api/chat-logs/ ============

#[derive(Serialize)]
struct LogEntry {
    session_id: String,
    message: String,
    response: String,
    /// RFC 3339, UTC.
    timestamp: String,
}

async fn handle_chat_logs(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<LogEntry>>, AppError> {
    admin(&state, &headers).await?;

    let logs = state
        .store
        .list_exchanges()
        .await?
        .into_iter()
        .map(|e| LogEntry {
            session_id: e.session_id,
            message: e.message,
            response: e.response,
            timestamp: e.timestamp.to_rfc3339(),
        })
        .collect();

    Ok(Json(logs))
}

// ============ GET /api/analytics/ ============

async fn handle_analytics(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<AnalyticsReport>, AppError> {
    admin(&state, &headers).await?;

    let exchanges = state.store.list_exchanges().await?;
    let faqs = state.store.list_faqs().await?;
    Ok(Json(compute_analytics(&exchanges, &faqs)))
}

// ============ FAQ routes ============

async fn handle_list_faqs(State(state): State<AppState>) -> Result<Json<Vec<FaqEntry>>, AppError> {
    Ok(Json(state.store.list_faqs().await?))
}

fn parse_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, AppError> {
    path.map(|Path(id)| id)
        .map_err(|e| bad_request(format!("invalid faq id: {}", e.body_text())))
}

fn parse_faq(body: Result<Json<NewFaq>, JsonRejection>) -> Result<NewFaq, AppError> {
    let Json(faq) = body.map_err(|e| bad_request(e.body_text()))?;
    if let Some(field) = faq.missing_field() {
        return Err(bad_request(format!("{} must not be empty", field)));
    }
    Ok(faq)
}

async fn handle_create_faq(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<NewFaq>, JsonRejection>,
) -> Result<(StatusCode, Json<FaqEntry>), AppError> {
    let user = admin(&state, &headers).await?;
    let faq = parse_faq(body)?;

    let entry = state.store.create_faq(&faq).await?;
    info!(faq_id = entry.id, by = %user.username, "faq created");
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn handle_update_faq(
    State(state): State<AppState>,
    headers: HeaderMap,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<NewFaq>, JsonRejection>,
) -> Result<Json<FaqEntry>, AppError> {
    let user = admin(&state, &headers).await?;
    let id = parse_id(path)?;
    let faq = parse_faq(body)?;

    let entry = state
        .store
        .update_faq(id, &faq)
        .await?
        .ok_or_else(|| not_found(format!("faq not found: {}", id)))?;
    info!(faq_id = id, by = %user.username, "faq updated");
    Ok(Json(entry))
}

async fn handle_delete_faq(
    State(state): State<AppState>,
    headers: HeaderMap,
    path: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, AppError> {
    let user = admin(&state, &headers).await?;
    let id = parse_id(path)?;

    if !state.store.delete_faq(id).await? {
        return Err(not_found(format!("faq not found: {}", id)));
    }
    info!(faq_id = id, by = %user.username, "faq deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ============ Tokens ============

#[derive(Deserialize)]
struct TokenRequest {
    username: String,
    password: String,
}

async fn handle_token(
    State(state): State<AppState>,
    body: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<Json<auth::TokenPair>, AppError> {
    let Json(req) = body.map_err(|e| bad_request(e.body_text()))?;
    let user = auth::authenticate(state.store.as_ref(), &req.username, &req.password).await?;
    Ok(Json(state.tokens.issue_pair(&user)?))
}

#[derive(Deserialize)]
struct RefreshRequest {
    refresh: String,
}

#[derive(Serialize)]
struct RefreshResponse {
    access: String,
}

async fn handle_token_refresh(
    State(state): State<AppState>,
    body: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<RefreshResponse>, AppError> {
    let Json(req) = body.map_err(|e| bad_request(e.body_text()))?;
    let access = state
        .tokens
        .refresh(state.store.as_ref(), &req.refresh)
        .await?;
    Ok(Json(RefreshResponse { access }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_key_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        let peer = ConnectInfo("127.0.0.1:5000".parse::<SocketAddr>().unwrap());
        assert_eq!(client_key(&headers, Some(&peer)), "203.0.113.7");
    }

    #[test]
    fn test_client_key_falls_back_to_peer() {
        let peer = ConnectInfo("192.0.2.1:5000".parse::<SocketAddr>().unwrap());
        assert_eq!(client_key(&HeaderMap::new(), Some(&peer)), "192.0.2.1");
        assert_eq!(client_key(&HeaderMap::new(), None), "unknown");
    }

    #[test]
    fn test_auth_errors_map_to_statuses() {
        let unauth = AppError::from(AuthError::MissingToken);
        assert_eq!(unauth.status, StatusCode::UNAUTHORIZED);
        let forbidden = AppError::from(AuthError::Forbidden);
        assert_eq!(forbidden.status, StatusCode::FORBIDDEN);
        let empty = AppError::from(ChatError::EmptyMessage);
        assert_eq!(empty.status, StatusCode::BAD_REQUEST);
        assert_eq!(empty.message, "Message is required");
    }
}
