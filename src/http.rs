use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, RwLock};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::{GraylogMcpError, Result};
use crate::mcp::{process_request, RpcRequest, RpcResponse};
use crate::tools::GraylogTools;

type Sessions = Arc<RwLock<HashMap<String, mpsc::UnboundedSender<Event>>>>;

#[derive(Clone)]
pub struct AppState {
    pub tools: Arc<GraylogTools>,
    pub sessions: Sessions,
    next_session: Arc<AtomicU64>,
}

async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "graylog-mcp",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn root(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "name": "graylog-mcp",
        "version": env!("CARGO_PKG_VERSION"),
        "graylog_endpoint": state.tools.endpoint(),
        "endpoints": {
            "health_check": "/health_check",
            "mcp": "/mcp",
            "sse": "/sse",
            "message": "/message?session_id=<id>"
        }
    }))
}

/// 直接的 JSON-RPC over HTTP：请求体为一条消息，响应体为结果。
async fn mcp_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<RpcRequest>, JsonRejection>,
) -> impl IntoResponse {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(RpcResponse::parse_error(format!("invalid request body: {e}"))),
            )
                .into_response()
        }
    };
    match process_request(&state.tools, req).await {
        Some(resp) => (StatusCode::OK, Json(resp)).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

impl AppState {
    pub fn new(tools: Arc<GraylogTools>) -> Self {
        Self {
            tools,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            next_session: Arc::new(AtomicU64::new(0)),
        }
    }
}

/// 随 SSE 流一起释放：客户端断开后把会话从表中移除。
struct SessionGuard {
    session_id: String,
    sessions: Sessions,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let session_id = std::mem::take(&mut self.session_id);
        if let Ok(mut sessions) = self.sessions.try_write() {
            sessions.remove(&session_id);
            info!(session_id = %session_id, "SSE session closed");
            return;
        }
        // lock is busy; finish the removal on the runtime
        let sessions = self.sessions.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                sessions.write().await.remove(&session_id);
                info!(session_id = %session_id, "SSE session closed");
            });
        }
    }
}

async fn sse_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>> {
    let (tx, rx) = mpsc::unbounded_channel();
    let session_id = format!(
        "{}-{}",
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0),
        state.next_session.fetch_add(1, Ordering::Relaxed)
    );

    // relative URI; clients resolve it against the SSE URL
    let endpoint_url = format!("/message?session_id={}", session_id);
    let _ = tx.send(Event::default().event("endpoint").data(endpoint_url));

    state.sessions.write().await.insert(session_id.clone(), tx);
    info!(session_id = %session_id, "SSE session opened");

    let guard = SessionGuard {
        session_id,
        sessions: state.sessions.clone(),
    };
    let stream = UnboundedReceiverStream::new(rx).map(move |event| {
        let _session = &guard;
        Ok::<_, axum::Error>(event)
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Deserialize)]
struct MessageQuery {
    session_id: String,
}

async fn message_handler(
    State(state): State<AppState>,
    Query(q): Query<MessageQuery>,
    payload: std::result::Result<Json<RpcRequest>, JsonRejection>,
) -> impl IntoResponse {
    let sender = state.sessions.read().await.get(&q.session_id).cloned();
    let Some(sender) = sender else {
        return StatusCode::NOT_FOUND;
    };
    let req = match payload {
        Ok(Json(req)) => req,
        Err(e) => {
            debug!(error = %e, "rejected SSE message body");
            return StatusCode::BAD_REQUEST;
        }
    };

    let tools = state.tools.clone();
    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        let Some(resp) = process_request(&tools, req).await else {
            return;
        };
        if let Ok(json_str) = serde_json::to_string(&resp) {
            if sender.send(Event::default().event("message").data(json_str)).is_err() {
                // client went away
                sessions.write().await.remove(&q.session_id);
                warn!(session_id = %q.session_id, "SSE session closed, response dropped");
            }
        }
    });
    StatusCode::ACCEPTED
}

pub fn build_router(tools: Arc<GraylogTools>) -> Router {
    router(AppState::new(tools))
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health_check", get(health_check))
        .route("/mcp", post(mcp_handler))
        .route("/sse", get(sse_handler))
        .route("/message", post(message_handler))
        .with_state(state)
}

pub async fn serve_http(tools: Arc<GraylogTools>, server: &ServerConfig) -> Result<()> {
    let router = build_router(tools);
    let addr = format!("{}:{}", server.host, server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| GraylogMcpError::ConfigError(format!("bind {addr} failed: {e}")))?;
    info!(addr = %addr, "HTTP transport listening");
    axum::serve(listener, router).await.map_err(|e| e.into())
}
