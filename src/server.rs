use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::sync::{RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tower_http::{services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{info, warn};
use ::time::{format_description::well_known, OffsetDateTime};

use crate::{
    engine::{nmap_args, ScanEngine},
    normalize::normalize,
    resolver::resolve,
    types::{DirectiveSet, ScanIntent, ScanResult},
};

#[derive(Clone)]
pub struct AppState {
    engine: Arc<dyn ScanEngine>,
    inner: Arc<RwLock<ServerState>>,
    // one permit: a session never has two scans in flight
    scan_slot: Arc<Semaphore>,
}

#[derive(Debug, Default)]
struct ServerState {
    last: Option<CompletedScan>,
}

impl AppState {
    pub fn new(engine: Arc<dyn ScanEngine>) -> Self {
        Self {
            engine,
            inner: Arc::new(RwLock::new(ServerState::default())),
            scan_slot: Arc::new(Semaphore::new(1)),
        }
    }
}

/// Last finished scan, as served by `GET /api/results`.
#[derive(Debug, Clone, Serialize)]
pub struct CompletedScan {
    pub target: String,
    pub finished_at: String,
    #[serde(flatten)]
    pub result: ScanResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub state: String, // "idle" | "running"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_finished_at: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResolveResponse {
    pub directives: DirectiveSet,
    pub args: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ApiError {
    error: String,
}

fn api_error(code: StatusCode, error: impl Into<String>) -> Response {
    (code, Json(ApiError { error: error.into() })).into_response()
}

/// `Json` extractor whose rejections use the API's `{error}` body.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(api_error(rejection.status(), rejection.body_text())),
        }
    }
}

/// JSON API without the static UI.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/resolve", post(post_resolve))
        .route("/scan", post(post_scan))
        .route("/results", get(get_results))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(state)
}

/// API under `/api`, static form UI from `ui_dir` for everything else.
pub fn app(state: AppState, ui_dir: &str) -> Router {
    let static_svc = ServeDir::new(ui_dir).append_index_html_on_directories(true);
    Router::new()
        .nest("/api", api_router(state))
        .fallback_service(static_svc)
        .layer(TraceLayer::new_for_http())
}

/// Serve until `shutdown` is cancelled.
pub async fn spawn_server(bind: &str, state: AppState, shutdown: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!("serving UI on http://{}", bind);
    axum::serve(listener, app(state, "ui"))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn get_status(State(app): State<AppState>) -> impl IntoResponse {
    let running = app.scan_slot.available_permits() == 0;
    let s = app.inner.read().await;
    let out = Status {
        state: if running { "running" } else { "idle" }.into(),
        last_finished_at: s.last.as_ref().map(|c| c.finished_at.clone()),
    };
    (StatusCode::OK, Json(out))
}

async fn get_results(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    if let Some(last) = s.last.as_ref() {
        (StatusCode::OK, Json(last.clone())).into_response()
    } else {
        StatusCode::NO_CONTENT.into_response()
    }
}

async fn post_resolve(ApiJson(intent): ApiJson<ScanIntent>) -> Response {
    match resolve(&intent) {
        Ok(directives) => {
            let args = nmap_args(&directives);
            (StatusCode::OK, Json(ResolveResponse { directives, args })).into_response()
        }
        Err(e) => api_error(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

async fn post_scan(State(app): State<AppState>, ApiJson(intent): ApiJson<ScanIntent>) -> Response {
    let directives = match resolve(&intent) {
        Ok(d) => d,
        Err(e) => {
            warn!("rejected scan request: {e}");
            return api_error(StatusCode::BAD_REQUEST, e.to_string());
        }
    };

    let Ok(_permit) = app.scan_slot.clone().try_acquire_owned() else {
        return api_error(StatusCode::CONFLICT, "a scan is already running");
    };

    let target = intent.target.trim().to_string();
    let raw = app.engine.run(&target, &directives).await;
    match normalize(raw) {
        Ok(result) => {
            info!(
                target = %target,
                entries = result.entries.len(),
                dropped = result.dropped,
                "scan finished"
            );
            let completed = CompletedScan {
                target,
                finished_at: now_rfc3339(),
                result: result.clone(),
            };
            app.inner.write().await.last = Some(completed);
            (StatusCode::OK, Json(result)).into_response()
        }
        Err(e) => api_error(StatusCode::BAD_GATEWAY, e.to_string()),
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
