use std::net::TcpListener;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::header::{CONTENT_TYPE, ORIGIN};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use percent_encoding::percent_decode_str;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::logger::Logger;
use crate::models::SelectedFile;
use crate::session::{AnalyzeOutcome, Dashboard};

const DASHBOARD_PAGE: &str = include_str!("dashboard.html");
const FILE_NAME_HEADER: &str = "x-file-name";

pub struct RouterState {
  pub started_at: Instant,
  pub dashboard: Dashboard,
  pub logger: Arc<Logger>,
  /// Browser origins allowed to drive the session; see [`loopback_origins`].
  pub allowed_origins: Vec<HeaderValue>,
}

/// The dashboard's own origins when served on `port`.
pub fn loopback_origins(port: u16) -> Vec<HeaderValue> {
  [format!("http://127.0.0.1:{port}"), format!("http://localhost:{port}")]
    .iter()
    .filter_map(|origin| HeaderValue::from_str(origin).ok())
    .collect()
}

pub fn build_router(state: RouterState) -> Router {
  let cors = CorsLayer::new()
    .allow_origin(AllowOrigin::list(state.allowed_origins.clone()))
    .allow_methods([Method::GET, Method::POST])
    .allow_headers([CONTENT_TYPE, HeaderName::from_static(FILE_NAME_HEADER)]);
  let state = Arc::new(state);

  Router::new()
    .route("/", get(index))
    .route("/health", get(health))
    .route("/v1/session", get(session))
    .route("/v1/image", post(upload_image))
    .route("/v1/analyze", post(analyze))
    .route("/v1/reset", post(reset))
    .layer(DefaultBodyLimit::disable())
    .layer(middleware::from_fn_with_state(state.clone(), reject_foreign_origin))
    .layer(cors)
    .with_state(state)
}

/// CORS alone does not stop simple cross-site POSTs from executing, so requests that carry
/// a foreign `Origin` are refused before reaching a handler. Requests without one (the page
/// itself on GET, command-line clients) pass.
async fn reject_foreign_origin(
  State(state): State<Arc<RouterState>>,
  request: Request,
  next: Next,
) -> Response {
  if origin_allowed(request.headers(), &state.allowed_origins) {
    next.run(request).await
  } else {
    state.logger.warn(&format!(
      "refused {} {} from foreign origin {:?}",
      request.method(),
      request.uri().path(),
      request.headers().get(ORIGIN)
    ));
    error_response(StatusCode::FORBIDDEN, "forbidden_origin", "Origin not allowed.")
  }
}

fn origin_allowed(headers: &HeaderMap, allowed: &[HeaderValue]) -> bool {
  match headers.get(ORIGIN) {
    None => true,
    Some(origin) => allowed.contains(origin),
  }
}

pub async fn run_router(listener: TcpListener, state: RouterState) -> anyhow::Result<()> {
  listener.set_nonblocking(true)?;
  let app = build_router(state);
  let listener = tokio::net::TcpListener::from_std(listener)?;
  axum::serve(listener, app).await?;
  Ok(())
}

async fn index() -> Html<&'static str> {
  Html(DASHBOARD_PAGE)
}

async fn health(State(state): State<Arc<RouterState>>) -> Json<serde_json::Value> {
  let uptime = state.started_at.elapsed().as_millis();
  Json(serde_json::json!({
    "status": "ok",
    "version": env!("CARGO_PKG_VERSION"),
    "uptime_ms": uptime,
    "credential_configured": state.dashboard.has_credential()
  }))
}

async fn session(State(state): State<Arc<RouterState>>) -> Response {
  (StatusCode::OK, Json(state.dashboard.snapshot().await)).into_response()
}

async fn upload_image(
  State(state): State<Arc<RouterState>>,
  headers: HeaderMap,
  body: Bytes,
) -> Response {
  let media_type = header_str(&headers, CONTENT_TYPE.as_str()).unwrap_or_default();
  let name = header_str(&headers, FILE_NAME_HEADER).map(|raw| decode_file_name(&raw));
  let file = SelectedFile {
    name,
    media_type,
    bytes: body.to_vec(),
  };

  match state.dashboard.select_image(file).await {
    Ok(Ok(())) => session(State(state)).await,
    Ok(Err(err)) => error_response(
      StatusCode::UNSUPPORTED_MEDIA_TYPE,
      "not_an_image",
      &err.user_message(),
    ),
    Err(busy) => error_response(StatusCode::CONFLICT, "busy", &busy.to_string()),
  }
}

async fn analyze(State(state): State<Arc<RouterState>>) -> Response {
  match state.dashboard.analyze().await {
    AnalyzeOutcome::Completed => session(State(state)).await,
    AnalyzeOutcome::NoImage => error_response(
      StatusCode::BAD_REQUEST,
      "no_image",
      "Upload an image before analyzing.",
    ),
    AnalyzeOutcome::Busy => {
      state.logger.info("analyze ignored: already in flight");
      error_response(StatusCode::CONFLICT, "busy", "An analysis is already running.")
    }
  }
}

async fn reset(State(state): State<Arc<RouterState>>) -> Response {
  match state.dashboard.reset().await {
    Ok(()) => session(State(state)).await,
    Err(busy) => error_response(StatusCode::CONFLICT, "busy", &busy.to_string()),
  }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
  headers
    .get(name)
    .and_then(|v| v.to_str().ok())
    .map(|v| v.trim().to_string())
    .filter(|v| !v.is_empty())
}

/// The page percent-encodes file names so non-ASCII names survive the header.
fn decode_file_name(raw: &str) -> String {
  percent_decode_str(raw)
    .decode_utf8()
    .map(|name| name.into_owned())
    .unwrap_or_else(|_| raw.to_string())
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
  let body = Json(serde_json::json!({ "error": message, "code": code }));
  (status, body).into_response()
}
