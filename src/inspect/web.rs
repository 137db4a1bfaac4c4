//! Web inspector: JSON API over the traffic log plus a static page.
//!
//! # Responsibilities
//! - `GET /api/logs?filter=` lists summaries of every matching exchange
//! - `GET /api/logs/{request_id}` returns one full exchange
//! - `GET /` serves the bundled single-page viewer
//!
//! # Design Decisions
//! - Filter parse errors come back in the `error` field with a 200, so the
//!   page can show them inline instead of breaking the poll loop
//! - Bodies are rendered lossily as UTF-8; this is an inspector, not an
//!   archiver

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::net::bind_with_fallback;
use crate::traffic::{LogEntry, TrafficLog};

const INDEX_HTML: &str = include_str!("index.html");

#[derive(Debug, Serialize)]
struct RequestSummary {
    method: String,
    path: String,
    timestamp: i64,
}

#[derive(Debug, Serialize)]
struct ResponseSummary {
    status_code: i32,
    timestamp: i64,
}

#[derive(Debug, Serialize)]
struct LogSummary {
    request_id: String,
    duration_ms: i64,
    request: Option<RequestSummary>,
    response: Option<ResponseSummary>,
}

#[derive(Debug, Serialize)]
struct LogListBody {
    error: String,
    logs: Vec<LogSummary>,
}

#[derive(Debug, Serialize)]
struct RequestDetail {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: String,
    timestamp: i64,
}

#[derive(Debug, Serialize)]
struct ResponseDetail {
    status_code: i32,
    headers: HashMap<String, String>,
    body: String,
    timestamp: i64,
}

#[derive(Debug, Serialize)]
struct LogDetail {
    request_id: String,
    duration_ms: i64,
    request: Option<RequestDetail>,
    response: Option<ResponseDetail>,
}

#[derive(Debug, Serialize)]
struct LogDetailBody {
    error: String,
    log: Option<LogDetail>,
}

#[derive(Debug, Deserialize, Default)]
struct LogsQuery {
    #[serde(default)]
    filter: String,
}

/// Build the inspector router over a shared traffic log.
pub fn router(traffic: Arc<TrafficLog>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/logs", get(list_logs))
        .route("/api/logs/{request_id}", get(get_log))
        .with_state(traffic)
}

/// Bind the inspect port (with fallback) and serve until the process exits.
pub async fn serve(traffic: Arc<TrafficLog>, port: u16) -> Result<(), std::io::Error> {
    let (listener, addr) = bind_with_fallback(port).await?;
    tracing::info!(address = %addr, "web inspector listening");
    axum::serve(listener, router(traffic)).await
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn list_logs(
    State(traffic): State<Arc<TrafficLog>>,
    Query(query): Query<LogsQuery>,
) -> Json<LogListBody> {
    match traffic.get_filtered_logs(&query.filter) {
        Ok(entries) => Json(LogListBody {
            error: String::new(),
            logs: entries.iter().map(summarize).collect(),
        }),
        Err(err) => Json(LogListBody {
            error: err.to_string(),
            logs: Vec::new(),
        }),
    }
}

async fn get_log(
    State(traffic): State<Arc<TrafficLog>>,
    Path(request_id): Path<String>,
) -> (StatusCode, Json<LogDetailBody>) {
    if request_id.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(LogDetailBody {
                error: "request id is required".to_string(),
                log: None,
            }),
        );
    }

    match traffic.get_log_by_id(&request_id) {
        Some(entry) => (
            StatusCode::OK,
            Json(LogDetailBody {
                error: String::new(),
                log: Some(detail(&entry)),
            }),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(LogDetailBody {
                error: format!("no log with request id {request_id}"),
                log: None,
            }),
        ),
    }
}

fn summarize(entry: &LogEntry) -> LogSummary {
    LogSummary {
        request_id: entry.request_id.clone(),
        duration_ms: entry.duration_ms,
        request: entry.request.as_ref().map(|req| RequestSummary {
            method: req.method.clone(),
            path: req.path.clone(),
            timestamp: req.timestamp,
        }),
        response: entry.response.as_ref().map(|res| ResponseSummary {
            status_code: res.status_code,
            timestamp: res.timestamp,
        }),
    }
}

fn detail(entry: &LogEntry) -> LogDetail {
    LogDetail {
        request_id: entry.request_id.clone(),
        duration_ms: entry.duration_ms,
        request: entry.request.as_ref().map(|req| RequestDetail {
            method: req.method.clone(),
            path: req.path.clone(),
            headers: req.headers.clone(),
            body: String::from_utf8_lossy(&req.body).into_owned(),
            timestamp: req.timestamp,
        }),
        response: entry.response.as_ref().map(|res| ResponseDetail {
            status_code: res.status_code,
            headers: res.headers.clone(),
            body: String::from_utf8_lossy(&res.body).into_owned(),
            timestamp: res.timestamp,
        }),
    }
}
