// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The HTTP control plane (§6): one `axum::Router` exposing the daemon's
//! agent/cron/session/subsystem surface over loopback HTTP.
//!
//! Grounded on `ConaryLabs-Conary/src/daemon/routes.rs` for the handler/
//! `IntoResponse` shape (`DaemonError` already implements `IntoResponse`,
//! see `error.rs`) and `ConaryLabs-Conary/src/server/mod.rs` for serving an
//! `axum::Router` over a pre-bound `TcpListener`. The optional bearer-token
//! check and the per-request deadline are grounded on the teacher's
//! `listener/mod.rs::handle_connection`, which checks a configured
//! `auth_token` against an incoming token before dispatch and wraps request
//! handling in a timeout rather than trusting the transport.

use crate::error::DaemonError;
use crate::lifecycle::DaemonState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clud_core::{AgentRecord, Clock, CronTask, SessionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_REQUEST_DEADLINE: Duration = Duration::from_secs(30);

/// Build the control-plane router over `state`. Installs the bearer-token
/// check only when `state.config.auth_token` is set (§3.1's `auth_token` is
/// optional — loopback-only access needs no auth by default) and always
/// installs the per-request deadline (§5).
pub fn router<C: Clock + 'static>(state: Arc<DaemonState<C>>) -> Router {
    let app = Router::new()
        .route("/health", get(health::<C>))
        .route("/agents", get(list_agents::<C>))
        .route("/agents/register", post(register_agent::<C>))
        .route("/agents/:id/heartbeat", post(heartbeat::<C>))
        .route("/agents/:id/stop", post(stop_agent::<C>))
        .route("/cron/tasks", get(list_cron_tasks::<C>))
        .route("/cron/tasks", post(add_cron_task::<C>))
        .route("/cron/tasks/:id", axum::routing::delete(remove_cron_task::<C>))
        .route("/cron/tasks/:id/enable", post(enable_cron_task::<C>))
        .route("/cron/tasks/:id/disable", post(disable_cron_task::<C>))
        .route("/sessions/:id/send", post(send_to_session::<C>))
        .route("/sessions/:id/stream", get(stream_session::<C>))
        .route("/subsystems/:name/status", get(subsystem_status::<C>))
        .route("/subsystems/:name/start", post(subsystem_start::<C>))
        .route("/subsystems/:name/stop", post(subsystem_stop::<C>))
        .layer(middleware::from_fn(deadline))
        .with_state(state.clone());

    if state.config.auth_token.is_some() {
        app.layer(middleware::from_fn_with_state(state, auth::<C>))
    } else {
        app
    }
}

/// Enforce `DEFAULT_REQUEST_DEADLINE` around the rest of the middleware
/// stack and the handler, mapping an overrun to `DaemonError::DeadlineExceeded`
/// (§5: "exceeding it returns `DeadlineExceeded` and cancels any downstream
/// work" — dropping the inner future at the `timeout` future's drop point is
/// exactly that cancellation).
async fn deadline(req: Request<axum::body::Body>, next: Next) -> Response {
    match tokio::time::timeout(DEFAULT_REQUEST_DEADLINE, next.run(req)).await {
        Ok(response) => response,
        Err(_) => DaemonError::DeadlineExceeded.into_response(),
    }
}

/// Bearer-token check for every request, mirroring the teacher's Hello-token
/// comparison in `handle_connection`. Only installed when the daemon was
/// started with `auth_token` configured.
async fn auth<C: Clock + 'static>(
    State(state): State<Arc<DaemonState<C>>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let expected = state.config.auth_token.as_deref().unwrap_or_default();
    let provided = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if token == expected => next.run(req).await,
        _ => DaemonError::Validation("missing or invalid bearer token".into()).into_response(),
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    pid: u32,
    uptime_seconds: u64,
    agents: AgentCounts,
}

#[derive(Serialize)]
struct AgentCounts {
    total: usize,
    running: usize,
    stale: usize,
}

async fn health<C: Clock>(State(state): State<Arc<DaemonState<C>>>) -> Json<HealthResponse> {
    let (total, running, stale) = state.registry.counts();
    Json(HealthResponse {
        status: "ok",
        pid: state.pid(),
        uptime_seconds: state.uptime_seconds(),
        agents: AgentCounts { total, running, stale },
    })
}

async fn list_agents<C: Clock>(State(state): State<Arc<DaemonState<C>>>) -> Json<Vec<AgentRecord>> {
    Json(state.registry.list())
}

#[derive(Deserialize)]
struct RegisterAgentRequest {
    id: Option<String>,
    pid: u32,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct RegisterAgentResponse {
    id: String,
    started_at: u64,
}

async fn register_agent<C: Clock>(
    State(state): State<Arc<DaemonState<C>>>,
    Json(req): Json<RegisterAgentRequest>,
) -> Json<RegisterAgentResponse> {
    let record = state.registry.register(req.id, req.pid, req.metadata);
    Json(RegisterAgentResponse { id: record.id, started_at: record.started_at })
}

#[derive(Serialize)]
struct HeartbeatResponse {
    state: clud_core::AgentState,
    last_heartbeat: u64,
}

async fn heartbeat<C: Clock>(
    State(state): State<Arc<DaemonState<C>>>,
    Path(id): Path<String>,
) -> Result<Json<HeartbeatResponse>, DaemonError> {
    let record = state.registry.heartbeat(&id)?;
    Ok(Json(HeartbeatResponse { state: record.state, last_heartbeat: record.last_heartbeat }))
}

async fn stop_agent<C: Clock>(
    State(state): State<Arc<DaemonState<C>>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Map<String, Value>>, DaemonError> {
    state.registry.stop(&id)?;
    Ok(Json(serde_json::Map::new()))
}

async fn list_cron_tasks<C: Clock>(State(state): State<Arc<DaemonState<C>>>) -> Json<Vec<CronTask>> {
    Json(state.cron.list())
}

#[derive(Deserialize)]
struct AddCronTaskRequest {
    expression: String,
    task_file: String,
}

#[derive(Serialize)]
struct AddCronTaskResponse {
    id: String,
    next_run: Option<u64>,
}

async fn add_cron_task<C: Clock>(
    State(state): State<Arc<DaemonState<C>>>,
    Json(req): Json<AddCronTaskRequest>,
) -> Result<Json<AddCronTaskResponse>, DaemonError> {
    let task = state.cron.add(req.expression, req.task_file)?;
    Ok(Json(AddCronTaskResponse { id: task.id, next_run: task.next_run }))
}

async fn remove_cron_task<C: Clock>(
    State(state): State<Arc<DaemonState<C>>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Map<String, Value>>, DaemonError> {
    state.cron.remove(&id)?;
    Ok(Json(serde_json::Map::new()))
}

async fn enable_cron_task<C: Clock>(
    State(state): State<Arc<DaemonState<C>>>,
    Path(id): Path<String>,
) -> Result<Json<CronTask>, DaemonError> {
    Ok(Json(state.cron.enable(&id)?))
}

async fn disable_cron_task<C: Clock>(
    State(state): State<Arc<DaemonState<C>>>,
    Path(id): Path<String>,
) -> Result<Json<CronTask>, DaemonError> {
    Ok(Json(state.cron.disable(&id)?))
}

#[derive(Deserialize)]
struct SendRequest {
    text: String,
}

#[derive(Serialize)]
struct SendResponse {
    accepted: bool,
}

/// Creates the Instance if absent (§6), writes `text` as a prompt line, and
/// returns immediately — the reply streams separately over `/stream`.
async fn send_to_session<C: Clock>(
    State(state): State<Arc<DaemonState<C>>>,
    Path(id): Path<String>,
    Json(req): Json<SendRequest>,
) -> Result<Json<SendResponse>, DaemonError> {
    let session_id = SessionId::new(id);
    let instance = state.pool.acquire(session_id.clone()).await?;
    instance.send(&req.text).await?;
    state.pool.release(&session_id).await;
    Ok(Json(SendResponse { accepted: true }))
}

/// Upgrade to a WebSocket carrying one binary frame per publish: the current
/// ring snapshot first, then the live tail (§4.5, §6).
async fn stream_session<C: Clock + 'static>(
    State(state): State<Arc<DaemonState<C>>>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    let session_id = SessionId::new(id);
    ws.on_upgrade(move |socket| stream_session_socket(state, session_id, socket))
}

async fn stream_session_socket<C: Clock>(state: Arc<DaemonState<C>>, session_id: SessionId, mut socket: WebSocket) {
    let (snapshot, mut rx) = state.router.subscribe(&session_id);
    if !snapshot.is_empty() && socket.send(Message::Binary(snapshot)).await.is_err() {
        return;
    }

    loop {
        match rx.recv().await {
            Ok(crate::router::Frame::Chunk(chunk)) => {
                if socket.send(Message::Binary(chunk)).await.is_err() {
                    break;
                }
            }
            Ok(crate::router::Frame::EndOfStream) => break,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => break,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn subsystem_status<C: Clock>(
    State(state): State<Arc<DaemonState<C>>>,
    Path(name): Path<String>,
) -> Result<Json<crate::subsystem::SubsystemStatus>, DaemonError> {
    state
        .subsystems
        .status(&name)
        .await
        .map(Json)
        .map_err(|e| DaemonError::NotFound(e.to_string()))
}

#[derive(Serialize)]
struct SubsystemActionResponse {
    status: &'static str,
}

async fn subsystem_start<C: Clock>(
    State(state): State<Arc<DaemonState<C>>>,
    Path(name): Path<String>,
    Json(config): Json<Value>,
) -> Result<Json<SubsystemActionResponse>, DaemonError> {
    let status = state.subsystems.start(&name, config).await.map_err(|e| DaemonError::NotFound(e.to_string()))?;
    Ok(Json(SubsystemActionResponse { status }))
}

async fn subsystem_stop<C: Clock>(
    State(state): State<Arc<DaemonState<C>>>,
    Path(name): Path<String>,
) -> Result<Json<SubsystemActionResponse>, DaemonError> {
    let status = state.subsystems.stop(&name).await.map_err(|e| DaemonError::NotFound(e.to_string()))?;
    Ok(Json(SubsystemActionResponse { status }))
}
