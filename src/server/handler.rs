//! HTTP routes and connection lifecycle
//!
//! `GET /api/stream/ws` is checked before the upgrade:
//!
//! | condition                                   | status |
//! |---------------------------------------------|--------|
//! | not a WebSocket upgrade request             | 400    |
//! | `socket_type` missing or not 1 / 2          | 400    |
//! | publisher without `token`                   | 400    |
//! | publisher with an unknown `token`           | 401    |
//! | `max_connections` reached                   | 503    |
//!
//! After the upgrade the registry admits the connection. A publisher that
//! loses the race for the slot is closed with 1008 (policy violation).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::task_tracker::TaskTrackerToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use crate::protocol::constants::*;
use crate::protocol::CloseFrame;
use crate::registry::{ConnectionHandle, RegistryError, Role, RoleRegistry};
use crate::session::{Dispatcher, Session};
use crate::stats::RelayStats;

use super::auth::CredentialStore;
use super::config::ServerConfig;
use super::ws::{spawn_writer, WsFragmentReader};

/// State shared by every request
pub struct RelayState {
    pub(crate) config: ServerConfig,
    pub(crate) registry: Arc<RoleRegistry>,
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) credentials: Arc<dyn CredentialStore>,
    pub(crate) stats: Arc<RelayStats>,
    pub(crate) next_session_id: AtomicU64,
    pub(crate) connection_semaphore: Option<Arc<Semaphore>>,
    pub(crate) shutdown: CancellationToken,
    pub(crate) tracker: TaskTracker,
}

/// Query parameters of the upgrade request
#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    pub socket_type: Option<String>,
    pub token: Option<String>,
}

/// Build the relay router
pub fn router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route(STREAM_PATH, get(stream_handler))
        .route(HEALTH_PATH, get(health_handler))
        .with_state(state)
}

async fn health_handler() -> &'static str {
    "ok"
}

/// Resolve the requested role and check publisher credentials
fn authorize(query: &StreamQuery, credentials: &dyn CredentialStore) -> Result<Role, (StatusCode, &'static str)> {
    let role = query
        .socket_type
        .as_deref()
        .and_then(|value| value.trim().parse::<u8>().ok())
        .and_then(Role::from_socket_type)
        .ok_or((StatusCode::BAD_REQUEST, "a valid socket_type is required"))?;

    if role.is_publisher() {
        let token = match query.token.as_deref() {
            Some(token) if !token.is_empty() => token,
            _ => return Err((StatusCode::BAD_REQUEST, "a token is required")),
        };
        if !credentials.verify_publisher(token) {
            return Err((StatusCode::UNAUTHORIZED, "invalid token"));
        }
    }

    Ok(role)
}

async fn stream_handler(
    State(state): State<Arc<RelayState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(query): Query<StreamQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            tracing::debug!(peer = %peer, error = %rejection, "Not a WebSocket request");
            state.stats.record_connection_rejected();
            return (StatusCode::BAD_REQUEST, rejection.body_text()).into_response();
        }
    };

    let role = match authorize(&query, state.credentials.as_ref()) {
        Ok(role) => role,
        Err((status, reason)) => {
            tracing::warn!(peer = %peer, status = status.as_u16(), reason, "Upgrade rejected");
            state.stats.record_connection_rejected();
            return (status, reason).into_response();
        }
    };

    // Check connection limit
    let permit = match state.connection_semaphore {
        Some(ref sem) => match Arc::clone(sem).try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(_) => {
                tracing::warn!(peer = %peer, "Connection rejected: limit reached");
                state.stats.record_connection_rejected();
                return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
            }
        },
        None => None,
    };

    let session_id = state.next_session_id.fetch_add(1, Ordering::Relaxed);
    let tracked = state.tracker.token();
    let span = tracing::info_span!("session", session_id = session_id, role = %role);

    tracing::debug!(session_id = session_id, peer = %peer, role = %role, "Upgrading connection");

    ws.max_message_size(state.config.transport_max_message_size)
        .on_failed_upgrade(move |e| {
            tracing::warn!(session_id = session_id, error = %e, "WebSocket upgrade failed");
        })
        .on_upgrade(move |socket| {
            run_connection(state, socket, peer, role, session_id, permit, tracked).instrument(span)
        })
}

async fn run_connection(
    state: Arc<RelayState>,
    socket: WebSocket,
    peer: SocketAddr,
    role: Role,
    session_id: u64,
    _permit: Option<OwnedSemaphorePermit>,
    _tracked: TaskTrackerToken,
) {
    let (sink, stream) = socket.split();
    let (tx, rx) = mpsc::channel(state.config.outbound_queue_capacity);
    let writer = spawn_writer(sink, rx, session_id);
    let handle = Arc::new(ConnectionHandle::new(session_id, role, peer, tx));
    let close_timeout = state.config.close_timeout;

    let admitted = match role {
        Role::Publisher => state.registry.admit_publisher(Arc::clone(&handle)).await,
        Role::Subscriber => state.registry.admit_subscriber(Arc::clone(&handle)).await,
    };

    if let Err(e) = admitted {
        state.stats.record_connection_rejected();
        let code = match e {
            RegistryError::AlreadyStreaming { .. } | RegistryError::RoleMismatch { .. } => {
                CLOSE_POLICY_VIOLATION
            }
            RegistryError::AdmissionTimeout(_) => CLOSE_INTERNAL_ERROR,
        };
        tracing::warn!(peer = %peer, error = %e, code = code, "Admission refused");

        handle.mark_closing();
        if let Err(e) = handle
            .send_close(Some(CloseFrame::new(code, e.to_string())), close_timeout)
            .await
        {
            tracing::debug!(error = %e, "Close frame not sent");
        }
        handle.mark_closed();
        drop(handle);
        finish_writer(writer, close_timeout).await;
        return;
    }

    state.stats.record_connection_accepted();
    tracing::info!(peer = %peer, "Connection admitted");

    let session = Session::new(
        handle,
        WsFragmentReader::new(stream),
        Arc::clone(&state.registry),
        Arc::clone(&state.dispatcher),
        state.config.session_config(),
        state.shutdown.child_token(),
    );
    session.run().await;

    finish_writer(writer, close_timeout).await;
}

/// Wait for the writer to flush, aborting it after `timeout`
async fn finish_writer(mut writer: JoinHandle<()>, timeout: Duration) {
    if tokio::time::timeout(timeout, &mut writer).await.is_err() {
        tracing::debug!("Writer did not finish in time, aborting");
        writer.abort();
    }
}
