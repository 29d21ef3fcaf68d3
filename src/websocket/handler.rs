use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde::Deserialize;

use crate::bus::channel_topic;
use crate::error::AppError;
use crate::hub::{read_loop, run_bridge, write_loop, Connection};
use crate::metrics::{ConnectionMetrics, TaskMetrics};
use crate::server::AppState;

const MAX_CHANNEL_ID_LEN: usize = 128;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// GET /ws/projects/{project_id}
///
/// Authenticates before upgrading: a missing or rejected token is answered
/// with 401 and no socket is created.
#[tracing::instrument(
    name = "ws.upgrade",
    skip(ws, state, query, headers),
    fields(project_id = %project_id, has_query_token = query.token.is_some())
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Response {
    if !validate_channel_id(&project_id) {
        ConnectionMetrics::record_rejected("invalid_channel");
        return AppError::Validation(format!("Invalid project id: {}", project_id))
            .into_response();
    }

    let Some(token) = extract_token(&query, &headers) else {
        ConnectionMetrics::record_rejected("missing_token");
        return AppError::Auth("Missing authentication token".to_string()).into_response();
    };

    let user_id = match state.token_validator.resolve_user(&token) {
        Ok(user_id) => user_id,
        Err(e) => {
            ConnectionMetrics::record_rejected("invalid_token");
            return e.into_response();
        }
    };

    tracing::info!(user_id = %user_id, "WebSocket upgrade accepted");

    ws.on_upgrade(move |socket| serve_connection(socket, state, project_id, user_id))
}

/// Token from the `token` query parameter, else from `Authorization: Bearer`
fn extract_token(query: &WsQuery, headers: &HeaderMap) -> Option<String> {
    if let Some(token) = query.token.as_deref().filter(|t| !t.is_empty()) {
        return Some(token.to_string());
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Project ids become part of the bus topic, so only a safe subset is accepted
pub fn validate_channel_id(id: &str) -> bool {
    if id.is_empty() || id.len() > MAX_CHANNEL_ID_LEN {
        return false;
    }

    id.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

/// Owns one upgraded socket from registration to the final unregister.
///
/// Spawns the read, write and bridge tasks, waits for all three, then
/// unregisters the connection exactly once. A panicking task is contained by
/// its join handle; the read and write loops close the connection on unwind.
#[tracing::instrument(
    name = "ws.connection",
    skip(socket, state),
    fields(otel.kind = "server")
)]
pub async fn serve_connection(
    socket: WebSocket,
    state: AppState,
    channel_id: String,
    user_id: String,
) {
    let hub = &state.settings.hub;

    let (connection, queue) =
        Connection::open(channel_id, user_id, hub.queue_capacity, &state.shutdown);
    state.registry.register(&connection).await;
    connection.mark_open();
    ConnectionMetrics::record_opened();

    tracing::info!(
        connection_id = %connection.id,
        channel_id = %connection.channel_id,
        user_id = %connection.user_id,
        "WebSocket connection established"
    );

    let (sink, stream) = socket.split();
    let topic = channel_topic(&state.settings.bus.topic_prefix, &connection.channel_id);

    let reader = tokio::spawn(read_loop(connection.clone(), stream, hub.pong_wait()));
    let writer = tokio::spawn(write_loop(
        connection.clone(),
        sink,
        queue,
        hub.ping_period(),
        hub.write_wait(),
    ));
    let bridge = tokio::spawn(run_bridge(
        state.bus.clone(),
        connection.clone(),
        topic,
        hub.bridge_send_timeout(),
    ));

    let (read, write, bridge) = tokio::join!(reader, writer, bridge);
    let outcomes = [
        ("read_loop", read.err()),
        ("write_loop", write.err()),
        ("bridge", bridge.map(|_| ()).err()),
    ];
    for (task, error) in outcomes {
        if let Some(e) = error.filter(|e| e.is_panic()) {
            TaskMetrics::record_panic(task);
            tracing::error!(
                connection_id = %connection.id,
                task,
                error = %e,
                "Connection task panicked"
            );
        }
    }

    // The bridge alone never closes the connection; make sure teardown started
    connection.close();
    let unregistered = state.registry.unregister(&connection).await;
    connection.mark_closed();

    let duration = connection.age().as_secs_f64();
    ConnectionMetrics::record_closed(duration);

    tracing::info!(
        connection_id = %connection.id,
        channel_id = %connection.channel_id,
        user_id = %connection.user_id,
        unregistered,
        duration_secs = duration,
        "WebSocket connection closed"
    );
}
