use std::time::{Duration, Instant};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::error::{AppError, RelayError};
use crate::ingress::{EmitRequest, IngressOrigin};
use crate::metrics::{
    WsMessageMetrics, WS_CONNECTIONS_OPENED, WS_CONNECTIONS_REFUSED, WS_CONNECTION_DURATION,
};
use crate::room::RoomTarget;
use crate::server::AppState;

use super::message::{ClientMessage, FrameMeta, OutboundMessage, ServerMessage};
use super::session::ConnectionSession;

/// How long a closing connection may keep flushing its outbound buffer
const SEND_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Header an anonymous client may use to declare its tenant
pub const TENANT_HEADER: &str = "x-tenant-id";

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
    pub tenant: Option<String>,
}

/// What the session did with a frame
enum Outcome {
    Done,
    /// Room operation before the tenant was bound
    Ignored,
    Failed(RelayError),
}

impl From<Result<(), RelayError>> for Outcome {
    fn from(result: Result<(), RelayError>) -> Self {
        match result {
            Ok(()) => Outcome::Done,
            Err(e) => Outcome::Failed(e),
        }
    }
}

/// WebSocket upgrade handler. Credentials are checked before upgrading; a
/// bad token refuses the connection.
#[tracing::instrument(
    name = "ws.upgrade",
    skip(ws, state, query, headers),
    fields(has_query_token = query.token.is_some())
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Response {
    let token = extract_token(&query, &headers);
    let declared_tenant = query.tenant.clone().or_else(|| {
        headers
            .get(TENANT_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    });

    let auth = match state
        .gateway
        .authenticate_connection(token.as_deref(), declared_tenant.as_deref())
    {
        Ok(auth) => auth,
        Err(e) => {
            WS_CONNECTIONS_REFUSED.inc();
            tracing::warn!(error = %e, "WebSocket connection refused");
            return AppError::from(e).into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, auth))
}

fn extract_token(query: &WsQuery, headers: &HeaderMap) -> Option<String> {
    if let Some(token) = query.token.as_ref().filter(|t| !t.is_empty()) {
        return Some(token.clone());
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

#[tracing::instrument(
    name = "ws.connection",
    skip(socket, state, auth),
    fields(
        tenant_id = auth.as_ref().map(|a| a.tenant_id()).unwrap_or("-"),
        otel.kind = "server"
    )
)]
async fn handle_socket(socket: WebSocket, state: AppState, auth: Option<AuthContext>) {
    let connection_start = Instant::now();
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(state.settings.websocket.buffer.max(1));

    let mut session = ConnectionSession::new(
        Uuid::new_v4(),
        tx,
        state.connections.clone(),
        state.settings.websocket.exclusive,
    );
    let connection_id = session.id();

    if let Some(ctx) = auth {
        if let Err(e) = session.attach(ctx) {
            tracing::error!(connection_id = %connection_id, error = %e, "Failed to attach identity");
            return;
        }
    }

    WS_CONNECTIONS_OPENED.inc();
    tracing::info!(
        connection_id = %connection_id,
        bound = session.auth().is_some(),
        "WebSocket connection established"
    );

    let (mut ws_sender, mut ws_receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let text = match msg.to_json() {
                Ok(t) => t,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize message");
                    continue;
                }
            };

            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    loop {
        tokio::select! {
            _ = &mut send_task => {
                tracing::debug!(connection_id = %connection_id, "Send task completed");
                break;
            }
            incoming = ws_receiver.next() => {
                match incoming {
                    Some(Ok(msg)) => {
                        if !process_message(msg, &state, &mut session).await {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "WebSocket receive error");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    // Memberships go first so no fan-out picks this connection up again
    let rooms = session.close();
    drop(session);
    // Queued replies (e.g. a final ack) may flush briefly before the socket closes
    if !send_task.is_finished()
        && tokio::time::timeout(SEND_DRAIN_TIMEOUT, &mut send_task)
            .await
            .is_err()
    {
        send_task.abort();
    }

    let duration = connection_start.elapsed().as_secs_f64();
    WS_CONNECTION_DURATION.observe(duration);

    tracing::info!(
        connection_id = %connection_id,
        rooms_left = rooms.len(),
        duration_secs = duration,
        "WebSocket connection closed"
    );
}

/// Process a received WebSocket message.
/// Returns false if the connection should be closed.
async fn process_message(msg: Message, state: &AppState, session: &mut ConnectionSession) -> bool {
    match msg {
        Message::Text(text) => {
            let meta: FrameMeta = serde_json::from_str(&text).unwrap_or_default();

            let client_msg: ClientMessage = match serde_json::from_str(&text) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to parse client message");
                    session
                        .send(ServerMessage::error("invalid_message", e.to_string()))
                        .await;
                    return true;
                }
            };

            WsMessageMetrics::record(client_msg.kind());
            let closes_on_failure = matches!(client_msg, ClientMessage::Identify(_));
            let outcome = handle_client_message(client_msg, state, session).await;

            let fatal = matches!(
                (&outcome, closes_on_failure),
                (Outcome::Failed(RelayError::AuthFailed(_)), true)
            ) && session.auth().is_none();

            reply(session, meta.id, outcome).await;
            !fatal
        }
        Message::Binary(_) => {
            session
                .send(ServerMessage::error(
                    "unsupported_format",
                    "Binary messages are not supported",
                ))
                .await;
            true
        }
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            tracing::debug!(connection_id = %session.id(), "Received close frame");
            false
        }
    }
}

#[tracing::instrument(
    name = "ws.message",
    skip(msg, state, session),
    fields(connection_id = %session.id(), message_type = msg.kind())
)]
async fn handle_client_message(
    msg: ClientMessage,
    state: &AppState,
    session: &mut ConnectionSession,
) -> Outcome {
    match msg {
        ClientMessage::Identify(payload) => session
            .identify(&state.gateway, payload)
            .map(|_| ())
            .into(),
        ClientMessage::JoinRoom(request) => match session.join(request) {
            Ok(Some(_)) => Outcome::Done,
            Ok(None) => Outcome::Ignored,
            Err(e) => Outcome::Failed(e),
        },
        ClientMessage::LeaveRoom(request) => match session.leave(request) {
            Ok(Some(_)) => Outcome::Done,
            Ok(None) => Outcome::Ignored,
            Err(e) => Outcome::Failed(e),
        },
        ClientMessage::ServerEmit(payload) => {
            let Some(ctx) = session.auth() else {
                return Outcome::Failed(RelayError::NotAuthorized);
            };
            let request = EmitRequest::new(
                RoomTarget::new(payload.tenant_id, payload.scope, payload.discriminator),
                payload.event,
                payload.data,
            );
            state
                .ingress
                .submit(ctx, request, IngressOrigin::Live)
                .await
                .into()
        }
        ClientMessage::Ping => {
            session.send(ServerMessage::Pong).await;
            Outcome::Done
        }
    }
}

/// Acknowledge framed requests; report failures of unframed ones
async fn reply(session: &ConnectionSession, id: Option<u64>, outcome: Outcome) {
    let message = match (id, outcome) {
        (Some(id), Outcome::Done) => ServerMessage::ack(id, Ok(())),
        (Some(id), Outcome::Ignored) => ServerMessage::ack(id, Err(&RelayError::NotBound)),
        (Some(id), Outcome::Failed(e)) => ServerMessage::ack(id, Err(&e)),
        (None, Outcome::Failed(e)) => ServerMessage::error(e.code(), e.to_string()),
        (None, _) => return,
    };
    session.send(message).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    use crate::auth::Role;
    use crate::config::{
        AuthConfig, AuthMode, BusConfig, EmitConfig, JwtConfig, OtelConfig, RedisConfig,
        ServerConfig, Settings, WebSocketConfig,
    };
    use crate::room::RoomKey;
    use crate::websocket::RoomRequest;

    fn state(mode: AuthMode, anonymous: bool) -> AppState {
        AppState::new(Settings {
            server: ServerConfig::default(),
            jwt: JwtConfig {
                secret: "test-secret".to_string(),
                issuer: None,
                audience: None,
            },
            auth: AuthConfig { mode, anonymous },
            emit: EmitConfig::default(),
            websocket: WebSocketConfig::default(),
            bus: BusConfig::default(),
            redis: RedisConfig::default(),
            otel: OtelConfig::default(),
        })
    }

    fn session(state: &AppState) -> (ConnectionSession, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(16);
        let session = ConnectionSession::new(Uuid::new_v4(), tx, state.connections.clone(), true);
        (session, rx)
    }

    fn frame(value: Value) -> Message {
        Message::Text(value.to_string().into())
    }

    fn drain(rx: &mut mpsc::Receiver<OutboundMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(serde_json::from_str(&msg.to_json().unwrap()).unwrap());
        }
        out
    }

    fn ack(id: u64, error: Option<&str>) -> ServerMessage {
        ServerMessage::Ack {
            id,
            ok: error.is_none(),
            error: error.map(str::to_string),
        }
    }

    fn emit_frame(id: Option<u64>, tenant: &str) -> Message {
        let mut value = json!({
            "type": "server_emit",
            "payload": {
                "tenant_id": tenant,
                "scope": "user",
                "discriminator": "U1",
                "event": "notify",
                "data": {"x": 1}
            }
        });
        if let Some(id) = id {
            value["id"] = json!(id);
        }
        frame(value)
    }

    #[tokio::test]
    async fn test_framed_join_is_acknowledged() {
        let state = state(AuthMode::Required, false);
        let (mut s, mut rx) = session(&state);
        s.attach(AuthContext::new("acme", Role::Client, None)).unwrap();

        let open = process_message(
            frame(json!({"type": "join_room", "payload": "U1", "id": 1})),
            &state,
            &mut s,
        )
        .await;

        assert!(open);
        assert_eq!(drain(&mut rx), vec![ack(1, None)]);
        assert!(state
            .connections
            .room_exists(&RoomKey::user("acme", "U1").unwrap()));
    }

    #[tokio::test]
    async fn test_unframed_success_sends_nothing() {
        let state = state(AuthMode::Required, false);
        let (mut s, mut rx) = session(&state);
        s.attach(AuthContext::new("acme", Role::Client, None)).unwrap();

        let open = process_message(
            frame(json!({"type": "join_room", "payload": "U1"})),
            &state,
            &mut s,
        )
        .await;

        assert!(open);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_room_ops_before_binding_stay_open() {
        let state = state(AuthMode::Optional, false);
        let (mut s, mut rx) = session(&state);

        let open = process_message(
            frame(json!({"type": "join_room", "payload": {"tenant_id": "acme", "user_id": "U1"}, "id": 4})),
            &state,
            &mut s,
        )
        .await;
        assert!(open);
        assert_eq!(drain(&mut rx), vec![ack(4, Some("not_bound"))]);

        let open = process_message(
            frame(json!({"type": "leave_room", "payload": "U1"})),
            &state,
            &mut s,
        )
        .await;
        assert!(open);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(state.connections.stats().total_rooms, 0);
    }

    #[tokio::test]
    async fn test_failed_identify_closes_unbound_connection() {
        let state = state(AuthMode::Optional, false);
        let (mut s, mut rx) = session(&state);

        let open = process_message(
            frame(json!({"type": "identify", "payload": {"tenant_id": "acme"}, "id": 2})),
            &state,
            &mut s,
        )
        .await;

        assert!(!open);
        assert_eq!(drain(&mut rx), vec![ack(2, Some("auth_failed"))]);
        assert!(s.auth().is_none());
    }

    #[tokio::test]
    async fn test_identify_mismatch_keeps_bound_connection() {
        let state = state(AuthMode::Required, false);
        let (mut s, mut rx) = session(&state);
        s.attach(AuthContext::new("acme", Role::Client, Some("ana@acme.com".into())))
            .unwrap();

        let open = process_message(
            frame(json!({"type": "identify", "payload": {"tenant_id": "beta"}, "id": 3})),
            &state,
            &mut s,
        )
        .await;

        assert!(open);
        assert_eq!(drain(&mut rx), vec![ack(3, Some("tenant_mismatch"))]);
        assert_eq!(s.tenant_id(), Some("acme"));
    }

    #[tokio::test]
    async fn test_server_emit_ack_and_fanout() {
        let state = state(AuthMode::Required, false);

        let (mut client, mut client_rx) = session(&state);
        client
            .attach(AuthContext::new("acme", Role::Client, None))
            .unwrap();
        process_message(
            frame(json!({"type": "join_room", "payload": "U1"})),
            &state,
            &mut client,
        )
        .await;

        let (mut worker, mut worker_rx) = session(&state);
        worker.attach(AuthContext::worker("acme")).unwrap();

        let open = process_message(emit_frame(Some(7), "acme"), &state, &mut worker).await;

        assert!(open);
        assert_eq!(drain(&mut worker_rx), vec![ack(7, None)]);
        assert_eq!(
            drain(&mut client_rx),
            vec![ServerMessage::event("notify", json!({"x": 1}))]
        );
    }

    #[tokio::test]
    async fn test_cross_tenant_emit_is_refused_in_ack() {
        let state = state(AuthMode::Required, false);

        let (mut client, mut client_rx) = session(&state);
        client
            .attach(AuthContext::new("acme", Role::Client, None))
            .unwrap();
        client.join(RoomRequest::Bare("U1".into())).unwrap();

        let (mut worker, mut worker_rx) = session(&state);
        worker.attach(AuthContext::worker("beta")).unwrap();

        let open = process_message(emit_frame(Some(8), "acme"), &state, &mut worker).await;

        assert!(open);
        assert_eq!(drain(&mut worker_rx), vec![ack(8, Some("tenant_mismatch"))]);
        assert!(drain(&mut client_rx).is_empty());
    }

    #[tokio::test]
    async fn test_emit_before_binding_is_not_authorized() {
        let state = state(AuthMode::Optional, false);
        let (mut s, mut rx) = session(&state);

        let open = process_message(emit_frame(Some(9), "acme"), &state, &mut s).await;

        assert!(open);
        assert_eq!(drain(&mut rx), vec![ack(9, Some("not_authorized"))]);
    }

    #[tokio::test]
    async fn test_unframed_failure_reports_error_frame() {
        let state = state(AuthMode::Required, false);
        let (mut s, mut rx) = session(&state);
        s.attach(AuthContext::new("acme", Role::Client, None)).unwrap();

        assert!(process_message(emit_frame(None, "acme"), &state, &mut s).await);
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [ServerMessage::Error { code, .. }] if code == "not_authorized"
        ));
    }

    #[tokio::test]
    async fn test_ping_malformed_and_close() {
        let state = state(AuthMode::Optional, false);
        let (mut s, mut rx) = session(&state);

        assert!(process_message(frame(json!({"type": "ping"})), &state, &mut s).await);
        assert_eq!(drain(&mut rx), vec![ServerMessage::Pong]);

        assert!(process_message(Message::Text("not json".into()), &state, &mut s).await);
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [ServerMessage::Error { code, .. }] if code == "invalid_message"
        ));

        assert!(!process_message(Message::Close(None), &state, &mut s).await);
    }
}
