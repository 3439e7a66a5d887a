//! PTY session relay over the app's WebSocket (component I).
//!
//! An app connects with a stable `clientToken` query parameter so its
//! pairing survives a reconnect. Each PTY session it opens is recorded in
//! [`super::GatewayState::pty_sessions`] keyed by `sessionId`; terminal I/O is
//! routed by looking that record up, never by holding a direct socket
//! reference on the runner side.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use pairwire_core::protocol::{
    events, ConnectRunnerPayload, CreateSessionPayload, Envelope, SessionCreatedPayload,
    SessionResumePayload, SessionResumedPayload, TerminalInputPayload, TerminalResizePayload,
};
use pairwire_core::{ClientToken, PairingError, RunnerId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::pairing_ws::{self, generic_error_envelope};
use crate::GatewayState;

/// A PTY session opened by an app against a runner, recorded so terminal
/// frames from either side can be routed without the socket holding state.
pub struct PtySessionRecord {
    pub app_client_token: ClientToken,
    pub runner_id: RunnerId,
}

/// The app socket currently authoritative for a `clientToken`. A later
/// connection for the same token replaces this entry (socket takeover); the
/// superseded socket's own disconnect cleanup must not remove it.
pub struct AppConnection {
    pub sender: mpsc::UnboundedSender<Message>,
}

#[derive(serde::Deserialize)]
pub struct AppConnectQuery {
    #[serde(rename = "clientToken")]
    pub client_token: Option<String>,
}

pub async fn app_ws_handler(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<AppConnectQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let client_token = match query.client_token.filter(|t| !t.is_empty()) {
        Some(t) => ClientToken::from(t),
        None => {
            let fallback = ClientToken::from_socket_id(&uuid::Uuid::new_v4().to_string());
            warn!(client_token = %fallback, "app connected without a clientToken; pairing will not survive reconnect");
            fallback
        }
    };
    ws.on_upgrade(move |socket| handle_app_socket(state, socket, client_token))
}

async fn handle_app_socket(state: Arc<GatewayState>, socket: WebSocket, client_token: ClientToken) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    // A later connection for the same token is expected to take over here —
    // whichever socket inserted last is the one terminal I/O is routed to.
    state
        .app_directory
        .write()
        .await
        .insert(client_token.clone(), AppConnection { sender: tx.clone() });
    info!(client_token = %client_token, "app connected");

    while let Some(Ok(msg)) = ws_receiver.next().await {
        match msg {
            Message::Text(text) => {
                let Ok(env) = serde_json::from_str::<Envelope>(&text) else {
                    continue;
                };
                match dispatch_app_event(&state, &client_token, &env).await {
                    DispatchOutcome::Reply(reply) => {
                        if tx.send(Message::Text(reply.to_text().into())).is_err() {
                            break;
                        }
                    }
                    DispatchOutcome::Unauthorized(reply) => {
                        let _ = tx.send(Message::Text(reply.to_text().into()));
                        let _ = tx.send(Message::Close(None));
                        break;
                    }
                    DispatchOutcome::None => {}
                }
            }
            Message::Close(_) => break,
            Message::Ping(payload) => {
                let _ = tx.send(Message::Pong(payload));
            }
            _ => {}
        }
    }

    // Only remove the directory entry if it still points at this socket — a
    // stale disconnect must never clobber a newer socket that took over.
    {
        let mut dir = state.app_directory.write().await;
        if dir.get(&client_token).is_some_and(|conn| conn.sender.same_channel(&tx)) {
            dir.remove(&client_token);
        }
    }
    send_task.abort();
    info!(client_token = %client_token, "app disconnected");
}

/// What to do with a dispatched app frame. Unlike a normal reply, an
/// unauthorized `app:auth` must close the socket — nothing else on this
/// connection can be trusted once authentication has failed.
enum DispatchOutcome {
    Reply(Envelope),
    Unauthorized(Envelope),
    None,
}

async fn dispatch_app_event(state: &GatewayState, client_token: &ClientToken, env: &Envelope) -> DispatchOutcome {
    match env.event.as_str() {
        events::APP_AUTH => match pairing_ws::handle_app_auth(state, client_token, env).await {
            Ok((_, reply)) => DispatchOutcome::Reply(reply),
            Err(PairingError::Unauthorized) => {
                DispatchOutcome::Unauthorized(generic_error_envelope(PairingError::Unauthorized))
            }
            Err(err) => DispatchOutcome::Reply(generic_error_envelope(err)),
        },
        events::APP_PAIR => DispatchOutcome::Reply(pairing_ws::handle_app_pair(state, client_token, env).await),
        events::APP_PAIRING_STATUS => {
            DispatchOutcome::Reply(pairing_ws::handle_app_pairing_status(state, client_token).await)
        }
        events::APP_UNPAIR => DispatchOutcome::Reply(pairing_ws::handle_app_unpair(state, client_token).await),
        events::CONNECT_RUNNER => DispatchOutcome::Reply(handle_connect_runner(state, client_token, env).await),
        events::TERMINAL_INPUT => {
            forward_input_to_runner(state, client_token, env).await;
            DispatchOutcome::None
        }
        events::TERMINAL_RESIZE => {
            forward_resize_to_runner(state, client_token, env).await;
            DispatchOutcome::None
        }
        events::SESSION_RESUME => DispatchOutcome::Reply(handle_session_resume(state, client_token, env).await),
        _ => DispatchOutcome::None,
    }
}

async fn handle_connect_runner(state: &GatewayState, client_token: &ClientToken, env: &Envelope) -> Envelope {
    let Some(payload) = env.decode::<ConnectRunnerPayload>() else {
        return generic_error_envelope(PairingError::InvalidFormat);
    };
    let runner_id = RunnerId::from(payload.runner_id);

    match state.session_registry.get_session(client_token).await {
        Ok(Some(session)) if session.runner_id == runner_id.to_string() => {}
        Ok(_) => return generic_error_envelope(PairingError::NotPaired),
        Err(_) => return generic_error_envelope(PairingError::Internal),
    }

    let Some(runner) = state.runner_directory.get(&runner_id).await else {
        return generic_error_envelope(PairingError::RunnerOffline);
    };

    state.pty_sessions.write().await.insert(
        payload.session_id.clone(),
        PtySessionRecord {
            app_client_token: client_token.clone(),
            runner_id,
        },
    );

    let forward = Envelope::new(
        events::CREATE_SESSION,
        CreateSessionPayload { session_id: payload.session_id.clone() },
    );
    let _ = runner.sender.send(Message::Text(forward.to_text().into()));

    Envelope::new(events::SESSION_CREATED, SessionCreatedPayload { session_id: payload.session_id })
}

async fn forward_input_to_runner(state: &GatewayState, client_token: &ClientToken, env: &Envelope) {
    let Some(payload) = env.decode::<TerminalInputPayload>() else {
        return;
    };
    forward_to_owning_runner(state, client_token, &payload.session_id, env).await;
}

async fn forward_resize_to_runner(state: &GatewayState, client_token: &ClientToken, env: &Envelope) {
    let Some(payload) = env.decode::<TerminalResizePayload>() else {
        return;
    };
    forward_to_owning_runner(state, client_token, &payload.session_id, env).await;
}

/// Forward `env` verbatim to the runner owning `session_id`, silently
/// dropping it if the caller isn't that session's app (no replay buffer, no
/// error frame — a stale frame from a torn-down session is not an error).
async fn forward_to_owning_runner(
    state: &GatewayState,
    client_token: &ClientToken,
    session_id: &str,
    env: &Envelope,
) {
    let record = {
        let sessions = state.pty_sessions.read().await;
        sessions
            .get(session_id)
            .map(|r| (r.app_client_token.clone(), r.runner_id.clone()))
    };
    let Some((owner, runner_id)) = record else {
        return;
    };
    if &owner != client_token {
        return;
    }
    if let Some(runner) = state.runner_directory.get(&runner_id).await {
        let _ = runner.sender.send(Message::Text(env.to_text().into()));
    }
}

async fn handle_session_resume(state: &GatewayState, client_token: &ClientToken, env: &Envelope) -> Envelope {
    let Some(payload) = env.decode::<SessionResumePayload>() else {
        return generic_error_envelope(PairingError::InvalidFormat);
    };
    // A session only resumes for the app that owns it — otherwise this
    // would let any authenticated app probe for the existence of another
    // client's session id.
    let active = state
        .pty_sessions
        .read()
        .await
        .get(&payload.session_id)
        .is_some_and(|record| &record.app_client_token == client_token);
    Envelope::new(events::SESSION_RESUMED, SessionResumedPayload { session_id: payload.session_id, active })
}
