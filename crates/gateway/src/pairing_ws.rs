//! Runner registration/heartbeat socket, and the app-side pairing
//! sub-protocol (component H).
//!
//! The runner socket is handled entirely in this module. The app-facing
//! handlers (`handle_app_*`) are plain functions called from
//! [`crate::session_ws`]'s dispatch loop rather than owning a socket
//! themselves — pairing frames share one connection with terminal I/O.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use pairwire_core::protocol::{
    events, AppAuthPayload, AppAuthenticatedPayload, AppPairPayload, Envelope, ErrorPayload,
    PairingErrorPayload, PairingStatusPayload, PairingSuccessPayload, RunnerHeartbeatPayload,
    RunnerRegisterPayload, RunnerRegisteredPayload, RunnerStatusPayload, SessionEndedPayload,
    TerminalOutputPayload, EmptyPayload,
};
use pairwire_core::{AppIdentity, ClientToken, DomainEvent, PairingError, RunnerId};
use pairwire_security::pairing_code;
use pairwire_pairing::HistoryAction;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::runner_directory::RunnerHandle;
use crate::GatewayState;

pub fn generic_error_envelope(err: PairingError) -> Envelope {
    Envelope::new(events::ERROR, ErrorPayload { code: err.code(), message: err.to_string() })
}

fn pairing_error_envelope(err: PairingError, remaining_ban_time: Option<u64>, runner_id: Option<String>) -> Envelope {
    Envelope::new(
        events::PAIRING_ERROR,
        PairingErrorPayload { code: err.code(), message: err.to_string(), remaining_ban_time, runner_id },
    )
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the unix epoch")
        .as_millis() as i64
}

// ── Runner socket (registration, heartbeat, terminal relay inbound) ───────

pub async fn runner_ws_handler(State(state): State<Arc<GatewayState>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_runner_socket(state, socket))
}

async fn handle_runner_socket(state: Arc<GatewayState>, socket: WebSocket) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    let mut registered_runner_id: Option<RunnerId> = None;

    while let Some(Ok(msg)) = ws_receiver.next().await {
        match msg {
            Message::Text(text) => {
                let Ok(env) = serde_json::from_str::<Envelope>(&text) else {
                    continue;
                };
                match env.event.as_str() {
                    events::RUNNER_REGISTER => match handle_runner_register(&state, &tx, &env).await {
                        RegisterOutcome::Registered(runner_id) => registered_runner_id = Some(runner_id),
                        RegisterOutcome::Unauthorized => {
                            let _ = tx.send(Message::Close(None));
                            break;
                        }
                        RegisterOutcome::Skip => {}
                    },
                    events::RUNNER_HEARTBEAT => handle_runner_heartbeat(&state, &tx, &env).await,
                    events::TERMINAL_OUTPUT => handle_terminal_output(&state, &env).await,
                    events::SESSION_ENDED => handle_session_ended(&state, &env).await,
                    _ => {}
                }
            }
            Message::Close(_) => break,
            Message::Ping(payload) => {
                let _ = tx.send(Message::Pong(payload));
            }
            _ => {}
        }
    }

    if let Some(runner_id) = registered_runner_id {
        cleanup_disconnected_runner(&state, &runner_id).await;
    }
    send_task.abort();
}

/// What happened when a `runner:register` frame was dispatched. Unlike a
/// malformed-frame skip, an unauthorized registration must close the
/// socket — the caller isn't a runner that can be trusted with anything
/// else on this connection.
enum RegisterOutcome {
    Registered(RunnerId),
    Unauthorized,
    Skip,
}

async fn handle_runner_register(
    state: &GatewayState,
    tx: &mpsc::UnboundedSender<Message>,
    env: &Envelope,
) -> RegisterOutcome {
    let Some(payload) = env.decode::<RunnerRegisterPayload>() else {
        return RegisterOutcome::Skip;
    };
    let runner_id = RunnerId::from(payload.runner_id);

    if !state.credential_validator.validate_runner(&runner_id, &payload.secret) {
        let _ = tx.send(Message::Text(generic_error_envelope(PairingError::Unauthorized).to_text().into()));
        return RegisterOutcome::Unauthorized;
    }

    if let Some(previous) = state
        .runner_directory
        .register(runner_id.clone(), RunnerHandle { sender: tx.clone(), connected_at: Utc::now() })
        .await
    {
        let _ = previous.sender.send(Message::Close(None));
    }

    if let Err(err) = state.session_registry.update_heartbeat(&runner_id).await {
        warn!(runner_id = %runner_id, error = %err, "failed to record initial heartbeat");
    }

    let code = match state.code_registry.register_code(&runner_id).await {
        Ok(code) => code,
        Err(err) => {
            let _ = tx.send(Message::Text(generic_error_envelope(err).to_text().into()));
            return RegisterOutcome::Skip;
        }
    };
    let expires_at = now_millis() + state.config.pairing.code_ttl_secs as i64 * 1000;

    let _ = tx.send(Message::Text(
        Envelope::new(
            events::RUNNER_REGISTERED,
            RunnerRegisteredPayload { runner_id: runner_id.to_string(), pairing_code: code, expires_at },
        )
        .to_text().into(),
    ));

    notify_paired_apps(state, &runner_id, events::RUNNER_ONLINE).await;
    state
        .event_bus
        .publish(DomainEvent::RunnerOnline { runner_id: runner_id.to_string(), timestamp: Utc::now() });
    info!(runner_id = %runner_id, "runner registered");

    RegisterOutcome::Registered(runner_id)
}

async fn handle_runner_heartbeat(state: &GatewayState, tx: &mpsc::UnboundedSender<Message>, env: &Envelope) {
    let Some(payload) = env.decode::<RunnerHeartbeatPayload>() else {
        return;
    };
    let runner_id = RunnerId::from(payload.runner_id);
    if state.session_registry.update_heartbeat(&runner_id).await.is_ok() {
        let _ = tx.send(Message::Text(
            Envelope::new(events::RUNNER_HEARTBEAT_ACK, EmptyPayload::default()).to_text().into(),
        ));
    }
}

async fn handle_terminal_output(state: &GatewayState, env: &Envelope) {
    let Some(payload) = env.decode::<TerminalOutputPayload>() else {
        return;
    };
    route_to_owning_app(state, &payload.session_id.clone(), Envelope::new(events::TERMINAL_OUTPUT, payload)).await;
}

async fn handle_session_ended(state: &GatewayState, env: &Envelope) {
    let Some(payload) = env.decode::<SessionEndedPayload>() else {
        return;
    };
    route_to_owning_app(state, &payload.session_id, Envelope::new(events::SESSION_ENDED, payload.clone())).await;
    state.pty_sessions.write().await.remove(&payload.session_id);
}

async fn route_to_owning_app(state: &GatewayState, session_id: &str, envelope: Envelope) {
    let app_token = {
        let sessions = state.pty_sessions.read().await;
        sessions.get(session_id).map(|r| r.app_client_token.clone())
    };
    let Some(app_token) = app_token else {
        return;
    };
    if let Some(conn) = state.app_directory.read().await.get(&app_token) {
        let _ = conn.sender.send(Message::Text(envelope.to_text().into()));
    }
}

async fn notify_paired_apps(state: &GatewayState, runner_id: &RunnerId, event: &str) {
    let Ok(apps) = state.session_registry.get_apps_by_runner_id(runner_id).await else {
        return;
    };
    let dir = state.app_directory.read().await;
    for app in apps {
        if let Some(conn) = dir.get(&app) {
            let _ = conn.sender.send(Message::Text(
                Envelope::new(event, RunnerStatusPayload { runner_id: runner_id.to_string() }).to_text().into(),
            ));
        }
    }
}

async fn cleanup_disconnected_runner(state: &GatewayState, runner_id: &RunnerId) {
    if let Ok(Some(code)) = state.code_registry.find_code_by_runner_id(runner_id).await {
        let _ = state.code_registry.invalidate_code(&code).await;
    }

    notify_paired_apps(state, runner_id, events::RUNNER_OFFLINE).await;

    match state.session_registry.remove_all_sessions_for_runner(runner_id).await {
        Ok(tokens) => {
            for token in &tokens {
                let _ = state
                    .history
                    .record(runner_id, &token.to_string(), HistoryAction::RunnerDisconnected)
                    .await;
            }
        }
        Err(err) => warn!(runner_id = %runner_id, error = %err, "failed to tear down sessions on disconnect"),
    }

    state.runner_directory.unregister(runner_id).await;
    state
        .event_bus
        .publish(DomainEvent::RunnerOffline { runner_id: runner_id.to_string(), timestamp: Utc::now() });
    info!(runner_id = %runner_id, "runner disconnected");
}

// ── App-side pairing sub-protocol (called from session_ws's dispatch) ─────

/// Authenticate an `app:auth` frame. The error variant is the raw
/// [`PairingError`], not a rendered envelope — callers need to distinguish
/// `Unauthorized` (which must close the socket) from a merely malformed
/// frame (which does not).
pub async fn handle_app_auth(
    state: &GatewayState,
    client_token: &ClientToken,
    env: &Envelope,
) -> Result<(AppIdentity, Envelope), PairingError> {
    let Some(payload) = env.decode::<AppAuthPayload>() else {
        return Err(PairingError::InvalidFormat);
    };
    let Some(identity) = state.credential_validator.validate_app_token(&payload.token) else {
        return Err(PairingError::Unauthorized);
    };

    let runners = match state.session_registry.get_session(client_token).await {
        Ok(Some(session)) => vec![session.runner_id],
        _ => Vec::new(),
    };
    let reply = Envelope::new(
        events::APP_AUTHENTICATED,
        AppAuthenticatedPayload { user_id: identity.subject_id.clone(), runners },
    );
    Ok((identity, reply))
}

pub async fn handle_app_pair(state: &GatewayState, client_token: &ClientToken, env: &Envelope) -> Envelope {
    let Some(payload) = env.decode::<AppPairPayload>() else {
        return pairing_error_envelope(PairingError::InvalidFormat, None, None);
    };

    if state.rate_limiter.is_banned(client_token).await.unwrap_or(false) {
        let remaining = state.rate_limiter.get_remaining_ban_time(client_token).await.unwrap_or(0);
        return pairing_error_envelope(PairingError::RateLimited, Some(remaining), None);
    }

    if !pairing_code::validate(&payload.code) {
        let _ = state.rate_limiter.record_failed_attempt(client_token).await;
        return pairing_error_envelope(PairingError::InvalidFormat, None, None);
    }

    let runner_id = match state.code_registry.validate_code(&payload.code).await {
        Ok(Some(runner_id)) => runner_id,
        Ok(None) => {
            let _ = state.rate_limiter.record_failed_attempt(client_token).await;
            return pairing_error_envelope(PairingError::CodeNotFound, None, None);
        }
        Err(err) => return pairing_error_envelope(err, None, None),
    };

    if !state.session_registry.is_runner_online(&runner_id).await.unwrap_or(false) {
        let _ = state.rate_limiter.record_failed_attempt(client_token).await;
        return pairing_error_envelope(PairingError::RunnerOffline, None, Some(runner_id.to_string()));
    }

    if let Err(err) = state.session_registry.create_session(client_token, &runner_id).await {
        return pairing_error_envelope(err, None, None);
    }

    let _ = state.code_registry.increment_usage_count(&payload.code).await;
    let _ = state.rate_limiter.reset(client_token).await;
    let _ = state.history.record(&runner_id, &client_token.to_string(), HistoryAction::Paired).await;
    state
        .event_bus
        .publish(DomainEvent::Paired { runner_id: runner_id.to_string(), timestamp: Utc::now() });

    Envelope::new(
        events::PAIRING_SUCCESS,
        PairingSuccessPayload { runner_id: runner_id.to_string(), paired_at: now_millis(), runner_online: true },
    )
}

pub async fn handle_app_pairing_status(state: &GatewayState, client_token: &ClientToken) -> Envelope {
    match state.session_registry.get_session(client_token).await {
        Ok(Some(session)) => {
            let runner_id = RunnerId::from(session.runner_id.clone());
            let online = state.session_registry.is_runner_online(&runner_id).await.unwrap_or(false);
            Envelope::new(
                events::PAIRING_STATUS,
                PairingStatusPayload {
                    is_paired: true,
                    runner_id: Some(session.runner_id),
                    paired_at: Some(session.paired_at),
                    runner_online: Some(online),
                },
            )
        }
        _ => Envelope::new(
            events::PAIRING_STATUS,
            PairingStatusPayload { is_paired: false, runner_id: None, paired_at: None, runner_online: None },
        ),
    }
}

pub async fn handle_app_unpair(state: &GatewayState, client_token: &ClientToken) -> Envelope {
    let Some(session) = state.session_registry.get_session(client_token).await.ok().flatten() else {
        return pairing_error_envelope(PairingError::NotPaired, None, None);
    };
    let runner_id = RunnerId::from(session.runner_id);

    let _ = state.session_registry.remove_session(client_token).await;
    let _ = state.history.record(&runner_id, &client_token.to_string(), HistoryAction::Unpaired).await;
    state
        .event_bus
        .publish(DomainEvent::Unpaired { runner_id: runner_id.to_string(), timestamp: Utc::now() });

    Envelope::new(events::PAIRING_UNPAIRED, EmptyPayload::default())
}
