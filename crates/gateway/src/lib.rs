//! WebSocket gateway for the pairwire terminal relay broker.
//!
//! Exposes two long-lived WebSocket routes — `/ws/runner` for PTY-hosting
//! runners and `/ws/app` for the apps that pair with them — plus a `/health`
//! check. All pairing and session state lives behind [`GatewayState`], built
//! once per process and shared across every connection via `Arc`.

pub mod pairing_ws;
pub mod runner_directory;
pub mod session_ws;

use axum::http::Method;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use pairwire_core::{ClientToken, DomainEvent, EventBus, RunnerId, Store};
use pairwire_pairing::{CodeRegistry, PairingHistory, RateLimiter, SessionRegistry};
use pairwire_security::CredentialValidator;
use serde::Serialize;
use session_ws::{AppConnection, PtySessionRecord};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tracing::info;

pub use runner_directory::{RunnerDirectory, RunnerHandle};

/// Shared state for every connection the gateway serves.
pub struct GatewayState {
    pub config: pairwire_config::BrokerConfig,
    pub credential_validator: Arc<CredentialValidator>,
    pub code_registry: Arc<CodeRegistry>,
    pub session_registry: Arc<SessionRegistry>,
    pub rate_limiter: Arc<RateLimiter>,
    pub history: Arc<PairingHistory>,
    pub runner_directory: Arc<RunnerDirectory>,
    pub pty_sessions: RwLock<HashMap<String, PtySessionRecord>>,
    pub app_directory: RwLock<HashMap<ClientToken, AppConnection>>,
    pub event_bus: Arc<EventBus>,
}

impl GatewayState {
    pub fn new(config: pairwire_config::BrokerConfig, store: Arc<dyn Store>) -> Self {
        let runner_secrets = config
            .auth
            .runner_credentials
            .iter()
            .map(|(id, secret)| (RunnerId::from(id.clone()), secret.clone()))
            .collect();
        let credential_validator =
            Arc::new(CredentialValidator::new(runner_secrets, config.auth.app_token_secret.clone()));

        let code_registry = Arc::new(CodeRegistry::new(
            store.clone(),
            Duration::from_secs(config.pairing.code_ttl_secs),
        ));
        let session_registry = Arc::new(SessionRegistry::new(
            store.clone(),
            Duration::from_secs(config.pairing.heartbeat_ttl_secs),
            Duration::from_secs(config.pairing.heartbeat_online_grace_secs),
        ));
        let rate_limiter = Arc::new(RateLimiter::new(
            store.clone(),
            Duration::from_secs(config.pairing.rate_limit_window_secs),
            config.pairing.rate_limit_max_failures,
            Duration::from_secs(config.pairing.rate_limit_ban_secs),
        ));
        let history = Arc::new(PairingHistory::new(store, config.pairing.history_capacity));

        Self {
            config,
            credential_validator,
            code_registry,
            session_registry,
            rate_limiter,
            history,
            runner_directory: Arc::new(RunnerDirectory::new()),
            pty_sessions: RwLock::new(HashMap::new()),
            app_directory: RwLock::new(HashMap::new()),
            event_bus: Arc::new(EventBus::default()),
        }
    }
}

/// Build the Axum router: health check plus the two WebSocket upgrade routes.
pub fn build_router(state: Arc<GatewayState>) -> Router {
    let cors = build_cors_layer(&state.config.cors.allowed_origins);
    Router::new()
        .route("/health", get(health_handler))
        .route("/ws/runner", get(pairing_ws::runner_ws_handler))
        .route("/ws/app", get(session_ws::app_ws_handler))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_headers([axum::http::header::CONTENT_TYPE, axum::http::header::AUTHORIZATION]);

    if allowed_origins.is_empty() {
        layer.allow_origin(tower_http::cors::Any)
    } else {
        let origins: Vec<_> = allowed_origins.iter().filter_map(|origin| origin.parse().ok()).collect();
        layer.allow_origin(tower_http::cors::AllowOrigin::list(origins))
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok", version: env!("CARGO_PKG_VERSION") })
}

/// Bridge domain events onto the tracing pipeline. Every pairing/runner
/// lifecycle transition already gets a dedicated `info!` at its call site;
/// this bridge exists so the same transitions are also observable as a
/// single consistent event stream, the way a metrics exporter or a debug
/// endpoint would consume them.
fn spawn_event_log_bridge(state: &Arc<GatewayState>) {
    let mut events = state.event_bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event.as_ref() {
                DomainEvent::RunnerOnline { runner_id, timestamp } => {
                    info!(runner_id, %timestamp, "event: runner_online");
                }
                DomainEvent::RunnerOffline { runner_id, timestamp } => {
                    info!(runner_id, %timestamp, "event: runner_offline");
                }
                DomainEvent::Paired { runner_id, timestamp } => {
                    info!(runner_id, %timestamp, "event: paired");
                }
                DomainEvent::Unpaired { runner_id, timestamp } => {
                    info!(runner_id, %timestamp, "event: unpaired");
                }
            }
        }
    });
}

/// Bind and serve the gateway. Builds a fresh in-memory store for this
/// process; a networked deployment would construct a different `Store`
/// implementation here and pass it to [`GatewayState::new`] unchanged.
pub async fn start(config: pairwire_config::BrokerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let host = config.gateway.host.clone();
    let port = config.gateway.port;
    let addr = format!("{host}:{port}");

    let store: Arc<dyn Store> = Arc::new(pairwire_store_memory::InMemoryStore::new());
    let state = Arc::new(GatewayState::new(config, store));
    spawn_event_log_bridge(&state);
    let app = build_router(state);

    info!(addr = %addr, "gateway listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_state() -> Arc<GatewayState> {
        let store: Arc<dyn Store> = Arc::new(pairwire_store_memory::InMemoryStore::new());
        Arc::new(GatewayState::new(pairwire_config::BrokerConfig::default(), store))
    }

    #[tokio::test]
    async fn health_endpoint_reports_ok() {
        let app = build_router(test_state());
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn event_log_bridge_drains_published_events() {
        let state = test_state();
        // A second subscriber confirms the publish actually reached the
        // bus, since the bridge task itself has no observable side effect
        // beyond a log line.
        let mut probe = state.event_bus.subscribe();
        spawn_event_log_bridge(&state);

        state.event_bus.publish(pairwire_core::DomainEvent::RunnerOnline {
            runner_id: "R1".into(),
            timestamp: chrono::Utc::now(),
        });

        let event = tokio::time::timeout(std::time::Duration::from_secs(1), probe.recv())
            .await
            .expect("bridge should not block other subscribers")
            .expect("channel open");
        assert!(matches!(event.as_ref(), pairwire_core::DomainEvent::RunnerOnline { .. }));
    }
}
