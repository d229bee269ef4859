//! WebSocket-Server (Axum)
//!
//! Stellt `GET /ws` bereit; jede akzeptierte Verbindung laeuft als eigene
//! `ClientConnection`.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderValue, Method};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::connection::ClientConnection;
use crate::error::SignalingResult;
use crate::handler::SessionHandler;
use crate::server_state::RelayState;

/// Axum-State fuer den WebSocket-Endpunkt
#[derive(Clone)]
struct WsState {
    handler: SessionHandler,
    shutdown_rx: watch::Receiver<bool>,
}

/// GET /ws – WebSocket-Upgrade
async fn ws_upgrade(
    State(ws_state): State<WsState>,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| {
        ClientConnection::neu(ws_state.handler, peer_addr).verarbeiten(socket, ws_state.shutdown_rx)
    })
}

/// Presence-Relay ueber WebSocket
pub struct RelayServer {
    state: Arc<RelayState>,
    bind_addr: SocketAddr,
}

impl RelayServer {
    pub fn neu(state: Arc<RelayState>, bind_addr: SocketAddr) -> Self {
        Self { state, bind_addr }
    }

    /// Baut den Router mit CORS- und Trace-Layer
    pub fn router(&self, shutdown_rx: watch::Receiver<bool>) -> Router {
        // CORS konfigurieren: entweder spezifische Origins oder Any
        let origins = &self.state.config.cors_origins;
        let cors = if origins.is_empty() {
            CorsLayer::permissive()
        } else {
            let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([Method::GET, Method::OPTIONS])
                .allow_headers(tower_http::cors::Any)
        };

        let ws_state = WsState {
            handler: SessionHandler::neu(Arc::clone(&self.state)),
            shutdown_rx,
        };

        Router::new()
            .route("/ws", get(ws_upgrade))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .with_state(ws_state)
    }

    /// Startet den Server und laeuft bis zum Shutdown-Signal
    pub async fn starten(self, shutdown_rx: watch::Receiver<bool>) -> SignalingResult<()> {
        let app = self.router(shutdown_rx.clone());

        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;
        tracing::info!(addr = %self.bind_addr, "Presence-Relay gestartet");

        let mut shutdown = shutdown_rx;
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            while shutdown.changed().await.is_ok() {
                if *shutdown.borrow() {
                    break;
                }
            }
        })
        .await?;

        tracing::info!("Presence-Relay beendet");
        Ok(())
    }
}
