//! Client-Connection – Verwaltet eine einzelne WebSocket-Verbindung
//!
//! Jede Verbindung bekommt eine `ClientConnection` in einem eigenen
//! tokio-Task. Eingehende Text-Frames werden dekodiert und an den
//! `SessionHandler` weitergereicht, die Broadcast-Queue der Session wird in
//! ausgehende Text-Frames umgesetzt.
//!
//! ## Keepalive
//! - Server sendet alle `keepalive_sek` einen Ping
//! - Ohne eingehenden Frame innerhalb von `verbindungs_timeout_sek` wird
//!   die Verbindung getrennt

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use livemap_protocol::events::ClientNachricht;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};

use crate::error::SignalingError;
use crate::handler::SessionHandler;

/// Close-Code: Server wird heruntergefahren
const CLOSE_GOING_AWAY: u16 = 1001;
/// Close-Code: interner Fehler beim Aufbau der Session
const CLOSE_INTERNAL_ERROR: u16 = 1011;
/// Close-Code: Server voll, spaeter erneut versuchen
const CLOSE_TRY_AGAIN_LATER: u16 = 1013;

/// Verarbeitet eine einzelne WebSocket-Verbindung
pub struct ClientConnection {
    handler: SessionHandler,
    peer_addr: SocketAddr,
}

impl ClientConnection {
    /// Erstellt eine neue ClientConnection
    pub fn neu(handler: SessionHandler, peer_addr: SocketAddr) -> Self {
        Self { handler, peer_addr }
    }

    /// Startet die Verbindungs-Verarbeitungsschleife
    ///
    /// Laeuft bis der Client trennt, der Timeout greift oder ein
    /// Shutdown-Signal eingeht. Danach wird die Session immer getrennt.
    pub async fn verarbeiten(self, mut socket: WebSocket, mut shutdown_rx: watch::Receiver<bool>) {
        let peer_addr = self.peer_addr;
        let config = self.handler.state().config.clone();
        let keepalive_intervall = Duration::from_secs(config.keepalive_sek.max(1));
        let timeout_dauer = Duration::from_secs(config.verbindungs_timeout_sek);

        let (mut session, mut ausgang) = match self.handler.verbinden() {
            Ok(verbunden) => verbunden,
            Err(e) => {
                let code = match e {
                    SignalingError::ServerVoll => CLOSE_TRY_AGAIN_LATER,
                    _ => CLOSE_INTERNAL_ERROR,
                };
                tracing::warn!(peer = %peer_addr, fehler = %e, "Verbindung abgelehnt");
                let _ = socket
                    .send(Message::Close(Some(CloseFrame {
                        code,
                        reason: e.to_string().into(),
                    })))
                    .await;
                return;
            }
        };
        let session_id = session.id();

        tracing::info!(peer = %peer_addr, session = %session_id, "Neue Verbindung");

        // Zeitpunkt des letzten empfangenen Frames
        let mut letzter_empfang = Instant::now();
        // Zeitpunkt des naechsten Ping
        let mut naechster_ping = Instant::now() + keepalive_intervall;

        loop {
            tokio::select! {
                // Eingehender Frame vom Client
                frame = socket.recv() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            letzter_empfang = Instant::now();
                            match ClientNachricht::aus_json(&text) {
                                Ok(nachricht) => {
                                    self.handler.nachricht_verarbeiten(&session, nachricht);
                                }
                                Err(e) => {
                                    tracing::debug!(
                                        session = %session_id,
                                        fehler = %e,
                                        "Ungueltiger Frame verworfen"
                                    );
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::info!(session = %session_id, "Verbindung vom Client getrennt");
                            break;
                        }
                        Some(Ok(_)) => {
                            // Ping, Pong und Binary zaehlen nur als Lebenszeichen
                            letzter_empfang = Instant::now();
                        }
                        Some(Err(e)) => {
                            tracing::warn!(session = %session_id, fehler = %e, "Frame-Lesefehler");
                            break;
                        }
                    }
                }

                // Ausgehendes Ereignis aus dem Broadcaster
                Some(ausgehend) = ausgang.recv() => {
                    let json = match ausgehend.zu_json() {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::error!(
                                session = %session_id,
                                event = ausgehend.name(),
                                fehler = %e,
                                "Serialisierung fehlgeschlagen"
                            );
                            continue;
                        }
                    };
                    if let Err(e) = socket.send(Message::Text(json)).await {
                        tracing::warn!(session = %session_id, fehler = %e, "Senden fehlgeschlagen");
                        break;
                    }
                }

                // Keepalive-Ping
                _ = sleep_until(naechster_ping) => {
                    if let Err(e) = socket.send(Message::Ping(Vec::new())).await {
                        tracing::warn!(session = %session_id, fehler = %e, "Ping-Senden fehlgeschlagen");
                        break;
                    }
                    naechster_ping = Instant::now() + keepalive_intervall;
                }

                // Kein Frame innerhalb des Timeouts
                _ = sleep_until(letzter_empfang + timeout_dauer) => {
                    tracing::warn!(peer = %peer_addr, session = %session_id, "Verbindungs-Timeout");
                    break;
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(session = %session_id, "Shutdown-Signal – Verbindung wird getrennt");
                        let _ = socket
                            .send(Message::Close(Some(CloseFrame {
                                code: CLOSE_GOING_AWAY,
                                reason: "Server wird heruntergefahren".into(),
                            })))
                            .await;
                        break;
                    }
                }
            }
        }

        self.handler.trennen(&mut session);
        tracing::info!(peer = %peer_addr, session = %session_id, "Verbindungs-Task beendet");
    }
}
