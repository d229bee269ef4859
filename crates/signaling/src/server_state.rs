//! Gemeinsamer Relay-Zustand
//!
//! Haelt Registry, Broadcaster und Metriken als geteilte Handles, die sicher
//! zwischen tokio-Tasks geteilt werden koennen.

use livemap_observability::LivemapMetrics;
use std::sync::Arc;

use crate::broadcast::EventBroadcaster;
use crate::registry::ClientRegistry;

/// Konfiguration fuer den Presence-Relay
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Maximale gleichzeitige Sessions
    pub max_clients: u32,
    /// Groesse der Send-Queue pro Session
    pub send_queue_groesse: usize,
    /// Keepalive-Intervall in Sekunden
    pub keepalive_sek: u64,
    /// Timeout fuer inaktive Verbindungen in Sekunden
    pub verbindungs_timeout_sek: u64,
    /// Erlaubte CORS-Origins. Leer = alle Origins erlaubt.
    pub cors_origins: Vec<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_clients: 1024,
            send_queue_groesse: 256,
            keepalive_sek: 25,
            verbindungs_timeout_sek: 60,
            cors_origins: vec![],
        }
    }
}

/// Gemeinsamer Relay-Zustand (thread-safe, Arc-geteilt)
pub struct RelayState {
    pub config: Arc<RelayConfig>,
    /// Registry (Wer ist online, wo)
    pub registry: ClientRegistry,
    /// Event-Broadcaster (Nachrichten an Sessions senden)
    pub broadcaster: EventBroadcaster,
    pub metriken: LivemapMetrics,
}

impl RelayState {
    /// Erstellt einen neuen RelayState
    pub fn neu(config: RelayConfig, metriken: LivemapMetrics) -> Arc<Self> {
        let broadcaster = EventBroadcaster::neu(config.send_queue_groesse, metriken.clone());
        Arc::new(Self {
            config: Arc::new(config),
            registry: ClientRegistry::neu(),
            broadcaster,
            metriken,
        })
    }
}
