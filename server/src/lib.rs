//! livemap-server – Bibliotheks-Root
//!
//! Verdrahtet Konfiguration, Presence-Relay und Observability.

pub mod config;

use anyhow::Result;
use config::ServerConfig;
use livemap_observability::{observability_server_starten, HealthState, LivemapMetrics};
use livemap_signaling::{RelayServer, RelayState};
use tokio::sync::watch;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Server-Subsysteme und laeuft bis zum Shutdown-Signal
    ///
    /// Reihenfolge:
    /// 1. Metriken und Relay-Zustand anlegen
    /// 2. Observability-Server starten (falls aktiviert)
    /// 3. WebSocket-Relay starten
    /// 4. Auf Ctrl-C warten und Verbindungen geordnet schliessen
    pub async fn starten(self) -> Result<()> {
        let relay_addr = self.config.relay_bind_adresse()?;
        tracing::info!(
            server_name = %self.config.server.name,
            adresse = %relay_addr,
            max_clients = self.config.server.max_clients,
            "Server startet"
        );

        let metriken = LivemapMetrics::neu()?;
        let state = RelayState::neu(self.config.relay_config(), metriken.clone());

        if self.config.observability.aktiviert {
            let obs_addr = self.config.observability_bind_adresse()?;
            let health = HealthState::neu(metriken.clone(), self.config.server.max_clients);
            tokio::spawn(async move {
                if let Err(e) = observability_server_starten(obs_addr, metriken, health).await {
                    tracing::error!(fehler = %e, "Observability-Server beendet");
                }
            });
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut relay = tokio::spawn(RelayServer::neu(state, relay_addr).starten(shutdown_rx));

        tracing::info!("Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
                let _ = shutdown_tx.send(true);
                relay.await??;
            }
            ergebnis = &mut relay => {
                ergebnis??;
            }
        }

        Ok(())
    }
}
