//! Prometheus-kompatible Metriken fuer Livemap
//!
//! Registrierte Metriken:
//! - `livemap_connected_sessions` – Gauge: Aktuell verbundene Sessions
//! - `livemap_location_updates_total` – Counter: Angenommene Standort-Updates
//! - `livemap_rejected_updates_total` – Counter: Verworfene Standort-Updates
//! - `livemap_dropped_deliveries_total` – Counter: Nicht zugestellte Ereignisse
//! - `livemap_rejected_connections_total` – Counter: Abgelehnte Verbindungen

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Alle Livemap-Prometheus-Metriken
///
/// Clone teilt die Registry und alle Zaehler.
#[derive(Clone)]
pub struct LivemapMetrics {
    pub registry: Arc<Registry>,

    pub connected_sessions: IntGauge,
    pub location_updates_total: IntCounter,
    pub rejected_updates_total: IntCounter,
    pub dropped_deliveries_total: IntCounter,
    pub rejected_connections_total: IntCounter,
}

impl LivemapMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let connected_sessions = IntGauge::with_opts(Opts::new(
            "livemap_connected_sessions",
            "Anzahl aktuell verbundener Sessions",
        ))?;
        registry.register(Box::new(connected_sessions.clone()))?;

        let location_updates_total = IntCounter::with_opts(Opts::new(
            "livemap_location_updates_total",
            "Gesamtanzahl angenommener Standort-Updates",
        ))?;
        registry.register(Box::new(location_updates_total.clone()))?;

        let rejected_updates_total = IntCounter::with_opts(Opts::new(
            "livemap_rejected_updates_total",
            "Gesamtanzahl verworfener Standort-Updates",
        ))?;
        registry.register(Box::new(rejected_updates_total.clone()))?;

        let dropped_deliveries_total = IntCounter::with_opts(Opts::new(
            "livemap_dropped_deliveries_total",
            "Ereignisse die einem Empfaenger nicht zugestellt werden konnten",
        ))?;
        registry.register(Box::new(dropped_deliveries_total.clone()))?;

        let rejected_connections_total = IntCounter::with_opts(Opts::new(
            "livemap_rejected_connections_total",
            "Abgelehnte Verbindungen (Server voll)",
        ))?;
        registry.register(Box::new(rejected_connections_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            connected_sessions,
            location_updates_total,
            rejected_updates_total,
            dropped_deliveries_total,
            rejected_connections_total,
        })
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: LivemapMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<LivemapMetrics>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
