//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable:
//! - `LM_LOG_LEVEL`: Log-Level bzw. EnvFilter-Direktive, Standard: info
//! - `LM_LOG_FORMAT`: Format (text/json), Standard: text
//!
//! Ein einfaches Level gilt nur fuer die Livemap-Crates und `tower_http`,
//! fremde Crates bleiben auf `warn`. Session-IDs werden als strukturierte
//! Felder (`session = %id`) geloggt.

use tracing_subscriber::{fmt, EnvFilter};

/// Crates, die das konfigurierte Level erhalten
const LIVEMAP_TARGETS: &[&str] = &[
    "livemap_core",
    "livemap_protocol",
    "livemap_signaling",
    "livemap_observability",
    "livemap_server",
    "tower_http",
];

/// Initialisiert das Logging-System.
///
/// Umgebungsvariablen haben Vorrang vor den uebergebenen Werten aus der
/// Konfigurationsdatei.
pub fn logging_initialisieren(level: &str, format: &str) {
    let level = std::env::var("LM_LOG_LEVEL").unwrap_or_else(|_| level.to_string());
    let filter = EnvFilter::try_new(filter_direktive(&level))
        .unwrap_or_else(|_| EnvFilter::new(filter_direktive("info")));

    let format = std::env::var("LM_LOG_FORMAT").unwrap_or_else(|_| format.to_string());

    if format == "json" {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(filter).compact().init();
    }
}

/// Baut die EnvFilter-Direktive
///
/// `"debug"` wird zu `"warn,livemap_core=debug,...,tower_http=debug"`.
/// Alles andere gilt als vollstaendige Direktive und bleibt unveraendert.
pub fn filter_direktive(level: &str) -> String {
    let level = level.trim();
    if !ist_einfaches_level(level) {
        return level.to_string();
    }

    std::iter::once("warn".to_string())
        .chain(LIVEMAP_TARGETS.iter().map(|target| format!("{target}={level}")))
        .collect::<Vec<_>>()
        .join(",")
}

/// Prueft ob `level` ein einfaches Level oder eine gueltige Direktive ist
pub fn log_filter_gueltig(level: &str) -> bool {
    !level.trim().is_empty() && EnvFilter::try_new(filter_direktive(level)).is_ok()
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}

fn ist_einfaches_level(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error" | "off")
}
