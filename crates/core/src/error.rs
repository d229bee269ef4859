//! Fehlertypen fuer Livemap
//!
//! Zentraler Fehler-Enum fuer Protokollfehler.
//! Untermodule koennen eigene Fehler definieren und via `#[from]` konvertieren.

use thiserror::Error;

/// Globaler Result-Alias fuer Livemap
pub type Result<T> = std::result::Result<T, LivemapError>;

/// Crate-uebergreifende Fehler im Livemap-System
#[derive(Debug, Error)]
pub enum LivemapError {
    // --- Protokoll ---
    #[error("Ungueltige Nachricht: {0}")]
    UngueltigeNachricht(String),

    #[error("Serialisierung fehlgeschlagen: {0}")]
    Serialisierung(#[from] serde_json::Error),
}

impl LivemapError {
    /// Erstellt einen Fehler fuer eine nicht dekodierbare Nachricht
    pub fn ungueltige_nachricht(msg: impl Into<String>) -> Self {
        Self::UngueltigeNachricht(msg.into())
    }
}
