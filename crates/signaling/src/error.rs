//! Fehlertypen fuer den Presence-Relay

use livemap_core::types::SessionId;
use thiserror::Error;

/// Fehlertyp fuer den Presence-Relay
#[derive(Debug, Error)]
pub enum SignalingError {
    /// IO-Fehler (Listener, Socket)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Koordinaten fehlen, sind `null` oder ausserhalb des Wertebereichs
    #[error("Ungueltiger Standort: lat={lat:?}, lon={lon:?}")]
    UngueltigerStandort { lat: Option<f64>, lon: Option<f64> },

    /// Session ist nicht (mehr) in der Registry
    #[error("Unbekannte Session: {0}")]
    UnbekannteSession(SessionId),

    /// Identitaet bereits vergeben – Bug in der ID-Vergabe
    #[error("Doppelte Identitaet: {0}")]
    DoppelteIdentitaet(SessionId),

    /// Nachricht im falschen Session-Zustand
    #[error("Session {0} ist nicht aktiv")]
    NichtAktiv(SessionId),

    /// Server ist voll
    #[error("Server ist voll")]
    ServerVoll,

    /// Interner Fehler
    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl SignalingError {
    /// Erstellt einen internen Fehler
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Fehler die still verworfen werden und die Session nicht beeintraechtigen
    pub fn ist_harmlos(&self) -> bool {
        matches!(
            self,
            Self::UngueltigerStandort { .. } | Self::UnbekannteSession(_) | Self::NichtAktiv(_)
        )
    }
}

/// Result-Typ fuer den Presence-Relay
pub type SignalingResult<T> = Result<T, SignalingError>;
