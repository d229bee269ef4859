//! Gemeinsame Typen fuer Livemap
//!
//! IDs verwenden das Newtype-Pattern um Verwechslungen zur Compilezeit
//! auszuschliessen.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Eindeutige Session-ID
///
/// Wird beim Verbindungsaufbau vergeben und ist gleichzeitig die oeffentliche
/// Identitaet des Clients. Auf dem Draht als UUID-String serialisiert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Erstellt eine neue zufaellige SessionId (UUID v4)
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session:{}", self.0)
    }
}

/// Maximaler Betrag der geografischen Breite in Grad
pub const MAX_BREITE: f64 = 90.0;
/// Maximaler Betrag der geografischen Laenge in Grad
pub const MAX_LAENGE: f64 = 180.0;

/// Geografische Position (WGS84, Grad)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Koordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Koordinate {
    pub fn neu(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Prueft ob beide Werte endlich sind und im Wertebereich liegen
    pub fn ist_gueltig(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-MAX_BREITE..=MAX_BREITE).contains(&self.lat)
            && (-MAX_LAENGE..=MAX_LAENGE).contains(&self.lon)
    }
}
