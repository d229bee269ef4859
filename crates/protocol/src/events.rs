//! Ereignis-Protokoll (WebSocket, JSON)
//!
//! Jede Nachricht ist ein Umschlag der Form
//! `{"event": "<name>", "data": <payload>}`.
//!
//! ## Design
//! - Adjacently tagged Enums fuer typsichere Ereignisse
//! - Eingehende Frames die nicht dem Schema entsprechen werden vor der
//!   Registry abgewiesen
//! - `lat`/`lon` eines Nutzers sind `null` bis zum ersten Update

use livemap_core::error::{LivemapError, Result};
use livemap_core::types::{Koordinate, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Client -> Server
// ---------------------------------------------------------------------------

/// Standort-Update eines Clients
///
/// Beide Felder sind optional damit `null` oder fehlende Werte erst in der
/// Registry als ungueltig erkannt werden und nicht den Frame-Decoder
/// scheitern lassen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StandortUpdate {
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
}

/// Alle Nachrichten die ein Client senden darf
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientNachricht {
    LocationUpdate(StandortUpdate),
}

impl ClientNachricht {
    /// Dekodiert einen Text-Frame
    pub fn aus_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| LivemapError::ungueltige_nachricht(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Server -> Client
// ---------------------------------------------------------------------------

/// Oeffentlicher Zustand eines Nutzers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutzerZustand {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub trail: Vec<Koordinate>,
}

/// Alle verbundenen Nutzer, indiziert nach SessionId
pub type AlleNutzer = BTreeMap<SessionId, NutzerZustand>;

/// Begruessung fuer einen neu verbundenen Client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelbstInfo {
    pub id: SessionId,
    pub all_users: AlleNutzer,
}

/// Ein anderer Nutzer hat sich bewegt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutzerBewegt {
    pub id: SessionId,
    pub lat: f64,
    pub lon: f64,
    pub trail: Vec<Koordinate>,
}

/// Ein Nutzer hat die Verbindung getrennt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NutzerVerlassen {
    pub id: SessionId,
}

/// Alle Nachrichten die der Server versendet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerNachricht {
    /// Nur an den neuen Client: eigene ID plus aktueller Gesamtzustand
    UserConnectedSelf(SelbstInfo),
    /// An alle anderen: Gesamtzustand inklusive Neuankoemmling
    AllUsersUpdate(AlleNutzer),
    /// An alle ausser dem Ausloeser
    UserMoved(NutzerBewegt),
    /// An alle verbleibenden Clients
    UserLeft(NutzerVerlassen),
}

impl ServerNachricht {
    /// Name des Ereignisses wie er auf dem Draht erscheint
    pub fn name(&self) -> &'static str {
        match self {
            Self::UserConnectedSelf(_) => "user_connected_self",
            Self::AllUsersUpdate(_) => "all_users_update",
            Self::UserMoved(_) => "user_moved",
            Self::UserLeft(_) => "user_left",
        }
    }

    /// Serialisiert die Nachricht als JSON-Text-Frame
    pub fn zu_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialisiert eine Server-Nachricht (Client-Seite und Tests)
    pub fn aus_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
