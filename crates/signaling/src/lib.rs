//! livemap-signaling – Presence-Relay
//!
//! Dieser Crate implementiert den Kern des Livemap-Servers: jede Verbindung
//! streamt ihre Position, der Server haelt den Zustand aller Clients und
//! verteilt jedes Update an alle anderen.
//!
//! ## Architektur
//!
//! ```text
//! WebSocket (RelayServer, GET /ws)
//!     |
//!     v
//! ClientConnection (pro Verbindung ein Task)
//!     |  State Machine: Verbindend -> Aktiv -> Getrennt
//!     |
//!     v
//! SessionHandler
//!     |
//!     +-- ClientRegistry   (Wer ist online, wo, mit welcher Spur)
//!     |       +-- Spur     (letzte 30 Positionen, FIFO)
//!     |
//!     +-- EventBroadcaster (an eine Session, an alle, an alle ausser einer)
//! ```

pub mod broadcast;
pub mod connection;
pub mod error;
pub mod handler;
pub mod registry;
pub mod server_state;
pub mod trail;
pub mod ws;

// Bequeme Re-Exporte
pub use broadcast::{Ausgehend, EventBroadcaster};
pub use connection::ClientConnection;
pub use error::{SignalingError, SignalingResult};
pub use handler::{Session, SessionHandler, SessionZustand};
pub use registry::{ClientRecord, ClientRegistry};
pub use server_state::{RelayConfig, RelayState};
pub use trail::{Spur, MAX_SPUR_LAENGE};
pub use ws::RelayServer;
