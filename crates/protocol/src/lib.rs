//! livemap-protocol – Ereignis-Definitionen
//!
//! Dieses Crate definiert alle Nachrichten die zwischen Client und Server
//! ueber die WebSocket-Verbindung ausgetauscht werden.

pub mod events;

pub use events::{
    AlleNutzer, ClientNachricht, NutzerBewegt, NutzerVerlassen, NutzerZustand, SelbstInfo,
    ServerNachricht, StandortUpdate,
};
