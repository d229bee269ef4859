//! Event-Broadcaster – Verteilt Ereignisse an verbundene Sessions
//!
//! Der EventBroadcaster verwaltet die Send-Queues aller verbundenen Sessions
//! und stellt Methoden bereit, um Nachrichten gezielt oder an alle zu senden.
//!
//! ## Zustellung
//! - An eine Session: `an_session_senden`
//! - An alle: `an_alle_senden`
//! - An alle ausser einer: `an_alle_ausser_senden`
//!
//! Eingereiht wird immer nicht-blockierend. Eine volle oder geschlossene
//! Queue verwirft nur die Nachricht fuer diesen Empfaenger.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use livemap_core::types::SessionId;
use livemap_observability::LivemapMetrics;
use livemap_protocol::events::ServerNachricht;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::{SignalingError, SignalingResult};

/// Ausgehende Nachricht; geteilt zwischen allen Empfaengern eines Broadcasts
pub type Ausgehend = Arc<ServerNachricht>;

// ---------------------------------------------------------------------------
// ClientSender
// ---------------------------------------------------------------------------

/// Handle auf die Send-Queue einer verbundenen Session
#[derive(Clone, Debug)]
pub struct ClientSender {
    pub session_id: SessionId,
    pub tx: mpsc::Sender<Ausgehend>,
}

impl ClientSender {
    /// Sendet eine Nachricht nicht-blockierend an die Session
    ///
    /// Gibt `false` zurueck wenn die Queue voll oder geschlossen ist.
    pub fn senden(&self, nachricht: Ausgehend) -> bool {
        match self.tx.try_send(nachricht) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(n)) => {
                tracing::warn!(
                    session = %self.session_id,
                    event = n.name(),
                    "Send-Queue voll – Nachricht verworfen"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(session = %self.session_id, "Send-Queue geschlossen (Session getrennt)");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// EventBroadcaster
// ---------------------------------------------------------------------------

/// Zentraler Event-Broadcaster fuer alle verbundenen Sessions
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct EventBroadcaster {
    inner: Arc<EventBroadcasterInner>,
}

struct EventBroadcasterInner {
    /// Session-Sender, indiziert nach SessionId
    clients: DashMap<SessionId, ClientSender>,
    /// Groesse der Send-Queue pro Session
    queue_groesse: usize,
    metriken: LivemapMetrics,
}

impl EventBroadcaster {
    /// Erstellt einen neuen EventBroadcaster
    pub fn neu(queue_groesse: usize, metriken: LivemapMetrics) -> Self {
        Self {
            inner: Arc::new(EventBroadcasterInner {
                clients: DashMap::new(),
                queue_groesse: queue_groesse.max(1),
                metriken,
            }),
        }
    }

    /// Registriert eine Session und gibt ihre Empfangs-Queue zurueck
    ///
    /// Die `ClientConnection` liest aus dieser Queue und schreibt auf den Socket.
    pub fn client_registrieren(
        &self,
        session_id: SessionId,
    ) -> SignalingResult<mpsc::Receiver<Ausgehend>> {
        self.registrieren(session_id, None)
    }

    /// Registriert eine Session mit einer ersten Nachricht in der Queue
    ///
    /// Die Nachricht liegt in der Queue bevor die Session fuer Broadcasts
    /// sichtbar wird und ist damit immer die erste, die der Client erhaelt.
    pub fn client_mit_begruessung_registrieren(
        &self,
        session_id: SessionId,
        begruessung: Ausgehend,
    ) -> SignalingResult<mpsc::Receiver<Ausgehend>> {
        self.registrieren(session_id, Some(begruessung))
    }

    fn registrieren(
        &self,
        session_id: SessionId,
        erste: Option<Ausgehend>,
    ) -> SignalingResult<mpsc::Receiver<Ausgehend>> {
        match self.inner.clients.entry(session_id) {
            Entry::Occupied(_) => Err(SignalingError::DoppelteIdentitaet(session_id)),
            Entry::Vacant(platz) => {
                let (tx, rx) = mpsc::channel(self.inner.queue_groesse);
                if let Some(nachricht) = erste {
                    tx.try_send(nachricht)
                        .map_err(|_| SignalingError::intern("Begruessung nicht einreihbar"))?;
                }
                platz.insert(ClientSender { session_id, tx });
                tracing::debug!(session = %session_id, "Session im Broadcaster registriert");
                Ok(rx)
            }
        }
    }

    /// Entfernt eine Session aus dem Broadcaster
    pub fn client_entfernen(&self, session_id: &SessionId) -> bool {
        let entfernt = self.inner.clients.remove(session_id).is_some();
        if entfernt {
            tracing::debug!(session = %session_id, "Session aus Broadcaster entfernt");
        }
        entfernt
    }

    /// Sendet eine Nachricht an genau eine Session
    ///
    /// Gibt `true` zurueck wenn die Session gefunden und die Nachricht
    /// eingereiht wurde. Eine bereits getrennte Session ist kein Fehler.
    pub fn an_session_senden(&self, session_id: &SessionId, nachricht: Ausgehend) -> bool {
        match self.inner.clients.get(session_id) {
            Some(sender) => self.zustellen(&sender, nachricht),
            None => {
                tracing::debug!(session = %session_id, "Senden an unbekannte Session");
                false
            }
        }
    }

    /// Sendet eine Nachricht an alle verbundenen Sessions
    ///
    /// Gibt die Anzahl der erfolgreichen Sendungen zurueck.
    pub fn an_alle_senden(&self, nachricht: Ausgehend) -> usize {
        self.inner
            .clients
            .iter()
            .filter(|entry| self.zustellen(entry.value(), Arc::clone(&nachricht)))
            .count()
    }

    /// Sendet eine Nachricht an alle verbundenen Sessions ausser einer
    pub fn an_alle_ausser_senden(&self, ausgeschlossen: &SessionId, nachricht: Ausgehend) -> usize {
        self.inner
            .clients
            .iter()
            .filter(|entry| entry.key() != ausgeschlossen)
            .filter(|entry| self.zustellen(entry.value(), Arc::clone(&nachricht)))
            .count()
    }

    /// Gibt die Anzahl der registrierten Sessions zurueck
    pub fn client_anzahl(&self) -> usize {
        self.inner.clients.len()
    }

    /// Prueft ob eine Session registriert ist
    pub fn ist_registriert(&self, session_id: &SessionId) -> bool {
        self.inner.clients.contains_key(session_id)
    }

    fn zustellen(&self, sender: &ClientSender, nachricht: Ausgehend) -> bool {
        let ok = sender.senden(nachricht);
        if !ok {
            self.inner.metriken.dropped_deliveries_total.inc();
        }
        ok
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
