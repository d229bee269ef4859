//! Session-Handler – Lebenszyklus einer Verbindung
//!
//! Reagiert auf die drei Signale der Transportschicht (Verbindung, Standort,
//! Trennung) und orchestriert Registry und Broadcaster.
//!
//! ## State Machine
//! ```text
//! Verbindend -> Aktiv -> Getrennt
//! ```
//! Standort-Updates sind nur im Zustand `Aktiv` erlaubt. `Getrennt` ist
//! endgueltig; erneutes Trennen ist ein No-op.

use livemap_core::types::SessionId;
use livemap_protocol::events::{
    ClientNachricht, NutzerVerlassen, SelbstInfo, ServerNachricht, StandortUpdate,
};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::broadcast::Ausgehend;
use crate::error::{SignalingError, SignalingResult};
use crate::server_state::RelayState;

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Zustand einer Session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionZustand {
    /// Identitaet vergeben, Bootstrap laeuft
    Verbindend,
    /// Registriert, nimmt Standort-Updates an
    Aktiv,
    /// Aus Registry und Broadcaster entfernt
    Getrennt,
}

/// Eine Session aus Sicht des Handlers
///
/// Gehoert dem Verbindungs-Task; die ID ist die oeffentliche Identitaet.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    zustand: SessionZustand,
}

impl Session {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn zustand(&self) -> SessionZustand {
        self.zustand
    }
}

// ---------------------------------------------------------------------------
// SessionHandler
// ---------------------------------------------------------------------------

/// Verarbeitet die Lebenszyklus-Ereignisse aller Sessions
///
/// Clone ist billig; jeder Verbindungs-Task haelt eine eigene Kopie.
#[derive(Clone)]
pub struct SessionHandler {
    state: Arc<RelayState>,
}

impl SessionHandler {
    /// Erstellt einen neuen Handler
    pub fn neu(state: Arc<RelayState>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &Arc<RelayState> {
        &self.state
    }

    /// Neue Verbindung: Identitaet vergeben, registrieren, Bootstrap senden
    ///
    /// Der neue Client erhaelt `user_connected_self` mit dem Snapshot
    /// (inklusive sich selbst), alle anderen `all_users_update`.
    pub fn verbinden(&self) -> SignalingResult<(Session, mpsc::Receiver<Ausgehend>)> {
        let state = &self.state;

        if state.registry.anzahl() >= state.config.max_clients as usize {
            state.metriken.rejected_connections_total.inc();
            tracing::warn!(max = state.config.max_clients, "Server voll – Verbindung abgelehnt");
            return Err(SignalingError::ServerVoll);
        }

        let mut session = Session {
            id: SessionId::new(),
            zustand: SessionZustand::Verbindend,
        };
        let id = session.id;

        // Begruessung und `all_users_update` im selben kritischen Abschnitt wie
        // das Anlegen. Ein spaeteres `user_left` liegt damit immer hinter jedem
        // Snapshot, der die entfernte Session noch enthaelt.
        let angelegt = state.registry.anlegen_und_begruessen(id, |alle| {
            let begruessung = ServerNachricht::UserConnectedSelf(SelbstInfo {
                id,
                all_users: alle.clone(),
            });
            let ausgang = state
                .broadcaster
                .client_mit_begruessung_registrieren(id, Arc::new(begruessung))?;
            let peers = state
                .broadcaster
                .an_alle_ausser_senden(&id, Arc::new(ServerNachricht::AllUsersUpdate(alle.clone())));
            Ok((ausgang, peers))
        });

        let (ausgang, peers) = match angelegt {
            Ok((_, angelegt)) => angelegt,
            Err(e) => {
                tracing::error!(session = %id, fehler = %e, "Session konnte nicht angelegt werden");
                return Err(e);
            }
        };

        state.metriken.connected_sessions.inc();
        session.zustand = SessionZustand::Aktiv;

        tracing::info!(session = %id, peers, "Session verbunden");
        Ok((session, ausgang))
    }

    /// Verarbeitet eine dekodierte Client-Nachricht
    ///
    /// Fire-and-forget: Fehler werden geloggt, nie an den Sender gemeldet.
    pub fn nachricht_verarbeiten(&self, session: &Session, nachricht: ClientNachricht) {
        match nachricht {
            ClientNachricht::LocationUpdate(update) => {
                if let Err(e) = self.standort_aktualisieren(session, update) {
                    if e.ist_harmlos() {
                        tracing::debug!(session = %session.id, fehler = %e, "Standort-Update verworfen");
                    } else {
                        tracing::error!(session = %session.id, fehler = %e, "Standort-Update fehlgeschlagen");
                    }
                }
            }
        }
    }

    /// Standort-Update anwenden und an alle anderen verteilen
    ///
    /// Bei einem Fehler wird weder die Registry veraendert noch gesendet.
    pub fn standort_aktualisieren(
        &self,
        session: &Session,
        update: StandortUpdate,
    ) -> SignalingResult<()> {
        let state = &self.state;

        if session.zustand != SessionZustand::Aktiv {
            state.metriken.rejected_updates_total.inc();
            return Err(SignalingError::NichtAktiv(session.id));
        }

        let record = match state.registry.aktualisieren(&session.id, update.lat, update.lon) {
            Ok(record) => record,
            Err(e) => {
                state.metriken.rejected_updates_total.inc();
                return Err(e);
            }
        };
        state.metriken.location_updates_total.inc();

        let bewegung = record
            .bewegung()
            .ok_or_else(|| SignalingError::intern("Record ohne Position nach Update"))?;
        let empfaenger = state
            .broadcaster
            .an_alle_ausser_senden(&session.id, Arc::new(ServerNachricht::UserMoved(bewegung)));

        tracing::trace!(session = %session.id, empfaenger, "Standort verteilt");
        Ok(())
    }

    /// Verbindung getrennt: entfernen und die verbleibenden informieren
    ///
    /// Gibt `true` zurueck wenn die Session noch registriert war. Fuer
    /// unbekannte oder bereits getrennte Sessions wird nichts gesendet.
    pub fn trennen(&self, session: &mut Session) -> bool {
        if session.zustand == SessionZustand::Getrennt {
            return false;
        }
        session.zustand = SessionZustand::Getrennt;

        // Erst aus der Registry: danach nimmt kein Snapshot die Session mehr auf
        let state = &self.state;
        let entfernt = state.registry.entfernen(&session.id);
        state.broadcaster.client_entfernen(&session.id);

        match entfernt {
            Ok(_) => {
                state.metriken.connected_sessions.dec();
                let empfaenger = state.broadcaster.an_alle_senden(Arc::new(
                    ServerNachricht::UserLeft(NutzerVerlassen { id: session.id }),
                ));
                tracing::info!(session = %session.id, empfaenger, "Session getrennt und entfernt");
                true
            }
            Err(e) => {
                tracing::debug!(session = %session.id, fehler = %e, "Trennen ohne Registry-Eintrag");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server_state::RelayConfig;
    use livemap_observability::LivemapMetrics;

    fn handler_mit(config: RelayConfig) -> SessionHandler {
        SessionHandler::neu(RelayState::neu(config, LivemapMetrics::neu().unwrap()))
    }

    fn handler() -> SessionHandler {
        handler_mit(RelayConfig::default())
    }

    fn update(lat: f64, lon: f64) -> StandortUpdate {
        StandortUpdate {
            lat: Some(lat),
            lon: Some(lon),
        }
    }

    fn leeren(rx: &mut mpsc::Receiver<Ausgehend>) -> Vec<ServerNachricht> {
        let mut nachrichten = Vec::new();
        while let Ok(n) = rx.try_recv() {
            nachrichten.push((*n).clone());
        }
        nachrichten
    }

    #[tokio::test]
    async fn verbinden_sendet_begruessung() {
        let handler = handler();
        let (session, mut rx) = handler.verbinden().unwrap();

        assert_eq!(session.zustand(), SessionZustand::Aktiv);
        assert!(handler.state().registry.ist_online(&session.id()));

        let nachrichten = leeren(&mut rx);
        assert_eq!(nachrichten.len(), 1);
        match &nachrichten[0] {
            ServerNachricht::UserConnectedSelf(info) => {
                assert_eq!(info.id, session.id());
                assert_eq!(info.all_users.len(), 1);
                assert_eq!(info.all_users[&session.id()].lat, None);
            }
            andere => panic!("Erwartet user_connected_self, erhalten {andere:?}"),
        }
    }

    #[tokio::test]
    async fn bestehende_sessions_erhalten_all_users_update() {
        let handler = handler();
        let (_a, mut rx_a) = handler.verbinden().unwrap();
        leeren(&mut rx_a);

        let (b, mut rx_b) = handler.verbinden().unwrap();

        let bei_a = leeren(&mut rx_a);
        assert_eq!(bei_a.len(), 1);
        match &bei_a[0] {
            ServerNachricht::AllUsersUpdate(alle) => assert!(alle.contains_key(&b.id())),
            andere => panic!("Erwartet all_users_update, erhalten {andere:?}"),
        }

        // Der Neuankoemmling bekommt nur seine Begruessung
        let bei_b = leeren(&mut rx_b);
        assert_eq!(bei_b.len(), 1);
        assert!(matches!(bei_b[0], ServerNachricht::UserConnectedSelf(_)));
    }

    #[tokio::test]
    async fn update_geht_nicht_an_den_sender() {
        let handler = handler();
        let (a, mut rx_a) = handler.verbinden().unwrap();
        let (_b, mut rx_b) = handler.verbinden().unwrap();
        leeren(&mut rx_a);
        leeren(&mut rx_b);

        handler.standort_aktualisieren(&a, update(10.0, 20.0)).unwrap();

        assert!(leeren(&mut rx_a).is_empty());
        let bei_b = leeren(&mut rx_b);
        match &bei_b[..] {
            [ServerNachricht::UserMoved(bewegt)] => {
                assert_eq!(bewegt.id, a.id());
                assert_eq!((bewegt.lat, bewegt.lon), (10.0, 20.0));
                assert_eq!(bewegt.trail.len(), 1);
            }
            andere => panic!("Erwartet ein user_moved, erhalten {andere:?}"),
        }
    }

    #[tokio::test]
    async fn ungueltiges_update_wird_verworfen() {
        let handler = handler();
        let (a, _rx_a) = handler.verbinden().unwrap();
        let (_b, mut rx_b) = handler.verbinden().unwrap();
        leeren(&mut rx_b);

        let null_lat = StandortUpdate {
            lat: None,
            lon: Some(20.0),
        };
        assert!(handler.standort_aktualisieren(&a, null_lat).is_err());
        assert!(handler.standort_aktualisieren(&a, update(10.0, 200.0)).is_err());

        assert!(leeren(&mut rx_b).is_empty());
        let record = handler.state().registry.record(&a.id()).unwrap();
        assert_eq!(record.position, None);
        assert!(record.spur.is_empty());
        assert_eq!(handler.state().metriken.rejected_updates_total.get(), 2);

        // Session bleibt aktiv
        assert_eq!(a.zustand(), SessionZustand::Aktiv);
        handler.standort_aktualisieren(&a, update(1.0, 2.0)).unwrap();
    }

    #[tokio::test]
    async fn trennen_informiert_alle_verbleibenden() {
        let handler = handler();
        let (mut a, _rx_a) = handler.verbinden().unwrap();
        let (_b, mut rx_b) = handler.verbinden().unwrap();
        let (_c, mut rx_c) = handler.verbinden().unwrap();
        leeren(&mut rx_b);
        leeren(&mut rx_c);

        assert!(handler.trennen(&mut a));
        assert_eq!(a.zustand(), SessionZustand::Getrennt);
        assert!(!handler.state().registry.ist_online(&a.id()));
        assert!(!handler.state().broadcaster.ist_registriert(&a.id()));

        for rx in [&mut rx_b, &mut rx_c] {
            let nachrichten = leeren(rx);
            assert_eq!(
                nachrichten,
                vec![ServerNachricht::UserLeft(NutzerVerlassen { id: a.id() })]
            );
        }
    }

    #[tokio::test]
    async fn doppeltes_trennen_ist_idempotent() {
        let handler = handler();
        let (mut a, _rx_a) = handler.verbinden().unwrap();
        let (_b, mut rx_b) = handler.verbinden().unwrap();
        leeren(&mut rx_b);

        assert!(handler.trennen(&mut a));
        assert!(!handler.trennen(&mut a));

        assert_eq!(leeren(&mut rx_b).len(), 1);
        assert_eq!(handler.state().metriken.connected_sessions.get(), 1);
    }

    #[tokio::test]
    async fn trennen_ohne_registry_eintrag_sendet_nichts() {
        let handler = handler();
        let (mut a, _rx_a) = handler.verbinden().unwrap();
        let (_b, mut rx_b) = handler.verbinden().unwrap();
        leeren(&mut rx_b);

        handler.state().registry.entfernen(&a.id()).unwrap();

        assert!(!handler.trennen(&mut a));
        assert!(leeren(&mut rx_b).is_empty());
    }

    #[tokio::test]
    async fn update_nach_trennen_wird_abgewiesen() {
        let handler = handler();
        let (mut a, _rx_a) = handler.verbinden().unwrap();
        handler.trennen(&mut a);

        let fehler = handler.standort_aktualisieren(&a, update(1.0, 1.0)).unwrap_err();
        assert!(matches!(fehler, SignalingError::NichtAktiv(_)));
        assert!(!handler.state().registry.ist_online(&a.id()));
    }

    #[tokio::test]
    async fn voller_server_lehnt_ab() {
        let handler = handler_mit(RelayConfig {
            max_clients: 1,
            ..RelayConfig::default()
        });
        let (_a, _rx_a) = handler.verbinden().unwrap();

        assert!(matches!(handler.verbinden(), Err(SignalingError::ServerVoll)));
        assert_eq!(handler.state().registry.anzahl(), 1);
        assert_eq!(handler.state().broadcaster.client_anzahl(), 1);
        assert_eq!(handler.state().metriken.rejected_connections_total.get(), 1);
    }

    #[tokio::test]
    async fn nachricht_verarbeiten_verteilt_update() {
        let handler = handler();
        let (a, _rx_a) = handler.verbinden().unwrap();
        let (_b, mut rx_b) = handler.verbinden().unwrap();
        leeren(&mut rx_b);

        handler.nachricht_verarbeiten(&a, ClientNachricht::LocationUpdate(update(5.0, 6.0)));
        handler.nachricht_verarbeiten(
            &a,
            ClientNachricht::LocationUpdate(StandortUpdate { lat: None, lon: None }),
        );

        let bei_b = leeren(&mut rx_b);
        assert_eq!(bei_b.len(), 1);
        assert!(matches!(bei_b[0], ServerNachricht::UserMoved(_)));
    }
}
