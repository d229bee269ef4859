//! Client-Registry – Wer ist online und wo
//!
//! Einzige Quelle der Wahrheit fuer alle verbundenen Clients. Ein Eintrag
//! existiert genau so lange wie die zugehoerige Verbindung.
//!
//! ## Nebenlaeufigkeit
//! Die Map liegt hinter einem einzigen `RwLock`: jede Mutation und jeder
//! Snapshot ist ein vollstaendiger kritischer Abschnitt. Unter dem Lock wird
//! nie auf Netzwerk-IO gewartet; Broadcasts arbeiten mit Kopien.

use livemap_core::types::{Koordinate, SessionId};
use livemap_protocol::events::{AlleNutzer, NutzerBewegt, NutzerZustand};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{SignalingError, SignalingResult};
use crate::trail::Spur;

// ---------------------------------------------------------------------------
// ClientRecord
// ---------------------------------------------------------------------------

/// Zustand eines verbundenen Clients
#[derive(Debug, Clone, PartialEq)]
pub struct ClientRecord {
    pub id: SessionId,
    /// Letzte gueltige Position, `None` bis zum ersten Update
    pub position: Option<Koordinate>,
    pub spur: Spur,
}

impl ClientRecord {
    fn neu(id: SessionId) -> Self {
        Self {
            id,
            position: None,
            spur: Spur::neu(),
        }
    }

    /// Oeffentliche Sicht fuer `all_users`
    pub fn zustand(&self) -> NutzerZustand {
        NutzerZustand {
            lat: self.position.map(|p| p.lat),
            lon: self.position.map(|p| p.lon),
            trail: self.spur.als_vec(),
        }
    }

    /// `user_moved`-Payload; `None` solange keine Position bekannt ist
    pub fn bewegung(&self) -> Option<NutzerBewegt> {
        let position = self.position?;
        Some(NutzerBewegt {
            id: self.id,
            lat: position.lat,
            lon: position.lon,
            trail: self.spur.als_vec(),
        })
    }
}

// ---------------------------------------------------------------------------
// Validierung
// ---------------------------------------------------------------------------

/// Prueft ein Standort-Update: beide Werte vorhanden, endlich und im Bereich
pub fn standort_pruefen(lat: Option<f64>, lon: Option<f64>) -> SignalingResult<Koordinate> {
    match (lat, lon) {
        (Some(lat), Some(lon)) => {
            let koordinate = Koordinate::neu(lat, lon);
            if koordinate.ist_gueltig() {
                Ok(koordinate)
            } else {
                Err(SignalingError::UngueltigerStandort {
                    lat: Some(lat),
                    lon: Some(lon),
                })
            }
        }
        _ => Err(SignalingError::UngueltigerStandort { lat, lon }),
    }
}

// ---------------------------------------------------------------------------
// ClientRegistry
// ---------------------------------------------------------------------------

/// Registry aller verbundenen Clients
///
/// Clone teilt den inneren Zustand.
#[derive(Clone, Default)]
pub struct ClientRegistry {
    inner: Arc<RwLock<HashMap<SessionId, ClientRecord>>>,
}

impl ClientRegistry {
    /// Erstellt eine leere Registry
    pub fn neu() -> Self {
        Self::default()
    }

    /// Legt einen leeren Eintrag an
    pub fn anlegen(&self, id: SessionId) -> SignalingResult<()> {
        self.anlegen_und_begruessen(id, |_| Ok(())).map(drop)
    }

    /// Legt einen Eintrag an und ruft `begruessen` mit dem Snapshot danach auf
    ///
    /// `begruessen` laeuft noch unter dem Schreib-Lock und darf nur
    /// nicht-blockierend einreihen. So kann kein anderes Ereignis die
    /// Begruessung des Neuankoemmlings ueberholen. Schlaegt `begruessen`
    /// fehl, wird der Eintrag wieder entfernt.
    pub fn anlegen_und_begruessen<F, T>(
        &self,
        id: SessionId,
        begruessen: F,
    ) -> SignalingResult<(AlleNutzer, T)>
    where
        F: FnOnce(&AlleNutzer) -> SignalingResult<T>,
    {
        let mut clients = self.inner.write();
        if clients.contains_key(&id) {
            return Err(SignalingError::DoppelteIdentitaet(id));
        }
        clients.insert(id, ClientRecord::neu(id));

        let snapshot = snapshot_aus(&clients);
        let ergebnis = match begruessen(&snapshot) {
            Ok(ergebnis) => ergebnis,
            Err(e) => {
                clients.remove(&id);
                return Err(e);
            }
        };
        drop(clients);

        tracing::debug!(session = %id, "Client-Record angelegt");
        Ok((snapshot, ergebnis))
    }

    /// Setzt die Position und erweitert die Spur
    ///
    /// Gibt eine Kopie des aktualisierten Eintrags zurueck. Ungueltige
    /// Koordinaten und unbekannte Sessions veraendern nichts.
    pub fn aktualisieren(
        &self,
        id: &SessionId,
        lat: Option<f64>,
        lon: Option<f64>,
    ) -> SignalingResult<ClientRecord> {
        let punkt = standort_pruefen(lat, lon)?;

        let mut clients = self.inner.write();
        let record = clients
            .get_mut(id)
            .ok_or(SignalingError::UnbekannteSession(*id))?;
        record.position = Some(punkt);
        record.spur.anhaengen(punkt);
        Ok(record.clone())
    }

    /// Entfernt einen Eintrag und gibt ihn zurueck
    pub fn entfernen(&self, id: &SessionId) -> SignalingResult<ClientRecord> {
        self.inner
            .write()
            .remove(id)
            .ok_or(SignalingError::UnbekannteSession(*id))
    }

    /// Konsistente Kopie aller Eintraege
    pub fn snapshot_alle(&self) -> AlleNutzer {
        snapshot_aus(&self.inner.read())
    }

    /// Kopie eines einzelnen Eintrags
    pub fn record(&self, id: &SessionId) -> Option<ClientRecord> {
        self.inner.read().get(id).cloned()
    }

    pub fn ist_online(&self, id: &SessionId) -> bool {
        self.inner.read().contains_key(id)
    }

    pub fn anzahl(&self) -> usize {
        self.inner.read().len()
    }
}

fn snapshot_aus(clients: &HashMap<SessionId, ClientRecord>) -> AlleNutzer {
    clients
        .iter()
        .map(|(id, record)| (*id, record.zustand()))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trail::MAX_SPUR_LAENGE;

    #[test]
    fn anlegen_und_entfernen() {
        let registry = ClientRegistry::neu();
        let id = SessionId::new();

        registry.anlegen(id).unwrap();
        assert!(registry.ist_online(&id));
        assert_eq!(registry.anzahl(), 1);

        let record = registry.record(&id).unwrap();
        assert_eq!(record.position, None);
        assert!(record.spur.is_empty());

        registry.entfernen(&id).unwrap();
        assert!(!registry.ist_online(&id));
        assert_eq!(registry.anzahl(), 0);
    }

    #[test]
    fn doppelte_identitaet_wird_abgelehnt() {
        let registry = ClientRegistry::neu();
        let id = SessionId::new();

        registry.anlegen(id).unwrap();
        let fehler = registry.anlegen(id).unwrap_err();
        assert!(matches!(fehler, SignalingError::DoppelteIdentitaet(x) if x == id));
        assert_eq!(registry.anzahl(), 1);
    }

    #[test]
    fn entfernen_unbekannt_meldet_fehler() {
        let registry = ClientRegistry::neu();
        let fehler = registry.entfernen(&SessionId::new()).unwrap_err();
        assert!(matches!(fehler, SignalingError::UnbekannteSession(_)));
    }

    #[test]
    fn aktualisieren_setzt_position_und_spur() {
        let registry = ClientRegistry::neu();
        let id = SessionId::new();
        registry.anlegen(id).unwrap();

        let record = registry.aktualisieren(&id, Some(52.5), Some(13.4)).unwrap();
        assert_eq!(record.position, Some(Koordinate::neu(52.5, 13.4)));
        assert_eq!(record.spur.als_vec(), vec![Koordinate::neu(52.5, 13.4)]);
        assert_eq!(registry.record(&id).unwrap(), record);
    }

    #[test]
    fn ungueltige_updates_veraendern_nichts() {
        let registry = ClientRegistry::neu();
        let id = SessionId::new();
        registry.anlegen(id).unwrap();
        registry.aktualisieren(&id, Some(1.0), Some(2.0)).unwrap();
        let vorher = registry.record(&id).unwrap();

        for (lat, lon) in [
            (None, Some(2.0)),
            (Some(1.0), None),
            (None, None),
            (Some(10.0), Some(200.0)),
            (Some(-90.1), Some(0.0)),
            (Some(f64::NAN), Some(0.0)),
        ] {
            let fehler = registry.aktualisieren(&id, lat, lon).unwrap_err();
            assert!(matches!(fehler, SignalingError::UngueltigerStandort { .. }));
        }

        assert_eq!(registry.record(&id).unwrap(), vorher);
    }

    #[test]
    fn update_nach_entfernen_belebt_nicht_wieder() {
        let registry = ClientRegistry::neu();
        let id = SessionId::new();
        registry.anlegen(id).unwrap();
        registry.entfernen(&id).unwrap();

        let fehler = registry.aktualisieren(&id, Some(1.0), Some(1.0)).unwrap_err();
        assert!(matches!(fehler, SignalingError::UnbekannteSession(_)));
        assert!(!registry.ist_online(&id));
    }

    #[test]
    fn spur_bleibt_begrenzt() {
        let registry = ClientRegistry::neu();
        let id = SessionId::new();
        registry.anlegen(id).unwrap();

        for i in 0..40 {
            registry
                .aktualisieren(&id, Some(i as f64), Some(i as f64 * 2.0))
                .unwrap();
        }

        let spur = registry.record(&id).unwrap().spur.als_vec();
        assert_eq!(spur.len(), MAX_SPUR_LAENGE);
        assert_eq!(spur[0], Koordinate::neu(10.0, 20.0));
        assert_eq!(spur[MAX_SPUR_LAENGE - 1], Koordinate::neu(39.0, 78.0));
    }

    #[test]
    fn snapshot_enthaelt_alle_eintraege() {
        let registry = ClientRegistry::neu();
        let a = SessionId::new();
        let b = SessionId::new();
        registry.anlegen(a).unwrap();
        registry.anlegen(b).unwrap();
        registry.aktualisieren(&a, Some(3.0), Some(4.0)).unwrap();

        let snapshot = registry.snapshot_alle();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[&a].lat, Some(3.0));
        assert_eq!(snapshot[&a].trail, vec![Koordinate::neu(3.0, 4.0)]);
        assert_eq!(snapshot[&b].lat, None);
        assert!(snapshot[&b].trail.is_empty());
    }

    #[test]
    fn begruessung_sieht_eigenen_eintrag() {
        let registry = ClientRegistry::neu();
        let alt = SessionId::new();
        registry.anlegen(alt).unwrap();

        let neu = SessionId::new();
        let (snapshot, gesehen) = registry
            .anlegen_und_begruessen(neu, |alle| Ok(alle.clone()))
            .unwrap();

        assert_eq!(gesehen, snapshot);
        assert!(snapshot.contains_key(&alt));
        assert!(snapshot.contains_key(&neu));
    }

    #[test]
    fn fehlgeschlagene_begruessung_rollt_zurueck() {
        let registry = ClientRegistry::neu();
        let id = SessionId::new();

        let ergebnis: SignalingResult<(AlleNutzer, ())> = registry
            .anlegen_und_begruessen(id, |_| Err(SignalingError::DoppelteIdentitaet(id)));

        assert!(matches!(ergebnis, Err(SignalingError::DoppelteIdentitaet(_))));
        assert!(!registry.ist_online(&id));
    }

    #[test]
    fn bewegung_erst_nach_erstem_update() {
        let registry = ClientRegistry::neu();
        let id = SessionId::new();
        registry.anlegen(id).unwrap();
        assert!(registry.record(&id).unwrap().bewegung().is_none());

        let record = registry.aktualisieren(&id, Some(1.0), Some(2.0)).unwrap();
        let bewegt = record.bewegung().unwrap();
        assert_eq!(bewegt.id, id);
        assert_eq!((bewegt.lat, bewegt.lon), (1.0, 2.0));
        assert_eq!(bewegt.trail.len(), 1);
    }

    #[test]
    fn clone_teilt_inneren_state() {
        let r1 = ClientRegistry::neu();
        let r2 = r1.clone();
        let id = SessionId::new();

        r1.anlegen(id).unwrap();
        assert!(r2.ist_online(&id));
    }

    #[test]
    fn parallele_updates_bleiben_konsistent() {
        let registry = ClientRegistry::neu();
        let ids: Vec<SessionId> = (0..8).map(|_| SessionId::new()).collect();
        for id in &ids {
            registry.anlegen(*id).unwrap();
        }

        std::thread::scope(|scope| {
            for id in &ids {
                let registry = registry.clone();
                scope.spawn(move || {
                    for i in 0..100 {
                        registry
                            .aktualisieren(id, Some(i as f64 / 10.0), Some(i as f64 / 5.0))
                            .unwrap();
                    }
                });
            }
            let leser = registry.clone();
            scope.spawn(move || {
                for _ in 0..50 {
                    for zustand in leser.snapshot_alle().values() {
                        assert!(zustand.trail.len() <= MAX_SPUR_LAENGE);
                        // Position und letzter Spurpunkt stammen aus demselben Update
                        if let Some(letzter) = zustand.trail.last() {
                            assert_eq!(zustand.lat, Some(letzter.lat));
                            assert_eq!(zustand.lon, Some(letzter.lon));
                        }
                    }
                }
            });
        });

        for id in &ids {
            let record = registry.record(id).unwrap();
            assert_eq!(record.spur.len(), MAX_SPUR_LAENGE);
            assert_eq!(record.position, Some(Koordinate::neu(9.9, 99.0 / 5.0)));
        }
    }
}
