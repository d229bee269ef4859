//! Spur – begrenzte Bewegungshistorie eines Clients
//!
//! FIFO mit fester Kapazitaet: beim Ueberlauf faellt der aelteste Punkt weg.

use livemap_core::types::Koordinate;
use std::collections::VecDeque;

/// Maximale Anzahl Punkte in einer Spur
pub const MAX_SPUR_LAENGE: usize = 30;

/// Letzte Positionen eines Clients in Einfuege-Reihenfolge
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Spur {
    punkte: VecDeque<Koordinate>,
}

impl Spur {
    pub fn neu() -> Self {
        Self {
            punkte: VecDeque::with_capacity(MAX_SPUR_LAENGE),
        }
    }

    /// Haengt einen Punkt an; verdraengt den aeltesten wenn die Spur voll ist
    pub fn anhaengen(&mut self, punkt: Koordinate) {
        if self.punkte.len() == MAX_SPUR_LAENGE {
            self.punkte.pop_front();
        }
        self.punkte.push_back(punkt);
    }

    pub fn len(&self) -> usize {
        self.punkte.len()
    }

    pub fn is_empty(&self) -> bool {
        self.punkte.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Koordinate> {
        self.punkte.iter()
    }

    /// Kopie der Punkte, aeltester zuerst
    pub fn als_vec(&self) -> Vec<Koordinate> {
        self.punkte.iter().copied().collect()
    }
}
