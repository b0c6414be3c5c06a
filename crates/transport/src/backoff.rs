//! Exponentieller Backoff fuer Reconnects
//!
//! Verzoegerung fuer Versuch k (ab 0): `basis * 2^k`, solange
//! k < `max_versuche`.

use std::time::Duration;

/// Zaehlt Reconnect-Versuche und berechnet die Wartezeit
#[derive(Debug, Clone)]
pub struct Backoff {
    basis: Duration,
    max_versuche: u32,
    versuche: u32,
}

impl Backoff {
    pub fn new(basis: Duration, max_versuche: u32) -> Self {
        Self {
            basis,
            max_versuche,
            versuche: 0,
        }
    }

    /// Verzoegerung fuer Versuch `k` (None wenn das Budget erschoepft ist)
    pub fn verzoegerung(&self, k: u32) -> Option<Duration> {
        if k >= self.max_versuche {
            return None;
        }
        let faktor = 1u32.checked_shl(k)?;
        self.basis.checked_mul(faktor)
    }

    /// Naechster Versuch: (Versuchsnummer ab 1, Verzoegerung)
    pub fn naechster(&mut self) -> Option<(u32, Duration)> {
        let d = self.verzoegerung(self.versuche)?;
        self.versuche += 1;
        Some((self.versuche, d))
    }

    /// Bisher gestartete Versuche
    pub fn versuche(&self) -> u32 {
        self.versuche
    }

    pub fn max_versuche(&self) -> u32 {
        self.max_versuche
    }

    /// Gibt zurueck ob keine Versuche mehr uebrig sind
    pub fn erschoepft(&self) -> bool {
        self.versuche >= self.max_versuche
    }

    /// Setzt den Zaehler zurueck
    pub fn reset(&mut self) {
        self.versuche = 0;
    }
}
