//! Adaptive Puffergroesse
//!
//! Waechst schnell bei Underruns (Stabilitaet), schrumpft vorsichtig
//! wenn die Verarbeitung deutlich unter dem Latenzbudget bleibt.
//! Ergebnis ist immer eine Zweierpotenz in
//! [`MIN_BUFFER_SIZE`, `MAX_BUFFER_SIZE`].

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use voxlane_core::config::{MAX_BUFFER_SIZE, MIN_BUFFER_SIZE};

/// Mehr Underruns als diese Grenze im Fenster verdoppeln den Puffer
pub const UNDERRUN_GRENZE: usize = 3;

/// Unter diesem Anteil des Budgets darf der Puffer schrumpfen
pub const SCHRUMPF_ANTEIL: f64 = 0.3;

/// Zeitfenster fuer Underrun-Zaehlung
const UNDERRUN_FENSTER: Duration = Duration::from_secs(5);

/// Anzahl gemerkter Verarbeitungszeiten
const MAX_VERARBEITUNGSZEITEN: usize = 50;

/// Rundet auf die naechstgelegene Zweierpotenz (bei Gleichstand nach oben)
pub fn auf_zweierpotenz_runden(wert: usize) -> usize {
    if wert <= 1 {
        return 1;
    }
    let oben = wert.next_power_of_two();
    let unten = oben / 2;
    if wert - unten < oben - wert {
        unten
    } else {
        oben
    }
}

/// Berechnet die naechste Puffergroesse
///
/// - mehr als `UNDERRUN_GRENZE` Underruns: verdoppeln (max `MAX_BUFFER_SIZE`)
/// - keine Underruns und Verarbeitung unter 30 % des Budgets: halbieren
///   (min `MIN_BUFFER_SIZE`)
/// - sonst unveraendert
pub fn naechste_groesse(
    aktuell: usize,
    underruns: usize,
    durchschnitt_ms: Option<f64>,
    budget_ms: f64,
) -> usize {
    let aktuell = auf_zweierpotenz_runden(aktuell).clamp(MIN_BUFFER_SIZE, MAX_BUFFER_SIZE);

    let neu = if underruns > UNDERRUN_GRENZE {
        aktuell.saturating_mul(2)
    } else if underruns == 0
        && durchschnitt_ms.is_some_and(|ms| ms < budget_ms * SCHRUMPF_ANTEIL)
    {
        aktuell / 2
    } else {
        aktuell
    };

    auf_zweierpotenz_runden(neu).clamp(MIN_BUFFER_SIZE, MAX_BUFFER_SIZE)
}

/// Sammelt Underruns und Verarbeitungszeiten fuer die Puffer-Optimierung
#[derive(Debug, Default)]
pub struct BufferTuner {
    underruns: VecDeque<Instant>,
    verarbeitungszeiten: VecDeque<Duration>,
    underruns_gesamt: u64,
}

impl BufferTuner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Meldet einen Playback-Underrun
    pub fn underrun_melden(&mut self, zeitpunkt: Instant) {
        self.underruns.push_back(zeitpunkt);
        self.underruns_gesamt += 1;
    }

    /// Meldet die Verarbeitungszeit eines Frames
    pub fn verarbeitung_melden(&mut self, dauer: Duration) {
        if self.verarbeitungszeiten.len() >= MAX_VERARBEITUNGSZEITEN {
            self.verarbeitungszeiten.pop_front();
        }
        self.verarbeitungszeiten.push_back(dauer);
    }

    /// Underruns im Zeitfenster vor `jetzt`
    pub fn aktuelle_underruns(&mut self, jetzt: Instant) -> usize {
        while let Some(&erster) = self.underruns.front() {
            if jetzt.saturating_duration_since(erster) > UNDERRUN_FENSTER {
                self.underruns.pop_front();
            } else {
                break;
            }
        }
        self.underruns.len()
    }

    /// Mittlere Verarbeitungszeit in Millisekunden
    pub fn durchschnitt_ms(&self) -> Option<f64> {
        if self.verarbeitungszeiten.is_empty() {
            return None;
        }
        let summe: Duration = self.verarbeitungszeiten.iter().sum();
        Some(summe.as_secs_f64() * 1000.0 / self.verarbeitungszeiten.len() as f64)
    }

    /// Gesamtzahl aller gemeldeten Underruns
    pub fn underruns_gesamt(&self) -> u64 {
        self.underruns_gesamt
    }

    /// Entscheidet ueber die naechste Puffergroesse
    ///
    /// Nach einem Wachstum wird das Underrun-Fenster geleert, damit eine
    /// einzelne Stoerung nicht bei jedem Aufruf erneut verdoppelt.
    pub fn optimieren(&mut self, aktuell: usize, budget_ms: f64, jetzt: Instant) -> usize {
        let underruns = self.aktuelle_underruns(jetzt);
        let neu = naechste_groesse(aktuell, underruns, self.durchschnitt_ms(), budget_ms);
        if neu > aktuell {
            self.underruns.clear();
        }
        neu
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rundung_auf_zweierpotenz() {
        assert_eq!(auf_zweierpotenz_runden(512), 512);
        assert_eq!(auf_zweierpotenz_runden(600), 512);
        assert_eq!(auf_zweierpotenz_runden(800), 1024);
        assert_eq!(auf_zweierpotenz_runden(768), 1024);
        assert_eq!(auf_zweierpotenz_runden(0), 1);
    }

    #[test]
    fn viele_underruns_verdoppeln() {
        assert_eq!(naechste_groesse(512, 4, Some(1.0), 180.0), 1024);
        assert_eq!(naechste_groesse(2048, 10, Some(1.0), 180.0), 2048);
    }

    #[test]
    fn wenige_underruns_halten() {
        assert_eq!(naechste_groesse(512, 3, Some(1.0), 180.0), 512);
        assert_eq!(naechste_groesse(512, 1, Some(1.0), 180.0), 512);
    }

    #[test]
    fn schnelle_verarbeitung_halbiert() {
        assert_eq!(naechste_groesse(1024, 0, Some(10.0), 180.0), 512);
        assert_eq!(naechste_groesse(256, 0, Some(10.0), 180.0), 256);
    }

    #[test]
    fn langsame_verarbeitung_haelt() {
        assert_eq!(naechste_groesse(1024, 0, Some(100.0), 180.0), 1024);
    }

    #[test]
    fn ohne_messwerte_kein_schrumpfen() {
        assert_eq!(naechste_groesse(1024, 0, None, 180.0), 1024);
    }

    #[test]
    fn ergebnis_immer_gueltig() {
        for aktuell in [1usize, 100, 256, 300, 512, 999, 2048, 5000] {
            for underruns in [0usize, 2, 4, 50] {
                for avg in [None, Some(0.1), Some(500.0)] {
                    let n = naechste_groesse(aktuell, underruns, avg, 180.0);
                    assert!(n.is_power_of_two());
                    assert!((MIN_BUFFER_SIZE..=MAX_BUFFER_SIZE).contains(&n));
                }
            }
        }
    }

    #[test]
    fn underrun_fenster_verfaellt() {
        let mut tuner = BufferTuner::new();
        let start = Instant::now();
        for _ in 0..5 {
            tuner.underrun_melden(start);
        }
        assert_eq!(tuner.aktuelle_underruns(start), 5);
        assert_eq!(tuner.aktuelle_underruns(start + Duration::from_secs(6)), 0);
        assert_eq!(tuner.underruns_gesamt(), 5);
    }

    #[test]
    fn optimieren_leert_fenster_nach_wachstum() {
        let mut tuner = BufferTuner::new();
        let jetzt = Instant::now();
        for _ in 0..4 {
            tuner.underrun_melden(jetzt);
        }
        assert_eq!(tuner.optimieren(512, 180.0, jetzt), 1024);
        assert_eq!(tuner.optimieren(1024, 180.0, jetzt), 1024);
    }

    #[test]
    fn durchschnitt_ueber_begrenztes_fenster() {
        let mut tuner = BufferTuner::new();
        assert!(tuner.durchschnitt_ms().is_none());
        for _ in 0..100 {
            tuner.verarbeitung_melden(Duration::from_millis(4));
        }
        assert!((tuner.durchschnitt_ms().unwrap_or_default() - 4.0).abs() < 1e-9);
    }
}
