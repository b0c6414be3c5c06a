//! Geglaettete Latenz (exponentieller gleitender Mittelwert)
//!
//! `neu = alpha * messung + (1 - alpha) * alt`, Startwert 0.

/// Glaettungsfaktor
pub const EMA_ALPHA: f64 = 0.3;

#[derive(Debug, Clone)]
pub struct LatencyEma {
    alpha: f64,
    wert: f64,
    messungen: u64,
}

impl LatencyEma {
    pub fn new() -> Self {
        Self::mit_alpha(EMA_ALPHA)
    }

    pub fn mit_alpha(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            wert: 0.0,
            messungen: 0,
        }
    }

    /// Nimmt eine Messung in Millisekunden auf und gibt den neuen Wert zurueck
    ///
    /// Negative oder nicht-endliche Messungen werden ignoriert.
    pub fn aktualisieren(&mut self, messung_ms: f64) -> f64 {
        if messung_ms.is_finite() && messung_ms >= 0.0 {
            self.wert = self.alpha * messung_ms + (1.0 - self.alpha) * self.wert;
            self.messungen += 1;
        }
        self.wert
    }

    /// Aktueller geglaetteter Wert
    pub fn wert(&self) -> f64 {
        self.wert
    }

    pub fn messungen(&self) -> u64 {
        self.messungen
    }
}

impl Default for LatencyEma {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn erste_messung_von_null() {
        let mut ema = LatencyEma::new();
        assert!((ema.aktualisieren(100.0) - 30.0).abs() < 1e-9);
    }

    #[test]
    fn konvergiert_gegen_konstante() {
        let mut ema = LatencyEma::new();
        for _ in 0..100 {
            ema.aktualisieren(80.0);
        }
        assert!((ema.wert() - 80.0).abs() < 1e-6);
    }

    #[test]
    fn ausreisser_begrenzt() {
        let mut ema = LatencyEma::new();
        for _ in 0..100 {
            ema.aktualisieren(50.0);
        }
        let alt = ema.wert();
        let neu = ema.aktualisieren(1050.0);
        assert!((neu - alt) <= EMA_ALPHA * (1050.0 - alt) + 1e-9);
    }

    #[test]
    fn ungueltige_messungen_ignoriert() {
        let mut ema = LatencyEma::new();
        ema.aktualisieren(-5.0);
        ema.aktualisieren(f64::NAN);
        assert_eq!(ema.wert(), 0.0);
        assert_eq!(ema.messungen(), 0);
    }
}
