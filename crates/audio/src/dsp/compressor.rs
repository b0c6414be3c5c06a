//! Weicher Dynamik-Kompressor
//!
//! Oberhalb des Einsatzpunkts wird der Ueberschuss durch das
//! Kompressionsverhaeltnis geteilt:
//!
//! ```text
//! s' = sign(s) * (threshold + (|s| - threshold) / ratio)
//! ```
//!
//! Fuer |s| <= 1 und ratio >= 1 bleibt das Ergebnis in [-1, 1]. Werte
//! ausserhalb (fehlerhafte Eingaben) werden anschliessend begrenzt,
//! nicht-endliche Samples werden zu 0.

use super::AudioProcessor;

/// Kompressor-Prozessor
pub struct SoftCompressor {
    threshold: f32,
    ratio: f32,
}

impl SoftCompressor {
    /// Erstellt einen Kompressor; `ratio` wird auf mindestens 1.0 angehoben
    pub fn new(threshold: f32, ratio: f32) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
            ratio: if ratio.is_finite() { ratio.max(1.0) } else { 1.0 },
        }
    }

    /// Komprimiert ein einzelnes Sample
    #[inline]
    pub fn komprimieren(&self, sample: f32) -> f32 {
        if !sample.is_finite() {
            return 0.0;
        }
        let betrag = sample.abs();
        let geformt = if betrag > self.threshold {
            let ueberschuss = betrag - self.threshold;
            sample.signum() * (self.threshold + ueberschuss / self.ratio)
        } else {
            sample
        };
        geformt.clamp(-1.0, 1.0)
    }
}

impl AudioProcessor for SoftCompressor {
    fn process(&mut self, samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            *sample = self.komprimieren(*sample);
        }
    }
}
