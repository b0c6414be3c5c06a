//! Noise Gate mit festem Schwellenwert
//!
//! Nullt jedes Sample dessen Betrag unter dem Schwellenwert liegt.
//! Bewusst ohne Attack/Release: die Verarbeitung bleibt ein einzelner
//! zustandsloser Durchlauf und kann beliebig zwischen Threads wechseln.

use super::AudioProcessor;

/// Noise Gate Prozessor
pub struct NoiseGate {
    threshold: f32,
}

impl NoiseGate {
    /// Erstellt ein Gate mit linearem Schwellenwert (0.0–1.0)
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
        }
    }
}

impl AudioProcessor for NoiseGate {
    fn process(&mut self, samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            if sample.abs() < self.threshold {
                *sample = 0.0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leises_signal_wird_genullt() {
        let mut gate = NoiseGate::new(0.01);
        let mut samples = vec![0.005f32, -0.009, 0.0001];
        gate.process(&mut samples);
        assert!(samples.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn lautes_signal_passiert_unveraendert() {
        let mut gate = NoiseGate::new(0.01);
        let mut samples = vec![0.5f32, -0.02, 0.01];
        gate.process(&mut samples);
        assert_eq!(samples, vec![0.5, -0.02, 0.01]);
    }

    #[test]
    fn schwelle_ueber_eins_wird_begrenzt() {
        let mut gate = NoiseGate::new(3.0);
        let mut samples = vec![0.99f32, -1.0, 1.0];
        gate.process(&mut samples);
        // Schwelle 1.0: nur volle Aussteuerung passiert
        assert_eq!(samples, vec![0.0, -1.0, 1.0]);
    }
}
