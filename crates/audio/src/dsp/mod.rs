//! DSP-Module fuer die Audio-Konditionierung
//!
//! Alle Module implementieren das `AudioProcessor` Trait fuer
//! eine einheitliche Pipeline-Integration.

pub mod compressor;
pub mod noise_gate;

use voxlane_core::config::OptimizationConfig;

/// Gemeinsames Trait fuer alle Audio-Prozessoren
///
/// Alle DSP-Bausteine verarbeiten Samples in-place und sind
/// Send + Sync fuer Thread-sichere Pipeline-Nutzung.
pub trait AudioProcessor: Send + Sync {
    /// Verarbeitet einen Puffer von Samples in-place
    fn process(&mut self, samples: &mut [f32]);
}

/// Parameter der Konditionierungs-Kette (pro Session unveraenderlich)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DspParams {
    /// Samples mit |s| unter diesem Wert werden genullt
    pub gate_threshold: f32,
    /// Einsatzpunkt des Kompressors
    pub compression_threshold: f32,
    /// Kompressionsverhaeltnis oberhalb des Einsatzpunkts
    pub compression_ratio: f32,
}

impl DspParams {
    /// Uebernimmt die Parameter aus der Session-Konfiguration
    pub fn aus_config(config: &OptimizationConfig) -> Self {
        Self {
            gate_threshold: config.noise_gate_threshold,
            compression_threshold: config.compression_threshold,
            compression_ratio: config.compression_ratio,
        }
    }
}

impl Default for DspParams {
    fn default() -> Self {
        Self::aus_config(&OptimizationConfig::default())
    }
}
