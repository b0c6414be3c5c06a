//! Konditionierungs-Pipeline
//!
//! Verbindet DSP-Module in fester Reihenfolge:
//! Noise Gate -> Kompressor (inkl. Begrenzung auf [-1, 1]).
//! Die gleiche Kette laeuft inline und im Worker-Thread, damit beide
//! Pfade identische Ergebnisse liefern.

use crate::dsp::{
    compressor::SoftCompressor, noise_gate::NoiseGate, AudioProcessor, DspParams,
};

/// Audio-Verarbeitungs-Pipeline
///
/// Wendet eine Kette von `AudioProcessor`-Implementierungen
/// sequenziell auf jeden Frame an.
pub struct AudioPipeline {
    processors: Vec<Box<dyn AudioProcessor>>,
}

impl AudioPipeline {
    /// Erstellt eine neue Pipeline mit der gegebenen Prozessor-Kette
    pub fn new(processors: Vec<Box<dyn AudioProcessor>>) -> Self {
        Self { processors }
    }

    /// Verarbeitet einen Frame durch die gesamte Pipeline
    ///
    /// Die Ausgabe hat immer die gleiche Laenge wie die Eingabe.
    pub fn process_frame(&mut self, input: &[f32]) -> Vec<f32> {
        let mut samples = input.to_vec();
        self.process_in_place(&mut samples);
        samples
    }

    /// Verarbeitet Samples direkt im uebergebenen Puffer
    pub fn process_in_place(&mut self, samples: &mut [f32]) {
        for processor in self.processors.iter_mut() {
            processor.process(samples);
        }
    }
}

/// Erstellt die Standard-Konditionierungskette
///
/// Reihenfolge: NoiseGate -> SoftCompressor
pub fn build_conditioning_pipeline(params: &DspParams) -> AudioPipeline {
    AudioPipeline::new(vec![
        Box::new(NoiseGate::new(params.gate_threshold)),
        Box::new(SoftCompressor::new(
            params.compression_threshold,
            params.compression_ratio,
        )),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_leer_passiert_unveraendert() {
        let mut pipeline = AudioPipeline::new(Vec::new());
        let input = vec![0.5f32; 480];
        assert_eq!(pipeline.process_frame(&input), input);
    }

    #[test]
    fn standard_pipeline_gate_vor_kompressor() {
        let mut pipeline = build_conditioning_pipeline(&DspParams::default());
        assert_eq!(pipeline.processors.len(), 2);
        let params = DspParams::default();
        let leise = params.gate_threshold * 0.5;
        let ausgabe = pipeline.process_frame(&[leise, 1.0, -1.0]);
        assert_eq!(ausgabe[0], 0.0);
        assert!(ausgabe[1] <= 1.0 && ausgabe[1] > params.compression_threshold);
        assert_eq!(ausgabe[1], -ausgabe[2]);
    }

    #[test]
    fn ausgabe_hat_eingabelaenge() {
        let mut pipeline = build_conditioning_pipeline(&DspParams::default());
        for len in [0usize, 1, 480, 4096] {
            assert_eq!(pipeline.process_frame(&vec![0.3; len]).len(), len);
        }
    }
}
