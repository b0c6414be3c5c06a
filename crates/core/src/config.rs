//! Optimierungs-Konfiguration einer Sprach-Session
//!
//! Wird beim Session-Start festgelegt. Einzig `buffer_size` darf sich zur
//! Laufzeit aendern (adaptive Puffer-Optimierung im Audio-Conditioner).

use serde::{Deserialize, Serialize};

use crate::error::{Result, VoxlaneError};

/// Kleinste erlaubte Puffergroesse in Samples
pub const MIN_BUFFER_SIZE: usize = 256;
/// Groesste erlaubte Puffergroesse in Samples
pub const MAX_BUFFER_SIZE: usize = 2048;

/// Tuning-Parameter fuer Latenz und Qualitaet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConfig {
    /// Maximale Verarbeitungslatenz in Millisekunden
    pub target_latency_ms: u32,
    /// Puffergroesse in Samples (Zweierpotenz)
    pub buffer_size: usize,
    /// Abtastrate in Hz
    pub sample_rate: u32,
    /// Kompressionsverhaeltnis oberhalb des Schwellenwerts (>= 1.0)
    pub compression_ratio: f32,
    /// Einsatzpunkt des Kompressors (linear, 0.0–1.0)
    pub compression_threshold: f32,
    /// Noise-Gate-Schwellenwert (linear, 0.0–1.0)
    pub noise_gate_threshold: f32,
    /// Grosse Frames in einem Worker-Thread verarbeiten
    pub worker_offload: bool,
    /// Frames mit mehr Samples als diesem Wert gehen an den Worker
    pub offload_cutoff: usize,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            target_latency_ms: 180,
            buffer_size: 512,
            sample_rate: 24000,
            compression_ratio: 4.0,
            compression_threshold: 0.7,
            noise_gate_threshold: 0.01,
            worker_offload: true,
            offload_cutoff: 1024,
        }
    }
}

impl OptimizationConfig {
    /// Prueft die Konfiguration auf gueltige Wertebereiche
    pub fn pruefen(&self) -> Result<()> {
        if self.target_latency_ms == 0 {
            return Err(VoxlaneError::Konfiguration(
                "target_latency_ms muss groesser als 0 sein".into(),
            ));
        }
        if !self.buffer_size.is_power_of_two()
            || !(MIN_BUFFER_SIZE..=MAX_BUFFER_SIZE).contains(&self.buffer_size)
        {
            return Err(VoxlaneError::Konfiguration(format!(
                "buffer_size {} muss eine Zweierpotenz zwischen {} und {} sein",
                self.buffer_size, MIN_BUFFER_SIZE, MAX_BUFFER_SIZE
            )));
        }
        if self.sample_rate == 0 {
            return Err(VoxlaneError::Konfiguration(
                "sample_rate muss groesser als 0 sein".into(),
            ));
        }
        if !(self.compression_ratio >= 1.0) {
            return Err(VoxlaneError::Konfiguration(format!(
                "compression_ratio {} muss >= 1.0 sein",
                self.compression_ratio
            )));
        }
        for (name, wert) in [
            ("compression_threshold", self.compression_threshold),
            ("noise_gate_threshold", self.noise_gate_threshold),
        ] {
            if !(0.0..=1.0).contains(&wert) {
                return Err(VoxlaneError::Konfiguration(format!(
                    "{name} {wert} liegt ausserhalb von [0, 1]"
                )));
            }
        }
        if self.noise_gate_threshold >= self.compression_threshold {
            return Err(VoxlaneError::Konfiguration(
                "noise_gate_threshold muss unter compression_threshold liegen".into(),
            ));
        }
        Ok(())
    }

    /// Puffer-Latenz in Millisekunden bei der aktuellen Puffergroesse
    pub fn puffer_latenz_ms(&self) -> f64 {
        self.buffer_size as f64 * 1000.0 / self.sample_rate.max(1) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = OptimizationConfig::default();
        assert!(cfg.pruefen().is_ok());
        assert_eq!(cfg.target_latency_ms, 180);
        assert!(cfg.buffer_size.is_power_of_two());
    }

    #[test]
    fn keine_zweierpotenz_abgelehnt() {
        let cfg = OptimizationConfig {
            buffer_size: 500,
            ..Default::default()
        };
        assert!(cfg.pruefen().is_err());
    }

    #[test]
    fn puffer_ausserhalb_grenzen_abgelehnt() {
        let cfg = OptimizationConfig {
            buffer_size: 4096,
            ..Default::default()
        };
        assert!(cfg.pruefen().is_err());
    }

    #[test]
    fn ratio_unter_eins_abgelehnt() {
        let cfg = OptimizationConfig {
            compression_ratio: 0.5,
            ..Default::default()
        };
        assert!(cfg.pruefen().is_err());
    }

    #[test]
    fn gate_ueber_kompressor_abgelehnt() {
        let cfg = OptimizationConfig {
            noise_gate_threshold: 0.8,
            compression_threshold: 0.7,
            ..Default::default()
        };
        assert!(cfg.pruefen().is_err());
    }

    #[test]
    fn config_aus_toml_mit_teilwerten() {
        let cfg: OptimizationConfig = toml::from_str("buffer_size = 1024\n").unwrap();
        assert_eq!(cfg.buffer_size, 1024);
        assert_eq!(cfg.target_latency_ms, 180);
    }

    #[test]
    fn puffer_latenz_berechnung() {
        let cfg = OptimizationConfig {
            buffer_size: 480,
            sample_rate: 48000,
            ..Default::default()
        };
        assert!((cfg.puffer_latenz_ms() - 10.0).abs() < 1e-9);
    }
}
