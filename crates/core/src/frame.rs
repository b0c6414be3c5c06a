//! Audio-Frame – der Datentyp der durch die gesamte Pipeline wandert
//!
//! Ein Frame gehoert immer genau einer Stufe. Stufen nehmen Frames per
//! Wert entgegen und geben neue Frames zurueck, es gibt kein geteiltes
//! veraenderliches Aliasing.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Block normalisierter Samples (Bereich [-1, 1])
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFrame {
    /// Interleaved Samples
    pub samples: Vec<f32>,
    /// Abtastrate in Hz
    pub sample_rate: u32,
    /// Kanalanzahl (1 = Mono)
    pub channels: u16,
}

impl AudioFrame {
    /// Erstellt einen neuen Frame
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels: channels.max(1),
        }
    }

    /// Erstellt einen Mono-Frame
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::new(samples, sample_rate, 1)
    }

    /// Erstellt einen stillen Mono-Frame der gegebenen Laenge
    pub fn stille(len: usize, sample_rate: u32) -> Self {
        Self::mono(vec![0.0; len], sample_rate)
    }

    /// Anzahl der Samples (ueber alle Kanaele)
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Gibt zurueck ob der Frame leer ist
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Abspieldauer des Frames
    pub fn dauer(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let pro_kanal = self.samples.len() / self.channels as usize;
        Duration::from_secs_f64(pro_kanal as f64 / self.sample_rate as f64)
    }

    /// Ersetzt die Samples, Abtastrate und Kanaele bleiben erhalten
    pub fn mit_samples(self, samples: Vec<f32>) -> Self {
        Self { samples, ..self }
    }
}
