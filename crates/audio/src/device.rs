//! Geraete-Schnittstelle
//!
//! Der Conditioner spricht Audio-Hardware nur ueber `AudioBackend` an.
//! `acquire` oeffnet Ein- und Ausgabe mit den gewuenschten Vorgaben und
//! liefert einen `AudioStream`, der Capture-Samples bereitstellt und
//! Wiedergabe-Samples annimmt.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use voxlane_core::config::OptimizationConfig;

use crate::error::AudioResult;

/// Vorgaben fuer die Geraete-Oeffnung
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConstraints {
    /// Echo-Unterdrueckung der Plattform anfordern
    pub echo_cancellation: bool,
    /// Rauschunterdrueckung der Plattform anfordern
    pub noise_suppression: bool,
    /// Automatische Pegelregelung der Plattform anfordern
    pub auto_gain_control: bool,
    /// Gewuenschte Abtastrate in Hz
    pub sample_rate: u32,
    /// Gewuenschte Kanalanzahl (Sprache: Mono)
    pub channels: u16,
    /// Latenz-Hinweis fuer den Hardware-Puffer
    pub latency_hint: Duration,
    /// Eingabegeraet (Teilstring des Namens, None = Standard)
    pub input_device: Option<String>,
    /// Ausgabegeraet (Teilstring des Namens, None = Standard)
    pub output_device: Option<String>,
}

impl DeviceConstraints {
    /// Leitet die Vorgaben aus der Session-Konfiguration ab
    ///
    /// Der Latenz-Hinweis entspricht der Dauer eines Puffers.
    pub fn aus_config(config: &OptimizationConfig) -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            sample_rate: config.sample_rate,
            channels: 1,
            latency_hint: Duration::from_secs_f64(config.puffer_latenz_ms() / 1000.0),
            input_device: None,
            output_device: None,
        }
    }

    /// Latenz-Hinweis in Frames bei der gewuenschten Abtastrate
    pub fn latenz_frames(&self) -> u32 {
        (self.latency_hint.as_secs_f64() * self.sample_rate as f64).round() as u32
    }
}

/// Tatsaechlich ausgehandeltes Format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiatedFormat {
    pub sample_rate: u32,
    pub channels: u16,
    /// Fester Hardware-Puffer in Frames (None = Plattform-Standard)
    pub buffer_frames: Option<u32>,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    /// Name des Eingabegeraets
    pub input_name: String,
    /// Name des Ausgabegeraets
    pub output_name: String,
}

/// Geoeffnete Geraete (Capture + Wiedergabe)
///
/// Capture-Samples sind Mono mit `format().sample_rate`.
pub trait AudioStream: Send {
    /// Ausgehandeltes Format
    fn format(&self) -> &NegotiatedFormat;

    /// Liest verfuegbare Capture-Samples (nicht blockierend)
    fn read_captured(&mut self, ziel: &mut [f32]) -> usize;

    /// Schreibt Wiedergabe-Samples; gibt die angenommene Anzahl zurueck
    fn write_playback(&mut self, samples: &[f32]) -> usize;

    /// Gesamtzahl der Wiedergabe-Underruns
    fn underruns(&self) -> u64;

    /// Gibt die Geraete frei (idempotent)
    fn release(&mut self);
}

/// Zugriff auf Audio-Hardware
#[async_trait]
pub trait AudioBackend: Send + Sync {
    /// Oeffnet Ein- und Ausgabe
    ///
    /// # Fehler
    /// - `DeviceUnavailable` wenn kein passendes Geraet existiert oder
    ///   der Zugriff verweigert wird
    async fn acquire(&self, constraints: &DeviceConstraints) -> AudioResult<Box<dyn AudioStream>>;
}
