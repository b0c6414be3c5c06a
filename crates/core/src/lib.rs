//! voxlane-core – Gemeinsame Typen, Konfiguration und Fehlertypen
//!
//! Dieses Crate stellt die Bausteine bereit, die Audio-Conditioner,
//! Transport und Telemetrie gemeinsam nutzen: Audio-Frames, die
//! Optimierungs-Konfiguration, den Verbindungszustand und die
//! Metrik-Schnittstelle zwischen den Komponenten.

pub mod config;
pub mod error;
pub mod frame;
pub mod recorder;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use config::OptimizationConfig;
pub use error::{Result, VoxlaneError};
pub use frame::AudioFrame;
pub use recorder::{MetricRecorder, NoopRecorder};
#[cfg(any(test, feature = "test-util"))]
pub use recorder::SammelRecorder;
pub use types::{ConnectionState, MessageId, SessionId};
