//! voxlane-session – Sprach-Session als Kompositionswurzel
//!
//! Eine `VoiceSession` besitzt pro Gespraech einen Audio-Conditioner,
//! einen Transport-Optimizer und einen Telemetrie-Aggregator. Mehrere
//! Sessions koennen nebeneinander laufen, es gibt keinen globalen Zustand.

pub mod config;
pub mod error;
pub mod session;

pub use config::{EndpunktEinstellungen, LoggingEinstellungen, SessionConfig};
pub use error::{SessionError, SessionResult};
pub use session::{SessionEvent, SessionMetrics, VoiceSession};
