//! voxlane-telemetry – Telemetrie-Aggregator
//!
//! Sammelt Zeit- und Qualitaets-Messwerte von Conditioner, Transport und
//! Umgebung, berechnet eine Bewertung mit Empfehlungen und verschickt
//! optional periodische Reports. Beeinflusst niemals den Datenpfad.
//!
//! - [`aggregator`] – `TelemetryAggregator` (implementiert `MetricRecorder`)
//! - [`buffer`] – begrenzter Sample-Puffer
//! - [`probes`] – Plattform-Messquellen mit No-op-Fallback
//! - [`reporter`] – Report-Batches und HTTP-Versand
//! - [`summary`] – deterministische Bewertung

pub mod aggregator;
pub mod buffer;
pub mod config;
pub mod error;
pub mod probes;
pub mod reporter;
pub mod sample;
pub mod summary;

pub use aggregator::{TelemetryAggregator, TelemetryExport};
pub use buffer::{SampleBuffer, MAX_SAMPLES, TRIM_AUF};
pub use config::TelemetryConfig;
pub use error::{TelemetryError, TelemetryResult};
pub use probes::{BatteryProbe, MemoryProbe, Messung, NetworkProbe, NoopProbe, Probe};
pub use reporter::{HttpReportSink, ReportBatch, ReportSink, SystemMetrics};
pub use sample::{PerformanceSample, VoiceMetrics, WebVital, WebVitals};
pub use summary::PerformanceSummary;
