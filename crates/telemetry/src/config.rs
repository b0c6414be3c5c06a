//! Konfiguration des Telemetrie-Aggregators

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{TelemetryError, TelemetryResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Anteil der aufgezeichneten Samples (0.0–1.0), Alerts immer
    pub sampling_rate: f64,
    /// Latenz-Budget fuer die Gesamtlatenz einer Sprachrunde
    pub latency_threshold_ms: f64,
    /// Speicher-Grenze fuer den Alert
    pub memory_threshold_mb: f64,
    /// Intervall der Speicher- und Plattform-Messungen
    pub probe_interval_ms: u64,
    /// Takt des Stall-Detektors
    pub stall_check_interval_ms: u64,
    /// Ab dieser Verspaetung gilt ein Takt als Long Task
    pub stall_threshold_ms: u64,
    /// Ziel fuer periodische Reports (ohne: keine Reports)
    pub report_endpoint: Option<String>,
    pub report_interval_ms: u64,
    pub report_timeout_ms: u64,
    /// Kontext-Tag jedes Samples
    pub page: String,
    pub user_agent: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            sampling_rate: 1.0,
            latency_threshold_ms: 180.0,
            memory_threshold_mb: 512.0,
            probe_interval_ms: 30_000,
            stall_check_interval_ms: 100,
            stall_threshold_ms: 50,
            report_endpoint: None,
            report_interval_ms: 30_000,
            report_timeout_ms: 10_000,
            page: "voice-session".into(),
            user_agent: format!("voxlane/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl TelemetryConfig {
    pub fn pruefen(&self) -> TelemetryResult<()> {
        if !(0.0..=1.0).contains(&self.sampling_rate) {
            return Err(TelemetryError::Konfiguration(format!(
                "sampling_rate {} liegt ausserhalb von [0, 1]",
                self.sampling_rate
            )));
        }
        if self.probe_interval_ms == 0
            || self.report_interval_ms == 0
            || self.stall_check_interval_ms == 0
        {
            return Err(TelemetryError::Konfiguration(
                "Intervalle muessen groesser als 0 sein".into(),
            ));
        }
        Ok(())
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn stall_check_interval(&self) -> Duration {
        Duration::from_millis(self.stall_check_interval_ms)
    }

    pub fn stall_threshold(&self) -> Duration {
        Duration::from_millis(self.stall_threshold_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }

    pub fn report_timeout(&self) -> Duration {
        Duration::from_millis(self.report_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standardwerte() {
        let cfg = TelemetryConfig::default();
        assert_eq!(cfg.latency_threshold_ms, 180.0);
        assert!(cfg.report_endpoint.is_none());
        assert!(cfg.pruefen().is_ok());
    }

    #[test]
    fn sampling_rate_ausserhalb_abgelehnt() {
        let cfg = TelemetryConfig {
            sampling_rate: 1.5,
            ..Default::default()
        };
        assert!(cfg.pruefen().is_err());
    }

    #[test]
    fn teilweise_konfiguration_nutzt_standardwerte() {
        let cfg: TelemetryConfig = serde_json::from_str(r#"{"sampling_rate":0.5}"#).unwrap();
        assert_eq!(cfg.sampling_rate, 0.5);
        assert_eq!(cfg.memory_threshold_mb, 512.0);
    }
}
