//! Fehlertypen der Telemetrie
//!
//! Keiner dieser Fehler erreicht den Datenpfad. Sie werden protokolliert
//! oder an den Aufrufer von `flush()` zurueckgegeben.

use thiserror::Error;
use voxlane_core::VoxlaneError;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("HTTP-Fehler beim Report-Versand: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Report abgelehnt: {0}")]
    ReportAbgelehnt(String),

    #[error("Serialisierungsfehler: {0}")]
    Serialisierung(#[from] serde_json::Error),

    #[error("Messquelle '{0}' nicht unterstuetzt")]
    NichtUnterstuetzt(&'static str),

    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),
}

pub type TelemetryResult<T> = Result<T, TelemetryError>;

impl From<TelemetryError> for VoxlaneError {
    fn from(e: TelemetryError) -> Self {
        match e {
            TelemetryError::Konfiguration(grund) => VoxlaneError::Konfiguration(grund),
            andere => VoxlaneError::Telemetrie(andere.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telemetriefehler_ist_nicht_fatal() {
        let e: VoxlaneError = TelemetryError::ReportAbgelehnt("HTTP 503".into()).into();
        assert!(matches!(e, VoxlaneError::Telemetrie(_)));
        assert!(!e.ist_fatal());
    }
}
