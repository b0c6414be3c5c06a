//! Metrik-Schnittstelle zwischen den Komponenten
//!
//! Conditioner und Transport kennen die Telemetrie nicht direkt, sondern
//! melden Messwerte ueber `MetricRecorder`. Die Telemetrie implementiert
//! das Trait; ohne Telemetrie wird `NoopRecorder` verwendet.

#[cfg(any(test, feature = "test-util"))]
use parking_lot::Mutex;
use serde_json::Value;

/// Senke fuer Zeit- und Qualitaets-Messwerte
///
/// Implementierungen duerfen niemals blockieren oder den Datenpfad
/// beeinflussen.
pub trait MetricRecorder: Send + Sync + 'static {
    /// Meldet einen Messwert mit optionalen strukturierten Metadaten
    fn record(&self, metric: &str, value: f64, metadata: Option<Value>);
}

/// Recorder der alle Messwerte verwirft
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRecorder;

impl MetricRecorder for NoopRecorder {
    fn record(&self, _metric: &str, _value: f64, _metadata: Option<Value>) {}
}

/// Recorder der alle Messwerte im Speicher sammelt
///
/// Nur in Tests und mit dem Feature `test-util` verfuegbar.
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Default)]
pub struct SammelRecorder {
    eintraege: Mutex<Vec<(String, f64, Option<Value>)>>,
}

#[cfg(any(test, feature = "test-util"))]
impl SammelRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gibt alle bisher gemeldeten Messwerte zurueck
    pub fn eintraege(&self) -> Vec<(String, f64, Option<Value>)> {
        self.eintraege.lock().clone()
    }

    /// Gibt alle Werte einer bestimmten Metrik zurueck
    pub fn werte(&self, metric: &str) -> Vec<f64> {
        self.eintraege
            .lock()
            .iter()
            .filter(|(name, _, _)| name == metric)
            .map(|(_, wert, _)| *wert)
            .collect()
    }
}

#[cfg(any(test, feature = "test-util"))]
impl MetricRecorder for SammelRecorder {
    fn record(&self, metric: &str, value: f64, metadata: Option<Value>) {
        self.eintraege.lock().push((metric.to_string(), value, metadata));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn noop_recorder_ist_trait_objekt() {
        let recorder: Arc<dyn MetricRecorder> = Arc::new(NoopRecorder);
        recorder.record("audio.processing_ms", 1.0, None);
    }

    #[test]
    fn sammel_recorder_filtert_nach_metrik() {
        let recorder = SammelRecorder::new();
        recorder.record("a", 1.0, None);
        recorder.record("b", 2.0, None);
        recorder.record("a", 3.0, Some(serde_json::json!({ "x": 1 })));
        assert_eq!(recorder.werte("a"), vec![1.0, 3.0]);
        assert_eq!(recorder.eintraege().len(), 3);
    }
}
