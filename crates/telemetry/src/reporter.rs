//! Periodische Reports
//!
//! Ein Batch enthaelt alle seit dem letzten Versand gesammelten Samples
//! plus die aktuellen Kennzahlen. Schlaegt der Versand fehl, legt der
//! Aggregator die Samples zurueck in den Puffer (mindestens einmal
//! zugestellt, Duplikate sind erlaubt).

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use voxlane_core::types::SessionId;

use crate::error::{TelemetryError, TelemetryResult};
use crate::sample::{PerformanceSample, VoiceMetrics, WebVitals};

/// System-Kennzahlen im Report
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<f64>,
    pub long_tasks: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport_latency_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_quality: Option<f64>,
}

/// Ein Report-Batch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportBatch {
    pub session_id: SessionId,
    /// Unix-Millisekunden
    pub timestamp: i64,
    pub page: String,
    pub user_agent: String,
    pub web_vitals: WebVitals,
    pub voice_metrics: VoiceMetrics,
    pub system_metrics: SystemMetrics,
    pub entries: Vec<PerformanceSample>,
}

/// Ziel fuer Report-Batches
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn senden(&self, batch: &ReportBatch) -> TelemetryResult<()>;
}

/// Versendet Batches per HTTP POST als JSON
pub struct HttpReportSink {
    client: Client,
    url: String,
}

impl HttpReportSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> TelemetryResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ReportSink for HttpReportSink {
    async fn senden(&self, batch: &ReportBatch) -> TelemetryResult<()> {
        let antwort = self
            .client
            .post(&self.url)
            .header("User-Agent", batch.user_agent.as_str())
            .json(batch)
            .send()
            .await?;

        let status = antwort.status();
        if !status.is_success() {
            return Err(TelemetryError::ReportAbgelehnt(format!("HTTP {}", status.as_u16())));
        }
        debug!(url = %self.url, eintraege = batch.entries.len(), "Report zugestellt");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::PerformanceSample;

    fn batch() -> ReportBatch {
        let session_id = SessionId::new();
        ReportBatch {
            session_id,
            timestamp: 1_700_000_000_000,
            page: "voice-session".into(),
            user_agent: "voxlane/test".into(),
            web_vitals: WebVitals::default(),
            voice_metrics: VoiceMetrics {
                total_latency: Some(150.0),
                ..Default::default()
            },
            system_metrics: SystemMetrics::default(),
            entries: vec![PerformanceSample::neu("audio.quality", 0.7, "voice-session", session_id, None)],
        }
    }

    #[test]
    fn batch_felder_camel_case() {
        let v = serde_json::to_value(batch()).unwrap();
        for feld in [
            "sessionId",
            "timestamp",
            "page",
            "userAgent",
            "webVitals",
            "voiceMetrics",
            "systemMetrics",
            "entries",
        ] {
            assert!(v.get(feld).is_some(), "Feld {feld} fehlt");
        }
        assert_eq!(v["voiceMetrics"]["totalLatency"], 150.0);
        assert_eq!(v["entries"][0]["metric"], "audio.quality");
    }

    #[tokio::test]
    async fn unerreichbarer_endpunkt_liefert_fehler() {
        let sink = HttpReportSink::new("http://127.0.0.1:9/report", Duration::from_secs(2)).unwrap();
        assert!(sink.senden(&batch()).await.is_err());
    }
}
