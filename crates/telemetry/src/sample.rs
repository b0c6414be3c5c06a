//! Messwert-Typen der Telemetrie
//!
//! Feldnamen werden fuer Reports in camelCase serialisiert.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use voxlane_core::types::SessionId;

// ---------------------------------------------------------------------------
// PerformanceSample
// ---------------------------------------------------------------------------

/// Ein einzelner Messwert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSample {
    pub metric: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    /// Kontext-Tag (Seite, Ansicht, Komponente)
    pub page: String,
    pub session_id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl PerformanceSample {
    pub fn neu(
        metric: impl Into<String>,
        value: f64,
        page: impl Into<String>,
        session_id: SessionId,
        metadata: Option<Value>,
    ) -> Self {
        Self {
            metric: metric.into(),
            value,
            timestamp: Utc::now(),
            page: page.into(),
            session_id,
            metadata,
        }
    }

    /// Gibt true zurueck wenn das Sample als Alert markiert ist
    pub fn ist_alert(&self) -> bool {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("alert"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// VoiceMetrics
// ---------------------------------------------------------------------------

/// Zeitmessungen einer Sprachrunde in Millisekunden
///
/// `error_rate` ist ein Anteil (0.05 = 5 %), `audio_quality` liegt in [0, 1].
/// Fehlende Felder werden nicht bewertet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VoiceMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_to_text: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_to_speech: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_latency: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_quality: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_rate: Option<f64>,
}

impl VoiceMetrics {
    /// Alle gesetzten Felder als (Metrikname, Wert)
    pub fn felder(&self) -> Vec<(&'static str, f64)> {
        [
            ("voice.speech_to_text_ms", self.speech_to_text),
            ("voice.text_to_speech_ms", self.text_to_speech),
            ("voice.processing_ms", self.processing),
            ("voice.total_latency_ms", self.total_latency),
            ("voice.audio_quality", self.audio_quality),
            ("voice.error_rate", self.error_rate),
        ]
        .into_iter()
        .filter_map(|(name, wert)| wert.map(|w| (name, w)))
        .collect()
    }

    /// Uebernimmt alle gesetzten Felder von `neu`
    pub fn zusammenfuehren(&mut self, neu: &VoiceMetrics) {
        fn setzen(ziel: &mut Option<f64>, quelle: Option<f64>) {
            if quelle.is_some() {
                *ziel = quelle;
            }
        }
        setzen(&mut self.speech_to_text, neu.speech_to_text);
        setzen(&mut self.text_to_speech, neu.text_to_speech);
        setzen(&mut self.processing, neu.processing);
        setzen(&mut self.total_latency, neu.total_latency);
        setzen(&mut self.audio_quality, neu.audio_quality);
        setzen(&mut self.error_rate, neu.error_rate);
    }
}

// ---------------------------------------------------------------------------
// Web-Vitals
// ---------------------------------------------------------------------------

/// Vom Host gemeldete Seiten- und Eingabe-Kennzahlen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WebVital {
    /// Largest Contentful Paint (ms)
    Lcp,
    /// First Contentful Paint (ms)
    Fcp,
    /// First Input Delay (ms)
    Fid,
    /// Cumulative Layout Shift (einheitenlos)
    Cls,
    /// Time to First Byte (ms)
    Ttfb,
}

impl WebVital {
    pub fn metrik_name(self) -> &'static str {
        match self {
            Self::Lcp => "web_vital.lcp",
            Self::Fcp => "web_vital.fcp",
            Self::Fid => "web_vital.fid",
            Self::Cls => "web_vital.cls",
            Self::Ttfb => "web_vital.ttfb",
        }
    }
}

/// Letzte Werte aller Web-Vitals
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebVitals {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lcp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fcp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fid: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cls: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttfb: Option<f64>,
}

impl WebVitals {
    pub fn setzen(&mut self, vital: WebVital, wert: f64) {
        let feld = match vital {
            WebVital::Lcp => &mut self.lcp,
            WebVital::Fcp => &mut self.fcp,
            WebVital::Fid => &mut self.fid,
            WebVital::Cls => &mut self.cls,
            WebVital::Ttfb => &mut self.ttfb,
        };
        *feld = Some(wert);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sample_camel_case() {
        let s = PerformanceSample::neu("audio.quality", 0.8, "test", SessionId::new(), None);
        let v = serde_json::to_value(&s).unwrap();
        assert!(v.get("sessionId").is_some());
        assert!(v.get("metadata").is_none());
    }

    #[test]
    fn alert_markierung() {
        let normal = PerformanceSample::neu("x", 1.0, "p", SessionId::new(), None);
        let alert = PerformanceSample::neu("x", 1.0, "p", SessionId::new(), Some(json!({ "alert": true })));
        assert!(!normal.ist_alert());
        assert!(alert.ist_alert());
    }

    #[test]
    fn voice_metrics_aus_remote_json() {
        let vm: VoiceMetrics =
            serde_json::from_value(json!({ "speechToText": 80.0, "totalLatency": 210.0 })).unwrap();
        assert_eq!(vm.total_latency, Some(210.0));
        assert_eq!(vm.audio_quality, None);
        assert_eq!(vm.felder().len(), 2);
    }

    #[test]
    fn zusammenfuehren_behaelt_alte_werte() {
        let mut alt = VoiceMetrics {
            audio_quality: Some(0.9),
            total_latency: Some(100.0),
            ..Default::default()
        };
        alt.zusammenfuehren(&VoiceMetrics {
            total_latency: Some(150.0),
            ..Default::default()
        });
        assert_eq!(alt.total_latency, Some(150.0));
        assert_eq!(alt.audio_quality, Some(0.9));
    }

    #[test]
    fn web_vitals_setzen() {
        let mut w = WebVitals::default();
        w.setzen(WebVital::Cls, 0.2);
        assert_eq!(w.cls, Some(0.2));
        assert_eq!(WebVital::Lcp.metrik_name(), "web_vital.lcp");
    }
}
