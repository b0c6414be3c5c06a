//! Deterministische Bewertung
//!
//! Start bei 100, feste Abzuege pro verletzter Schwelle, Untergrenze 0.
//! Jede verletzte Schwelle erzeugt genau eine Empfehlung.

use serde::Serialize;
use voxlane_core::types::SessionId;

use crate::config::TelemetryConfig;
use crate::sample::{VoiceMetrics, WebVitals};

pub const ABZUG_SPRACH_LATENZ: u32 = 20;
pub const ABZUG_SPEICHER: u32 = 15;
pub const ABZUG_PAINT: u32 = 15;
pub const ABZUG_EINGABE: u32 = 10;
pub const ABZUG_LAYOUT: u32 = 10;
pub const ABZUG_TRANSPORT: u32 = 10;
pub const ABZUG_QUALITAET: u32 = 10;
pub const ABZUG_FEHLERRATE: u32 = 10;

pub const LCP_BUDGET_MS: f64 = 2500.0;
pub const FCP_BUDGET_MS: f64 = 1800.0;
pub const FID_BUDGET_MS: f64 = 100.0;
pub const CLS_BUDGET: f64 = 0.1;
pub const TRANSPORT_BUDGET_MS: f64 = 100.0;
pub const QUALITAET_MINIMUM: f64 = 0.6;
pub const FEHLERRATE_MAXIMUM: f64 = 0.05;

/// Zuletzt beobachtete Kennzahlen
#[derive(Debug, Clone, Default)]
pub struct Kennzahlen {
    pub voice: VoiceMetrics,
    pub web_vitals: WebVitals,
    pub speicher_mb: Option<f64>,
    /// Geglaettete Transport-Latenz
    pub transport_latenz_ms: Option<f64>,
    qualitaet_summe: f64,
    qualitaet_anzahl: u64,
    pub long_tasks: u64,
    pub alerts: u64,
}

impl Kennzahlen {
    pub fn qualitaet_melden(&mut self, wert: f64) {
        if wert.is_finite() {
            self.qualitaet_summe += wert;
            self.qualitaet_anzahl += 1;
        }
    }

    /// Audio-Qualitaet: Wert des Endpunkts, sonst Mittel der lokalen Messungen
    pub fn audio_qualitaet(&self) -> Option<f64> {
        self.voice.audio_quality.or_else(|| {
            (self.qualitaet_anzahl > 0)
                .then(|| self.qualitaet_summe / self.qualitaet_anzahl as f64)
        })
    }
}

/// Ergebnis der Bewertung
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSummary {
    pub session_id: SessionId,
    /// 0–100
    pub score: u32,
    pub recommendations: Vec<String>,
    pub sample_count: usize,
    pub alerts: u64,
    pub long_tasks: u64,
    pub voice_metrics: VoiceMetrics,
    pub web_vitals: WebVitals,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport_latency_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_quality: Option<f64>,
}

/// Berechnet Score und Empfehlungen
pub fn bewerten(k: &Kennzahlen, config: &TelemetryConfig) -> (u32, Vec<String>) {
    let mut abzug = 0u32;
    let mut empfehlungen = Vec::new();
    let mut verletzt = |punkte: u32, text: String| {
        abzug += punkte;
        empfehlungen.push(text);
    };

    if let Some(latenz) = k.voice.total_latency.filter(|l| *l > config.latency_threshold_ms) {
        verletzt(
            ABZUG_SPRACH_LATENZ,
            format!(
                "Sprach-Latenz {latenz:.0} ms ueber dem Budget von {:.0} ms: Puffergroesse verkleinern oder Worker-Offload aktivieren",
                config.latency_threshold_ms
            ),
        );
    }

    if let Some(mb) = k.speicher_mb.filter(|mb| *mb > config.memory_threshold_mb) {
        verletzt(
            ABZUG_SPEICHER,
            format!(
                "Speicherverbrauch {mb:.0} MB ueber {:.0} MB: Audio-Puffer und Verlauf begrenzen",
                config.memory_threshold_mb
            ),
        );
    }

    let lcp_langsam = k.web_vitals.lcp.is_some_and(|v| v > LCP_BUDGET_MS);
    let fcp_langsam = k.web_vitals.fcp.is_some_and(|v| v > FCP_BUDGET_MS);
    if lcp_langsam || fcp_langsam {
        verletzt(
            ABZUG_PAINT,
            "Langsamer Seitenaufbau: Audio-Initialisierung erst nach dem ersten Rendern starten".into(),
        );
    }

    if let Some(fid) = k.web_vitals.fid.filter(|v| *v > FID_BUDGET_MS) {
        verletzt(
            ABZUG_EINGABE,
            format!("Eingabeverzoegerung {fid:.0} ms: lange Aufgaben im Hauptthread aufteilen"),
        );
    }

    if let Some(cls) = k.web_vitals.cls.filter(|v| *v > CLS_BUDGET) {
        verletzt(
            ABZUG_LAYOUT,
            format!("Layout-Verschiebung {cls:.2}: Platz fuer dynamische Elemente reservieren"),
        );
    }

    if let Some(latenz) = k.transport_latenz_ms.filter(|l| *l > TRANSPORT_BUDGET_MS) {
        verletzt(
            ABZUG_TRANSPORT,
            format!(
                "Transport-Latenz {latenz:.0} ms ueber {TRANSPORT_BUDGET_MS:.0} ms: naeheren Endpunkt waehlen oder Netzwerk pruefen"
            ),
        );
    }

    if let Some(q) = k.audio_qualitaet().filter(|q| *q < QUALITAET_MINIMUM) {
        verletzt(
            ABZUG_QUALITAET,
            format!("Audio-Qualitaet {q:.2} niedrig: Mikrofonpegel pruefen, Noise-Gate-Schwelle senken"),
        );
    }

    if let Some(rate) = k.voice.error_rate.filter(|r| *r > FEHLERRATE_MAXIMUM) {
        verletzt(
            ABZUG_FEHLERRATE,
            format!(
                "Fehlerrate {:.1} % ueber {:.0} %: Verbindungsstabilitaet pruefen",
                rate * 100.0,
                FEHLERRATE_MAXIMUM * 100.0
            ),
        );
    }

    (100u32.saturating_sub(abzug), empfehlungen)
}
