//! Verbindungsmetriken
//!
//! Nur der Transport veraendert die Metriken, Aufrufer erhalten Kopien.

use serde::Serialize;
use std::time::Instant;

use crate::latency::LatencyEma;

/// Momentaufnahme der Verbindungsmetriken
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConnectionMetrics {
    /// Geglaettete Latenz (EMA) in Millisekunden
    pub latency_ms: f64,
    pub messages_sent: u64,
    pub messages_received: u64,
    /// Erfolgreiche automatische Wiederverbindungen
    pub reconnects: u64,
    pub errors: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// Verworfene Audio-Frames (Sendekanal voll oder getrennt)
    pub audio_dropped: u64,
    /// Dauer der aktuellen Verbindung in Millisekunden
    pub uptime_ms: u64,
}

/// Veraenderlicher Zustand hinter den Metriken
#[derive(Debug, Default)]
pub(crate) struct MetricsTracker {
    metriken: ConnectionMetrics,
    ema: LatencyEma,
    verbunden_seit: Option<Instant>,
}

impl MetricsTracker {
    pub(crate) fn gesendet(&mut self, bytes: usize) {
        self.metriken.messages_sent += 1;
        self.metriken.bytes_sent += bytes as u64;
    }

    pub(crate) fn empfangen(&mut self, bytes: usize) {
        self.metriken.messages_received += 1;
        self.metriken.bytes_received += bytes as u64;
    }

    /// Nimmt eine Latenz-Messung auf und gibt den geglaetteten Wert zurueck
    pub(crate) fn latenz(&mut self, messung_ms: f64) -> f64 {
        self.metriken.latency_ms = self.ema.aktualisieren(messung_ms);
        self.metriken.latency_ms
    }

    pub(crate) fn fehler(&mut self) {
        self.metriken.errors += 1;
    }

    pub(crate) fn audio_verworfen(&mut self) {
        self.metriken.audio_dropped += 1;
    }

    pub(crate) fn verbunden(&mut self, ist_reconnect: bool) {
        self.verbunden_seit = Some(Instant::now());
        if ist_reconnect {
            self.metriken.reconnects += 1;
        }
    }

    pub(crate) fn getrennt(&mut self) {
        self.verbunden_seit = None;
    }

    pub(crate) fn snapshot(&self) -> ConnectionMetrics {
        let mut m = self.metriken.clone();
        m.uptime_ms = self
            .verbunden_seit
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);
        m
    }
}
