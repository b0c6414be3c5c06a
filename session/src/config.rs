//! Session-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! Standardwerte, sodass der Client ohne Konfigurationsdatei lauffaehig
//! ist.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use voxlane_core::config::OptimizationConfig;
use voxlane_core::VoxlaneError;
use voxlane_telemetry::TelemetryConfig;
use voxlane_transport::TransportConfig;

use crate::error::SessionResult;

/// Vollstaendige Session-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Audio-Optimierung (Puffer, Gate, Kompressor, Worker)
    pub audio: OptimizationConfig,
    /// Transport (Zeitlimits, Reconnect, Queue)
    pub transport: TransportConfig,
    /// Telemetrie (Schwellenwerte, Sampling, Reports)
    pub telemetry: TelemetryConfig,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Sprach-Endpunkt und Takte der Session
    pub endpunkt: EndpunktEinstellungen,
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Sprach-Endpunkt
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpunktEinstellungen {
    /// WebSocket-URL (ws:// oder wss://)
    pub url: String,
    /// Takt der adaptiven Puffer-Optimierung
    pub tuning_interval_ms: u64,
    /// Takt mit dem der CLI-Client Capture-Frames abholt
    pub capture_interval_ms: u64,
}

impl Default for EndpunktEinstellungen {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8765/voice".into(),
            tuning_interval_ms: 5_000,
            capture_interval_ms: 10,
        }
    }
}

impl EndpunktEinstellungen {
    pub fn tuning_interval(&self) -> Duration {
        Duration::from_millis(self.tuning_interval_ms.max(1))
    }

    pub fn capture_interval(&self) -> Duration {
        Duration::from_millis(self.capture_interval_ms.max(1))
    }
}

impl SessionConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Falls die Datei nicht existiert, werden Standardwerte verwendet.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Prueft alle Abschnitte auf gueltige Werte
    pub fn pruefen(&self) -> SessionResult<()> {
        self.audio.pruefen()?;
        self.transport.pruefen()?;
        self.telemetry.pruefen()?;

        let url = self.endpunkt.url.as_str();
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(VoxlaneError::Konfiguration(format!(
                "Endpunkt '{url}' ist keine ws:// oder wss:// URL"
            ))
            .into());
        }
        Ok(())
    }
}
