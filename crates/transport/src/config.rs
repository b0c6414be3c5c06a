//! Konfiguration des Transport-Optimizers

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::connector::OUTBOUND_KAPAZITAET;
use crate::error::{TransportError, TransportResult};

/// Obergrenze fuer Wiederholungen einer High-Nachricht
pub const MAX_QUEUE_RETRIES: u32 = 3;

/// Zeitlimits, Reconnect- und Queue-Parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Zeitlimit fuer den Verbindungsaufbau
    pub connect_timeout_ms: u64,
    /// Zeitlimit fuer korrelierte Antworten
    pub message_timeout_ms: u64,
    /// Keep-Alive-Intervall
    pub heartbeat_interval_ms: u64,
    /// Maximale Reconnect-Versuche nach abnormaler Trennung
    pub max_reconnect_attempts: u32,
    /// Basisverzoegerung des exponentiellen Backoffs
    pub reconnect_base_delay_ms: u64,
    /// Maximale Wiederholungen fuer High-Nachrichten beim Flush
    pub max_queue_retries: u32,
    /// Maximale Anzahl wartender Nachrichten
    pub queue_capacity: usize,
    /// Angebotenes Sub-Protokoll
    pub subprotocol: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            message_timeout_ms: 10_000,
            heartbeat_interval_ms: 30_000,
            max_reconnect_attempts: 5,
            reconnect_base_delay_ms: 1_000,
            max_queue_retries: 3,
            queue_capacity: 1_000,
            subprotocol: "voxlane.v1".into(),
        }
    }
}

impl TransportConfig {
    /// Prueft Zeitlimits, Retry-Grenze und Queue-Kapazitaet
    ///
    /// Die Queue darf nicht groesser sein als der Sendekanal, damit ein
    /// Flush nach dem Verbinden in einem Zug passt.
    pub fn pruefen(&self) -> TransportResult<()> {
        for (name, wert) in [
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("message_timeout_ms", self.message_timeout_ms),
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
            ("reconnect_base_delay_ms", self.reconnect_base_delay_ms),
        ] {
            if wert == 0 {
                return Err(TransportError::Konfiguration(format!(
                    "transport.{name} muss groesser als 0 sein"
                )));
            }
        }
        if self.max_queue_retries > MAX_QUEUE_RETRIES {
            return Err(TransportError::Konfiguration(format!(
                "transport.max_queue_retries {} ueberschreitet {MAX_QUEUE_RETRIES}",
                self.max_queue_retries
            )));
        }
        if !(1..=OUTBOUND_KAPAZITAET).contains(&self.queue_capacity) {
            return Err(TransportError::Konfiguration(format!(
                "transport.queue_capacity {} liegt ausserhalb von 1..={OUTBOUND_KAPAZITAET}",
                self.queue_capacity
            )));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn message_timeout(&self) -> Duration {
        Duration::from_millis(self.message_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms.max(1))
    }

    pub fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standardwerte() {
        let cfg = TransportConfig::default();
        assert_eq!(cfg.connect_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.message_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(cfg.max_reconnect_attempts, 5);
        assert_eq!(cfg.max_queue_retries, 3);
    }

    #[test]
    fn standardwerte_sind_gueltig() {
        assert!(TransportConfig::default().pruefen().is_ok());
    }

    #[test]
    fn zu_viele_wiederholungen_werden_abgelehnt() {
        let cfg = TransportConfig {
            max_queue_retries: 50,
            ..Default::default()
        };
        let fehler = cfg.pruefen().unwrap_err();
        assert!(matches!(fehler, TransportError::Konfiguration(ref m) if m.contains("max_queue_retries")));
    }

    #[test]
    fn zeitlimit_null_wird_abgelehnt() {
        let cfg = TransportConfig {
            message_timeout_ms: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.pruefen(), Err(TransportError::Konfiguration(m)) if m.contains("message_timeout_ms")));

        let cfg = TransportConfig {
            connect_timeout_ms: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.pruefen(), Err(TransportError::Konfiguration(m)) if m.contains("connect_timeout_ms")));
    }

    #[test]
    fn queue_kapazitaet_muss_in_sendekanal_passen() {
        let mut cfg = TransportConfig {
            queue_capacity: 0,
            ..Default::default()
        };
        assert!(cfg.pruefen().is_err());
        cfg.queue_capacity = OUTBOUND_KAPAZITAET;
        assert!(cfg.pruefen().is_ok());
        cfg.queue_capacity = OUTBOUND_KAPAZITAET + 1;
        assert!(cfg.pruefen().is_err());
    }

    #[test]
    fn teilweise_aus_json() {
        let cfg: TransportConfig =
            serde_json::from_str(r#"{"max_reconnect_attempts": 2}"#).unwrap();
        assert_eq!(cfg.max_reconnect_attempts, 2);
        assert_eq!(cfg.subprotocol, "voxlane.v1");
    }
}
