//! Fehlertypen fuer den Transport-Optimizer

use std::time::Duration;
use thiserror::Error;
use voxlane_core::types::MessageId;
use voxlane_core::VoxlaneError;

/// Fehlertyp fuer den Transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// Verbindungsaufbau dauerte zu lange
    #[error("Verbindungsaufbau nach {0:?} abgebrochen")]
    ConnectionTimeout(Duration),

    /// Handshake oder Transport fehlgeschlagen
    #[error("Verbindungsfehler: {0}")]
    ConnectionError(String),

    /// Keine offene Verbindung (Nachricht ggf. in der Queue)
    #[error("Nicht verbunden")]
    NotConnected,

    /// Keine korrelierte Antwort innerhalb des Zeitlimits
    #[error("Keine Antwort auf {0}")]
    MessageTimeout(MessageId),

    /// Reconnect-Budget aufgebraucht
    #[error("Maximale Anzahl an Wiederverbindungsversuchen erreicht ({0})")]
    MaxReconnectAttemptsReached(u32),

    /// Verbindung wurde geschlossen waehrend auf eine Antwort gewartet wurde
    #[error("Verbindung geschlossen")]
    ConnectionClosed,

    /// Gegenstelle hat mit einer Fehlermeldung geantwortet
    #[error("Fehler der Gegenstelle: {0}")]
    RemoteFehler(String),

    /// Kodierungs- oder Protokollfehler
    #[error("Protokollfehler: {0}")]
    Protokoll(String),

    /// Ungueltige Transport-Konfiguration
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),
}

pub type TransportResult<T> = Result<T, TransportError>;

impl From<TransportError> for VoxlaneError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::ConnectionTimeout(d) => VoxlaneError::ConnectionTimeout(format!("{:?}", d)),
            TransportError::ConnectionError(m) => VoxlaneError::Connection(m),
            TransportError::NotConnected => VoxlaneError::NotConnected,
            TransportError::MessageTimeout(id) => VoxlaneError::MessageTimeout(id.to_string()),
            TransportError::MaxReconnectAttemptsReached(n) => {
                VoxlaneError::MaxReconnectAttemptsReached(n)
            }
            TransportError::ConnectionClosed => VoxlaneError::ConnectionClosed,
            TransportError::RemoteFehler(m) => VoxlaneError::Connection(format!("Gegenstelle: {m}")),
            TransportError::Protokoll(m) => VoxlaneError::UngueltigeNachricht(m),
            TransportError::Konfiguration(m) => VoxlaneError::Konfiguration(m),
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        TransportError::Protokoll(e.to_string())
    }
}
