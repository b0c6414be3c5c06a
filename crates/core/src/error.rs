//! Fehlertypen fuer Voxlane
//!
//! Zentraler Fehler-Enum auf Session-Ebene. Die Komponenten-Crates
//! definieren eigene Fehler (`AudioError`, `TransportError`, ...) und
//! konvertieren via `From` in diesen Typ.

use thiserror::Error;

/// Globaler Result-Alias fuer Voxlane
pub type Result<T> = std::result::Result<T, VoxlaneError>;

/// Alle Fehler die an der Session-Grenze sichtbar werden
#[derive(Debug, Error)]
pub enum VoxlaneError {
    // --- Audio-Geraete ---
    #[error("Audiogeraet nicht verfuegbar: {0}")]
    DeviceUnavailable(String),

    #[error("Geraete-Initialisierung hat das Zeitlimit ueberschritten: {0}")]
    InitializationTimeout(String),

    #[error("Audiofehler: {0}")]
    Audio(String),

    // --- Transport ---
    #[error("Verbindungsaufbau hat das Zeitlimit ueberschritten: {0}")]
    ConnectionTimeout(String),

    #[error("Verbindung fehlgeschlagen: {0}")]
    Connection(String),

    #[error("Nicht verbunden")]
    NotConnected,

    #[error("Keine Antwort innerhalb des Zeitlimits: {0}")]
    MessageTimeout(String),

    #[error("Maximale Anzahl an Wiederverbindungsversuchen erreicht ({0})")]
    MaxReconnectAttemptsReached(u32),

    #[error("Verbindung geschlossen")]
    ConnectionClosed,

    #[error("Ungueltige Nachricht: {0}")]
    UngueltigeNachricht(String),

    // --- Telemetrie ---
    #[error("Telemetriefehler: {0}")]
    Telemetrie(String),

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    // --- Intern ---
    #[error("Interner Fehler: {0}")]
    Intern(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl VoxlaneError {
    /// Erstellt einen internen Fehler aus einer beliebigen Nachricht
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Gibt true zurueck wenn der Fehler wiederholbar sein koennte
    ///
    /// `MaxReconnectAttemptsReached` ist terminal: erst nach einem
    /// expliziten Reset durch den Aufrufer wird erneut verbunden.
    pub fn ist_wiederholbar(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout(_)
                | Self::Connection(_)
                | Self::NotConnected
                | Self::MessageTimeout(_)
        )
    }

    /// Gibt true zurueck wenn der Fehler den Session-Start verhindert
    pub fn ist_fatal(&self) -> bool {
        matches!(
            self,
            Self::DeviceUnavailable(_)
                | Self::InitializationTimeout(_)
                | Self::MaxReconnectAttemptsReached(_)
                | Self::Konfiguration(_)
        )
    }
}
