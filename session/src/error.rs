//! Fehlertypen der Session

use thiserror::Error;
use voxlane_audio::AudioError;
use voxlane_core::VoxlaneError;
use voxlane_telemetry::TelemetryError;
use voxlane_transport::TransportError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Audio: {0}")]
    Audio(#[from] AudioError),

    #[error("Transport: {0}")]
    Transport(#[from] TransportError),

    #[error("Telemetrie: {0}")]
    Telemetrie(#[from] TelemetryError),

    #[error("Ungueltige Konfiguration: {0}")]
    Konfiguration(#[from] VoxlaneError),

    #[error("Session wurde bereits beendet")]
    Beendet,
}

pub type SessionResult<T> = Result<T, SessionError>;

impl SessionError {
    /// Fehler die die Session nicht ueberlebt
    pub fn ist_fatal(&self) -> bool {
        match self {
            Self::Audio(AudioError::DeviceUnavailable(_))
            | Self::Audio(AudioError::InitializationTimeout(_))
            | Self::Transport(TransportError::MaxReconnectAttemptsReached(_))
            | Self::Transport(TransportError::Konfiguration(_))
            | Self::Konfiguration(_)
            | Self::Beendet => true,
            _ => false,
        }
    }
}

impl From<SessionError> for VoxlaneError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Audio(e) => e.into(),
            SessionError::Transport(e) => e.into(),
            SessionError::Telemetrie(e) => e.into(),
            SessionError::Konfiguration(e) => e,
            SessionError::Beendet => VoxlaneError::ConnectionClosed,
        }
    }
}
