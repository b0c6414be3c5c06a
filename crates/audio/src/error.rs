//! Fehlertypen fuer den Audio-Conditioner

use std::time::Duration;
use thiserror::Error;
use voxlane_core::VoxlaneError;

/// Alle moeglichen Fehler des Audio-Conditioners
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Audiogeraet nicht verfuegbar: {0}")]
    DeviceUnavailable(String),

    #[error("Geraete-Initialisierung nach {0:?} abgebrochen")]
    InitializationTimeout(Duration),

    #[error("Stream-Fehler: {0}")]
    StreamFehler(String),

    #[error("Worker-Fehler: {0}")]
    WorkerFehler(String),

    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    #[error("Conditioner wurde bereits freigegeben")]
    Freigegeben,

    #[error("Unerwarteter Fehler: {0}")]
    Anyhow(#[from] anyhow::Error),
}

pub type AudioResult<T> = Result<T, AudioError>;

impl From<AudioError> for VoxlaneError {
    fn from(e: AudioError) -> Self {
        match e {
            AudioError::DeviceUnavailable(grund) => VoxlaneError::DeviceUnavailable(grund),
            AudioError::InitializationTimeout(dauer) => {
                VoxlaneError::InitializationTimeout(format!("{:?}", dauer))
            }
            AudioError::Konfiguration(grund) => VoxlaneError::Konfiguration(grund),
            AudioError::Anyhow(e) => VoxlaneError::Anyhow(e),
            andere => VoxlaneError::Audio(andere.to_string()),
        }
    }
}
