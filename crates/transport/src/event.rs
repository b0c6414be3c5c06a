//! Typisierte Transport-Events fuer Abonnenten

use serde_json::Value;
use std::time::Duration;
use voxlane_core::frame::AudioFrame;
use voxlane_core::types::ConnectionState;
use voxlane_protocol::Envelope;

/// Ereignis des Transport-Optimizers
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Verbindungszustand hat sich geaendert
    StateChanged(ConnectionState),
    /// Audio vom Endpunkt
    Audio(AudioFrame),
    /// Transkript vom Endpunkt
    Transcription { text: String, is_final: bool },
    /// Unkorrelierte Fehlermeldung des Endpunkts
    RemoteError { message: String },
    /// Zeitmessungen des Endpunkts
    Metrics(Value),
    /// Sonstige Nachricht (inkl. unkorrelierter Antworten)
    Message(Envelope),
    /// Reconnect geplant
    Reconnecting { attempt: u32, delay: Duration },
    /// Reconnect-Budget aufgebraucht (einmal pro Budget)
    MaxReconnectAttemptsReached { attempts: u32 },
}
