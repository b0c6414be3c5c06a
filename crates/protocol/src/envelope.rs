//! Nachrichten-Envelope fuer Steuernachrichten
//!
//! Jede Steuernachricht traegt ein `type`-Feld, optional eine
//! Korrelations-ID und einen Zeitstempel (Unix-Millisekunden). Der
//! Zeitstempel wird vom Endpunkt unveraendert zurueckgeschickt und dient
//! der Round-Trip-Messung.
//!
//! ## Design
//! - JSON via serde (nicht zeitkritisch, Audio laeuft binaer)
//! - Unbekannte Typen werden als `Generic` gelesen statt verworfen

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use voxlane_core::types::MessageId;

/// Aktuelle Zeit in Unix-Millisekunden
pub fn jetzt_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ---------------------------------------------------------------------------
// Nachrichtentyp
// ---------------------------------------------------------------------------

/// Art einer Steuernachricht
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Anfrage die eine korrelierte Antwort erwartet
    Request,
    /// Antwort auf eine Anfrage
    Response,
    /// Audio-Metadaten (die Samples selbst laufen binaer)
    Audio,
    /// Transkript des Endpunkts
    Transcription,
    /// Zeitmessungen des Endpunkts (STT, TTS, Verarbeitung)
    Metrics,
    /// Fehlermeldung des Endpunkts
    Error,
    /// Keep-Alive
    Ping,
    /// Antwort auf Ping
    Pong,
    /// Alles andere
    #[serde(other)]
    Generic,
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Nutzdaten einer Transkriptions-Nachricht
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionPayload {
    pub text: String,
    #[serde(default, alias = "isFinal")]
    pub is_final: bool,
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Umschlag fuer eine Steuernachricht
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Nachrichtentyp
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Korrelations-ID (Request/Response)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    /// Sendezeitpunkt in Unix-Millisekunden
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    /// Nutzdaten
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
    /// Fehlertext (nur bei `MessageKind::Error`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Envelope {
    /// Erstellt einen Envelope ohne ID
    pub fn new(kind: MessageKind, payload: Value) -> Self {
        Self {
            kind,
            id: None,
            timestamp: Some(jetzt_ms()),
            payload,
            error: None,
        }
    }

    /// Erstellt eine Anfrage mit Korrelations-ID
    pub fn request(id: MessageId, payload: Value) -> Self {
        Self {
            id: Some(id),
            ..Self::new(MessageKind::Request, payload)
        }
    }

    /// Erstellt eine Antwort auf eine Anfrage
    pub fn response(id: MessageId, payload: Value) -> Self {
        Self {
            id: Some(id),
            ..Self::new(MessageKind::Response, payload)
        }
    }

    /// Erstellt eine Fehlermeldung (optional korreliert)
    pub fn fehler(id: Option<MessageId>, nachricht: impl Into<String>) -> Self {
        Self {
            id,
            error: Some(nachricht.into()),
            ..Self::new(MessageKind::Error, Value::Null)
        }
    }

    /// Erstellt einen Keep-Alive-Ping
    pub fn ping() -> Self {
        Self::new(MessageKind::Ping, Value::Null)
    }

    /// Erstellt ein Pong das den Zeitstempel des Pings zurueckschickt
    pub fn pong(ping_timestamp: Option<u64>) -> Self {
        Self {
            timestamp: ping_timestamp,
            ..Self::new(MessageKind::Pong, Value::Null)
        }
    }

    /// Setzt den Zeitstempel (Builder)
    pub fn mit_timestamp(mut self, timestamp_ms: u64) -> Self {
        self.timestamp = Some(timestamp_ms);
        self
    }

    /// Round-Trip-Latenz bezogen auf `jetzt` in Millisekunden
    ///
    /// `None` wenn kein Zeitstempel vorhanden ist oder er in der Zukunft
    /// liegt (Uhrenversatz).
    pub fn latenz_ms(&self, jetzt: u64) -> Option<f64> {
        let ts = self.timestamp?;
        jetzt.checked_sub(ts).map(|d| d as f64)
    }

    /// Deserialisiert die Nutzdaten in einen konkreten Typ
    pub fn payload_als<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(self.payload.clone())
    }

    /// Serialisiert den Envelope nach JSON
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Deserialisiert einen Envelope aus JSON
    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}
