//! Netzwerk-Schnittstelle des Transports
//!
//! Ein `Connector` oeffnet eine Verbindung und liefert einen `Link`:
//! ausgehende `WireMessage`s ueber einen mpsc-Sender, eingehende
//! `LinkEvent`s ueber einen mpsc-Empfaenger. Reader und Writer laufen
//! in eigenen Tasks der Implementierung.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::TransportResult;

/// Close-Code fuer regulaeres Schliessen
pub const CLOSE_NORMAL: u16 = 1000;
/// Close-Code fuer abnormales Ende ohne Close-Frame
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Kapazitaet des ausgehenden Kanals
pub const OUTBOUND_KAPAZITAET: usize = 2048;
/// Kapazitaet des eingehenden Kanals
pub const INBOUND_KAPAZITAET: usize = 512;

/// Ausgehende Nachricht
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    /// Binaer-Frame (kodierter `WireFrame`)
    Binary(Bytes),
    /// Verbindung schliessen
    Close { code: u16, reason: String },
}

/// Eingehendes Ereignis
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// Binaer-Frame
    Frame(Bytes),
    /// Text-Frame (JSON-Envelope)
    Text(String),
    /// Verbindung beendet
    Closed { code: u16, reason: String },
    /// Transportfehler (Verbindung kann noch offen sein)
    Error(String),
}

/// Geoeffnete Verbindung
#[derive(Debug)]
pub struct Link {
    pub outbound: mpsc::Sender<WireMessage>,
    pub inbound: mpsc::Receiver<LinkEvent>,
}

/// Oeffnet Verbindungen zu einem Endpunkt
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Oeffnet eine Verbindung und bietet die Sub-Protokolle an
    ///
    /// # Fehler
    /// - `ConnectionError` wenn der Handshake fehlschlaegt
    async fn open(&self, url: &str, protocols: &[String]) -> TransportResult<Link>;
}
