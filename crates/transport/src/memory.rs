//! In-Memory-Connector
//!
//! Liefert fuer jede geoeffnete Verbindung ein `MemoryPeer`, ueber das
//! die Gegenseite (Tests, lokale Simulation) Nachrichten liest und
//! Ereignisse einspeist. Fehlschlaege und haengende Handshakes lassen
//! sich gezielt ausloesen.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use voxlane_core::frame::AudioFrame;
use voxlane_protocol::{AudioPacket, Envelope, WireFrame};

use crate::connector::{
    Connector, Link, LinkEvent, WireMessage, INBOUND_KAPAZITAET, OUTBOUND_KAPAZITAET,
};
use crate::error::{TransportError, TransportResult};

#[derive(Debug, Default)]
struct Steuerung {
    fehlschlaege: u32,
    haengen: bool,
    protokolle: Vec<String>,
}

/// Connector ohne Netzwerk
#[derive(Clone)]
pub struct MemoryConnector {
    peers: mpsc::UnboundedSender<MemoryPeer>,
    steuerung: Arc<Mutex<Steuerung>>,
    versuche: Arc<AtomicU32>,
}

impl MemoryConnector {
    /// Erstellt den Connector und den Empfaenger fuer neue Verbindungen
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                peers: tx,
                steuerung: Arc::new(Mutex::new(Steuerung::default())),
                versuche: Arc::new(AtomicU32::new(0)),
            },
            rx,
        )
    }

    /// Die naechsten `n` Verbindungsversuche schlagen fehl
    pub fn fehlschlagen_lassen(&self, n: u32) {
        self.steuerung.lock().fehlschlaege = n;
    }

    /// Handshakes haengen bis zum Timeout
    pub fn haengen_lassen(&self, haengen: bool) {
        self.steuerung.lock().haengen = haengen;
    }

    /// Anzahl bisheriger Verbindungsversuche
    pub fn versuche(&self) -> u32 {
        self.versuche.load(Ordering::SeqCst)
    }

    /// Zuletzt angebotene Sub-Protokolle
    pub fn protokolle(&self) -> Vec<String> {
        self.steuerung.lock().protokolle.clone()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, url: &str, protocols: &[String]) -> TransportResult<Link> {
        self.versuche.fetch_add(1, Ordering::SeqCst);
        let haengen = {
            let mut s = self.steuerung.lock();
            s.protokolle = protocols.to_vec();
            if s.fehlschlaege > 0 {
                s.fehlschlaege -= 1;
                return Err(TransportError::ConnectionError(format!(
                    "Handshake mit {url} abgelehnt"
                )));
            }
            s.haengen
        };
        if haengen {
            std::future::pending::<()>().await;
        }

        let (out_tx, out_rx) = mpsc::channel(OUTBOUND_KAPAZITAET);
        let (in_tx, in_rx) = mpsc::channel(INBOUND_KAPAZITAET);
        let peer = MemoryPeer {
            url: url.to_string(),
            von_client: out_rx,
            zum_client: in_tx,
        };
        self.peers
            .send(peer)
            .map_err(|_| TransportError::ConnectionError("Gegenstelle nicht erreichbar".into()))?;
        Ok(Link {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

/// Gegenseite einer In-Memory-Verbindung
pub struct MemoryPeer {
    pub url: String,
    von_client: mpsc::Receiver<WireMessage>,
    zum_client: mpsc::Sender<LinkEvent>,
}

impl MemoryPeer {
    /// Naechste Nachricht des Clients
    pub async fn empfangen(&mut self) -> Option<WireMessage> {
        self.von_client.recv().await
    }

    /// Naechster Steuer-Envelope des Clients (Audio wird uebersprungen)
    pub async fn envelope_empfangen(&mut self) -> Option<Envelope> {
        loop {
            match self.von_client.recv().await? {
                WireMessage::Binary(bytes) => {
                    if let Ok(WireFrame::Control(env)) = WireFrame::decode(&bytes) {
                        return Some(env);
                    }
                }
                WireMessage::Close { .. } => return None,
            }
        }
    }

    /// Naechstes Audio-Paket des Clients (Steuernachrichten werden uebersprungen)
    pub async fn audio_empfangen(&mut self) -> Option<AudioPacket> {
        loop {
            match self.von_client.recv().await? {
                WireMessage::Binary(bytes) => {
                    if let Ok(WireFrame::Audio(paket)) = WireFrame::decode(&bytes) {
                        return Some(paket);
                    }
                }
                WireMessage::Close { .. } => return None,
            }
        }
    }

    /// Sendet einen Steuer-Envelope an den Client
    pub async fn envelope_senden(&self, env: Envelope) -> bool {
        match WireFrame::Control(env).encode() {
            Ok(bytes) => self.zum_client.send(LinkEvent::Frame(bytes)).await.is_ok(),
            Err(_) => false,
        }
    }

    /// Sendet Audio an den Client
    pub async fn audio_senden(&self, frame: &AudioFrame, timestamp_ms: u64) -> bool {
        match WireFrame::Audio(AudioPacket::aus_frame(frame, timestamp_ms)).encode() {
            Ok(bytes) => self.zum_client.send(LinkEvent::Frame(bytes)).await.is_ok(),
            Err(_) => false,
        }
    }

    /// Speist ein beliebiges Link-Ereignis ein
    pub async fn ereignis(&self, ev: LinkEvent) -> bool {
        self.zum_client.send(ev).await.is_ok()
    }

    /// Schliesst die Verbindung mit dem gegebenen Code
    pub async fn schliessen(&self, code: u16) -> bool {
        self.ereignis(LinkEvent::Closed {
            code,
            reason: String::new(),
        })
        .await
    }
}
