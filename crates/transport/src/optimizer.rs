//! TransportOptimizer – Verbindung zum Sprach-Endpunkt
//!
//! ## Zustandsmaschine
//! ```text
//! Disconnected -> Connecting -> Connected -> Disconnected (Close 1000)
//!                     ^                  \-> Error (abnormal) --+
//!                     |                                        |
//!                     +------------- Reconnect (Backoff) ------+
//! ```
//!
//! ## Nebenlaeufigkeit
//! Der gesamte veraenderliche Zustand liegt in `Shared` hinter einem
//! parking_lot-Mutex. Der Lock wird nie ueber einen `.await` gehalten.
//! Jede Verbindung bekommt eine Generationsnummer; Reader-, Heartbeat-
//! und Reconnect-Tasks einer alten Generation werden ignoriert.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use voxlane_core::frame::AudioFrame;
use voxlane_core::recorder::{MetricRecorder, NoopRecorder};
use voxlane_core::types::{ConnectionState, MessageId};
use voxlane_protocol::{
    jetzt_ms, AudioPacket, Envelope, MessageKind, TranscriptionPayload, WireFrame,
};

use crate::backoff::Backoff;
use crate::config::TransportConfig;
use crate::connector::{Connector, Link, LinkEvent, WireMessage, CLOSE_ABNORMAL, CLOSE_NORMAL};
use crate::error::{TransportError, TransportResult};
use crate::event::TransportEvent;
use crate::metrics::{ConnectionMetrics, MetricsTracker};
use crate::queue::{Priority, PriorityQueue, QueuedMessage};

/// Kapazitaet des Event-Kanals
const EVENT_KAPAZITAET: usize = 256;

// ---------------------------------------------------------------------------
// Interner Zustand
// ---------------------------------------------------------------------------

/// Wartende Anfrage mit Antwortkanal
struct PendingRequest {
    antwort: oneshot::Sender<TransportResult<Envelope>>,
    gesendet: Instant,
}

struct Shared {
    state: ConnectionState,
    url: Option<String>,
    outbound: Option<mpsc::Sender<WireMessage>>,
    queue: PriorityQueue,
    pending: HashMap<MessageId, PendingRequest>,
    metrics: MetricsTracker,
    backoff: Backoff,
    /// `MaxReconnectAttemptsReached` fuer das aktuelle Budget gemeldet
    terminal_gemeldet: bool,
    /// `disconnect()` wurde aufgerufen
    manuell_getrennt: bool,
    generation: u64,
    reader: Option<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
    nachsenden: Option<JoinHandle<()>>,
}

impl Shared {
    fn tasks_abbrechen(&mut self) {
        for handle in [
            self.reader.take(),
            self.heartbeat.take(),
            self.reconnect.take(),
            self.nachsenden.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
    }

    fn pending_ablehnen(&mut self) {
        for (_, p) in self.pending.drain() {
            let _ = p.antwort.send(Err(TransportError::ConnectionClosed));
        }
    }
}

/// Entfernt eine offene Anfrage beim Verlassen von `send`
///
/// Greift auch wenn der Aufrufer das Future verwirft (`select!`,
/// `timeout`, abgebrochener Task).
struct PendingGuard<'a> {
    shared: &'a Mutex<Shared>,
    id: MessageId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.shared.lock().pending.remove(&self.id);
    }
}

struct Inner {
    config: TransportConfig,
    connector: Arc<dyn Connector>,
    recorder: Arc<dyn MetricRecorder>,
    shared: Mutex<Shared>,
    events: broadcast::Sender<TransportEvent>,
}

// ---------------------------------------------------------------------------
// TransportOptimizer
// ---------------------------------------------------------------------------

/// Transport zum Sprach-Endpunkt
///
/// Guenstig klonbar; alle Klone teilen denselben Zustand.
#[derive(Clone)]
pub struct TransportOptimizer {
    inner: Arc<Inner>,
}

impl TransportOptimizer {
    /// Erstellt einen Transport ohne Metrik-Recorder
    pub fn new(config: TransportConfig, connector: Arc<dyn Connector>) -> Self {
        Self::mit_recorder(config, connector, Arc::new(NoopRecorder))
    }

    /// Erstellt einen Transport der Latenzen an `recorder` meldet
    pub fn mit_recorder(
        config: TransportConfig,
        connector: Arc<dyn Connector>,
        recorder: Arc<dyn MetricRecorder>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_KAPAZITAET);
        let shared = Shared {
            state: ConnectionState::Disconnected,
            url: None,
            outbound: None,
            queue: PriorityQueue::new(config.queue_capacity),
            pending: HashMap::new(),
            metrics: MetricsTracker::default(),
            backoff: Backoff::new(config.reconnect_base_delay(), config.max_reconnect_attempts),
            terminal_gemeldet: false,
            manuell_getrennt: false,
            generation: 0,
            reader: None,
            heartbeat: None,
            reconnect: None,
            nachsenden: None,
        };
        Self {
            inner: Arc::new(Inner {
                config,
                connector,
                recorder,
                shared: Mutex::new(shared),
                events,
            }),
        }
    }

    /// Abonniert die Transport-Events
    pub fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.inner.events.subscribe()
    }

    /// Aktueller Verbindungszustand
    pub fn state(&self) -> ConnectionState {
        self.inner.shared.lock().state
    }

    /// Kopie der aktuellen Verbindungsmetriken
    pub fn metrics(&self) -> ConnectionMetrics {
        self.inner.shared.lock().metrics.snapshot()
    }

    /// Anzahl wartender Nachrichten
    pub fn queue_len(&self) -> usize {
        self.inner.shared.lock().queue.len()
    }

    /// Anzahl offener Anfragen
    pub fn pending_len(&self) -> usize {
        self.inner.shared.lock().pending.len()
    }

    /// Verbindet mit dem Endpunkt
    ///
    /// Kehrt erst zurueck wenn die Verbindung steht.
    ///
    /// # Fehler
    /// - `ConnectionTimeout` nach `connect_timeout_ms`
    /// - `ConnectionError` bei fehlgeschlagenem Handshake
    /// - `MaxReconnectAttemptsReached` solange das Reconnect-Budget
    ///   aufgebraucht ist (siehe `reset_reconnect_attempts`)
    pub async fn connect(&self, url: &str) -> TransportResult<()> {
        let generation = {
            let mut s = self.inner.shared.lock();
            if s.state == ConnectionState::Connected && s.url.as_deref() == Some(url) {
                debug!(url, "Bereits verbunden");
                return Ok(());
            }
            if s.terminal_gemeldet {
                return Err(TransportError::MaxReconnectAttemptsReached(s.backoff.versuche()));
            }
            s.tasks_abbrechen();
            if let Some(alt) = s.outbound.take() {
                let _ = alt.try_send(WireMessage::Close {
                    code: CLOSE_NORMAL,
                    reason: "Neue Verbindung".into(),
                });
            }
            s.manuell_getrennt = false;
            s.url = Some(url.to_string());
            s.generation += 1;
            self.inner.zustand_setzen(&mut s, ConnectionState::Connecting);
            s.generation
        };

        info!(url, "Verbinde");
        match self.inner.oeffnen(url).await {
            Ok(link) => self.inner.verbunden(link, generation, false),
            Err(e) => {
                let mut s = self.inner.shared.lock();
                if s.generation == generation {
                    s.metrics.fehler();
                    self.inner.zustand_setzen(&mut s, ConnectionState::Error);
                }
                warn!(url, fehler = %e, "Verbindungsaufbau fehlgeschlagen");
                Err(e)
            }
        }
    }

    /// Sendet eine Anfrage und wartet auf die korrelierte Antwort
    ///
    /// Ohne Verbindung wird die Nachricht mit `priority` in die Queue
    /// gelegt und sofort mit `NotConnected` abgelehnt.
    ///
    /// # Fehler
    /// - `NotConnected` ohne offene Verbindung
    /// - `MessageTimeout` ohne Antwort nach `message_timeout_ms`
    /// - `RemoteFehler` wenn der Endpunkt mit einem Fehler antwortet
    /// - `ConnectionClosed` wenn die Verbindung vorher endet
    pub async fn send(&self, payload: Value, priority: Priority) -> TransportResult<Envelope> {
        let id = MessageId::new();
        let (antwort_tx, antwort_rx) = oneshot::channel();

        let (outbound, envelope) = {
            let mut s = self.inner.shared.lock();
            let outbound = match (&s.outbound, s.state) {
                (Some(o), ConnectionState::Connected) => o.clone(),
                _ => {
                    if let Some(verdraengt) =
                        s.queue.push(QueuedMessage::neu(id, payload, priority))
                    {
                        warn!(id = %verdraengt.id, "Queue voll, Nachricht verworfen");
                    }
                    debug!(%id, ?priority, "Nicht verbunden, Nachricht in Queue");
                    return Err(TransportError::NotConnected);
                }
            };
            s.pending.insert(
                id,
                PendingRequest {
                    antwort: antwort_tx,
                    gesendet: Instant::now(),
                },
            );
            (outbound, Envelope::request(id, payload))
        };
        let _aufraeumen = PendingGuard {
            shared: &self.inner.shared,
            id,
        };

        let bytes = WireFrame::Control(envelope).encode()?;
        let laenge = bytes.len();
        if outbound.send(WireMessage::Binary(bytes)).await.is_err() {
            return Err(TransportError::ConnectionClosed);
        }
        self.inner.shared.lock().metrics.gesendet(laenge);

        match tokio::time::timeout(self.inner.config.message_timeout(), antwort_rx).await {
            Ok(Ok(ergebnis)) => ergebnis,
            Ok(Err(_)) => Err(TransportError::ConnectionClosed),
            Err(_) => {
                if let Some(p) = self.inner.shared.lock().pending.remove(&id) {
                    debug!(%id, wartezeit = ?p.gesendet.elapsed(), "Anfrage abgelaufen");
                }
                Err(TransportError::MessageTimeout(id))
            }
        }
    }

    /// Sendet einen Audio-Frame (fire-and-forget)
    ///
    /// Ohne Verbindung oder bei vollem Sendekanal wird der Frame
    /// verworfen. Audio wird nie in die Queue gelegt.
    pub fn send_audio(&self, frame: &AudioFrame) -> TransportResult<()> {
        let outbound = {
            let mut s = self.inner.shared.lock();
            match (&s.outbound, s.state) {
                (Some(o), ConnectionState::Connected) => o.clone(),
                _ => {
                    s.metrics.audio_verworfen();
                    return Err(TransportError::NotConnected);
                }
            }
        };

        let bytes = WireFrame::Audio(AudioPacket::aus_frame(frame, jetzt_ms())).encode()?;
        let laenge = bytes.len();
        let mut s = self.inner.shared.lock();
        match outbound.try_send(WireMessage::Binary(bytes)) {
            Ok(()) => s.metrics.gesendet(laenge),
            Err(_) => {
                s.metrics.audio_verworfen();
                debug!("Sendekanal voll, Audio-Frame verworfen");
            }
        }
        Ok(())
    }

    /// Setzt den Reconnect-Zaehler zurueck
    ///
    /// Nach `MaxReconnectAttemptsReached` kann danach erneut
    /// `connect` aufgerufen werden.
    pub fn reset_reconnect_attempts(&self) {
        let mut s = self.inner.shared.lock();
        s.backoff.reset();
        s.terminal_gemeldet = false;
    }

    /// Trennt die Verbindung regulaer (Close 1000), idempotent
    ///
    /// Leert die Queue und lehnt offene Anfragen mit `ConnectionClosed` ab.
    pub fn disconnect(&self) {
        let mut s = self.inner.shared.lock();
        s.manuell_getrennt = true;
        s.generation += 1;
        s.tasks_abbrechen();
        if let Some(outbound) = s.outbound.take() {
            let _ = outbound.try_send(WireMessage::Close {
                code: CLOSE_NORMAL,
                reason: "Client getrennt".into(),
            });
        }
        s.queue.clear();
        s.pending_ablehnen();
        s.metrics.getrennt();
        if s.state != ConnectionState::Disconnected {
            info!("Verbindung getrennt");
            self.inner.zustand_setzen(&mut s, ConnectionState::Disconnected);
        }
    }
}

// ---------------------------------------------------------------------------
// Interne Ablaeufe
// ---------------------------------------------------------------------------

impl Inner {
    fn protokolle(&self) -> Vec<String> {
        if self.config.subprotocol.is_empty() {
            Vec::new()
        } else {
            vec![self.config.subprotocol.clone()]
        }
    }

    fn event(&self, ev: TransportEvent) {
        // Fehler nur wenn niemand abonniert hat
        let _ = self.events.send(ev);
    }

    fn zustand_setzen(&self, s: &mut Shared, neu: ConnectionState) {
        if s.state != neu {
            debug!(alt = %s.state, neu = %neu, "Zustandswechsel");
            s.state = neu;
            self.event(TransportEvent::StateChanged(neu));
        }
    }

    /// Oeffnet den Link mit Zeitlimit
    async fn oeffnen(&self, url: &str) -> TransportResult<Link> {
        let timeout = self.config.connect_timeout();
        let protokolle = self.protokolle();
        match tokio::time::timeout(timeout, self.connector.open(url, &protokolle)).await {
            Ok(ergebnis) => ergebnis,
            Err(_) => Err(TransportError::ConnectionTimeout(timeout)),
        }
    }

    /// Uebernimmt einen geoeffneten Link, startet Tasks und leert die Queue
    fn verbunden(self: &Arc<Self>, link: Link, generation: u64, ist_reconnect: bool) -> TransportResult<()> {
        let Link { outbound, inbound } = link;
        let mut s = self.shared.lock();

        if s.generation != generation || s.manuell_getrennt {
            // Inzwischen getrennt oder neu verbunden
            let _ = outbound.try_send(WireMessage::Close {
                code: CLOSE_NORMAL,
                reason: "Verbindung veraltet".into(),
            });
            return Err(TransportError::ConnectionClosed);
        }

        s.outbound = Some(outbound.clone());
        s.metrics.verbunden(ist_reconnect);
        s.backoff.reset();
        s.terminal_gemeldet = false;
        s.reader = Some(tokio::spawn(reader_schleife(
            Arc::clone(self),
            inbound,
            generation,
        )));
        s.heartbeat = Some(tokio::spawn(heartbeat_schleife(Arc::clone(self), generation)));

        if self.queue_leeren(&mut s, &outbound) {
            s.nachsenden = Some(tokio::spawn(queue_nachsenden(
                Arc::clone(self),
                outbound,
                generation,
            )));
        }
        self.zustand_setzen(&mut s, ConnectionState::Connected);
        info!(
            url = s.url.as_deref().unwrap_or_default(),
            reconnect = ist_reconnect,
            "Verbunden"
        );
        Ok(())
    }

    /// Sendet die wartenden Nachrichten in Prioritaetsreihenfolge
    ///
    /// Ist der Sendekanal voll, bleibt der Rest in der Queue und
    /// `true` wird zurueckgegeben. Fehlgeschlagene High-Nachrichten
    /// kommen mit erhoehtem Zaehler zurueck in die Queue, Normal/Low
    /// werden verworfen.
    fn queue_leeren(&self, s: &mut Shared, outbound: &mpsc::Sender<WireMessage>) -> bool {
        let mut wartend = s.queue.alle_entnehmen().into_iter();
        let anzahl = wartend.len();
        if anzahl == 0 {
            return false;
        }
        let mut gesendet = 0usize;

        while let Some(nachricht) = wartend.next() {
            let bytes = match anfrage_kodieren(&nachricht) {
                Ok(b) => b,
                Err(e) => {
                    self.flush_fehlgeschlagen(s, nachricht, &e);
                    continue;
                }
            };
            let laenge = bytes.len();
            match outbound.try_send(WireMessage::Binary(bytes)) {
                Ok(()) => {
                    s.metrics.gesendet(laenge);
                    gesendet += 1;
                }
                Err(TrySendError::Full(_)) => {
                    let rest: Vec<_> = std::iter::once(nachricht).chain(wartend).collect();
                    info!(gesendet, zurueckgestellt = rest.len(), "Sendekanal voll, Rest bleibt in der Queue");
                    s.queue.zurueckstellen(rest);
                    return true;
                }
                Err(TrySendError::Closed(_)) => {
                    self.flush_fehlgeschlagen(s, nachricht, &TransportError::ConnectionClosed);
                }
            }
        }
        info!(gesendet, gesamt = anzahl, "Queue geleert");
        false
    }

    fn flush_fehlgeschlagen(&self, s: &mut Shared, mut nachricht: QueuedMessage, fehler: &TransportError) {
        if nachricht.priority == Priority::High && nachricht.retries < self.config.max_queue_retries {
            nachricht.retries += 1;
            debug!(id = %nachricht.id, versuch = nachricht.retries, %fehler, "High-Nachricht erneut in Queue");
            s.queue.push(nachricht);
        } else {
            warn!(id = %nachricht.id, priority = ?nachricht.priority, %fehler, "Nachricht aus Queue verworfen");
        }
    }

    /// Verarbeitet einen eingehenden Binaer-Frame
    fn frame_verarbeiten(&self, bytes: &[u8]) {
        self.shared.lock().metrics.empfangen(bytes.len());
        match WireFrame::decode(bytes) {
            Ok(WireFrame::Audio(paket)) => {
                if paket.timestamp_ms > 0 {
                    if let Some(d) = jetzt_ms().checked_sub(paket.timestamp_ms) {
                        self.latenz_messen(d as f64);
                    }
                }
                match paket.in_frame() {
                    Ok(frame) => self.event(TransportEvent::Audio(frame)),
                    Err(e) => {
                        self.shared.lock().metrics.fehler();
                        warn!(fehler = %e, "Audio-Paket nicht dekodierbar");
                    }
                }
            }
            Ok(WireFrame::Control(env)) => self.envelope_verarbeiten(env),
            Err(e) => {
                self.shared.lock().metrics.fehler();
                warn!(fehler = %e, laenge = bytes.len(), "Ungueltiger Frame verworfen");
            }
        }
    }

    /// Verarbeitet einen Text-Frame (JSON-Envelope)
    fn text_verarbeiten(&self, text: &str) {
        self.shared.lock().metrics.empfangen(text.len());
        match Envelope::from_json(text.as_bytes()) {
            Ok(env) => self.envelope_verarbeiten(env),
            Err(e) => {
                self.shared.lock().metrics.fehler();
                warn!(fehler = %e, "Ungueltige Text-Nachricht verworfen");
            }
        }
    }

    fn envelope_verarbeiten(&self, env: Envelope) {
        if let Some(latenz) = env.latenz_ms(jetzt_ms()) {
            self.latenz_messen(latenz);
        }

        match env.kind {
            MessageKind::Ping => {
                self.control_senden(Envelope::pong(env.timestamp));
                return;
            }
            MessageKind::Pong => return,
            _ => {}
        }

        // Korrelierte Antwort?
        if let Some(id) = env.id {
            let pending = self.shared.lock().pending.remove(&id);
            if let Some(p) = pending {
                let ergebnis = if env.kind == MessageKind::Error {
                    Err(TransportError::RemoteFehler(
                        env.error.clone().unwrap_or_else(|| "unbekannt".into()),
                    ))
                } else {
                    Ok(env)
                };
                let _ = p.antwort.send(ergebnis);
                return;
            }
        }

        let ereignis = match env.kind {
            MessageKind::Transcription => match env.payload_als::<TranscriptionPayload>() {
                Ok(t) => TransportEvent::Transcription {
                    text: t.text,
                    is_final: t.is_final,
                },
                Err(_) => TransportEvent::Message(env),
            },
            MessageKind::Error => TransportEvent::RemoteError {
                message: env.error.clone().unwrap_or_else(|| "unbekannt".into()),
            },
            MessageKind::Metrics => TransportEvent::Metrics(env.payload),
            _ => TransportEvent::Message(env),
        };
        self.event(ereignis);
    }

    fn latenz_messen(&self, messung_ms: f64) {
        let geglaettet = self.shared.lock().metrics.latenz(messung_ms);
        self.recorder.record(
            "transport.latency_ms",
            geglaettet,
            Some(serde_json::json!({ "messung_ms": messung_ms })),
        );
    }

    /// Sendet eine Steuernachricht ohne Antwort-Erwartung
    fn control_senden(&self, env: Envelope) -> bool {
        let bytes = match WireFrame::Control(env).encode() {
            Ok(b) => b,
            Err(e) => {
                warn!(fehler = %e, "Steuernachricht nicht kodierbar");
                return false;
            }
        };
        let laenge = bytes.len();
        let mut s = self.shared.lock();
        let Some(outbound) = s.outbound.as_ref() else {
            return false;
        };
        if outbound.try_send(WireMessage::Binary(bytes)).is_ok() {
            s.metrics.gesendet(laenge);
            true
        } else {
            false
        }
    }

    /// Verbindung wurde beendet (vom Reader erkannt)
    fn verbindung_beendet(self: &Arc<Self>, generation: u64, code: u16, grund: &str) {
        let mut s = self.shared.lock();
        if s.generation != generation || s.manuell_getrennt {
            return;
        }
        s.outbound = None;
        s.reader = None;
        if let Some(h) = s.heartbeat.take() {
            h.abort();
        }
        s.metrics.getrennt();
        s.pending_ablehnen();

        if code == CLOSE_NORMAL {
            info!(grund, "Verbindung vom Endpunkt regulaer geschlossen");
            self.zustand_setzen(&mut s, ConnectionState::Disconnected);
            return;
        }

        warn!(code, grund, "Verbindung abnormal beendet");
        s.metrics.fehler();
        self.zustand_setzen(&mut s, ConnectionState::Error);
        self.reconnect_planen(&mut s);
    }

    /// Plant den naechsten Reconnect-Versuch oder meldet das Ende
    fn reconnect_planen(self: &Arc<Self>, s: &mut Shared) {
        match s.backoff.naechster() {
            Some((versuch, verzoegerung)) => {
                info!(versuch, ?verzoegerung, "Reconnect geplant");
                self.event(TransportEvent::Reconnecting {
                    attempt: versuch,
                    delay: verzoegerung,
                });
                let inner = Arc::clone(self);
                let generation = s.generation;
                s.reconnect = Some(tokio::spawn(async move {
                    tokio::time::sleep(verzoegerung).await;
                    inner.reconnect_versuch(generation).await;
                }));
            }
            None => {
                if !s.terminal_gemeldet {
                    s.terminal_gemeldet = true;
                    let versuche = s.backoff.versuche();
                    warn!(versuche, "Maximale Anzahl an Reconnect-Versuchen erreicht");
                    self.event(TransportEvent::MaxReconnectAttemptsReached { attempts: versuche });
                }
            }
        }
    }

    async fn reconnect_versuch(self: Arc<Self>, alte_generation: u64) {
        let (url, generation) = {
            let mut s = self.shared.lock();
            if s.generation != alte_generation || s.manuell_getrennt {
                return;
            }
            let Some(url) = s.url.clone() else {
                return;
            };
            s.generation += 1;
            // Eigenes Handle nicht abbrechen, nur vergessen
            s.reconnect = None;
            self.zustand_setzen(&mut s, ConnectionState::Connecting);
            (url, s.generation)
        };

        match self.oeffnen(&url).await {
            Ok(link) => {
                if let Err(e) = self.verbunden(link, generation, true) {
                    debug!(fehler = %e, "Reconnect verworfen");
                }
            }
            Err(e) => {
                warn!(fehler = %e, "Reconnect fehlgeschlagen");
                let mut s = self.shared.lock();
                if s.generation != generation || s.manuell_getrennt {
                    return;
                }
                s.metrics.fehler();
                self.zustand_setzen(&mut s, ConnectionState::Error);
                self.reconnect_planen(&mut s);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

async fn reader_schleife(inner: Arc<Inner>, mut inbound: mpsc::Receiver<LinkEvent>, generation: u64) {
    while let Some(ereignis) = inbound.recv().await {
        match ereignis {
            LinkEvent::Frame(bytes) => inner.frame_verarbeiten(&bytes),
            LinkEvent::Text(text) => inner.text_verarbeiten(&text),
            LinkEvent::Closed { code, reason } => {
                inner.verbindung_beendet(generation, code, &reason);
                return;
            }
            LinkEvent::Error(fehler) => {
                inner.shared.lock().metrics.fehler();
                warn!(fehler, "Transportfehler");
            }
        }
    }
    inner.verbindung_beendet(generation, CLOSE_ABNORMAL, "Link ohne Close beendet");
}

/// Sendet den Rest der Queue sobald im Sendekanal wieder Platz ist
async fn queue_nachsenden(inner: Arc<Inner>, outbound: mpsc::Sender<WireMessage>, generation: u64) {
    loop {
        let Ok(platz) = outbound.reserve().await else {
            return;
        };
        let mut s = inner.shared.lock();
        if s.generation != generation || s.manuell_getrennt {
            return;
        }
        let Some(nachricht) = s.queue.pop() else {
            s.nachsenden = None;
            debug!("Queue nachgesendet");
            return;
        };
        match anfrage_kodieren(&nachricht) {
            Ok(bytes) => {
                s.metrics.gesendet(bytes.len());
                platz.send(WireMessage::Binary(bytes));
            }
            Err(e) => warn!(id = %nachricht.id, fehler = %e, "Nachricht aus Queue nicht kodierbar"),
        }
    }
}

fn anfrage_kodieren(nachricht: &QueuedMessage) -> TransportResult<bytes::Bytes> {
    let envelope = Envelope::request(nachricht.id, nachricht.payload.clone());
    Ok(WireFrame::Control(envelope).encode()?)
}

/// Keep-Alive: sendet periodisch Pings, trennt nie selbst
async fn heartbeat_schleife(inner: Arc<Inner>, generation: u64) {
    let mut intervall = tokio::time::interval(inner.config.heartbeat_interval());
    // Erster Tick kommt sofort
    intervall.tick().await;
    loop {
        intervall.tick().await;
        {
            let s = inner.shared.lock();
            if s.generation != generation || s.state != ConnectionState::Connected {
                return;
            }
        }
        if !inner.control_senden(Envelope::ping()) {
            debug!("Heartbeat-Ping nicht gesendet");
        }
    }
}
