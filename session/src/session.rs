//! VoiceSession – ein Gespraech mit dem Sprach-Endpunkt
//!
//! Die Session besitzt Conditioner, Transport und Telemetrie. Der
//! Telemetrie-Aggregator ist fuer beide anderen Komponenten der
//! `MetricRecorder`. Eingehende Transport-Events laufen durch eine
//! Pumpe: Audio wird fuer die Wiedergabe konditioniert, Zeitmessungen
//! des Endpunkts landen in der Telemetrie. Abonnenten erhalten
//! `SessionEvent`s ueber einen broadcast-Kanal.

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use voxlane_audio::{AudioBackend, AudioConditioner, ConditionerStats};
use voxlane_core::frame::AudioFrame;
use voxlane_core::recorder::MetricRecorder;
use voxlane_core::types::{ConnectionState, SessionId};
use voxlane_protocol::Envelope;
use voxlane_telemetry::{PerformanceSummary, TelemetryAggregator, TelemetryExport, VoiceMetrics};
use voxlane_transport::{
    ConnectionMetrics, Connector, Priority, TransportError, TransportEvent, TransportOptimizer,
};

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};

/// Kapazitaet des Event-Kanals
const EVENT_KAPAZITAET: usize = 256;

/// Ereignis einer Session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Verbindungszustand hat sich geaendert
    StateChanged(ConnectionState),
    /// Konditioniertes Audio des Endpunkts (bereits an die Wiedergabe uebergeben)
    Playback { frame: AudioFrame, quality: f32 },
    /// Transkript des Endpunkts
    Transcription { text: String, is_final: bool },
    /// Unkorrelierte Fehlermeldung des Endpunkts
    RemoteError { message: String },
    /// Zeitmessungen einer Sprachrunde
    VoiceMetrics(VoiceMetrics),
    /// Sonstige Nachricht
    Message(Envelope),
    /// Reconnect geplant
    Reconnecting { attempt: u32, delay: Duration },
    /// Verbindung endgueltig verloren (Reconnect-Budget aufgebraucht)
    ConnectionLost { attempts: u32 },
    /// Adaptive Puffergroesse hat sich geaendert
    BufferResized { size: usize },
}

/// Momentaufnahme aller Session-Metriken
#[derive(Debug, Clone, Serialize)]
pub struct SessionMetrics {
    pub session_id: SessionId,
    pub state: ConnectionState,
    pub connection: ConnectionMetrics,
    pub audio: ConditionerStats,
}

struct Inner {
    id: SessionId,
    config: SessionConfig,
    conditioner: tokio::sync::Mutex<AudioConditioner>,
    transport: TransportOptimizer,
    telemetry: TelemetryAggregator,
    events: broadcast::Sender<SessionEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    aktiv: AtomicBool,
    beendet: AtomicBool,
}

/// Eine Sprach-Session
///
/// Nicht `Clone`: beim Drop werden alle Hintergrund-Tasks beendet.
pub struct VoiceSession {
    inner: Arc<Inner>,
}

impl VoiceSession {
    /// Erstellt eine Session mit dem gegebenen Netzwerk-Connector
    ///
    /// Oeffnet noch keine Geraete und keine Verbindung.
    pub fn new(config: SessionConfig, connector: Arc<dyn Connector>) -> SessionResult<Self> {
        config.pruefen()?;
        let id = SessionId::new();
        let telemetry = TelemetryAggregator::new(config.telemetry.clone(), id)?;
        Self::mit_telemetrie(config, connector, telemetry)
    }

    /// Wie `new`, aber mit vorbereitetem Aggregator (eigene Quellen, Report-Ziel)
    pub fn mit_telemetrie(
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        telemetry: TelemetryAggregator,
    ) -> SessionResult<Self> {
        config.pruefen()?;
        let recorder: Arc<dyn MetricRecorder> = Arc::new(telemetry.clone());
        let conditioner = AudioConditioner::new(config.audio.clone(), Arc::clone(&recorder))?;
        let transport =
            TransportOptimizer::mit_recorder(config.transport.clone(), connector, recorder);
        let (events, _) = broadcast::channel(EVENT_KAPAZITAET);

        info!(session = %telemetry.session_id(), endpunkt = %config.endpunkt.url, "Session erstellt");
        Ok(Self {
            inner: Arc::new(Inner {
                id: telemetry.session_id(),
                config,
                conditioner: tokio::sync::Mutex::new(conditioner),
                transport,
                telemetry,
                events,
                tasks: Mutex::new(Vec::new()),
                aktiv: AtomicBool::new(false),
                beendet: AtomicBool::new(false),
            }),
        })
    }

    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.transport.state()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.beendet.load(Ordering::SeqCst)
    }

    /// Direkter Zugriff auf den Aggregator (z.B. fuer Web-Vitals)
    pub fn telemetry(&self) -> &TelemetryAggregator {
        &self.inner.telemetry
    }

    /// Abonniert die Session-Events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    // -----------------------------------------------------------------------
    // Lebenszyklus
    // -----------------------------------------------------------------------

    /// Oeffnet die Geraete, startet die Pumpen und verbindet zum Endpunkt
    ///
    /// Ohne Backend wird nur konditioniert (keine Geraete). Geraetefehler
    /// sind fatal und werden sofort zurueckgegeben.
    pub async fn activate(&self, backend: Option<&dyn AudioBackend>) -> SessionResult<()> {
        self.nicht_beendet()?;

        if let Some(backend) = backend {
            let format = self.inner.conditioner.lock().await.initialize(backend).await?;
            info!(
                session = %self.inner.id,
                eingabe = %format.input_name,
                ausgabe = %format.output_name,
                sample_rate = format.sample_rate,
                "Geraete geoeffnet"
            );
        }

        if !self.inner.aktiv.swap(true, Ordering::SeqCst) {
            // Abonnieren vor dem Verbinden, damit kein Zustandswechsel fehlt
            let rx = self.inner.transport.subscribe();
            let weak = Arc::downgrade(&self.inner);
            let mut tasks = self.inner.tasks.lock();
            tasks.push(tokio::spawn(eingang_schleife(weak.clone(), rx)));
            tasks.push(tokio::spawn(tuning_schleife(
                weak,
                self.inner.config.endpunkt.tuning_interval(),
            )));
        }

        self.inner.transport.connect(&self.inner.config.endpunkt.url).await?;
        self.inner.telemetry.start();
        info!(session = %self.inner.id, "Session aktiv");
        Ok(())
    }

    /// Beendet die Session in umgekehrter Aufbau-Reihenfolge (idempotent)
    pub async fn shutdown(&self) {
        if self.inner.beendet.swap(true, Ordering::SeqCst) {
            return;
        }
        self.tasks_abbrechen();
        self.inner.telemetry.dispose().await;
        self.inner.transport.disconnect();
        self.inner.conditioner.lock().await.dispose();
        info!(session = %self.inner.id, "Session beendet");
    }

    fn tasks_abbrechen(&self) {
        for task in self.inner.tasks.lock().drain(..) {
            task.abort();
        }
    }

    fn nicht_beendet(&self) -> SessionResult<()> {
        if self.is_shut_down() {
            return Err(SessionError::Beendet);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Datenpfad
    // -----------------------------------------------------------------------

    /// Konditioniert einen Capture-Frame und sendet ihn
    ///
    /// Ohne Verbindung wird der Frame verworfen (kein Fehler).
    pub async fn push_captured(&self, frame: AudioFrame) -> SessionResult<()> {
        self.nicht_beendet()?;
        let verarbeitet = self.inner.conditioner.lock().await.process(frame).await?;
        match self.inner.transport.send_audio(&verarbeitet.frame) {
            Ok(()) => Ok(()),
            Err(TransportError::NotConnected) => {
                debug!("Nicht verbunden, Capture-Frame verworfen");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Holt alle vollstaendigen Capture-Frames von den Geraeten und sendet sie
    ///
    /// Gibt die Anzahl gesendeter Frames zurueck.
    pub async fn pump_capture(&self) -> SessionResult<usize> {
        let mut anzahl = 0;
        loop {
            let frame = self.inner.conditioner.lock().await.capture_frame();
            let Some(frame) = frame else {
                return Ok(anzahl);
            };
            self.push_captured(frame).await?;
            anzahl += 1;
        }
    }

    /// Sendet eine Steuernachricht und wartet auf die korrelierte Antwort
    pub async fn transmit(&self, payload: Value, priority: Priority) -> SessionResult<Envelope> {
        self.nicht_beendet()?;
        Ok(self.inner.transport.send(payload, priority).await?)
    }

    /// Setzt das Reconnect-Budget nach `ConnectionLost` zurueck und verbindet neu
    pub async fn reconnect(&self) -> SessionResult<()> {
        self.nicht_beendet()?;
        self.inner.transport.reset_reconnect_attempts();
        self.inner.transport.connect(&self.inner.config.endpunkt.url).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Auswertung
    // -----------------------------------------------------------------------

    pub async fn metrics(&self) -> SessionMetrics {
        SessionMetrics {
            session_id: self.inner.id,
            state: self.inner.transport.state(),
            connection: self.inner.transport.metrics(),
            audio: self.inner.conditioner.lock().await.stats(),
        }
    }

    pub fn summary(&self) -> PerformanceSummary {
        self.inner.telemetry.summary()
    }

    pub fn recommendations(&self) -> Vec<String> {
        self.inner.telemetry.recommendations()
    }

    pub fn export(&self) -> TelemetryExport {
        self.inner.telemetry.export()
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        self.tasks_abbrechen();
    }
}

// ---------------------------------------------------------------------------
// Eingangs-Pumpe
// ---------------------------------------------------------------------------

impl Inner {
    fn event(&self, ev: SessionEvent) {
        // Ohne Abonnenten ist send ein Fehler, das ist kein Problem
        let _ = self.events.send(ev);
    }

    async fn transport_event(&self, ev: TransportEvent) {
        match ev {
            TransportEvent::StateChanged(state) => self.event(SessionEvent::StateChanged(state)),
            TransportEvent::Audio(frame) => {
                let ergebnis = self.conditioner.lock().await.process_playback(frame).await;
                match ergebnis {
                    Ok(p) => self.event(SessionEvent::Playback {
                        frame: p.frame,
                        quality: p.quality,
                    }),
                    Err(e) => warn!(session = %self.id, fehler = %e, "Wiedergabe-Frame verworfen"),
                }
            }
            TransportEvent::Transcription { text, is_final } => {
                self.event(SessionEvent::Transcription { text, is_final })
            }
            TransportEvent::RemoteError { message } => {
                warn!(session = %self.id, meldung = %message, "Fehler vom Endpunkt");
                self.telemetry
                    .record("voice.remote_error", 1.0, Some(json!({ "message": message })));
                self.event(SessionEvent::RemoteError { message });
            }
            TransportEvent::Metrics(payload) => {
                match serde_json::from_value::<VoiceMetrics>(payload) {
                    Ok(metriken) => {
                        self.telemetry.record_voice_metrics(&metriken);
                        self.event(SessionEvent::VoiceMetrics(metriken));
                    }
                    Err(e) => debug!(fehler = %e, "Unlesbare Zeitmessungen ignoriert"),
                }
            }
            TransportEvent::Message(env) => self.event(SessionEvent::Message(env)),
            TransportEvent::Reconnecting { attempt, delay } => {
                self.event(SessionEvent::Reconnecting { attempt, delay })
            }
            TransportEvent::MaxReconnectAttemptsReached { attempts } => {
                warn!(session = %self.id, versuche = attempts, "Verbindung endgueltig verloren");
                self.event(SessionEvent::ConnectionLost { attempts });
            }
        }
    }
}

async fn eingang_schleife(inner: Weak<Inner>, mut rx: broadcast::Receiver<TransportEvent>) {
    loop {
        let ev = match rx.recv().await {
            Ok(ev) => ev,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(verpasst = n, "Transport-Events verpasst");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return,
        };
        let Some(inner) = inner.upgrade() else {
            return;
        };
        inner.transport_event(ev).await;
    }
}

async fn tuning_schleife(inner: Weak<Inner>, intervall: Duration) {
    let mut takt = tokio::time::interval(intervall);
    takt.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Erster Tick kommt sofort
    takt.tick().await;
    loop {
        takt.tick().await;
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let (alt, neu) = {
            let mut c = inner.conditioner.lock().await;
            let alt = c.buffer_size();
            (alt, c.optimize_buffer_size())
        };
        if neu != alt {
            inner.event(SessionEvent::BufferResized { size: neu });
        }
    }
}
