//! Gespraechs-Szenarien ueber die oeffentliche Schnittstelle der Session

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use voxlane_audio::{AudioBackend, AudioResult, AudioStream, DeviceConstraints, NegotiatedFormat};
use voxlane_core::{AudioFrame, ConnectionState};
use voxlane_session::{SessionConfig, SessionEvent, VoiceSession};
use voxlane_telemetry::{NoopProbe, TelemetryAggregator};
use voxlane_transport::MemoryConnector;

/// Geraet das einen festen Capture-Vorrat liefert und Wiedergabe mitschreibt
struct TestGeraet {
    vorrat: Arc<Mutex<Vec<f32>>>,
    wiedergabe: Arc<Mutex<Vec<f32>>>,
}

struct TestStream {
    format: NegotiatedFormat,
    vorrat: Arc<Mutex<Vec<f32>>>,
    wiedergabe: Arc<Mutex<Vec<f32>>>,
}

impl AudioStream for TestStream {
    fn format(&self) -> &NegotiatedFormat {
        &self.format
    }

    fn read_captured(&mut self, ziel: &mut [f32]) -> usize {
        let mut vorrat = self.vorrat.lock();
        let n = ziel.len().min(vorrat.len());
        for (z, s) in ziel.iter_mut().zip(vorrat.drain(..n)) {
            *z = s;
        }
        n
    }

    fn write_playback(&mut self, samples: &[f32]) -> usize {
        self.wiedergabe.lock().extend_from_slice(samples);
        samples.len()
    }

    fn underruns(&self) -> u64 {
        0
    }

    fn release(&mut self) {}
}

#[async_trait]
impl AudioBackend for TestGeraet {
    async fn acquire(&self, c: &DeviceConstraints) -> AudioResult<Box<dyn AudioStream>> {
        Ok(Box::new(TestStream {
            format: NegotiatedFormat {
                sample_rate: c.sample_rate,
                channels: 1,
                buffer_frames: None,
                echo_cancellation: c.echo_cancellation,
                noise_suppression: c.noise_suppression,
                auto_gain_control: c.auto_gain_control,
                input_name: "test-mikrofon".into(),
                output_name: "test-lautsprecher".into(),
            },
            vorrat: Arc::clone(&self.vorrat),
            wiedergabe: Arc::clone(&self.wiedergabe),
        }))
    }
}

fn session_mit(config: SessionConfig) -> (VoiceSession, tokio::sync::mpsc::UnboundedReceiver<voxlane_transport::MemoryPeer>) {
    let (connector, peers) = MemoryConnector::new();
    let telemetry = TelemetryAggregator::mit_komponenten(
        config.telemetry.clone(),
        voxlane_core::SessionId::new(),
        None,
        vec![Box::new(NoopProbe::new("memory"))],
    )
    .unwrap();
    let s = VoiceSession::mit_telemetrie(config, Arc::new(connector), telemetry).unwrap();
    (s, peers)
}

async fn warten_auf<F>(rx: &mut broadcast::Receiver<SessionEvent>, mut pruefen: F) -> SessionEvent
where
    F: FnMut(&SessionEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let ev = rx.recv().await.unwrap();
            if pruefen(&ev) {
                return ev;
            }
        }
    })
    .await
    .expect("Event nicht rechtzeitig erhalten")
}

#[tokio::test]
async fn mikrofon_zum_endpunkt_und_zurueck() {
    let vorrat = Arc::new(Mutex::new(vec![0.2f32; 512 * 3 + 100]));
    let wiedergabe = Arc::new(Mutex::new(Vec::new()));
    let geraet = TestGeraet {
        vorrat: Arc::clone(&vorrat),
        wiedergabe: Arc::clone(&wiedergabe),
    };

    let (s, mut peers) = session_mit(SessionConfig::default());
    let mut events = s.subscribe();
    s.activate(Some(&geraet as &dyn AudioBackend)).await.unwrap();
    let mut peer = peers.recv().await.unwrap();

    // Drei volle Frames, der Rest bleibt bis zum naechsten Abholen liegen
    assert_eq!(s.pump_capture().await.unwrap(), 3);
    for _ in 0..3 {
        let paket = peer.audio_empfangen().await.unwrap();
        assert_eq!(paket.in_frame().unwrap().len(), 512);
    }

    // Antwort des Endpunkts landet konditioniert in der Wiedergabe
    assert!(peer.audio_senden(&AudioFrame::mono(vec![0.4; 480], 24000), 7).await);
    warten_auf(&mut events, |e| matches!(e, SessionEvent::Playback { .. })).await;
    assert_eq!(wiedergabe.lock().len(), 480);

    let m = s.metrics().await;
    assert_eq!(m.state, ConnectionState::Connected);
    assert_eq!(m.audio.frames_processed, 4);
    assert_eq!(m.connection.messages_sent, 3);

    s.shutdown().await;
    let summary = s.summary();
    assert!(summary.sample_count > 0);
    assert!(summary.audio_quality.is_some());
}

#[tokio::test]
async fn abbruch_fuehrt_zu_wiederverbindung() {
    let mut config = SessionConfig::default();
    config.transport.reconnect_base_delay_ms = 10;
    let (s, mut peers) = session_mit(config);
    let mut events = s.subscribe();
    s.activate(None).await.unwrap();

    let erster = peers.recv().await.unwrap();
    assert!(erster.schliessen(1006).await);

    let ev = warten_auf(&mut events, |e| matches!(e, SessionEvent::Reconnecting { .. })).await;
    assert!(matches!(ev, SessionEvent::Reconnecting { attempt: 1, .. }));

    let _zweiter = tokio::time::timeout(Duration::from_secs(5), peers.recv())
        .await
        .unwrap()
        .unwrap();
    warten_auf(&mut events, |e| {
        matches!(e, SessionEvent::StateChanged(ConnectionState::Connected))
    })
    .await;
    assert_eq!(s.metrics().await.connection.reconnects, 1);
    s.shutdown().await;
}

#[tokio::test]
async fn budget_erschoepft_meldet_verbindungsverlust() {
    let mut config = SessionConfig::default();
    config.transport.reconnect_base_delay_ms = 5;
    config.transport.max_reconnect_attempts = 2;

    let (connector, mut peers) = MemoryConnector::new();
    let telemetry = TelemetryAggregator::mit_komponenten(
        config.telemetry.clone(),
        voxlane_core::SessionId::new(),
        None,
        vec![],
    )
    .unwrap();
    let s = VoiceSession::mit_telemetrie(config, Arc::new(connector.clone()), telemetry).unwrap();
    let mut events = s.subscribe();
    s.activate(None).await.unwrap();

    let peer = peers.recv().await.unwrap();
    connector.fehlschlagen_lassen(10);
    assert!(peer.schliessen(1011).await);

    let ev = warten_auf(&mut events, |e| matches!(e, SessionEvent::ConnectionLost { .. })).await;
    assert!(matches!(ev, SessionEvent::ConnectionLost { attempts: 2 }));
    assert_ne!(s.state(), ConnectionState::Connected);
    s.shutdown().await;
}
