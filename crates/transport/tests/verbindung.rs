//! Ende-zu-Ende-Szenarien des Transports ueber den In-Memory-Connector

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use voxlane_core::types::ConnectionState;
use voxlane_core::SammelRecorder;
use voxlane_protocol::{jetzt_ms, Envelope, MessageKind};
use voxlane_transport::{
    MemoryConnector, Priority, TransportConfig, TransportError, TransportEvent, TransportOptimizer,
};

const URL: &str = "ws://127.0.0.1:0/voice";

async fn warte_auf(rx: &mut broadcast::Receiver<TransportEvent>, ziel: ConnectionState) {
    let ergebnis = tokio::time::timeout(Duration::from_secs(120), async {
        loop {
            match rx.recv().await {
                Ok(TransportEvent::StateChanged(s)) if s == ziel => return,
                Ok(_) => {}
                Err(e) => panic!("Event-Kanal: {e}"),
            }
        }
    })
    .await;
    assert!(ergebnis.is_ok(), "Zustand {ziel} nicht erreicht");
}

#[tokio::test(start_paused = true)]
async fn high_nachricht_ueberlebt_verbindungsabbruch() {
    let (connector, mut peers) = MemoryConnector::new();
    let t = TransportOptimizer::new(TransportConfig::default(), Arc::new(connector.clone()));
    let mut events = t.subscribe();

    t.connect(URL).await.unwrap();
    let erster = peers.recv().await.unwrap();

    // Abbruch: waehrend des Backoffs wird eine High-Nachricht abgesetzt
    erster.schliessen(1006).await;
    warte_auf(&mut events, ConnectionState::Error).await;
    let result = t.send(json!({ "op": "barge_in" }), Priority::High).await;
    assert!(matches!(result, Err(TransportError::NotConnected)));
    assert_eq!(t.queue_len(), 1);

    warte_auf(&mut events, ConnectionState::Connected).await;
    assert_eq!(t.queue_len(), 0);

    let t2 = t.clone();
    let neu = tokio::spawn(async move { t2.send(json!({ "op": "weiter" }), Priority::Normal).await });

    let mut zweiter = peers.recv().await.unwrap();
    let erste = zweiter.envelope_empfangen().await.unwrap();
    assert_eq!(erste.payload["op"], "barge_in", "Queue wird zuerst geleert");
    let zweite = zweiter.envelope_empfangen().await.unwrap();
    assert_eq!(zweite.payload["op"], "weiter");
    zweiter
        .envelope_senden(Envelope::response(zweite.id.unwrap(), json!({ "ok": true })))
        .await;

    let antwort = neu.await.unwrap().unwrap();
    assert_eq!(antwort.kind, MessageKind::Response);
    assert_eq!(connector.versuche(), 2);
    assert_eq!(t.metrics().reconnects, 1);
}

#[tokio::test]
async fn latenz_wird_an_recorder_gemeldet() {
    let (connector, mut peers) = MemoryConnector::new();
    let recorder = Arc::new(SammelRecorder::new());
    let t = TransportOptimizer::mit_recorder(
        TransportConfig::default(),
        Arc::new(connector),
        recorder.clone(),
    );
    let mut events = t.subscribe();
    t.connect(URL).await.unwrap();
    let peer = peers.recv().await.unwrap();

    peer.envelope_senden(Envelope::new(MessageKind::Generic, json!({})).mit_timestamp(jetzt_ms() - 50))
        .await;
    loop {
        if let Ok(TransportEvent::Message(_)) = events.recv().await {
            break;
        }
    }

    let werte = recorder.werte("transport.latency_ms");
    assert_eq!(werte.len(), 1);
    assert_eq!(werte[0], t.metrics().latency_ms);
}

#[tokio::test]
async fn disconnect_ist_idempotent() {
    let (connector, _peers) = MemoryConnector::new();
    let t = TransportOptimizer::new(TransportConfig::default(), Arc::new(connector));
    t.disconnect();
    t.disconnect();
    assert_eq!(t.state(), ConnectionState::Disconnected);
}
