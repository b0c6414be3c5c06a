//! Voxlane – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und fuehrt eine
//! Sprach-Session mit den Standard-Audiogeraeten gegen den konfigurierten
//! Endpunkt aus. Ctrl-C beendet die Session und gibt die Bewertung aus.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::broadcast;
use voxlane_audio::{AudioBackend, CpalBackend};
use voxlane_session::{SessionConfig, SessionEvent, VoiceSession};
use voxlane_transport::WebSocketConnector;

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var("VOXLANE_CONFIG").unwrap_or_else(|_| "voxlane.toml".into());

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let config = SessionConfig::laden(&config_pfad)?;

    voxlane_observability::logging_initialisieren(&config.logging.level, &config.logging.format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        endpunkt = %config.endpunkt.url,
        "Voxlane wird initialisiert"
    );

    let capture_takt = config.endpunkt.capture_interval();
    let session = Arc::new(VoiceSession::new(config, Arc::new(WebSocketConnector::new()))?);

    let protokoll = tokio::spawn(events_protokollieren(session.subscribe()));

    let backend = CpalBackend::new();
    session.activate(Some(&backend as &dyn AudioBackend)).await?;

    let capture = {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            let mut takt = tokio::time::interval(capture_takt);
            loop {
                takt.tick().await;
                if let Err(e) = session.pump_capture().await {
                    tracing::warn!(fehler = %e, "Capture abgebrochen");
                    return;
                }
            }
        })
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("Beende Session...");

    capture.abort();
    protokoll.abort();
    session.shutdown().await;

    let summary = session.summary();
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn events_protokollieren(mut rx: broadcast::Receiver<SessionEvent>) {
    loop {
        match rx.recv().await {
            Ok(SessionEvent::StateChanged(state)) => tracing::info!(?state, "Verbindungszustand"),
            Ok(SessionEvent::Transcription { text, is_final }) => {
                tracing::info!(is_final, text = %text, "Transkript")
            }
            Ok(SessionEvent::RemoteError { message }) => tracing::warn!(meldung = %message, "Endpunkt-Fehler"),
            Ok(SessionEvent::Reconnecting { attempt, delay }) => {
                tracing::info!(versuch = attempt, ?delay, "Wiederverbindung geplant")
            }
            Ok(SessionEvent::ConnectionLost { attempts }) => {
                tracing::error!(versuche = attempts, "Verbindung verloren, Ctrl-C zum Beenden")
            }
            Ok(SessionEvent::BufferResized { size }) => tracing::info!(groesse = size, "Puffer angepasst"),
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(n)) => tracing::debug!(verpasst = n, "Events verpasst"),
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}
