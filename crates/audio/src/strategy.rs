//! Verarbeitungs-Strategien
//!
//! Kleine Frames werden direkt im aufrufenden Task verarbeitet, grosse
//! Frames gehen an einen dedizierten Worker-Thread mit eigener Pipeline.
//! Beide Strategien nutzen dieselbe Konditionierungskette.

use async_trait::async_trait;
use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::Mutex;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::dsp::DspParams;
use crate::error::{AudioError, AudioResult};
use crate::pipeline::{build_conditioning_pipeline, AudioPipeline};

/// Kapazitaet der Job-Queue des Workers
const WORKER_QUEUE_GROESSE: usize = 8;

/// Gemeinsame Schnittstelle fuer Inline- und Worker-Verarbeitung
#[async_trait]
pub trait FrameProcessor: Send + Sync {
    /// Name fuer Logs und Statistik
    fn name(&self) -> &'static str;

    /// Konditioniert einen Frame und gibt Samples gleicher Laenge zurueck
    async fn process(&self, samples: &[f32]) -> AudioResult<Vec<f32>>;
}

// ---------------------------------------------------------------------------
// InlineProcessor
// ---------------------------------------------------------------------------

/// Verarbeitung im aufrufenden Task
pub struct InlineProcessor {
    pipeline: Mutex<AudioPipeline>,
}

impl InlineProcessor {
    pub fn new(params: &DspParams) -> Self {
        Self {
            pipeline: Mutex::new(build_conditioning_pipeline(params)),
        }
    }

    /// Synchrone Verarbeitung ohne Task-Wechsel
    pub fn process_sync(&self, samples: &[f32]) -> Vec<f32> {
        self.pipeline.lock().process_frame(samples)
    }
}

#[async_trait]
impl FrameProcessor for InlineProcessor {
    fn name(&self) -> &'static str {
        "inline"
    }

    async fn process(&self, samples: &[f32]) -> AudioResult<Vec<f32>> {
        Ok(self.process_sync(samples))
    }
}

// ---------------------------------------------------------------------------
// WorkerProcessor
// ---------------------------------------------------------------------------

struct WorkerJob {
    samples: Vec<f32>,
    antwort: oneshot::Sender<Vec<f32>>,
}

/// Verarbeitung in einem dedizierten OS-Thread
///
/// Der Thread besitzt eine eigene Pipeline. Jobs laufen ueber einen
/// begrenzten crossbeam-Kanal, Antworten ueber einen oneshot-Kanal.
pub struct WorkerProcessor {
    job_tx: Mutex<Option<Sender<WorkerJob>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    timeout: Duration,
}

impl WorkerProcessor {
    /// Startet den Worker-Thread
    pub fn starten(params: &DspParams, timeout: Duration) -> AudioResult<Self> {
        let (job_tx, job_rx) = bounded::<WorkerJob>(WORKER_QUEUE_GROESSE);
        let params = *params;

        let thread = std::thread::Builder::new()
            .name("voxlane-audio-worker".into())
            .spawn(move || {
                let mut pipeline = build_conditioning_pipeline(&params);
                debug!("Audio-Worker gestartet");
                while let Ok(mut job) = job_rx.recv() {
                    pipeline.process_in_place(&mut job.samples);
                    // Empfaenger kann nach Timeout bereits weg sein
                    let _ = job.antwort.send(job.samples);
                }
                debug!("Audio-Worker beendet");
            })
            .map_err(|e| AudioError::WorkerFehler(format!("Thread-Start fehlgeschlagen: {e}")))?;

        Ok(Self {
            job_tx: Mutex::new(Some(job_tx)),
            thread: Mutex::new(Some(thread)),
            timeout,
        })
    }

    /// Gibt zurueck ob der Worker noch Jobs annimmt
    pub fn is_running(&self) -> bool {
        self.job_tx.lock().is_some()
    }

    /// Beendet den Worker-Thread (idempotent)
    pub fn stoppen(&self) {
        // Sender droppen beendet die recv-Schleife
        let tx = self.job_tx.lock().take();
        drop(tx);
        if let Some(handle) = self.thread.lock().take() {
            if handle.join().is_err() {
                warn!("Audio-Worker mit Panic beendet");
            }
        }
    }
}

#[async_trait]
impl FrameProcessor for WorkerProcessor {
    fn name(&self) -> &'static str {
        "worker"
    }

    async fn process(&self, samples: &[f32]) -> AudioResult<Vec<f32>> {
        let tx = self
            .job_tx
            .lock()
            .clone()
            .ok_or_else(|| AudioError::WorkerFehler("Worker gestoppt".into()))?;

        let (antwort_tx, antwort_rx) = oneshot::channel();
        let job = WorkerJob {
            samples: samples.to_vec(),
            antwort: antwort_tx,
        };
        match tx.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                return Err(AudioError::WorkerFehler("Job-Queue voll".into()))
            }
            Err(TrySendError::Disconnected(_)) => {
                return Err(AudioError::WorkerFehler("Worker-Thread beendet".into()))
            }
        }

        match tokio::time::timeout(self.timeout, antwort_rx).await {
            Ok(Ok(verarbeitet)) if verarbeitet.len() == samples.len() => Ok(verarbeitet),
            Ok(Ok(verarbeitet)) => Err(AudioError::WorkerFehler(format!(
                "Laenge geaendert: {} -> {}",
                samples.len(),
                verarbeitet.len()
            ))),
            Ok(Err(_)) => Err(AudioError::WorkerFehler("Antwortkanal geschlossen".into())),
            Err(_) => Err(AudioError::WorkerFehler(format!(
                "Keine Antwort nach {:?}",
                self.timeout
            ))),
        }
    }
}

impl Drop for WorkerProcessor {
    fn drop(&mut self) {
        self.stoppen();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(len: usize) -> Vec<f32> {
        (0..len).map(|i| ((i as f32) * 0.07).sin() * 1.2).collect()
    }

    #[tokio::test]
    async fn inline_und_worker_liefern_gleiches_ergebnis() {
        let params = DspParams::default();
        let inline = InlineProcessor::new(&params);
        let worker = WorkerProcessor::starten(&params, Duration::from_secs(1)).unwrap();

        let input = signal(2048);
        let a = inline.process(&input).await.unwrap();
        let b = worker.process(&input).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(b.len(), 2048);
    }

    #[tokio::test]
    async fn gestoppter_worker_liefert_fehler() {
        let worker =
            WorkerProcessor::starten(&DspParams::default(), Duration::from_secs(1)).unwrap();
        worker.stoppen();
        assert!(!worker.is_running());
        let result = worker.process(&signal(16)).await;
        assert!(matches!(result, Err(AudioError::WorkerFehler(_))));
        // Zweites Stoppen ist harmlos
        worker.stoppen();
    }

    #[tokio::test]
    async fn namen() {
        let params = DspParams::default();
        assert_eq!(InlineProcessor::new(&params).name(), "inline");
        let worker = WorkerProcessor::starten(&params, Duration::from_secs(1)).unwrap();
        assert_eq!(worker.name(), "worker");
    }
}
