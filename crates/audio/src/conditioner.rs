//! AudioConditioner – Zentrale Steuerung der Audio-Konditionierung
//!
//! Verbindet Geraete-Zugriff, Verarbeitungs-Strategie, Qualitaets-Score
//! und adaptive Puffergroesse. Jeder Frame wird genau einmal und
//! vollstaendig verarbeitet; die Ausgabe hat immer die gleiche Laenge
//! wie die Eingabe.

use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use voxlane_core::config::OptimizationConfig;
use voxlane_core::frame::AudioFrame;
use voxlane_core::recorder::MetricRecorder;

use crate::device::{AudioBackend, AudioStream, DeviceConstraints, NegotiatedFormat};
use crate::dsp::DspParams;
use crate::error::{AudioError, AudioResult};
use crate::quality::quality_score;
use crate::strategy::{FrameProcessor, InlineProcessor, WorkerProcessor};
use crate::tuner::BufferTuner;

/// Welcher Pfad einen Frame verarbeitet hat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerarbeitungsPfad {
    Inline,
    Worker,
}

impl VerarbeitungsPfad {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inline => "inline",
            Self::Worker => "worker",
        }
    }
}

/// Ergebnis eines konditionierten Frames
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    /// Konditionierte Samples (gleiche Laenge wie die Eingabe)
    pub frame: AudioFrame,
    /// Verarbeitungsdauer
    pub latency: Duration,
    /// Qualitaets-Score in [0, 1]
    pub quality: f32,
    /// Verarbeitungspfad
    pub pfad: VerarbeitungsPfad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Richtung {
    Capture,
    Wiedergabe,
}

impl Richtung {
    /// Metriknamen fuer Verarbeitungszeit und Qualitaet
    fn metriken(self) -> (&'static str, &'static str) {
        match self {
            Self::Capture => ("audio.processing_ms", "audio.quality"),
            Self::Wiedergabe => ("audio.playback_ms", "audio.playback_quality"),
        }
    }
}

/// Statistiken des Conditioners
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConditionerStats {
    /// Anzahl verarbeiteter Frames seit Start (Capture + Wiedergabe)
    pub frames_processed: u64,
    /// Davon im Worker verarbeitet
    pub worker_frames: u64,
    /// Rueckfaelle auf Inline-Verarbeitung nach Worker-Fehler
    pub worker_fallbacks: u64,
    /// Anzahl Wiedergabe-Frames
    pub playback_frames: u64,
    /// Verworfene Wiedergabe-Samples (Puffer voll)
    pub playback_dropped: u64,
    /// Gesamtzahl gemeldeter Underruns
    pub underruns: u64,
    /// Aktuelle Puffergroesse
    pub buffer_size: usize,
    /// Latenz des letzten Capture-Frames in Millisekunden
    pub last_latency_ms: f64,
    /// Qualitaet des letzten Capture-Frames
    pub last_quality: f32,
}

/// Audio-Conditioner einer Session
///
/// Nicht `Clone`: gehoert genau einer Session. Verarbeitungsfunktionen
/// nehmen `&mut self`, damit Frames strikt nacheinander laufen.
pub struct AudioConditioner {
    config: OptimizationConfig,
    inline: InlineProcessor,
    worker: Option<WorkerProcessor>,
    stream: Option<Box<dyn AudioStream>>,
    tuner: BufferTuner,
    recorder: Arc<dyn MetricRecorder>,
    stats: ConditionerStats,
    init_timeout: Duration,
    capture_rest: Vec<f32>,
    gemeldete_underruns: u64,
    freigegeben: bool,
}

impl AudioConditioner {
    /// Erstellt einen Conditioner (ohne Geraete)
    ///
    /// Startet den Worker-Thread wenn `worker_offload` aktiv ist.
    pub fn new(config: OptimizationConfig, recorder: Arc<dyn MetricRecorder>) -> AudioResult<Self> {
        config
            .pruefen()
            .map_err(|e| AudioError::Konfiguration(e.to_string()))?;

        let params = DspParams::aus_config(&config);
        let budget = Duration::from_millis(config.target_latency_ms as u64);

        let worker = if config.worker_offload {
            match WorkerProcessor::starten(&params, budget) {
                Ok(w) => Some(w),
                Err(e) => {
                    warn!("Worker nicht verfuegbar, nur Inline-Verarbeitung: {}", e);
                    None
                }
            }
        } else {
            None
        };

        info!(
            buffer_size = config.buffer_size,
            sample_rate = config.sample_rate,
            worker = worker.is_some(),
            "AudioConditioner initialisiert"
        );

        let stats = ConditionerStats {
            buffer_size: config.buffer_size,
            ..Default::default()
        };

        Ok(Self {
            inline: InlineProcessor::new(&params),
            worker,
            stream: None,
            tuner: BufferTuner::new(),
            recorder,
            stats,
            init_timeout: crate::capture::INIT_TIMEOUT,
            capture_rest: Vec::new(),
            gemeldete_underruns: 0,
            freigegeben: false,
            config,
        })
    }

    /// Setzt den Timeout fuer `initialize` (Builder)
    pub fn mit_init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout = timeout;
        self
    }

    /// Aktuelle Konfiguration
    pub fn config(&self) -> &OptimizationConfig {
        &self.config
    }

    /// Aktuelle Puffergroesse
    pub fn buffer_size(&self) -> usize {
        self.config.buffer_size
    }

    /// Gibt zurueck ob Geraete geoeffnet sind
    pub fn is_initialized(&self) -> bool {
        self.stream.is_some()
    }

    /// Gibt zurueck ob ein Worker-Thread laeuft
    pub fn hat_worker(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| w.is_running())
    }

    /// Ausgehandeltes Geraete-Format (falls initialisiert)
    pub fn format(&self) -> Option<&NegotiatedFormat> {
        self.stream.as_ref().map(|s| s.format())
    }

    /// Oeffnet die Audio-Geraete
    ///
    /// # Fehler
    /// - `DeviceUnavailable` wenn das Backend kein Geraet liefert
    /// - `InitializationTimeout` wenn das Oeffnen zu lange dauert
    pub async fn initialize(&mut self, backend: &dyn AudioBackend) -> AudioResult<NegotiatedFormat> {
        if self.freigegeben {
            return Err(AudioError::Freigegeben);
        }
        if let Some(mut alt) = self.stream.take() {
            debug!("Geraete bereits offen, werden neu geoeffnet");
            alt.release();
        }

        let vorgaben = DeviceConstraints::aus_config(&self.config);
        let stream = tokio::time::timeout(self.init_timeout, backend.acquire(&vorgaben))
            .await
            .map_err(|_| AudioError::InitializationTimeout(self.init_timeout))??;

        let format = stream.format().clone();
        self.gemeldete_underruns = stream.underruns();
        self.stream = Some(stream);
        info!(sample_rate = format.sample_rate, "Audio-Geraete bereit");
        Ok(format)
    }

    /// Liest einen vollen Capture-Frame (`buffer_size` Samples)
    ///
    /// `None` solange noch nicht genug Samples aufgenommen wurden oder
    /// keine Geraete offen sind.
    pub fn capture_frame(&mut self) -> Option<AudioFrame> {
        let ziel = self.config.buffer_size;
        let stream = self.stream.as_mut()?;

        let vorhanden = self.capture_rest.len();
        if vorhanden < ziel {
            self.capture_rest.resize(ziel, 0.0);
            let gelesen = stream.read_captured(&mut self.capture_rest[vorhanden..]);
            self.capture_rest.truncate(vorhanden + gelesen);
        }
        if self.capture_rest.len() < ziel {
            return None;
        }

        let rest = self.capture_rest.split_off(ziel);
        let samples = std::mem::replace(&mut self.capture_rest, rest);
        Some(AudioFrame::mono(samples, stream.format().sample_rate))
    }

    /// Konditioniert einen Capture-Frame vor dem Senden
    pub async fn process(&mut self, frame: AudioFrame) -> AudioResult<ProcessedFrame> {
        self.konditionieren(frame, Richtung::Capture).await
    }

    async fn konditionieren(&mut self, frame: AudioFrame, richtung: Richtung) -> AudioResult<ProcessedFrame> {
        if self.freigegeben {
            return Err(AudioError::Freigegeben);
        }
        let start = Instant::now();
        let laenge = frame.len();

        let (samples, pfad) = match self.worker.as_ref() {
            Some(worker) if laenge > self.config.offload_cutoff && worker.is_running() => {
                match worker.process(&frame.samples).await {
                    Ok(samples) => (samples, VerarbeitungsPfad::Worker),
                    Err(e) => {
                        warn!("Worker-Verarbeitung fehlgeschlagen, Inline-Rueckfall: {}", e);
                        self.stats.worker_fallbacks += 1;
                        (self.inline.process(&frame.samples).await?, VerarbeitungsPfad::Inline)
                    }
                }
            }
            _ => (self.inline.process(&frame.samples).await?, VerarbeitungsPfad::Inline),
        };

        let latency = start.elapsed();
        let quality = quality_score(&samples);

        let latenz_ms = latency.as_secs_f64() * 1000.0;

        self.stats.frames_processed += 1;
        if pfad == VerarbeitungsPfad::Worker {
            self.stats.worker_frames += 1;
        }
        // Nur Capture-Zeiten steuern die Puffergroesse
        if richtung == Richtung::Capture {
            self.tuner.verarbeitung_melden(latency);
            self.stats.last_latency_ms = latenz_ms;
            self.stats.last_quality = quality;
        }

        let (zeit_metrik, qualitaets_metrik) = richtung.metriken();
        self.recorder.record(
            zeit_metrik,
            latenz_ms,
            Some(json!({ "pfad": pfad.as_str(), "samples": laenge })),
        );
        self.recorder.record(qualitaets_metrik, quality as f64, None);

        if latency.as_millis() > self.config.target_latency_ms as u128 {
            warn!(
                latenz_ms,
                richtung = ?richtung,
                budget_ms = self.config.target_latency_ms,
                "Verarbeitung ueber Latenzbudget"
            );
        }

        Ok(ProcessedFrame {
            frame: frame.mit_samples(samples),
            latency,
            quality,
            pfad,
        })
    }

    /// Konditioniert einen empfangenen Frame und gibt ihn wieder
    ///
    /// Ohne geoeffnete Geraete wird nur konditioniert.
    pub async fn process_playback(&mut self, frame: AudioFrame) -> AudioResult<ProcessedFrame> {
        let verarbeitet = self.konditionieren(frame, Richtung::Wiedergabe).await?;
        self.stats.playback_frames += 1;

        if let Some(stream) = self.stream.as_mut() {
            let samples = &verarbeitet.frame.samples;
            let geschrieben = stream.write_playback(samples);
            if geschrieben < samples.len() {
                let verworfen = (samples.len() - geschrieben) as u64;
                self.stats.playback_dropped += verworfen;
                debug!("Wiedergabe-Puffer voll, {} Samples verworfen", verworfen);
            }
        }
        self.underruns_abgleichen();
        Ok(verarbeitet)
    }

    /// Meldet einen Wiedergabe-Underrun von aussen
    pub fn report_underrun(&mut self) {
        self.tuner.underrun_melden(Instant::now());
        self.stats.underruns = self.tuner.underruns_gesamt();
    }

    /// Passt die Puffergroesse an Underruns und Verarbeitungszeit an
    ///
    /// Gibt die (ggf. neue) Puffergroesse zurueck.
    pub fn optimize_buffer_size(&mut self) -> usize {
        self.underruns_abgleichen();
        let aktuell = self.config.buffer_size;
        let neu = self.tuner.optimieren(
            aktuell,
            self.config.target_latency_ms as f64,
            Instant::now(),
        );
        if neu != aktuell {
            info!(alt = aktuell, neu, "Puffergroesse angepasst");
            self.config.buffer_size = neu;
            self.stats.buffer_size = neu;
            self.recorder.record(
                "audio.buffer_size",
                neu as f64,
                Some(json!({ "vorher": aktuell })),
            );
        }
        neu
    }

    /// Aktuelle Statistiken
    pub fn stats(&self) -> ConditionerStats {
        self.stats.clone()
    }

    /// Gibt Geraete und Worker frei (idempotent)
    pub fn dispose(&mut self) {
        if self.freigegeben {
            return;
        }
        self.freigegeben = true;
        if let Some(mut stream) = self.stream.take() {
            stream.release();
        }
        if let Some(worker) = self.worker.take() {
            worker.stoppen();
        }
        self.capture_rest.clear();
        info!(
            frames = self.stats.frames_processed,
            underruns = self.stats.underruns,
            "AudioConditioner freigegeben"
        );
    }

    /// Gibt zurueck ob `dispose` bereits aufgerufen wurde
    pub fn is_disposed(&self) -> bool {
        self.freigegeben
    }

    // Uebernimmt neue Underruns des Geraete-Streams in den Tuner
    fn underruns_abgleichen(&mut self) {
        let Some(stream) = self.stream.as_ref() else {
            return;
        };
        let gesamt = stream.underruns();
        if gesamt > self.gemeldete_underruns {
            let jetzt = Instant::now();
            for _ in self.gemeldete_underruns..gesamt {
                self.tuner.underrun_melden(jetzt);
            }
            self.gemeldete_underruns = gesamt;
            self.stats.underruns = self.tuner.underruns_gesamt();
        }
    }
}

impl Drop for AudioConditioner {
    fn drop(&mut self) {
        self.dispose();
    }
}
