//! Geraete-Zugriff via cpal
//!
//! cpal-Streams sind nicht `Send`. Sie leben deshalb in einem eigenen
//! Geraete-Thread, der nach dem Oeffnen nur noch auf das Stop-Signal
//! wartet. Daten fliessen ueber lock-free Ring-Buffer:
//! Capture-Callback -> Consumer, Writer -> Playback-Callback.

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BufferSize, Device, SampleFormat, Stream, StreamConfig, SupportedBufferSize,
    SupportedStreamConfigRange,
};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::device::{AudioBackend, AudioStream, DeviceConstraints, NegotiatedFormat};
use crate::error::{AudioError, AudioResult};
use crate::playback::{playback_puffer, PlaybackReader, PlaybackWriter};

/// Standard-Timeout fuer die Geraete-Initialisierung
pub const INIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Ring-Buffer-Kapazitaet in Sekunden Audio
const PUFFER_SEKUNDEN: usize = 2;

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// cpal-basiertes Audio-Backend (Standard-Host der Plattform)
#[derive(Debug, Clone)]
pub struct CpalBackend {
    init_timeout: Duration,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self {
            init_timeout: INIT_TIMEOUT,
        }
    }

    /// Setzt den Timeout fuer das Oeffnen der Geraete
    pub fn mit_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout = timeout;
        self
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioBackend for CpalBackend {
    async fn acquire(&self, constraints: &DeviceConstraints) -> AudioResult<Box<dyn AudioStream>> {
        let (bereit_tx, bereit_rx) = oneshot::channel::<AudioResult<CpalTeile>>();
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let vorgaben = constraints.clone();

        let thread = std::thread::Builder::new()
            .name("voxlane-audio-geraete".into())
            .spawn(move || match geraete_oeffnen(&vorgaben) {
                Ok((streams, teile)) => {
                    if bereit_tx.send(Ok(teile)).is_err() {
                        debug!("Geraete-Initialisierung verworfen (Timeout)");
                        return;
                    }
                    // Blockiert bis Stop-Signal oder Sender gedroppt
                    let _ = stop_rx.recv();
                    drop(streams);
                    debug!("Audio-Geraete freigegeben");
                }
                Err(e) => {
                    let _ = bereit_tx.send(Err(e));
                }
            })
            .map_err(|e| AudioError::StreamFehler(format!("Geraete-Thread: {e}")))?;

        match tokio::time::timeout(self.init_timeout, bereit_rx).await {
            Ok(Ok(Ok(teile))) => {
                info!(
                    eingabe = %teile.format.input_name,
                    ausgabe = %teile.format.output_name,
                    sample_rate = teile.format.sample_rate,
                    "Audio-Geraete geoeffnet"
                );
                Ok(Box::new(CpalStream {
                    format: teile.format,
                    capture: teile.capture,
                    playback: teile.playback,
                    stop_tx: Some(stop_tx),
                    thread: Some(thread),
                }))
            }
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(AudioError::DeviceUnavailable(
                "Geraete-Thread unerwartet beendet".into(),
            )),
            Err(_) => {
                // Thread beendet sich nach spaeter Initialisierung selbst
                drop(stop_tx);
                Err(AudioError::InitializationTimeout(self.init_timeout))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Stream-Handle
// ---------------------------------------------------------------------------

/// Send-Anteile die aus dem Geraete-Thread zurueckkommen
struct CpalTeile {
    format: NegotiatedFormat,
    capture: HeapCons<f32>,
    playback: PlaybackWriter,
}

struct CpalStream {
    format: NegotiatedFormat,
    capture: HeapCons<f32>,
    playback: PlaybackWriter,
    stop_tx: Option<crossbeam_channel::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl AudioStream for CpalStream {
    fn format(&self) -> &NegotiatedFormat {
        &self.format
    }

    fn read_captured(&mut self, ziel: &mut [f32]) -> usize {
        self.capture.pop_slice(ziel)
    }

    fn write_playback(&mut self, samples: &[f32]) -> usize {
        self.playback.schreiben(samples)
    }

    fn underruns(&self) -> u64 {
        self.playback.underruns()
    }

    fn release(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                warn!("Geraete-Thread mit Panic beendet");
            }
        }
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        self.release();
    }
}

// ---------------------------------------------------------------------------
// Geraete oeffnen (laeuft im Geraete-Thread)
// ---------------------------------------------------------------------------

/// Ausgewaehlte Stream-Parameter eines Geraets
#[derive(Debug, Clone, Copy)]
struct Auswahl {
    sample_rate: u32,
    channels: u16,
    sample_format: SampleFormat,
    buffer_frames: Option<u32>,
}

impl Auswahl {
    fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            channels: self.channels,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: match self.buffer_frames {
                Some(frames) => BufferSize::Fixed(frames),
                None => BufferSize::Default,
            },
        }
    }
}

fn geraete_oeffnen(c: &DeviceConstraints) -> AudioResult<(Vec<Stream>, CpalTeile)> {
    let host = cpal::default_host();
    let eingabe = geraet_laden(&host, c.input_device.as_deref(), true)?;
    let ausgabe = geraet_laden(&host, c.output_device.as_deref(), false)?;

    let eingabe_cfgs: Vec<_> = eingabe
        .supported_input_configs()
        .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?
        .collect();
    let ein = auswaehlen(&eingabe_cfgs, c.sample_rate, c)
        .ok_or_else(|| AudioError::DeviceUnavailable("Keine Eingabe-Konfiguration".into()))?;

    let ausgabe_cfgs: Vec<_> = ausgabe
        .supported_output_configs()
        .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?
        .collect();
    let aus = auswaehlen(&ausgabe_cfgs, ein.sample_rate, c)
        .ok_or_else(|| AudioError::DeviceUnavailable("Keine Ausgabe-Konfiguration".into()))?;

    if ein.sample_rate != c.sample_rate {
        warn!(
            gewuenscht = c.sample_rate,
            ausgehandelt = ein.sample_rate,
            "Abtastrate vom Geraet vorgegeben"
        );
    }
    if aus.sample_rate != ein.sample_rate {
        warn!(
            eingabe = ein.sample_rate,
            ausgabe = aus.sample_rate,
            "Ein- und Ausgabe mit unterschiedlicher Abtastrate"
        );
    }

    let kapazitaet = ein.sample_rate as usize * PUFFER_SEKUNDEN;
    let (capture_prod, capture_cons) = HeapRb::<f32>::new(kapazitaet).split();
    let (writer, reader) = playback_puffer(kapazitaet);

    let capture_stream = capture_stream_bauen(&eingabe, ein, capture_prod)?;
    let playback_stream = playback_stream_bauen(&ausgabe, aus, reader)?;

    for stream in [&capture_stream, &playback_stream] {
        stream
            .play()
            .map_err(|e| AudioError::StreamFehler(e.to_string()))?;
    }

    // cpal bietet keine Plattform-Verarbeitung (AEC/NS/AGC) an
    if c.echo_cancellation || c.noise_suppression || c.auto_gain_control {
        debug!("Plattform-Audioverarbeitung nicht verfuegbar, nur eigene Konditionierung aktiv");
    }

    let format = NegotiatedFormat {
        sample_rate: ein.sample_rate,
        channels: 1,
        buffer_frames: ein.buffer_frames,
        echo_cancellation: false,
        noise_suppression: false,
        auto_gain_control: false,
        input_name: eingabe.name().unwrap_or_default(),
        output_name: ausgabe.name().unwrap_or_default(),
    };

    Ok((
        vec![capture_stream, playback_stream],
        CpalTeile {
            format,
            capture: capture_cons,
            playback: writer,
        },
    ))
}

/// Laedt ein cpal-Device anhand des Namens (None = Standard)
fn geraet_laden(host: &cpal::Host, name: Option<&str>, eingabe: bool) -> AudioResult<Device> {
    let richtung = if eingabe { "Eingabe" } else { "Ausgabe" };
    match name {
        None => {
            let standard = if eingabe {
                host.default_input_device()
            } else {
                host.default_output_device()
            };
            standard.ok_or_else(|| {
                AudioError::DeviceUnavailable(format!("Kein Standard-{richtung}geraet"))
            })
        }
        Some(n) => {
            let geraete: Vec<Device> = if eingabe {
                host.input_devices()
                    .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?
                    .collect()
            } else {
                host.output_devices()
                    .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?
                    .collect()
            };
            geraete
                .into_iter()
                .find(|d| d.name().map(|dn| dn.contains(n)).unwrap_or(false))
                .ok_or_else(|| {
                    AudioError::DeviceUnavailable(format!("{richtung}geraet '{n}' nicht gefunden"))
                })
        }
    }
}

/// Waehlt eine Konfiguration passend zu Abtastrate und Kanalzahl
///
/// Bevorzugt exakte Kanalzahl, sonst die kleinste verfuegbare. Ohne
/// passende Abtastrate wird die hoechste Rate der ersten Konfiguration
/// genommen.
fn auswaehlen(
    konfigurationen: &[SupportedStreamConfigRange],
    sample_rate: u32,
    c: &DeviceConstraints,
) -> Option<Auswahl> {
    let unterstuetzt = |k: &&SupportedStreamConfigRange| {
        matches!(
            k.sample_format(),
            SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U8
        )
    };
    let passt_rate = |k: &&SupportedStreamConfigRange| {
        k.min_sample_rate().0 <= sample_rate && k.max_sample_rate().0 >= sample_rate
    };

    let gewaehlt = konfigurationen
        .iter()
        .filter(unterstuetzt)
        .filter(passt_rate)
        .min_by_key(|k| (k.channels() != c.channels, k.channels()));

    let (konfig, rate) = match gewaehlt {
        Some(k) => (k, sample_rate),
        None => {
            let k = konfigurationen.iter().find(unterstuetzt)?;
            (k, k.max_sample_rate().0)
        }
    };

    let buffer_frames = match konfig.buffer_size() {
        SupportedBufferSize::Range { min, max } => Some(c.latenz_frames().clamp(*min, *max)),
        SupportedBufferSize::Unknown => None,
    };

    Some(Auswahl {
        sample_rate: rate,
        channels: konfig.channels(),
        sample_format: konfig.sample_format(),
        buffer_frames,
    })
}

fn stream_fehler(e: cpal::BuildStreamError) -> AudioError {
    match e {
        cpal::BuildStreamError::DeviceNotAvailable => {
            AudioError::DeviceUnavailable("Geraet nicht mehr verfuegbar".into())
        }
        andere => AudioError::StreamFehler(andere.to_string()),
    }
}

fn capture_stream_bauen(
    geraet: &Device,
    auswahl: Auswahl,
    producer: HeapProd<f32>,
) -> AudioResult<Stream> {
    let config = auswahl.stream_config();
    let kanaele = auswahl.channels.max(1) as usize;
    let err_fn = |err| error!("Capture-Fehler: {}", err);

    match auswahl.sample_format {
        SampleFormat::F32 => geraet.build_input_stream(
            &config,
            capture_callback(producer, kanaele, |s: f32| s),
            err_fn,
            None,
        ),
        SampleFormat::I16 => geraet.build_input_stream(
            &config,
            capture_callback(producer, kanaele, |s: i16| s as f32 / i16::MAX as f32),
            err_fn,
            None,
        ),
        SampleFormat::U8 => geraet.build_input_stream(
            &config,
            capture_callback(producer, kanaele, |s: u8| (s as f32 - 128.0) / 128.0),
            err_fn,
            None,
        ),
        andere => {
            return Err(AudioError::StreamFehler(format!(
                "Nicht unterstuetztes Sample-Format: {:?}",
                andere
            )))
        }
    }
    .map_err(stream_fehler)
}

fn playback_stream_bauen(
    geraet: &Device,
    auswahl: Auswahl,
    reader: PlaybackReader,
) -> AudioResult<Stream> {
    let config = auswahl.stream_config();
    let kanaele = auswahl.channels.max(1) as usize;
    let err_fn = |err| error!("Playback-Fehler: {}", err);

    match auswahl.sample_format {
        SampleFormat::F32 => geraet.build_output_stream(
            &config,
            playback_callback(reader, kanaele, |s: f32| s),
            err_fn,
            None,
        ),
        SampleFormat::I16 => geraet.build_output_stream(
            &config,
            playback_callback(reader, kanaele, |s: f32| {
                (s * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16
            }),
            err_fn,
            None,
        ),
        SampleFormat::U8 => geraet.build_output_stream(
            &config,
            playback_callback(reader, kanaele, |s: f32| {
                (s * 128.0 + 128.0).clamp(0.0, 255.0) as u8
            }),
            err_fn,
            None,
        ),
        andere => {
            return Err(AudioError::StreamFehler(format!(
                "Nicht unterstuetztes Sample-Format: {:?}",
                andere
            )))
        }
    }
    .map_err(stream_fehler)
}

/// Capture-Callback: Downmix auf Mono, dann in den Ring-Buffer
fn capture_callback<T: Copy + Send + 'static>(
    mut producer: HeapProd<f32>,
    kanaele: usize,
    wandeln: fn(T) -> f32,
) -> impl FnMut(&[T], &cpal::InputCallbackInfo) + Send + 'static {
    let mut mono = Vec::new();
    move |data: &[T], _| {
        mono.clear();
        mono.extend(downmix(data, kanaele, wandeln));
        let geschrieben = producer.push_slice(&mono);
        if geschrieben < mono.len() {
            warn!(
                "Capture Ring-Buffer voll, {} Samples verworfen",
                mono.len() - geschrieben
            );
        }
    }
}

/// Playback-Callback: Mono aus dem Puffer auf alle Kanaele verteilen
fn playback_callback<T: Copy + Send + 'static>(
    mut reader: PlaybackReader,
    kanaele: usize,
    wandeln: fn(f32) -> T,
) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static {
    let mut mono = Vec::new();
    move |data: &mut [T], _| {
        mono.resize(data.len() / kanaele, 0.0);
        reader.fuellen(&mut mono);
        for (frame, &s) in data.chunks_mut(kanaele).zip(mono.iter()) {
            frame.fill(wandeln(s));
        }
    }
}

/// Mittelt verschachtelte Mehrkanal-Samples zu Mono
fn downmix<'a, T: Copy>(
    data: &'a [T],
    kanaele: usize,
    wandeln: fn(T) -> f32,
) -> impl Iterator<Item = f32> + 'a {
    data.chunks(kanaele.max(1)).map(move |frame| {
        let summe: f32 = frame.iter().map(|&s| wandeln(s)).sum();
        summe / frame.len() as f32
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxlane_core::config::OptimizationConfig;

    #[test]
    fn downmix_stereo_zu_mono() {
        let stereo = [0.2f32, 0.4, -1.0, 1.0, 0.5, 0.5];
        let mono: Vec<f32> = downmix(&stereo, 2, |s| s).collect();
        assert_eq!(mono.len(), 3);
        assert!((mono[0] - 0.3).abs() < 1e-6);
        assert_eq!(mono[1], 0.0);
        assert_eq!(mono[2], 0.5);
    }

    #[test]
    fn downmix_i16_wird_normalisiert() {
        let mono: Vec<f32> = downmix(&[i16::MAX, 0], 1, |s: i16| s as f32 / i16::MAX as f32).collect();
        assert_eq!(mono, vec![1.0, 0.0]);
    }

    #[test]
    fn backend_timeout_konfigurierbar() {
        let backend = CpalBackend::new().mit_timeout(Duration::from_millis(250));
        assert_eq!(backend.init_timeout, Duration::from_millis(250));
        assert_eq!(CpalBackend::default().init_timeout, INIT_TIMEOUT);
    }

    #[tokio::test]
    #[ignore = "Benoetigt Audio-Hardware"]
    async fn geraete_oeffnen_und_freigeben() {
        let backend = CpalBackend::new();
        let vorgaben = DeviceConstraints::aus_config(&OptimizationConfig::default());
        let mut stream = backend.acquire(&vorgaben).await.expect("Geraete sollten verfuegbar sein");
        assert!(stream.format().sample_rate > 0);
        assert_eq!(stream.format().channels, 1);
        stream.release();
        stream.release();
    }
}
