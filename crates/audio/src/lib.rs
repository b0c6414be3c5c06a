//! voxlane-audio – Audio-Conditioner
//!
//! Bereitet Mikrofon-Audio vor dem Senden auf und konditioniert
//! empfangenes Audio vor der Wiedergabe:
//! - Noise Gate und weiche Dynamik-Kompression
//! - Inline- oder Worker-Verarbeitung abhaengig von der Frame-Groesse
//! - Adaptive Puffergroesse (Underruns vs. Verarbeitungszeit)
//! - Qualitaets-Score pro Frame
//! - Geraete-Zugriff via cpal hinter dem `AudioBackend`-Trait

pub mod capture;
pub mod conditioner;
pub mod device;
pub mod dsp;
pub mod error;
pub mod pipeline;
pub mod playback;
pub mod quality;
pub mod strategy;
pub mod tuner;

// Bequeme Re-Exporte der wichtigsten Typen
pub use capture::CpalBackend;
pub use conditioner::{AudioConditioner, ConditionerStats, ProcessedFrame, VerarbeitungsPfad};
pub use device::{AudioBackend, AudioStream, DeviceConstraints, NegotiatedFormat};
pub use dsp::{AudioProcessor, DspParams};
pub use error::{AudioError, AudioResult};
pub use pipeline::{build_conditioning_pipeline, AudioPipeline};
pub use playback::{playback_puffer, PlaybackReader, PlaybackWriter};
pub use quality::quality_score;
pub use strategy::{FrameProcessor, InlineProcessor, WorkerProcessor};
pub use tuner::BufferTuner;
