//! voxlane-protocol – Wire-Format zwischen Client und Sprach-Endpunkt
//!
//! - [`envelope`] – JSON-Envelope fuer Steuernachrichten
//! - [`pcm`] – Float <-> 16-Bit-PCM Umwandlung
//! - [`wire`] – Binaere Frames (Audio und Steuerung) auf dem Kanal

pub mod envelope;
pub mod pcm;
pub mod wire;

pub use envelope::{jetzt_ms, Envelope, MessageKind, TranscriptionPayload};
pub use wire::{AudioPacket, FrameType, WireFrame};
