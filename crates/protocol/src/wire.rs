//! Binaere Frames auf dem Streaming-Kanal
//!
//! Alle Nachrichten laufen als Binaer-Frames. Audio wird direkt
//! serialisiert (kein serde, zeitkritisch), Steuernachrichten tragen
//! einen JSON-Envelope.
//!
//! ## Frame-Format
//!
//! ```text
//! Offset  Len  Beschreibung
//! ------  ---  -----------
//!  0       1   Version
//!  1       1   FrameType (1 = Audio, 2 = Control)
//!
//! Audio:
//!  2       2   Flags (big-endian, reserviert)
//!  4       8   Zeitstempel (big-endian, Unix-Millisekunden)
//! 12       4   Abtastrate (big-endian)
//! 16       2   Kanaele (big-endian)
//! 18+      N   PCM16-Samples (little-endian)
//!
//! Control:
//!  2+      N   JSON-Envelope
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;
use voxlane_core::frame::AudioFrame;

use crate::envelope::Envelope;
use crate::pcm::{decode_pcm16, encode_pcm16};

/// Aktuelle Protokollversion
pub const PROTOKOLL_VERSION: u8 = 1;

/// Maximale Frame-Groesse (1 MB)
pub const MAX_FRAME_GROESSE: usize = 1024 * 1024;

/// Laenge des gemeinsamen Praefix (Version + Typ)
const PRAEFIX_LAENGE: usize = 2;

// ---------------------------------------------------------------------------
// FrameType
// ---------------------------------------------------------------------------

/// Art des Frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    /// PCM16-Audio
    Audio = 1,
    /// JSON-Steuernachricht
    Control = 2,
}

impl FrameType {
    /// Konvertiert ein Byte in einen `FrameType`
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Audio),
            2 => Some(Self::Control),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// AudioPacket
// ---------------------------------------------------------------------------

/// Minimaler Audio-Umschlag {Typ, Zeitstempel, Nutzdaten}
#[derive(Debug, Clone, PartialEq)]
pub struct AudioPacket {
    /// Flags (reserviert)
    pub flags: u16,
    /// Sendezeitpunkt in Unix-Millisekunden
    pub timestamp_ms: u64,
    /// Abtastrate in Hz
    pub sample_rate: u32,
    /// Kanalanzahl
    pub channels: u16,
    /// PCM16-Nutzdaten (little-endian)
    pub pcm: Bytes,
}

impl AudioPacket {
    /// Header-Groesse nach dem Praefix
    pub const HEADER_SIZE: usize = 16;

    /// Erstellt ein Paket aus einem Frame (Float -> PCM16)
    pub fn aus_frame(frame: &AudioFrame, timestamp_ms: u64) -> Self {
        let mut pcm = BytesMut::with_capacity(frame.len() * 2);
        encode_pcm16(&frame.samples, &mut pcm);
        Self {
            flags: 0,
            timestamp_ms,
            sample_rate: frame.sample_rate,
            channels: frame.channels,
            pcm: pcm.freeze(),
        }
    }

    /// Dekodiert die Nutzdaten zurueck in einen Frame (PCM16 -> Float)
    pub fn in_frame(&self) -> io::Result<AudioFrame> {
        let samples = decode_pcm16(&self.pcm)?;
        Ok(AudioFrame::new(samples, self.sample_rate, self.channels))
    }

    /// Anzahl der Samples im Paket
    pub fn sample_anzahl(&self) -> usize {
        self.pcm.len() / 2
    }
}

// ---------------------------------------------------------------------------
// WireFrame
// ---------------------------------------------------------------------------

/// Ein vollstaendiger Frame auf dem Kanal
#[derive(Debug, Clone, PartialEq)]
pub enum WireFrame {
    Audio(AudioPacket),
    Control(Envelope),
}

impl WireFrame {
    /// Gibt den Frame-Typ zurueck
    pub fn frame_type(&self) -> FrameType {
        match self {
            Self::Audio(_) => FrameType::Audio,
            Self::Control(_) => FrameType::Control,
        }
    }

    /// Serialisiert den Frame
    ///
    /// # Fehler
    /// - `InvalidData` wenn der Envelope nicht serialisierbar ist
    /// - `InvalidData` wenn der Frame `MAX_FRAME_GROESSE` ueberschreitet
    pub fn encode(&self) -> io::Result<Bytes> {
        let mut buf = BytesMut::new();
        buf.put_u8(PROTOKOLL_VERSION);
        buf.put_u8(self.frame_type() as u8);

        match self {
            Self::Audio(paket) => {
                buf.reserve(AudioPacket::HEADER_SIZE + paket.pcm.len());
                buf.put_u16(paket.flags);
                buf.put_u64(paket.timestamp_ms);
                buf.put_u32(paket.sample_rate);
                buf.put_u16(paket.channels);
                buf.put_slice(&paket.pcm);
            }
            Self::Control(envelope) => {
                let json = envelope.to_json().map_err(|e| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("JSON-Serialisierung fehlgeschlagen: {}", e),
                    )
                })?;
                buf.put_slice(&json);
            }
        }

        if buf.len() > MAX_FRAME_GROESSE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Frame zu gross: {} Bytes (Maximum: {} Bytes)",
                    buf.len(),
                    MAX_FRAME_GROESSE
                ),
            ));
        }

        Ok(buf.freeze())
    }

    /// Deserialisiert einen Frame und validiert Version und Typ
    ///
    /// # Fehler
    /// - `InvalidData` bei zu kurzem Frame, falscher Version,
    ///   unbekanntem Typ, ungueltigem JSON oder ungerader PCM-Laenge
    pub fn decode(buf: &[u8]) -> io::Result<Self> {
        if buf.len() < PRAEFIX_LAENGE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Frame zu kurz: {} Bytes", buf.len()),
            ));
        }
        if buf.len() > MAX_FRAME_GROESSE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Frame zu gross: {} Bytes", buf.len()),
            ));
        }

        let version = buf[0];
        if version != PROTOKOLL_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Ungueltige Protokollversion: {} (erwartet {})",
                    version, PROTOKOLL_VERSION
                ),
            ));
        }

        let frame_type = FrameType::from_u8(buf[1]).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unbekannter FrameType: {}", buf[1]),
            )
        })?;

        let mut rest = &buf[PRAEFIX_LAENGE..];
        match frame_type {
            FrameType::Audio => {
                if rest.len() < AudioPacket::HEADER_SIZE {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!(
                            "Audio-Header zu kurz: {} Bytes (erwartet {})",
                            rest.len(),
                            AudioPacket::HEADER_SIZE
                        ),
                    ));
                }
                let flags = rest.get_u16();
                let timestamp_ms = rest.get_u64();
                let sample_rate = rest.get_u32();
                let channels = rest.get_u16();
                if rest.len() % 2 != 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "PCM16-Nutzdaten mit ungerader Laenge",
                    ));
                }
                Ok(Self::Audio(AudioPacket {
                    flags,
                    timestamp_ms,
                    sample_rate,
                    channels,
                    pcm: Bytes::copy_from_slice(rest),
                }))
            }
            FrameType::Control => {
                let envelope = Envelope::from_json(rest).map_err(|e| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("JSON-Deserialisierung fehlgeschlagen: {}", e),
                    )
                })?;
                Ok(Self::Control(envelope))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::MessageKind;
    use serde_json::json;

    fn test_frame(len: usize) -> AudioFrame {
        let samples = (0..len).map(|i| (i as f32 / len as f32) * 2.0 - 1.0).collect();
        AudioFrame::mono(samples, 24000)
    }

    #[test]
    fn audio_frame_header_layout() {
        let paket = AudioPacket::aus_frame(&test_frame(4), 0x0102_0304_0506_0708);
        let bytes = WireFrame::Audio(paket).encode().unwrap();

        assert_eq!(bytes[0], PROTOKOLL_VERSION);
        assert_eq!(bytes[1], FrameType::Audio as u8);
        assert_eq!(&bytes[4..12], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(u32::from_be_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]), 24000);
        assert_eq!(bytes.len(), PRAEFIX_LAENGE + AudioPacket::HEADER_SIZE + 4 * 2);
    }

    #[test]
    fn audio_frame_dekodieren_innerhalb_quantisierung() {
        let original = test_frame(512);
        let bytes = WireFrame::Audio(AudioPacket::aus_frame(&original, 42))
            .encode()
            .unwrap();

        let WireFrame::Audio(paket) = WireFrame::decode(&bytes).unwrap() else {
            panic!("Erwartet Audio-Frame");
        };
        assert_eq!(paket.timestamp_ms, 42);
        assert_eq!(paket.sample_anzahl(), 512);

        let frame = paket.in_frame().unwrap();
        assert_eq!(frame.sample_rate, 24000);
        for (a, b) in original.samples.iter().zip(frame.samples.iter()) {
            assert!((a - b).abs() <= 1.0 / 32767.0);
        }
    }

    #[test]
    fn control_frame_traegt_json() {
        let env = Envelope::new(MessageKind::Transcription, json!({ "text": "hallo" }));
        let bytes = WireFrame::Control(env.clone()).encode().unwrap();
        assert_eq!(bytes[1], FrameType::Control as u8);
        assert_eq!(bytes[2], b'{');

        let decoded = WireFrame::decode(&bytes).unwrap();
        assert_eq!(decoded, WireFrame::Control(env));
    }

    #[test]
    fn falsche_version_abgelehnt() {
        let mut bytes = WireFrame::Control(Envelope::ping())
            .encode()
            .unwrap()
            .to_vec();
        bytes[0] = 99;
        assert!(WireFrame::decode(&bytes).is_err());
    }

    #[test]
    fn unbekannter_typ_abgelehnt() {
        assert!(WireFrame::decode(&[PROTOKOLL_VERSION, 7, 0, 0]).is_err());
    }

    #[test]
    fn zu_kurzer_audio_header_abgelehnt() {
        assert!(WireFrame::decode(&[PROTOKOLL_VERSION, 1, 0, 0, 0]).is_err());
        assert!(WireFrame::decode(&[PROTOKOLL_VERSION]).is_err());
    }

    #[test]
    fn ungueltiges_json_abgelehnt() {
        assert!(WireFrame::decode(&[PROTOKOLL_VERSION, 2, b'{']).is_err());
    }

    #[test]
    fn zu_grosser_frame_abgelehnt() {
        let frame = AudioFrame::stille(MAX_FRAME_GROESSE, 48000);
        let result = WireFrame::Audio(AudioPacket::aus_frame(&frame, 0)).encode();
        assert!(result.is_err());
    }
}
