//! Float <-> 16-Bit-PCM Umwandlung
//!
//! Halbiert die Nutzdaten gegenueber f32. Samples werden vor der
//! Umwandlung auf [-1, 1] begrenzt, damit kein Ueberlauf entsteht.
//! Byte-Reihenfolge auf dem Draht: little-endian.

use bytes::{Buf, BufMut, BytesMut};
use std::io;

/// Skalierungsfaktor zwischen Float und i16
pub const PCM16_SKALA: f32 = 32767.0;

/// Wandelt ein Float-Sample in ein i16-Sample um
#[inline]
pub fn f32_zu_i16(sample: f32) -> i16 {
    // NaN wird zu 0, clamp verhindert Wraparound
    let s = if sample.is_nan() { 0.0 } else { sample.clamp(-1.0, 1.0) };
    (s * PCM16_SKALA).round() as i16
}

/// Wandelt ein i16-Sample zurueck in Float
#[inline]
pub fn i16_zu_f32(sample: i16) -> f32 {
    // -32768 ergibt minimal weniger als -1.0, daher erneut begrenzen
    (sample as f32 / PCM16_SKALA).max(-1.0)
}

/// Kodiert Float-Samples als 16-Bit-PCM (little-endian)
pub fn encode_pcm16(samples: &[f32], dst: &mut BytesMut) {
    dst.reserve(samples.len() * 2);
    for &s in samples {
        dst.put_i16_le(f32_zu_i16(s));
    }
}

/// Dekodiert 16-Bit-PCM (little-endian) zu Float-Samples
///
/// # Fehler
/// - `InvalidData` bei ungerader Byte-Anzahl
pub fn decode_pcm16(mut src: &[u8]) -> io::Result<Vec<f32>> {
    if src.len() % 2 != 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("PCM16-Nutzdaten mit ungerader Laenge: {} Bytes", src.len()),
        ));
    }
    let mut samples = Vec::with_capacity(src.len() / 2);
    while src.has_remaining() {
        samples.push(i16_zu_f32(src.get_i16_le()));
    }
    Ok(samples)
}
