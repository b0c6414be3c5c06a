//! Wiedergabe-Puffer mit Underrun-Erkennung
//!
//! Lock-free Ring-Buffer zwischen Conditioner (Writer) und
//! Ausgabe-Callback (Reader). Fehlende Samples werden mit Stille
//! aufgefuellt. Ein Underrun wird gezaehlt wenn laufende Wiedergabe
//! den Puffer leer vorfindet; eine Sprechpause zaehlt damit nur einmal.

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Schreibseite (Conditioner)
pub struct PlaybackWriter {
    producer: HeapProd<f32>,
    underruns: Arc<AtomicU64>,
}

/// Leseseite (Ausgabe-Callback)
pub struct PlaybackReader {
    consumer: HeapCons<f32>,
    underruns: Arc<AtomicU64>,
    laeuft: bool,
}

/// Erstellt ein Writer/Reader-Paar mit `kapazitaet` Samples
pub fn playback_puffer(kapazitaet: usize) -> (PlaybackWriter, PlaybackReader) {
    let rb = HeapRb::<f32>::new(kapazitaet.max(1));
    let (producer, consumer) = rb.split();
    let underruns = Arc::new(AtomicU64::new(0));
    (
        PlaybackWriter {
            producer,
            underruns: Arc::clone(&underruns),
        },
        PlaybackReader {
            consumer,
            underruns,
            laeuft: false,
        },
    )
}

impl PlaybackWriter {
    /// Schreibt Samples; gibt die Anzahl tatsaechlich geschriebener zurueck
    pub fn schreiben(&mut self, samples: &[f32]) -> usize {
        self.producer.push_slice(samples)
    }

    /// Anzahl gepufferter Samples
    pub fn belegt(&self) -> usize {
        self.producer.occupied_len()
    }

    /// Gesamtzahl der Underruns seit Erstellung
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }
}

impl PlaybackReader {
    /// Fuellt `ziel` aus dem Puffer, Rest mit Stille
    ///
    /// Gibt die Anzahl echter Samples zurueck.
    pub fn fuellen(&mut self, ziel: &mut [f32]) -> usize {
        let gelesen = self.consumer.pop_slice(ziel);
        if gelesen < ziel.len() {
            ziel[gelesen..].fill(0.0);
            if self.laeuft {
                self.underruns.fetch_add(1, Ordering::Relaxed);
                self.laeuft = false;
            }
        } else {
            self.laeuft = true;
        }
        gelesen
    }

    /// Gesamtzahl der Underruns seit Erstellung
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_kommen_in_reihenfolge_an() {
        let (mut w, mut r) = playback_puffer(16);
        assert_eq!(w.schreiben(&[0.1, 0.2, 0.3, 0.4]), 4);
        assert_eq!(w.belegt(), 4);
        let mut out = [0.0f32; 4];
        assert_eq!(r.fuellen(&mut out), 4);
        assert_eq!(out, [0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn voller_puffer_verwirft_rest() {
        let (mut w, _r) = playback_puffer(4);
        assert_eq!(w.schreiben(&[0.5; 10]), 4);
    }

    #[test]
    fn leerlauf_vor_start_ist_kein_underrun() {
        let (w, mut r) = playback_puffer(16);
        let mut out = [1.0f32; 8];
        assert_eq!(r.fuellen(&mut out), 0);
        assert!(out.iter().all(|&s| s == 0.0), "Stille fuer fehlende Samples");
        assert_eq!(w.underruns(), 0);
    }

    #[test]
    fn leerlaufen_waehrend_wiedergabe_zaehlt_einmal() {
        let (mut w, mut r) = playback_puffer(64);
        let mut out = [0.0f32; 8];

        w.schreiben(&[0.3; 12]);
        assert_eq!(r.fuellen(&mut out), 8);
        assert_eq!(r.fuellen(&mut out), 4);
        assert_eq!(&out[4..], &[0.0; 4]);
        assert_eq!(w.underruns(), 1);

        // Weitere Stille zaehlt nicht erneut
        r.fuellen(&mut out);
        r.fuellen(&mut out);
        assert_eq!(r.underruns(), 1);

        // Neue Wiedergabe, erneutes Leerlaufen
        w.schreiben(&[0.3; 8]);
        r.fuellen(&mut out);
        r.fuellen(&mut out);
        assert_eq!(w.underruns(), 2);
    }
}
