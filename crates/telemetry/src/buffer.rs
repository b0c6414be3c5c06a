//! Begrenzter Sample-Puffer
//!
//! Waechst der Puffer ueber `MAX_SAMPLES`, werden die aeltesten Eintraege
//! verworfen bis nur noch `TRIM_AUF` uebrig sind.

use std::collections::VecDeque;

use crate::sample::PerformanceSample;

pub const MAX_SAMPLES: usize = 1000;
pub const TRIM_AUF: usize = 500;

#[derive(Debug, Default)]
pub struct SampleBuffer {
    samples: VecDeque<PerformanceSample>,
    verworfen: u64,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sample: PerformanceSample) {
        self.samples.push_back(sample);
        self.trimmen();
    }

    /// Legt einen nicht zugestellten Batch vor die neueren Samples zurueck
    pub fn wieder_einreihen(&mut self, batch: Vec<PerformanceSample>) {
        for sample in batch.into_iter().rev() {
            self.samples.push_front(sample);
        }
        self.trimmen();
    }

    /// Entnimmt alle Samples (aelteste zuerst)
    pub fn entnehmen(&mut self) -> Vec<PerformanceSample> {
        self.samples.drain(..).collect()
    }

    /// Kopie aller Samples (aelteste zuerst)
    pub fn alle(&self) -> Vec<PerformanceSample> {
        self.samples.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Insgesamt durch Trimmen verworfene Samples
    pub fn verworfen(&self) -> u64 {
        self.verworfen
    }

    fn trimmen(&mut self) {
        if self.samples.len() > MAX_SAMPLES {
            let zu_viel = self.samples.len() - TRIM_AUF;
            self.samples.drain(..zu_viel);
            self.verworfen += zu_viel as u64;
        }
    }
}
