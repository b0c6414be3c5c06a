//! Qualitaets-Score fuer konditionierte Frames
//!
//! Score in [0, 1]: RMS-Pegel (leise Signale angehoben) abzueglich
//! einer Strafe proportional zum Anteil uebersteuerter Samples.

/// Betrag ab dem ein Sample als uebersteuert gilt
pub const CLIPPING_SCHWELLE: f32 = 0.95;

/// Verstaerkung des RMS-Pegels fuer die Bewertung
const PEGEL_VERSTAERKUNG: f32 = 10.0;

/// RMS-Pegel eines Puffers (0.0 bei leerem Puffer)
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let summe: f32 = samples
        .iter()
        .filter(|s| s.is_finite())
        .map(|s| s * s)
        .sum();
    (summe / samples.len() as f32).sqrt()
}

/// Anteil der Samples mit |s| > `CLIPPING_SCHWELLE`
pub fn clipping_anteil(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let geclippt = samples
        .iter()
        .filter(|s| s.abs() > CLIPPING_SCHWELLE)
        .count();
    geclippt as f32 / samples.len() as f32
}

/// Bewertet einen Frame mit einem Score in [0, 1]
///
/// Stille ergibt 0.
pub fn quality_score(samples: &[f32]) -> f32 {
    let pegel = (rms(samples) * PEGEL_VERSTAERKUNG).min(1.0);
    let score = pegel - clipping_anteil(samples);
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stille_ergibt_null() {
        assert_eq!(quality_score(&[0.0; 512]), 0.0);
        assert_eq!(quality_score(&[]), 0.0);
    }

    #[test]
    fn normaler_sprachpegel_ergibt_volle_punktzahl() {
        let samples: Vec<f32> = (0..480).map(|i| ((i as f32) * 0.1).sin() * 0.3).collect();
        assert!((quality_score(&samples) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn leises_signal_wird_angehoben() {
        let samples = vec![0.02f32; 100];
        // RMS 0.02 * 10 = 0.2
        assert!((quality_score(&samples) - 0.2).abs() < 1e-4);
    }

    #[test]
    fn clipping_senkt_score() {
        let mut samples = vec![0.5f32; 100];
        for s in samples.iter_mut().take(25) {
            *s = 0.99;
        }
        assert!((quality_score(&samples) - 0.75).abs() < 1e-4);
    }

    #[test]
    fn voll_uebersteuert_ergibt_null() {
        assert_eq!(quality_score(&[1.0; 64]), 0.0);
    }

    #[test]
    fn score_immer_im_bereich() {
        for amp in [0.0f32, 0.001, 0.1, 0.5, 0.96, 1.0, 3.0] {
            let s = quality_score(&vec![amp; 32]);
            assert!((0.0..=1.0).contains(&s), "Amplitude {amp} -> {s}");
        }
    }
}
