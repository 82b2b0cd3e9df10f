//! Spectral-distance comparison between a target and a recorded signal.

use crate::analyze::{analyze, AnalysisError, AnalysisReport};

#[derive(Debug, Clone, PartialEq)]
pub struct CompareReport {
    pub distance: f32,
    pub delta_fundamental_hz: f32,
    pub delta_spectral_centroid_hz: f32,
    pub delta_harmonic_ratio: f32,
}

/// Analyze both `target` and `recorded` and combine their feature
/// deltas into a single distance. Lower is closer; 0.0 is identical.
pub fn compare(
    target: &[f32],
    recorded: &[f32],
    sample_rate: u32,
) -> Result<CompareReport, AnalysisError> {
    let target_report = analyze(target, sample_rate)?;
    let recorded_report = analyze(recorded, sample_rate)?;
    Ok(compare_reports(&target_report, &recorded_report))
}

fn compare_reports(target: &AnalysisReport, recorded: &AnalysisReport) -> CompareReport {
    let delta_fundamental_hz = recorded.fundamental_hz - target.fundamental_hz;
    let delta_spectral_centroid_hz = recorded.spectral_centroid_hz - target.spectral_centroid_hz;
    let delta_harmonic_ratio = recorded.harmonic_ratio - target.harmonic_ratio;

    let relative_fundamental = delta_fundamental_hz.abs() / target.fundamental_hz.max(1.0);
    let relative_centroid =
        delta_spectral_centroid_hz.abs() / target.spectral_centroid_hz.max(1.0);
    let harmonic_component = delta_harmonic_ratio.abs();

    let distance = (relative_fundamental + relative_centroid + harmonic_component) / 3.0;

    CompareReport {
        distance,
        delta_fundamental_hz,
        delta_spectral_centroid_hz,
        delta_harmonic_ratio,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq_hz: f32, sample_rate: u32, duration_s: f32) -> Vec<f32> {
        let n = (sample_rate as f32 * duration_s) as usize;
        (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * freq_hz * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn identical_signal_has_near_zero_distance() {
        let sr = 48_000;
        let signal = sine(440.0, sr, 0.5);
        let report = compare(&signal, &signal, sr).unwrap();
        assert!(report.distance < 0.01, "got {}", report.distance);
    }

    #[test]
    fn octave_apart_tones_have_large_distance() {
        let sr = 48_000;
        let low = sine(440.0, sr, 0.5);
        let high = sine(880.0, sr, 0.5);
        let report = compare(&low, &high, sr).unwrap();
        assert!(report.distance > 0.1, "got {}", report.distance);
    }
}
