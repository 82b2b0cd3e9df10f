//! Single-signal feature extraction: fundamental frequency, spectral
//! centroid, harmonic ratio, and a coarse amplitude envelope.

use thiserror::Error;
use tracing::debug;

use crate::fft::{magnitude_spectrum, Window};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("signal has no samples")]
    EmptySignal,
    #[error("sample rate must be nonzero")]
    ZeroSampleRate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisReport {
    pub fundamental_hz: f32,
    pub spectral_centroid_hz: f32,
    pub harmonic_ratio: f32,
    /// RMS amplitude of up to the first 20 consecutive 50ms windows.
    pub envelope: Vec<f32>,
    pub duration_s: f32,
}

const ENVELOPE_WINDOW_MS: f32 = 50.0;
const ENVELOPE_MAX_WINDOWS: usize = 20;
const HARMONIC_COUNT: usize = 8;
const HARMONIC_BIN_TOLERANCE: usize = 2;
const MIN_FUNDAMENTAL_HZ: f32 = 20.0;

/// Extract [`AnalysisReport`] from a mono signal.
pub fn analyze(samples: &[f32], sample_rate: u32) -> Result<AnalysisReport, AnalysisError> {
    if samples.is_empty() {
        return Err(AnalysisError::EmptySignal);
    }
    if sample_rate == 0 {
        return Err(AnalysisError::ZeroSampleRate);
    }

    let mag = magnitude_spectrum(samples, Window::Hann);
    let bin_hz = sample_rate as f32 / samples.len() as f32;

    let floor_bin = (MIN_FUNDAMENTAL_HZ / bin_hz).ceil() as usize;
    let fundamental_bin = dominant_bin(&mag, floor_bin);
    let fundamental_hz = fundamental_bin as f32 * bin_hz;
    let spectral_centroid_hz = spectral_centroid(&mag, bin_hz);
    let harmonic_ratio = harmonic_ratio(&mag, fundamental_bin, floor_bin);
    let envelope = amplitude_envelope(samples, sample_rate);
    let duration_s = samples.len() as f32 / sample_rate as f32;

    debug!(fundamental_hz, spectral_centroid_hz, harmonic_ratio, duration_s, "analyzed signal");

    Ok(AnalysisReport {
        fundamental_hz,
        spectral_centroid_hz,
        harmonic_ratio,
        envelope,
        duration_s,
    })
}

/// Largest-magnitude bin at or above `floor_bin` (the first bin whose
/// frequency is >= 20 Hz), taken as the fundamental.
fn dominant_bin(mag: &[f32], floor_bin: usize) -> usize {
    mag.iter()
        .enumerate()
        .skip(floor_bin.max(1))
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(idx, _)| idx)
        .unwrap_or(0)
}

fn spectral_centroid(mag: &[f32], bin_hz: f32) -> f32 {
    let weighted: f32 = mag.iter().enumerate().map(|(i, &m)| i as f32 * bin_hz * m).sum();
    let total: f32 = mag.iter().sum();
    if total <= f32::EPSILON {
        0.0
    } else {
        weighted / total
    }
}

/// Fraction of total spectral energy (above 20 Hz) found within a few
/// bins of the fundamental and its first few harmonics.
fn harmonic_ratio(mag: &[f32], fundamental_bin: usize, floor_bin: usize) -> f32 {
    if fundamental_bin == 0 {
        return 0.0;
    }
    let total: f32 = mag.iter().skip(floor_bin.max(1)).map(|m| m * m).sum();
    if total <= f32::EPSILON {
        return 0.0;
    }
    let mut harmonic_energy = 0.0f32;
    for h in 1..=HARMONIC_COUNT {
        let center = fundamental_bin * h;
        if center >= mag.len() {
            break;
        }
        let lo = center.saturating_sub(HARMONIC_BIN_TOLERANCE);
        let hi = (center + HARMONIC_BIN_TOLERANCE + 1).min(mag.len());
        harmonic_energy += mag[lo..hi].iter().map(|m| m * m).sum::<f32>();
    }
    (harmonic_energy / total).min(1.0)
}

fn amplitude_envelope(samples: &[f32], sample_rate: u32) -> Vec<f32> {
    let window_len = ((ENVELOPE_WINDOW_MS / 1000.0) * sample_rate as f32).round() as usize;
    let window_len = window_len.max(1);
    samples
        .chunks(window_len)
        .take(ENVELOPE_MAX_WINDOWS)
        .map(|chunk| {
            let sum_sq: f32 = chunk.iter().map(|s| s * s).sum();
            (sum_sq / chunk.len() as f32).sqrt()
        })
        .collect()
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
    fn rejects_empty_signal() {
        assert_eq!(analyze(&[], 48_000), Err(AnalysisError::EmptySignal));
    }

    #[test]
    fn rejects_zero_sample_rate() {
        assert_eq!(analyze(&[0.0, 1.0], 0), Err(AnalysisError::ZeroSampleRate));
    }

    #[test]
    fn detects_approximate_fundamental() {
        let sr = 48_000;
        let samples = sine(440.0, sr, 0.5);
        let report = analyze(&samples, sr).unwrap();
        assert!(
            (report.fundamental_hz - 440.0).abs() < 20.0,
            "got {}",
            report.fundamental_hz
        );
    }

    #[test]
    fn envelope_has_expected_window_count() {
        let sr = 48_000;
        let samples = sine(220.0, sr, 2.0);
        let report = analyze(&samples, sr).unwrap();
        assert_eq!(report.envelope.len(), ENVELOPE_MAX_WINDOWS);
    }

    #[test]
    fn duration_matches_sample_count() {
        let sr = 44_100;
        let samples = vec![0.0f32; 44_100];
        let report = analyze(&samples, sr).unwrap();
        assert!((report.duration_s - 1.0).abs() < 1e-4);
    }
}
