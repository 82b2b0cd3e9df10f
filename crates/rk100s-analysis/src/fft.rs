//! Windowing and a thin wrapper over `rustfft`'s forward transform.

use rustfft::{num_complex::Complex32, FftPlanner};

/// Analysis window applied before transforming a frame, to reduce
/// spectral leakage from the frame edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    Rectangular,
    Hann,
}

impl Window {
    pub fn coefficients(self, len: usize) -> Vec<f32> {
        match self {
            Window::Rectangular => vec![1.0; len],
            Window::Hann => (0..len)
                .map(|n| {
                    let x = std::f32::consts::PI * n as f32 / (len.max(2) - 1) as f32;
                    x.sin().powi(2)
                })
                .collect(),
        }
    }

    pub fn apply(self, samples: &[f32]) -> Vec<f32> {
        let coeffs = self.coefficients(samples.len());
        samples.iter().zip(coeffs).map(|(&s, c)| s * c).collect()
    }
}

/// Forward real-to-complex FFT of `samples`, windowed with `window`.
/// The input is zero-padded up to the next value rustfft accepts
/// (any length works, this just hands it straight through).
pub fn forward(samples: &[f32], window: Window) -> Vec<Complex32> {
    let windowed = window.apply(samples);
    let mut buffer: Vec<Complex32> = windowed.into_iter().map(Complex32::from).collect();

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(buffer.len());
    fft.process(&mut buffer);
    buffer
}

/// Magnitude spectrum (linear, not dB) of the lower half (up to Nyquist).
pub fn magnitude_spectrum(samples: &[f32], window: Window) -> Vec<f32> {
    let spectrum = forward(samples, window);
    spectrum[..spectrum.len() / 2 + 1]
        .iter()
        .map(|c| c.norm())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dc_signal_concentrates_energy_in_bin_zero() {
        let samples = vec![1.0f32; 64];
        let mag = magnitude_spectrum(&samples, Window::Rectangular);
        let max_bin = mag
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap()
            .0;
        assert_eq!(max_bin, 0);
    }

    #[test]
    fn hann_window_tapers_edges_to_zero() {
        let coeffs = Window::Hann.coefficients(16);
        assert!(coeffs[0] < 1e-6);
        assert!(coeffs[15] < 1e-6);
        assert!(coeffs[8] > 0.9);
    }
}
