use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use std::sync::Arc;

/// Real-input FFT processor for a fixed frame size.
///
/// Spec §4.B calls out a "real FFT" explicitly, and our windows are always
/// real-valued, so `realfft` (half the work of a complex-input `rustfft`
/// plan for the same window) replaces the teacher's `rustfft`-based
/// onset/tempo detectors here.
pub struct FftProcessor {
    fft_size: usize,
    plan: Arc<dyn RealToComplex<f32>>,
}

impl FftProcessor {
    pub fn new(fft_size: usize) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(fft_size);
        Self { fft_size, plan }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of magnitude bins produced (`fft_size / 2 + 1`).
    pub fn num_bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

    /// Compute the magnitude spectrum of a windowed real frame. `frame` is
    /// consumed (realfft overwrites its scratch input) and must have length
    /// `fft_size`.
    pub fn magnitude(&self, frame: &mut [f32]) -> Vec<f32> {
        debug_assert_eq!(frame.len(), self.fft_size);
        let mut spectrum = vec![Complex32::new(0.0, 0.0); self.num_bins()];
        self.plan
            .process(frame, &mut spectrum)
            .expect("realfft: frame length must match plan size");
        spectrum.iter().map(|c| c.norm()).collect()
    }

    /// Frequency in Hz represented by bin `k`, given the time-domain sample
    /// rate.
    pub fn bin_hz(&self, k: usize, sample_rate: f64) -> f64 {
        k as f64 * sample_rate / self.fft_size as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::window::hann_window;

    #[test]
    fn magnitude_of_dc_signal_peaks_at_bin_zero() {
        let proc = FftProcessor::new(256);
        let mut frame = vec![1.0f32; 256];
        let mag = proc.magnitude(&mut frame);
        let max_idx = mag
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(max_idx, 0);
    }

    #[test]
    fn magnitude_of_sine_peaks_near_expected_bin() {
        let sample_rate = 8000.0;
        let fft_size = 1024;
        let freq = 1000.0;
        let window = hann_window(fft_size);
        let mut frame: Vec<f32> = (0..fft_size)
            .map(|n| {
                (2.0 * std::f32::consts::PI * freq * n as f32 / sample_rate as f32).sin()
                    * window[n]
            })
            .collect();

        let proc = FftProcessor::new(fft_size);
        let mag = proc.magnitude(&mut frame);
        let expected_bin = (freq * fft_size as f64 / sample_rate) as usize;
        let peak_bin = mag
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        assert!((peak_bin as i64 - expected_bin as i64).abs() <= 2);
    }
}
