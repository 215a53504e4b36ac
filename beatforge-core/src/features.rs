//! 4.C FeatureExtractor — fixed acoustic feature vector per onset.
//!
//! The band-energy/centroid math is grounded on `spectral_features.rs`
//! (`compute_spectral_centroid`, band-sum-over-PSD), narrowed from the
//! teacher's seven-band split down to the three bands the classifier needs
//! and renormalized so the three energies sum to 1 rather than each being
//! independently normalized.

use crate::dsp::fft::FftProcessor;
use crate::dsp::window::hann_window;
use crate::model::{FeatureVector, SampleBuffer};
use crate::onset::OnsetCandidate;

const WINDOW_MS: f64 = 50.0;
const PRE_ROLL_MS: f64 = 5.0;
const BAND_EDGES_HZ: [f64; 4] = [0.0, 200.0, 2000.0, f64::INFINITY];
const ENERGY_EPSILON: f64 = 1e-9;

/// Next power of two at or above `n`, with a floor of 64 so very short
/// analysis windows still get a usable FFT resolution.
fn fft_size_for(window_samples: usize) -> usize {
    window_samples.max(64).next_power_of_two()
}

pub fn extract(buf: &SampleBuffer, onset: &OnsetCandidate) -> FeatureVector {
    let window_samples = (WINDOW_MS / 1000.0 * buf.sample_rate as f64).round() as usize;
    let start_ms = onset.timestamp_ms - PRE_ROLL_MS;
    let start_sample = ((start_ms / 1000.0) * buf.sample_rate as f64).round() as i64;
    let start = start_sample.max(0) as usize;
    let end = (start + window_samples).min(buf.samples.len());

    let time_domain = if start < end {
        &buf.samples[start..end]
    } else {
        &[][..]
    };

    let zcr = zero_crossing_rate(time_domain);

    let fft_size = fft_size_for(time_domain.len().max(1));
    let window = hann_window(fft_size);
    let fft = FftProcessor::new(fft_size);

    let mut frame = vec![0.0f32; fft_size];
    for (i, &s) in time_domain.iter().enumerate() {
        frame[i] = s * window[i];
    }
    let magnitude = fft.magnitude(&mut frame);

    let spectral_centroid = spectral_centroid(&magnitude, fft_size, buf.sample_rate);
    let (low, mid, high) = band_energies(&magnitude, fft_size, buf.sample_rate);

    FeatureVector {
        spectral_centroid,
        zcr,
        low_band_energy: low,
        mid_band_energy: mid,
        high_band_energy: high,
        peak_amplitude: onset.peak_amplitude,
    }
}

fn zero_crossing_rate(samples: &[f32]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let crossings = samples
        .windows(2)
        .filter(|pair| (pair[0] >= 0.0) != (pair[1] >= 0.0))
        .count();
    crossings as f64 / samples.len() as f64
}

fn spectral_centroid(magnitude: &[f32], fft_size: usize, sample_rate: u32) -> f64 {
    let mut weighted_sum = 0.0;
    let mut total = 0.0;
    for (k, &mag) in magnitude.iter().enumerate() {
        let freq = k as f64 * sample_rate as f64 / fft_size as f64;
        weighted_sum += freq * mag as f64;
        total += mag as f64;
    }
    if total < ENERGY_EPSILON {
        0.0
    } else {
        weighted_sum / total
    }
}

/// Returns `(low, mid, high)` each in `[0, 1]`, summing to 1 (subject to
/// floating-point rounding).
fn band_energies(magnitude: &[f32], fft_size: usize, sample_rate: u32) -> (f64, f64, f64) {
    let mut band_sums = [0.0f64; 3];
    for (k, &mag) in magnitude.iter().enumerate() {
        let freq = k as f64 * sample_rate as f64 / fft_size as f64;
        let power = (mag as f64).powi(2);
        let band = BAND_EDGES_HZ
            .windows(2)
            .position(|edge| freq >= edge[0] && freq < edge[1])
            .unwrap_or(2);
        band_sums[band] += power;
    }
    let total: f64 = band_sums.iter().sum();
    if total < ENERGY_EPSILON {
        return (0.0, 0.0, 0.0);
    }
    (
        band_sums[0] / total,
        band_sums[1] / total,
        band_sums[2] / total,
    )
}
