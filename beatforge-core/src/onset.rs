//! 4.B OnsetDetector — spectral-flux novelty with local normalization and
//! refractory peak picking.
//!
//! Grounded on `onset_detector.rs`'s spectral-flux/peak-picking shape, but
//! follows the spec's exact numbers rather than the teacher's (300ms local
//! normalization instead of a single global max, ±30ms peak window and a
//! 50ms refractory period instead of a flat minimum-distance filter).

use crate::dsp::fft::FftProcessor;
use crate::dsp::window::hann_window;
use crate::error::{PipelineErrorKind, StageResult};
use crate::model::SampleBuffer;
use rayon::prelude::*;

pub const FFT_SIZE: usize = 1024;
pub const HOP: usize = 512;
const LOCAL_NORM_WINDOW_MS: f64 = 300.0;
const PEAK_WINDOW_MS: f64 = 30.0;
const REFRACTORY_MS: f64 = 50.0;
const AMPLITUDE_WINDOW_MS: f64 = 25.0;
const NORMALIZATION_EPSILON: f64 = 1e-6;
pub const DEFAULT_THRESHOLD: f64 = 0.6;
const DEFAULT_DURATION_MS: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OnsetCandidate {
    pub timestamp_ms: f64,
    pub peak_amplitude: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct OnsetConfig {
    pub threshold: f64,
    pub parallel: bool,
}

impl Default for OnsetConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            parallel: false,
        }
    }
}

pub fn detect(buf: &SampleBuffer, cfg: &OnsetConfig) -> StageResult<Vec<OnsetCandidate>> {
    let novelty = spectral_flux_novelty(buf, cfg.parallel);
    let normalized = local_normalize(&novelty, buf.sample_rate);
    let candidates = pick_peaks(&normalized, &normalized, buf, cfg.threshold);

    if candidates.is_empty() {
        return Err(PipelineErrorKind::NoOnsets);
    }
    Ok(candidates)
}

/// Per-frame spectral flux novelty, un-normalized. `novelty[0]` is always
/// 0.0 (no previous frame to compare against).
fn spectral_flux_novelty(buf: &SampleBuffer, parallel: bool) -> Vec<f64> {
    let window = hann_window(FFT_SIZE);
    let fft = FftProcessor::new(FFT_SIZE);
    let num_frames = if buf.samples.len() >= FFT_SIZE {
        (buf.samples.len() - FFT_SIZE) / HOP + 1
    } else {
        0
    };

    let magnitudes: Vec<Vec<f32>> = if parallel {
        (0..num_frames)
            .into_par_iter()
            .map(|idx| frame_magnitude(buf, &window, &fft, idx))
            .collect()
    } else {
        (0..num_frames)
            .map(|idx| frame_magnitude(buf, &window, &fft, idx))
            .collect()
    };

    let mut novelty = vec![0.0f64; num_frames];
    for t in 1..num_frames {
        let flux: f64 = magnitudes[t]
            .iter()
            .zip(magnitudes[t - 1].iter())
            .map(|(&curr, &prev)| (curr - prev).max(0.0) as f64)
            .sum();
        novelty[t] = flux;
    }
    novelty
}

fn frame_magnitude(
    buf: &SampleBuffer,
    window: &[f32],
    fft: &FftProcessor,
    frame_idx: usize,
) -> Vec<f32> {
    let start = frame_idx * HOP;
    let mut frame: Vec<f32> = buf.samples[start..start + FFT_SIZE]
        .iter()
        .zip(window.iter())
        .map(|(&s, &w)| s * w)
        .collect();
    fft.magnitude(&mut frame)
}

fn frames_per_ms(sample_rate: u32) -> f64 {
    sample_rate as f64 / 1000.0 / HOP as f64
}

/// Subtract the local mean and divide by local standard deviation (+ eps)
/// over a 300ms centered sliding window.
fn local_normalize(novelty: &[f64], sample_rate: u32) -> Vec<f64> {
    let radius = ((LOCAL_NORM_WINDOW_MS / 2.0) * frames_per_ms(sample_rate)).round() as usize;
    let len = novelty.len();
    let mut out = vec![0.0; len];

    for t in 0..len {
        let lo = t.saturating_sub(radius);
        let hi = (t + radius + 1).min(len);
        let window = &novelty[lo..hi];
        let mean = window.iter().sum::<f64>() / window.len() as f64;
        let variance =
            window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / window.len() as f64;
        let std_dev = variance.sqrt();
        out[t] = (novelty[t] - mean) / (std_dev + NORMALIZATION_EPSILON);
    }
    out
}

fn pick_peaks(
    normalized: &[f64],
    _unused_for_symmetry: &[f64],
    buf: &SampleBuffer,
    threshold: f64,
) -> Vec<OnsetCandidate> {
    let peak_radius = (PEAK_WINDOW_MS * frames_per_ms(buf.sample_rate)).round() as usize;
    let hop_ms = HOP as f64 * 1000.0 / buf.sample_rate as f64;

    let mut candidates = Vec::new();
    let mut last_onset_ms: Option<f64> = None;

    for t in 0..normalized.len() {
        let val = normalized[t];
        if val <= threshold {
            continue;
        }

        let lo = t.saturating_sub(peak_radius);
        let hi = (t + peak_radius + 1).min(normalized.len());
        let is_local_max = normalized[lo..hi]
            .iter()
            .enumerate()
            .all(|(i, &v)| (lo + i == t) || v <= val);
        if !is_local_max {
            continue;
        }

        let timestamp_ms = t as f64 * hop_ms + (FFT_SIZE as f64 / 2.0) * 1000.0 / buf.sample_rate as f64;

        if let Some(last) = last_onset_ms {
            if timestamp_ms - last < REFRACTORY_MS {
                continue;
            }
        }

        let peak_amplitude = local_peak_amplitude(buf, timestamp_ms);
        candidates.push(OnsetCandidate {
            timestamp_ms,
            peak_amplitude,
        });
        last_onset_ms = Some(timestamp_ms);
    }

    candidates
}

fn local_peak_amplitude(buf: &SampleBuffer, center_ms: f64) -> f64 {
    let radius_samples =
        (AMPLITUDE_WINDOW_MS / 1000.0 * buf.sample_rate as f64).round() as i64;
    let center_sample = (center_ms / 1000.0 * buf.sample_rate as f64).round() as i64;
    let lo = (center_sample - radius_samples).max(0) as usize;
    let hi = ((center_sample + radius_samples) as usize).min(buf.samples.len());
    if lo >= hi {
        return 0.0;
    }
    buf.samples[lo..hi]
        .iter()
        .map(|&s| s.abs() as f64)
        .fold(0.0, f64::max)
}

/// Default duration assigned to a freshly detected onset, before downstream
/// stages overwrite it.
pub fn default_duration_ms() -> f64 {
    DEFAULT_DURATION_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silence(sample_rate: u32, seconds: f64) -> SampleBuffer {
        SampleBuffer {
            samples: vec![0.0; (sample_rate as f64 * seconds) as usize],
            sample_rate,
        }
    }

    fn impulse_train(sample_rate: u32, seconds: f64, onset_times_ms: &[f64]) -> SampleBuffer {
        let mut samples = vec![0.0f32; (sample_rate as f64 * seconds) as usize];
        for &t in onset_times_ms {
            let idx = (t / 1000.0 * sample_rate as f64) as usize;
            // A short burst of broadband noise-like energy so spectral flux
            // actually registers a jump (a single impulse sample is too
            // narrow relative to a 1024-sample analysis window).
            for i in 0..64 {
                if idx + i < samples.len() {
                    let phase = i as f32 * 0.9;
                    samples[idx + i] += phase.sin() * (1.0 - i as f32 / 64.0);
                }
            }
        }
        SampleBuffer { samples, sample_rate }
    }

    #[test]
    fn silence_yields_no_onsets() {
        let buf = silence(44100, 2.0);
        let err = detect(&buf, &OnsetConfig::default()).unwrap_err();
        assert_eq!(err, PipelineErrorKind::NoOnsets);
    }

    #[test]
    fn detects_impulses_in_expected_order() {
        let buf = impulse_train(44100, 2.5, &[500.0, 1000.0, 1500.0, 2000.0]);
        let onsets = detect(&buf, &OnsetConfig::default()).unwrap();
        assert!(onsets.len() >= 4);
        for pair in onsets.windows(2) {
            assert!(pair[0].timestamp_ms < pair[1].timestamp_ms);
        }
    }

    #[test]
    fn refractory_period_suppresses_close_onsets() {
        // Two bursts 10ms apart: only one onset should survive refractory.
        let buf = impulse_train(44100, 1.0, &[200.0, 210.0]);
        let onsets = detect(&buf, &OnsetConfig::default()).unwrap();
        assert_eq!(onsets.len(), 1);
    }

    #[test]
    fn parallel_and_sequential_paths_agree() {
        let buf = impulse_train(44100, 2.5, &[500.0, 1000.0, 1500.0, 2000.0]);
        let seq = detect(&buf, &OnsetConfig { threshold: DEFAULT_THRESHOLD, parallel: false }).unwrap();
        let par = detect(&buf, &OnsetConfig { threshold: DEFAULT_THRESHOLD, parallel: true }).unwrap();
        assert_eq!(seq.len(), par.len());
        for (a, b) in seq.iter().zip(par.iter()) {
            assert!((a.timestamp_ms - b.timestamp_ms).abs() < 1e-9);
        }
    }
}
