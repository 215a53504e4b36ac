//! 4.A Decoder — RIFF/WAVE PCM parsing into a normalized mono sample buffer.
//!
//! Built on `hound`, narrower and more idiomatic here than the teacher's
//! `symphonia`-based loader (`fingerprint-server/src/audio/loader.rs`):
//! the spec only ever needs WAV/PCM, never MP3/FLAC/AAC, so a dedicated WAV
//! crate is the better fit. Stereo downmix-by-averaging follows the same
//! approach as the teacher's `collect_samples`.

use crate::error::{PipelineError, PipelineErrorKind};
use crate::model::SampleBuffer;
use hound::{SampleFormat, WavReader};
use std::io::Cursor;

const MAX_CLIP_SECONDS: f64 = 30.0;
const MIN_CLIP_MS: f64 = 100.0;
const SUPPORTED_SAMPLE_RATES: [u32; 3] = [22050, 44100, 48000];

pub fn decode(pcm_bytes: &[u8]) -> Result<SampleBuffer, PipelineError> {
    let stage = "decoder";
    let reader = WavReader::new(Cursor::new(pcm_bytes)).map_err(|e| {
        PipelineError::new(stage, pcm_bytes, map_hound_error(&e, "failed to parse WAV header"))
    })?;

    let spec = reader.spec();

    if !SUPPORTED_SAMPLE_RATES.contains(&spec.sample_rate) {
        return Err(PipelineError::new(
            stage,
            pcm_bytes,
            PipelineErrorKind::UnsupportedFormat(format!(
                "unsupported sample rate {}",
                spec.sample_rate
            )),
        ));
    }
    if spec.channels == 0 || spec.channels > 2 {
        return Err(PipelineError::new(
            stage,
            pcm_bytes,
            PipelineErrorKind::UnsupportedFormat(format!(
                "unsupported channel count {}",
                spec.channels
            )),
        ));
    }
    if !matches!(spec.bits_per_sample, 8 | 16 | 24) {
        return Err(PipelineError::new(
            stage,
            pcm_bytes,
            PipelineErrorKind::UnsupportedFormat(format!(
                "unsupported bit depth {}",
                spec.bits_per_sample
            )),
        ));
    }

    let channels = spec.channels as usize;
    let full_scale = match spec.bits_per_sample {
        8 => i8::MAX as f32,
        16 => i16::MAX as f32,
        24 => (1i32 << 23) as f32 - 1.0,
        other => return Err(PipelineError::new(
            stage,
            pcm_bytes,
            PipelineErrorKind::UnsupportedFormat(format!("unsupported bit depth {other}")),
        )),
    };

    let mono: Vec<f32> = match spec.sample_format {
        SampleFormat::Int => {
            let raw: Result<Vec<i32>, _> = reader.into_samples::<i32>().collect();
            let raw = raw.map_err(|e| {
                PipelineError::new(stage, pcm_bytes, map_hound_error(&e, "truncated sample data"))
            })?;
            downmix(&raw.iter().map(|&s| s as f32 / full_scale).collect::<Vec<_>>(), channels)
        }
        SampleFormat::Float => {
            let raw: Result<Vec<f32>, _> = reader.into_samples::<f32>().collect();
            let raw = raw.map_err(|e| {
                PipelineError::new(stage, pcm_bytes, map_hound_error(&e, "truncated sample data"))
            })?;
            downmix(&raw, channels)
        }
    };

    let clipped: Vec<f32> = mono.iter().map(|&s| s.clamp(-1.0, 1.0)).collect();

    let duration_ms = clipped.len() as f64 * 1000.0 / spec.sample_rate as f64;
    if duration_ms < MIN_CLIP_MS {
        return Err(PipelineError::new(stage, pcm_bytes, PipelineErrorKind::TooShort));
    }

    let max_len = (MAX_CLIP_SECONDS * spec.sample_rate as f64) as usize;
    let samples = if clipped.len() > max_len {
        tracing::warn!(
            original_len = clipped.len(),
            max_len,
            "truncating clip to 30s cap"
        );
        clipped[..max_len].to_vec()
    } else {
        clipped
    };

    Ok(SampleBuffer {
        samples,
        sample_rate: spec.sample_rate,
    })
}

fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

fn map_hound_error(err: &hound::Error, context: &str) -> PipelineErrorKind {
    match err {
        hound::Error::IoError(io_err)
            if io_err.kind() == std::io::ErrorKind::UnexpectedEof =>
        {
            PipelineErrorKind::Truncated(format!("{context}: {io_err}"))
        }
        hound::Error::FormatError(msg) => PipelineErrorKind::ChunkMismatch(msg.to_string()),
        hound::Error::Unsupported => {
            PipelineErrorKind::UnsupportedFormat("unsupported WAV encoding".to_string())
        }
        other => PipelineErrorKind::Truncated(format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_wav(sample_rate: u32, channels: u16, bits: u16, samples: &[i32]) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: bits,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn decodes_mono_16bit() {
        let samples: Vec<i32> = vec![0; 8000];
        let bytes = make_wav(44100, 1, 16, &samples);
        let buf = decode(&bytes).unwrap();
        assert_eq!(buf.sample_rate, 44100);
        assert_eq!(buf.samples.len(), 8000);
    }

    #[test]
    fn downmixes_stereo_by_averaging() {
        // L=32767 (~1.0), R=-32767 (~-1.0) per frame -> mono ~0.0
        let mut samples = Vec::new();
        for _ in 0..8000 {
            samples.push(32767);
            samples.push(-32767);
        }
        let bytes = make_wav(44100, 2, 16, &samples);
        let buf = decode(&bytes).unwrap();
        assert_eq!(buf.samples.len(), 8000);
        assert!(buf.samples.iter().all(|&s| s.abs() < 1e-3));
    }

    #[test]
    fn rejects_unsupported_sample_rate() {
        let samples: Vec<i32> = vec![0; 8000];
        let bytes = make_wav(11025, 1, 16, &samples);
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err.kind, PipelineErrorKind::UnsupportedFormat(_)));
    }

    #[test]
    fn rejects_too_short_clips() {
        let samples: Vec<i32> = vec![0; 100];
        let bytes = make_wav(44100, 1, 16, &samples);
        let err = decode(&bytes).unwrap_err();
        assert_eq!(err.kind, PipelineErrorKind::TooShort);
    }

    #[test]
    fn truncates_clips_over_30_seconds() {
        let samples: Vec<i32> = vec![0; 44100 * 31];
        let bytes = make_wav(44100, 1, 16, &samples);
        let buf = decode(&bytes).unwrap();
        assert_eq!(buf.samples.len(), 44100 * 30);
    }

    #[test]
    fn rejects_garbage_bytes() {
        let err = decode(&[0u8; 10]).unwrap_err();
        assert!(matches!(
            err.kind,
            PipelineErrorKind::UnsupportedFormat(_) | PipelineErrorKind::ChunkMismatch(_)
        ));
    }
}
