//! 4.I OfflineSynth — renders an `Arrangement` to 16-bit PCM WAV at 44.1 kHz
//! mono.
//!
//! Per-voice envelopes are grounded on `envelope.rs`'s attack/release
//! exponential-coefficient idea (reimplemented here as direct ADSR/decay math
//! since the voices need sample-accurate stage boundaries `EnvelopeFollower`
//! doesn't expose); filters reuse `biquad_filter.rs`'s `BiquadCoeffs`
//! coefficient generators directly. Final-stage limiting reuses
//! `limiter.rs`'s `Limiter`/`LimiterConfig` as-is.

use crate::biquad_filter::BiquadCoeffs;
use crate::limiter::{Limiter, LimiterConfig};
use crate::model::{Arrangement, Lane};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;

const SAMPLE_RATE: u32 = 44_100;
const OUTPUT_CEILING: f32 = 0.95;

const KICK_SWEEP_START_HZ: f64 = 150.0;
const KICK_SWEEP_END_HZ: f64 = 60.0;
const KICK_SWEEP_MS: f64 = 50.0;
const KICK_TOTAL_MS: f64 = 300.0;
const KICK_DECAY_TAU_MS: f64 = 60.0;

const SNARE_NOISE_MS: f64 = 150.0;
const SNARE_BODY_MS: f64 = 100.0;
const SNARE_BODY_HZ: f64 = 200.0;
const SNARE_BAND_CENTER_HZ: f64 = 2000.0;
const SNARE_BAND_Q: f64 = 1.0;
const SNARE_NOISE_DECAY_TAU_MS: f64 = 30.0;
const SNARE_BODY_DECAY_TAU_MS: f64 = 25.0;

const HAT_MS: f64 = 40.0;
const HAT_HIGHPASS_HZ: f64 = 8000.0;
const HAT_DECAY_TAU_MS: f64 = 10.0;

const BASS_LOWPASS_HZ: f64 = 800.0;
const BASS_ATTACK_MS: f64 = 5.0;
const BASS_DECAY_MS: f64 = 50.0;
const BASS_SUSTAIN_LEVEL: f64 = 0.6;
const BASS_MAX_RELEASE_MS: f64 = 300.0;

const PAD_LOWPASS_START_HZ: f64 = 1200.0;
const PAD_LOWPASS_END_HZ: f64 = 400.0;
const PAD_ATTACK_MS: f64 = 20.0;
const PAD_RELEASE_MS: f64 = 100.0;

const DUCK_ENVELOPE_MS: f64 = 150.0;

pub fn render(arrangement: &Arrangement) -> Vec<u8> {
    let total_samples = ms_to_samples(arrangement.total_duration_ms, SAMPLE_RATE) + 1;
    let mut mix = vec![0.0f32; total_samples];

    let kick_lane = arrangement.drum_lanes.iter().find(|l| l.name == "kick");
    let duck_env = kick_lane
        .map(|lane| duck_envelope(lane, total_samples))
        .unwrap_or_else(|| vec![0.0; total_samples]);

    for lane in arrangement.drum_lanes.iter() {
        add_drum_lane(&mut mix, lane);
    }
    if let Some(lane) = &arrangement.bass_lane {
        add_pitched_lane(&mut mix, lane, &duck_env, render_bass);
    }
    if let Some(lane) = &arrangement.pad_lane {
        add_pitched_lane(&mut mix, lane, &duck_env, render_pad);
    }
    if let Some(lane) = &arrangement.arp_lane {
        add_pitched_lane(&mut mix, lane, &duck_env, render_bass);
    }

    let limited = limit(&mix);
    encode_wav(&limited)
}

fn add_drum_lane(mix: &mut [f32], lane: &Lane) {
    for note in &lane.events {
        let gain = velocity_gain(note.velocity);
        let voice = match lane.name.as_str() {
            "kick" => render_kick(gain),
            "snare" => render_snare(gain),
            "hat" => render_hat(gain),
            _ => continue,
        };
        mix_into(mix, &voice, ms_to_samples(note.timestamp_ms, SAMPLE_RATE));
    }
}

fn add_pitched_lane(
    mix: &mut [f32],
    lane: &Lane,
    duck_env: &[f64],
    voice_fn: impl Fn(f64, f64, f64) -> Vec<f32>,
) {
    for note in &lane.events {
        let pitch = note.effective_pitch(lane.midi_note);
        let freq = midi_to_freq(pitch);
        let gain = velocity_gain(note.velocity);
        let voice = voice_fn(freq, note.duration_ms, gain);

        let start = ms_to_samples(note.timestamp_ms, SAMPLE_RATE);
        for (i, &sample) in voice.iter().enumerate() {
            let idx = start + i;
            if idx >= mix.len() {
                break;
            }
            let duck = 1.0 - lane.duck_amount * duck_env.get(idx).copied().unwrap_or(0.0);
            mix[idx] += sample * duck as f32;
        }
    }
}

fn mix_into(mix: &mut [f32], voice: &[f32], start: usize) {
    for (i, &sample) in voice.iter().enumerate() {
        let idx = start + i;
        if idx >= mix.len() {
            break;
        }
        mix[idx] += sample;
    }
}

fn duck_envelope(kick_lane: &Lane, total_samples: usize) -> Vec<f64> {
    let mut env = vec![0.0f64; total_samples];
    for note in &kick_lane.events {
        let start = ms_to_samples(note.timestamp_ms, SAMPLE_RATE);
        let tail = ms_to_samples(DUCK_ENVELOPE_MS, SAMPLE_RATE);
        for i in 0..tail {
            let idx = start + i;
            if idx >= env.len() {
                break;
            }
            let t_ms = i as f64 * 1000.0 / SAMPLE_RATE as f64;
            let value = (-t_ms / (DUCK_ENVELOPE_MS / 3.0)).exp();
            env[idx] = env[idx].max(value);
        }
    }
    env
}

fn render_kick(gain: f64) -> Vec<f32> {
    let n = ms_to_samples(KICK_TOTAL_MS, SAMPLE_RATE);
    let sweep_samples = ms_to_samples(KICK_SWEEP_MS, SAMPLE_RATE).max(1);
    let mut phase = 0.0f64;
    let mut out = vec![0.0f32; n];

    for i in 0..n {
        let t_ms = i as f64 * 1000.0 / SAMPLE_RATE as f64;
        let freq = if i < sweep_samples {
            KICK_SWEEP_START_HZ
                + (KICK_SWEEP_END_HZ - KICK_SWEEP_START_HZ) * (i as f64 / sweep_samples as f64)
        } else {
            KICK_SWEEP_END_HZ
        };
        phase += 2.0 * std::f64::consts::PI * freq / SAMPLE_RATE as f64;
        let envelope = (-t_ms / KICK_DECAY_TAU_MS).exp();
        out[i] = (phase.sin() * envelope * gain) as f32;
    }
    out
}

fn render_snare(gain: f64) -> Vec<f32> {
    let n_noise = ms_to_samples(SNARE_NOISE_MS, SAMPLE_RATE);
    let n_body = ms_to_samples(SNARE_BODY_MS, SAMPLE_RATE);
    let n = n_noise.max(n_body);
    let mut out = vec![0.0f32; n];

    let mut noise = Noise::new(0x5A17_3E21_9B4D_2C11);
    let mut highpass = BiquadRunner::new(BiquadCoeffs::highpass(
        SAMPLE_RATE as f64,
        SNARE_BAND_CENTER_HZ / 1.5,
        SNARE_BAND_Q,
    ));
    let mut lowpass = BiquadRunner::new(BiquadCoeffs::lowpass(
        SAMPLE_RATE as f64,
        SNARE_BAND_CENTER_HZ * 1.5,
        SNARE_BAND_Q,
    ));
    for i in 0..n_noise {
        let t_ms = i as f64 * 1000.0 / SAMPLE_RATE as f64;
        let raw = noise.next_sample();
        let filtered = lowpass.process(highpass.process(raw));
        let envelope = (-t_ms / SNARE_NOISE_DECAY_TAU_MS).exp();
        out[i] += (filtered * envelope * gain) as f32;
    }

    let mut body_phase = 0.0f64;
    for i in 0..n_body {
        let t_ms = i as f64 * 1000.0 / SAMPLE_RATE as f64;
        body_phase += 2.0 * std::f64::consts::PI * SNARE_BODY_HZ / SAMPLE_RATE as f64;
        let envelope = (-t_ms / SNARE_BODY_DECAY_TAU_MS).exp();
        out[i] += (body_phase.sin() * envelope * gain) as f32;
    }
    out
}

fn render_hat(gain: f64) -> Vec<f32> {
    let n = ms_to_samples(HAT_MS, SAMPLE_RATE);
    let mut out = vec![0.0f32; n];
    let mut noise = Noise::new(0x9E37_79B9_7F4A_7C15);
    let mut highpass = BiquadRunner::new(BiquadCoeffs::highpass(
        SAMPLE_RATE as f64,
        HAT_HIGHPASS_HZ,
        0.707,
    ));

    for i in 0..n {
        let t_ms = i as f64 * 1000.0 / SAMPLE_RATE as f64;
        let filtered = highpass.process(noise.next_sample());
        let envelope = (-t_ms / HAT_DECAY_TAU_MS).exp();
        out[i] = (filtered * envelope * gain) as f32;
    }
    out
}

fn render_bass(freq_hz: f64, duration_ms: f64, gain: f64) -> Vec<f32> {
    let release_ms = duration_ms.min(BASS_MAX_RELEASE_MS);
    let n = ms_to_samples(duration_ms + release_ms, SAMPLE_RATE).max(1);
    let mut out = vec![0.0f32; n];
    let mut lowpass = BiquadRunner::new(BiquadCoeffs::lowpass(SAMPLE_RATE as f64, BASS_LOWPASS_HZ, 0.707));
    let mut phase = 0.0f64;

    for (i, slot) in out.iter_mut().enumerate() {
        let t_ms = i as f64 * 1000.0 / SAMPLE_RATE as f64;
        phase = (phase + freq_hz / SAMPLE_RATE as f64).fract();
        let saw = 2.0 * phase - 1.0;
        let filtered = lowpass.process(saw);
        let envelope = adsr_envelope(t_ms, duration_ms, release_ms);
        *slot = (filtered * envelope * gain) as f32;
    }
    out
}

fn render_pad(freq_hz: f64, duration_ms: f64, gain: f64) -> Vec<f32> {
    let n = ms_to_samples(duration_ms + PAD_RELEASE_MS, SAMPLE_RATE).max(1);
    let mut out = vec![0.0f32; n];
    let mut lowpass = BiquadRunner::new(BiquadCoeffs::lowpass(SAMPLE_RATE as f64, PAD_LOWPASS_START_HZ, 0.707));
    let mut phase = 0.0f64;

    for (i, slot) in out.iter_mut().enumerate() {
        let t_ms = i as f64 * 1000.0 / SAMPLE_RATE as f64;
        phase = (phase + freq_hz / SAMPLE_RATE as f64).fract();
        let square = if phase < 0.5 { 1.0 } else { -1.0 };

        let sweep_progress = if duration_ms > 0.0 {
            (t_ms.min(duration_ms) / duration_ms).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let cutoff = PAD_LOWPASS_START_HZ + (PAD_LOWPASS_END_HZ - PAD_LOWPASS_START_HZ) * sweep_progress;
        lowpass.set_coeffs(BiquadCoeffs::lowpass(SAMPLE_RATE as f64, cutoff, 0.707));
        let filtered = lowpass.process(square);

        let envelope = if t_ms < PAD_ATTACK_MS {
            t_ms / PAD_ATTACK_MS
        } else if t_ms < duration_ms {
            1.0
        } else {
            (1.0 - (t_ms - duration_ms) / PAD_RELEASE_MS).max(0.0)
        };
        *slot = (filtered * envelope * gain) as f32;
    }
    out
}

fn adsr_envelope(t_ms: f64, duration_ms: f64, release_ms: f64) -> f64 {
    if t_ms < BASS_ATTACK_MS {
        t_ms / BASS_ATTACK_MS
    } else if t_ms < BASS_ATTACK_MS + BASS_DECAY_MS {
        1.0 - (1.0 - BASS_SUSTAIN_LEVEL) * (t_ms - BASS_ATTACK_MS) / BASS_DECAY_MS
    } else if t_ms < duration_ms {
        BASS_SUSTAIN_LEVEL
    } else {
        let release_t = t_ms - duration_ms;
        (BASS_SUSTAIN_LEVEL * (1.0 - release_t / release_ms)).max(0.0)
    }
}

fn velocity_gain(velocity: u8) -> f64 {
    velocity as f64 / 127.0
}

fn midi_to_freq(note: u8) -> f64 {
    440.0 * 2f64.powf((note as f64 - 69.0) / 12.0)
}

fn ms_to_samples(ms: f64, sample_rate: u32) -> usize {
    (ms.max(0.0) / 1000.0 * sample_rate as f64).round() as usize
}

fn limit(mix: &[f32]) -> Vec<f32> {
    let threshold_db = 20.0 * OUTPUT_CEILING.log10();
    let mut limiter = Limiter::new(LimiterConfig {
        sample_rate: SAMPLE_RATE as usize,
        threshold_db,
        release_ms: 50.0,
        lookahead_ms: 5.0,
        isr_enabled: true,
        oversampling: 1,
    });
    let (processed, _) = limiter.process(mix);
    processed
}

fn encode_wav(samples: &[f32]) -> Vec<u8> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).expect("in-memory WAV writer cannot fail");
        for &sample in samples {
            let clamped = sample.clamp(-1.0, 1.0);
            let pcm = (clamped * i16::MAX as f32).round() as i16;
            writer.write_sample(pcm).expect("in-memory WAV write cannot fail");
        }
        writer.finalize().expect("in-memory WAV finalize cannot fail");
    }
    cursor.into_inner()
}

/// Minimal xorshift64* generator used only to produce a reproducible noise
/// source for the snare/hat voices. Fixed-seeded per voice so rendering the
/// same arrangement twice is byte-identical; not a source of entropy.
struct Noise {
    state: u64,
}

impl Noise {
    fn new(seed: u64) -> Self {
        Self { state: seed | 1 }
    }

    fn next_sample(&mut self) -> f64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        (x >> 11) as f64 / (1u64 << 53) as f64 * 2.0 - 1.0
    }
}

/// Direct-Form-II-Transposed runner built on the teacher's `BiquadCoeffs`,
/// carried here rather than `biquad_filter::BiquadCascade` because voices
/// need to swap coefficients mid-buffer (the pad's sweeping lowpass).
struct BiquadRunner {
    coeffs: BiquadCoeffs,
    z1: f64,
    z2: f64,
}

impl BiquadRunner {
    fn new(coeffs: BiquadCoeffs) -> Self {
        Self { coeffs, z1: 0.0, z2: 0.0 }
    }

    fn set_coeffs(&mut self, coeffs: BiquadCoeffs) {
        self.coeffs = coeffs;
    }

    fn process(&mut self, input: f64) -> f64 {
        let output = self.coeffs.b0 * input + self.z1;
        self.z1 = self.coeffs.b1 * input - self.coeffs.a1 * output + self.z2;
        self.z2 = self.coeffs.b2 * input - self.coeffs.a2 * output;
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ArrangedNote, BarCount, Template};

    fn arrangement_with_kick() -> Arrangement {
        let mut kick = Lane::new("kick", 36);
        kick.events.push(ArrangedNote {
            timestamp_ms: 0.0,
            duration_ms: 100.0,
            velocity: 110,
            source_event_id: None,
            pitch: None,
        });
        Arrangement {
            drum_lanes: vec![kick],
            bass_lane: None,
            pad_lane: None,
            arp_lane: None,
            template: Template::SynthwaveStraight,
            total_duration_ms: 500.0,
            bar_count: BarCount::One,
            bpm: 120.0,
        }
    }

    #[test]
    fn render_produces_a_parseable_wav() {
        let arrangement = arrangement_with_kick();
        let bytes = render(&arrangement);
        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec().sample_rate, SAMPLE_RATE);
        assert_eq!(reader.spec().channels, 1);
    }

    #[test]
    fn output_never_exceeds_the_limiter_ceiling() {
        let arrangement = arrangement_with_kick();
        let bytes = render(&arrangement);
        let mut reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        let max_sample = reader
            .samples::<i16>()
            .map(|s| s.unwrap().unsigned_abs())
            .max()
            .unwrap_or(0);
        let ceiling = (OUTPUT_CEILING * i16::MAX as f32 * 1.05) as u16;
        assert!(max_sample <= ceiling);
    }

    #[test]
    fn rendering_is_deterministic() {
        let arrangement = arrangement_with_kick();
        let a = render(&arrangement);
        let b = render(&arrangement);
        assert_eq!(a, b);
    }

    #[test]
    fn kick_voice_decays_toward_silence() {
        let voice = render_kick(1.0);
        let head_energy: f32 = voice[..100].iter().map(|s| s.abs()).sum();
        let tail_energy: f32 = voice[voice.len() - 100..].iter().map(|s| s.abs()).sum();
        assert!(tail_energy < head_energy);
    }
}
