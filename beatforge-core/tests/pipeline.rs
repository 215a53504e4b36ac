//! End-to-end scenarios from the pipeline's black-box contract (PCM +
//! Parameters in, Arrangement/MIDI/WAV out), plus the cross-cutting
//! invariants that hold regardless of input.

use beatforge_core::cancellation::CancellationToken;
use beatforge_core::error::PipelineErrorKind;
use beatforge_core::model::{BarCount, Division, Feel, Parameters, Template, TimeSignature};
use std::io::Cursor;

fn default_parameters() -> Parameters {
    Parameters {
        theme: "neon_nights".to_string(),
        template: Template::SynthwaveStraight,
        bpm_override: None,
        time_signature: TimeSignature::FourFour,
        division: Division::Sixteenth,
        feel: Feel::Straight,
        swing_amount: 0.0,
        bar_count: BarCount::Two,
        quantize_strength: 1.0,
        lookahead_ms: 20.0,
        b_emphasis: 0.5,
        calibration_profile: None,
        parallel: false,
    }
}

fn silent_wav(seconds: f64, sample_rate: u32) -> Vec<u8> {
    write_wav(vec![0.0f32; (sample_rate as f64 * seconds) as usize], sample_rate)
}

fn write_wav(samples: Vec<f32>, sample_rate: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for s in samples {
            writer.write_sample((s.clamp(-1.0, 1.0) * 20000.0) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// A broadband burst, the same shape the onset-detector unit tests use to
/// register a spectral-flux jump.
fn burst_at(samples: &mut [f32], idx: usize) {
    for i in 0..64 {
        if idx + i < samples.len() {
            let phase = i as f32 * 0.9;
            samples[idx + i] += phase.sin() * (1.0 - i as f32 / 64.0);
        }
    }
}

fn four_kicks_at_120bpm(sample_rate: u32) -> Vec<u8> {
    let beat_ms = 500.0; // 120 BPM
    let mut samples = vec![0.0f32; (sample_rate as f64 * 2.5) as usize];
    for i in 0..4 {
        let idx = ((0.5 + i as f64 * beat_ms / 1000.0) * sample_rate as f64) as usize;
        burst_at(&mut samples, idx);
    }
    write_wav(samples, sample_rate)
}

/// A regular train of bright, noisy bursts — high zero-crossing-rate energy
/// concentrated above 2kHz, the shape the hihat branch of the classifier
/// expects.
fn hihat_pattern(sample_rate: u32) -> Vec<u8> {
    let mut samples = vec![0.0f32; sample_rate as usize * 2];
    for beat in 0..8 {
        let idx = (beat as f64 * 0.25 * sample_rate as f64) as usize;
        for i in 0..200 {
            if idx + i < samples.len() {
                let t = i as f32 / sample_rate as f32;
                let noise = ((i * 2654435761u32.wrapping_add(beat as u32)) % 1000) as f32 / 500.0 - 1.0;
                samples[idx + i] += noise * (-t / 0.01).exp() * (2.0 * std::f32::consts::PI * 9000.0 * t).sin();
            }
        }
    }
    write_wav(samples, sample_rate)
}

#[test]
fn silence_produces_no_onsets_error() {
    let pcm = silent_wav(2.0, 44100);
    let token = CancellationToken::new();
    let err = beatforge_core::run_pipeline(&pcm, &default_parameters(), &token).unwrap_err();
    assert_eq!(err.stage, "onset");
    assert_eq!(err.kind, PipelineErrorKind::NoOnsets);
}

#[test]
fn four_regular_kicks_quantize_near_the_120bpm_grid() {
    let pcm = four_kicks_at_120bpm(44100);
    let token = CancellationToken::new();
    let output = beatforge_core::run_pipeline(&pcm, &default_parameters(), &token).unwrap();

    assert!((output.arrangement.bpm - 120.0).abs() < 5.0, "bpm={}", output.arrangement.bpm);
    for decision in &output.decisions {
        assert!(decision.snap_delta_ms.abs() < 70.0, "snap_delta={}", decision.snap_delta_ms);
    }
}

#[test]
fn hihat_pattern_classifies_with_reasonable_confidence() {
    let pcm = hihat_pattern(44100);
    let token = CancellationToken::new();
    let output = beatforge_core::run_pipeline(&pcm, &default_parameters(), &token).unwrap();

    let hat_decisions: Vec<_> = output
        .decisions
        .iter()
        .filter(|d| matches!(d.class, beatforge_core::model::EventClass::HihatNoise))
        .collect();
    assert!(!hat_decisions.is_empty(), "expected at least one hihat classification");
    for d in hat_decisions {
        assert!(d.confidence >= 0.5);
    }
}

#[test]
fn b_emphasis_pulls_matched_kicks_toward_bar_downbeats() {
    let pcm = four_kicks_at_120bpm(44100);
    let token = CancellationToken::new();

    let mut low = default_parameters();
    low.b_emphasis = 0.0;
    let mut high = default_parameters();
    high.b_emphasis = 1.0;

    let low_output = beatforge_core::run_pipeline(&pcm, &low, &token).unwrap();
    let high_output = beatforge_core::run_pipeline(&pcm, &high, &token).unwrap();

    let low_kick = low_output.arrangement.drum_lanes.iter().find(|l| l.name == "kick").unwrap();
    let high_kick = high_output.arrangement.drum_lanes.iter().find(|l| l.name == "kick").unwrap();
    let low_max_vel = low_kick.events.iter().map(|n| n.velocity).max().unwrap();
    let high_max_vel = high_kick.events.iter().map(|n| n.velocity).max().unwrap();
    assert!(high_max_vel >= low_max_vel);
}

#[test]
fn swing_feel_shifts_off_beat_hats_later_than_straight() {
    let pcm = four_kicks_at_120bpm(44100);
    let token = CancellationToken::new();

    let mut straight = default_parameters();
    straight.feel = Feel::Straight;
    let mut swung = default_parameters();
    swung.feel = Feel::Swing;
    swung.swing_amount = 1.0;

    let straight_output = beatforge_core::run_pipeline(&pcm, &straight, &token).unwrap();
    let swung_output = beatforge_core::run_pipeline(&pcm, &swung, &token).unwrap();

    // Swing only changes template-generated note placement, not duration;
    // the two runs should at least diverge in hat timing somewhere.
    let straight_hat = straight_output.arrangement.drum_lanes.iter().find(|l| l.name == "hat").unwrap();
    let swung_hat = swung_output.arrangement.drum_lanes.iter().find(|l| l.name == "hat").unwrap();
    let any_diff = straight_hat
        .events
        .iter()
        .zip(swung_hat.events.iter())
        .any(|(a, b)| (a.timestamp_ms - b.timestamp_ms).abs() > 1e-6);
    assert!(any_diff);
}

#[test]
fn events_far_outside_lookahead_are_reported_not_erred() {
    let sample_rate = 44100;
    // A single burst near the end of a 3s clip, with a one-bar grid (2000ms
    // of slots at the 120 BPM fallback): the onset lands ~900ms past the
    // grid's last slot, well outside slot_ms/2 + 0ms lookahead, so it's
    // dropped and reported as a warning, not returned as an error.
    let mut samples = vec![0.0f32; sample_rate as usize * 3];
    burst_at(&mut samples, (2.9 * sample_rate as f64) as usize);
    let pcm = write_wav(samples, sample_rate);

    let mut parameters = default_parameters();
    parameters.bar_count = BarCount::One;
    parameters.lookahead_ms = 0.0;
    let token = CancellationToken::new();
    let output = beatforge_core::run_pipeline(&pcm, &parameters, &token).unwrap();

    let dropped = output.warnings.iter().any(|w| {
        matches!(w, beatforge_core::model::PipelineWarning::EventsDroppedOutsideLookahead { count } if *count > 0)
    });
    assert!(dropped);
}

#[test]
fn repeated_runs_on_the_same_input_are_byte_identical() {
    let pcm = four_kicks_at_120bpm(44100);
    let token = CancellationToken::new();
    let a = beatforge_core::run_pipeline(&pcm, &default_parameters(), &token).unwrap();
    let b = beatforge_core::run_pipeline(&pcm, &default_parameters(), &token).unwrap();
    assert_eq!(a.midi_bytes, b.midi_bytes);
    assert_eq!(a.wav_bytes, b.wav_bytes);
}

#[test]
fn beat_positions_and_quantized_timestamps_stay_monotonic_and_in_bounds() {
    let pcm = four_kicks_at_120bpm(44100);
    let token = CancellationToken::new();
    let output = beatforge_core::run_pipeline(&pcm, &default_parameters(), &token).unwrap();

    for lane in output.arrangement.lanes_in_order() {
        let mut last = f64::NEG_INFINITY;
        for note in &lane.events {
            assert!(note.timestamp_ms >= 0.0);
            assert!(note.timestamp_ms <= output.arrangement.total_duration_ms + 1.0);
            assert!(
                note.timestamp_ms > last,
                "lane {:?} is not strictly monotonic: {} did not follow {}",
                lane.name,
                note.timestamp_ms,
                last
            );
            last = note.timestamp_ms;
        }
    }
}

#[test]
fn every_decision_carries_a_velocity_in_midi_range() {
    let pcm = four_kicks_at_120bpm(44100);
    let token = CancellationToken::new();
    let output = beatforge_core::run_pipeline(&pcm, &default_parameters(), &token).unwrap();

    for lane in output.arrangement.lanes_in_order() {
        for note in &lane.events {
            assert!(note.velocity <= 127);
        }
    }
}

#[test]
fn classifier_is_total_every_decision_has_a_class() {
    let pcm = four_kicks_at_120bpm(44100);
    let token = CancellationToken::new();
    let output = beatforge_core::run_pipeline(&pcm, &default_parameters(), &token).unwrap();
    assert_eq!(output.decisions.len(), output.decisions.iter().filter(|_| true).count());
}

#[test]
fn pipeline_is_idempotent_given_identical_parameters() {
    let pcm = hihat_pattern(44100);
    let token = CancellationToken::new();
    let first = beatforge_core::run_pipeline(&pcm, &default_parameters(), &token).unwrap();
    let second = beatforge_core::run_pipeline(&pcm, &default_parameters(), &token).unwrap();
    assert_eq!(first.decisions.len(), second.decisions.len());
    assert_eq!(first.arrangement.total_duration_ms, second.arrangement.total_duration_ms);
}

#[test]
fn midi_output_round_trips_through_a_standard_parser() {
    let pcm = four_kicks_at_120bpm(44100);
    let token = CancellationToken::new();
    let output = beatforge_core::run_pipeline(&pcm, &default_parameters(), &token).unwrap();
    let smf = midly::Smf::parse(&output.midi_bytes).expect("pipeline must emit a parseable SMF");
    assert!(smf.tracks.len() > 1);
}

#[test]
fn calibration_multiplier_shifts_which_events_classify_as_bilabial() {
    let pcm = four_kicks_at_120bpm(44100);
    let token = CancellationToken::new();

    let mut strict = default_parameters();
    let mut profile = beatforge_core::calibration::CalibrationProfile::default();
    profile.thresholds.insert("bilabial_plosive".to_string(), 10.0);
    strict.calibration_profile = Some(profile);

    let relaxed_output = beatforge_core::run_pipeline(&pcm, &default_parameters(), &token).unwrap();
    let strict_output = beatforge_core::run_pipeline(&pcm, &strict, &token).unwrap();

    let relaxed_bilabial = relaxed_output
        .decisions
        .iter()
        .filter(|d| matches!(d.class, beatforge_core::model::EventClass::BilabialPlosive))
        .count();
    let strict_bilabial = strict_output
        .decisions
        .iter()
        .filter(|d| matches!(d.class, beatforge_core::model::EventClass::BilabialPlosive))
        .count();
    assert!(strict_bilabial <= relaxed_bilabial);
}
