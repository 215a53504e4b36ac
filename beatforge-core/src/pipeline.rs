//! Orchestrates stages A–I end to end, turning bare `StageResult`s into
//! fully-addressed `PipelineError`s (stage name + input hash attached) and
//! collecting recoverable conditions as `PipelineWarning`s instead of
//! failing the run.

use crate::arranger;
use crate::calibration::CalibrationProfile;
use crate::cancellation::CancellationToken;
use crate::classifier;
use crate::decoder;
use crate::error::{PipelineError, PipelineErrorKind, Result};
use crate::features;
use crate::midi;
use crate::model::{
    DecisionRecord, Division, Event, Feel, GridPlan, Parameters, PipelineOutput, PipelineWarning,
    TimeSignature,
};
use crate::onset::{self, OnsetConfig};
use crate::quantize;
use crate::synth;
use crate::tempo;
use crate::theme;

pub fn run(pcm_bytes: &[u8], parameters: &Parameters, cancellation: &CancellationToken) -> Result<PipelineOutput> {
    let calibration = parameters.calibration_profile.clone().unwrap_or_default();

    // Stage A: decode.
    let buf = decoder::decode(pcm_bytes)?;

    check_cancelled(pcm_bytes, "onset", cancellation)?;

    // Stage B: onset detection.
    let onset_cfg = OnsetConfig {
        threshold: onset::DEFAULT_THRESHOLD * calibration.onset_multiplier(),
        parallel: parameters.parallel,
    };
    let onsets = onset::detect(&buf, &onset_cfg)
        .map_err(|kind| PipelineError::new("onset", pcm_bytes, kind))?;

    check_cancelled(pcm_bytes, "features", cancellation)?;

    // Stages C+D: feature extraction and classification, one event per onset.
    let mut events = Vec::with_capacity(onsets.len());
    for (idx, onset) in onsets.iter().enumerate() {
        let feature_vector = features::extract(&buf, onset);
        let (class, confidence) = classifier::classify(&feature_vector, &calibration);
        events.push(Event {
            id: crate::model::stable_event_id(idx, onset.timestamp_ms),
            timestamp_ms: onset.timestamp_ms,
            duration_ms: onset::default_duration_ms(),
            class,
            confidence,
            features: feature_vector,
        });
    }

    check_cancelled(pcm_bytes, "tempo", cancellation)?;

    // Stage E: tempo/beat-grid estimation.
    let tempo_estimate = tempo::estimate(&onsets, buf.duration_ms());
    let mut warnings = Vec::new();

    let bpm = match parameters.bpm_override {
        Some(bpm) => bpm,
        None if tempo_estimate.confidence < tempo::LOW_CONFIDENCE_THRESHOLD => {
            warnings.push(PipelineWarning::TempoLowConfidence {
                fallback_bpm: tempo::FALLBACK_BPM,
                confidence: tempo_estimate.confidence,
            });
            tempo::FALLBACK_BPM
        }
        None => tempo_estimate.bpm,
    };
    let beat_phase_ms = tempo_estimate.beat_positions_ms.first().copied().unwrap_or(0.0);

    let grid = GridPlan {
        bpm,
        time_signature: parameters.time_signature,
        division: parameters.division,
        feel: parameters.feel,
        swing_amount: swing_amount_for(parameters),
        bar_count: parameters.bar_count,
        beat_phase_ms,
    };

    check_cancelled(pcm_bytes, "quantize", cancellation)?;

    // Stage F: quantization.
    let outcome = quantize::quantize(&events, &grid, parameters.quantize_strength, parameters.lookahead_ms);
    if outcome.dropped_outside_lookahead > 0 {
        warnings.push(PipelineWarning::EventsDroppedOutsideLookahead {
            count: outcome.dropped_outside_lookahead,
        });
    }

    check_cancelled(pcm_bytes, "arrange", cancellation)?;

    // Theme lookup + Stage G: arrangement.
    let theme = theme::lookup(&parameters.theme).map_err(|kind| PipelineError::new("arrange", pcm_bytes, kind))?;
    let arrangement = arranger::arrange(&outcome.events, &grid, &theme, parameters.template, parameters.b_emphasis);

    check_cancelled(pcm_bytes, "midi", cancellation)?;

    // Stage H: MIDI encoding.
    let midi_bytes = midi::encode(&arrangement);

    check_cancelled(pcm_bytes, "synth", cancellation)?;

    // Stage I: offline synth render.
    let wav_bytes = synth::render(&arrangement);

    let decisions = outcome
        .events
        .iter()
        .map(|qe| DecisionRecord {
            event_id: qe.event_id.clone(),
            original_timestamp_ms: qe.original_timestamp_ms,
            quantized_timestamp_ms: qe.quantized_timestamp_ms,
            snap_delta_ms: qe.snap_delta_ms,
            class: qe.event.class,
            confidence: qe.event.confidence,
            mapped_to: mapped_lanes_for(&qe.event_id, &arrangement),
            features: qe.event.features,
        })
        .collect();

    Ok(PipelineOutput {
        arrangement,
        midi_bytes,
        wav_bytes,
        decisions,
        warnings,
    })
}

fn check_cancelled(pcm_bytes: &[u8], stage: &'static str, cancellation: &CancellationToken) -> Result<()> {
    if cancellation.is_cancelled() {
        return Err(PipelineError::new(stage, pcm_bytes, PipelineErrorKind::Cancelled));
    }
    Ok(())
}

fn swing_amount_for(parameters: &Parameters) -> f64 {
    match parameters.feel {
        Feel::Swing => parameters.swing_amount,
        Feel::Straight | Feel::Halftime => 0.0,
    }
}

fn mapped_lanes_for(event_id: &str, arrangement: &crate::model::Arrangement) -> Vec<String> {
    arrangement
        .lanes_in_order()
        .iter()
        .filter(|lane| lane.events.iter().any(|n| n.source_event_id.as_deref() == Some(event_id)))
        .map(|lane| lane.name.clone())
        .collect()
}
