//! 4.F Quantizer — grid construction, swing, nearest-slot snapping, and
//! lookahead-bounded dropping.
//!
//! Grounded on `median_filter.rs`'s sliding-window style for the nearest-slot
//! search, and on the teacher's general "pure function over a fixed config"
//! shape seen throughout `chunk_processor.rs`.

use crate::model::{Division, Event, GridPlan, QuantizedEvent};

/// Result of quantizing a batch of events: the survivors plus how many were
/// dropped for falling outside the lookahead window (§7: reported, not an
/// error).
pub struct QuantizeOutcome {
    pub events: Vec<QuantizedEvent>,
    pub dropped_outside_lookahead: usize,
}

pub fn quantize(
    events: &[Event],
    grid: &GridPlan,
    quantize_strength: f64,
    lookahead_ms: f64,
) -> QuantizeOutcome {
    let slot_ms = grid.slot_ms();
    let mut out = Vec::with_capacity(events.len());
    let mut dropped = 0usize;

    for event in events {
        let nearest_slot = nearest_grid_slot(event.timestamp_ms, grid);
        let distance = (event.timestamp_ms - nearest_slot).abs();

        if distance > slot_ms / 2.0 + lookahead_ms {
            dropped += 1;
            continue;
        }

        let quantized_timestamp_ms =
            event.timestamp_ms + quantize_strength * (nearest_slot - event.timestamp_ms);

        out.push(QuantizedEvent {
            event_id: event.id.clone(),
            original_timestamp_ms: event.timestamp_ms,
            quantized_timestamp_ms,
            snap_delta_ms: quantized_timestamp_ms - event.timestamp_ms,
            event: event.clone(),
        });
    }

    bump_colliding_timestamps(&mut out);

    QuantizeOutcome {
        events: out,
        dropped_outside_lookahead: dropped,
    }
}

/// Nearest raw-grid-slot time for `t`, accounting for swing on odd 16th
/// slots when the division supports it (≥ 1/8).
///
/// The search is clamped to the grid's valid slot range (`0..total_slots`):
/// the grid only has `bar_count` bars of slots, so an event before the first
/// bar or after the last one snaps to that edge slot, and the resulting
/// distance is what lets the lookahead-dropping check below actually fire.
fn nearest_grid_slot(t: f64, grid: &GridPlan) -> f64 {
    let slot_ms = grid.slot_ms();
    let relative = t - grid.beat_phase_ms;
    let raw_index = (relative / slot_ms).round();
    let last_index = (grid.total_slots() as f64 - 1.0).max(0.0);
    let clamped_index = raw_index.max(0.0).min(last_index);

    let swing_applies = swing_eligible(grid.division) && grid.swing_amount > 0.0;
    let index = clamped_index as i64;
    let base = grid.beat_phase_ms + clamped_index * slot_ms;

    if swing_applies && index.rem_euclid(2) == 1 {
        base + grid.swing_amount * slot_ms * (2.0 / 3.0)
    } else {
        base
    }
}

fn swing_eligible(division: Division) -> bool {
    // "Swing is only applied when division >= 1/8" — Triplet subdivisions
    // have no well-defined "and" to delay, so they are excluded alongside
    // Quarter.
    matches!(division, Division::Eighth | Division::Sixteenth)
}

/// Bumps the timestamp of any event that lands on an already-occupied
/// millisecond by 1 ms, preserving strict monotonicity for downstream
/// lane assembly. Input is assumed sorted by `quantized_timestamp_ms`
/// already (events are produced and consumed in onset order).
fn bump_colliding_timestamps(events: &mut [QuantizedEvent]) {
    events.sort_by(|a, b| {
        a.quantized_timestamp_ms
            .partial_cmp(&b.quantized_timestamp_ms)
            .unwrap()
    });
    for i in 1..events.len() {
        if events[i].quantized_timestamp_ms <= events[i - 1].quantized_timestamp_ms {
            events[i].quantized_timestamp_ms = events[i - 1].quantized_timestamp_ms + 1.0;
        }
    }
}
