//! 4.G Arranger — applies a template's fixed per-bar drum pattern and a
//! theme's harmonic data to quantized events, producing a multi-lane
//! `Arrangement`.
//!
//! The per-bar generation loop and lane bookkeeping are grounded on
//! `chunk_processor.rs`'s fixed-size-window iteration style; template
//! patterns themselves are new data tables (the teacher has no arrangement
//! concept), expressed the way `model.rs`'s `DrumPalette::default` expresses
//! fixed instrument data — small literal structs, no computation.

use crate::model::{
    ArrangedNote, Arrangement, BarCount, ChordQuality, EventClass, GridPlan, Lane, QuantizedEvent,
    Template, Theme, TimeSignature,
};

const DEFAULT_KICK_VELOCITY: u8 = 100;
const DEFAULT_SNARE_VELOCITY: u8 = 100;
const DEFAULT_HAT_VELOCITY: u8 = 80;
const DEFAULT_BASS_VELOCITY: u8 = 95;
const DEFAULT_PAD_VELOCITY: u8 = 70;
const DEFAULT_ARP_VELOCITY: u8 = 85;
const HALFTIME_HAT_VELOCITY_DIP: u8 = 20;

struct DrumPattern {
    kick: Vec<f64>,
    snare: Vec<f64>,
    hat: Vec<f64>,
    hat_velocity_variation: bool,
    bass: Vec<f64>,
}

fn pattern_for(template: Template) -> DrumPattern {
    match template {
        Template::SynthwaveStraight => DrumPattern {
            kick: vec![0.0, 0.5],
            snare: vec![0.25, 0.75],
            hat: eighths(),
            hat_velocity_variation: false,
            bass: vec![0.0, 0.25, 0.5, 0.75],
        },
        Template::SynthwaveHalftime => DrumPattern {
            kick: vec![0.0],
            snare: vec![0.5],
            hat: eighths(),
            hat_velocity_variation: true,
            bass: vec![0.0, 0.5],
        },
        Template::ArpDrive => DrumPattern {
            kick: vec![0.0, 0.25, 0.5, 0.75],
            snare: vec![0.25, 0.75],
            hat: sixteenths(),
            hat_velocity_variation: false,
            bass: vec![0.0],
        },
    }
}

fn eighths() -> Vec<f64> {
    (0..8).map(|i| i as f64 / 8.0).collect()
}

fn sixteenths() -> Vec<f64> {
    (0..16).map(|i| i as f64 / 16.0).collect()
}

pub fn arrange(
    quantized: &[QuantizedEvent],
    grid: &GridPlan,
    theme: &Theme,
    template: Template,
    b_emphasis: f64,
) -> Arrangement {
    let pattern = pattern_for(template);
    let halftime_multiplier = if template.is_halftime() { 2.0 } else { 1.0 };
    let bar_duration_ms = grid.time_signature.numerator() as f64 * grid.beat_ms() * halftime_multiplier;
    let bar_count = grid.bar_count.as_u32();

    let mut kick = Lane::new("kick", theme.drum_palette.kick_note);
    let mut snare = Lane::new("snare", theme.drum_palette.snare_note);
    let mut hat = Lane::new("hat", theme.drum_palette.hat_note);

    for bar in 0..bar_count {
        let bar_start_ms = bar as f64 * bar_duration_ms;
        fill_drum_notes(&mut kick, &pattern.kick, bar_start_ms, bar_duration_ms, DEFAULT_KICK_VELOCITY, false);
        fill_drum_notes(&mut snare, &pattern.snare, bar_start_ms, bar_duration_ms, DEFAULT_SNARE_VELOCITY, false);
        fill_drum_notes(&mut hat, &pattern.hat, bar_start_ms, bar_duration_ms, DEFAULT_HAT_VELOCITY, pattern.hat_velocity_variation);
    }

    let slot_ms = grid.slot_ms();
    for event in quantized {
        let target_lane = match event.event.class {
            EventClass::BilabialPlosive => Some(&mut kick),
            EventClass::HihatNoise => Some(&mut hat),
            EventClass::Click => Some(&mut snare),
            EventClass::HumVoiced => None, // routed to pad below
        };
        if let Some(lane) = target_lane {
            merge_event_into_lane(lane, event, slot_ms);
        }
    }
    sort_and_bump_lane(&mut kick);
    sort_and_bump_lane(&mut snare);
    sort_and_bump_lane(&mut hat);

    apply_b_emphasis(&mut kick, quantized, grid, bar_duration_ms, b_emphasis);
    sort_and_bump_lane(&mut kick);

    let mut bass_lane = Lane::new("bass", theme.root_note);
    bass_lane.duck_amount = b_emphasis;
    generate_bass(&mut bass_lane, theme, &pattern.bass, bar_count, bar_duration_ms);

    let mut pad_lane = Lane::new("pad", theme.root_note);
    pad_lane.duck_amount = b_emphasis;
    generate_pad(&mut pad_lane, theme, bar_count, bar_duration_ms);
    merge_hum_voiced_into_pad(&mut pad_lane, quantized, slot_ms);
    sort_and_bump_lane(&mut pad_lane);

    let arp_lane = if matches!(template, Template::ArpDrive) {
        let mut lane = Lane::new("arp", theme.root_note);
        lane.duck_amount = b_emphasis;
        generate_arp(&mut lane, theme, bar_count, bar_duration_ms);
        Some(lane)
    } else {
        None
    };

    Arrangement {
        drum_lanes: vec![kick, snare, hat],
        bass_lane: Some(bass_lane),
        pad_lane: Some(pad_lane),
        arp_lane,
        template,
        total_duration_ms: bar_count as f64 * bar_duration_ms,
        bar_count: grid.bar_count,
        bpm: grid.bpm,
    }
}

fn fill_drum_notes(
    lane: &mut Lane,
    positions: &[f64],
    bar_start_ms: f64,
    bar_duration_ms: f64,
    base_velocity: u8,
    velocity_variation: bool,
) {
    for (i, &fraction) in positions.iter().enumerate() {
        let velocity = if velocity_variation && i % 2 == 1 {
            base_velocity.saturating_sub(HALFTIME_HAT_VELOCITY_DIP)
        } else {
            base_velocity
        };
        lane.events.push(ArrangedNote {
            timestamp_ms: bar_start_ms + fraction * bar_duration_ms,
            duration_ms: (bar_duration_ms / positions.len() as f64).max(10.0).min(bar_duration_ms),
            velocity,
            source_event_id: None,
            pitch: None,
        });
    }
}

/// Merges a classified input event into its template-implied lane: if a
/// template note already sits within `slot_ms/2`, its velocity/time/
/// provenance are updated in place; otherwise a new note is inserted.
fn merge_event_into_lane(lane: &mut Lane, event: &QuantizedEvent, slot_ms: f64) {
    let velocity = scaled_velocity(template_velocity_for(lane), event.event.confidence);

    let nearest = lane
        .events
        .iter_mut()
        .filter(|n| n.source_event_id.is_none())
        .min_by(|a, b| {
            (a.timestamp_ms - event.quantized_timestamp_ms)
                .abs()
                .partial_cmp(&(b.timestamp_ms - event.quantized_timestamp_ms).abs())
                .unwrap()
        });

    match nearest {
        Some(note) if (note.timestamp_ms - event.quantized_timestamp_ms).abs() <= slot_ms / 2.0 => {
            note.velocity = velocity;
            note.source_event_id = Some(event.event_id.clone());
            note.timestamp_ms = event.quantized_timestamp_ms;
        }
        _ => lane.events.push(ArrangedNote {
            timestamp_ms: event.quantized_timestamp_ms,
            duration_ms: event.event.duration_ms,
            velocity,
            source_event_id: Some(event.event_id.clone()),
            pitch: None,
        }),
    }
}

/// Restores strict timestamp monotonicity after a lane has had events merged
/// or re-snapped out of generation order: sorts by `timestamp_ms`, then bumps
/// any resulting collision forward by 1ms (mirroring `quantize.rs`'s
/// collision bumping for the same reason — stable lane ordering downstream).
fn sort_and_bump_lane(lane: &mut Lane) {
    lane.events.sort_by(|a, b| a.timestamp_ms.partial_cmp(&b.timestamp_ms).unwrap());
    for i in 1..lane.events.len() {
        if lane.events[i].timestamp_ms <= lane.events[i - 1].timestamp_ms {
            lane.events[i].timestamp_ms = lane.events[i - 1].timestamp_ms + 1.0;
        }
    }
}

fn template_velocity_for(lane: &Lane) -> u8 {
    match lane.name.as_str() {
        "kick" => DEFAULT_KICK_VELOCITY,
        "snare" => DEFAULT_SNARE_VELOCITY,
        "hat" => DEFAULT_HAT_VELOCITY,
        _ => DEFAULT_PAD_VELOCITY,
    }
}

fn scaled_velocity(template_vel: u8, confidence: f64) -> u8 {
    (template_vel as f64 * (0.7 + 0.3 * confidence)).round().clamp(1.0, 127.0) as u8
}

fn merge_hum_voiced_into_pad(pad_lane: &mut Lane, quantized: &[QuantizedEvent], slot_ms: f64) {
    for event in quantized {
        if event.event.class != EventClass::HumVoiced {
            continue;
        }
        let velocity = scaled_velocity(DEFAULT_PAD_VELOCITY, event.event.confidence);
        let nearest = pad_lane
            .events
            .iter_mut()
            .filter(|n| n.source_event_id.is_none())
            .min_by(|a, b| {
                (a.timestamp_ms - event.quantized_timestamp_ms)
                    .abs()
                    .partial_cmp(&(b.timestamp_ms - event.quantized_timestamp_ms).abs())
                    .unwrap()
            });
        match nearest {
            Some(note)
                if (note.timestamp_ms - event.quantized_timestamp_ms).abs() <= slot_ms / 2.0 =>
            {
                note.velocity = velocity;
                note.source_event_id = Some(event.event_id.clone());
            }
            _ => pad_lane.events.push(ArrangedNote {
                timestamp_ms: event.quantized_timestamp_ms,
                duration_ms: event.event.duration_ms,
                velocity,
                source_event_id: Some(event.event_id.clone()),
                pitch: None,
            }),
        }
    }
}

fn apply_b_emphasis(
    kick: &mut Lane,
    quantized: &[QuantizedEvent],
    grid: &GridPlan,
    bar_duration_ms: f64,
    b_emphasis: f64,
) {
    let anchor_window_ms = 120.0 * (1.0 - b_emphasis) + 30.0;
    let velocity_boost = (30.0 * b_emphasis).round() as u8;

    let bilabial_ids: std::collections::HashSet<&str> = quantized
        .iter()
        .filter(|e| e.event.class == EventClass::BilabialPlosive)
        .map(|e| e.event_id.as_str())
        .collect();

    for note in kick.events.iter_mut() {
        let is_bilabial = note
            .source_event_id
            .as_deref()
            .map(|id| bilabial_ids.contains(id))
            .unwrap_or(false);
        if !is_bilabial {
            continue;
        }

        let nearest_downbeat = (note.timestamp_ms / bar_duration_ms).round() * bar_duration_ms;
        if (note.timestamp_ms - nearest_downbeat).abs() <= anchor_window_ms {
            note.timestamp_ms = nearest_downbeat;
        }

        note.velocity = note.velocity.saturating_add(velocity_boost).min(127);
    }

    let _ = grid;
}

fn generate_bass(lane: &mut Lane, theme: &Theme, positions: &[f64], bar_count: u32, bar_duration_ms: f64) {
    for bar in 0..bar_count {
        let chord = chord_for_bar(theme, bar);
        let root_midi = chord_root_midi(theme, chord);
        let bar_start_ms = bar as f64 * bar_duration_ms;

        for (i, &fraction) in positions.iter().enumerate() {
            let offset = theme.bass_pattern[i % theme.bass_pattern.len().max(1)];
            lane.events.push(ArrangedNote {
                timestamp_ms: bar_start_ms + fraction * bar_duration_ms,
                duration_ms: bar_duration_ms / positions.len() as f64,
                velocity: DEFAULT_BASS_VELOCITY,
                source_event_id: None,
                pitch: Some((root_midi + offset).clamp(0, 127) as u8),
            });
        }
    }
}

fn generate_pad(lane: &mut Lane, theme: &Theme, bar_count: u32, bar_duration_ms: f64) {
    let mut bar = 0u32;
    while bar < bar_count {
        let chord = chord_for_bar(theme, bar);
        let root_midi = chord_root_midi(theme, chord);
        let bar_start_ms = bar as f64 * bar_duration_ms;
        let span_bars = chord.bars.max(1);
        let remaining_bars = (bar_count - bar).min(span_bars);
        // Pad holds the chord root as a single sustained note; the chord's
        // other tones are implied harmonically (the synth layers them via
        // its own voicing, see `synth.rs`).
        lane.events.push(ArrangedNote {
            timestamp_ms: bar_start_ms,
            duration_ms: remaining_bars as f64 * bar_duration_ms,
            velocity: DEFAULT_PAD_VELOCITY,
            source_event_id: None,
            pitch: Some(root_midi.clamp(0, 127) as u8),
        });
        bar += remaining_bars;
    }
}

fn generate_arp(lane: &mut Lane, theme: &Theme, bar_count: u32, bar_duration_ms: f64) {
    let steps = 16usize;
    for bar in 0..bar_count {
        let chord = chord_for_bar(theme, bar);
        let root_midi = chord_root_midi(theme, chord);
        let bar_start_ms = bar as f64 * bar_duration_ms;
        for step in 0..steps {
            let tone_idx = step % theme.arp_pattern.len().max(1);
            let octave_step = (step / theme.arp_pattern.len().max(1)) as i32 % theme.arp_octave_range.max(1);
            let pitch = root_midi + theme.arp_pattern[tone_idx] + octave_step * 12;
            lane.events.push(ArrangedNote {
                timestamp_ms: bar_start_ms + step as f64 * bar_duration_ms / steps as f64,
                duration_ms: bar_duration_ms / steps as f64,
                velocity: DEFAULT_ARP_VELOCITY,
                source_event_id: None,
                pitch: Some(pitch.clamp(0, 127) as u8),
            });
        }
    }
}

fn chord_for_bar(theme: &Theme, bar: u32) -> crate::model::ChordSpan {
    let mut cursor = 0u32;
    for chord in &theme.chord_progression {
        if bar < cursor + chord.bars {
            return *chord;
        }
        cursor += chord.bars;
    }
    *theme
        .chord_progression
        .last()
        .expect("theme catalog entries always declare at least one chord")
}

fn chord_root_midi(theme: &Theme, chord: crate::model::ChordSpan) -> i32 {
    let degree_idx = (chord.degree.saturating_sub(1)) as usize % 7;
    let interval = theme.scale_family.intervals()[degree_idx];
    theme.root_note as i32 + interval
}

#[allow(dead_code)]
fn chord_quality_label(q: ChordQuality) -> &'static str {
    match q {
        ChordQuality::Major => "major",
        ChordQuality::Minor => "minor",
        ChordQuality::Diminished => "dim",
    }
}
