//! 4.H MidiEncoder — Standard MIDI File, Format 1, 480 PPQ.
//!
//! Grounded on `other_examples/.../LjungrennAudio-random-midi-gen-util`'s
//! `main.rs`: absolute-tick event collection, `event_order_key` tie-break
//! (note-off before note-on at identical ticks) and the delta-encode-then-
//! push-EndOfTrack shape are taken directly from it, adapted from that
//! tool's single track to one track per lane.

use crate::model::Arrangement;
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind};

const PPQ: u16 = 480;
const DEFAULT_CHANNEL: u8 = 0;

pub fn encode(arrangement: &Arrangement) -> Vec<u8> {
    let lanes = arrangement.lanes_in_order();
    let name_bytes: Vec<Vec<u8>> = lanes.iter().map(|l| l.name.clone().into_bytes()).collect();

    let mut tracks: Vec<Track> = Vec::with_capacity(lanes.len() + 1);
    tracks.push(tempo_track(arrangement));

    for (lane, names) in lanes.iter().zip(name_bytes.iter()) {
        tracks.push(lane_track(lane, names, arrangement.bpm));
    }

    let header = Header::new(Format::Parallel, Timing::Metrical(PPQ.into()));
    let smf = Smf { header, tracks };

    let mut buf = Vec::new();
    smf.write(&mut buf).expect("in-memory MIDI write cannot fail");
    buf
}

fn tempo_track(arrangement: &Arrangement) -> Track<'static> {
    let us_per_quarter = (60_000_000.0 / arrangement.bpm).round() as u32;
    vec![
        TrackEvent {
            delta: 0.into(),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(us_per_quarter.into())),
        },
        TrackEvent {
            delta: 0.into(),
            kind: TrackEventKind::Meta(MetaMessage::TimeSignature(4, 2, 24, 8)),
        },
        TrackEvent {
            delta: 0.into(),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        },
    ]
}

fn event_order_key(kind: &TrackEventKind) -> u8 {
    match kind {
        TrackEventKind::Midi { message, .. } => match message {
            MidiMessage::NoteOff { .. } => 0,
            MidiMessage::NoteOn { .. } => 1,
            _ => 2,
        },
        TrackEventKind::Meta(_) => 3,
        TrackEventKind::SysEx(_) | TrackEventKind::Escape(_) => 4,
    }
}

fn lane_track<'a>(lane: &'a crate::model::Lane, name_bytes: &'a [u8], bpm: f64) -> Track<'a> {
    let mut abs_events: Vec<(u32, TrackEventKind<'a>)> = Vec::new();

    abs_events.push((0, TrackEventKind::Meta(MetaMessage::TrackName(name_bytes))));

    for note in &lane.events {
        let pitch = note.effective_pitch(lane.midi_note);
        let on_tick = ms_to_ticks(note.timestamp_ms, bpm);
        let off_tick = ms_to_ticks(note.timestamp_ms + note.duration_ms, bpm);

        abs_events.push((
            on_tick,
            TrackEventKind::Midi {
                channel: DEFAULT_CHANNEL.into(),
                message: MidiMessage::NoteOn {
                    key: pitch.into(),
                    vel: note.velocity.into(),
                },
            },
        ));
        abs_events.push((
            off_tick.max(on_tick + 1),
            TrackEventKind::Midi {
                channel: DEFAULT_CHANNEL.into(),
                message: MidiMessage::NoteOff {
                    key: pitch.into(),
                    vel: 0.into(),
                },
            },
        ));
    }

    abs_events.sort_by(|(ta, ea), (tb, eb)| {
        ta.cmp(tb).then_with(|| event_order_key(ea).cmp(event_order_key(eb)))
    });

    let mut track = Vec::with_capacity(abs_events.len() + 1);
    let mut last_tick = 0u32;
    for (tick, kind) in abs_events {
        let delta = tick.saturating_sub(last_tick);
        last_tick = tick;
        track.push(TrackEvent {
            delta: delta.into(),
            kind,
        });
    }
    track.push(TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    track
}

fn ms_to_ticks(ms: f64, bpm: f64) -> u32 {
    let beat_ms = 60_000.0 / bpm;
    let quarters = ms.max(0.0) / beat_ms;
    (quarters * PPQ as f64).round() as u32
}
