use serde::{Deserialize, Serialize};

/// A decoded, normalized monaural sample buffer.
///
/// Invariant: every sample is clipped to `[-1.0, 1.0]`; `samples.len() <=
/// 30 * sample_rate` (the 30s clip-length cap from the data model).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl SampleBuffer {
    pub fn duration_ms(&self) -> f64 {
        self.samples.len() as f64 * 1000.0 / self.sample_rate as f64
    }
}

/// The four percussive/voiced classes a detected onset can be mapped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventClass {
    BilabialPlosive,
    HihatNoise,
    Click,
    HumVoiced,
}

/// Fixed-shape acoustic feature vector computed per onset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub spectral_centroid: f64,
    pub zcr: f64,
    pub low_band_energy: f64,
    pub mid_band_energy: f64,
    pub high_band_energy: f64,
    pub peak_amplitude: f64,
}

/// A detected and classified onset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub timestamp_ms: f64,
    pub duration_ms: f64,
    pub class: EventClass,
    pub confidence: f64,
    pub features: FeatureVector,
}

/// Content-derived, stable event id: `{index:04}-{fnv1a(index, ts_bits):016x}`.
///
/// Deliberately avoids `std::collections::hash_map::RandomState`, which is
/// reseeded per process and would break the determinism invariant in §8 of
/// the spec.
pub fn stable_event_id(index: usize, timestamp_ms: f64) -> String {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    let mut hash = FNV_OFFSET;
    for byte in (index as u64).to_le_bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    for byte in timestamp_ms.to_bits().to_le_bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }

    format!("{index:04}-{hash:016x}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeSignature {
    FourFour,
    ThreeFour,
}

impl TimeSignature {
    pub fn numerator(&self) -> u32 {
        match self {
            TimeSignature::FourFour => 4,
            TimeSignature::ThreeFour => 3,
        }
    }

    pub fn denominator(&self) -> u32 {
        4
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Division {
    Quarter,
    Eighth,
    Sixteenth,
    Triplet,
}

impl Division {
    /// Number of grid subdivisions per beat for this division.
    pub fn steps_per_beat(&self) -> u32 {
        match self {
            Division::Quarter => 1,
            Division::Eighth => 2,
            Division::Sixteenth => 4,
            Division::Triplet => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Feel {
    Straight,
    Swing,
    Halftime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BarCount {
    One = 1,
    Two = 2,
    Four = 4,
    Eight = 8,
    Sixteen = 16,
}

impl BarCount {
    pub fn as_u32(&self) -> u32 {
        *self as u32
    }
}

/// Grid plan derived from tempo estimation (or an explicit override) plus
/// the caller's rhythmic-feel choices.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GridPlan {
    pub bpm: f64,
    pub time_signature: TimeSignature,
    pub division: Division,
    pub feel: Feel,
    pub swing_amount: f64,
    pub bar_count: BarCount,
    pub beat_phase_ms: f64,
}

impl GridPlan {
    pub fn beat_ms(&self) -> f64 {
        60_000.0 / self.bpm
    }

    /// Grid slot spacing in ms for this plan's division.
    pub fn slot_ms(&self) -> f64 {
        self.beat_ms() / self.division.steps_per_beat() as f64
    }

    /// Total duration spanned by the grid's `bar_count` bars, in ms.
    pub fn total_ms(&self) -> f64 {
        self.bar_count.as_u32() as f64 * self.time_signature.numerator() as f64 * self.beat_ms()
    }

    /// Number of discrete slots across the whole grid (last valid index is
    /// one less than this).
    pub fn total_slots(&self) -> u32 {
        self.bar_count.as_u32() * self.time_signature.numerator() * self.division.steps_per_beat()
    }
}

/// An event after grid-quantization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantizedEvent {
    pub event_id: String,
    pub original_timestamp_ms: f64,
    pub quantized_timestamp_ms: f64,
    pub snap_delta_ms: f64,
    pub event: Event,
}

/// A single note emitted into a `Lane`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ArrangedNote {
    pub timestamp_ms: f64,
    pub duration_ms: f64,
    pub velocity: u8,
    pub source_event_id: Option<String>,
    /// Overrides the lane's `midi_note` for this one note. Drum lanes leave
    /// this `None` (every hit shares the lane's fixed note); bass/arp lanes
    /// set it per-note since their pitch follows the theme's chord
    /// progression.
    pub pitch: Option<u8>,
}

impl ArrangedNote {
    pub fn effective_pitch(&self, lane_midi_note: u8) -> u8 {
        self.pitch.unwrap_or(lane_midi_note)
    }
}

/// An ordered note stream for one instrument/drum part.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lane {
    pub name: String,
    pub midi_note: u8,
    pub events: Vec<ArrangedNote>,
    /// Sidechain duck amount consumed by the offline synth, set by the
    /// arranger's B-emphasis stage. Only meaningful on pitched lanes.
    pub duck_amount: f64,
}

impl Lane {
    pub fn new(name: impl Into<String>, midi_note: u8) -> Self {
        Self {
            name: name.into(),
            midi_note,
            events: Vec::new(),
            duck_amount: 0.0,
        }
    }
}

/// The multi-lane arrangement produced by the arranger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Arrangement {
    pub drum_lanes: Vec<Lane>,
    pub bass_lane: Option<Lane>,
    pub pad_lane: Option<Lane>,
    pub arp_lane: Option<Lane>,
    pub template: Template,
    pub total_duration_ms: f64,
    pub bar_count: BarCount,
    pub bpm: f64,
}

impl Arrangement {
    /// All lanes in the fixed canonical order: kick, snare, hat, bass, pad,
    /// arp. Reproducibility requires this order never depend on hash-map
    /// iteration.
    pub fn lanes_in_order(&self) -> Vec<&Lane> {
        let mut out = Vec::new();
        for name in ["kick", "snare", "hat"] {
            if let Some(lane) = self.drum_lanes.iter().find(|l| l.name == name) {
                out.push(lane);
            }
        }
        for lane in self.drum_lanes.iter() {
            if !["kick", "snare", "hat"].contains(&lane.name.as_str()) {
                out.push(lane);
            }
        }
        if let Some(l) = &self.bass_lane {
            out.push(l);
        }
        if let Some(l) = &self.pad_lane {
            out.push(l);
        }
        if let Some(l) = &self.arp_lane {
            out.push(l);
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Template {
    SynthwaveStraight,
    SynthwaveHalftime,
    ArpDrive,
}

impl Template {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "SynthwaveStraight" => Some(Template::SynthwaveStraight),
            "SynthwaveHalftime" => Some(Template::SynthwaveHalftime),
            "ArpDrive" => Some(Template::ArpDrive),
            _ => None,
        }
    }

    pub fn is_halftime(&self) -> bool {
        matches!(self, Template::SynthwaveHalftime)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleFamily {
    Minor,
    Major,
    Dorian,
    Phrygian,
}

impl ScaleFamily {
    /// Semitone offsets from the root for scale degrees 1..7.
    pub fn intervals(&self) -> [i32; 7] {
        match self {
            ScaleFamily::Minor => [0, 2, 3, 5, 7, 8, 10],
            ScaleFamily::Major => [0, 2, 4, 5, 7, 9, 11],
            ScaleFamily::Dorian => [0, 2, 3, 5, 7, 9, 10],
            ScaleFamily::Phrygian => [0, 1, 3, 5, 7, 8, 10],
        }
    }
}

/// One chord in a theme's progression: a root scale-degree (1-indexed),
/// a quality, and how many bars it holds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChordSpan {
    pub degree: u8,
    pub quality: ChordQuality,
    pub bars: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChordQuality {
    Major,
    Minor,
    Diminished,
}

impl ChordQuality {
    /// Semitone offsets from the chord root.
    pub fn intervals(&self) -> &'static [i32] {
        match self {
            ChordQuality::Major => &[0, 4, 7],
            ChordQuality::Minor => &[0, 3, 7],
            ChordQuality::Diminished => &[0, 3, 6],
        }
    }
}

/// Read-only catalog entry describing one harmonic/timbral palette.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Theme {
    pub name: String,
    pub bpm_range: (f64, f64),
    pub root_note: u8,
    pub scale_family: ScaleFamily,
    pub chord_progression: Vec<ChordSpan>,
    pub bass_pattern: Vec<i32>,
    pub arp_pattern: Vec<i32>,
    pub arp_octave_range: i32,
    pub drum_palette: DrumPalette,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DrumPalette {
    pub kick_note: u8,
    pub snare_note: u8,
    pub hat_note: u8,
}

impl Default for DrumPalette {
    fn default() -> Self {
        Self {
            kick_note: 36,
            snare_note: 38,
            hat_note: 42,
        }
    }
}

/// The pipeline's whole parameter surface; output is a pure function of
/// `(pcm, parameters)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameters {
    pub theme: String,
    pub template: Template,
    pub bpm_override: Option<f64>,
    pub time_signature: TimeSignature,
    pub division: Division,
    pub feel: Feel,
    pub swing_amount: f64,
    pub bar_count: BarCount,
    pub quantize_strength: f64,
    pub lookahead_ms: f64,
    pub b_emphasis: f64,
    pub calibration_profile: Option<crate::calibration::CalibrationProfile>,
    /// Opt into rayon-parallel FFT frame computation in stages B/C. Must not
    /// change output; see §5 of the expanded spec.
    #[serde(default)]
    pub parallel: bool,
}

/// Per-input-event explainability record (Output C).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub event_id: String,
    pub original_timestamp_ms: f64,
    pub quantized_timestamp_ms: f64,
    pub snap_delta_ms: f64,
    pub class: EventClass,
    pub confidence: f64,
    pub mapped_to: Vec<String>,
    pub features: FeatureVector,
}

/// Non-fatal conditions recovered locally by the pipeline and reported on
/// the result rather than surfaced as errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineWarning {
    TempoLowConfidence { fallback_bpm: f64, confidence: f64 },
    EventsDroppedOutsideLookahead { count: usize },
}

/// Final output of a full pipeline invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub arrangement: Arrangement,
    pub midi_bytes: Vec<u8>,
    pub wav_bytes: Vec<u8>,
    pub decisions: Vec<DecisionRecord>,
    pub warnings: Vec<PipelineWarning>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_ids_are_deterministic() {
        let a = stable_event_id(3, 512.5);
        let b = stable_event_id(3, 512.5);
        assert_eq!(a, b);
    }

    #[test]
    fn stable_ids_differ_by_index_or_time() {
        assert_ne!(stable_event_id(0, 500.0), stable_event_id(1, 500.0));
        assert_ne!(stable_event_id(0, 500.0), stable_event_id(0, 501.0));
    }

    #[test]
    fn grid_plan_slot_ms() {
        let grid = GridPlan {
            bpm: 120.0,
            time_signature: TimeSignature::FourFour,
            division: Division::Sixteenth,
            feel: Feel::Straight,
            swing_amount: 0.0,
            bar_count: BarCount::Four,
            beat_phase_ms: 0.0,
        };
        assert!((grid.beat_ms() - 500.0).abs() < 1e-9);
        assert!((grid.slot_ms() - 125.0).abs() < 1e-9);
    }
}
