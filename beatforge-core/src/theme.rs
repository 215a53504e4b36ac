//! Read-only theme catalog. Entries are static data, grounded on the
//! teacher's `DrumPalette`-adjacent `Default` style in `model.rs` — a theme
//! is just a fixed bundle of numbers, not a computed thing.

use crate::error::StageResult;
use crate::error::PipelineErrorKind;
use crate::model::{ChordQuality, ChordSpan, DrumPalette, ScaleFamily, Theme};

pub fn lookup(name: &str) -> StageResult<Theme> {
    catalog()
        .into_iter()
        .find(|t| t.name == name)
        .ok_or_else(|| PipelineErrorKind::ThemeUnknown(name.to_string()))
}

pub fn catalog() -> Vec<Theme> {
    vec![neon_nights(), midnight_drive(), chrome_pulse()]
}

fn neon_nights() -> Theme {
    Theme {
        name: "neon_nights".to_string(),
        bpm_range: (90.0, 128.0),
        root_note: 45, // A2
        scale_family: ScaleFamily::Minor,
        chord_progression: vec![
            ChordSpan { degree: 1, quality: ChordQuality::Minor, bars: 2 },
            ChordSpan { degree: 6, quality: ChordQuality::Major, bars: 2 },
            ChordSpan { degree: 3, quality: ChordQuality::Major, bars: 2 },
            ChordSpan { degree: 5, quality: ChordQuality::Minor, bars: 2 },
        ],
        bass_pattern: vec![0, 0, 7, 0],
        arp_pattern: vec![0, 4, 7, 12],
        arp_octave_range: 2,
        drum_palette: DrumPalette::default(),
    }
}

fn midnight_drive() -> Theme {
    Theme {
        name: "midnight_drive".to_string(),
        bpm_range: (100.0, 140.0),
        root_note: 40, // E2
        scale_family: ScaleFamily::Dorian,
        chord_progression: vec![
            ChordSpan { degree: 1, quality: ChordQuality::Minor, bars: 4 },
            ChordSpan { degree: 4, quality: ChordQuality::Major, bars: 4 },
        ],
        bass_pattern: vec![0, 7, 5, 7],
        arp_pattern: vec![0, 3, 7, 10],
        arp_octave_range: 1,
        drum_palette: DrumPalette::default(),
    }
}

fn chrome_pulse() -> Theme {
    Theme {
        name: "chrome_pulse".to_string(),
        bpm_range: (110.0, 150.0),
        root_note: 48, // C3
        scale_family: ScaleFamily::Major,
        chord_progression: vec![
            ChordSpan { degree: 1, quality: ChordQuality::Major, bars: 2 },
            ChordSpan { degree: 5, quality: ChordQuality::Major, bars: 2 },
            ChordSpan { degree: 6, quality: ChordQuality::Minor, bars: 2 },
            ChordSpan { degree: 4, quality: ChordQuality::Major, bars: 2 },
        ],
        bass_pattern: vec![0, 0, 0, 7],
        arp_pattern: vec![0, 4, 7, 11, 12],
        arp_octave_range: 2,
        drum_palette: DrumPalette::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_themes_resolve() {
        assert!(lookup("neon_nights").is_ok());
        assert!(lookup("midnight_drive").is_ok());
        assert!(lookup("chrome_pulse").is_ok());
    }

    #[test]
    fn unknown_theme_is_an_error() {
        let err = lookup("does_not_exist").unwrap_err();
        assert!(matches!(err, PipelineErrorKind::ThemeUnknown(_)));
    }

    #[test]
    fn catalog_entries_have_at_least_one_chord() {
        for theme in catalog() {
            assert!(!theme.chord_progression.is_empty(), "{}", theme.name);
        }
    }
}
