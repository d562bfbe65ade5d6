//! Quaver `.qua` charts.
//!
//! A `.qua` file is a YAML mapping. Song information sits in top-level scalar keys, while
//! `TimingPoints`, `SliderVelocities` and `HitObjects` are lists of small mappings:
//!
//! ```yaml
//! AudioFile: audio.mp3
//! Mode: Keys4
//! Title: Song
//! TimingPoints:
//! - Bpm: 120
//! HitObjects:
//! - StartTime: 500
//!   Lane: 1
//!   KeySounds: []
//! ```
//!
//! Lanes are numbered from 1.

pub mod parse;
pub mod write;

pub use self::{parse::parse, write::write};

/// Top-level keys the chart model reads and the writer produces itself.
pub const MANAGED_KEYS: [&str; 17] = [
    "AudioFile",
    "SongPreviewTime",
    "BackgroundFile",
    "Mode",
    "HasScratchKey",
    "Title",
    "Artist",
    "Source",
    "Tags",
    "Creator",
    "DifficultyName",
    "Genre",
    "BPMDoesNotAffectScrollVelocity",
    "InitialScrollVelocity",
    "TimingPoints",
    "SliderVelocities",
    "HitObjects",
];

/// Lane count of a game mode, with the scratch lane added when present.
#[must_use]
pub fn key_count_of(mode: &str, has_scratch_key: bool) -> Option<u8> {
    let keys = match mode {
        "Keys4" => 4,
        "Keys7" => 7,
        _ => return None,
    };
    Some(keys + u8::from(has_scratch_key))
}

/// Game mode and scratch flag for a lane count.
#[must_use]
pub const fn mode_of(key_count: u8) -> Option<(&'static str, bool)> {
    match key_count {
        4 => Some(("Keys4", false)),
        5 => Some(("Keys4", true)),
        7 => Some(("Keys7", false)),
        8 => Some(("Keys7", true)),
        _ => None,
    }
}

/// Signature names Quaver uses for beats per measure.
pub const SIGNATURES: [(&str, u32); 2] = [("Quadruple", 4), ("Triple", 3)];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes() {
        assert_eq!(key_count_of("Keys4", false), Some(4));
        assert_eq!(key_count_of("Keys7", true), Some(8));
        assert_eq!(key_count_of("Keys10", false), None);
        assert_eq!(mode_of(8), Some(("Keys7", true)));
        assert_eq!(mode_of(6), None);
    }
}
