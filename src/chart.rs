//! The format independent chart model.
//!
//! Every parser in this crate produces a [`Chart`] and every writer consumes one (after it went
//! through [`crate::validate::validate`]). All times are milliseconds relative to the start of the
//! audio file and may be negative.

pub mod tempo;

use std::{collections::BTreeMap, fmt, str::FromStr};

use thiserror::Error;

/// A chart file format supported by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Format {
    /// StepMania `.sm`.
    Sm,
    /// osu!mania `.osu`.
    Osu,
    /// Quaver `.qua`.
    Qua,
}

impl Format {
    /// All supported formats.
    pub const ALL: [Self; 3] = [Self::Sm, Self::Osu, Self::Qua];

    /// The file extension without the leading dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Sm => "sm",
            Self::Osu => "osu",
            Self::Qua => "qua",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// The string was not the name of a supported format.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown chart format: {0:?}")]
pub struct UnknownFormat(pub String);

impl FromStr for Format {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().trim_start_matches('.');
        Self::ALL
            .into_iter()
            .find(|format| format.extension().eq_ignore_ascii_case(name))
            .ok_or_else(|| UnknownFormat(s.to_owned()))
    }
}

/// A single playable chart.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Chart {
    /// Song and chart information.
    pub metadata: Metadata,
    /// Number of lanes, must be positive.
    pub key_count: u8,
    /// Tempo changes.
    pub timing_points: Vec<TimingPoint>,
    /// Scroll speed changes, which do not affect note timing.
    pub scroll_velocities: Vec<ScrollVelocity>,
    /// Scroll pauses. Note times already include them.
    pub stops: Vec<Stop>,
    /// Playable notes.
    pub notes: Vec<Note>,
    /// Name of the difficulty, such as `Hard` or `4K Insane`.
    pub difficulty_label: Option<String>,
}

impl Chart {
    /// Creates an empty chart with `key_count` lanes.
    #[must_use]
    pub fn new(key_count: u8) -> Self {
        Self {
            key_count,
            ..Self::default()
        }
    }

    /// Returns the first timing point, which every valid chart has.
    #[must_use]
    pub fn first_timing_point(&self) -> Option<&TimingPoint> {
        self.timing_points.first()
    }

    /// Counts the tap and hold notes, in that order.
    #[must_use]
    pub fn note_counts(&self) -> (usize, usize) {
        let holds = self.notes.iter().filter(|note| note.is_hold()).count();
        (self.notes.len() - holds, holds)
    }
}

/// Song and chart information.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Metadata {
    /// Song title, in the song's own script.
    pub title: Option<String>,
    /// Romanised spelling of the title, when it differs.
    pub alt_title: Option<String>,
    /// Song artist, in the artist's own script.
    pub artist: Option<String>,
    /// Romanised spelling of the artist, when it differs.
    pub alt_artist: Option<String>,
    /// Chart author.
    pub creator: Option<String>,
    /// Where the song comes from, such as a game or an album.
    pub source: Option<String>,
    /// Song genre.
    pub genre: Option<String>,
    /// Search tags.
    pub tags: Vec<String>,
    /// Audio file name, relative to the chart.
    pub audio_file: Option<String>,
    /// Background image file name, relative to the chart.
    pub background_file: Option<String>,
    /// Start of the song preview.
    pub preview_time_ms: Option<f64>,
    /// Format the chart was parsed from. Writers never look at it.
    pub source_format: Option<Format>,
    /// Format specific values without a dedicated field, keyed as `sm.<TAG>`,
    /// `osu.<Section>.<Key>` or `qua.<Key>`. `qua.` values are YAML text.
    pub passthrough: BTreeMap<String, String>,
}

impl Metadata {
    /// Iterates the passthrough entries that belong to `format`, with the namespace prefix
    /// removed from the keys.
    pub fn passthrough_of(&self, format: Format) -> impl Iterator<Item = (&str, &str)> {
        let prefix = format!("{}.", format.extension());
        self.passthrough.iter().filter_map(move |(key, value)| {
            key.strip_prefix(prefix.as_str())
                .map(|rest| (rest, value.as_str()))
        })
    }

    /// Lists the passthrough keys that do not belong to `format`.
    #[must_use]
    pub fn foreign_passthrough_keys(&self, format: Format) -> Vec<String> {
        let prefix = format!("{}.", format.extension());
        self.passthrough
            .keys()
            .filter(|key| !key.starts_with(prefix.as_str()))
            .cloned()
            .collect()
    }
}

/// A tempo change.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimingPoint {
    /// Position of the change.
    pub time_ms: f64,
    /// Beats per minute from this point on.
    pub bpm: f64,
    /// Beats per measure.
    pub meter: u32,
}

impl TimingPoint {
    /// Beats per measure when a format does not say.
    pub const DEFAULT_METER: u32 = 4;

    /// Creates a timing point in common time.
    #[must_use]
    pub const fn new(time_ms: f64, bpm: f64) -> Self {
        Self {
            time_ms,
            bpm,
            meter: Self::DEFAULT_METER,
        }
    }

    /// Length of one beat in milliseconds.
    #[must_use]
    pub fn beat_length_ms(&self) -> f64 {
        60_000.0 / self.bpm
    }
}

/// A scroll speed change.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScrollVelocity {
    /// Position of the change.
    pub time_ms: f64,
    /// Scroll speed relative to the base speed.
    pub multiplier: f64,
}

/// A scroll pause.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Stop {
    /// When the pause starts.
    pub time_ms: f64,
    /// How long the pause lasts.
    pub duration_ms: f64,
}

/// The kind of a [`Note`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NoteKind {
    /// Hit once.
    Tap,
    /// Hit and keep pressed until `end_time_ms`.
    Hold,
}

/// A playable note.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Note {
    /// When the note has to be hit.
    pub time_ms: f64,
    /// When a hold ends. Equals `time_ms` for taps.
    pub end_time_ms: f64,
    /// Zero-indexed lane.
    pub lane: u8,
    /// Tap or hold.
    pub kind: NoteKind,
}

impl Note {
    /// Creates a tap note.
    #[must_use]
    pub const fn tap(time_ms: f64, lane: u8) -> Self {
        Self {
            time_ms,
            end_time_ms: time_ms,
            lane,
            kind: NoteKind::Tap,
        }
    }

    /// Creates a hold note.
    #[must_use]
    pub const fn hold(time_ms: f64, end_time_ms: f64, lane: u8) -> Self {
        Self {
            time_ms,
            end_time_ms,
            lane,
            kind: NoteKind::Hold,
        }
    }

    /// Returns whether this is a hold note.
    #[must_use]
    pub fn is_hold(&self) -> bool {
        self.kind == NoteKind::Hold
    }

    /// Length of the note, zero for taps.
    #[must_use]
    pub fn duration_ms(&self) -> f64 {
        self.end_time_ms - self.time_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_from_str() {
        assert_eq!("sm".parse(), Ok(Format::Sm));
        assert_eq!(".OSU".parse(), Ok(Format::Osu));
        assert_eq!(" Qua ".parse(), Ok(Format::Qua));
        assert_eq!(
            "bms".parse::<Format>(),
            Err(UnknownFormat("bms".to_owned()))
        );
    }

    #[test]
    fn passthrough_namespaces() {
        let mut metadata = Metadata::default();
        metadata
            .passthrough
            .insert("sm.BANNER".into(), "banner.png".into());
        metadata
            .passthrough
            .insert("osu.Difficulty.OverallDifficulty".into(), "8".into());
        assert_eq!(
            metadata.passthrough_of(Format::Sm).collect::<Vec<_>>(),
            vec![("BANNER", "banner.png")]
        );
        assert_eq!(
            metadata.foreign_passthrough_keys(Format::Sm),
            vec!["osu.Difficulty.OverallDifficulty".to_owned()]
        );
    }

    #[test]
    fn note_counts() {
        let mut chart = Chart::new(4);
        chart.notes = vec![
            Note::tap(0.0, 0),
            Note::hold(100.0, 200.0, 1),
            Note::tap(300.0, 2),
        ];
        assert_eq!(chart.note_counts(), (2, 1));
        assert!(chart.notes[1].is_hold());
        assert!((chart.notes[1].duration_ms() - 100.0).abs() < f64::EPSILON);
    }
}
