//! osu!mania `.osu` charts.
//!
//! A `.osu` file starts with a `osu file format v<N>` line followed by `[Section]` blocks.
//! Most sections hold `Key: Value` lines, while `[Events]`, `[TimingPoints]` and
//! `[HitObjects]` hold comma separated records. In mania mode the `x` coordinate of a hit
//! object selects its lane.

pub mod parse;
pub mod write;

use std::fmt;

pub use self::{parse::parse, write::write};

/// Width of the osu! playfield in osu!pixels.
pub const PLAYFIELD_WIDTH: f64 = 512.0;

/// Largest lane count osu!mania supports.
pub const MAX_KEY_COUNT: u8 = 18;

/// A section of a `.osu` file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Section {
    /// `[General]`
    General,
    /// `[Editor]`
    Editor,
    /// `[Metadata]`
    Metadata,
    /// `[Difficulty]`
    Difficulty,
    /// `[Events]`
    Events,
    /// `[TimingPoints]`
    TimingPoints,
    /// `[Colours]`
    Colours,
    /// `[HitObjects]`
    HitObjects,
}

impl Section {
    /// All sections in file order.
    pub const ALL: [Self; 8] = [
        Self::General,
        Self::Editor,
        Self::Metadata,
        Self::Difficulty,
        Self::Events,
        Self::TimingPoints,
        Self::Colours,
        Self::HitObjects,
    ];

    /// The name between the brackets.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::General => "General",
            Self::Editor => "Editor",
            Self::Metadata => "Metadata",
            Self::Difficulty => "Difficulty",
            Self::Events => "Events",
            Self::TimingPoints => "TimingPoints",
            Self::Colours => "Colours",
            Self::HitObjects => "HitObjects",
        }
    }

    /// Looks a section up by name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|section| section.name() == name)
    }

    /// Whether the section holds `Key: Value` lines.
    #[must_use]
    pub const fn is_key_value(self) -> bool {
        matches!(
            self,
            Self::General | Self::Editor | Self::Metadata | Self::Difficulty | Self::Colours
        )
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.name())
    }
}

/// The lane a mania hit object at `x` falls in: the playfield is split into `key_count` equal
/// columns.
#[must_use]
pub fn lane_of(x: f64, key_count: u8) -> u8 {
    let last = f64::from(key_count.saturating_sub(1));
    (x * f64::from(key_count) / PLAYFIELD_WIDTH)
        .floor()
        .clamp(0.0, last) as u8
}

/// The `x` coordinate at the centre of `lane`.
#[must_use]
pub fn x_of(lane: u8, key_count: u8) -> u32 {
    (2 * u32::from(lane) + 1) * 256 / u32::from(key_count.max(1))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(64.0, 4, 0)]
    #[case(192.0, 4, 1)]
    #[case(288.0, 4, 2)]
    #[case(448.0, 4, 3)]
    #[case(511.0, 4, 3)]
    #[case(512.0, 4, 3)]
    #[case(-5.0, 4, 0)]
    #[case(36.0, 7, 0)]
    #[case(475.0, 7, 6)]
    fn lanes_from_x(#[case] x: f64, #[case] key_count: u8, #[case] lane: u8) {
        assert_eq!(lane_of(x, key_count), lane);
    }

    #[test]
    fn column_centres_map_back() {
        for key_count in 1..=MAX_KEY_COUNT {
            for lane in 0..key_count {
                let x = x_of(lane, key_count);
                assert_eq!(lane_of(f64::from(x), key_count), lane, "{key_count}K lane {lane}");
            }
        }
    }

    #[test]
    fn section_names() {
        assert_eq!(Section::from_name("TimingPoints"), Some(Section::TimingPoints));
        assert_eq!(Section::from_name("Storyboard"), None);
        assert_eq!(Section::Colours.to_string(), "[Colours]");
    }
}
