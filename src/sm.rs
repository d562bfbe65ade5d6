//! StepMania `.sm` charts.
//!
//! A `.sm` file is a list of `#TAG:value;` entries. Song information and timing are shared by
//! every chart in the file, and each `#NOTES` entry holds one chart as a grid of rows, one column
//! per lane, split into measures of four beats by commas.
//!
//! ```text
//! #TITLE:Song;
//! #OFFSET:-0.050;
//! #BPMS:0.000=120.000;
//! #NOTES:
//!      dance-single:
//!      :
//!      Hard:
//!      9:
//!      0.000,0.000,0.000,0.000,0.000:
//! 1000
//! 0200
//! 0300
//! 0001
//! ;
//! ```

pub mod msd;
pub mod parse;
pub mod write;

pub use self::{
    parse::{parse, parse_all},
    write::write,
};

/// StepMania steps types and their lane counts.
pub const STEPS_TYPES: [(&str, u8); 11] = [
    ("dance-threepanel", 3),
    ("dance-single", 4),
    ("pump-single", 5),
    ("dance-solo", 6),
    ("pump-halfdouble", 6),
    ("kb7-single", 7),
    ("dance-double", 8),
    ("dance-couple", 8),
    ("pnm-nine", 9),
    ("pump-double", 10),
    ("pump-couple", 10),
];

/// Lane count of a steps type, if it is known.
#[must_use]
pub fn key_count_of(steps_type: &str) -> Option<u8> {
    STEPS_TYPES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(steps_type))
        .map(|&(_, key_count)| key_count)
}

/// The steps type written for a lane count. The first listed type wins.
#[must_use]
pub fn steps_type_of(key_count: u8) -> Option<&'static str> {
    STEPS_TYPES
        .iter()
        .find(|&&(_, keys)| keys == key_count)
        .map(|&(name, _)| name)
}

/// Difficulty slots of a StepMania song.
pub const DIFFICULTIES: [&str; 6] = ["Beginner", "Easy", "Medium", "Hard", "Challenge", "Edit"];

/// Tags for timing features the chart model has no place for.
pub const UNSUPPORTED_TIMING_TAGS: [&str; 7] = [
    "DELAYS",
    "WARPS",
    "TIMESIGNATURES",
    "TICKCOUNTS",
    "SPEEDS",
    "SCROLLS",
    "FAKES",
];
