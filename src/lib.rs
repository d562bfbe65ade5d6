//! Converts rhythm game charts between StepMania (`.sm`), osu!mania (`.osu`) and Quaver
//! (`.qua`).
//!
//! Every format is read into one [`Chart`] model, checked by [`validate`], and written back
//! out. Parsers return warnings for the things they skipped, the validator returns warnings for
//! the things it fixed, and writers report what the target format could not keep, so a
//! conversion never fails only because it is lossy.
//!
//! ```
//! use chartconv::{Format, convert};
//!
//! let qua = "AudioFile: song.mp3
//! Mode: Keys4
//! Title: Song
//! TimingPoints:
//! - Bpm: 120
//! HitObjects:
//! - StartTime: 0
//!   Lane: 1
//! - StartTime: 500
//!   Lane: 3
//!   EndTime: 1000
//! ";
//! let output = convert(qua.as_bytes(), Format::Qua, Format::Sm).unwrap();
//! let sm = String::from_utf8(output.bytes).unwrap();
//! assert!(sm.contains("#BPMS:0.000000=120.000000;"));
//! ```
//!
//! # Features
//!
//! - `diagnostics` (default): renders [`ParseError`]s with `ariadne`.
//! - `serde`: `Serialize`/`Deserialize` for the chart model and the reports.

pub mod chart;
pub mod convert;
#[cfg(feature = "diagnostics")]
pub mod diagnostics;
pub mod osu;
pub mod parse;
pub mod prelude;
pub mod qua;
pub mod sm;
pub mod util;
pub mod validate;
pub mod write;

pub use self::{
    chart::{Chart, Format},
    convert::{
        ChartSelector, ConversionError, ConversionNotice, ConvertOptions, ConvertOutput, convert,
        convert_all, convert_with,
    },
    parse::ParseError,
    validate::{ValidationError, validate},
    write::WriteError,
};

/// Parses the first chart of a `.sm` file.
///
/// # Errors
///
/// Returns [`ParseError`] when the file is malformed or holds no chart.
pub fn parse_from_sm(raw: &[u8]) -> Result<Chart, ParseError> {
    sm::parse(raw).map(|output| output.chart)
}

/// Parses an osu!mania `.osu` file.
///
/// # Errors
///
/// Returns [`ParseError`] when the file is malformed or not an osu!mania chart.
pub fn parse_from_osu(raw: &[u8]) -> Result<Chart, ParseError> {
    osu::parse(raw).map(|output| output.chart)
}

/// Parses a Quaver `.qua` file.
///
/// # Errors
///
/// Returns [`ParseError`] when the file is malformed.
pub fn parse_from_qua(raw: &[u8]) -> Result<Chart, ParseError> {
    qua::parse(raw).map(|output| output.chart)
}

/// Validates a chart and serializes it with `writer`.
fn write_validated(
    chart: Chart,
    writer: fn(&validate::ValidChart) -> Result<write::WriteOutput, WriteError>,
) -> Result<Vec<u8>, WriteError> {
    let validated = validate(chart)?;
    writer(&validated.chart).map(|output| output.bytes)
}

/// Writes a chart as a `.sm` file.
///
/// # Errors
///
/// Returns [`WriteError::InvalidChart`] when the chart fails validation, or the writer's error.
pub fn write_to_sm(chart: Chart) -> Result<Vec<u8>, WriteError> {
    write_validated(chart, sm::write)
}

/// Writes a chart as an osu!mania `.osu` file.
///
/// # Errors
///
/// Returns [`WriteError::InvalidChart`] when the chart fails validation, or the writer's error.
pub fn write_to_osu(chart: Chart) -> Result<Vec<u8>, WriteError> {
    write_validated(chart, osu::write)
}

/// Writes a chart as a Quaver `.qua` file.
///
/// # Errors
///
/// Returns [`WriteError::InvalidChart`] when the chart fails validation, or the writer's error.
pub fn write_to_qua(chart: Chart) -> Result<Vec<u8>, WriteError> {
    write_validated(chart, qua::write)
}
