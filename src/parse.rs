//! Errors and warnings shared by the format parsers.

use std::fmt;

use thiserror::Error;

use crate::chart::Chart;

/// Where in the input a problem was found.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Location {
    /// A span of the source text.
    Text {
        /// Line number, starts with 1.
        line: usize,
        /// Column number in chars, starts with 1.
        col: usize,
        /// Byte offset of the span start.
        start: usize,
        /// Byte offset of the span end, exclusive.
        end: usize,
    },
    /// A path into a structured document, such as `HitObjects[3].Lane`.
    KeyPath(String),
}

impl Location {
    /// Locates the byte span `start..end` of `source`. A `start` inside a multi-byte char
    /// moves back to that char.
    #[must_use]
    pub fn span(source: &str, start: usize, end: usize) -> Self {
        let start = (0..=start.min(source.len()))
            .rev()
            .find(|&i| source.is_char_boundary(i))
            .unwrap_or(0);
        let before = source.get(..start).unwrap_or_default();
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map_or(0, |i| i + 1);
        let col = before
            .get(line_start..)
            .map_or(0, |rest| rest.chars().count())
            + 1;
        Self::Text {
            line,
            col,
            start,
            end: end.max(start),
        }
    }

    /// Locates the byte span that `part` occupies inside `source`. `part` must be a subslice
    /// of `source`.
    #[must_use]
    pub fn of(source: &str, part: &str) -> Self {
        let start = (part.as_ptr() as usize).saturating_sub(source.as_ptr() as usize);
        Self::span(source, start, start + part.len())
    }

    /// Creates a key path location.
    #[must_use]
    pub fn key_path(path: impl Into<String>) -> Self {
        Self::KeyPath(path.into())
    }

    /// The byte span, for text locations.
    #[must_use]
    pub const fn byte_range(&self) -> Option<std::ops::Range<usize>> {
        match self {
            Self::Text { start, end, .. } => Some(*start..*end),
            Self::KeyPath(_) => None,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text { line, col, .. } => write!(f, "line {line}, column {col}"),
            Self::KeyPath(path) => write!(f, "`{path}`"),
        }
    }
}

/// A fatal problem in a chart file. No partial chart is returned alongside it.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ParseError {
    /// The input is not UTF-8 text.
    #[error("input is not valid UTF-8 at byte {offset}")]
    InvalidEncoding {
        /// Byte offset of the first invalid sequence.
        offset: usize,
    },
    /// A header, tag or key line did not have the expected shape.
    #[error("malformed header at {at}: expected {expected}, found {found:?}")]
    MalformedHeader {
        /// Position of the header.
        at: Location,
        /// What should have been there.
        expected: String,
        /// What was there.
        found: String,
    },
    /// A section the format does not define.
    #[error("unknown section {found:?} at {at}")]
    UnknownSection {
        /// Position of the section header.
        at: Location,
        /// The section name.
        found: String,
    },
    /// A value that should have been a number.
    #[error("invalid number at {at}: expected {expected}, found {found:?}")]
    InvalidNumber {
        /// Position of the value.
        at: Location,
        /// The kind of number expected.
        expected: String,
        /// The text found.
        found: String,
    },
    /// The chart is for a game mode or object type that is not supported.
    #[error("unsupported mode at {at}: expected {expected}, found {found:?}")]
    UnsupportedMode {
        /// Position of the mode value.
        at: Location,
        /// The supported modes.
        expected: String,
        /// The mode found.
        found: String,
    },
    /// A required field is absent.
    #[error("missing required field {field} at {at}")]
    MissingRequiredField {
        /// Where the field was expected.
        at: Location,
        /// Name of the field.
        field: String,
    },
    /// The input ended early.
    #[error("input truncated at {at}: expected {expected}")]
    Truncated {
        /// Where the input ended.
        at: Location,
        /// What was still expected.
        expected: String,
    },
    /// A note row did not match the lane count or contained an unknown note type.
    #[error("malformed note row at {at}: {detail}")]
    MalformedNoteRow {
        /// Position of the row.
        at: Location,
        /// What was wrong with the row.
        detail: String,
    },
    /// The document structure is broken, such as bad indentation in YAML.
    #[error("malformed structure at {at}: {detail}")]
    MalformedStructure {
        /// Position reported by the structure parser.
        at: Location,
        /// Message of the structure parser.
        detail: String,
    },
}

impl ParseError {
    /// Position of the problem, if any.
    #[must_use]
    pub const fn location(&self) -> Option<&Location> {
        match self {
            Self::InvalidEncoding { .. } => None,
            Self::MalformedHeader { at, .. }
            | Self::UnknownSection { at, .. }
            | Self::InvalidNumber { at, .. }
            | Self::UnsupportedMode { at, .. }
            | Self::MissingRequiredField { at, .. }
            | Self::Truncated { at, .. }
            | Self::MalformedNoteRow { at, .. }
            | Self::MalformedStructure { at, .. } => Some(at),
        }
    }
}

/// A non-fatal problem found while parsing. The affected data is dropped or adjusted as the
/// variant describes.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ParseWarning {
    /// Roll notes were read as hold notes.
    #[error("{count} roll note(s) read as hold notes")]
    RollsAsHolds {
        /// Number of rolls.
        count: usize,
    },
    /// Lift notes were read as tap notes.
    #[error("{count} lift note(s) read as tap notes")]
    LiftsAsTaps {
        /// Number of lifts.
        count: usize,
    },
    /// Mines were dropped.
    #[error("{count} mine(s) dropped")]
    MinesDropped {
        /// Number of mines.
        count: usize,
    },
    /// Fake notes were dropped.
    #[error("{count} fake note(s) dropped")]
    FakesDropped {
        /// Number of fakes.
        count: usize,
    },
    /// Keysound-only notes were dropped.
    #[error("{count} keysound note(s) dropped")]
    KeysoundsDropped {
        /// Number of keysound notes.
        count: usize,
    },
    /// A hold head had no tail and was read as a tap note.
    #[error("hold on lane {lane} at {at} has no tail, read as a tap note")]
    UnterminatedHold {
        /// Zero-indexed lane.
        lane: u8,
        /// Position of the head.
        at: Location,
    },
    /// A hold tail had no head and was ignored.
    #[error("hold tail on lane {lane} at {at} has no head")]
    OrphanHoldTail {
        /// Zero-indexed lane.
        lane: u8,
        /// Position of the tail.
        at: Location,
    },
    /// A timing tag with no counterpart in the chart model was ignored.
    #[error("timing tag #{tag} at {at} ignored")]
    IgnoredTimingTag {
        /// Tag name.
        tag: String,
        /// Position of the tag.
        at: Location,
    },
    /// Hit sounds and sample settings of hit objects were ignored.
    #[error("hit sounds of {count} object(s) ignored")]
    HitSoundsIgnored {
        /// Number of objects with custom sounds.
        count: usize,
    },
    /// Key sounds of hit objects were ignored.
    #[error("key sounds of {count} object(s) ignored")]
    KeySoundsIgnored {
        /// Number of objects with key sounds.
        count: usize,
    },
    /// Storyboard and other events were ignored.
    #[error("{count} event(s) ignored")]
    EventsIgnored {
        /// Number of events.
        count: usize,
    },
}

/// Output of parsing a single chart.
#[must_use]
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutput {
    /// The parsed chart, not yet validated.
    pub chart: Chart,
    /// Non-fatal problems found while parsing.
    pub warnings: Vec<ParseWarning>,
}

/// Decodes the raw input as UTF-8, dropping a leading byte order mark.
pub(crate) fn decode(raw: &[u8]) -> Result<&str, ParseError> {
    let raw = raw.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(raw);
    std::str::from_utf8(raw).map_err(|err| ParseError::InvalidEncoding {
        offset: err.valid_up_to(),
    })
}

/// Counts occurrences to be reported as one warning.
#[derive(Debug, Default)]
pub(crate) struct Tally(usize);

impl Tally {
    pub(crate) const fn bump(&mut self) {
        self.0 += 1;
    }

    /// Pushes a warning made from the count unless nothing was counted.
    pub(crate) fn report(
        self,
        warnings: &mut Vec<ParseWarning>,
        make: impl FnOnce(usize) -> ParseWarning,
    ) {
        if self.0 > 0 {
            warnings.push(make(self.0));
        }
    }
}
