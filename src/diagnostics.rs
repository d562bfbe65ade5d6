//! Fancy diagnostics support using `ariadne`.
//!
//! [`ParseError`]s of the text formats carry byte spans, so they can be rendered as
//! `ariadne::Report`s pointing into the source. Errors located by a key path (from `.qua`
//! documents) are reported at the start of the file with the path in the message.
//!
//! # Usage Example
//!
//! ```rust
//! # #[cfg(feature = "diagnostics")]
//! # {
//! use chartconv::{diagnostics::emit_parse_error, parse_from_osu};
//!
//! let source = "osu file format v14\n\n[General]\nMode: 1\n";
//! if let Err(err) = parse_from_osu(source.as_bytes()) {
//!     emit_parse_error("chart.osu", source, &err);
//! }
//! # }
//! ```

use ariadne::{Color, Label, Report, ReportKind, Source};

use crate::parse::{Location, ParseError};

/// Simple source container that holds the filename and source text.
/// Ariadne will automatically handle row/column calculations from byte offsets.
///
/// # Usage Example
///
/// ```rust
/// use chartconv::diagnostics::SimpleSource;
///
/// let source_text = "#TITLE:Song;\n";
/// let source = SimpleSource::new("song.sm", source_text);
///
/// assert_eq!(source.text(), source_text);
/// assert_eq!(source.name(), "song.sm");
/// ```
pub struct SimpleSource<'a> {
    /// Name of the source file.
    name: &'a str,
    /// Source text content.
    text: &'a str,
}

impl<'a> SimpleSource<'a> {
    /// Create a new source container instance.
    #[must_use]
    pub const fn new(name: &'a str, text: &'a str) -> Self {
        Self { name, text }
    }

    /// Get source text content.
    #[must_use]
    pub const fn text(&self) -> &'a str {
        self.text
    }

    /// Get source file name.
    #[must_use]
    pub const fn name(&self) -> &'a str {
        self.name
    }
}

/// Trait for converting positioned errors to `ariadne::Report`.
pub trait ToAriadne {
    /// Convert error to ariadne Report.
    fn to_report<'a>(&self, src: &SimpleSource<'a>)
    -> Report<'a, (String, std::ops::Range<usize>)>;
}

/// Helper to build a styled ariadne `Report` consistently.
#[must_use]
pub fn build_report<'a>(
    src: &SimpleSource<'a>,
    kind: ReportKind<'a>,
    range: std::ops::Range<usize>,
    title: &str,
    label_message: impl ToString,
    color: Color,
) -> Report<'a, (String, std::ops::Range<usize>)> {
    let filename = src.name().to_string();
    Report::build(kind, (filename.clone(), range.clone()))
        .with_message(title)
        .with_label(
            Label::new((filename, range))
                .with_message(label_message.to_string())
                .with_color(color),
        )
        .finish()
}

impl ToAriadne for ParseError {
    fn to_report<'a>(
        &self,
        src: &SimpleSource<'a>,
    ) -> Report<'a, (String, std::ops::Range<usize>)> {
        let len = src.text().len();
        let range = self
            .location()
            .and_then(Location::byte_range)
            .map_or(0..0, |range| range.start.min(len)..range.end.min(len));
        let title = match self.location() {
            Some(Location::KeyPath(path)) => format!("invalid chart at `{path}`"),
            _ => "invalid chart".to_owned(),
        };
        build_report(src, ReportKind::Error, range, &title, self, Color::Red)
    }
}

/// Renders a parse error to stderr.
///
/// # Parameters
/// * `name` - Name of the source file, used for display in diagnostic information
/// * `source` - Complete source text
/// * `error` - The error to display
pub fn emit_parse_error(name: &str, source: &str, error: &ParseError) {
    let simple = SimpleSource::new(name, source);
    let report = error.to_report(&simple);
    let _ = report.eprint((name.to_string(), Source::from(source)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_text_and_key_path_errors() {
        let source = "osu file format v14\n[General]\nMode: 1\n";
        let simple = SimpleSource::new("chart.osu", source);
        let error = ParseError::UnsupportedMode {
            at: Location::span(source, 30, 37),
            expected: "mode 3".into(),
            found: "1".into(),
        };
        let mut rendered = Vec::new();
        error
            .to_report(&simple)
            .write(
                ("chart.osu".to_string(), Source::from(source)),
                &mut rendered,
            )
            .unwrap();
        let rendered = String::from_utf8(rendered).unwrap();
        assert!(rendered.contains("chart.osu"), "{rendered}");

        let error = ParseError::MissingRequiredField {
            at: Location::key_path("Mode"),
            field: "Mode".into(),
        };
        let mut rendered = Vec::new();
        error
            .to_report(&simple)
            .write(
                ("chart.osu".to_string(), Source::from(source)),
                &mut rendered,
            )
            .unwrap();
        let rendered = String::from_utf8(rendered).unwrap();
        assert!(rendered.contains("`Mode`"), "{rendered}");
    }
}
