//! The conversion pipeline: parse, validate, then write.

use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::{
    chart::Format,
    osu,
    parse::{ParseError, ParseOutput, ParseWarning},
    qua, sm,
    validate::{ValidChart, ValidationError, ValidationOutput, ValidationWarning, validate},
    write::{LossyNotice, WriteError, WriteOutput},
};

/// Which chart of a multi-chart source to convert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChartSelector {
    /// The first chart in the file.
    #[default]
    First,
    /// The chart at this zero-based position.
    Index(usize),
    /// The first chart whose difficulty label matches, ignoring ASCII case.
    Difficulty(String),
}

impl ChartSelector {
    fn select(&self, charts: Vec<ParseOutput>) -> Option<ParseOutput> {
        match self {
            Self::First => charts.into_iter().next(),
            Self::Index(index) => charts.into_iter().nth(*index),
            Self::Difficulty(label) => charts.into_iter().find(|output| {
                output
                    .chart
                    .difficulty_label
                    .as_deref()
                    .is_some_and(|name| name.eq_ignore_ascii_case(label))
            }),
        }
    }
}

impl fmt::Display for ChartSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::First => write!(f, "the first chart"),
            Self::Index(index) => write!(f, "chart #{index}"),
            Self::Difficulty(label) => write!(f, "difficulty {label:?}"),
        }
    }
}

/// Options of [`convert_with`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConvertOptions {
    /// The chart to convert when the source holds several.
    pub selector: ChartSelector,
}

/// A non-fatal finding of one of the conversion stages.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConversionNotice {
    /// Found while parsing the source.
    #[error("parse: {0}")]
    Parse(#[from] ParseWarning),
    /// Fixed by the validator.
    #[error("validate: {0}")]
    Validation(#[from] ValidationWarning),
    /// Lost while writing the target.
    #[error("write: {0}")]
    Lossy(#[from] LossyNotice),
}

/// A failed conversion. The error of the failing stage is kept unchanged as the source.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    /// The source could not be parsed.
    #[error("failed to parse {format} input")]
    Parse {
        /// Source format.
        format: Format,
        /// The parser error.
        #[source]
        source: ParseError,
    },
    /// The parsed chart is invalid.
    #[error("chart is invalid")]
    Validation(#[source] ValidationError),
    /// The chart could not be written.
    #[error("failed to write {format} output")]
    Write {
        /// Target format.
        format: Format,
        /// The writer error.
        #[source]
        source: WriteError,
    },
    /// No chart of the source matches the selector.
    #[error("no chart matches {selector}")]
    ChartNotFound {
        /// The selector used.
        selector: ChartSelector,
    },
}

/// Output of a conversion.
#[must_use]
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertOutput {
    /// The serialized chart in the target format.
    pub bytes: Vec<u8>,
    /// Everything the stages reported, in stage order.
    pub report: Vec<ConversionNotice>,
}

/// Parses every chart a file holds. Only `.sm` files can hold more than one.
///
/// # Errors
///
/// Returns the parser's [`ParseError`].
pub fn parse_charts(raw: &[u8], format: Format) -> Result<Vec<ParseOutput>, ParseError> {
    match format {
        Format::Sm => sm::parse_all(raw),
        Format::Osu => osu::parse(raw).map(|output| vec![output]),
        Format::Qua => qua::parse(raw).map(|output| vec![output]),
    }
}

/// Writes a validated chart in `format`.
///
/// # Errors
///
/// Returns the writer's [`WriteError`].
pub fn write_chart(chart: &ValidChart, format: Format) -> Result<WriteOutput, WriteError> {
    match format {
        Format::Sm => sm::write(chart),
        Format::Osu => osu::write(chart),
        Format::Qua => qua::write(chart),
    }
}

/// Converts the first chart of `raw` from one format to another.
///
/// # Errors
///
/// Returns [`ConversionError`] tagged with the stage that failed.
///
/// # Example
///
/// ```
/// use chartconv::{Format, convert};
///
/// let sm = "#TITLE:Song;\n#OFFSET:0;\n#BPMS:0=120;\n#NOTES:dance-single::Hard:5::\n1000\n0100\n0010\n0001\n;\n";
/// let output = convert(sm.as_bytes(), Format::Sm, Format::Osu).unwrap();
/// let text = String::from_utf8(output.bytes).unwrap();
/// assert!(text.contains("CircleSize:4"));
/// ```
pub fn convert(raw: &[u8], from: Format, to: Format) -> Result<ConvertOutput, ConversionError> {
    convert_with(raw, from, to, &ConvertOptions::default())
}

/// Converts the chart picked by `options.selector`.
///
/// # Errors
///
/// Returns [`ConversionError::ChartNotFound`] when nothing matches the selector, otherwise as
/// [`convert`].
pub fn convert_with(
    raw: &[u8],
    from: Format,
    to: Format,
    options: &ConvertOptions,
) -> Result<ConvertOutput, ConversionError> {
    debug!(%from, %to, selector = %options.selector, "converting chart");
    let charts = parse_charts(raw, from).map_err(|source| ConversionError::Parse {
        format: from,
        source,
    })?;
    let parsed = options
        .selector
        .select(charts)
        .ok_or_else(|| ConversionError::ChartNotFound {
            selector: options.selector.clone(),
        })?;
    convert_parsed(parsed, to)
}

/// Converts every chart of `raw`, stopping at the first failure.
///
/// # Errors
///
/// As [`convert`], for the first chart that fails.
pub fn convert_all(
    raw: &[u8],
    from: Format,
    to: Format,
) -> Result<Vec<ConvertOutput>, ConversionError> {
    debug!(%from, %to, "converting all charts");
    parse_charts(raw, from)
        .map_err(|source| ConversionError::Parse {
            format: from,
            source,
        })?
        .into_iter()
        .map(|parsed| convert_parsed(parsed, to))
        .collect()
}

fn convert_parsed(parsed: ParseOutput, to: Format) -> Result<ConvertOutput, ConversionError> {
    let ParseOutput { chart, warnings } = parsed;
    let mut report: Vec<ConversionNotice> = warnings
        .into_iter()
        .map(ConversionNotice::Parse)
        .collect();

    let ValidationOutput { chart, warnings } =
        validate(chart).map_err(ConversionError::Validation)?;
    report.extend(warnings.into_iter().map(ConversionNotice::Validation));

    let WriteOutput { bytes, lossy } =
        write_chart(&chart, to).map_err(|source| ConversionError::Write { format: to, source })?;
    report.extend(lossy.into_iter().map(ConversionNotice::Lossy));

    debug!(
        %to,
        bytes = bytes.len(),
        notices = report.len(),
        "conversion finished"
    );
    Ok(ConvertOutput { bytes, report })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const TWO_CHARTS: &str = "#TITLE:Song;
#BPMS:0=120;
#NOTES:
     dance-single:
     :
     Easy:
     2:
     :
1000
0000
0000
0000
;
#NOTES:
     dance-single:
     :
     Hard:
     8:
     :
1000
0100
0010
0001
;
";

    #[test]
    fn selects_by_difficulty() {
        let options = ConvertOptions {
            selector: ChartSelector::Difficulty("hard".into()),
        };
        let output = convert_with(TWO_CHARTS.as_bytes(), Format::Sm, Format::Osu, &options)
            .unwrap();
        let text = String::from_utf8(output.bytes).unwrap();
        assert!(text.contains("Version:Hard\n"), "{text}");
        assert_eq!(text.matches(",192,").count(), 4);
    }

    #[test]
    fn missing_chart() {
        let options = ConvertOptions {
            selector: ChartSelector::Index(2),
        };
        assert_eq!(
            convert_with(TWO_CHARTS.as_bytes(), Format::Sm, Format::Qua, &options),
            Err(ConversionError::ChartNotFound {
                selector: ChartSelector::Index(2),
            })
        );
    }

    #[test]
    fn converts_every_chart() {
        let outputs = convert_all(TWO_CHARTS.as_bytes(), Format::Sm, Format::Qua).unwrap();
        assert_eq!(outputs.len(), 2);
        let difficulties = outputs
            .iter()
            .map(|output| {
                let text = String::from_utf8_lossy(&output.bytes);
                text.lines()
                    .find_map(|line| line.strip_prefix("DifficultyName: "))
                    .map(str::to_owned)
            })
            .collect::<Vec<_>>();
        assert_eq!(
            difficulties,
            vec![Some("Easy".to_owned()), Some("Hard".to_owned())]
        );
    }
}
