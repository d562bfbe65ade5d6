//! Errors and lossy-conversion notices shared by the format writers.

use thiserror::Error;

use crate::{
    chart::{Format, Metadata},
    validate::ValidationError,
};

/// Title written when the chart has none.
pub const DEFAULT_TITLE: &str = "Unknown Title";
/// Artist written when the chart has none.
pub const DEFAULT_ARTIST: &str = "Unknown Artist";
/// Creator written when the chart has none.
pub const DEFAULT_CREATOR: &str = "Unknown Creator";
/// Difficulty name written when the chart has none.
pub const DEFAULT_DIFFICULTY: &str = "Unknown Difficulty";
/// Audio file name written when the chart has none.
pub const DEFAULT_AUDIO_FILE: &str = "audio.mp3";

/// A chart that cannot be written in the requested format.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WriteError {
    /// The target format needs a value the chart does not provide and that has no default.
    #[error("{format} output requires {field}")]
    MissingRequiredTargetField {
        /// Target format.
        format: Format,
        /// Name of the missing field.
        field: String,
    },
    /// The target format has no layout for this many lanes.
    #[error("{format} cannot represent {key_count} lanes")]
    UnrepresentableKeyCount {
        /// The chart's key count.
        key_count: u8,
        /// Target format.
        format: Format,
    },
    /// The chart failed validation before writing.
    #[error("invalid chart: {0}")]
    InvalidChart(#[from] ValidationError),
    /// The chart is too long to lay out in the target format.
    #[error("{format} output would need {measures} measures, more than the {limit} allowed")]
    TooManyMeasures {
        /// Target format.
        format: Format,
        /// Measures the chart would need.
        measures: u64,
        /// Most measures a writer lays out.
        limit: u64,
    },
    /// The document serializer failed.
    #[error("failed to serialize {format} output: {message}")]
    Serialization {
        /// Target format.
        format: Format,
        /// Message of the serializer.
        message: String,
    },
}

impl WriteError {
    /// Maps a formatter failure while rendering `format` output.
    pub(crate) fn formatting(format: Format) -> impl FnOnce(std::fmt::Error) -> Self {
        move |err| Self::Serialization {
            format,
            message: err.to_string(),
        }
    }
}

/// Information the target format could not keep.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LossyNotice {
    /// Values with no counterpart in the target format were omitted.
    #[error("{count} {field} dropped")]
    Dropped {
        /// What was dropped.
        field: String,
        /// How many values.
        count: usize,
    },
    /// A field the target requires was filled with a default value.
    #[error("{field} defaulted to {value:?}")]
    Defaulted {
        /// The target field.
        field: String,
        /// The value written.
        value: String,
    },
    /// Notes were moved onto the target's time grid by more than a millisecond.
    #[error("{count} note(s) moved by up to {max_shift_ms} ms")]
    Quantized {
        /// How many notes moved.
        count: usize,
        /// The largest move.
        max_shift_ms: f64,
    },
    /// Values outside the target's range were clamped.
    #[error("{count} {field} clamped into range")]
    Clamped {
        /// What was clamped.
        field: String,
        /// How many values.
        count: usize,
    },
    /// Notes landing on an occupied grid cell were dropped.
    #[error("{count} overlapping note(s) dropped")]
    OverlappingNotesDropped {
        /// How many notes.
        count: usize,
    },
    /// Line breaks or quotes the target cannot hold in these fields were replaced.
    #[error("characters replaced in {}", fields.join(", "))]
    CharactersReplaced {
        /// The affected fields.
        fields: Vec<String>,
    },
    /// Format specific values of other formats were not written.
    #[error("passthrough keys dropped: {}", keys.join(", "))]
    PassthroughDropped {
        /// The dropped keys.
        keys: Vec<String>,
    },
}

/// Output of a writer.
#[must_use]
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOutput {
    /// The serialized chart.
    pub bytes: Vec<u8>,
    /// What the target format could not keep.
    pub lossy: Vec<LossyNotice>,
}

/// Collects [`LossyNotice`]s while a writer runs.
#[derive(Debug, Default)]
pub(crate) struct LossyLog(Vec<LossyNotice>);

impl LossyLog {
    pub(crate) fn dropped(&mut self, field: &str, count: usize) {
        if count > 0 {
            self.0.push(LossyNotice::Dropped {
                field: field.to_owned(),
                count,
            });
        }
    }

    pub(crate) fn clamped(&mut self, field: &str, count: usize) {
        if count > 0 {
            self.0.push(LossyNotice::Clamped {
                field: field.to_owned(),
                count,
            });
        }
    }

    pub(crate) fn push(&mut self, notice: LossyNotice) {
        self.0.push(notice);
    }

    /// Returns `value`, or `default` after noting the substitution.
    pub(crate) fn or_default<'a>(
        &mut self,
        value: Option<&'a str>,
        field: &str,
        default: &'a str,
    ) -> &'a str {
        match value.filter(|value| !value.trim().is_empty()) {
            Some(value) => value,
            None => {
                self.0.push(LossyNotice::Defaulted {
                    field: field.to_owned(),
                    value: default.to_owned(),
                });
                default
            }
        }
    }

    /// Notes the passthrough keys that `format` does not own.
    pub(crate) fn foreign_passthrough(&mut self, metadata: &Metadata, format: Format) {
        let keys = metadata.foreign_passthrough_keys(format);
        if !keys.is_empty() {
            self.0.push(LossyNotice::PassthroughDropped { keys });
        }
    }

    pub(crate) fn finish(self, bytes: Vec<u8>) -> WriteOutput {
        WriteOutput {
            bytes,
            lossy: self.0,
        }
    }
}
