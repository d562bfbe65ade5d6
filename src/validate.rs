//! Structural checks between parsing and writing.
//!
//! [`validate`] consumes a [`Chart`], rejects it when a writer could not make sense of it, and
//! otherwise sorts and normalizes it into a [`ValidChart`]. Writers only accept [`ValidChart`].

use std::ops::Deref;

use thiserror::Error;
use tracing::trace;

use crate::chart::{Chart, Note, NoteKind, TimingPoint};

/// Two times closer than this are the same time.
pub const TIME_EPSILON_MS: f64 = 1e-6;

/// A chart that cannot be written.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ValidationError {
    /// The chart has no lanes.
    #[error("key count must be positive, got {key_count}")]
    InvalidKeyCount {
        /// The declared key count.
        key_count: u8,
    },
    /// The chart has no tempo.
    #[error("chart has no timing points")]
    EmptyTimingPoints,
    /// A time, tempo, multiplier or duration is NaN or infinite.
    #[error("{field}[{index}] is not a finite number")]
    NonFiniteValue {
        /// Name of the offending sequence and field, such as `notes.time_ms`.
        field: String,
        /// Index into the sequence.
        index: usize,
    },
    /// A tempo of zero or less.
    #[error("timing_points[{index}] has non-positive bpm {bpm}")]
    NonPositiveBpm {
        /// Index into `timing_points`.
        index: usize,
        /// The tempo.
        bpm: f64,
    },
    /// A hold or stop ends before it starts.
    #[error("{field}[{index}] has negative duration {duration_ms} ms")]
    NegativeDuration {
        /// `notes` or `stops`.
        field: String,
        /// Index into the sequence.
        index: usize,
        /// The duration.
        duration_ms: f64,
    },
    /// Two timing points at the same time disagree on the tempo.
    #[error("conflicting timing points at {time_ms} ms: {first_bpm} bpm and {second_bpm} bpm")]
    ConflictingTimingPoint {
        /// Time of both points.
        time_ms: f64,
        /// Tempo of the earlier declared point.
        first_bpm: f64,
        /// Tempo of the later declared point.
        second_bpm: f64,
    },
    /// The chart has nothing to play.
    #[error("chart has no notes")]
    EmptyNotes,
    /// A note lies outside the lanes.
    #[error("note at {time_ms} ms is on lane {lane}, but the chart has {key_count} lanes")]
    NoteOutOfLaneRange {
        /// Index into `notes`.
        index: usize,
        /// Time of the note.
        time_ms: f64,
        /// The note's lane.
        lane: u8,
        /// The chart's key count.
        key_count: u8,
    },
}

/// Something the validator fixed.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ValidationWarning {
    /// Timing points were not in time order and have been sorted.
    #[error("timing points were out of order")]
    UnsortedTimingPoints,
    /// Scroll velocities were not in time order and have been sorted.
    #[error("scroll velocities were out of order")]
    UnsortedScrollVelocities,
    /// Stops were not in time order and have been sorted.
    #[error("stops were out of order")]
    UnsortedStops,
    /// Notes were not in time order and have been sorted.
    #[error("notes were out of order")]
    UnsortedNotes,
    /// A timing point repeated the previous one and was removed.
    #[error("duplicate timing point at {time_ms} ms removed")]
    DuplicateTimingPoint {
        /// Time of the removed point.
        time_ms: f64,
    },
    /// A note repeated another note on the same lane and time and was removed.
    #[error("duplicate note at {time_ms} ms on lane {lane} removed")]
    DuplicateNote {
        /// Time of the removed note.
        time_ms: f64,
        /// Lane of the removed note.
        lane: u8,
    },
    /// A note whose end time contradicted its kind became a tap.
    #[error("{from:?} note at {time_ms} ms on lane {lane} normalized to a tap")]
    NoteKindNormalized {
        /// Time of the note.
        time_ms: f64,
        /// Lane of the note.
        lane: u8,
        /// The declared kind.
        from: NoteKind,
    },
}

/// A chart that passed [`validate`]. Its sequences are sorted by time.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidChart(Chart);

impl ValidChart {
    /// Unwraps the chart.
    #[must_use]
    pub fn into_inner(self) -> Chart {
        self.0
    }
}

impl Deref for ValidChart {
    type Target = Chart;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Chart> for ValidChart {
    fn as_ref(&self) -> &Chart {
        &self.0
    }
}

/// Output of [`validate`].
#[must_use]
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutput {
    /// The checked chart.
    pub chart: ValidChart,
    /// What had to be fixed.
    pub warnings: Vec<ValidationWarning>,
}

fn check_finite<T>(
    items: &[T],
    field: &str,
    value: impl Fn(&T) -> f64,
) -> Result<(), ValidationError> {
    match items.iter().position(|item| !value(item).is_finite()) {
        Some(index) => Err(ValidationError::NonFiniteValue {
            field: field.to_owned(),
            index,
        }),
        None => Ok(()),
    }
}

/// Sorts `items` stably by `key`, returning whether anything moved.
fn sort_by_key_f64<T>(items: &mut [T], key: impl Fn(&T) -> (f64, u8)) -> bool {
    let sorted = items.is_sorted_by(|a, b| {
        let (a, b) = (key(a), key(b));
        a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).is_le()
    });
    if !sorted {
        items.sort_by(|a, b| {
            let (a, b) = (key(a), key(b));
            a.0.total_cmp(&b.0).then(a.1.cmp(&b.1))
        });
    }
    !sorted
}

/// Checks a chart and brings it into the shape writers expect.
///
/// The checks run in a fixed order, so a chart with several problems always reports the same
/// one: key count, presence of timing points, finite tempo, positive tempo, finite values,
/// non-negative durations, conflicting timing points, presence of notes, lane range.
///
/// # Errors
///
/// Returns the first [`ValidationError`] found.
pub fn validate(mut chart: Chart) -> Result<ValidationOutput, ValidationError> {
    let mut warnings = vec![];

    if chart.key_count == 0 {
        return Err(ValidationError::InvalidKeyCount {
            key_count: chart.key_count,
        });
    }
    if chart.timing_points.is_empty() {
        return Err(ValidationError::EmptyTimingPoints);
    }
    check_finite(&chart.timing_points, "timing_points.time_ms", |p| p.time_ms)?;
    check_finite(&chart.timing_points, "timing_points.bpm", |p| p.bpm)?;
    if let Some((index, point)) = chart
        .timing_points
        .iter()
        .enumerate()
        .find(|(_, point)| point.bpm <= 0.0)
    {
        return Err(ValidationError::NonPositiveBpm {
            index,
            bpm: point.bpm,
        });
    }
    check_finite(&chart.scroll_velocities, "scroll_velocities.time_ms", |v| {
        v.time_ms
    })?;
    check_finite(&chart.scroll_velocities, "scroll_velocities.multiplier", |v| {
        v.multiplier
    })?;
    check_finite(&chart.stops, "stops.time_ms", |s| s.time_ms)?;
    check_finite(&chart.stops, "stops.duration_ms", |s| s.duration_ms)?;
    check_finite(&chart.notes, "notes.time_ms", |n| n.time_ms)?;
    check_finite(&chart.notes, "notes.end_time_ms", |n| n.end_time_ms)?;
    if let Some(preview) = chart.metadata.preview_time_ms
        && !preview.is_finite()
    {
        return Err(ValidationError::NonFiniteValue {
            field: "metadata.preview_time_ms".to_owned(),
            index: 0,
        });
    }

    if let Some((index, stop)) = chart
        .stops
        .iter()
        .enumerate()
        .find(|(_, stop)| stop.duration_ms < 0.0)
    {
        return Err(ValidationError::NegativeDuration {
            field: "stops".to_owned(),
            index,
            duration_ms: stop.duration_ms,
        });
    }
    if let Some((index, note)) = chart
        .notes
        .iter()
        .enumerate()
        .find(|(_, note)| note.is_hold() && note.duration_ms() < 0.0)
    {
        return Err(ValidationError::NegativeDuration {
            field: "notes".to_owned(),
            index,
            duration_ms: note.duration_ms(),
        });
    }

    if sort_by_key_f64(&mut chart.timing_points, |p| (p.time_ms, 0)) {
        warnings.push(ValidationWarning::UnsortedTimingPoints);
    }
    if sort_by_key_f64(&mut chart.scroll_velocities, |v| (v.time_ms, 0)) {
        warnings.push(ValidationWarning::UnsortedScrollVelocities);
    }
    if sort_by_key_f64(&mut chart.stops, |s| (s.time_ms, 0)) {
        warnings.push(ValidationWarning::UnsortedStops);
    }
    if sort_by_key_f64(&mut chart.notes, |n| (n.time_ms, n.lane)) {
        warnings.push(ValidationWarning::UnsortedNotes);
    }

    let mut timing_points: Vec<TimingPoint> = Vec::with_capacity(chart.timing_points.len());
    for point in chart.timing_points.drain(..) {
        let Some(prev) = timing_points.last() else {
            timing_points.push(point);
            continue;
        };
        if (point.time_ms - prev.time_ms).abs() >= TIME_EPSILON_MS {
            timing_points.push(point);
        } else if (point.bpm - prev.bpm).abs() < f64::EPSILON * prev.bpm.max(1.0) {
            warnings.push(ValidationWarning::DuplicateTimingPoint {
                time_ms: point.time_ms,
            });
        } else {
            return Err(ValidationError::ConflictingTimingPoint {
                time_ms: prev.time_ms,
                first_bpm: prev.bpm,
                second_bpm: point.bpm,
            });
        }
    }
    chart.timing_points = timing_points;

    if chart.notes.is_empty() {
        return Err(ValidationError::EmptyNotes);
    }
    if let Some((index, note)) = chart
        .notes
        .iter()
        .enumerate()
        .find(|(_, note)| note.lane >= chart.key_count)
    {
        return Err(ValidationError::NoteOutOfLaneRange {
            index,
            time_ms: note.time_ms,
            lane: note.lane,
            key_count: chart.key_count,
        });
    }

    for note in &mut chart.notes {
        let contradicts = match note.kind {
            NoteKind::Tap => note.duration_ms().abs() >= TIME_EPSILON_MS,
            NoteKind::Hold => note.duration_ms() < TIME_EPSILON_MS,
        };
        if contradicts {
            warnings.push(ValidationWarning::NoteKindNormalized {
                time_ms: note.time_ms,
                lane: note.lane,
                from: note.kind,
            });
            note.kind = NoteKind::Tap;
        }
        if note.kind == NoteKind::Tap {
            note.end_time_ms = note.time_ms;
        }
    }
    let before = chart.notes.len();
    let mut notes: Vec<Note> = Vec::with_capacity(before);
    for note in chart.notes.drain(..) {
        // notes are sorted by time then lane, so a duplicate is adjacent to a kept note
        let duplicate = notes
            .iter()
            .rev()
            .take_while(|kept| (note.time_ms - kept.time_ms).abs() < TIME_EPSILON_MS)
            .any(|kept| kept.lane == note.lane);
        if duplicate {
            warnings.push(ValidationWarning::DuplicateNote {
                time_ms: note.time_ms,
                lane: note.lane,
            });
        } else {
            notes.push(note);
        }
    }
    chart.notes = notes;

    trace!(
        notes = chart.notes.len(),
        dropped = before - chart.notes.len(),
        warnings = warnings.len(),
        "validated chart"
    );
    Ok(ValidationOutput {
        chart: ValidChart(chart),
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::chart::Stop;

    fn chart() -> Chart {
        let mut chart = Chart::new(4);
        chart.timing_points = vec![TimingPoint::new(0.0, 120.0)];
        chart.notes = vec![Note::tap(0.0, 0), Note::hold(500.0, 1000.0, 3)];
        chart
    }

    #[test]
    fn accepts_well_formed_chart() {
        let output = validate(chart()).unwrap();
        assert_eq!(output.warnings, vec![]);
        assert_eq!(*output.chart, chart());
    }

    #[test]
    fn rejects_missing_timing_points_first() {
        let mut chart = chart();
        chart.timing_points.clear();
        chart.notes.clear();
        assert_eq!(validate(chart), Err(ValidationError::EmptyTimingPoints));
    }

    #[test]
    fn rejects_zero_keys() {
        let mut chart = chart();
        chart.key_count = 0;
        assert_eq!(
            validate(chart),
            Err(ValidationError::InvalidKeyCount { key_count: 0 })
        );
    }

    #[test]
    fn rejects_non_finite_and_non_positive() {
        let mut nan = chart();
        nan.notes[1].end_time_ms = f64::NAN;
        assert_eq!(
            validate(nan),
            Err(ValidationError::NonFiniteValue {
                field: "notes.end_time_ms".into(),
                index: 1,
            })
        );

        let mut zero = chart();
        zero.timing_points.push(TimingPoint::new(100.0, 0.0));
        assert_eq!(
            validate(zero),
            Err(ValidationError::NonPositiveBpm { index: 1, bpm: 0.0 })
        );
    }

    #[test]
    fn rejects_negative_stop() {
        let mut chart = chart();
        chart.stops.push(Stop {
            time_ms: 10.0,
            duration_ms: -1.0,
        });
        assert!(matches!(
            validate(chart),
            Err(ValidationError::NegativeDuration { index: 0, .. })
        ));
    }

    #[test]
    fn sorts_and_deduplicates() {
        let mut chart = chart();
        chart.timing_points = vec![
            TimingPoint::new(1000.0, 180.0),
            TimingPoint::new(0.0, 120.0),
            TimingPoint::new(1000.0, 180.0),
        ];
        chart.notes = vec![
            Note::tap(500.0, 2),
            Note::tap(0.0, 1),
            Note::tap(500.0, 2),
            Note::tap(500.0, 0),
        ];
        let output = validate(chart).unwrap();
        assert_eq!(
            output.warnings,
            vec![
                ValidationWarning::UnsortedTimingPoints,
                ValidationWarning::UnsortedNotes,
                ValidationWarning::DuplicateTimingPoint { time_ms: 1000.0 },
                ValidationWarning::DuplicateNote {
                    time_ms: 500.0,
                    lane: 2
                },
            ]
        );
        assert_eq!(output.chart.timing_points.len(), 2);
        assert_eq!(
            output
                .chart
                .notes
                .iter()
                .map(|note| note.lane)
                .collect::<Vec<_>>(),
            vec![1, 0, 2]
        );
    }

    #[test]
    fn rejects_conflicting_timing_points() {
        let mut chart = chart();
        chart.timing_points.push(TimingPoint::new(0.0, 240.0));
        assert_eq!(
            validate(chart),
            Err(ValidationError::ConflictingTimingPoint {
                time_ms: 0.0,
                first_bpm: 120.0,
                second_bpm: 240.0,
            })
        );
    }

    #[test]
    fn rejects_lane_out_of_range() {
        let mut chart = chart();
        chart.notes.push(Note::tap(2000.0, 4));
        assert_eq!(
            validate(chart),
            Err(ValidationError::NoteOutOfLaneRange {
                index: 2,
                time_ms: 2000.0,
                lane: 4,
                key_count: 4,
            })
        );
    }

    #[test]
    fn rejects_empty_notes() {
        let mut chart = chart();
        chart.notes.clear();
        assert_eq!(validate(chart), Err(ValidationError::EmptyNotes));
    }

    #[test]
    fn normalizes_zero_length_holds() {
        let mut chart = chart();
        chart.notes[1].end_time_ms = 500.0;
        let output = validate(chart).unwrap();
        assert_eq!(output.chart.notes[1], Note::tap(500.0, 3));
        assert_eq!(
            output.warnings,
            vec![ValidationWarning::NoteKindNormalized {
                time_ms: 500.0,
                lane: 3,
                from: NoteKind::Hold,
            }]
        );
    }
}
