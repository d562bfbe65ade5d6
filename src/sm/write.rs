//! Writing charts as `.sm` files.

use std::{
    collections::BTreeMap,
    fmt::{self, Write as _},
};

use itertools::Itertools;
use num::Integer;
use tracing::debug;

use super::{DIFFICULTIES, msd::escape, steps_type_of};
use crate::{
    chart::{Format, tempo::TempoMap},
    util::format_fixed,
    validate::ValidChart,
    write::{
        DEFAULT_ARTIST, DEFAULT_AUDIO_FILE, DEFAULT_TITLE, LossyLog, LossyNotice, WriteError,
        WriteOutput,
    },
};

/// Grid resolution, one slot per 192nd note.
const SLOTS_PER_BEAT: i64 = 48;
const SLOTS_PER_MEASURE: i64 = SLOTS_PER_BEAT * 4;
/// Notes moved by more than this are reported.
const QUANTIZE_TOLERANCE_MS: f64 = 1.0;
/// Most measures written.
const MAX_MEASURES: i64 = 100_000;

/// Tags this writer produces itself, so passthrough entries of the same name are skipped.
const MANAGED_TAGS: [&str; 13] = [
    "TITLE",
    "SUBTITLE",
    "ARTIST",
    "TITLETRANSLIT",
    "ARTISTTRANSLIT",
    "GENRE",
    "CREDIT",
    "MUSIC",
    "BACKGROUND",
    "OFFSET",
    "SAMPLESTART",
    "BPMS",
    "STOPS",
];

/// Serializes a chart as a single chart `.sm` file.
///
/// # Errors
///
/// Returns [`WriteError::UnrepresentableKeyCount`] when no StepMania steps type has the chart's
/// lane count, or [`WriteError::TooManyMeasures`] when the notes reach past the last measure
/// this writer lays out.
pub fn write(chart: &ValidChart) -> Result<WriteOutput, WriteError> {
    let steps_type =
        steps_type_of(chart.key_count).ok_or(WriteError::UnrepresentableKeyCount {
            key_count: chart.key_count,
            format: Format::Sm,
        })?;
    let mut log = LossyLog::default();
    let tempo = tempo_map(chart)?;
    let notes = note_data(chart, &tempo, &mut log)?;

    let metadata = &chart.metadata;
    let mut header: Vec<(&str, String)> = vec![];
    let mut tag = |name, value: &str| header.push((name, escape(value)));
    tag("TITLE", log.or_default(metadata.title.as_deref(), "#TITLE", DEFAULT_TITLE));
    if let Some(source) = &metadata.source {
        tag("SUBTITLE", source);
    }
    tag(
        "ARTIST",
        log.or_default(metadata.artist.as_deref(), "#ARTIST", DEFAULT_ARTIST),
    );
    if let Some(alt_title) = &metadata.alt_title {
        tag("TITLETRANSLIT", alt_title);
    }
    if let Some(alt_artist) = &metadata.alt_artist {
        tag("ARTISTTRANSLIT", alt_artist);
    }
    if let Some(genre) = &metadata.genre {
        tag("GENRE", genre);
    }
    if let Some(creator) = &metadata.creator {
        tag("CREDIT", creator);
    }
    tag(
        "MUSIC",
        log.or_default(metadata.audio_file.as_deref(), "#MUSIC", DEFAULT_AUDIO_FILE),
    );
    if let Some(background) = &metadata.background_file {
        tag("BACKGROUND", background);
    }
    tag("OFFSET", &format_fixed(-tempo.origin_ms() / 1000.0, 6));
    if let Some(preview) = metadata.preview_time_ms {
        tag("SAMPLESTART", &format_fixed(preview / 1000.0, 6));
    }
    for (name, value) in metadata.passthrough_of(Format::Sm) {
        if !name.contains('.') && !MANAGED_TAGS.contains(&name) {
            tag(name, value);
        }
    }
    let bpms = tempo
        .bpm_changes()
        .enumerate()
        .map(|(i, (beat, bpm))| {
            // beats before the first change already run at the first tempo
            let beat = if i == 0 { 0.0 } else { beat };
            format!("{}={}", format_fixed(beat, 6), format_fixed(bpm, 6))
        })
        .join(",");
    tag("BPMS", &bpms);
    let stops = tempo
        .stops()
        .map(|(beat, ms)| format!("{}={}", format_fixed(beat, 6), format_fixed(ms / 1000.0, 6)))
        .join(",");
    tag("STOPS", &stops);

    let (difficulty, description) = difficulty_slot(chart, &mut log);
    let meter = log.or_default(
        metadata
            .passthrough
            .get("sm.NOTES.meter")
            .map(String::as_str),
        "#NOTES meter",
        "1",
    );
    let description = escape(&description);
    let meter = escape(meter);
    let mut out = String::new();
    render(
        &mut out,
        &header,
        [steps_type, &description, difficulty, &meter],
        &notes,
    )
    .map_err(WriteError::formatting(Format::Sm))?;

    log.dropped("scroll velocities", chart.scroll_velocities.len());
    log.dropped(
        "time signatures",
        chart
            .timing_points
            .iter()
            .filter(|point| point.meter != 4)
            .count(),
    );
    log.dropped("tags", metadata.tags.len());
    log.foreign_passthrough(metadata, Format::Sm);

    debug!(
        steps_type,
        notes = chart.notes.len(),
        bytes = out.len(),
        "wrote sm chart"
    );
    Ok(log.finish(out.into_bytes()))
}

/// Renders the header tags, then one `#NOTES` block with its steps type, description,
/// difficulty and meter.
fn render(
    out: &mut String,
    header: &[(&str, String)],
    [steps_type, description, difficulty, meter]: [&str; 4],
    notes: &str,
) -> fmt::Result {
    for (name, value) in header {
        writeln!(out, "#{name}:{value};")?;
    }
    writeln!(out, "#NOTES:")?;
    for field in [steps_type, description, difficulty, meter] {
        writeln!(out, "     {field}:")?;
    }
    writeln!(out, "     0.000000,0.000000,0.000000,0.000000,0.000000:")?;
    writeln!(out, "{notes}\n;")
}

/// Places beat 0 on the first timing point, or whole measures earlier when something comes
/// before it.
fn tempo_map(chart: &ValidChart) -> Result<TempoMap, WriteError> {
    let missing_tempo = || WriteError::MissingRequiredTargetField {
        format: Format::Sm,
        field: "timing_points".to_owned(),
    };
    let first = chart.timing_points.first().ok_or_else(missing_tempo)?;
    let base = TempoMap::from_times(first.time_ms, &chart.timing_points, &chart.stops)
        .ok_or_else(missing_tempo)?;
    let earliest = chart
        .notes
        .iter()
        .map(|note| note.time_ms)
        .chain(chart.stops.iter().map(|stop| stop.time_ms))
        .fold(first.time_ms, f64::min);
    let earliest_beat = base.beat_at(earliest);
    if earliest_beat >= 0.0 {
        return Ok(base);
    }
    let measures = (-earliest_beat / 4.0).ceil();
    TempoMap::from_times(
        base.time_at(-4.0 * measures),
        &chart.timing_points,
        &chart.stops,
    )
    .ok_or_else(missing_tempo)
}

/// Picks the difficulty slot and description for the chart's label.
fn difficulty_slot(chart: &ValidChart, log: &mut LossyLog) -> (&'static str, String) {
    let description = chart
        .metadata
        .passthrough
        .get("sm.NOTES.description")
        .cloned()
        .unwrap_or_default();
    let Some(label) = &chart.difficulty_label else {
        log.push(LossyNotice::Defaulted {
            field: "#NOTES difficulty".to_owned(),
            value: "Edit".to_owned(),
        });
        return ("Edit", description);
    };
    match DIFFICULTIES
        .iter()
        .find(|name| name.eq_ignore_ascii_case(label))
    {
        Some(&name) if name != "Edit" => (name, description),
        Some(_) => ("Edit", description),
        None => ("Edit", label.clone()),
    }
}

fn slot_of(tempo: &TempoMap, time_ms: f64) -> (i64, f64) {
    let slot = (tempo.beat_at(time_ms) * SLOTS_PER_BEAT as f64)
        .round()
        .max(0.0) as i64;
    let snapped = tempo.time_at(slot as f64 / SLOTS_PER_BEAT as f64);
    (slot, (snapped - time_ms).abs())
}

/// Lays the notes out on the 192nd grid and renders the measures.
fn note_data(
    chart: &ValidChart,
    tempo: &TempoMap,
    log: &mut LossyLog,
) -> Result<String, WriteError> {
    let key_count = usize::from(chart.key_count);
    let mut grid: BTreeMap<i64, Vec<u8>> = BTreeMap::new();
    let mut last_slots: Vec<Option<i64>> = vec![None; key_count];
    let mut quantized = 0;
    let mut max_shift_ms = 0.0_f64;
    let mut overlapping = 0;
    let mut put = |slot: i64, lane: usize, cell: u8| {
        let row = grid.entry(slot).or_insert_with(|| vec![b'0'; key_count]);
        if let Some(target) = row.get_mut(lane) {
            *target = cell;
        }
    };

    for note in chart.notes.iter() {
        let lane = usize::from(note.lane);
        let (start, start_shift) = slot_of(tempo, note.time_ms);
        let end = note.is_hold().then(|| {
            let (end, end_shift) = slot_of(tempo, note.end_time_ms);
            (end.max(start + 1), end_shift)
        });
        let Some(last_slot) = last_slots.get_mut(lane) else {
            continue;
        };
        if last_slot.is_some_and(|last| start <= last) {
            overlapping += 1;
            continue;
        }
        let shift = end.map_or(start_shift, |(_, end_shift)| start_shift.max(end_shift));
        if shift > QUANTIZE_TOLERANCE_MS {
            quantized += 1;
            max_shift_ms = max_shift_ms.max(shift);
        }
        match end {
            Some((end, _)) => {
                put(start, lane, b'2');
                put(end, lane, b'3');
                *last_slot = Some(end);
            }
            None => {
                put(start, lane, b'1');
                *last_slot = Some(start);
            }
        }
    }
    if quantized > 0 {
        log.push(LossyNotice::Quantized {
            count: quantized,
            max_shift_ms,
        });
    }
    if overlapping > 0 {
        log.push(LossyNotice::OverlappingNotesDropped { count: overlapping });
    }

    let last_slot = grid.keys().next_back().copied().unwrap_or(0);
    let measures = last_slot / SLOTS_PER_MEASURE + 1;
    if measures > MAX_MEASURES {
        return Err(WriteError::TooManyMeasures {
            format: Format::Sm,
            measures: measures as u64,
            limit: MAX_MEASURES as u64,
        });
    }
    let empty_row = "0".repeat(key_count);
    let rendered = (0..measures)
        .map(|measure| {
            let base = measure * SLOTS_PER_MEASURE;
            let step = grid
                .range(base..base + SLOTS_PER_MEASURE)
                .fold(SLOTS_PER_BEAT, |step, (slot, _)| step.gcd(&(slot - base)));
            (0..SLOTS_PER_MEASURE / step)
                .map(|row| {
                    grid.get(&(base + row * step)).map_or_else(
                        || empty_row.clone(),
                        |cells| String::from_utf8_lossy(cells).into_owned(),
                    )
                })
                .join("\n")
        })
        .enumerate()
        .map(|(measure, rows)| {
            if measure == 0 {
                rows
            } else {
                format!(",  // measure {measure}\n{rows}")
            }
        })
        .join("\n");
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        chart::{Chart, Note, ScrollVelocity, TimingPoint},
        validate::validate,
    };

    fn valid(chart: Chart) -> ValidChart {
        validate(chart).unwrap().chart
    }

    fn chart() -> Chart {
        let mut chart = Chart::new(4);
        chart.metadata.title = Some("Song".into());
        chart.metadata.artist = Some("Artist".into());
        chart.metadata.audio_file = Some("song.ogg".into());
        chart.difficulty_label = Some("Hard".into());
        chart
            .metadata
            .passthrough
            .insert("sm.NOTES.meter".into(), "7".into());
        chart.timing_points = vec![TimingPoint::new(0.0, 120.0)];
        chart.notes = vec![
            Note::tap(0.0, 0),
            Note::hold(500.0, 1500.0, 1),
            Note::tap(2250.0, 3),
        ];
        chart
    }

    #[test]
    fn writes_measures_with_coarsest_rows() {
        let output = write(&valid(chart())).unwrap();
        assert_eq!(output.lossy, vec![]);
        let text = String::from_utf8(output.bytes).unwrap();
        assert_eq!(
            text,
            "#TITLE:Song;
#ARTIST:Artist;
#MUSIC:song.ogg;
#OFFSET:0.000000;
#BPMS:0.000000=120.000000;
#STOPS:;
#NOTES:
     dance-single:
     :
     Hard:
     7:
     0.000000,0.000000,0.000000,0.000000,0.000000:
1000
0200
0000
0300
,  // measure 1
0000
0001
0000
0000
0000
0000
0000
0000
;
"
        );
    }

    #[test]
    fn far_notes_are_refused() {
        let mut chart = chart();
        chart.notes = vec![Note::tap(10_000_000_000.0, 0)];
        assert_eq!(
            write(&valid(chart)),
            Err(WriteError::TooManyMeasures {
                format: Format::Sm,
                measures: 5_000_001,
                limit: 100_000,
            })
        );
    }

    #[test]
    fn early_notes_move_beat_zero_back() {
        let mut chart = chart();
        chart.timing_points = vec![TimingPoint::new(1000.0, 120.0)];
        chart.notes = vec![Note::tap(500.0, 0)];
        let text = String::from_utf8(write(&valid(chart)).unwrap().bytes).unwrap();
        assert!(text.contains("#OFFSET:1.000000;"), "{text}");
        assert!(text.contains("#BPMS:0.000000=120.000000;"), "{text}");
    }

    #[test]
    fn reports_losses() {
        let mut chart = chart();
        chart.metadata.title = None;
        chart.difficulty_label = Some("4K Insane".into());
        chart.scroll_velocities = vec![ScrollVelocity {
            time_ms: 0.0,
            multiplier: 2.0,
        }];
        chart
            .metadata
            .passthrough
            .insert("osu.Difficulty.OverallDifficulty".into(), "8".into());
        chart.notes.push(Note::tap(2252.0, 3));
        chart.notes.push(Note::tap(3005.0, 2));
        let output = write(&valid(chart)).unwrap();
        let text = String::from_utf8(output.bytes).unwrap();
        assert!(text.contains("     Edit:\n"), "{text}");
        assert!(text.contains("     4K Insane:\n"), "{text}");
        assert_eq!(
            output.lossy,
            vec![
                LossyNotice::Quantized {
                    count: 1,
                    max_shift_ms: 5.0,
                },
                LossyNotice::OverlappingNotesDropped { count: 1 },
                LossyNotice::Defaulted {
                    field: "#TITLE".into(),
                    value: DEFAULT_TITLE.into(),
                },
                LossyNotice::Dropped {
                    field: "scroll velocities".into(),
                    count: 1,
                },
                LossyNotice::PassthroughDropped {
                    keys: vec!["osu.Difficulty.OverallDifficulty".into()],
                },
            ]
        );
    }

    #[test]
    fn unrepresentable_key_count() {
        let mut chart = chart();
        chart.key_count = 12;
        assert_eq!(
            write(&valid(chart)),
            Err(WriteError::UnrepresentableKeyCount {
                key_count: 12,
                format: Format::Sm,
            })
        );
    }
}
