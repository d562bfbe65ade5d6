//! Reading `.sm` files into charts.

use num::rational::Ratio;
use tracing::{debug, trace};

use super::{
    UNSUPPORTED_TIMING_TAGS, key_count_of,
    msd::{self, Tag},
};
use crate::{
    chart::{Chart, Format, Metadata, Note, Stop, TimingPoint, tempo::TempoMap},
    parse::{Location, ParseError, ParseOutput, ParseWarning, Tally, decode},
};

/// Song wide values shared by every chart of a file.
#[derive(Debug, Default)]
struct Song {
    metadata: Metadata,
    offset_s: f64,
    /// `(beat, bpm)` in declaration order.
    bpms: Vec<(f64, f64)>,
    /// `(beat, seconds)` in declaration order.
    stops: Vec<(f64, f64)>,
    warnings: Vec<ParseWarning>,
}

/// Parses the first chart of a `.sm` file.
///
/// # Errors
///
/// Returns [`ParseError`] when the file is malformed, and
/// [`ParseError::MissingRequiredField`] when it has no `#NOTES`.
pub fn parse(raw: &[u8]) -> Result<ParseOutput, ParseError> {
    let source = decode(raw)?;
    parse_source(source)?
        .into_iter()
        .next()
        .ok_or_else(|| ParseError::MissingRequiredField {
            at: Location::span(source, source.len(), source.len()),
            field: "#NOTES".to_owned(),
        })
}

/// Parses every chart of a `.sm` file, in file order.
///
/// # Errors
///
/// Returns [`ParseError`] when the file or any of its charts is malformed.
pub fn parse_all(raw: &[u8]) -> Result<Vec<ParseOutput>, ParseError> {
    parse_source(decode(raw)?)
}

fn parse_source(source: &str) -> Result<Vec<ParseOutput>, ParseError> {
    let tags = msd::tokenize(source)?;
    let song = read_song(source, &tags)?;
    let charts: Vec<_> = tags
        .iter()
        .filter(|tag| tag.name.eq_ignore_ascii_case("NOTES"))
        .collect();
    if charts.is_empty() {
        return Ok(vec![]);
    }

    let origin_ms = -song.offset_s * 1000.0;
    let stops_ms: Vec<_> = song
        .stops
        .iter()
        .map(|&(beat, seconds)| (beat, seconds * 1000.0))
        .collect();
    let tempo = TempoMap::from_beats(origin_ms, &song.bpms, &stops_ms).ok_or_else(|| {
        ParseError::MissingRequiredField {
            at: Location::span(source, 0, 0),
            field: "#BPMS".to_owned(),
        }
    })?;

    let outputs = charts
        .into_iter()
        .map(|tag| read_chart(source, tag, &song, &tempo))
        .collect::<Result<Vec<_>, _>>()?;
    debug!(charts = outputs.len(), "parsed sm file");
    Ok(outputs)
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

fn read_song(source: &str, tags: &[Tag<'_>]) -> Result<Song, ParseError> {
    let mut song = Song::default();
    let metadata = &mut song.metadata;
    metadata.source_format = Some(Format::Sm);
    for tag in tags {
        let name = tag.name.to_ascii_uppercase();
        if name == "NOTES" {
            continue;
        }
        let value = tag.joined_value();
        match name.as_str() {
            "TITLE" => metadata.title = non_empty(value),
            "SUBTITLE" => metadata.source = non_empty(value),
            "ARTIST" => metadata.artist = non_empty(value),
            "TITLETRANSLIT" => metadata.alt_title = non_empty(value),
            "ARTISTTRANSLIT" => metadata.alt_artist = non_empty(value),
            "GENRE" => metadata.genre = non_empty(value),
            "CREDIT" => metadata.creator = non_empty(value),
            "MUSIC" => metadata.audio_file = non_empty(value),
            "BACKGROUND" => metadata.background_file = non_empty(value),
            "OFFSET" if !value.is_empty() => {
                song.offset_s = parse_number(source, tag, &value)?;
            }
            "SAMPLESTART" if !value.is_empty() => {
                metadata.preview_time_ms = Some(parse_number(source, tag, &value)? * 1000.0);
            }
            "BPMS" => song.bpms = parse_pairs(source, tag, &value)?,
            "STOPS" | "FREEZES" => song.stops = parse_pairs(source, tag, &value)?,
            _ if value.is_empty() => {}
            _ if UNSUPPORTED_TIMING_TAGS.contains(&name.as_str()) => {
                song.warnings.push(ParseWarning::IgnoredTimingTag {
                    tag: name.clone(),
                    at: tag.location(source),
                });
            }
            _ => {
                metadata.passthrough.insert(format!("sm.{name}"), value);
            }
        }
    }
    Ok(song)
}

fn parse_number(source: &str, tag: &Tag<'_>, text: &str) -> Result<f64, ParseError> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| ParseError::InvalidNumber {
            at: tag.location(source),
            expected: "decimal number".to_owned(),
            found: text.trim().to_owned(),
        })
}

/// Parses a `beat=value,beat=value` list.
fn parse_pairs(source: &str, tag: &Tag<'_>, value: &str) -> Result<Vec<(f64, f64)>, ParseError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (beat, value) =
                entry
                    .split_once('=')
                    .ok_or_else(|| ParseError::MalformedHeader {
                        at: tag.location(source),
                        expected: "`beat=value`".to_owned(),
                        found: entry.to_owned(),
                    })?;
            Ok((
                parse_number(source, tag, beat)?,
                parse_number(source, tag, value)?,
            ))
        })
        .collect()
}

fn read_chart(
    source: &str,
    tag: &Tag<'_>,
    song: &Song,
    tempo: &TempoMap,
) -> Result<ParseOutput, ParseError> {
    let (steps_type, description, difficulty, meter, data) = match *tag.params.as_slice() {
        [steps_type, description, difficulty, meter, _radar, data] => {
            (steps_type, description, difficulty, meter, data)
        }
        ref params if params.len() < 6 => {
            return Err(ParseError::Truncated {
                at: tag.location(source),
                expected: format!("6 #NOTES fields, found {}", params.len()),
            });
        }
        ref params => {
            return Err(ParseError::MalformedHeader {
                at: tag.location(source),
                expected: "6 #NOTES fields".to_owned(),
                found: format!("{} fields", params.len()),
            });
        }
    };
    let steps_type = msd::unescape(steps_type);
    let description = msd::unescape(description);
    let difficulty = msd::unescape(difficulty);
    let meter = msd::unescape(meter);

    let measures = split_measures(data);
    let key_count = match key_count_of(&steps_type) {
        Some(key_count) => key_count,
        None => measures
            .iter()
            .flatten()
            .next()
            .map(|row| column_count(source, row))
            .transpose()?
            .ok_or_else(|| ParseError::UnsupportedMode {
                at: Location::of(source, tag.params.first().copied().unwrap_or_default()),
                expected: "a known steps type or note data".to_owned(),
                found: steps_type.clone(),
            })?,
    };

    let mut warnings = song.warnings.clone();
    let notes = read_notes(source, &measures, key_count, tempo, &mut warnings)?;

    let mut metadata = song.metadata.clone();
    if !description.is_empty() {
        metadata
            .passthrough
            .insert("sm.NOTES.description".to_owned(), description.clone());
    }
    if !meter.is_empty() {
        metadata
            .passthrough
            .insert("sm.NOTES.meter".to_owned(), meter);
    }
    let difficulty_label = if difficulty.eq_ignore_ascii_case("Edit") && !description.is_empty() {
        Some(description)
    } else {
        non_empty(difficulty)
    };

    let chart = Chart {
        metadata,
        key_count,
        timing_points: song
            .bpms
            .iter()
            .map(|&(beat, bpm)| TimingPoint::new(tempo.time_at(beat), bpm))
            .collect(),
        scroll_velocities: vec![],
        stops: song
            .stops
            .iter()
            .filter(|&&(_, seconds)| seconds != 0.0)
            .map(|&(beat, seconds)| Stop {
                time_ms: tempo.time_at(beat),
                duration_ms: seconds * 1000.0,
            })
            .collect(),
        notes,
        difficulty_label,
    };
    trace!(
        steps_type = %steps_type,
        key_count,
        notes = chart.notes.len(),
        "parsed sm chart"
    );
    Ok(ParseOutput { chart, warnings })
}

/// Splits note data into measures of trimmed, non-empty rows. Rows stay subslices of the
/// source so they can be located.
fn split_measures(data: &str) -> Vec<Vec<&str>> {
    let mut measures = vec![];
    let mut current = vec![];
    for line in data.split('\n') {
        let code = line.find("//").and_then(|i| line.get(..i)).unwrap_or(line);
        for (i, part) in code.split(',').enumerate() {
            if i > 0 {
                measures.push(std::mem::take(&mut current));
            }
            let row = part.trim();
            if !row.is_empty() {
                current.push(row);
            }
        }
    }
    if !current.is_empty() {
        measures.push(current);
    }
    measures
}

/// Note characters of a row, without `{...}` and `[...]` attachments.
fn columns(source: &str, row: &str) -> Result<Vec<char>, ParseError> {
    let mut columns = vec![];
    let mut chars = row.chars();
    while let Some(c) = chars.next() {
        let close = match c {
            '{' => '}',
            '[' => ']',
            _ => {
                columns.push(c);
                continue;
            }
        };
        if !chars.by_ref().any(|c| c == close) {
            return Err(ParseError::MalformedNoteRow {
                at: Location::of(source, row),
                detail: format!("unclosed `{c}`"),
            });
        }
    }
    Ok(columns)
}

fn column_count(source: &str, row: &str) -> Result<u8, ParseError> {
    let count = columns(source, row)?.len();
    u8::try_from(count).map_err(|_| ParseError::MalformedNoteRow {
        at: Location::of(source, row),
        detail: format!("{count} columns is too many"),
    })
}

fn beat_to_f64(beat: Ratio<i64>) -> f64 {
    *beat.numer() as f64 / *beat.denom() as f64
}

#[derive(Debug, Default)]
struct NoteTallies {
    rolls: Tally,
    lifts: Tally,
    mines: Tally,
    fakes: Tally,
    keysounds: Tally,
}

fn read_notes(
    source: &str,
    measures: &[Vec<&str>],
    key_count: u8,
    tempo: &TempoMap,
    warnings: &mut Vec<ParseWarning>,
) -> Result<Vec<Note>, ParseError> {
    let mut notes = vec![];
    let mut heads: Vec<Option<(f64, &str)>> = vec![None; usize::from(key_count)];
    let mut tallies = NoteTallies::default();

    for (measure, rows) in measures.iter().enumerate() {
        let row_count = rows.len() as i64;
        for (index, &row) in rows.iter().enumerate() {
            let columns = columns(source, row)?;
            if columns.len() != usize::from(key_count) {
                return Err(ParseError::MalformedNoteRow {
                    at: Location::of(source, row),
                    detail: format!(
                        "expected {key_count} columns, found {}",
                        columns.len()
                    ),
                });
            }
            let beat = Ratio::new(4 * (measure as i64 * row_count + index as i64), row_count);
            let time_ms = tempo.time_at(beat_to_f64(beat));
            for (lane, (&c, head)) in columns.iter().zip(heads.iter_mut()).enumerate() {
                let lane = lane as u8;
                match c.to_ascii_uppercase() {
                    '0' => {}
                    '1' => notes.push(Note::tap(time_ms, lane)),
                    c @ ('2' | '4') => {
                        if c == '4' {
                            tallies.rolls.bump();
                        }
                        if let Some((head_time, head_row)) = head.replace((time_ms, row)) {
                            notes.push(Note::tap(head_time, lane));
                            warnings.push(ParseWarning::UnterminatedHold {
                                lane,
                                at: Location::of(source, head_row),
                            });
                        }
                    }
                    '3' => match head.take() {
                        Some((head_time, _)) => notes.push(Note::hold(head_time, time_ms, lane)),
                        None => warnings.push(ParseWarning::OrphanHoldTail {
                            lane,
                            at: Location::of(source, row),
                        }),
                    },
                    'L' => {
                        tallies.lifts.bump();
                        notes.push(Note::tap(time_ms, lane));
                    }
                    'M' => tallies.mines.bump(),
                    'F' => tallies.fakes.bump(),
                    'K' => tallies.keysounds.bump(),
                    other => {
                        return Err(ParseError::MalformedNoteRow {
                            at: Location::of(source, row),
                            detail: format!("unknown note type `{other}`"),
                        });
                    }
                }
            }
        }
    }

    for (lane, head) in heads.into_iter().enumerate() {
        if let Some((head_time, head_row)) = head {
            let lane = lane as u8;
            notes.push(Note::tap(head_time, lane));
            warnings.push(ParseWarning::UnterminatedHold {
                lane,
                at: Location::of(source, head_row),
            });
        }
    }
    notes.sort_by(|a, b| {
        a.time_ms
            .total_cmp(&b.time_ms)
            .then(a.lane.cmp(&b.lane))
    });

    let NoteTallies {
        rolls,
        lifts,
        mines,
        fakes,
        keysounds,
    } = tallies;
    rolls.report(warnings, |count| ParseWarning::RollsAsHolds { count });
    lifts.report(warnings, |count| ParseWarning::LiftsAsTaps { count });
    mines.report(warnings, |count| ParseWarning::MinesDropped { count });
    fakes.report(warnings, |count| ParseWarning::FakesDropped { count });
    keysounds.report(warnings, |count| ParseWarning::KeysoundsDropped { count });
    Ok(notes)
}
