//! Reading `.osu` files into charts.

use std::{collections::BTreeMap, str::FromStr};

use tracing::{debug, trace};

use super::{Section, lane_of};
use crate::{
    chart::{Chart, Format, Metadata, Note, ScrollVelocity, TimingPoint},
    parse::{Location, ParseError, ParseOutput, ParseWarning, Tally, decode},
    util::StrExtension,
};

const HEADER_PREFIX: &str = "osu file format v";

/// Only osu!mania charts can be read.
const MANIA_MODE: &str = "3";

/// `Key: Value` entries of a section, each with the line it came from.
type Entries<'a> = BTreeMap<&'a str, (&'a str, &'a str)>;

/// Lines of a `.osu` file grouped by section.
#[derive(Debug, Default)]
struct Sections<'a> {
    key_values: BTreeMap<Section, Entries<'a>>,
    records: BTreeMap<Section, Vec<&'a str>>,
}

impl<'a> Sections<'a> {
    fn entries(&self, section: Section) -> impl Iterator<Item = (&'a str, (&'a str, &'a str))> {
        self.key_values
            .get(&section)
            .into_iter()
            .flat_map(|entries| entries.iter().map(|(&key, &value)| (key, value)))
    }

    fn get(&self, section: Section, key: &str) -> Option<(&'a str, &'a str)> {
        self.key_values
            .get(&section)
            .and_then(|entries| entries.get(key))
            .copied()
    }

    fn records(&self, section: Section) -> &[&'a str] {
        self.records
            .get(&section)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Parses an osu!mania `.osu` file.
///
/// # Errors
///
/// Returns [`ParseError`] when the file is malformed or is not an osu!mania chart.
pub fn parse(raw: &[u8]) -> Result<ParseOutput, ParseError> {
    let source = decode(raw)?;
    let (version, sections) = split_sections(source)?;
    let mut warnings = vec![];

    match sections.get(Section::General, "Mode") {
        Some((MANIA_MODE, _)) => {}
        Some((mode, line)) => {
            return Err(ParseError::UnsupportedMode {
                at: Location::of(source, line),
                expected: "mode 3 (osu!mania)".to_owned(),
                found: mode.to_owned(),
            });
        }
        None => {
            return Err(ParseError::UnsupportedMode {
                at: Location::key_path("[General].Mode"),
                expected: "mode 3 (osu!mania)".to_owned(),
                found: "mode 0 (osu!standard, the default)".to_owned(),
            });
        }
    }
    let key_count = read_key_count(source, &sections)?;
    let (mut metadata, difficulty_label) = read_metadata(source, &sections)?;
    metadata.background_file = read_events(&sections, &mut warnings);

    let (timing_points, scroll_velocities) = read_timing_points(source, &sections)?;
    let notes = read_hit_objects(source, &sections, key_count, &mut warnings)?;

    let chart = Chart {
        metadata,
        key_count,
        timing_points,
        scroll_velocities,
        stops: vec![],
        notes,
        difficulty_label,
    };
    debug!(
        version,
        key_count,
        notes = chart.notes.len(),
        "parsed osu chart"
    );
    Ok(ParseOutput { chart, warnings })
}

fn split_sections(source: &str) -> Result<(u32, Sections<'_>), ParseError> {
    let mut lines = source
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty());
    let header = lines.next().unwrap_or_default();
    let version = header
        .strip_prefix_ignore_case(HEADER_PREFIX)
        .ok_or_else(|| ParseError::MalformedHeader {
            at: Location::of(source, header),
            expected: format!("`{HEADER_PREFIX}<N>`"),
            found: header.to_owned(),
        })?;
    let version = number::<u32>(source, version, "format version")?;

    let mut sections = Sections::default();
    let mut current = None;
    for line in lines {
        if line.starts_with("//") {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
            let section =
                Section::from_name(name.trim()).ok_or_else(|| ParseError::UnknownSection {
                    at: Location::of(source, line),
                    found: name.trim().to_owned(),
                })?;
            current = Some(section);
            continue;
        }
        let Some(section) = current else {
            return Err(ParseError::MalformedHeader {
                at: Location::of(source, line),
                expected: "a `[Section]` header".to_owned(),
                found: line.to_owned(),
            });
        };
        if section.is_key_value() {
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| ParseError::MalformedHeader {
                    at: Location::of(source, line),
                    expected: "`Key: Value`".to_owned(),
                    found: line.to_owned(),
                })?;
            sections
                .key_values
                .entry(section)
                .or_default()
                .insert(key.trim(), (value.trim(), line));
        } else {
            sections.records.entry(section).or_default().push(line);
        }
    }
    Ok((version, sections))
}

/// Parses `text`, a subslice of `source`.
fn number<T: FromStr>(source: &str, text: &str, expected: &str) -> Result<T, ParseError> {
    text.trim()
        .parse()
        .map_err(|_| ParseError::InvalidNumber {
            at: Location::of(source, text),
            expected: expected.to_owned(),
            found: text.trim().to_owned(),
        })
}

fn decimal(source: &str, text: &str, expected: &str) -> Result<f64, ParseError> {
    let value: f64 = number(source, text, expected)?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ParseError::InvalidNumber {
            at: Location::of(source, text),
            expected: expected.to_owned(),
            found: text.trim().to_owned(),
        })
    }
}

fn read_key_count(source: &str, sections: &Sections<'_>) -> Result<u8, ParseError> {
    let (circle_size, _) = sections
        .get(Section::Difficulty, "CircleSize")
        .ok_or_else(|| ParseError::MissingRequiredField {
            at: Location::key_path("[Difficulty].CircleSize"),
            field: "CircleSize".to_owned(),
        })?;
    let keys = decimal(source, circle_size, "key count")?;
    if keys.fract() != 0.0 || !(0.0..=f64::from(u8::MAX)).contains(&keys) {
        return Err(ParseError::InvalidNumber {
            at: Location::of(source, circle_size),
            expected: "whole key count".to_owned(),
            found: circle_size.to_owned(),
        });
    }
    Ok(keys as u8)
}

fn non_empty(value: &str) -> Option<String> {
    value.non_blank().map(str::to_owned)
}

/// Reads the key-value sections, returning the metadata and the difficulty name.
fn read_metadata(
    source: &str,
    sections: &Sections<'_>,
) -> Result<(Metadata, Option<String>), ParseError> {
    let mut metadata = Metadata {
        source_format: Some(Format::Osu),
        ..Metadata::default()
    };
    let mut version = None;
    let mut title_unicode = None;
    let mut artist_unicode = None;
    for section in Section::ALL.into_iter().filter(|section| section.is_key_value()) {
        for (key, (value, _)) in sections.entries(section) {
            match (section, key) {
                (Section::General, "AudioFilename") => metadata.audio_file = non_empty(value),
                (Section::General, "PreviewTime") => {
                    let preview = decimal(source, value, "preview time in milliseconds")?;
                    metadata.preview_time_ms = (preview >= 0.0).then_some(preview);
                }
                (Section::General, "Mode") | (Section::Difficulty, "CircleSize") => {}
                (Section::Metadata, "Title") => metadata.title = non_empty(value),
                (Section::Metadata, "TitleUnicode") => title_unicode = non_empty(value),
                (Section::Metadata, "Artist") => metadata.artist = non_empty(value),
                (Section::Metadata, "ArtistUnicode") => artist_unicode = non_empty(value),
                (Section::Metadata, "Creator") => metadata.creator = non_empty(value),
                (Section::Metadata, "Version") => version = non_empty(value),
                (Section::Metadata, "Source") => metadata.source = non_empty(value),
                (Section::Metadata, "Tags") => {
                    metadata.tags = value.split_whitespace().map(str::to_owned).collect();
                }
                _ => {
                    metadata
                        .passthrough
                        .insert(format!("osu.{}.{key}", section.name()), value.to_owned());
                }
            }
        }
    }
    // the unicode fields repeat the romanised ones unless the song has a native spelling
    if let Some(native) = title_unicode
        && metadata.title.as_ref() != Some(&native)
    {
        metadata.alt_title = metadata.title.replace(native);
    }
    if let Some(native) = artist_unicode
        && metadata.artist.as_ref() != Some(&native)
    {
        metadata.alt_artist = metadata.artist.replace(native);
    }
    Ok((metadata, version))
}

/// Picks the background image and counts the events that are dropped.
fn read_events(sections: &Sections<'_>, warnings: &mut Vec<ParseWarning>) -> Option<String> {
    let mut background = None;
    let mut ignored = Tally::default();
    for &line in sections.records(Section::Events) {
        let mut fields = line.splitn(3, ',').map(str::trim);
        let kind = fields.next().unwrap_or_default();
        let start = fields.next().unwrap_or_default();
        let rest = fields.next().unwrap_or_default();
        // quoted names may contain commas
        let file = match rest.strip_prefix('"') {
            Some(quoted) => quoted.split_once('"').map_or(quoted, |(file, _)| file),
            None => rest.split(',').next().unwrap_or_default().trim(),
        };
        let is_background = matches!(kind, "0" | "Background") && start == "0";
        if is_background && background.is_none() && !file.is_empty() {
            background = Some(file.to_owned());
        } else {
            ignored.bump();
        }
    }
    ignored.report(warnings, |count| ParseWarning::EventsIgnored { count });
    trace!(
        background = background.as_deref(),
        events = sections.records(Section::Events).len(),
        "read osu events"
    );
    background
}

fn read_timing_points(
    source: &str,
    sections: &Sections<'_>,
) -> Result<(Vec<TimingPoint>, Vec<ScrollVelocity>), ParseError> {
    let mut timing_points = vec![];
    let mut scroll_velocities = vec![];
    for &line in sections.records(Section::TimingPoints) {
        let fields: Vec<_> = line.split(',').collect();
        let [time, beat_length, rest @ ..] = fields.as_slice() else {
            return Err(ParseError::Truncated {
                at: Location::of(source, line),
                expected: "`time,beatLength` timing point".to_owned(),
            });
        };
        let time_ms = decimal(source, time, "time in milliseconds")?;
        let beat_length = decimal(source, beat_length, "beat length in milliseconds")?;
        let meter = match rest.first() {
            Some(meter) => number::<u32>(source, meter, "beats per measure")?,
            None => TimingPoint::DEFAULT_METER,
        };
        let uninherited = match rest.get(4) {
            Some(flag) => number::<u8>(source, flag, "0 or 1")? != 0,
            None => true,
        };
        if uninherited {
            timing_points.push(TimingPoint {
                time_ms,
                bpm: 60_000.0 / beat_length,
                meter: if meter == 0 {
                    TimingPoint::DEFAULT_METER
                } else {
                    meter
                },
            });
        } else {
            scroll_velocities.push(ScrollVelocity {
                time_ms,
                multiplier: if beat_length < 0.0 {
                    -100.0 / beat_length
                } else {
                    1.0
                },
            });
        }
    }
    Ok((timing_points, scroll_velocities))
}

/// Whether a hit sample like `0:0:0:0:` selects nothing beyond the defaults.
fn is_default_sample(sample: &str) -> bool {
    sample
        .split(':')
        .map(str::trim)
        .all(|part| part.is_empty() || part == "0")
}

fn read_hit_objects(
    source: &str,
    sections: &Sections<'_>,
    key_count: u8,
    warnings: &mut Vec<ParseWarning>,
) -> Result<Vec<Note>, ParseError> {
    const HIT_CIRCLE: u32 = 1;
    const HOLD: u32 = 128;

    let mut notes = vec![];
    let mut custom_sounds = Tally::default();
    for &line in sections.records(Section::HitObjects) {
        let fields: Vec<_> = line.split(',').collect();
        let [x, _y, time, kind, rest @ ..] = fields.as_slice() else {
            return Err(ParseError::Truncated {
                at: Location::of(source, line),
                expected: "`x,y,time,type` hit object".to_owned(),
            });
        };
        let lane = lane_of(decimal(source, x, "x coordinate")?, key_count);
        let time_ms = decimal(source, time, "time in milliseconds")?;
        let kind = number::<u32>(source, kind, "hit object type")?;
        let hit_sound = rest.first().map_or("0", |sound| sound.trim());
        let (note, sample) = if kind & HOLD != 0 {
            let params = *rest.get(1).ok_or_else(|| ParseError::Truncated {
                at: Location::of(source, line),
                expected: "hold end time".to_owned(),
            })?;
            let (end, sample) = params.split_once(':').unwrap_or((params, ""));
            let end_time_ms = decimal(source, end, "hold end time in milliseconds")?;
            (Note::hold(time_ms, end_time_ms, lane), sample)
        } else if kind & HIT_CIRCLE != 0 {
            (Note::tap(time_ms, lane), rest.get(1).copied().unwrap_or_default())
        } else {
            return Err(ParseError::UnsupportedMode {
                at: Location::of(source, line),
                expected: "hit circle (1) or hold (128)".to_owned(),
                found: kind.to_string(),
            });
        };
        if hit_sound != "0" || !is_default_sample(sample) {
            custom_sounds.bump();
        }
        notes.push(note);
    }
    notes.sort_by(|a, b| a.time_ms.total_cmp(&b.time_ms).then(a.lane.cmp(&b.lane)));
    custom_sounds.report(warnings, |count| ParseWarning::HitSoundsIgnored { count });
    Ok(notes)
}
