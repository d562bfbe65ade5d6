//! Reading `.qua` files into charts.

use serde_yaml::{Mapping, Value};
use tracing::{debug, trace};

use super::{MANAGED_KEYS, SIGNATURES, key_count_of};
use crate::{
    chart::{Chart, Format, Metadata, Note, ScrollVelocity, TimingPoint},
    parse::{Location, ParseError, ParseOutput, ParseWarning, Tally, decode},
    util::StrExtension,
};

/// Parses a Quaver `.qua` file.
///
/// # Errors
///
/// Returns [`ParseError::MalformedStructure`] when the text is not a YAML mapping, and other
/// [`ParseError`]s pointing at the offending key path.
pub fn parse(raw: &[u8]) -> Result<ParseOutput, ParseError> {
    let source = decode(raw)?;
    let document: Value =
        serde_yaml::from_str(source).map_err(|err| structure_error(source, &err))?;
    let Value::Mapping(root) = document else {
        return Err(ParseError::MalformedStructure {
            at: Location::span(source, 0, 0),
            detail: "expected a mapping at the top level".to_owned(),
        });
    };

    let key_count = read_mode(&root)?;
    let mut warnings = vec![];
    let mut chart = Chart::new(key_count);
    let (metadata, difficulty_label) = read_metadata(&root)?;
    chart.metadata = metadata;
    chart.difficulty_label = difficulty_label;
    chart.timing_points = read_timing_points(&root)?;
    chart.scroll_velocities = read_scroll_velocities(&root)?;
    chart.notes = read_hit_objects(&root, key_count, &mut warnings)?;

    debug!(
        key_count,
        timing_points = chart.timing_points.len(),
        notes = chart.notes.len(),
        warnings = warnings.len(),
        "parsed qua chart"
    );
    Ok(ParseOutput { chart, warnings })
}

fn structure_error(source: &str, err: &serde_yaml::Error) -> ParseError {
    let at = err.location().map_or_else(
        || Location::span(source, 0, 0),
        |location| Location::span(source, location.index(), location.index()),
    );
    ParseError::MalformedStructure {
        at,
        detail: err.to_string(),
    }
}

/// Text of a value as it would be written back.
fn text_of(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.clone(),
        _ => serde_yaml::to_string(value)
            .map(|text| text.trim_end().to_owned())
            .unwrap_or_default(),
    }
}

/// A passthrough value as YAML text, so that the writer reads back the same type.
fn yaml_text(value: &Value) -> String {
    let Ok(text) = serde_yaml::to_string(value) else {
        return text_of(value);
    };
    let trimmed = text.trim_end();
    if serde_yaml::from_str::<Value>(trimmed).is_ok_and(|back| back == *value) {
        trimmed.to_owned()
    } else {
        text
    }
}

/// A mapping found at `path` in the document.
struct Node<'v> {
    fields: &'v Mapping,
    path: String,
}

impl<'v> Node<'v> {
    fn path_of(&self, key: &str) -> String {
        if self.path.is_empty() {
            key.to_owned()
        } else {
            format!("{}.{key}", self.path)
        }
    }

    fn get(&self, key: &str) -> Option<&'v Value> {
        self.fields.get(key).filter(|value| !value.is_null())
    }

    /// A finite number that may be absent.
    fn number(&self, key: &str, expected: &str) -> Result<Option<f64>, ParseError> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        let number = match value {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        };
        number
            .filter(|number: &f64| number.is_finite())
            .map(Some)
            .ok_or_else(|| ParseError::InvalidNumber {
                at: Location::key_path(self.path_of(key)),
                expected: expected.to_owned(),
                found: text_of(value),
            })
    }

    fn required_number(&self, key: &str, expected: &str) -> Result<f64, ParseError> {
        self.number(key, expected)?
            .ok_or_else(|| ParseError::MissingRequiredField {
                at: Location::key_path(self.path_of(key)),
                field: key.to_owned(),
            })
    }

    /// Items of a list that may be absent.
    fn list(&self, key: &str) -> Result<Vec<Node<'v>>, ParseError> {
        let Some(value) = self.get(key) else {
            return Ok(vec![]);
        };
        let Value::Sequence(items) = value else {
            return Err(ParseError::MalformedStructure {
                at: Location::key_path(self.path_of(key)),
                detail: "expected a list".to_owned(),
            });
        };
        items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let path = format!("{}[{i}]", self.path_of(key));
                match item {
                    Value::Mapping(fields) => Ok(Node { fields, path }),
                    _ => Err(ParseError::MalformedStructure {
                        at: Location::key_path(path),
                        detail: "expected a mapping".to_owned(),
                    }),
                }
            })
            .collect()
    }
}

fn root(fields: &Mapping) -> Node<'_> {
    Node {
        fields,
        path: String::new(),
    }
}

fn read_mode(fields: &Mapping) -> Result<u8, ParseError> {
    let root = root(fields);
    let mode = root
        .get("Mode")
        .ok_or_else(|| ParseError::MissingRequiredField {
            at: Location::key_path("Mode"),
            field: "Mode".to_owned(),
        })?;
    let has_scratch_key = root
        .get("HasScratchKey")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    mode.as_str()
        .and_then(|mode| key_count_of(mode, has_scratch_key))
        .ok_or_else(|| ParseError::UnsupportedMode {
            at: Location::key_path("Mode"),
            expected: "Keys4 or Keys7".to_owned(),
            found: text_of(mode),
        })
}

/// Reads the top-level scalar keys, returning the metadata and the difficulty name.
fn read_metadata(fields: &Mapping) -> Result<(Metadata, Option<String>), ParseError> {
    let root = root(fields);
    let mut metadata = Metadata {
        source_format: Some(Format::Qua),
        ..Metadata::default()
    };
    let mut difficulty_label = None;
    for (key, value) in fields {
        let Some(key) = key.as_str() else {
            continue;
        };
        let text = || text_of(value).non_blank().map(str::to_owned);
        match key {
            "AudioFile" => metadata.audio_file = text(),
            "SongPreviewTime" => {
                metadata.preview_time_ms = root.number(key, "preview time in milliseconds")?;
            }
            "BackgroundFile" => metadata.background_file = text(),
            "Title" => metadata.title = text(),
            "Artist" => metadata.artist = text(),
            "Source" => metadata.source = text(),
            "Creator" => metadata.creator = text(),
            "Genre" => metadata.genre = text(),
            "DifficultyName" => difficulty_label = text(),
            "Tags" => {
                metadata.tags = text_of(value)
                    .split(|c: char| c == ',' || c.is_whitespace())
                    .filter(|tag| !tag.is_empty())
                    .map(str::to_owned)
                    .collect();
            }
            key if MANAGED_KEYS.contains(&key) => {}
            key => {
                metadata
                    .passthrough
                    .insert(format!("qua.{key}"), yaml_text(value));
            }
        }
    }
    Ok((metadata, difficulty_label))
}

fn read_signature(node: &Node<'_>) -> Result<u32, ParseError> {
    let Some(value) = node.get("Signature") else {
        return Ok(TimingPoint::DEFAULT_METER);
    };
    let meter = match value {
        Value::String(name) => SIGNATURES
            .iter()
            .find(|(signature, _)| signature == name)
            .map(|&(_, meter)| meter),
        Value::Number(number) => number
            .as_u64()
            .filter(|&meter| meter > 0)
            .and_then(|meter| u32::try_from(meter).ok()),
        _ => None,
    };
    meter.ok_or_else(|| ParseError::InvalidNumber {
        at: Location::key_path(node.path_of("Signature")),
        expected: "Quadruple, Triple or a beat count".to_owned(),
        found: text_of(value),
    })
}

fn read_timing_points(fields: &Mapping) -> Result<Vec<TimingPoint>, ParseError> {
    root(fields)
        .list("TimingPoints")?
        .iter()
        .map(|node| {
            Ok(TimingPoint {
                time_ms: node
                    .number("StartTime", "time in milliseconds")?
                    .unwrap_or_default(),
                bpm: node.required_number("Bpm", "beats per minute")?,
                meter: read_signature(node)?,
            })
        })
        .collect()
}

fn read_scroll_velocities(fields: &Mapping) -> Result<Vec<ScrollVelocity>, ParseError> {
    root(fields)
        .list("SliderVelocities")?
        .iter()
        .map(|node| {
            Ok(ScrollVelocity {
                time_ms: node
                    .number("StartTime", "time in milliseconds")?
                    .unwrap_or_default(),
                multiplier: node
                    .number("Multiplier", "scroll speed multiplier")?
                    .unwrap_or_default(),
            })
        })
        .collect()
}

fn read_hit_objects(
    fields: &Mapping,
    key_count: u8,
    warnings: &mut Vec<ParseWarning>,
) -> Result<Vec<Note>, ParseError> {
    let mut key_sounds = Tally::default();
    let mut hit_sounds = Tally::default();
    let notes = root(fields)
        .list("HitObjects")?
        .iter()
        .map(|node| {
            let time_ms = node
                .number("StartTime", "time in milliseconds")?
                .unwrap_or_default();
            let lane = node.required_number("Lane", "a lane number from 1")?;
            let lane = (lane.fract() == 0.0 && (1.0..=f64::from(u8::MAX)).contains(&lane))
                .then(|| lane as u8 - 1)
                .ok_or_else(|| ParseError::InvalidNumber {
                    at: Location::key_path(node.path_of("Lane")),
                    expected: format!("a lane number from 1 to {key_count}"),
                    found: lane.to_string(),
                })?;
            let end_time_ms = node
                .number("EndTime", "time in milliseconds")?
                .unwrap_or_default();
            if node
                .get("KeySounds")
                .and_then(Value::as_sequence)
                .is_some_and(|sounds| !sounds.is_empty())
            {
                key_sounds.bump();
            }
            if node
                .get("HitSound")
                .map(text_of)
                .is_some_and(|sound| !sound.is_empty() && sound != "Normal")
            {
                hit_sounds.bump();
            }
            Ok(if end_time_ms > 0.0 {
                Note::hold(time_ms, end_time_ms, lane)
            } else {
                Note::tap(time_ms, lane)
            })
        })
        .collect::<Result<Vec<_>, ParseError>>()?;
    trace!(notes = notes.len(), "read hit objects");
    key_sounds.report(warnings, |count| ParseWarning::KeySoundsIgnored { count });
    hit_sounds.report(warnings, |count| ParseWarning::HitSoundsIgnored { count });
    Ok(notes)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const KEYS7: &str = "AudioFile: audio.mp3
SongPreviewTime: 12000
BackgroundFile: bg.png
MapId: 1234
Mode: Keys7
HasScratchKey: true
Title: Song
Artist: Artist
Source: ''
Tags: fast, jumps stream
Creator: Mapper
DifficultyName: Hard
EditorLayers: []
BPMDoesNotAffectScrollVelocity: true
InitialScrollVelocity: 1
TimingPoints:
- Bpm: 150
- StartTime: 4000
  Bpm: 200.5
  Signature: Triple
SliderVelocities:
- StartTime: 4000
  Multiplier: 0.5
- StartTime: 8000
HitObjects:
- StartTime: 400
  Lane: 1
  KeySounds: []
- StartTime: 800
  Lane: 8
  EndTime: 1600
  HitSound: Clap
  KeySounds:
  - Sample: 1
    Volume: 100
";

    #[test]
    fn reads_keys7_with_scratch() {
        let ParseOutput { chart, warnings } = parse(KEYS7.as_bytes()).unwrap();
        assert_eq!(chart.key_count, 8);
        assert_eq!(chart.difficulty_label.as_deref(), Some("Hard"));
        assert_eq!(chart.metadata.title.as_deref(), Some("Song"));
        assert_eq!(chart.metadata.source, None);
        assert_eq!(chart.metadata.preview_time_ms, Some(12000.0));
        assert_eq!(chart.metadata.background_file.as_deref(), Some("bg.png"));
        assert_eq!(chart.metadata.tags, vec!["fast", "jumps", "stream"]);
        assert_eq!(
            chart.metadata.passthrough.into_iter().collect::<Vec<_>>(),
            vec![
                ("qua.EditorLayers".to_owned(), "[]".to_owned()),
                ("qua.MapId".to_owned(), "1234".to_owned()),
            ]
        );
        assert_eq!(
            chart.timing_points,
            vec![
                TimingPoint::new(0.0, 150.0),
                TimingPoint {
                    time_ms: 4000.0,
                    bpm: 200.5,
                    meter: 3,
                },
            ]
        );
        assert_eq!(
            chart.scroll_velocities,
            vec![
                ScrollVelocity {
                    time_ms: 4000.0,
                    multiplier: 0.5,
                },
                ScrollVelocity {
                    time_ms: 8000.0,
                    multiplier: 0.0,
                },
            ]
        );
        assert_eq!(
            chart.notes,
            vec![Note::tap(400.0, 0), Note::hold(800.0, 1600.0, 7)]
        );
        assert_eq!(
            warnings,
            vec![
                ParseWarning::KeySoundsIgnored { count: 1 },
                ParseWarning::HitSoundsIgnored { count: 1 },
            ]
        );
    }

    #[test]
    fn errors_carry_key_paths() {
        let bad_lane = KEYS7.replace("Lane: 8", "Lane: 0");
        assert_eq!(
            parse(bad_lane.as_bytes()),
            Err(ParseError::InvalidNumber {
                at: Location::key_path("HitObjects[1].Lane"),
                expected: "a lane number from 1 to 8".into(),
                found: "0".into(),
            })
        );

        let no_bpm = KEYS7.replace("  Bpm: 200.5\n", "");
        assert_eq!(
            parse(no_bpm.as_bytes()),
            Err(ParseError::MissingRequiredField {
                at: Location::key_path("TimingPoints[1].Bpm"),
                field: "Bpm".into(),
            })
        );

        for infinite in ["inf", "'NaN'", ".inf", "-.inf"] {
            let source = KEYS7.replace("Bpm: 200.5", &format!("Bpm: {infinite}"));
            assert_eq!(
                parse(source.as_bytes()),
                Err(ParseError::InvalidNumber {
                    at: Location::key_path("TimingPoints[1].Bpm"),
                    expected: "beats per minute".into(),
                    found: text_of(&serde_yaml::from_str(infinite).unwrap()),
                }),
                "{infinite}"
            );
        }

        let keys10 = KEYS7.replace("Mode: Keys7", "Mode: Keys10");
        assert_eq!(
            parse(keys10.as_bytes()),
            Err(ParseError::UnsupportedMode {
                at: Location::key_path("Mode"),
                expected: "Keys4 or Keys7".into(),
                found: "Keys10".into(),
            })
        );
    }

    #[test]
    fn broken_yaml_has_a_position() {
        let err = parse(b"Mode: Keys4\nTimingPoints:\n- Bpm: [120\n").unwrap_err();
        let ParseError::MalformedStructure { at, .. } = err else {
            panic!("unexpected error {err:?}");
        };
        assert!(matches!(at, Location::Text { .. }), "{at:?}");
    }

    #[test]
    fn mode_is_required() {
        assert_eq!(
            parse(b"Title: Song\nHitObjects: []\n"),
            Err(ParseError::MissingRequiredField {
                at: Location::key_path("Mode"),
                field: "Mode".into(),
            })
        );
    }
}
