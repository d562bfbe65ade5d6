//! Writing charts as `.qua` files.

use serde_yaml::{Mapping, Value};
use tracing::debug;

use super::{MANAGED_KEYS, SIGNATURES, mode_of};
use crate::{
    chart::{Format, TimingPoint},
    validate::ValidChart,
    write::{
        DEFAULT_ARTIST, DEFAULT_AUDIO_FILE, DEFAULT_CREATOR, DEFAULT_DIFFICULTY, DEFAULT_TITLE,
        LossyLog, WriteError, WriteOutput,
    },
};

/// A millisecond value, written as an integer when it has no fraction.
fn time_value(time_ms: f64) -> Value {
    if time_ms.fract() == 0.0 && time_ms.abs() < i64::MAX as f64 {
        Value::from(time_ms as i64)
    } else {
        Value::from(time_ms)
    }
}

/// A passthrough value read back from its YAML text, or kept as plain text when it does not
/// parse.
fn passthrough_value(text: &str) -> Value {
    serde_yaml::from_str(text).unwrap_or_else(|_| Value::from(text))
}

/// Serializes a chart as a Quaver `.qua` file.
///
/// # Errors
///
/// Returns [`WriteError::UnrepresentableKeyCount`] when Quaver has no mode for the chart's lane
/// count, or [`WriteError::Serialization`] when the YAML emitter fails.
pub fn write(chart: &ValidChart) -> Result<WriteOutput, WriteError> {
    let (mode, has_scratch_key) =
        mode_of(chart.key_count).ok_or(WriteError::UnrepresentableKeyCount {
            key_count: chart.key_count,
            format: Format::Qua,
        })?;
    let mut log = LossyLog::default();
    let metadata = &chart.metadata;
    let mut document = Mapping::new();
    let mut put = |key: &str, value: Value| {
        document.insert(Value::from(key), value);
    };

    put(
        "AudioFile",
        Value::from(log.or_default(metadata.audio_file.as_deref(), "AudioFile", DEFAULT_AUDIO_FILE)),
    );
    if let Some(preview) = metadata.preview_time_ms {
        put("SongPreviewTime", time_value(preview.round()));
    }
    if let Some(background) = &metadata.background_file {
        put("BackgroundFile", Value::from(background.as_str()));
    }
    put("Mode", Value::from(mode));
    if has_scratch_key {
        put("HasScratchKey", Value::from(true));
    }
    put(
        "Title",
        Value::from(log.or_default(metadata.title.as_deref(), "Title", DEFAULT_TITLE)),
    );
    put(
        "Artist",
        Value::from(log.or_default(metadata.artist.as_deref(), "Artist", DEFAULT_ARTIST)),
    );
    if let Some(source) = &metadata.source {
        put("Source", Value::from(source.as_str()));
    }
    if !metadata.tags.is_empty() {
        put("Tags", Value::from(metadata.tags.join(" ")));
    }
    put(
        "Creator",
        Value::from(log.or_default(metadata.creator.as_deref(), "Creator", DEFAULT_CREATOR)),
    );
    put(
        "DifficultyName",
        Value::from(log.or_default(
            chart.difficulty_label.as_deref(),
            "DifficultyName",
            DEFAULT_DIFFICULTY,
        )),
    );
    if let Some(genre) = &metadata.genre {
        put("Genre", Value::from(genre.as_str()));
    }
    for (key, value) in metadata.passthrough_of(Format::Qua) {
        if !MANAGED_KEYS.contains(&key) {
            put(key, passthrough_value(value));
        }
    }
    put("BPMDoesNotAffectScrollVelocity", Value::from(true));
    put("InitialScrollVelocity", Value::from(1));

    let mut odd_meters = 0;
    let timing_points = chart
        .timing_points
        .iter()
        .map(|point| {
            let mut entry = Mapping::new();
            entry.insert("StartTime".into(), time_value(point.time_ms));
            entry.insert("Bpm".into(), Value::from(point.bpm));
            match SIGNATURES.iter().find(|&&(_, meter)| meter == point.meter) {
                Some(&(_, TimingPoint::DEFAULT_METER)) => {}
                Some(&(name, _)) => {
                    entry.insert("Signature".into(), Value::from(name));
                }
                None => odd_meters += 1,
            }
            Value::Mapping(entry)
        })
        .collect::<Vec<_>>();
    put("TimingPoints", Value::Sequence(timing_points));

    let velocities = chart
        .scroll_velocities
        .iter()
        .map(|velocity| {
            let mut entry = Mapping::new();
            entry.insert("StartTime".into(), time_value(velocity.time_ms));
            entry.insert("Multiplier".into(), Value::from(velocity.multiplier));
            Value::Mapping(entry)
        })
        .collect();
    put("SliderVelocities", Value::Sequence(velocities));

    let hit_objects = chart
        .notes
        .iter()
        .map(|note| {
            let start = note.time_ms.round() as i64;
            let mut entry = Mapping::new();
            entry.insert("StartTime".into(), Value::from(start));
            entry.insert("Lane".into(), Value::from(u32::from(note.lane) + 1));
            if note.is_hold() {
                let end = (note.end_time_ms.round() as i64).max(start + 1);
                entry.insert("EndTime".into(), Value::from(end));
            }
            entry.insert("KeySounds".into(), Value::Sequence(vec![]));
            Value::Mapping(entry)
        })
        .collect();
    put("HitObjects", Value::Sequence(hit_objects));

    let text = serde_yaml::to_string(&document).map_err(|err| WriteError::Serialization {
        format: Format::Qua,
        message: err.to_string(),
    })?;

    log.dropped("time signatures", odd_meters);
    log.dropped("stops", chart.stops.len());
    log.dropped("alternate titles", usize::from(metadata.alt_title.is_some()));
    log.dropped("alternate artists", usize::from(metadata.alt_artist.is_some()));
    log.foreign_passthrough(metadata, Format::Qua);

    debug!(
        mode,
        has_scratch_key,
        notes = chart.notes.len(),
        bytes = text.len(),
        "wrote qua chart"
    );
    Ok(log.finish(text.into_bytes()))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        chart::{Chart, Note, ScrollVelocity, Stop},
        validate::validate,
        write::LossyNotice,
    };

    fn valid(chart: Chart) -> ValidChart {
        validate(chart).unwrap().chart
    }

    fn chart() -> Chart {
        let mut chart = Chart::new(4);
        chart.metadata.title = Some("Song".into());
        chart.metadata.artist = Some("Artist".into());
        chart.metadata.creator = Some("Mapper".into());
        chart.metadata.audio_file = Some("song.mp3".into());
        chart.difficulty_label = Some("Hard".into());
        chart.timing_points = vec![TimingPoint::new(0.0, 120.0)];
        chart.notes = vec![Note::tap(0.0, 0), Note::hold(500.4, 1000.0, 3)];
        chart
    }

    #[test]
    fn writes_document_in_key_order() {
        let output = write(&valid(chart())).unwrap();
        assert_eq!(output.lossy, vec![]);
        assert_eq!(
            String::from_utf8(output.bytes).unwrap(),
            "AudioFile: song.mp3
Mode: Keys4
Title: Song
Artist: Artist
Creator: Mapper
DifficultyName: Hard
BPMDoesNotAffectScrollVelocity: true
InitialScrollVelocity: 1
TimingPoints:
- StartTime: 0
  Bpm: 120.0
SliderVelocities: []
HitObjects:
- StartTime: 0
  Lane: 1
  KeySounds: []
- StartTime: 500
  Lane: 4
  EndTime: 1000
  KeySounds: []
"
        );
    }

    #[test]
    fn scratch_lane_and_signatures() {
        let mut chart = chart();
        chart.key_count = 8;
        chart.notes.push(Note::tap(2000.0, 7));
        chart.timing_points.push(TimingPoint {
            time_ms: 1000.0,
            bpm: 90.0,
            meter: 3,
        });
        chart.timing_points.push(TimingPoint {
            time_ms: 3000.0,
            bpm: 90.0,
            meter: 7,
        });
        chart.scroll_velocities = vec![ScrollVelocity {
            time_ms: 1500.5,
            multiplier: 1.5,
        }];
        chart.stops = vec![Stop {
            time_ms: 100.0,
            duration_ms: 50.0,
        }];
        chart
            .metadata
            .passthrough
            .insert("qua.MapId".into(), "1234".into());
        chart.metadata.alt_title = Some("Songu".into());
        let output = write(&valid(chart)).unwrap();
        let text = String::from_utf8(output.bytes).unwrap();
        assert!(text.contains("Mode: Keys7\nHasScratchKey: true\n"), "{text}");
        assert!(text.contains("MapId: 1234\n"), "{text}");
        assert!(
            text.contains("- StartTime: 1000\n  Bpm: 90.0\n  Signature: Triple\n"),
            "{text}"
        );
        assert!(
            text.contains("- StartTime: 1500.5\n  Multiplier: 1.5\n"),
            "{text}"
        );
        assert!(text.contains("  Lane: 8\n"), "{text}");
        assert_eq!(
            output.lossy,
            vec![
                LossyNotice::Dropped {
                    field: "time signatures".into(),
                    count: 1,
                },
                LossyNotice::Dropped {
                    field: "stops".into(),
                    count: 1,
                },
                LossyNotice::Dropped {
                    field: "alternate titles".into(),
                    count: 1,
                },
            ]
        );
    }

    #[test]
    fn passthrough_values_keep_their_yaml_type() {
        let source = "Mode: Keys4
Description: 'Created at: 2020'
Flag: 'true'
Dash: '- x'
Hash: '# x'
MapId: 1234
EditorLayers:
- Name: Main
  Hidden: false
TimingPoints:
- Bpm: 120
HitObjects:
- Lane: 1
";
        let parsed = crate::qua::parse(source.as_bytes()).unwrap().chart;
        let output = write(&valid(parsed)).unwrap();
        let document: Value = serde_yaml::from_slice(&output.bytes).unwrap();
        for (key, text) in [
            ("Description", "Created at: 2020"),
            ("Flag", "true"),
            ("Dash", "- x"),
            ("Hash", "# x"),
        ] {
            assert_eq!(document.get(key), Some(&Value::from(text)), "{key}");
        }
        assert_eq!(document.get("MapId"), Some(&Value::from(1234)));
        let layers = document.get("EditorLayers").and_then(Value::as_sequence);
        assert_eq!(
            layers.and_then(|layers| layers.first()?.get("Name")),
            Some(&Value::from("Main"))
        );
    }

    #[test]
    fn unsupported_lane_counts() {
        let mut chart = chart();
        chart.key_count = 6;
        assert_eq!(
            write(&valid(chart)),
            Err(WriteError::UnrepresentableKeyCount {
                key_count: 6,
                format: Format::Qua,
            })
        );
    }
}
