//! Tests for `chartconv::qua`.

use chartconv::{prelude::*, qua};
use pretty_assertions::assert_eq;

const CHART: &str = include_str!("files/chart.qua");

#[test]
fn parses_a_4k_chart() {
    let ParseOutput { chart, warnings } = qua::parse(CHART.as_bytes()).unwrap();
    assert_eq!(chart.key_count, 4);
    assert_eq!(chart.difficulty_label.as_deref(), Some("Normal"));
    assert_eq!(chart.metadata.tags, vec!["fixture", "test"]);
    assert_eq!(chart.metadata.preview_time_ms, Some(20000.0));
    assert_eq!(chart.metadata.source.as_deref(), Some("Fixture Pack"));
    assert_eq!(
        chart
            .metadata
            .passthrough
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect::<Vec<_>>(),
        vec![
            ("qua.CustomAudioSamples", "[]"),
            ("qua.Description", "Made for tests"),
            ("qua.EditorLayers", "[]"),
            ("qua.MapId", "777"),
            ("qua.MapSetId", "88"),
            ("qua.SoundEffects", "[]"),
        ]
    );
    assert_eq!(chart.timing_points, vec![TimingPoint::new(1000.0, 150.0)]);
    assert_eq!(
        chart.scroll_velocities,
        vec![ScrollVelocity {
            time_ms: 2600.0,
            multiplier: 1.5,
        }]
    );
    assert_eq!(
        chart.notes,
        vec![
            Note::tap(1000.0, 0),
            Note::hold(1400.0, 2200.0, 1),
            Note::tap(1800.0, 2),
            Note::tap(2200.0, 3),
            Note::hold(2600.0, 3400.0, 0),
        ]
    );
    assert_eq!(warnings, vec![ParseWarning::HitSoundsIgnored { count: 1 }]);
}

#[test]
fn round_trip_is_exact() {
    let parsed = chartconv::parse_from_qua(CHART.as_bytes()).unwrap();
    let written = chartconv::write_to_qua(parsed.clone()).unwrap();
    let reparsed = chartconv::parse_from_qua(&written).unwrap();
    assert_eq!(reparsed, parsed);
}

#[test]
fn written_documents_are_plain_yaml() {
    let written = chartconv::write_to_qua(chartconv::parse_from_qua(CHART.as_bytes()).unwrap())
        .unwrap();
    let document: serde_yaml::Value = serde_yaml::from_slice(&written).unwrap();
    assert_eq!(document["Mode"].as_str(), Some("Keys4"));
    assert_eq!(document["MapId"].as_i64(), Some(777));
    assert_eq!(document["HitObjects"][1]["Lane"].as_i64(), Some(2));
    assert_eq!(document["HitObjects"][1]["EndTime"].as_i64(), Some(2200));
    assert_eq!(document["TimingPoints"][0]["Bpm"].as_f64(), Some(150.0));
}

#[test]
fn indentation_errors_are_structure_errors() {
    let broken = CHART.replace("  Bpm: 150", "    Bpm: 150\n Oops: [");
    assert!(matches!(
        chartconv::parse_from_qua(broken.as_bytes()),
        Err(ParseError::MalformedStructure {
            at: Location::Text { .. },
            ..
        })
    ));
}

#[test]
fn non_mapping_entries_are_located() {
    let broken = CHART.replace("- StartTime: 1800\n  Lane: 3\n  KeySounds: []\n", "- 1800\n");
    assert_eq!(
        chartconv::parse_from_qua(broken.as_bytes()),
        Err(ParseError::MalformedStructure {
            at: Location::key_path("HitObjects[2]"),
            detail: "expected a mapping".into(),
        })
    );
}
