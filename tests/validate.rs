//! Tests for `chartconv::validate`.

use chartconv::{prelude::*, sm};
use pretty_assertions::assert_eq;
use rstest::rstest;

fn assert_invariants(chart: &ValidChart) {
    assert!(
        chart
            .timing_points
            .windows(2)
            .all(|pair| pair[0].time_ms < pair[1].time_ms)
    );
    assert!(
        chart
            .notes
            .windows(2)
            .all(|pair| pair[0].time_ms <= pair[1].time_ms)
    );
    assert!(chart.notes.iter().all(|note| note.lane < chart.key_count));
    assert!(
        chart
            .notes
            .iter()
            .all(|note| note.is_hold() == (note.end_time_ms > note.time_ms))
    );
}

#[rstest]
#[case(include_str!("files/song.sm"), Format::Sm)]
#[case(include_str!("files/mania7k.osu"), Format::Osu)]
#[case(include_str!("files/chart.qua"), Format::Qua)]
fn parsed_fixtures_hold_the_invariants(#[case] source: &str, #[case] format: Format) {
    let charts = chartconv::convert::parse_charts(source.as_bytes(), format).unwrap();
    assert!(!charts.is_empty());
    for ParseOutput { chart, .. } in charts {
        let ValidationOutput { chart, warnings } = validate(chart).unwrap();
        assert_eq!(warnings, vec![]);
        assert_invariants(&chart);
    }
}

#[test]
fn unsorted_input_is_sorted_and_reported() {
    let mut chart = Chart::new(4);
    chart.timing_points = vec![TimingPoint::new(2000.0, 150.0), TimingPoint::new(0.0, 120.0)];
    chart.notes = vec![
        Note::tap(1500.0, 3),
        Note::hold(500.0, 1000.0, 1),
        Note::tap(500.0, 0),
        Note::tap(1500.0, 3),
        Note {
            kind: NoteKind::Hold,
            ..Note::tap(2500.0, 2)
        },
    ];
    let ValidationOutput { chart, warnings } = validate(chart).unwrap();
    assert_invariants(&chart);
    assert_eq!(
        warnings,
        vec![
            ValidationWarning::UnsortedTimingPoints,
            ValidationWarning::UnsortedNotes,
            ValidationWarning::NoteKindNormalized {
                time_ms: 2500.0,
                lane: 2,
                from: NoteKind::Hold,
            },
            ValidationWarning::DuplicateNote {
                time_ms: 1500.0,
                lane: 3,
            },
        ]
    );
    assert_eq!(
        chart.notes.as_slice(),
        [
            Note::tap(500.0, 0),
            Note::hold(500.0, 1000.0, 1),
            Note::tap(1500.0, 3),
            Note::tap(2500.0, 2),
        ]
    );
}

#[test]
fn sm_charts_with_lanes_past_the_steps_type_parse_but_fail_later() {
    let source = "#BPMS:0=120;\n#NOTES:dance-single::Easy:1::\n1000\n;\n";
    let mut chart = sm::parse(source.as_bytes()).unwrap().chart;
    chart.notes.push(Note::tap(0.0, 6));
    assert_eq!(
        validate(chart).unwrap_err(),
        ValidationError::NoteOutOfLaneRange {
            index: 1,
            time_ms: 0.0,
            lane: 6,
            key_count: 4,
        }
    );
}
