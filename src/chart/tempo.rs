//! Conversion between beats and milliseconds.
//!
//! Beat based formats place notes on beats and give tempo changes and pauses in beats as well,
//! while the chart model keeps everything in milliseconds. [`TempoMap`] goes both ways.

use super::{Stop, TimingPoint};

/// A beat where the tempo changes, the scroll pauses, or both.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    /// Position in beats.
    pub beat: f64,
    /// Time when the beat is reached.
    pub time_before_ms: f64,
    /// Time when the scroll resumes after the pauses on this beat.
    pub time_after_ms: f64,
    /// Tempo from this beat on.
    pub bpm_after: f64,
    /// Tempo change on this beat, if any.
    pub bpm_change: Option<f64>,
    /// Total pause on this beat.
    pub stop_ms: f64,
}

/// Piecewise linear mapping between beats and milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct TempoMap {
    origin_ms: f64,
    initial_bpm: f64,
    anchors: Vec<Anchor>,
}

fn beat_length(bpm: f64) -> f64 {
    60_000.0 / bpm
}

impl TempoMap {
    /// Builds the map from beat positioned events. Beat 0 is reached at `origin_ms`.
    ///
    /// `bpms` and `stops` are `(beat, value)` pairs in any order; stop values are durations in
    /// milliseconds. Returns `None` when `bpms` is empty.
    #[must_use]
    pub fn from_beats(origin_ms: f64, bpms: &[(f64, f64)], stops: &[(f64, f64)]) -> Option<Self> {
        let initial_bpm = bpms
            .iter()
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|&(_, bpm)| bpm)?;
        let mut events: Vec<(f64, Option<f64>, f64)> = bpms
            .iter()
            .map(|&(beat, bpm)| (beat, Some(bpm), 0.0))
            .chain(stops.iter().map(|&(beat, ms)| (beat, None, ms)))
            .collect();
        events.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut map = Self {
            origin_ms,
            initial_bpm,
            anchors: Vec::with_capacity(events.len()),
        };
        for (beat, bpm_change, stop_ms) in events {
            if let Some(last) = map.anchors.last_mut()
                && last.beat.total_cmp(&beat).is_eq()
            {
                if let Some(bpm) = bpm_change {
                    last.bpm_change = Some(bpm);
                    last.bpm_after = bpm;
                }
                last.stop_ms += stop_ms;
                last.time_after_ms += stop_ms;
                continue;
            }
            let time_before_ms = map.time_at(beat);
            let bpm_after = bpm_change.unwrap_or_else(|| map.bpm_before(beat));
            map.anchors.push(Anchor {
                beat,
                time_before_ms,
                time_after_ms: time_before_ms + stop_ms,
                bpm_after,
                bpm_change,
                stop_ms,
            });
        }
        Some(map)
    }

    /// Builds the map from millisecond positioned events. Beat 0 is placed at `origin_ms`.
    ///
    /// Returns `None` when `timing_points` is empty.
    #[must_use]
    pub fn from_times(origin_ms: f64, timing_points: &[TimingPoint], stops: &[Stop]) -> Option<Self> {
        let initial_bpm = timing_points.first()?.bpm;
        let mut events: Vec<(f64, Option<f64>, f64)> = timing_points
            .iter()
            .map(|point| (point.time_ms, Some(point.bpm), 0.0))
            .chain(stops.iter().map(|stop| (stop.time_ms, None, stop.duration_ms)))
            .collect();
        events.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut map = Self {
            origin_ms,
            initial_bpm,
            anchors: Vec::with_capacity(events.len()),
        };
        for (time_ms, bpm_change, stop_ms) in events {
            if let Some(last) = map.anchors.last_mut()
                && last.time_before_ms.total_cmp(&time_ms).is_eq()
            {
                if let Some(bpm) = bpm_change {
                    last.bpm_change = Some(bpm);
                    last.bpm_after = bpm;
                }
                last.stop_ms += stop_ms;
                last.time_after_ms += stop_ms;
                continue;
            }
            let beat = match map.anchors.last() {
                Some(last) => last.beat.max(map.beat_at(time_ms)),
                None => map.beat_at(time_ms),
            };
            let bpm_after = bpm_change.unwrap_or_else(|| map.bpm_before(beat));
            map.anchors.push(Anchor {
                beat,
                time_before_ms: time_ms,
                time_after_ms: time_ms + stop_ms,
                bpm_after,
                bpm_change,
                stop_ms,
            });
        }
        Some(map)
    }

    /// Time when beat 0 is reached.
    #[must_use]
    pub const fn origin_ms(&self) -> f64 {
        self.origin_ms
    }

    /// Tempo changes and pauses in beat order.
    #[must_use]
    pub fn anchors(&self) -> &[Anchor] {
        &self.anchors
    }

    /// Tempo changes as `(beat, bpm)`.
    pub fn bpm_changes(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.anchors
            .iter()
            .filter_map(|anchor| anchor.bpm_change.map(|bpm| (anchor.beat, bpm)))
    }

    /// Pauses as `(beat, duration_ms)`.
    pub fn stops(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.anchors
            .iter()
            .filter(|anchor| anchor.stop_ms > 0.0)
            .map(|anchor| (anchor.beat, anchor.stop_ms))
    }

    fn bpm_before(&self, beat: f64) -> f64 {
        let idx = self.anchors.partition_point(|anchor| anchor.beat < beat);
        idx.checked_sub(1)
            .and_then(|i| self.anchors.get(i))
            .map_or(self.initial_bpm, |anchor| anchor.bpm_after)
    }

    /// Time when `beat` is reached. A note on a paused beat is hit before the pause.
    #[must_use]
    pub fn time_at(&self, beat: f64) -> f64 {
        let idx = self.anchors.partition_point(|anchor| anchor.beat < beat);
        if let Some(anchor) = self.anchors.get(idx)
            && anchor.beat.total_cmp(&beat).is_eq()
        {
            return anchor.time_before_ms;
        }
        match idx.checked_sub(1).and_then(|i| self.anchors.get(i)) {
            Some(prev) => prev.time_after_ms + (beat - prev.beat) * beat_length(prev.bpm_after),
            None => self.origin_ms + beat * beat_length(self.initial_bpm),
        }
    }

    /// Beat shown at `time_ms`. Times inside a pause map to the paused beat.
    #[must_use]
    pub fn beat_at(&self, time_ms: f64) -> f64 {
        let idx = self
            .anchors
            .partition_point(|anchor| anchor.time_before_ms <= time_ms);
        match idx.checked_sub(1).and_then(|i| self.anchors.get(i)) {
            Some(prev) if time_ms <= prev.time_after_ms => prev.beat,
            Some(prev) => prev.beat + (time_ms - prev.time_after_ms) / beat_length(prev.bpm_after),
            None => (time_ms - self.origin_ms) / beat_length(self.initial_bpm),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn constant_tempo() {
        let map = TempoMap::from_beats(-50.0, &[(0.0, 120.0)], &[]).unwrap();
        assert_close(map.time_at(0.0), -50.0);
        assert_close(map.time_at(4.0), 1950.0);
        assert_close(map.beat_at(1950.0), 4.0);
        assert_close(map.time_at(-1.0), -550.0);
    }

    #[test]
    fn tempo_change_and_stop() {
        let map =
            TempoMap::from_beats(0.0, &[(0.0, 120.0), (4.0, 240.0)], &[(2.0, 300.0)]).unwrap();
        // beats 0..2 at 500 ms per beat, 300 ms pause, beats 2..4, then 250 ms per beat
        assert_close(map.time_at(2.0), 1000.0);
        assert_close(map.time_at(3.0), 1800.0);
        assert_close(map.time_at(4.0), 2300.0);
        assert_close(map.time_at(6.0), 2800.0);
        assert_close(map.beat_at(1150.0), 2.0);
        assert_close(map.beat_at(2800.0), 6.0);
        assert_eq!(map.stops().collect::<Vec<_>>(), vec![(2.0, 300.0)]);
    }

    #[test]
    fn stop_and_tempo_change_on_same_beat() {
        let map =
            TempoMap::from_beats(0.0, &[(0.0, 60.0), (1.0, 120.0)], &[(1.0, 100.0)]).unwrap();
        assert_eq!(map.anchors().len(), 2);
        assert_close(map.time_at(1.0), 1000.0);
        assert_close(map.time_at(2.0), 1600.0);
    }

    #[test]
    fn from_times_inverts_from_beats() {
        let beats =
            TempoMap::from_beats(100.0, &[(0.0, 150.0), (8.0, 200.0)], &[(4.0, 250.0)]).unwrap();
        let timing_points: Vec<_> = beats
            .bpm_changes()
            .map(|(beat, bpm)| TimingPoint::new(beats.time_at(beat), bpm))
            .collect();
        let stops: Vec<_> = beats
            .stops()
            .map(|(beat, duration_ms)| Stop {
                time_ms: beats.time_at(beat),
                duration_ms,
            })
            .collect();
        let times = TempoMap::from_times(100.0, &timing_points, &stops).unwrap();
        assert_eq!(
            times.bpm_changes().map(|(beat, _)| beat).collect::<Vec<_>>(),
            vec![0.0, 8.0]
        );
        for beat in [0.0, 1.5, 4.0, 5.25, 8.0, 13.0] {
            assert_close(times.beat_at(beats.time_at(beat)), beat);
        }
    }

    #[test]
    fn empty_tempo_is_rejected() {
        assert!(TempoMap::from_beats(0.0, &[], &[(1.0, 10.0)]).is_none());
        assert!(TempoMap::from_times(0.0, &[], &[]).is_none());
    }
}
