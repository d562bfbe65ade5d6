//! Writing charts as osu!mania `.osu` files.

use std::fmt::{self, Write as _};

use itertools::Itertools;
use tracing::debug;

use super::{MAX_KEY_COUNT, Section, x_of};
use crate::{
    chart::{Format, TimingPoint},
    util::format_trimmed,
    validate::ValidChart,
    write::{
        DEFAULT_ARTIST, DEFAULT_AUDIO_FILE, DEFAULT_CREATOR, DEFAULT_DIFFICULTY, DEFAULT_TITLE,
        LossyLog, LossyNotice, WriteError, WriteOutput,
    },
};

const FORMAT_VERSION: u32 = 14;
/// Vertical position of mania hit objects. The game ignores it.
const NOTE_Y: u32 = 192;
const MIN_SCROLL_MULTIPLIER: f64 = 0.01;
const MAX_SCROLL_MULTIPLIER: f64 = 10.0;

/// `value` on a single line, or `None` when it already is.
fn single_line(value: &str) -> Option<String> {
    value
        .contains(['\r', '\n'])
        .then(|| value.replace("\r\n", " ").replace(['\r', '\n'], " "))
}

/// `Key: Value` lines of one section in output order.
#[derive(Debug, Default)]
struct Block {
    entries: Vec<(String, String)>,
    /// Keys filled from the chart, which passthrough values never replace.
    owned: Vec<&'static str>,
}

impl Block {
    fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(name, _)| name == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key.to_owned(), value)),
        }
    }

    fn own(&mut self, key: &'static str, value: impl Into<String>) {
        self.owned.push(key);
        self.set(key, value);
    }

    fn passthrough(&mut self, key: &str, value: &str) {
        if !self.owned.contains(&key) {
            self.set(key, value);
        }
    }

    /// Puts every value on one line, naming the fields that changed in `replaced`.
    fn flatten(&mut self, section: Section, replaced: &mut Vec<String>) {
        for (key, value) in &mut self.entries {
            if let Some(line) = single_line(value) {
                *value = line;
                replaced.push(format!("[{}].{key}", section.name()));
            }
        }
    }

    fn separator(section: Section) -> &'static str {
        match section {
            Section::General | Section::Editor => ": ",
            Section::Colours => " : ",
            _ => ":",
        }
    }

    fn render(&self, out: &mut String, section: Section) -> fmt::Result {
        let separator = Self::separator(section);
        write!(out, "\n{section}\n")?;
        for (key, value) in &self.entries {
            writeln!(out, "{key}{separator}{value}")?;
        }
        Ok(())
    }
}

/// Serializes a chart as an osu!mania `.osu` file.
///
/// # Errors
///
/// Returns [`WriteError::UnrepresentableKeyCount`] when the chart has more lanes than osu!mania
/// supports.
pub fn write(chart: &ValidChart) -> Result<WriteOutput, WriteError> {
    if chart.key_count > MAX_KEY_COUNT {
        return Err(WriteError::UnrepresentableKeyCount {
            key_count: chart.key_count,
            format: Format::Osu,
        });
    }
    let mut log = LossyLog::default();
    let metadata = &chart.metadata;

    let mut general = Block::default();
    general.own(
        "AudioFilename",
        log.or_default(
            metadata.audio_file.as_deref(),
            "[General].AudioFilename",
            DEFAULT_AUDIO_FILE,
        ),
    );
    general.set("AudioLeadIn", "0");
    general.own(
        "PreviewTime",
        metadata
            .preview_time_ms
            .map_or_else(|| "-1".to_owned(), |preview| format!("{}", preview.round())),
    );
    general.set("Countdown", "0");
    general.set("SampleSet", "Soft");
    general.set("StackLeniency", "0.7");
    general.own("Mode", "3");
    general.set("LetterboxInBreaks", "0");
    general.set("SpecialStyle", "0");
    general.set("WidescreenStoryboard", "0");

    let mut editor = Block::default();
    editor.set("DistanceSpacing", "1");
    editor.set("BeatDivisor", "4");
    editor.set("GridSize", "4");
    editor.set("TimelineZoom", "1");

    let mut meta = Block::default();
    let title = log.or_default(metadata.title.as_deref(), "[Metadata].Title", DEFAULT_TITLE);
    let artist = log.or_default(metadata.artist.as_deref(), "[Metadata].Artist", DEFAULT_ARTIST);
    // the plain fields take the romanised spelling
    meta.own("Title", metadata.alt_title.as_deref().unwrap_or(title));
    meta.own("TitleUnicode", title);
    meta.own("Artist", metadata.alt_artist.as_deref().unwrap_or(artist));
    meta.own("ArtistUnicode", artist);
    meta.own(
        "Creator",
        log.or_default(
            metadata.creator.as_deref(),
            "[Metadata].Creator",
            DEFAULT_CREATOR,
        ),
    );
    meta.own(
        "Version",
        log.or_default(
            chart.difficulty_label.as_deref(),
            "[Metadata].Version",
            DEFAULT_DIFFICULTY,
        ),
    );
    meta.own("Source", metadata.source.clone().unwrap_or_default());
    meta.own("Tags", metadata.tags.join(" "));
    meta.set("BeatmapID", "0");
    meta.set("BeatmapSetID", "-1");

    let mut difficulty = Block::default();
    difficulty.set("HPDrainRate", "8.5");
    difficulty.own("CircleSize", chart.key_count.to_string());
    difficulty.set("OverallDifficulty", "8");
    difficulty.set("ApproachRate", "5");
    difficulty.set("SliderMultiplier", "1.4");
    difficulty.set("SliderTickRate", "1");

    let mut colours = Block::default();
    for (path, value) in metadata.passthrough_of(Format::Osu) {
        let Some((section, key)) = path.split_once('.') else {
            continue;
        };
        let block = match Section::from_name(section) {
            Some(Section::General) => &mut general,
            Some(Section::Editor) => &mut editor,
            Some(Section::Metadata) => &mut meta,
            Some(Section::Difficulty) => &mut difficulty,
            Some(Section::Colours) => &mut colours,
            _ => continue,
        };
        block.passthrough(key, value);
    }

    let timing = timing_lines(chart, &mut log);

    let mut replaced = vec![];
    let blocks = [
        (Section::General, general),
        (Section::Editor, editor),
        (Section::Metadata, meta),
        (Section::Difficulty, difficulty),
        (Section::Colours, colours),
    ]
    .map(|(section, mut block)| {
        block.flatten(section, &mut replaced);
        (section, block)
    });
    // the file name sits between quotes in a comma separated record
    let background = metadata.background_file.as_deref().map(|file| {
        let cleaned = single_line(file)
            .unwrap_or_else(|| file.to_owned())
            .replace('"', "'");
        if cleaned != file {
            replaced.push("[Events].Background".to_owned());
        }
        cleaned
    });
    if !replaced.is_empty() {
        log.push(LossyNotice::CharactersReplaced { fields: replaced });
    }

    let mut out = String::new();
    render(&mut out, chart, &blocks, background.as_deref(), &timing)
        .map_err(WriteError::formatting(Format::Osu))?;

    log.dropped("stops", chart.stops.len());
    log.dropped("genre", usize::from(metadata.genre.is_some()));
    log.foreign_passthrough(metadata, Format::Osu);

    debug!(
        key_count = chart.key_count,
        notes = chart.notes.len(),
        bytes = out.len(),
        "wrote osu chart"
    );
    Ok(log.finish(out.into_bytes()))
}

/// Renders the sections in file order. The colours block is left out when empty.
fn render(
    out: &mut String,
    chart: &ValidChart,
    blocks: &[(Section, Block)],
    background: Option<&str>,
    timing: &[String],
) -> fmt::Result {
    writeln!(out, "osu file format v{FORMAT_VERSION}")?;
    let mut colours = None;
    for (section, block) in blocks {
        match section {
            Section::Colours => colours = Some(block),
            _ => block.render(out, *section)?,
        }
    }

    write!(out, "\n{}\n//Background and Video events\n", Section::Events)?;
    if let Some(background) = background {
        writeln!(out, "0,0,\"{background}\",0,0")?;
    }

    write!(out, "\n{}\n", Section::TimingPoints)?;
    for line in timing {
        writeln!(out, "{line}")?;
    }

    if let Some(colours) = colours.filter(|block| !block.entries.is_empty()) {
        colours.render(out, Section::Colours)?;
    }

    write!(out, "\n{}\n", Section::HitObjects)?;
    for note in chart.notes.iter() {
        let x = x_of(note.lane, chart.key_count);
        let start = note.time_ms.round() as i64;
        if note.is_hold() {
            let end = (note.end_time_ms.round() as i64).max(start + 1);
            writeln!(out, "{x},{NOTE_Y},{start},128,0,{end}:0:0:0:0:")?;
        } else {
            writeln!(out, "{x},{NOTE_Y},{start},1,0,0:0:0:0:")?;
        }
    }
    Ok(())
}

/// The meter in effect at `time_ms`.
fn meter_at(timing_points: &[TimingPoint], time_ms: f64) -> u32 {
    let index = timing_points.partition_point(|point| point.time_ms <= time_ms);
    timing_points
        .get(index.saturating_sub(1))
        .map_or(TimingPoint::DEFAULT_METER, |point| point.meter)
}

/// Renders tempo changes and scroll velocities as one time-ordered list of timing lines.
/// At equal times the tempo change comes first.
fn timing_lines(chart: &ValidChart, log: &mut LossyLog) -> Vec<String> {
    let uninherited = chart.timing_points.iter().map(|point| {
        let line = format!(
            "{},{},{},1,0,100,1,0",
            format_trimmed(point.time_ms, 3),
            point.beat_length_ms(),
            point.meter,
        );
        (point.time_ms, line)
    });
    let mut clamped = 0;
    let inherited = chart
        .scroll_velocities
        .iter()
        .map(|velocity| {
            let multiplier = velocity
                .multiplier
                .clamp(MIN_SCROLL_MULTIPLIER, MAX_SCROLL_MULTIPLIER);
            if multiplier != velocity.multiplier {
                clamped += 1;
            }
            let line = format!(
                "{},{},{},1,0,100,0,0",
                format_trimmed(velocity.time_ms, 3),
                -100.0 / multiplier,
                meter_at(&chart.timing_points, velocity.time_ms),
            );
            (velocity.time_ms, line)
        })
        .collect_vec();
    log.clamped("scroll velocities", clamped);
    uninherited
        .merge_by(inherited, |(a, _), (b, _)| a <= b)
        .map(|(_, line)| line)
        .collect()
}
