//! This module is responsible for turning timed-text files into cues.
//! It accepts both SubRip and WebVTT style blocks, detected per block, and
//! exposes helpers to write a cue list back out in either format.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, trace};

/// `[HH:]MM:SS[.,]mmm --> [HH:]MM:SS[.,]mmm`, cue settings after the end
/// timestamp are ignored.
static TIME_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:(\d+):)?(\d{1,2}):(\d{1,2})[.,](\d{3})\s*-->\s*(?:(\d+):)?(\d{1,2}):(\d{1,2})[.,](\d{3})",
    )
    .unwrap()
});

static BLANK_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").unwrap());

static MARKUP_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());

/// A single caption unit: a time range in seconds and the text to show.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cue {
    /// Position among the cues produced by one parse, starting at 0.
    pub id: usize,
    pub start: f64,
    pub end: f64,
    /// Caption text without markup. Stacked lines are separated by `'\n'`.
    pub text: String,
}

impl Cue {
    pub fn new(id: usize, start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            id,
            start,
            end,
            text: text.into(),
        }
    }

    /// The lines to render, top to bottom.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.split('\n')
    }

    /// Whether `time` falls inside this cue, both bounds included.
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time <= self.end
    }

    /// Copy of this cue moved by `delta` seconds. Bounds never go below zero.
    pub fn shifted(&self, delta: f64) -> Self {
        Self {
            id: self.id,
            start: (self.start + delta).max(0.0),
            end: (self.end + delta).max(0.0),
            text: self.text.clone(),
        }
    }
}

/// Result of a parse together with how many blocks could not be used.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseReport {
    pub cues: Vec<Cue>,
    /// Non-blank blocks that had no usable time range.
    pub skipped: usize,
}

/// Parse timed-text content into cues, in source order.
/// Unrecognised blocks are dropped, so this never fails.
pub fn parse(input: &str) -> Vec<Cue> {
    parse_report(input).cues
}

/// Same as [`parse`] but also reports the number of skipped blocks.
pub fn parse_report(input: &str) -> ParseReport {
    trace!("parse_report(len={})", input.len());
    let normalized = input.replace("\r\n", "\n").replace('\r', "\n");
    let mut report = ParseReport::default();
    for block in BLANK_LINE.split(&normalized) {
        let block = block.trim();
        if block.is_empty() {
            continue;
        }
        match parse_block(block, report.cues.len()) {
            Some(cue) => report.cues.push(cue),
            None => {
                debug!(
                    "skipping unrecognised block starting with {:?}",
                    block.lines().next().unwrap_or_default()
                );
                report.skipped += 1;
            }
        }
    }
    debug!(
        "parsed {} cues, skipped {} blocks",
        report.cues.len(),
        report.skipped
    );
    report
}

/// Parse one blank-line separated block. The way this works is by locating
/// the time line (second line after a numeric index, otherwise the first
/// line) and treating everything after it as text.
fn parse_block(block: &str, id: usize) -> Option<Cue> {
    let lines: Vec<&str> = block.lines().collect();
    let first = lines.first()?;
    let time_idx = if is_index_line(first) {
        1
    } else if first.contains("-->") {
        0
    } else {
        return None;
    };
    let (start, end) = parse_time_range(lines.get(time_idx)?)?;
    let text = lines[time_idx + 1..]
        .iter()
        .map(|line| MARKUP_TAG.replace_all(line, "").into_owned())
        .collect::<Vec<_>>()
        .join("\n");
    Some(Cue::new(id, start, end, text))
}

fn is_index_line(line: &str) -> bool {
    let line = line.trim();
    !line.is_empty() && line.bytes().all(|b| b.is_ascii_digit())
}

/// Parse a time range line into start and end seconds.
fn parse_time_range(line: &str) -> Option<(f64, f64)> {
    let caps = TIME_RANGE.captures(line)?;
    let field = |i: usize| -> Option<u64> {
        match caps.get(i) {
            Some(m) => m.as_str().parse().ok(),
            None => Some(0),
        }
    };
    let start = to_seconds(field(1)?, field(2)?, field(3)?, field(4)?)?;
    let end = to_seconds(field(5)?, field(6)?, field(7)?, field(8)?)?;
    Some((start, end))
}

/// `None` when the hours field is too large to count in milliseconds.
fn to_seconds(h: u64, m: u64, s: u64, ms: u64) -> Option<f64> {
    // Summing whole milliseconds keeps e.g. 3723.456 exact to the literal.
    let total_ms = h
        .checked_mul(60)?
        .checked_add(m)?
        .checked_mul(60)?
        .checked_add(s)?
        .checked_mul(1000)?
        .checked_add(ms)?;
    Some(total_ms as f64 / 1000.0)
}

/// Format seconds as `HH:MM:SS<separator>mmm`, rounded to the millisecond.
pub fn format_timestamp(seconds: f64, separator: char) -> String {
    let ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let h = ms / 3_600_000;
    let m = (ms % 3_600_000) / 60_000;
    let s = (ms % 60_000) / 1000;
    let ms = ms % 1000;
    format!("{h:02}:{m:02}:{s:02}{separator}{ms:03}")
}

/// Format cues as SubRip text with 1-based index lines.
pub fn format_srt(cues: &[Cue]) -> String {
    let mut out = String::new();
    for (i, cue) in cues.iter().enumerate() {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            format_timestamp(cue.start, ','),
            format_timestamp(cue.end, ','),
            cue.text
        ));
    }
    out
}

/// Format cues as a WebVTT document.
pub fn format_vtt(cues: &[Cue]) -> String {
    let mut out = String::from("WEBVTT\n\n");
    for cue in cues {
        out.push_str(&format!(
            "{} --> {}\n{}\n\n",
            format_timestamp(cue.start, '.'),
            format_timestamp(cue.end, '.'),
            cue.text
        ));
    }
    out
}
