use serde::Serialize;

use crate::{build_lines, LoadError, LoadOptions};

/// One vertex of a line in (time, pitch) space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    /// Seconds from the start of the piece.
    pub time: f64,
    /// MIDI pitch; fractional values are allowed.
    pub note: f64,
    /// Opens a connected segment (note onset).
    pub is_start: bool,
    /// Closes a connected segment (note offset).
    pub is_end: bool,
    pub velocity: u8,
}

impl Point {
    pub fn new(time: f64, note: f64, is_start: bool, is_end: bool) -> Self {
        Self {
            time,
            note,
            is_start,
            is_end,
            velocity: 0,
        }
    }
}

/// Straight-alpha RGBA colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Builds an opaque colour from hue (degrees), saturation and lightness (0..=1).
    pub fn from_hsl(hue: f64, saturation: f64, lightness: f64) -> Self {
        let s = saturation.clamp(0.0, 1.0);
        let l = lightness.clamp(0.0, 1.0);
        let chroma = (1.0 - (2.0 * l - 1.0).abs()) * s;
        let h = hue.rem_euclid(360.0) / 60.0;
        let x = chroma * (1.0 - (h % 2.0 - 1.0).abs());
        let (r, g, b) = match h as u32 {
            0 => (chroma, x, 0.0),
            1 => (x, chroma, 0.0),
            2 => (0.0, chroma, x),
            3 => (0.0, x, chroma),
            4 => (x, 0.0, chroma),
            _ => (chroma, 0.0, x),
        };
        let m = l - chroma / 2.0;
        let channel = |v: f64| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
        Self::rgb(channel(r), channel(g), channel(b))
    }

    /// Same colour with its alpha replaced; `alpha` is clamped to 0..=1.
    pub fn with_alpha(self, alpha: f64) -> Self {
        let a = (alpha.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self { a, ..self }
    }
}

/// A drawable polyline: one monophonic voice of a track.
///
/// Points are time-ordered inside every connected segment, and segments are
/// delimited by `is_start`/`is_end`. The line carries no drawing cursor; each
/// renderer keeps its own.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Line {
    pub points: Vec<Point>,
    pub base_color: Color,
}

impl Line {
    pub fn new(points: Vec<Point>, base_color: Color) -> Self {
        Self { points, base_color }
    }

    pub fn color_with_alpha(&self, alpha: f64) -> Color {
        self.base_color.with_alpha(alpha)
    }
}

/// Everything the renderer needs to draw a piece.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceModel {
    /// Seconds until the last note ends.
    pub duration: f64,
    pub min_note: f64,
    pub max_note: f64,
    pub lines: Vec<Line>,
}

impl PerformanceModel {
    /// Builds the line model from parsed tracks.
    pub fn from_tracks(tracks: &[TrackNotes], options: &LoadOptions) -> Result<Self, LoadError> {
        let notes = || tracks.iter().flat_map(|track| track.notes.iter());

        let mut min_note = f64::INFINITY;
        let mut max_note = f64::NEG_INFINITY;
        let mut duration: f64 = 0.0;
        for note in notes() {
            min_note = min_note.min(f64::from(note.pitch));
            max_note = max_note.max(f64::from(note.pitch));
            duration = duration.max(note.start_time + note.duration);
        }

        if !min_note.is_finite() {
            return Err(LoadError::NoNotes);
        }
        if max_note <= min_note {
            min_note -= 1.0;
            max_note += 1.0;
        }

        let voices = build_lines(tracks, options.join_gap);
        let count = voices.len().max(1) as f64;
        let lines = voices
            .into_iter()
            .enumerate()
            .map(|(index, points)| {
                let hue = 360.0 * index as f64 / count;
                Line::new(points, Color::from_hsl(hue, 1.0, 0.6))
            })
            .collect();

        Ok(Self {
            duration,
            min_note,
            max_note,
            lines,
        })
    }
}

/// A single note handed to the audio side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NoteEvent {
    pub pitch: u8,
    pub start_time: f64,
    pub duration: f64,
    pub velocity: u8,
}

/// Notes of one MIDI track, sorted by start time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackNotes {
    /// Index of the track chunk in the source file.
    pub track: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub notes: Vec<NoteEvent>,
}
