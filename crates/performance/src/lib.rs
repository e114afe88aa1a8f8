//! Performance model shared by the renderer and the `riftroll` binary.
//!
//! A MIDI file is turned into two views of the same music:
//!
//! ```text
//!   MIDI bytes ──▶ midi::parse_tracks ──▶ Vec<TrackNotes> ──▶ audio collaborator
//!                                              │
//!                                              └─▶ lines::build_lines ──▶ PerformanceModel
//! ```
//!
//! `TrackNotes` is the flat note-event list handed to whatever synthesizes the
//! audio. `PerformanceModel` is what the renderer draws: every track is split
//! into monophonic voices and each voice becomes a `Line`, a polyline of
//! onset/offset points in (time, pitch) space.

#[doc(hidden)]
pub mod fixtures;
mod lines;
mod midi;
mod model;

pub use lines::build_lines;
pub use midi::parse_tracks;
pub use model::{Color, Line, NoteEvent, PerformanceModel, Point, TrackNotes};

/// Seconds of silence that may separate two notes of a voice while still
/// drawing them as one connected trace.
pub const DEFAULT_JOIN_GAP: f64 = 0.2;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to parse MIDI data: {0}")]
    Midi(#[from] midly::Error),
    #[error("MIDI data contains no notes")]
    NoNotes,
    #[error("invalid load option: {0}")]
    InvalidOption(String),
}

/// Knobs that influence how notes become lines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadOptions {
    /// Maximum rest (seconds) bridged by a connecting segment.
    pub join_gap: f64,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            join_gap: DEFAULT_JOIN_GAP,
        }
    }
}

/// Result of loading one MIDI file: the drawable model plus the raw note
/// events for the audio side.
#[derive(Debug, Clone)]
pub struct LoadedPerformance {
    pub model: PerformanceModel,
    pub tracks: Vec<TrackNotes>,
}

impl LoadedPerformance {
    /// Per-track note events, in track order, for the audio collaborator.
    pub fn note_events(&self) -> &[TrackNotes] {
        &self.tracks
    }
}

/// Parses MIDI bytes and builds both the note events and the line model.
pub fn load_midi(bytes: &[u8], options: &LoadOptions) -> Result<LoadedPerformance, LoadError> {
    if !options.join_gap.is_finite() || options.join_gap < 0.0 {
        return Err(LoadError::InvalidOption(format!(
            "join gap must be a non-negative number of seconds, got {}",
            options.join_gap
        )));
    }

    let tracks = parse_tracks(bytes)?;
    let model = PerformanceModel::from_tracks(&tracks, options)?;
    tracing::debug!(
        tracks = tracks.len(),
        lines = model.lines.len(),
        duration = model.duration,
        "loaded performance"
    );
    Ok(LoadedPerformance { model, tracks })
}
