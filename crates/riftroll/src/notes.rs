use std::io::Write;

use anyhow::{Context, Result};
use performance::TrackNotes;
use serde::Serialize;

/// Receives the note events of a piece when playback starts.
///
/// Audio synthesis lives outside this program; a sink is where a synthesizer
/// would be attached. Its clock runs independently of the visual one.
pub trait NoteSink {
    fn schedule(&mut self, tracks: &[TrackNotes]) -> Result<()>;
}

/// Logs what would be handed to an audio backend.
#[derive(Debug, Default)]
pub struct LoggingNoteSink;

impl NoteSink for LoggingNoteSink {
    fn schedule(&mut self, tracks: &[TrackNotes]) -> Result<()> {
        let total: usize = tracks.iter().map(|track| track.notes.len()).sum();
        tracing::info!(tracks = tracks.len(), notes = total, "note events handed to audio sink");
        for track in tracks {
            tracing::debug!(
                track = track.track,
                name = track.name.as_deref().unwrap_or(""),
                notes = track.notes.len(),
                "scheduled track"
            );
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct NotesDocument<'a> {
    duration: f64,
    tracks: &'a [TrackNotes],
}

/// Writes note events as a JSON document to `out`.
pub fn write_json<W: Write>(mut out: W, duration: f64, tracks: &[TrackNotes], pretty: bool) -> Result<()> {
    let document = NotesDocument { duration, tracks };
    let written = if pretty {
        serde_json::to_writer_pretty(&mut out, &document)
    } else {
        serde_json::to_writer(&mut out, &document)
    };
    written.context("failed to serialise note events")?;
    writeln!(out).context("failed to write note events")?;
    Ok(())
}
