use std::collections::HashMap;

use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};

use crate::model::{NoteEvent, TrackNotes};
use crate::LoadError;

/// Tempo before the first `SetTempo` event: 120 BPM.
const DEFAULT_MICROS_PER_QUARTER: f64 = 500_000.0;

/// Parses a Standard MIDI File into per-track note lists.
///
/// Tempo events from every track form one global tempo map. Note-on with
/// velocity zero counts as note-off, re-triggering a sounding key closes the
/// previous note, and notes still open at the end of a track are closed there.
/// Tracks without notes are skipped.
pub fn parse_tracks(bytes: &[u8]) -> Result<Vec<TrackNotes>, LoadError> {
    let smf = Smf::parse(bytes)?;
    let tempo = TempoMap::from_smf(&smf);

    let mut tracks = Vec::new();
    for (index, events) in smf.tracks.iter().enumerate() {
        let mut tick: u64 = 0;
        let mut name = None;
        let mut open: HashMap<(u8, u8), (u64, u8)> = HashMap::new();
        let mut notes = Vec::new();

        for event in events {
            tick += u64::from(event.delta.as_int());
            match event.kind {
                TrackEventKind::Meta(MetaMessage::TrackName(raw)) if name.is_none() => {
                    name = Some(String::from_utf8_lossy(raw).trim().to_string());
                }
                TrackEventKind::Midi { channel, message } => {
                    let channel = channel.as_int();
                    match message {
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            let key = key.as_int();
                            if let Some(previous) = open.insert((channel, key), (tick, vel.as_int()))
                            {
                                push_note(&mut notes, &tempo, key, previous, tick);
                            }
                        }
                        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                            let key = key.as_int();
                            if let Some(started) = open.remove(&(channel, key)) {
                                push_note(&mut notes, &tempo, key, started, tick);
                            }
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        for ((_, key), started) in open.drain() {
            push_note(&mut notes, &tempo, key, started, tick);
        }

        if notes.is_empty() {
            continue;
        }
        notes.sort_by(|a, b| {
            a.start_time
                .total_cmp(&b.start_time)
                .then(a.pitch.cmp(&b.pitch))
        });
        tracks.push(TrackNotes {
            track: index,
            name: name.filter(|name| !name.is_empty()),
            notes,
        });
    }

    Ok(tracks)
}

fn push_note(
    notes: &mut Vec<NoteEvent>,
    tempo: &TempoMap,
    pitch: u8,
    (start_tick, velocity): (u64, u8),
    end_tick: u64,
) {
    let start_time = tempo.seconds_at(start_tick);
    let duration = tempo.seconds_at(end_tick) - start_time;
    if duration <= 0.0 {
        return;
    }
    notes.push(NoteEvent {
        pitch,
        start_time,
        duration,
        velocity,
    });
}

#[derive(Debug, Clone, Copy)]
struct TempoSegment {
    tick: u64,
    seconds: f64,
    micros_per_quarter: f64,
}

#[derive(Debug, Clone)]
enum TempoMap {
    Metrical {
        ticks_per_quarter: f64,
        segments: Vec<TempoSegment>,
    },
    Timecode {
        ticks_per_second: f64,
    },
}

impl TempoMap {
    fn from_smf(smf: &Smf<'_>) -> Self {
        let ticks_per_quarter = match smf.header.timing {
            Timing::Metrical(ticks) => f64::from(ticks.as_int().max(1)),
            Timing::Timecode(fps, subframes) => {
                let ticks_per_second = f64::from(fps.as_f32()) * f64::from(subframes.max(1));
                return Self::Timecode { ticks_per_second };
            }
        };

        let mut changes = Vec::new();
        for events in &smf.tracks {
            let mut tick: u64 = 0;
            for event in events {
                tick += u64::from(event.delta.as_int());
                if let TrackEventKind::Meta(MetaMessage::Tempo(micros)) = event.kind {
                    changes.push((tick, f64::from(micros.as_int())));
                }
            }
        }
        changes.sort_by_key(|(tick, _)| *tick);

        let mut segments = vec![TempoSegment {
            tick: 0,
            seconds: 0.0,
            micros_per_quarter: DEFAULT_MICROS_PER_QUARTER,
        }];
        for (tick, micros_per_quarter) in changes {
            let last = segments[segments.len() - 1];
            let seconds = last.seconds
                + (tick - last.tick) as f64 * last.micros_per_quarter
                    / 1_000_000.0
                    / ticks_per_quarter;
            if last.tick == tick {
                segments.pop();
            }
            segments.push(TempoSegment {
                tick,
                seconds,
                micros_per_quarter,
            });
        }

        Self::Metrical {
            ticks_per_quarter,
            segments,
        }
    }

    fn seconds_at(&self, tick: u64) -> f64 {
        match self {
            Self::Timecode { ticks_per_second } => tick as f64 / ticks_per_second,
            Self::Metrical {
                ticks_per_quarter,
                segments,
            } => {
                let index = segments
                    .partition_point(|segment| segment.tick <= tick)
                    .saturating_sub(1);
                let segment = &segments[index];
                segment.seconds
                    + (tick - segment.tick) as f64 * segment.micros_per_quarter
                        / 1_000_000.0
                        / ticks_per_quarter
            }
        }
    }
}
