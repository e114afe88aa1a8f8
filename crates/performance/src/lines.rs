use crate::model::{NoteEvent, Point, TrackNotes};

/// Splits every track into monophonic voices and turns each voice into the
/// point list of one line.
///
/// Voices are allocated greedily: a note goes to the first voice whose last
/// note has already ended, so points stay time-ordered within a voice. Two
/// consecutive notes separated by at most `join_gap` seconds are joined into
/// one connected segment.
pub fn build_lines(tracks: &[TrackNotes], join_gap: f64) -> Vec<Vec<Point>> {
    let mut lines = Vec::new();
    for track in tracks {
        for voice in split_voices(&track.notes) {
            lines.push(voice_points(&voice, join_gap));
        }
    }
    lines
}

fn split_voices(notes: &[NoteEvent]) -> Vec<Vec<NoteEvent>> {
    let mut sorted: Vec<NoteEvent> = notes.to_vec();
    sorted.sort_by(|a, b| {
        a.start_time
            .total_cmp(&b.start_time)
            .then(a.pitch.cmp(&b.pitch))
    });

    let mut voices: Vec<Vec<NoteEvent>> = Vec::new();
    for note in sorted {
        let free = voices.iter_mut().find(|voice| {
            voice
                .last()
                .is_some_and(|last| last.start_time + last.duration <= note.start_time)
        });
        match free {
            Some(voice) => voice.push(note),
            None => voices.push(vec![note]),
        }
    }
    voices
}

fn voice_points(voice: &[NoteEvent], join_gap: f64) -> Vec<Point> {
    let joined = |earlier: &NoteEvent, later: &NoteEvent| {
        later.start_time - (earlier.start_time + earlier.duration) <= join_gap
    };

    let mut points = Vec::with_capacity(voice.len() * 2);
    for (index, note) in voice.iter().enumerate() {
        let joins_previous = index > 0 && joined(&voice[index - 1], note);
        let joins_next = voice.get(index + 1).is_some_and(|next| joined(note, next));
        let pitch = f64::from(note.pitch);

        points.push(Point {
            time: note.start_time,
            note: pitch,
            is_start: !joins_previous,
            is_end: false,
            velocity: note.velocity,
        });
        points.push(Point {
            time: note.start_time + note.duration,
            note: pitch,
            is_start: false,
            is_end: !joins_next,
            velocity: note.velocity,
        });
    }
    points
}
