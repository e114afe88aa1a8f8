//! Builders for small Standard MIDI Files, shared by the tests of every crate
//! in the workspace.

/// Appends `value` as a MIDI variable-length quantity.
pub fn varlen(mut value: u32, out: &mut Vec<u8>) {
    let mut stack = vec![(value & 0x7F) as u8];
    value >>= 7;
    while value > 0 {
        stack.push((value & 0x7F) as u8 | 0x80);
        value >>= 7;
    }
    out.extend(stack.iter().rev());
}

/// A complete file with one chunk per entry of `tracks`. Each event is a
/// delta time plus raw event bytes; end-of-track is appended. A single track
/// is written as format 0, several as format 1.
pub fn smf(division: u16, tracks: &[Vec<(u32, Vec<u8>)>]) -> Vec<u8> {
    let format: u16 = if tracks.len() == 1 { 0 } else { 1 };
    let mut bytes = b"MThd".to_vec();
    bytes.extend(6u32.to_be_bytes());
    bytes.extend(format.to_be_bytes());
    bytes.extend((tracks.len() as u16).to_be_bytes());
    bytes.extend(division.to_be_bytes());
    for events in tracks {
        let mut body = Vec::new();
        for (delta, data) in events {
            varlen(*delta, &mut body);
            body.extend(data);
        }
        body.extend([0x00, 0xFF, 0x2F, 0x00]);
        bytes.extend(b"MTrk");
        bytes.extend((body.len() as u32).to_be_bytes());
        bytes.extend(body);
    }
    bytes
}
