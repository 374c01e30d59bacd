// MIDI output for generated tracks.
//
// Each track becomes a single-track SMF carrying the song's tempo, every
// meter change as a TimeSignature meta event at its tick, the track name and
// the notes. `song_to_smf` bundles all tracks into one Format 1 file whose
// first track holds the tempo and meter map.
//
// Uses the `midly` crate. Ticks are written as-is at 128 per quarter.

use std::path::Path;

use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};

use crate::error::{CompositionError, Result};
use crate::timeline::{NoteEvent, Song, TICKS_PER_QUARTER};

/// General MIDI percussion channel (channel 10, zero-based 9).
pub const DRUM_CHANNEL: u8 = 9;

/// One named part ready for export.
#[derive(Debug, Clone, PartialEq)]
pub struct MidiTrack {
    pub name: String,
    pub channel: u8,
    /// GM program, or `None` to leave the synth default.
    pub program: Option<u8>,
    pub events: Vec<NoteEvent>,
}

impl MidiTrack {
    pub fn new(
        name: impl Into<String>,
        channel: u8,
        program: Option<u8>,
        events: Vec<NoteEvent>,
    ) -> Self {
        Self {
            name: name.into(),
            channel,
            program,
            events,
        }
    }

    pub fn is_drums(&self) -> bool {
        self.channel == DRUM_CHANNEL
    }
}

fn meta(delta: u32, message: MetaMessage<'_>) -> TrackEvent<'_> {
    TrackEvent { delta: u28::new(delta), kind: TrackEventKind::Meta(message) }
}

/// Tempo plus one TimeSignature meta per meter change, as absolute ticks.
fn conductor_events(song: &Song) -> Vec<(u32, MetaMessage<'static>)> {
    let tempo = 60_000_000 / song.bpm.max(1);
    let mut events = vec![(0, MetaMessage::Tempo(u24::new(tempo.min(0xFF_FFFF))))];
    if song.meter_changes.is_empty() {
        events.push((0, time_signature_meta(4, 4)));
    }
    for change in &song.meter_changes {
        let ts = change.time_signature;
        events.push((change.tick, time_signature_meta(ts.beats, ts.beat_unit)));
    }
    events
}

fn time_signature_meta(beats: u8, beat_unit: u8) -> MetaMessage<'static> {
    // Denominator as a power of two; 24 clocks per click, 8 32nds per quarter.
    MetaMessage::TimeSignature(beats, beat_unit.max(1).trailing_zeros() as u8, 24, 8)
}

/// Absolute-tick note messages for one track. At equal ticks note-offs sort
/// before note-ons so a repeated pitch retriggers cleanly.
fn note_messages(track: &MidiTrack) -> Vec<(u32, bool, MidiMessage)> {
    let mut messages = Vec::with_capacity(track.events.len() * 2);
    for event in &track.events {
        if event.duration_ticks == 0 {
            continue;
        }
        let vel = u7::new(event.velocity.clamp(1, 127));
        for pitch in &event.pitches {
            let key = u7::new((*pitch).min(127));
            messages.push((event.start_tick, true, MidiMessage::NoteOn { key, vel }));
            messages.push((event.end_tick(), false, MidiMessage::NoteOff { key, vel: u7::new(0) }));
        }
    }
    messages.sort_by_key(|(tick, on, _)| (*tick, *on));
    messages
}

/// Merge metas and notes into a delta-timed track ending in EndOfTrack.
fn build_track<'a>(metas: Vec<(u32, MetaMessage<'a>)>, track: Option<&'a MidiTrack>) -> Track<'a> {
    let mut timed: Vec<(u32, u8, TrackEventKind<'a>)> =
        metas.into_iter().map(|(tick, m)| (tick, 0, TrackEventKind::Meta(m))).collect();
    if let Some(track) = track {
        let channel = u4::new(track.channel.min(15));
        timed.push((0, 0, TrackEventKind::Meta(MetaMessage::TrackName(track.name.as_bytes()))));
        if let Some(program) = track.program {
            let message = MidiMessage::ProgramChange {
                program: u7::new(program.min(127)),
            };
            timed.push((0, 0, TrackEventKind::Midi { channel, message }));
        }
        for (tick, on, message) in note_messages(track) {
            timed.push((tick, 1 + on as u8, TrackEventKind::Midi { channel, message }));
        }
    }
    // Stable: metas first at any tick, then note-offs, then note-ons.
    timed.sort_by_key(|(tick, order, _)| (*tick, *order));

    let mut out: Track<'a> = Vec::with_capacity(timed.len() + 1);
    let mut last = 0;
    for (tick, _, kind) in timed {
        out.push(TrackEvent { delta: u28::new(tick - last), kind });
        last = tick;
    }
    out.push(meta(0, MetaMessage::EndOfTrack));
    out
}

fn header(format: Format) -> Header {
    Header::new(format, Timing::Metrical(u15::new(TICKS_PER_QUARTER as u16)))
}

/// A standalone single-track file for one part.
pub fn track_to_smf<'a>(song: &Song, track: &'a MidiTrack) -> Smf<'a> {
    let mut smf = Smf::new(header(Format::SingleTrack));
    smf.tracks.push(build_track(conductor_events(song), Some(track)));
    smf
}

/// All parts in one Format 1 file behind a tempo and meter track.
pub fn song_to_smf<'a>(song: &Song, tracks: &'a [MidiTrack]) -> Smf<'a> {
    let mut smf = Smf::new(header(Format::Parallel));
    smf.tracks.push(build_track(conductor_events(song), None));
    for track in tracks {
        smf.tracks.push(build_track(Vec::new(), Some(track)));
    }
    smf
}

pub fn encode(smf: &Smf<'_>) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    smf.write_std(&mut buf).map_err(|e| CompositionError::Midi(e.to_string()))?;
    Ok(buf)
}

pub fn write_smf(smf: &Smf<'_>, path: &Path) -> Result<()> {
    std::fs::write(path, encode(smf)?)?;
    Ok(())
}

/// A title reduced to ASCII alphanumerics joined by single underscores.
pub fn file_stem(title: &str) -> String {
    title
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// `Caprice_No_7_Drums.mid` style file name for a song title and track.
pub fn track_file_name(title: &str, track: &str) -> String {
    let track: String = track.chars().filter(|c| c.is_ascii_alphanumeric() || *c == '_').collect();
    format!("{}_{track}.mid", file_stem(title))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theory::Key;
    use crate::timeline::TimeSignature;

    fn song() -> Song {
        let key = Key::new("C", "Ionian").unwrap();
        let mut song = Song::new("Caprice No. 7", "very_normal_person", key, 120);
        song.push_section("Verse", TimeSignature::COMMON, 2, vec!["C".into()]);
        song.push_section("Chorus", TimeSignature::new(6, 8), 2, vec!["G".into()]);
        song
    }

    fn metas<'a>(track: &Track<'a>) -> Vec<(u32, MetaMessage<'a>)> {
        let mut tick = 0;
        let mut out = Vec::new();
        for e in track {
            tick += e.delta.as_int();
            if let TrackEventKind::Meta(m) = e.kind {
                out.push((tick, m));
            }
        }
        out
    }

    #[test]
    fn test_single_track_carries_tempo_and_meters() {
        let song = song();
        let track = MidiTrack::new("Bass", 1, Some(33), vec![NoteEvent::new(40, 0, 128, 90)]);
        let bytes = encode(&track_to_smf(&song, &track)).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.header.format, Format::SingleTrack);
        assert_eq!(smf.header.timing, Timing::Metrical(u15::new(128)));
        let m = metas(&smf.tracks[0]);
        assert!(m.contains(&(0, MetaMessage::Tempo(u24::new(500_000)))));
        assert!(m.contains(&(0, MetaMessage::TimeSignature(4, 2, 24, 8))));
        assert!(m.contains(&(1024, MetaMessage::TimeSignature(6, 3, 24, 8))));
        assert!(m.contains(&(0, MetaMessage::TrackName(b"Bass"))));
    }

    #[test]
    fn test_combined_file_has_conductor_plus_tracks() {
        let song = song();
        let tracks = vec![
            MidiTrack::new(
                "Pad",
                0,
                Some(89),
                vec![NoteEvent::chord(vec![48, 52, 55], 0, 512, 60)],
            ),
            MidiTrack::new("Drums", DRUM_CHANNEL, None, vec![NoteEvent::new(36, 0, 32, 100)]),
        ];
        let bytes = encode(&song_to_smf(&song, &tracks)).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.header.format, Format::Parallel);
        assert_eq!(smf.tracks.len(), 3);
        let drum_channels: Vec<u8> = smf.tracks[2]
            .iter()
            .filter_map(|e| match e.kind {
                TrackEventKind::Midi { channel, .. } => Some(channel.as_int()),
                _ => None,
            })
            .collect();
        assert_eq!(drum_channels, vec![9, 9]);
    }

    #[test]
    fn test_repeated_pitch_releases_before_retrigger() {
        let track = MidiTrack::new(
            "Lead",
            0,
            None,
            vec![NoteEvent::new(60, 0, 64, 80), NoteEvent::new(60, 64, 64, 80)],
        );
        let messages = note_messages(&track);
        let at_64: Vec<bool> = messages
            .iter()
            .filter(|(t, _, _)| *t == 64)
            .map(|(_, on, _)| *on)
            .collect();
        assert_eq!(at_64, vec![false, true]);
    }

    #[test]
    fn test_file_names() {
        assert_eq!(track_file_name("Caprice No. 7", "Drums"), "Caprice_No_7_Drums.mid");
        assert_eq!(track_file_name("Caprice No. 12", "Chords_Pad"), "Caprice_No_12_Chords_Pad.mid");
        assert_eq!(file_stem("  Caprice -- No. 3 "), "Caprice_No_3");
    }
}
