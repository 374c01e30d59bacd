// MIDI export of composed songs, parsed back with midly.

use capric_music::midi::{DRUM_CHANNEL, encode, song_to_smf, track_to_smf};
use capric_music::song::{CompositionRequest, Libraries, Part, compose};
use capric_music::timeline::TimeSignature;
use midly::{Format, MetaMessage, MidiMessage, Smf, TrackEventKind};

fn composition(seed: u64, meter: Option<TimeSignature>) -> capric_music::song::Composition {
    let request = CompositionRequest { seed, meter, ..CompositionRequest::default() };
    compose(&request, &Libraries::builtin().unwrap()).unwrap()
}

#[test]
fn combined_file_has_one_track_per_part_plus_tempo() {
    let c = composition(21, None);
    let tracks = c.midi_tracks();
    let bytes = encode(&song_to_smf(&c.song, &tracks)).unwrap();
    let smf = Smf::parse(&bytes).unwrap();
    assert_eq!(smf.header.format, Format::Parallel);
    assert_eq!(smf.tracks.len(), tracks.len() + 1);

    let tempo_track = &smf.tracks[0];
    assert!(
        tempo_track
            .iter()
            .any(|e| matches!(e.kind, TrackEventKind::Meta(MetaMessage::Tempo(_))))
    );
    let meters = tempo_track
        .iter()
        .filter(|e| matches!(e.kind, TrackEventKind::Meta(MetaMessage::TimeSignature(..))))
        .count();
    assert_eq!(meters, c.song.meter_changes.len());
}

#[test]
fn note_ons_match_generated_events() {
    let c = composition(4, Some(TimeSignature::COMMON));
    for track in c.midi_tracks() {
        let expected: usize = track.events.iter().map(|e| e.pitches.len()).sum();
        let bytes = encode(&track_to_smf(&c.song, &track)).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.tracks.len(), 1);
        let mut ons = 0;
        let mut offs = 0;
        for e in &smf.tracks[0] {
            if let TrackEventKind::Midi { channel, message } = e.kind {
                assert_eq!(channel.as_int(), track.channel);
                match message {
                    MidiMessage::NoteOn { .. } => ons += 1,
                    MidiMessage::NoteOff { .. } => offs += 1,
                    _ => {}
                }
            }
        }
        assert_eq!(ons, expected, "{}", track.name);
        assert_eq!(offs, expected, "{}", track.name);
    }
}

#[test]
fn drums_export_on_the_percussion_channel() {
    let c = composition(13, None);
    let Some(drums) = c.midi_tracks().into_iter().find(|t| t.name == Part::Drums.name()) else {
        panic!("no drum track");
    };
    assert!(drums.is_drums());
    assert_eq!(drums.channel, DRUM_CHANNEL);
    assert_eq!(drums.program, None);
}
