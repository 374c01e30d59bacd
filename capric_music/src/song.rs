// Composition pipeline.
//
// `compose` builds the song skeleton from a request (mood, key, tempo,
// title, structure, meters, and a base progression per section), arranges
// the harmonic rhythm, then runs every track generator against the frozen
// timeline. Each stage draws from its own fork of the seeded root RNG, so a
// seed reproduces a song exactly and one track's draws never shift another's.
//
// A failing generator is logged and recorded as a notice; the remaining
// tracks still run. A track that comes back empty is kept and noted once.

use capric_prng::{GameRng, RandomSource};
use tracing::{error, info, warn};

use crate::arranger;
use crate::bass::generate_bass_line;
use crate::chord_rhythm::{generate_chord_rhythm, generate_pad};
use crate::config::GenerationConfig;
use crate::drum_patterns::GrooveLibrary;
use crate::drums::generate_drum_track;
use crate::error::Result;
use crate::harmony::{
    ChordAccumulator, HarmonyContext, ProgressionCache, generate_section_progression,
};
use crate::melody::generate_melody;
use crate::midi::{DRUM_CHANNEL, MidiTrack};
use crate::moods::{self, DEFAULT_MOOD, MoodProfile, TEMPO_FEELS};
use crate::structure::{StructureLibrary, plan_sections};
use crate::theory::{Key, StandardTheory};
use crate::timeline::{NoteEvent, Song, TimeSignature};
use crate::track_utils::pick;
use crate::vocal::generate_vocal_line;
use crate::vocal_profiles::VocalProfileLibrary;

const SALT_ARRANGE: u64 = 0x4152_5241;

/// The generated parts, in export order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Part {
    ChordPad,
    ChordRhythm,
    Melody,
    Vocal,
    Bass,
    Drums,
}

impl Part {
    pub const ALL: [Part; 6] = [
        Part::ChordPad,
        Part::ChordRhythm,
        Part::Melody,
        Part::Vocal,
        Part::Bass,
        Part::Drums,
    ];

    /// Track name, also used in output file names.
    pub fn name(self) -> &'static str {
        match self {
            Part::ChordPad => "Chords_Pad",
            Part::ChordRhythm => "Chords_Rhythm",
            Part::Melody => "Melody",
            Part::Vocal => "Vocal",
            Part::Bass => "Bass",
            Part::Drums => "Drums",
        }
    }

    pub fn channel(self) -> u8 {
        match self {
            Part::ChordPad => 0,
            Part::ChordRhythm => 1,
            Part::Melody => 2,
            Part::Vocal => 3,
            Part::Bass => 4,
            Part::Drums => DRUM_CHANNEL,
        }
    }

    /// Zero-based General MIDI program.
    pub fn program(self) -> Option<u8> {
        match self {
            Part::ChordPad => Some(89),
            Part::ChordRhythm => Some(25),
            Part::Melody => Some(73),
            Part::Vocal => Some(52),
            Part::Bass => Some(33),
            Part::Drums => None,
        }
    }

    fn salt(self) -> u64 {
        match self {
            Part::ChordPad => 0x5041_4400,
            Part::ChordRhythm => 0x5248_5900,
            Part::Melody => 0x4D45_4C00,
            Part::Vocal => 0x564F_4300,
            Part::Bass => 0x4241_5300,
            Part::Drums => 0x4452_4D00,
        }
    }
}

/// What the caller pins down. Everything left `None` is drawn from the seed.
#[derive(Debug, Clone, Default)]
pub struct CompositionRequest {
    pub seed: u64,
    pub mood: Option<String>,
    pub tempo_feel: Option<String>,
    /// (root, mode), e.g. ("F#", "Dorian").
    pub key: Option<(String, String)>,
    pub meter: Option<TimeSignature>,
    /// Structure template id.
    pub structure: Option<String>,
    pub config: GenerationConfig,
}

/// Pattern and template tables shared by every composition.
#[derive(Debug, Clone)]
pub struct Libraries {
    pub structures: StructureLibrary,
    pub grooves: GrooveLibrary,
    pub profiles: VocalProfileLibrary,
}

impl Libraries {
    pub fn builtin() -> Result<Self> {
        Ok(Self {
            structures: StructureLibrary::default(),
            grooves: GrooveLibrary::builtin()?,
            profiles: VocalProfileLibrary::default(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedTrack {
    pub part: Part,
    pub events: Vec<NoteEvent>,
}

/// A finished song: the arranged timeline plus every track that generated.
#[derive(Debug, Clone)]
pub struct Composition {
    pub song: Song,
    pub tracks: Vec<GeneratedTrack>,
    /// Name and style label of the vocal profile, when the vocal ran.
    pub vocal_profile: Option<(String, String)>,
    pub chords_used: ChordAccumulator,
    /// User-facing notes about failed or empty tracks.
    pub notices: Vec<String>,
}

impl Composition {
    pub fn track(&self, part: Part) -> Option<&GeneratedTrack> {
        self.tracks.iter().find(|t| t.part == part)
    }

    /// Export-ready tracks with channels and programs assigned.
    pub fn midi_tracks(&self) -> Vec<MidiTrack> {
        self.tracks
            .iter()
            .map(|t| {
                let part = t.part;
                MidiTrack::new(part.name(), part.channel(), part.program(), t.events.clone())
            })
            .collect()
    }
}

fn resolve_key<R: RandomSource>(
    forced: Option<&(String, String)>,
    mood: &MoodProfile,
    rng: &mut R,
) -> Key {
    if let Some((root, mode)) = forced {
        if let Some(key) = Key::new(root, mode) {
            return key;
        }
        warn!(root = %root, mode = %mode, "unknown key, choosing one for the mood");
    }
    let (root, mode) = moods::pick_key(mood, rng);
    Key::new(root, mode).unwrap_or_else(|| {
        warn!(root, mode, "candidate key does not resolve, using C Ionian");
        Key::default()
    })
}

/// Build the unarranged skeleton: global parameters, sections and a base
/// progression per section. Every chord produced lands in `chords_used`.
pub fn plan_song<R: RandomSource>(
    request: &CompositionRequest,
    structures: &StructureLibrary,
    chords_used: &mut ChordAccumulator,
    rng: &mut R,
) -> Song {
    let mood = moods::mood_profile(request.mood.as_deref().unwrap_or(DEFAULT_MOOD));
    let key = resolve_key(request.key.as_ref(), mood, rng);
    let tempo_feel = match &request.tempo_feel {
        Some(feel) => feel.clone(),
        None => pick(&TEMPO_FEELS, rng).copied().unwrap_or("mid_tempo_groove").to_string(),
    };
    let bpm = moods::pick_bpm(&tempo_feel, rng);
    let title = format!("Caprice No. {}", rng.range_usize_inclusive(1, 999));

    let mut song = Song::new(title, mood.name, key, bpm);
    song.tempo_feel = tempo_feel;
    song.style_notes = mood.style_notes.to_string();

    let structure = structures.choose(request.structure.as_deref(), mood.name, rng);
    let planned = plan_sections(&structure, mood.name, request.meter, rng);
    let mut cache = ProgressionCache::new();
    for section in planned {
        let ctx = HarmonyContext {
            key: &song.key,
            mood: mood.name,
            config: &request.config.harmony,
        };
        let chords =
            generate_section_progression(&section.name, &ctx, chords_used, &mut cache, rng);
        song.push_section(section.name, section.time_signature, section.bars, chords);
    }
    info!(
        title = %song.title,
        key = %song.key.display_name(),
        bpm = song.bpm,
        sections = song.sections.len(),
        bars = song.total_bars(),
        "planned song"
    );
    song
}

/// Plan, arrange and generate every track from a request.
pub fn compose(request: &CompositionRequest, libraries: &Libraries) -> Result<Composition> {
    request.config.validate()?;
    let mut rng = GameRng::new(request.seed);
    let mut chords_used = ChordAccumulator::new();
    let song = plan_song(request, &libraries.structures, &mut chords_used, &mut rng);
    song.require_sections()?;
    Ok(render(song, chords_used, &request.config, libraries, &mut rng))
}

/// Arrange and generate tracks for a skeleton built by the caller. The base
/// chords of every section are recorded as used.
pub fn compose_song(
    song: Song,
    config: &GenerationConfig,
    libraries: &Libraries,
    seed: u64,
) -> Result<Composition> {
    config.validate()?;
    song.require_sections()?;
    let mut chords_used = ChordAccumulator::new();
    for section in &song.sections {
        chords_used.record_all(&section.base_chords);
    }
    Ok(render(song, chords_used, config, libraries, &mut GameRng::new(seed)))
}

fn render(
    mut song: Song,
    chords_used: ChordAccumulator,
    config: &GenerationConfig,
    libraries: &Libraries,
    rng: &mut GameRng,
) -> Composition {
    arranger::arrange_song(&mut song, &mut rng.fork(SALT_ARRANGE));
    let theory = StandardTheory;

    let mut tracks = Vec::with_capacity(Part::ALL.len());
    let mut notices = Vec::new();
    let mut vocal_profile = None;
    for part in Part::ALL {
        let mut part_rng = rng.fork(part.salt());
        let result = match part {
            Part::ChordPad => Ok(generate_pad(&song, &theory, &config.chords)),
            Part::ChordRhythm => {
                Ok(generate_chord_rhythm(&song, &theory, &config.chords, &mut part_rng))
            }
            Part::Melody => generate_melody(&song, &theory, &config.melody, &mut part_rng),
            Part::Vocal => {
                let profiles = &libraries.profiles;
                generate_vocal_line(&song, &theory, profiles, &config.vocal, &mut part_rng).map(
                    |line| {
                        info!(profile = %line.profile, style = %line.style_label, "vocal profile");
                        vocal_profile = Some((line.profile, line.style_label));
                        line.events
                    },
                )
            }
            Part::Bass => generate_bass_line(&song, &theory, &config.bass, &mut part_rng),
            Part::Drums => {
                generate_drum_track(&song, &libraries.grooves, &config.drums, &mut part_rng)
            }
        };
        match result {
            Ok(events) => {
                if events.is_empty() {
                    warn!(track = part.name(), "track generated no notes");
                    notices.push(format!("{}: nothing generated", part.name()));
                } else {
                    info!(track = part.name(), notes = events.len(), "generated track");
                }
                tracks.push(GeneratedTrack { part, events });
            }
            Err(e) => {
                error!(track = part.name(), error = %e, "track generator failed");
                notices.push(format!("{}: generation failed ({e})", part.name()));
            }
        }
    }

    Composition { song, tracks, vocal_profile, chords_used, notices }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(seed: u64) -> CompositionRequest {
        CompositionRequest { seed, ..CompositionRequest::default() }
    }

    #[test]
    fn test_forced_choices_are_honoured() {
        let libraries = Libraries::builtin().unwrap();
        let req = CompositionRequest {
            mood: Some("etereo_sognante".into()),
            tempo_feel: Some("lento_atmosferico".into()),
            key: Some(("D".into(), "Lydian".into())),
            meter: Some(TimeSignature::new(3, 4)),
            ..request(11)
        };
        let c = compose(&req, &libraries).unwrap();
        assert_eq!(c.song.mood, "etereo_sognante");
        assert_eq!(c.song.key.display_name(), "D Lydian");
        assert!((60..=85).contains(&c.song.bpm));
        assert_eq!(c.song.meter_changes.len(), 1);
        assert!(c.song.sections.iter().all(|s| s.time_signature == TimeSignature::new(3, 4)));
        assert!(c.song.title.starts_with("Caprice No. "));
    }

    #[test]
    fn test_unknown_inputs_fall_back() {
        let libraries = Libraries::builtin().unwrap();
        let req = CompositionRequest {
            mood: Some("jazzy".into()),
            tempo_feel: Some("whatever".into()),
            key: Some(("H".into(), "Ionian".into())),
            ..request(3)
        };
        let c = compose(&req, &libraries).unwrap();
        assert_eq!(c.song.mood, DEFAULT_MOOD);
        assert_eq!(c.song.bpm, 120);
        assert!(!c.song.key.notes.is_empty());
    }

    #[test]
    fn test_every_part_reported() {
        let libraries = Libraries::builtin().unwrap();
        for seed in 0..5 {
            let c = compose(&request(seed), &libraries).unwrap();
            for part in Part::ALL {
                let present = c.track(part).is_some();
                let noted = c.notices.iter().any(|n| n.starts_with(part.name()));
                assert!(present || noted, "{:?} neither generated nor noted", part);
            }
            assert_eq!(c.midi_tracks().len(), c.tracks.len());
        }
    }

    #[test]
    fn test_empty_skeleton_is_rejected() {
        let libraries = Libraries::builtin().unwrap();
        let song = Song::new("t", DEFAULT_MOOD, Key::default(), 120);
        assert!(compose_song(song, &GenerationConfig::default(), &libraries, 1).is_err());
    }

    #[test]
    fn test_drums_stay_on_percussion_channel() {
        assert_eq!(Part::Drums.channel(), DRUM_CHANNEL);
        let mut pitched = Part::ALL.iter().filter(|p| **p != Part::Drums);
        assert!(pitched.all(|p| p.channel() != DRUM_CHANNEL));
    }
}
