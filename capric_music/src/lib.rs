// Capric Music Generator
//
// A procedural song composer that writes a multi-track arrangement (chord
// pad, strummed chords, lead melody, vocal line, bass and drums) over a
// generated song skeleton. A mood picks the key, meters, tempo range and
// chord coloring; a structure template names the sections; each section
// gets a base progression which the arranger spreads over a tick timeline.
// Every track generator then reads that frozen timeline independently.
//
// Architecture:
// - theory.rs: Note names, chord parsing and spelling, scales, keys
// - moods.rs: Mood profiles, per-mood meter tables, tempo feels, key catalogue
// - structure.rs: Structure templates, bar-count guidelines, section kinds
// - timeline.rs: Ticks, time signatures, sections, harmonic events, note events
// - harmony.rs: Scale-degree progressions, mood colorization, progression cache
// - harmonic_rhythm.rs: Per-meter patterns splitting a bar between chords
// - arranger.rs: Harmonic events and main chord slots for each section
// - track_utils.rs: Weighted choice, range folding, overlap trimming
// - bass.rs: Bass feels and the bass line generator
// - drum_patterns.rs: GM drum map, groove library and groove variations
// - drum_fills.rs: Named fills and their rendering
// - drums.rs: The drum track generator
// - vocal_profiles.rs: Vocal style profiles (intervals, rhythm, register)
// - vocal.rs: Vocal line generator with chorus motif replay
// - melody.rs: Lead melody generator
// - chord_rhythm.rs: Chord pad and strummed chord tracks
// - config.rs: JSON-loadable generation settings
// - song.rs: The composition pipeline from request to finished tracks
// - summary.rs: Plain-text song summary
// - midi.rs: Standard MIDI File output
//
// The generator is deterministic given a seed, supporting reproducible output.

pub mod arranger;
pub mod bass;
pub mod chord_rhythm;
pub mod config;
pub mod drum_fills;
pub mod drum_patterns;
pub mod drums;
pub mod error;
pub mod harmonic_rhythm;
pub mod harmony;
pub mod melody;
pub mod midi;
pub mod moods;
pub mod song;
pub mod structure;
pub mod summary;
pub mod theory;
pub mod timeline;
pub mod track_utils;
pub mod vocal;
pub mod vocal_profiles;
