// Chord tracks: a sustained pad and a strummed rhythm part.
//
// Both read a section's harmonic events and skip passing chords and hits.
// The pad holds each chord for the event's length. The rhythm part fills
// each event with strum patterns picked per meter by integer weight, cutting
// the last strum at the event's end. Chords are voiced in root position from
// MIDI 48.

use capric_prng::RandomSource;

use crate::config::ChordConfig;
use crate::theory::TheoryHelpers;
use crate::timeline::{NoteEvent, Song, TICKS_PER_QUARTER, TimeSignature};
use crate::track_utils::{fill_iteration_cap, trim_overlaps, weighted_choice};

const VOICING_BASE: u8 = 48;
const MIN_RHYTHM_EVENT: u32 = TICKS_PER_QUARTER / 8;
const MIN_STRUM: u32 = TICKS_PER_QUARTER / 16;

const E: u32 = TICKS_PER_QUARTER / 2;
const Q: u32 = TICKS_PER_QUARTER;
const DQ: u32 = TICKS_PER_QUARTER * 3 / 2;
const H: u32 = TICKS_PER_QUARTER * 2;
const DH: u32 = TICKS_PER_QUARTER * 3;
const W: u32 = TICKS_PER_QUARTER * 4;

/// Strum lengths in ticks, played in order and repeated while the chord lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrumPattern {
    pub name: &'static str,
    pub steps: &'static [u32],
}

const fn strum(name: &'static str, steps: &'static [u32]) -> StrumPattern {
    StrumPattern { name, steps }
}

const COMMON: &[(StrumPattern, u32)] = &[
    (strum("EighthNotes", &[E; 8]), 20),
    (strum("QuarterNotes", &[Q; 4]), 30),
    (strum("HalfNotes", &[H, H]), 15),
    (strum("WholeNote", &[W]), 10),
    (strum("Syncopated1", &[E, Q, E, Q, Q]), 15),
    (strum("Syncopated2", &[DQ, E, H]), 10),
];

const THREE_FOUR: &[(StrumPattern, u32)] = &[
    (strum("Quarters", &[Q; 3]), 40),
    (strum("Eighths", &[E; 6]), 25),
    (strum("DottedHalf", &[DH]), 20),
    (strum("Waltz", &[Q, H]), 15),
];

const SIX_EIGHT: &[(StrumPattern, u32)] = &[
    (strum("Eighths", &[E; 6]), 35),
    (strum("DottedQuarters", &[DQ, DQ]), 30),
    (strum("Compound1", &[Q, E, Q, E]), 20),
    (strum("Compound2", &[E, E, DQ, E]), 15),
];

const TWO_FOUR: &[(StrumPattern, u32)] = &[
    (strum("Quarters", &[Q, Q]), 50),
    (strum("Eighths", &[E; 4]), 30),
    (strum("Half", &[H]), 20),
];

const TWELVE_EIGHT: &[(StrumPattern, u32)] = &[
    (strum("Eighths", &[E; 12]), 30),
    (strum("DottedQuarters", &[DQ; 4]), 25),
    (strum("Shuffle", &[Q, E, Q, E, Q, E, Q, E]), 25),
    (strum("LongShort", &[DH, DH]), 20),
];

const FALLBACK: &[(StrumPattern, u32)] = &[(strum("Quarters", &[Q]), 1)];

/// Strum patterns for a meter. Meters without a table strum quarters.
pub fn strum_patterns(ts: TimeSignature) -> &'static [(StrumPattern, u32)] {
    match (ts.beats, ts.beat_unit) {
        (4, 4) => COMMON,
        (3, 4) => THREE_FOUR,
        (6, 8) => SIX_EIGHT,
        (2, 4) => TWO_FOUR,
        (12, 8) => TWELVE_EIGHT,
        _ => FALLBACK,
    }
}

fn voicing<T: TheoryHelpers>(theory: &T, chord: &str) -> Vec<u8> {
    theory
        .chord_notes(chord)
        .pitch_classes
        .iter()
        .map(|pc| VOICING_BASE + pc)
        .collect()
}

/// One held chord per sounding harmonic event.
pub fn generate_pad<T: TheoryHelpers>(
    song: &Song,
    theory: &T,
    config: &ChordConfig,
) -> Vec<NoteEvent> {
    let mut events = Vec::new();
    for section in &song.sections {
        for event in section.harmonic_events.iter().filter(|e| !e.is_passing && !e.is_hit) {
            if event.duration_ticks == 0 {
                continue;
            }
            let pitches = voicing(theory, &event.chord);
            if pitches.is_empty() {
                continue;
            }
            events.push(NoteEvent::chord(
                pitches,
                section.start_tick + event.start_tick,
                event.duration_ticks,
                config.pad_velocity,
            ));
        }
    }
    events
}

/// Strummed chords over every sounding harmonic event.
pub fn generate_chord_rhythm<T: TheoryHelpers, R: RandomSource>(
    song: &Song,
    theory: &T,
    config: &ChordConfig,
    rng: &mut R,
) -> Vec<NoteEvent> {
    let mut events = Vec::new();
    for section in &song.sections {
        let patterns = strum_patterns(section.time_signature);
        for event in section.harmonic_events.iter().filter(|e| !e.is_passing && !e.is_hit) {
            if event.duration_ticks <= MIN_RHYTHM_EVENT {
                continue;
            }
            let pitches = voicing(theory, &event.chord);
            if pitches.is_empty() {
                continue;
            }
            let start = section.start_tick + event.start_tick;
            for (offset, length) in strum_event(patterns, event.duration_ticks, rng) {
                events.push(NoteEvent::chord(
                    pitches.clone(),
                    start + offset,
                    length,
                    config.rhythm_velocity,
                ));
            }
        }
    }
    trim_overlaps(&mut events, MIN_STRUM);
    events
}

/// Strums as `(offset, length)` pairs filling `duration` ticks with
/// patterns drawn from `patterns`.
fn strum_event<R: RandomSource>(
    patterns: &[(StrumPattern, u32)],
    duration: u32,
    rng: &mut R,
) -> Vec<(u32, u32)> {
    let mut strums = Vec::new();
    let mut cursor = 0;
    let max_iter = fill_iteration_cap(duration, MIN_STRUM);
    for _ in 0..max_iter {
        if cursor >= duration {
            return strums;
        }
        let Some(pattern) = weighted_choice(patterns, rng) else {
            return strums;
        };
        for step in pattern.steps {
            if cursor >= duration {
                break;
            }
            let length = (*step).min(duration - cursor);
            if length > 0 {
                strums.push((cursor, length));
            }
            cursor += length;
        }
    }
    if cursor < duration {
        tracing::debug!(duration, cursor, "strum fill hit its iteration cap");
    }
    strums
}
