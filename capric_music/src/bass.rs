// Bass line generator.
//
// Walks every section's chord slots and fills each one according to a
// rhythmic "feel". A feel is drawn once per section and re-drawn per slot
// with `feel_change_probability`; short slots are downgraded to simpler
// feels. Pitches come from the chord's root, third and fifth, or from the
// key's scale for the walking feels, and are always folded into the bass
// band (`BassConfig::min_pitch..=max_pitch`, 36..=57 by default) with a pull
// toward the previous note.
//
// Rare chromatic passing tones bridge two roots a whole step apart on the
// last beat of a long slot. A final overlap trim keeps the line monophonic.

use capric_prng::RandomSource;

use crate::config::BassConfig;
use crate::error::{CompositionError, Result};
use crate::theory::TheoryHelpers;
use crate::timeline::{NoteEvent, Song, TICKS_PER_QUARTER};
use crate::track_utils::{
    clamp_velocity, fill_iteration_cap, fold_into_range, fold_toward_reference, trim_overlaps,
};

/// Notes further than this from the reference pitch get pulled an octave.
const REFERENCE_THRESHOLD: f64 = 8.0;
const MIN_NOTE_TICKS: u32 = TICKS_PER_QUARTER / 16;
const MIN_SLOT_TICKS: u32 = TICKS_PER_QUARTER / 8;
const BASE_VELOCITIES: [i32; 4] = [75, 80, 85, 90];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BassFeel {
    OnBeats,
    EighthRoots,
    Pedal,
    WalkingUp,
    WalkingDown,
    RootFifthOctave,
    /// One note for the remainder of the slot. Only used for short slots.
    LongNote,
}

/// Feels a section or slot may draw.
pub const FEEL_POOL: [BassFeel; 6] = [
    BassFeel::OnBeats,
    BassFeel::EighthRoots,
    BassFeel::Pedal,
    BassFeel::WalkingUp,
    BassFeel::WalkingDown,
    BassFeel::RootFifthOctave,
];

impl BassFeel {
    fn is_phrase(self) -> bool {
        matches!(self, BassFeel::WalkingUp | BassFeel::WalkingDown | BassFeel::RootFifthOctave)
    }
}

/// Choose the feel actually used for a slot of `duration` ticks.
pub fn feel_for_slot(
    feel: BassFeel,
    duration: u32,
    ticks_per_beat: u32,
    downgrade: BassFeel,
) -> BassFeel {
    let mut feel = feel;
    if duration < ticks_per_beat * 2 && feel.is_phrase() {
        feel = downgrade;
    }
    if duration < ticks_per_beat && feel != BassFeel::Pedal {
        feel = BassFeel::LongNote;
    }
    feel
}

/// A note relative to its slot, before velocity is finalized.
#[derive(Debug, Clone, Copy)]
struct SlotNote {
    pitch: u8,
    offset: u32,
    duration: u32,
    velocity_offset: i32,
}

struct BassLine<'a> {
    config: &'a BassConfig,
    /// Key scale folded into the bass band, ascending.
    scale: Vec<u8>,
    last_pitch: u8,
}

impl BassLine<'_> {
    fn midpoint(&self) -> f64 {
        (self.config.min_pitch as f64 + self.config.max_pitch as f64) / 2.0
    }

    /// Pitch class 0 lands on MIDI 36 before folding.
    fn to_band(&self, pc: u8) -> u8 {
        fold_into_range(pc as i32 + 36, self.config.min_pitch, self.config.max_pitch)
    }

    fn near(&self, pitch: i32, reference: Option<u8>) -> u8 {
        let reference = reference.map_or(self.midpoint(), |r| r as f64);
        fold_toward_reference(
            pitch,
            self.config.min_pitch,
            self.config.max_pitch,
            reference,
            REFERENCE_THRESHOLD,
        )
    }

    /// Root on strong beats most of the time; otherwise a chord tone close to
    /// the previous note, widening to root/fifth/third when none is close.
    fn select_note<R: RandomSource>(
        &self,
        tones: &[u8],
        last: u8,
        strong: bool,
        rng: &mut R,
    ) -> u8 {
        let root = self.to_band(tones[0]);
        if strong && rng.random_bool(self.config.root_on_strong_beat) {
            return self.near(root as i32, Some(last));
        }
        let third = tones.get(1).map(|pc| self.to_band(*pc));
        let fifth = tones.get(2).map(|pc| self.to_band(*pc));

        let mut candidates: Vec<u8> = [Some(root), fifth, third]
            .into_iter()
            .flatten()
            .filter(|p| p.abs_diff(last) <= 4 && *p != last)
            .collect();
        if candidates.is_empty() {
            candidates.push(root);
            if let Some(f) = fifth.filter(|_| rng.random_bool(0.6)) {
                candidates.push(f);
            }
            if let Some(t) = third.filter(|_| rng.random_bool(0.4)) {
                candidates.push(t);
            }
        }
        let target = candidates[rng.range_usize(0, candidates.len())];
        self.near(target as i32, Some(last))
    }

    /// Next scale step from `last` in the walking direction.
    fn walk_step(&self, last: u8, up: bool) -> Option<u8> {
        if self.scale.is_empty() {
            return None;
        }
        let len = self.scale.len();
        let current = match self.scale.iter().position(|p| *p == last) {
            Some(i) => i,
            None => self
                .scale
                .iter()
                .enumerate()
                .min_by_key(|(_, p)| p.abs_diff(last))
                .map_or(len / 2, |(i, _)| i),
        };
        let advance = |i: usize| if up { (i + 1) % len } else { (i + len - 1) % len };
        let wrap = |p: u8| -> i32 {
            let p = p as i32;
            if up && p < last as i32 && p + 12 <= self.config.max_pitch as i32 {
                p + 12
            } else if !up && p > last as i32 && p - 12 >= self.config.min_pitch as i32 {
                p - 12
            } else {
                p
            }
        };
        let mut idx = advance(current);
        let mut next = self.near(wrap(self.scale[idx]), Some(last));
        if next == last && len > 1 {
            idx = advance(idx);
            next = self.near(wrap(self.scale[idx]), Some(last));
        }
        Some(next)
    }

    fn fill_slot<R: RandomSource>(
        &mut self,
        feel: BassFeel,
        tones: &[u8],
        duration: u32,
        ticks_per_beat: u32,
        rng: &mut R,
    ) -> Vec<SlotNote> {
        let mut notes = Vec::new();
        let root = self.to_band(tones[0]);
        let max_iter = fill_iteration_cap(duration, MIN_NOTE_TICKS);
        let mut tick = 0;
        let mut last = self.last_pitch;

        for _ in 0..max_iter {
            if tick >= duration {
                break;
            }
            let remaining = duration - tick;
            if remaining < MIN_NOTE_TICKS {
                break;
            }
            let strong = tick % ticks_per_beat < TICKS_PER_QUARTER / 16;

            let (length, pitch, velocity_offset) = match feel {
                BassFeel::OnBeats => {
                    let pitch = (remaining >= ticks_per_beat)
                        .then(|| self.select_note(tones, last, true, rng));
                    (ticks_per_beat, pitch, 5)
                }
                BassFeel::EighthRoots => {
                    let length = ticks_per_beat / 2;
                    let pitch = (remaining >= length).then(|| self.near(root as i32, Some(last)));
                    (length, pitch, if strong { 3 } else { -2 })
                }
                BassFeel::Pedal => {
                    let pitch =
                        (remaining >= ticks_per_beat).then(|| self.near(root as i32, Some(last)));
                    let accent = if (tick / ticks_per_beat) % 2 == 0 { 2 } else { 0 };
                    (ticks_per_beat, pitch, accent)
                }
                BassFeel::WalkingUp | BassFeel::WalkingDown => {
                    let pitch = (remaining >= ticks_per_beat).then(|| {
                        self.walk_step(last, feel == BassFeel::WalkingUp)
                            .unwrap_or_else(|| self.select_note(tones, last, strong, rng))
                    });
                    (ticks_per_beat, pitch, 0)
                }
                BassFeel::RootFifthOctave => {
                    let phrase =
                        self.root_fifth_octave(tones, last, tick, remaining, ticks_per_beat, rng);
                    if let Some(end) = phrase.last() {
                        tick = end.offset + end.duration;
                        last = end.pitch;
                        notes.extend(phrase);
                        continue;
                    }
                    (remaining, Some(self.select_note(tones, last, true, rng)), 1)
                }
                BassFeel::LongNote => {
                    (remaining, Some(self.select_note(tones, last, true, rng)), 1)
                }
            };

            let length = length.min(remaining);
            match pitch {
                Some(pitch) if length >= MIN_NOTE_TICKS => {
                    notes.push(SlotNote { pitch, offset: tick, duration: length, velocity_offset });
                    last = pitch;
                    tick += length;
                }
                None if length > 0 => tick += length,
                _ => {
                    // Too short to sound: hold the root for up to one beat.
                    let length = remaining.min(ticks_per_beat).max(MIN_NOTE_TICKS);
                    let pitch = self.near(root as i32, Some(last));
                    notes.push(SlotNote {
                        pitch,
                        offset: tick,
                        duration: length,
                        velocity_offset: -5,
                    });
                    last = pitch;
                    tick += length;
                }
            }
        }
        self.last_pitch = last;
        notes
    }

    /// Root, fifth, octave on consecutive beats, as far as the slot allows.
    fn root_fifth_octave<R: RandomSource>(
        &self,
        tones: &[u8],
        last: u8,
        start: u32,
        remaining: u32,
        ticks_per_beat: u32,
        rng: &mut R,
    ) -> Vec<SlotNote> {
        let mut phrase = Vec::with_capacity(3);
        let mut used = 0;
        let mut prev = last;
        if remaining < ticks_per_beat {
            return phrase;
        }
        let root = self.select_note(tones, prev, true, rng);
        phrase.push(SlotNote {
            pitch: root,
            offset: start,
            duration: ticks_per_beat,
            velocity_offset: 5,
        });
        prev = root;
        used += ticks_per_beat;

        if let Some(fifth_pc) = tones.get(2)
            && remaining - used >= ticks_per_beat
        {
            let fifth = self.near(self.to_band(*fifth_pc) as i32, Some(prev));
            phrase.push(SlotNote {
                pitch: fifth,
                offset: start + used,
                duration: ticks_per_beat,
                velocity_offset: 0,
            });
            prev = fifth;
            used += ticks_per_beat;
        }
        if remaining - used >= ticks_per_beat {
            let octave = self.near(self.to_band(tones[0]) as i32 + 12, Some(prev));
            phrase.push(SlotNote {
                pitch: octave,
                offset: start + used,
                duration: ticks_per_beat,
                velocity_offset: -2,
            });
        }
        phrase
    }
}

/// Replace the last beat of a slot with the semitone between two roots a
/// whole step apart. Returns false when the roots are not a whole step apart.
fn insert_chromatic_passing(
    notes: &mut Vec<SlotNote>,
    root: u8,
    next_root_pc: u8,
    duration: u32,
    ticks_per_beat: u32,
    config: &BassConfig,
) -> bool {
    let diff = (next_root_pc as i32 - (root % 12) as i32).rem_euclid(12);
    let step = match diff {
        2 => 1,
        10 => -1,
        _ => return false,
    };
    let beat_start = duration - ticks_per_beat;
    notes.retain(|n| n.offset < beat_start);
    for n in notes.iter_mut() {
        n.duration = n.duration.min(beat_start - n.offset);
    }
    notes.retain(|n| n.duration >= MIN_NOTE_TICKS);
    let pitch = fold_into_range(root as i32 + step, config.min_pitch, config.max_pitch);
    notes.push(SlotNote {
        pitch,
        offset: beat_start,
        duration: ticks_per_beat,
        velocity_offset: -3,
    });
    true
}

/// Generate the bass track for an arranged song.
pub fn generate_bass_line<T: TheoryHelpers, R: RandomSource>(
    song: &Song,
    theory: &T,
    config: &BassConfig,
    rng: &mut R,
) -> Result<Vec<NoteEvent>> {
    let key_pcs = song.key.pitch_classes();
    if key_pcs.is_empty() {
        return Err(CompositionError::EmptyScale(song.key.display_name()));
    }
    let mut line = BassLine { config, scale: Vec::new(), last_pitch: config.min_pitch };
    let mut scale: Vec<u8> = key_pcs.iter().map(|pc| line.to_band(*pc)).collect();
    scale.sort_unstable();
    scale.dedup();
    line.last_pitch = scale[rng.range_usize(0, scale.len())];
    line.scale = scale;

    let mut events = Vec::new();
    for section in &song.sections {
        if section.chord_slots.is_empty() {
            continue;
        }
        let ticks_per_beat = section.ticks_per_beat();
        let section_feel = FEEL_POOL[rng.range_usize(0, FEEL_POOL.len())];

        for (i, slot) in section.chord_slots.iter().enumerate() {
            if slot.duration_ticks < MIN_SLOT_TICKS {
                continue;
            }
            let tones = theory.chord_notes(&slot.chord).pitch_classes;
            if tones.is_empty() {
                tracing::debug!(chord = %slot.chord, "bass skipping unparseable chord");
                continue;
            }

            let mut feel = section_feel;
            if rng.random_bool(config.feel_change_probability) {
                feel = FEEL_POOL[rng.range_usize(0, FEEL_POOL.len())];
            }
            let downgrade = if rng.random_bool(0.5) {
                BassFeel::OnBeats
            } else {
                BassFeel::EighthRoots
            };
            let feel = feel_for_slot(feel, slot.duration_ticks, ticks_per_beat, downgrade);

            let mut notes = line.fill_slot(feel, &tones, slot.duration_ticks, ticks_per_beat, rng);

            let next_root = section
                .chord_slots
                .get(i + 1)
                .and_then(|next| theory.chord_notes(&next.chord).pitch_classes.first().copied());
            if let Some(next_pc) = next_root
                && slot.duration_ticks >= ticks_per_beat * 2
                && rng.random_bool(config.chromatic_passing_probability)
            {
                let root = line.to_band(tones[0]);
                let (duration, tpb) = (slot.duration_ticks, ticks_per_beat);
                if insert_chromatic_passing(&mut notes, root, next_pc, duration, tpb, config)
                    && let Some(n) = notes.last()
                {
                    line.last_pitch = n.pitch;
                }
            }

            let slot_start = section.start_tick + slot.start_tick;
            for n in notes {
                let base = BASE_VELOCITIES[rng.range_usize(0, BASE_VELOCITIES.len())];
                let jitter = rng.range_i32_inclusive(-5, 5);
                events.push(NoteEvent::new(
                    n.pitch,
                    slot_start + n.offset,
                    n.duration,
                    clamp_velocity(base + n.velocity_offset + jitter, 45, 110),
                ));
            }
        }
    }

    trim_overlaps(&mut events, TICKS_PER_QUARTER / 8);
    Ok(events)
}
