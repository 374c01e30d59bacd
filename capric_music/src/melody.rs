// Lead melody generator.
//
// Fills every chord slot with short rhythmic cells measured in eighths.
// Pitches come from the slot's chord tones plus the key's scale, inside an
// 18-semitone window that starts on the scale root at MIDI 48. Most notes
// step to one of the three closest candidates within a major third of the
// previous note; the rest leap anywhere in the window. Whatever a slot has
// left after the cell loop is padded with eighth-note filler.

use capric_prng::RandomSource;

use crate::config::MelodyConfig;
use crate::error::{CompositionError, Result};
use crate::theory::TheoryHelpers;
use crate::timeline::{NoteEvent, Song, TICKS_PER_QUARTER};
use crate::track_utils::{fold_into_range, pick, trim_overlaps};

const EIGHTH: u32 = TICKS_PER_QUARTER / 2;
const MIN_NOTE_TICKS: u32 = TICKS_PER_QUARTER / 16;
const WINDOW_BASE: i32 = 48;
const WINDOW_SPAN: i32 = 18;
const MAX_STEP: i32 = 4;
const STEP_CHOICES: usize = 3;

/// Rhythmic cells, in eighths.
pub const CELLS: [&[u32]; 8] = [
    &[2],
    &[1, 1],
    &[3, 1],
    &[1, 3],
    &[2, 1, 1],
    &[1, 1, 2],
    &[1, 2, 1],
    &[4],
];

struct Window {
    lo: i32,
    hi: i32,
}

impl Window {
    fn for_root(root_pc: u8) -> Self {
        let lo = WINDOW_BASE + root_pc as i32;
        Self { lo, hi: lo + WINDOW_SPAN }
    }

    /// Every pitch of `pcs` in the octave below, at, and above the base
    /// octave that lands inside the window.
    fn candidates(&self, pcs: &[u8]) -> Vec<u8> {
        pcs.iter()
            .flat_map(|pc| {
                let base = WINDOW_BASE + *pc as i32;
                [base - 12, base, base + 12]
            })
            .filter(|p| (self.lo..=self.hi).contains(p))
            .map(|p| p as u8)
            .collect()
    }
}

fn next_pitch<R: RandomSource>(
    candidates: &[u8],
    last: Option<u8>,
    config: &MelodyConfig,
    rng: &mut R,
) -> Option<u8> {
    if let Some(last) = last
        && rng.random_bool(config.step_probability)
    {
        let mut close: Vec<(i32, u8)> = candidates
            .iter()
            .map(|p| ((*p as i32 - last as i32).abs(), *p))
            .filter(|(diff, _)| *diff <= MAX_STEP)
            .collect();
        close.sort_by_key(|(diff, _)| *diff);
        close.truncate(STEP_CHOICES);
        if let Some((_, p)) = pick(&close, rng) {
            return Some(*p);
        }
    }
    pick(candidates, rng).copied()
}

fn velocity<R: RandomSource>(rng: &mut R) -> u8 {
    60 + rng.range_u64(0, 20) as u8
}

/// Generate the lead melody for an arranged song.
pub fn generate_melody<T: TheoryHelpers, R: RandomSource>(
    song: &Song,
    theory: &T,
    config: &MelodyConfig,
    rng: &mut R,
) -> Result<Vec<NoteEvent>> {
    let scale = song.key.pitch_classes();
    if scale.is_empty() {
        return Err(CompositionError::EmptyScale(song.key.display_name()));
    }
    let window = Window::for_root(scale[0]);
    let mut last: Option<u8> = None;
    let mut events = Vec::new();

    for section in &song.sections {
        for slot in &section.chord_slots {
            let length = slot.duration_ticks;
            if length == 0 {
                continue;
            }
            let slot_start = section.start_tick + slot.start_tick;
            let mut pcs = theory.chord_notes(&slot.chord).pitch_classes;
            pcs.extend(scale.iter().copied());
            pcs.sort_unstable();
            pcs.dedup();
            let candidates = window.candidates(&pcs);

            let mut cursor = 0;
            let max_attempts = length / EIGHTH * 2;
            let mut attempts = 0;
            while cursor < length && attempts < max_attempts {
                attempts += 1;
                if cursor > 0 && rng.random_bool(config.rest_probability) {
                    let remaining = length - cursor;
                    let mut rest = *pick(&[EIGHTH, TICKS_PER_QUARTER], rng).unwrap_or(&EIGHTH);
                    // Usually leave room for one closing note.
                    if rest >= remaining && rng.random_bool(0.8) {
                        rest = remaining.saturating_sub(EIGHTH);
                    }
                    cursor += rest.min(remaining);
                    continue;
                }

                let cell = CELLS[rng.range_usize(0, CELLS.len())];
                let mut within = 0;
                for eighths in cell {
                    let at = cursor + within;
                    if at >= length {
                        break;
                    }
                    let duration = (eighths * EIGHTH).min(length - at);
                    if duration < EIGHTH / 2 {
                        continue;
                    }
                    if let Some(pitch) = next_pitch(&candidates, last, config, rng) {
                        let v = velocity(rng);
                        events.push(NoteEvent::new(pitch, slot_start + at, duration, v));
                        last = Some(pitch);
                    }
                    within += duration;
                }
                cursor += within;
            }

            while cursor < length {
                let duration = EIGHTH.min(length - cursor);
                let Some(pc) = pick(&pcs, rng) else { break };
                let (lo, hi) = (window.lo as u8, window.hi as u8);
                let pitch = fold_into_range(WINDOW_BASE + *pc as i32, lo, hi);
                events.push(NoteEvent::new(pitch, slot_start + cursor, duration, velocity(rng)));
                last = Some(pitch);
                cursor += duration;
            }
        }
    }

    trim_overlaps(&mut events, MIN_NOTE_TICKS);
    if events.is_empty() {
        tracing::debug!("melody produced no notes");
    }
    Ok(events)
}
