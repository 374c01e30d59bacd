// Places each section's base chords on the bar grid.
//
// For every bar one harmonic-rhythm pattern is drawn (see
// harmonic_rhythm.rs) and walked step by step, producing section-relative
// `HarmonicEvent`s. A running index into the base progression decides which
// chord each step sounds. Afterwards a compaction pass derives one
// `ChordSlot` per base chord from the first non-passing event affiliated with
// that chord; slots run back to back to the section end, so a non-empty
// progression always covers the whole section.

use capric_prng::RandomSource;

use crate::harmonic_rhythm::{self, ChordRef};
use crate::timeline::{ChordSlot, HarmonicEvent, Section, Song};
use crate::track_utils::weighted_choice;

pub fn arrange_song<R: RandomSource>(song: &mut Song, rng: &mut R) {
    for section in &mut song.sections {
        arrange_section(section, rng);
    }
}

/// Fill `harmonic_events` and `chord_slots`. A section with no base chords
/// or no bars is left empty.
pub fn arrange_section<R: RandomSource>(section: &mut Section, rng: &mut R) {
    section.harmonic_events.clear();
    section.chord_slots.clear();
    let len = section.base_chords.len();
    if len == 0 || section.bars == 0 {
        return;
    }

    let ts = section.time_signature;
    let ticks_per_beat = ts.ticks_per_beat() as f32;
    let bar_ticks = ts.ticks_per_bar();
    let spare_chords = len > section.bars as usize;
    let candidates = harmonic_rhythm::eligible_patterns(ts, section.kind(), spare_chords);
    let bars_per_chord = (section.bars as usize / len).max(1);

    let mut idx = 0usize;
    let mut last_sounded = section.base_chords[0].clone();

    for bar in 0..section.bars {
        let bar_start = bar * bar_ticks;
        let bar_end = bar_start + bar_ticks;
        let Some(pattern) = weighted_choice(&candidates, rng) else {
            break;
        };
        let mut advanced = false;
        let mut cursor = bar_start;

        for (i, step) in pattern.steps.iter().enumerate() {
            let remaining = bar_end - cursor;
            if remaining == 0 {
                break;
            }
            let duration = if i + 1 == pattern.steps.len() {
                remaining
            } else {
                ((step.beats * ticks_per_beat).round() as u32).min(remaining)
            };
            if duration == 0 {
                continue;
            }

            let (chord, is_passing, is_hit) = match step.chord {
                ChordRef::Current => (section.base_chords[idx].clone(), false, false),
                ChordRef::Next => {
                    if idx + 1 < len {
                        idx += 1;
                        advanced = true;
                    }
                    (section.base_chords[idx].clone(), false, false)
                }
                ChordRef::Previous if idx > 0 => {
                    (section.base_chords[idx - 1].clone(), true, false)
                }
                ChordRef::Previous => (section.base_chords[idx].clone(), false, false),
                ChordRef::Passing => {
                    let chord = if rng.random_bool(0.5) {
                        last_sounded.clone()
                    } else {
                        section.base_chords[(idx + 1).min(len - 1)].clone()
                    };
                    (chord, true, false)
                }
                ChordRef::Hit => (section.base_chords[idx].clone(), false, true),
            };

            last_sounded = chord.clone();
            section.harmonic_events.push(HarmonicEvent {
                chord,
                start_tick: cursor,
                duration_ticks: duration,
                is_passing,
                is_hit,
                base_index: idx,
            });
            cursor += duration;
        }

        if !advanced && idx + 1 < len && (bar as usize + 1) % bars_per_chord == 0 {
            idx += 1;
        }
    }

    section.chord_slots = compact_slots(
        &section.harmonic_events,
        &section.base_chords,
        section.length_ticks(),
    );
}

/// One slot per base chord that owns at least one non-passing event.
pub fn compact_slots(
    events: &[HarmonicEvent],
    base_chords: &[String],
    section_len: u32,
) -> Vec<ChordSlot> {
    let starts: Vec<(usize, u32)> = (0..base_chords.len())
        .filter_map(|i| {
            events
                .iter()
                .find(|e| e.base_index == i && !e.is_passing)
                .map(|e| (i, e.start_tick))
        })
        .collect();

    let mut slots = Vec::with_capacity(starts.len());
    for (n, &(i, start)) in starts.iter().enumerate() {
        let end = starts
            .get(n + 1)
            .map_or(section_len, |&(_, next)| next)
            .min(section_len);
        if end <= start {
            continue;
        }
        slots.push(ChordSlot {
            chord: base_chords[i].clone(),
            start_tick: start,
            duration_ticks: end - start,
        });
    }
    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theory::Key;
    use crate::timeline::TimeSignature;
    use capric_prng::GameRng;

    fn chords(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn section(name: &str, ts: TimeSignature, bars: u32, base: &[&str]) -> Section {
        let mut song = Song::new("t", "very_normal_person", Key::new("C", "Ionian").unwrap(), 120);
        song.push_section(name, ts, bars, chords(base));
        song.sections.remove(0)
    }

    fn assert_event_invariants(s: &Section) {
        for pair in s.harmonic_events.windows(2) {
            assert!(pair[0].end_tick() <= pair[1].start_tick);
        }
        let total: u32 = s.harmonic_events.iter().map(|e| e.duration_ticks).sum();
        assert!(total <= s.length_ticks());
    }

    #[test]
    fn test_four_chords_over_eight_bars() {
        for seed in 0..20 {
            let mut s = section("Verse", TimeSignature::COMMON, 8, &["C", "G", "Am", "F"]);
            arrange_section(&mut s, &mut GameRng::new(seed));
            assert_event_invariants(&s);
            let got: Vec<(&str, u32, u32)> = s
                .chord_slots
                .iter()
                .map(|c| (c.chord.as_str(), c.start_tick, c.duration_ticks))
                .collect();
            assert_eq!(
                got,
                vec![("C", 0, 1024), ("G", 1024, 1024), ("Am", 2048, 1024), ("F", 3072, 1024)]
            );
        }
    }

    #[test]
    fn test_slots_cover_section_for_many_meters() {
        let meters = [(4, 4), (3, 4), (6, 8), (2, 4), (7, 8), (5, 4), (12, 8)];
        for (seed, (b, u)) in meters.iter().enumerate() {
            for bars in [1, 2, 3, 5, 8] {
                let ts = TimeSignature::new(*b, *u);
                let mut s = section("Chorus", ts, bars, &["Am", "F", "C", "G", "Em"]);
                arrange_section(&mut s, &mut GameRng::new(seed as u64 * 31 + bars as u64));
                assert_event_invariants(&s);
                assert_eq!(s.chord_slots[0].start_tick, 0);
                let mut cursor = 0;
                for slot in &s.chord_slots {
                    assert_eq!(slot.start_tick, cursor);
                    assert!(slot.duration_ticks > 0);
                    cursor = slot.end_tick();
                }
                assert_eq!(cursor, s.length_ticks());
            }
        }
    }

    /// The index advances once every `bars / chords` bars (rounded down), so
    /// with uneven counts the last chord absorbs the remainder. This is an
    /// approximation of how a player would spread the chords.
    #[test]
    fn test_uneven_progression_leaves_remainder_to_last_chord() {
        for seed in 0..20 {
            let mut s = section("Verse", TimeSignature::COMMON, 5, &["C", "G"]);
            arrange_section(&mut s, &mut GameRng::new(seed));
            let Some(last) = s.chord_slots.last() else { panic!("no slots") };
            assert_eq!(last.chord, "G");
            assert!(last.start_tick <= 2 * 1024, "seed {seed}");
            assert_eq!(last.end_tick(), s.length_ticks());
        }
    }

    #[test]
    fn test_empty_progression_leaves_section_empty() {
        let mut s = section("Verse", TimeSignature::COMMON, 4, &[]);
        arrange_section(&mut s, &mut GameRng::new(3));
        assert!(s.harmonic_events.is_empty());
        assert!(s.chord_slots.is_empty());
    }

    #[test]
    fn test_passing_events_do_not_start_slots() {
        let event = |chord: &str, start, length, is_passing, base| HarmonicEvent {
            chord: chord.into(),
            start_tick: start,
            duration_ticks: length,
            is_passing,
            is_hit: false,
            base_index: base,
        };
        let events = vec![
            event("C", 0, 384, false, 0),
            event("G", 384, 128, true, 0),
            event("G", 512, 512, false, 1),
        ];
        let slots = compact_slots(&events, &chords(&["C", "G"]), 1024);
        assert_eq!(slots.len(), 2);
        assert_eq!((slots[0].start_tick, slots[0].duration_ticks), (0, 512));
        assert_eq!((slots[1].start_tick, slots[1].duration_ticks), (512, 512));
    }
}
