// Drum track generator.
//
// Per section a groove is drawn from the library (meter and mood must
// match; BasicRock44 otherwise) and rendered bar by bar. The timing
// instrument starts as the ride in choruses whose groove allows it and the
// closed hi-hat elsewhere, and may flip when a new chord slot begins. Bars
// at four-bar phrase ends, and the section's last bar, can be replaced by a
// fill. Other bars get the groove grid with the song's variations applied.
//
// Output is one `NoteEvent` per hit on GM percussion notes. A final pass
// thins re-triggers of the same voice and trims same-voice overlaps.

use capric_prng::RandomSource;

use crate::config::DrumConfig;
use crate::drum_fills::{self, FillHit};
use crate::drum_patterns::{Groove, GrooveLibrary, Hit, StepGrid, VariationContext, Voice, humanize};
use crate::error::{CompositionError, Result};
use crate::structure::SectionKind;
use crate::timeline::{NoteEvent, Section, Song, TICKS_PER_QUARTER};
use crate::track_utils::weighted_choice;

/// Same-voice hits closer than this are merged.
const RETRIGGER_WINDOW: u32 = TICKS_PER_QUARTER / 32;
const HIT_TICKS: u32 = TICKS_PER_QUARTER / 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DrumHit {
    note: u8,
    start_tick: u32,
    duration_ticks: u32,
    velocity: u8,
}

impl DrumHit {
    fn from_fill(fill: FillHit) -> Option<Self> {
        Some(Self {
            note: fill.voice.note()?,
            start_tick: fill.start_tick,
            duration_ticks: fill.duration_ticks,
            velocity: fill.velocity,
        })
    }
}

/// Rendering state carried through one section.
struct SectionDrummer<'a> {
    groove: &'a Groove,
    section: &'a Section,
    use_ride: bool,
    variations_active: bool,
}

impl SectionDrummer<'_> {
    fn timing(&self) -> (Voice, u8) {
        if self.use_ride {
            (Voice::Ride, self.groove.ride_velocity)
        } else {
            (Voice::ClosedHat, self.groove.hat_velocity)
        }
    }

    fn bar_grid<R: RandomSource>(&self, rng: &mut R) -> StepGrid {
        let mut grid = self.groove.steps.clone();
        if !self.variations_active {
            return grid;
        }
        let (timing, timing_velocity) = self.timing();
        let ctx = VariationContext {
            grid: self.groove.grid,
            beats: self.section.time_signature.beats as u32,
            can_use_ride: self.groove.can_use_ride,
            ride_velocity: self.groove.ride_velocity,
            timing,
            timing_velocity,
        };
        for variation in &self.groove.variations {
            if rng.random_bool(variation.probability) {
                variation.kind.apply(&mut grid, &ctx, rng);
            }
        }
        grid
    }

    fn render_grid<R: RandomSource>(
        &self,
        grid: &StepGrid,
        bar_start: u32,
        rng: &mut R,
        out: &mut Vec<DrumHit>,
    ) {
        let bar_ticks = self.section.ticks_per_bar() as f64;
        let ticks_per_beat = self.section.ticks_per_beat();
        let per_step = bar_ticks / self.groove.grid.max(1) as f64;
        let (timing, timing_velocity) = self.timing();

        for step in grid {
            let offset = (per_step * step.step as f64).round();
            let swing = self.groove.swing_delay(step.step, per_step);
            let start = (bar_start as f64 + offset + swing).round() as u32;
            for &Hit { voice, velocity } in &step.hits {
                let (voice, velocity) = if voice == Voice::Timing {
                    let v = humanize(timing_velocity as i32, 10, rng) as i32;
                    let on_beat = (offset as u32 % ticks_per_beat) < ticks_per_beat / 8;
                    let v = if on_beat { v + 5 } else { v - 5 };
                    (timing, v.clamp(1, 127) as u8)
                } else {
                    (voice, humanize(velocity as i32, 10, rng))
                };
                if let Some(note) = voice.note() {
                    out.push(DrumHit {
                        note,
                        start_tick: start,
                        duration_ticks: HIT_TICKS,
                        velocity,
                    });
                }
            }
        }
    }
}

fn choose_groove<'a, R: RandomSource>(
    library: &'a GrooveLibrary,
    section: &Section,
    mood: &str,
    rng: &mut R,
) -> Option<&'a Groove> {
    let candidates = library.candidates(section.time_signature, mood);
    if let Some(groove) = weighted_choice(&candidates, rng) {
        return Some(*groove);
    }
    let fallback = library.fallback()?;
    tracing::warn!(
        section = %section.name,
        meter = %section.time_signature,
        fallback = %fallback.name,
        "no drum groove for meter and mood"
    );
    Some(fallback)
}

/// Generate the drum track for an arranged song.
pub fn generate_drum_track<R: RandomSource>(
    song: &Song,
    library: &GrooveLibrary,
    config: &DrumConfig,
    rng: &mut R,
) -> Result<Vec<NoteEvent>> {
    if library.grooves.is_empty() {
        return Err(CompositionError::InvalidPatternLibrary("groove library is empty".into()));
    }
    let variations_active = rng.random_bool(config.variation_activation);
    let song_end = song.total_ticks();
    let mut hits = Vec::new();

    for section in &song.sections {
        if section.bars == 0 {
            continue;
        }
        let Some(groove) = choose_groove(library, section, &song.mood, rng) else {
            continue;
        };
        tracing::debug!(section = %section.name, groove = %groove.name, "drum groove");
        let mut drummer = SectionDrummer {
            groove,
            section,
            use_ride: section.kind() == SectionKind::Chorus && groove.can_use_ride,
            variations_active,
        };

        let bar_ticks = section.ticks_per_bar();
        let mut current_slot: Option<usize> = None;
        for bar in 0..section.bars {
            let bar_rel = bar * bar_ticks;
            let bar_start = section.start_tick + bar_rel;

            let starting = section
                .chord_slots
                .iter()
                .position(|s| s.start_tick >= bar_rel && s.start_tick < bar_rel + bar_ticks);
            if let Some(idx) = starting
                && current_slot != Some(idx)
            {
                current_slot = Some(idx);
                if rng.random_bool(config.timing_swap_on_chord_change) && groove.can_use_ride {
                    drummer.use_ride = !drummer.use_ride;
                }
                if section.chord_slots[idx].start_tick == bar_rel
                    && rng.random_bool(config.crash_on_chord_change)
                {
                    hits.push(DrumHit {
                        note: 49,
                        start_tick: bar_start,
                        duration_ticks: section.ticks_per_beat(),
                        velocity: humanize(95, 10, rng),
                    });
                }
            }

            let last_bar = bar + 1 == section.bars;
            let fill_bar = if last_bar {
                section.bars > 1 && rng.random_bool((config.fill_probability * 1.5).min(1.0))
            } else {
                (bar + 1) % 4 == 0 && rng.random_bool(config.fill_probability)
            };

            if fill_bar {
                let kind = drum_fills::choose_fill(&groove.fills, section.time_signature, rng);
                let fill = drum_fills::render_fill(kind, bar_start, section.time_signature, rng);
                hits.extend(fill.into_iter().filter_map(DrumHit::from_fill));
            } else {
                let grid = drummer.bar_grid(rng);
                drummer.render_grid(&grid, bar_start, rng, &mut hits);
            }
        }
    }

    hits.retain(|h| h.start_tick < song_end);
    for h in &mut hits {
        h.duration_ticks = h.duration_ticks.min(song_end - h.start_tick).max(1);
    }
    let hits = thin_retriggers(hits);
    Ok(hits
        .into_iter()
        .map(|h| NoteEvent::new(h.note, h.start_tick, h.duration_ticks, h.velocity))
        .collect())
}

/// Per voice: hits within `RETRIGGER_WINDOW` of the previous one collapse
/// to the louder, otherwise the previous hit is cut at the next start.
/// Result is sorted by start tick, then note.
fn thin_retriggers(mut hits: Vec<DrumHit>) -> Vec<DrumHit> {
    hits.sort_by_key(|h| (h.note, h.start_tick));
    let mut kept: Vec<DrumHit> = Vec::with_capacity(hits.len());
    for hit in hits {
        match kept.last_mut() {
            Some(prev)
                if prev.note == hit.note && hit.start_tick - prev.start_tick < RETRIGGER_WINDOW =>
            {
                if hit.velocity > prev.velocity {
                    *prev = hit;
                }
            }
            Some(prev) if prev.note == hit.note => {
                let gap = hit.start_tick - prev.start_tick;
                prev.duration_ticks = prev.duration_ticks.min(gap);
                kept.push(hit);
            }
            _ => kept.push(hit),
        }
    }
    kept.sort_by_key(|h| (h.start_tick, h.note));
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arranger;
    use crate::theory::Key;
    use crate::timeline::TimeSignature;
    use capric_prng::GameRng;
    use std::collections::BTreeMap;

    const GM_NOTES: &[u8] = &[
        36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47, 48, 49, 50, 51, 52, 53, 54, 55, 56, 57, 59,
    ];

    fn song(mood: &str, seed: u64) -> Song {
        let mut song = Song::new("t", mood, Key::new("A", "Aeolian").unwrap(), 100);
        let chords = |c: &[&str]| c.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        song.push_section("Verse 1", TimeSignature::COMMON, 8, chords(&["Am", "F", "C", "G"]));
        song.push_section("Chorus", TimeSignature::new(6, 8), 4, chords(&["F", "G", "Am"]));
        song.push_section("Bridge", TimeSignature::new(11, 8), 3, chords(&["Dm", "E"]));
        song.push_section("Outro", TimeSignature::new(5, 4), 4, chords(&["Am"]));
        arranger::arrange_song(&mut song, &mut GameRng::new(seed));
        song
    }

    fn per_voice(events: &[NoteEvent]) -> BTreeMap<u8, Vec<&NoteEvent>> {
        let mut map: BTreeMap<u8, Vec<&NoteEvent>> = BTreeMap::new();
        for e in events {
            map.entry(e.pitch()).or_default().push(e);
        }
        map
    }

    #[test]
    fn test_drums_are_valid_and_non_overlapping_per_voice() {
        let library = GrooveLibrary::builtin().unwrap();
        let config = DrumConfig::default();
        for seed in 0..25 {
            for mood in ["very_normal_person", "sperimentale_astratto", "etereo_sognante"] {
                let s = song(mood, seed);
                let mut rng = GameRng::new(seed);
                let events = generate_drum_track(&s, &library, &config, &mut rng).unwrap();
                assert!(!events.is_empty());
                for e in &events {
                    assert!(GM_NOTES.contains(&e.pitch()), "note {}", e.pitch());
                    assert!(e.end_tick() <= s.total_ticks());
                    assert!(e.velocity >= 1 && e.velocity <= 127);
                    assert!(e.duration_ticks > 0);
                }
                for (note, hits) in per_voice(&events) {
                    for w in hits.windows(2) {
                        assert!(w[0].end_tick() <= w[1].start_tick, "voice {note} overlaps");
                        assert!(w[1].start_tick - w[0].start_tick >= RETRIGGER_WINDOW);
                    }
                }
            }
        }
    }

    #[test]
    fn test_unmatched_meter_still_gets_drums() {
        let library = GrooveLibrary::builtin().unwrap();
        let mut s = Song::new("t", "very_normal_person", Key::new("C", "Ionian").unwrap(), 120);
        s.push_section("Verse", TimeSignature::new(11, 8), 4, vec!["C".into(), "F".into()]);
        arranger::arrange_song(&mut s, &mut GameRng::new(1));
        let config = DrumConfig::default();
        let events = generate_drum_track(&s, &library, &config, &mut GameRng::new(1)).unwrap();
        assert!(events.iter().any(|e| e.pitch() == 36));
        assert!(events.iter().all(|e| e.start_tick < s.total_ticks()));
    }

    #[test]
    fn test_forced_fill_on_final_bar_drops_landing_past_end() {
        let library = GrooveLibrary::builtin().unwrap();
        let config = DrumConfig {
            fill_probability: 1.0,
            crash_on_chord_change: 0.0,
            ..DrumConfig::default()
        };
        let mut s = Song::new("t", "very_normal_person", Key::new("C", "Ionian").unwrap(), 120);
        s.push_section("Verse", TimeSignature::COMMON, 2, vec!["C".into(), "G".into()]);
        arranger::arrange_song(&mut s, &mut GameRng::new(3));
        let events = generate_drum_track(&s, &library, &config, &mut GameRng::new(3)).unwrap();
        // Last bar is a fill: no timekeeping, and its landing crash at tick
        // 2048 is past the end.
        assert!(events.iter().all(|e| e.start_tick < 2048));
        let timekeeping = |e: &NoteEvent| matches!(e.pitch(), 42 | 46 | 51 | 53);
        assert!(events.iter().any(|e| e.start_tick < 1024 && timekeeping(e)));
        assert!(!events.iter().any(|e| e.start_tick >= 1024 && timekeeping(e)));
    }

    #[test]
    fn test_same_seed_same_drums() {
        let library = GrooveLibrary::builtin().unwrap();
        let s = song("ansioso_distopico", 8);
        let config = DrumConfig::default();
        let a = generate_drum_track(&s, &library, &config, &mut GameRng::new(8)).unwrap();
        let b = generate_drum_track(&s, &library, &config, &mut GameRng::new(8)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_library_is_an_error() {
        let s = song("very_normal_person", 1);
        let empty = GrooveLibrary::default();
        let err = generate_drum_track(&s, &empty, &DrumConfig::default(), &mut GameRng::new(1));
        assert!(matches!(err, Err(CompositionError::InvalidPatternLibrary(_))));
    }

    #[test]
    fn test_retriggers_keep_louder_hit() {
        let hit = |note, start_tick, velocity| DrumHit {
            note,
            start_tick,
            duration_ticks: 32,
            velocity,
        };
        let hits = vec![hit(38, 100, 60), hit(38, 102, 90), hit(38, 120, 70), hit(42, 101, 50)];
        let thinned = thin_retriggers(hits);
        assert_eq!(thinned.len(), 3);
        assert_eq!(thinned[0].note, 38);
        assert_eq!((thinned[0].start_tick, thinned[0].velocity), (102, 90));
        assert_eq!(thinned[0].duration_ticks, 18);
        assert_eq!(thinned[1].note, 42);
        assert_eq!(thinned[2].start_tick, 120);
    }
}
