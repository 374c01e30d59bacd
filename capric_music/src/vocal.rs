// Vocal line generator.
//
// One style profile (see `vocal_profiles`) is chosen per song. Each sung
// section walks its chord slots, placing sub-events until the slot is
// full: a start offset from the profile's accent weights, then a note or a
// rest with a length from the profile's tables, then a pitch that follows
// the profile's interval and direction preferences while staying on chord
// tones of the slot (intersected with the vocal scale) inside the register.
//
// The first chorus records a motif per slot. Later choruses in the same
// meter and with the same slot count replay those motifs, transposed by the
// change of chord root and stretched to the new slot length, so choruses
// sound like the same hook.

use capric_prng::RandomSource;

use crate::config::VocalConfig;
use crate::error::{CompositionError, Result};
use crate::structure::{SectionKind, is_vocal_section};
use crate::theory::{self, Key, TheoryHelpers};
use crate::timeline::{ChordSlot, NoteEvent, Section, Song, TICKS_PER_QUARTER, TimeSignature};
use crate::track_utils::{cumulative_choice, fill_iteration_cap, pick, trim_overlaps};
use crate::vocal_profiles::{
    DirectionBias, IntervalKind, NoteValue, VocalProfile, VocalProfileLibrary,
};

const MIN_EVENT_TICKS: u32 = TICKS_PER_QUARTER / 16;
const VELOCITY_SCATTER: [f64; 7] = [-1.0, 1.0, 0.5, -0.5, 0.25, -0.25, 0.0];
/// Replayed motifs may fold this far outside the register before clamping.
const REPLAY_FOLD_SLACK: i32 = 6;

/// The vocal track together with the profile that shaped it.
#[derive(Debug, Clone, PartialEq)]
pub struct VocalLine {
    pub profile: String,
    pub style_label: String,
    pub min_pitch: u8,
    pub max_pitch: u8,
    pub events: Vec<NoteEvent>,
}

#[derive(Debug, Clone, PartialEq)]
struct MotifNote {
    offset: u32,
    duration: u32,
    pitch: u8,
    velocity: u8,
}

/// Notes recorded over one chord slot of the first chorus.
#[derive(Debug, Clone, PartialEq)]
pub struct Motif {
    root_pitch: i32,
    slot_duration: u32,
    notes: Vec<MotifNote>,
}

/// Chorus motifs, one per chord slot of the first chorus that was sung.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MotifCache {
    time_signature: Option<TimeSignature>,
    motifs: Vec<Motif>,
}

impl MotifCache {
    pub fn is_captured(&self) -> bool {
        self.motifs.iter().any(|m| !m.notes.is_empty())
    }

    fn replays_into(&self, section: &Section) -> bool {
        self.is_captured()
            && self.time_signature == Some(section.time_signature)
            && self.motifs.len() == section.chord_slots.len()
    }
}

/// Event kinds produced by one rhythm draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rhythm {
    Note(u32),
    Rest(u32),
}

/// Pitch classes the vocal may use: the key, or the profile's forced mode
/// rooted on the key.
pub fn vocal_scale(key: &Key, profile: &VocalProfile) -> Vec<u8> {
    let forced = profile.mode.as_deref().and_then(theory::scale_by_name);
    match (forced, theory::note_index(&key.root)) {
        (Some(scale), Some(root)) => scale.intervals.iter().map(|i| (root + i) % 12).collect(),
        _ => key.pitch_classes(),
    }
}

struct Singer<'a> {
    profile: &'a VocalProfile,
    config: &'a VocalConfig,
    scale: Vec<u8>,
    last_pitch: Option<u8>,
}

impl Singer<'_> {
    fn in_register(&self, pcs: &[u8]) -> Vec<u8> {
        let r = &self.profile.register;
        (r.min_pitch..=r.max_pitch).filter(|p| pcs.contains(&(p % 12))).collect()
    }

    fn midpoint(&self) -> u8 {
        let r = &self.profile.register;
        ((r.min_pitch as u16 + r.max_pitch as u16) / 2) as u8
    }

    fn draw_direction<R: RandomSource>(&self, bias: &DirectionBias, last: u8, rng: &mut R) -> i32 {
        let total = bias.total();
        if total <= 0.0 {
            return *pick(&[1, -1, 0], rng).unwrap_or(&0);
        }
        let roll = rng.next_f64() * total;
        if roll < bias.up {
            1
        } else if roll < bias.up + bias.down {
            -1
        } else if roll < bias.up + bias.down + bias.same {
            0
        } else if bias.erratic > 0.0 {
            *pick(&[1, -1, 0, 1, -1], rng).unwrap_or(&0)
        } else if bias.balance > 0.0 {
            if last % 4 < 2 { 1 } else { -1 }
        } else {
            *pick(&[1, -1, 0], rng).unwrap_or(&0)
        }
    }

    /// Next pitch over a chord with the given in-scale tones.
    fn select_pitch<R: RandomSource>(&self, chord_pcs: &[u8], rng: &mut R) -> u8 {
        let scale_pitches = self.in_register(&self.scale);
        if scale_pitches.is_empty() {
            return self.midpoint();
        }
        let chord_pitches = self.in_register(chord_pcs);
        let candidates = if chord_pitches.is_empty() { &scale_pitches } else { &chord_pitches };

        let Some(last) = self.last_pitch else {
            let root = self.profile.register.anchor(self.scale[0]);
            if let Ok(root) = u8::try_from(root)
                && candidates.contains(&root)
            {
                return root;
            }
            return *pick(candidates, rng).unwrap_or(&candidates[0]);
        };

        let table: Vec<(_, f64)> =
            self.profile.intervals.iter().map(|i| (*i, i.probability)).collect();
        let (mut interval, kind) = match cumulative_choice(&table, rng) {
            Some(choice) => (choice.interval, choice.kind),
            None => (*pick(&[0, 1, 2, -1, -2], rng).unwrap_or(&0), IntervalKind::Plain),
        };
        let bias = &self.profile.direction;
        let mut direction = self.draw_direction(bias, last, rng);

        if matches!(kind, IntervalKind::OctaveJump | IntervalKind::FalsettoBreak) {
            interval = 12;
        }
        if let Some(leap) = self.profile.register.falsetto_leap
            && (kind == IntervalKind::FalsettoBreak || (bias.falsetto_on_ascent && direction == 1))
        {
            interval = leap;
            direction = 1;
        }

        let last_i = last as i32;
        let target = last_i + direction * interval;
        let mut best: Option<(i32, u8)> = None;
        for &c in candidates {
            let ci = c as i32;
            let fits = match direction {
                0 => (ci - last_i).abs() <= 3,
                d => (ci - last_i) * d >= 0,
            };
            if !fits {
                continue;
            }
            let diff = (ci - target).abs();
            match best {
                None => best = Some((diff, c)),
                Some((best_diff, _)) if diff < best_diff => best = Some((diff, c)),
                Some((best_diff, b)) if diff == best_diff => {
                    let (dc, db) = ((ci - last_i).abs(), (b as i32 - last_i).abs());
                    let chord_tone_wins =
                        chord_pitches.contains(&c) && !chord_pitches.contains(&b);
                    if dc < db || (dc == db && chord_tone_wins) {
                        best = Some((diff, c));
                    }
                }
                Some(_) => {}
            }
        }
        if let Some((_, pitch)) = best {
            return pitch;
        }

        let mut nearest = candidates.clone();
        nearest.sort_by_key(|p| (*p as i32 - last_i).abs());
        if nearest[0] == last && nearest.len() > 1 && bias.same < 0.5 {
            return nearest[1];
        }
        nearest[0]
    }

    fn draw_rhythm<R: RandomSource>(
        &self,
        ticks_per_beat: u32,
        remaining: u32,
        rng: &mut R,
    ) -> Rhythm {
        let length = |value: NoteValue| {
            ((value.beats() * ticks_per_beat as f64).round() as u32).max(MIN_EVENT_TICKS)
        };
        if rng.random_bool(self.config.note_probability) {
            let table: Vec<_> =
                self.profile.note_durations.iter().map(|d| (d.value, d.probability)).collect();
            let value = cumulative_choice(&table, rng).copied().unwrap_or(NoteValue::Quarter);
            let mut ticks = length(value).min(remaining);
            if ticks < MIN_EVENT_TICKS && remaining >= MIN_EVENT_TICKS {
                ticks = MIN_EVENT_TICKS;
            }
            Rhythm::Note(ticks.max(1))
        } else {
            let table: Vec<_> =
                self.profile.rests.iter().map(|r| (r.value, r.probability)).collect();
            // A skip rest holds for one beat.
            let value = cumulative_choice(&table, rng).copied().unwrap_or(Some(NoteValue::Eighth));
            Rhythm::Rest(length(value.unwrap_or(NoteValue::Quarter)).min(remaining))
        }
    }

    fn start_offset<R: RandomSource>(
        &self,
        ticks_per_beat: u32,
        remaining: u32,
        rng: &mut R,
    ) -> u32 {
        let a = &self.profile.accents;
        let tpb = ticks_per_beat as f64;
        let mut weights = [a.on_beat, a.off_beat, a.complex, a.behind_beat];
        let sum: f64 = weights.iter().sum();
        if sum < 0.01 {
            weights = [0.7, 0.2, 0.1, 0.0];
        } else {
            weights.iter_mut().for_each(|w| *w /= sum);
        }
        let roll = rng.next_f64();
        let mut offset = if roll < weights[0] {
            0.0
        } else if roll < weights[0] + weights[1] {
            tpb / 2.0
        } else if roll < weights[0] + weights[1] + weights[2] {
            let options: Vec<f64> = [tpb / 4.0, tpb * 0.75, tpb - tpb / 4.0]
                .into_iter()
                .filter(|o| *o > 0.0 && *o < remaining as f64)
                .collect();
            pick(&options, rng).copied().unwrap_or(0.0)
        } else if roll < weights.iter().sum::<f64>() {
            let float = (a.floating_offset_ticks as f64 * (rng.next_f64() * 0.5 + 0.5)).round();
            float.min(tpb / 3.0).max(0.0)
        } else {
            0.0
        };
        if a.rushy > 0.0 && rng.random_bool(a.rushy) {
            offset -= (tpb / 16.0).round();
        }
        if a.unsteady > 0.0 && rng.random_bool(a.unsteady) {
            let sign = if rng.random_bool(0.5) { 1.0 } else { -1.0 };
            offset += sign * (tpb / 24.0).round();
        }
        if offset >= remaining as f64 {
            offset = remaining as f64 - MIN_EVENT_TICKS as f64;
        }
        offset.max(0.0).round() as u32
    }

    fn velocity<R: RandomSource>(
        &self,
        on_beat: bool,
        pitch: u8,
        falsetto: bool,
        rng: &mut R,
    ) -> u8 {
        let v = &self.profile.velocity;
        let (base, range) = (v.base as f64, v.range as f64);
        let scatter = pick(&VELOCITY_SCATTER, rng).copied().unwrap_or(0.0);
        let mut velocity = base + scatter * range * rng.next_f64();
        if on_beat && rng.random_bool(0.6) {
            velocity += rng.next_f64() * v.accent;
        }
        if v.swell > 0.0 && rng.random_bool(v.swell) {
            velocity += pick(&[-5.0, 5.0, -10.0, 10.0], rng).copied().unwrap_or(0.0);
        }
        if v.gruff > 0.0 && rng.random_bool(v.gruff) {
            velocity = (velocity + v.accent * 1.5).min(127.0);
        }
        if v.dynamic_jumps > 0.0 && rng.random_bool(v.dynamic_jumps) {
            velocity = pick(&[base - range, base + range, base], rng).copied().unwrap_or(base);
        }
        if falsetto {
            velocity -= v.falsetto_drop as f64;
        }
        let octave_base = self.profile.register.preferred_octave * 12 + 12;
        if let Some(belt) = v.belt
            && (pitch as i32) > octave_base + 7
            && rng.random_bool(0.3)
        {
            velocity = belt as f64;
        }
        if let Some(whisper) = v.whisper
            && (pitch as i32) < octave_base - 2
            && rng.random_bool(0.3)
        {
            velocity = whisper as f64;
        }
        if let Some(max) = v.breathy_max
            && velocity > max as f64
            && rng.random_bool(0.5)
        {
            velocity = max as f64 - rng.next_f64() * 10.0;
        }
        velocity.round().clamp(15.0, 127.0) as u8
    }

    /// Chord tones of `slot` that lie in the vocal scale, with fallbacks to
    /// the root and then to a random scale tone.
    fn slot_tones<T: TheoryHelpers, R: RandomSource>(
        &self,
        theory: &T,
        slot: &ChordSlot,
        rng: &mut R,
    ) -> Vec<u8> {
        let chord = theory.chord_notes(&slot.chord);
        let tones: Vec<u8> = chord
            .pitch_classes
            .iter()
            .copied()
            .filter(|pc| self.scale.contains(pc))
            .collect();
        if !tones.is_empty() {
            return tones;
        }
        match chord.pitch_classes.first() {
            Some(root) if self.scale.contains(root) => vec![*root],
            _ => pick(&self.scale, rng).map(|pc| vec![*pc]).unwrap_or_default(),
        }
    }

    fn sing_slot<T: TheoryHelpers, R: RandomSource>(
        &mut self,
        theory: &T,
        section: &Section,
        slot: &ChordSlot,
        events: &mut Vec<NoteEvent>,
        rng: &mut R,
    ) -> Vec<MotifNote> {
        let mut sung = Vec::new();
        let tones = self.slot_tones(theory, slot, rng);
        if slot.duration_ticks <= MIN_EVENT_TICKS {
            return sung;
        }
        let tpb = section.ticks_per_beat();
        let slot_start = section.start_tick + slot.start_tick;
        let falsetto_p = self.profile.falsetto_probability();
        let mut cursor = 0;
        let max_iter = fill_iteration_cap(slot.duration_ticks, MIN_EVENT_TICKS);
        for pass in 0.. {
            if cursor >= slot.duration_ticks {
                break;
            }
            if pass == max_iter {
                tracing::debug!(
                    profile = %self.profile.name,
                    cursor,
                    "vocal fill hit its iteration cap"
                );
                break;
            }
            let remaining = slot.duration_ticks - cursor;
            if remaining < MIN_EVENT_TICKS {
                break;
            }
            cursor += self.start_offset(tpb, remaining, rng);
            if cursor >= slot.duration_ticks {
                break;
            }
            let offset = cursor;
            if slot.duration_ticks - offset < MIN_EVENT_TICKS {
                break;
            }
            match self.draw_rhythm(tpb, slot.duration_ticks - offset, rng) {
                Rhythm::Rest(0) => break,
                Rhythm::Rest(ticks) => cursor += ticks,
                Rhythm::Note(ticks) => {
                    let falsetto = falsetto_p > 0.0 && rng.random_bool(falsetto_p);
                    let pitch = self.select_pitch(&tones, rng);
                    let start = slot_start + offset;
                    let on_beat = start % tpb < tpb / 8;
                    let velocity = self.velocity(on_beat, pitch, falsetto, rng);
                    events.push(NoteEvent::new(pitch, start, ticks, velocity));
                    sung.push(MotifNote { offset, duration: ticks, pitch, velocity });
                    self.last_pitch = Some(pitch);
                    cursor += ticks;
                }
            }
        }
        sung
    }

    fn replay<T: TheoryHelpers>(
        &mut self,
        theory: &T,
        section: &Section,
        cache: &MotifCache,
        events: &mut Vec<NoteEvent>,
    ) {
        let r = self.profile.register;
        let (lo, hi) = (r.min_pitch as i32, r.max_pitch as i32);
        for (slot, motif) in section.chord_slots.iter().zip(&cache.motifs) {
            let root = theory::note_index(&theory.parse_chord(&slot.chord).root)
                .map_or(lo, |pc| r.anchor(pc));
            let shift = root - motif.root_pitch;
            let ratio = if motif.slot_duration > 0 {
                slot.duration_ticks as f64 / motif.slot_duration as f64
            } else {
                1.0
            };
            let slot_start = section.start_tick + slot.start_tick;
            for note in &motif.notes {
                let mut pitch = note.pitch as i32 + shift;
                while pitch < lo && pitch + 12 <= hi + REPLAY_FOLD_SLACK {
                    pitch += 12;
                }
                while pitch > hi && pitch - 12 >= lo - REPLAY_FOLD_SLACK {
                    pitch -= 12;
                }
                let pitch = pitch.clamp(lo, hi) as u8;

                let offset = (note.offset as f64 * ratio).round() as u32;
                if offset >= slot.duration_ticks {
                    continue;
                }
                let stretched = (note.duration as f64 * ratio).round() as u32;
                let duration = stretched.min(slot.duration_ticks - offset);
                if duration < MIN_EVENT_TICKS || slot_start + offset >= section.end_tick() {
                    continue;
                }
                events.push(NoteEvent::new(pitch, slot_start + offset, duration, note.velocity));
                self.last_pitch = Some(pitch);
            }
        }
    }
}

/// Generate the vocal track for an arranged song.
pub fn generate_vocal_line<T: TheoryHelpers, R: RandomSource>(
    song: &Song,
    theory: &T,
    profiles: &VocalProfileLibrary,
    config: &VocalConfig,
    rng: &mut R,
) -> Result<VocalLine> {
    let profile = profiles
        .choose(config.profile.as_deref(), rng)
        .ok_or_else(|| CompositionError::InvalidProfile("no vocal profiles available".into()))?;
    let scale = vocal_scale(&song.key, profile);
    if scale.is_empty() {
        return Err(CompositionError::EmptyScale(song.key.display_name()));
    }
    tracing::debug!(profile = %profile.name, style = %profile.style_label, "vocal profile chosen");

    let mut singer = Singer { profile, config, scale, last_pitch: None };
    let register = profile.register;
    let mut cache = MotifCache::default();
    let mut events = Vec::new();

    for section in &song.sections {
        if !is_vocal_section(&section.name) || section.chord_slots.is_empty() {
            continue;
        }
        if config.section_probability < 1.0 && !rng.random_bool(config.section_probability) {
            continue;
        }
        let is_chorus = section.kind() == SectionKind::Chorus;
        if is_chorus && cache.replays_into(section) {
            singer.replay(theory, section, &cache, &mut events);
            continue;
        }
        let capturing = is_chorus && !cache.is_captured();
        let mut motifs = Vec::with_capacity(section.chord_slots.len());
        for slot in &section.chord_slots {
            let notes = singer.sing_slot(theory, section, slot, &mut events, rng);
            if capturing {
                let root_pc = theory::note_index(&theory.parse_chord(&slot.chord).root);
                motifs.push(Motif {
                    root_pitch: root_pc.map_or(register.min_pitch as i32, |pc| register.anchor(pc)),
                    slot_duration: slot.duration_ticks,
                    notes,
                });
            }
        }
        if capturing {
            cache = MotifCache { time_signature: Some(section.time_signature), motifs };
        }
    }

    trim_overlaps(&mut events, MIN_EVENT_TICKS);
    Ok(VocalLine {
        profile: profile.name.clone(),
        style_label: profile.style_label.clone(),
        min_pitch: profile.register.min_pitch,
        max_pitch: profile.register.max_pitch,
        events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arranger;
    use crate::theory::StandardTheory;
    use crate::track_utils::is_non_overlapping;
    use crate::vocal_profiles::{AccentRules, DEFAULT_PROFILE};
    use capric_prng::GameRng;

    fn chords(c: &[&str]) -> Vec<String> {
        c.iter().map(|s| s.to_string()).collect()
    }

    fn song_with_choruses(seed: u64) -> Song {
        let mut song = Song::new("t", "very_normal_person", Key::new("C", "Ionian").unwrap(), 100);
        song.push_section("Intro", TimeSignature::COMMON, 2, chords(&["C", "G"]));
        song.push_section("Verse 1", TimeSignature::COMMON, 4, chords(&["C", "G", "Am", "F"]));
        song.push_section("Chorus 1", TimeSignature::COMMON, 4, chords(&["F", "G", "C", "Am"]));
        song.push_section("Verse 2", TimeSignature::new(6, 8), 4, chords(&["Dm", "G"]));
        song.push_section("Chorus 2", TimeSignature::COMMON, 4, chords(&["F", "G", "C", "Am"]));
        arranger::arrange_song(&mut song, &mut GameRng::new(seed));
        song
    }

    fn c_major_singer<'a>(profile: &'a VocalProfile, config: &'a VocalConfig) -> Singer<'a> {
        Singer { profile, config, scale: vec![0, 2, 4, 5, 7, 9, 11], last_pitch: None }
    }

    fn forced(name: &str) -> VocalConfig {
        VocalConfig { profile: Some(name.into()), ..VocalConfig::default() }
    }

    #[test]
    fn test_every_profile_stays_in_register() {
        let lib = VocalProfileLibrary::default();
        for profile in &lib.profiles {
            for seed in 0..8 {
                let song = song_with_choruses(seed);
                let config = forced(&profile.name);
                let mut rng = GameRng::new(seed);
                let line =
                    generate_vocal_line(&song, &StandardTheory, &lib, &config, &mut rng).unwrap();
                assert_eq!(line.profile, profile.name);
                assert!(is_non_overlapping(&line.events));
                for e in &line.events {
                    let range = line.min_pitch..=line.max_pitch;
                    assert!(range.contains(&e.pitch()), "{} {}", profile.name, e.pitch());
                    assert!((15..=127).contains(&e.velocity));
                    assert!(e.duration_ticks >= MIN_EVENT_TICKS);
                }
            }
        }
    }

    #[test]
    fn test_intro_is_never_sung() {
        let lib = VocalProfileLibrary::default();
        for seed in 0..10 {
            let song = song_with_choruses(seed);
            let intro_end = song.sections[0].end_tick();
            let config = VocalConfig::default();
            let mut rng = GameRng::new(seed);
            let line =
                generate_vocal_line(&song, &StandardTheory, &lib, &config, &mut rng).unwrap();
            assert!(line.events.iter().all(|e| e.start_tick >= intro_end));
        }
    }

    /// One slot per bar, laid out without the arranger so two sections can
    /// share an identical grid.
    fn bar_slots(song: &mut Song) {
        for section in &mut song.sections {
            let bar = section.ticks_per_bar();
            section.chord_slots = (0..section.bars)
                .map(|i| ChordSlot {
                    chord: section.base_chords[i as usize % section.base_chords.len()].clone(),
                    start_tick: i * bar,
                    duration_ticks: bar,
                })
                .collect();
        }
    }

    #[test]
    fn test_second_chorus_replays_first() {
        let lib = VocalProfileLibrary::default();
        let mut song = Song::new("t", "very_normal_person", Key::new("C", "Ionian").unwrap(), 100);
        song.push_section("Verse", TimeSignature::COMMON, 2, chords(&["C", "G"]));
        song.push_section("Chorus", TimeSignature::COMMON, 4, chords(&["F", "G", "C", "Am"]));
        song.push_section("Verse", TimeSignature::new(6, 8), 2, chords(&["Dm", "G"]));
        song.push_section("Chorus", TimeSignature::COMMON, 4, chords(&["F", "G", "C", "Am"]));
        bar_slots(&mut song);

        for seed in 0..10 {
            let config = forced("rnm");
            let mut rng = GameRng::new(seed);
            let line =
                generate_vocal_line(&song, &StandardTheory, &lib, &config, &mut rng).unwrap();
            let within = |s: &Section| -> Vec<(u32, u32, u8, u8)> {
                line.events
                    .iter()
                    .filter(|e| e.start_tick >= s.start_tick && e.start_tick < s.end_tick())
                    .map(|e| (e.start_tick - s.start_tick, e.duration_ticks, e.pitch(), e.velocity))
                    .collect()
            };
            let (first, second) = (within(&song.sections[1]), within(&song.sections[3]));
            assert!(!first.is_empty());
            assert_eq!(first, second, "seed {seed}");
        }
    }

    #[test]
    fn test_replay_transposes_and_stretches() {
        let lib = VocalProfileLibrary::default();
        let config = forced("rnm");
        let profile = lib.get("rnm").unwrap();
        let mut singer = c_major_singer(profile, &config);
        let cache = MotifCache {
            time_signature: Some(TimeSignature::COMMON),
            motifs: vec![Motif {
                root_pitch: profile.register.anchor(0),
                slot_duration: 256,
                notes: vec![
                    MotifNote { offset: 0, duration: 128, pitch: 64, velocity: 80 },
                    MotifNote { offset: 128, duration: 4, pitch: 67, velocity: 80 },
                ],
            }],
        };
        let mut song = Song::new("t", "very_normal_person", Key::new("C", "Ionian").unwrap(), 100);
        song.push_section("Chorus", TimeSignature::COMMON, 1, chords(&["D"]));
        let slot = ChordSlot { chord: "D".into(), start_tick: 0, duration_ticks: 512 };
        song.sections[0].chord_slots = vec![slot];
        let mut events = Vec::new();
        singer.replay(&StandardTheory, &song.sections[0], &cache, &mut events);
        // Up a whole step, twice as long; the stretched 8-tick note survives.
        assert_eq!(events, vec![NoteEvent::new(66, 0, 256, 80), NoteEvent::new(69, 256, 8, 80)]);
        assert_eq!(singer.last_pitch, Some(69));
    }

    #[test]
    fn test_forced_mode_changes_scale() {
        let lib = VocalProfileLibrary::default();
        let key = Key::new("A", "Aeolian").unwrap();
        let phrygian = vocal_scale(&key, lib.get("rgegnstmch").unwrap());
        assert!(phrygian.contains(&10)); // A# in A Phrygian
        assert_eq!(vocal_scale(&key, lib.get(DEFAULT_PROFILE).unwrap()), key.pitch_classes());
    }

    #[test]
    fn test_silent_when_no_section_is_vocal() {
        let mut song = Song::new("t", "very_normal_person", Key::new("D", "Dorian").unwrap(), 90);
        song.push_section("Intro", TimeSignature::COMMON, 4, chords(&["Dm", "G"]));
        song.push_section("Guitar Solo", TimeSignature::COMMON, 4, chords(&["Dm", "C"]));
        arranger::arrange_song(&mut song, &mut GameRng::new(1));
        let line = generate_vocal_line(
            &song,
            &StandardTheory,
            &VocalProfileLibrary::default(),
            &VocalConfig::default(),
            &mut GameRng::new(1),
        )
        .unwrap();
        assert!(line.events.is_empty());
    }

    #[test]
    fn test_start_offset_stays_inside_slot() {
        let lib = VocalProfileLibrary::default();
        let config = VocalConfig::default();
        let mut rng = GameRng::new(9);
        for profile in &lib.profiles {
            let singer = c_major_singer(profile, &config);
            for remaining in [8, 20, 64, 128, 512] {
                for _ in 0..50 {
                    let off = singer.start_offset(128, remaining, &mut rng);
                    let bound = remaining.max(MIN_EVENT_TICKS);
                    assert!(off < bound, "{} {off} {remaining}", profile.name);
                }
            }
        }
    }

    #[test]
    fn test_slot_fill_ends_with_empty_rhythm_tables() {
        let lib = VocalProfileLibrary::default();
        let mut profile = lib.get(DEFAULT_PROFILE).unwrap().clone();
        profile.note_durations.clear();
        profile.rests.clear();
        profile.accents = AccentRules {
            on_beat: 0.0,
            off_beat: 0.0,
            complex: 0.0,
            behind_beat: 0.0,
            ..AccentRules::default()
        };
        let config = VocalConfig { note_probability: 1.0, ..VocalConfig::default() };
        let mut singer = c_major_singer(&profile, &config);
        let song = song_with_choruses(4);
        let section = &song.sections[1];
        let slot = &section.chord_slots[0];
        let mut events = Vec::new();
        let mut rng = GameRng::new(4);
        let sung = singer.sing_slot(&StandardTheory, section, slot, &mut events, &mut rng);
        assert_eq!(sung.len(), events.len());
        assert!(events.len() <= fill_iteration_cap(slot.duration_ticks, MIN_EVENT_TICKS));
        assert!(is_non_overlapping(&events));
        let slot_end = section.start_tick + slot.end_tick();
        assert!(events.iter().all(|e| e.end_tick() <= slot_end));
    }

    #[test]
    fn test_first_pitch_prefers_scale_root() {
        let lib = VocalProfileLibrary::default();
        let config = VocalConfig::default();
        let profile = lib.get("rnm").unwrap();
        let singer = c_major_singer(profile, &config);
        // C major chord tones include C; rnm sits in octave 4.
        assert_eq!(singer.select_pitch(&[0, 4, 7], &mut GameRng::new(1)), 60);
    }
}
