// Drum fills: short hand-written bursts that replace a groove bar.
//
// Every fill is laid out on either a sixteenth or an eighth subdivision of
// the bar (picked from the fill's name) and ends with a crash, sometimes
// doubled by a kick, on the downbeat right after the fill bar.

use capric_prng::RandomSource;

use crate::drum_patterns::{Voice, humanize};
use crate::timeline::TimeSignature;

/// Names that all render as a four-snare group.
const SNARE_GROUP_NAMES: &[&str] = &[
    "heavy_44",
    "afro_cuban_12_8",
    "balkan_7_8",
    "syncopated_tom_roll",
    "triplet_splash_end",
    "syncopated_crash",
    "triplet_roll",
    "syncopated_tom_burst_9_8",
    "snare_group",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillKind {
    SimpleSnare44,
    SimpleSnare34,
    SimpleSnare24,
    BasicTom44,
    BasicTom34,
    LightSnareTap44,
    LightSnareTap68,
    GentleTom44,
    GentleTom34,
    GentleTom68,
    GentleTom128,
    Shuffle12,
    Odd54A,
    Odd58A,
    Odd54B,
    Odd78A,
    Hcs78,
    Odd78B,
    Odd98A,
    TripletTom98,
    SxpstlTom,
    ShortTom24,
    SnareGroup(&'static str),
    TwoSnare,
}

const FILL_NAMES: &[(FillKind, &str)] = &[
    (FillKind::SimpleSnare44, "simple_snare_44"),
    (FillKind::SimpleSnare34, "simple_snare_34"),
    (FillKind::SimpleSnare24, "simple_snare_24"),
    (FillKind::BasicTom44, "basic_tom_44"),
    (FillKind::BasicTom34, "basic_tom_34"),
    (FillKind::LightSnareTap44, "light_snare_tap_44"),
    (FillKind::LightSnareTap68, "light_snare_tap_68"),
    (FillKind::GentleTom44, "gentle_tom_44"),
    (FillKind::GentleTom34, "gentle_tom_34"),
    (FillKind::GentleTom68, "gentle_tom_68"),
    (FillKind::GentleTom128, "gentle_tom_12_8"),
    (FillKind::Shuffle12, "shuffle_12"),
    (FillKind::Odd54A, "odd_5_4_a"),
    (FillKind::Odd58A, "odd_5_8_a"),
    (FillKind::Odd54B, "odd_5_4_b"),
    (FillKind::Odd78A, "odd_7_8_a"),
    (FillKind::Hcs78, "hcs_7_8"),
    (FillKind::Odd78B, "odd_7_8_b"),
    (FillKind::Odd98A, "odd_9_8_a"),
    (FillKind::TripletTom98, "triplet_tom_9_8"),
    (FillKind::SxpstlTom, "sxpstl_tom"),
    (FillKind::ShortTom24, "short_tom_24"),
    (FillKind::TwoSnare, "two_snare"),
];

/// Used when no fill of a groove suits the meter.
pub const DEFAULT_FILL: FillKind = FillKind::SimpleSnare44;

impl FillKind {
    pub fn from_name(name: &str) -> Option<Self> {
        FILL_NAMES
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(k, _)| *k)
            .or_else(|| {
                SNARE_GROUP_NAMES
                    .iter()
                    .find(|n| **n == name)
                    .map(|n| FillKind::SnareGroup(*n))
            })
    }

    pub fn name(self) -> &'static str {
        if let FillKind::SnareGroup(name) = self {
            return name;
        }
        FILL_NAMES.iter().find(|(k, _)| *k == self).map_or("two_snare", |(_, n)| n)
    }

    /// Meter match by name: `44` for 4/4, `34` for 3/4, `68`/`12_8`/`shuffle`
    /// for any x/8, otherwise the literal `beats_unit`.
    pub fn suits(self, ts: TimeSignature) -> bool {
        let name = self.name();
        match (ts.beats, ts.beat_unit) {
            (4, 4) if name.contains("44") => true,
            (3, 4) if name.contains("34") => true,
            (_, 8) if ["68", "12_8", "shuffle"].iter().any(|t| name.contains(t)) => true,
            (b, u) => name.contains(&format!("{b}_{u}")),
        }
    }

    fn uses_eighths(self) -> bool {
        let name = self.name();
        let has = |tags: &[&str]| tags.iter().any(|t| name.contains(t));
        let sixteenths = has(&["44", "34", "24", "5_4"]) || self == FillKind::SxpstlTom;
        let eighths = has(&["68", "12_8", "7_8", "9_8", "5_8", "shuffle"]);
        !sixteenths && eighths
    }
}

/// Pick among the suitable fills, falling back to `DEFAULT_FILL`.
pub fn choose_fill<R: RandomSource>(
    fills: &[FillKind],
    ts: TimeSignature,
    rng: &mut R,
) -> FillKind {
    let suitable: Vec<FillKind> = fills.iter().copied().filter(|f| f.suits(ts)).collect();
    if suitable.is_empty() {
        DEFAULT_FILL
    } else {
        suitable[rng.range_usize(0, suitable.len())]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillHit {
    pub voice: Voice,
    pub start_tick: u32,
    pub duration_ticks: u32,
    pub velocity: u8,
}

struct FillWriter<'a, R> {
    bar_start: f64,
    steps: u32,
    step: f64,
    beat: f64,
    hits: Vec<FillHit>,
    rng: &'a mut R,
}

impl<R: RandomSource> FillWriter<'_, R> {
    fn at(&mut self, voice: Voice, ticks: f64, duration: f64, base: i32, range: i32) {
        let velocity = humanize(base, range, self.rng);
        self.hits.push(FillHit {
            voice,
            start_tick: (self.bar_start + ticks).round() as u32,
            duration_ticks: (duration.round() as u32).max(1),
            velocity,
        });
    }

    /// Hit on grid step `index`, one step long.
    fn step(&mut self, voice: Voice, index: u32, base: i32, range: i32) {
        let (offset, len) = (index as f64 * self.step, self.step);
        self.at(voice, offset, len, base, range);
    }

    /// Hits on the last `count` steps of the bar.
    fn tail(
        &mut self,
        count: u32,
        mut voice_velocity: impl FnMut(u32) -> (Voice, i32),
        range: i32,
    ) {
        for i in 0..count.min(self.steps) {
            let (voice, velocity) = voice_velocity(i + count.saturating_sub(self.steps));
            self.step(voice, self.steps - count.min(self.steps) + i, velocity, range);
        }
    }

    fn landing(&mut self, voice: Voice, base: i32, beats: f64) {
        let end = self.steps as f64 * self.step;
        let duration = self.beat * beats;
        self.at(voice, end, duration, base, 15);
    }
}

const TOMS_DOWN: [Voice; 4] = [Voice::TomHigh, Voice::TomMid, Voice::TomLow, Voice::TomFloor];
const GENTLE_TOMS: [Voice; 3] = [Voice::TomMid, Voice::TomLow, Voice::TomFloor];

/// Render `kind` over the bar starting at `bar_start`. Hits may fall on or
/// after the bar end; the caller drops anything past the song end.
pub fn render_fill<R: RandomSource>(
    kind: FillKind,
    bar_start: u32,
    ts: TimeSignature,
    rng: &mut R,
) -> Vec<FillHit> {
    let beat = ts.ticks_per_beat() as f64;
    let beats = ts.beats as u32;
    let (steps, step) = if kind.uses_eighths() {
        (beats * 2, beat / 2.0)
    } else {
        (beats * 4, beat / 4.0)
    };
    let mut w = FillWriter {
        bar_start: bar_start as f64,
        steps,
        step,
        beat,
        hits: Vec::new(),
        rng,
    };

    match kind {
        FillKind::SimpleSnare44 | FillKind::SimpleSnare34 | FillKind::SimpleSnare24 => {
            let count = match kind {
                FillKind::SimpleSnare34 => 3,
                FillKind::SimpleSnare24 => 2,
                _ => 4,
            };
            if steps >= count {
                w.tail(count, |i| (Voice::Snare, 85 + i as i32 * 7), 5);
            }
            w.landing(Voice::Crash, 110, 1.0);
            w.landing(Voice::Kick, 100, 1.0);
        }
        FillKind::BasicTom44 | FillKind::BasicTom34 => {
            let count = if kind == FillKind::BasicTom34 { 3 } else { 4 };
            w.tail(count, |i| (TOMS_DOWN[i as usize % TOMS_DOWN.len()], 90 + i as i32 * 5), 15);
            w.landing(Voice::Crash, 115, 1.0);
            w.landing(Voice::Kick, 105, 1.0);
        }
        FillKind::LightSnareTap44 | FillKind::LightSnareTap68 => {
            if steps >= 4 {
                w.step(Voice::Snare, steps - 4, 60, 15);
                w.step(Voice::Snare, steps - 2, 70, 15);
            }
            w.landing(Voice::Crash, 90, 1.0);
        }
        FillKind::GentleTom44
        | FillKind::GentleTom34
        | FillKind::GentleTom68
        | FillKind::GentleTom128 => {
            let compound = matches!(kind, FillKind::GentleTom68 | FillKind::GentleTom128);
            let count = if kind == FillKind::GentleTom128 { 3 } else { 2 };
            let (per_hit, length) = if compound { (1, step * 1.5) } else { (2, step * 2.0) };
            for i in 0..count {
                if let Some(at) = steps.checked_sub((count - i) * per_hit) {
                    let voice = GENTLE_TOMS[i as usize % GENTLE_TOMS.len()];
                    w.at(voice, at as f64 * step, length, 75 + i as i32 * 3, 15);
                }
            }
            w.landing(Voice::Crash, 95, 1.0);
        }
        FillKind::Shuffle12 => {
            // Triplet snares across the final beat, or across the final
            // dotted-quarter pulse in compound meters.
            let bar = ts.ticks_per_bar() as f64;
            let pulse = if ts.is_compound() { beat * 3.0 } else { beat };
            let sub = pulse / 3.0;
            for (i, velocity) in [80, 90, 100].into_iter().enumerate() {
                w.at(Voice::Snare, bar - pulse + i as f64 * sub, sub, velocity, 15);
            }
            w.at(Voice::Crash, bar, beat * 1.5, 110, 15);
            w.at(Voice::Kick, bar, beat * 1.5, 100, 15);
        }
        FillKind::Odd54A | FillKind::Odd58A => {
            let count = if kind == FillKind::Odd54A { 5 } else { 3 };
            w.tail(count, |i| (Voice::Snare, 80 + i as i32 * 5), 15);
            w.landing(Voice::Crash, 110, 1.0);
        }
        FillKind::Odd54B => {
            if steps >= 5 {
                let run = [
                    (Voice::Kick, 90),
                    (Voice::TomMid, 95),
                    (Voice::TomFloor, 100),
                    (Voice::Snare, 105),
                    (Voice::Snare, 110),
                ];
                w.tail(5, |i| run[i as usize], 15);
            }
            w.landing(Voice::Crash, 110, 1.0);
        }
        FillKind::Odd78A | FillKind::Hcs78 => {
            w.tail(
                4,
                |i| (if i % 2 == 0 { Voice::TomMid } else { Voice::Snare }, 85 + i as i32 * 4),
                15,
            );
            w.landing(Voice::Crash, 110, 1.0);
        }
        FillKind::Odd78B => {
            w.tail(
                6,
                |i| (if i < 3 { Voice::Snare } else { Voice::TomHigh }, 90 + i as i32 * 3),
                15,
            );
            w.landing(Voice::Crash, 112, 1.0);
        }
        FillKind::Odd98A => {
            for group in 0..2u32 {
                let Some(first) = steps.checked_sub(6 - group * 3) else {
                    continue;
                };
                let run = [(Voice::TomHigh, 85), (Voice::TomMid, 90), (Voice::Snare, 95)];
                for (j, (voice, velocity)) in run.into_iter().enumerate() {
                    if first + (j as u32) < steps {
                        w.step(voice, first + j as u32, velocity, 15);
                    }
                }
            }
            w.landing(Voice::Crash, 110, 1.5);
        }
        FillKind::TripletTom98 => {
            let toms = [Voice::TomHigh, Voice::TomMid, Voice::TomFloor];
            w.tail(3, |i| (toms[i as usize], 90 + i as i32 * 5), 15);
            w.landing(Voice::Crash, 115, 1.5);
        }
        FillKind::SxpstlTom => {
            let pattern = [
                (Voice::TomHigh, 0, 92),
                (Voice::TomHigh, 4, 92),
                (Voice::TomMid, 8, 94),
                (Voice::TomFloor, 12, 96),
                (Voice::Snare, 15, 100),
            ];
            for (voice, index, velocity) in pattern {
                if index < steps {
                    w.step(voice, index, velocity, 15);
                }
            }
            w.landing(Voice::Crash, 110, 1.0);
        }
        FillKind::ShortTom24 => {
            if steps >= 2 {
                w.step(Voice::TomHigh, steps - 2, 90, 15);
                w.step(Voice::TomMid, steps - 1, 95, 15);
            }
            w.landing(Voice::Crash, 100, 1.0);
        }
        FillKind::SnareGroup(_) => {
            w.tail(4, |i| (Voice::Snare, 85 + i as i32 * 5), 15);
            w.landing(Voice::Crash, 105, 1.0);
        }
        FillKind::TwoSnare => {
            w.tail(2, |i| (Voice::Snare, 90 + i as i32 * 10), 15);
            w.landing(Voice::Crash, 110, 1.0);
            w.landing(Voice::Kick, 100, 1.0);
        }
    }
    w.hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use capric_prng::GameRng;

    fn starts(hits: &[FillHit], voice: Voice) -> Vec<u32> {
        hits.iter().filter(|h| h.voice == voice).map(|h| h.start_tick).collect()
    }

    #[test]
    fn test_names_resolve_both_ways() {
        for (kind, name) in FILL_NAMES {
            assert_eq!(FillKind::from_name(name), Some(*kind));
            assert_eq!(kind.name(), *name);
        }
        assert_eq!(FillKind::from_name("heavy_44"), Some(FillKind::SnareGroup("heavy_44")));
        assert_eq!(FillKind::from_name("drum_solo"), None);
    }

    #[test]
    fn test_meter_matching() {
        let common = TimeSignature::COMMON;
        assert!(FillKind::SimpleSnare44.suits(common));
        assert!(FillKind::SnareGroup("heavy_44").suits(common));
        assert!(!FillKind::Shuffle12.suits(common));
        assert!(FillKind::Shuffle12.suits(TimeSignature::new(12, 8)));
        assert!(FillKind::GentleTom68.suits(TimeSignature::new(9, 8)));
        assert!(FillKind::Odd54A.suits(TimeSignature::new(5, 4)));
        assert!(FillKind::Hcs78.suits(TimeSignature::new(7, 8)));
        assert!(!FillKind::Hcs78.suits(TimeSignature::new(5, 4)));
        assert!(!FillKind::SxpstlTom.suits(common));
    }

    #[test]
    fn test_choose_fill_falls_back_to_default() {
        let mut rng = GameRng::new(4);
        let odd = [FillKind::Hcs78, FillKind::Odd58A];
        let pick = choose_fill(&odd, TimeSignature::COMMON, &mut rng);
        assert_eq!(pick, DEFAULT_FILL);
        assert_eq!(choose_fill(&[], TimeSignature::new(3, 4), &mut rng), DEFAULT_FILL);
        let pick = choose_fill(&odd, TimeSignature::new(7, 8), &mut rng);
        assert_eq!(pick, FillKind::Hcs78);
    }

    #[test]
    fn test_simple_snare_44_layout() {
        let mut rng = GameRng::new(1);
        let hits = render_fill(FillKind::SimpleSnare44, 1024, TimeSignature::COMMON, &mut rng);
        let snares = starts(&hits, Voice::Snare);
        assert_eq!(snares, vec![1024 + 384, 1024 + 416, 1024 + 448, 1024 + 480]);
        let crash = hits.iter().find(|h| h.voice == Voice::Crash).unwrap();
        assert_eq!((crash.start_tick, crash.duration_ticks), (2048, 128));
        assert!(hits.iter().any(|h| h.voice == Voice::Kick && h.start_tick == 2048));
    }

    #[test]
    fn test_shuffle_triplets_in_compound_meter() {
        let ts = TimeSignature::new(12, 8);
        let hits = render_fill(FillKind::Shuffle12, 0, ts, &mut GameRng::new(2));
        let snares = starts(&hits, Voice::Snare);
        // 12/8 bar is 768 ticks; final dotted quarter starts at 576.
        assert_eq!(snares, vec![576, 640, 704]);
        assert!(hits.iter().any(|h| h.voice == Voice::Crash && h.start_tick == 768));
    }

    #[test]
    fn test_every_fill_lands_on_next_downbeat() {
        let meters = [(4, 4), (3, 4), (2, 4), (5, 4), (6, 8), (7, 8), (9, 8), (12, 8), (5, 8)];
        let mut rng = GameRng::new(9);
        let mut kinds: Vec<FillKind> = FILL_NAMES.iter().map(|(k, _)| *k).collect();
        kinds.extend(SNARE_GROUP_NAMES.iter().map(|n| FillKind::SnareGroup(*n)));
        for (b, u) in meters {
            let ts = TimeSignature::new(b, u);
            for kind in &kinds {
                let hits = render_fill(*kind, 0, ts, &mut rng);
                let crash = hits.iter().find(|h| h.voice == Voice::Crash).unwrap();
                assert_eq!(crash.start_tick, ts.ticks_per_bar(), "{} in {ts}", kind.name());
                for h in hits.iter().filter(|h| h.voice != Voice::Crash && h.voice != Voice::Kick) {
                    assert!(h.start_tick < ts.ticks_per_bar(), "{} in {ts}", kind.name());
                }
                assert!(hits.iter().all(|h| h.velocity >= 1 && h.velocity <= 127));
            }
        }
    }
}
