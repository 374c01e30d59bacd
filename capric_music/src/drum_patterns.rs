// Drum groove library: the GM drum map, groove step grids, and the named
// variations that rewrite a bar's grid before it is rendered.
//
// A groove is defined on a per-bar grid of `grid` equal steps. Each step
// lists hits; a `Voice::Timing` hit is a placeholder resolved at render time
// to whichever timing instrument (closed hi-hat or ride) the drum generator
// currently favors.
//
// Grooves are written as `GrooveDef`s, the same serde shape the JSON loader
// accepts, and then resolved into `Groove`s. Resolution rejects unknown
// variation and fill names and steps outside the grid, and inserts default
// timing hits into grooves that have no hi-hat or ride of their own.

use std::path::Path;

use capric_prng::RandomSource;
use serde::{Deserialize, Serialize};

use crate::drum_fills::FillKind;
use crate::error::{CompositionError, Result};
use crate::timeline::TimeSignature;

/// Drum voices, mapped to General MIDI percussion notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Voice {
    Kick,
    CrossStick,
    Snare,
    Clap,
    Rim,
    TomFloor,
    ClosedHat,
    TomLow,
    FootHat,
    TomMid,
    OpenHat,
    TomHighMid,
    TomHigh,
    Crash,
    TomHigh2,
    Ride,
    China,
    RideBell,
    Tambourine,
    Splash,
    Cowbell,
    Crash2,
    RideEdge,
    /// Resolved at render time to the current timing instrument.
    Timing,
}

impl Voice {
    pub fn note(self) -> Option<u8> {
        Some(match self {
            Voice::Kick => 36,
            Voice::CrossStick => 37,
            Voice::Snare => 38,
            Voice::Clap => 39,
            Voice::Rim => 40,
            Voice::TomFloor => 41,
            Voice::ClosedHat => 42,
            Voice::TomLow => 43,
            Voice::FootHat => 44,
            Voice::TomMid => 45,
            Voice::OpenHat => 46,
            Voice::TomHighMid => 47,
            Voice::TomHigh => 48,
            Voice::Crash => 49,
            Voice::TomHigh2 => 50,
            Voice::Ride => 51,
            Voice::China => 52,
            Voice::RideBell => 53,
            Voice::Tambourine => 54,
            Voice::Splash => 55,
            Voice::Cowbell => 56,
            Voice::Crash2 => 57,
            Voice::RideEdge => 59,
            Voice::Timing => return None,
        })
    }

    fn is_timekeeper(self) -> bool {
        matches!(
            self,
            Voice::ClosedHat
                | Voice::OpenHat
                | Voice::FootHat
                | Voice::Ride
                | Voice::RideBell
                | Voice::RideEdge
        )
    }
}

/// Add bounded jitter to a velocity: `base + [0, range] - range / 2`,
/// clamped to 1..=127.
pub fn humanize<R: RandomSource>(base: i32, range: i32, rng: &mut R) -> u8 {
    let jitter = rng.range_i32_inclusive(0, range.max(0)) - range.max(0) / 2;
    (base + jitter).clamp(1, 127) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hit {
    pub voice: Voice,
    pub velocity: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrooveStep {
    pub step: u32,
    pub hits: Vec<Hit>,
}

/// Step list for one bar, kept sorted by step.
pub type StepGrid = Vec<GrooveStep>;

fn step_entry(grid: &mut StepGrid, step: u32) -> &mut GrooveStep {
    let idx = match grid.binary_search_by_key(&step, |s| s.step) {
        Ok(i) => i,
        Err(i) => {
            grid.insert(i, GrooveStep { step, hits: Vec::new() });
            i
        }
    };
    &mut grid[idx]
}

fn has_voice(grid: &StepGrid, step: u32, voice: Voice) -> bool {
    grid.iter()
        .any(|s| s.step == step && s.hits.iter().any(|h| h.voice == voice))
}

/// Named transforms of a bar's step grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum VariationKind {
    GhostSnare,
    OpenHatEnd,
    RideBellAccent,
    CowbellAccents,
    CrossStick,
    LessCowbell,
    SnareDelay,
    CrashInsteadOfSnare,
    RideOverlay,
    RideInsteadOfHat,
    AddSyncopatedKick,
    CrashOnOne,
    SnareOnTwoAndFour,
    OpenHatOffbeats,
    RideLead,
    SoftKick,
    GhostSnareShuffle,
    GhostSnare24,
    RideBellAccents54,
    SnareOnSeventh98,
}

const VARIATION_NAMES: &[(VariationKind, &str)] = &[
    (VariationKind::GhostSnare, "ghost_snare"),
    (VariationKind::OpenHatEnd, "open_hat_end"),
    (VariationKind::RideBellAccent, "ride_bell_accent"),
    (VariationKind::CowbellAccents, "cowbell_accents"),
    (VariationKind::CrossStick, "cross_stick"),
    (VariationKind::LessCowbell, "less_cowbell"),
    (VariationKind::SnareDelay, "snare_delay"),
    (VariationKind::CrashInsteadOfSnare, "crash_instead_of_snare"),
    (VariationKind::RideOverlay, "ride_overlay"),
    (VariationKind::RideInsteadOfHat, "ride_instead_of_hat"),
    (VariationKind::AddSyncopatedKick, "add_syncopated_kick"),
    (VariationKind::CrashOnOne, "crash_on_one"),
    (VariationKind::SnareOnTwoAndFour, "snare_on_two_and_four"),
    (VariationKind::OpenHatOffbeats, "open_hat_offbeats"),
    (VariationKind::RideLead, "ride_lead"),
    (VariationKind::SoftKick, "soft_kick"),
    (VariationKind::GhostSnareShuffle, "ghost_snare_shuffle"),
    (VariationKind::GhostSnare24, "ghost_snare_2_4"),
    (VariationKind::RideBellAccents54, "ride_bell_accents_5_4"),
    (VariationKind::SnareOnSeventh98, "snare_on_seventh_9_8"),
];

impl VariationKind {
    pub fn from_name(name: &str) -> Option<Self> {
        VARIATION_NAMES.iter().find(|(_, n)| *n == name).map(|(k, _)| *k)
    }

    pub fn name(self) -> &'static str {
        VARIATION_NAMES
            .iter()
            .find(|(k, _)| *k == self)
            .map_or("unknown", |(_, n)| n)
    }
}

impl TryFrom<String> for VariationKind {
    type Error = CompositionError;

    fn try_from(name: String) -> Result<Self> {
        Self::from_name(&name).ok_or_else(|| {
            CompositionError::InvalidPatternLibrary(format!("unknown variation '{name}'"))
        })
    }
}

impl From<VariationKind> for String {
    fn from(kind: VariationKind) -> String {
        kind.name().to_string()
    }
}

/// What a variation needs to know about the bar it rewrites.
#[derive(Debug, Clone, Copy)]
pub struct VariationContext {
    pub grid: u32,
    pub beats: u32,
    pub can_use_ride: bool,
    pub ride_velocity: u8,
    /// Closed hi-hat or ride.
    pub timing: Voice,
    pub timing_velocity: u8,
}

impl VariationContext {
    fn steps_per_beat(&self) -> u32 {
        (self.grid / self.beats.max(1)).max(1)
    }
}

impl VariationKind {
    /// Rewrite `grid` in place. Steps the groove does not have are created
    /// only by variations that add hits.
    pub fn apply<R: RandomSource>(self, grid: &mut StepGrid, ctx: &VariationContext, rng: &mut R) {
        let is_timing = |h: &Hit| h.voice == Voice::Timing || h.voice == ctx.timing;
        match self {
            VariationKind::GhostSnare => {
                let free: Vec<u32> = (0..ctx.grid)
                    .filter(|s| s % 2 == 1 && !has_voice(grid, *s, Voice::Snare))
                    .collect();
                if !free.is_empty() {
                    let step = free[rng.range_usize(0, free.len())];
                    let velocity = humanize(35, 10, rng);
                    step_entry(grid, step).hits.push(Hit { voice: Voice::Snare, velocity });
                }
            }
            VariationKind::OpenHatEnd => {
                let velocity = humanize(ctx.timing_velocity as i32 + 10, 5, rng);
                if let Some(last) = grid.iter_mut().rev().find(|s| s.hits.iter().any(is_timing)) {
                    last.hits.retain(|h| !is_timing(h));
                    last.hits.push(Hit { voice: Voice::OpenHat, velocity });
                }
            }
            VariationKind::RideBellAccent => {
                let ride_timing = ctx.can_use_ride && ctx.timing == Voice::Ride;
                let is_ride =
                    |h: &Hit| h.voice == Voice::Ride || (ride_timing && h.voice == Voice::Timing);
                let rides: Vec<usize> = (0..grid.len())
                    .filter(|i| grid[*i].hits.iter().any(is_ride))
                    .collect();
                if !rides.is_empty() {
                    let idx = rides[rng.range_usize(0, rides.len())];
                    let velocity = humanize(ctx.ride_velocity as i32 + 15, 5, rng);
                    grid[idx].hits.retain(|h| !is_ride(h));
                    grid[idx].hits.push(Hit { voice: Voice::RideBell, velocity });
                }
            }
            VariationKind::CowbellAccents => {
                for step in [0, ctx.grid / 2] {
                    let velocity = humanize(80, 5, rng);
                    step_entry(grid, step).hits.push(Hit { voice: Voice::Cowbell, velocity });
                }
            }
            VariationKind::LessCowbell => {
                for s in grid.iter_mut() {
                    let mut keep = Vec::with_capacity(s.hits.len());
                    for h in &s.hits {
                        if h.voice != Voice::Cowbell || rng.random_bool(0.5) {
                            keep.push(*h);
                        }
                    }
                    s.hits = keep;
                }
            }
            VariationKind::CrossStick => {
                let snares: Vec<usize> = (0..grid.len())
                    .filter(|i| grid[*i].hits.iter().any(|h| h.voice == Voice::Snare))
                    .collect();
                if !snares.is_empty() {
                    let idx = snares[rng.range_usize(0, snares.len())];
                    let base = grid[idx]
                        .hits
                        .iter()
                        .find(|h| h.voice == Voice::Snare)
                        .map_or(100, |h| h.velocity as i32);
                    let velocity = humanize(base, 5, rng);
                    grid[idx].hits.retain(|h| h.voice != Voice::Snare);
                    grid[idx].hits.push(Hit { voice: Voice::CrossStick, velocity });
                }
            }
            VariationKind::SnareDelay => {
                if let Some((step, hit)) = nth_hit(grid, Voice::Snare, 1)
                    && step + 1 < ctx.grid
                {
                    remove_hit(grid, step, Voice::Snare);
                    step_entry(grid, step + 1).hits.push(hit);
                }
            }
            VariationKind::CrashInsteadOfSnare => {
                if let Some((step, hit)) = nth_hit(grid, Voice::Snare, 1) {
                    remove_hit(grid, step, Voice::Snare);
                    let crash = Hit { voice: Voice::Crash, velocity: hit.velocity };
                    step_entry(grid, step).hits.push(crash);
                }
            }
            VariationKind::RideOverlay => {
                // One ride per beat unit on top of the existing pattern.
                let every = (ctx.grid / ctx.beats.max(1)).max(1);
                for step in (0..ctx.grid).step_by(every as usize) {
                    if !has_voice(grid, step, Voice::Ride) {
                        let velocity = humanize(ctx.ride_velocity as i32, 5, rng);
                        step_entry(grid, step).hits.push(Hit { voice: Voice::Ride, velocity });
                    }
                }
            }
            VariationKind::RideInsteadOfHat => {
                for s in grid.iter_mut() {
                    for h in s.hits.iter_mut() {
                        if matches!(h.voice, Voice::Timing | Voice::ClosedHat) {
                            *h = Hit { voice: Voice::Ride, velocity: ctx.ride_velocity };
                        }
                    }
                }
            }
            VariationKind::AddSyncopatedKick => {
                let step = if ctx.beats == 3 {
                    5
                } else if rng.random_bool(0.5) {
                    7
                } else {
                    14
                };
                if step < ctx.grid && !has_voice(grid, step, Voice::Kick) {
                    step_entry(grid, step).hits.push(Hit { voice: Voice::Kick, velocity: 85 });
                }
            }
            VariationKind::CrashOnOne => {
                step_entry(grid, 0).hits.push(Hit { voice: Voice::Crash, velocity: 100 });
            }
            VariationKind::SnareOnTwoAndFour => {
                let spb = ctx.steps_per_beat();
                for step in [spb, spb * 3] {
                    if step < ctx.grid {
                        step_entry(grid, step).hits.push(Hit { voice: Voice::Snare, velocity: 90 });
                    }
                }
            }
            VariationKind::OpenHatOffbeats => {
                let spb = ctx.steps_per_beat();
                let half = (spb / 2).max(1);
                for s in grid.iter_mut().filter(|s| s.step % spb == half) {
                    if s.hits.iter().any(|h| h.voice == Voice::Timing) {
                        s.hits.retain(|h| h.voice != Voice::Timing);
                        let velocity = humanize(ctx.timing_velocity as i32, 5, rng);
                        s.hits.push(Hit { voice: Voice::OpenHat, velocity });
                    }
                }
            }
            VariationKind::RideLead => {
                for s in grid.iter_mut() {
                    for h in s.hits.iter_mut().filter(|h| h.voice == Voice::Timing) {
                        let velocity = humanize(ctx.ride_velocity as i32, 5, rng);
                        *h = Hit { voice: Voice::Ride, velocity };
                    }
                }
            }
            VariationKind::SoftKick => {
                if let Some(h) = grid
                    .iter_mut()
                    .find(|s| s.step == 0)
                    .and_then(|s| s.hits.iter_mut().find(|h| h.voice == Voice::Kick))
                {
                    h.velocity = 70;
                }
            }
            VariationKind::GhostSnareShuffle => {
                let options: Vec<u32> =
                    [2, 5, 8, 11].into_iter().filter(|s| *s < ctx.grid).collect();
                if !options.is_empty() {
                    let step = options[rng.range_usize(0, options.len())];
                    if !has_voice(grid, step, Voice::Snare) {
                        step_entry(grid, step).hits.push(Hit { voice: Voice::Snare, velocity: 30 });
                    }
                }
            }
            VariationKind::GhostSnare24 => {
                for s in grid.iter_mut().filter(|s| s.step == 1 || s.step == 5) {
                    s.hits.push(Hit { voice: Voice::Snare, velocity: 30 });
                }
            }
            VariationKind::RideBellAccents54 => {
                let velocity = humanize(ctx.ride_velocity as i32 + 10, 5, rng);
                for s in grid.iter_mut().filter(|s| matches!(s.step, 0 | 8 | 12)) {
                    if s.hits.iter().any(|h| h.voice == Voice::Timing) {
                        s.hits.retain(|h| h.voice != Voice::Timing);
                        s.hits.push(Hit { voice: Voice::RideBell, velocity });
                    }
                }
            }
            VariationKind::SnareOnSeventh98 => {
                if let Some(s) = grid.iter_mut().find(|s| s.step == 6) {
                    s.hits.retain(|h| h.voice != Voice::Kick);
                    s.hits.push(Hit { voice: Voice::Snare, velocity: 92 });
                }
            }
        }
    }
}

/// The `n`th (0-based) step holding `voice`, with that hit.
fn nth_hit(grid: &StepGrid, voice: Voice, n: usize) -> Option<(u32, Hit)> {
    grid.iter()
        .filter_map(|s| s.hits.iter().find(|h| h.voice == voice).map(|h| (s.step, *h)))
        .nth(n)
}

fn remove_hit(grid: &mut StepGrid, step: u32, voice: Voice) {
    if let Some(s) = grid.iter_mut().find(|s| s.step == step) {
        s.hits.retain(|h| h.voice != voice);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Variation {
    pub kind: VariationKind,
    pub probability: f64,
}

/// A resolved groove, ready for the drum generator.
#[derive(Debug, Clone, PartialEq)]
pub struct Groove {
    pub name: String,
    pub time_signature: TimeSignature,
    pub grid: u32,
    pub weight: u32,
    pub can_use_ride: bool,
    pub shuffle: bool,
    pub hat_velocity: u8,
    pub ride_velocity: u8,
    pub moods: Vec<String>,
    pub steps: StepGrid,
    pub variations: Vec<Variation>,
    pub fills: Vec<FillKind>,
}

impl Groove {
    pub fn suits_mood(&self, mood: &str) -> bool {
        self.moods.iter().any(|m| m == "any" || m == mood)
    }

    /// Extra delay for swung steps: half a grid step on the middle triplet
    /// of each beat when the grid divides beats into threes or sixes.
    pub fn swing_delay(&self, step: u32, ticks_per_step: f64) -> f64 {
        if !self.shuffle {
            return 0.0;
        }
        let per_beat = self.grid / self.time_signature.beats.max(1) as u32;
        let within = step % per_beat.max(1);
        let swung = match per_beat {
            3 => within == 1,
            6 => within == 1 || within == 4,
            _ => false,
        };
        if swung { ticks_per_step / 2.0 } else { 0.0 }
    }
}

/// One instrument line of a groove definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    pub voice: Voice,
    pub steps: Vec<u32>,
    #[serde(default = "default_part_velocity")]
    pub velocity: u8,
}

fn default_part_velocity() -> u8 {
    80
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariationDef {
    pub name: String,
    pub probability: f64,
}

/// Serde shape of a groove, as written in library JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrooveDef {
    pub name: String,
    pub time_signature: TimeSignature,
    pub grid: u32,
    #[serde(default = "default_weight")]
    pub weight: u32,
    /// Derived from the parts when absent.
    #[serde(default)]
    pub can_use_ride: Option<bool>,
    /// Compound meters swing by default.
    #[serde(default)]
    pub shuffle: Option<bool>,
    #[serde(default)]
    pub hat_velocity: Option<u8>,
    #[serde(default)]
    pub ride_velocity: Option<u8>,
    #[serde(default = "any_mood")]
    pub moods: Vec<String>,
    pub parts: Vec<Part>,
    #[serde(default)]
    pub variations: Vec<VariationDef>,
    #[serde(default)]
    pub fills: Vec<String>,
}

fn default_weight() -> u32 {
    5
}

fn any_mood() -> Vec<String> {
    vec!["any".to_string()]
}

impl GrooveDef {
    pub fn resolve(self) -> Result<Groove> {
        let bad = |msg: String| {
            CompositionError::InvalidPatternLibrary(format!("groove '{}': {msg}", self.name))
        };
        let ts = self.time_signature;
        if self.grid == 0 || ts.beats == 0 {
            return Err(bad("grid and meter must be non-zero".into()));
        }

        let mut steps = StepGrid::new();
        for part in &self.parts {
            for &step in &part.steps {
                if step >= self.grid {
                    return Err(bad(format!("step {step} outside grid of {}", self.grid)));
                }
                let hit = Hit { voice: part.voice, velocity: part.velocity };
                step_entry(&mut steps, step).hits.push(hit);
            }
        }

        let explicit_timing = self
            .parts
            .iter()
            .any(|p| p.voice.is_timekeeper() || p.voice == Voice::Timing);
        let has_backbeat = self
            .parts
            .iter()
            .any(|p| matches!(p.voice, Voice::Kick | Voice::Snare));
        if !explicit_timing && has_backbeat {
            let increment = timing_increment(self.grid, ts);
            for step in (0..self.grid).step_by(increment as usize) {
                step_entry(&mut steps, step).hits.push(Hit { voice: Voice::Timing, velocity: 0 });
            }
        }

        let mut variations = Vec::with_capacity(self.variations.len());
        for v in &self.variations {
            let kind = VariationKind::from_name(&v.name)
                .ok_or_else(|| bad(format!("unknown variation '{}'", v.name)))?;
            if !(0.0..=1.0).contains(&v.probability) {
                return Err(bad(format!("variation '{}' probability {}", v.name, v.probability)));
            }
            variations.push(Variation { kind, probability: v.probability });
        }
        let mut fills = Vec::with_capacity(self.fills.len());
        for name in &self.fills {
            let fill =
                FillKind::from_name(name).ok_or_else(|| bad(format!("unknown fill '{name}'")))?;
            fills.push(fill);
        }

        let velocity_of = |voices: &[Voice]| {
            self.parts
                .iter()
                .find(|p| voices.contains(&p.voice))
                .map(|p| p.velocity)
        };
        let can_use_ride = self.can_use_ride.unwrap_or_else(|| {
            self.parts
                .iter()
                .any(|p| matches!(p.voice, Voice::Ride | Voice::RideBell | Voice::RideEdge))
        });
        let shuffle = self
            .shuffle
            .unwrap_or(ts.beat_unit == 8 && matches!(ts.beats, 6 | 9 | 12));
        let hat_velocity = self
            .hat_velocity
            .or_else(|| velocity_of(&[Voice::ClosedHat, Voice::OpenHat]))
            .unwrap_or(70);
        let ride_velocity = self
            .ride_velocity
            .or_else(|| velocity_of(&[Voice::Ride]))
            .unwrap_or(75);

        Ok(Groove {
            name: self.name,
            time_signature: ts,
            grid: self.grid,
            weight: self.weight,
            can_use_ride,
            shuffle,
            hat_velocity,
            ride_velocity,
            moods: self.moods,
            steps,
            variations,
            fills,
        })
    }
}

/// Spacing of default timing hits: eighths when the grid allows it, then
/// beats, else a density estimate.
fn timing_increment(grid: u32, ts: TimeSignature) -> u32 {
    let beats = ts.beats as u32;
    if grid % (beats * 2) == 0 {
        grid / (beats * 2)
    } else if grid % beats == 0 {
        grid / beats
    } else {
        let per_beat = if ts.beat_unit == 8 { 1 } else { 2 };
        (grid / (beats * per_beat * 2)).max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GrooveLibrary {
    pub grooves: Vec<Groove>,
}

impl GrooveLibrary {
    pub fn from_defs(defs: Vec<GrooveDef>) -> Result<Self> {
        let grooves = defs.into_iter().map(GrooveDef::resolve).collect::<Result<Vec<_>>>()?;
        Ok(Self { grooves })
    }

    pub fn builtin() -> Result<Self> {
        Self::from_defs(builtin_defs())
    }

    /// Load a JSON array of groove definitions.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let defs: Vec<GrooveDef> = serde_json::from_str(&json)?;
        Self::from_defs(defs)
    }

    pub fn get(&self, name: &str) -> Option<&Groove> {
        self.grooves.iter().find(|g| g.name == name)
    }

    /// Grooves in this meter that suit the mood, with their weights.
    pub fn candidates(&self, ts: TimeSignature, mood: &str) -> Vec<(&Groove, u32)> {
        self.grooves
            .iter()
            .filter(|g| g.time_signature == ts && g.suits_mood(mood))
            .map(|g| (g, g.weight.max(1)))
            .collect()
    }

    /// BasicRock44, else any 4/4 groove, else the first.
    pub fn fallback(&self) -> Option<&Groove> {
        self.get("BasicRock44")
            .or_else(|| self.grooves.iter().find(|g| g.time_signature == TimeSignature::COMMON))
            .or_else(|| self.grooves.first())
    }
}

fn part(voice: Voice, steps: &[u32], velocity: u8) -> Part {
    Part { voice, steps: steps.to_vec(), velocity }
}

fn timing(steps: &[u32]) -> Part {
    part(Voice::Timing, steps, 0)
}

#[allow(clippy::too_many_arguments)]
fn def(
    name: &str,
    ts: (u8, u8),
    grid: u32,
    weight: u32,
    moods: &[&str],
    parts: Vec<Part>,
    variations: &[(&str, f64)],
    fills: &[&str],
) -> GrooveDef {
    GrooveDef {
        name: name.to_string(),
        time_signature: TimeSignature::new(ts.0, ts.1),
        grid,
        weight,
        can_use_ride: None,
        shuffle: None,
        hat_velocity: None,
        ride_velocity: None,
        moods: moods.iter().map(|m| m.to_string()).collect(),
        parts,
        variations: variations
            .iter()
            .map(|(n, p)| VariationDef { name: n.to_string(), probability: *p })
            .collect(),
        fills: fills.iter().map(|f| f.to_string()).collect(),
    }
}

use Voice::*;

/// The stock library: thirteen compact grooves modeled on well-known
/// records plus eight general-purpose ones.
pub fn builtin_defs() -> Vec<GrooveDef> {
    let eighth_pulse = |n: u32| -> Vec<u32> { (0..n).step_by(2).collect() };
    let mut defs = vec![
        GrooveDef {
            can_use_ride: Some(true),
            shuffle: Some(false),
            ..def(
                "sting_seven_days_5_8",
                (5, 8),
                10,
                8,
                &["malinconico_introspettivo", "very_normal_person", "etereo_sognante"],
                vec![
                    part(Kick, &[0, 4, 7], 100),
                    part(Snare, &[5, 9], 110),
                    part(ClosedHat, &[1, 3, 5, 7, 9], 85),
                ],
                &[("ghost_snare", 0.2)],
                &["odd_5_8_a", "syncopated_tom_roll"],
            )
        },
        GrooveDef {
            can_use_ride: Some(true),
            shuffle: Some(false),
            ..def(
                "brubeck_blue_rondo_9_8",
                (9, 8),
                18,
                7,
                &["sperimentale_astratto", "ansioso_distopico"],
                vec![
                    part(Kick, &[0, 4, 8, 12], 95),
                    part(Snare, &[6, 14], 105),
                    part(ClosedHat, &eighth_pulse(18), 80),
                ],
                &[("ride_bell_accent", 0.15)],
                &["odd_9_8_a", "syncopated_crash"],
            )
        },
        GrooveDef {
            shuffle: Some(true),
            ..def(
                "afro_cuban_12_8",
                (12, 8),
                24,
                6,
                &["etereo_sognante", "sperimentale_astratto"],
                vec![
                    part(Kick, &[0, 6, 12, 18], 90),
                    part(Snare, &[9, 21], 100),
                    part(Ride, &[0, 4, 8, 12, 16, 20], 85),
                    part(Cowbell, &[0, 3, 6, 9, 12, 15, 18, 21], 70),
                ],
                &[("less_cowbell", 0.3)],
                &["afro_cuban_12_8", "triplet_splash_end"],
            )
        },
        GrooveDef {
            can_use_ride: Some(false),
            shuffle: Some(false),
            ..def(
                "balkan_7_8_dance",
                (7, 8),
                14,
                7,
                &["sperimentale_astratto", "arrabbiato_critico"],
                vec![
                    part(Kick, &[0, 3, 6, 9], 100),
                    part(Snare, &[5, 11], 110),
                    part(ClosedHat, &(0..14).collect::<Vec<_>>(), 90),
                ],
                &[("open_hat_end", 0.25)],
                &["balkan_7_8", "syncopated_tom_roll"],
            )
        },
        GrooveDef {
            shuffle: Some(true),
            ..def(
                "triplet_blues_6_8_swing",
                (6, 8),
                12,
                6,
                &["malinconico_introspettivo", "etereo_sognante", "very_normal_person"],
                vec![
                    part(Kick, &[0, 6], 90),
                    part(Snare, &[3, 9], 100),
                    part(Ride, &eighth_pulse(12), 80),
                ],
                &[("cross_stick", 0.2)],
                &["shuffle_12", "gentle_tom_68"],
            )
        },
        GrooveDef {
            can_use_ride: Some(true),
            shuffle: Some(false),
            hat_velocity: Some(80),
            ..def(
                "beatles_ticket_to_ride_4_4",
                (4, 4),
                16,
                8,
                &["very_normal_person", "malinconico_introspettivo"],
                vec![
                    part(Kick, &[0, 7, 10], 95),
                    part(Snare, &[4, 12], 105),
                    timing(&eighth_pulse(16)),
                ],
                &[("ride_instead_of_hat", 0.1)],
                &["simple_snare_44", "basic_tom_44"],
            )
        },
        GrooveDef {
            can_use_ride: Some(false),
            shuffle: Some(false),
            hat_velocity: Some(75),
            ..def(
                "tool_schism_5_8",
                (5, 8),
                10,
                8,
                &["ansioso_distopico", "sperimentale_astratto"],
                vec![
                    part(Kick, &[0, 5, 7], 105),
                    part(Snare, &[4, 9], 115),
                    part(TomMid, &[2, 6], 95),
                    timing(&[0, 1, 3, 5, 7, 9]),
                ],
                &[("snare_delay", 0.15)],
                &["odd_5_8_a", "syncopated_tom_roll"],
            )
        },
        GrooveDef {
            can_use_ride: Some(false),
            shuffle: Some(false),
            hat_velocity: Some(90),
            ..def(
                "funky_7_8_223",
                (7, 8),
                14,
                7,
                &["sperimentale_astratto", "etereo_sognante", "ansioso_distopico"],
                vec![
                    part(Kick, &[0, 4, 8], 100),
                    part(Snare, &[6, 12], 110),
                    timing(&(0..14).collect::<Vec<_>>()),
                ],
                &[("ghost_snare", 0.25)],
                &["odd_7_8_a", "balkan_7_8"],
            )
        },
        GrooveDef {
            can_use_ride: Some(true),
            shuffle: Some(true),
            ..def(
                "radiohead_weird_fishes_6_8",
                (6, 8),
                12,
                7,
                &["etereo_sognante", "malinconico_introspettivo"],
                vec![
                    part(Kick, &[0, 6], 90),
                    part(Snare, &[3, 9], 105),
                    part(ClosedHat, &(0..12).collect::<Vec<_>>(), 70),
                ],
                &[("ride_overlay", 0.2)],
                &["gentle_tom_68", "shuffle_12"],
            )
        },
        GrooveDef {
            can_use_ride: Some(false),
            shuffle: Some(true),
            hat_velocity: Some(75),
            ..def(
                "mars_volta_9_8_breakup",
                (9, 8),
                18,
                6,
                &["sperimentale_astratto", "arrabbiato_critico", "ansioso_distopico"],
                vec![
                    part(Kick, &[0, 3, 7, 11], 100),
                    part(Snare, &[6, 15], 115),
                    part(TomFloor, &[13], 100),
                    timing(&eighth_pulse(18)),
                ],
                &[("crash_instead_of_snare", 0.1)],
                &["odd_9_8_a", "syncopated_tom_burst_9_8"],
            )
        },
        GrooveDef {
            can_use_ride: Some(false),
            shuffle: Some(false),
            ..def(
                "zeppelin_levee_breaks_4_4",
                (4, 4),
                16,
                9,
                &["arrabbiato_critico", "sperimentale_astratto", "very_normal_person"],
                vec![
                    part(Kick, &[0, 3, 10], 115),
                    part(Snare, &[4, 12], 122),
                    part(OpenHat, &[2, 6, 10, 14], 100),
                ],
                &[("ghost_snare", 0.3)],
                &["heavy_44", "triplet_splash_end"],
            )
        },
        GrooveDef {
            can_use_ride: Some(true),
            shuffle: Some(false),
            hat_velocity: Some(85),
            ..def(
                "prog_rock_5_4_3_2",
                (5, 4),
                20,
                7,
                &["sperimentale_astratto", "ansioso_distopico"],
                vec![
                    part(Kick, &[0, 6, 12, 17], 100),
                    part(Snare, &[8, 19], 110),
                    timing(&eighth_pulse(20)),
                ],
                &[("open_hat_end", 0.2)],
                &["odd_5_4_a", "odd_5_4_b"],
            )
        },
        GrooveDef {
            shuffle: Some(true),
            ..def(
                "triplet_blues_12_8_ride_cross",
                (12, 8),
                24,
                6,
                &["malinconico_introspettivo", "etereo_sognante", "very_normal_person"],
                vec![
                    part(Kick, &[0, 9, 16], 90),
                    part(CrossStick, &[6, 18], 95),
                    part(Ride, &[0, 4, 8, 12, 16, 20], 70),
                ],
                &[("ride_bell_accent", 0.15)],
                &["shuffle_12", "gentle_tom_12_8"],
            )
        },
    ];

    defs.extend(general_defs());
    defs
}

fn with_velocities(d: GrooveDef, ride: bool, shuffle: bool, hat: u8, ride_vel: u8) -> GrooveDef {
    GrooveDef {
        can_use_ride: Some(ride),
        shuffle: Some(shuffle),
        hat_velocity: Some(hat),
        ride_velocity: Some(ride_vel),
        ..d
    }
}

fn general_defs() -> Vec<GrooveDef> {
    let eighths16: Vec<u32> = (0..16).step_by(2).collect();
    vec![
        with_velocities(
            def(
                "BasicRock44",
                (4, 4),
                16,
                20,
                &["very_normal_person", "arrabbiato_critico", "malinconico_introspettivo"],
                vec![
                    part(Kick, &[0], 95),
                    part(Kick, &[8], 90),
                    part(Snare, &[4, 12], 100),
                    timing(&eighths16),
                ],
                &[("add_syncopated_kick", 0.3), ("open_hat_end", 0.25), ("crash_on_one", 0.15)],
                &["simple_snare_44", "basic_tom_44", "sxpstl_tom"],
            ),
            true,
            false,
            70,
            75,
        ),
        with_velocities(
            def(
                "FourOnTheFloor44",
                (4, 4),
                16,
                15,
                &["very_normal_person", "etereo_sognante"],
                vec![part(Kick, &[0, 4, 8, 12], 100), timing(&eighths16)],
                &[("snare_on_two_and_four", 0.6), ("open_hat_offbeats", 0.3)],
                &["light_snare_tap_44", "gentle_tom_44"],
            ),
            true,
            false,
            65,
            70,
        ),
        with_velocities(
            def(
                "SimpleBallad44",
                (4, 4),
                16,
                10,
                &["malinconico_introspettivo", "etereo_sognante"],
                vec![
                    part(Kick, &[0], 80),
                    part(Kick, &[8], 75),
                    part(CrossStick, &[4, 12], 70),
                    timing(&eighths16),
                ],
                &[("ride_lead", 0.4), ("soft_kick", 0.3)],
                &["gentle_tom_44", "light_snare_tap_44"],
            ),
            true,
            false,
            60,
            65,
        ),
        with_velocities(
            def(
                "BasicShuffle44",
                (4, 4),
                12,
                12,
                &["very_normal_person", "malinconico_introspettivo"],
                vec![
                    part(Kick, &[0], 90),
                    part(Kick, &[6], 85),
                    part(Kick, &[8], 88),
                    part(Snare, &[3, 9], 95),
                    timing(&[0, 2, 3, 5, 6, 8, 9, 11]),
                ],
                &[("ride_lead", 0.3), ("ghost_snare_shuffle", 0.2)],
                &["shuffle_12", "triplet_roll"],
            ),
            true,
            true,
            70,
            75,
        ),
        with_velocities(
            def(
                "March24",
                (2, 4),
                8,
                10,
                &["very_normal_person", "arrabbiato_critico"],
                vec![
                    part(Kick, &[0], 95),
                    part(Snare, &[2], 80),
                    part(Snare, &[4], 100),
                    timing(&(0..8).collect::<Vec<_>>()),
                ],
                &[("ghost_snare_2_4", 0.3)],
                &["simple_snare_24", "short_tom_24"],
            ),
            false,
            false,
            75,
            75,
        ),
        with_velocities(
            def(
                "OddGroove54_23",
                (5, 4),
                20,
                8,
                &["ansioso_distopico", "sperimentale_astratto", "etereo_sognante"],
                vec![
                    part(Kick, &[0], 95),
                    part(Kick, &[8], 90),
                    part(Kick, &[16], 98),
                    part(Snare, &[4], 100),
                    part(Snare, &[12], 92),
                    timing(&(0..20).step_by(2).collect::<Vec<_>>()),
                ],
                &[("ride_bell_accents_5_4", 0.2)],
                &["odd_5_4_a", "odd_5_4_b"],
            ),
            true,
            false,
            70,
            75,
        ),
        with_velocities(
            def(
                "AltProg7_8_322",
                (7, 8),
                14,
                7,
                &["ansioso_distopico", "sperimentale_astratto", "etereo_sognante"],
                vec![
                    part(Kick, &[0], 95),
                    part(Kick, &[4], 90),
                    part(Kick, &[8], 92),
                    part(Kick, &[12], 88),
                    part(Snare, &[2], 100),
                    part(Snare, &[6], 98),
                    part(Snare, &[10], 96),
                    timing(&(0..14).step_by(2).collect::<Vec<_>>()),
                ],
                &[("crash_on_one", 0.2)],
                &["odd_7_8_a", "odd_7_8_b", "hcs_7_8"],
            ),
            true,
            false,
            72,
            78,
        ),
        with_velocities(
            def(
                "SimpleGroove9_8",
                (9, 8),
                9,
                7,
                &["etereo_sognante", "sperimentale_astratto", "malinconico_introspettivo"],
                vec![
                    part(Kick, &[0], 90),
                    part(Kick, &[6], 88),
                    part(Snare, &[3], 95),
                    timing(&(0..9).collect::<Vec<_>>()),
                ],
                &[("snare_on_seventh_9_8", 0.3)],
                &["odd_9_8_a", "triplet_tom_9_8"],
            ),
            true,
            true,
            68,
            72,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::Voice::{Kick, Snare};
    use capric_prng::GameRng;

    fn ctx(grid: u32, beats: u32) -> VariationContext {
        VariationContext {
            grid,
            beats,
            can_use_ride: true,
            ride_velocity: 75,
            timing: Voice::ClosedHat,
            timing_velocity: 70,
        }
    }

    #[test]
    fn test_builtin_library_resolves() {
        let lib = GrooveLibrary::builtin().unwrap();
        assert_eq!(lib.grooves.len(), 21);
        assert!(lib.get("BasicRock44").is_some());
        assert_eq!(lib.fallback().unwrap().name, "BasicRock44");
        for g in &lib.grooves {
            assert!(g.steps.iter().all(|s| s.step < g.grid), "{}", g.name);
            assert!(g.steps.windows(2).all(|w| w[0].step < w[1].step), "{}", g.name);
        }
    }

    #[test]
    fn test_compact_groove_gets_timing_defaults() {
        let lib = GrooveLibrary::builtin().unwrap();
        // Afro-cuban has a ride part, so no placeholder timing hits.
        let afro = lib.get("afro_cuban_12_8").unwrap();
        assert!(afro.steps.iter().all(|s| s.hits.iter().all(|h| h.voice != Voice::Timing)));
        assert!(afro.can_use_ride);

        let plain = def("plain", (3, 4), 12, 5, &["any"], vec![part(Kick, &[0], 90)], &[], &[]);
        let g = plain.resolve().unwrap();
        let timing_steps: Vec<u32> = g
            .steps
            .iter()
            .filter(|s| s.hits.iter().any(|h| h.voice == Voice::Timing))
            .map(|s| s.step)
            .collect();
        assert_eq!(timing_steps, vec![0, 2, 4, 6, 8, 10]);
    }

    #[test]
    fn test_unknown_names_are_rejected() {
        let parts = vec![part(Kick, &[0], 90)];
        let mut d = def("x", (4, 4), 16, 5, &["any"], parts, &[("moar_cowbell", 0.5)], &[]);
        assert!(matches!(d.clone().resolve(), Err(CompositionError::InvalidPatternLibrary(_))));
        d.variations.clear();
        d.fills.push("drum_solo".into());
        assert!(d.clone().resolve().is_err());
        d.fills.clear();
        d.parts.push(part(Snare, &[16], 90));
        assert!(d.resolve().is_err());
    }

    #[test]
    fn test_variation_json_names_round_trip() {
        let json = r#"{"kind": "crash_on_one", "probability": 0.2}"#;
        let v: Variation = serde_json::from_str(json).unwrap();
        assert_eq!(v.kind, VariationKind::CrashOnOne);
        let unknown = r#"{"kind": "nope", "probability": 0.2}"#;
        assert!(serde_json::from_str::<Variation>(unknown).is_err());
        for (kind, name) in VARIATION_NAMES {
            assert_eq!(VariationKind::from_name(name), Some(*kind));
        }
    }

    #[test]
    fn test_open_hat_end_replaces_last_timing_hit() {
        let lib = GrooveLibrary::builtin().unwrap();
        let rock = lib.get("BasicRock44").unwrap();
        let mut grid = rock.steps.clone();
        VariationKind::OpenHatEnd.apply(&mut grid, &ctx(16, 4), &mut GameRng::new(1));
        let last = grid.iter().find(|s| s.step == 14).unwrap();
        assert!(last.hits.iter().any(|h| h.voice == Voice::OpenHat));
        assert!(last.hits.iter().all(|h| h.voice != Voice::Timing));
    }

    #[test]
    fn test_ghost_snare_lands_on_odd_free_step() {
        let lib = GrooveLibrary::builtin().unwrap();
        let rock = lib.get("BasicRock44").unwrap();
        for seed in 0..20 {
            let mut grid = rock.steps.clone();
            VariationKind::GhostSnare.apply(&mut grid, &ctx(16, 4), &mut GameRng::new(seed));
            let ghost: Vec<&GrooveStep> = grid
                .iter()
                .filter(|s| s.step % 2 == 1 && s.hits.iter().any(|h| h.voice == Voice::Snare))
                .collect();
            assert_eq!(ghost.len(), 1);
            assert!(ghost[0].hits[0].velocity <= 40);
        }
    }

    #[test]
    fn test_snare_delay_moves_second_snare() {
        let mut grid = StepGrid::new();
        step_entry(&mut grid, 4).hits.push(Hit { voice: Snare, velocity: 100 });
        step_entry(&mut grid, 9).hits.push(Hit { voice: Snare, velocity: 110 });
        VariationKind::SnareDelay.apply(&mut grid, &ctx(10, 5), &mut GameRng::new(2));
        let snares: Vec<u32> = grid
            .iter()
            .filter(|s| s.hits.iter().any(|h| h.voice == Snare))
            .map(|s| s.step)
            .collect();
        // Step 9 is the last in a 10-step grid; nothing moves.
        assert_eq!(snares, vec![4, 9]);

        let mut grid = StepGrid::new();
        step_entry(&mut grid, 2).hits.push(Hit { voice: Snare, velocity: 100 });
        step_entry(&mut grid, 6).hits.push(Hit { voice: Snare, velocity: 100 });
        VariationKind::SnareDelay.apply(&mut grid, &ctx(10, 5), &mut GameRng::new(2));
        assert!(has_voice(&grid, 7, Snare));
        assert!(!has_voice(&grid, 6, Snare));
    }

    #[test]
    fn test_humanize_bounds() {
        let mut rng = GameRng::new(5);
        for _ in 0..500 {
            let v = humanize(95, 10, &mut rng);
            assert!((90..=100).contains(&v));
        }
        assert_eq!(humanize(200, 0, &mut rng), 127);
    }

    #[test]
    fn test_swing_delay_only_on_middle_triplets() {
        let lib = GrooveLibrary::builtin().unwrap();
        let shuffle = lib.get("BasicShuffle44").unwrap();
        assert_eq!(shuffle.swing_delay(0, 40.0), 0.0);
        assert_eq!(shuffle.swing_delay(1, 40.0), 20.0);
        assert_eq!(shuffle.swing_delay(2, 40.0), 0.0);
        let rock = lib.get("BasicRock44").unwrap();
        assert_eq!(rock.swing_delay(1, 32.0), 0.0);
    }
}
