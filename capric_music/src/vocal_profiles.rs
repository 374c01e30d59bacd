// Vocal style profiles.
//
// A profile is a bundle of probability tables that shapes the vocal line:
// interval and direction preferences for pitch motion, note and rest
// lengths, where notes start relative to the beat, velocity behavior, and a
// register. `mode` optionally forces a scale over the song's key.
//
// The stock table ships nine character profiles plus `default_fallback`.
// Tables loaded from JSON are validated: every table must be non-empty with
// non-negative weights, the register must lie inside 48..=81, and a forced
// mode must name a known scale.

use std::path::Path;

use capric_prng::RandomSource;
use serde::{Deserialize, Serialize};

use crate::error::{CompositionError, Result};
use crate::theory;

pub const DEFAULT_PROFILE: &str = "default_fallback";
pub const VOCAL_MIN_PITCH: u8 = 48;
pub const VOCAL_MAX_PITCH: u8 = 81;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalKind {
    #[default]
    Plain,
    /// Jump a full octave whatever the drawn interval.
    OctaveJump,
    /// Octave jump that also marks the note as falsetto.
    FalsettoBreak,
    ChromaticPassing,
    SmallSlide,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntervalChoice {
    pub interval: i32,
    pub probability: f64,
    #[serde(default)]
    pub kind: IntervalKind,
}

/// Weights for the direction of the next step. `erratic` picks among
/// up/down/same with a bias away from repetition, `balance` alternates by
/// pitch parity, `drift` is uniform.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectionBias {
    pub up: f64,
    pub down: f64,
    pub same: f64,
    pub erratic: f64,
    pub balance: f64,
    pub drift: f64,
    /// Every ascent becomes a falsetto leap.
    pub falsetto_on_ascent: bool,
}

impl DirectionBias {
    pub fn total(&self) -> f64 {
        self.up + self.down + self.same + self.erratic + self.balance + self.drift
    }
}

/// Note values, as multiples of the meter's beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteValue {
    Sixteenth,
    DottedSixteenth,
    Eighth,
    DottedEighth,
    Quarter,
    DottedQuarter,
    Half,
    DottedHalf,
    Whole,
}

impl NoteValue {
    pub fn beats(self) -> f64 {
        match self {
            NoteValue::Sixteenth => 0.25,
            NoteValue::DottedSixteenth => 0.375,
            NoteValue::Eighth => 0.5,
            NoteValue::DottedEighth => 0.75,
            NoteValue::Quarter => 1.0,
            NoteValue::DottedQuarter => 1.5,
            NoteValue::Half => 2.0,
            NoteValue::DottedHalf => 3.0,
            NoteValue::Whole => 4.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DurationRule {
    pub value: NoteValue,
    pub probability: f64,
}

/// A rest. `value: None` is a pause that skips one beat.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RestRule {
    #[serde(default)]
    pub value: Option<NoteValue>,
    pub probability: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccentRules {
    pub on_beat: f64,
    pub off_beat: f64,
    pub complex: f64,
    pub behind_beat: f64,
    /// Upper bound of the behind-the-beat float.
    pub floating_offset_ticks: u32,
    /// Chance of pulling a start a sixteenth of a beat early.
    pub rushy: f64,
    /// Chance of nudging a start by a twenty-fourth of a beat either way.
    pub unsteady: f64,
}

impl Default for AccentRules {
    fn default() -> Self {
        Self {
            on_beat: 0.7,
            off_beat: 0.2,
            complex: 0.1,
            behind_beat: 0.0,
            floating_offset_ticks: 20,
            rushy: 0.0,
            unsteady: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VelocityRules {
    pub base: i32,
    pub range: i32,
    pub accent: f64,
    pub swell: f64,
    pub gruff: f64,
    pub dynamic_jumps: f64,
    pub falsetto_drop: i32,
    pub belt: Option<u8>,
    pub whisper: Option<u8>,
    pub breathy_max: Option<u8>,
}

impl Default for VelocityRules {
    fn default() -> Self {
        Self {
            base: 75,
            range: 10,
            accent: 10.0,
            swell: 0.0,
            gruff: 0.0,
            dynamic_jumps: 0.0,
            falsetto_drop: 0,
            belt: None,
            whisper: None,
            breathy_max: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Register {
    pub preferred_octave: i32,
    pub min_pitch: u8,
    pub max_pitch: u8,
    /// Semitones added on a falsetto leap.
    #[serde(default)]
    pub falsetto_leap: Option<i32>,
}

impl Register {
    /// Pitch of `pc` in the preferred octave (octave 4 starts at MIDI 60).
    pub fn anchor(&self, pc: u8) -> i32 {
        pc as i32 + (self.preferred_octave + 1) * 12
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocalProfile {
    pub name: String,
    pub style_label: String,
    pub intervals: Vec<IntervalChoice>,
    pub direction: DirectionBias,
    pub note_durations: Vec<DurationRule>,
    pub rests: Vec<RestRule>,
    #[serde(default)]
    pub accents: AccentRules,
    #[serde(default)]
    pub velocity: VelocityRules,
    #[serde(default)]
    pub mode: Option<String>,
    pub register: Register,
}

impl VocalProfile {
    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| CompositionError::InvalidProfile(format!("{}: {msg}", self.name));
        if self.intervals.is_empty() || self.note_durations.is_empty() || self.rests.is_empty() {
            return Err(bad("interval, duration and rest tables must be non-empty".into()));
        }
        let weights = self
            .intervals
            .iter()
            .map(|i| i.probability)
            .chain(self.note_durations.iter().map(|d| d.probability))
            .chain(self.rests.iter().map(|r| r.probability))
            .chain([self.direction.up, self.direction.down, self.direction.same]);
        for w in weights {
            if !w.is_finite() || w < 0.0 {
                return Err(bad(format!("negative or non-finite weight {w}")));
            }
        }
        let r = &self.register;
        if r.min_pitch >= r.max_pitch
            || r.min_pitch < VOCAL_MIN_PITCH
            || r.max_pitch > VOCAL_MAX_PITCH
        {
            return Err(bad(format!(
                "register {}..={} outside {VOCAL_MIN_PITCH}..={VOCAL_MAX_PITCH}",
                r.min_pitch, r.max_pitch
            )));
        }
        if let Some(mode) = &self.mode
            && theory::scale_by_name(mode).is_none()
        {
            return Err(bad(format!("unknown mode '{mode}'")));
        }
        Ok(())
    }

    /// Probability that a note is sung falsetto. Only profiles with a
    /// falsetto leap have one.
    pub fn falsetto_probability(&self) -> f64 {
        if self.register.falsetto_leap.is_none() {
            return 0.0;
        }
        self.intervals
            .iter()
            .find(|i| i.kind == IntervalKind::FalsettoBreak)
            .map_or(0.05, |i| i.probability)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocalProfileLibrary {
    pub profiles: Vec<VocalProfile>,
}

impl Default for VocalProfileLibrary {
    fn default() -> Self {
        Self { profiles: builtin_profiles() }
    }
}

impl VocalProfileLibrary {
    pub fn new(profiles: Vec<VocalProfile>) -> Result<Self> {
        if profiles.is_empty() {
            return Err(CompositionError::InvalidProfile("profile table is empty".into()));
        }
        for p in &profiles {
            p.validate()?;
        }
        Ok(Self { profiles })
    }

    /// Load a JSON array of profiles.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let profiles: Vec<VocalProfile> = serde_json::from_str(&json)?;
        Self::new(profiles)
    }

    pub fn get(&self, name: &str) -> Option<&VocalProfile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    /// The forced profile if it exists, else a random profile other than
    /// `default_fallback`, else whatever the table has.
    pub fn choose<R: RandomSource>(
        &self,
        forced: Option<&str>,
        rng: &mut R,
    ) -> Option<&VocalProfile> {
        if let Some(name) = forced {
            if let Some(p) = self.get(name) {
                return Some(p);
            }
            tracing::warn!(profile = name, "unknown vocal profile, choosing at random");
        }
        let pool: Vec<&VocalProfile> =
            self.profiles.iter().filter(|p| p.name != DEFAULT_PROFILE).collect();
        if pool.is_empty() {
            return self.get(DEFAULT_PROFILE).or_else(|| self.profiles.first());
        }
        Some(pool[rng.range_usize(0, pool.len())])
    }
}

fn intervals(table: &[(i32, f64)]) -> Vec<IntervalChoice> {
    table
        .iter()
        .map(|&(interval, probability)| IntervalChoice {
            interval,
            probability,
            kind: IntervalKind::Plain,
        })
        .collect()
}

fn special(interval: i32, probability: f64, kind: IntervalKind) -> IntervalChoice {
    IntervalChoice { interval, probability, kind }
}

fn notes(table: &[(NoteValue, f64)]) -> Vec<DurationRule> {
    table.iter().map(|&(value, probability)| DurationRule { value, probability }).collect()
}

fn rests(table: &[(Option<NoteValue>, f64)]) -> Vec<RestRule> {
    table.iter().map(|&(value, probability)| RestRule { value, probability }).collect()
}

fn direction(up: f64, down: f64, same: f64) -> DirectionBias {
    DirectionBias { up, down, same, ..DirectionBias::default() }
}

fn accents(on_beat: f64, off_beat: f64, complex: f64) -> AccentRules {
    AccentRules { on_beat, off_beat, complex, ..AccentRules::default() }
}

fn velocity(base: i32, range: i32, accent: f64) -> VelocityRules {
    VelocityRules { base, range, accent, ..VelocityRules::default() }
}

fn register(preferred_octave: i32, min_pitch: u8, max_pitch: u8) -> Register {
    Register { preferred_octave, min_pitch, max_pitch, falsetto_leap: None }
}

use NoteValue::*;

const SKIP: Option<NoteValue> = None;

pub fn builtin_profiles() -> Vec<VocalProfile> {
    vec![
        VocalProfile {
            name: "rgegnstmch".into(),
            style_label: "angry_percussive_raplike".into(),
            intervals: intervals(&[(0, 0.6), (1, 0.15), (2, 0.1), (3, 0.1), (5, 0.05)]),
            direction: direction(0.15, 0.15, 0.7),
            note_durations: notes(&[(Eighth, 0.7), (Quarter, 0.2), (Half, 0.1)]),
            rests: rests(&[(Some(Sixteenth), 0.08), (Some(Eighth), 0.02), (SKIP, 0.6)]),
            accents: accents(0.4, 0.6, 0.0),
            velocity: velocity(100, 15, 15.0),
            mode: Some("Phrygian".into()),
            register: register(4, 60, 76),
        },
        VocalProfile {
            name: "sxpstl".into(),
            style_label: "punk_messy_scream".into(),
            intervals: intervals(&[(2, 0.4), (3, 0.3), (5, 0.1), (0, 0.2), (7, 0.1)]),
            direction: DirectionBias { erratic: 0.6, ..direction(0.2, 0.2, 0.0) },
            note_durations: notes(&[(Eighth, 0.8), (Quarter, 0.2)]),
            rests: rests(&[(Some(Sixteenth), 0.18), (Some(Eighth), 0.09), (SKIP, 0.6)]),
            accents: AccentRules { unsteady: 0.7, rushy: 0.5, ..accents(0.3, 0.4, 0.3) },
            velocity: velocity(105, 20, 10.5),
            mode: Some("Mixolydian".into()),
            register: register(4, 58, 74),
        },
        VocalProfile {
            name: "pnkfloyd".into(),
            style_label: "atmospheric_expressive".into(),
            intervals: intervals(&[(3, 0.3), (5, 0.3), (4, 0.2), (2, 0.1), (-2, 0.1)]),
            direction: DirectionBias { balance: 0.5, ..direction(0.25, 0.25, 0.0) },
            note_durations: notes(&[(Half, 0.5), (Quarter, 0.4), (Eighth, 0.1)]),
            rests: rests(&[(Some(Half), 0.15), (Some(Quarter), 0.1), (SKIP, 0.6)]),
            accents: AccentRules {
                behind_beat: 0.4,
                floating_offset_ticks: 20,
                ..accents(0.4, 0.3, 0.3)
            },
            velocity: VelocityRules { swell: 0.3, ..velocity(75, 25, 10.0) },
            mode: Some("Dorian".into()),
            register: register(3, 55, 79),
        },
        VocalProfile {
            name: "rnm".into(),
            style_label: "melodic_wistful_altpop".into(),
            intervals: intervals(&[(3, 0.35), (4, 0.3), (2, 0.2), (5, 0.15), (-2, 0.1), (-3, 0.1)]),
            direction: direction(0.6, 0.3, 0.1),
            note_durations: notes(&[(Quarter, 0.6), (Half, 0.3), (Eighth, 0.1)]),
            rests: rests(&[(Some(Quarter), 0.105), (Some(Eighth), 0.045), (SKIP, 0.6)]),
            accents: accents(0.5, 0.3, 0.2),
            velocity: velocity(80, 10, 4.0),
            mode: Some("Ionian".into()),
            register: register(4, 60, 77),
        },
        VocalProfile {
            name: "tmwts".into(),
            style_label: "drunken_jazzy_broken".into(),
            intervals: intervals(&[(1, 0.15), (2, 0.25), (3, 0.25), (-1, 0.1), (-2, 0.15)]),
            direction: DirectionBias { erratic: 0.3, ..direction(0.0, 0.6, 0.1) },
            note_durations: notes(&[(Quarter, 0.5), (Eighth, 0.3), (Sixteenth, 0.2)]),
            rests: rests(&[
                (Some(Half), 0.2),
                (Some(Quarter), 0.12),
                (Some(Eighth), 0.08),
                (SKIP, 0.6),
            ]),
            accents: AccentRules { behind_beat: 0.5, ..accents(0.1, 0.3, 0.6) },
            velocity: VelocityRules { gruff: 0.4, ..velocity(70, 20, 14.0) },
            mode: Some("Blues Minor Pentatonic".into()),
            register: register(3, 48, 67),
        },
        VocalProfile {
            name: "yrk".into(),
            style_label: "alienated_emotive_falsetto".into(),
            intervals: {
                let mut table =
                    intervals(&[(1, 0.1), (2, 0.2), (-2, 0.15), (3, 0.15), (-3, 0.1), (5, 0.1)]);
                table.push(special(12, 0.1, IntervalKind::OctaveJump));
                table.push(special(0, 0.05, IntervalKind::FalsettoBreak));
                table
            },
            direction: DirectionBias {
                erratic: 0.7,
                falsetto_on_ascent: true,
                ..direction(0.1, 0.3, 0.1)
            },
            note_durations: notes(&[(Eighth, 0.3), (Half, 0.2), (Quarter, 0.5)]),
            rests: rests(&[(Some(Sixteenth), 0.07), (Some(Eighth), 0.245), (SKIP, 0.5)]),
            accents: accents(0.0, 0.6, 0.4),
            velocity: VelocityRules {
                dynamic_jumps: 0.3,
                falsetto_drop: 15,
                ..velocity(70, 25, 10.0)
            },
            mode: Some("Aeolian".into()),
            register: Register { falsetto_leap: Some(12), ..register(4, 57, 81) },
        },
        VocalProfile {
            name: "btlsxp".into(),
            style_label: "surreal_melodic_structured".into(),
            intervals: {
                let mut table =
                    intervals(&[(1, 0.1), (2, 0.3), (3, 0.1), (4, 0.2), (5, 0.1), (6, 0.1)]);
                table.push(special(0, 0.1, IntervalKind::ChromaticPassing));
                table
            },
            direction: DirectionBias { erratic: 0.6, ..direction(0.2, 0.2, 0.0) },
            note_durations: notes(&[(Quarter, 0.5), (Half, 0.3), (Eighth, 0.2)]),
            rests: rests(&[(Some(Quarter), 0.15), (Some(Eighth), 0.1), (SKIP, 0.6)]),
            accents: accents(0.3, 0.4, 0.3),
            velocity: VelocityRules { swell: 0.3, ..velocity(85, 15, 10.0) },
            mode: Some("Ionian".into()),
            register: register(4, 60, 76),
        },
        VocalProfile {
            name: "fmrcry".into(),
            style_label: "theatrical_powerful_operatic".into(),
            intervals: {
                let mut table = intervals(&[(2, 0.15), (3, 0.2), (4, 0.15), (5, 0.2), (7, 0.2)]);
                table.push(special(12, 0.1, IntervalKind::OctaveJump));
                table
            },
            direction: DirectionBias { erratic: 1.0, ..direction(0.3, 0.2, 0.0) },
            note_durations: notes(&[(Half, 0.4), (Eighth, 0.2), (Quarter, 0.4)]),
            rests: rests(&[(Some(Half), 0.08), (Some(Quarter), 0.08), (SKIP, 0.5)]),
            accents: accents(0.7, 0.2, 0.1),
            velocity: VelocityRules {
                belt: Some(120),
                whisper: Some(50),
                ..velocity(90, 30, 10.0)
            },
            mode: Some("Ionian".into()),
            register: register(4, 57, 81),
        },
        VocalProfile {
            name: "bllylsh".into(),
            style_label: "intimate_breathy_modernpop".into(),
            intervals: {
                let mut table = intervals(&[(0, 0.1), (1, 0.25), (2, 0.3), (-1, 0.15), (-2, 0.1)]);
                table.push(special(0, 0.1, IntervalKind::SmallSlide));
                table
            },
            direction: DirectionBias { drift: 1.0, ..direction(0.1, 0.5, 0.4) },
            note_durations: notes(&[(Quarter, 0.3), (Eighth, 0.6), (Half, 0.1)]),
            rests: rests(&[(Some(Eighth), 0.2), (Some(Quarter), 0.12), (SKIP, 0.5)]),
            accents: AccentRules {
                behind_beat: 0.6,
                floating_offset_ticks: 25,
                ..accents(0.1, 0.5, 0.4)
            },
            velocity: VelocityRules { swell: 0.4, breathy_max: Some(70), ..velocity(55, 15, 10.0) },
            mode: Some("Minor Pentatonic".into()),
            register: register(3, 53, 72),
        },
        VocalProfile {
            name: DEFAULT_PROFILE.into(),
            style_label: "Default Fallback Smooth".into(),
            intervals: intervals(&[(0, 0.3), (2, 0.3), (-2, 0.2), (3, 0.1), (-3, 0.1)]),
            direction: direction(0.4, 0.4, 0.2),
            note_durations: notes(&[(Quarter, 0.5), (Eighth, 0.4)]),
            rests: rests(&[(Some(Eighth), 0.7), (Some(Quarter), 0.3)]),
            accents: accents(0.8, 0.2, 0.0),
            velocity: velocity(70, 10, 5.0),
            mode: None,
            register: register(3, 53, 71),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use capric_prng::GameRng;

    #[test]
    fn test_builtin_profiles_validate() {
        let lib = VocalProfileLibrary::new(builtin_profiles()).unwrap();
        assert_eq!(lib.profiles.len(), 10);
        for p in &lib.profiles {
            assert!(p.register.min_pitch >= VOCAL_MIN_PITCH);
            assert!(p.register.max_pitch <= VOCAL_MAX_PITCH);
        }
        assert!(lib.get("yrk").unwrap().falsetto_probability() > 0.0);
        assert_eq!(lib.get("rnm").unwrap().falsetto_probability(), 0.0);
    }

    #[test]
    fn test_random_choice_skips_fallback() {
        let lib = VocalProfileLibrary::default();
        let mut rng = GameRng::new(11);
        for _ in 0..200 {
            assert_ne!(lib.choose(None, &mut rng).unwrap().name, DEFAULT_PROFILE);
        }
        assert_eq!(lib.choose(Some("tmwts"), &mut rng).unwrap().name, "tmwts");
        assert_ne!(lib.choose(Some("nobody"), &mut rng).unwrap().name, "nobody");
    }

    #[test]
    fn test_invalid_profiles_are_rejected() {
        let mut p = builtin_profiles().remove(0);
        p.register.max_pitch = 90;
        assert!(matches!(p.validate(), Err(CompositionError::InvalidProfile(_))));

        let mut p = builtin_profiles().remove(0);
        p.mode = Some("Hungarian Gypsy".into());
        assert!(p.validate().is_err());

        let mut p = builtin_profiles().remove(0);
        p.rests.clear();
        assert!(p.validate().is_err());

        assert!(VocalProfileLibrary::new(Vec::new()).is_err());
    }

    #[test]
    fn test_profile_json_uses_defaults() {
        let json = r#"[{
            "name": "hum",
            "style_label": "humming",
            "intervals": [{"interval": 2, "probability": 1.0}],
            "direction": {"up": 0.5, "down": 0.5},
            "note_durations": [{"value": "dotted_quarter", "probability": 1.0}],
            "rests": [{"probability": 1.0}],
            "register": {"preferred_octave": 4, "min_pitch": 60, "max_pitch": 72}
        }]"#;
        let profiles: Vec<VocalProfile> = serde_json::from_str(json).unwrap();
        let lib = VocalProfileLibrary::new(profiles).unwrap();
        let hum = lib.get("hum").unwrap();
        assert_eq!(hum.rests[0].value, None);
        assert_eq!(hum.velocity.base, 75);
        assert_eq!(hum.accents.on_beat, 0.7);
        assert_eq!(hum.note_durations[0].value.beats(), 1.5);
    }
}
