// Harmonic generator: the base chord progression of each section.
//
// A progression is built in four steps:
// 1. Derive the key's diatonic chord set (triads, or sevenths with a
//    mood-dependent chance). Pentatonic and blues scales borrow Ionian or
//    Aeolian for this step because they have no seven-degree stack.
// 2. Pick a roman-numeral shape from the mood's pool (major or minor family,
//    with a separate pool for bridges) and map it cyclically onto the target
//    length drawn from the section's chord-count targets.
// 3. Colorize each chord (add9, maj7#11, mmaj7, sus4...) with mood-weighted
//    probability.
// 4. Strip stray mode names, respell with sharps, and record the symbol in the
//    song's `ChordAccumulator`.
//
// Sections of the same clean type share a `ProgressionCache` entry: the first
// one builds the progression, later ones replay it, occasionally varied by
// dropping, repeating, or recoloring the last chord.
//
// Failures here never abort a song. A key whose mode has no diatonic set
// degrades to the tonic triad and logs a warning.

use std::collections::{BTreeSet, HashMap};

use capric_prng::RandomSource;
use tracing::{debug, warn};

use crate::config::HarmonyConfig;
use crate::structure::{self, clean_section_name};
use crate::theory::{self, Key, ScaleKind};

/// Every chord symbol a song uses, in sorted order for the glossary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChordAccumulator {
    chords: BTreeSet<String>,
}

impl ChordAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, chord: &str) {
        if !chord.is_empty() {
            self.chords.insert(chord.to_string());
        }
    }

    pub fn record_all<'a>(&mut self, chords: impl IntoIterator<Item = &'a String>) {
        for c in chords {
            self.record(c);
        }
    }

    pub fn contains(&self, chord: &str) -> bool {
        self.chords.contains(chord)
    }

    pub fn len(&self) -> usize {
        self.chords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chords.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.chords.iter()
    }
}

/// First progression generated per clean section type.
#[derive(Debug, Clone, Default)]
pub struct ProgressionCache {
    entries: HashMap<String, Vec<String>>,
}

impl ProgressionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, section_type: &str) -> Option<&Vec<String>> {
        self.entries.get(section_type)
    }

    pub fn insert(&mut self, section_type: String, progression: Vec<String>) {
        self.entries.insert(section_type, progression);
    }
}

/// Chord-count targets for a section type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChordTargets {
    pub min_observed: u32,
    pub max_observed: u32,
    pub typical_min: u32,
    pub typical_max: u32,
}

const fn targets(
    min_observed: u32,
    max_observed: u32,
    typical_min: u32,
    typical_max: u32,
) -> ChordTargets {
    ChordTargets {
        min_observed,
        max_observed,
        typical_min,
        typical_max,
    }
}

const CHORD_TARGETS: &[(&str, ChordTargets)] = &[
    ("intro", targets(0, 1, 2, 4)),
    ("verse", targets(2, 2, 4, 8)),
    ("pre-chorus", targets(2, 2, 3, 6)),
    ("chorus", targets(2, 2, 4, 4)),
    ("chorusdouble", targets(2, 2, 4, 4)),
    ("finalchorus", targets(2, 2, 4, 4)),
    ("bridge", targets(2, 2, 4, 8)),
    ("bridge-mod", targets(2, 2, 4, 8)),
    ("middle8", targets(2, 2, 4, 8)),
    ("instrumental", targets(2, 4, 4, 8)),
    ("solo", targets(2, 4, 4, 8)),
    ("guitarsolo", targets(2, 4, 4, 8)),
    ("noisesolo", targets(1, 4, 2, 4)),
    ("glitchsolo", targets(1, 4, 2, 4)),
    ("breakdown", targets(1, 2, 2, 4)),
    ("outro", targets(1, 1, 2, 4)),
    ("outroquiet", targets(1, 1, 2, 4)),
    ("outrosospeso", targets(1, 2, 2, 4)),
    ("screamoutro", targets(1, 2, 1, 4)),
    ("fadeout", targets(1, 2, 2, 4)),
    ("coda", targets(1, 1, 2, 4)),
    ("slamend", targets(1, 1, 1, 2)),
    ("sonicend", targets(1, 1, 1, 2)),
    ("finalshout", targets(1, 1, 1, 1)),
    ("end", targets(1, 1, 1, 2)),
    ("refrain", targets(2, 2, 2, 4)),
    ("interlude", targets(1, 4, 2, 4)),
    ("noiseinterlude", targets(1, 2, 1, 2)),
    ("ambientinterlude", targets(1, 2, 2, 4)),
    ("experimentalinterlude", targets(1, 4, 2, 4)),
    ("droneinterlude", targets(0, 1, 1, 2)),
    ("sonicinterlude", targets(1, 2, 1, 4)),
    ("screaminterlude", targets(1, 1, 1, 2)),
    ("silence", targets(0, 0, 0, 0)),
    ("glitchsection", targets(1, 2, 2, 4)),
    ("glitch", targets(0, 1, 1, 2)),
    ("ambientloop", targets(1, 2, 2, 4)),
    ("texture", targets(0, 1, 1, 2)),
    ("fragment", targets(1, 2, 2, 4)),
    ("spoken", targets(0, 2, 1, 4)),
    ("soundscape", targets(0, 2, 1, 3)),
    ("disruption", targets(0, 1, 1, 2)),
    ("reverse", targets(1, 2, 2, 4)),
    ("noise", targets(0, 1, 0, 1)),
    ("fade", targets(1, 2, 2, 4)),
    ("parta", targets(2, 2, 4, 8)),
    ("partb", targets(2, 2, 4, 8)),
    ("partc", targets(2, 2, 4, 8)),
];

const DEFAULT_TARGETS: ChordTargets = targets(2, 2, 4, 4);

pub fn chord_targets(section_name: &str) -> ChordTargets {
    structure::lookup_by_section(CHORD_TARGETS, section_name)
        .copied()
        .unwrap_or(DEFAULT_TARGETS)
}

/// Progression length for a section: uniform in the typical range, bounded by
/// the observed extremes. Silence is always empty; otherwise at least 1.
pub fn progression_length<R: RandomSource>(section_name: &str, rng: &mut R) -> usize {
    if clean_section_name(section_name) == "silence" {
        return 0;
    }
    let t = chord_targets(section_name);
    let drawn = rng.range_usize_inclusive(t.typical_min as usize, t.typical_max as usize) as u32;
    let len = if t.min_observed == 0 && t.max_observed == 0 {
        0
    } else {
        t.min_observed.max(drawn.min(t.typical_max.max(t.max_observed)))
    };
    len.max(1) as usize
}

const POP_MAJOR: &[&[&str]] = &[
    &["I", "V", "vi", "IV"],
    &["I", "IV", "V", "I"],
    &["vi", "IV", "I", "V"],
    &["I", "V", "IV", "V"],
    &["I", "ii", "IV", "V"],
    &["I", "IV", "vi", "V"],
];
const POP_MINOR: &[&[&str]] = &[
    &["i", "VI", "III", "VII"],
    &["i", "iv", "v", "i"],
    &["i", "iv", "VII", "i"],
    &["i", "VI", "iv", "v"],
];
const NORMAL_BRIDGE_MAJOR: &[&[&str]] = &[
    &["IV", "I", "ii", "V"],
    &["vi", "IV", "I", "V"],
    &["IV", "V", "I"],
];
const NORMAL_BRIDGE_MINOR: &[&[&str]] = &[
    &["VI", "III", "iv", "v"],
    &["iv", "VII", "III", "VI"],
    &["VI", "VII", "i"],
];
const ALT_BRIDGE_MAJOR: &[&[&str]] = &[&["iii", "vi", "ii", "V"], &["IV", "V/IV", "IV", "I"]];
const ALT_BRIDGE_MINOR: &[&[&str]] = &[&["iv", "VII", "III", "VI"], &["bVI", "bVII", "i", "i"]];

/// Progression shapes available to a section.
fn shape_pool(mood: &str, major: bool, clean: &str) -> Vec<&'static [&'static str]> {
    let normal = mood == "very_normal_person";
    let bridge = clean == "bridge" || clean == "middle8" || (!normal && clean == "bridge-mod");
    match (normal, major, bridge) {
        (true, true, true) => NORMAL_BRIDGE_MAJOR.to_vec(),
        (true, false, true) => NORMAL_BRIDGE_MINOR.to_vec(),
        (false, true, true) => ALT_BRIDGE_MAJOR.to_vec(),
        (false, false, true) => ALT_BRIDGE_MINOR.to_vec(),
        (true, true, false) => POP_MAJOR.to_vec(),
        (true, false, false) => POP_MINOR.to_vec(),
        (false, true, false) => {
            let mut v = POP_MAJOR.to_vec();
            v.push(&["I", "iii", "IV", "V"]);
            v
        }
        (false, false, false) => {
            let mut v = POP_MINOR.to_vec();
            v.push(&["i", "bII", "v", "i"]);
            v
        }
    }
}

/// Diatonic sets needed to resolve roman numerals, including borrowed modes.
struct NumeralTable {
    diatonic: Vec<String>,
    phrygian: Vec<String>,
    dorian: Vec<String>,
    lydian: Vec<String>,
}

impl NumeralTable {
    fn new(root: &str, mode: &str, sevenths: bool) -> Self {
        Self {
            diatonic: theory::diatonic_chords(root, mode, sevenths),
            phrygian: theory::diatonic_chords(root, "Phrygian", sevenths),
            dorian: theory::diatonic_chords(root, "Dorian", sevenths),
            lydian: theory::diatonic_chords(root, "Lydian", sevenths),
        }
    }

    fn tonic(&self) -> Option<&String> {
        self.diatonic.first()
    }

    /// Resolve a numeral; secondary dominants and flat-degree borrowings have
    /// no entry and resolve to the tonic.
    fn resolve(&self, numeral: &str) -> Option<&String> {
        let borrowed = match numeral {
            "bII" => self.phrygian.get(1),
            "IVDorian" => self.dorian.get(3),
            "ILydian" => self.lydian.first(),
            "IV#Lydian" => self.lydian.get(3),
            "IILydian" => self.lydian.get(1),
            _ => None,
        };
        if borrowed.is_some() {
            return borrowed;
        }
        let degree = match numeral.to_ascii_lowercase().as_str() {
            "i" => Some(0),
            "ii" => Some(1),
            "iii" => Some(2),
            "iv" => Some(3),
            "v" => Some(4),
            "vi" => Some(5),
            "vii" => Some(6),
            _ => None,
        };
        degree.and_then(|d| self.diatonic.get(d)).or_else(|| self.tonic())
    }
}

/// Mode used for diatonic chord generation.
fn harmonic_mode(key: &Key) -> &'static str {
    match theory::scale_by_name(&key.mode) {
        Some(scale) if scale.intervals.len() >= 7 => scale.name,
        Some(scale) if scale.kind == ScaleKind::Major => "Ionian",
        Some(_) => "Aeolian",
        None => {
            let lower = key.mode.to_lowercase();
            if ["minor", "aeolian", "dorian", "phrygian"].iter().any(|m| lower.contains(m)) {
                "Aeolian"
            } else {
                "Ionian"
            }
        }
    }
}

/// Mood-weighted chord coloring.
pub fn colorize<R: RandomSource>(chord: &str, mood: &str, key: &Key, rng: &mut R) -> String {
    let parsed = theory::parse_chord(chord);
    let root = parsed.root.as_str();
    let suffix = parsed.suffix.as_str();
    if mood == "very_normal_person" {
        if rng.random_bool(0.1) {
            match suffix {
                "" => return format!("{root}7"),
                "m" => return format!("{root}m7"),
                _ => {}
            }
        }
        return chord.to_string();
    }
    if !rng.random_bool(0.35) {
        return chord.to_string();
    }
    let new_suffix = match suffix {
        "m" | "m7" => {
            if mood == "ansioso_distopico" && suffix == "m" && rng.random_bool(0.5) {
                "mmaj7"
            } else {
                pick_str(&["m7", "madd9", "mmaj7"], rng)
            }
        }
        "" | "maj7" => {
            let lydian = key.mode == "Lydian" && rng.random_bool(0.6);
            if lydian || (mood == "etereo_sognante" && rng.random_bool(0.4)) {
                "maj7#11"
            } else {
                pick_str(&["maj7", "add9"], rng)
            }
        }
        "7" if rng.random_bool(0.4) => "sus4",
        other => other,
    };
    format!("{root}{new_suffix}")
}

fn pick_str<R: RandomSource>(options: &[&'static str], rng: &mut R) -> &'static str {
    options[rng.range_usize(0, options.len())]
}

const MODE_NAMES: [&str; 7] = [
    "Lydian",
    "Dorian",
    "Phrygian",
    "Aeolian",
    "Mixolydian",
    "Ionian",
    "Locrian",
];

/// Final clean-up applied to every produced chord.
fn finalize(chord: &str) -> String {
    let mut cleaned = chord.trim().to_string();
    for mode in MODE_NAMES {
        cleaned = cleaned.replace(mode, "");
    }
    theory::normalize_to_sharps(&cleaned)
}

/// Light variation of a cached progression.
pub fn vary_progression<R: RandomSource>(
    progression: &[String],
    mood: &str,
    key: &Key,
    rng: &mut R,
) -> Vec<String> {
    let mut out = progression.to_vec();
    let Some(last) = out.last().cloned() else {
        return out;
    };
    if rng.random_bool(0.5) {
        if rng.random_bool(0.5) && out.len() > 1 {
            out.pop();
        } else {
            out.push(last);
        }
    } else if let Some(slot) = out.last_mut() {
        *slot = finalize(&colorize(&last, mood, key, rng));
    }
    out
}

/// Inputs shared by every section's progression in one song.
pub struct HarmonyContext<'a> {
    pub key: &'a Key,
    pub mood: &'a str,
    pub config: &'a HarmonyConfig,
}

/// Base progression for one section, using and updating the cache and
/// recording every produced chord. Empty only for silent sections.
pub fn generate_section_progression<R: RandomSource>(
    section_name: &str,
    ctx: &HarmonyContext<'_>,
    accumulator: &mut ChordAccumulator,
    cache: &mut ProgressionCache,
    rng: &mut R,
) -> Vec<String> {
    let clean = clean_section_name(section_name);
    if let Some(cached) = cache.get(&clean) {
        let progression = if rng.random_bool(ctx.config.vary_probability) {
            vary_progression(cached, ctx.mood, ctx.key, rng)
        } else {
            cached.clone()
        };
        debug!(section = section_name, ?progression, "reused cached progression");
        accumulator.record_all(&progression);
        return progression;
    }

    let progression = fresh_progression(section_name, &clean, ctx, rng);
    accumulator.record_all(&progression);
    debug!(section = section_name, ?progression, "generated progression");
    if !progression.is_empty() {
        cache.insert(clean, progression.clone());
    }
    progression
}

fn fresh_progression<R: RandomSource>(
    section_name: &str,
    clean: &str,
    ctx: &HarmonyContext<'_>,
    rng: &mut R,
) -> Vec<String> {
    let length = progression_length(section_name, rng);
    if length == 0 {
        return Vec::new();
    }

    let mode = harmonic_mode(ctx.key);
    let major = theory::scale_by_name(mode).is_some_and(|s| s.kind == ScaleKind::Major);
    let seventh_chance = if ctx.mood == "very_normal_person" { 0.3 } else { 0.75 };
    let sevenths = rng.random_bool(seventh_chance);
    let table = NumeralTable::new(&ctx.key.root, mode, sevenths);

    if table.tonic().is_none() {
        let fallback = format!("{}{}", ctx.key.root, if major { "" } else { "m" });
        warn!(
            key = %ctx.key.display_name(),
            chord = %fallback,
            "no diatonic chords, using tonic triad"
        );
        return vec![finalize(&fallback)];
    }

    let pool = shape_pool(ctx.mood, major, clean);
    let shape = pool[rng.range_usize(0, pool.len())];
    (0..length)
        .map(|i| {
            let numeral = shape[i % shape.len()];
            let chord = table
                .resolve(numeral)
                .cloned()
                .unwrap_or_else(|| ctx.key.root.clone());
            finalize(&colorize(&chord, ctx.mood, ctx.key, rng))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use capric_prng::{GameRng, ScriptedRng};

    fn ctx<'a>(key: &'a Key, mood: &'a str, config: &'a HarmonyConfig) -> HarmonyContext<'a> {
        HarmonyContext { key, mood, config }
    }

    #[test]
    fn test_chord_targets_lookup_is_case_insensitive() {
        assert_eq!(chord_targets("VERSE 2"), targets(2, 2, 4, 8));
        assert_eq!(chord_targets("Bridge (modulato)"), targets(2, 2, 4, 8));
        assert_eq!(chord_targets("Unknown Thing"), DEFAULT_TARGETS);
    }

    #[test]
    fn test_progression_lengths() {
        let mut rng = GameRng::new(8);
        for _ in 0..50 {
            assert_eq!(progression_length("Silence", &mut rng), 0);
            let verse = progression_length("Verse 1", &mut rng);
            assert!((4..=8).contains(&verse));
            assert_eq!(progression_length("Final Shout", &mut rng), 1);
            // A typical range of 0..=1 still yields one chord.
            assert_eq!(progression_length("Noise", &mut rng), 1);
        }
    }

    #[test]
    fn test_numeral_resolution() {
        let table = NumeralTable::new("C", "Ionian", false);
        assert_eq!(table.resolve("V").unwrap(), "G");
        assert_eq!(table.resolve("vi").unwrap(), "Am");
        assert_eq!(table.resolve("bII").unwrap(), "C#");
        assert_eq!(table.resolve("IV#Lydian").unwrap(), "F#dim");
        // Unresolvable numerals fall back to the tonic.
        assert_eq!(table.resolve("V/IV").unwrap(), "C");
        assert_eq!(table.resolve("bVII").unwrap(), "C");
    }

    #[test]
    fn test_pentatonic_keys_borrow_seven_note_modes() {
        assert_eq!(harmonic_mode(&Key::new("A", "Minor Pentatonic").unwrap()), "Aeolian");
        assert_eq!(harmonic_mode(&Key::new("C", "Blues Major Pentatonic").unwrap()), "Ionian");
        assert_eq!(harmonic_mode(&Key::new("E", "Locrian").unwrap()), "Locrian");
    }

    #[test]
    fn test_generated_chords_are_sharp_and_recorded() {
        let key = Key::new("Bb", "Ionian").unwrap();
        let config = HarmonyConfig::default();
        let mut acc = ChordAccumulator::new();
        let mut cache = ProgressionCache::new();
        let mut rng = GameRng::new(17);
        for name in ["Verse 1", "Chorus 1", "Bridge"] {
            let context = ctx(&key, "etereo_sognante", &config);
            let prog = generate_section_progression(name, &context, &mut acc, &mut cache, &mut rng);
            assert!(!prog.is_empty());
            for chord in &prog {
                assert!(!chord.contains('b') || chord.contains("b5"), "flat spelling in {chord}");
                assert!(acc.contains(chord));
                let parsed = theory::parse_chord(chord);
                assert!(theory::quality_by_suffix(&parsed.suffix).is_some(), "{chord}");
            }
        }
    }

    #[test]
    fn test_cache_replays_same_type() {
        let key = Key::new("C", "Ionian").unwrap();
        let config = HarmonyConfig { vary_probability: 0.0 };
        let mut acc = ChordAccumulator::new();
        let mut cache = ProgressionCache::new();
        let mut rng = GameRng::new(4);
        let c = ctx(&key, "very_normal_person", &config);
        let first = generate_section_progression("Chorus 1", &c, &mut acc, &mut cache, &mut rng);
        let second = generate_section_progression("Chorus 2", &c, &mut acc, &mut cache, &mut rng);
        assert_eq!(first, second);
        assert_eq!(cache.get("chorus"), Some(&first));
    }

    #[test]
    fn test_silence_has_no_chords() {
        let key = Key::new("C", "Ionian").unwrap();
        let config = HarmonyConfig::default();
        let mut acc = ChordAccumulator::new();
        let mut cache = ProgressionCache::new();
        let mut rng = GameRng::new(4);
        let prog = generate_section_progression(
            "Silence",
            &ctx(&key, "sperimentale_astratto", &config),
            &mut acc,
            &mut cache,
            &mut rng,
        );
        assert!(prog.is_empty());
        assert!(acc.is_empty());
    }

    #[test]
    fn test_vary_progression_changes_tail_only() {
        let key = Key::new("C", "Ionian").unwrap();
        let base: Vec<String> = ["C", "G", "Am", "F"].iter().map(|s| s.to_string()).collect();
        // 0.1 < 0.5: vary length; 0.1 < 0.5 and len > 1: pop.
        let mut rng = ScriptedRng::from_unit(&[0.1, 0.1]);
        let varied = vary_progression(&base, "very_normal_person", &key, &mut rng);
        assert_eq!(varied, base[..3].to_vec());
        // 0.1 then 0.9: duplicate the last chord.
        let mut rng = ScriptedRng::from_unit(&[0.1, 0.9]);
        let grown = vary_progression(&base, "very_normal_person", &key, &mut rng);
        assert_eq!(grown.len(), 5);
        assert_eq!(grown[4], "F");
        // 0.9: recolor path keeps the length and the prefix.
        let mut rng = ScriptedRng::from_unit(&[0.9, 0.05]);
        let recolored = vary_progression(&base, "very_normal_person", &key, &mut rng);
        assert_eq!(recolored[..3], base[..3]);
        assert_eq!(recolored[3], "F7");
    }
}
