// Mood profiles and the per-mood tables that shape a song before any notes
// exist: allowed scales, style notes, meter probabilities, tempo ranges, and
// the catalogue of candidate keys.

use capric_prng::RandomSource;
use tracing::warn;

use crate::timeline::TimeSignature;

/// The mood used whenever an unsupported mood name is requested.
pub const DEFAULT_MOOD: &str = "very_normal_person";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoodProfile {
    pub name: &'static str,
    pub scales: &'static [&'static str],
    pub style_notes: &'static str,
}

pub const MOODS: &[MoodProfile] = &[
    MoodProfile {
        name: "very_normal_person",
        scales: &["Ionian", "Aeolian", "Mixolydian", "Major Pentatonic", "Minor Pentatonic"],
        style_notes: "Classic pop/rock progressions, predictable structures, familiar sounds.",
    },
    MoodProfile {
        name: "malinconico_introspettivo",
        scales: &["Aeolian", "Dorian", "Harmonic Minor", "Minor Pentatonic"],
        style_notes: "Rarefied atmospheres, use of reverbs, dynamics from piano to mezzoforte, \
                      descending melodies.",
    },
    MoodProfile {
        name: "ansioso_distopico",
        scales: &["Phrygian", "Locrian", "Harmonic Minor", "Blues Minor Pentatonic"],
        style_notes: "Tense or irregular rhythms, dissonant or ambiguous harmonies, \
                      processed sounds, sudden crescendos.",
    },
    MoodProfile {
        name: "etereo_sognante",
        scales: &["Lydian", "Ionian", "Major Pentatonic", "Dorian"],
        style_notes: "Open chords (add9, maj7), arpeggios, synth pads, Lydian soundscapes, \
                      echoing vocals.",
    },
    MoodProfile {
        name: "arrabbiato_critico",
        scales: &["Minor Pentatonic", "Blues Minor Pentatonic", "Aeolian", "Phrygian"],
        style_notes: "Strong dynamics, power chords or distortion, straight or syncopated rhythms, \
                      possible tempo shifts.",
    },
    MoodProfile {
        name: "sperimentale_astratto",
        scales: &["Melodic Minor (Asc)", "Locrian", "Lydian"],
        style_notes: "Unconventional structures, use of silence, sound design, chromatic or atonal \
                      harmonies, textures.",
    },
];

/// Look up a mood, falling back to `very_normal_person` with a warning.
pub fn mood_profile(name: &str) -> &'static MoodProfile {
    if let Some(m) = MOODS.iter().find(|m| m.name == name) {
        return m;
    }
    warn!(mood = name, "unsupported mood, using {DEFAULT_MOOD}");
    &MOODS[0]
}

/// Short tag used by the drum library's mood filter ("very_normal",
/// "malinconico", ...).
pub fn mood_tag(name: &str) -> &str {
    match name {
        "very_normal_person" => "very_normal",
        other => other.split('_').next().unwrap_or(other),
    }
}

/// One meter option in a mood's table.
#[derive(Debug, Clone, Copy)]
pub struct MeterOption {
    pub ts: TimeSignature,
    pub probability: f64,
    pub section_change_probability: f64,
    pub allowed_next: &'static [TimeSignature],
}

const fn ts(beats: u8, unit: u8) -> TimeSignature {
    TimeSignature { beats, beat_unit: unit }
}

const fn opt(
    beats: u8,
    unit: u8,
    probability: f64,
    section_change_probability: f64,
    allowed_next: &'static [TimeSignature],
) -> MeterOption {
    MeterOption {
        ts: ts(beats, unit),
        probability,
        section_change_probability,
        allowed_next,
    }
}

const NORMAL_METERS: &[MeterOption] = &[
    opt(4, 4, 0.90, 0.05, &[ts(3, 4)]),
    opt(3, 4, 0.10, 0.02, &[ts(4, 4)]),
];

const MELANCHOLIC_METERS: &[MeterOption] = &[
    opt(4, 4, 0.60, 0.20, &[ts(3, 4), ts(6, 8), ts(2, 4)]),
    opt(3, 4, 0.20, 0.15, &[ts(4, 4), ts(6, 8)]),
    opt(6, 8, 0.15, 0.10, &[ts(4, 4), ts(3, 4), ts(12, 8)]),
    opt(2, 4, 0.05, 0.10, &[ts(4, 4)]),
    opt(12, 8, 0.00, 0.05, &[ts(4, 4), ts(6, 8)]),
];

const ANGRY_METERS: &[MeterOption] = &[
    opt(4, 4, 0.70, 0.15, &[ts(3, 4), ts(2, 4), ts(6, 8)]),
    opt(3, 4, 0.10, 0.10, &[ts(4, 4), ts(2, 4)]),
    opt(2, 4, 0.10, 0.05, &[ts(4, 4)]),
    opt(6, 8, 0.05, 0.05, &[ts(4, 4), ts(12, 8)]),
    opt(12, 8, 0.05, 0.05, &[ts(4, 4), ts(6, 8)]),
];

const ANXIOUS_METERS: &[MeterOption] = &[
    opt(4, 4, 0.25, 0.35, &[ts(5, 4), ts(7, 8), ts(3, 4), ts(6, 8), ts(5, 8), ts(9, 8), ts(2, 4)]),
    opt(3, 4, 0.10, 0.25, &[ts(4, 4), ts(6, 8), ts(5, 4), ts(7, 8)]),
    opt(6, 8, 0.10, 0.25, &[ts(4, 4), ts(7, 8), ts(9, 8), ts(12, 8), ts(5, 8)]),
    opt(5, 4, 0.20, 0.20, &[ts(4, 4), ts(7, 8), ts(3, 4), ts(6, 8)]),
    opt(7, 8, 0.20, 0.20, &[ts(4, 4), ts(5, 4), ts(6, 8), ts(9, 8), ts(5, 8)]),
    opt(9, 8, 0.05, 0.15, &[ts(6, 8), ts(12, 8), ts(4, 4), ts(7, 8)]),
    opt(5, 8, 0.05, 0.15, &[ts(4, 4), ts(6, 8), ts(7, 8)]),
    opt(2, 4, 0.00, 0.10, &[ts(4, 4), ts(5, 4)]),
    opt(12, 8, 0.05, 0.10, &[ts(6, 8), ts(4, 4), ts(9, 8)]),
];

const ETHEREAL_METERS: &[MeterOption] = &[
    opt(4, 4, 0.30, 0.30, &[ts(6, 8), ts(3, 4), ts(12, 8), ts(5, 4), ts(7, 8), ts(9, 8)]),
    opt(6, 8, 0.25, 0.20, &[ts(4, 4), ts(12, 8), ts(9, 8), ts(3, 4), ts(7, 8)]),
    opt(3, 4, 0.15, 0.15, &[ts(4, 4), ts(6, 8), ts(5, 4)]),
    opt(12, 8, 0.15, 0.10, &[ts(4, 4), ts(6, 8), ts(9, 8)]),
    opt(5, 4, 0.05, 0.10, &[ts(4, 4), ts(6, 8), ts(3, 4)]),
    opt(7, 8, 0.05, 0.10, &[ts(4, 4), ts(6, 8), ts(9, 8)]),
    opt(9, 8, 0.05, 0.05, &[ts(6, 8), ts(12, 8), ts(4, 4)]),
];

const EXPERIMENTAL_METERS: &[MeterOption] = &[
    opt(
        4,
        4,
        0.20,
        0.40,
        &[ts(3, 4), ts(6, 8), ts(2, 4), ts(5, 4), ts(7, 8), ts(9, 8), ts(5, 8), ts(12, 8)],
    ),
    opt(3, 4, 0.10, 0.30, &[ts(4, 4), ts(6, 8), ts(5, 4), ts(2, 4), ts(7, 8)]),
    opt(6, 8, 0.10, 0.30, &[ts(4, 4), ts(12, 8), ts(9, 8), ts(7, 8), ts(5, 8), ts(3, 4)]),
    opt(2, 4, 0.10, 0.25, &[ts(4, 4), ts(3, 4), ts(5, 4)]),
    opt(5, 4, 0.15, 0.25, &[ts(4, 4), ts(7, 8), ts(3, 4), ts(2, 4), ts(6, 8)]),
    opt(7, 8, 0.15, 0.25, &[ts(4, 4), ts(5, 4), ts(6, 8), ts(9, 8), ts(5, 8), ts(3, 4)]),
    opt(9, 8, 0.05, 0.20, &[ts(6, 8), ts(12, 8), ts(4, 4), ts(7, 8)]),
    opt(5, 8, 0.05, 0.20, &[ts(4, 4), ts(6, 8), ts(7, 8), ts(9, 8)]),
    opt(12, 8, 0.10, 0.15, &[ts(6, 8), ts(4, 4), ts(9, 8)]),
];

pub fn meter_table(mood: &str) -> &'static [MeterOption] {
    match mood {
        "malinconico_introspettivo" => MELANCHOLIC_METERS,
        "arrabbiato_critico" => ANGRY_METERS,
        "ansioso_distopico" => ANXIOUS_METERS,
        "etereo_sognante" => ETHEREAL_METERS,
        "sperimentale_astratto" => EXPERIMENTAL_METERS,
        _ => NORMAL_METERS,
    }
}

/// Draw the opening meter by cumulative probability; 4/4 if the walk falls
/// off the end of the table.
pub fn pick_base_meter<R: RandomSource>(mood: &str, rng: &mut R) -> TimeSignature {
    let roll = rng.next_f64();
    let mut cumulative = 0.0;
    for option in meter_table(mood) {
        cumulative += option.probability;
        if roll < cumulative {
            return option.ts;
        }
    }
    TimeSignature::COMMON
}

/// Possibly move to a new meter at a section boundary.
pub fn next_section_meter<R: RandomSource>(
    mood: &str,
    previous: TimeSignature,
    rng: &mut R,
) -> TimeSignature {
    let table = meter_table(mood);
    let Some(current) = table.iter().find(|o| o.ts == previous).or(table.first()) else {
        return previous;
    };
    if current.allowed_next.is_empty() || !rng.random_bool(current.section_change_probability) {
        return previous;
    }
    current.allowed_next[rng.range_usize(0, current.allowed_next.len())]
}

/// Tempo feels with a BPM range.
pub const TEMPO_FEELS: [&str; 3] = ["lento_atmosferico", "mid_tempo_groove", "incalzante_energico"];

/// BPM for a tempo feel; 120 for anything unrecognized.
pub fn pick_bpm<R: RandomSource>(tempo_feel: &str, rng: &mut R) -> u32 {
    let (lo, hi) = match tempo_feel {
        "lento_atmosferico" => (60, 85),
        "mid_tempo_groove" => (90, 115),
        "incalzante_energico" => (120, 150),
        _ => return 120,
    };
    rng.range_usize_inclusive(lo, hi) as u32
}

/// (root, mode) pairs a song may be written in.
pub const CANDIDATE_KEYS: &[(&str, &str)] = &[
    ("C", "Ionian"), ("G", "Ionian"), ("D", "Ionian"), ("A", "Ionian"), ("E", "Ionian"),
    ("F", "Ionian"), ("Bb", "Ionian"), ("Eb", "Ionian"), ("Ab", "Ionian"), ("Db", "Ionian"),
    ("Gb", "Ionian"), ("B", "Ionian"), ("F#", "Ionian"),
    ("A", "Aeolian"), ("E", "Aeolian"), ("B", "Aeolian"), ("F#", "Aeolian"), ("C#", "Aeolian"),
    ("G#", "Aeolian"), ("D#", "Aeolian"), ("A#", "Aeolian"), ("D", "Aeolian"), ("G", "Aeolian"),
    ("C", "Aeolian"), ("F", "Aeolian"),
    ("D", "Dorian"), ("G", "Dorian"), ("A", "Dorian"), ("E", "Dorian"), ("C", "Dorian"),
    ("E", "Phrygian"), ("A", "Phrygian"), ("B", "Phrygian"),
    ("F", "Lydian"), ("C", "Lydian"), ("G", "Lydian"), ("D", "Lydian"),
    ("G", "Mixolydian"), ("C", "Mixolydian"), ("D", "Mixolydian"), ("A", "Mixolydian"),
    ("E", "Mixolydian"),
    ("A", "Harmonic Minor"), ("E", "Harmonic Minor"), ("D", "Harmonic Minor"),
    ("A", "Melodic Minor (Asc)"), ("C", "Melodic Minor (Asc)"),
    ("C", "Major Pentatonic"), ("G", "Major Pentatonic"), ("D", "Major Pentatonic"),
    ("A", "Major Pentatonic"), ("E", "Major Pentatonic"), ("F", "Major Pentatonic"),
    ("Bb", "Major Pentatonic"),
    ("A", "Minor Pentatonic"), ("E", "Minor Pentatonic"), ("B", "Minor Pentatonic"),
    ("F#", "Minor Pentatonic"), ("C#", "Minor Pentatonic"), ("D", "Minor Pentatonic"),
    ("G", "Minor Pentatonic"),
    ("A", "Blues Minor Pentatonic"), ("E", "Blues Minor Pentatonic"),
    ("G", "Blues Minor Pentatonic"), ("C", "Blues Minor Pentatonic"),
    ("C", "Blues Major Pentatonic"), ("G", "Blues Major Pentatonic"),
];

/// Uniform choice among the candidate keys whose mode the mood allows.
pub fn pick_key<R: RandomSource>(mood: &MoodProfile, rng: &mut R) -> (&'static str, &'static str) {
    let allowed: Vec<(&str, &str)> = CANDIDATE_KEYS
        .iter()
        .copied()
        .filter(|(_, mode)| mood.scales.contains(mode))
        .collect();
    let pool: &[(&str, &str)] = if allowed.is_empty() { CANDIDATE_KEYS } else { &allowed };
    pool[rng.range_usize(0, pool.len())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use capric_prng::GameRng;

    #[test]
    fn test_unknown_mood_falls_back() {
        assert_eq!(mood_profile("jazzy").name, DEFAULT_MOOD);
        assert_eq!(mood_profile("etereo_sognante").name, "etereo_sognante");
    }

    #[test]
    fn test_mood_tags() {
        assert_eq!(mood_tag("very_normal_person"), "very_normal");
        assert_eq!(mood_tag("ansioso_distopico"), "ansioso");
    }

    #[test]
    fn test_picked_key_matches_mood() {
        let mut rng = GameRng::new(5);
        for mood in MOODS {
            for _ in 0..20 {
                let (_, mode) = pick_key(mood, &mut rng);
                assert!(mood.scales.contains(&mode), "{mode} not allowed in {}", mood.name);
            }
        }
    }

    #[test]
    fn test_bpm_ranges() {
        let mut rng = GameRng::new(9);
        for _ in 0..200 {
            let bpm = pick_bpm("lento_atmosferico", &mut rng);
            assert!((60..=85).contains(&bpm));
        }
        assert_eq!(pick_bpm("warp_speed", &mut rng), 120);
    }

    #[test]
    fn test_meter_changes_stay_in_allowed_set() {
        let mut rng = GameRng::new(11);
        let mut meter = TimeSignature::COMMON;
        for _ in 0..500 {
            let next = next_section_meter("sperimentale_astratto", meter, &mut rng);
            if next != meter {
                let option = meter_table("sperimentale_astratto")
                    .iter()
                    .find(|o| o.ts == meter)
                    .unwrap();
                assert!(option.allowed_next.contains(&next));
            }
            meter = next;
        }
    }
}
