// Music theory primitives: note names, chord qualities, scales, diatonic
// chord derivation, and the `TheoryHelpers` bundle the generators receive.
//
// Pitch classes are `u8` in 0..12 with C = 0. Chord symbols are plain
// strings ("Am7", "F#maj7#11"); they are parsed on demand into a root name and
// a quality suffix and never cached in resolved form. Every symbol that leaves
// the harmony stage is spelled with sharps (see `normalize_to_sharps`).
//
// Used by harmony.rs for progression building, by every track generator for
// chord/scale membership, and by summary.rs for the chord glossary.

use capric_prng::RandomSource;
use serde::{Deserialize, Serialize};

pub const NOTE_NAMES_SHARP: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];
pub const NOTE_NAMES_FLAT: [&str; 12] = [
    "C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B",
];

/// Roots whose scales are conventionally spelled with flats.
const FLAT_ROOTS: [&str; 6] = ["F", "Bb", "Eb", "Ab", "Db", "Gb"];

/// Pitch class of a note name, accepting either spelling.
pub fn note_index(name: &str) -> Option<u8> {
    NOTE_NAMES_SHARP
        .iter()
        .position(|n| *n == name)
        .or_else(|| NOTE_NAMES_FLAT.iter().position(|n| *n == name))
        .map(|i| i as u8)
}

pub fn note_name(pc: i32, use_flats: bool) -> &'static str {
    let idx = pc.rem_euclid(12) as usize;
    if use_flats {
        NOTE_NAMES_FLAT[idx]
    } else {
        NOTE_NAMES_SHARP[idx]
    }
}

pub fn prefers_flats(root: &str) -> bool {
    FLAT_ROOTS.contains(&root) || (root.len() > 1 && root.ends_with('b'))
}

/// A chord quality: suffix as written in symbols, a readable label for the
/// glossary, and semitone offsets from the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChordQuality {
    pub suffix: &'static str,
    pub label: &'static str,
    pub intervals: &'static [u8],
}

pub const QUALITIES: &[ChordQuality] = &[
    ChordQuality { suffix: "", label: "Major", intervals: &[0, 4, 7] },
    ChordQuality { suffix: "m", label: "Minor", intervals: &[0, 3, 7] },
    ChordQuality { suffix: "maj7", label: "Major 7", intervals: &[0, 4, 7, 11] },
    ChordQuality { suffix: "m7", label: "Minor 7", intervals: &[0, 3, 7, 10] },
    ChordQuality { suffix: "7", label: "Dominant 7", intervals: &[0, 4, 7, 10] },
    ChordQuality { suffix: "sus4", label: "Suspended 4", intervals: &[0, 5, 7] },
    ChordQuality { suffix: "sus2", label: "Suspended 2", intervals: &[0, 2, 7] },
    ChordQuality { suffix: "dim", label: "Diminished", intervals: &[0, 3, 6] },
    ChordQuality { suffix: "aug", label: "Augmented", intervals: &[0, 4, 8] },
    ChordQuality { suffix: "add9", label: "Add 9 (Major)", intervals: &[0, 4, 7, 14] },
    ChordQuality { suffix: "madd9", label: "Minor Add 9", intervals: &[0, 3, 7, 14] },
    ChordQuality { suffix: "mmaj7", label: "Minor (Major 7)", intervals: &[0, 3, 7, 11] },
    ChordQuality { suffix: "maj7#11", label: "Major 7 (#11)", intervals: &[0, 4, 7, 11, 18] },
    ChordQuality { suffix: "m7b5", label: "Minor 7 (b5)", intervals: &[0, 3, 6, 10] },
    ChordQuality { suffix: "dim7", label: "Diminished 7", intervals: &[0, 3, 6, 9] },
    ChordQuality { suffix: "m7sus4", label: "Minor 7 Sus 4", intervals: &[0, 5, 7, 10] },
    ChordQuality { suffix: "maj7sus4", label: "Major 7 Sus 4", intervals: &[0, 5, 7, 11] },
];

pub fn quality_by_suffix(suffix: &str) -> Option<&'static ChordQuality> {
    QUALITIES.iter().find(|q| q.suffix == suffix)
}

/// A chord symbol split into root note name and quality suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedChord {
    pub root: String,
    pub suffix: String,
}

/// Split a symbol at the end of its root (`[A-G][#b]?`). A symbol that does
/// not start with a note letter comes back whole as the root.
pub fn parse_chord(symbol: &str) -> ParsedChord {
    let symbol = symbol.trim();
    let bytes = symbol.as_bytes();
    if bytes.is_empty() || !(b'A'..=b'G').contains(&bytes[0]) {
        return ParsedChord {
            root: symbol.to_string(),
            suffix: String::new(),
        };
    }
    let root_len = if bytes.len() > 1 && (bytes[1] == b'#' || bytes[1] == b'b') {
        2
    } else {
        1
    };
    ParsedChord {
        root: symbol[..root_len].to_string(),
        suffix: symbol[root_len..].to_string(),
    }
}

/// Constituent notes of a chord, as shown in the glossary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChordNotes {
    pub name: String,
    pub quality_label: &'static str,
    /// Root-position note names, sharps.
    pub notes: Vec<String>,
    pub pitch_classes: Vec<u8>,
}

/// Resolve root + suffix. Unknown suffixes and unknown roots degrade to the
/// root alone.
pub fn chord_notes(root: &str, suffix: &str) -> ChordNotes {
    let name = format!("{root}{suffix}");
    let quality = quality_by_suffix(suffix);
    let (Some(quality), Some(root_pc)) = (quality, note_index(root)) else {
        return ChordNotes {
            name,
            quality_label: quality.map_or("Unknown", |q| q.label),
            notes: vec![root.to_string()],
            pitch_classes: note_index(root).into_iter().collect(),
        };
    };
    let pitch_classes: Vec<u8> = quality
        .intervals
        .iter()
        .map(|i| (root_pc + i) % 12)
        .collect();
    ChordNotes {
        name,
        quality_label: quality.label,
        notes: pitch_classes
            .iter()
            .map(|pc| NOTE_NAMES_SHARP[*pc as usize].to_string())
            .collect(),
        pitch_classes,
    }
}

/// Rewrite a symbol's root with sharps. A suffix that is not a known quality
/// is dropped and only the root survives.
pub fn normalize_to_sharps(symbol: &str) -> String {
    let parsed = parse_chord(symbol);
    if parsed.root.is_empty() {
        return symbol.trim().to_string();
    }
    let root = match note_index(&parsed.root) {
        Some(pc) => NOTE_NAMES_SHARP[pc as usize].to_string(),
        None => parsed.root.clone(),
    };
    let suffix = parsed.suffix.trim();
    if quality_by_suffix(suffix).is_none() {
        return root;
    }
    format!("{root}{suffix}")
}

/// Rotate a voicing: level 1 moves the lowest note to the top.
pub fn inversion<T: Clone>(notes: &[T], level: usize) -> Vec<T> {
    if notes.is_empty() {
        return Vec::new();
    }
    let level = level % notes.len();
    let mut out = notes[level..].to_vec();
    out.extend_from_slice(&notes[..level]);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleKind {
    Major,
    Minor,
    Diminished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleDef {
    pub name: &'static str,
    pub intervals: &'static [u8],
    pub kind: ScaleKind,
}

pub const SCALES: &[ScaleDef] = &[
    ScaleDef { name: "Ionian", intervals: &[0, 2, 4, 5, 7, 9, 11], kind: ScaleKind::Major },
    ScaleDef { name: "Dorian", intervals: &[0, 2, 3, 5, 7, 9, 10], kind: ScaleKind::Minor },
    ScaleDef { name: "Phrygian", intervals: &[0, 1, 3, 5, 7, 8, 10], kind: ScaleKind::Minor },
    ScaleDef { name: "Lydian", intervals: &[0, 2, 4, 6, 7, 9, 11], kind: ScaleKind::Major },
    ScaleDef { name: "Mixolydian", intervals: &[0, 2, 4, 5, 7, 9, 10], kind: ScaleKind::Major },
    ScaleDef { name: "Aeolian", intervals: &[0, 2, 3, 5, 7, 8, 10], kind: ScaleKind::Minor },
    ScaleDef { name: "Locrian", intervals: &[0, 1, 3, 5, 6, 8, 10], kind: ScaleKind::Diminished },
    ScaleDef { name: "Harmonic Minor", intervals: &[0, 2, 3, 5, 7, 8, 11], kind: ScaleKind::Minor },
    ScaleDef {
        name: "Melodic Minor (Asc)",
        intervals: &[0, 2, 3, 5, 7, 9, 11],
        kind: ScaleKind::Minor,
    },
    ScaleDef { name: "Major Pentatonic", intervals: &[0, 2, 4, 7, 9], kind: ScaleKind::Major },
    ScaleDef { name: "Minor Pentatonic", intervals: &[0, 3, 5, 7, 10], kind: ScaleKind::Minor },
    ScaleDef {
        name: "Blues Minor Pentatonic",
        intervals: &[0, 3, 5, 6, 7, 10],
        kind: ScaleKind::Minor,
    },
    ScaleDef {
        name: "Blues Major Pentatonic",
        intervals: &[0, 2, 3, 4, 7, 9],
        kind: ScaleKind::Major,
    },
];

pub fn scale_by_name(name: &str) -> Option<&'static ScaleDef> {
    SCALES.iter().find(|s| s.name == name)
}

/// Note names of `mode` rooted on `root`, spelled per the root's convention.
pub fn scale_note_names(root: &str, mode: &str) -> Option<Vec<String>> {
    let scale = scale_by_name(mode)?;
    let root_pc = note_index(root)? as i32;
    let flats = prefers_flats(root);
    Some(
        scale
            .intervals
            .iter()
            .map(|i| note_name(root_pc + *i as i32, flats).to_string())
            .collect(),
    )
}

/// Triads (or sevenths) built on each degree of a seven-note mode. Degrees
/// whose stacked thirds match no known quality keep the bare root.
pub fn diatonic_chords(root: &str, mode: &str, sevenths: bool) -> Vec<String> {
    let (Some(scale), Some(root_pc)) = (scale_by_name(mode), note_index(root)) else {
        return Vec::new();
    };
    if scale.intervals.len() < 7 {
        return Vec::new();
    }
    let iv = scale.intervals;
    let flats = prefers_flats(root);
    let step = |from: usize, by: usize| {
        (iv[(from + by) % 7] as i32 - iv[from] as i32).rem_euclid(12)
    };

    (0..7)
        .map(|i| {
            let name = note_name(root_pc as i32 + iv[i] as i32, flats);
            let (third, fifth, seventh) = (step(i, 2), step(i, 4), step(i, 6));
            let triad = match (third, fifth) {
                (4, 7) => Some(""),
                (3, 7) => Some("m"),
                (3, 6) => Some("dim"),
                (4, 8) => Some("aug"),
                _ => None,
            };
            let suffix = match (triad, sevenths, seventh) {
                (Some(""), true, 11) => "maj7",
                (Some(""), true, 10) => "7",
                (Some("m"), true, 10) => "m7",
                (Some("m"), true, 11) => "mmaj7",
                (Some("dim"), true, 10) => "m7b5",
                (Some("dim"), true, 9) => "dim7",
                (Some(t), _, _) => t,
                (None, _, _) => "",
            };
            format!("{name}{suffix}")
        })
        .collect()
}

/// The song's tonal center.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    pub root: String,
    pub mode: String,
    /// Scale-degree note names; element 0 is the root.
    pub notes: Vec<String>,
}

impl Key {
    /// Build a key, returning `None` for an unknown root or mode.
    pub fn new(root: &str, mode: &str) -> Option<Self> {
        let notes = scale_note_names(root, mode)?;
        Some(Self {
            root: root.to_string(),
            mode: mode.to_string(),
            notes,
        })
    }

    pub fn root_pc(&self) -> u8 {
        note_index(&self.root).unwrap_or(0)
    }

    pub fn kind(&self) -> ScaleKind {
        scale_by_name(&self.mode).map_or(ScaleKind::Major, |s| s.kind)
    }

    pub fn pitch_classes(&self) -> Vec<u8> {
        self.notes.iter().filter_map(|n| note_index(n)).collect()
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.root, self.mode)
    }
}

/// C Ionian, used when no requested or drawn key resolves.
impl Default for Key {
    fn default() -> Self {
        Self {
            root: "C".into(),
            mode: "Ionian".into(),
            notes: ["C", "D", "E", "F", "G", "A", "B"].iter().map(|n| n.to_string()).collect(),
        }
    }
}

/// Theory lookups handed to every generator, plus uniform random choice.
pub trait TheoryHelpers {
    fn parse_chord(&self, symbol: &str) -> ParsedChord {
        parse_chord(symbol)
    }

    fn chord_notes(&self, symbol: &str) -> ChordNotes {
        let parsed = parse_chord(symbol);
        chord_notes(&parsed.root, &parsed.suffix)
    }

    /// Note names of a scale, or `None` if the root or mode is unknown.
    fn scale_notes(&self, root: &str, mode: &str) -> Option<Vec<String>> {
        scale_note_names(root, mode)
    }

    fn pick<'a, T, R: RandomSource>(&self, items: &'a [T], rng: &mut R) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        items.get(rng.range_usize(0, items.len()))
    }
}

/// The stock theory bundle.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardTheory;

impl TheoryHelpers for StandardTheory {}
