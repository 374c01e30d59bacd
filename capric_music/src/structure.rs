// Song form planning: which sections a song has, how many bars each lasts,
// and what meter each one is in.
//
// A structure template is an ordered list of section names ("Intro",
// "Verse 1", "Chorus 1", ...). Names are reduced to a clean key
// (`clean_section_name`) for every table lookup: bar-count guidelines here,
// chord-count targets in harmony.rs, harmonic-rhythm patterns in
// harmonic_rhythm.rs. The clean key is also classified into a coarse
// `SectionKind` that drives drum ride logic, vocal motif capture, and the
// arranger's pattern filter.
//
// Built-in templates are keyed by mood; a JSON template file with the same
// shape can replace them (`StructureLibrary::load`).

use std::path::Path;

use capric_prng::RandomSource;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::moods;
use crate::timeline::TimeSignature;

/// Reduce a display name to its lookup key: "Verse 2" -> "verse",
/// "Bridge (modulato)" -> "bridge-mod", "Chorus (double)" -> "chorusdouble",
/// "Middle 8" -> "middle8".
pub fn clean_section_name(name: &str) -> String {
    let mut s = name.trim().to_lowercase();
    strip_trailing_number(&mut s);
    for (tail, replacement) in [
        ("(double)", "double"),
        ("(modulato)", "-mod"),
        ("(quiet)", "quiet"),
        ("sospeso", "sospeso"),
    ] {
        if let Some(head) = s.strip_suffix(tail) {
            s = format!("{}{}", head.trim_end(), replacement);
            break;
        }
    }
    s.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

/// Drop " 2" or " (2)" from the end. "Middle 8" keeps its number.
fn strip_trailing_number(s: &mut String) {
    if s.trim_end() == "middle 8" {
        return;
    }
    let trimmed = s.trim_end();
    let (head, digits) = match trimmed.strip_suffix(')') {
        Some(inner) => match inner.rfind('(') {
            Some(open) => (&inner[..open], &inner[open + 1..]),
            None => return,
        },
        None => match trimmed.rfind(' ') {
            Some(space) => (&trimmed[..=space], &trimmed[space + 1..]),
            None => return,
        },
    };
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) && head.ends_with(' ') {
        *s = head.trim_end().to_string();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Verse,
    Chorus,
    Bridge,
    Other,
}

impl SectionKind {
    /// Key into the harmonic-rhythm pattern filter.
    pub fn pattern_tag(self) -> &'static str {
        match self {
            SectionKind::Verse => "verse",
            SectionKind::Chorus => "chorus",
            SectionKind::Bridge => "bridge",
            SectionKind::Other => "any",
        }
    }
}

pub fn section_kind(name: &str) -> SectionKind {
    let lower = name.to_lowercase();
    if lower.contains("chorus") && !lower.contains("pre-chorus") && !lower.contains("prechorus") {
        SectionKind::Chorus
    } else if lower.contains("verse") {
        SectionKind::Verse
    } else if lower.contains("bridge") || lower.contains("middle 8") || lower.contains("middle8") {
        SectionKind::Bridge
    } else {
        SectionKind::Other
    }
}

/// Section name fragments that never carry a vocal line.
const INSTRUMENTAL_TERMS: &[&str] = &[
    "intro", "instrumental", "solo", "breakdown", "noise", "glitch", "ambient", "texture",
    "soundscape", "disruption", "reverse", "coda", "outro", "end", "fade", "silence", "drone",
    "sonicinterlude",
];

pub fn is_vocal_section(name: &str) -> bool {
    let squashed: String = name.to_lowercase().chars().filter(|c| !c.is_whitespace()).collect();
    !INSTRUMENTAL_TERMS.iter().any(|t| squashed.contains(t))
}

/// Typical bar range for a section type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarRange {
    pub typical_min: u32,
    pub typical_max: u32,
}

const fn bars(typical_min: u32, typical_max: u32) -> BarRange {
    BarRange { typical_min, typical_max }
}

const DURATION_GUIDELINES: &[(&str, BarRange)] = &[
    ("intro", bars(4, 16)),
    ("verse", bars(8, 16)),
    ("pre-chorus", bars(4, 8)),
    ("chorus", bars(8, 16)),
    ("chorusdouble", bars(16, 32)),
    ("finalchorus", bars(8, 16)),
    ("middle8", bars(8, 8)),
    ("bridge", bars(8, 8)),
    ("bridge-mod", bars(8, 12)),
    ("breakdown", bars(4, 16)),
    ("solo", bars(8, 16)),
    ("guitarsolo", bars(8, 16)),
    ("noisesolo", bars(4, 8)),
    ("glitchsolo", bars(4, 8)),
    ("instrumental", bars(8, 16)),
    ("outro", bars(4, 8)),
    ("outroquiet", bars(4, 8)),
    ("outrosospeso", bars(4, 8)),
    ("screamoutro", bars(4, 8)),
    ("fadeout", bars(8, 12)),
    ("coda", bars(4, 8)),
    ("slamend", bars(1, 4)),
    ("sonicend", bars(1, 4)),
    ("finalshout", bars(1, 2)),
    ("end", bars(1, 4)),
    ("refrain", bars(4, 8)),
    ("interlude", bars(4, 8)),
    ("noiseinterlude", bars(4, 8)),
    ("ambientinterlude", bars(8, 16)),
    ("experimentalinterlude", bars(4, 12)),
    ("droneinterlude", bars(8, 16)),
    ("sonicinterlude", bars(4, 8)),
    ("screaminterlude", bars(2, 4)),
    ("silence", bars(1, 2)),
    ("glitchsection", bars(4, 8)),
    ("glitch", bars(1, 4)),
    ("ambientloop", bars(8, 16)),
    ("texture", bars(8, 12)),
    ("fragment", bars(2, 4)),
    ("spoken", bars(8, 12)),
    ("soundscape", bars(16, 24)),
    ("disruption", bars(2, 4)),
    ("reverse", bars(4, 8)),
    ("noise", bars(4, 8)),
    ("fade", bars(8, 12)),
    ("parta", bars(8, 16)),
    ("partb", bars(8, 16)),
    ("partc", bars(8, 16)),
];

const DEFAULT_BARS: BarRange = bars(4, 8);

/// Look up a per-section-type table by clean name, then by the clean first
/// word of the name.
pub fn lookup_by_section<'a, T>(table: &'a [(&str, T)], name: &str) -> Option<&'a T> {
    let clean = clean_section_name(name);
    let first = name.split_whitespace().next().map(clean_section_name);
    table
        .iter()
        .find(|(k, _)| *k == clean)
        .or_else(|| first.and_then(|f| table.iter().find(|(k, _)| *k == f)))
        .map(|(_, v)| v)
}

pub fn bar_range(name: &str) -> BarRange {
    lookup_by_section(DURATION_GUIDELINES, name).copied().unwrap_or(DEFAULT_BARS)
}

/// A named template, optionally restricted to one mood.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureTemplate {
    pub id: String,
    #[serde(default)]
    pub mood: Option<String>,
    pub structure: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureLibrary {
    pub templates: Vec<StructureTemplate>,
}

fn template(id: &str, mood: &str, sections: &[&str]) -> StructureTemplate {
    StructureTemplate {
        id: id.to_string(),
        mood: Some(mood.to_string()),
        structure: sections.iter().map(|s| s.to_string()).collect(),
    }
}

impl Default for StructureLibrary {
    fn default() -> Self {
        let templates = vec![
            template("pop_classic", "very_normal_person", &[
                "Intro", "Verse 1", "Chorus 1", "Verse 2", "Chorus 2", "Bridge", "Chorus 3",
                "Outro",
            ]),
            template("pop_prechorus", "very_normal_person", &[
                "Intro", "Verse 1", "Pre-Chorus 1", "Chorus 1", "Verse 2", "Pre-Chorus 2",
                "Chorus 2", "Outro",
            ]),
            template("ballad_slow", "malinconico_introspettivo", &[
                "Intro", "Verse 1", "Verse 2", "Chorus 1", "Interlude", "Verse 3", "Chorus 2",
                "Outro (quiet)",
            ]),
            template("ballad_bridge", "malinconico_introspettivo", &[
                "Intro", "Verse 1", "Chorus 1", "Verse 2", "Chorus 2", "Middle 8", "Fade out",
            ]),
            template("tense_build", "ansioso_distopico", &[
                "Intro", "Verse 1", "Pre-Chorus 1", "Chorus 1", "Breakdown", "Verse 2",
                "Chorus 2", "Glitch", "Outro",
            ]),
            template("tense_fragments", "ansioso_distopico", &[
                "Fragment", "Verse 1", "Chorus 1", "Disruption", "Bridge (modulato)", "Chorus 2",
                "Slam End",
            ]),
            template("dream_drift", "etereo_sognante", &[
                "Ambient Interlude", "Verse 1", "Chorus 1", "Verse 2", "Chorus 2",
                "Ambient Loop", "Outro sospeso",
            ]),
            template("dream_arc", "etereo_sognante", &[
                "Intro", "Part A", "Part B", "Chorus 1", "Part A", "Chorus 2", "Coda",
            ]),
            template("angry_punch", "arrabbiato_critico", &[
                "Intro", "Verse 1", "Chorus 1", "Verse 2", "Chorus 2", "Guitar Solo",
                "Chorus (double)", "Final Shout",
            ]),
            template("angry_scream", "arrabbiato_critico", &[
                "Intro", "Verse 1", "Pre-Chorus 1", "Chorus 1", "Scream Interlude", "Verse 2",
                "Chorus 2", "Scream Outro",
            ]),
            template("abstract_parts", "sperimentale_astratto", &[
                "Texture", "Part A", "Noise Interlude", "Part B", "Silence", "Part C",
                "Soundscape",
            ]),
            template("abstract_song", "sperimentale_astratto", &[
                "Intro", "Verse 1", "Experimental Interlude", "Chorus 1", "Reverse", "Verse 2",
                "Chorus 2", "Sonic End",
            ]),
        ];
        Self { templates }
    }
}

/// Used when no template applies.
pub const FALLBACK_STRUCTURE: [&str; 4] = ["Intro", "Verse", "Chorus", "Outro"];

impl StructureLibrary {
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let library: StructureLibrary = serde_json::from_str(&json)?;
        Ok(library)
    }

    /// A forced template by id, else a random template for the mood, else a
    /// random template of any mood, else the four-section fallback.
    pub fn choose<R: RandomSource>(
        &self,
        forced: Option<&str>,
        mood: &str,
        rng: &mut R,
    ) -> Vec<String> {
        if let Some(id) = forced {
            if let Some(t) = self.templates.iter().find(|t| t.id == id) {
                return t.structure.clone();
            }
            warn!(template = id, "unknown structure template, choosing at random");
        }
        let for_mood: Vec<&StructureTemplate> = self
            .templates
            .iter()
            .filter(|t| t.mood.as_deref().is_none_or(|m| m == mood))
            .filter(|t| !t.structure.is_empty())
            .collect();
        let pool: Vec<&StructureTemplate> = if for_mood.is_empty() {
            self.templates.iter().filter(|t| !t.structure.is_empty()).collect()
        } else {
            for_mood
        };
        if pool.is_empty() {
            return FALLBACK_STRUCTURE.iter().map(|s| s.to_string()).collect();
        }
        pool[rng.range_usize(0, pool.len())].structure.clone()
    }
}

/// A section before harmony is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedSection {
    pub name: String,
    pub time_signature: TimeSignature,
    pub bars: u32,
}

/// Assign bar counts and meters to a structure. A forced meter pins every
/// section; otherwise the opening meter comes from the mood table and each
/// later section may move to one of the previous meter's allowed successors.
pub fn plan_sections<R: RandomSource>(
    structure: &[String],
    mood: &str,
    forced_meter: Option<TimeSignature>,
    rng: &mut R,
) -> Vec<PlannedSection> {
    let mut meter = forced_meter.unwrap_or_else(|| moods::pick_base_meter(mood, rng));
    let mut planned = Vec::with_capacity(structure.len());
    for (i, name) in structure.iter().enumerate() {
        if forced_meter.is_none() && i > 0 {
            meter = moods::next_section_meter(mood, meter, rng);
        }
        let range = bar_range(name);
        let bar_count = rng
            .range_usize_inclusive(range.typical_min as usize, range.typical_max as usize)
            .max(1) as u32;
        debug!(section = %name, bars = bar_count, meter = %meter, "planned section");
        planned.push(PlannedSection {
            name: name.clone(),
            time_signature: meter,
            bars: bar_count,
        });
    }
    planned
}
