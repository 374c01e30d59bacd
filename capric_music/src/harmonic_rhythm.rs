// Harmonic-rhythm pattern library: how a bar is split between chords.
//
// A pattern is a short list of steps, each naming a chord relative to the
// arranger's running base-chord index and a length in beats of the meter's
// beat unit. The last step of a pattern always absorbs whatever remains of
// the bar, so patterns never need to sum exactly to the bar length.
//
// Tables are keyed by meter; meters without a table use `DEFAULT_PATTERNS`.
// Each pattern lists the section tags it suits ("any", "verse", "chorus",
// "bridge").

use crate::structure::SectionKind;
use crate::timeline::TimeSignature;

/// Which chord a step sounds, relative to the running base index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChordRef {
    Current,
    /// Advance the running index, then sound it.
    Next,
    /// Look back one chord as a decoration.
    Previous,
    /// Repeat the last sounded chord or anticipate the next base chord.
    Passing,
    /// Short accent on the current chord.
    Hit,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RhythmStep {
    pub chord: ChordRef,
    pub beats: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarmonicRhythmPattern {
    pub name: &'static str,
    pub weight: u32,
    pub sections: &'static [&'static str],
    pub steps: &'static [RhythmStep],
}

impl HarmonicRhythmPattern {
    pub fn advances(&self) -> bool {
        self.steps.iter().any(|s| s.chord == ChordRef::Next)
    }

    pub fn suits(&self, kind: SectionKind) -> bool {
        self.sections.iter().any(|s| *s == "any" || *s == kind.pattern_tag())
    }
}

const fn cur(beats: f32) -> RhythmStep {
    RhythmStep { chord: ChordRef::Current, beats }
}
const fn next(beats: f32) -> RhythmStep {
    RhythmStep { chord: ChordRef::Next, beats }
}
const fn prev(beats: f32) -> RhythmStep {
    RhythmStep { chord: ChordRef::Previous, beats }
}
const fn pass(beats: f32) -> RhythmStep {
    RhythmStep { chord: ChordRef::Passing, beats }
}
const fn hit(beats: f32) -> RhythmStep {
    RhythmStep { chord: ChordRef::Hit, beats }
}

const fn pattern(
    name: &'static str,
    weight: u32,
    sections: &'static [&'static str],
    steps: &'static [RhythmStep],
) -> HarmonicRhythmPattern {
    HarmonicRhythmPattern { name, weight, sections, steps }
}

const ANY: &[&str] = &["any"];

const PATTERNS_4_4: &[HarmonicRhythmPattern] = &[
    pattern("whole", 30, ANY, &[cur(4.0)]),
    pattern("halves", 20, ANY, &[cur(2.0), cur(2.0)]),
    pattern("push", 12, ANY, &[cur(3.0), pass(1.0)]),
    pattern("hit_hold", 10, &["chorus"], &[hit(0.5), cur(3.5)]),
    pattern("change_mid", 15, ANY, &[cur(2.0), next(2.0)]),
    pattern("anticipate", 8, &["chorus"], &[cur(3.5), next(0.5)]),
    pattern("look_back", 6, &["bridge"], &[cur(3.0), prev(1.0)]),
];

const PATTERNS_3_4: &[HarmonicRhythmPattern] = &[
    pattern("dotted_half", 30, ANY, &[cur(3.0)]),
    pattern("push", 12, ANY, &[cur(2.0), pass(1.0)]),
    pattern("split", 10, ANY, &[cur(1.5), next(1.5)]),
    pattern("hit_hold", 8, &["chorus"], &[hit(0.5), cur(2.5)]),
];

const PATTERNS_6_8: &[HarmonicRhythmPattern] = &[
    pattern("bar", 30, ANY, &[cur(6.0)]),
    pattern("two_pulses", 15, ANY, &[cur(3.0), cur(3.0)]),
    pattern("change_pulse", 15, ANY, &[cur(3.0), next(3.0)]),
    pattern("push", 10, ANY, &[cur(5.0), pass(1.0)]),
];

const PATTERNS_2_4: &[HarmonicRhythmPattern] = &[
    pattern("bar", 30, ANY, &[cur(2.0)]),
    pattern("split", 10, ANY, &[cur(1.0), next(1.0)]),
    pattern("push", 8, ANY, &[cur(1.5), pass(0.5)]),
];

pub const DEFAULT_PATTERNS: &[HarmonicRhythmPattern] = &[
    pattern("bar", 30, ANY, &[cur(1.0)]),
    pattern("hit_hold", 8, &["chorus"], &[hit(0.5), cur(1.0)]),
    pattern("late_change", 10, ANY, &[cur(2.0), next(1.0)]),
];

pub fn patterns_for(ts: TimeSignature) -> &'static [HarmonicRhythmPattern] {
    match (ts.beats, ts.beat_unit) {
        (4, 4) => PATTERNS_4_4,
        (3, 4) => PATTERNS_3_4,
        (6, 8) => PATTERNS_6_8,
        (2, 4) => PATTERNS_2_4,
        _ => DEFAULT_PATTERNS,
    }
}

/// Patterns usable for one bar, with their weights. Advancing patterns need
/// spare base chords. If the filter leaves nothing, the first pattern of the
/// table is used.
pub fn eligible_patterns(
    ts: TimeSignature,
    kind: SectionKind,
    spare_chords: bool,
) -> Vec<(&'static HarmonicRhythmPattern, u32)> {
    let table = patterns_for(ts);
    let eligible: Vec<_> = table
        .iter()
        .filter(|p| p.suits(kind) && (spare_chords || !p.advances()))
        .filter(|p| {
            let first = p.steps.first().map(|s| s.chord);
            !matches!(first, Some(ChordRef::Passing | ChordRef::Previous))
        })
        .map(|p| (p, p.weight))
        .collect();
    if eligible.is_empty() {
        table.first().map(|p| vec![(p, 1)]).unwrap_or_default()
    } else {
        eligible
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_meter_uses_default_table() {
        assert_eq!(patterns_for(TimeSignature::new(7, 8)).len(), DEFAULT_PATTERNS.len());
        assert_eq!(patterns_for(TimeSignature::COMMON)[0].name, "whole");
    }

    #[test]
    fn test_advancing_patterns_need_spare_chords() {
        let without = eligible_patterns(TimeSignature::COMMON, SectionKind::Chorus, false);
        assert!(without.iter().all(|(p, _)| !p.advances()));
        let with = eligible_patterns(TimeSignature::COMMON, SectionKind::Chorus, true);
        assert!(with.iter().any(|(p, _)| p.advances()));
    }

    #[test]
    fn test_section_filter() {
        let verse = eligible_patterns(TimeSignature::COMMON, SectionKind::Verse, true);
        assert!(verse.iter().all(|(p, _)| p.sections.contains(&"any")));
        let bridge = eligible_patterns(TimeSignature::COMMON, SectionKind::Bridge, false);
        assert!(bridge.iter().any(|(p, _)| p.name == "look_back"));
    }

    #[test]
    fn test_no_pattern_starts_with_decoration() {
        for ts in [(4, 4), (3, 4), (6, 8), (2, 4), (5, 8)] {
            let ts = TimeSignature::new(ts.0, ts.1);
            for p in patterns_for(ts) {
                let opens = p.steps[0].chord;
                assert!(matches!(opens, ChordRef::Current | ChordRef::Hit), "{}", p.name);
            }
        }
    }
}
