// The tick timeline: the shared song skeleton every generator reads.
//
// A `Song` is an ordered list of contiguous `Section`s. Each section carries
// its meter, bar count, absolute start tick, and base chord progression; the
// arranger later fills `harmonic_events` (fine-grained, section-relative) and
// `chord_slots` (one coarse span per base chord). Generators treat the song
// as frozen and emit flat lists of absolute-tick `NoteEvent`s.
//
// All timing is integer ticks at TICKS_PER_QUARTER per quarter note. A beat
// is the meter's beat unit, so a 6/8 beat is an eighth (64 ticks).
//
// Invariants maintained here: sections are contiguous (each start tick is the
// previous section's end), and the meter change list starts at tick 0, is
// tick-ordered, and never repeats the same meter twice in a row.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CompositionError, Result};
use crate::structure::{self, SectionKind};
use crate::theory::Key;

pub const TICKS_PER_QUARTER: u32 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSignature {
    pub beats: u8,
    pub beat_unit: u8,
}

impl TimeSignature {
    pub const COMMON: TimeSignature = TimeSignature { beats: 4, beat_unit: 4 };

    pub fn new(beats: u8, beat_unit: u8) -> Self {
        Self { beats, beat_unit }
    }

    pub fn ticks_per_beat(self) -> u32 {
        TICKS_PER_QUARTER * 4 / self.beat_unit.max(1) as u32
    }

    pub fn ticks_per_bar(self) -> u32 {
        self.beats as u32 * self.ticks_per_beat()
    }

    /// Compound meters (6/8, 9/8, 12/8) group beats in threes.
    pub fn is_compound(self) -> bool {
        self.beat_unit == 8 && self.beats % 3 == 0
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.beats, self.beat_unit)
    }
}

impl FromStr for TimeSignature {
    type Err = CompositionError;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || CompositionError::Config(format!("invalid time signature '{s}'"));
        let (beats, unit) = s.split_once('/').ok_or_else(bad)?;
        let beats: u8 = beats.trim().parse().map_err(|_| bad())?;
        let unit: u8 = unit.trim().parse().map_err(|_| bad())?;
        if beats == 0 || !matches!(unit, 1 | 2 | 4 | 8 | 16) {
            return Err(bad());
        }
        Ok(Self::new(beats, unit))
    }
}

/// One chord occurrence placed by the harmonic-rhythm arranger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarmonicEvent {
    pub chord: String,
    /// Relative to the section start.
    pub start_tick: u32,
    pub duration_ticks: u32,
    pub is_passing: bool,
    pub is_hit: bool,
    /// Index into the section's base progression this event belongs to.
    pub base_index: usize,
}

impl HarmonicEvent {
    pub fn end_tick(&self) -> u32 {
        self.start_tick + self.duration_ticks
    }
}

/// The coarse span a base chord governs, derived from the harmonic events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChordSlot {
    pub chord: String,
    /// Relative to the section start.
    pub start_tick: u32,
    pub duration_ticks: u32,
}

impl ChordSlot {
    pub fn end_tick(&self) -> u32 {
        self.start_tick + self.duration_ticks
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub time_signature: TimeSignature,
    pub bars: u32,
    /// Absolute tick of the first bar.
    pub start_tick: u32,
    pub base_chords: Vec<String>,
    pub harmonic_events: Vec<HarmonicEvent>,
    pub chord_slots: Vec<ChordSlot>,
}

impl Section {
    pub fn length_ticks(&self) -> u32 {
        self.bars * self.time_signature.ticks_per_bar()
    }

    pub fn end_tick(&self) -> u32 {
        self.start_tick + self.length_ticks()
    }

    pub fn ticks_per_beat(&self) -> u32 {
        self.time_signature.ticks_per_beat()
    }

    pub fn ticks_per_bar(&self) -> u32 {
        self.time_signature.ticks_per_bar()
    }

    pub fn kind(&self) -> SectionKind {
        structure::section_kind(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterChange {
    pub tick: u32,
    pub time_signature: TimeSignature,
}

/// A planned song: global parameters plus the section timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub title: String,
    pub mood: String,
    pub tempo_feel: String,
    pub key: Key,
    pub bpm: u32,
    pub style_notes: String,
    pub sections: Vec<Section>,
    pub meter_changes: Vec<MeterChange>,
}

impl Song {
    pub fn new(title: impl Into<String>, mood: impl Into<String>, key: Key, bpm: u32) -> Self {
        Self {
            title: title.into(),
            mood: mood.into(),
            tempo_feel: String::new(),
            key,
            bpm,
            style_notes: String::new(),
            sections: Vec::new(),
            meter_changes: Vec::new(),
        }
    }

    /// Append a section at the current end of the song, recording a meter
    /// change when its time signature differs from the last one in effect.
    pub fn push_section(
        &mut self,
        name: impl Into<String>,
        time_signature: TimeSignature,
        bars: u32,
        base_chords: Vec<String>,
    ) -> &mut Section {
        let start_tick = self.total_ticks();
        let changed = self
            .meter_changes
            .last()
            .is_none_or(|c| c.time_signature != time_signature);
        if changed {
            self.meter_changes.push(MeterChange { tick: start_tick, time_signature });
        }
        self.sections.push(Section {
            name: name.into(),
            time_signature,
            bars,
            start_tick,
            base_chords,
            harmonic_events: Vec::new(),
            chord_slots: Vec::new(),
        });
        let last = self.sections.len() - 1;
        &mut self.sections[last]
    }

    pub fn total_ticks(&self) -> u32 {
        self.sections.last().map_or(0, Section::end_tick)
    }

    pub fn total_bars(&self) -> u32 {
        self.sections.iter().map(|s| s.bars).sum()
    }

    pub fn first_meter(&self) -> TimeSignature {
        self.meter_changes
            .first()
            .map_or(TimeSignature::COMMON, |c| c.time_signature)
    }

    /// Wall-clock length in seconds at the song's tempo.
    pub fn duration_seconds(&self) -> f64 {
        let quarters = self.total_ticks() as f64 / TICKS_PER_QUARTER as f64;
        quarters * 60.0 / self.bpm.max(1) as f64
    }

    /// Fail if there is nothing to generate against.
    pub fn require_sections(&self) -> Result<()> {
        if self.sections.is_empty() || self.total_ticks() == 0 {
            return Err(CompositionError::EmptyTimeline);
        }
        Ok(())
    }
}

/// One sounding event in a generated track. `start_tick` is absolute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub pitches: Vec<u8>,
    pub start_tick: u32,
    pub duration_ticks: u32,
    pub velocity: u8,
}

impl NoteEvent {
    pub fn new(pitch: u8, start_tick: u32, duration_ticks: u32, velocity: u8) -> Self {
        Self {
            pitches: vec![pitch],
            start_tick,
            duration_ticks,
            velocity,
        }
    }

    pub fn chord(pitches: Vec<u8>, start_tick: u32, duration_ticks: u32, velocity: u8) -> Self {
        Self {
            pitches,
            start_tick,
            duration_ticks,
            velocity,
        }
    }

    pub fn end_tick(&self) -> u32 {
        self.start_tick + self.duration_ticks
    }

    /// First (or only) pitch.
    pub fn pitch(&self) -> u8 {
        self.pitches.first().copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song() -> Song {
        Song::new("t", "very_normal_person", Key::new("C", "Ionian").unwrap(), 120)
    }

    #[test]
    fn test_tick_arithmetic() {
        assert_eq!(TimeSignature::COMMON.ticks_per_beat(), 128);
        assert_eq!(TimeSignature::COMMON.ticks_per_bar(), 512);
        assert_eq!(TimeSignature::new(6, 8).ticks_per_beat(), 64);
        assert_eq!(TimeSignature::new(6, 8).ticks_per_bar(), 384);
        assert_eq!(TimeSignature::new(5, 4).ticks_per_bar(), 640);
        assert!(TimeSignature::new(12, 8).is_compound());
        assert!(!TimeSignature::new(7, 8).is_compound());
    }

    #[test]
    fn test_parse_time_signature() {
        assert_eq!("7/8".parse::<TimeSignature>().unwrap(), TimeSignature::new(7, 8));
        assert!("7-8".parse::<TimeSignature>().is_err());
        assert!("4/3".parse::<TimeSignature>().is_err());
        assert_eq!(TimeSignature::new(12, 8).to_string(), "12/8");
    }

    #[test]
    fn test_sections_are_contiguous() {
        let mut s = song();
        s.push_section("Intro", TimeSignature::COMMON, 4, vec![]);
        s.push_section("Verse 1", TimeSignature::new(6, 8), 8, vec![]);
        s.push_section("Chorus 1", TimeSignature::COMMON, 2, vec![]);
        assert_eq!(s.sections[1].start_tick, 4 * 512);
        assert_eq!(s.sections[2].start_tick, 4 * 512 + 8 * 384);
        for pair in s.sections.windows(2) {
            assert_eq!(pair[0].end_tick(), pair[1].start_tick);
        }
        assert_eq!(s.total_ticks(), 4 * 512 + 8 * 384 + 2 * 512);
        assert_eq!(s.total_bars(), 14);
    }

    #[test]
    fn test_meter_changes_deduplicated() {
        let mut s = song();
        s.push_section("A", TimeSignature::COMMON, 2, vec![]);
        s.push_section("B", TimeSignature::COMMON, 2, vec![]);
        s.push_section("C", TimeSignature::new(3, 4), 2, vec![]);
        s.push_section("D", TimeSignature::new(3, 4), 2, vec![]);
        s.push_section("E", TimeSignature::COMMON, 1, vec![]);
        let ticks: Vec<u32> = s.meter_changes.iter().map(|c| c.tick).collect();
        assert_eq!(ticks, vec![0, 2048, 2048 + 1536]);
        for pair in s.meter_changes.windows(2) {
            assert_ne!(pair[0].time_signature, pair[1].time_signature);
        }
    }

    #[test]
    fn test_duration_seconds() {
        let mut s = song();
        // 8 bars of 4/4 at 120 BPM = 32 quarters = 16 s.
        s.push_section("Verse", TimeSignature::COMMON, 8, vec![]);
        assert!((s.duration_seconds() - 16.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_song_is_rejected() {
        assert!(matches!(song().require_sections(), Err(CompositionError::EmptyTimeline)));
    }
}
