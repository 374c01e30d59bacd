// Tunable generation parameters.
//
// Every knob has a default matching the composer's stock behavior, so an
// empty JSON object (or no config file at all) reproduces it. Each track
// generator receives only its own sub-struct.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CompositionError, Result};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub harmony: HarmonyConfig,
    pub drums: DrumConfig,
    pub bass: BassConfig,
    pub vocal: VocalConfig,
    pub melody: MelodyConfig,
    pub chords: ChordConfig,
}

impl GenerationConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: GenerationConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject probabilities outside [0, 1] and inverted pitch ranges.
    pub fn validate(&self) -> Result<()> {
        let probabilities = [
            ("harmony.vary_probability", self.harmony.vary_probability),
            ("drums.variation_activation", self.drums.variation_activation),
            ("drums.fill_probability", self.drums.fill_probability),
            ("drums.crash_on_chord_change", self.drums.crash_on_chord_change),
            ("drums.timing_swap_on_chord_change", self.drums.timing_swap_on_chord_change),
            ("bass.feel_change_probability", self.bass.feel_change_probability),
            ("bass.root_on_strong_beat", self.bass.root_on_strong_beat),
            ("bass.chromatic_passing_probability", self.bass.chromatic_passing_probability),
            ("vocal.note_probability", self.vocal.note_probability),
            ("vocal.section_probability", self.vocal.section_probability),
            ("melody.rest_probability", self.melody.rest_probability),
            ("melody.step_probability", self.melody.step_probability),
        ];
        for (name, p) in probabilities {
            if !(0.0..=1.0).contains(&p) {
                return Err(CompositionError::Config(format!("{name} must be in [0, 1], got {p}")));
            }
        }
        if self.bass.min_pitch >= self.bass.max_pitch {
            return Err(CompositionError::Config(format!(
                "bass range {}..{} is empty",
                self.bass.min_pitch, self.bass.max_pitch
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarmonyConfig {
    /// Chance that a repeated section type varies the cached progression
    /// instead of replaying it unchanged.
    pub vary_probability: f64,
}

impl Default for HarmonyConfig {
    fn default() -> Self {
        // Raised from 0.05; at that rate repeated sections almost never varied.
        Self { vary_probability: 0.25 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrumConfig {
    /// Chance that groove variations are enabled for the whole song.
    pub variation_activation: f64,
    /// Fill chance on every fourth bar. The section's last bar uses 1.5x.
    pub fill_probability: f64,
    /// Crash chance on the first bar of a new chord slot.
    pub crash_on_chord_change: f64,
    /// Chance of toggling hi-hat/ride when a new chord slot begins.
    pub timing_swap_on_chord_change: f64,
}

impl Default for DrumConfig {
    fn default() -> Self {
        Self {
            variation_activation: 0.6,
            fill_probability: 0.25,
            crash_on_chord_change: 0.35,
            timing_swap_on_chord_change: 0.45,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BassConfig {
    pub min_pitch: u8,
    pub max_pitch: u8,
    /// Per-slot chance of switching to a different feel.
    pub feel_change_probability: f64,
    /// Chance that a strong beat plays the chord root outright.
    pub root_on_strong_beat: f64,
    /// Chance of a chromatic approach note between roots a whole step apart.
    pub chromatic_passing_probability: f64,
}

impl Default for BassConfig {
    fn default() -> Self {
        Self {
            min_pitch: 36,
            max_pitch: 57,
            feel_change_probability: 0.3,
            root_on_strong_beat: 0.85,
            chromatic_passing_probability: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VocalConfig {
    /// Force a style profile by name instead of choosing at random.
    pub profile: Option<String>,
    /// Note-versus-rest split for each sub-event.
    pub note_probability: f64,
    /// Chance that an eligible section is sung at all.
    pub section_probability: f64,
}

impl Default for VocalConfig {
    fn default() -> Self {
        Self {
            profile: None,
            note_probability: 0.85,
            section_probability: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MelodyConfig {
    pub rest_probability: f64,
    /// Chance of stepwise motion versus a free leap.
    pub step_probability: f64,
}

impl Default for MelodyConfig {
    fn default() -> Self {
        Self {
            rest_probability: 0.05,
            step_probability: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChordConfig {
    pub pad_velocity: u8,
    pub rhythm_velocity: u8,
}

impl Default for ChordConfig {
    fn default() -> Self {
        Self {
            pad_velocity: 60,
            rhythm_velocity: 65,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_gives_defaults() {
        let config: GenerationConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, GenerationConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let json = r#"{"drums": {"fill_probability": 0.5}, "vocal": {"profile": "yrk"}}"#;
        let config: GenerationConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.drums.fill_probability, 0.5);
        assert_eq!(config.drums.crash_on_chord_change, 0.35);
        assert_eq!(config.vocal.profile.as_deref(), Some("yrk"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = GenerationConfig::default();
        config.melody.rest_probability = 1.5;
        assert!(config.validate().is_err());

        let mut config = GenerationConfig::default();
        config.bass.min_pitch = 60;
        assert!(config.validate().is_err());
    }
}
