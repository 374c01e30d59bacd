// Plain-text song summary.
//
// Header lines (title, mood, key, tempo, meter, style notes), then each
// section with its main chords and a bar-by-bar harmonic rhythm listing,
// the estimated duration, and a glossary of every chord that sounds.

use std::fmt::Write;

use crate::moods::DEFAULT_MOOD;
use crate::structure::clean_section_name;
use crate::theory::{TheoryHelpers, quality_by_suffix};
use crate::timeline::{Section, Song};

/// Beats with at most two decimals and no trailing zeros: 2, 0.5, 1.25.
pub fn format_beats(beats: f64) -> String {
    let s = format!("{beats:.2}");
    if let Some(whole) = s.strip_suffix(".00") {
        whole.to_string()
    } else if s.ends_with('0') {
        s[..s.len() - 1].to_string()
    } else {
        s
    }
}

fn meter_line(song: &Song) -> String {
    let Some(first) = song.meter_changes.first() else {
        return "Meter: N/A".into();
    };
    let varies = song.meter_changes.iter().any(|c| c.time_signature != first.time_signature);
    if varies {
        format!("Meter: Variable (starts {})", first.time_signature)
    } else {
        format!("Meter: {}", first.time_signature)
    }
}

/// `Bar n:` lines for one section. Bars with no chord starting in them are
/// marked as a continuation.
fn harmonic_rhythm_lines(section: &Section) -> Vec<String> {
    let per_bar = section.ticks_per_bar();
    let tpb = section.ticks_per_beat() as f64;
    let mut bars: Vec<Vec<String>> = vec![Vec::new(); section.bars as usize];
    for event in &section.harmonic_events {
        let bar = (event.start_tick / per_bar) as usize;
        let Some(entries) = bars.get_mut(bar) else { continue };
        let mut label = event.chord.clone();
        if event.is_passing {
            label.push_str(" (pass)");
        }
        if event.is_hit {
            label.push_str(" (hit)");
        }
        let _ = write!(label, " ({}b)", format_beats(event.duration_ticks as f64 / tpb));
        entries.push(label);
    }
    bars.iter()
        .enumerate()
        .map(|(i, entries)| {
            if entries.is_empty() {
                format!("Bar {}: (continuation or silence)", i + 1)
            } else {
                format!("Bar {}: {}", i + 1, entries.join(" | "))
            }
        })
        .collect()
}

fn may_modulate(section: &Section, mood: &str) -> bool {
    let clean = clean_section_name(&section.name);
    clean == "bridge-mod"
        || (matches!(clean.as_str(), "bridge" | "middle8") && mood != DEFAULT_MOOD)
}

/// Sounding chords in order of first appearance. Sections that were never
/// arranged contribute their base chords.
fn unique_chords(song: &Song) -> Vec<&str> {
    let mut seen: Vec<&str> = Vec::new();
    for section in &song.sections {
        let chords: Vec<&str> = if section.harmonic_events.is_empty() {
            section.base_chords.iter().map(String::as_str).collect()
        } else {
            section.harmonic_events.iter().map(|e| e.chord.as_str()).collect()
        };
        for chord in chords {
            if !seen.contains(&chord) {
                seen.push(chord);
            }
        }
    }
    seen
}

pub fn render_summary<T: TheoryHelpers>(song: &Song, theory: &T) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", song.title);
    let _ = writeln!(out, "Mood: {}", song.mood.replace('_', " "));
    let _ = writeln!(out, "Key: {}", song.key.display_name());
    let _ = writeln!(out, "BPM: {}", song.bpm);
    let _ = writeln!(out, "{}", meter_line(song));
    let _ = writeln!(out, "Style Notes: {}", song.style_notes);
    let _ = writeln!(out, "\nSTRUCTURE AND CHORDS:");

    for section in &song.sections {
        let _ = writeln!(
            out,
            "\n--- {} ({} bars in {}) ---",
            section.name.to_uppercase(),
            section.bars,
            section.time_signature
        );
        if section.base_chords.is_empty() {
            let _ = writeln!(out, "Main Chords: (None/Silence)");
        } else {
            let _ = writeln!(out, "Main Chords: [ {} ]", section.base_chords.join(" | "));
        }
        let _ = writeln!(out, "Harmonic Rhythm (per bar):");
        if section.harmonic_events.is_empty() {
            let _ = writeln!(out, "(No detailed harmonic events for this section)");
        } else {
            for line in harmonic_rhythm_lines(section) {
                let _ = writeln!(out, "{line}");
            }
        }
        if may_modulate(section, &song.mood) {
            let _ = writeln!(
                out,
                "  Note: Section with potential modulation or strong harmonic contrast."
            );
        }
    }

    let total = song.duration_seconds().round() as u64;
    let _ = writeln!(out, "\nEstimated Total Duration: {} min {:02} sec", total / 60, total % 60);

    let _ = writeln!(out, "\n\nCHORD GLOSSARY (unique chords used):");
    let mut listed = 0;
    for chord in unique_chords(song) {
        let parsed = theory.parse_chord(chord);
        if quality_by_suffix(&parsed.suffix).is_none() {
            continue;
        }
        let notes = theory.chord_notes(chord);
        if notes.pitch_classes.is_empty() {
            continue;
        }
        listed += 1;
        let _ = writeln!(
            out,
            "\n{}:\n  Quality: {}\n  Notes (root pos.): {}",
            notes.name,
            notes.quality_label,
            notes.notes.join(" ")
        );
    }
    if listed == 0 {
        let _ = writeln!(out, "No specific chords in glossary.");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arranger;
    use crate::theory::{Key, StandardTheory};
    use crate::timeline::{HarmonicEvent, TimeSignature};
    use capric_prng::GameRng;

    fn chords(c: &[&str]) -> Vec<String> {
        c.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_beat_formatting() {
        assert_eq!(format_beats(2.0), "2");
        assert_eq!(format_beats(0.5), "0.5");
        assert_eq!(format_beats(1.25), "1.25");
        assert_eq!(format_beats(1.0 / 3.0), "0.33");
    }

    #[test]
    fn test_header_and_sections() {
        let key = Key::new("D", "Lydian").unwrap();
        let mut song = Song::new("Caprice No. 3", "etereo_sognante", key, 90);
        song.style_notes = "Open chords.".into();
        song.push_section("Verse 1", TimeSignature::COMMON, 4, chords(&["D", "E", "F#m"]));
        song.push_section("Bridge", TimeSignature::new(3, 4), 2, chords(&["Bm", "A"]));
        arranger::arrange_song(&mut song, &mut GameRng::new(2));
        let text = render_summary(&song, &StandardTheory);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Caprice No. 3");
        assert_eq!(lines[1], "Mood: etereo sognante");
        assert_eq!(lines[2], "Key: D Lydian");
        assert_eq!(lines[3], "BPM: 90");
        assert_eq!(lines[4], "Meter: Variable (starts 4/4)");
        assert_eq!(lines[5], "Style Notes: Open chords.");
        assert!(text.contains("--- VERSE 1 (4 bars in 4/4) ---"));
        assert!(text.contains("Main Chords: [ D | E | F#m ]"));
        assert!(text.contains("--- BRIDGE (2 bars in 3/4) ---"));
        assert!(text.contains("Note: Section with potential modulation"));
        assert!(text.contains("CHORD GLOSSARY (unique chords used):"));
        assert!(text.contains("Notes (root pos.): F# A C#"));
    }

    #[test]
    fn test_bar_listing_marks_passing_chords_and_empty_bars() {
        let mut song = Song::new("t", "very_normal_person", Key::new("C", "Ionian").unwrap(), 120);
        let section = song.push_section("Verse", TimeSignature::COMMON, 3, chords(&["C", "G"]));
        let event = |chord: &str, start_tick, duration_ticks, is_passing| HarmonicEvent {
            chord: chord.into(),
            start_tick,
            duration_ticks,
            is_passing,
            is_hit: false,
            base_index: 0,
        };
        section.harmonic_events = vec![
            event("C", 0, 256, false),
            event("Dm", 256, 64, true),
            event("G", 1024, 512, false),
        ];
        let lines = harmonic_rhythm_lines(&song.sections[0]);
        assert_eq!(
            lines,
            vec![
                "Bar 1: C (2b) | Dm (pass) (0.5b)".to_string(),
                "Bar 2: (continuation or silence)".to_string(),
                "Bar 3: G (4b)".to_string(),
            ]
        );
        let text = render_summary(&song, &StandardTheory);
        assert!(text.contains("Meter: 4/4"));
        assert!(text.contains("Estimated Total Duration: 0 min 06 sec"));
    }
}
