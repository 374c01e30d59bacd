// Capric Music Generator: CLI entry point.
//
// Composes one song and writes it to an output directory: the text summary,
// the song timeline as JSON, one MIDI file per track and a combined
// multi-track MIDI file.
//
// Usage:
//   cargo run -p capric_music --bin generate -- [output_dir] [--seed N]
//     [--mood NAME] [--tempo-feel NAME] [--key ROOT_MODE] [--meter a/b]
//     [--structure NAME] [--config FILE] [--grooves FILE]
//     [--vocal-profiles FILE] [--structures FILE]
//
// Moods: very_normal_person, malinconico_introspettivo, ansioso_distopico,
//   etereo_sognante, arrabbiato_critico, sperimentale_astratto
// Tempo feels: lento_atmosferico, mid_tempo_groove, incalzante_energico
// Keys are written root and mode joined by an underscore, e.g. F#_Dorian.
//
// Log verbosity follows RUST_LOG (default `info`).

use capric_music::config::GenerationConfig;
use capric_music::drum_patterns::GrooveLibrary;
use capric_music::error::Result;
use capric_music::midi::{encode, file_stem, song_to_smf, track_file_name, track_to_smf, write_smf};
use capric_music::song::{CompositionRequest, Libraries, compose};
use capric_music::structure::StructureLibrary;
use capric_music::summary::render_summary;
use capric_music::theory::StandardTheory;
use capric_music::timeline::{Song, TimeSignature};
use capric_music::vocal_profiles::VocalProfileLibrary;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().collect();

    let output_dir = PathBuf::from(
        args.get(1)
            .filter(|s| !s.starts_with("--"))
            .map(|s| s.as_str())
            .unwrap_or("output"),
    );
    let seed: u64 = parse_flag(&args, "--seed").unwrap_or_else(clock_seed);
    let meter = flag_value(&args, "--meter").map(|v| {
        v.parse::<TimeSignature>().unwrap_or_else(|e| fail("Bad --meter", e))
    });
    let key = flag_value(&args, "--key").map(|v| match v.split_once('_') {
        Some((root, mode)) => (root.to_string(), mode.to_string()),
        None => {
            eprintln!("Bad --key '{}': expected ROOT_MODE, e.g. A_Aeolian", v);
            std::process::exit(1);
        }
    });

    println!("=== Capric Music Generator ===");
    println!("Output directory: {}", output_dir.display());
    println!("Seed: {}", seed);
    println!();

    println!("[1/6] Loading configuration and libraries...");
    let config = match flag_value(&args, "--config") {
        Some(path) => {
            let config = GenerationConfig::load(Path::new(path))
                .unwrap_or_else(|e| fail("Failed to load config", e));
            println!("  Loaded config from {}.", path);
            config
        }
        None => {
            println!("  Using default configuration.");
            GenerationConfig::default()
        }
    };
    let libraries = load_libraries(&args).unwrap_or_else(|e| fail("Failed to load libraries", e));
    println!(
        "  {} structure templates, {} grooves, {} vocal profiles.",
        libraries.structures.templates.len(),
        libraries.grooves.grooves.len(),
        libraries.profiles.profiles.len()
    );

    let request = CompositionRequest {
        seed,
        mood: flag_value(&args, "--mood").map(str::to_string),
        tempo_feel: flag_value(&args, "--tempo-feel").map(str::to_string),
        key,
        meter,
        structure: flag_value(&args, "--structure").map(str::to_string),
        config,
    };

    println!("[2/6] Composing...");
    let composition =
        compose(&request, &libraries).unwrap_or_else(|e| fail("Composition failed", e));
    let song = &composition.song;
    println!("  {} ({}, {} BPM)", song.title, song.key.display_name(), song.bpm);
    println!("  Mood: {}  Tempo feel: {}", song.mood, song.tempo_feel);
    println!(
        "  {} sections, {} bars, {:.0}s",
        song.sections.len(),
        song.total_bars(),
        song.duration_seconds()
    );
    for track in &composition.tracks {
        println!("  {:<14} {} events", track.part.name(), track.events.len());
    }
    if let Some((name, style)) = &composition.vocal_profile {
        println!("  Vocal profile: {} ({})", name, style);
    }
    for notice in &composition.notices {
        println!("  Notice: {}", notice);
    }

    if let Err(e) = std::fs::create_dir_all(&output_dir) {
        fail("Cannot create output directory", e);
    }
    let stem = file_stem(&song.title);

    println!("[3/6] Writing summary...");
    let summary_path = output_dir.join(format!("{}.txt", stem));
    if let Err(e) = std::fs::write(&summary_path, render_summary(song, &StandardTheory)) {
        fail("Error writing summary", e);
    }
    println!("  {}", summary_path.display());

    println!("[4/6] Writing song timeline...");
    let json_path = output_dir.join(format!("{}_song.json", stem));
    if let Err(e) = write_json(song, &json_path) {
        fail("Error writing timeline", e);
    }
    println!("  {}", json_path.display());

    println!("[5/6] Writing per-track MIDI...");
    let midi_tracks = composition.midi_tracks();
    for track in midi_tracks.iter().filter(|t| !t.events.is_empty()) {
        let path = output_dir.join(track_file_name(&song.title, &track.name));
        if let Err(e) = write_smf(&track_to_smf(song, track), &path) {
            fail("Error writing MIDI", e);
        }
        println!("  {}", path.display());
    }

    println!("[6/6] Writing combined MIDI...");
    let combined_path = output_dir.join(format!("{}_Full.mid", stem));
    match encode(&song_to_smf(song, &midi_tracks)) {
        Ok(bytes) => {
            if let Err(e) = std::fs::write(&combined_path, &bytes) {
                fail("Error writing MIDI", e);
            }
            println!("  {} ({} bytes)", combined_path.display(), bytes.len());
        }
        Err(e) => fail("Error encoding MIDI", e),
    }

    println!();
    println!("Play with: timidity {} (or any MIDI player)", combined_path.display());
}

fn load_libraries(args: &[String]) -> Result<Libraries> {
    let mut libraries = Libraries::builtin()?;
    if let Some(path) = flag_value(args, "--structures") {
        libraries.structures = StructureLibrary::load(Path::new(path))?;
    }
    if let Some(path) = flag_value(args, "--grooves") {
        libraries.grooves = GrooveLibrary::load(Path::new(path))?;
    }
    if let Some(path) = flag_value(args, "--vocal-profiles") {
        libraries.profiles = VocalProfileLibrary::load(Path::new(path))?;
    }
    Ok(libraries)
}

fn write_json(song: &Song, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(song)?;
    std::fs::write(path, json)?;
    Ok(())
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos() as u64)
}

fn fail(context: &str, error: impl std::fmt::Display) -> ! {
    eprintln!("  {}: {}", context, error);
    std::process::exit(1);
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(|v| v.as_str())
}

fn parse_flag<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    flag_value(args, flag).and_then(|v| v.parse().ok())
}
