// Songarc planner CLI entry point.
//
// Builds a song plan and prints one of the diagnostic reports. Without a song
// file, plans a built-in pop layout.
//
// Usage:
//   cargo run -p songarc_plan -- [song.json] [--seed N] [--style NAME]
//     [--form FORM] [--policy NAME] [--phrase-length N]
//     [--report full|summary|compact|chart]
//
// Forms: vcb, vc, strophic, through
//
// Logging is controlled through RUST_LOG (default `info`), e.g.
// `RUST_LOG=songarc_plan=debug` to trace constraint resolution.

use songarc_plan::arc_template::SongForm;
use songarc_plan::report::{compact_report, energy_chart, full_report, summary_report};
use songarc_plan::section::{Section, SectionType, layout};
use songarc_plan::{PlanConfig, PlanError, SongFile, SongPlan};
use std::path::Path;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let song_path = args.get(1).filter(|s| !s.starts_with("--"));
    let report: String = parse_flag(&args, "--report").unwrap_or_else(|| "full".to_string());

    let (sections, mut config) = match load_song(song_path.map(|s| Path::new(s.as_str()))) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    // Flags override the song file.
    if let Some(seed) = parse_flag(&args, "--seed") {
        config.seed = seed;
    }
    if let Some(style) = parse_flag(&args, "--style") {
        config.style = style;
    }
    if let Some(name) = parse_flag::<String>(&args, "--form") {
        match parse_form(&name) {
            Some(form) => config = config.with_form(form),
            None => eprintln!("Unknown form '{}'. Inferring from sections.", name),
        }
    }
    if let Some(policy) = parse_flag(&args, "--policy") {
        config.policy = Some(policy);
    }
    if let Some(bars) = parse_flag(&args, "--phrase-length") {
        config.phrase_length = Some(bars);
    }

    let plan = match SongPlan::build(&sections, &config) {
        Ok(plan) => plan,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    match report.as_str() {
        "summary" => print!("{}", summary_report(&plan)),
        "compact" => println!("{}", compact_report(&plan)),
        "chart" => print!("{}", energy_chart(&plan)),
        "full" => print!("{}", full_report(&plan)),
        other => {
            eprintln!("Unknown report '{}'. Using full.", other);
            print!("{}", full_report(&plan));
        }
    }
}

fn load_song(path: Option<&Path>) -> Result<(Vec<Section>, PlanConfig), PlanError> {
    match path {
        Some(path) => {
            let song = SongFile::load(path)?;
            Ok((song.sections()?, song.config))
        }
        None => Ok((demo_layout()?, PlanConfig::default())),
    }
}

fn demo_layout() -> Result<Vec<Section>, PlanError> {
    use SectionType::*;
    layout(&[
        (Intro, 4),
        (Verse, 8),
        (PreChorus, 4),
        (Chorus, 8),
        (Verse, 8),
        (PreChorus, 4),
        (Chorus, 8),
        (Bridge, 8),
        (Chorus, 8),
        (Outro, 4),
    ])
}

fn parse_form(name: &str) -> Option<SongForm> {
    match name.to_lowercase().as_str() {
        "vcb" | "verse-chorus-bridge" => Some(SongForm::VerseChorusBridge),
        "vc" | "verse-chorus" => Some(SongForm::VerseChorus),
        "strophic" => Some(SongForm::Strophic),
        "through" | "through-composed" => Some(SongForm::Through),
        _ => None,
    }
}

fn parse_flag<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
}
