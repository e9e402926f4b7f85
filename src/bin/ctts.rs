//! `ctts` — voice-cloned text-to-speech with a cached, filtered result.
//!
//! Usage:
//!   ctts "Your text here" out.wav speaker.wav
//!
//! Requirements:
//!   - Coqui TTS (`tts`) and SoX (`sox`) on $PATH
//!   - speaker.wav: mono, 16-bit, 22050 or 44100 Hz; no music, no noise,
//!     minimal reverb, steady volume
//!
//! Environment:
//!   CTTS_CONFIG      JSON config file (see `ctts::config`)
//!   CTTS_CACHE_DIR   cache directory (default: system temp dir)
//!   CTTS_DEVICE      auto | gpu | cpu
//!   RUST_LOG         log filter (default: info)

use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use ctts::{Config, Job};

const USAGE: &str = "Usage: ctts \"text\" out.wav speaker.wav";

/// Exactly three positionals. There are no flags, so text such as `-v` or
/// `--help` is taken literally.
#[derive(Debug, Parser)]
#[command(
    name = "ctts",
    disable_help_flag = true,
    disable_version_flag = true,
    override_usage = "ctts \"text\" out.wav speaker.wav"
)]
struct Cli {
    /// Text to speak.
    #[arg(allow_hyphen_values = true)]
    text: String,

    /// Where to write the filtered WAV.
    #[arg(allow_hyphen_values = true)]
    output: PathBuf,

    /// Reference clip of the voice to clone.
    #[arg(allow_hyphen_values = true)]
    speaker_wav: PathBuf,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stdout)
        .without_time()
        .with_target(false)
        .with_level(false)
        .init();
}

fn main() -> ExitCode {
    // Nothing may touch the filesystem before the arguments are known good.
    // The count is checked on the raw argv because clap swallows a `--`
    // separator, which would let four words pass as three positionals.
    if std::env::args_os().len() != 4 {
        println!("{USAGE}");
        return ExitCode::from(1);
    }
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(_) => {
            println!("{USAGE}");
            return ExitCode::from(1);
        }
    };

    init_logging();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ctts: configuration error: {e:#}");
            return ExitCode::from(2);
        }
    };
    tracing::debug!(?config, "configuration");

    let pipeline = ctts::pipeline_from_config(&config);
    let job = Job { text: cli.text, output: cli.output, speaker_wav: cli.speaker_wav };

    match pipeline.run(&job) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ctts: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}
