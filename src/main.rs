//! # Takeout Organizer - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Validazione degli input dell'utente
//! - Caricamento del profilo e override dai flag espliciti
//! - Mappatura dell'esito del run sull'exit code
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI (sottocomando `optimize` o `organize`)
//! 2. Configura il logging (`RUST_LOG`, altrimenti INFO o DEBUG con `--verbose`)
//! 3. Valida che la directory di input esista e crea quella di output
//! 4. Istanzia il comando, collega Ctrl+C alla cancellazione e avvia il run
//! 5. Stampa il riepilogo ed esce con il codice corrispondente
//!
//! ## Esempio di utilizzo:
//! ```bash
//! takeout-organizer optimize --input-dir ~/Takeout --output-dir ~/Optimized --workers 8
//! takeout-organizer organize --input-dir ~/Takeout --output-dir ~/Photos --utc-offset-minutes 60
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use takeout_organizer::{
    error::exit_code, json_output::JsonMessage, CancelToken, Config, ConflictPolicy, FfmpegEncoder,
    MediaOptimizer, OptimizeError, Organizer, RunSummary,
};

#[derive(Parser)]
#[command(name = "takeout-organizer", version)]
#[command(about = "Optimize and organize Google Takeout photo and video exports")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Re-encode media into a mirrored, smaller output tree
    Optimize(OptimizeArgs),
    /// Flatten media into one directory, named by capture date
    Organize(OrganizeArgs),
}

#[derive(Args)]
struct CommonArgs {
    /// Root of the Takeout export
    #[arg(long)]
    input_dir: PathBuf,

    /// Where results are written (created if missing)
    #[arg(long)]
    output_dir: PathBuf,

    /// Delete each original after its output was written successfully
    #[arg(long)]
    delete_original_files: bool,

    /// Walk and plan only - no writes, no deletions
    #[arg(long)]
    dry_run: bool,

    /// What to do when the destination file already exists
    #[arg(long, value_enum)]
    on_conflict: Option<ConflictPolicy>,

    /// Emit newline-delimited JSON events on stdout
    #[arg(long)]
    json: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Profile file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct OptimizeArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Number of parallel workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Maximum image width
    #[arg(long)]
    max_width: Option<u32>,

    /// Maximum image height
    #[arg(long)]
    max_height: Option<u32>,

    /// JPEG quality (1-100)
    #[arg(long)]
    jpeg_quality: Option<u8>,

    /// Video CRF value (0-51, lower = better quality)
    #[arg(long)]
    video_crf: Option<u8>,

    /// x264 preset
    #[arg(long)]
    video_preset: Option<String>,

    /// Audio bitrate for videos and audio files
    #[arg(long)]
    audio_bitrate: Option<String>,

    /// Per-file transcode timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Store the effective encoding options in the profile file
    #[arg(long)]
    save_config: bool,
}

#[derive(Args)]
struct OrganizeArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Offset from UTC applied to capture times, in minutes
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    utc_offset_minutes: i32,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let common = match &cli.command {
        Command::Optimize(args) => &args.common,
        Command::Organize(args) => &args.common,
    };
    let json_output = common.json;
    init_logging(common.verbose, json_output);

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            let code = e
                .downcast_ref::<OptimizeError>()
                .map(|e| e.exit_code())
                .unwrap_or(exit_code::DIR_ERROR);
            error!("{:#}", e);
            if json_output {
                JsonMessage::error(e.to_string(), Some(format!("{:#}", e))).emit();
            }
            ExitCode::from(code)
        }
    }
}

fn init_logging(verbose: bool, json_output: bool) {
    let default_level = match (verbose, json_output) {
        (true, _) => "debug",
        (false, true) => "warn",
        (false, false) => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<u8> {
    match cli.command {
        Command::Optimize(args) => {
            let config = optimize_config(&args).await?;
            prepare_directories(&config).await?;

            let encoder = Arc::new(FfmpegEncoder::from_config(&config)?);
            let optimizer = MediaOptimizer::new(config.clone(), encoder)?;
            cancel_on_ctrl_c(optimizer.cancel_token());

            let summary = optimizer.run().await?;
            Ok(report(&summary, &config))
        }
        Command::Organize(args) => {
            let config = load_config(&args.common).await?;
            prepare_directories(&config).await?;

            let organizer = Organizer::new(config.clone(), args.utc_offset_minutes)?;
            cancel_on_ctrl_c(organizer.cancel_token());

            let summary = organizer.run().await?;
            Ok(report(&summary, &config))
        }
    }
}

/// Profile first, then the flags that apply to every command
async fn load_config(common: &CommonArgs) -> Result<Config> {
    let profile_path = common.config.clone().or_else(Config::default_profile_path);
    let mut config = match &profile_path {
        Some(path) => Config::from_file(path).await?,
        None => Config::default(),
    };

    config.input_dir = common.input_dir.clone();
    config.output_dir = common.output_dir.clone();
    config.delete_original_files = common.delete_original_files;
    config.dry_run = common.dry_run;
    config.json_output = common.json;
    if let Some(policy) = common.on_conflict {
        config.on_conflict = policy;
    }
    Ok(config)
}

async fn optimize_config(args: &OptimizeArgs) -> Result<Config> {
    let mut config = load_config(&args.common).await?;

    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(max_width) = args.max_width {
        config.max_width = max_width;
    }
    if let Some(max_height) = args.max_height {
        config.max_height = max_height;
    }
    if let Some(quality) = args.jpeg_quality {
        config.jpeg_quality = quality;
    }
    if let Some(crf) = args.video_crf {
        config.video_crf = crf;
    }
    if let Some(preset) = &args.video_preset {
        config.video_preset = preset.clone();
    }
    if let Some(bitrate) = &args.audio_bitrate {
        config.audio_bitrate = bitrate.clone();
    }
    if let Some(secs) = args.timeout_secs {
        config.timeout_secs = secs;
    }

    if args.save_config {
        config.validate()?;
        let path = args
            .common
            .config
            .clone()
            .or_else(Config::default_profile_path)
            .context("No config directory available for the profile")?;
        config.save_to_file(&path).await?;
        info!("Saved profile to {}", path.display());
    }

    Ok(config)
}

/// Input must exist; output is created when missing (skipped in dry run)
async fn prepare_directories(config: &Config) -> Result<(), OptimizeError> {
    if !config.input_dir.is_dir() {
        return Err(OptimizeError::DirectoryAccess {
            path: config.input_dir.clone(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "input directory does not exist"),
        });
    }

    if !config.dry_run && !config.output_dir.exists() {
        info!("Creating output directory: {}", config.output_dir.display());
        tokio::fs::create_dir_all(&config.output_dir)
            .await
            .map_err(|e| OptimizeError::output_write(&config.output_dir, e))?;
    }
    if config.output_dir.exists() && !config.output_dir.is_dir() {
        return Err(OptimizeError::Validation(format!(
            "Output path is not a directory: {}",
            config.output_dir.display()
        )));
    }
    Ok(())
}

fn cancel_on_ctrl_c(token: CancelToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping workers...");
            token.cancel();
        }
    });
}

/// Print the human report and pick the exit code
fn report(summary: &RunSummary, config: &Config) -> u8 {
    if !config.json_output {
        println!("{}", summary.format_report());
    }
    if summary.has_failures() {
        exit_code::FILE_ERROR
    } else {
        exit_code::SUCCESS
    }
}
