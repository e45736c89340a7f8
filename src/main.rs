use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ugc_reel_gen::api::elevenlabs::ElevenLabsNarrator;
use ugc_reel_gen::assets::MediaProber;
use ugc_reel_gen::config::Config;
use ugc_reel_gen::ffmpeg::{FfmpegRenderer, FfprobeProber};
use ugc_reel_gen::generator::{RunDriver, RunStatus, RunSummary};
use ugc_reel_gen::{ReelError, init};

#[derive(Parser)]
#[command(name = "ugc-reel-gen")]
#[command(about = "Assemble short vertical videos from hooks, CTA clips and music")]
struct Cli {
    /// JSON config file; defaults are used when it does not exist
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Number of videos to generate
    #[arg(short = 'n', long)]
    count: Option<usize>,

    /// Generate every hook x hook video combination
    #[arg(long)]
    all: bool,

    /// Only use hooks with these ids (comma separated)
    #[arg(long, value_delimiter = ',')]
    id: Vec<i64>,
}

fn open_log_file(path: &Path) -> Option<std::fs::File> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).ok()?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .ok()
}

/// Logs go to stderr and, without colours, to the run log file.
fn init_tracing(log_file: &Path) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let file_layer = open_log_file(log_file).map(|file| {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
}

async fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut cfg = Config::load_or_default(&cli.config).await?;
    cfg.apply_env();
    if let Some(count) = cli.count {
        cfg.num_videos = count;
    }
    if cli.all {
        cfg.generate_all_combinations = true;
    }
    if !cli.id.is_empty() {
        cfg.specific_hook_ids = cli.id.clone();
    }
    Ok(cfg)
}

async fn run(cfg: Config) -> Result<RunSummary, ReelError> {
    if !init::check_ffmpeg().await {
        tracing::warn!("FFmpeg not found in PATH. Please install FFmpeg.");
    }

    let prober: Arc<dyn MediaProber> = Arc::new(FfprobeProber);
    let narrator = if cfg.narration_available() {
        match ElevenLabsNarrator::new(&cfg, prober.clone()) {
            Ok(n) => Some(Arc::new(n)),
            Err(e) => {
                tracing::warn!("Narration unavailable: {}", e);
                None
            }
        }
    } else {
        tracing::info!("Narration disabled or no ElevenLabs API key; videos will have no voice-over");
        None
    };

    let mut driver = RunDriver::new(cfg, prober, Arc::new(FfmpegRenderer), StdRng::from_entropy());
    if let Some(narrator) = narrator {
        driver = driver.with_narrator(narrator);
    }
    driver.run().await
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let cfg = match load_config(&cli).await {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("[ERROR] Configuration error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&cfg.log_file);

    match run(cfg).await {
        Ok(summary) => {
            let secs = summary.elapsed.as_secs_f64();
            match summary.status {
                RunStatus::Completed => println!(
                    "Created {} video(s) in {:.1}s ({} failed)",
                    summary.produced, secs, summary.failed
                ),
                RunStatus::Exhausted => println!(
                    "All hooks have been used. Created {} video(s) in {:.1}s before stopping. Add new hooks to continue.",
                    summary.produced, secs
                ),
            }
            ExitCode::SUCCESS
        }
        Err(e @ ReelError::Config(_)) => {
            tracing::error!("{}", e);
            eprintln!("[ERROR] Cannot start: {}", e);
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!("Run aborted: {}", e);
            eprintln!("[ERROR] Run aborted: {}", e);
            ExitCode::FAILURE
        }
    }
}
