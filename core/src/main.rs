use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{info, warn};

use particle_filter::config::FilterConfig;
use particle_filter::sim::{Scenario, TrackingRecord, run_scenario};

/// Command line arguments
#[derive(Parser)]
#[command(author, version, about = "Track a simulated target with a particle filter.")]
struct Cli {
    /// Filter configuration file (TOML/JSON/YAML). Flags below override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tracking scenario to simulate
    #[arg(long, value_enum, default_value_t = Scenario::ConstantVelocity)]
    scenario: Scenario,

    /// Number of simulated samples
    #[arg(long, default_value_t = 200)]
    steps: usize,

    /// Number of particles
    #[arg(short, long)]
    particles: Option<usize>,

    /// Random seed for truth, sensors, and filter
    #[arg(long)]
    seed: Option<u64>,

    /// Write per-step tracking records to this CSV file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write the effective configuration to this file and exit
    #[arg(long)]
    write_config: Option<PathBuf>,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log file path (if not specified, logs to stderr)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn init_logger(log_level: &str, log_file: Option<&PathBuf>) -> Result<()> {
    use std::io::Write;

    let level = log_level.parse::<log::LevelFilter>().unwrap_or_else(|_| {
        eprintln!("Invalid log level '{}', defaulting to 'info'", log_level);
        log::LevelFilter::Info
    });

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} [{}] - {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.args()
        )
    });

    if let Some(log_path) = log_file {
        if let Some(parent) = log_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating log directory {}", parent.display()))?;
        }
        let target = Box::new(
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_path)
                .with_context(|| format!("opening log file {}", log_path.display()))?,
        );
        builder.target(env_logger::Target::Pipe(target));
    }

    builder.try_init()?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(&cli.log_level, cli.log_file.as_ref())?;

    let mut config = match &cli.config {
        Some(path) => FilterConfig::from_file(path)
            .with_context(|| format!("reading configuration {}", path.display()))?,
        None => FilterConfig::default(),
    };
    if let Some(particles) = cli.particles {
        config.num_particles = particles;
    }
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    if let Err(message) = config.validate() {
        bail!("invalid configuration: {message}");
    }

    if let Some(path) = &cli.write_config {
        config
            .to_file(path)
            .with_context(|| format!("writing configuration {}", path.display()))?;
        info!("wrote configuration to {}", path.display());
        return Ok(());
    }

    if cli.steps <= 10 {
        bail!("--steps must exceed the ten-sample alignment window, got {}", cli.steps);
    }

    let result = run_scenario(cli.scenario, &config, cli.steps);
    let resampled = result.records.iter().filter(|r| r.resampled).count();
    let final_error = result.records.last().map_or(0.0, |r| r.error);
    info!(
        "similarity {:.5} (offsets {:?}), final error {:.4}, resampled {} of {} steps",
        result.similarity.score,
        result.similarity.offsets,
        final_error,
        resampled,
        result.records.len()
    );
    if result.similarity.score >= 0.5 {
        warn!("track diverged: similarity {:.5}", result.similarity.score);
    }

    if let Some(path) = &cli.output {
        TrackingRecord::to_csv(&result.records, path)
            .with_context(|| format!("writing records to {}", path.display()))?;
        info!("wrote {} records to {}", result.records.len(), path.display());
    }
    Ok(())
}
