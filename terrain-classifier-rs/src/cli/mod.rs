//! Command-line interface for the terrain classifier.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};

use crate::config::Strategy;
use crate::core::loaders::{find_sweep_files, load_sweep, PointCloud};
use crate::core::transforms::MountTransform;
use crate::core::writers::{write_features_csv, write_ply};
use crate::processors::{FeatureChannel, SweepInput, SweepProcessor};
use crate::visualization;
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "terrain-classifier")]
#[command(about = "Obstacle / terrain classification of 3D sensor sweeps", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify one sweep and write the colored cloud
    Classify {
        /// Input sweep (PLY or x,y,z CSV)
        input: PathBuf,
        /// Index-aligned cloud supplying the ranges used for scoring
        #[arg(long)]
        reference: Option<PathBuf>,
        /// Output PLY (defaults to <input>_classified.ply)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Override the configured strategy
        #[arg(short, long)]
        strategy: Option<Strategy>,
        /// Also dump per-cell features as CSV
        #[arg(long)]
        features_csv: Option<PathBuf>,
        /// Also render the classified sweep (top-down PNG)
        #[arg(long)]
        plot: Option<PathBuf>,
        /// Also render the active strategy's feature channel (PNG)
        #[arg(long)]
        feature_map: Option<PathBuf>,
        /// Maximum number of points drawn by --plot
        #[arg(long, default_value_t = 200_000)]
        max_points: usize,
    },

    /// Classify every numbered sweep of a directory in frame order
    Batch {
        /// Directory containing <name>_<frame>.ply|csv sweeps
        input_dir: PathBuf,
        /// Output directory for classified PLY files
        output_dir: PathBuf,
        /// Override the configured strategy
        #[arg(short, long)]
        strategy: Option<Strategy>,
        /// Limit number of sweeps to process
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Build the grid for one sweep and report occupancy
    Inspect {
        /// Input sweep (PLY or x,y,z CSV)
        input: PathBuf,
        /// Index-aligned cloud supplying the ranges used for scoring
        #[arg(long)]
        reference: Option<PathBuf>,
    },

    /// Write the default configuration as YAML
    InitConfig {
        /// Destination file
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Create a bar for a known number of sweeps
fn create_progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("=>-"));
    }
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<60} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 38 {
            let head: String = value.chars().take(35).collect();
            format!("{}...", head)
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<38} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

/// Where the scoring ranges (and stored positions) of a sweep come from.
enum Reference {
    None,
    /// Ranges from a separately supplied cloud
    Ranges(PointCloud),
    /// Positions and ranges from the sweep moved through the sensor mount
    Mounted(PointCloud),
}

impl Reference {
    fn resolve(sweep: &PointCloud, file: Option<&Path>, config: &PipelineConfig) -> Result<Self> {
        if let Some(path) = file {
            let cloud = load_sweep(path)
                .with_context(|| format!("Failed to load reference cloud {}", path.display()))?;
            return Ok(Reference::Ranges(cloud));
        }
        Ok(match &config.mount {
            Some(mount) => Reference::Mounted(MountTransform::from_config(mount).apply(sweep)),
            None => Reference::None,
        })
    }

    fn input<'a>(&'a self, sweep: &'a PointCloud) -> SweepInput<'a> {
        match self {
            Reference::None => SweepInput::new(sweep),
            Reference::Ranges(cloud) => SweepInput::new(sweep).with_ranges(cloud),
            Reference::Mounted(cloud) => SweepInput::new(sweep).with_positions(cloud).with_ranges(cloud),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Reference::None => "sweep",
            Reference::Ranges(_) => "reference file",
            Reference::Mounted(_) => "sensor mount",
        }
    }
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    let result = match cli.command {
        Commands::InitConfig { path, force } => cmd_init_config(&path, force),
        command => load_config(cli.config.as_deref()).and_then(|config| match command {
            Commands::Classify {
                input,
                reference,
                output,
                strategy,
                features_csv,
                plot,
                feature_map,
                max_points,
            } => cmd_classify(
                &input,
                reference.as_deref(),
                output,
                strategy,
                features_csv.as_deref(),
                plot.as_deref(),
                feature_map.as_deref(),
                max_points,
                config,
            ),
            Commands::Batch {
                input_dir,
                output_dir,
                strategy,
                limit,
            } => cmd_batch(&input_dir, &output_dir, strategy, limit, config),
            Commands::Inspect { input, reference } => cmd_inspect(&input, reference.as_deref(), config),
            Commands::InitConfig { path, force } => cmd_init_config(&path, force),
        }),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

/// Configuration errors are fatal: nothing is processed with a bad config.
fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => {
            let config = PipelineConfig::from_yaml(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            info!("Loaded config from: {}", path.display());
            Ok(config)
        }
        None => Ok(PipelineConfig::default()),
    }
}

fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "sweep".to_string());
    input.with_file_name(format!("{}_classified.ply", stem))
}

fn channel_for(strategy: Strategy) -> FeatureChannel {
    match strategy {
        Strategy::Continuity => FeatureChannel::Continuity,
        Strategy::CrossSection => FeatureChannel::CrossSection,
        Strategy::Histogram => FeatureChannel::Histogram,
        Strategy::Normal => FeatureChannel::Normal,
        Strategy::Combined => FeatureChannel::Sum,
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_classify(
    input: &Path,
    reference: Option<&Path>,
    output: Option<PathBuf>,
    strategy: Option<Strategy>,
    features_csv: Option<&Path>,
    plot: Option<&Path>,
    feature_map: Option<&Path>,
    max_points: usize,
    config: PipelineConfig,
) -> Result<()> {
    let start = Instant::now();
    let output_path = output.unwrap_or_else(|| default_output_path(input));

    let mut processor = SweepProcessor::new(config).context("Invalid configuration")?;
    if let Some(strategy) = strategy {
        processor.set_strategy(strategy);
    }

    println!("Classifying sweep...");
    println!("Input: {}", input.display());
    println!("Output: {}", output_path.display());
    println!("Strategy: {}", processor.strategy());

    let spinner = create_spinner("Loading sweep...");
    let sweep = load_sweep(input).with_context(|| format!("Failed to load sweep {}", input.display()));
    let sweep = match sweep {
        Ok(sweep) => sweep,
        Err(e) => {
            spinner.finish_and_clear();
            return Err(e);
        }
    };

    let reference = Reference::resolve(&sweep, reference, processor.config());
    let reference = match reference {
        Ok(reference) => reference,
        Err(e) => {
            spinner.finish_and_clear();
            return Err(e);
        }
    };

    spinner.set_message("Classifying...");
    let classified = processor.process(&reference.input(&sweep));
    spinner.finish_and_clear();
    let classified = classified.context("Sweep dropped")?;

    write_ply(&output_path, &classified.cloud)
        .with_context(|| format!("Failed to write {}", output_path.display()))?;

    if let Some(path) = features_csv {
        write_features_csv(path, processor.grid(), processor.features())
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    if let Some(path) = plot {
        if classified.cloud.is_empty() {
            warn!("Nothing to plot: sweep has no classified points");
        } else {
            visualization::plot_classified_sweep(path, &classified.cloud, max_points)
                .with_context(|| format!("Failed to plot {}", path.display()))?;
        }
    }
    if let Some(path) = feature_map {
        visualization::plot_feature_map(path, processor.features(), channel_for(classified.strategy))
            .with_context(|| format!("Failed to plot {}", path.display()))?;
    }

    let stats = classified.stats;
    print_summary(
        "Classification Complete",
        &[
            ("Input file", input.display().to_string()),
            ("Output file", output_path.display().to_string()),
            ("Frame", classified.frame_id.clone()),
            ("Strategy", classified.strategy.to_string()),
            ("Ranges from", reference.describe().to_string()),
            ("Input points", stats.input_points.to_string()),
            ("Occupied cells", stats.occupied_cells.to_string()),
            ("Dropped points", stats.dropped().to_string()),
            ("Overwritten", stats.overwritten.to_string()),
            ("Obstacles", classified.counts.obstacles.to_string()),
            ("Terrain", classified.counts.terrain.to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    Ok(())
}

fn cmd_batch(
    input_dir: &Path,
    output_dir: &Path,
    strategy: Option<Strategy>,
    limit: Option<usize>,
    config: PipelineConfig,
) -> Result<()> {
    let start = Instant::now();

    let mut sweeps = find_sweep_files(input_dir)
        .with_context(|| format!("Failed to scan {}", input_dir.display()))?;
    if let Some(limit) = limit {
        sweeps.truncate(limit);
    }
    if sweeps.is_empty() {
        bail!("No numbered sweep files found in {}", input_dir.display());
    }

    let mut processor = SweepProcessor::new(config).context("Invalid configuration")?;
    if let Some(strategy) = strategy {
        processor.set_strategy(strategy);
    }

    println!("Classifying {} sweeps in frame order...", sweeps.len());
    println!("Input directory: {}", input_dir.display());
    println!("Output directory: {}", output_dir.display());
    println!("Strategy: {}", processor.strategy());

    let pb = create_progress_bar(sweeps.len() as u64);
    let mut processed = 0usize;
    let mut dropped = 0usize;
    let mut obstacles = 0usize;
    let mut terrain = 0usize;

    // One sweep at a time through the same processor.
    for (frame, path) in &sweeps {
        pb.set_message(format!("frame {}", frame));

        let outcome = (|| -> Result<_> {
            let sweep = load_sweep(path)?;
            let reference = Reference::resolve(&sweep, None, processor.config())?;
            let classified = processor.process(&reference.input(&sweep))?;

            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| format!("sweep_{}", frame));
            write_ply(&output_dir.join(format!("{}_classified.ply", name)), &classified.cloud)?;
            Ok(classified.counts)
        })();

        match outcome {
            Ok(counts) => {
                processed += 1;
                obstacles += counts.obstacles;
                terrain += counts.terrain;
            }
            Err(e) => {
                dropped += 1;
                pb.suspend(|| warn!("Dropping sweep {}: {:#}", path.display(), e));
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    print_summary(
        "Batch Classification Complete",
        &[
            ("Input directory", input_dir.display().to_string()),
            ("Output directory", output_dir.display().to_string()),
            ("Strategy", processor.strategy().to_string()),
            ("Sweeps processed", processed.to_string()),
            ("Sweeps dropped", dropped.to_string()),
            ("Obstacle cells", obstacles.to_string()),
            ("Terrain cells", terrain.to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    Ok(())
}

fn cmd_inspect(input: &Path, reference: Option<&Path>, config: PipelineConfig) -> Result<()> {
    let start = Instant::now();

    let mut processor = SweepProcessor::new(config).context("Invalid configuration")?;
    let sweep = load_sweep(input).with_context(|| format!("Failed to load sweep {}", input.display()))?;
    let reference = Reference::resolve(&sweep, reference, processor.config())?;
    let stats = processor
        .build_only(&reference.input(&sweep))
        .context("Sweep dropped")?;

    let grid = processor.grid();
    println!("Scan-line occupancy ({} azimuth bins, wrap: {}):", grid.cols(), grid.wraps_azimuth());
    for (row, count) in grid.row_occupancy().iter().enumerate().rev() {
        let fill = count * 40 / grid.cols().max(1);
        println!("  row {:>3} {:>6} |{:<40}|", row, count, "#".repeat(fill));
    }

    print_summary(
        "Grid Inspection",
        &[
            ("Input file", input.display().to_string()),
            ("Grid", format!("{} x {}", grid.rows(), grid.cols())),
            ("Input points", stats.input_points.to_string()),
            ("Assigned", stats.assigned.to_string()),
            ("Occupied cells", stats.occupied_cells.to_string()),
            ("Overwritten", stats.overwritten.to_string()),
            ("Malformed", stats.malformed.to_string()),
            ("Behind sensor", stats.behind_sensor.to_string()),
            ("Out of range", stats.out_of_range.to_string()),
            ("Off grid", stats.out_of_grid.to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    Ok(())
}

fn cmd_init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    PipelineConfig::default()
        .to_yaml(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}
