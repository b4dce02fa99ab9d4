//! groundtrack CLI: calibrate a camera, map tracks to the ground, build heatmaps.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use groundtrack::io::{self, CalibrationReport, HeatmapReport};
use groundtrack::core::verbosity_level;
use groundtrack::{pipeline, GroundtrackConfig, Resolution};
use log::info;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "groundtrack")]
#[command(about = "Map tracked pixel positions onto a surveyed ground plane")]
#[command(version)]
struct Cli {
    /// More log output (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate the image-to-ground homography and print or save a report.
    Calibrate(CalibrateArgs),

    /// Map a pixel track CSV to ground coordinates.
    Transform(TransformArgs),

    /// Build an occupancy heatmap from a ground track CSV.
    Heatmap(HeatmapArgs),
}

#[derive(Debug, Clone, Args)]
struct CalibrateArgs {
    /// Run configuration (JSON).
    #[arg(long)]
    config: PathBuf,

    /// Where to write the calibration report; stdout when omitted.
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct TransformArgs {
    /// Run configuration (JSON).
    #[arg(long)]
    config: PathBuf,

    /// Pixel tracks (`personId,frame_idx,x,y`).
    #[arg(long)]
    input: PathBuf,

    /// Ground tracks to write, same layout as the input.
    #[arg(long)]
    output: PathBuf,

    /// Width of the frames the tracks were recorded at (overrides the config).
    #[arg(long, requires = "video_height")]
    video_width: Option<u32>,

    /// Height of the frames the tracks were recorded at (overrides the config).
    #[arg(long, requires = "video_width")]
    video_height: Option<u32>,

    /// Also write the rows that could not be mapped, with the reason.
    #[arg(long)]
    rejected: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct HeatmapArgs {
    /// Run configuration (JSON).
    #[arg(long)]
    config: PathBuf,

    /// Ground tracks produced by `transform`.
    #[arg(long)]
    input: PathBuf,

    /// Where to write the heatmap report (JSON).
    #[arg(long)]
    report: PathBuf,

    /// Also render the heatmap as a PNG.
    #[cfg(feature = "image")]
    #[arg(long)]
    png: Option<PathBuf>,

    /// Side of one bin in the PNG, in pixels.
    #[cfg(feature = "image")]
    #[arg(long, default_value_t = 8)]
    cell_px: u32,

    /// Bins per axis (overrides the config).
    #[arg(long)]
    bins: Option<usize>,

    /// Percentile trimmed from each end of each axis (overrides the config).
    #[arg(long)]
    outlier_percentile: Option<f64>,

    /// Position rounding precision in ground units (overrides the config).
    #[arg(long)]
    precision: Option<f64>,
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    match cli.command {
        Commands::Calibrate(args) => run_calibrate(&args),
        Commands::Transform(args) => run_transform(&args),
        Commands::Heatmap(args) => run_heatmap(&args),
    }
}

#[cfg(not(feature = "tracing"))]
fn init_logging(verbose: u8) -> CliResult<()> {
    groundtrack::core::init_with_level(verbosity_level(verbose))?;
    Ok(())
}

#[cfg(feature = "tracing")]
fn init_logging(verbose: u8) -> CliResult<()> {
    groundtrack::core::init_tracing(verbosity_level(verbose), false);
    Ok(())
}

fn run_calibrate(args: &CalibrateArgs) -> CliResult<()> {
    let config = GroundtrackConfig::load_json(&args.config)?;
    let estimate = pipeline::calibrate(&config)?;
    let report = CalibrationReport::new(&config.calibration, &estimate);
    match &args.report {
        Some(path) => {
            io::write_json(path, &report)?;
            info!("calibration report written to {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

fn run_transform(args: &TransformArgs) -> CliResult<()> {
    let config = GroundtrackConfig::load_json(&args.config)?;
    let working = match (args.video_width, args.video_height) {
        (Some(w), Some(h)) => Resolution::new(w, h)?,
        _ => config.working_resolution,
    };
    let estimate = pipeline::calibrate(&config)?;
    let transformer = pipeline::transformer_for(&config, &estimate, working);

    info!("reading tracks from {}", args.input.display());
    let tracks = io::read_tracks(&args.input)?;
    let outcome = pipeline::transform_tracks(&transformer, &tracks);
    io::write_ground(&args.output, &outcome.ground)?;
    if let Some(path) = &args.rejected {
        io::write_rejected(path, &outcome.rejected)?;
        info!("{} rejected rows written to {}", outcome.rejected.len(), path.display());
    }
    println!(
        "mapped {} of {} observations to {} ({} rejected)",
        outcome.ground.len(),
        tracks.len(),
        args.output.display(),
        outcome.rejected.len()
    );
    Ok(())
}

fn run_heatmap(args: &HeatmapArgs) -> CliResult<()> {
    let config = GroundtrackConfig::load_json(&args.config)?;
    let mut settings = config.heatmap;
    if let Some(bins) = args.bins {
        settings.bins = bins;
    }
    if let Some(p) = args.outlier_percentile {
        settings.outlier_percentile = p;
    }
    if let Some(precision) = args.precision {
        settings.rounding_precision = precision;
    }

    info!("reading ground tracks from {}", args.input.display());
    let ground = io::read_ground(&args.input)?;
    let heatmap = pipeline::build_heatmap(&ground, &settings)?;
    let report = HeatmapReport::new(
        &heatmap.aggregation,
        &heatmap.points,
        settings.rounding_precision,
    );
    io::write_json(&args.report, &report)?;
    println!(
        "binned {} of {} positions into {}x{} cells, report at {}",
        report.retained_positions,
        report.distinct_positions,
        report.bins,
        report.bins,
        args.report.display()
    );

    #[cfg(feature = "image")]
    {
        if let Some(png) = &args.png {
            let hist = &heatmap.aggregation.histogram;
            groundtrack::render::render_heatmap_png(hist, args.cell_px, png)?;
            println!("heatmap image written to {}", png.display());
        }
    }
    Ok(())
}
