use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::LevelFilter;
use metric_calib::config::{load_json, write_json, CalibrateConfig, MeasureConfig};
use metric_calib::measure::PointSpace;
use metric_calib::pipeline::{run_calibration, run_measurement, undistort_file, ImageOutcome};
use metric_calib::store::load_calibration;
use nalgebra::Point2;

/// Checkerboard camera calibration and planar metric measurement.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    /// Log verbosity (error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "info", value_parser = parse_level)]
    log_level: LevelFilter,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Calibrate from a folder of checkerboard images and save the artifact.
    Calibrate {
        /// JSON CalibrateConfig; defaults are used for missing fields.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Overrides `image_dir`.
        #[arg(long)]
        images: Option<PathBuf>,
        /// Overrides `output`.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Inner corners along the board's long side.
        #[arg(long)]
        cols: Option<usize>,
        /// Inner corners along the board's short side.
        #[arg(long)]
        rows: Option<usize>,
        /// Print the full report as JSON instead of a summary.
        #[arg(long)]
        json: bool,
    },
    /// Measure an object on a plane at a known distance.
    Measure {
        /// JSON MeasureConfig; defaults are used for missing fields.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Overrides the calibration artifact path.
        #[arg(long)]
        calibration: Option<PathBuf>,
        /// Overrides the image path.
        #[arg(long)]
        image: Option<PathBuf>,
        /// Overrides the camera-to-plane distance in metres.
        #[arg(long)]
        depth: Option<f64>,
        /// Overrides the four corner points, as `x,y` pairs.
        #[arg(long, num_args = 4, value_parser = parse_point, allow_hyphen_values = true)]
        points: Option<Vec<Point2<f64>>>,
        /// Points were picked in the undistorted image.
        #[arg(long)]
        undistorted: bool,
        /// Print the full report as JSON instead of a summary.
        #[arg(long)]
        json: bool,
    },
    /// Write an undistorted grayscale copy of an image.
    Undistort {
        #[arg(long, default_value = "calibration_data.json")]
        calibration: PathBuf,
        #[arg(long, default_value_t = 1.0)]
        alpha: f64,
        input: PathBuf,
        output: PathBuf,
    },
    /// Write a config file with every default filled in.
    InitConfig {
        #[arg(value_enum)]
        kind: ConfigKind,
        output: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum ConfigKind {
    Calibrate,
    Measure,
}

fn parse_level(s: &str) -> Result<LevelFilter, String> {
    s.parse().map_err(|_| format!("unknown log level `{s}`"))
}

fn parse_point(s: &str) -> Result<Point2<f64>, String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected `x,y`, got `{s}`"))?;
    let coord = |v: &str, axis: &str| -> Result<f64, String> {
        v.trim()
            .parse()
            .map_err(|e| format!("bad {axis} in `{s}`: {e}"))
    };
    Ok(Point2::new(coord(x, "x")?, coord(y, "y")?))
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_logging(level: LevelFilter) {
    #[cfg(feature = "tracing")]
    metric_calib::core::init_tracing(level);
    #[cfg(not(feature = "tracing"))]
    {
        let _ = metric_calib::core::init_with_level(level);
    }
}

fn try_main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(cli.log_level);

    match cli.command {
        Command::Calibrate {
            config,
            images,
            output,
            cols,
            rows,
            json,
        } => {
            let mut cfg: CalibrateConfig = match config {
                Some(path) => load_json(path)?,
                None => CalibrateConfig::default(),
            };
            if let Some(dir) = images {
                cfg.image_dir = dir;
            }
            if let Some(path) = output {
                cfg.output = path;
            }
            if let Some(cols) = cols {
                cfg.board.cols = cols;
            }
            if let Some(rows) = rows {
                cfg.board.rows = rows;
            }

            let report = run_calibration(&cfg)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }

            for record in &report.images {
                let status = match record.outcome {
                    ImageOutcome::Used => "used",
                    ImageOutcome::PatternNotFound => "pattern not found",
                };
                println!("{}: {status}", record.path.display());
            }
            let camera = &report.result.camera;
            println!("Camera matrix (K):");
            for r in camera.intrinsics.k_matrix().row_iter() {
                println!("  [{:12.4} {:12.4} {:12.4}]", r[0], r[1], r[2]);
            }
            let dist = camera.distortion.to_array();
            println!("Distortion coefficients: {dist:?}");
            println!("Mean reprojection error: {:.4} px", report.result.rms);
            println!(
                "Used {} of {} images; saved to {}",
                report.num_used(),
                report.images.len(),
                cfg.output.display()
            );
        }
        Command::Measure {
            config,
            calibration,
            image,
            depth,
            points,
            undistorted,
            json,
        } => {
            let mut cfg: MeasureConfig = match config {
                Some(path) => load_json(path)?,
                None => MeasureConfig::default(),
            };
            if let Some(path) = calibration {
                cfg.calibration = path;
            }
            if let Some(path) = image {
                cfg.image = path;
            }
            if let Some(z) = depth {
                cfg.query.depth_m = z;
            }
            if let Some(points) = points {
                cfg.query.points = points;
            }
            if undistorted {
                cfg.query.space = PointSpace::Undistorted;
            }

            let report = run_measurement(&cfg)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }
            let r = &report.result;
            println!("Pixel width: {:.2} px", r.width_px);
            println!("Pixel height: {:.2} px", r.height_px);
            println!("Estimated real-world width: {:.3} m", r.width_m);
            println!("Estimated real-world height: {:.3} m", r.height_m);
        }
        Command::Undistort {
            calibration,
            alpha,
            input,
            output,
        } => {
            let artifact = load_calibration(&calibration)?;
            let new_camera = undistort_file(&artifact, &input, &output, alpha)?;
            let k = new_camera.intrinsics;
            println!(
                "new camera: fx={:.4} fy={:.4} cx={:.4} cy={:.4}",
                k.fx, k.fy, k.cx, k.cy
            );
            let roi = new_camera.valid_roi;
            println!(
                "valid region: x={} y={} {}x{}",
                roi.x, roi.y, roi.width, roi.height
            );
        }
        Command::InitConfig { kind, output } => {
            match kind {
                ConfigKind::Calibrate => write_json(&output, &CalibrateConfig::default())?,
                ConfigKind::Measure => write_json(&output, &MeasureConfig::default())?,
            }
            println!("wrote {}", output.display());
        }
    }
    Ok(())
}
