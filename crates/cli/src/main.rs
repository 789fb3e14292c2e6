//! ThermoScale CLI - statistical LST downscaling

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use thermoscale_core::io::{read_geotiff, write_geotiff};
use thermoscale_core::{Crs, Raster};
use thermoscale_downscaling::indices::SpectralIndex;
use thermoscale_downscaling::pipeline::{downscale_lst, DownscalingParams};
use thermoscale_downscaling::scene::{GeoTiffSceneSource, SceneSource, SceneSpec};
use thermoscale_downscaling::sensors::{kelvin_to_celsius, thermal_to_kelvin, BandKind, Sensor};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "thermoscale")]
#[command(author, version, about = "Downscale 30 m LST to 10 m using spectral indices", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Run the downscaling pipeline on one scene pair
    Downscale {
        /// Coarse LST GeoTIFF (Kelvin, or raw Landsat thermal DN with --scale-thermal)
        #[arg(long)]
        lst: PathBuf,

        /// Fine NIR band GeoTIFF
        #[arg(long)]
        nir: PathBuf,

        /// Fine red band GeoTIFF
        #[arg(long)]
        red: PathBuf,

        /// Fine green band GeoTIFF (needed for NDWI)
        #[arg(long)]
        green: Option<PathBuf>,

        /// Fine SWIR1 band GeoTIFF (needed for NDBI)
        #[arg(long)]
        swir: Option<PathBuf>,

        /// Output GeoTIFF for the downscaled LST
        #[arg(short, long)]
        output: PathBuf,

        /// Comma-separated index families to regress on (ndvi,ndbi,ndwi)
        #[arg(long, default_value = "ndvi")]
        indices: String,

        /// EPSG code shared by all inputs
        #[arg(long)]
        epsg: Option<u32>,

        /// Interpret the LST input as raw Landsat C2 L2 thermal DN
        #[arg(long)]
        scale_thermal: bool,

        /// Write the output in Celsius instead of Kelvin
        #[arg(long)]
        celsius: bool,

        /// Minimum valid sample count for the regression
        #[arg(long, default_value_t = 30)]
        min_samples: usize,

        /// Outlier rejection threshold in standard deviations
        #[arg(long, default_value_t = 3.0)]
        outlier_sigma: f64,

        /// Minimum valid fine-pixel fraction per coarse cell
        #[arg(long, default_value_t = 0.5)]
        min_coverage: f64,

        /// Optional output clamp, Kelvin: "min,max"
        #[arg(long)]
        clamp: Option<String>,

        /// Write the regression summary JSON here (stdout if omitted)
        #[arg(long)]
        summary: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default subscriber failed");

    match cli.command {
        Commands::Info { input } => run_info(&input),
        Commands::Downscale {
            lst,
            nir,
            red,
            green,
            swir,
            output,
            indices,
            epsg,
            scale_thermal,
            celsius,
            min_samples,
            outlier_sigma,
            min_coverage,
            clamp,
            summary,
        } => run_downscale(DownscaleArgs {
            lst,
            nir,
            red,
            green,
            swir,
            output,
            indices,
            epsg,
            scale_thermal,
            celsius,
            min_samples,
            outlier_sigma,
            min_coverage,
            clamp,
            summary,
        }),
    }
}

fn run_info(input: &PathBuf) -> Result<()> {
    let raster: Raster<f64> = read_geotiff(input)
        .with_context(|| format!("reading {}", input.display()))?;

    let (rows, cols) = raster.shape();
    let gt = raster.transform();
    let stats = raster.statistics();

    println!("File:       {}", input.display());
    println!("Size:       {} rows x {} cols", rows, cols);
    println!("Cell size:  {} map units", gt.cell_size());
    println!("Origin:     ({}, {})", gt.origin_x, gt.origin_y);
    match (stats.min, stats.max, stats.mean) {
        (Some(min), Some(max), Some(mean)) => {
            println!("Range:      {:.3} .. {:.3} (mean {:.3})", min, max, mean);
        }
        _ => println!("Range:      no valid cells"),
    }
    println!("Valid:      {} cells ({} nodata)", stats.valid_count, stats.nodata_count);

    Ok(())
}

struct DownscaleArgs {
    lst: PathBuf,
    nir: PathBuf,
    red: PathBuf,
    green: Option<PathBuf>,
    swir: Option<PathBuf>,
    output: PathBuf,
    indices: String,
    epsg: Option<u32>,
    scale_thermal: bool,
    celsius: bool,
    min_samples: usize,
    outlier_sigma: f64,
    min_coverage: f64,
    clamp: Option<String>,
    summary: Option<PathBuf>,
}

fn run_downscale(args: DownscaleArgs) -> Result<()> {
    let start = Instant::now();

    let indices = parse_indices(&args.indices)?;
    let clamp = args.clamp.as_deref().map(parse_clamp).transpose()?;
    let crs = args.epsg.map(Crs::from_epsg);

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}").expect("static template is valid"),
    );

    // Assemble the fine scene from the band files
    spinner.set_message("loading fine scene");
    let sensor = Sensor::Sentinel2;
    let mut band_paths = vec![
        (band_name(sensor, BandKind::Nir), args.nir.clone()),
        (band_name(sensor, BandKind::Red), args.red.clone()),
    ];
    if let Some(green) = &args.green {
        band_paths.push((band_name(sensor, BandKind::Green), green.clone()));
    }
    if let Some(swir) = &args.swir {
        band_paths.push((band_name(sensor, BandKind::Swir1), swir.clone()));
    }

    let spec = SceneSpec {
        sensor,
        band_paths,
        acquired: None,
        crs: crs.clone(),
    };
    let scene = GeoTiffSceneSource
        .load_scene(&spec)
        .context("loading fine scene bands")?;

    spinner.set_message("loading coarse LST");
    let mut coarse_lst: Raster<f64> = read_geotiff(&args.lst)
        .with_context(|| format!("reading {}", args.lst.display()))?;
    coarse_lst.set_nodata(Some(f64::NAN));
    coarse_lst.set_crs(crs);
    if args.scale_thermal {
        coarse_lst = thermal_to_kelvin(&coarse_lst)?;
    }

    let params = DownscalingParams {
        indices,
        fit: thermoscale_downscaling::regression::FitParams {
            min_samples: args.min_samples,
            outlier_sigma: args.outlier_sigma,
            ..Default::default()
        },
        aggregation: thermoscale_downscaling::resample::AggregateParams {
            min_coverage: args.min_coverage,
            ..Default::default()
        },
        clamp,
    };

    spinner.set_message("downscaling");
    let result = downscale_lst(&scene, &coarse_lst, &params).context("downscaling failed")?;
    spinner.finish_and_clear();

    if result.coverage.is_degraded() {
        warn!(
            "aggregation coverage degraded: {} of {} coarse cells below threshold",
            result.coverage.low_coverage_cells, result.coverage.total_cells
        );
    }

    let output_lst = if args.celsius {
        kelvin_to_celsius(&result.lst)
    } else {
        result.lst.clone()
    };
    write_geotiff(&output_lst, &args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;

    let summary_json = serde_json::to_string_pretty(&result.model.summary())?;
    match &args.summary {
        Some(path) => std::fs::write(path, &summary_json)
            .with_context(|| format!("writing {}", path.display()))?,
        None => println!("{}", summary_json),
    }

    info!(
        "downscaled {} samples, R² = {:.4}, {:.2?} elapsed",
        result.model.n_samples(),
        result.model.r_squared(),
        start.elapsed()
    );
    if let Some((min, max)) = result.lst_range {
        info!("output range: {:.2} .. {:.2}", min, max);
    }

    Ok(())
}

fn band_name(sensor: Sensor, kind: BandKind) -> String {
    sensor
        .band_name(kind)
        .expect("optical bands exist for every supported sensor")
        .to_string()
}

fn parse_indices(arg: &str) -> Result<Vec<SpectralIndex>> {
    let mut indices = Vec::new();
    for name in arg.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match SpectralIndex::from_name(name) {
            Some(idx) => indices.push(idx),
            None => bail!("unknown index '{}' (expected ndvi, ndbi or ndwi)", name),
        }
    }
    if indices.is_empty() {
        bail!("no index families selected");
    }
    Ok(indices)
}

fn parse_clamp(arg: &str) -> Result<(f64, f64)> {
    let parts: Vec<&str> = arg.split(',').collect();
    if parts.len() != 2 {
        bail!("clamp must be 'min,max', got '{}'", arg);
    }
    let min: f64 = parts[0].trim().parse().context("clamp min")?;
    let max: f64 = parts[1].trim().parse().context("clamp max")?;
    if min > max {
        bail!("clamp min {} exceeds max {}", min, max);
    }
    Ok((min, max))
}
