//! ECV viewer.
//!
//! Command-line driver for the raster engine: list datasets, render a frame
//! to PNG, and run point, region and slice queries against a Zarr pyramid.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use ecv_common::{ColourMapName, DatasetId, DatasetRegistry, EngineConfig, LonLat, Viewport};
use ecv_viewer::{load_config, open_store, parse_bbox, parse_polygon, PngPort};
use frame_engine::{FrameOrchestrator, ShareState};
use grid_processor::{EngineCaches, QueryOutcome, QueryService, SliceLoader};

#[derive(Parser, Debug)]
#[command(name = "ecv-viewer")]
#[command(about = "Headless driver for the ECV multi-resolution raster engine")]
struct Args {
    /// Engine configuration (YAML)
    #[arg(short, long, env = "ECV_CONFIG")]
    config: Option<PathBuf>,

    /// Store root: http(s):// URL, file:// URL or local directory
    #[arg(long, env = "ECV_API_BASE_URL")]
    api_base_url: Option<String>,

    /// Log level
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Number of tokio worker threads (default: number of CPU cores)
    #[arg(long, env = "ECV_WORKER_THREADS")]
    worker_threads: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List registered datasets
    Datasets,

    /// Render one frame to a PNG plus a JSON sidecar with its bounds
    Render {
        /// Dataset id
        #[arg(short, long)]
        dataset: Option<String>,

        /// Restore a shared view (`dataset=..&time=..`) instead of the flags
        #[arg(long, conflicts_with = "dataset")]
        share: Option<String>,

        #[arg(long, default_value = "0")]
        time: usize,

        #[arg(long)]
        year: Option<i32>,

        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        lon: f64,

        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, default_value = "0")]
        zoom: f64,

        /// Visible area `west,south,east,north`; enables viewport-scoped reads
        #[arg(long, allow_hyphen_values = true)]
        bbox: Option<String>,

        /// Colour map (dataset default when omitted)
        #[arg(long)]
        colour_map: Option<String>,

        /// Smoothing level 0..=3
        #[arg(long)]
        smoothing: Option<u8>,

        #[arg(long)]
        opacity: Option<f32>,

        /// Output PNG path
        #[arg(short, long, default_value = "frame.png")]
        output: PathBuf,
    },

    /// Point timeseries at a location
    Timeseries {
        #[arg(short, long)]
        dataset: String,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long)]
        year: Option<i32>,
    },

    /// Aggregate over a polygon `lon,lat;lon,lat;...`
    Aggregate {
        #[arg(short, long)]
        dataset: String,

        #[arg(long, allow_hyphen_values = true)]
        polygon: String,

        #[arg(long)]
        year: Option<i32>,

        #[arg(long, default_value = "0")]
        time: usize,
    },

    /// Statistics over every valid pixel of one slice
    Stats {
        #[arg(short, long)]
        dataset: String,

        #[arg(long)]
        year: Option<i32>,

        #[arg(long, default_value = "0")]
        time: usize,
    },
}

fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args.log_level, args.json_logs)?;

    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(threads) = args.worker_threads {
        info!("Configuring tokio runtime with {} worker threads", threads);
        runtime_builder.worker_threads(threads);
    }

    let runtime = runtime_builder.build()?;
    runtime.block_on(async_main(args))
}

fn init_tracing(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow!("failed to install tracing subscriber: {}", e))
}

async fn async_main(args: Args) -> Result<()> {
    let config = load_config(args.config.as_deref(), args.api_base_url)?;

    match args.command {
        Commands::Datasets => list_datasets(&config),
        Commands::Render {
            dataset,
            share,
            time,
            year,
            lon,
            lat,
            zoom,
            bbox,
            colour_map,
            smoothing,
            opacity,
            output,
        } => {
            let view = match (share, dataset) {
                (Some(query), _) => View::Shared(
                    query
                        .parse::<ShareState>()
                        .context("invalid --share query string")?,
                ),
                (None, Some(dataset)) => {
                    let mut viewport = Viewport::new(LonLat::new(lon, lat), zoom);
                    if let Some(bbox) = bbox {
                        viewport = viewport.with_bounds(parse_bbox(&bbox)?);
                    }
                    View::Explicit {
                        dataset: DatasetId::new(dataset),
                        viewport,
                        time,
                        year,
                        colour_map: colour_map
                            .map(|name| name.parse::<ColourMapName>())
                            .transpose()?,
                        smoothing,
                        opacity,
                    }
                }
                (None, None) => bail!("either --dataset or --share is required"),
            };
            render(config, view, output).await
        }
        Commands::Timeseries {
            dataset,
            lon,
            lat,
            year,
        } => {
            let (queries, registry) = query_service(&config)?;
            let dataset = registry.require(&DatasetId::new(dataset))?;
            let outcome = queries
                .point_timeseries(&dataset, LonLat::new(lon, lat), year)
                .await?;
            print_outcome(outcome)
        }
        Commands::Aggregate {
            dataset,
            polygon,
            year,
            time,
        } => {
            let (queries, registry) = query_service(&config)?;
            let dataset = registry.require(&DatasetId::new(dataset))?;
            let ring = parse_polygon(&polygon)?;
            let aggregate = queries.region_aggregate(&dataset, &ring, year, time).await?;
            print_json(&aggregate)
        }
        Commands::Stats {
            dataset,
            year,
            time,
        } => {
            let (queries, registry) = query_service(&config)?;
            let dataset = registry.require(&DatasetId::new(dataset))?;
            let outcome = queries.slice_stats(&dataset, year, time).await?;
            print_outcome(outcome)
        }
    }
}

enum View {
    Shared(ShareState),
    Explicit {
        dataset: DatasetId,
        viewport: Viewport,
        time: usize,
        year: Option<i32>,
        colour_map: Option<ColourMapName>,
        smoothing: Option<u8>,
        opacity: Option<f32>,
    },
}

fn list_datasets(config: &EngineConfig) -> Result<()> {
    let registry = config.build_registry()?;
    if registry.is_empty() {
        println!("no datasets configured");
        return Ok(());
    }
    for d in registry.iter() {
        let years = d
            .year_range
            .map(|r| format!(" years {}-{}", r.start, r.end))
            .unwrap_or_default();
        println!(
            "{:<20} {:<8} {} levels  {:?}  [{} .. {}] {}{}  {}",
            d.id,
            d.crs,
            d.levels.len(),
            d.dimensionality,
            d.value_range.vmin,
            d.value_range.vmax,
            d.unit,
            years,
            d.display_title()
        );
    }
    Ok(())
}

async fn render(config: EngineConfig, view: View, output: PathBuf) -> Result<()> {
    let store = open_store(&config.api_base_url)?;
    let mut engine = FrameOrchestrator::from_store(config, store, PngPort::new())?;

    match view {
        View::Shared(state) => engine.restore(&state).await?,
        View::Explicit {
            dataset,
            viewport,
            time,
            year,
            colour_map,
            smoothing,
            opacity,
        } => {
            engine.report_viewport(viewport).await;
            engine.select_dataset(&dataset).await?;
            if let Some(year) = year {
                engine.set_year(year).await?;
            }
            engine.set_time(time).await?;
            if let Some(colour_map) = colour_map {
                engine.set_colour_map(colour_map).await?;
            }
            if let Some(smoothing) = smoothing {
                engine.set_smoothing(smoothing).await?;
            }
            if let Some(opacity) = opacity {
                engine.set_opacity(opacity)?;
            }
        }
    }
    engine.settle().await;
    engine.shutdown();

    let port = engine.port();
    if port.current().is_none() {
        let reason = port
            .errors()
            .last()
            .cloned()
            .unwrap_or_else(|| "no frame produced".to_string());
        bail!("render failed: {}", reason);
    }
    let sidecar = port.write(&output)?;
    print_json(&sidecar)?;
    if let Some(share) = engine.share_state() {
        println!("share: ?{}", share);
    }
    Ok(())
}

fn query_service(config: &EngineConfig) -> Result<(QueryService, Arc<DatasetRegistry>)> {
    let registry = Arc::new(config.build_registry()?);
    let store = open_store(&config.api_base_url)?;
    let caches = Arc::new(EngineCaches::new(config.cache_capacities));
    let loader = SliceLoader::new(store, caches, config.loader);
    Ok((QueryService::new(loader), registry))
}

#[derive(Serialize)]
struct Empty {
    empty: String,
}

fn print_outcome<T: Serialize>(outcome: QueryOutcome<T>) -> Result<()> {
    match outcome {
        Ok(value) => print_json(&value),
        Err(empty) => print_json(&Empty {
            empty: empty.to_string(),
        }),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
