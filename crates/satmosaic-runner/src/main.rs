//! satmosaic - build a stitched satellite mosaic for a UTM region.
//!
//! ```text
//! satmosaic --dataset set1
//! satmosaic --geotiff T32UNA.tif --zoom 16 --image-type sentinel2
//! satmosaic --dataset set2 --config mosaic.yaml --report missing.json
//! ```

mod error;
mod output;

use clap::{ArgGroup, Parser};
use error::{Result, RunnerError};
use output::{default_output_path, RegionLabel, RunReport};
use satmosaic_tiles::{
    BoundingBox, CancelFlag, FetchProgress, GeoTiffExtent, HttpTileSource, ImageType, MosaicConfig, MosaicPipeline,
    NamedRegion, UtmZone,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "satmosaic")]
#[command(about = "Fetch and stitch satellite tiles covering a UTM region", long_about = None)]
#[command(group(ArgGroup::new("input").args(["geotiff", "dataset"])))]
struct Cli {
    /// GeoTIFF whose extent and UTM zone define the region
    #[arg(long)]
    geotiff: Option<PathBuf>,

    /// Built-in region (set1, set2); set1 when no GeoTIFF is given
    #[arg(long)]
    dataset: Option<NamedRegion>,

    /// UTM zone, e.g. 32, 33N, 56S or EPSG:32632 (overrides the region's zone)
    #[arg(long)]
    utm_zone: Option<UtmZone>,

    /// Zoom level
    #[arg(long)]
    zoom: Option<u8>,

    /// Imagery product (superres, sentinel2)
    #[arg(long)]
    image_type: Option<ImageType>,

    /// YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum concurrent tile downloads
    #[arg(long)]
    concurrency: Option<usize>,

    /// Attempts per tile
    #[arg(long)]
    retries: Option<u32>,

    /// Output image path (default: stitched_image_{region}_z{zone}.png)
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Write a JSON report of the run, including missing tiles
    #[arg(long)]
    report: Option<PathBuf>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(long, short)]
    verbose: bool,
}

impl Cli {
    /// Config file values with command-line overrides applied.
    fn config(&self) -> Result<MosaicConfig> {
        let mut config = match &self.config {
            Some(path) => MosaicConfig::load(path)?,
            None => MosaicConfig::default(),
        };
        if let Some(zoom) = self.zoom {
            config.zoom = zoom;
        }
        if let Some(image_type) = self.image_type {
            config.image_type = image_type;
        }
        if let Some(concurrency) = self.concurrency {
            config.max_concurrent_fetches = concurrency;
        }
        if let Some(retries) = self.retries {
            config.max_retries_per_tile = retries;
        }
        config.validate()?;
        Ok(config)
    }

    /// Bounding box and its label, from the GeoTIFF or the dataset.
    ///
    /// Falls back to the `set1` dataset when neither is given.
    fn region(&self) -> Result<(BoundingBox, RegionLabel)> {
        if let Some(path) = &self.geotiff {
            let extent = GeoTiffExtent::from_file(path)?;
            if let (Some(file_zone), Some(cli_zone)) = (extent.zone, self.utm_zone) {
                if file_zone != cli_zone {
                    warn!("GeoTIFF is in zone {}, using --utm-zone {}", file_zone, cli_zone);
                }
            }
            let bbox = extent.bounding_box(self.utm_zone)?;
            return Ok((bbox, RegionLabel::GeoTiff(path.clone())));
        }
        let region = self.dataset.unwrap_or(NamedRegion::Set1);
        Ok((
            region.bounding_box(self.utm_zone)?,
            RegionLabel::Dataset(region.name().to_string()),
        ))
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn run(cli: &Cli) -> Result<()> {
    let config = cli.config()?;
    let (bbox, label) = cli.region()?;
    info!(
        "Region {}: UL ({:.0}, {:.0}) LR ({:.0}, {:.0}) in zone {}",
        label.name(),
        bbox.upper_left().0,
        bbox.upper_left().1,
        bbox.lower_right().0,
        bbox.lower_right().1,
        bbox.zone
    );

    let cancel = CancelFlag::new();
    let handler_flag = cancel.clone();
    ctrlc::set_handler(move || {
        if !handler_flag.is_cancelled() {
            eprintln!("Interrupted, finishing in-flight tiles...");
        }
        handler_flag.cancel();
    })?;

    let image_type = config.image_type;
    let source = HttpTileSource::new(config.endpoints.clone(), config.request_timeout())?;
    let report = MosaicPipeline::new(config, source)
        .with_cancel(cancel.clone())
        .with_progress(Box::new(|p: FetchProgress| {
            debug!(
                "[{}/{}] {} {}",
                p.completed,
                p.total,
                p.index,
                if p.succeeded { "ok" } else { "missing" }
            );
        }))
        .run(&bbox)?;

    for missing in &report.mosaic.missing {
        debug!("Missing tile {}: {}", missing.index, missing.reason);
    }

    let output = if report.any_succeeded() {
        let path = cli.output.clone().unwrap_or_else(|| default_output_path(&label, bbox.zone));
        report
            .mosaic
            .canvas
            .image()
            .save(&path)
            .map_err(|source| RunnerError::Image {
                path: path.clone(),
                source,
            })?;
        info!(
            "Saved {}x{} mosaic to {}",
            report.mosaic.canvas.width(),
            report.mosaic.canvas.height(),
            path.display()
        );
        Some(path)
    } else {
        None
    };

    if let Some(report_path) = &cli.report {
        RunReport::new(&label, bbox.zone, image_type, &report, output.clone()).write(report_path)?;
        info!("Wrote report to {}", report_path.display());
    }

    if output.is_none() {
        return Err(RunnerError::NoTilesFetched {
            total: report.grid().tile_count(),
        });
    }
    if cancel.is_cancelled() {
        warn!("Run was interrupted; mosaic is partial");
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    satmosaic_metrics::describe_metrics();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
