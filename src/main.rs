use std::path::PathBuf;

use _model::{GridCell, Poi, TransitStop};
use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod cache;
mod config;
mod crs;
mod geofile;
mod grid;
mod metadata;
mod plot;
mod pois;
mod shapes;
mod stops;
mod utils;

use cache::Cache;
use config::Config;
use utils::Http;

const BANNER_WIDTH: usize = 80;

/// Builds the Montreal hex grid, points of interest and transit stops.
#[derive(Debug, Parser)]
struct Cli {
    /// YAML config file [default: montreal.yaml if present]
    #[arg(long)]
    config: Option<PathBuf>,
    /// Project root, overriding the config file
    #[arg(long)]
    root: Option<PathBuf>,
}

struct Steps(usize);

impl Steps {
    fn next(&mut self, heading: &str) {
        println!("{}", "=".repeat(BANNER_WIDTH));
        println!("= {}. {}", self.0, heading.to_uppercase());
        println!("{}", "=".repeat(BANNER_WIDTH));
        self.0 += 1;
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(root) = cli.root {
        config.root = root;
    }
    info!(
        "Walking distance: {} m ({} min at {} km/h)",
        config.walking_distance(),
        config.travel_time,
        config.walking_speed
    );

    let cache = Cache::new(config.cache);
    let http = Http::new(&config.network);
    let mut steps = Steps(0);

    steps.next("Hex grid setup");
    let grid: Vec<GridCell> = cache.get_or_build(
        &config.grid_file(),
        &[
            shapes::components(&config.island_shp()),
            shapes::components(&config.agglo_shp()),
        ]
        .concat(),
        &format!("hex_radius={}", config.hex_radius),
        || grid::create_grid(&config),
    )?;
    let image = plot::render_grid(&grid, config.plot.size);
    plot::save_figure(&image, "montreal_hex_grid", &config.images_dir())?;

    steps.next("Points of interest");
    let pois: Vec<Poi> = cache.get_or_build(
        &config.pois_file(),
        &[
            config.places_csv(),
            config.establishments_csv(),
            config.translations(),
            config.group_mappings(),
        ],
        &format!(
            "cities={};region={};tag_policy={}",
            config.osm.cities.join("|"),
            config.osm.region,
            config.osm.tag_policy.slug()
        ),
        || pois::load(&config, &http),
    )?;

    steps.next("STM stops and stations");
    let stops: Vec<TransitStop> = cache.get_or_build(
        &config.stops_file(),
        &[
            shapes::components(&config.stm_shp()),
            shapes::components(&config.island_shp()),
        ]
        .concat(),
        "",
        || stops::load_transit_stops(&config),
    )?;

    info!(
        "Done: {} grid cells, {} POIs, {} transit stops",
        grid.len(),
        pois.len(),
        stops.len()
    );
    Ok(())
}
