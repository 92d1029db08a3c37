use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use circles_catalog::config::{AppConfig, ConfigError};
use circles_catalog::download::{AcquisitionPipeline, StaticToken};
use circles_catalog::state::data::EventRef;
use circles_catalog::state::SnapshotKind;
use circles_catalog::{CatalogFilter, CatalogStore, ImageCache, PaginationCache, SpatialMapper};

/// Environment variable holding the API bearer token.
const TOKEN_ENV_VAR: &str = "CIRCLES_CATALOG_TOKEN";

/// Download an event snapshot and print a page of its catalog
#[derive(Debug, Parser)]
#[command(name = "circles-catalog", version)]
struct Cli {
    /// Configuration file (overrides discovery)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Event number, e.g. 105
    #[arg(long)]
    event_number: i64,

    /// Event id used by the metadata API
    #[arg(long)]
    event_id: i64,

    /// Restrict to a map id
    #[arg(long)]
    map: Option<i64>,

    /// Restrict to a day id
    #[arg(long)]
    day: Option<i64>,

    /// Free-text search over circle names
    #[arg(long)]
    search: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_configuration(cli.config.clone());
    init_logging(&config);
    info!("starting circles-catalog");

    let data_dir = config.storage.resolve_data_dir();
    let images = Arc::new(ImageCache::from_config(&config.images));
    let store = Arc::new(CatalogStore::new(data_dir, images));

    let token = StaticToken(std::env::var(TOKEN_ENV_VAR).ok());
    let pipeline = match AcquisitionPipeline::new(&config.network, Arc::clone(&store), Arc::new(token)) {
        Ok(pipeline) => pipeline,
        Err(err) => {
            error!(error = %err, "failed to build HTTP client");
            std::process::exit(1);
        }
    };

    let swept = pipeline.sweep_stale_partials();
    if swept > 0 {
        info!(count = swept, "removed stale partial downloads");
    }

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling transfers");
            ctrl_c.cancel();
        }
    });

    let event = EventRef {
        id: cli.event_id,
        number: cli.event_number,
    };
    for kind in [SnapshotKind::Text, SnapshotKind::Images] {
        if pipeline.download(event, kind, &cancel).await.is_none() {
            error!(kind = kind.label(), state = ?pipeline.state(), "snapshot unavailable");
            std::process::exit(1);
        }
    }

    store.prepare(event.number);
    if !store.open_text() {
        error!("attributes database could not be opened");
        std::process::exit(1);
    }
    if store.open_image() {
        store.load_common_images();
        store.load_circle_images();
    }

    print_summary(&store);

    let pages = PaginationCache::new(config.catalog.page_size);
    if let Some(term) = cli.search {
        match pages.search(Arc::clone(&store), term.clone()).await {
            None => println!("Search needs at least 2 characters: {:?}", term),
            Some(ids) => {
                println!("{} circles match {:?}", ids.len(), term);
                pages.set_filtered(ids);
                print_page(&pages, &store).await;
            }
        }
        return;
    }

    let filter = CatalogFilter {
        map_id: cli.map,
        day_id: cli.day,
        ..Default::default()
    };
    if filter.is_empty() {
        println!("Pass --map and/or --day to list circles.");
        return;
    }

    pages.refresh(Arc::clone(&store), filter.clone()).await;
    println!("{} circles for {}", pages.all_ids().len(), filter.fingerprint());
    print_page(&pages, &store).await;

    if let (Some(map_id), Some(day_id)) = (cli.map, cli.day) {
        if let Some(map) = store.maps().into_iter().find(|m| m.id == map_id) {
            let mapper = SpatialMapper::new(config.catalog.resolution);
            mapper.load_map_async(Arc::clone(&store), map, day_id).await;
            let canvas = mapper.canvas_size();
            println!(
                "Map {}: {} occupied cells on a {}x{} canvas",
                map_id,
                mapper.layouts().len(),
                canvas.width,
                canvas.height
            );
        }
    }
}

fn print_summary(store: &CatalogStore) {
    for event in store.events() {
        println!("{} (#{})", event.name, event.number);
    }
    for date in store.dates() {
        println!("  day {}: {}", date.id, date.date);
    }
    for map in store.maps() {
        println!("  map {}: {} [{}]", map.id, map.name, map.filename);
    }
}

async fn print_page(pages: &PaginationCache, store: &Arc<CatalogStore>) {
    for circle in pages.page_circles(Arc::clone(store)).await {
        let space = circle.space_name().unwrap_or_else(|| circle.space_number_combined());
        println!("  {:>6}  {:<10} {}", circle.id, space, circle.name);
    }
    if pages.has_more() {
        println!("  ...");
    }
}

fn load_configuration(override_path: Option<PathBuf>) -> AppConfig {
    match override_path {
        Some(path) => AppConfig::from_file(&path).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = %err, "failed to load config, using defaults");
            AppConfig::default()
        }),
        None => match AppConfig::discover() {
            Ok(cfg) => cfg,
            Err(err) => {
                match &err {
                    ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
                        warn!(path = %path.display(), error = %err, "failed to load config, using defaults");
                    }
                    ConfigError::Context { .. } => {
                        warn!(error = %err, "failed to locate config, using defaults");
                    }
                }
                AppConfig::default()
            }
        },
    }
}

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(config.logging.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    // A subscriber may already be installed; keep it.
    let _ = fmt().with_env_filter(filter).try_init();
}
