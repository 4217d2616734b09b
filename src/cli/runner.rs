use tracing::info;
use tracing_subscriber::EnvFilter;

use glacierprep::api;
use glacierprep::core::params::WorkflowConfig;
use glacierprep::io::search::SceneSearch;
use glacierprep::io::{CatalogNode, ObjectStore, Storage};

use super::args::{CliArgs, Command};
use super::errors::AppError;

fn init_logging(log: bool) {
    if log {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else if std::env::var_os("RUST_LOG").is_some() {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .init();
    }
}

fn require<'a, T>(section: Option<&'a T>, name: &'static str, command: &'static str) -> Result<&'a T, AppError> {
    section.ok_or(AppError::MissingSection { section: name, command })
}

fn read_scenes(store: &dyn ObjectStore, config: &WorkflowConfig) -> Result<CatalogNode, AppError> {
    Ok(api::read_catalog(store, &config.catalog.url)?)
}

pub fn run(args: CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_logging(args.log);

    let mut config = WorkflowConfig::from_file(&args.config).map_err(|source| AppError::Config {
        path: args.config.display().to_string(),
        source,
    })?;
    if let Some(token) = args.token {
        config.storage.token_path = Some(token);
    }
    let store = Storage::new(&config.storage).map_err(glacierprep::Error::from)?;

    match args.command {
        Command::Search => {
            let params = require(config.search.as_ref(), "search", "search")?;
            let search = SceneSearch::new()?;
            let mut catalog = api::search_scenes(&search, params)?;
            catalog.save(&store, &config.catalog.url)?;
            info!(
                "Saved {} scene(s) to {}",
                catalog.all_items().len(),
                config.catalog.url
            );
        }
        Command::FixLinks => {
            let mut catalog = read_scenes(&store, &config)?;
            let updated = api::fix_asset_links(&mut catalog, &config.links)?;
            catalog.save(&store, &config.catalog.url)?;
            info!("Updated {} asset link(s)", updated);
        }
        Command::CopyAssets { collection, assets } => {
            let mut params = config.copy.clone().unwrap_or_default();
            if collection.is_some() {
                params.collection_id = collection;
            }
            if !assets.is_empty() {
                params.asset_keys = assets;
            }
            let mut catalog = read_scenes(&store, &config)?;
            let copied = api::copy_assets(&store, &mut catalog, &params)?;
            catalog.save(&store, &config.catalog.url)?;
            info!("Copied {} asset(s)", copied);
        }
        Command::Layer { name, skip_existing } => {
            let layer = config.layer(&name)?;
            let catalog = read_scenes(&store, &config)?;
            let report = api::prepare_layer(&store, layer, &catalog, skip_existing)?;
            info!("Layer processing complete!");
            info!("Processed: {}", report.processed);
            info!("Skipped: {}", report.skipped);
        }
        Command::ShadowCatalog => {
            let params = require(config.shadow.as_ref(), "shadow", "shadow-catalog")?;
            let scenes = read_scenes(&store, &config)?;
            let mut shadows = api::build_shadow_catalog(&scenes, params)?;
            shadows.save(&store, &params.output_url)?;
            info!("Saved shadow catalog to {}", params.output_url);
        }
        Command::Jobs { submit } => {
            let mut params = require(config.jobs.as_ref(), "jobs", "jobs")?.clone();
            params.submit |= submit;
            let catalog = api::read_catalog(&store, &params.catalog_url)?;
            api::write_job_scripts(&catalog, &params)?;
        }
    }

    Ok(())
}
