use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "glacierprep", version, about = "Sentinel-2 catalog and tile preparation")]
pub struct CliArgs {
    /// Workflow configuration (TOML)
    #[arg(short, long, global = true, default_value = "glacierprep.toml")]
    pub config: PathBuf,

    /// Token file for the remote store (overrides `storage.token_path`)
    #[arg(long, global = true)]
    pub token: Option<PathBuf>,

    /// Enable logging
    #[arg(long, global = true, default_value_t = false)]
    pub log: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Search scenes and save them as a new catalog at `catalog.url`
    Search,

    /// Rewrite asset hrefs from the `[[links]]` templates and save the catalog
    FixLinks,

    /// Copy assets next to their items and save the catalog
    CopyAssets {
        /// Only this child catalog (overrides `copy.collection_id`)
        #[arg(long)]
        collection: Option<String>,

        /// Assets to copy (overrides `copy.asset_keys`)
        #[arg(long = "asset", value_name = "KEY")]
        assets: Vec<String>,
    },

    /// Retile an auxiliary layer onto every tile of the catalog
    Layer {
        /// Layer name from `[[layers]]`
        name: String,

        /// Leave tiles whose output already exists
        #[arg(long, default_value_t = false)]
        skip_existing: bool,
    },

    /// Pair L1C and L2A scenes into the shadow-classification catalog
    ShadowCatalog,

    /// Write (and optionally submit) one batch script per catalog item
    Jobs {
        /// Submit new scripts with sbatch (overrides `jobs.submit`)
        #[arg(long, default_value_t = false)]
        submit: bool,
    },
}
