use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{LayerKind, MaskSource, MatchPolicy, Resampling};

pub const DEFAULT_SEARCH_API: &str = "https://earth-search.aws.element84.com/v0";

/// Workflow parameters, read from a TOML file. Unknown keys are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub storage: StorageParams,
    pub catalog: CatalogParams,
    pub search: Option<SearchParams>,
    #[serde(default)]
    pub links: Vec<LinkParams>,
    pub copy: Option<CopyParams>,
    #[serde(default)]
    pub layers: Vec<LayerParams>,
    pub shadow: Option<ShadowParams>,
    pub jobs: Option<JobParams>,
}

impl WorkflowConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn layer(&self, name: &str) -> Result<&LayerParams> {
        self.layers
            .iter()
            .find(|l| l.name == name)
            .ok_or_else(|| Error::InvalidArgument {
                arg: "layer",
                value: name.to_string(),
            })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageParams {
    /// File holding the bearer token for the remote store
    pub token_path: Option<PathBuf>,
    /// Only hrefs starting with this prefix receive the token
    pub token_url_prefix: Option<String>,
    /// HTTP timeout in seconds; the client default applies when unset
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogParams {
    /// Root of the scene catalog (`.../catalog.json` or its directory)
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchParams {
    #[serde(default = "default_search_api")]
    pub api_url: String,
    pub collections: Vec<String>,
    /// min lon, min lat, max lon, max lat
    pub bbox: [f64; 4],
    /// RFC 3339 interval, e.g. `2016-01-01/2021-12-31`
    pub datetime: String,
    pub max_cloud_cover: Option<f64>,
    #[serde(default = "default_page_limit")]
    pub limit: usize,
    #[serde(default = "default_catalog_id")]
    pub catalog_id: String,
    #[serde(default)]
    pub description: String,
}

/// Rewrites asset hrefs of one collection from a URL template.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkParams {
    pub collection: String,
    pub asset_keys: Vec<String>,
    pub bucket: String,
    pub template: String,
    pub media_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CopyParams {
    /// Restrict the copy to one child of the root catalog
    pub collection_id: Option<String>,
    /// Assets to copy; all assets when empty
    #[serde(default)]
    pub asset_keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerParams {
    pub name: String,
    pub kind: LayerKind,
    /// Spatial index file (GeoJSON, or any vector format GDAL reads)
    pub index_url: String,
    /// Index attribute holding the file URL or classification code
    pub descriptor_field: String,
    pub policy: Option<MatchPolicy>,
    /// Output href template; `{tile_id}` is substituted
    pub output: String,
    /// Asset whose grid defines the tile grid
    #[serde(default = "default_reference_asset")]
    pub reference_asset: String,
    /// Output pixel size in tile CRS units; the reference grid when unset
    pub resolution: Option<f64>,
    #[serde(default = "default_resampling")]
    pub resampling: Resampling,
    pub nodata: Option<f32>,
    #[serde(default = "default_mask_source")]
    pub mask_source: MaskSource,
    /// Archive href for a matched region code (mask from archive); `{code}`
    /// is substituted. The descriptor is the archive href when unset.
    pub archive_template: Option<String>,
    /// Keep only index rows with one of these descriptors (mask from index)
    pub codes: Option<Vec<String>>,
    #[serde(default = "default_foreground")]
    pub foreground: f32,
    #[serde(default)]
    pub background: f32,
}

impl LayerParams {
    /// Configured policy, or the one implied by the layer kind.
    pub fn match_policy(&self) -> MatchPolicy {
        self.policy.unwrap_or(match (self.kind, self.mask_source) {
            (LayerKind::Mosaic, _) => MatchPolicy::AtLeastOne,
            (LayerKind::Mask, MaskSource::Archive) => MatchPolicy::ExactlyOne,
            (LayerKind::Mask, MaskSource::Index) => MatchPolicy::Any,
        })
    }

    pub fn output_href(&self, tile_id: &str) -> String {
        self.output.replace("{tile_id}", tile_id)
    }

    /// Href of the file a matched index descriptor points to.
    pub fn source_href(&self, descriptor: &str) -> String {
        match &self.archive_template {
            Some(template) if self.mask_source == MaskSource::Archive => template.replace("{code}", descriptor),
            _ => crate::io::href::join(&crate::io::href::dirname(&self.index_url), descriptor),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShadowParams {
    #[serde(default = "default_l1c_collection")]
    pub l1c_collection: String,
    #[serde(default = "default_l2a_collection")]
    pub l2a_collection: String,
    /// Root of the catalog to create
    pub output_url: String,
    #[serde(default = "default_shadow_id")]
    pub catalog_id: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobParams {
    pub run_dir: PathBuf,
    /// Catalog whose items get one job each
    pub catalog_url: String,
    /// Script template; a built-in SLURM template when unset
    pub template_path: Option<PathBuf>,
    #[serde(default)]
    pub submit: bool,
    /// Extra `{name}` substitutions for the template
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

fn default_search_api() -> String {
    DEFAULT_SEARCH_API.to_string()
}

fn default_page_limit() -> usize {
    100
}

fn default_catalog_id() -> String {
    "red-glacier".to_string()
}

fn default_reference_asset() -> String {
    "B02".to_string()
}

fn default_resampling() -> Resampling {
    Resampling::Bilinear
}

fn default_mask_source() -> MaskSource {
    MaskSource::Index
}

fn default_foreground() -> f32 {
    1.0
}

fn default_l1c_collection() -> String {
    "sentinel-s2-l1c".to_string()
}

fn default_l2a_collection() -> String {
    "sentinel-s2-l2a-cogs".to_string()
}

fn default_shadow_id() -> String {
    "red-glacier_shadows".to_string()
}
