#![doc = r#"
glacierprep: Sentinel-2 catalog and auxiliary-layer preparation for the
Red Glacier study.

This crate turns a STAC search into a project catalog, points catalog assets
at their object-storage URLs (optionally copying them into the project
store), retiles auxiliary layers (elevation model, coastline mask,
glacier-extent mask) onto the Sentinel-2 tiling scheme, and assembles the
per-date shadow-classification catalog that pairs L1C and L2A scenes. It
powers the `glacierprep` CLI and can be embedded in your own Rust
applications.

Requirements
------------
- GDAL development headers and runtime available on your system.
- Rust 2024 edition toolchain.

Quick start: retile a layer
---------------------------
```rust,no_run
use glacierprep::api;
use glacierprep::core::params::WorkflowConfig;
use glacierprep::io::Storage;

fn main() -> glacierprep::Result<()> {
    let config = WorkflowConfig::from_file("glacierprep.toml".as_ref())?;
    let store = Storage::new(&config.storage)?;
    let catalog = api::read_catalog(&store, &config.catalog.url)?;
    let report = api::prepare_layer(&store, config.layer("dem")?, &catalog, true)?;
    println!("{} tile(s) written", report.processed);
    Ok(())
}
```

Tile lookup without I/O
-----------------------
```rust
use glacierprep::core::geometry::Identity;
use glacierprep::core::resolver::{IndexRow, SpatialIndex};
use glacierprep::core::tile::{GeoTransform, TileGrid, TileId};
use glacierprep::MatchPolicy;
use geo::{polygon, MultiPolygon};

let region = polygon![(x: 0.0, y: 0.0), (x: 100.0, y: 0.0), (x: 100.0, y: 100.0), (x: 0.0, y: 100.0)];
let index = SpatialIndex::new(
    "regions",
    "EPSG:32605",
    vec![IndexRow::new(MultiPolygon::new(vec![region]), "01_rgi60_Alaska.zip")],
);
let grid = TileGrid::new("EPSG:32605", GeoTransform::north_up(10.0, 90.0, 10.0, 10.0), 5, 5);
let tile: TileId = "05VMG".parse().unwrap();
let found = index.resolve(&tile, &grid, &Identity, MatchPolicy::ExactlyOne).unwrap();
assert_eq!(found.descriptors(), ["01_rgi60_Alaska.zip"]);
```

Useful modules
--------------
- [`api`]: high-level entry points for each workflow step.
- [`core`]: tiles, geometry, spatial-index lookup and outline clipping.
- [`io`]: catalogs, object storage, GDAL readers/writers, gdalwarp and
  rasterizer gridding, scene search.
- [`types`]: shared enums (`MatchPolicy`, `Resampling`, `LayerKind`, ...).
- [`error`]: crate-level `Error` and `Result`.
"#]

// Core modules (public)
pub mod api;
pub mod core;
pub mod error;
pub mod io;
pub mod types;

// Curated public API surface
// Types
pub use core::params::{LayerParams, WorkflowConfig};
pub use core::processing::Raster;
pub use core::tile::{TileGrid, TileId};
pub use error::{Error, Result};
pub use types::{LayerKind, MaskSource, MatchPolicy, ProcessingLevel, Resampling};

// Storage and catalogs
pub use io::{CatalogNode, GdalError, Item, ObjectStore, Storage, StoreError};

// High-level API re-exports
pub use api::{
    LayerReport, build_shadow_catalog, copy_assets, fix_asset_links, prepare_layer, read_catalog,
    search_scenes, write_job_scripts,
};
