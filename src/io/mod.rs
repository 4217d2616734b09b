//! I/O layer: catalog documents, object storage, GDAL-backed raster and
//! vector access, gdalwarp and rasterizer gridding, zipped vector bundles
//! and the scene search client.
pub mod href;

pub mod store;
pub use store::{HttpStore, LocalStore, ObjectStore, Storage, StoreError};

pub mod stac;
pub use stac::{Asset, Catalog, CatalogNode, Item, Link};

pub mod gdal;
pub use gdal::{GdalError, GdalTransform, read_raster, read_vector, transformer};

pub mod archive;
pub mod search;
pub mod warp;
pub mod writers;
