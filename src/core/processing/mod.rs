//! Raster processing primitives: the in-memory `Raster` and the vector
//! clipping that precedes mask rasterization. Reprojection, mosaicking and
//! rasterization themselves run through GDAL in `io::warp`.
pub mod pipeline;
pub mod raster;

pub use pipeline::clip_to_footprint;
pub use raster::Raster;
