//! Core building blocks: tile ids and grids, geometry helpers, the spatial
//! index resolver, the in-memory raster and outline clipping, and workflow
//! parameters. These are consumed by the high-level `api` module.
pub mod geometry;
pub mod params;
pub mod processing;
pub mod resolver;
pub mod tile;
