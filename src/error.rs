//! Crate-level error type and `Result` alias for stable, structured error handling.
//! Converts underlying I/O, JSON, storage and GDAL errors, and provides semantic
//! variants for tile/source lookups, catalog content and argument validation.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] crate::io::GdalError),

    #[error("Storage error: {0}")]
    Store(#[from] crate::io::StoreError),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("No source in `{index}` intersects tile {tile}")]
    NoMatch { tile: String, index: String },

    #[error("Tile {tile} matches {count} sources in `{index}`, expected exactly one: {descriptors:?}")]
    AmbiguousMatch {
        tile: String,
        index: String,
        count: usize,
        descriptors: Vec<String>,
    },

    #[error("Item `{item}` is missing property `{key}`")]
    MissingProperty { item: String, key: String },

    #[error("Item `{item}` has no asset `{asset}`")]
    MissingAsset { item: String, asset: String },

    #[error("Catalog entry not found: {0}")]
    NotFound(String),

    #[error("CRS mismatch: expected {expected}, got {found}")]
    CrsMismatch { expected: String, found: String },

    #[error("Unsupported grid: {0}")]
    UnsupportedGrid(String),

    #[error("Invalid geometry: {0}")]
    Geometry(String),

    #[error("Invalid argument: {arg}={value}")]
    InvalidArgument { arg: &'static str, value: String },

    #[error("Missing required argument: {arg}")]
    MissingArgument { arg: String },

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("External error: {0}")]
    External(String),
}

impl Error {
    pub fn external<E: std::fmt::Display>(e: E) -> Self {
        Error::External(e.to_string())
    }
}
