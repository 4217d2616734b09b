//! Shared types and enums used across glacierprep.
//! Includes `MatchPolicy`, `Resampling`, `LayerKind`, `MaskSource` and
//! `ProcessingLevel`.
use serde::{Deserialize, Serialize};

/// How many spatial index rows a tile footprint may intersect.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchPolicy {
    /// File-per-region indices: anything but a single match is an error.
    ExactlyOne,
    /// Area mosaics: one or more matches, zero is an error.
    AtLeastOne,
    /// Masks where an empty lookup means an all-background tile.
    Any,
}

impl std::fmt::Display for MatchPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchPolicy::ExactlyOne => write!(f, "exactly-one"),
            MatchPolicy::AtLeastOne => write!(f, "at-least-one"),
            MatchPolicy::Any => write!(f, "any"),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Resampling {
    Nearest,
    Bilinear,
}

impl std::fmt::Display for Resampling {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resampling::Nearest => write!(f, "nearest"),
            Resampling::Bilinear => write!(f, "bilinear"),
        }
    }
}

/// What an auxiliary layer produces for each tile.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayerKind {
    /// Merge matched rasters and reproject them onto the tile grid.
    Mosaic,
    /// Rasterize matched vector geometries onto the tile grid.
    Mask,
}

impl std::fmt::Display for LayerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayerKind::Mosaic => write!(f, "mosaic"),
            LayerKind::Mask => write!(f, "mask"),
        }
    }
}

/// Where the geometries of a mask layer come from.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MaskSource {
    /// The matched index rows are the mask geometries.
    Index,
    /// Each matched descriptor points to a zipped vector archive.
    Archive,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum ProcessingLevel {
    L1C,
    L2A,
}

impl ProcessingLevel {
    /// Link relation used by shadow-catalog items to point at the source scene.
    pub fn link_rel(&self) -> &'static str {
        match self {
            ProcessingLevel::L1C => "item-L1C",
            ProcessingLevel::L2A => "item-L2A",
        }
    }
}

impl std::fmt::Display for ProcessingLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingLevel::L1C => write!(f, "L1C"),
            ProcessingLevel::L2A => write!(f, "L2A"),
        }
    }
}
