//! Tile identifiers and tile grids.
//!
//! A tile is a cell of the Sentinel-2 MGRS tiling scheme. Its identifier is the
//! composite `{zone:02}{band}{square}` key (e.g. `05VMG`); its grid is the
//! triple CRS + affine geotransform + pixel dimensions that every per-tile
//! output raster is aligned to.
use geo::{Coord, LineString, Polygon, Rect};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Property triplets carrying the MGRS zone, latitude band and grid square,
/// in the order they are tried.
const TILE_KEY_SETS: [[&str; 3]; 2] = [
    ["sentinel:utm_zone", "sentinel:latitude_band", "sentinel:grid_square"],
    ["mgrs:utm_zone", "mgrs:latitude_band", "mgrs:grid_square"],
];

/// Single-property spelling used by newer Sentinel-2 catalogs.
const TILE_KEY_COMBINED: &str = "s2:mgrs_tile";

/// Always `{zone:02}{band}{square}`: two ASCII digits for a zone in
/// `1..=60`, then three uppercase ASCII letters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct TileId(String);

impl TileId {
    /// Derive the tile id from a catalog item's properties. Malformed
    /// zone, band or square values yield `None`.
    pub fn from_properties(properties: &Map<String, Value>) -> Option<Self> {
        for [zone_key, band_key, square_key] in TILE_KEY_SETS {
            let zone = properties.get(zone_key).and_then(value_as_zone);
            let band = properties.get(band_key).and_then(Value::as_str);
            let square = properties.get(square_key).and_then(Value::as_str);
            if let (Some(zone), Some(band), Some(square)) = (zone, band, square) {
                return format!("{zone:02}{band}{square}").parse().ok();
            }
        }
        properties
            .get(TILE_KEY_COMBINED)
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// UTM zone number, latitude band and grid square.
    pub fn parts(&self) -> (&str, &str, &str) {
        (&self.0[..2], &self.0[2..3], &self.0[3..])
    }
}

fn value_as_zone(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|z| u32::try_from(z).ok()),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

impl std::str::FromStr for TileId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().trim_start_matches('T');
        let invalid = || Error::InvalidArgument {
            arg: "tile_id",
            value: s.to_string(),
        };
        if !(4..=5).contains(&s.len()) || !s.is_ascii() {
            return Err(invalid());
        }
        let (zone, letters) = s.split_at(s.len() - 3);
        if !zone.bytes().all(|b| b.is_ascii_digit()) || !letters.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(invalid());
        }
        let zone: u32 = zone.parse().map_err(|_| invalid())?;
        if !(1..=60).contains(&zone) {
            return Err(invalid());
        }
        Ok(TileId(format!("{zone:02}{}", letters.to_ascii_uppercase())))
    }
}

impl TryFrom<String> for TileId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl std::fmt::Display for TileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Affine geotransform in GDAL coefficient order
/// (`[origin_x, pixel_width, rot_x, origin_y, rot_y, pixel_height]`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform(pub [f64; 6]);

impl GeoTransform {
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        GeoTransform([origin_x, pixel_width, 0.0, origin_y, 0.0, -pixel_height.abs()])
    }

    /// Build from the row-major affine used by rasterio and the STAC
    /// projection extension (`[a, b, c, d, e, f]`, optionally followed by the
    /// trailing `0, 0, 1` row).
    pub fn from_affine(coefficients: &[f64]) -> Result<Self> {
        if coefficients.len() != 6 && coefficients.len() != 9 {
            return Err(Error::UnsupportedGrid(format!(
                "affine transform needs 6 or 9 coefficients, got {}",
                coefficients.len()
            )));
        }
        let c = coefficients;
        Ok(GeoTransform([c[2], c[0], c[1], c[5], c[3], c[4]]))
    }

    pub fn origin(&self) -> (f64, f64) {
        (self.0[0], self.0[3])
    }

    pub fn is_rotated(&self) -> bool {
        self.0[2] != 0.0 || self.0[4] != 0.0
    }

    /// Map fractional pixel coordinates to world coordinates.
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        let g = self.0;
        (
            g[0] + col * g[1] + row * g[2],
            g[3] + col * g[4] + row * g[5],
        )
    }
}

/// The grid every output raster of a tile is aligned to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileGrid {
    /// CRS definition understood by GDAL (`EPSG:32605`, WKT, ...)
    pub crs: String,
    pub transform: GeoTransform,
    pub width: usize,
    pub height: usize,
}

impl TileGrid {
    pub fn new(crs: impl Into<String>, transform: GeoTransform, width: usize, height: usize) -> Self {
        TileGrid {
            crs: crs.into(),
            transform,
            width,
            height,
        }
    }

    /// Grid described by STAC projection-extension fields
    /// (`proj:epsg` or `proj:wkt2`, `proj:transform`, `proj:shape`).
    pub fn from_projection(fields: &Map<String, Value>) -> Option<Self> {
        let crs = match fields.get("proj:epsg").and_then(Value::as_u64) {
            Some(code) => format!("EPSG:{code}"),
            None => fields.get("proj:wkt2")?.as_str()?.to_string(),
        };
        let coefficients: Vec<f64> = fields
            .get("proj:transform")?
            .as_array()?
            .iter()
            .map(Value::as_f64)
            .collect::<Option<_>>()?;
        let transform = GeoTransform::from_affine(&coefficients).ok()?;
        let shape = fields.get("proj:shape")?.as_array()?;
        if shape.len() != 2 {
            return None;
        }
        let height = shape[0].as_u64()? as usize;
        let width = shape[1].as_u64()? as usize;
        Some(TileGrid::new(crs, transform, width, height))
    }

    /// Same bounds resampled to a square pixel size of `resolution` CRS units.
    pub fn with_resolution(&self, resolution: f64) -> Result<Self> {
        if self.transform.is_rotated() {
            return Err(Error::UnsupportedGrid("rotated grids cannot be resampled".into()));
        }
        if !(resolution > 0.0) {
            return Err(Error::InvalidArgument {
                arg: "resolution",
                value: resolution.to_string(),
            });
        }
        let bounds = self.bounds();
        let width = (bounds.width() / resolution).round().max(1.0) as usize;
        let height = (bounds.height() / resolution).round().max(1.0) as usize;
        Ok(TileGrid::new(
            self.crs.clone(),
            GeoTransform::north_up(bounds.min().x, bounds.max().y, resolution, resolution),
            width,
            height,
        ))
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    fn corners(&self) -> [(f64, f64); 4] {
        let (w, h) = (self.width as f64, self.height as f64);
        [
            self.transform.apply(0.0, 0.0),
            self.transform.apply(w, 0.0),
            self.transform.apply(w, h),
            self.transform.apply(0.0, h),
        ]
    }

    /// Axis-aligned bounds in the grid CRS.
    pub fn bounds(&self) -> Rect<f64> {
        let corners = self.corners();
        let (mut min_x, mut min_y) = (f64::MAX, f64::MAX);
        let (mut max_x, mut max_y) = (f64::MIN, f64::MIN);
        for (x, y) in corners {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        Rect::new(Coord { x: min_x, y: min_y }, Coord { x: max_x, y: max_y })
    }

    /// Footprint polygon in the grid CRS.
    pub fn footprint(&self) -> Polygon<f64> {
        let mut ring: Vec<(f64, f64)> = self.corners().to_vec();
        ring.push(ring[0]);
        Polygon::new(LineString::from(ring), vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn tile_id_from_sentinel_properties() {
        let p = props(json!({
            "sentinel:utm_zone": 5,
            "sentinel:latitude_band": "V",
            "sentinel:grid_square": "MG"
        }));
        assert_eq!(TileId::from_properties(&p).unwrap().as_str(), "05VMG");
    }

    #[test]
    fn tile_id_from_mgrs_and_combined_properties() {
        let p = props(json!({
            "mgrs:utm_zone": "33",
            "mgrs:latitude_band": "w",
            "mgrs:grid_square": "xp"
        }));
        assert_eq!(TileId::from_properties(&p).unwrap().as_str(), "33WXP");

        let p = props(json!({ "s2:mgrs_tile": "05VMG" }));
        let id = TileId::from_properties(&p).unwrap();
        assert_eq!(id.parts(), ("05", "V", "MG"));
        assert!(TileId::from_properties(&props(json!({ "platform": "x" }))).is_none());
    }

    #[test]
    fn tile_id_parse_rejects_bad_zone() {
        assert_eq!("T5VMG".parse::<TileId>().unwrap().as_str(), "05VMG");
        assert!("99VMG".parse::<TileId>().is_err());
        assert!("VMG".parse::<TileId>().is_err());
        assert!("+5VMG".parse::<TileId>().is_err());
        assert!("05V1G".parse::<TileId>().is_err());
    }

    #[test]
    fn malformed_tile_properties_give_no_tile_id() {
        for (band, square) in [("", ""), ("\u{e9}", "MG"), ("V", "M"), ("VV", "MG")] {
            let p = props(json!({
                "sentinel:utm_zone": 5,
                "sentinel:latitude_band": band,
                "sentinel:grid_square": square
            }));
            assert!(TileId::from_properties(&p).is_none(), "{band:?} {square:?}");
        }
        let p = props(json!({
            "sentinel:utm_zone": 61,
            "sentinel:latitude_band": "V",
            "sentinel:grid_square": "MG"
        }));
        assert!(TileId::from_properties(&p).is_none());
        assert!(serde_json::from_value::<TileId>(json!("05")).is_err());
        assert_eq!(
            serde_json::from_value::<TileId>(json!("05VMG")).unwrap().parts(),
            ("05", "V", "MG")
        );
    }


    #[test]
    fn affine_from_stac_order() {
        let affine = [10.0, 0.0, 399960.0, 0.0, -10.0, 6700020.0];
        let gt = GeoTransform::from_affine(&affine).unwrap();
        assert_eq!(gt.0, [399960.0, 10.0, 0.0, 6700020.0, 0.0, -10.0]);
        assert_eq!(gt.apply(3.5, 7.5), (399995.0, 6699945.0));
        assert!(GeoTransform::from_affine(&affine[..4]).is_err());
    }

    #[test]
    fn grid_from_projection_fields() {
        let fields = props(json!({
            "proj:epsg": 32605,
            "proj:transform": [10.0, 0.0, 399960.0, 0.0, -10.0, 6700020.0, 0.0, 0.0, 1.0],
            "proj:shape": [10980, 10980]
        }));
        let grid = TileGrid::from_projection(&fields).unwrap();
        assert_eq!(grid.crs, "EPSG:32605");
        assert_eq!(grid.shape(), (10980, 10980));
        let bounds = grid.bounds();
        assert_eq!(bounds.min().x, 399960.0);
        assert_eq!(bounds.max().y, 6700020.0);
        assert_eq!(bounds.min().y, 6700020.0 - 109800.0);
    }

    #[test]
    fn resolution_override_keeps_bounds() {
        let grid = TileGrid::new(
            "EPSG:32605",
            GeoTransform::north_up(0.0, 1000.0, 10.0, 10.0),
            100,
            100,
        );
        let coarse = grid.with_resolution(30.0).unwrap();
        assert_eq!((coarse.width, coarse.height), (33, 33));
        assert_eq!(coarse.transform.origin(), (0.0, 1000.0));
        assert!(grid.with_resolution(0.0).is_err());
    }
}
