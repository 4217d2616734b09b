//! Tile-to-source resolution against a spatial index.
//!
//! A spatial index is a table of polygons, each carrying an opaque
//! descriptor: the URL of a raster/vector file covering that polygon, or a
//! classification code. Resolving a tile reprojects its footprint into the
//! index CRS and selects every row with a non-empty intersection.
use geo::{BoundingRect, Intersects, MultiPolygon, Polygon, Rect};
use serde_json::{Map, Value};
use tracing::debug;

use crate::core::geometry::{PointTransform, densify, multipolygon_from_geojson, reproject_polygon};
use crate::core::tile::{TileGrid, TileId};
use crate::error::{Error, Result};
use crate::types::MatchPolicy;

/// Vertices inserted per footprint edge before reprojection.
const DENSIFY_POINTS: usize = 21;

pub const WGS84: &str = "EPSG:4326";

#[derive(Debug, Clone)]
pub struct IndexRow {
    pub geometry: MultiPolygon<f64>,
    /// File URL or classification code
    pub descriptor: String,
    /// Remaining attribute columns
    pub attributes: Map<String, Value>,
    bbox: Option<Rect<f64>>,
}

impl IndexRow {
    pub fn new(geometry: MultiPolygon<f64>, descriptor: impl Into<String>) -> Self {
        let bbox = geometry.bounding_rect();
        IndexRow {
            geometry,
            descriptor: descriptor.into(),
            attributes: Map::new(),
            bbox,
        }
    }

    pub fn with_attributes(mut self, attributes: Map<String, Value>) -> Self {
        self.attributes = attributes;
        self
    }

    fn intersects(&self, footprint: &Polygon<f64>, footprint_bbox: &Rect<f64>) -> bool {
        match self.bbox {
            Some(bbox) if bbox.intersects(footprint_bbox) => self.geometry.intersects(footprint),
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpatialIndex {
    /// Label used in log and error messages
    pub name: String,
    pub crs: String,
    pub rows: Vec<IndexRow>,
}

/// Rows matched by a tile, together with the footprint used for the lookup.
#[derive(Debug)]
pub struct Resolution<'a> {
    /// Tile footprint in the index CRS
    pub footprint: Polygon<f64>,
    pub rows: Vec<&'a IndexRow>,
}

impl Resolution<'_> {
    pub fn descriptors(&self) -> Vec<String> {
        self.rows.iter().map(|r| r.descriptor.clone()).collect()
    }
}

impl SpatialIndex {
    pub fn new(name: impl Into<String>, crs: impl Into<String>, rows: Vec<IndexRow>) -> Self {
        SpatialIndex {
            name: name.into(),
            crs: crs.into(),
            rows,
        }
    }

    /// Build an index from a GeoJSON FeatureCollection. The descriptor is read
    /// from the `descriptor_field` property; the CRS defaults to WGS84 unless
    /// the legacy `crs` member names another one.
    pub fn from_geojson(name: impl Into<String>, collection: &Value, descriptor_field: &str) -> Result<Self> {
        let name = name.into();
        let features = collection
            .get("features")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::Geometry(format!("`{name}` is not a FeatureCollection")))?;

        let mut rows = Vec::with_capacity(features.len());
        for feature in features {
            let Some(geometry) = feature.get("geometry").filter(|g| !g.is_null()) else {
                continue;
            };
            let geometry = multipolygon_from_geojson(geometry)?;
            let mut attributes = feature
                .get("properties")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            let descriptor = attributes
                .remove(descriptor_field)
                .and_then(|v| descriptor_to_string(&v))
                .ok_or_else(|| Error::MissingProperty {
                    item: name.clone(),
                    key: descriptor_field.to_string(),
                })?;
            rows.push(IndexRow::new(geometry, descriptor).with_attributes(attributes));
        }

        let crs = collection
            .pointer("/crs/properties/name")
            .and_then(Value::as_str)
            .map(normalize_crs_name)
            .unwrap_or_else(|| WGS84.to_string());
        debug!("Loaded spatial index `{}` with {} rows ({})", name, rows.len(), crs);
        Ok(SpatialIndex::new(name, crs, rows))
    }

    /// Rows whose geometry intersects `footprint` (given in the index CRS).
    pub fn query(&self, footprint: &Polygon<f64>) -> Vec<&IndexRow> {
        let Some(footprint_bbox) = footprint.bounding_rect() else {
            return Vec::new();
        };
        self.rows
            .iter()
            .filter(|row| row.intersects(footprint, &footprint_bbox))
            .collect()
    }

    /// Reproject the tile footprint into the index CRS and query it.
    pub fn query_grid(&self, grid: &TileGrid, to_index: &dyn PointTransform) -> Result<Resolution<'_>> {
        let footprint = reproject_polygon(&densify(&grid.footprint(), DENSIFY_POINTS), to_index)?;
        let rows = self.query(&footprint);
        Ok(Resolution { footprint, rows })
    }

    /// Query and enforce the match policy.
    pub fn resolve(
        &self,
        tile: &TileId,
        grid: &TileGrid,
        to_index: &dyn PointTransform,
        policy: MatchPolicy,
    ) -> Result<Resolution<'_>> {
        let resolution = self.query_grid(grid, to_index)?;
        debug!(
            "Tile {} intersects {} row(s) of `{}`",
            tile,
            resolution.rows.len(),
            self.name
        );
        check_policy(tile, &self.name, &resolution.rows, policy)?;
        Ok(resolution)
    }
}

fn check_policy(tile: &TileId, index: &str, rows: &[&IndexRow], policy: MatchPolicy) -> Result<()> {
    match (policy, rows.len()) {
        (MatchPolicy::Any, _) => Ok(()),
        (_, 0) => Err(Error::NoMatch {
            tile: tile.to_string(),
            index: index.to_string(),
        }),
        (MatchPolicy::ExactlyOne, n) if n > 1 => Err(Error::AmbiguousMatch {
            tile: tile.to_string(),
            index: index.to_string(),
            count: n,
            descriptors: rows.iter().map(|r| r.descriptor.clone()).collect(),
        }),
        _ => Ok(()),
    }
}

fn descriptor_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `urn:ogc:def:crs:EPSG::32605` -> `EPSG:32605`; CRS84 -> WGS84.
fn normalize_crs_name(name: &str) -> String {
    if name.ends_with("CRS84") {
        return WGS84.to_string();
    }
    match name.rsplit_once("EPSG::") {
        Some((_, code)) => format!("EPSG:{code}"),
        None => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::Identity;
    use crate::core::geometry::tests::Shift;
    use crate::core::tile::GeoTransform;
    use geo::LineString;
    use serde_json::json;

    fn square(x0: f64, y0: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![Polygon::new(
            LineString::from(vec![
                (x0, y0),
                (x0 + size, y0),
                (x0 + size, y0 + size),
                (x0, y0 + size),
                (x0, y0),
            ]),
            vec![],
        )])
    }

    fn grid(x0: f64, y0: f64, size: f64) -> TileGrid {
        TileGrid::new(
            "EPSG:32605",
            GeoTransform::north_up(x0, y0 + size, size / 10.0, size / 10.0),
            10,
            10,
        )
    }

    fn index() -> SpatialIndex {
        SpatialIndex::new(
            "test",
            "EPSG:32605",
            vec![
                IndexRow::new(square(0.0, 0.0, 100.0), "a.tif"),
                IndexRow::new(square(100.0, 0.0, 100.0), "b.tif"),
                IndexRow::new(square(500.0, 500.0, 100.0), "c.tif"),
            ],
        )
    }

    fn tile() -> TileId {
        "05VMG".parse().unwrap()
    }

    #[test]
    fn selects_exactly_the_intersecting_rows() {
        let idx = index();
        let inside = idx.query_grid(&grid(10.0, 10.0, 50.0), &Identity).unwrap();
        assert_eq!(inside.descriptors(), vec!["a.tif"]);

        let straddling = idx.query_grid(&grid(80.0, 10.0, 50.0), &Identity).unwrap();
        assert_eq!(straddling.descriptors(), vec!["a.tif", "b.tif"]);

        let nowhere = idx.query_grid(&grid(300.0, 300.0, 50.0), &Identity).unwrap();
        assert!(nowhere.rows.is_empty());
    }

    #[test]
    fn footprint_is_reprojected_before_lookup() {
        let idx = index();
        // In tile coordinates the grid sits on "a", but the index CRS is offset.
        let res = idx.query_grid(&grid(10.0, 10.0, 50.0), &Shift(500.0, 500.0)).unwrap();
        assert_eq!(res.descriptors(), vec!["c.tif"]);
    }

    #[test]
    fn one_to_one_policy_distinguishes_empty_and_ambiguous() {
        let idx = index();
        let one = idx
            .resolve(&tile(), &grid(10.0, 10.0, 50.0), &Identity, MatchPolicy::ExactlyOne)
            .unwrap();
        assert_eq!(one.descriptors(), vec!["a.tif"]);

        let err = idx
            .resolve(&tile(), &grid(80.0, 10.0, 50.0), &Identity, MatchPolicy::ExactlyOne)
            .unwrap_err();
        assert!(matches!(err, Error::AmbiguousMatch { count: 2, .. }));

        let err = idx
            .resolve(&tile(), &grid(300.0, 300.0, 50.0), &Identity, MatchPolicy::ExactlyOne)
            .unwrap_err();
        assert!(matches!(err, Error::NoMatch { .. }));
    }

    #[test]
    fn mosaic_and_any_policies() {
        let idx = index();
        let many = idx
            .resolve(&tile(), &grid(80.0, 10.0, 50.0), &Identity, MatchPolicy::AtLeastOne)
            .unwrap();
        assert_eq!(many.rows.len(), 2);
        assert!(
            idx.resolve(&tile(), &grid(300.0, 300.0, 50.0), &Identity, MatchPolicy::AtLeastOne)
                .is_err()
        );
        let empty = idx
            .resolve(&tile(), &grid(300.0, 300.0, 50.0), &Identity, MatchPolicy::Any)
            .unwrap();
        assert!(empty.rows.is_empty());
    }

    #[test]
    fn geojson_index_reads_descriptors_and_crs() {
        let collection = json!({
            "type": "FeatureCollection",
            "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::32605" } },
            "features": [
                {
                    "type": "Feature",
                    "properties": { "RGI_CODE": 1, "name": "Alaska" },
                    "geometry": { "type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 0]]] }
                },
                { "type": "Feature", "properties": { "RGI_CODE": 2 }, "geometry": null }
            ]
        });
        let idx = SpatialIndex::from_geojson("regions", &collection, "RGI_CODE").unwrap();
        assert_eq!(idx.crs, "EPSG:32605");
        assert_eq!(idx.rows.len(), 1);
        assert_eq!(idx.rows[0].descriptor, "1");
        assert_eq!(idx.rows[0].attributes["name"], "Alaska");

        let missing = SpatialIndex::from_geojson("regions", &collection, "url");
        assert!(matches!(missing, Err(Error::MissingProperty { .. })));
    }
}
