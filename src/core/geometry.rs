//! Geometry helpers: GeoJSON conversion, edge densification and reprojection
//! of polygons through a `PointTransform`.
use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde_json::{Value, json};

use crate::error::{Error, Result};

/// Batch coordinate transformation between two CRSs.
///
/// Implemented by GDAL's `CoordTransform` wrapper in `io::gdal` and by
/// `Identity` when source and target CRS are the same.
pub trait PointTransform {
    /// Transform coordinates in place (x = easting/longitude).
    fn transform_coords(&self, xs: &mut [f64], ys: &mut [f64]) -> Result<()>;
}

/// No-op transform for equal CRSs.
pub struct Identity;

impl PointTransform for Identity {
    fn transform_coords(&self, _xs: &mut [f64], _ys: &mut [f64]) -> Result<()> {
        Ok(())
    }
}

impl<T: PointTransform + ?Sized> PointTransform for Box<T> {
    fn transform_coords(&self, xs: &mut [f64], ys: &mut [f64]) -> Result<()> {
        (**self).transform_coords(xs, ys)
    }
}

const NON_POLYGONAL: [&str; 4] = ["Point", "MultiPoint", "LineString", "MultiLineString"];

/// Parse the polygonal part of a GeoJSON geometry object.
///
/// Points and lines carry no area and are rejected; geometry collections
/// contribute all of their polygonal members.
pub fn multipolygon_from_geojson(value: &Value) -> Result<MultiPolygon<f64>> {
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Geometry("geometry without `type`".into()))?;
    match kind {
        "Polygon" => Ok(MultiPolygon::new(vec![parse_polygon(coordinates(value)?)?])),
        "MultiPolygon" => {
            let polygons = coordinates(value)?
                .as_array()
                .ok_or_else(|| Error::Geometry("MultiPolygon coordinates are not an array".into()))?
                .iter()
                .map(parse_polygon)
                .collect::<Result<Vec<_>>>()?;
            Ok(MultiPolygon::new(polygons))
        }
        "GeometryCollection" => {
            let mut polygons = Vec::new();
            let members = value
                .get("geometries")
                .and_then(Value::as_array)
                .ok_or_else(|| Error::Geometry("GeometryCollection without `geometries`".into()))?;
            for member in members {
                let member_kind = member.get("type").and_then(Value::as_str);
                if member_kind.is_some_and(|k| NON_POLYGONAL.contains(&k)) {
                    continue;
                }
                polygons.extend(multipolygon_from_geojson(member)?.0);
            }
            Ok(MultiPolygon::new(polygons))
        }
        other => Err(Error::Geometry(format!("unsupported geometry type `{other}`"))),
    }
}

fn coordinates(value: &Value) -> Result<&Value> {
    value
        .get("coordinates")
        .ok_or_else(|| Error::Geometry("geometry without `coordinates`".into()))
}

fn parse_polygon(value: &Value) -> Result<Polygon<f64>> {
    let rings = value
        .as_array()
        .ok_or_else(|| Error::Geometry("polygon rings are not an array".into()))?;
    let mut rings = rings.iter().map(parse_ring);
    let exterior = rings
        .next()
        .ok_or_else(|| Error::Geometry("polygon without exterior ring".into()))??;
    let interiors = rings.collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn parse_ring(value: &Value) -> Result<LineString<f64>> {
    let positions = value
        .as_array()
        .ok_or_else(|| Error::Geometry("ring is not an array".into()))?;
    let coords = positions
        .iter()
        .map(|p| {
            let x = p.get(0).and_then(Value::as_f64);
            let y = p.get(1).and_then(Value::as_f64);
            match (x, y) {
                (Some(x), Some(y)) => Ok(Coord { x, y }),
                _ => Err(Error::Geometry(format!("invalid position {p}"))),
            }
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(LineString::new(coords))
}

fn ring_to_geojson(ring: &LineString<f64>) -> Value {
    Value::Array(ring.coords().map(|c| json!([c.x, c.y])).collect())
}

fn polygon_rings(polygon: &Polygon<f64>) -> Value {
    let mut rings = vec![ring_to_geojson(polygon.exterior())];
    rings.extend(polygon.interiors().iter().map(ring_to_geojson));
    Value::Array(rings)
}

/// GeoJSON geometry object for a (multi)polygon; single-member multipolygons
/// are written as `Polygon`.
pub fn multipolygon_to_geojson(mp: &MultiPolygon<f64>) -> Value {
    if mp.0.len() == 1 {
        json!({ "type": "Polygon", "coordinates": polygon_rings(&mp.0[0]) })
    } else {
        json!({
            "type": "MultiPolygon",
            "coordinates": mp.0.iter().map(polygon_rings).collect::<Vec<_>>()
        })
    }
}

/// Insert `points_per_edge - 1` evenly spaced vertices into every edge so that
/// curved images of straight edges survive reprojection.
pub fn densify(polygon: &Polygon<f64>, points_per_edge: usize) -> Polygon<f64> {
    let densify_ring = |ring: &LineString<f64>| {
        let steps = points_per_edge.max(1);
        let mut coords = Vec::with_capacity(ring.0.len() * steps);
        for line in ring.lines() {
            for i in 0..steps {
                let t = i as f64 / steps as f64;
                coords.push(Coord {
                    x: line.start.x + (line.end.x - line.start.x) * t,
                    y: line.start.y + (line.end.y - line.start.y) * t,
                });
            }
        }
        if let Some(last) = ring.0.last() {
            coords.push(*last);
        }
        LineString::new(coords)
    };
    Polygon::new(
        densify_ring(polygon.exterior()),
        polygon.interiors().iter().map(densify_ring).collect(),
    )
}

fn reproject_ring(ring: &LineString<f64>, transform: &dyn PointTransform) -> Result<LineString<f64>> {
    let mut xs: Vec<f64> = ring.0.iter().map(|c| c.x).collect();
    let mut ys: Vec<f64> = ring.0.iter().map(|c| c.y).collect();
    transform.transform_coords(&mut xs, &mut ys)?;
    if xs.iter().chain(ys.iter()).any(|v| !v.is_finite()) {
        return Err(Error::Geometry(
            "reprojection produced non-finite coordinates".into(),
        ));
    }
    Ok(LineString::new(
        xs.into_iter().zip(ys).map(|(x, y)| Coord { x, y }).collect(),
    ))
}

pub fn reproject_polygon(polygon: &Polygon<f64>, transform: &dyn PointTransform) -> Result<Polygon<f64>> {
    let exterior = reproject_ring(polygon.exterior(), transform)?;
    let interiors = polygon
        .interiors()
        .iter()
        .map(|ring| reproject_ring(ring, transform))
        .collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}

pub fn reproject_multipolygon(
    mp: &MultiPolygon<f64>,
    transform: &dyn PointTransform,
) -> Result<MultiPolygon<f64>> {
    Ok(MultiPolygon::new(
        mp.0.iter()
            .map(|p| reproject_polygon(p, transform))
            .collect::<Result<Vec<_>>>()?,
    ))
}
