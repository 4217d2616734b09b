use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};
use gdal::vector::{FieldValue, LayerAccess};
use gdal::{Dataset, errors::GdalError as GdalCrateError};
use ndarray::Array2;
use serde_json::{Map, Value, json};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::core::geometry::{Identity, PointTransform};
use crate::core::processing::Raster;
use crate::core::resolver::{SpatialIndex, WGS84};
use crate::core::tile::{GeoTransform, TileGrid};

/// Errors encountered when using GDAL readers and transforms
#[derive(Debug, Error)]
pub enum GdalError {
    #[error("GDAL error: {0}")]
    Gdal(#[from] GdalCrateError),
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("Dimension mismatch: expected {0}x{1}, got {2} values")]
    DimensionMismatch(usize, usize, usize),
    #[error("Invalid geometry JSON: {0}")]
    GeometryJson(#[from] serde_json::Error),
}

// Helper to extract EPSG code from WKT authority tag
fn parse_epsg(wkt: &str) -> Option<String> {
    const KEY: &str = "AUTHORITY[\"EPSG\",\"";
    const KEY_WKT2: &str = "ID[\"EPSG\",";
    if let Some(idx) = wkt.rfind(KEY) {
        let start = idx + KEY.len();
        if let Some(end) = wkt[start..].find('"') {
            return Some(format!("EPSG:{}", &wkt[start..start + end]));
        }
    }
    if let Some(idx) = wkt.rfind(KEY_WKT2) {
        let start = idx + KEY_WKT2.len();
        if let Some(end) = wkt[start..].find(']') {
            return Some(format!("EPSG:{}", wkt[start..start + end].trim()));
        }
    }
    None
}

/// `EPSG:xxxx` when the WKT names an authority code, the WKT otherwise.
fn crs_name(wkt: String) -> String {
    if wkt.starts_with("EPSG:") {
        wkt
    } else {
        parse_epsg(&wkt).unwrap_or(wkt)
    }
}

/// GDAL path for an href: remote files go through `/vsicurl/`, `file://`
/// URLs become plain paths.
pub fn gdal_path(href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        format!("/vsicurl/{href}")
    } else {
        href.strip_prefix("file://").unwrap_or(href).to_string()
    }
}

/// Grid (CRS, geotransform, size) of an opened raster dataset.
pub fn grid_from_dataset(dataset: &Dataset) -> Result<TileGrid, GdalError> {
    let (width, height) = dataset.raster_size();
    let transform = dataset.geo_transform()?;
    let projection = dataset.projection();
    if projection.is_empty() {
        return Err(GdalError::UnsupportedFormat("raster carries no projection".into()));
    }
    Ok(TileGrid::new(
        crs_name(projection),
        GeoTransform(transform),
        width,
        height,
    ))
}

/// Read the grid of a raster without reading its pixels.
pub fn read_grid(href: &str) -> Result<TileGrid, GdalError> {
    let dataset = Dataset::open(gdal_path(href))?;
    grid_from_dataset(&dataset)
}

/// Band 1 of `dataset` as `f32`, shaped by `grid`.
pub fn read_band(dataset: &Dataset, grid: &TileGrid) -> Result<Array2<f32>, GdalError> {
    let band = dataset.rasterband(1)?;
    let window = (grid.width, grid.height);
    let buf = band.read_as::<f32>((0, 0), window, window, None)?;
    let data_vec = buf.data().to_vec();
    let len = data_vec.len();
    Array2::from_shape_vec(grid.shape(), data_vec)
        .map_err(|_| GdalError::DimensionMismatch(grid.width, grid.height, len))
}

/// Read band 1 of a raster as `f32`, with its grid and nodata value.
pub fn read_raster<P: AsRef<Path>>(path: P) -> Result<Raster, GdalError> {
    let dataset = Dataset::open(path.as_ref())?;
    if dataset.raster_count() == 0 {
        return Err(GdalError::UnsupportedFormat("No raster bands found".into()));
    }
    let grid = grid_from_dataset(&dataset)?;
    let nodata = dataset.rasterband(1)?.no_data_value().map(|v| v as f32);
    let data = read_band(&dataset, &grid)?;
    debug!(
        "Read {:?}: {}x{} ({}), nodata {:?}",
        path.as_ref(),
        grid.width,
        grid.height,
        grid.crs,
        nodata
    );
    Raster::new(data, grid, nodata).map_err(|e| GdalError::UnsupportedFormat(e.to_string()))
}

fn field_to_json(value: FieldValue) -> Value {
    match value {
        FieldValue::IntegerValue(v) => json!(v),
        FieldValue::Integer64Value(v) => json!(v),
        FieldValue::RealValue(v) => json!(v),
        FieldValue::StringValue(v) => json!(v),
        other => other.into_string().map(Value::String).unwrap_or(Value::Null),
    }
}

/// Read the first layer of any vector file GDAL understands (shapefile,
/// GeoPackage, GeoJSON, ...) into a spatial index keyed on
/// `descriptor_field`. Without a descriptor field each row is labelled by its
/// feature id.
pub fn read_vector<P: AsRef<Path>>(
    path: P,
    descriptor_field: Option<&str>,
) -> Result<SpatialIndex, crate::error::Error> {
    let path = path.as_ref();
    let dataset = Dataset::open(path).map_err(GdalError::from)?;
    let mut layer = dataset.layer(0).map_err(GdalError::from)?;
    let crs = match layer.spatial_ref() {
        Some(srs) => match srs.auth_code() {
            Ok(code) => format!("EPSG:{code}"),
            Err(_) => srs.to_wkt().map_err(GdalError::from)?,
        },
        None => WGS84.to_string(),
    };

    const FID: &str = "__fid";
    let mut features = Vec::new();
    for feature in layer.features() {
        let Some(geometry) = feature.geometry() else {
            continue;
        };
        let geometry: Value = serde_json::from_str(&geometry.json().map_err(GdalError::from)?)
            .map_err(GdalError::from)?;
        let mut properties = Map::new();
        for (name, value) in feature.fields() {
            properties.insert(name, value.map(field_to_json).unwrap_or(Value::Null));
        }
        properties.insert(FID.to_string(), json!(feature.fid().unwrap_or_default()));
        features.push(json!({
            "type": "Feature",
            "geometry": geometry,
            "properties": properties,
        }));
    }
    let collection = json!({ "type": "FeatureCollection", "features": features });
    let name = path.display().to_string();
    let mut index = SpatialIndex::from_geojson(name, &collection, descriptor_field.unwrap_or(FID))?;
    index.crs = crs;
    Ok(index)
}

fn spatial_ref(definition: &str) -> Result<SpatialRef, GdalError> {
    let mut srs = SpatialRef::from_definition(definition)?;
    srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
    Ok(srs)
}

/// Coordinate transformation between two CRS definitions, x = easting or
/// longitude in both.
pub struct GdalTransform {
    transform: CoordTransform,
}

impl GdalTransform {
    pub fn new(from: &str, to: &str) -> Result<Self, GdalError> {
        let source = spatial_ref(from)?;
        let target = spatial_ref(to)?;
        Ok(GdalTransform {
            transform: CoordTransform::new(&source, &target)?,
        })
    }
}

impl PointTransform for GdalTransform {
    fn transform_coords(&self, xs: &mut [f64], ys: &mut [f64]) -> crate::error::Result<()> {
        let mut z = vec![0.0; xs.len()];
        self.transform
            .transform_coords(xs, ys, &mut z)
            .map_err(GdalError::from)?;
        Ok(())
    }
}

/// Transform from `from` to `to`; the identity when both name the same CRS.
pub fn transformer(from: &str, to: &str) -> Result<Box<dyn PointTransform>, GdalError> {
    if from == to {
        Ok(Box::new(Identity))
    } else {
        Ok(Box::new(GdalTransform::new(from, to)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epsg_from_wkt1_and_wkt2() {
        let wkt1 = r#"PROJCS["WGS 84 / UTM zone 5N",GEOGCS["WGS 84",AUTHORITY["EPSG","4326"]],AUTHORITY["EPSG","32605"]]"#;
        assert_eq!(parse_epsg(wkt1).as_deref(), Some("EPSG:32605"));
        let wkt2 = r#"PROJCRS["WGS 84 / UTM zone 5N",ID["EPSG",32605]]"#;
        assert_eq!(parse_epsg(wkt2).as_deref(), Some("EPSG:32605"));
        assert_eq!(crs_name("LOCAL_CS[\"x\"]".into()), "LOCAL_CS[\"x\"]");
    }

    #[test]
    fn remote_hrefs_use_vsicurl() {
        assert_eq!(gdal_path("https://h/dem.tif"), "/vsicurl/https://h/dem.tif");
        assert_eq!(gdal_path("file:///data/dem.tif"), "/data/dem.tif");
        assert_eq!(gdal_path("dem.tif"), "dem.tif");
    }

    #[test]
    fn same_crs_gives_identity() {
        let t = transformer("EPSG:32605", "EPSG:32605").unwrap();
        let (mut xs, mut ys) = (vec![1.0, 2.0], vec![3.0, 4.0]);
        t.transform_coords(&mut xs, &mut ys).unwrap();
        assert_eq!((xs, ys), (vec![1.0, 2.0], vec![3.0, 4.0]));
    }
}
