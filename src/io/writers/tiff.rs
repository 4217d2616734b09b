use gdal::DriverManager;
use gdal::Metadata;
use gdal::raster::{Buffer, ColorInterpretation};
use std::path::Path;
use tracing::info;

use super::super::gdal::GdalError;
use crate::core::processing::Raster;

/// Write a raster as a single-band `Float32` GeoTIFF with its grid, nodata
/// value and the given `(key, value)` metadata items.
pub fn write_geotiff(output: &Path, raster: &Raster, metadata: &[(&str, String)]) -> Result<(), GdalError> {
    let (rows, cols) = raster.data.dim();
    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let mut ds = driver.create_with_band_type::<f32, _>(output, cols, rows, 1)?;
    ds.set_geo_transform(&raster.grid.transform.0)?;
    ds.set_projection(&projection_wkt(&raster.grid.crs)?)?;
    for (key, value) in metadata {
        ds.set_metadata_item(key, value, "")?;
    }

    let mut band = ds.rasterband(1)?;
    band.set_color_interpretation(ColorInterpretation::GrayIndex)?;
    if let Some(nodata) = raster.nodata {
        band.set_no_data_value(Some(nodata as f64))?;
    }
    let data: Vec<f32> = raster.data.iter().copied().collect();
    let mut buf = Buffer::new((cols, rows), data);
    band.write((0, 0), (cols, rows), &mut buf)?;
    info!("Wrote {}x{} GeoTIFF {:?}", cols, rows, output);
    Ok(())
}

fn projection_wkt(crs: &str) -> Result<String, GdalError> {
    if crs.starts_with("EPSG:") {
        Ok(gdal::spatial_ref::SpatialRef::from_definition(crs)?.to_wkt()?)
    } else {
        Ok(crs.to_string())
    }
}
