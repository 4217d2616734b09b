//! Putting sources onto a tile grid through GDAL: `gdalwarp` mosaics and
//! reprojects raster tiles, the GDAL rasterizer burns clipped outlines.
use std::path::{Path, PathBuf};
use std::process::Command;

use gdal::DriverManager;
use gdal::raster::{RasterizeOptions, rasterize};
use gdal::vector::Geometry;
use geo::MultiPolygon;
use tracing::{debug, info};

use super::gdal::{GdalError, read_band, read_grid, read_raster};
use crate::core::geometry::{PointTransform, multipolygon_to_geojson, reproject_multipolygon};
use crate::core::processing::{Raster, clip_to_footprint};
use crate::core::tile::TileGrid;
use crate::error::{Error, Result};
use crate::types::Resampling;

fn resampling_name(resampling: Resampling) -> &'static str {
    match resampling {
        Resampling::Nearest => "near",
        Resampling::Bilinear => "bilinear",
    }
}

/// `gdalwarp` arguments writing `sources` onto `target` as `output`.
///
/// gdalwarp lets later inputs overwrite earlier ones, so the sources are
/// passed in reverse and the first valid pixel wins.
fn warp_args(
    sources: &[PathBuf],
    target: &TileGrid,
    resampling: Resampling,
    nodata: Option<f32>,
    output: &Path,
) -> Result<Vec<String>> {
    if target.transform.is_rotated() {
        return Err(Error::UnsupportedGrid(format!(
            "cannot warp onto rotated grid {:?}",
            target.transform.0
        )));
    }
    let bounds = target.bounds();
    let mut args: Vec<String> = vec![
        "-q".into(),
        "-overwrite".into(),
        "-of".into(),
        "GTiff".into(),
        "-ot".into(),
        "Float32".into(),
        "-t_srs".into(),
        target.crs.clone(),
        "-te".into(),
        bounds.min().x.to_string(),
        bounds.min().y.to_string(),
        bounds.max().x.to_string(),
        bounds.max().y.to_string(),
        "-ts".into(),
        target.width.to_string(),
        target.height.to_string(),
        "-r".into(),
        resampling_name(resampling).into(),
    ];
    if let Some(nodata) = nodata {
        args.push("-dstnodata".into());
        args.push(nodata.to_string());
    }
    args.extend(sources.iter().rev().map(|p| p.display().to_string()));
    args.push(output.display().to_string());
    Ok(args)
}

/// Mosaic the downloaded source rasters onto `target`. A single source that
/// already sits on the target grid is returned as read.
pub fn align_mosaic(
    sources: &[PathBuf],
    target: &TileGrid,
    resampling: Resampling,
    nodata: Option<f32>,
    scratch: &Path,
) -> Result<Raster> {
    if let [source] = sources {
        if read_grid(&source.display().to_string())? == *target {
            debug!("{:?} is already on the tile grid", source);
            let mut raster = read_raster(source)?;
            raster.nodata = raster.nodata.or(nodata);
            return Ok(raster);
        }
    }

    let output = scratch.join("gdalwarp-mosaic.tif");
    let args = warp_args(sources, target, resampling, nodata, &output)?;
    debug!("gdalwarp {}", args.join(" "));
    let status = Command::new("gdalwarp")
        .args(&args)
        .status()
        .map_err(|e| Error::External(format!("gdalwarp exec error: {e}")))?;
    if !status.success() {
        return Err(Error::External(format!("gdalwarp failed ({status})")));
    }

    let warped = read_raster(&output)?;
    let raster = Raster::new(warped.data, target.clone(), warped.nodata.or(nodata))?;
    info!(
        "Aligned {} source raster(s) to {}x{} tile grid",
        sources.len(),
        target.width,
        target.height
    );
    Ok(raster)
}

/// Burn `geometry` (in the target CRS) onto `target` at pixel centres.
pub fn rasterize_polygons(
    geometry: &MultiPolygon<f64>,
    target: &TileGrid,
    foreground: f32,
    background: f32,
) -> std::result::Result<Raster, GdalError> {
    let driver = DriverManager::get_driver_by_name("MEM")?;
    let mut dataset = driver.create_with_band_type::<f32, _>("", target.width, target.height, 1)?;
    dataset.set_geo_transform(&target.transform.0)?;
    dataset.rasterband(1)?.fill(background as f64, None)?;
    if !geometry.0.is_empty() {
        let burn = Geometry::from_geojson(&multipolygon_to_geojson(geometry).to_string())?;
        rasterize(
            &mut dataset,
            &[1],
            &[burn],
            &[foreground as f64],
            Some(RasterizeOptions::default()),
        )?;
    }
    let data = read_band(&dataset, target)?;
    Ok(Raster {
        data,
        grid: target.clone(),
        nodata: None,
    })
}

/// Clip every geometry to `footprint`, union the pieces, bring them into the
/// target CRS with `to_target` and rasterize onto `target`.
///
/// `footprint` and `geometries` share the source CRS.
pub fn build_mask(
    geometries: &[MultiPolygon<f64>],
    footprint: &geo::Polygon<f64>,
    target: &TileGrid,
    to_target: &dyn PointTransform,
    foreground: f32,
    background: f32,
) -> Result<Raster> {
    let retained = clip_to_footprint(geometries, footprint);
    let projected = reproject_multipolygon(&retained, to_target)?;
    Ok(rasterize_polygons(&projected, target, foreground, background)?)
}
