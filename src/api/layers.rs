//! Auxiliary layers (elevation model, coastline and glacier masks) retiled
//! onto the imagery tiles.
//!
//! For every tile of a scene catalog the layer's spatial index is queried
//! with the tile footprint, the matched sources are fetched into a scratch
//! directory, mosaicked or rasterized onto the tile grid, and the result is
//! published under the layer's output href. Tiles are processed one at a
//! time and the first failure aborts the loop.
use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, info};

use crate::core::geometry::{densify, reproject_polygon};
use crate::core::params::LayerParams;
use crate::core::processing::Raster;
use crate::core::resolver::{IndexRow, SpatialIndex};
use crate::core::tile::{TileGrid, TileId};
use crate::error::{Error, Result};
use crate::io::stac::{CatalogNode, Item};
use crate::io::store::ObjectStore;
use crate::io::warp::{align_mosaic, build_mask};
use crate::io::writers::tiff::write_geotiff;
use crate::io::{archive, gdal, href};
use crate::types::{LayerKind, MaskSource};

const FOOTPRINT_DENSIFY_POINTS: usize = 21;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct LayerReport {
    pub processed: usize,
    /// Outputs already present and left alone
    pub skipped: usize,
}

/// Unique tile ids of a catalog, each with the first item found on it.
pub fn enumerate_tiles(root: &CatalogNode) -> Result<BTreeMap<TileId, &Item>> {
    let mut tiles = BTreeMap::new();
    for item in root.all_items() {
        tiles.entry(item.tile_id()?).or_insert(item);
    }
    info!("Catalog {} covers {} tile(s)", root.id(), tiles.len());
    Ok(tiles)
}

/// Grid of the item's reference asset: projection-extension fields when the
/// item carries them, otherwise the raster header read through GDAL.
pub fn tile_grid_for_item(item: &Item, reference_asset: &str, resolution: Option<f64>) -> Result<TileGrid> {
    let grid = match item.projection_grid(reference_asset) {
        Some(grid) => grid,
        None => {
            let asset_href = item.asset_href(reference_asset)?;
            debug!("No projection fields on {}, reading {}", item.id, asset_href);
            gdal::read_grid(&asset_href)?
        }
    };
    match resolution {
        Some(resolution) => grid.with_resolution(resolution),
        None => Ok(grid),
    }
}

/// Load the layer's spatial index. GeoJSON is parsed directly, other vector
/// formats are fetched into `scratch` and read through GDAL.
pub fn load_index(store: &dyn ObjectStore, layer: &LayerParams, scratch: &Path) -> Result<SpatialIndex> {
    let name = href::file_name(&layer.index_url).to_ascii_lowercase();
    if name.ends_with(".geojson") || name.ends_with(".json") {
        let collection: serde_json::Value = serde_json::from_str(&store.read_to_string(&layer.index_url)?)?;
        SpatialIndex::from_geojson(&layer.name, &collection, &layer.descriptor_field)
    } else {
        let path = store.get_file(&layer.index_url, scratch)?;
        let mut index = gdal::read_vector(&path, Some(&layer.descriptor_field))?;
        index.name = layer.name.clone();
        Ok(index)
    }
}

fn background(layer: &LayerParams, grid: &TileGrid) -> Raster {
    match layer.kind {
        LayerKind::Mosaic => {
            let fill = layer.nodata.unwrap_or(0.0);
            Raster::filled(grid.clone(), fill, Some(fill))
        }
        LayerKind::Mask => Raster::filled(grid.clone(), layer.background, None),
    }
}

/// Build one tile of a layer. Sources are downloaded into `scratch`.
pub fn prepare_tile(
    store: &dyn ObjectStore,
    layer: &LayerParams,
    index: &SpatialIndex,
    tile: &TileId,
    grid: &TileGrid,
    scratch: &Path,
) -> Result<Raster> {
    let to_index = gdal::transformer(&grid.crs, &index.crs)?;
    let resolution = index.resolve(tile, grid, to_index.as_ref(), layer.match_policy())?;
    if resolution.rows.is_empty() {
        info!("Tile {} has no {} source, writing background", tile, layer.name);
        return Ok(background(layer, grid));
    }

    match (layer.kind, layer.mask_source) {
        (LayerKind::Mosaic, _) => {
            let mut sources = Vec::with_capacity(resolution.rows.len());
            for row in &resolution.rows {
                let source_href = layer.source_href(&row.descriptor);
                info!("Fetching {}", source_href);
                sources.push(store.get_file(&source_href, scratch)?);
            }
            align_mosaic(&sources, grid, layer.resampling, layer.nodata, scratch)
        }
        (LayerKind::Mask, MaskSource::Index) => {
            let geometries: Vec<_> = resolution
                .rows
                .iter()
                .filter(|row| keep_row(layer, row))
                .map(|row| row.geometry.clone())
                .collect();
            let to_target = gdal::transformer(&index.crs, &grid.crs)?;
            build_mask(
                &geometries,
                &resolution.footprint,
                grid,
                to_target.as_ref(),
                layer.foreground,
                layer.background,
            )
        }
        (LayerKind::Mask, MaskSource::Archive) => {
            let mut geometries = Vec::new();
            let mut vector_crs: Option<String> = None;
            for (n, row) in resolution.rows.iter().enumerate() {
                let archive_href = layer.source_href(&row.descriptor);
                info!("Fetching {}", archive_href);
                let path = store.get_file(&archive_href, scratch)?;
                let vector_path = archive::extract_vector(&path, &scratch.join(format!("archive-{n}")))?;
                let vector = gdal::read_vector(&vector_path, None)?;
                if let Some(crs) = &vector_crs {
                    if *crs != vector.crs {
                        return Err(Error::CrsMismatch {
                            expected: crs.clone(),
                            found: vector.crs,
                        });
                    }
                } else {
                    vector_crs = Some(vector.crs.clone());
                }
                geometries.extend(vector.rows.into_iter().map(|r| r.geometry));
            }
            let Some(vector_crs) = vector_crs else {
                return Ok(background(layer, grid));
            };
            let to_vector = gdal::transformer(&grid.crs, &vector_crs)?;
            let footprint = reproject_polygon(
                &densify(&grid.footprint(), FOOTPRINT_DENSIFY_POINTS),
                to_vector.as_ref(),
            )?;
            let to_target = gdal::transformer(&vector_crs, &grid.crs)?;
            build_mask(
                &geometries,
                &footprint,
                grid,
                to_target.as_ref(),
                layer.foreground,
                layer.background,
            )
        }
    }
}

fn keep_row(layer: &LayerParams, row: &IndexRow) -> bool {
    layer
        .codes
        .as_ref()
        .is_none_or(|codes| codes.iter().any(|c| *c == row.descriptor))
}

/// Build and publish the layer for every tile of `catalog`.
pub fn prepare_layer(
    store: &dyn ObjectStore,
    layer: &LayerParams,
    catalog: &CatalogNode,
    skip_existing: bool,
) -> Result<LayerReport> {
    let tiles = enumerate_tiles(catalog)?;
    let index_dir = tempfile::tempdir()?;
    let index = load_index(store, layer, index_dir.path())?;
    info!(
        "Preparing layer {} ({}) for {} tile(s) from {} index rows",
        layer.name,
        layer.kind,
        tiles.len(),
        index.rows.len()
    );

    let mut report = LayerReport::default();
    for (tile, item) in &tiles {
        let output = layer.output_href(tile.as_str());
        if skip_existing && store.exists(&output)? {
            debug!("{} exists, skipping tile {}", output, tile);
            report.skipped += 1;
            continue;
        }
        let grid = tile_grid_for_item(item, &layer.reference_asset, layer.resolution)?;
        let scratch = tempfile::tempdir()?;
        let raster = prepare_tile(store, layer, &index, tile, &grid, scratch.path())?;

        let local = scratch.path().join(format!("{}-{}.tif", layer.name, tile));
        let metadata = [
            ("TILE_ID", tile.to_string()),
            ("LAYER", layer.name.clone()),
            ("SOURCE_INDEX", layer.index_url.clone()),
        ];
        write_geotiff(&local, &raster, &metadata)?;
        store.put_file(&local, &output)?;
        info!("Published tile {} -> {}", tile, output);
        report.processed += 1;
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MatchPolicy, Resampling};
    use serde_json::json;

    fn item(id: &str, zone: u32, square: &str) -> Item {
        serde_json::from_value(json!({
            "type": "Feature",
            "stac_version": "1.0.0",
            "id": id,
            "geometry": null,
            "properties": {
                "datetime": "2020-08-01T21:17:35Z",
                "sentinel:utm_zone": zone,
                "sentinel:latitude_band": "V",
                "sentinel:grid_square": square,
                "proj:epsg": 32605
            },
            "assets": {
                "B02": {
                    "href": "B02.tif",
                    "proj:transform": [10.0, 0.0, 399960.0, 0.0, -10.0, 6700020.0],
                    "proj:shape": [10980, 10980]
                }
            }
        }))
        .unwrap()
    }

    fn mask_layer() -> LayerParams {
        LayerParams {
            name: "coast".into(),
            kind: LayerKind::Mask,
            index_url: "coast.geojson".into(),
            descriptor_field: "code".into(),
            policy: None,
            output: "out/{tile_id}.tif".into(),
            reference_asset: "B02".into(),
            resolution: None,
            resampling: Resampling::Nearest,
            nodata: None,
            mask_source: MaskSource::Index,
            archive_template: None,
            codes: Some(vec!["1".into()]),
            foreground: 1.0,
            background: 0.0,
        }
    }

    #[test]
    fn tiles_are_unique_and_sorted() {
        let mut root = CatalogNode::new(crate::io::stac::Catalog::new("rg", ""));
        let child = root.child_or_insert("l1c", "");
        child.items.push(item("b", 5, "NG"));
        child.items.push(item("a", 5, "MG"));
        child.items.push(item("c", 5, "MG"));
        let tiles = enumerate_tiles(&root).unwrap();
        let ids: Vec<_> = tiles.keys().map(|t| t.as_str()).collect();
        assert_eq!(ids, ["05VMG", "05VNG"]);
        assert_eq!(tiles.values().next().unwrap().id, "a");
    }

    #[test]
    fn grid_from_projection_fields_with_resolution_override() {
        let grid = tile_grid_for_item(&item("a", 5, "MG"), "B02", Some(20.0)).unwrap();
        assert_eq!(grid.crs, "EPSG:32605");
        assert_eq!((grid.width, grid.height), (5490, 5490));
        assert_eq!(grid.transform.origin(), (399960.0, 6700020.0));
    }

    #[test]
    fn empty_lookup_writes_background_under_any_policy() {
        let layer = mask_layer();
        assert_eq!(layer.match_policy(), MatchPolicy::Any);
        let grid = TileGrid::new(
            "EPSG:4326",
            crate::core::tile::GeoTransform::north_up(0.0, 10.0, 1.0, 1.0),
            10,
            10,
        );
        let index = SpatialIndex::new("coast", "EPSG:4326", vec![]);
        let scratch = tempfile::tempdir().unwrap();
        let store = crate::io::store::LocalStore;
        let tile: TileId = "05VMG".parse().unwrap();
        let out = prepare_tile(&store, &layer, &index, &tile, &grid, scratch.path()).unwrap();
        assert_eq!(out.grid, grid);
        assert!(out.data.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn index_mask_keeps_configured_codes() {
        let layer = mask_layer();
        let collection = json!({
            "type": "FeatureCollection",
            "features": [
                { "type": "Feature", "properties": { "code": 1 },
                  "geometry": { "type": "Polygon", "coordinates": [[[0, 0], [5, 0], [5, 10], [0, 10], [0, 0]]] } },
                { "type": "Feature", "properties": { "code": 2 },
                  "geometry": { "type": "Polygon", "coordinates": [[[5, 0], [10, 0], [10, 10], [5, 10], [5, 0]]] } }
            ]
        });
        let index = SpatialIndex::from_geojson("coast", &collection, "code").unwrap();
        let grid = TileGrid::new(
            "EPSG:4326",
            crate::core::tile::GeoTransform::north_up(0.0, 10.0, 1.0, 1.0),
            10,
            10,
        );
        let scratch = tempfile::tempdir().unwrap();
        let store = crate::io::store::LocalStore;
        let tile: TileId = "05VMG".parse().unwrap();
        let out = prepare_tile(&store, &layer, &index, &tile, &grid, scratch.path()).unwrap();
        assert_eq!(out.data[[0, 0]], 1.0);
        assert_eq!(out.data[[9, 4]], 1.0);
        assert_eq!(out.data[[0, 5]], 0.0);
        assert_eq!(out.data.iter().filter(|v| **v == 1.0).count(), 50);
    }
}
