use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_json::Value;
use tracing::{info, warn};

use crate::core::params::ShadowParams;
use crate::core::tile::TileId;
use crate::error::{Error, Result};
use crate::io::stac::{Catalog, CatalogNode, Item, Link};
use crate::types::ProcessingLevel;

fn scene_key(item: &Item) -> Result<(TileId, NaiveDate)> {
    Ok((item.tile_id()?, item.datetime()?.date_naive()))
}

fn absolute_href(item: &Item) -> Result<String> {
    item.self_href.clone().ok_or_else(|| Error::MissingArgument {
        arg: format!("location of item {}", item.id),
    })
}

fn level_link(level: ProcessingLevel, item: &Item) -> Result<Link> {
    let mut link = Link::new(level.link_rel(), absolute_href(item)?);
    link.title = Some(item.id.clone());
    Ok(link)
}

/// Pair each L1C scene with the L2A scene of the same tile and acquisition
/// date, and collect one item per pair in a new catalog. The items link the
/// source scenes (`item-L1C`, `item-L2A`) with absolute hrefs, so the
/// scene catalog must have been read from its store.
pub fn build_shadow_catalog(scenes: &CatalogNode, params: &ShadowParams) -> Result<CatalogNode> {
    let l1c = scenes
        .get_child(&params.l1c_collection)
        .ok_or_else(|| Error::NotFound(format!("collection `{}`", params.l1c_collection)))?;
    let l2a = scenes
        .get_child(&params.l2a_collection)
        .ok_or_else(|| Error::NotFound(format!("collection `{}`", params.l2a_collection)))?;

    let mut l2a_by_scene: BTreeMap<(TileId, NaiveDate), Vec<&Item>> = BTreeMap::new();
    for item in l2a.all_items() {
        l2a_by_scene.entry(scene_key(item)?).or_default().push(item);
    }

    let mut catalog = Catalog::new(&params.catalog_id, &params.description);
    catalog.title = Some(params.catalog_id.clone());
    let mut root = CatalogNode::new(catalog);
    let mut unpaired = 0;
    for scene in l1c.all_items() {
        let (tile, date) = scene_key(scene)?;
        let mut item = Item::new(&scene.id, scene.datetime()?);
        item.geometry = scene.geometry.clone();
        item.bbox = scene.bbox.clone();
        item.properties
            .insert("tile_id".into(), Value::String(tile.to_string()));
        item.links.push(level_link(ProcessingLevel::L1C, scene)?);

        match l2a_by_scene.get(&(tile.clone(), date)).map(Vec::as_slice) {
            Some([l2a_scene, rest @ ..]) => {
                if !rest.is_empty() {
                    warn!(
                        "{} L2A scenes for tile {} on {}, using {}",
                        rest.len() + 1,
                        tile,
                        date,
                        l2a_scene.id
                    );
                }
                item.links.push(level_link(ProcessingLevel::L2A, l2a_scene)?);
            }
            _ => {
                warn!("No L2A scene for {} ({} on {})", scene.id, tile, date);
                unpaired += 1;
            }
        }
        root.items.push(item);
    }
    root.items.sort_by(|a, b| a.id.cmp(&b.id));
    info!(
        "Shadow catalog {}: {} item(s), {} without L2A",
        params.catalog_id,
        root.items.len(),
        unpaired
    );
    Ok(root)
}
