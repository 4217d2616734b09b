//! High-level, ergonomic library API: scene search into a catalog, asset
//! link fixup and copy, per-tile auxiliary layers, shadow-classification
//! catalogs and batch job scripts. Prefer these entrypoints over the
//! low-level `core` and `io` modules when scripting the workflow.
use tracing::{debug, info};

use crate::core::params::{CopyParams, LinkParams, SearchParams};
use crate::error::{Error, Result};
use crate::io::href;
use crate::io::search::SceneSearch;
use crate::io::stac::{Asset, Catalog, CatalogNode, Item};
use crate::io::store::ObjectStore;

pub mod jobs;
pub mod layers;
pub mod shadow;

pub use jobs::{JobReport, write_job_scripts};
pub use layers::{LayerReport, enumerate_tiles, prepare_layer, prepare_tile, tile_grid_for_item};
pub use shadow::build_shadow_catalog;

/// Read a catalog tree from `url` (the root `catalog.json` or its directory).
pub fn read_catalog(store: &dyn ObjectStore, url: &str) -> Result<CatalogNode> {
    CatalogNode::read(store, url)
}

/// Search every configured collection and gather the scenes into a new
/// catalog with one child catalog per collection.
pub fn search_scenes(search: &SceneSearch, params: &SearchParams) -> Result<CatalogNode> {
    let mut root = CatalogNode::new(Catalog::new(&params.catalog_id, &params.description));
    for collection in &params.collections {
        let items = search.search(params, collection)?;
        let child = root.child_or_insert(collection, &format!("{collection} scenes"));
        child.items.extend(items);
    }
    Ok(root)
}

/// Fill an href template for one asset of an item.
///
/// Recognised placeholders: `{bucket}`, `{id}`, `{asset}`, `{tile_id}`,
/// `{utm_zone}` (without zero padding), `{latitude_band}`, `{grid_square}`,
/// `{year}`, `{month}`, `{day}` (acquisition date, without zero padding) and
/// `{prop:<name>}` for any item property.
pub fn render_asset_href(template: &str, item: &Item, asset_key: &str, bucket: &str) -> Result<String> {
    let mut out = String::with_capacity(template.len() + 32);
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let end = rest[start..].find('}').ok_or_else(|| Error::InvalidArgument {
            arg: "template",
            value: template.to_string(),
        })?;
        let key = &rest[start + 1..start + end];
        out.push_str(&template_value(key, item, asset_key, bucket)?);
        rest = &rest[start + end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn template_value(key: &str, item: &Item, asset_key: &str, bucket: &str) -> Result<String> {
    if let Some(name) = key.strip_prefix("prop:") {
        return Ok(match item.property(name)? {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        });
    }
    Ok(match key {
        "bucket" => bucket.to_string(),
        "id" => item.id.clone(),
        "asset" => asset_key.to_string(),
        "tile_id" => item.tile_id()?.to_string(),
        "utm_zone" | "latitude_band" | "grid_square" => {
            let tile = item.tile_id()?;
            let (zone, band, square) = tile.parts();
            match key {
                "utm_zone" => zone.trim_start_matches('0').to_string(),
                "latitude_band" => band.to_string(),
                _ => square.to_string(),
            }
        }
        "year" | "month" | "day" => {
            use chrono::Datelike;
            let date = item.datetime()?.date_naive();
            match key {
                "year" => date.year().to_string(),
                "month" => date.month().to_string(),
                _ => date.day().to_string(),
            }
        }
        other => {
            return Err(Error::MissingProperty {
                item: item.id.clone(),
                key: other.to_string(),
            });
        }
    })
}

/// Point the configured assets of each collection at their public
/// object-storage URLs. Missing assets are created. Returns the number of
/// hrefs written.
pub fn fix_asset_links(root: &mut CatalogNode, links: &[LinkParams]) -> Result<usize> {
    let mut updated = 0;
    for params in links {
        let child = root
            .get_child_mut(&params.collection)
            .ok_or_else(|| Error::NotFound(format!("collection `{}`", params.collection)))?;
        child.for_each_item_mut(&mut |item: &mut Item| {
            for key in &params.asset_keys {
                let new_href = render_asset_href(&params.template, item, key, &params.bucket)?;
                let asset = item
                    .assets
                    .entry(key.clone())
                    .or_insert_with(|| Asset::new(new_href.clone()));
                asset.href = new_href;
                if params.media_type.is_some() {
                    asset.media_type = params.media_type.clone();
                }
                updated += 1;
            }
            Ok(())
        })?;
        info!("Fixed asset links of collection {}", params.collection);
    }
    Ok(updated)
}

/// Copy assets next to their items (`<item dir>/<file name>`) and update the
/// hrefs. Items must have been read from (or saved to) the target store.
pub fn copy_assets(store: &dyn ObjectStore, root: &mut CatalogNode, params: &CopyParams) -> Result<usize> {
    let node = match &params.collection_id {
        Some(id) => root
            .get_child_mut(id)
            .ok_or_else(|| Error::NotFound(format!("collection `{id}`")))?,
        None => root,
    };
    let mut copied = 0;
    node.for_each_item_mut(&mut |item: &mut Item| {
        let own = item.self_href.clone().ok_or_else(|| Error::MissingArgument {
            arg: format!("location of item {}", item.id),
        })?;
        let item_dir = href::dirname(&own);
        let keys: Vec<String> = if params.asset_keys.is_empty() {
            item.assets.keys().cloned().collect()
        } else {
            params.asset_keys.clone()
        };
        for key in keys {
            let source = item.asset_href(&key)?;
            let target = format!("{item_dir}/{}", href::file_name(&source));
            if source == target {
                debug!("{} already in place", target);
                continue;
            }
            info!("Copying {} -> {}", source, target);
            let data = store.read(&source)?;
            store.write(&target, &data)?;
            if let Some(asset) = item.assets.get_mut(&key) {
                asset.href = target;
            }
            copied += 1;
        }
        Ok(())
    })?;
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::store::LocalStore;
    use serde_json::json;

    fn l1c_item() -> Item {
        serde_json::from_value(json!({
            "type": "Feature",
            "stac_version": "1.0.0",
            "id": "S2A_5VMG_20200801_0_L1C",
            "geometry": null,
            "properties": {
                "datetime": "2020-08-01T21:17:35Z",
                "sentinel:utm_zone": 5,
                "sentinel:latitude_band": "V",
                "sentinel:grid_square": "MG",
                "sentinel:sequence": "0"
            },
            "assets": {
                "B04": { "href": "s3://sentinel-s2-l1c/tiles/5/V/MG/2020/8/1/0/B04.jp2" }
            }
        }))
        .unwrap()
    }

    const TEMPLATE: &str = "https://{bucket}.s3.amazonaws.com/tiles/{utm_zone}/{latitude_band}/{grid_square}/{year}/{month}/{day}/{prop:sentinel:sequence}/{asset}.jp2";

    #[test]
    fn renders_public_url() {
        let href = render_asset_href(TEMPLATE, &l1c_item(), "B04", "sentinel-s2-l1c").unwrap();
        assert_eq!(
            href,
            "https://sentinel-s2-l1c.s3.amazonaws.com/tiles/5/V/MG/2020/8/1/0/B04.jp2"
        );
        assert_eq!(render_asset_href("{tile_id}-{id}", &l1c_item(), "B04", "b").unwrap(), "05VMG-S2A_5VMG_20200801_0_L1C");
    }

    #[test]
    fn missing_template_keys_are_errors() {
        let item = l1c_item();
        assert!(matches!(
            render_asset_href("{prop:eo:cloud_cover}", &item, "B04", "b"),
            Err(Error::MissingProperty { .. })
        ));
        assert!(matches!(
            render_asset_href("{nope}", &item, "B04", "b"),
            Err(Error::MissingProperty { .. })
        ));
        assert!(matches!(
            render_asset_href("{bucket", &item, "B04", "b"),
            Err(Error::InvalidArgument { .. })
        ));
    }

    #[test]
    fn malformed_tile_properties_are_missing_not_a_panic() {
        let mut item = l1c_item();
        item.properties.insert("sentinel:latitude_band".into(), json!(""));
        item.properties.insert("sentinel:grid_square".into(), json!(""));
        assert!(matches!(
            render_asset_href(TEMPLATE, &item, "B04", "b"),
            Err(Error::MissingProperty { .. })
        ));
        item.properties.insert("sentinel:latitude_band".into(), json!("\u{e9}"));
        item.properties.insert("sentinel:grid_square".into(), json!("MG"));
        assert!(matches!(
            render_asset_href("{grid_square}", &item, "B04", "b"),
            Err(Error::MissingProperty { .. })
        ));
    }

    #[test]
    fn fixes_links_of_one_collection() {
        let mut root = CatalogNode::new(Catalog::new("red-glacier", ""));
        root.child_or_insert("sentinel-s2-l1c", "").items.push(l1c_item());
        let links = [LinkParams {
            collection: "sentinel-s2-l1c".into(),
            asset_keys: vec!["B04".into(), "B08".into()],
            bucket: "sentinel-s2-l1c".into(),
            template: TEMPLATE.into(),
            media_type: Some("image/jp2".into()),
        }];
        assert_eq!(fix_asset_links(&mut root, &links).unwrap(), 2);
        let item = root.find_item("S2A_5VMG_20200801_0_L1C").unwrap();
        assert!(item.assets["B08"].href.ends_with("/0/B08.jp2"));
        assert_eq!(item.assets["B04"].media_type.as_deref(), Some("image/jp2"));

        let missing = [LinkParams { collection: "sentinel-s2-l2a".into(), ..links[0].clone() }];
        assert!(matches!(fix_asset_links(&mut root, &missing), Err(Error::NotFound(_))));
    }

    #[test]
    fn copies_assets_next_to_items() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore;
        let source = format!("{}/remote/B04.jp2", dir.path().display());
        store.write(&source, b"jp2").unwrap();

        let mut item = l1c_item();
        item.assets.get_mut("B04").unwrap().href = source;
        let mut root = CatalogNode::new(Catalog::new("red-glacier", ""));
        root.child_or_insert("sentinel-s2-l1c", "").items.push(item);
        let catalog_url = format!("{}/catalog", dir.path().display());
        root.save(&store, &catalog_url).unwrap();

        let params = CopyParams {
            collection_id: Some("sentinel-s2-l1c".into()),
            asset_keys: vec![],
        };
        assert_eq!(copy_assets(&store, &mut root, &params).unwrap(), 1);
        let expected = format!(
            "{catalog_url}/sentinel-s2-l1c/S2A_5VMG_20200801_0_L1C/B04.jp2"
        );
        assert_eq!(root.find_item("S2A_5VMG_20200801_0_L1C").unwrap().assets["B04"].href, expected);
        assert_eq!(store.read(&expected).unwrap(), b"jp2");
        // second run finds everything in place
        assert_eq!(copy_assets(&store, &mut root, &params).unwrap(), 0);
    }
}
