//! STAC catalogs: serde model of catalogs, collections, items and assets,
//! plus reading and writing a catalog tree of linked JSON documents through
//! an `ObjectStore`.
//!
//! Saving uses the usual self-contained layout: the root is `catalog.json`,
//! each child lives in `<child id>/catalog.json` (or `collection.json`), each
//! item in `<item id>/<item id>.json`, and all structural links are
//! relative. Asset hrefs are written exactly as they are held.
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::href;
use super::store::ObjectStore;
use crate::core::tile::{TileGrid, TileId};
use crate::error::{Error, Result};

pub const STAC_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub rel: String,
    pub href: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Link {
    pub fn new(rel: impl Into<String>, href: impl Into<String>) -> Self {
        Link {
            rel: rel.into(),
            href: href.into(),
            media_type: Some("application/json".to_string()),
            title: None,
            extra: Map::new(),
        }
    }

    fn is_structural(&self) -> bool {
        matches!(self.rel.as_str(), "root" | "parent" | "child" | "item" | "self" | "collection")
    }
}

/// Asset locator: where and how to fetch one piece of item data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub href: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Asset {
    pub fn new(href: impl Into<String>) -> Self {
        Asset {
            href: href.into(),
            media_type: None,
            title: None,
            roles: None,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    #[serde(rename = "type")]
    pub kind: String,
    pub stac_version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stac_extensions: Vec<String>,
    pub id: String,
    pub geometry: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub assets: BTreeMap<String, Asset>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    /// Where the item was read from or last saved to
    #[serde(skip)]
    pub self_href: Option<String>,
}

impl Item {
    pub fn new(id: impl Into<String>, datetime: DateTime<Utc>) -> Self {
        let mut properties = Map::new();
        properties.insert("datetime".into(), Value::String(datetime.to_rfc3339()));
        Item {
            kind: "Feature".to_string(),
            stac_version: STAC_VERSION.to_string(),
            stac_extensions: Vec::new(),
            id: id.into(),
            geometry: None,
            bbox: None,
            properties,
            links: Vec::new(),
            assets: BTreeMap::new(),
            collection: None,
            extra: Map::new(),
            self_href: None,
        }
    }

    pub fn datetime(&self) -> Result<DateTime<Utc>> {
        let raw = self
            .properties
            .get("datetime")
            .and_then(Value::as_str)
            .ok_or_else(|| self.missing("datetime"))?;
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| Error::InvalidArgument {
                arg: "datetime",
                value: format!("{raw}: {e}"),
            })
    }

    pub fn tile_id(&self) -> Result<TileId> {
        TileId::from_properties(&self.properties).ok_or_else(|| self.missing("tile id (utm_zone/latitude_band/grid_square)"))
    }

    pub fn property(&self, key: &str) -> Result<&Value> {
        self.properties.get(key).ok_or_else(|| self.missing(key))
    }

    pub fn asset(&self, key: &str) -> Result<&Asset> {
        self.assets.get(key).ok_or_else(|| Error::MissingAsset {
            item: self.id.clone(),
            asset: key.to_string(),
        })
    }

    /// Tile grid from projection-extension fields of `asset_key`, falling back
    /// to item-level fields.
    pub fn projection_grid(&self, asset_key: &str) -> Option<TileGrid> {
        let from_asset = self.assets.get(asset_key).and_then(|asset| {
            let mut fields = self.properties.clone();
            fields.extend(asset.extra.clone());
            TileGrid::from_projection(&fields)
        });
        from_asset.or_else(|| TileGrid::from_projection(&self.properties))
    }

    /// Href of the first link with relation `rel`, resolved against the item
    /// location.
    pub fn link_href(&self, rel: &str) -> Option<String> {
        let link = self.links.iter().find(|l| l.rel == rel)?;
        Some(match &self.self_href {
            Some(own) => href::join(&href::dirname(own), &link.href),
            None => link.href.clone(),
        })
    }

    /// Absolute href of an asset.
    pub fn asset_href(&self, key: &str) -> Result<String> {
        let asset = self.asset(key)?;
        Ok(match &self.self_href {
            Some(own) => href::join(&href::dirname(own), &asset.href),
            None => asset.href.clone(),
        })
    }

    fn missing(&self, key: &str) -> Error {
        Error::MissingProperty {
            item: self.id.clone(),
            key: key.to_string(),
        }
    }
}

/// A catalog or collection document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(rename = "type")]
    pub kind: String,
    pub stac_version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stac_extensions: Vec<String>,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub description: String,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Catalog {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Catalog {
            kind: "Catalog".to_string(),
            stac_version: STAC_VERSION.to_string(),
            stac_extensions: Vec::new(),
            id: id.into(),
            title: None,
            description: description.into(),
            links: Vec::new(),
            extra: Map::new(),
        }
    }

    fn file_name(&self) -> &'static str {
        if self.kind == "Collection" {
            "collection.json"
        } else {
            "catalog.json"
        }
    }
}

/// A catalog together with its resolved children and items.
#[derive(Debug, Clone)]
pub struct CatalogNode {
    pub catalog: Catalog,
    pub children: Vec<CatalogNode>,
    pub items: Vec<Item>,
    /// Where the node was read from or last saved to
    pub href: Option<String>,
}

impl CatalogNode {
    pub fn new(catalog: Catalog) -> Self {
        CatalogNode {
            catalog,
            children: Vec::new(),
            items: Vec::new(),
            href: None,
        }
    }

    /// Read a catalog tree from its root (`catalog.json` or its directory).
    pub fn read(store: &dyn ObjectStore, url: &str) -> Result<Self> {
        let root = href::catalog_file(url);
        info!("Reading catalog {}", root);
        Self::read_node(store, &root)
    }

    fn read_node(store: &dyn ObjectStore, node_href: &str) -> Result<Self> {
        let catalog: Catalog = serde_json::from_str(&store.read_to_string(node_href)?)?;
        let dir = href::dirname(node_href);
        let mut node = CatalogNode::new(catalog);
        node.href = Some(node_href.to_string());

        for link in node.catalog.links.clone() {
            let target = href::join(&dir, &link.href);
            match link.rel.as_str() {
                "child" => node.children.push(Self::read_node(store, &target)?),
                "item" => {
                    debug!("Reading item {}", target);
                    let mut item: Item = serde_json::from_str(&store.read_to_string(&target)?)?;
                    item.self_href = Some(target);
                    node.items.push(item);
                }
                _ => {}
            }
        }
        Ok(node)
    }

    pub fn id(&self) -> &str {
        &self.catalog.id
    }

    pub fn get_child(&self, id: &str) -> Option<&CatalogNode> {
        self.children.iter().find(|c| c.id() == id)
    }

    pub fn get_child_mut(&mut self, id: &str) -> Option<&mut CatalogNode> {
        self.children.iter_mut().find(|c| c.id() == id)
    }

    /// Existing child with `id`, or a new empty sub-catalog.
    pub fn child_or_insert(&mut self, id: &str, description: &str) -> &mut CatalogNode {
        let idx = match self.children.iter().position(|c| c.id() == id) {
            Some(idx) => idx,
            None => {
                self.children.push(CatalogNode::new(Catalog::new(id, description)));
                self.children.len() - 1
            }
        };
        &mut self.children[idx]
    }

    /// All items of this node and its descendants, depth first.
    pub fn all_items(&self) -> Vec<&Item> {
        let mut items: Vec<&Item> = self.items.iter().collect();
        for child in &self.children {
            items.extend(child.all_items());
        }
        items
    }

    pub fn for_each_item_mut<F>(&mut self, f: &mut F) -> Result<()>
    where
        F: FnMut(&mut Item) -> Result<()>,
    {
        for item in &mut self.items {
            f(item)?;
        }
        for child in &mut self.children {
            child.for_each_item_mut(f)?;
        }
        Ok(())
    }

    pub fn find_item(&self, id: &str) -> Option<&Item> {
        self.all_items().into_iter().find(|i| i.id == id)
    }

    /// Assign the normalized hrefs of every node and item under `root_url`
    /// without writing anything.
    pub fn normalize_hrefs(&mut self, root_url: &str) {
        let root = href::catalog_file(root_url);
        self.assign_hrefs(&root);
    }

    fn assign_hrefs(&mut self, node_href: &str) {
        self.href = Some(node_href.to_string());
        let dir = href::dirname(node_href);
        let dir = dir.trim_end_matches('/');
        for child in &mut self.children {
            let child_href = format!("{dir}/{}/{}", child.catalog.id, child.catalog.file_name());
            child.assign_hrefs(&child_href);
        }
        for item in &mut self.items {
            item.self_href = Some(format!("{dir}/{id}/{id}.json", id = item.id));
        }
    }

    /// Normalize hrefs under `root_url` and write every document.
    pub fn save(&mut self, store: &dyn ObjectStore, root_url: &str) -> Result<()> {
        self.normalize_hrefs(root_url);
        let root = href::catalog_file(root_url);
        info!("Saving catalog {}", root);
        self.write_node(store, &root, None)
    }

    fn write_node(&self, store: &dyn ObjectStore, root: &str, parent: Option<&str>) -> Result<()> {
        let own = self.href.as_deref().unwrap_or(root);
        let dir = href::dirname(own);

        let mut catalog = self.catalog.clone();
        catalog.links.retain(|l| !l.is_structural());
        catalog.links.push(Link::new("root", href::relative(&dir, root)));
        if let Some(parent) = parent {
            catalog.links.push(Link::new("parent", href::relative(&dir, parent)));
        }
        for child in &self.children {
            let mut link = Link::new("child", href::relative(&dir, child.href.as_deref().unwrap_or_default()));
            link.title = child.catalog.title.clone();
            catalog.links.push(link);
        }
        for item in &self.items {
            catalog
                .links
                .push(Link::new("item", href::relative(&dir, item.self_href.as_deref().unwrap_or_default())));
        }
        store.write(own, &serde_json::to_vec_pretty(&catalog)?)?;

        for item in &self.items {
            let item_href = item.self_href.as_deref().unwrap_or_default();
            let item_dir = href::dirname(item_href);
            let mut doc = item.clone();
            doc.links.retain(|l| !l.is_structural());
            doc.links.push(Link::new("root", href::relative(&item_dir, root)));
            doc.links.push(Link::new("parent", href::relative(&item_dir, own)));
            if self.catalog.kind == "Collection" {
                doc.links.push(Link::new("collection", href::relative(&item_dir, own)));
                doc.collection = Some(self.catalog.id.clone());
            }
            store.write(item_href, &serde_json::to_vec_pretty(&doc)?)?;
        }
        for child in &self.children {
            child.write_node(store, root, Some(own))?;
        }
        Ok(())
    }
}
