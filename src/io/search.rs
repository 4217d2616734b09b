//! STAC API item search (`POST {api}/search`) with pagination.
use reqwest::blocking::Client;
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use super::stac::Item;
use crate::core::params::SearchParams;
use crate::error::{Error, Result};

/// One request of a paginated search.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub url: String,
    /// `None` for GET
    pub body: Option<Value>,
}

/// Body of the first search request.
pub fn search_body(params: &SearchParams, collection: &str) -> Value {
    let mut body = json!({
        "collections": [collection],
        "bbox": params.bbox,
        "datetime": params.datetime,
        "limit": params.limit,
    });
    if let Some(max_cloud_cover) = params.max_cloud_cover {
        body["query"] = json!({ "eo:cloud_cover": { "lt": max_cloud_cover } });
    }
    body
}

/// Request for the page after `page`, following its `next` link. A link
/// with `"merge": true` only carries the changed body members.
pub fn next_request(page: &Value, previous: &PageRequest) -> Option<PageRequest> {
    let link = page
        .get("links")?
        .as_array()?
        .iter()
        .find(|l| l.get("rel").and_then(Value::as_str) == Some("next"))?;
    let url = link.get("href")?.as_str()?.to_string();
    let method = link.get("method").and_then(Value::as_str).unwrap_or("GET");
    if !method.eq_ignore_ascii_case("POST") {
        return Some(PageRequest { url, body: None });
    }
    let link_body = link.get("body").and_then(Value::as_object).cloned().unwrap_or_default();
    let merge = link.get("merge").and_then(Value::as_bool).unwrap_or(false);
    let body = match (&previous.body, merge) {
        (Some(Value::Object(prev)), true) => {
            let mut merged: Map<String, Value> = prev.clone();
            merged.extend(link_body);
            merged
        }
        _ => link_body,
    };
    Some(PageRequest {
        url,
        body: Some(Value::Object(body)),
    })
}

/// Items of one search response page.
pub fn page_items(page: &Value) -> Result<Vec<Item>> {
    let features = page
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::External("search response has no `features`".into()))?;
    features
        .iter()
        .map(|f| Ok(serde_json::from_value(f.clone())?))
        .collect()
}

pub struct SceneSearch {
    client: Client,
}

impl SceneSearch {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("glacierprep/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::external)?;
        Ok(SceneSearch { client })
    }

    fn fetch(&self, request: &PageRequest) -> Result<Value> {
        let builder = match &request.body {
            Some(body) => self.client.post(&request.url).json(body),
            None => self.client.get(&request.url),
        };
        let response = builder
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(Error::external)?;
        response.json().map_err(Error::external)
    }

    /// All items of `collection` matching the search parameters.
    pub fn search(&self, params: &SearchParams, collection: &str) -> Result<Vec<Item>> {
        let mut request = PageRequest {
            url: format!("{}/search", params.api_url.trim_end_matches('/')),
            body: Some(search_body(params, collection)),
        };
        let mut items = Vec::new();
        loop {
            debug!("Search request {} {:?}", request.url, request.body);
            let page = self.fetch(&request)?;
            let found = page_items(&page)?;
            if found.is_empty() {
                break;
            }
            items.extend(found);
            match next_request(&page, &request) {
                Some(next) if next != request => request = next,
                _ => break,
            }
        }
        info!("Found {} {} scene(s)", items.len(), collection);
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SearchParams {
        SearchParams {
            api_url: "https://stac.example/v0".into(),
            collections: vec!["sentinel-s2-l1c".into()],
            bbox: [-153.5, 60.5, -152.5, 61.0],
            datetime: "2016-01-01/2020-12-31".into(),
            max_cloud_cover: Some(20.0),
            limit: 50,
            catalog_id: "red-glacier".into(),
            description: String::new(),
        }
    }

    #[test]
    fn body_carries_cloud_cover_query() {
        let body = search_body(&params(), "sentinel-s2-l1c");
        assert_eq!(body["collections"], json!(["sentinel-s2-l1c"]));
        assert_eq!(body["limit"], json!(50));
        assert_eq!(body["query"]["eo:cloud_cover"]["lt"], json!(20.0));
    }

    #[test]
    fn merged_post_next_link() {
        let first = PageRequest {
            url: "https://stac.example/v0/search".into(),
            body: Some(search_body(&params(), "sentinel-s2-l1c")),
        };
        let page = json!({
            "features": [],
            "links": [{ "rel": "next", "href": "https://stac.example/v0/search", "method": "POST", "body": { "page": 2 }, "merge": true }]
        });
        let next = next_request(&page, &first).unwrap();
        let body = next.body.unwrap();
        assert_eq!(body["page"], json!(2));
        assert_eq!(body["limit"], json!(50));
    }

    #[test]
    fn get_next_link_and_last_page() {
        let first = PageRequest { url: "u".into(), body: None };
        let page = json!({ "links": [{ "rel": "next", "href": "https://stac.example/search?token=abc" }] });
        assert_eq!(
            next_request(&page, &first),
            Some(PageRequest { url: "https://stac.example/search?token=abc".into(), body: None })
        );
        assert_eq!(next_request(&json!({ "links": [] }), &first), None);
    }

    #[test]
    fn page_items_requires_features() {
        assert!(page_items(&json!({ "type": "FeatureCollection" })).is_err());
        assert!(page_items(&json!({ "features": [] })).unwrap().is_empty());
    }
}
