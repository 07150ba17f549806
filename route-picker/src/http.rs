//! HTTP implementations of the service boundaries

use anyhow::{bail, Context, Result};
use serde::Serialize;

use route_picker_graph::{BoundingBox, Node, NodeID, RegionLoaded};

use crate::service::{BoxFuture, NodeService, RegionDataSource};

pub const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";

/// Talks to the routing backend
pub struct HttpNodeService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpNodeService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Serialize)]
struct RegionRequest {
    #[serde(flatten)]
    bbox: BoundingBox,
    root_node_id: NodeID,
}

impl NodeService for HttpNodeService {
    fn nearest_node(&self, lat: f64, lon: f64) -> BoxFuture<'_, Result<Option<Node>>> {
        let url = format!("{}/nearest-node", self.base_url);
        Box::pin(async move {
            let resp = self
                .client
                .get(&url)
                .query(&[("lat", lat), ("lon", lon)])
                .send()
                .await
                .context("nearest-node request failed")?;

            if resp.status() == reqwest::StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if !resp.status().is_success() {
                bail!("nearest-node returned HTTP {}", resp.status());
            }

            // The service answers with null when nothing is close enough
            let node: Option<Node> = resp
                .json()
                .await
                .context("nearest-node returned something that isn't a node")?;
            Ok(node)
        })
    }

    fn graph_in_region(&self, bbox: BoundingBox, root: NodeID) -> BoxFuture<'_, Result<RegionLoaded>> {
        let url = format!("{}/bounding-box", self.base_url);
        Box::pin(async move {
            if !bbox.is_valid() {
                bail!("Invalid coordinate ranges in {:?}", bbox);
            }

            let resp = self
                .client
                .post(&url)
                .json(&RegionRequest {
                    bbox,
                    root_node_id: root,
                })
                .send()
                .await
                .context("bounding-box request failed")?;
            if !resp.status().is_success() {
                bail!("bounding-box returned HTTP {}", resp.status());
            }
            let loaded: RegionLoaded = resp
                .json()
                .await
                .context("bounding-box returned an unexpected body")?;
            if !loaded.is_success() {
                bail!("bounding-box answered {}: {}", loaded.status, loaded.message);
            }
            Ok(loaded)
        })
    }
}

/// Fetches raw OpenStreetMap data from an Overpass API interpreter
pub struct OverpassSource {
    client: reqwest::Client,
    endpoint: String,
}

impl OverpassSource {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

impl Default for OverpassSource {
    fn default() -> Self {
        Self::new(DEFAULT_OVERPASS_URL)
    }
}

/// Every highway in the box, plus the nodes they reference
pub fn overpass_query(bbox: &BoundingBox) -> String {
    format!(
        "[out:json][timeout:25];way[\"highway\"]({},{},{},{});(._;>;);out body;",
        bbox.min_lat, bbox.min_lon, bbox.max_lat, bbox.max_lon
    )
}

impl RegionDataSource for OverpassSource {
    fn fetch_region_data(&self, bbox: BoundingBox) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            if !bbox.is_valid() {
                bail!("Invalid coordinate ranges in {:?}", bbox);
            }

            let resp = self
                .client
                .post(&self.endpoint)
                .form(&[("data", overpass_query(&bbox))])
                .send()
                .await
                .context("Overpass request failed")?;
            if !resp.status().is_success() {
                bail!("Overpass returned HTTP {}", resp.status());
            }
            let data = resp.json().await.context("Overpass returned invalid JSON")?;
            Ok(data)
        })
    }
}
