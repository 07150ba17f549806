//! The boundary to the geocoding/graph service and the external region data source.

use std::future::Future;
use std::pin::Pin;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use route_picker_graph::{BoundingBox, Node, NodeID, RegionLoaded};

/// Type alias for a boxed future that can be sent between threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Methods return boxed futures so implementations can be used as trait objects.
pub trait NodeService: Send + Sync {
    /// `Ok(None)` means nothing usable is within the service's tolerance. `Err` is reserved for
    /// the service itself failing.
    fn nearest_node(&self, lat: f64, lon: f64) -> BoxFuture<'_, Result<Option<Node>>>;

    /// Asks the service to load the street graph covering `bbox` into its own storage.
    fn graph_in_region(&self, bbox: BoundingBox, root: NodeID) -> BoxFuture<'_, Result<RegionLoaded>>;
}

/// Raw geographic features for an area. The response isn't interpreted here.
pub trait RegionDataSource: Send + Sync {
    fn fetch_region_data(&self, bbox: BoundingBox) -> BoxFuture<'_, Result<serde_json::Value>>;
}

/// The outcome of a nearest-node lookup, as the selection logic sees it
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Resolution {
    Found(Node),
    NotFound,
    ServiceUnavailable(String),
}

impl Resolution {
    pub fn from_lookup(result: Result<Option<Node>>) -> Resolution {
        match result {
            Ok(Some(node)) => {
                if node.has_valid_position() {
                    Resolution::Found(node)
                } else {
                    log::warn!("Service returned {:?} with an invalid position", node);
                    Resolution::NotFound
                }
            }
            Ok(None) => Resolution::NotFound,
            Err(err) => Resolution::ServiceUnavailable(format!("{err:#}")),
        }
    }
}

pub async fn resolve_nearest_node(service: &dyn NodeService, lat: f64, lon: f64) -> Resolution {
    log::debug!("Looking up the nearest node to ({lat}, {lon})");
    Resolution::from_lookup(service.nearest_node(lat, lon).await)
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;

    #[test]
    fn test_from_lookup() {
        let node = Node {
            id: NodeID(7),
            lat: 51.5,
            lon: -0.1,
        };
        assert_eq!(
            Resolution::from_lookup(Ok(Some(node))),
            Resolution::Found(node)
        );
        assert_eq!(Resolution::from_lookup(Ok(None)), Resolution::NotFound);

        let nowhere = Node {
            lat: f64::NAN,
            ..node
        };
        assert_eq!(
            Resolution::from_lookup(Ok(Some(nowhere))),
            Resolution::NotFound
        );

        let err = anyhow!("connection refused").context("nearest-node request failed");
        assert_eq!(
            Resolution::from_lookup(Err(err)),
            Resolution::ServiceUnavailable(
                "nearest-node request failed: connection refused".to_string()
            )
        );
    }
}
