use geo::Coord;
use serde::{Deserialize, Serialize};

/// A graph vertex returned by the geocoding service. Once resolved, a node is never mutated.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Debug)]
pub struct Node {
    pub id: NodeID,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[serde(transparent)]
pub struct NodeID(pub i64);

/// Field names match the backend's `/bounding-box` request body and the `bounds` it echoes back.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Debug)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

/// The service's answer to `/bounding-box`. The street graph itself stays in the service's
/// storage; this only acknowledges which area got loaded.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct RegionLoaded {
    pub status: String,
    #[serde(default)]
    pub message: String,
    pub bounds: BoundingBox,
}

impl Node {
    /// x is longitude, y is latitude
    pub fn to_coord(&self) -> Coord {
        Coord {
            x: self.lon,
            y: self.lat,
        }
    }

    pub fn has_valid_position(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

impl BoundingBox {
    pub fn is_valid(&self) -> bool {
        self.min_lat <= self.max_lat && self.min_lon <= self.max_lon
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lon..=self.max_lon).contains(&lon)
    }
}

impl RegionLoaded {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}
