//! Pure geometry for the selection radius. Coordinates are WGS84 degrees; `Coord::x` is
//! longitude and `Coord::y` is latitude.

use std::f64::consts::PI;

use geo::{BoundingRect, Contains, Coord, LineString, Point, Polygon};

use route_picker_graph::BoundingBox;

// Length of one degree, in kilometers, at the equator
const KM_PER_DEGREE_LON: f64 = 111.320;
const KM_PER_DEGREE_LAT: f64 = 110.574;

/// A closed ring approximating a disk. The first and last vertices are always equal.
#[derive(Clone, Debug, PartialEq)]
pub struct GeoPolygon {
    ring: LineString,
}

impl GeoPolygon {
    pub fn vertices(&self) -> &[Coord] {
        &self.ring.0
    }

    /// `[lon, lat]` pairs, the way map renderers want a contour
    pub fn contour(&self) -> Vec<[f64; 2]> {
        self.ring.0.iter().map(|c| [c.x, c.y]).collect()
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        Polygon::new(self.ring.clone(), Vec::new()).contains(&Point::new(lon, lat))
    }
}

/// Builds a circle of `radius_meters` around `center` with `vertices` distinct points, plus the
/// closing point. Offsets are equirectangular, which is plenty accurate for a few kilometers.
///
/// The output only depends on the inputs, so the same start node always produces the same ring.
/// A non-positive radius collapses every vertex onto the center.
pub fn geo_circle(center: Coord, radius_meters: f64, vertices: usize) -> GeoPolygon {
    let vertices = vertices.max(3);
    let radius_km = radius_meters.max(0.0) / 1000.0;

    // Near the poles the longitude span blows up; never wider than the whole globe
    let cos_lat = center.y.to_radians().cos().abs().max(1e-9);
    let dx = (radius_km / (KM_PER_DEGREE_LON * cos_lat)).min(180.0);
    let dy = radius_km / KM_PER_DEGREE_LAT;

    let mut pts = Vec::with_capacity(vertices + 1);
    for i in 0..vertices {
        let theta = (i as f64 / vertices as f64) * 2.0 * PI;
        pts.push(Coord {
            x: center.x + dx * theta.cos(),
            y: center.y + dy * theta.sin(),
        });
    }
    pts.push(pts[0]);

    GeoPolygon {
        ring: LineString::new(pts),
    }
}

/// The axis-aligned box around every vertex, clamped to valid WGS84 ranges. A ring crossing a
/// pole or the antimeridian is cut off at the edge rather than wrapped. Only `None` for an empty
/// polygon, which `geo_circle` never produces.
pub fn bounding_box(polygon: &GeoPolygon) -> Option<BoundingBox> {
    let rect = polygon.ring.bounding_rect()?;
    Some(BoundingBox {
        min_lat: rect.min().y.clamp(-90.0, 90.0),
        min_lon: rect.min().x.clamp(-180.0, 180.0),
        max_lat: rect.max().y.clamp(-90.0, 90.0),
        max_lon: rect.max().x.clamp(-180.0, 180.0),
    })
}
