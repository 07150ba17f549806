//! Derives what the renderer should draw from the selection. Nothing here has side effects, so
//! it's fine to recompute on every state change or animation frame.

use geojson::{Feature, FeatureCollection, Geometry, Value};
use serde::Serialize;

use crate::config::{PickerConfig, Rgb, Rgba};
use crate::selection::{Fade, FadeDirection, SelectionState, Target, SELECTION_RADIUS_LAYER};

pub const MARKERS_LAYER: &str = "start-end-points";
const RADIUS_LINE_WIDTH: f64 = 3.0;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RenderLayers {
    pub basemap: BaseMap,
    pub selection_radius: PolygonLayer,
    pub markers: PointLayer,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BaseMap {
    pub style: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PolygonLayer {
    pub id: &'static str,
    /// Each contour is a closed ring of `[lon, lat]`. Empty when there's nothing to draw.
    pub polygons: Vec<Vec<[f64; 2]>>,
    pub opacity: f64,
    pub fill_color: Rgba,
    pub line_color: Rgba,
    pub line_width: f64,
    pub pickable: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PointLayer {
    pub id: &'static str,
    pub points: Vec<Marker>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Marker {
    pub kind: Target,
    /// `[lon, lat]`
    pub position: [f64; 2],
    pub fill: Rgb,
    pub border: Rgb,
}

pub fn project(state: &SelectionState, config: &PickerConfig, now_ms: f64) -> RenderLayers {
    let colors = &config.colors;

    let mut points = Vec::new();
    if let Some(node) = state.start_node {
        points.push(Marker {
            kind: Target::Start,
            position: [node.lon, node.lat],
            fill: colors.start_node_fill,
            border: colors.start_node_border,
        });
    }
    if let Some(node) = state.end_node {
        points.push(Marker {
            kind: Target::End,
            position: [node.lon, node.lat],
            fill: colors.end_node_fill,
            border: colors.end_node_border,
        });
    }

    RenderLayers {
        basemap: BaseMap {
            style: config.map_style.clone(),
        },
        selection_radius: PolygonLayer {
            id: SELECTION_RADIUS_LAYER,
            polygons: state
                .selection_radius
                .iter()
                .map(|polygon| polygon.contour())
                .collect(),
            opacity: fade_opacity(&state.fade, config.fade_duration_ms, now_ms),
            fill_color: colors.radius_fill,
            line_color: colors.radius_line,
            line_width: RADIUS_LINE_WIDTH,
            pickable: true,
        },
        markers: PointLayer {
            id: MARKERS_LAYER,
            points,
        },
    }
}

/// Linear between 0 and 1 over `duration_ms`
pub fn fade_opacity(fade: &Fade, duration_ms: f64, now_ms: f64) -> f64 {
    let progress = if duration_ms <= 0.0 {
        1.0
    } else {
        ((now_ms - fade.started_ms) / duration_ms).clamp(0.0, 1.0)
    };
    match fade.direction {
        FadeDirection::In => progress,
        FadeDirection::Out => 1.0 - progress,
    }
}

/// Which layer a click at this position would hit. Hosts with a real renderer get this from its
/// picking instead.
pub fn hit_test(state: &SelectionState, lon: f64, lat: f64) -> Option<&'static str> {
    let radius = state.selection_radius.as_ref()?;
    if radius.contains(lon, lat) {
        Some(SELECTION_RADIUS_LAYER)
    } else {
        None
    }
}

impl RenderLayers {
    pub fn to_geojson(&self) -> FeatureCollection {
        let mut features = Vec::new();

        for contour in &self.selection_radius.polygons {
            let ring = contour.iter().map(|pt| pt.to_vec()).collect();
            let mut f = Feature::from(Geometry::new(Value::Polygon(vec![ring])));
            f.set_property("layer", self.selection_radius.id);
            f.set_property("opacity", self.selection_radius.opacity);
            f.set_property("fill", self.selection_radius.fill_color.to_vec());
            f.set_property("stroke", self.selection_radius.line_color.to_vec());
            features.push(f);
        }

        // Markers last, so they're drawn over the radius
        for marker in &self.markers.points {
            let mut f = Feature::from(Geometry::new(Value::Point(marker.position.to_vec())));
            f.set_property("layer", self.markers.id);
            f.set_property(
                "type",
                match marker.kind {
                    Target::Start => "start",
                    Target::End => "end",
                },
            );
            f.set_property("fill", marker.fill.to_vec());
            f.set_property("border", marker.border.to_vec());
            features.push(f);
        }

        features.into_iter().collect()
    }
}
