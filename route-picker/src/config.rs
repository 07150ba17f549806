use serde::{Deserialize, Serialize};

use crate::view::ViewState;

pub type Rgb = [u8; 3];
pub type Rgba = [u8; 4];

/// Missing fields fall back to the defaults, so callers can pass partial JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PickerConfig {
    /// Radius of the circle around the start node where an end node may be picked
    pub selection_radius_meters: f64,
    pub circle_vertices: usize,
    /// How long a lookup may run before the loading indicator is shown
    pub loading_delay_ms: u64,
    pub fade_duration_ms: f64,
    pub fly_to_zoom: f64,
    pub fly_to_duration_ms: u64,
    pub initial_view: ViewState,
    pub map_style: String,
    /// Also ask the service for the street graph around each new start node
    pub fetch_region_graph: bool,
    pub colors: Colors,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Colors {
    pub start_node_fill: Rgb,
    pub start_node_border: Rgb,
    pub end_node_fill: Rgb,
    pub end_node_border: Rgb,
    pub radius_fill: Rgba,
    pub radius_line: Rgba,
}

impl Default for PickerConfig {
    fn default() -> Self {
        Self {
            selection_radius_meters: 5_000.0,
            circle_vertices: 32,
            loading_delay_ms: 300,
            fade_duration_ms: 400.0,
            fly_to_zoom: 13.0,
            fly_to_duration_ms: 1000,
            initial_view: ViewState::default(),
            map_style: "./map_style.json".to_string(),
            fetch_region_graph: false,
            colors: Colors::default(),
        }
    }
}

impl Default for Colors {
    fn default() -> Self {
        Self {
            start_node_fill: [70, 183, 128],
            start_node_border: [255, 255, 255],
            end_node_fill: [152, 4, 12],
            end_node_border: [0, 0, 0],
            radius_fill: [80, 210, 0, 10],
            radius_line: [9, 142, 46, 175],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config() {
        let config: PickerConfig =
            serde_json::from_str(r#"{"loading_delay_ms": 50, "colors": {"end_node_fill": [1, 2, 3]}}"#)
                .unwrap();
        assert_eq!(config.loading_delay_ms, 50);
        assert_eq!(config.circle_vertices, 32);
        assert_eq!(config.colors.end_node_fill, [1, 2, 3]);
        assert_eq!(config.colors.start_node_fill, [70, 183, 128]);
        assert_eq!(config.initial_view, ViewState::default());
    }
}
