use wasm_bindgen::prelude::*;

use route_picker_graph::{Node, NodeID};

pub use config::{Colors, PickerConfig, Rgb, Rgba};
pub use geometry::{bounding_box, geo_circle, GeoPolygon};
pub use projection::{
    fade_opacity, hit_test, project, BaseMap, Marker, PointLayer, PolygonLayer, RenderLayers,
    MARKERS_LAYER,
};
pub use selection::{
    ClickEvent, Effect, Event, Fade, FadeDirection, Feedback, FeedbackLevel, Phase, RequestID,
    SelectionCoordinator, SelectionState, Target, TimerID, SELECTION_RADIUS_LAYER,
};
pub use service::{resolve_nearest_node, NodeService, RegionDataSource, Resolution};
pub use view::{CameraTransition, GeolocationError, Position, ViewController, ViewState};

mod config;
mod geometry;
#[cfg(not(target_arch = "wasm32"))]
pub mod http;
mod projection;
mod selection;
pub mod service;
#[cfg(not(target_arch = "wasm32"))]
pub mod session;
mod view;

#[cfg(target_arch = "wasm32")]
static START: std::sync::Once = std::sync::Once::new();

/// The browser-facing side. The host executes the returned effects (timers, fetches) itself and
/// reports back through the `on*` methods.
#[wasm_bindgen]
pub struct JsNodePicker {
    coordinator: SelectionCoordinator,
    view: ViewController,
}

#[wasm_bindgen]
impl JsNodePicker {
    #[wasm_bindgen(constructor)]
    pub fn new() -> JsNodePicker {
        #[cfg(target_arch = "wasm32")]
        START.call_once(|| {
            // Panics shouldn't happen, but if they do, console.log them.
            console_error_panic_hook::set_once();
            console_log::init_with_level(log::Level::Info).unwrap();
        });

        let config = PickerConfig::default();
        Self {
            view: ViewController::new(&config),
            coordinator: SelectionCoordinator::new(config),
        }
    }

    /// Only affects later clicks and the camera for the next device position.
    #[wasm_bindgen(js_name = setConfig)]
    pub fn set_config(&mut self, input: JsValue) {
        match serde_wasm_bindgen::from_value::<PickerConfig>(input) {
            Ok(config) => {
                self.view = ViewController::new(&config);
                self.coordinator.set_config(config);
            }
            Err(err) => {
                log::warn!("Bad input to setConfig: {}", err);
            }
        }
    }

    /// Returns the effects to execute, as JSON
    #[wasm_bindgen(js_name = onClick)]
    pub fn on_click(
        &mut self,
        lon: f64,
        lat: f64,
        right_button: bool,
        layer_id: Option<String>,
        now_ms: f64,
    ) -> Result<String, JsValue> {
        let click = ClickEvent {
            coordinate: [lon, lat],
            layer: layer_id,
            right_button,
        };
        effects_to_json(self.coordinator.on_click(click, now_ms))
    }

    /// `node_json` is the service's answer; null or undefined means nothing was nearby.
    #[wasm_bindgen(js_name = onNodeResolved)]
    pub fn on_node_resolved(
        &mut self,
        request: u32,
        node_json: Option<String>,
    ) -> Result<String, JsValue> {
        let lookup = match node_json {
            Some(raw) => {
                serde_json::from_str::<Option<Node>>(&raw).map_err(|err| anyhow::anyhow!(err))
            }
            None => Ok(None),
        };
        let resolution = Resolution::from_lookup(lookup);
        effects_to_json(self.coordinator.on_resolved(RequestID(request), resolution))
    }

    #[wasm_bindgen(js_name = onServiceError)]
    pub fn on_service_error(&mut self, request: u32, message: String) -> Result<String, JsValue> {
        effects_to_json(
            self.coordinator
                .on_resolved(RequestID(request), Resolution::ServiceUnavailable(message)),
        )
    }

    #[wasm_bindgen(js_name = onLoadingDelayElapsed)]
    pub fn on_loading_delay_elapsed(&mut self, timer: u32) -> Result<String, JsValue> {
        effects_to_json(self.coordinator.on_loading_delay_elapsed(TimerID(timer)))
    }

    #[wasm_bindgen(js_name = reset)]
    pub fn reset(&mut self, now_ms: f64) -> Result<String, JsValue> {
        effects_to_json(self.coordinator.reset(now_ms))
    }

    /// Region data fetched for an older start node should be dropped
    #[wasm_bindgen(js_name = isCurrentStart)]
    pub fn is_current_start(&self, node_id: i64) -> bool {
        self.coordinator.is_current_start(NodeID(node_id))
    }

    #[wasm_bindgen(js_name = isLoading)]
    pub fn is_loading(&self) -> bool {
        self.coordinator.state().loading
    }

    #[wasm_bindgen(js_name = hitTest)]
    pub fn hit_test(&self, lon: f64, lat: f64) -> Option<String> {
        hit_test(self.coordinator.state(), lon, lat).map(|id| id.to_string())
    }

    /// The layers as plain JSON, for deck.gl style renderers
    #[wasm_bindgen(js_name = renderLayers)]
    pub fn render_layers(&self, now_ms: f64) -> Result<String, JsValue> {
        let layers = project(self.coordinator.state(), self.coordinator.config(), now_ms);
        serde_json::to_string(&layers).map_err(err_to_js)
    }

    #[wasm_bindgen(js_name = renderGeojson)]
    pub fn render_geojson(&self, now_ms: f64) -> Result<String, JsValue> {
        let layers = project(self.coordinator.state(), self.coordinator.config(), now_ms);
        serde_json::to_string_pretty(&layers.to_geojson()).map_err(err_to_js)
    }

    #[wasm_bindgen(js_name = initialView)]
    pub fn initial_view(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.view.view()).map_err(err_to_js)
    }

    /// Returns a camera transition as JSON, or nothing if the position is unusable
    #[wasm_bindgen(js_name = onGeolocation)]
    pub fn on_geolocation(&mut self, lon: f64, lat: f64) -> Result<Option<String>, JsValue> {
        let position = Position {
            latitude: lat,
            longitude: lon,
        };
        match self.view.on_position(Ok(position)) {
            Some(transition) => serde_json::to_string(&transition)
                .map(Some)
                .map_err(err_to_js),
            None => Ok(None),
        }
    }

    /// `code` is the browser's GeolocationPositionError code
    #[wasm_bindgen(js_name = onGeolocationError)]
    pub fn on_geolocation_error(&mut self, code: u16) {
        let err = match code {
            1 => GeolocationError::PermissionDenied,
            3 => GeolocationError::Timeout,
            _ => GeolocationError::PositionUnavailable,
        };
        self.view.on_position(Err(err));
    }
}

impl Default for JsNodePicker {
    fn default() -> Self {
        Self::new()
    }
}

fn effects_to_json(effects: Vec<Effect>) -> Result<String, JsValue> {
    serde_json::to_string(&effects).map_err(err_to_js)
}

fn err_to_js<E: std::fmt::Display>(err: E) -> JsValue {
    JsValue::from_str(&err.to_string())
}
