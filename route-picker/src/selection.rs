use std::fmt;

use serde::{Deserialize, Serialize};

use route_picker_graph::{BoundingBox, Node, NodeID};

use crate::config::PickerConfig;
use crate::geometry::{bounding_box, geo_circle, GeoPolygon};
use crate::service::Resolution;

/// The layer id the renderer reports when a click lands inside the selection radius
pub const SELECTION_RADIUS_LAYER: &str = "selection-radius";

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[serde(transparent)]
pub struct RequestID(pub u32);

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[serde(transparent)]
pub struct TimerID(pub u32);

/// A pointer click, as reported by the map renderer
#[derive(Clone, Debug, PartialEq)]
pub struct ClickEvent {
    /// `[lon, lat]`
    pub coordinate: [f64; 2],
    /// The id of the layer under the pointer, if any
    pub layer: Option<String>,
    pub right_button: bool,
}

impl ClickEvent {
    pub fn lon(&self) -> f64 {
        self.coordinate[0]
    }

    pub fn lat(&self) -> f64 {
        self.coordinate[1]
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FadeDirection {
    In,
    Out,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Fade {
    pub direction: FadeDirection,
    /// On the host's clock
    pub started_ms: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SelectionState {
    pub start_node: Option<Node>,
    pub end_node: Option<Node>,
    pub selection_radius: Option<GeoPolygon>,
    /// Only ever true once a lookup has outlasted the loading delay
    pub loading: bool,
    pub fade: Fade,
}

impl Default for SelectionState {
    fn default() -> Self {
        Self {
            start_node: None,
            end_node: None,
            selection_radius: None,
            loading: false,
            fade: Fade {
                direction: FadeDirection::Out,
                started_ms: f64::NEG_INFINITY,
            },
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Start,
    End,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Phase {
    Idle,
    ResolvingStart,
    ResolvingEnd,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub enum FeedbackLevel {
    Info,
    Error,
}

/// Something to tell the user. None of these corrupt the selection.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail")]
pub enum Feedback {
    OutsideRadius,
    StillLoading,
    NoNodeNearby,
    ServiceUnavailable(String),
}

impl Feedback {
    pub fn level(&self) -> FeedbackLevel {
        match self {
            Feedback::ServiceUnavailable(_) => FeedbackLevel::Error,
            _ => FeedbackLevel::Info,
        }
    }
}

impl fmt::Display for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feedback::OutsideRadius => write!(f, "Please select a point inside the radius."),
            Feedback::StillLoading => write!(f, "Please wait for all data to load."),
            Feedback::NoNodeNearby => write!(
                f,
                "No path was found in the vicinity, please try another location."
            ),
            Feedback::ServiceUnavailable(msg) => {
                write!(f, "The routing service is unavailable: {msg}")
            }
        }
    }
}

/// Side effects for the host to carry out. Completions come back as `Event`s.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Effect {
    /// Deliver `Event::LoadingDelayElapsed(timer)` after the delay, unless cancelled first
    StartLoadingTimer { timer: TimerID, delay_ms: u64 },
    CancelLoadingTimer { timer: TimerID },
    /// Deliver `Event::Resolved` with this request id when the lookup finishes
    ResolveNode { request: RequestID, lat: f64, lon: f64 },
    /// The result of this request will be ignored; the host may abort it
    CancelResolve { request: RequestID },
    /// Fire-and-forget fetch of the data around a new start node
    FetchRegion { root: Node, bbox: BoundingBox },
    Notify { feedback: Feedback },
    /// The visible state changed
    Redraw,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Click { click: ClickEvent, now_ms: f64 },
    Resolved {
        request: RequestID,
        resolution: Resolution,
    },
    LoadingDelayElapsed(TimerID),
    Reset { now_ms: f64 },
}

// The loading timer belonging to one gesture. It isn't Clone or Copy, and the only way to get rid
// of it is `release`, so every path that ends a gesture has to emit the cancellation.
#[must_use]
#[derive(Debug)]
struct LoadingTimer(TimerID);

impl LoadingTimer {
    fn release(self) -> Effect {
        Effect::CancelLoadingTimer { timer: self.0 }
    }
}

#[derive(Debug)]
enum Gesture {
    Idle,
    Resolving {
        target: Target,
        request: RequestID,
        timer: LoadingTimer,
    },
}

/// Turns clicks into validated start and end nodes. This owns the only mutable selection state;
/// the host feeds it events and executes the effects it returns.
pub struct SelectionCoordinator {
    config: PickerConfig,
    state: SelectionState,
    gesture: Gesture,
    next_request: u32,
    next_timer: u32,
}

impl SelectionCoordinator {
    pub fn new(config: PickerConfig) -> Self {
        Self {
            config,
            state: SelectionState::default(),
            gesture: Gesture::Idle,
            next_request: 0,
            next_timer: 0,
        }
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    pub fn config(&self) -> &PickerConfig {
        &self.config
    }

    /// Applies to future gestures; the current selection isn't recalculated.
    pub fn set_config(&mut self, config: PickerConfig) {
        self.config = config;
    }

    pub fn phase(&self) -> Phase {
        match self.gesture {
            Gesture::Idle => Phase::Idle,
            Gesture::Resolving {
                target: Target::Start,
                ..
            } => Phase::ResolvingStart,
            Gesture::Resolving {
                target: Target::End,
                ..
            } => Phase::ResolvingEnd,
        }
    }

    /// True if region data fetched for `root` is still relevant
    pub fn is_current_start(&self, root: NodeID) -> bool {
        self.state.start_node.map(|n| n.id) == Some(root)
    }

    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::Click { click, now_ms } => self.on_click(click, now_ms),
            Event::Resolved {
                request,
                resolution,
            } => self.on_resolved(request, resolution),
            Event::LoadingDelayElapsed(timer) => self.on_loading_delay_elapsed(timer),
            Event::Reset { now_ms } => self.reset(now_ms),
        }
    }

    pub fn on_click(&mut self, click: ClickEvent, now_ms: f64) -> Vec<Effect> {
        let mut effects = Vec::new();

        // Any click shows the radius, whether or not the click turns out to be legal
        if self.state.fade.direction != FadeDirection::In {
            self.state.fade = Fade {
                direction: FadeDirection::In,
                started_ms: now_ms,
            };
            effects.push(Effect::Redraw);
        }

        if click.right_button {
            if click.layer.as_deref() != Some(SELECTION_RADIUS_LAYER) {
                notify(&mut effects, Feedback::OutsideRadius);
                return effects;
            }
            if self.state.loading || matches!(self.gesture, Gesture::Resolving { .. }) {
                notify(&mut effects, Feedback::StillLoading);
                return effects;
            }
            self.begin(Target::End, &click, &mut effects);
            return effects;
        }

        // The latest left click wins over anything still in flight
        if let Gesture::Resolving { request, timer, .. } =
            std::mem::replace(&mut self.gesture, Gesture::Idle)
        {
            log::debug!("Superseding lookup {:?}", request);
            effects.push(Effect::CancelResolve { request });
            effects.push(timer.release());
        }
        self.begin(Target::Start, &click, &mut effects);
        effects
    }

    pub fn on_loading_delay_elapsed(&mut self, timer: TimerID) -> Vec<Effect> {
        match &self.gesture {
            Gesture::Resolving {
                timer: LoadingTimer(current),
                ..
            } if *current == timer => {
                if self.state.loading {
                    Vec::new()
                } else {
                    self.state.loading = true;
                    vec![Effect::Redraw]
                }
            }
            _ => {
                log::debug!("Ignoring stale loading timer {:?}", timer);
                Vec::new()
            }
        }
    }

    pub fn on_resolved(&mut self, request: RequestID, resolution: Resolution) -> Vec<Effect> {
        let target = match &self.gesture {
            Gesture::Resolving {
                target,
                request: current,
                ..
            } if *current == request => *target,
            _ => {
                log::debug!("Ignoring result of stale lookup {:?}", request);
                return Vec::new();
            }
        };

        let mut effects = Vec::new();
        let mut changed = false;
        if let Gesture::Resolving { timer, .. } = std::mem::replace(&mut self.gesture, Gesture::Idle)
        {
            effects.push(timer.release());
        }
        if self.state.loading {
            self.state.loading = false;
            changed = true;
        }

        match resolution {
            Resolution::Found(node) => {
                match target {
                    Target::Start => self.commit_start(node, &mut effects),
                    Target::End => {
                        log::info!("End node is {:?}", node.id);
                        self.state.end_node = Some(node);
                    }
                }
                changed = true;
            }
            Resolution::NotFound => notify(&mut effects, Feedback::NoNodeNearby),
            Resolution::ServiceUnavailable(msg) => {
                notify(&mut effects, Feedback::ServiceUnavailable(msg))
            }
        }

        if changed {
            effects.push(Effect::Redraw);
        }
        effects
    }

    /// Forgets the whole selection, abandoning any lookup in flight, and fades the radius out.
    pub fn reset(&mut self, now_ms: f64) -> Vec<Effect> {
        let mut effects = Vec::new();
        if let Gesture::Resolving { request, timer, .. } =
            std::mem::replace(&mut self.gesture, Gesture::Idle)
        {
            effects.push(Effect::CancelResolve { request });
            effects.push(timer.release());
        }
        self.state = SelectionState {
            fade: Fade {
                direction: FadeDirection::Out,
                started_ms: now_ms,
            },
            ..SelectionState::default()
        };
        effects.push(Effect::Redraw);
        effects
    }

    fn begin(&mut self, target: Target, click: &ClickEvent, effects: &mut Vec<Effect>) {
        let request = RequestID(self.next_request);
        self.next_request += 1;
        let timer = TimerID(self.next_timer);
        self.next_timer += 1;

        effects.push(Effect::StartLoadingTimer {
            timer,
            delay_ms: self.config.loading_delay_ms,
        });
        effects.push(Effect::ResolveNode {
            request,
            lat: click.lat(),
            lon: click.lon(),
        });
        self.gesture = Gesture::Resolving {
            target,
            request,
            timer: LoadingTimer(timer),
        };
    }

    fn commit_start(&mut self, node: Node, effects: &mut Vec<Effect>) {
        log::info!("Start node is {:?} at ({}, {})", node.id, node.lat, node.lon);
        // A new start invalidates any end picked inside the old radius
        self.state.start_node = Some(node);
        self.state.end_node = None;

        let circle = geo_circle(
            node.to_coord(),
            self.config.selection_radius_meters,
            self.config.circle_vertices,
        );
        match bounding_box(&circle) {
            Some(bbox) => effects.push(Effect::FetchRegion { root: node, bbox }),
            None => log::error!("Selection radius around {:?} is empty", node.id),
        }
        self.state.selection_radius = Some(circle);
    }
}

fn notify(effects: &mut Vec<Effect>, feedback: Feedback) {
    match feedback.level() {
        FeedbackLevel::Info => log::info!("{feedback}"),
        FeedbackLevel::Error => log::error!("{feedback}"),
    }
    effects.push(Effect::Notify { feedback });
}
