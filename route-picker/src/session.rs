//! Runs a `SelectionCoordinator` on a tokio task, carrying out its effects: timers and lookups
//! become spawned tasks, region data goes to a `RegionListener`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use route_picker_graph::{BoundingBox, Node, RegionLoaded};

use crate::config::PickerConfig;
use crate::selection::{
    ClickEvent, Effect, Feedback, Phase, RequestID, SelectionCoordinator, SelectionState, TimerID,
};
use crate::service::{resolve_nearest_node, NodeService, RegionDataSource, Resolution};

/// Where data about the area around a new start node ends up. This is the hook for building a
/// routable graph; nothing here consumes the data itself.
pub trait RegionListener: Send {
    fn on_region_data(&mut self, root: &Node, bbox: BoundingBox, data: serde_json::Value);

    /// The service has loaded the street graph around `root`
    fn on_region_loaded(&mut self, root: &Node, loaded: RegionLoaded) {
        log::debug!("Service loaded {:?} around {:?}", loaded.bounds, root.id);
    }
}

/// Just logs what arrived
pub struct LogRegionData;

impl RegionListener for LogRegionData {
    fn on_region_data(&mut self, root: &Node, bbox: BoundingBox, data: serde_json::Value) {
        let elements = data
            .get("elements")
            .and_then(|x| x.as_array())
            .map(|x| x.len())
            .unwrap_or(0);
        log::info!(
            "Got {} elements around {:?} in {:?}",
            elements,
            root.id,
            bbox
        );
    }

    fn on_region_loaded(&mut self, root: &Node, loaded: RegionLoaded) {
        log::info!(
            "Service loaded the graph in {:?} around {:?}: {}",
            loaded.bounds,
            root.id,
            loaded.message
        );
    }
}

pub enum Input {
    Click(ClickEvent),
    Reset,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub state: SelectionState,
    pub phase: Phase,
    /// How many `Input`s the session has processed so far
    pub inputs_handled: u64,
}

impl Snapshot {
    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle
    }
}

pub struct SessionHandle {
    inputs: mpsc::UnboundedSender<Input>,
    pub snapshots: watch::Receiver<Snapshot>,
    pub feedback: mpsc::UnboundedReceiver<Feedback>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// False if the session has stopped
    pub fn send(&self, input: Input) -> bool {
        self.inputs.send(input).is_ok()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    /// Stops accepting input and waits for the session to finish. Lookups still in flight are
    /// abandoned.
    pub async fn shutdown(self) {
        drop(self.inputs);
        if let Err(err) = self.task.await {
            log::error!("Session task failed: {err}");
        }
    }
}

// Aborts the task when dropped, so forgetting a timer or lookup is the same as cancelling it
struct TaskGuard(JoinHandle<()>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

enum Completion {
    TimerFired(TimerID),
    Resolved(RequestID, Resolution),
    RegionData(Node, BoundingBox, serde_json::Value),
    RegionLoaded(Node, RegionLoaded),
}

pub struct Session {
    coordinator: SelectionCoordinator,
    service: Arc<dyn NodeService>,
    region_source: Arc<dyn RegionDataSource>,
    listener: Box<dyn RegionListener>,
    fetch_region_graph: bool,

    started: Instant,
    inputs_handled: u64,
    timers: HashMap<TimerID, TaskGuard>,
    lookups: HashMap<RequestID, TaskGuard>,
    completions: mpsc::UnboundedSender<Completion>,
    snapshots: watch::Sender<Snapshot>,
    feedback: mpsc::UnboundedSender<Feedback>,
}

impl Session {
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        config: PickerConfig,
        service: Arc<dyn NodeService>,
        region_source: Arc<dyn RegionDataSource>,
        listener: Box<dyn RegionListener>,
    ) -> SessionHandle {
        let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (feedback_tx, feedback_rx) = mpsc::unbounded_channel();

        let fetch_region_graph = config.fetch_region_graph;
        let coordinator = SelectionCoordinator::new(config);
        let (snapshots_tx, snapshots_rx) = watch::channel(Snapshot {
            state: coordinator.state().clone(),
            phase: coordinator.phase(),
            inputs_handled: 0,
        });

        let session = Session {
            coordinator,
            service,
            region_source,
            listener,
            fetch_region_graph,
            started: Instant::now(),
            inputs_handled: 0,
            timers: HashMap::new(),
            lookups: HashMap::new(),
            completions: completions_tx,
            snapshots: snapshots_tx,
            feedback: feedback_tx,
        };
        let task = tokio::spawn(session.run(inputs_rx, completions_rx));

        SessionHandle {
            inputs: inputs_tx,
            snapshots: snapshots_rx,
            feedback: feedback_rx,
            task,
        }
    }

    async fn run(
        mut self,
        mut inputs: mpsc::UnboundedReceiver<Input>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
    ) {
        loop {
            tokio::select! {
                input = inputs.recv() => {
                    let Some(input) = input else {
                        break;
                    };
                    let now_ms = self.now_ms();
                    let effects = match input {
                        Input::Click(click) => self.coordinator.on_click(click, now_ms),
                        Input::Reset => self.coordinator.reset(now_ms),
                    };
                    self.inputs_handled += 1;
                    self.apply(effects);
                }
                // Never closed, since we hold a sender
                Some(completion) = completions.recv() => {
                    self.on_completion(completion);
                }
            }
        }
        log::debug!("Session input closed, stopping");
    }

    fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::TimerFired(timer) => {
                self.timers.remove(&timer);
                let effects = self.coordinator.on_loading_delay_elapsed(timer);
                self.apply(effects);
            }
            Completion::Resolved(request, resolution) => {
                self.lookups.remove(&request);
                let effects = self.coordinator.on_resolved(request, resolution);
                self.apply(effects);
            }
            Completion::RegionData(root, bbox, data) => {
                if self.coordinator.is_current_start(root.id) {
                    self.listener.on_region_data(&root, bbox, data);
                } else {
                    log::debug!("Dropping region data for replaced start {:?}", root.id);
                }
            }
            Completion::RegionLoaded(root, loaded) => {
                if self.coordinator.is_current_start(root.id) {
                    self.listener.on_region_loaded(&root, loaded);
                } else {
                    log::debug!("Dropping region graph for replaced start {:?}", root.id);
                }
            }
        }
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::StartLoadingTimer { timer, delay_ms } => {
                    let tx = self.completions.clone();
                    let handle = tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        let _ = tx.send(Completion::TimerFired(timer));
                    });
                    self.timers.insert(timer, TaskGuard(handle));
                }
                Effect::CancelLoadingTimer { timer } => {
                    self.timers.remove(&timer);
                }
                Effect::ResolveNode { request, lat, lon } => {
                    let tx = self.completions.clone();
                    let service = Arc::clone(&self.service);
                    let handle = tokio::spawn(async move {
                        let resolution = resolve_nearest_node(service.as_ref(), lat, lon).await;
                        let _ = tx.send(Completion::Resolved(request, resolution));
                    });
                    self.lookups.insert(request, TaskGuard(handle));
                }
                Effect::CancelResolve { request } => {
                    self.lookups.remove(&request);
                }
                Effect::FetchRegion { root, bbox } => self.fetch_region(root, bbox),
                Effect::Notify { feedback } => {
                    // Nobody listening is fine
                    let _ = self.feedback.send(feedback);
                }
                // Snapshots are published after every batch anyway
                Effect::Redraw => {}
            }
        }

        self.snapshots.send_replace(Snapshot {
            state: self.coordinator.state().clone(),
            phase: self.coordinator.phase(),
            inputs_handled: self.inputs_handled,
        });
    }

    // Not tracked or cancelled; stale results are filtered when they arrive
    fn fetch_region(&self, root: Node, bbox: BoundingBox) {
        let tx = self.completions.clone();
        let source = Arc::clone(&self.region_source);
        tokio::spawn(async move {
            match source.fetch_region_data(bbox).await {
                Ok(data) => {
                    let _ = tx.send(Completion::RegionData(root, bbox, data));
                }
                Err(err) => log::warn!("Couldn't fetch data around {:?}: {err:#}", root.id),
            }
        });

        if self.fetch_region_graph {
            let tx = self.completions.clone();
            let service = Arc::clone(&self.service);
            tokio::spawn(async move {
                match service.graph_in_region(bbox, root.id).await {
                    Ok(loaded) => {
                        let _ = tx.send(Completion::RegionLoaded(root, loaded));
                    }
                    Err(err) => log::warn!("Couldn't load the graph around {:?}: {err:#}", root.id),
                }
            });
        }
    }

    fn now_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use anyhow::{anyhow, Result};
    use route_picker_graph::NodeID;

    use super::*;
    use crate::selection::SELECTION_RADIUS_LAYER;
    use crate::service::BoxFuture;

    // Answers every lookup with the next scripted reply, after its delay
    struct ScriptedService {
        replies: Mutex<Vec<(u64, Result<Option<Node>, String>)>>,
    }

    impl ScriptedService {
        fn new(mut replies: Vec<(u64, Result<Option<Node>, String>)>) -> Arc<Self> {
            replies.reverse();
            Arc::new(Self {
                replies: Mutex::new(replies),
            })
        }
    }

    impl NodeService for ScriptedService {
        fn nearest_node(&self, _: f64, _: f64) -> BoxFuture<'_, Result<Option<Node>>> {
            let (delay_ms, reply) = self
                .replies
                .lock()
                .unwrap()
                .pop()
                .expect("more lookups than scripted replies");
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                reply.map_err(|err| anyhow!(err))
            })
        }

        fn graph_in_region(&self, bbox: BoundingBox, _: NodeID) -> BoxFuture<'_, Result<RegionLoaded>> {
            Box::pin(async move {
                Ok(RegionLoaded {
                    status: "success".to_string(),
                    message: "Map data loaded successfully".to_string(),
                    bounds: bbox,
                })
            })
        }
    }

    struct EmptyRegion;

    impl RegionDataSource for EmptyRegion {
        fn fetch_region_data(&self, _: BoundingBox) -> BoxFuture<'_, Result<serde_json::Value>> {
            Box::pin(async { Ok(serde_json::json!({ "elements": [] })) })
        }
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<NodeID>>>);

    impl RegionListener for Recorder {
        fn on_region_data(&mut self, root: &Node, _: BoundingBox, _: serde_json::Value) {
            self.0.lock().unwrap().push(root.id);
        }
    }

    #[derive(Clone, Default)]
    struct LoadedRecorder(Arc<Mutex<Vec<(NodeID, BoundingBox)>>>);

    impl RegionListener for LoadedRecorder {
        fn on_region_data(&mut self, _: &Node, _: BoundingBox, _: serde_json::Value) {}

        fn on_region_loaded(&mut self, root: &Node, loaded: RegionLoaded) {
            self.0.lock().unwrap().push((root.id, loaded.bounds));
        }
    }

    fn node(id: i64) -> Node {
        Node {
            id: NodeID(id),
            lat: 51.5071,
            lon: -0.1269,
        }
    }

    fn left_click() -> Input {
        Input::Click(ClickEvent {
            coordinate: [-0.127, 51.507],
            layer: None,
            right_button: false,
        })
    }

    fn sleep_ms(ms: u64) -> tokio::time::Sleep {
        tokio::time::sleep(Duration::from_millis(ms))
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_lookup_shows_loading() {
        let recorder = Recorder::default();
        let handle = Session::spawn(
            PickerConfig::default(),
            ScriptedService::new(vec![(1000, Ok(Some(node(42))))]),
            Arc::new(EmptyRegion),
            Box::new(recorder.clone()),
        );

        handle.send(left_click());
        sleep_ms(100).await;
        assert_eq!(handle.snapshot().phase, Phase::ResolvingStart);
        assert!(!handle.snapshot().state.loading);

        sleep_ms(250).await;
        assert!(handle.snapshot().state.loading);

        sleep_ms(1000).await;
        let snapshot = handle.snapshot();
        assert!(snapshot.is_idle());
        assert!(!snapshot.state.loading);
        assert_eq!(snapshot.state.start_node, Some(node(42)));
        assert_eq!(*recorder.0.lock().unwrap(), vec![NodeID(42)]);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_lookup_never_shows_loading() {
        let mut handle = Session::spawn(
            PickerConfig::default(),
            ScriptedService::new(vec![(50, Ok(None))]),
            Arc::new(EmptyRegion),
            Box::new(LogRegionData),
        );

        handle.send(left_click());
        sleep_ms(100).await;
        assert!(handle.snapshot().is_idle());
        assert!(!handle.snapshot().state.loading);
        assert_eq!(handle.feedback.recv().await, Some(Feedback::NoNodeNearby));

        // The cancelled timer never fires
        sleep_ms(1000).await;
        assert!(!handle.snapshot().state.loading);
        assert_eq!(handle.snapshot().state.start_node, None);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_service_failure_clears_loading() {
        let mut handle = Session::spawn(
            PickerConfig::default(),
            ScriptedService::new(vec![
                (10, Ok(Some(node(1)))),
                (500, Err("connection refused".to_string())),
            ]),
            Arc::new(EmptyRegion),
            Box::new(LogRegionData),
        );

        handle.send(left_click());
        sleep_ms(50).await;
        assert_eq!(handle.snapshot().state.start_node, Some(node(1)));

        handle.send(Input::Click(ClickEvent {
            coordinate: [-0.12, 51.51],
            layer: Some(SELECTION_RADIUS_LAYER.to_string()),
            right_button: true,
        }));
        sleep_ms(400).await;
        assert!(handle.snapshot().state.loading);
        assert_eq!(handle.snapshot().phase, Phase::ResolvingEnd);

        sleep_ms(200).await;
        let snapshot = handle.snapshot();
        assert!(snapshot.is_idle());
        assert!(!snapshot.state.loading);
        assert_eq!(snapshot.state.start_node, Some(node(1)));
        assert_eq!(snapshot.state.end_node, None);
        assert_eq!(snapshot.inputs_handled, 2);
        assert_eq!(
            handle.feedback.recv().await,
            Some(Feedback::ServiceUnavailable("connection refused".to_string()))
        );

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_start_is_dropped() {
        let recorder = Recorder::default();
        let handle = Session::spawn(
            PickerConfig::default(),
            ScriptedService::new(vec![(500, Ok(Some(node(1)))), (100, Ok(Some(node(2))))]),
            Arc::new(EmptyRegion),
            Box::new(recorder.clone()),
        );

        handle.send(left_click());
        sleep_ms(10).await;
        handle.send(left_click());
        sleep_ms(1000).await;

        let snapshot = handle.snapshot();
        assert!(snapshot.is_idle());
        assert_eq!(snapshot.state.start_node, Some(node(2)));
        assert_eq!(*recorder.0.lock().unwrap(), vec![NodeID(2)]);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_region_graph_loaded_when_enabled() {
        let recorder = LoadedRecorder::default();
        let config = PickerConfig {
            fetch_region_graph: true,
            ..PickerConfig::default()
        };
        let handle = Session::spawn(
            config,
            ScriptedService::new(vec![(10, Ok(Some(node(7))))]),
            Arc::new(EmptyRegion),
            Box::new(recorder.clone()),
        );

        handle.send(left_click());
        sleep_ms(100).await;

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.state.start_node, Some(node(7)));
        let loaded = recorder.0.lock().unwrap().clone();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].0, NodeID(7));
        assert!(loaded[0].1.contains(node(7).lat, node(7).lon));

        handle.shutdown().await;
    }
}
