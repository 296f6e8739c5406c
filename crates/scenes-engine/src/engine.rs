//! Scene engine: registry, event routing, and debounced publication
//!
//! All mutation happens on one worker task fed by an unbounded queue, so
//! entity events, commands, reloads and timer firings are processed in
//! arrival order with no interleaving. The public handle only enqueues;
//! `is_active` reads a concurrently shared map of published booleans.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use scenes_core::{
    EngineOptions, EntityId, EntitySnapshot, PatternList, SceneDefinition, SCENE_DOMAIN,
};
use scenes_match::{DependencyIndex, SceneActivityTracker};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};

use crate::resolver::{guess_candidates, SceneEntityResolver};
use crate::settle::{DeadlineOutcome, SettleState};

/// Capacity of the active-changed broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Service that applies a scene when called
const SERVICE_TURN_ON: &str = "turn_on";

/// Error from a host command collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct CommandError(pub String);

/// Commands the engine issues to the host.
///
/// Calls are fire-and-forget: the engine has already committed to its
/// optimistic window when a command is dispatched, so failures are logged
/// and never roll back the state machine.
#[async_trait::async_trait]
pub trait SceneCommands: Send + Sync {
    /// Apply a scene via its backing host scene entity
    async fn activate_scene(&self, scene_entity: &EntityId) -> Result<(), CommandError>;

    /// Turn off the given member entities
    async fn turn_off(&self, entities: &[EntityId]) -> Result<(), CommandError>;
}

/// Notification sent when a scene's published boolean changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveChanged {
    pub scene_id: String,
    pub active: bool,
}

/// Per-scene problem found during a load. Never fatal: the offending scene
/// is skipped or degraded and the rest of the load proceeds.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SceneIssue {
    #[error("duplicate scene id '{id}'; keeping the first definition")]
    DuplicateId { id: String },

    #[error("scene '{id}' shares slug '{slug}' with scene '{other}'")]
    DuplicateSlug {
        id: String,
        slug: String,
        other: String,
    },
}

/// A host service call observed by the engine.
///
/// Used to detect scene activations made by external callers, so their
/// optimistic window applies even though this engine did not issue them.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceCallInfo {
    pub domain: String,
    pub service: String,
    pub entity_ids: Vec<EntityId>,
    /// Transition length (seconds) declared on the call, when any
    pub transition: Option<f64>,
}

impl ServiceCallInfo {
    /// Parse from raw service call data. Entity ids may appear under
    /// `target.entity_id` or `service_data.entity_id`, as a string or a
    /// list; malformed ids are dropped.
    pub fn from_call_data(domain: &str, service: &str, data: &serde_json::Value) -> Self {
        let mut entity_ids = Vec::new();
        for section in ["target", "service_data"] {
            collect_entity_ids(
                data.get(section).and_then(|s| s.get("entity_id")),
                &mut entity_ids,
            );
        }

        let transition = data
            .get("service_data")
            .and_then(|s| s.get("transition"))
            .and_then(serde_json::Value::as_f64);

        Self {
            domain: domain.to_string(),
            service: service.to_string(),
            entity_ids,
            transition,
        }
    }
}

fn collect_entity_ids(value: Option<&serde_json::Value>, out: &mut Vec<EntityId>) {
    match value {
        Some(serde_json::Value::String(s)) => out.extend(s.parse::<EntityId>().ok()),
        Some(serde_json::Value::Array(items)) => out.extend(
            items
                .iter()
                .filter_map(|v| v.as_str())
                .filter_map(|s| s.parse::<EntityId>().ok()),
        ),
        _ => {}
    }
}

enum EngineMsg {
    Load {
        definitions: Vec<SceneDefinition>,
        scene_registry: Vec<EntitySnapshot>,
        reply: oneshot::Sender<Vec<SceneIssue>>,
    },
    EntityEvent(EntitySnapshot),
    ServiceCall(ServiceCallInfo),
    Activate(String),
    Deactivate(String),
    SceneEntity {
        scene_id: String,
        reply: oneshot::Sender<Option<EntityId>>,
    },
    Deadline {
        scene_id: String,
        epoch: u64,
    },
}

/// Handle to a running scene engine.
///
/// Cloneable and cheap to share. All methods enqueue onto the engine's
/// serialized worker; the worker stops once every handle is dropped.
#[derive(Clone)]
pub struct SceneEngine {
    tx: mpsc::UnboundedSender<EngineMsg>,
    published: Arc<DashMap<String, bool>>,
    events: broadcast::Sender<ActiveChanged>,
}

impl SceneEngine {
    /// Spawn the engine worker on the current tokio runtime.
    pub fn new(options: EngineOptions, commands: Arc<dyn SceneCommands>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let published = Arc::new(DashMap::new());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let worker = EngineWorker {
            exclusions: options.exclusions(),
            options,
            commands,
            published: Arc::clone(&published),
            events: events.clone(),
            tx: tx.downgrade(),
            scenes: HashMap::new(),
            index: DependencyIndex::default(),
            snapshots: HashMap::new(),
            resolver: SceneEntityResolver::default(),
            by_scene_entity: HashMap::new(),
            guessed_scene_entity: HashMap::new(),
        };
        tokio::spawn(worker.run(rx));

        Self {
            tx,
            published,
            events,
        }
    }

    /// Load scene definitions together with a fresh view of the host scene
    /// registry, replacing any previous load wholesale. Returns per-scene
    /// issues; the load itself never fails as a whole.
    pub async fn load_scenes(
        &self,
        definitions: Vec<SceneDefinition>,
        scene_registry: Vec<EntitySnapshot>,
    ) -> Vec<SceneIssue> {
        let (reply, rx) = oneshot::channel();
        let msg = EngineMsg::Load {
            definitions,
            scene_registry,
            reply,
        };
        if self.tx.send(msg).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Re-entrant-safe re-initialization; identical to `load_scenes`.
    pub async fn reload(
        &self,
        definitions: Vec<SceneDefinition>,
        scene_registry: Vec<EntitySnapshot>,
    ) -> Vec<SceneIssue> {
        self.load_scenes(definitions, scene_registry).await
    }

    /// Feed one host entity state change
    pub fn handle_entity_event(&self, snapshot: EntitySnapshot) {
        let _ = self.tx.send(EngineMsg::EntityEvent(snapshot));
    }

    /// Feed an observed host service call (external activation detection)
    pub fn handle_service_call(&self, call: ServiceCallInfo) {
        let _ = self.tx.send(EngineMsg::ServiceCall(call));
    }

    /// Request scene activation. Optimistic: the published boolean goes
    /// true immediately and the settle window decides whether it stays.
    pub fn activate(&self, scene_id: &str) {
        let _ = self.tx.send(EngineMsg::Activate(scene_id.to_string()));
    }

    /// Request scene deactivation; member entities are turned off
    pub fn deactivate(&self, scene_id: &str) {
        let _ = self.tx.send(EngineMsg::Deactivate(scene_id.to_string()));
    }

    /// The debounced active boolean for a scene
    pub fn is_active(&self, scene_id: &str) -> bool {
        self.published.get(scene_id).map(|v| *v).unwrap_or(false)
    }

    /// Ids of all loaded scenes
    pub fn scene_ids(&self) -> Vec<String> {
        self.published.iter().map(|e| e.key().clone()).collect()
    }

    /// The host scene entity currently resolved for a scene, if any
    pub async fn scene_entity(&self, scene_id: &str) -> Option<EntityId> {
        let (reply, rx) = oneshot::channel();
        let msg = EngineMsg::SceneEntity {
            scene_id: scene_id.to_string(),
            reply,
        };
        if self.tx.send(msg).is_err() {
            return None;
        }
        rx.await.unwrap_or_default()
    }

    /// Subscribe to published-state changes
    pub fn subscribe(&self) -> broadcast::Receiver<ActiveChanged> {
        self.events.subscribe()
    }
}

/// Per-scene runtime: the activity tracker plus its settle machine.
struct SceneRuntime {
    tracker: SceneActivityTracker,
    settle: SettleState,
    scene_entity: Option<EntityId>,
}

struct EngineWorker {
    options: EngineOptions,
    exclusions: PatternList,
    commands: Arc<dyn SceneCommands>,
    published: Arc<DashMap<String, bool>>,
    events: broadcast::Sender<ActiveChanged>,
    /// Weak so pending timers never keep a closed engine alive
    tx: mpsc::WeakUnboundedSender<EngineMsg>,
    scenes: HashMap<String, SceneRuntime>,
    index: DependencyIndex,
    /// Latest snapshot per entity the host has reported; lets a reload
    /// rescan current state without polling
    snapshots: HashMap<EntityId, EntitySnapshot>,
    resolver: SceneEntityResolver,
    /// Resolved (or learned) host scene entity -> scene id
    by_scene_entity: HashMap<EntityId, String>,
    /// Guessed candidates, consulted when no resolution exists yet
    guessed_scene_entity: HashMap<EntityId, String>,
}

impl EngineWorker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<EngineMsg>) {
        while let Some(msg) = rx.recv().await {
            match msg {
                EngineMsg::Load {
                    definitions,
                    scene_registry,
                    reply,
                } => {
                    let issues = self.load(definitions, scene_registry);
                    let _ = reply.send(issues);
                }
                EngineMsg::EntityEvent(snapshot) => self.on_entity_event(snapshot),
                EngineMsg::ServiceCall(call) => self.on_service_call(call),
                EngineMsg::Activate(scene_id) => self.on_activate(&scene_id),
                EngineMsg::Deactivate(scene_id) => self.on_deactivate(&scene_id),
                EngineMsg::SceneEntity { scene_id, reply } => {
                    let entity = self
                        .scenes
                        .get(&scene_id)
                        .and_then(|r| r.scene_entity.clone());
                    let _ = reply.send(entity);
                }
                EngineMsg::Deadline { scene_id, epoch } => self.on_deadline(&scene_id, epoch),
            }
        }
        debug!("Scene engine worker stopped");
    }

    /// Replace definitions, index and trackers in one queue turn, so no
    /// event is ever matched against a half-updated index.
    fn load(
        &mut self,
        definitions: Vec<SceneDefinition>,
        scene_registry: Vec<EntitySnapshot>,
    ) -> Vec<SceneIssue> {
        let mut issues = Vec::new();
        let mut kept: Vec<SceneDefinition> = Vec::with_capacity(definitions.len());
        let mut seen_ids = HashSet::new();
        let mut seen_slugs: HashMap<String, String> = HashMap::new();

        for definition in definitions {
            if !seen_ids.insert(definition.id.clone()) {
                warn!(scene_id = %definition.id, "Duplicate scene id; keeping the first definition");
                issues.push(SceneIssue::DuplicateId { id: definition.id });
                continue;
            }

            let slug = definition.slug();
            if !slug.is_empty() {
                match seen_slugs.get(&slug) {
                    // A slug collision only weakens entity guessing, so the
                    // scene still loads.
                    Some(other) => issues.push(SceneIssue::DuplicateSlug {
                        id: definition.id.clone(),
                        slug: slug.clone(),
                        other: other.clone(),
                    }),
                    None => {
                        seen_slugs.insert(slug, definition.id.clone());
                    }
                }
            }

            kept.push(definition);
        }

        self.resolver = SceneEntityResolver::from_registry(&scene_registry);
        self.index = DependencyIndex::rebuild(&kept);
        self.by_scene_entity.clear();
        self.guessed_scene_entity.clear();

        let mut scenes = HashMap::with_capacity(kept.len());
        for definition in kept {
            let scene_id = definition.id.clone();

            for candidate in guess_candidates(&definition) {
                self.guessed_scene_entity
                    .entry(candidate)
                    .or_insert_with(|| scene_id.clone());
            }

            let scene_entity = self.resolver.resolve(&definition);
            match &scene_entity {
                Some(entity_id) => {
                    self.by_scene_entity
                        .insert(entity_id.clone(), scene_id.clone());
                }
                None => debug!(%scene_id, "No host scene entity resolved yet"),
            }

            let tracker = SceneActivityTracker::new(
                definition,
                &self.snapshots,
                &self.options.matching,
                &self.exclusions,
            );
            // A reload never fabricates an activation window: the tracker
            // starts Confirmed only when the definition already matches.
            let settle = SettleState::initial(tracker.raw_active());
            scenes.insert(
                scene_id,
                SceneRuntime {
                    tracker,
                    settle,
                    scene_entity,
                },
            );
        }

        // Published entries for scenes that no longer exist are dropped;
        // their pending timers will fire into a missing scene and be
        // discarded.
        self.published.retain(|id, _| scenes.contains_key(id));
        self.scenes = scenes;

        let scene_ids: Vec<String> = self.scenes.keys().cloned().collect();
        for scene_id in &scene_ids {
            self.publish(scene_id);
        }

        info!(
            scenes = self.scenes.len(),
            watched_entities = self.index.len(),
            "Loaded scene definitions"
        );
        if self.index.is_empty() && !self.scenes.is_empty() {
            warn!("No entities referenced by any loaded scene");
        }

        issues
    }

    fn on_entity_event(&mut self, snapshot: EntitySnapshot) {
        let entity_id = snapshot.entity_id.clone();
        let previous = self.snapshots.insert(entity_id.clone(), snapshot.clone());

        let scene_ids: Vec<String> = self
            .index
            .scenes_for(&entity_id)
            .map(str::to_string)
            .collect();

        for scene_id in scene_ids {
            let published_changed = match self.scenes.get_mut(&scene_id) {
                None => false,
                Some(runtime) => {
                    if !runtime.tracker.is_interesting_update(
                        &entity_id,
                        previous.as_ref(),
                        &snapshot,
                        &self.options.matching,
                    ) {
                        trace!(%scene_id, %entity_id, "Update cannot affect match; skipped");
                        false
                    } else if runtime.tracker.apply_event(
                        &entity_id,
                        Some(&snapshot),
                        &self.options.matching,
                        &self.exclusions,
                    ) {
                        let raw = runtime.tracker.raw_active();
                        debug!(%scene_id, %entity_id, raw_active = raw, "Raw activity changed");
                        runtime.settle.raw_changed(raw)
                    } else {
                        false
                    }
                }
            };

            if published_changed {
                self.publish(&scene_id);
            }
        }
    }

    fn on_service_call(&mut self, call: ServiceCallInfo) {
        if call.domain != SCENE_DOMAIN || call.service != SERVICE_TURN_ON {
            return;
        }

        // A declared transition stretches the window: the scene is still
        // fading toward its target when the default settle time ends.
        let mut window = self.options.settle_duration();
        if let Some(transition) = call.transition {
            window = window.max(Duration::from_secs_f64(transition.max(0.0)));
        }

        for entity_id in call.entity_ids {
            let scene_id = self
                .by_scene_entity
                .get(&entity_id)
                .or_else(|| self.guessed_scene_entity.get(&entity_id))
                .cloned();
            let Some(scene_id) = scene_id else { continue };
            let Some(runtime) = self.scenes.get_mut(&scene_id) else {
                continue;
            };

            // A guess that fired is as good as a resolution; remember it.
            if runtime.scene_entity.is_none() {
                runtime.scene_entity = Some(entity_id.clone());
                self.by_scene_entity
                    .insert(entity_id.clone(), scene_id.clone());
            }

            debug!(%scene_id, %entity_id, "External scene activation observed");
            runtime.settle.trigger_activation(window);
            let epoch = runtime.settle.epoch();
            self.publish(&scene_id);
            self.schedule_deadline(&scene_id, epoch, window);
        }
    }

    fn on_activate(&mut self, scene_id: &str) {
        let Some(runtime) = self.scenes.get_mut(scene_id) else {
            error!(scene_id, "Activation requested for unknown scene");
            return;
        };

        // Re-resolve when the initial resolution failed (the host scene may
        // not have existed yet at load time).
        if runtime.scene_entity.is_none() {
            runtime.scene_entity = self.resolver.resolve(runtime.tracker.definition());
            if let Some(entity_id) = &runtime.scene_entity {
                self.by_scene_entity
                    .insert(entity_id.clone(), scene_id.to_string());
            }
        }
        let Some(scene_entity) = runtime.scene_entity.clone() else {
            error!(scene_id, "No host scene entity resolved; activation skipped");
            return;
        };

        let window = runtime
            .settle
            .trigger_activation(self.options.settle_duration());
        let epoch = runtime.settle.epoch();
        self.publish(scene_id);
        self.schedule_deadline(scene_id, epoch, window);

        let commands = Arc::clone(&self.commands);
        let scene_id = scene_id.to_string();
        tokio::spawn(async move {
            if let Err(err) = commands.activate_scene(&scene_entity).await {
                warn!(%scene_id, %scene_entity, %err, "Scene activation command failed");
            }
        });
    }

    fn on_deactivate(&mut self, scene_id: &str) {
        let Some(runtime) = self.scenes.get_mut(scene_id) else {
            error!(scene_id, "Deactivation requested for unknown scene");
            return;
        };

        let targets = runtime.tracker.turn_off_targets(&self.exclusions);
        let window = runtime
            .settle
            .trigger_deactivation(self.options.settle_duration());
        let epoch = runtime.settle.epoch();
        self.publish(scene_id);
        self.schedule_deadline(scene_id, epoch, window);

        if targets.is_empty() {
            return;
        }
        let commands = Arc::clone(&self.commands);
        let scene_id = scene_id.to_string();
        tokio::spawn(async move {
            if let Err(err) = commands.turn_off(&targets).await {
                warn!(%scene_id, %err, "Turn-off command failed");
            }
        });
    }

    fn on_deadline(&mut self, scene_id: &str, epoch: u64) {
        let Some(runtime) = self.scenes.get_mut(scene_id) else {
            trace!(scene_id, "Deadline for removed scene discarded");
            return;
        };

        let raw = runtime.tracker.raw_active();
        match runtime.settle.deadline_elapsed(epoch, raw) {
            DeadlineOutcome::Stale => {
                trace!(scene_id, epoch, "Stale settle timer discarded");
            }
            DeadlineOutcome::Retry(delay) => {
                debug!(scene_id, "Raw-active false at settle deadline; retrying once");
                let next_epoch = runtime.settle.epoch();
                self.publish(scene_id);
                self.schedule_deadline(scene_id, next_epoch, delay);
            }
            DeadlineOutcome::Settled => {
                debug!(scene_id, raw_active = raw, "Settle window resolved");
                self.publish(scene_id);
            }
        }
    }

    /// Write the published boolean and notify on change.
    fn publish(&self, scene_id: &str) {
        let Some(runtime) = self.scenes.get(scene_id) else {
            return;
        };
        let active = runtime.settle.published();
        let previous = self.published.insert(scene_id.to_string(), active);
        if previous != Some(active) {
            debug!(scene_id, active, "Published scene activity changed");
            let _ = self.events.send(ActiveChanged {
                scene_id: scene_id.to_string(),
                active,
            });
        }
    }

    fn schedule_deadline(&self, scene_id: &str, epoch: u64, delay: Duration) {
        let tx = self.tx.clone();
        let scene_id = scene_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(EngineMsg::Deadline { scene_id, epoch });
            }
        });
    }
}
