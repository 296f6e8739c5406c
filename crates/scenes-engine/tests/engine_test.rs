//! End-to-end engine tests driving the settle machinery on paused time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use indexmap::IndexMap;
use scenes_core::{EngineOptions, EntityId, EntitySnapshot, SceneDefinition, SceneEntityTarget};
use scenes_engine::{CommandError, SceneCommands, SceneEngine, SceneIssue, ServiceCallInfo};
use serde_json::json;

const SETTLE: Duration = Duration::from_millis(1500);
const RETRY: Duration = Duration::from_millis(750);
const EPSILON: Duration = Duration::from_millis(10);

#[derive(Default)]
struct RecordingCommands {
    activations: Mutex<Vec<String>>,
    turn_offs: Mutex<Vec<Vec<String>>>,
}

impl RecordingCommands {
    fn activations(&self) -> Vec<String> {
        self.activations.lock().unwrap().clone()
    }

    fn turn_offs(&self) -> Vec<Vec<String>> {
        self.turn_offs.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl SceneCommands for RecordingCommands {
    async fn activate_scene(&self, scene_entity: &EntityId) -> Result<(), CommandError> {
        self.activations.lock().unwrap().push(scene_entity.to_string());
        Ok(())
    }

    async fn turn_off(&self, entities: &[EntityId]) -> Result<(), CommandError> {
        self.turn_offs
            .lock()
            .unwrap()
            .push(entities.iter().map(ToString::to_string).collect());
        Ok(())
    }
}

fn eid(s: &str) -> EntityId {
    s.parse().unwrap()
}

fn light(id: &str, state: &str, brightness: Option<i64>) -> EntitySnapshot {
    let mut attrs = HashMap::new();
    if let Some(b) = brightness {
        attrs.insert("brightness".to_string(), json!(b));
    }
    EntitySnapshot::new(eid(id), state, attrs)
}

/// "Movie Night": light.desk on at brightness 90 (tolerance default 4).
fn movie_scene() -> SceneDefinition {
    let mut target = SceneEntityTarget::with_state("on");
    target.attributes.insert("brightness".to_string(), json!(90));
    let mut entities = IndexMap::new();
    entities.insert(eid("light.desk"), target);
    SceneDefinition::new(None, "Movie Night", None, entities)
}

/// "All Off": every member declared off.
fn all_off_scene() -> SceneDefinition {
    let mut entities = IndexMap::new();
    entities.insert(eid("light.desk"), SceneEntityTarget::with_state("off"));
    entities.insert(eid("light.couch"), SceneEntityTarget::with_state("off"));
    SceneDefinition::new(None, "All Off", None, entities)
}

fn registry() -> Vec<EntitySnapshot> {
    vec![EntitySnapshot::new(
        eid("scene.movie_night"),
        "scening",
        HashMap::new(),
    )]
}

/// Let the engine worker drain its queue.
async fn drain() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

async fn advance(duration: Duration) {
    tokio::time::sleep(duration).await;
    drain().await;
}

#[tokio::test(start_paused = true)]
async fn activation_confirms_when_scene_settles() {
    let commands = Arc::new(RecordingCommands::default());
    let engine = SceneEngine::new(EngineOptions::default(), commands.clone());
    engine.load_scenes(vec![movie_scene()], registry()).await;
    assert!(!engine.is_active("movie_night"));

    engine.activate("movie_night");
    drain().await;
    assert!(engine.is_active("movie_night"), "optimistic immediately");
    assert_eq!(commands.activations(), vec!["scene.movie_night"]);

    // Device lands within tolerance during the window.
    engine.handle_entity_event(light("light.desk", "on", Some(88)));
    advance(SETTLE + EPSILON).await;
    assert!(engine.is_active("movie_night"), "confirmed after settle");

    // Out of tolerance once confirmed: drops immediately, no window.
    engine.handle_entity_event(light("light.desk", "on", Some(80)));
    drain().await;
    assert!(!engine.is_active("movie_night"));
}

#[tokio::test(start_paused = true)]
async fn failed_activation_retries_once_then_reports_off() {
    let commands = Arc::new(RecordingCommands::default());
    let engine = SceneEngine::new(EngineOptions::default(), commands);
    engine.load_scenes(vec![movie_scene()], registry()).await;
    let mut rx = engine.subscribe();

    engine.activate("movie_night");
    drain().await;

    // Window elapses with nothing matching; the retry keeps optimism alive.
    advance(SETTLE + EPSILON).await;
    assert!(engine.is_active("movie_night"), "still on through the retry");

    advance(RETRY + EPSILON).await;
    assert!(!engine.is_active("movie_night"), "flap suppressed as not active");

    // Published boolean flipped true once and false once, nothing more.
    let mut flips = Vec::new();
    while let Ok(event) = rx.try_recv() {
        flips.push(event.active);
    }
    assert_eq!(flips, vec![true, false]);
}

#[tokio::test(start_paused = true)]
async fn retrigger_resets_the_deadline() {
    let commands = Arc::new(RecordingCommands::default());
    let engine = SceneEngine::new(EngineOptions::default(), commands.clone());
    engine.load_scenes(vec![movie_scene()], registry()).await;
    let mut rx = engine.subscribe();

    engine.activate("movie_night");
    drain().await;
    advance(Duration::from_millis(1000)).await;

    // Second trigger within the window: latest wins.
    engine.activate("movie_night");
    drain().await;

    // Past the first deadline but within the second window: the stale timer
    // fires and must be discarded.
    advance(Duration::from_millis(1000)).await;
    assert!(engine.is_active("movie_night"));

    // Second window ends, retry runs, then off.
    advance(Duration::from_millis(600)).await;
    assert!(engine.is_active("movie_night"), "retry hysteresis");
    advance(RETRY + EPSILON).await;
    assert!(!engine.is_active("movie_night"));

    // One activation command per trigger, one false flip in total.
    assert_eq!(commands.activations().len(), 2);
    let mut flips = Vec::new();
    while let Ok(event) = rx.try_recv() {
        flips.push(event.active);
    }
    assert_eq!(flips, vec![true, false]);
}

#[tokio::test(start_paused = true)]
async fn deactivated_all_off_scene_legitimately_reconfirms() {
    let commands = Arc::new(RecordingCommands::default());
    let engine = SceneEngine::new(EngineOptions::default(), commands.clone());

    engine.handle_entity_event(light("light.desk", "off", None));
    engine.handle_entity_event(light("light.couch", "off", None));
    engine.load_scenes(vec![all_off_scene()], vec![]).await;
    assert!(engine.is_active("all_off"), "matches its own off definition");

    engine.deactivate("all_off");
    drain().await;
    assert!(!engine.is_active("all_off"), "suppressed for the window");
    assert_eq!(
        commands.turn_offs(),
        vec![vec!["light.desk".to_string(), "light.couch".to_string()]]
    );

    // Entities re-report off during the suppression window; ignored.
    engine.handle_entity_event(light("light.desk", "off", None));
    advance(Duration::from_millis(500)).await;
    assert!(!engine.is_active("all_off"));

    // Window ends, the definition still matches: confirmed again.
    advance(SETTLE).await;
    assert!(engine.is_active("all_off"));
}

#[tokio::test(start_paused = true)]
async fn reload_with_matching_scene_starts_confirmed() {
    let commands = Arc::new(RecordingCommands::default());
    let engine = SceneEngine::new(EngineOptions::default(), commands);

    engine.handle_entity_event(light("light.desk", "on", Some(92)));
    drain().await;

    engine.load_scenes(vec![movie_scene()], registry()).await;
    assert!(engine.is_active("movie_night"), "no fabricated settle window");
}

#[tokio::test(start_paused = true)]
async fn repeated_identical_events_notify_once() {
    let commands = Arc::new(RecordingCommands::default());
    let engine = SceneEngine::new(EngineOptions::default(), commands);
    engine.load_scenes(vec![movie_scene()], registry()).await;
    let mut rx = engine.subscribe();

    engine.handle_entity_event(light("light.desk", "on", Some(90)));
    engine.handle_entity_event(light("light.desk", "on", Some(90)));
    drain().await;

    assert!(engine.is_active("movie_night"));
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert_eq!(events.len(), 1);
    assert!(events[0].active);
}

#[tokio::test(start_paused = true)]
async fn unresolved_scene_activation_is_a_noop() {
    let commands = Arc::new(RecordingCommands::default());
    let engine = SceneEngine::new(EngineOptions::default(), commands.clone());
    // Host registry knows nothing that maps to this definition.
    engine.load_scenes(vec![movie_scene()], vec![]).await;

    engine.activate("movie_night");
    drain().await;

    assert!(commands.activations().is_empty());
    assert!(!engine.is_active("movie_night"));
    assert_eq!(engine.scene_entity("movie_night").await, None);
}

#[tokio::test(start_paused = true)]
async fn external_activation_extends_window_by_transition() {
    let commands = Arc::new(RecordingCommands::default());
    let engine = SceneEngine::new(EngineOptions::default(), commands);
    engine.load_scenes(vec![movie_scene()], vec![]).await;

    // Someone else turned the scene on, with a 5 s fade.
    engine.handle_service_call(ServiceCallInfo::from_call_data(
        "scene",
        "turn_on",
        &json!({
            "target": {"entity_id": "scene.movie_night"},
            "service_data": {"transition": 5.0}
        }),
    ));
    drain().await;
    assert!(engine.is_active("movie_night"), "optimistic on observation");

    // Well past the default settle time: a 1.5 s window would have expired
    // (and retried) by now, but the transition stretched it to 5 s.
    advance(Duration::from_millis(2500)).await;
    assert!(engine.is_active("movie_night"));

    engine.handle_entity_event(light("light.desk", "on", Some(90)));
    advance(Duration::from_millis(3000)).await;
    assert!(engine.is_active("movie_night"), "confirmed at window end");

    // The guessed mapping was learned for next time.
    assert_eq!(
        engine.scene_entity("movie_night").await,
        Some(eid("scene.movie_night"))
    );
}

#[tokio::test(start_paused = true)]
async fn duplicate_scene_ids_are_reported_per_scene() {
    let commands = Arc::new(RecordingCommands::default());
    let engine = SceneEngine::new(EngineOptions::default(), commands);

    let issues = engine
        .load_scenes(vec![movie_scene(), movie_scene()], registry())
        .await;

    assert_eq!(
        issues,
        vec![SceneIssue::DuplicateId {
            id: "movie_night".to_string()
        }]
    );
    assert_eq!(engine.scene_ids(), vec!["movie_night".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn reload_drops_removed_scenes() {
    let commands = Arc::new(RecordingCommands::default());
    let engine = SceneEngine::new(EngineOptions::default(), commands);

    engine.handle_entity_event(light("light.desk", "on", Some(90)));
    engine.load_scenes(vec![movie_scene()], registry()).await;
    assert!(engine.is_active("movie_night"));

    engine.load_scenes(vec![all_off_scene()], vec![]).await;
    assert!(!engine.is_active("movie_night"));
    assert_eq!(engine.scene_ids(), vec!["all_off".to_string()]);
}
