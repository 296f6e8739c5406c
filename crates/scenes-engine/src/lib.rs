//! Scene engine for Stateful Scenes
//!
//! Owns the registry of loaded scenes, routes host entity events through the
//! dependency index to the per-scene trackers, and publishes a debounced
//! active boolean per scene via the settle state machine. All mutation is
//! serialized onto a single worker task; the public handle only enqueues.

mod engine;
mod resolver;
mod settle;

pub use engine::{
    ActiveChanged, CommandError, SceneCommands, SceneEngine, SceneIssue, ServiceCallInfo,
};
pub use resolver::{guess_candidates, SceneEntityResolver};
pub use settle::{DeadlineOutcome, SettlePhase, SettleState, SETTLE_MAX_RETRIES, SETTLE_RETRY_DELAY};
