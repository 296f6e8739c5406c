//! Per-scene settle/suppression state machine
//!
//! Converts raw-active transitions plus explicit activation/deactivation
//! triggers into a debounced boolean. Physical transitions (fades, wave
//! propagation, out-of-order reports) are neither instantaneous nor ordered,
//! so both trigger directions get a grace window before raw-active is
//! trusted again, and the settle evaluation absorbs one late straggler via a
//! short retry.
//!
//! Timer firings carry the epoch they were scheduled under; every transition
//! bumps the epoch, so a superseded timer is recognized and discarded
//! without needing explicit cancellation.

use std::time::Duration;

/// Hysteresis delay before the post-settle retry evaluation
pub const SETTLE_RETRY_DELAY: Duration = Duration::from_millis(750);

/// Retries allowed per activation trigger
pub const SETTLE_MAX_RETRIES: u8 = 1;

/// Phases of the per-scene settle machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlePhase {
    /// Not active, no window pending
    IdleOff,
    /// Activation triggered; reported on while entities transition
    OptimisticOn,
    /// Settle window elapsed with raw-active still false; waiting out the
    /// retry hysteresis before giving up
    Settling,
    /// Deactivation triggered; raw-active is ignored for the window
    SuppressedOff,
    /// Raw-active is trusted and currently true
    Confirmed,
}

/// Outcome of a deadline firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineOutcome {
    /// The firing was scheduled under a superseded epoch
    Stale,
    /// The window resolved (Confirmed or IdleOff)
    Settled,
    /// Raw-active was false at the deadline; re-check after the delay
    Retry(Duration),
}

/// Settle state for one scene: the phase plus the epoch guarding timers.
#[derive(Debug)]
pub struct SettleState {
    phase: SettlePhase,
    epoch: u64,
    retries_remaining: u8,
}

impl SettleState {
    /// Initial state after a (re)load: `Confirmed` when the definition
    /// already matches, otherwise `IdleOff`. A reload never fabricates an
    /// activation window.
    pub fn initial(raw_active: bool) -> Self {
        Self {
            phase: if raw_active {
                SettlePhase::Confirmed
            } else {
                SettlePhase::IdleOff
            },
            epoch: 0,
            retries_remaining: 0,
        }
    }

    pub fn phase(&self) -> SettlePhase {
        self.phase
    }

    /// Epoch a timer scheduled now must carry back
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The externally published boolean, a pure function of the phase.
    pub fn published(&self) -> bool {
        matches!(
            self.phase,
            SettlePhase::OptimisticOn | SettlePhase::Settling | SettlePhase::Confirmed
        )
    }

    /// Activation trigger from any phase. Returns the window to schedule;
    /// the latest trigger wins the deadline.
    pub fn trigger_activation(&mut self, window: Duration) -> Duration {
        self.bump();
        self.phase = SettlePhase::OptimisticOn;
        self.retries_remaining = SETTLE_MAX_RETRIES;
        window
    }

    /// Deactivation trigger from any phase. Raw-active is suppressed for the
    /// returned window; no retry follows a deliberate turn-off, so a scene
    /// that fails to re-match at the deadline goes straight to off.
    pub fn trigger_deactivation(&mut self, window: Duration) -> Duration {
        self.bump();
        self.phase = SettlePhase::SuppressedOff;
        self.retries_remaining = 0;
        window
    }

    /// A settle deadline fired for `epoch` with the current raw-active value.
    pub fn deadline_elapsed(&mut self, epoch: u64, raw_active: bool) -> DeadlineOutcome {
        if epoch != self.epoch {
            return DeadlineOutcome::Stale;
        }

        match self.phase {
            SettlePhase::OptimisticOn | SettlePhase::Settling | SettlePhase::SuppressedOff => {
                if raw_active {
                    self.bump();
                    self.phase = SettlePhase::Confirmed;
                    DeadlineOutcome::Settled
                } else if self.retries_remaining > 0 {
                    self.retries_remaining -= 1;
                    self.bump();
                    self.phase = SettlePhase::Settling;
                    DeadlineOutcome::Retry(SETTLE_RETRY_DELAY)
                } else {
                    self.bump();
                    self.phase = SettlePhase::IdleOff;
                    DeadlineOutcome::Settled
                }
            }
            // A current-epoch deadline cannot reach these phases; entering
            // them bumps the epoch.
            SettlePhase::IdleOff | SettlePhase::Confirmed => DeadlineOutcome::Settled,
        }
    }

    /// Steady-state tracking outside any window: `Confirmed` follows
    /// raw-active down immediately, `IdleOff` follows it up. Windows ignore
    /// raw transitions until their deadline. Returns true when the phase
    /// changed.
    pub fn raw_changed(&mut self, raw_active: bool) -> bool {
        match (self.phase, raw_active) {
            (SettlePhase::Confirmed, false) => {
                self.bump();
                self.phase = SettlePhase::IdleOff;
                true
            }
            (SettlePhase::IdleOff, true) => {
                self.bump();
                self.phase = SettlePhase::Confirmed;
                true
            }
            _ => false,
        }
    }

    fn bump(&mut self) {
        self.epoch += 1;
    }
}
