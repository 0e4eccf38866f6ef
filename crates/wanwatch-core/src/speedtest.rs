// ── Speed-test run state ──
//
// Owns the externally-visible running flag and its change broadcasts.
// The single-flight gate lives here; the trigger sequence itself is
// driven by the monitor.

use tokio::sync::{broadcast, watch};
use tracing::debug;

const EVENT_CHANNEL_SIZE: usize = 16;

/// Running-flag transition, broadcast to any listener on change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedtestEvent {
    Started,
    Finished,
}

/// Outcome of a trigger request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// The run sequence completed (the remote call itself may still
    /// have failed -- that is logged, not surfaced).
    Completed,
    /// A run was already in flight; this request was dropped, not queued.
    AlreadyRunning,
    /// No gateway could be resolved even after a fresh poll; nothing
    /// was targeted and the flag never flipped.
    NoGateway,
}

/// Per-monitor speed-test state: one instance per monitored device.
pub(crate) struct SpeedtestState {
    /// Single-flight gate: `try_lock` failure means a run is in flight.
    gate: tokio::sync::Mutex<()>,
    in_progress: watch::Sender<bool>,
    events: broadcast::Sender<SpeedtestEvent>,
}

impl SpeedtestState {
    pub(crate) fn new() -> Self {
        let (in_progress, _) = watch::channel(false);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            gate: tokio::sync::Mutex::new(()),
            in_progress,
            events,
        }
    }

    /// Try to claim the single-flight gate. `None` while a run is active.
    pub(crate) fn try_claim(&self) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        self.gate.try_lock().ok()
    }

    pub(crate) fn is_running(&self) -> bool {
        *self.in_progress.borrow()
    }

    pub(crate) fn subscribe_running(&self) -> watch::Receiver<bool> {
        self.in_progress.subscribe()
    }

    pub(crate) fn subscribe_events(&self) -> broadcast::Receiver<SpeedtestEvent> {
        self.events.subscribe()
    }
}

/// RAII marker for the Running state.
///
/// Entering flips the flag to `true` and broadcasts `Started`; dropping
/// flips it back and broadcasts `Finished`. Because cleanup lives in
/// `Drop`, the flag can never stay stuck at Running -- not on remote
/// failure, and not when the trigger future is cancelled mid-wait.
pub(crate) struct RunningGuard<'a> {
    state: &'a SpeedtestState,
}

impl<'a> RunningGuard<'a> {
    pub(crate) fn enter(state: &'a SpeedtestState) -> Self {
        let _ = state.in_progress.send(true);
        let _ = state.events.send(SpeedtestEvent::Started);
        debug!("speed test running");
        Self { state }
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        let _ = self.state.in_progress.send(false);
        let _ = self.state.events.send(SpeedtestEvent::Finished);
        debug!("speed test finished");
    }
}
