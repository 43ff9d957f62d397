//! Published system state.
//!
//! The orchestrator is the only writer.  Each cycle it builds a complete new
//! [`SystemState`] and swaps it in with one [`StateStore::publish`] call, so
//! readers always see the decision, signals, cycle count and timestamp of
//! the same cycle.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use decisify_types::{Decision, SignalMap};
use serde::Serialize;
use tokio::sync::watch;

/// Snapshot of the latest completed cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemState {
    pub latest_decision: Option<Decision>,
    pub latest_signals: SignalMap,
    pub cycle_count: u64,
    pub last_update: DateTime<Utc>,
}

impl SystemState {
    /// The state before any cycle has run.
    pub fn initial(at: DateTime<Utc>) -> Self {
        Self {
            latest_decision: None,
            latest_signals: SignalMap::new(),
            cycle_count: 0,
            last_update: at,
        }
    }

    /// The state after one more cycle produced `decision` from `signals`.
    pub fn advance(&self, decision: Decision, signals: SignalMap, at: DateTime<Utc>) -> Self {
        Self {
            latest_decision: Some(decision),
            latest_signals: signals,
            cycle_count: self.cycle_count + 1,
            last_update: at,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.latest_decision.is_some()
    }
}

/// Single-writer, many-reader holder of the current [`SystemState`].
///
/// Cloning the store yields another handle to the same state.
#[derive(Debug, Clone)]
pub struct StateStore {
    tx: Arc<watch::Sender<Arc<SystemState>>>,
}

impl StateStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Arc::new(SystemState::initial(Utc::now())));
        Self { tx: Arc::new(tx) }
    }

    /// Replace the whole state at once.
    pub fn publish(&self, state: SystemState) {
        self.tx.send_replace(Arc::new(state));
    }

    /// The current snapshot.
    pub fn read(&self) -> Arc<SystemState> {
        Arc::clone(&self.tx.borrow())
    }

    /// Receiver notified on every publish.
    pub fn subscribe(&self) -> watch::Receiver<Arc<SystemState>> {
        self.tx.subscribe()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}
