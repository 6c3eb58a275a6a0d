//! Network observability (spec §6): a thin facade over `tracing` plus an
//! injectable subscriber, following the teacher crate's
//! `observability::facade` pattern — no global state, no metrics exporter
//! (that belongs to the external flow-management layer, per spec §1's
//! Non-goals); just a structured event emitted through both channels.

use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;

use crate::ip::{IpId, IpKind};
use crate::process::ProcessState;

/// One process lifecycle transition.
#[derive(Clone, Debug)]
pub struct StateChangeEvent {
    pub process_name: String,
    pub old_state: Option<ProcessState>,
    pub new_state: ProcessState,
    pub at: SystemTime,
}

/// A handler invoked once per state transition (spec §6:
/// `subscribe_state_changes(handler)`).
pub type StateChangeHandler = Arc<dyn Fn(&StateChangeEvent) + Send + Sync>;

/// One IP sighting at a pass-through node such as `Logger` (spec §4.5): a
/// payload, the process that observed it, and a timestamp — distinct from a
/// [`StateChangeEvent`], which names a lifecycle transition and nothing
/// else. `payload_debug` renders the payload with its `Debug` impl since the
/// facade itself is not generic over element type.
#[derive(Clone, Debug)]
pub struct IpObservedEvent {
    pub process_name: String,
    pub ip_id: IpId,
    pub ip_kind: IpKind,
    pub payload_debug: Option<String>,
    pub at: SystemTime,
}

/// A handler invoked once per observed IP (spec §4.5).
pub type IpObservedHandler = Arc<dyn Fn(&IpObservedEvent) + Send + Sync>;

/// Fan-out point for lifecycle and IP-sighting events: always emits a
/// `tracing` event, and additionally calls every subscribed handler of the
/// matching kind.
#[derive(Default)]
pub struct ObservabilityFacade {
    handlers: RwLock<Vec<StateChangeHandler>>,
    ip_handlers: RwLock<Vec<IpObservedHandler>>,
}

impl ObservabilityFacade {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, handler: StateChangeHandler) {
        self.handlers.write().push(handler);
    }

    pub fn emit(&self, event: StateChangeEvent) {
        tracing::debug!(
            process = %event.process_name,
            old_state = ?event.old_state,
            new_state = ?event.new_state,
            "process state transition"
        );
        for handler in self.handlers.read().iter() {
            handler(&event);
        }
    }

    /// Subscribe to per-IP sightings emitted by nodes such as `Logger`,
    /// separate from lifecycle transitions.
    pub fn subscribe_ip_observed(&self, handler: IpObservedHandler) {
        self.ip_handlers.write().push(handler);
    }

    pub fn emit_ip_observed(&self, event: IpObservedEvent) {
        tracing::debug!(
            process = %event.process_name,
            ip.id = %event.ip_id,
            ip.kind = ?event.ip_kind,
            "ip observed"
        );
        for handler in self.ip_handlers.read().iter() {
            handler(&event);
        }
    }
}
