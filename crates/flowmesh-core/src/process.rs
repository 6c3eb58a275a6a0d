//! Process lifecycle (spec §3, §4.3).
//!
//! `Process` is a capability trait, not a base class (spec §9: "Process and
//! PortOperation are capability sets... rather than inheritance
//! hierarchies"). [`BaseProcess`] supplies the lifecycle bookkeeping a
//! concrete implementation embeds by composition: the state guard, the
//! one-shot `initialize`/`shutdown` claims, and a default `run` that waits
//! for cancellation (used by sink-only test processes).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::cancel::CancellationHandle;
use crate::error::{CoreError, Result};
use crate::ip::Ip;
use crate::network::PortRegistry;
use crate::port::{InputPort, OutputPort, SendError};

/// The process lifecycle state machine (spec §4.3 diagram).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessState {
    Created,
    Initialized,
    Running,
    Stopping,
    Stopped,
    Failed,
}

/// Per-process execution context handed to every lifecycle method: carries
/// the process's own name (for logging/ownership tags), the network's
/// shared cancellation handle, and a blocked-on-a-port flag the network's
/// deadlock watchdog samples (spec §4.4).
#[derive(Clone)]
pub struct ProcessContext {
    name: String,
    cancel: CancellationHandle,
    blocked: Arc<AtomicBool>,
}

impl ProcessContext {
    pub fn new(name: impl Into<String>, cancel: CancellationHandle) -> Self {
        Self {
            name: name.into(),
            cancel,
            blocked: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn process_name(&self) -> &str {
        &self.name
    }

    pub fn cancellation(&self) -> &CancellationHandle {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether this process is currently inside a [`Self::receive`] or
    /// [`Self::send`] call. The watchdog reads this through
    /// [`blocked_flag`](Self::blocked_flag); the process itself never needs
    /// to call this.
    pub fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::Acquire)
    }

    /// The shared flag backing [`Self::is_blocked`], handed to the network
    /// so its watchdog can sample it without holding a `ProcessContext`.
    pub fn blocked_flag(&self) -> Arc<AtomicBool> {
        self.blocked.clone()
    }

    /// Receive through `port`, marking this process blocked for the
    /// duration of the wait. The one port-facing entry point process bodies
    /// are expected to use, so the watchdog's liveness signal stays
    /// accurate without every process author tracking it by hand.
    pub async fn receive<T>(&self, port: &InputPort<T>) -> Result<Ip<T>> {
        self.blocked.store(true, Ordering::Release);
        let result = port.receive(&self.cancel).await;
        self.blocked.store(false, Ordering::Release);
        result
    }

    /// Send through `port`, marking this process blocked for the duration
    /// of the send (a fan-out send can block on the slowest downstream).
    pub async fn send<T: Clone>(
        &self,
        port: &OutputPort<T>,
        ip: Ip<T>,
    ) -> std::result::Result<(), SendError<T>> {
        self.blocked.store(true, Ordering::Release);
        let result = port.send(&self.cancel, ip).await;
        self.blocked.store(false, Ordering::Release);
        result
    }
}

/// An independent unit of execution with input ports, output ports and a
/// body function. Owns no data other than what it receives through ports
/// (spec §2).
#[async_trait]
pub trait Process: Send + Sync {
    /// Stable name, unique within its network.
    fn name(&self) -> &str;

    /// Register this process's ports with the network's wiring registry.
    /// Called once, synchronously, at `Network::add_process` time — before
    /// any `connect` call, so ports must already exist as fields on the
    /// process value by construction. The default does nothing, for
    /// processes with no ports of their own (e.g. a pure wrapper).
    fn declare_ports(&self, _registry: &PortRegistry) {}

    /// Acquire resources, consume any Initial Information Packets. Called at
    /// most once, before `run`.
    async fn initialize(&self, ctx: &ProcessContext) -> Result<()>;

    /// The process body. Must loop until either a sentinel upstream close is
    /// observed (clean return) or `ctx.cancellation()` fires (return
    /// `CoreError::cancelled()`).
    async fn run(&self, ctx: &ProcessContext) -> Result<()>;

    /// Release resources. Idempotent; runs exactly once per successful
    /// `initialize`, regardless of how `run` ended.
    async fn shutdown(&self, ctx: &ProcessContext) -> Result<()>;
}

struct Inner {
    state: ProcessState,
    initialize_claimed: bool,
    shutdown_claimed: bool,
}

/// Lifecycle bookkeeping shared by every `Process` implementation. Embed one
/// as a field and delegate; this is composition, not a base class.
pub struct BaseProcess {
    inner: Mutex<Inner>,
}

impl BaseProcess {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: ProcessState::Created,
                initialize_claimed: false,
                shutdown_claimed: false,
            }),
        }
    }

    pub fn state(&self) -> ProcessState {
        self.inner.lock().state
    }

    /// Consistent with the `state` variable under concurrent reads (spec
    /// §4.3: "IsInitialized is observationally consistent").
    pub fn is_initialized(&self) -> bool {
        !matches!(self.state(), ProcessState::Created)
    }

    /// Claim the one-shot right to run `initialize`. Fails with
    /// `ProcessStateError` if the process was not `Created`, or if
    /// `initialize` was already claimed by a previous call.
    pub fn begin_initialize(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state != ProcessState::Created || inner.initialize_claimed {
            return Err(CoreError::process_state(format!(
                "initialize is invalid from state {:?}",
                inner.state
            )));
        }
        inner.initialize_claimed = true;
        Ok(())
    }

    /// Record the outcome of `initialize`: `Initialized` on success, `Failed`
    /// otherwise.
    pub fn finish_initialize(&self, outcome: &Result<()>) {
        let mut inner = self.inner.lock();
        inner.state = match outcome {
            Ok(()) => ProcessState::Initialized,
            Err(_) => ProcessState::Failed,
        };
    }

    /// Claim the `Initialized -> Running` transition.
    pub fn begin_run(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state != ProcessState::Initialized {
            return Err(CoreError::process_state(format!(
                "run is invalid from state {:?}",
                inner.state
            )));
        }
        inner.state = ProcessState::Running;
        Ok(())
    }

    /// Mark the process as draining because the network's cancellation
    /// handle fired while this process was `Running`.
    pub fn mark_stopping(&self) {
        let mut inner = self.inner.lock();
        if inner.state == ProcessState::Running {
            inner.state = ProcessState::Stopping;
        }
    }

    /// Record the outcome of `run`: cancellation and clean return both settle
    /// on `Stopped`; any other error settles on `Failed`.
    pub fn finish_run(&self, outcome: &Result<()>) {
        let mut inner = self.inner.lock();
        inner.state = match outcome {
            Ok(()) => ProcessState::Stopped,
            Err(e) if e.is_cancelled() => ProcessState::Stopped,
            Err(_) => ProcessState::Failed,
        };
    }

    /// Claim the one-shot right to run `shutdown`. Returns `true` for the
    /// first caller; later callers get `false` and must not repeat
    /// side-effecting cleanup (spec §4.3: "Must be idempotent").
    pub fn begin_shutdown(&self) -> bool {
        let mut inner = self.inner.lock();
        !std::mem::replace(&mut inner.shutdown_claimed, true)
    }
}

impl Default for BaseProcess {
    fn default() -> Self {
        Self::new()
    }
}

/// A `run` body that does nothing but wait for cancellation, for processes
/// whose sole job is to sink input on ports and never produce output (spec
/// §4.3: "a default `run` that simply waits for cancellation, used by sink
/// tests").
pub async fn wait_for_cancellation(ctx: &ProcessContext) -> Result<()> {
    ctx.cancellation().cancelled().await;
    Err(CoreError::cancelled())
}
