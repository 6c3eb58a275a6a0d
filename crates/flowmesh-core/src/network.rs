//! The network orchestrator (spec §4.4, §6).
//!
//! A [`Network`] owns a fixed set of named [`Process`] instances and the
//! edges wiring their ports together. It is a graph builder, a sequential
//! startup/shutdown driver, and an observability surface — it never touches
//! IPs itself. Port wiring is the one place this crate reaches for type
//! erasure (`Box<dyn Any>`), mirroring the teacher crate's own `DynCodec` /
//! `ErasedSparkBuf` pattern of hiding a concrete type behind a trait object
//! at a structural boundary while keeping every process's own `run` body
//! fully statically typed.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::cancel::CancellationHandle;
use crate::config::{NetworkConfig, PanicPolicy};
use crate::error::{codes, CoreError, Result};
use crate::observability::{ObservabilityFacade, StateChangeEvent, StateChangeHandler};
use crate::port::{ConnReceiver, ConnSender, Connection, InputPort, OutputPort};
use crate::process::{Process, ProcessContext, ProcessState};

/// Object-safe view of an [`OutputPort`] used only for dynamic wiring
/// (spec §6 `connect`). Never exposed to process bodies.
#[async_trait]
pub trait AnyOutputPort: Send + Sync {
    fn name(&self) -> &str;
    fn is_required(&self) -> bool;
    fn max_connections(&self) -> usize;
    fn connection_count(&self) -> usize;
    fn element_type_id(&self) -> TypeId;
    fn connection_depths(&self) -> Vec<usize>;

    /// Drop every downstream sender registered on this port (spec §4.4
    /// termination condition 1). Called once by [`Network::run`] right after
    /// the owning process's `run` body returns.
    fn close(&self);

    /// Build a fresh connection of this port's own element type and return
    /// both ends boxed. The receiving half is handed to the matching input
    /// port by [`Network::connect`] once the two `TypeId`s are confirmed
    /// equal, so the downcast on the input side cannot fail.
    fn create_channel_pair(
        &self,
        capacity: usize,
    ) -> Result<(Box<dyn Any + Send>, Box<dyn Any + Send>)>;

    fn connect_erased(&self, sender: Box<dyn Any + Send>) -> Result<()>;
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> AnyOutputPort for OutputPort<T> {
    fn name(&self) -> &str {
        OutputPort::name(self)
    }
    fn is_required(&self) -> bool {
        OutputPort::is_required(self)
    }
    fn max_connections(&self) -> usize {
        OutputPort::max_connections(self)
    }
    fn connection_count(&self) -> usize {
        OutputPort::connection_count(self)
    }
    fn element_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }
    fn connection_depths(&self) -> Vec<usize> {
        OutputPort::connection_depths(self)
    }
    fn close(&self) {
        OutputPort::close(self)
    }
    fn create_channel_pair(
        &self,
        capacity: usize,
    ) -> Result<(Box<dyn Any + Send>, Box<dyn Any + Send>)> {
        let (tx, rx) = Connection::<T>::new(capacity)?.split();
        Ok((Box::new(tx), Box::new(rx)))
    }
    fn connect_erased(&self, sender: Box<dyn Any + Send>) -> Result<()> {
        let sender = *sender
            .downcast::<ConnSender<T>>()
            .map_err(|_| type_mismatch_error(OutputPort::name(self)))?;
        self.connect(sender)
    }
}

/// Object-safe view of an [`InputPort`] used only for dynamic wiring.
#[async_trait]
pub trait AnyInputPort: Send + Sync {
    fn name(&self) -> &str;
    fn is_required(&self) -> bool;
    fn max_connections(&self) -> usize;
    fn element_type_id(&self) -> TypeId;
    async fn connection_count(&self) -> usize;
    async fn connect_erased(&self, receiver: Box<dyn Any + Send>) -> Result<()>;

    /// Queue an erased IIP (spec §9 Open Question 2) for delivery the next
    /// time the owning process's `initialize` calls `take_initials`.
    fn push_initial_erased(&self, ip: Box<dyn Any + Send>) -> Result<()>;
}

#[async_trait]
impl<T: Send + Sync + 'static> AnyInputPort for InputPort<T> {
    fn name(&self) -> &str {
        InputPort::name(self)
    }
    fn is_required(&self) -> bool {
        InputPort::is_required(self)
    }
    fn max_connections(&self) -> usize {
        InputPort::max_connections(self)
    }
    fn element_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }
    async fn connection_count(&self) -> usize {
        InputPort::connection_count(self).await
    }
    async fn connect_erased(&self, receiver: Box<dyn Any + Send>) -> Result<()> {
        let receiver = *receiver
            .downcast::<ConnReceiver<T>>()
            .map_err(|_| type_mismatch_error(InputPort::name(self)))?;
        self.connect(receiver).await
    }
    fn push_initial_erased(&self, ip: Box<dyn Any + Send>) -> Result<()> {
        let ip = *ip
            .downcast::<crate::ip::Ip<T>>()
            .map_err(|_| type_mismatch_error(InputPort::name(self)))?;
        self.push_initial(ip);
        Ok(())
    }
}

fn type_mismatch_error(port_name: &str) -> CoreError {
    CoreError::validation(
        codes::VALIDATION_TYPE_MISMATCH,
        format!("port `{port_name}` element type mismatch at connect time"),
    )
}

/// The per-process table a [`Process::declare_ports`] call populates. One
/// registry is created per process at `add_process` time and retained by
/// the network for later `connect`/`nodes`/`edges` lookups.
#[derive(Default)]
pub struct PortRegistry {
    outputs: Mutex<HashMap<String, Arc<dyn AnyOutputPort>>>,
    inputs: Mutex<HashMap<String, Arc<dyn AnyInputPort>>>,
}

impl PortRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_output<T: Clone + Send + Sync + 'static>(&self, port: Arc<OutputPort<T>>) {
        let port: Arc<dyn AnyOutputPort> = port;
        self.outputs.lock().insert(port.name().to_string(), port);
    }

    pub fn register_input<T: Send + Sync + 'static>(&self, port: Arc<InputPort<T>>) {
        let port: Arc<dyn AnyInputPort> = port;
        self.inputs.lock().insert(port.name().to_string(), port);
    }

    fn output(&self, name: &str) -> Option<Arc<dyn AnyOutputPort>> {
        self.outputs.lock().get(name).cloned()
    }

    fn input(&self, name: &str) -> Option<Arc<dyn AnyInputPort>> {
        self.inputs.lock().get(name).cloned()
    }

    fn outputs_snapshot(&self) -> Vec<Arc<dyn AnyOutputPort>> {
        self.outputs.lock().values().cloned().collect()
    }

    /// Drop every output port's downstream senders. Called once a process's
    /// `run` body has returned, so its downstream processes can observe EOF
    /// on `receive` instead of blocking on a sender this process will never
    /// use again.
    fn close_outputs(&self) {
        for output in self.outputs.lock().values() {
            output.close();
        }
    }

    fn inputs_snapshot(&self) -> Vec<Arc<dyn AnyInputPort>> {
        self.inputs.lock().values().cloned().collect()
    }
}

/// The network's lifecycle state (spec §4.4).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkState {
    Built,
    Validated,
    Running,
    Draining,
    Stopped,
    Failed,
}

/// One node in the graph, as surfaced by [`Network::nodes`].
#[derive(Clone, Debug)]
pub struct NodeInfo {
    pub name: String,
    pub state: ProcessState,
}

/// One edge in the graph, as surfaced by [`Network::edges`]. `depth` is a
/// live read of the edge's current in-flight IP count.
#[derive(Clone, Debug)]
pub struct EdgeInfo {
    pub from_process: String,
    pub from_port: String,
    pub to_process: String,
    pub to_port: String,
    pub capacity: usize,
    pub depth: usize,
}

struct EdgeSpec {
    from_process: String,
    from_port: String,
    to_process: String,
    to_port: String,
    capacity: usize,
    conn_index: usize,
}

/// Outcome of one [`Network::run`] call (spec §6).
#[derive(Debug)]
pub struct RunReport {
    pub final_state: NetworkState,
    /// The first failure observed across startup, process bodies and
    /// shutdown — every later failure in the same run is demoted to a
    /// secondary fact rather than overwriting this one (spec §4.4: "primary
    /// cause").
    pub primary_cause: Option<CoreError>,
    /// One outcome per process that reached `run`, in insertion order.
    /// Empty if the run never got past `validate`/`initialize`.
    pub process_outcomes: Vec<(String, Result<()>)>,
}

struct Node {
    process: Arc<dyn Process>,
    registry: Arc<PortRegistry>,
}

/// Owns the process graph and drives its lifecycle end to end.
pub struct Network {
    config: NetworkConfig,
    nodes: Vec<(String, Node)>,
    edges: Vec<EdgeSpec>,
    state: RwLock<NetworkState>,
    process_states: Arc<Mutex<HashMap<String, ProcessState>>>,
    observability: Arc<ObservabilityFacade>,
    cancel: CancellationHandle,
}

impl Network {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            nodes: Vec::new(),
            edges: Vec::new(),
            state: RwLock::new(NetworkState::Built),
            process_states: Arc::new(Mutex::new(HashMap::new())),
            observability: Arc::new(ObservabilityFacade::new()),
            cancel: CancellationHandle::new(),
        }
    }

    pub fn state(&self) -> NetworkState {
        *self.state.read()
    }

    pub fn cancellation(&self) -> &CancellationHandle {
        &self.cancel
    }

    /// Fire the network's cancellation handle directly, e.g. from an
    /// external supervisor. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn subscribe_state_changes(&self, handler: StateChangeHandler) {
        self.observability.subscribe(handler);
    }

    fn set_process_state(&self, name: &str, state: ProcessState) {
        let old = self
            .process_states
            .lock()
            .insert(name.to_string(), state);
        self.observability.emit(StateChangeEvent {
            process_name: name.to_string(),
            old_state: old,
            new_state: state,
            at: std::time::SystemTime::now(),
        });
    }

    /// Add a process under `name`, immediately invoking its
    /// `declare_ports` so its ports are wireable by later `connect` calls.
    /// Fails on a duplicate name.
    pub fn add_process(&mut self, name: impl Into<String>, process: Arc<dyn Process>) -> Result<()> {
        let name = name.into();
        if self.nodes.iter().any(|(n, _)| n == &name) {
            return Err(CoreError::validation(
                codes::VALIDATION_DUPLICATE_PROCESS,
                format!("process `{name}` already added to this network"),
            ));
        }
        let registry = Arc::new(PortRegistry::new());
        process.declare_ports(&registry);
        self.process_states.lock().insert(name.clone(), ProcessState::Created);
        self.nodes.push((name, Node { process, registry }));
        Ok(())
    }

    fn find(&self, name: &str) -> Result<&Node> {
        self.nodes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, node)| node)
            .ok_or_else(|| {
                CoreError::validation(
                    codes::VALIDATION_UNKNOWN_PROCESS,
                    format!("no process named `{name}` in this network"),
                )
            })
    }

    /// Wire `from_process.from_port -> to_process.to_port` with a bounded
    /// channel of `capacity` (or the network's configured default).
    /// Validates that the ports exist, are not already at their declared
    /// fan-out/fan-in limit, and share an element type, before any channel
    /// is built.
    pub async fn connect(
        &mut self,
        from_process: &str,
        from_port: &str,
        to_process: &str,
        to_port: &str,
        capacity: Option<usize>,
    ) -> Result<()> {
        let capacity = capacity.unwrap_or_else(|| self.config.default_connection_capacity());

        let output = self
            .find(from_process)?
            .registry
            .output(from_port)
            .ok_or_else(|| {
                CoreError::validation(
                    codes::VALIDATION_MISSING_PORT,
                    format!("process `{from_process}` has no output port `{from_port}`"),
                )
            })?;
        let input = self
            .find(to_process)?
            .registry
            .input(to_port)
            .ok_or_else(|| {
                CoreError::validation(
                    codes::VALIDATION_MISSING_PORT,
                    format!("process `{to_process}` has no input port `{to_port}`"),
                )
            })?;

        if output.element_type_id() != input.element_type_id() {
            return Err(type_mismatch_error(from_port));
        }
        if output.connection_count() >= output.max_connections() {
            return Err(CoreError::port(
                codes::PORT_MAX_CONNECTIONS,
                format!("output port `{from_process}.{from_port}` is already fully connected"),
            ));
        }
        if input.connection_count().await >= input.max_connections() {
            return Err(CoreError::port(
                codes::PORT_MAX_CONNECTIONS,
                format!("input port `{to_process}.{to_port}` is already fully connected"),
            ));
        }

        let conn_index = output.connection_count();
        let (boxed_tx, boxed_rx) = output.create_channel_pair(capacity)?;
        output.connect_erased(boxed_tx)?;
        input.connect_erased(boxed_rx).await?;

        self.edges.push(EdgeSpec {
            from_process: from_process.to_string(),
            from_port: from_port.to_string(),
            to_process: to_process.to_string(),
            to_port: to_port.to_string(),
            capacity,
            conn_index,
        });
        Ok(())
    }

    /// Queue an Initial Information Packet on `process.port`, to be picked
    /// up by that port's `take_initials()` during the process's own
    /// `initialize` (spec §9 Open Question 2). Must be called before
    /// [`Self::run`]; a value queued after `initialize` has already run is
    /// never delivered.
    pub fn set_initial<T: Send + Sync + 'static>(
        &self,
        process: &str,
        port: &str,
        value: T,
    ) -> Result<()> {
        let input = self.find(process)?.registry.input(port).ok_or_else(|| {
            CoreError::validation(
                codes::VALIDATION_MISSING_PORT,
                format!("process `{process}` has no input port `{port}`"),
            )
        })?;
        if input.element_type_id() != TypeId::of::<T>() {
            return Err(type_mismatch_error(port));
        }
        input.push_initial_erased(Box::new(crate::ip::Ip::new_initial(value)))
    }

    /// Confirm every required port on every process has at least one
    /// connection. Transitions `Built -> Validated` on success.
    pub async fn validate(&mut self) -> Result<()> {
        for (name, node) in &self.nodes {
            for output in node.registry.outputs_snapshot() {
                if output.is_required() && output.connection_count() == 0 {
                    return Err(CoreError::validation(
                        codes::VALIDATION_MISSING_PORT,
                        format!(
                            "process `{name}` required output port `{}` has no connection",
                            output.name()
                        ),
                    ));
                }
            }
            for input in node.registry.inputs_snapshot() {
                if input.is_required() && input.connection_count().await == 0 {
                    return Err(CoreError::validation(
                        codes::VALIDATION_MISSING_PORT,
                        format!(
                            "process `{name}` required input port `{}` has no connection",
                            input.name()
                        ),
                    ));
                }
            }
        }
        *self.state.write() = NetworkState::Validated;
        Ok(())
    }

    /// Current snapshot of every node's lifecycle state, in insertion order.
    pub fn nodes(&self) -> Vec<NodeInfo> {
        let states = self.process_states.lock();
        self.nodes
            .iter()
            .map(|(name, _)| NodeInfo {
                name: name.clone(),
                state: states.get(name).copied().unwrap_or(ProcessState::Created),
            })
            .collect()
    }

    /// Current snapshot of every edge, including a live depth read.
    pub fn edges(&self) -> Vec<EdgeInfo> {
        self.edges
            .iter()
            .filter_map(|e| {
                let node = self.find(&e.from_process).ok()?;
                let output = node.registry.output(&e.from_port)?;
                let depth = output
                    .connection_depths()
                    .get(e.conn_index)
                    .copied()
                    .unwrap_or(0);
                Some(EdgeInfo {
                    from_process: e.from_process.clone(),
                    from_port: e.from_port.clone(),
                    to_process: e.to_process.clone(),
                    to_port: e.to_port.clone(),
                    capacity: e.capacity,
                    depth,
                })
            })
            .collect()
    }

    /// Validate (if not already done), initialize every process in
    /// insertion order, run every process body concurrently, and shut
    /// everything down in reverse order. Never returns early: every
    /// process that reached `initialize` also reaches `shutdown`.
    pub async fn run(&mut self) -> RunReport {
        if self.state() == NetworkState::Built {
            if let Err(e) = self.validate().await {
                *self.state.write() = NetworkState::Failed;
                return RunReport {
                    final_state: NetworkState::Failed,
                    primary_cause: Some(e),
                    process_outcomes: Vec::new(),
                };
            }
        }

        *self.state.write() = NetworkState::Running;

        let mut ctxs: HashMap<String, ProcessContext> = HashMap::new();
        let mut initialized_order: Vec<String> = Vec::new();

        for (name, node) in &self.nodes {
            let ctx = ProcessContext::new(name.clone(), self.cancel.child());
            match node.process.initialize(&ctx).await {
                Ok(()) => {
                    self.set_process_state(name, ProcessState::Initialized);
                    ctxs.insert(name.clone(), ctx);
                    initialized_order.push(name.clone());
                }
                Err(e) => {
                    self.set_process_state(name, ProcessState::Failed);
                    for prior_name in initialized_order.iter().rev() {
                        if let Ok(prior_node) = self.find(prior_name) {
                            let prior_ctx = ctxs.get(prior_name).expect("initialized process has a context");
                            let _ = prior_node.process.shutdown(prior_ctx).await;
                            self.set_process_state(prior_name, ProcessState::Stopped);
                        }
                    }
                    *self.state.write() = NetworkState::Failed;
                    return RunReport {
                        final_state: NetworkState::Failed,
                        primary_cause: Some(e),
                        process_outcomes: Vec::new(),
                    };
                }
            }
        }

        let grace_period = self.config.deadlock_grace_period();
        let watchdog_cause: Arc<Mutex<Option<CoreError>>> = Arc::new(Mutex::new(None));
        let blocked_flags: Vec<Arc<AtomicBool>> = ctxs.values().map(|c| c.blocked_flag()).collect();
        let watchdog_cancel = self.cancel.clone();
        let watchdog_cause_bg = watchdog_cause.clone();
        let watchdog_handle = tokio::spawn(async move {
            let tick = (grace_period / 4).max(Duration::from_millis(10));
            let mut blocked_for = Duration::ZERO;
            loop {
                tokio::time::sleep(tick).await;
                if watchdog_cancel.is_cancelled() {
                    return;
                }
                let all_blocked =
                    !blocked_flags.is_empty() && blocked_flags.iter().all(|f| f.load(Ordering::Acquire));
                if all_blocked {
                    blocked_for += tick;
                    if blocked_for >= grace_period {
                        *watchdog_cause_bg.lock() = Some(CoreError::network_deadlock(
                            "every running process was blocked on a port operation past the configured grace period",
                        ));
                        watchdog_cancel.cancel();
                        return;
                    }
                } else {
                    blocked_for = Duration::ZERO;
                }
            }
        });

        let stopping_cancel = self.cancel.clone();
        let stopping_states = self.process_states.clone();
        let stopping_names: Vec<String> = self.nodes.iter().map(|(n, _)| n.clone()).collect();
        let stopping_handle = tokio::spawn(async move {
            stopping_cancel.cancelled().await;
            let mut states = stopping_states.lock();
            for name in &stopping_names {
                if let Some(s) = states.get_mut(name) {
                    if *s == ProcessState::Running {
                        *s = ProcessState::Stopping;
                    }
                }
            }
        });

        let mut handles: Vec<(String, tokio::task::JoinHandle<Result<()>>)> = Vec::new();
        for name in &initialized_order {
            self.set_process_state(name, ProcessState::Running);
            let node = self.find(name).expect("node exists for initialized process");
            let process = node.process.clone();
            let ctx = ctxs.get(name).cloned().expect("context exists for initialized process");
            let cancel_on_failure = self.cancel.clone();
            let handle = tokio::spawn(async move {
                let outcome = process.run(&ctx).await;
                if let Err(e) = &outcome {
                    if !e.is_cancelled() {
                        cancel_on_failure.cancel();
                    }
                }
                outcome
            });
            handles.push((name.clone(), handle));
        }

        let mut outcomes: Vec<(String, Result<()>)> = Vec::new();
        let mut panic_to_propagate: Option<Box<dyn Any + Send + 'static>> = None;
        for (name, handle) in handles {
            let joined = handle.await;
            // The process's `run` body has returned (however it got there);
            // it will never send again, so its downstream peers must stop
            // waiting on channels it will no longer feed (spec §4.4
            // termination condition 1).
            if let Ok(node) = self.find(&name) {
                node.registry.close_outputs();
            }
            match joined {
                Ok(outcome) => {
                    let state = match &outcome {
                        Ok(()) => ProcessState::Stopped,
                        Err(e) if e.is_cancelled() => ProcessState::Stopped,
                        Err(_) => ProcessState::Failed,
                    };
                    self.set_process_state(&name, state);
                    outcomes.push((name, outcome));
                }
                Err(join_err) if join_err.is_panic() => {
                    self.cancel.cancel();
                    self.set_process_state(&name, ProcessState::Failed);
                    match self.config.panic_policy() {
                        PanicPolicy::Recover => {
                            outcomes.push((
                                name.clone(),
                                Err(CoreError::process_failure(format!("process `{name}` panicked"))),
                            ));
                        }
                        PanicPolicy::Propagate => {
                            panic_to_propagate = Some(join_err.into_panic());
                        }
                    }
                }
                Err(_cancelled) => {
                    self.set_process_state(&name, ProcessState::Failed);
                    outcomes.push((
                        name.clone(),
                        Err(CoreError::process_failure(format!("process `{name}` task was aborted"))),
                    ));
                }
            }
        }

        watchdog_handle.abort();
        stopping_handle.abort();

        let mut primary_cause = watchdog_cause.lock().take();
        let mut is_failure = primary_cause.is_some();
        if primary_cause.is_none() {
            if let Some(e) = outcomes
                .iter()
                .find(|(_, r)| matches!(r, Err(e) if !e.is_cancelled()))
                .and_then(|(_, r)| r.as_ref().err())
            {
                primary_cause = Some(CoreError::new(e.code(), e.category(), e.message().to_string()));
                is_failure = true;
            }
        }

        for name in initialized_order.iter().rev() {
            let node = self.find(name).expect("node exists for initialized process");
            let ctx = ctxs.get(name).expect("context exists for initialized process");
            let result = tokio::time::timeout(self.config.shutdown_timeout(), node.process.shutdown(ctx)).await;
            match result {
                Ok(Ok(())) => {
                    let mut states = self.process_states.lock();
                    let entry = states.entry(name.clone()).or_insert(ProcessState::Stopped);
                    if *entry != ProcessState::Failed {
                        *entry = ProcessState::Stopped;
                    }
                }
                Ok(Err(e)) => {
                    self.set_process_state(name, ProcessState::Failed);
                    if primary_cause.is_none() {
                        primary_cause = Some(e);
                    }
                    is_failure = true;
                }
                Err(_elapsed) => {
                    self.set_process_state(name, ProcessState::Failed);
                    if primary_cause.is_none() {
                        primary_cause = Some(CoreError::shutdown_timeout(name));
                    }
                    is_failure = true;
                }
            }
        }

        // A run that ended purely because the network's own cancellation
        // handle fired (no process failure, no deadlock, no shutdown error)
        // is a clean stop, not a failure (spec §8 scenario 3) — but the
        // report still names `Cancelled` as why the run ended.
        if primary_cause.is_none() && self.cancel.is_cancelled() {
            primary_cause = Some(CoreError::cancelled());
        }

        let final_state = if is_failure {
            NetworkState::Failed
        } else {
            NetworkState::Stopped
        };
        *self.state.write() = final_state;

        if let Some(payload) = panic_to_propagate {
            std::panic::resume_unwind(payload);
        }

        RunReport {
            final_state,
            primary_cause,
            process_outcomes: outcomes,
        }
    }
}
