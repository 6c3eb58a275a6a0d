//! Ports and connections (spec §3, §4.2).
//!
//! A [`Connection<T>`] is a bounded FIFO channel linking exactly one
//! [`OutputPort<T>`] to exactly one [`InputPort<T>`]. An output port with more
//! than one connection is a fan-out broadcast: the send is per-downstream
//! backpressured (spec §9 Open Question 1, decided in `SPEC_FULL.md` §12) —
//! each connection independently gates on its own buffer, the slowest
//! consumer determines when the whole `send` call returns.
//!
//! Both `send` and `receive` race their buffer operation against the
//! network's [`CancellationHandle`]; on cancellation the call returns
//! promptly without leaking the IP (a failed `send` hands the IP back to the
//! caller via [`SendError`]).

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::future::select_all;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::cancel::CancellationHandle;
use crate::error::{codes, CoreError, ErrorCategory, Result};
use crate::ip::Ip;

/// Direction of a port, used only for introspection (spec §6 `nodes()`/`edges()`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// The sending half of one connection edge. Tracks the edge's current
/// in-flight depth so `Network::edges()` (spec §6) and property tests for
/// §8 invariant 2 can observe it without touching tokio's channel internals.
pub struct ConnSender<T> {
    tx: mpsc::Sender<Ip<T>>,
    depth: Arc<AtomicUsize>,
}

/// The receiving half of one connection edge.
pub struct ConnReceiver<T> {
    rx: mpsc::Receiver<Ip<T>>,
    depth: Arc<AtomicUsize>,
}

/// One bounded FIFO buffer realizing a single edge of the network graph.
/// `capacity` is fixed at construction and must be strictly positive (spec
/// §3: "zero is disallowed").
pub struct Connection<T> {
    capacity: usize,
    sender: ConnSender<T>,
    receiver: ConnReceiver<T>,
}

impl<T> Connection<T> {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(CoreError::validation(
                codes::VALIDATION_BAD_CAPACITY,
                "connection capacity must be >= 1",
            ));
        }
        let (tx, rx) = mpsc::channel(capacity);
        let depth = Arc::new(AtomicUsize::new(0));
        Ok(Self {
            capacity,
            sender: ConnSender {
                tx,
                depth: depth.clone(),
            },
            receiver: ConnReceiver { rx, depth },
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Split into the sender/receiver halves registered on the two ports.
    pub fn split(self) -> (ConnSender<T>, ConnReceiver<T>) {
        (self.sender, self.receiver)
    }
}

/// Error returned by [`OutputPort::send`]. Hands the unsent IP back to the
/// caller so it is never silently dropped (spec §8 property 4: "does not leak
/// the IP").
pub struct SendError<T> {
    pub error: CoreError,
    pub ip: Ip<T>,
}

impl<T> fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendError").field("error", &self.error).finish()
    }
}

impl<T> fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl<T> std::error::Error for SendError<T> {}

struct PortMeta {
    name: String,
    description: String,
    required: bool,
    max_connections: usize,
}

/// A named, typed output endpoint on a process.
pub struct OutputPort<T> {
    meta: PortMeta,
    connections: Mutex<Vec<ConnSender<T>>>,
}

impl<T: Clone> OutputPort<T> {
    pub fn new(name: impl Into<String>, required: bool) -> Self {
        Self::with_max_connections(name, required, 1)
    }

    pub fn with_max_connections(name: impl Into<String>, required: bool, max_connections: usize) -> Self {
        Self {
            meta: PortMeta {
                name: name.into(),
                description: String::new(),
                required,
                max_connections,
            },
            connections: Mutex::new(Vec::new()),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.meta.description = description.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn is_required(&self) -> bool {
        self.meta.required
    }

    pub fn max_connections(&self) -> usize {
        self.meta.max_connections
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Current in-flight depth of every connection registered on this port,
    /// in registration order.
    pub fn connection_depths(&self) -> Vec<usize> {
        self.connections
            .lock()
            .iter()
            .map(|c| c.depth.load(Ordering::Relaxed))
            .collect()
    }

    /// Drop every registered downstream sender. Once called, every connected
    /// input port observes this edge as closed as soon as it drains whatever
    /// is already buffered (spec §4.4 termination condition 1). The owning
    /// process must not call [`Self::send`] again afterwards; `Network::run`
    /// calls this exactly once, right after the process's `run` body returns.
    pub fn close(&self) {
        self.connections.lock().clear();
    }

    /// Register a new downstream sender. Fails with `MaxConnectionsExceeded`
    /// once the port's declared fan-out limit is reached.
    pub fn connect(&self, sender: ConnSender<T>) -> Result<()> {
        let mut connections = self.connections.lock();
        if connections.len() >= self.meta.max_connections {
            return Err(CoreError::port(
                codes::PORT_MAX_CONNECTIONS,
                format!(
                    "output port `{}` already has {} of {} connections",
                    self.meta.name,
                    connections.len(),
                    self.meta.max_connections
                ),
            ));
        }
        connections.push(sender);
        Ok(())
    }

    /// Broadcast `ip` to every connected downstream, in registration order.
    /// Each downstream is backpressured independently; the call returns once
    /// every downstream has accepted a copy (or the first error/cancellation
    /// fires). The IP handed to the *last* connection is the caller's
    /// original value, so a pre-final-step cancellation hands the original
    /// back via [`SendError::ip`] rather than a clone.
    pub async fn send(
        &self,
        cancel: &CancellationHandle,
        ip: Ip<T>,
    ) -> std::result::Result<(), SendError<T>> {
        let senders: Vec<(mpsc::Sender<Ip<T>>, Arc<AtomicUsize>)> = {
            self.connections
                .lock()
                .iter()
                .map(|c| (c.tx.clone(), c.depth.clone()))
                .collect()
        };
        if senders.is_empty() {
            return Err(SendError {
                error: CoreError::port(
                    codes::PORT_NO_CONNECTIONS,
                    format!("output port `{}` has no connections", self.meta.name),
                ),
                ip,
            });
        }

        let last = senders.len() - 1;
        let mut pending = Some(ip);
        for (idx, (tx, depth)) in senders.iter().enumerate() {
            let outgoing = if idx == last {
                pending.take().expect("pending ip present until final send")
            } else {
                pending
                    .as_ref()
                    .expect("pending ip present before final send")
                    .clone_ip()
            };

            // Counted before the item is actually enqueued: tokio only
            // resolves `send` once the slot is occupied, so incrementing
            // after the await would leave a window where a receiver has
            // already dequeued and decremented past us, underflowing the
            // counter (spec §8 property 2's depth bound must never be
            // observed transiently negative).
            depth.fetch_add(1, Ordering::Relaxed);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    depth.fetch_sub(1, Ordering::Relaxed);
                    return Err(SendError { error: CoreError::cancelled(), ip: outgoing });
                }
                result = tx.send(outgoing) => {
                    match result {
                        Ok(()) => {}
                        Err(send_err) => {
                            depth.fetch_sub(1, Ordering::Relaxed);
                            return Err(SendError {
                                error: CoreError::port(
                                    codes::PORT_CHANNEL_CLOSED,
                                    format!("downstream of `{}` dropped its receiver", self.meta.name),
                                ),
                                ip: send_err.0,
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// A named, typed input endpoint on a process.
pub struct InputPort<T> {
    meta: PortMeta,
    connections: tokio::sync::Mutex<Vec<ConnReceiver<T>>>,
    initials: Mutex<Vec<Ip<T>>>,
}

impl<T> InputPort<T> {
    pub fn new(name: impl Into<String>, required: bool) -> Self {
        Self::with_max_connections(name, required, 1)
    }

    pub fn with_max_connections(name: impl Into<String>, required: bool, max_connections: usize) -> Self {
        Self {
            meta: PortMeta {
                name: name.into(),
                description: String::new(),
                required,
                max_connections,
            },
            connections: tokio::sync::Mutex::new(Vec::new()),
            initials: Mutex::new(Vec::new()),
        }
    }

    /// Queue an Initial Information Packet for this port, to be picked up by
    /// [`Self::take_initials`] during the owning process's `initialize`
    /// (spec §9 Open Question 2, decided in `SPEC_FULL.md` §12). Never
    /// interleaved with normal IPs arriving over a `Connection`.
    pub fn push_initial(&self, ip: Ip<T>) {
        self.initials.lock().push(ip);
    }

    /// Drain every IIP queued for this port so far. Idempotent after the
    /// first call in the sense that a port with no further `push_initial`
    /// calls returns an empty `Vec` on subsequent calls.
    pub fn take_initials(&self) -> Vec<Ip<T>> {
        std::mem::take(&mut *self.initials.lock())
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.meta.description = description.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn is_required(&self) -> bool {
        self.meta.required
    }

    pub fn max_connections(&self) -> usize {
        self.meta.max_connections
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.lock().await.len()
    }

    /// Register a new upstream receiver. Fails with `MaxConnectionsExceeded`
    /// once the port's declared fan-in limit is reached.
    pub async fn connect(&self, receiver: ConnReceiver<T>) -> Result<()> {
        let mut connections = self.connections.lock().await;
        if connections.len() >= self.meta.max_connections {
            return Err(CoreError::port(
                codes::PORT_MAX_CONNECTIONS,
                format!(
                    "input port `{}` already has {} of {} connections",
                    self.meta.name,
                    connections.len(),
                    self.meta.max_connections
                ),
            ));
        }
        connections.push(receiver);
        Ok(())
    }

    /// Receive the next IP from whichever connected channel is ready first
    /// (fair across connections, spec §4.2). Returns `ChannelClosed` only
    /// once every connection is both closed and drained; `NoConnections` if
    /// the port was never wired.
    pub async fn receive(&self, cancel: &CancellationHandle) -> Result<Ip<T>> {
        let mut connections = self.connections.lock().await;
        if connections.is_empty() {
            return Err(CoreError::port(
                codes::PORT_NO_CONNECTIONS,
                format!("input port `{}` has no connections", self.meta.name),
            ));
        }

        loop {
            if connections.is_empty() {
                return Err(CoreError::port(
                    codes::PORT_CHANNEL_CLOSED,
                    format!("input port `{}` is closed and drained", self.meta.name),
                ));
            }

            let recv_futs = connections.iter_mut().map(|c| Box::pin(c.rx.recv()));
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(CoreError::cancelled());
                }
                (item, idx, _rest) = select_all(recv_futs) => {
                    match item {
                        Some(ip) => {
                            connections[idx].depth.fetch_sub(1, Ordering::Relaxed);
                            return Ok(ip);
                        }
                        None => {
                            // This connection's upstream closed and drained; drop
                            // it and keep trying the remaining fan-in connections.
                            connections.remove(idx);
                        }
                    }
                }
            }
        }
    }
}
