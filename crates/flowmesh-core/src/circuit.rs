//! Optional circuit-breaker wrapper (spec §4.4): a composition wrapper
//! around any [`Process`], not a subclass (spec §9). State is local to the
//! wrapper and does not infect peers — two breakers wrapping two different
//! processes never share a clock or a failure count.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{CoreError, Result};
use crate::network::PortRegistry;
use crate::process::{Process, ProcessContext};

/// Public state of a [`CircuitBreaker`], exposed for observability.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Counts consecutive failures of the wrapped operation within the
/// breaker's lifetime; once `failure_threshold` is exceeded it transitions
/// to `Open` and short-circuits every call for `reset_timeout`, then allows
/// exactly one trial call while `HalfOpen`, which decides `Closed` or `Open`.
pub struct CircuitBreaker<P> {
    inner_process: Arc<P>,
    failure_threshold: u32,
    reset_timeout: Duration,
    state: Mutex<Inner>,
}

impl<P> CircuitBreaker<P> {
    pub fn new(inner_process: Arc<P>, failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            inner_process,
            failure_threshold,
            reset_timeout,
            state: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state.lock().state
    }

    /// Guard one invocation of `op` through the breaker. `Open` short-circuits
    /// immediately with `CoreError::process_failure`; `HalfOpen` admits
    /// exactly one trial and its outcome decides the next state.
    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        {
            let mut guard = self.state.lock();
            match guard.state {
                BreakerState::Open => {
                    let elapsed = guard.opened_at.map(|at| at.elapsed()).unwrap_or_default();
                    if elapsed >= self.reset_timeout {
                        guard.state = BreakerState::HalfOpen;
                    } else {
                        return Err(CoreError::process_failure(
                            "circuit breaker open: short-circuiting call",
                        ));
                    }
                }
                BreakerState::Closed | BreakerState::HalfOpen => {}
            }
        }

        let outcome = op().await;

        let mut guard = self.state.lock();
        match &outcome {
            Ok(_) => {
                guard.state = BreakerState::Closed;
                guard.consecutive_failures = 0;
                guard.opened_at = None;
            }
            Err(e) if e.is_cancelled() => {
                // Cancellation is not a failure (spec §7); leave the breaker
                // state exactly as it was.
            }
            Err(_) => {
                guard.consecutive_failures += 1;
                if guard.state == BreakerState::HalfOpen
                    || guard.consecutive_failures > self.failure_threshold
                {
                    guard.state = BreakerState::Open;
                    guard.opened_at = Some(Instant::now());
                }
            }
        }
        outcome
    }
}

#[async_trait]
impl<P: Process> Process for CircuitBreaker<P> {
    fn name(&self) -> &str {
        self.inner_process.name()
    }

    fn declare_ports(&self, registry: &PortRegistry) {
        self.inner_process.declare_ports(registry);
    }

    async fn initialize(&self, ctx: &ProcessContext) -> Result<()> {
        let inner = self.inner_process.clone();
        self.call(|| async move { inner.initialize(ctx).await }).await
    }

    async fn run(&self, ctx: &ProcessContext) -> Result<()> {
        let inner = self.inner_process.clone();
        self.call(|| async move { inner.run(ctx).await }).await
    }

    async fn shutdown(&self, ctx: &ProcessContext) -> Result<()> {
        // Shutdown must always run regardless of breaker state (spec §4.3),
        // so it bypasses the breaker entirely.
        self.inner_process.shutdown(ctx).await
    }
}
