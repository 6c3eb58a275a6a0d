//! Contract tests for spec §8 invariant 3: "∀ process P, #{initialize calls}
//! ≤ 1 ∧ #{shutdown calls} ≤ 1 across its entire lifecycle, and shutdown is
//! called iff initialize succeeded."
//!
//! Driven entirely through [`flowmesh_core::Network`], not `BaseProcess`
//! directly — `BaseProcess`'s own one-shot claim guarantees are unit-tested
//! in `flowmesh_core::process`; this file checks that `Network::run` upholds
//! the same contract at the orchestration level.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use flowmesh_core::network::{Network, NetworkState, PortRegistry};
use flowmesh_core::process::{Process, ProcessContext};
use flowmesh_core::{NetworkConfig, Result};

#[derive(Default)]
struct Counters {
    initialize: AtomicUsize,
    run: AtomicUsize,
    shutdown: AtomicUsize,
}

struct CountingProcess {
    name: String,
    counters: Arc<Counters>,
    fail_initialize: bool,
}

#[async_trait]
impl Process for CountingProcess {
    fn name(&self) -> &str {
        &self.name
    }
    fn declare_ports(&self, _registry: &PortRegistry) {}
    async fn initialize(&self, _ctx: &ProcessContext) -> Result<()> {
        self.counters.initialize.fetch_add(1, Ordering::SeqCst);
        if self.fail_initialize {
            return Err(flowmesh_core::CoreError::config("deliberately rejected"));
        }
        Ok(())
    }
    async fn run(&self, ctx: &ProcessContext) -> Result<()> {
        self.counters.run.fetch_add(1, Ordering::SeqCst);
        ctx.cancellation().cancelled().await;
        Err(flowmesh_core::CoreError::cancelled())
    }
    async fn shutdown(&self, _ctx: &ProcessContext) -> Result<()> {
        self.counters.shutdown.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn every_initialized_process_is_shut_down_exactly_once() {
    let counters_a = Arc::new(Counters::default());
    let counters_b = Arc::new(Counters::default());

    let mut network = Network::new(NetworkConfig::default());
    network
        .add_process(
            "a",
            Arc::new(CountingProcess {
                name: "a".into(),
                counters: counters_a.clone(),
                fail_initialize: false,
            }),
        )
        .unwrap();
    network
        .add_process(
            "b",
            Arc::new(CountingProcess {
                name: "b".into(),
                counters: counters_b.clone(),
                fail_initialize: false,
            }),
        )
        .unwrap();

    let cancel_handle = network.cancellation().clone();
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        cancel_handle.cancel();
    });
    let report = network.run().await;
    canceller.await.unwrap();

    assert_eq!(report.final_state, NetworkState::Stopped);
    for counters in [&counters_a, &counters_b] {
        assert_eq!(counters.initialize.load(Ordering::SeqCst), 1);
        assert_eq!(counters.run.load(Ordering::SeqCst), 1);
        assert_eq!(counters.shutdown.load(Ordering::SeqCst), 1);
    }
}

#[tokio::test]
async fn failed_initialize_rolls_back_prior_processes_without_ever_running() {
    let counters_a = Arc::new(Counters::default());
    let counters_b = Arc::new(Counters::default());

    let mut network = Network::new(NetworkConfig::default());
    network
        .add_process(
            "a",
            Arc::new(CountingProcess {
                name: "a".into(),
                counters: counters_a.clone(),
                fail_initialize: false,
            }),
        )
        .unwrap();
    network
        .add_process(
            "b",
            Arc::new(CountingProcess {
                name: "b".into(),
                counters: counters_b.clone(),
                fail_initialize: true,
            }),
        )
        .unwrap();

    let report = network.run().await;

    assert_eq!(report.final_state, NetworkState::Failed);
    assert!(report.primary_cause.is_some());
    // `a` initialized successfully before `b` failed, so it must have been
    // rolled back via `shutdown` — but it never reached `run`, since the
    // network never starts any process body until every process has
    // initialized.
    assert_eq!(counters_a.initialize.load(Ordering::SeqCst), 1);
    assert_eq!(counters_a.shutdown.load(Ordering::SeqCst), 1);
    assert_eq!(counters_a.run.load(Ordering::SeqCst), 0);
    // `b` itself never reaches `shutdown`: its own `initialize` is what
    // failed, so there is nothing to roll back for it.
    assert_eq!(counters_b.initialize.load(Ordering::SeqCst), 1);
    assert_eq!(counters_b.shutdown.load(Ordering::SeqCst), 0);
    assert_eq!(counters_b.run.load(Ordering::SeqCst), 0);
}
