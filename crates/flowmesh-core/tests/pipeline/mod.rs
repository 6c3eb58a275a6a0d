//! End-to-end scenario tests, one per seed scenario named in spec §8.
//!
//! Exercised entirely through `flowmesh_core`'s public API, the same surface
//! an external crate would use — no internal module reaches into the
//! runtime's guts.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use flowmesh_core::bracket::BracketManager;
use flowmesh_core::network::{Network, NetworkState, PortRegistry};
use flowmesh_core::process::{Process, ProcessContext};
use flowmesh_core::testkit::{VecSink, VecSource};
use flowmesh_core::{CancellationHandle, Connection, Ip, NetworkConfig, OutputPort, Result};
use parking_lot::Mutex;

struct Uppercase {
    input: Arc<flowmesh_core::InputPort<String>>,
    output: Arc<OutputPort<String>>,
}

impl Uppercase {
    fn new() -> Self {
        Self {
            input: Arc::new(flowmesh_core::InputPort::new("in", true)),
            output: Arc::new(OutputPort::new("out", true)),
        }
    }
}

#[async_trait]
impl Process for Uppercase {
    fn name(&self) -> &str {
        "uppercase"
    }
    fn declare_ports(&self, registry: &PortRegistry) {
        registry.register_input(self.input.clone());
        registry.register_output(self.output.clone());
    }
    async fn initialize(&self, _ctx: &ProcessContext) -> Result<()> {
        Ok(())
    }
    async fn run(&self, ctx: &ProcessContext) -> Result<()> {
        loop {
            let ip = match ctx.receive(&self.input).await {
                Ok(ip) => ip,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(_) => return Ok(()),
            };
            let Some(payload) = ip.into_payload() else { continue };
            if ctx.send(&self.output, Ip::new_normal(payload.to_uppercase())).await.is_err() {
                return Ok(());
            }
        }
    }
    async fn shutdown(&self, _ctx: &ProcessContext) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn scenario_1_upper_case_pipeline() {
    let source = Arc::new(VecSource::new(
        "source",
        ["hello".to_string(), "world".to_string(), "Test".to_string()],
    ));
    let sink = Arc::new(VecSink::<String>::new("sink"));
    let received = sink.received();

    let mut network = Network::new(NetworkConfig::default());
    network.add_process("source", source).unwrap();
    network.add_process("uppercase", Arc::new(Uppercase::new())).unwrap();
    network.add_process("sink", sink).unwrap();
    network.connect("source", "out", "uppercase", "in", Some(4)).await.unwrap();
    network.connect("uppercase", "out", "sink", "in", Some(4)).await.unwrap();

    let report = network.run().await;
    assert_eq!(report.final_state, NetworkState::Stopped);
    assert_eq!(
        *received.lock(),
        vec!["HELLO".to_string(), "WORLD".to_string(), "TEST".to_string()]
    );
}

#[tokio::test]
async fn scenario_2_fan_out_broadcast() {
    let source = Arc::new(VecSource::new("source", [1, 2, 3]));
    let logger_a = Arc::new(VecSink::<i32>::new("logger_a"));
    let logger_b = Arc::new(VecSink::<i32>::new("logger_b"));
    let logger_c = Arc::new(VecSink::<i32>::new("logger_c"));
    let (recv_a, recv_b, recv_c) = (logger_a.received(), logger_b.received(), logger_c.received());

    let mut network = Network::new(NetworkConfig::default());
    network.add_process("source", source).unwrap();
    network.add_process("logger_a", logger_a).unwrap();
    network.add_process("logger_b", logger_b).unwrap();
    network.add_process("logger_c", logger_c).unwrap();
    network.connect("source", "out", "logger_a", "in", Some(4)).await.unwrap();
    network.connect("source", "out", "logger_b", "in", Some(4)).await.unwrap();
    network.connect("source", "out", "logger_c", "in", Some(4)).await.unwrap();

    let report = network.run().await;
    assert_eq!(report.final_state, NetworkState::Stopped);
    assert_eq!(*recv_a.lock(), vec![1, 2, 3]);
    assert_eq!(*recv_b.lock(), vec![1, 2, 3]);
    assert_eq!(*recv_c.lock(), vec![1, 2, 3]);
}

struct InfiniteSource {
    output: Arc<OutputPort<u64>>,
}

#[async_trait]
impl Process for InfiniteSource {
    fn name(&self) -> &str {
        "infinite_source"
    }
    fn declare_ports(&self, registry: &PortRegistry) {
        registry.register_output(self.output.clone());
    }
    async fn initialize(&self, _ctx: &ProcessContext) -> Result<()> {
        Ok(())
    }
    async fn run(&self, ctx: &ProcessContext) -> Result<()> {
        let mut next = 0u64;
        loop {
            if ctx.send(&self.output, Ip::new_normal(next)).await.is_err() {
                return Ok(());
            }
            next += 1;
        }
    }
    async fn shutdown(&self, _ctx: &ProcessContext) -> Result<()> {
        Ok(())
    }
}

struct SlowMapper {
    input: Arc<flowmesh_core::InputPort<u64>>,
    output: Arc<OutputPort<u64>>,
    shutdown_ran: Arc<AtomicUsize>,
}

#[async_trait]
impl Process for SlowMapper {
    fn name(&self) -> &str {
        "slow_mapper"
    }
    fn declare_ports(&self, registry: &PortRegistry) {
        registry.register_input(self.input.clone());
        registry.register_output(self.output.clone());
    }
    async fn initialize(&self, _ctx: &ProcessContext) -> Result<()> {
        Ok(())
    }
    async fn run(&self, ctx: &ProcessContext) -> Result<()> {
        loop {
            let ip = match ctx.receive(&self.input).await {
                Ok(ip) => ip,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(_) => return Ok(()),
            };
            tokio::time::sleep(Duration::from_millis(20)).await;
            let Some(payload) = ip.into_payload() else { continue };
            if ctx.send(&self.output, Ip::new_normal(payload)).await.is_err() {
                return Ok(());
            }
        }
    }
    async fn shutdown(&self, _ctx: &ProcessContext) -> Result<()> {
        self.shutdown_ran.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn scenario_3_cancellation_mid_flight() {
    let source = Arc::new(InfiniteSource {
        output: Arc::new(OutputPort::new("out", true)),
    });
    let shutdown_ran = Arc::new(AtomicUsize::new(0));
    let mapper = Arc::new(SlowMapper {
        input: Arc::new(flowmesh_core::InputPort::new("in", true)),
        output: Arc::new(OutputPort::new("out", true)),
        shutdown_ran: shutdown_ran.clone(),
    });
    let sink = Arc::new(VecSink::<u64>::new("sink"));

    let mut network = Network::new(NetworkConfig::default());
    network.add_process("source", source).unwrap();
    network.add_process("mapper", mapper).unwrap();
    network.add_process("sink", sink).unwrap();
    network.connect("source", "out", "mapper", "in", Some(4)).await.unwrap();
    network.connect("mapper", "out", "sink", "in", Some(4)).await.unwrap();

    let cancel_handle = network.cancellation().clone();
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel_handle.cancel();
    });

    let report = network.run().await;
    canceller.await.unwrap();

    assert_eq!(report.final_state, NetworkState::Stopped);
    let cause = report.primary_cause.expect("cancellation should be reported");
    assert!(cause.is_cancelled());
    for node in network.nodes() {
        assert_ne!(node.state, flowmesh_core::ProcessState::Running);
    }
    assert_eq!(shutdown_ran.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn scenario_4_bounded_buffer_backpressure() {
    let total = 20;
    let source = Arc::new(VecSource::new("source", 0..total));
    let sink = Arc::new(VecSink::<i32>::new("sink"));
    let received = sink.received();

    let mut network = Network::new(NetworkConfig::default());
    network.add_process("source", source).unwrap();
    network.add_process("sink", sink).unwrap();
    network.connect("source", "out", "sink", "in", Some(2)).await.unwrap();

    let report = network.run().await;
    assert_eq!(report.final_state, NetworkState::Stopped);
    assert_eq!(received.lock().len() as i32, total);
    assert_eq!(*received.lock(), (0..total).collect::<Vec<_>>());
}

#[tokio::test]
async fn scenario_5_port_connection_cap() {
    let output = OutputPort::<i32>::new("out", true);
    let first = flowmesh_core::InputPort::<i32>::new("a", true);

    let (tx1, rx1) = Connection::<i32>::new(4).unwrap().split();
    output.connect(tx1).unwrap();
    first.connect(rx1).await.unwrap();

    let (tx2, _rx2) = Connection::<i32>::new(4).unwrap().split();
    let connect_err = output.connect(tx2).unwrap_err();
    assert_eq!(connect_err.code(), flowmesh_core::error::codes::PORT_MAX_CONNECTIONS);

    let cancel = CancellationHandle::new();
    output.send(&cancel, Ip::new_normal(42)).await.unwrap();
    let ip = first.receive(&cancel).await.unwrap();
    assert_eq!(ip.into_payload(), Some(42));
}

struct BracketSink {
    input: Arc<flowmesh_core::InputPort<String>>,
    manager: Mutex<BracketManager>,
}

#[async_trait]
impl Process for BracketSink {
    fn name(&self) -> &str {
        "bracket_sink"
    }
    fn declare_ports(&self, registry: &PortRegistry) {
        registry.register_input(self.input.clone());
    }
    async fn initialize(&self, _ctx: &ProcessContext) -> Result<()> {
        Ok(())
    }
    async fn run(&self, ctx: &ProcessContext) -> Result<()> {
        loop {
            let ip = match ctx.receive(&self.input).await {
                Ok(ip) => ip,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(_) => return Ok(()),
            };
            self.manager.lock().observe(ip.kind())?;
        }
    }
    async fn shutdown(&self, _ctx: &ProcessContext) -> Result<()> {
        Ok(())
    }
}

struct BracketSource {
    output: Arc<OutputPort<String>>,
}

#[async_trait]
impl Process for BracketSource {
    fn name(&self) -> &str {
        "bracket_source"
    }
    fn declare_ports(&self, registry: &PortRegistry) {
        registry.register_output(self.output.clone());
    }
    async fn initialize(&self, _ctx: &ProcessContext) -> Result<()> {
        Ok(())
    }
    async fn run(&self, ctx: &ProcessContext) -> Result<()> {
        let sequence = [
            Ip::new_open_bracket(),
            Ip::new_normal("x".to_string()),
            Ip::new_close_bracket(),
            Ip::new_close_bracket(),
        ];
        for ip in sequence {
            if ctx.send(&self.output, ip).await.is_err() {
                return Ok(());
            }
        }
        Ok(())
    }
    async fn shutdown(&self, _ctx: &ProcessContext) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn scenario_6_unbalanced_bracket() {
    let source = Arc::new(BracketSource {
        output: Arc::new(OutputPort::new("out", true)),
    });
    let sink = Arc::new(BracketSink {
        input: Arc::new(flowmesh_core::InputPort::new("in", true)),
        manager: Mutex::new(BracketManager::new()),
    });

    let mut network = Network::new(NetworkConfig::default());
    network.add_process("source", source).unwrap();
    network.add_process("sink", sink).unwrap();
    network.connect("source", "out", "sink", "in", Some(4)).await.unwrap();

    let report = network.run().await;
    assert_eq!(report.final_state, NetworkState::Failed);
    let cause = report.primary_cause.expect("unbalanced bracket should surface a cause");
    assert_eq!(cause.code(), flowmesh_core::error::codes::UNBALANCED_BRACKET);

    let sink_outcome = report
        .process_outcomes
        .iter()
        .find(|(name, _)| name == "sink")
        .map(|(_, r)| r)
        .expect("sink outcome present");
    assert!(sink_outcome.is_err());

    let source_outcome = report
        .process_outcomes
        .iter()
        .find(|(name, _)| name == "source")
        .map(|(_, r)| r)
        .expect("source outcome present");
    match source_outcome {
        Err(e) => assert!(e.is_cancelled()),
        Ok(()) => {}
    }
}
