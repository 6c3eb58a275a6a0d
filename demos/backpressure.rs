//! Runs seed scenario 4 end to end: a fast source feeding a small, bounded
//! connection into a deliberately slow consumer, showing that the producer
//! is paced rather than the buffer growing unbounded or items being dropped.
//!
//! ```bash
//! cargo run --bin backpressure
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use flowmesh_core::error::Result;
use flowmesh_core::network::PortRegistry;
use flowmesh_core::process::{Process, ProcessContext};
use flowmesh_core::testkit::VecSource;
use flowmesh_core::{InputPort, Network, NetworkConfig, NetworkState};

const ITEM_COUNT: usize = 12;
const CAPACITY: usize = 2;
const CONSUME_DELAY: Duration = Duration::from_millis(25);

/// Drains one item at a time with an artificial delay, so the upstream
/// connection's bounded capacity visibly gates how fast the source can run
/// ahead.
struct SlowSink {
    input: Arc<InputPort<i32>>,
}

impl SlowSink {
    fn new() -> Self {
        Self {
            input: Arc::new(InputPort::new("in", true)),
        }
    }
}

#[async_trait]
impl Process for SlowSink {
    fn name(&self) -> &str {
        "slow-sink"
    }

    fn declare_ports(&self, registry: &PortRegistry) {
        registry.register_input(self.input.clone());
    }

    async fn initialize(&self, _ctx: &ProcessContext) -> Result<()> {
        Ok(())
    }

    async fn run(&self, ctx: &ProcessContext) -> Result<()> {
        let mut received = 0usize;
        loop {
            match ctx.receive(&self.input).await {
                Ok(ip) => {
                    tokio::time::sleep(CONSUME_DELAY).await;
                    if ip.payload().is_some() {
                        received += 1;
                    }
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(_) => {
                    println!("slow-sink drained {received} items before the connection closed");
                    return Ok(());
                }
            }
        }
    }

    async fn shutdown(&self, _ctx: &ProcessContext) -> Result<()> {
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let source = Arc::new(VecSource::new("source", 0..ITEM_COUNT as i32));
    let sink = Arc::new(SlowSink::new());

    let mut network = Network::new(NetworkConfig::default());
    network.add_process("source", source).unwrap();
    network.add_process("slow-sink", sink).unwrap();
    network
        .connect("source", "out", "slow-sink", "in", Some(CAPACITY))
        .await
        .unwrap();

    let started = Instant::now();
    let report = network.run().await;
    let elapsed = started.elapsed();

    assert_eq!(report.final_state, NetworkState::Stopped);
    println!(
        "ran {ITEM_COUNT} items through a capacity-{CAPACITY} connection in {elapsed:?} \
         (a lower bound of ~{:?} if the source were allowed to race ahead unbounded)",
        CONSUME_DELAY * ITEM_COUNT as u32
    );
}
