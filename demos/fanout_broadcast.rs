//! Runs seed scenario 2 end to end: one source broadcasting the same
//! sequence to three independent downstream sinks.
//!
//! ```bash
//! cargo run --bin fanout_broadcast
//! ```

use std::sync::Arc;

use flowmesh_core::testkit::{VecSink, VecSource};
use flowmesh_core::{Network, NetworkConfig, NetworkState};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let source = Arc::new(VecSource::new("source", [1, 2, 3, 4, 5]));
    let sink_names = ["sink-a", "sink-b", "sink-c"];
    let sinks: Vec<Arc<VecSink<i32>>> = sink_names
        .iter()
        .map(|name| Arc::new(VecSink::<i32>::new(*name)))
        .collect();

    let mut network = Network::new(NetworkConfig::default());
    network.add_process("source", source).unwrap();
    for (name, sink) in sink_names.iter().zip(&sinks) {
        network.add_process(*name, sink.clone()).unwrap();
    }
    for name in sink_names {
        network
            .connect("source", "out", name, "in", Some(4))
            .await
            .unwrap();
    }

    let report = network.run().await;
    assert_eq!(report.final_state, NetworkState::Stopped);
    for (name, sink) in sink_names.iter().zip(&sinks) {
        println!("{name}: {:?}", sink.received().lock());
    }
}
