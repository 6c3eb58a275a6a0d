//! Runs seed scenario 1 end to end: a source emitting strings, a stateless
//! mapper upper-casing each one, and a sink collecting the results.
//!
//! ```bash
//! cargo run --bin uppercase_pipeline
//! ```

use std::sync::Arc;

use flowmesh_core::testkit::{VecSink, VecSource};
use flowmesh_core::{Network, NetworkConfig, NetworkState};
use flowmesh_nodes::Mapper;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let words = ["hello", "world", "flowmesh"].map(str::to_string);
    let source = Arc::new(VecSource::new("source", words));
    let mapper = Arc::new(Mapper::new("uppercase", |s: String| s.to_uppercase()));
    let sink = Arc::new(VecSink::<String>::new("sink"));
    let received = sink.received();

    let mut network = Network::new(NetworkConfig::default());
    network.add_process("source", source).unwrap();
    network.add_process("mapper", mapper).unwrap();
    network.add_process("sink", sink).unwrap();
    network
        .connect("source", "out", "mapper", "in", Some(4))
        .await
        .unwrap();
    network
        .connect("mapper", "out", "sink", "in", Some(4))
        .await
        .unwrap();

    let report = network.run().await;
    assert_eq!(report.final_state, NetworkState::Stopped);
    println!("received: {:?}", received.lock());
}
