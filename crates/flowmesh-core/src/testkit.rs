//! Minimal process stubs for exercising a network without writing a new
//! `Process` impl per test, mirroring the teacher crate's own
//! `test_stubs` module. Kept deliberately dumb: no retry, no batching, no
//! metrics — just enough behavior to drive the scenarios in spec §8.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::Result;
use crate::ip::Ip;
use crate::network::PortRegistry;
use crate::port::{InputPort, OutputPort};
use crate::process::{Process, ProcessContext};

/// Emits a fixed sequence of values on one output port, then returns.
pub struct VecSource<T> {
    name: String,
    output: Arc<OutputPort<T>>,
    items: Mutex<Vec<T>>,
}

impl<T: Clone + Send + Sync + 'static> VecSource<T> {
    pub fn new(name: impl Into<String>, items: impl IntoIterator<Item = T>) -> Self {
        Self {
            name: name.into(),
            output: Arc::new(OutputPort::with_max_connections("out", true, 8)),
            items: Mutex::new(items.into_iter().collect()),
        }
    }

    pub fn output(&self) -> &Arc<OutputPort<T>> {
        &self.output
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> Process for VecSource<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn declare_ports(&self, registry: &PortRegistry) {
        registry.register_output(self.output.clone());
    }

    async fn initialize(&self, _ctx: &ProcessContext) -> Result<()> {
        Ok(())
    }

    async fn run(&self, ctx: &ProcessContext) -> Result<()> {
        let items = std::mem::take(&mut *self.items.lock());
        for item in items {
            if ctx.send(&self.output, Ip::new_normal(item)).await.is_err() {
                return Ok(());
            }
        }
        Ok(())
    }

    async fn shutdown(&self, _ctx: &ProcessContext) -> Result<()> {
        Ok(())
    }
}

/// Drains one input port into a shared `Vec`, in arrival order.
pub struct VecSink<T> {
    name: String,
    input: Arc<InputPort<T>>,
    received: Arc<Mutex<Vec<T>>>,
}

impl<T: Send + Sync + 'static> VecSink<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input: Arc::new(InputPort::with_max_connections("in", true, 8)),
            received: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn input(&self) -> &Arc<InputPort<T>> {
        &self.input
    }

    pub fn received(&self) -> Arc<Mutex<Vec<T>>> {
        self.received.clone()
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> Process for VecSink<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn declare_ports(&self, registry: &PortRegistry) {
        registry.register_input(self.input.clone());
    }

    async fn initialize(&self, _ctx: &ProcessContext) -> Result<()> {
        Ok(())
    }

    async fn run(&self, ctx: &ProcessContext) -> Result<()> {
        loop {
            match ctx.receive(&self.input).await {
                Ok(ip) => {
                    if let Some(payload) = ip.into_payload() {
                        self.received.lock().push(payload);
                    }
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(_) => return Ok(()),
            }
        }
    }

    async fn shutdown(&self, _ctx: &ProcessContext) -> Result<()> {
        Ok(())
    }
}
