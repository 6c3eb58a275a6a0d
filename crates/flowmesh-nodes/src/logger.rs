//! A pass-through node that emits an observability event for every IP it
//! sees, then forwards a fresh IP carrying the same payload (`SPEC_FULL.md`
//! §11). Useful for inserting visibility into a pipeline without changing
//! its data.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use flowmesh_core::error::Result;
use flowmesh_core::network::PortRegistry;
use flowmesh_core::observability::{IpObservedEvent, ObservabilityFacade};
use flowmesh_core::process::{Process, ProcessContext};
use flowmesh_core::{InputPort, Ip, OutputPort};

/// Forwards every IP from `input` to `output` unchanged, logging a
/// `tracing` event (and, if attached, an [`ObservabilityFacade`] event) for
/// each one.
pub struct Logger<T> {
    name: String,
    input: Arc<InputPort<T>>,
    output: Arc<OutputPort<T>>,
    observability: Option<Arc<ObservabilityFacade>>,
}

impl<T: fmt::Debug + Clone + Send + Sync + 'static> Logger<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input: Arc::new(InputPort::new("in", true)),
            output: Arc::new(OutputPort::new("out", true)),
            observability: None,
        }
    }

    /// Also fan every observed IP out through a shared observability
    /// facade, in addition to the `tracing` event every `Logger` emits.
    pub fn with_observability(mut self, facade: Arc<ObservabilityFacade>) -> Self {
        self.observability = Some(facade);
        self
    }
}

#[async_trait]
impl<T: fmt::Debug + Clone + Send + Sync + 'static> Process for Logger<T> {
    fn name(&self) -> &str {
        &self.name
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
            tracing::info!(process = %self.name, ip.id = %ip.id(), ip.kind = ?ip.kind(), "logged ip");
            if let Some(facade) = &self.observability {
                facade.emit_ip_observed(IpObservedEvent {
                    process_name: self.name.clone(),
                    ip_id: ip.id(),
                    ip_kind: ip.kind(),
                    payload_debug: ip.payload().map(|p| format!("{p:?}")),
                    at: std::time::SystemTime::now(),
                });
            }
            let Some(payload) = ip.payload().cloned() else {
                continue;
            };
            if ctx.send(&self.output, Ip::new_normal(payload)).await.is_err() {
                return Ok(());
            }
        }
    }

    async fn shutdown(&self, _ctx: &ProcessContext) -> Result<()> {
        Ok(())
    }
}
