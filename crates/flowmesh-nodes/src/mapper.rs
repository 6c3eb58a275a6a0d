//! A one-input, one-output transform node (`SPEC_FULL.md` §11).

use std::sync::Arc;

use async_trait::async_trait;
use flowmesh_core::error::{CoreError, Result};
use flowmesh_core::network::PortRegistry;
use flowmesh_core::process::{Process, ProcessContext};
use flowmesh_core::{InputPort, Ip, OutputPort};
use thiserror::Error;

/// Leaf error for a [`Mapper`] missing its transform function at
/// `initialize` time. A small derive-based type, not folded into
/// `CoreError`'s taxonomy: this crate has no cross-cutting error surface of
/// its own to maintain, so `thiserror` is the idiomatic fit (`SPEC_FULL.md`
/// §10.2).
#[derive(Debug, Error)]
#[error("mapper `{name}` has no transform function configured")]
pub struct MapperError {
    name: String,
}

/// Applies `transform` to every IP received on `input`, forwarding the
/// result on `output`. Stateless beyond the function itself.
pub struct Mapper<In, Out> {
    name: String,
    input: Arc<InputPort<In>>,
    output: Arc<OutputPort<Out>>,
    transform: Option<Arc<dyn Fn(In) -> Out + Send + Sync>>,
}

impl<In: Send + Sync + 'static, Out: Clone + Send + Sync + 'static> Mapper<In, Out> {
    pub fn new(name: impl Into<String>, transform: impl Fn(In) -> Out + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            input: Arc::new(InputPort::new("in", true)),
            output: Arc::new(OutputPort::new("out", true)),
            transform: Some(Arc::new(transform)),
        }
    }

    /// Construct without a transform, for exercising the `initialize`-time
    /// `MapperError` path in tests.
    pub fn without_transform(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input: Arc::new(InputPort::new("in", true)),
            output: Arc::new(OutputPort::new("out", true)),
            transform: None,
        }
    }
}

#[async_trait]
impl<In: Send + Sync + 'static, Out: Clone + Send + Sync + 'static> Process for Mapper<In, Out> {
    fn name(&self) -> &str {
        &self.name
    }

    fn declare_ports(&self, registry: &PortRegistry) {
        registry.register_input(self.input.clone());
        registry.register_output(self.output.clone());
    }

    async fn initialize(&self, _ctx: &ProcessContext) -> Result<()> {
        if self.transform.is_none() {
            return Err(CoreError::config(
                MapperError {
                    name: self.name.clone(),
                }
                .to_string(),
            )
            .with_cause(MapperError {
                name: self.name.clone(),
            }));
        }
        Ok(())
    }

    async fn run(&self, ctx: &ProcessContext) -> Result<()> {
        let transform = self
            .transform
            .as_ref()
            .expect("initialize already rejected a missing transform");
        loop {
            let ip = match ctx.receive(&self.input).await {
                Ok(ip) => ip,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(_) => return Ok(()),
            };
            let Some(payload) = ip.into_payload() else {
                continue;
            };
            let mapped = transform(payload);
            if ctx.send(&self.output, Ip::new_normal(mapped)).await.is_err() {
                return Ok(());
            }
        }
    }

    async fn shutdown(&self, _ctx: &ProcessContext) -> Result<()> {
        Ok(())
    }
}
