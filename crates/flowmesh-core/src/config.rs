//! Network-level configuration surface (spec §6).
//!
//! Small, `serde`-deserializable value types with a validating constructor,
//! following the teacher crate's `Timeout`/`TimeoutProfile` shape: public
//! fields would let a caller construct an invalid `NetworkConfig` (zero
//! capacity, for instance), so construction goes through [`NetworkConfig::new`]
//! or [`NetworkConfigBuilder`] instead. The core crate itself never reads a
//! config file; an external flow-management layer owns that (spec §1).

use std::time::Duration;

use serde::Deserialize;

use crate::error::{CoreError, Result};

/// Whether a panic inside a process body is recovered into a `Failed`
/// transition or rethrown after that process's `shutdown` has run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanicPolicy {
    Recover,
    Propagate,
}

impl Default for PanicPolicy {
    fn default() -> Self {
        PanicPolicy::Recover
    }
}

/// The four options of spec §6's Configuration Surface table.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(try_from = "RawNetworkConfig")]
pub struct NetworkConfig {
    default_connection_capacity: usize,
    deadlock_grace_period: Duration,
    shutdown_timeout: Duration,
    panic_policy: PanicPolicy,
}

impl NetworkConfig {
    pub fn new(
        default_connection_capacity: usize,
        deadlock_grace_period: Duration,
        shutdown_timeout: Duration,
        panic_policy: PanicPolicy,
    ) -> Result<Self> {
        if default_connection_capacity == 0 {
            return Err(CoreError::config(
                "default_connection_capacity must be >= 1",
            ));
        }
        Ok(Self {
            default_connection_capacity,
            deadlock_grace_period,
            shutdown_timeout,
            panic_policy,
        })
    }

    pub fn default_connection_capacity(&self) -> usize {
        self.default_connection_capacity
    }

    pub fn deadlock_grace_period(&self) -> Duration {
        self.deadlock_grace_period
    }

    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    pub fn panic_policy(&self) -> PanicPolicy {
        self.panic_policy
    }

    pub fn builder() -> NetworkConfigBuilder {
        NetworkConfigBuilder::default()
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            default_connection_capacity: 16,
            deadlock_grace_period: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(10),
            panic_policy: PanicPolicy::Recover,
        }
    }
}

#[derive(Deserialize)]
struct RawNetworkConfig {
    #[serde(default = "default_capacity")]
    default_connection_capacity: usize,
    #[serde(default = "default_deadlock_grace_period")]
    deadlock_grace_period_ms: u64,
    #[serde(default = "default_shutdown_timeout")]
    shutdown_timeout_ms: u64,
    #[serde(default)]
    panic_policy: PanicPolicy,
}

fn default_capacity() -> usize {
    NetworkConfig::default().default_connection_capacity
}

fn default_deadlock_grace_period() -> u64 {
    NetworkConfig::default().deadlock_grace_period.as_millis() as u64
}

fn default_shutdown_timeout() -> u64 {
    NetworkConfig::default().shutdown_timeout.as_millis() as u64
}

impl TryFrom<RawNetworkConfig> for NetworkConfig {
    type Error = CoreError;

    fn try_from(raw: RawNetworkConfig) -> Result<Self> {
        NetworkConfig::new(
            raw.default_connection_capacity,
            Duration::from_millis(raw.deadlock_grace_period_ms),
            Duration::from_millis(raw.shutdown_timeout_ms),
            raw.panic_policy,
        )
    }
}

/// Builder for [`NetworkConfig`], for call sites that want to override only a
/// couple of fields.
#[derive(Clone, Copy, Debug)]
pub struct NetworkConfigBuilder {
    default_connection_capacity: usize,
    deadlock_grace_period: Duration,
    shutdown_timeout: Duration,
    panic_policy: PanicPolicy,
}

impl Default for NetworkConfigBuilder {
    fn default() -> Self {
        let defaults = NetworkConfig::default();
        Self {
            default_connection_capacity: defaults.default_connection_capacity,
            deadlock_grace_period: defaults.deadlock_grace_period,
            shutdown_timeout: defaults.shutdown_timeout,
            panic_policy: defaults.panic_policy,
        }
    }
}

impl NetworkConfigBuilder {
    pub fn default_connection_capacity(mut self, capacity: usize) -> Self {
        self.default_connection_capacity = capacity;
        self
    }

    pub fn deadlock_grace_period(mut self, period: Duration) -> Self {
        self.deadlock_grace_period = period;
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn panic_policy(mut self, policy: PanicPolicy) -> Self {
        self.panic_policy = policy;
        self
    }

    pub fn build(self) -> Result<NetworkConfig> {
        NetworkConfig::new(
            self.default_connection_capacity,
            self.deadlock_grace_period,
            self.shutdown_timeout,
            self.panic_policy,
        )
    }
}
