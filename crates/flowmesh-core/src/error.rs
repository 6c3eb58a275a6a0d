//! The runtime's error taxonomy (spec §7).
//!
//! `CoreError` is the single error type returned across ports, processes and
//! the network. It carries a stable code, a human-readable message and an
//! optional boxed cause, following the same shape as the teacher crate's own
//! root error type: callers match on [`CoreError::category`] rather than on
//! the `Debug` representation.

use std::error::Error as StdError;
use std::fmt;

/// Result alias used throughout the crate.
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

/// Stable error codes. Namespaced `<module>.<reason>`, matching the teacher's
/// `<domain>.<semantic>` convention for `CoreError::code()`.
pub mod codes {
    pub const VALIDATION_MISSING_PORT: &str = "network.missing_required_port";
    pub const VALIDATION_UNKNOWN_PROCESS: &str = "network.unknown_process";
    pub const VALIDATION_DUPLICATE_PROCESS: &str = "network.duplicate_process";
    pub const VALIDATION_BAD_CAPACITY: &str = "network.capacity_not_positive";
    pub const VALIDATION_TYPE_MISMATCH: &str = "network.port_type_mismatch";
    pub const PROCESS_STATE: &str = "process.invalid_transition";
    pub const OWNERSHIP_VIOLATION: &str = "ip.ownership_violation";
    pub const PORT_MAX_CONNECTIONS: &str = "port.max_connections_exceeded";
    pub const PORT_NO_CONNECTIONS: &str = "port.no_connections";
    pub const PORT_NIL_CHANNEL: &str = "port.nil_channel";
    pub const PORT_CHANNEL_CLOSED: &str = "port.channel_closed";
    pub const CANCELLED: &str = "runtime.cancelled";
    pub const PROCESS_FAILURE: &str = "process.failure";
    pub const NETWORK_DEADLOCK: &str = "network.deadlock";
    pub const SHUTDOWN_TIMEOUT: &str = "process.shutdown_timeout";
    pub const CONFIG: &str = "network.config_rejected";
    pub const UNBALANCED_BRACKET: &str = "bracket.unbalanced_close";
}

/// Coarse classification of a [`CoreError`], used by the network report and
/// the circuit breaker to decide whether a failure is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Wiring is inconsistent; surfaces before any process body runs.
    Validation,
    /// An illegal lifecycle transition was attempted.
    ProcessState,
    /// Mutation attempted on an immutable IP.
    Ownership,
    /// A port-level operation failed (see [`codes`]).
    Port,
    /// The run's cancellation handle fired; not a failure.
    Cancelled,
    /// A process body returned an error or panicked.
    ProcessFailure,
    /// The deadlock watchdog observed every process blocked.
    NetworkDeadlock,
    /// `Process::shutdown` exceeded `shutdown_timeout`.
    ShutdownTimeout,
    /// A process factory rejected a configuration snapshot.
    Config,
}

/// The runtime's unified error type.
///
/// Constructed via [`CoreError::new`] and enriched with `with_cause`. Two
/// errors are never compared structurally; callers are expected to branch on
/// [`CoreError::category`] and [`CoreError::code`].
pub struct CoreError {
    code: &'static str,
    category: ErrorCategory,
    message: String,
    cause: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl CoreError {
    pub fn new(code: &'static str, category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            code,
            category,
            message: message.into(),
            cause: None,
        }
    }

    /// Attach a boxed underlying cause, returning the enriched error.
    pub fn with_cause(mut self, cause: impl StdError + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Shorthand constructor for the one error kind that is not really a
    /// failure: cancellation. Kept distinct so call sites read `is_cancelled`
    /// instead of matching codes.
    pub fn cancelled() -> Self {
        Self::new(
            codes::CANCELLED,
            ErrorCategory::Cancelled,
            "operation observed a fired cancellation handle",
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.category, ErrorCategory::Cancelled)
    }

    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(code, ErrorCategory::Validation, message)
    }

    pub fn process_state(message: impl Into<String>) -> Self {
        Self::new(codes::PROCESS_STATE, ErrorCategory::ProcessState, message)
    }

    pub fn ownership_violation(message: impl Into<String>) -> Self {
        Self::new(
            codes::OWNERSHIP_VIOLATION,
            ErrorCategory::Ownership,
            message,
        )
    }

    pub fn port(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(code, ErrorCategory::Port, message)
    }

    pub fn process_failure(message: impl Into<String>) -> Self {
        Self::new(
            codes::PROCESS_FAILURE,
            ErrorCategory::ProcessFailure,
            message,
        )
    }

    pub fn network_deadlock(message: impl Into<String>) -> Self {
        Self::new(
            codes::NETWORK_DEADLOCK,
            ErrorCategory::NetworkDeadlock,
            message,
        )
    }

    pub fn shutdown_timeout(process_name: &str) -> Self {
        Self::new(
            codes::SHUTDOWN_TIMEOUT,
            ErrorCategory::ShutdownTimeout,
            format!("process `{process_name}` did not shut down within the configured window"),
        )
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(codes::CONFIG, ErrorCategory::Config, message)
    }
}

impl fmt::Debug for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreError")
            .field("code", &self.code)
            .field("category", &self.category)
            .field("message", &self.message)
            .field("cause", &self.cause.as_ref().map(|c| c.to_string()))
            .finish()
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl StdError for CoreError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_ref()
            .map(|c| c.as_ref() as &(dyn StdError + 'static))
    }
}
