//! flowmesh-core: a concurrent runtime for classical Flow-Based Programming (FBP)
//! networks, in the tradition of J. Paul Morrison.
//!
//! An application is assembled as a directed graph of independent [`process`]
//! instances communicating exclusively through bounded, typed [`port`]
//! connections carrying [`ip::Ip`] packets. The [`network::Network`] owns the
//! graph, wires it, and drives startup/shutdown; every blocking operation in
//! the runtime observes a [`cancel::CancellationHandle`].
//!
//! This crate is the core of a larger system; the HTTP surface for flow
//! management, persistence, and diagram rendering are external collaborators
//! and are not part of this crate (see `SPEC_FULL.md` §1).

pub mod bracket;
pub mod cancel;
pub mod circuit;
pub mod config;
pub mod error;
pub mod factory;
pub mod ip;
pub mod network;
pub mod observability;
pub mod port;
pub mod process;
pub mod testkit;

pub use cancel::CancellationHandle;
pub use config::{NetworkConfig, PanicPolicy};
pub use error::{CoreError, ErrorCategory, Result};
pub use ip::{Ip, IpId, IpKind};
pub use network::{Network, NetworkState, RunReport};
pub use port::{Connection, InputPort, OutputPort};
pub use process::{BaseProcess, Process, ProcessState};
