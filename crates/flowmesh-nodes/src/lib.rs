//! A small library of reusable [`flowmesh_core::Process`] implementations,
//! the built-in node catalog referenced by `SPEC_FULL.md` §1.
//!
//! Nothing here reaches into `flowmesh_core`'s internals beyond its public
//! API — these are ordinary downstream processes, the same contract any
//! external crate would implement against.

pub mod logger;
pub mod mapper;

pub use logger::Logger;
pub use mapper::{Mapper, MapperError};
