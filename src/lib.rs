//! `cppl-build` is the build coordinator for the cppl module-based C++
//! dialect: it discovers sources, extracts per-unit import edges by
//! invoking an external front-end, assembles the declaration/definition
//! dependency graph, schedules incremental per-node rebuilds with bounded
//! parallelism, and finally links or emits library headers.
//!
//! The front-end and linker are opaque sub-processes; this crate never
//! parses or emits cppl source itself (see [`childproc`]).

#[macro_use]
extern crate tracing;

pub mod childproc;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod graph;
pub mod hash;
pub mod headergen;
pub mod incremental;
pub mod meta;
pub mod paths;
pub mod pool;
pub mod record;
pub mod solver;
pub mod task;
pub mod unit;

pub use config::BuildConfig;
pub use coordinator::Coordinator;
pub use error::{CpplError, Result};
