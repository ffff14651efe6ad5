//! Action directive engine for campus-life agent benchmarks.
//!
//! An agent replies in free text; the engine turns each reply into a typed
//! directive, dispatches actions to simulated subsystems through a
//! capability-gated registry, records what ran, and scores each task while
//! propagating prerequisite failures across the session.
//!
//! - **[`core`]**: Pure, deterministic logic (directive parsing, call
//!   decoding, the capability catalog, sequence validation, prerequisite
//!   tracking). No I/O.
//! - **[`io`]**: Side effects (config, dataset loading, checkpoints, report
//!   artifacts).
//!
//! Orchestration lives in [`registry`], [`recorder`] and [`session`].

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod recorder;
pub mod registry;
pub mod session;
pub mod task;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
