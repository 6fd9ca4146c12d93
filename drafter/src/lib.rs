//! Human-in-the-loop blog drafting from source code.
//!
//! A run summarizes a codebase, proposes an outline, and drafts one section at
//! a time, pausing for a human verdict after the outline and after every draft.
//! The crate keeps the usual split:
//!
//! - **[`core`]**: Pure, deterministic logic (run state, routing, the interrupt
//!   primitive, document rendering). No I/O.
//! - **[`io`]**: Side effects (config, checkpoints, code loading, prompts, model
//!   backends).
//!
//! [`steps`] holds the step functions, [`graph`] sequences them and
//! [`driver`] is the interactive terminal loop built on top.

pub mod core;
pub mod driver;
pub mod exit_codes;
pub mod graph;
pub mod io;
pub mod logging;
pub mod steps;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
