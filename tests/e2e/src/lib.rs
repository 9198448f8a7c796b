//! End-to-end scenario harness for the SortAI engine.
//!
//! Nothing in this crate is exercised by `sortai-core` itself; it exists purely
//! to drive the real engine components together the way a long-running desktop
//! process would, across the scenarios in `tests/scenarios/`.

pub mod harness;
pub mod mocks;
