//! Shared utilities.

pub mod queue;
