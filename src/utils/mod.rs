//! The `utils` module provides definitions shared across the `topiclink` crate.
//!
//! - `error`: the crate error type and the broker-reported error taxonomy.
//! - `logging`: `tracing` subscriber initialisation.

pub mod error;
pub mod logging;

#[cfg(test)]
mod tests;
