//! Oracle-backed score plugin for the rk8s scheduler.
//!
//! [`plugins::ai_score::AiScore`] asks an external oracle for per-node
//! scores once per scheduling cycle and serves them to the Score extension
//! point from the cycle state.

pub mod cache;
pub mod config;
pub mod cycle_state;
pub mod error;
pub mod models;
pub mod oracle;
pub mod plugins;
