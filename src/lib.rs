//! Qualification workflow service for the procurement platform.
//!
//! The crate exposes the qualification lifecycle engine (period rules, state
//! transitions, candidate scoring, next-qualification selection) behind a
//! service facade and an axum router; persistence and rule data live behind
//! injected trait collaborators.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
