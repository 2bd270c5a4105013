//! Application layer: the availability probe and the session orchestrator.
//!
//! `SessionOrchestrator` drives one wallet payment attempt at a time from the
//! user gesture through merchant validation and authorization to a single
//! reported outcome.

pub mod orchestrator;
pub mod probe;
