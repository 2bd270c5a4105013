//! Value objects and ports for a single wallet payment attempt.

pub mod gateway;
pub mod money;
pub mod outcome;
pub mod ports;
pub mod request;
pub mod session;
