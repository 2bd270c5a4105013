//! Adapters facing the invoking UI.

pub mod console;
