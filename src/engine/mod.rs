//! Core engine: the per-cycle scan orchestrator and the symbol state machine.

pub mod scanner;
pub mod session;
pub mod tracker;
