//! Access control for chat commands.
//!
//! Holds the immutable per-command policy table, the isolated-test
//! environment gate, and the evaluator that admits or denies an invocation.

pub mod access_evaluator;
pub mod access_policy;
pub mod environment_gate;

pub use access_evaluator::*;
pub use access_policy::*;
pub use environment_gate::*;
