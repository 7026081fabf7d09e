//! Removes a feature flag from Python sources.
//!
//! Every SDK call evaluating the flag is replaced by the object it would
//! evaluate to, and the code around it is simplified until nothing more
//! changes: field accesses are reduced, variables holding the flag are
//! inlined, conditions are folded and branches that can no longer be
//! taken are dropped.

pub mod cli;
pub mod config;
pub mod document;
pub mod engine;
pub mod flag;
pub mod log;
pub mod python;
pub mod sources;
pub mod syntax;
pub mod transform;

pub use engine::{CleanupError, Engine, Options, OutputMode, Refactored, Rewritten};
pub use flag::{FlagSpec, FlagType, TypeCoercionError};
