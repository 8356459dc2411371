//! Error types for the reactive runtime.
//!
//! The taxonomy is deliberately small. Every failure a host can observe falls
//! into one of three buckets:
//!
//! - [`RuntimeError::CyclicDependency`]: the update graph cannot reach
//!   quiescence. Raised synchronously from the call that triggered the flush.
//! - [`RuntimeError::UseAfterDispose`]: an operation on a handle whose entity
//!   (or whole runtime) is gone. No partial mutation occurs.
//! - [`RuntimeError::InvalidState`]: a reentrancy violation, such as a
//!   computation disposing itself from within its own run.
//!
//! Errors are never swallowed: a computation that fails leaves the graph
//! intact and surfaces its error to whichever write or batch started the
//! flush.

use std::fmt;

use thiserror::Error;

/// The kind of entity an operation was aimed at, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    /// A value cell created with `create_signal` (or a memo's output).
    Signal,
    /// An effect or memo computation.
    Computation,
    /// The runtime instance itself (all handles die with it).
    Runtime,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Signal => f.write_str("signal"),
            Entity::Computation => f.write_str("computation"),
            Entity::Runtime => f.write_str("runtime"),
        }
    }
}

/// Errors surfaced by the reactive runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// The dependency graph cannot settle: a computation re-dirtied itself
    /// beyond the retry bound, the pending set stopped making progress, or a
    /// flush exceeded its operation budget.
    #[error("cyclic dependency: {reason}")]
    CyclicDependency {
        /// Which bound was violated.
        reason: &'static str,
    },

    /// A read, write, or run against a disposed entity.
    #[error("{entity} used after dispose")]
    UseAfterDispose {
        /// What the handle pointed at.
        entity: Entity,
    },

    /// A reentrancy violation.
    #[error("invalid state: {reason}")]
    InvalidState {
        /// What was attempted.
        reason: &'static str,
    },
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, RuntimeError>;
