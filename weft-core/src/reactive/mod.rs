//! Reactive primitives.
//!
//! This module implements the core reactive system: signals, memos, and
//! effects, coordinated by a per-instance [`Runtime`].
//!
//! # Concepts
//!
//! ## Signals
//!
//! A [`Signal`] is a container for mutable state. When a signal is read
//! inside a running computation, the computation is registered as a
//! dependent automatically — no subscription code. When a signal's value
//! changes, dependents are queued and re-run.
//!
//! ## Memos
//!
//! A [`Memo`] is a derived value. It re-evaluates when its dependencies
//! change and publishes its result as a signal of its own, so derivations
//! compose. An unchanged result stops propagation.
//!
//! ## Effects
//!
//! An [`Effect`] is a side-effecting computation run whenever its
//! dependencies change — the bridge from reactive state to the world
//! outside the runtime.
//!
//! # Implementation notes
//!
//! Dependency discovery is dynamic: each run replaces the previous
//! dependency set with exactly the signals read this time, so conditional
//! code depends only on the branch actually taken. The tracking context
//! belongs to the runtime instance — not to the thread or the process — so
//! any number of runtimes coexist.

mod context;
mod effect;
mod memo;
mod runtime;
mod signal;

pub use effect::Effect;
pub use memo::Memo;
pub use runtime::{Runtime, RuntimeConfig};
pub use signal::Signal;
