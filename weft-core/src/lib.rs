//! Weft Core
//!
//! This crate provides the reactive core of the Weft UI framework: value
//! cells whose reads are tracked, computations whose dependencies are
//! discovered automatically, and a scheduler that turns imperative writes
//! into deterministic, glitch-free re-runs of exactly the computations that
//! read what changed.
//!
//! The rendering layer on top of this crate is a plain consumer: it creates
//! an effect per mounted view to re-run its patch step, and disposes the
//! effect on unmount. Nothing in here knows about templates or trees.
//!
//! # Architecture
//!
//! - [`reactive`]: signals, memos, effects, and the runtime coordinator
//! - [`graph`]: the dependency-graph arenas and the flush scheduler
//! - [`error`]: the runtime error taxonomy
//!
//! # Example
//!
//! ```rust,ignore
//! use weft_core::Runtime;
//!
//! let rt = Runtime::new();
//! let count = rt.create_signal(0);
//!
//! let c = count.clone();
//! let doubled = rt.create_memo(move || Ok(c.get()? * 2))?;
//!
//! let d = doubled.clone();
//! rt.create_effect(move || {
//!     println!("doubled is {}", d.get()?);
//!     Ok(())
//! })?; // prints "doubled is 0"
//!
//! count.set(5)?; // prints "doubled is 10", exactly once
//! ```

pub mod error;
pub mod graph;
pub mod reactive;

pub use error::{Entity, Result, RuntimeError};
pub use reactive::{Effect, Memo, Runtime, RuntimeConfig, Signal};
