//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, computeds, and
//! effects.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. Subscribers registered on a
//! signal are called with the new value after every `set` or `update`.
//!
//! ## Computeds
//!
//! A Computed is a derived value that caches its result. It follows an
//! explicit list of dependencies and recomputes when one of them changes.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs once when created and
//! again whenever one of its dependencies changes. Effects are used to
//! synchronize reactive state with external systems.
//!
//! # Implementation Notes
//!
//! Dependencies are declared, not discovered: `Computed::new` and
//! `Effect::new` take a slice of [`Dependency`] trait objects, so a consumer
//! can follow sources of any value type without knowing those types.
//!
//! Every cell owns its own lock and notifies after releasing it. Every user
//! function runs behind a fault boundary that reports panics to a
//! [`PanicHandler`] instead of unwinding into the caller.

mod cancel;
mod computed;
mod effect;
mod fault;
mod options;
mod readonly;
mod signal;
mod subscriber;
mod tracker;

pub use cancel::{Cancellation, CancellationToken, Deadline, Never};
pub use computed::Computed;
pub use effect::{Cleanup, Effect};
pub use fault::{log_fault, Fault, FaultSite, PanicHandler};
pub use options::{EffectOptions, EqualFn, Options};
pub use readonly::{ReadSignal, ReadonlySignal};
pub use signal::{Signal, SignalMetrics};
pub use subscriber::{SubscriberId, Unsubscribe};
pub use tracker::{ChangeFn, Dependency};
