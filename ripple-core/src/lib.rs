//! Ripple Core
//!
//! This crate provides thread-safe reactive state for Rust programs.
//! It implements:
//!
//! - Signals: mutable values that notify subscribers on change
//! - Computeds: memoized values derived from other reactive values
//! - Effects: side effects re-run whenever their dependencies change
//!
//! # Architecture
//!
//! Everything lives in the `reactive` module and is re-exported here.
//! There is no scheduler and no global runtime: work happens on the threads
//! that call into the cells, and each cell carries its own lock.
//!
//! # Example
//!
//! ```rust,ignore
//! use ripple_core::{Computed, Effect, Signal};
//!
//! // Create a signal
//! let count = Signal::new(0);
//!
//! // Create a derived value
//! let c = count.clone();
//! let doubled = Computed::new(move || c.get() * 2, &[&count]);
//!
//! // Create an effect (runs immediately: "Count: 0, Doubled: 0")
//! let (c, d) = (count.clone(), doubled.clone());
//! let effect = Effect::new(
//!     move || println!("Count: {}, Doubled: {}", c.get(), d.get()),
//!     &[&count],
//! );
//!
//! // Update the signal
//! count.set(5);
//! // Effect automatically runs, prints: "Count: 5, Doubled: 10"
//!
//! effect.stop();
//! ```

pub mod reactive;

pub use reactive::{
    Cancellation, CancellationToken, Cleanup, Computed, Deadline, Dependency, Effect,
    EffectOptions, Fault, FaultSite, Never, Options, PanicHandler, ReadSignal, ReadonlySignal,
    Signal, SignalMetrics, Unsubscribe,
};
