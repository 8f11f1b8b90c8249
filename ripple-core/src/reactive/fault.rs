//! Fault Isolation
//!
//! Every user-supplied function (subscriber callbacks, compute functions,
//! effect bodies and cleanups) runs through [`invoke`]. A panic inside the
//! function is caught at that boundary, turned into a [`Fault`], and handed to
//! the cell's [`PanicHandler`]. The panic never reaches the code that
//! triggered the call and never leaves a lock held, since all cell locks are
//! `parking_lot` locks released on unwind.
//!
//! When no handler is configured the fault is logged through `tracing` and
//! execution continues.

use std::any::Any;
use std::backtrace::Backtrace;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use thiserror::Error;

/// Callback receiving every fault captured by a cell or effect.
pub type PanicHandler = Arc<dyn Fn(&Fault) + Send + Sync>;

/// Where a captured panic originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultSite {
    /// A subscriber callback of a signal.
    Subscriber,

    /// The compute function of a computed value.
    Compute,

    /// A subscriber callback of a computed value.
    ComputedSubscriber,

    /// The body of an effect.
    EffectBody,

    /// A cleanup returned by an effect, run before the next execution.
    EffectCleanup,

    /// The last cleanup of an effect, run by `Effect::stop`.
    FinalCleanup,
}

impl fmt::Display for FaultSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FaultSite::Subscriber => "subscriber",
            FaultSite::Compute => "computed function",
            FaultSite::ComputedSubscriber => "computed subscriber",
            FaultSite::EffectBody => "effect function",
            FaultSite::EffectCleanup => "effect cleanup",
            FaultSite::FinalCleanup => "final effect cleanup",
        };
        f.write_str(name)
    }
}

/// A panic captured inside a user-supplied function.
#[derive(Debug, Error)]
#[error("panic in {site}: {message}")]
pub struct Fault {
    site: FaultSite,
    message: String,
    trace: Box<Backtrace>,
}

impl Fault {
    fn from_payload(site: FaultSite, payload: Box<dyn Any + Send>) -> Self {
        Self {
            site,
            message: panic_message(payload.as_ref()),
            trace: Box::new(Backtrace::capture()),
        }
    }

    /// The kind of function that panicked.
    pub fn site(&self) -> FaultSite {
        self.site
    }

    /// The panic payload rendered as text.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Backtrace captured at the fault boundary after unwinding.
    ///
    /// It shows the path that led into the panicking function (which cell
    /// or effect ran it), not the frames inside that function. Empty unless
    /// `RUST_BACKTRACE` (or `RUST_LIB_BACKTRACE`) is set.
    pub fn backtrace(&self) -> &Backtrace {
        &self.trace
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Run `f`, capturing a panic as a [`Fault`].
///
/// On panic the fault is dispatched to `handler` (or logged when there is
/// none) before being returned, so callers only decide what state to keep.
pub(crate) fn invoke<R>(
    site: FaultSite,
    handler: Option<&PanicHandler>,
    f: impl FnOnce() -> R,
) -> Result<R, Fault> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Ok(value),
        Err(payload) => {
            let fault = Fault::from_payload(site, payload);
            report(&fault, handler);
            Err(fault)
        }
    }
}

fn report(fault: &Fault, handler: Option<&PanicHandler>) {
    let Some(handler) = handler else {
        log_fault(fault);
        return;
    };

    // A panicking handler must not escape the boundary either.
    if panic::catch_unwind(AssertUnwindSafe(|| handler(fault))).is_err() {
        tracing::error!(site = %fault.site, "panic handler panicked while reporting a fault");
        log_fault(fault);
    }
}

/// Default handler: log and continue.
pub fn log_fault(fault: &Fault) {
    tracing::error!(
        site = %fault.site,
        message = %fault.message,
        "ripple: panic in {}: {}\n{}",
        fault.site,
        fault.message,
        fault.trace,
    );
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
