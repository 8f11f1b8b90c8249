//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect subscribes to its dependencies and runs its
//!    function once, before the constructor returns.
//!
//! 2. Each dependency change runs the effect again, synchronously, on the
//!    thread that delivered the change.
//!
//! 3. A run first executes the cleanup returned by the previous run, then
//!    the function, and keeps whatever cleanup the function returns.
//!
//! # Differences from Computed
//!
//! - Computeds return a value; effects do not.
//! - Computeds compute on first access; effects run at creation.
//! - Effects can return cleanups.
//!
//! # Stopping
//!
//! `stop` runs the last cleanup and cancels the dependency subscriptions.
//! Only the first call does anything, even when several threads race, and no
//! run starts once the stop has taken effect.
//!
//! The run lock is re-entrant: an effect may write its own dependencies or
//! stop itself from inside its function.

use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};

use super::fault::{self, FaultSite, PanicHandler};
use super::options::EffectOptions;
use super::tracker::{self, ChangeFn, Dependency, DependencySubscriptions};

/// Teardown returned by an effect run.
///
/// It runs before the next run of the effect, or when the effect stops.
pub struct Cleanup(Box<dyn FnOnce() + Send>);

impl Cleanup {
    pub fn new<F>(cleanup: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self(Box::new(cleanup))
    }

    fn run(self) {
        (self.0)()
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cleanup")
    }
}

type EffectFn = Box<dyn Fn() -> Option<Cleanup> + Send + Sync>;

/// A side-effecting computation that re-runs when dependencies change.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// let c = count.clone();
/// let effect = Effect::new(move || println!("Count is: {}", c.get()), &[&count]);
/// // prints "Count is: 0"
///
/// count.set(5);  // prints "Count is: 5"
/// effect.stop();
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Arc<EffectInner>,
}

struct EffectInner {
    /// The effect function.
    run: EffectFn,

    /// Cleanup of the latest run. Held for the whole run.
    cleanup: ReentrantMutex<RefCell<Option<Cleanup>>>,

    /// Bumped when a run starts. A run whose generation is no longer the
    /// latest was overtaken by a nested run and must not store its cleanup.
    generation: AtomicU64,

    stopped: AtomicBool,

    dependencies: Mutex<DependencySubscriptions>,

    on_panic: Option<PanicHandler>,

    /// Number of completed runs, including ones whose function panicked.
    run_count: AtomicUsize,
}

impl Effect {
    /// Create an effect without cleanup. Runs `run` before returning.
    pub fn new<F>(run: F, dependencies: &[&dyn Dependency]) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::with_cleanup(
            move || {
                run();
                None
            },
            dependencies,
        )
    }

    /// Create an effect whose runs may return a [`Cleanup`].
    pub fn with_cleanup<F>(run: F, dependencies: &[&dyn Dependency]) -> Self
    where
        F: Fn() -> Option<Cleanup> + Send + Sync + 'static,
    {
        Self::with_options(run, EffectOptions::default(), dependencies)
    }

    /// Create an effect with custom panic handling.
    pub fn with_options<F>(run: F, options: EffectOptions, dependencies: &[&dyn Dependency]) -> Self
    where
        F: Fn() -> Option<Cleanup> + Send + Sync + 'static,
    {
        let inner = Arc::new(EffectInner {
            run: Box::new(run),
            cleanup: ReentrantMutex::new(RefCell::new(None)),
            generation: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
            dependencies: Mutex::new(DependencySubscriptions::new()),
            on_panic: options.on_panic,
            run_count: AtomicUsize::new(0),
        });

        let target = Arc::clone(&inner);
        let on_change: ChangeFn = Arc::new(move || target.execute());
        let subscriptions = tracker::track(dependencies, on_change);
        inner.dependencies.lock().extend(subscriptions);

        // The first run happens before the caller gets the handle.
        inner.execute();

        Self { inner }
    }

    /// Stop the effect: run the last cleanup and drop all dependency
    /// subscriptions. Safe to call any number of times from any thread.
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::Acquire)
    }

    /// Get the number of dependencies.
    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.lock().len()
    }
}

impl EffectInner {
    fn execute(&self) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }

        let slot = self.cleanup.lock();

        // Double-check after acquiring lock
        if self.stopped.load(Ordering::Acquire) {
            return;
        }

        let previous = slot.borrow_mut().take();
        if let Some(previous) = previous {
            let _ = fault::invoke(FaultSite::EffectCleanup, self.on_panic.as_ref(), || previous.run());
        }

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let cleanup = fault::invoke(FaultSite::EffectBody, self.on_panic.as_ref(), || (self.run)())
            .ok()
            .flatten();
        self.run_count.fetch_add(1, Ordering::AcqRel);

        let Some(cleanup) = cleanup else {
            return;
        };

        if self.stopped.load(Ordering::Acquire) {
            // Stopped from inside the run: nobody else will run this.
            let _ = fault::invoke(FaultSite::FinalCleanup, self.on_panic.as_ref(), || cleanup.run());
            return;
        }

        if self.generation.load(Ordering::Acquire) != generation {
            // A nested run started after this one and owns the slot.
            let _ = fault::invoke(FaultSite::EffectCleanup, self.on_panic.as_ref(), || cleanup.run());
            return;
        }

        *slot.borrow_mut() = Some(cleanup);
    }

    fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }

        // Waits for an in-flight run on another thread.
        let last = self.cleanup.lock().borrow_mut().take();
        if let Some(last) = last {
            let _ = fault::invoke(FaultSite::FinalCleanup, self.on_panic.as_ref(), || last.run());
        }

        let subscriptions = std::mem::take(&mut *self.dependencies.lock());
        for subscription in &subscriptions {
            subscription.unsubscribe();
        }

        tracing::debug!(
            runs = self.run_count.load(Ordering::Acquire),
            dependencies = subscriptions.len(),
            "effect stopped"
        );
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
