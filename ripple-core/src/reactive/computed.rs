//! Computed Implementation
//!
//! A Computed is a cached value derived from other reactive values.
//!
//! # How Computeds Work
//!
//! 1. On creation the computed subscribes to each declared dependency and
//!    starts out dirty. Nothing is computed yet.
//!
//! 2. `get` returns the cached value while clean. While dirty it recomputes
//!    under the write lock, re-checking the flag first since another caller
//!    may have recomputed in the meantime.
//!
//! 3. When a dependency changes the computed is marked dirty and then
//!    recomputes immediately and notifies its own subscribers with the new
//!    value. Propagation is push based: chains of computeds update eagerly
//!    and subscribers always hear about a change.
//!
//! # Failure
//!
//! A panicking compute function leaves the previous value cached and the
//! computed dirty, so the next `get` retries. No subscriber is notified for
//! a failed recomputation.
//!
//! # Limitations
//!
//! There is no batching. Two dependencies changed at the same time produce
//! two recompute-and-notify rounds. A compute function must not read the
//! computed it belongs to.

use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use super::cancel::Cancellation;
use super::fault::{self, FaultSite, PanicHandler};
use super::options::{EqualFn, Options};
use super::readonly::ReadSignal;
use super::subscriber::{self, Registry, SubscriberId, Subscribers, Unsubscribe};
use super::tracker::{self, ChangeFn, Dependency, DependencySubscriptions};

/// A read-only value derived from other reactive values.
///
/// The value type needs `Default`: it is what `get` returns if the compute
/// function has never completed successfully.
///
/// # Example
///
/// ```rust,ignore
/// let first = Signal::new("John".to_string());
/// let last = Signal::new("Doe".to_string());
///
/// let (f, l) = (first.clone(), last.clone());
/// let full = Computed::new(move || format!("{} {}", f.get(), l.get()), &[&first, &last]);
///
/// assert_eq!(full.get(), "John Doe");
/// first.set("Jane".into());
/// assert_eq!(full.get(), "Jane Doe");
/// ```
pub struct Computed<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    inner: Arc<ComputedInner<T>>,
}

struct ComputedInner<T> {
    /// The computation function. Must only read the declared dependencies.
    compute: Box<dyn Fn() -> T + Send + Sync>,

    state: RwLock<ComputedState<T>>,

    /// Read without the lock on the fast path of `get`.
    dirty: AtomicBool,

    dependencies: Mutex<DependencySubscriptions>,

    equal: Option<EqualFn<T>>,
    on_panic: Option<PanicHandler>,
}

struct ComputedState<T> {
    cached: T,
    /// Whether `cached` came from the compute function at least once.
    computed: bool,
    /// `cached` changed and subscribers have not been told yet.
    unpublished: bool,
    subscribers: Subscribers<T>,
}

/// What a refresh did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Refresh {
    /// Someone else recomputed first.
    AlreadyClean,
    Changed,
    /// Recomputed, and the equality function matched the previous value.
    Unchanged,
    Faulted,
}

impl<T> Computed<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    /// Create a computed from a pure function and the values it reads.
    pub fn new<F>(compute: F, dependencies: &[&dyn Dependency]) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::with_options(compute, Options::default(), dependencies)
    }

    /// Create a computed with custom panic handling and/or equality.
    ///
    /// With an equality function, a recomputation producing a value equal to
    /// the cached one does not notify subscribers.
    pub fn with_options<F>(compute: F, options: Options<T>, dependencies: &[&dyn Dependency]) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let inner = Arc::new(ComputedInner {
            compute: Box::new(compute),
            state: RwLock::new(ComputedState {
                cached: T::default(),
                computed: false,
                unpublished: false,
                subscribers: Subscribers::new(),
            }),
            dirty: AtomicBool::new(true),
            dependencies: Mutex::new(DependencySubscriptions::new()),
            equal: options.equal,
            on_panic: options.on_panic,
        });

        let target = Arc::clone(&inner);
        let on_change: ChangeFn = Arc::new(move || target.on_dependency_change());
        let subscriptions = tracker::track(dependencies, on_change);
        inner.dependencies.lock().extend(subscriptions);

        Self { inner }
    }

    /// Get the current value, recomputing if dirty.
    pub fn get(&self) -> T {
        self.inner.get()
    }

    /// Register a callback for every successful recomputation.
    pub fn subscribe<F>(&self, cancellation: &dyn Cancellation, callback: F) -> Unsubscribe
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.register(Some(cancellation), callback)
    }

    /// Register a callback that stays until the returned handle is used.
    pub fn subscribe_forever<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.register(None, callback)
    }

    fn register<F>(&self, cancellation: Option<&dyn Cancellation>, callback: F) -> Unsubscribe
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.inner.state.write().subscribers.insert(Arc::new(callback));
        let registry: Weak<dyn Registry> = Arc::downgrade(&self.inner) as Weak<dyn Registry>;
        subscriber::attach(registry, id, cancellation)
    }

    /// Cancel every dependency subscription.
    ///
    /// The computed keeps its last value and stops following its
    /// dependencies. Calling this again does nothing.
    pub fn cleanup(&self) {
        let subscriptions = std::mem::take(&mut *self.inner.dependencies.lock());
        for subscription in &subscriptions {
            subscription.unsubscribe();
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::Acquire)
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.state.read().subscribers.len()
    }

    /// Number of dependencies still followed.
    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.lock().len()
    }
}

impl<T> ComputedInner<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    fn get(&self) -> T {
        // Fast path: clean, no write lock
        if !self.dirty.load(Ordering::Acquire) {
            return self.state.read().cached.clone();
        }
        self.refresh().0
    }

    fn refresh(&self) -> (T, Refresh) {
        let mut state = self.state.write();

        // Another caller may have recomputed while we waited for the lock.
        if !self.dirty.load(Ordering::Acquire) {
            return (state.cached.clone(), Refresh::AlreadyClean);
        }

        // Cleared before computing so that a dependency change arriving
        // mid-computation leaves the flag set.
        self.dirty.store(false, Ordering::Release);

        match fault::invoke(FaultSite::Compute, self.on_panic.as_ref(), || (self.compute)()) {
            Ok(value) => {
                let unchanged = state.computed
                    && self
                        .equal
                        .as_ref()
                        .is_some_and(|equal| equal(&state.cached, &value));
                if !unchanged && state.computed {
                    state.unpublished = true;
                }
                state.cached = value.clone();
                state.computed = true;
                let refresh = if unchanged { Refresh::Unchanged } else { Refresh::Changed };
                (value, refresh)
            }
            Err(_) => {
                // Keep the stale value; retry on the next access.
                self.dirty.store(true, Ordering::Release);
                (state.cached.clone(), Refresh::Faulted)
            }
        }
    }

    fn on_dependency_change(&self) {
        self.dirty.store(true, Ordering::Release);

        let (_, refresh) = self.refresh();
        self.publish(refresh);
    }

    /// Notify subscribers of a change, at most once per changed value.
    ///
    /// A concurrent `get` may have recomputed first, in which case `refresh`
    /// is `AlreadyClean` and the pending flag decides.
    fn publish(&self, refresh: Refresh) {
        if refresh == Refresh::Faulted {
            return;
        }

        let (value, callbacks) = {
            let mut state = self.state.write();
            let unpublished = std::mem::take(&mut state.unpublished);
            if !unpublished && refresh != Refresh::Changed {
                return;
            }
            (state.cached.clone(), state.subscribers.snapshot())
        };
        subscriber::notify(
            &callbacks,
            &value,
            FaultSite::ComputedSubscriber,
            self.on_panic.as_ref(),
        );
    }
}

impl<T> Registry for ComputedInner<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    fn unregister(&self, id: SubscriberId) {
        self.state.write().subscribers.remove(id);
    }
}

impl<T> ReadSignal for Computed<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    type Value = T;

    fn get(&self) -> T {
        Computed::get(self)
    }

    fn subscribe<F>(&self, cancellation: &dyn Cancellation, callback: F) -> Unsubscribe
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        Computed::subscribe(self, cancellation, callback)
    }

    fn subscribe_forever<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        Computed::subscribe_forever(self, callback)
    }
}

impl<T> Clone for Computed<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Computed<T>
where
    T: Clone + Default + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("Computed")
            .field("cached", &state.cached)
            .field("dirty", &self.is_dirty())
            .field("subscriber_count", &state.subscribers.len())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
