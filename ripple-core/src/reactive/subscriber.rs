//! Subscriber bookkeeping shared by signals and computed values.
//!
//! A cell keeps its callbacks in a [`Subscribers`] map under the same lock as
//! its value. Each registration gets a fresh [`SubscriberId`] and an
//! [`Unsubscribe`] handle. When the registration came with a
//! [`Cancellation`], a background watcher removes it once the cancellation
//! becomes terminal. Manual unsubscription and the watcher race for a single
//! teardown flag, so the entry is removed exactly once.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use smallvec::SmallVec;
use tokio::sync::Notify;

use super::cancel::Cancellation;
use super::fault::{self, FaultSite, PanicHandler};

/// Identifier of one registration on one cell.
///
/// Ids are handed out by a per-cell counter and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// A subscriber callback receiving the new value.
pub(crate) type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Callbacks copied out of a cell for one notification round.
pub(crate) type Snapshot<T> = SmallVec<[Callback<T>; 4]>;

/// Insertion-ordered callback map. Notification order is subscription order.
pub(crate) struct Subscribers<T> {
    next_id: u64,
    callbacks: IndexMap<SubscriberId, Callback<T>>,
}

impl<T> Subscribers<T> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 0,
            callbacks: IndexMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, callback: Callback<T>) -> SubscriberId {
        let id = SubscriberId(self.next_id);
        self.next_id += 1;
        self.callbacks.insert(id, callback);
        id
    }

    pub(crate) fn remove(&mut self, id: SubscriberId) -> bool {
        self.callbacks.shift_remove(&id).is_some()
    }

    pub(crate) fn snapshot(&self) -> Snapshot<T> {
        self.callbacks.values().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.callbacks.len()
    }
}

/// Invoke every callback of a round, isolating each one.
pub(crate) fn notify<T>(
    callbacks: &[Callback<T>],
    value: &T,
    site: FaultSite,
    on_panic: Option<&PanicHandler>,
) {
    for callback in callbacks {
        let _ = fault::invoke(site, on_panic, || callback(value));
    }
}

/// A cell that can drop a registration by id.
pub(crate) trait Registry: Send + Sync {
    fn unregister(&self, id: SubscriberId);
}

/// Shared teardown state of one registration.
struct Teardown {
    id: SubscriberId,
    registry: Weak<dyn Registry>,
    done: AtomicBool,
    released: Notify,
}

impl Teardown {
    /// Remove the registration. Returns false when another path already did.
    fn run(&self) -> bool {
        if self.done.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(self.id);
        }
        true
    }
}

/// Handle removing one subscription.
///
/// Calling [`unsubscribe`](Unsubscribe::unsubscribe) more than once, or after
/// the subscription's cancellation fired, does nothing. Dropping the handle
/// does not unsubscribe.
#[must_use = "dropping an Unsubscribe leaves the subscription registered"]
#[derive(Clone)]
pub struct Unsubscribe {
    teardown: Arc<Teardown>,
}

impl Unsubscribe {
    pub fn unsubscribe(&self) {
        if self.teardown.run() {
            tracing::trace!(id = self.teardown.id.raw(), "subscription removed manually");
            self.teardown.released.notify_one();
        }
    }

    /// Whether the subscription is still registered.
    pub fn is_active(&self) -> bool {
        !self.teardown.done.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("id", &self.teardown.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Build the handle for a fresh registration and, when a cancellation is
/// given, start the watcher that removes it on termination.
pub(crate) fn attach(
    registry: Weak<dyn Registry>,
    id: SubscriberId,
    cancellation: Option<&dyn Cancellation>,
) -> Unsubscribe {
    let teardown = Arc::new(Teardown {
        id,
        registry,
        done: AtomicBool::new(false),
        released: Notify::new(),
    });

    if let Some(cancellation) = cancellation {
        if cancellation.is_cancelled() {
            teardown.run();
        } else {
            spawn_watcher(cancellation, Arc::clone(&teardown));
        }
    }

    Unsubscribe { teardown }
}

fn spawn_watcher(cancellation: &dyn Cancellation, teardown: Arc<Teardown>) {
    let cancelled = cancellation.cancelled();
    let watcher = async move {
        tokio::select! {
            _ = cancelled => {
                if teardown.run() {
                    tracing::trace!(id = teardown.id.raw(), "subscription removed by cancellation");
                }
            }
            _ = teardown.released.notified() => {}
        }
    };

    // Prefer the caller's runtime. Outside one, or when the watcher needs a
    // timer the caller's runtime may lack, drive it on its own thread so the
    // caller never blocks.
    if !cancellation.needs_timer() {
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(watcher);
            return;
        }
    }

    let spawned = std::thread::Builder::new()
        .name("ripple-cancel-watch".into())
        .spawn(move || {
            match tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
            {
                Ok(runtime) => runtime.block_on(watcher),
                Err(err) => {
                    tracing::warn!(%err, "failed to start cancellation watcher runtime");
                }
            }
        });
    if let Err(err) = spawned {
        tracing::warn!(%err, "failed to spawn cancellation watcher thread");
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
