//! Dependency Tracking
//!
//! Computed values and effects list their dependencies explicitly. The
//! dependencies hold values of unrelated types, so the consumer only asks
//! each one for a value-less change notification through [`Dependency`].
//!
//! `Dependency` is sealed: it is implemented for [`Signal`],
//! [`ReadonlySignal`] and [`Computed`] of any value type, and nothing else.
//! Passing something that cannot notify is a compile error rather than a
//! subscription that silently never fires.

use std::sync::Arc;

use smallvec::SmallVec;

use super::computed::Computed;
use super::readonly::ReadonlySignal;
use super::signal::Signal;
use super::subscriber::Unsubscribe;

/// Change handler receiving no value.
pub type ChangeFn = Arc<dyn Fn() + Send + Sync>;

/// Subscriptions a consumer holds on its dependencies.
pub(crate) type DependencySubscriptions = SmallVec<[Unsubscribe; 4]>;

mod sealed {
    pub trait Sealed {}
}

/// A reactive source that can report "something changed".
pub trait Dependency: sealed::Sealed + Send + Sync {
    /// Call `on_change` after every change until the handle is used.
    fn subscribe_change(&self, on_change: ChangeFn) -> Unsubscribe;
}

impl<T> sealed::Sealed for Signal<T> where T: Clone + Send + Sync + 'static {}

impl<T> Dependency for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn subscribe_change(&self, on_change: ChangeFn) -> Unsubscribe {
        self.subscribe_forever(move |_| on_change())
    }
}

impl<T> sealed::Sealed for ReadonlySignal<T> where T: Clone + Send + Sync + 'static {}

impl<T> Dependency for ReadonlySignal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn subscribe_change(&self, on_change: ChangeFn) -> Unsubscribe {
        self.source().subscribe_change(on_change)
    }
}

impl<T> sealed::Sealed for Computed<T> where T: Clone + Default + Send + Sync + 'static {}

impl<T> Dependency for Computed<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    fn subscribe_change(&self, on_change: ChangeFn) -> Unsubscribe {
        self.subscribe_forever(move |_| on_change())
    }
}

/// Subscribe `on_change` to every dependency, one handle per dependency.
pub(crate) fn track(dependencies: &[&dyn Dependency], on_change: ChangeFn) -> DependencySubscriptions {
    dependencies
        .iter()
        .map(|dependency| dependency.subscribe_change(Arc::clone(&on_change)))
        .collect()
}
