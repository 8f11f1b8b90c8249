//! Read-only access to reactive values.

use std::fmt::{self, Debug};

use super::cancel::Cancellation;
use super::signal::Signal;
use super::subscriber::Unsubscribe;

/// The read surface shared by signals, read-only views and computed values.
pub trait ReadSignal {
    type Value: Clone + Send + Sync + 'static;

    /// Get the current value.
    fn get(&self) -> Self::Value;

    /// Register a callback removed once `cancellation` becomes terminal.
    fn subscribe<F>(&self, cancellation: &dyn Cancellation, callback: F) -> Unsubscribe
    where
        F: Fn(&Self::Value) + Send + Sync + 'static;

    /// Register a callback removed only through the returned handle.
    fn subscribe_forever<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&Self::Value) + Send + Sync + 'static;
}

/// A view of a [`Signal`] without `set` / `update`.
///
/// Keep the `Signal` private and hand out this view to control who mutates.
///
/// ```rust,ignore
/// struct Counter {
///     count: Signal<u32>,
/// }
///
/// impl Counter {
///     fn count(&self) -> ReadonlySignal<u32> {
///         self.count.as_readonly()
///     }
///
///     fn increment(&self) {
///         self.count.update(|n| n + 1);
///     }
/// }
/// ```
pub struct ReadonlySignal<T>
where
    T: Clone + Send + Sync + 'static,
{
    source: Signal<T>,
}

impl<T> ReadonlySignal<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(source: Signal<T>) -> Self {
        Self { source }
    }

    pub fn get(&self) -> T {
        self.source.get()
    }

    pub fn subscribe<F>(&self, cancellation: &dyn Cancellation, callback: F) -> Unsubscribe
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.source.subscribe(cancellation, callback)
    }

    pub fn subscribe_forever<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.source.subscribe_forever(callback)
    }

    pub(crate) fn source(&self) -> &Signal<T> {
        &self.source
    }
}

impl<T> ReadSignal for ReadonlySignal<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Value = T;

    fn get(&self) -> T {
        ReadonlySignal::get(self)
    }

    fn subscribe<F>(&self, cancellation: &dyn Cancellation, callback: F) -> Unsubscribe
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        ReadonlySignal::subscribe(self, cancellation, callback)
    }

    fn subscribe_forever<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        ReadonlySignal::subscribe_forever(self, callback)
    }
}

impl<T> Clone for ReadonlySignal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
        }
    }
}

impl<T> Debug for ReadonlySignal<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReadonlySignal").field(&self.source).finish()
    }
}
