//! Cell and effect configuration.

use std::fmt;
use std::sync::Arc;

use super::fault::{Fault, PanicHandler};

/// Equality predicate deciding whether a new value counts as a change.
pub type EqualFn<T> = Arc<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// Options for a [`Signal`](super::Signal) or [`Computed`](super::Computed).
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone)]
/// struct User { id: u32, name: String }
///
/// // Compare users by id only
/// let user = Signal::with_options(
///     User { id: 1, name: "Alice".into() },
///     Options::new().with_equal(|a: &User, b: &User| a.id == b.id),
/// );
/// ```
pub struct Options<T> {
    /// Custom equality. When absent every `set` notifies.
    pub equal: Option<EqualFn<T>>,

    /// Receives panics from compute functions and subscribers.
    /// When absent they are logged with `tracing` and execution continues.
    pub on_panic: Option<PanicHandler>,
}

impl<T> Options<T> {
    pub fn new() -> Self {
        Self {
            equal: None,
            on_panic: None,
        }
    }

    /// Skip stores and notifications when `equal(current, new)` holds.
    pub fn with_equal<F>(mut self, equal: F) -> Self
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        self.equal = Some(Arc::new(equal));
        self
    }

    /// Use `PartialEq` as the equality predicate.
    pub fn with_partial_eq(self) -> Self
    where
        T: PartialEq + 'static,
    {
        self.with_equal(|a: &T, b: &T| a == b)
    }

    pub fn with_on_panic<F>(mut self, on_panic: F) -> Self
    where
        F: Fn(&Fault) + Send + Sync + 'static,
    {
        self.on_panic = Some(Arc::new(on_panic));
        self
    }
}

impl<T> Default for Options<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Options<T> {
    fn clone(&self) -> Self {
        Self {
            equal: self.equal.clone(),
            on_panic: self.on_panic.clone(),
        }
    }
}

impl<T> fmt::Debug for Options<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("equal", &self.equal.is_some())
            .field("on_panic", &self.on_panic.is_some())
            .finish()
    }
}

/// Options for an [`Effect`](super::Effect).
#[derive(Clone, Default)]
pub struct EffectOptions {
    /// Receives panics from the effect body and its cleanups.
    pub on_panic: Option<PanicHandler>,
}

impl EffectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_on_panic<F>(mut self, on_panic: F) -> Self
    where
        F: Fn(&Fault) + Send + Sync + 'static,
    {
        self.on_panic = Some(Arc::new(on_panic));
        self
    }
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("on_panic", &self.on_panic.is_some())
            .finish()
    }
}
