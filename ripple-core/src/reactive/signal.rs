//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! notifies subscribers whenever the value is replaced.
//!
//! # How Signals Work
//!
//! 1. `set` / `update` take the write lock, store the new value and copy the
//!    current subscriber callbacks.
//!
//! 2. The lock is released.
//!
//! 3. Every copied callback is invoked with the new value, each inside its
//!    own fault boundary.
//!
//! Because notification happens outside the lock, a callback may freely read
//! or write the signal that notified it. It may also observe a value newer
//! than the one it was handed; call `get` again for the freshest value.
//!
//! # Thread Safety
//!
//! Value, subscriber map and id counter share one `parking_lot::RwLock`.
//! Signals never share locks with one another, so writing one signal never
//! blocks an unrelated one.

use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::cancel::Cancellation;
use super::fault::{FaultSite, PanicHandler};
use super::options::{EqualFn, Options};
use super::readonly::{ReadSignal, ReadonlySignal};
use super::subscriber::{self, Registry, SubscriberId, Subscribers, Unsubscribe};

/// A writable reactive value of type T.
///
/// Cloning a `Signal` yields another handle to the same cell.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// let unsub = count.subscribe_forever(|v| println!("count = {v}"));
///
/// count.set(5);                // prints "count = 5"
/// count.update(|v| v + 1);     // prints "count = 6"
/// unsub.unsubscribe();
/// ```
pub struct Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<SignalInner<T>>,
}

struct SignalInner<T> {
    state: RwLock<SignalState<T>>,
    equal: Option<EqualFn<T>>,
    on_panic: Option<PanicHandler>,
    reads: AtomicU64,
    writes: AtomicU64,
}

struct SignalState<T> {
    value: T,
    subscribers: Subscribers<T>,
}

/// Lock-free access counters of a signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalMetrics {
    /// Number of `get` calls.
    pub reads: u64,

    /// Number of stores performed by `set` / `update`.
    /// Writes skipped by the equality check are not counted.
    pub writes: u64,
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new signal. Every `set` notifies and subscriber panics are logged.
    pub fn new(value: T) -> Self {
        Self::with_options(value, Options::default())
    }

    /// Create a new signal with custom equality and/or panic handling.
    pub fn with_options(value: T, options: Options<T>) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                state: RwLock::new(SignalState {
                    value,
                    subscribers: Subscribers::new(),
                }),
                equal: options.equal,
                on_panic: options.on_panic,
                reads: AtomicU64::new(0),
                writes: AtomicU64::new(0),
            }),
        }
    }

    /// Get the current value.
    pub fn get(&self) -> T {
        self.inner.reads.fetch_add(1, Ordering::Relaxed);
        self.inner.state.read().value.clone()
    }

    /// Replace the value and notify subscribers.
    ///
    /// With a custom equality function, a value equal to the current one is
    /// neither stored nor notified.
    pub fn set(&self, value: T) {
        self.update(move |_| value);
    }

    /// Replace the value with `f(current)` and notify subscribers.
    ///
    /// Reading, transforming and storing happen under one write lock, so
    /// concurrent updates never work from a stale value. Keep `f` short and
    /// do not touch this signal from inside it.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let (value, callbacks) = {
            let mut state = self.inner.state.write();
            let new_value = f(&state.value);

            if let Some(equal) = &self.inner.equal {
                if equal(&state.value, &new_value) {
                    return;
                }
            }

            state.value = new_value.clone();
            (new_value, state.subscribers.snapshot())
        };
        self.inner.writes.fetch_add(1, Ordering::Relaxed);

        subscriber::notify(
            &callbacks,
            &value,
            FaultSite::Subscriber,
            self.inner.on_panic.as_ref(),
        );
    }

    /// Register a callback for every later change.
    ///
    /// The subscription is removed when `cancellation` becomes terminal or the
    /// returned handle is used, whichever comes first.
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

    /// A read-only view of this signal.
    pub fn as_readonly(&self) -> ReadonlySignal<T> {
        ReadonlySignal::new(self.clone())
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.state.read().subscribers.len()
    }

    pub fn metrics(&self) -> SignalMetrics {
        SignalMetrics {
            reads: self.inner.reads.load(Ordering::Relaxed),
            writes: self.inner.writes.load(Ordering::Relaxed),
        }
    }

    /// Whether two handles refer to the same cell.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Registry for SignalInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn unregister(&self, id: SubscriberId) {
        self.state.write().subscribers.remove(id);
    }
}

impl<T> ReadSignal for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Value = T;

    fn get(&self) -> T {
        Signal::get(self)
    }

    fn subscribe<F>(&self, cancellation: &dyn Cancellation, callback: F) -> Unsubscribe
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        Signal::subscribe(self, cancellation, callback)
    }

    fn subscribe_forever<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        Signal::subscribe_forever(self, callback)
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("Signal")
            .field("value", &state.value)
            .field("subscriber_count", &state.subscribers.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::cancel::{CancellationToken, Deadline};
    use crate::reactive::fault::Fault;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize};
    use std::time::Duration;

    fn recorder<T: Clone + Send + 'static>() -> (Arc<Mutex<Vec<T>>>, impl Fn(&T) + Send + Sync) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        (log, move |v: &T| log_clone.lock().push(v.clone()))
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        for _ in 0..400 {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn signal_get_and_set() {
        let signal = Signal::new(0);
        assert_eq!(signal.get(), 0);

        signal.set(42);
        assert_eq!(signal.get(), 42);
    }

    #[test]
    fn get_returns_each_value_just_set() {
        let signal = Signal::new(String::new());
        for word in ["a", "b", "b", "c"] {
            signal.set(word.to_string());
            assert_eq!(signal.get(), word);
        }
    }

    #[test]
    fn signal_update() {
        let signal = Signal::new(10);
        signal.update(|v| v + 5);
        assert_eq!(signal.get(), 15);
    }

    #[test]
    fn set_without_equality_always_notifies() {
        let signal = Signal::new(0);
        let (log, callback) = recorder();
        let _unsub = signal.subscribe_forever(callback);

        signal.set(5);
        assert_eq!(*log.lock(), vec![5]);

        signal.set(5);
        assert_eq!(*log.lock(), vec![5, 5]);
    }

    #[test]
    fn equality_suppresses_unchanged_values() {
        let signal = Signal::with_options(1, Options::new().with_partial_eq());
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();
        let _unsub = signal.subscribe_forever(move |_| {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        for _ in 0..10 {
            signal.set(1);
        }
        assert_eq!(call_count.load(Ordering::SeqCst), 0);
        assert_eq!(signal.metrics().writes, 0);

        signal.set(2);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);

        signal.update(|v| *v);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn custom_equality_by_field() {
        #[derive(Clone, Debug, PartialEq)]
        struct User {
            id: u32,
            name: &'static str,
        }

        let user = Signal::with_options(
            User { id: 1, name: "Alice" },
            Options::new().with_equal(|a: &User, b: &User| a.id == b.id),
        );
        let (log, callback) = recorder();
        let _unsub = user.subscribe_forever(callback);

        user.set(User { id: 1, name: "Alicia" });
        assert_eq!(user.get().name, "Alice");
        assert!(log.lock().is_empty());

        user.set(User { id: 2, name: "Bob" });
        assert_eq!(*log.lock(), vec![User { id: 2, name: "Bob" }]);
    }

    #[test]
    fn unsubscribe_before_mutation_means_no_calls() {
        let signal = Signal::new(0);
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let unsub = signal.subscribe_forever(move |_| {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        });
        unsub.unsubscribe();

        signal.set(1);
        signal.update(|v| v + 1);
        assert_eq!(call_count.load(Ordering::SeqCst), 0);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn signal_unsubscribe_mid_stream() {
        let signal = Signal::new(0);
        let (log, callback) = recorder();
        let unsub = signal.subscribe_forever(callback);

        signal.set(1);
        unsub.unsubscribe();
        unsub.unsubscribe();
        signal.set(2);

        assert_eq!(*log.lock(), vec![1]);
    }

    #[test]
    fn multiple_subscribers_in_order() {
        let signal = Signal::new(0);
        let order = Arc::new(Mutex::new(Vec::new()));
        let _subs: Vec<_> = (0..3)
            .map(|tag| {
                let order = order.clone();
                signal.subscribe_forever(move |v: &i32| order.lock().push((tag, *v)))
            })
            .collect();

        signal.set(7);
        assert_eq!(*order.lock(), vec![(0, 7), (1, 7), (2, 7)]);
    }

    #[test]
    fn panicking_subscriber_does_not_stop_others() {
        let faults = Arc::new(Mutex::new(Vec::new()));
        let faults_clone = faults.clone();
        let signal = Signal::with_options(
            0,
            Options::new().with_on_panic(move |fault: &Fault| {
                faults_clone.lock().push(fault.message().to_string());
            }),
        );

        let (log, callback) = recorder();
        let _a = signal.subscribe_forever(|_| panic!("first subscriber"));
        let _b = signal.subscribe_forever(callback);

        signal.set(1);
        signal.set(2);

        assert_eq!(*log.lock(), vec![1, 2]);
        assert_eq!(faults.lock().len(), 2);
        assert_eq!(faults.lock()[0], "first subscriber");
        assert_eq!(signal.get(), 2);
        assert_eq!(signal.subscriber_count(), 2);
    }

    #[test]
    fn default_panic_handler_logs_and_continues() {
        let signal = Signal::new(0);
        let _unsub = signal.subscribe_forever(|_| panic!("logged"));
        signal.set(1);
        assert_eq!(signal.get(), 1);
    }

    #[test]
    fn subscriber_can_reenter_signal() {
        let signal = Signal::new(0);
        let signal_clone = signal.clone();
        let seen = Arc::new(AtomicI32::new(-1));
        let seen_clone = seen.clone();

        let _unsub = signal.subscribe_forever(move |v: &i32| {
            seen_clone.store(signal_clone.get(), Ordering::SeqCst);
            if *v < 3 {
                signal_clone.set(v + 1);
            }
        });

        signal.set(1);
        assert_eq!(signal.get(), 3);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn subscriber_added_during_notification_waits_for_next_round() {
        let signal = Signal::new(0);
        let signal_clone = signal.clone();
        let late = Arc::new(Mutex::new(Vec::new()));
        let late_clone = late.clone();
        let added = Arc::new(AtomicBool::new(false));

        let _first = signal.subscribe_forever(move |_: &i32| {
            if !added.swap(true, Ordering::SeqCst) {
                let late = late_clone.clone();
                let _ = signal_clone.subscribe_forever(move |v: &i32| late.lock().push(*v));
            }
        });
        let (sibling, record) = recorder();
        let _sibling = signal.subscribe_forever(record);

        signal.set(1);
        assert!(late.lock().is_empty());
        assert_eq!(*sibling.lock(), vec![1]);
        assert_eq!(signal.subscriber_count(), 3);

        signal.set(2);
        assert_eq!(*late.lock(), vec![2]);
        assert_eq!(*sibling.lock(), vec![1, 2]);
    }

    #[test]
    fn subscribe_auto_removed_on_cancel() {
        let signal = Signal::new(0);
        let token = CancellationToken::new();
        let (log, callback) = recorder();
        let unsub = signal.subscribe(&token, callback);

        signal.set(1);
        token.cancel();
        assert!(wait_until(|| signal.subscriber_count() == 0));

        signal.set(2);
        assert_eq!(*log.lock(), vec![1]);

        // Manual call after auto-removal is a no-op.
        unsub.unsubscribe();
        assert!(!unsub.is_active());
    }

    #[test]
    fn subscribe_auto_removed_on_deadline() {
        let signal = Signal::new(0);
        let _unsub = signal.subscribe(&Deadline::after(Duration::from_millis(20)), |_| {});
        assert_eq!(signal.subscriber_count(), 1);
        assert!(wait_until(|| signal.subscriber_count() == 0));
    }

    #[test]
    fn readonly_view_shares_state() {
        let signal = Signal::new(1);
        let readonly = signal.as_readonly();
        let (log, callback) = recorder();
        let _unsub = readonly.subscribe_forever(callback);

        signal.set(2);
        assert_eq!(readonly.get(), 2);
        assert_eq!(*log.lock(), vec![2]);
    }

    #[test]
    fn signal_clone_shares_state() {
        let signal1 = Signal::new(0);
        let signal2 = signal1.clone();

        signal1.set(42);
        assert_eq!(signal2.get(), 42);
        assert!(signal1.ptr_eq(&signal2));
        assert!(!signal1.ptr_eq(&Signal::new(42)));
    }

    #[test]
    fn metrics_count_reads_and_writes() {
        let signal = Signal::new(0);
        signal.get();
        signal.get();
        signal.set(1);
        assert_eq!(signal.metrics(), SignalMetrics { reads: 2, writes: 1 });
    }

    #[test]
    fn concurrent_updates_are_atomic() {
        let signal = Signal::new(0_u64);
        let notifications = Arc::new(AtomicUsize::new(0));
        let notifications_clone = notifications.clone();
        let _unsub = signal.subscribe_forever(move |_| {
            notifications_clone.fetch_add(1, Ordering::SeqCst);
        });

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..250 {
                        signal.update(|v| v + 1);
                    }
                });
            }
        });

        assert_eq!(signal.get(), 2000);
        assert_eq!(notifications.load(Ordering::SeqCst), 2000);
    }

    #[test]
    fn concurrent_subscribe_and_set() {
        let signal = Signal::new(0);
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..50 {
                        let unsub = signal.subscribe_forever(|_| {});
                        signal.set(1);
                        unsub.unsubscribe();
                    }
                });
            }
        });
        assert_eq!(signal.subscriber_count(), 0);
    }
}
