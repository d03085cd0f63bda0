//! Observable single-value container.
//!
//! DESIGN
//! ======
//! `Reactive<T>` holds a current value and an ordered list of listeners.
//! Subscribing delivers the current value to the new listener once. Every
//! replacement then delivers the new value to each listener in registration
//! order, one pass per replacement. Clones share state.
//!
//! Deliveries go through a FIFO queue. The call that finds the queue idle
//! becomes the deliverer and drains it; a `set` made while a pass is running
//! (from a listener, or from another thread) only enqueues its value. Each
//! queued value reaches every listener before the next one goes out, so
//! listeners observe replacements in the order they happened and the last
//! value a listener sees is the current value.
//!
//! Listeners are invoked outside the lock, so a listener may read the value,
//! subscribe, or set this or another reactive value.
//!
//! ERROR HANDLING
//! ==============
//! Listeners are fallible. A failure stops the pass for that value; later
//! queued values are still delivered. The deliverer returns the first
//! failure it hit. A call that only enqueued returns `Ok`, and failures of
//! its value are reported by the deliverer instead. The value is replaced
//! before delivery; no rollback is attempted.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::storage::StoreError;

/// Change listener. Receives every value the container takes on.
pub type Listener<T> = Arc<dyn Fn(&T) -> Result<(), StoreError> + Send + Sync>;

/// One queued delivery: a value and the listeners registered when it was queued.
struct Pending<T> {
    value: T,
    listeners: Vec<(u64, Listener<T>)>,
    /// Initial delivery to a new subscriber; a failure detaches it.
    initial: bool,
}

struct Inner<T> {
    value: T,
    listeners: Vec<(u64, Listener<T>)>,
    next_id: u64,
    pending: VecDeque<Pending<T>>,
    delivering: bool,
}

impl<T> Inner<T> {
    /// Queue a delivery. Returns true if the caller must drain the queue.
    fn enqueue(&mut self, pending: Pending<T>) -> bool {
        self.pending.push_back(pending);
        !std::mem::replace(&mut self.delivering, true)
    }
}

/// Shared, observable value. See the module docs for delivery rules.
pub struct Reactive<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for Reactive<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T: fmt::Debug> fmt::Debug for Reactive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Reactive")
            .field("value", &inner.value)
            .field("listeners", &inner.listeners.len())
            .finish()
    }
}

impl<T> Reactive<T>
where
    T: Clone + Send + 'static,
{
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                value,
                listeners: Vec::new(),
                next_id: 0,
                pending: VecDeque::new(),
                delivering: false,
            })),
        }
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.lock().value.clone()
    }

    /// Replace the value and notify every listener with it.
    ///
    /// # Errors
    ///
    /// Returns the first listener failure of the deliveries this call drained.
    pub fn set(&self, value: T) -> Result<(), StoreError> {
        let drain = {
            let mut inner = self.lock();
            inner.value = value.clone();
            let listeners = inner.listeners.clone();
            inner.enqueue(Pending { value, listeners, initial: false })
        };
        if drain { self.drain() } else { Ok(()) }
    }

    /// Replace the value with `f(current)` and notify every listener.
    ///
    /// `f` runs without the lock held, so it may read this value. It is not
    /// atomic with respect to a concurrent `set`.
    ///
    /// # Errors
    ///
    /// See [`Reactive::set`].
    pub fn update<F>(&self, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&T) -> T,
    {
        let current = self.get();
        self.set(f(&current))
    }

    /// Register `listener` and deliver the current value to it once.
    ///
    /// # Errors
    ///
    /// If the initial delivery fails the listener is removed again and the
    /// failure is returned.
    pub fn subscribe<F>(&self, listener: F) -> Result<Subscription, StoreError>
    where
        F: Fn(&T) -> Result<(), StoreError> + Send + Sync + 'static,
    {
        self.subscribe_listener(Arc::new(listener))
    }

    /// Same as [`Reactive::subscribe`] for an already shared listener.
    ///
    /// Subscribing while a pass is running queues the initial delivery behind
    /// the values already pending.
    ///
    /// # Errors
    ///
    /// See [`Reactive::subscribe`].
    pub fn subscribe_listener(&self, listener: Listener<T>) -> Result<Subscription, StoreError> {
        let (id, drain) = {
            let mut inner = self.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.listeners.push((id, Arc::clone(&listener)));
            let value = inner.value.clone();
            let drain = inner.enqueue(Pending { value, listeners: vec![(id, listener)], initial: true });
            (id, drain)
        };

        if drain {
            self.drain()?;
        }
        Ok(Subscription::new(Arc::downgrade(&self.inner), id))
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver queued values until the queue is empty.
    fn drain(&self) -> Result<(), StoreError> {
        let mut first_error = None;
        while let Some(pending) = self.next_pending() {
            if let Err((id, err)) = deliver(&pending) {
                if pending.initial {
                    detach(&self.inner, id);
                }
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn next_pending(&self) -> Option<Pending<T>> {
        let mut inner = self.lock();
        let next = inner.pending.pop_front();
        if next.is_none() {
            inner.delivering = false;
        }
        next
    }
}

/// Run one pass. Stops at the first failing listener.
fn deliver<T>(pending: &Pending<T>) -> Result<(), (u64, StoreError)> {
    for (id, listener) in &pending.listeners {
        listener(&pending.value).map_err(|err| (*id, err))?;
    }
    Ok(())
}

fn detach<T>(inner: &Mutex<Inner<T>>, id: u64) {
    let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
    inner.listeners.retain(|(listener_id, _)| *listener_id != id);
}

// =============================================================================
// SUBSCRIPTION
// =============================================================================

/// Handle returned by `subscribe`.
///
/// Dropping the handle leaves the listener attached; only
/// [`Subscription::unsubscribe`] detaches it.
pub struct Subscription {
    detach: Box<dyn FnOnce() + Send + Sync>,
}

impl Subscription {
    fn new<T: Send + 'static>(inner: Weak<Mutex<Inner<T>>>, id: u64) -> Self {
        Self {
            detach: Box::new(move || {
                if let Some(inner) = inner.upgrade() {
                    detach(&inner, id);
                }
            }),
        }
    }

    /// Remove the listener. Later replacements no longer reach it.
    pub fn unsubscribe(self) {
        (self.detach)();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "reactive_test.rs"]
mod tests;
