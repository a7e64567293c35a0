#![forbid(unsafe_code)]

//! Observable state container with identity-based change detection.
//!
//! # Design
//!
//! [`Store<S>`] holds its state as an `Rc<S>` in shared, reference-counted
//! storage. The state is never mutated in place: every change builds a new
//! `Rc<S>` and swaps it in, so `Rc::ptr_eq(old, new)` reliably answers
//! "did anything change?". Snapshots returned by [`Store::get_snapshot`] are
//! therefore stable between calls when no update happened.
//!
//! Cloning a `Store` creates another handle to the **same** state and
//! listeners. Handles compare equal by identity.
//!
//! # Invariants
//!
//! 1. `update(next)` with `next` pointer-equal to the current state is a no-op.
//! 2. `apply(patch)` notifies at most once, and only if some write differs.
//! 3. Listeners run synchronously, in registration order, after the state is
//!    replaced.
//! 4. `version` increments exactly once per notifying update.
//! 5. A listener unsubscribed during a notification pass is not called later
//!    in that pass; other listeners are unaffected.
//!
//! # Equality
//!
//! Value comparisons (`apply`, `set`, selector memos) use `PartialEq`. A
//! field whose type is not reflexive, such as `f64` holding NaN, compares
//! unequal to itself, so rewriting it notifies. Wrap such fields in a type
//! with a total equality when silent rewrites matter.
//!
//! # Failure Modes
//!
//! - **Re-entrant updates**: a listener may update the store. The nested
//!   notification runs to completion before the outer pass resumes; nothing
//!   is deduplicated, so unbounded update chains loop forever.
//! - **Forgotten guards**: dropping a [`Subscription`] unsubscribes. Use
//!   [`Subscription::detach`] to keep a listener for the store's lifetime.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::key::{Key, Patch};

/// Process-unique identity of a store, shared by all of its handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreId(u64);

impl StoreId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "store#{}", self.0)
    }
}

/// Read side of a store: snapshots plus change notification.
///
/// Implemented by [`Store`] and by every store built on top of it, so the
/// subscription bridge can treat them uniformly.
pub trait ReadonlyStore: Clone + 'static {
    /// The state record type.
    type State: 'static;

    /// Identity shared by every handle to this store.
    fn store_id(&self) -> StoreId;

    /// The current state. Pointer-stable until the next update.
    fn get_snapshot(&self) -> Rc<Self::State>;

    /// Register a listener called with the new state after each change.
    fn subscribe(&self, listener: impl Fn(&Rc<Self::State>) + 'static) -> Subscription;
}

/// Write side of a store.
pub trait WritableStore: ReadonlyStore {
    /// Replace the whole state.
    fn update(&self, next: impl Into<Rc<Self::State>>);

    /// Merge a partial patch with a single notification.
    fn apply(&self, patch: Patch<Self::State>);

    /// Write one key.
    fn set<V>(&self, key: Key<Self::State, V>, value: V)
    where
        V: Clone + PartialEq + 'static;
}

struct Listener<S> {
    active: Cell<bool>,
    callback: Box<dyn Fn(&Rc<S>)>,
}

struct StoreInner<S> {
    id: StoreId,
    state: RefCell<Rc<S>>,
    version: Cell<u64>,
    /// Live listeners in registration order.
    listeners: RefCell<Vec<Rc<Listener<S>>>>,
}

/// A shared observable state container.
///
/// See the [module documentation](self) for the change-detection contract.
pub struct Store<S> {
    inner: Rc<StoreInner<S>>,
}

impl<S> Clone for Store<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S> PartialEq for Store<S> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<S> Eq for Store<S> {}

impl<S: fmt::Debug> fmt::Debug for Store<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.inner.id)
            .field("state", &*self.inner.state.borrow())
            .field("version", &self.inner.version.get())
            .field("listener_count", &self.inner.listeners.borrow().len())
            .finish()
    }
}

impl<S: 'static> Store<S> {
    /// Create a store holding `state`. The initial version is 0.
    #[must_use]
    pub fn new(state: S) -> Self {
        Self {
            inner: Rc::new(StoreInner {
                id: StoreId::next(),
                state: RefCell::new(Rc::new(state)),
                version: Cell::new(0),
                listeners: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Identity shared by every handle to this store.
    #[must_use]
    pub fn id(&self) -> StoreId {
        self.inner.id
    }

    /// The current state (non-subscribing read).
    #[must_use]
    pub fn state(&self) -> Rc<S> {
        Rc::clone(&self.inner.state.borrow())
    }

    /// The current state. Pointer-stable until the next update.
    #[must_use]
    pub fn get_snapshot(&self) -> Rc<S> {
        self.state()
    }

    /// Number of notifying updates so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    /// Register `listener`, called with the new state after every change.
    pub fn subscribe(&self, listener: impl Fn(&Rc<S>) + 'static) -> Subscription {
        let entry = Rc::new(Listener {
            active: Cell::new(true),
            callback: Box::new(listener),
        });
        self.inner.listeners.borrow_mut().push(Rc::clone(&entry));

        let store: Weak<StoreInner<S>> = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            entry.active.set(false);
            if let Some(inner) = store.upgrade() {
                inner
                    .listeners
                    .borrow_mut()
                    .retain(|l| !Rc::ptr_eq(l, &entry));
            }
        })
    }

    /// Replace the state wholesale and notify listeners.
    ///
    /// Does nothing if `next` is pointer-equal to the current state.
    pub fn update(&self, next: impl Into<Rc<S>>) {
        let next = next.into();
        {
            let mut state = self.inner.state.borrow_mut();
            if Rc::ptr_eq(&state, &next) {
                return;
            }
            *state = Rc::clone(&next);
        }
        self.inner.version.set(self.inner.version.get() + 1);
        tracing::trace!(
            store = %self.inner.id,
            version = self.inner.version.get(),
            "store updated"
        );
        self.dispatch(&next);
    }

    /// Notify every listener with the current state without changing it.
    ///
    /// Used to propagate changes of nested stores held inside this state.
    pub fn notify_all(&self) {
        let state = self.state();
        self.dispatch(&state);
    }

    /// Clone-and-mutate helper: build the next state from the current one.
    pub fn modify(&self, f: impl FnOnce(&mut S))
    where
        S: Clone,
    {
        let mut next = S::clone(&self.state());
        f(&mut next);
        self.update(next);
    }

    fn dispatch(&self, state: &Rc<S>) {
        // Snapshot the list so listeners can (un)subscribe while we iterate.
        let listeners: Vec<Rc<Listener<S>>> = self.inner.listeners.borrow().clone();
        for listener in &listeners {
            if listener.active.get() {
                (listener.callback)(state);
            }
        }
    }
}

impl<S: Clone + 'static> Store<S> {
    /// Shallow-merge `patch` into the state with a single notification.
    ///
    /// If every write equals the current value, nothing happens.
    pub fn apply(&self, patch: Patch<S>) {
        let current = self.state();
        if !patch.differs(&current) {
            return;
        }
        let mut next = S::clone(&current);
        patch.merge_into(&mut next);
        self.update(next);
    }

    /// Write one key. Equal values are ignored.
    pub fn set<V>(&self, key: Key<S, V>, value: V)
    where
        V: Clone + PartialEq + 'static,
    {
        let current = self.state();
        if *key.get(&current) == value {
            return;
        }
        let mut next = S::clone(&current);
        key.write(&mut next, value);
        self.update(next);
    }
}

impl<S: Clone + 'static> ReadonlyStore for Store<S> {
    type State = S;

    fn store_id(&self) -> StoreId {
        self.id()
    }

    fn get_snapshot(&self) -> Rc<S> {
        self.state()
    }

    fn subscribe(&self, listener: impl Fn(&Rc<S>) + 'static) -> Subscription {
        Store::subscribe(self, listener)
    }
}

impl<S: Clone + 'static> WritableStore for Store<S> {
    fn update(&self, next: impl Into<Rc<S>>) {
        Store::update(self, next);
    }

    fn apply(&self, patch: Patch<S>) {
        Store::apply(self, patch);
    }

    fn set<V>(&self, key: Key<S, V>, value: V)
    where
        V: Clone + PartialEq + 'static,
    {
        Store::set(self, key, value);
    }
}

/// Guard for a registered listener.
///
/// [`unsubscribe`](Self::unsubscribe) removes the listener and may be called
/// any number of times. Dropping the guard unsubscribes as well.
#[must_use = "dropping a Subscription unsubscribes its listener"]
pub struct Subscription {
    cancel: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl Subscription {
    /// Wrap a cancellation closure. It runs at most once.
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: RefCell::new(Some(Box::new(cancel))),
        }
    }

    /// A subscription with nothing to cancel.
    pub fn empty() -> Self {
        Self {
            cancel: RefCell::new(None),
        }
    }

    /// Stop notifications. Idempotent.
    pub fn unsubscribe(&self) {
        let cancel = self.cancel.borrow_mut().take();
        if let Some(cancel) = cancel {
            cancel();
        }
    }

    /// Whether the listener is still registered through this guard.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.cancel.borrow().is_some()
    }

    /// Keep the listener registered for the lifetime of the store.
    pub fn detach(self) {
        self.cancel.borrow_mut().take();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
