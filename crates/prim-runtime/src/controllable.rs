#![forbid(unsafe_code)]

//! Controlled state with change callbacks.
//!
//! [`ControllableStore`] tracks controlled keys like
//! [`ReactStore`](crate::ReactStore) but additionally keeps one change
//! callback per key. `set` always tells the callback about the attempted
//! value first, then discards the write if the key is controlled. This lets
//! a controlled component forward "the user wants V" to its owner while the
//! store keeps showing the owner's value.
//!
//! Besides controlled switches, changing the default of an uncontrolled key
//! after its first registration is reported as
//! [`Diagnostic::DefaultValueChanged`](prim_core::Diagnostic::DefaultValueChanged).

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use prim_core::diagnostics;
use prim_core::{
    ControlledKeys, Key, Patch, ReadonlyStore, Store, StoreId, Subscription, WritableStore,
};
use rustc_hash::FxHashMap;

use crate::runtime::RenderContext;

type ChangeCallback<V> = Rc<dyn Fn(&V)>;

struct ControllableInner<S> {
    store: Store<S>,
    controlled: ControlledKeys<S>,
    /// `ChangeCallback<V>` per key name, type-erased.
    callbacks: RefCell<FxHashMap<&'static str, Rc<dyn Any>>>,
}

/// Store whose controlled keys report attempted writes.
pub struct ControllableStore<S> {
    inner: Rc<ControllableInner<S>>,
}

impl<S> Clone for ControllableStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S> PartialEq for ControllableStore<S> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<S> Eq for ControllableStore<S> {}

impl<S: fmt::Debug> fmt::Debug for ControllableStore<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllableStore")
            .field("store", &self.inner.store)
            .field("controlled", &self.inner.controlled)
            .finish()
    }
}

impl<S: Clone + 'static> ControllableStore<S> {
    /// A store holding `state` with no keys registered yet.
    #[must_use]
    pub fn new(state: S) -> Self {
        let store = Store::new(state);
        let controlled = ControlledKeys::new(store.id());
        Self {
            inner: Rc::new(ControllableInner {
                store,
                controlled,
                callbacks: RefCell::new(FxHashMap::default()),
            }),
        }
    }

    /// Store identity.
    #[must_use]
    pub fn id(&self) -> StoreId {
        self.inner.store.id()
    }

    /// The current state (non-subscribing read).
    #[must_use]
    pub fn state(&self) -> Rc<S> {
        self.inner.store.state()
    }

    /// The current state. Pointer-stable until the next update.
    #[must_use]
    pub fn get_snapshot(&self) -> Rc<S> {
        self.inner.store.get_snapshot()
    }

    /// Whether `name` is currently controlled.
    #[must_use]
    pub fn is_controlled(&self, name: &str) -> bool {
        self.inner.controlled.is_controlled(name)
    }

    /// Register a listener called with the new state after every change.
    pub fn subscribe(&self, listener: impl Fn(&Rc<S>) + 'static) -> Subscription {
        self.inner.store.subscribe(listener)
    }

    /// Register `key` and its change callback for this render.
    ///
    /// The latest callback wins. Seeding and layout-phase sync behave as in
    /// [`ReactStore::use_controlled_prop`](crate::ReactStore::use_controlled_prop).
    pub fn use_controlled_prop<V>(
        &self,
        cx: &RenderContext<'_>,
        key: Key<S, V>,
        controlled: Option<V>,
        default: V,
        on_change: impl Fn(&V) + 'static,
    ) where
        V: Clone + PartialEq + 'static,
    {
        let callback: ChangeCallback<V> = Rc::new(on_change);
        self.inner
            .callbacks
            .borrow_mut()
            .insert(key.name(), Rc::new(callback));

        let registration = self.inner.controlled.register(key, controlled.is_some());
        let default_changed = self.inner.controlled.check_default(key, &default);
        if cx.dev_checks() {
            for diagnostic in registration.switched.into_iter().chain(default_changed) {
                diagnostics::report(diagnostic);
            }
        }
        if registration.first && controlled.is_none() {
            self.inner.store.set(key, default);
        }

        let store = self.inner.store.clone();
        cx.use_layout_effect_always(move || {
            if let Some(value) = controlled {
                store.set(key, value);
            }
            None
        });
    }

    /// Report `value` to the key's change callback, then write it unless
    /// the key is controlled.
    pub fn set<V>(&self, key: Key<S, V>, value: V)
    where
        V: Clone + PartialEq + 'static,
    {
        let callback = self
            .inner
            .callbacks
            .borrow()
            .get(key.name())
            .and_then(|any| any.downcast_ref::<ChangeCallback<V>>())
            .cloned();
        if let Some(callback) = callback {
            callback(&value);
        }
        if self.inner.controlled.is_controlled(key.name()) {
            return;
        }
        self.inner.store.set(key, value);
    }

    /// Merge `patch` minus its controlled keys. No callbacks run.
    pub fn apply(&self, patch: Patch<S>) {
        self.inner
            .store
            .apply(self.inner.controlled.filter_patch(&patch));
    }

    /// Replace the state, keeping the current value of controlled keys.
    pub fn update(&self, next: impl Into<Rc<S>>) {
        let next = next.into();
        let current = self.inner.store.state();
        if Rc::ptr_eq(&current, &next) || !self.inner.controlled.any_controlled() {
            self.inner.store.update(next);
            return;
        }
        let mut merged = S::clone(&next);
        self.inner.controlled.preserve_controlled(&current, &mut merged);
        self.inner.store.update(merged);
    }
}

impl<S: Clone + 'static> ReadonlyStore for ControllableStore<S> {
    type State = S;

    fn store_id(&self) -> StoreId {
        self.id()
    }

    fn get_snapshot(&self) -> Rc<S> {
        ControllableStore::get_snapshot(self)
    }

    fn subscribe(&self, listener: impl Fn(&Rc<S>) + 'static) -> Subscription {
        ControllableStore::subscribe(self, listener)
    }
}

impl<S: Clone + 'static> WritableStore for ControllableStore<S> {
    fn update(&self, next: impl Into<Rc<S>>) {
        ControllableStore::update(self, next);
    }

    fn apply(&self, patch: Patch<S>) {
        ControllableStore::apply(self, patch);
    }

    fn set<V>(&self, key: Key<S, V>, value: V)
    where
        V: Clone + PartialEq + 'static,
    {
        ControllableStore::set(self, key, value);
    }
}
