#![forbid(unsafe_code)]

//! A store that owns a component's controlled and uncontrolled state.
//!
//! # Design
//!
//! [`ReactStore`] assembles a plain [`Store`] with three add-ons:
//!
//! - a [`ControlledKeys`] tracker deciding which keys only the owner may
//!   write,
//! - an optional, fixed [`Selectors`] map for named reads,
//! - a non-reactive `context` value (refs, [`StableCallback`]s).
//!
//! # Controlled keys
//!
//! `use_controlled_prop` classifies a key on every render. While a key is
//! controlled, `set` ignores it, `apply` drops it from the patch and
//! `update` keeps its current value; only the layout-phase sync installed
//! by `use_controlled_prop` writes it. Reclassifying a key against its first
//! classification is reported as a [`Diagnostic::ControlledSwitch`] once.
//!
//! # Observation
//!
//! [`observe`](ReactStore::observe) calls its listener immediately with
//! `(current, current)`, then with `(new, old)` whenever the selection
//! changes. Each observer tracks its own previous value.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use prim_core::diagnostics::{self, Diagnostic};
use prim_core::{
    ControlledKeys, Key, Patch, ReadonlyStore, Selector, Selectors, Store, StoreError, StoreId,
    Subscription, WritableStore, create_selector,
};
use rustc_hash::FxHashMap;

use crate::effects::Cleanup;
use crate::runtime::RenderContext;
use crate::stable_callback::StableCallback;
use crate::use_store::{use_store, use_store_with};

struct ReactInner<S, C> {
    store: Store<S>,
    context: C,
    controlled: ControlledKeys<S>,
    selectors: Option<Selectors<S>>,
    element_setters: RefCell<FxHashMap<&'static str, Rc<dyn Any>>>,
}

/// Store with controlled-prop registration, synced values, named selectors
/// and observation.
///
/// Cloning yields another handle to the same store.
pub struct ReactStore<S, C = ()> {
    inner: Rc<ReactInner<S, C>>,
}

impl<S, C> Clone for ReactStore<S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S, C> PartialEq for ReactStore<S, C> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<S, C> Eq for ReactStore<S, C> {}

impl<S: fmt::Debug, C> fmt::Debug for ReactStore<S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactStore")
            .field("store", &self.inner.store)
            .field("controlled", &self.inner.controlled)
            .field("selectors", &self.inner.selectors)
            .finish()
    }
}

impl<S: Clone + 'static> ReactStore<S> {
    /// A store with no context and no selectors.
    #[must_use]
    pub fn new(state: S) -> Self {
        Self::from_parts(state, (), None)
    }
}

impl<S: Clone + 'static, C: 'static> ReactStore<S, C> {
    /// A store with a context value.
    #[must_use]
    pub fn with_context(state: S, context: C) -> Self {
        Self::from_parts(state, context, None)
    }

    /// A store with a context value and a named selector map.
    #[must_use]
    pub fn with_selectors(state: S, context: C, selectors: Selectors<S>) -> Self {
        Self::from_parts(state, context, Some(selectors))
    }

    /// Assemble a store from its parts.
    #[must_use]
    pub fn from_parts(state: S, context: C, selectors: Option<Selectors<S>>) -> Self {
        let store = Store::new(state);
        let controlled = ControlledKeys::new(store.id());
        Self {
            inner: Rc::new(ReactInner {
                store,
                context,
                controlled,
                selectors,
                element_setters: RefCell::new(FxHashMap::default()),
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

    /// The non-reactive context.
    #[must_use]
    pub fn context(&self) -> &C {
        &self.inner.context
    }

    /// The underlying notification store.
    #[must_use]
    pub fn store(&self) -> &Store<S> {
        &self.inner.store
    }

    /// Notifying updates so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.store.version()
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

    /// Notify listeners without changing the state.
    pub fn notify_all(&self) {
        self.inner.store.notify_all();
    }

    /// Write one key unless it is controlled. Equal values are ignored.
    pub fn set<V>(&self, key: Key<S, V>, value: V)
    where
        V: Clone + PartialEq + 'static,
    {
        if self.inner.controlled.is_controlled(key.name()) {
            return;
        }
        self.inner.store.set(key, value);
    }

    /// Merge `patch` minus its controlled keys, notifying at most once.
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

    // -- hooks ------------------------------------------------------------

    /// Register `key` as controlled (`Some`) or uncontrolled (`None`).
    ///
    /// On the first registration of an uncontrolled key the state is seeded
    /// with `default` right away. A controlled value is written in the
    /// layout phase of every commit where it differs from the state.
    pub fn use_controlled_prop<V>(
        &self,
        cx: &RenderContext<'_>,
        key: Key<S, V>,
        controlled: Option<V>,
        default: V,
    ) where
        V: Clone + PartialEq + 'static,
    {
        let registration = self.inner.controlled.register(key, controlled.is_some());
        if let Some(diagnostic) = registration.switched
            && cx.dev_checks()
        {
            diagnostics::report(diagnostic);
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

    /// Mirror `value` into `key` in the layout phase when it changes.
    pub fn use_synced_value<V>(&self, cx: &RenderContext<'_>, key: Key<S, V>, value: V)
    where
        V: Clone + PartialEq + 'static,
    {
        let this = self.clone();
        cx.use_layout_effect(value.clone(), move || {
            this.set(key, value);
            None
        });
    }

    /// [`use_synced_value`](Self::use_synced_value), resetting the key to
    /// `V::default()` when the unit unmounts.
    ///
    /// Value changes write the new value directly, with no intermediate reset.
    pub fn use_synced_value_with_cleanup<V>(&self, cx: &RenderContext<'_>, key: Key<S, V>, value: V)
    where
        V: Clone + PartialEq + Default + 'static,
    {
        self.use_synced_value(cx, key, value);
        let this = self.clone();
        cx.use_on_mount(move || Some(Box::new(move || this.set(key, V::default())) as Cleanup));
    }

    /// Mirror several values with one `apply` per commit.
    ///
    /// The patch must name the same keys on every render.
    pub fn use_synced_values(&self, cx: &RenderContext<'_>, patch: Patch<S>) {
        let keys: Vec<&'static str> = patch.keys().collect();
        let first = cx.use_ref(|| (keys.clone(), false));
        {
            let mut first = first.borrow_mut();
            if first.0 != keys && !first.1 && cx.dev_checks() {
                first.1 = true;
                diagnostics::report(Diagnostic::UnstableSyncedKeys {
                    store: Some(self.id()),
                    expected: first.0.clone(),
                    actual: keys,
                });
            }
        }

        let this = self.clone();
        cx.use_layout_effect_always(move || {
            this.apply(patch);
            None
        });
    }

    /// Subscribe the unit to the named selector and return its value.
    pub fn use_state<V>(&self, cx: &RenderContext<'_>, name: &str) -> Result<V, StoreError>
    where
        V: Clone + PartialEq + 'static,
    {
        let selector = self.named::<V, ()>(name)?;
        Ok(use_store(cx, self, &selector))
    }

    /// [`use_state`](Self::use_state) for a selector taking args.
    pub fn use_state_with<V, A>(
        &self,
        cx: &RenderContext<'_>,
        name: &str,
        args: A,
    ) -> Result<V, StoreError>
    where
        V: Clone + PartialEq + 'static,
        A: Clone + PartialEq + 'static,
    {
        let selector = self.named::<V, A>(name)?;
        Ok(use_store_with(cx, self, &selector, args))
    }

    /// Install `f` behind the [`StableCallback`] that `field` picks from
    /// the context. The callback's identity never changes.
    pub fn use_context_callback<A, R>(
        &self,
        cx: &RenderContext<'_>,
        field: fn(&C) -> &StableCallback<A, R>,
        f: impl Fn(A) -> R + 'static,
    ) where
        A: 'static,
        R: 'static,
    {
        let callback = field(&self.inner.context).clone();
        let f: Rc<dyn Fn(A) -> R> = Rc::new(f);
        cx.use_layout_effect_always(move || {
            callback.set_shared(f);
            None
        });
    }

    // -- reads ------------------------------------------------------------

    /// Read the named selector without subscribing.
    pub fn select<V>(&self, name: &str) -> Result<V, StoreError>
    where
        V: Clone + PartialEq + 'static,
    {
        Ok(self.named::<V, ()>(name)?.select(&self.state()))
    }

    /// Read the named selector with args without subscribing.
    pub fn select_with<V, A>(&self, name: &str, args: &A) -> Result<V, StoreError>
    where
        V: Clone + PartialEq + 'static,
        A: Clone + PartialEq + 'static,
    {
        Ok(self.named::<V, A>(name)?.select_with(&self.state(), args))
    }

    fn named<V, A>(&self, name: &str) -> Result<Selector<S, V, A>, StoreError>
    where
        V: Clone + PartialEq + 'static,
        A: Clone + PartialEq + 'static,
    {
        self.inner
            .selectors
            .as_ref()
            .ok_or(StoreError::SelectorsRequired)?
            .get(name)
    }

    // -- observation --------------------------------------------------------

    /// Call `listener(new, old, store)` now and whenever `selector`'s value
    /// changes.
    pub fn observe<V>(
        &self,
        selector: &Selector<S, V>,
        listener: impl Fn(&V, &V, &Self) + 'static,
    ) -> Subscription
    where
        V: Clone + PartialEq + 'static,
    {
        let current = selector.select(&self.state());
        listener(&current, &current, self);

        let previous = RefCell::new(current);
        let selector = selector.clone();
        let weak: Weak<ReactInner<S, C>> = Rc::downgrade(&self.inner);
        self.inner.store.subscribe(move |state| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let next = selector.select(state);
            let old = previous.replace(next.clone());
            if old != next {
                listener(&next, &old, &ReactStore { inner });
            }
        })
    }

    /// [`observe`](Self::observe) with an inline projection.
    pub fn observe_with<V>(
        &self,
        project: impl Fn(&S) -> V + 'static,
        listener: impl Fn(&V, &V, &Self) + 'static,
    ) -> Subscription
    where
        V: Clone + PartialEq + 'static,
    {
        self.observe(&create_selector(project), listener)
    }

    /// [`observe`](Self::observe) a named selector.
    pub fn observe_key<V>(
        &self,
        name: &str,
        listener: impl Fn(&V, &V, &Self) + 'static,
    ) -> Result<Subscription, StoreError>
    where
        V: Clone + PartialEq + 'static,
    {
        let selector = self.named::<V, ()>(name)?;
        Ok(self.observe(&selector, listener))
    }

    // -- element setters -----------------------------------------------------

    /// A setter for `key`, identical across calls for the same key name.
    pub fn get_element_setter<E>(&self, key: Key<S, Option<E>>) -> ElementSetter<E>
    where
        E: Clone + PartialEq + 'static,
    {
        if let Some(existing) = self
            .inner
            .element_setters
            .borrow()
            .get(key.name())
            .and_then(|any| any.downcast_ref::<ElementSetter<E>>())
        {
            return existing.clone();
        }

        let weak: Weak<ReactInner<S, C>> = Rc::downgrade(&self.inner);
        let setter = ElementSetter {
            inner: Rc::new(move |element: Option<E>| {
                if let Some(inner) = weak.upgrade() {
                    ReactStore { inner }.set(key, element);
                }
            }),
        };
        self.inner
            .element_setters
            .borrow_mut()
            .insert(key.name(), Rc::new(setter.clone()));
        setter
    }
}

impl<S: Clone + 'static, C: 'static> ReadonlyStore for ReactStore<S, C> {
    type State = S;

    fn store_id(&self) -> StoreId {
        self.id()
    }

    fn get_snapshot(&self) -> Rc<S> {
        ReactStore::get_snapshot(self)
    }

    fn subscribe(&self, listener: impl Fn(&Rc<S>) + 'static) -> Subscription {
        ReactStore::subscribe(self, listener)
    }
}

impl<S: Clone + 'static, C: 'static> WritableStore for ReactStore<S, C> {
    fn update(&self, next: impl Into<Rc<S>>) {
        ReactStore::update(self, next);
    }

    fn apply(&self, patch: Patch<S>) {
        ReactStore::apply(self, patch);
    }

    fn set<V>(&self, key: Key<S, V>, value: V)
    where
        V: Clone + PartialEq + 'static,
    {
        ReactStore::set(self, key, value);
    }
}

/// Identity-stable attach callback writing an element into the store.
pub struct ElementSetter<E> {
    inner: Rc<dyn Fn(Option<E>)>,
}

impl<E> Clone for ElementSetter<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E> PartialEq for ElementSetter<E> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<E> fmt::Debug for ElementSetter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementSetter").finish_non_exhaustive()
    }
}

impl<E> ElementSetter<E> {
    /// Store `element` (or clear it with `None`).
    pub fn call(&self, element: Option<E>) {
        (self.inner)(element);
    }

    /// Whether both handles are the same setter.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }
}
