#![forbid(unsafe_code)]

//! Subscribing a rendering unit to store selections.
//!
//! # Design
//!
//! [`use_store`] reads `selector(store.get_snapshot(), args)` during render
//! and subscribes the unit so that it is asked to re-render only when a
//! freshly computed selection differs from the one it last returned.
//!
//! Two paths implement the subscription:
//!
//! - **Fast** (the unit carries the sync-hooks extension, installed by the
//!   lifecycle the runtime registers for [`SubscriptionStrategy::Fast`]):
//!   every `use_store` call claims the next *sync hook* in an ordered list.
//!   After the render, the unit holds exactly one subscription per distinct
//!   store across all its hooks. On notification a combined snapshot read
//!   refreshes every hook and bumps a monotonically increasing tick when at
//!   least one value changed; only then is a re-render requested.
//! - **Legacy** (no extension on the unit): each call owns one ordered slot
//!   and one passive effect that subscribes to its own store.
//!
//! Both paths re-check every selection right after subscribing, so a change
//! landing between render and subscription is not lost.
//!
//! # Identity rule
//!
//! A hook whose store, selector ([`Selector::ptr_eq`]) or args differ from
//! the previous render is re-pointed and recomputed. A store change also
//! rebuilds the unit's subscribed-store set (fast) or re-runs the
//! subscription effect (legacy).
//!
//! [`SubscriptionStrategy::Fast`]: crate::SubscriptionStrategy::Fast

use std::any::{Any, type_name};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use prim_core::diagnostics::{self, Diagnostic};
use prim_core::{ReadonlyStore, Selector, StoreId, Subscription};
use smallvec::SmallVec;

use crate::effects::Cleanup;
use crate::fast_hooks::{Extension, LifecycleHooks, RenderHandle, UnitHooks};
use crate::runtime::RenderContext;

/// Read `selector` from `store` and re-render when the selection changes.
pub fn use_store<T, V>(cx: &RenderContext<'_>, store: &T, selector: &Selector<T::State, V>) -> V
where
    T: ReadonlyStore,
    V: Clone + PartialEq + 'static,
{
    use_store_with(cx, store, selector, ())
}

/// [`use_store`] for a selector that takes positional args.
pub fn use_store_with<T, V, A>(
    cx: &RenderContext<'_>,
    store: &T,
    selector: &Selector<T::State, V, A>,
    args: A,
) -> V
where
    T: ReadonlyStore,
    V: Clone + PartialEq + 'static,
    A: Clone + PartialEq + 'static,
{
    match cx.hooks().extension::<SyncHooks>() {
        Some(sync) => sync.use_sync(store, selector, args),
        None => use_legacy(cx, store, selector, args),
    }
}

/// Whether `use_store` calls in this render share one batched subscription.
#[must_use]
pub fn is_batched(cx: &RenderContext<'_>) -> bool {
    cx.hooks().extension::<SyncHooks>().is_some()
}

// ---------------------------------------------------------------------------
// Binding: store + selector + args + last value
// ---------------------------------------------------------------------------

struct Binding<T: ReadonlyStore, V, A> {
    store: RefCell<T>,
    selector: RefCell<Selector<T::State, V, A>>,
    args: RefCell<A>,
    value: RefCell<V>,
}

impl<T, V, A> Binding<T, V, A>
where
    T: ReadonlyStore,
    V: Clone + PartialEq + 'static,
    A: Clone + PartialEq + 'static,
{
    fn new(store: &T, selector: &Selector<T::State, V, A>, args: A) -> Self {
        let value = selector.select_with(&store.get_snapshot(), &args);
        Self {
            store: RefCell::new(store.clone()),
            selector: RefCell::new(selector.clone()),
            args: RefCell::new(args),
            value: RefCell::new(value),
        }
    }

    /// Re-point at this render's inputs. Returns whether the store changed.
    fn rebind(&self, store: &T, selector: &Selector<T::State, V, A>, args: A) -> bool {
        let store_changed = self.store.borrow().store_id() != store.store_id();
        if store_changed {
            *self.store.borrow_mut() = store.clone();
        }
        if !Selector::ptr_eq(&self.selector.borrow(), selector) {
            *self.selector.borrow_mut() = selector.clone();
        }
        if *self.args.borrow() != args {
            *self.args.borrow_mut() = args;
        }
        store_changed
    }

    fn compute(&self) -> V {
        let snapshot = self.store.borrow().get_snapshot();
        let selector = self.selector.borrow().clone();
        let args = self.args.borrow().clone();
        selector.select_with(&snapshot, &args)
    }

    /// Render-phase read; caches what the unit is about to show.
    fn read(&self) -> V {
        let value = self.compute();
        *self.value.borrow_mut() = value.clone();
        value
    }

    /// Recompute; true when the selection differs from the cached one.
    fn refresh(&self) -> bool {
        let next = self.compute();
        let mut value = self.value.borrow_mut();
        if *value == next {
            false
        } else {
            *value = next;
            true
        }
    }
}

// ---------------------------------------------------------------------------
// Fast path
// ---------------------------------------------------------------------------

/// Type-erased view of a binding for the combined subscription.
trait SyncHook {
    fn store_id(&self) -> StoreId;
    fn subscribe(&self, listener: Rc<dyn Fn()>) -> Subscription;
    fn refresh(&self) -> bool;
    fn kind(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
}

impl<T, V, A> SyncHook for Binding<T, V, A>
where
    T: ReadonlyStore,
    V: Clone + PartialEq + 'static,
    A: Clone + PartialEq + 'static,
{
    fn store_id(&self) -> StoreId {
        self.store.borrow().store_id()
    }

    fn subscribe(&self, listener: Rc<dyn Fn()>) -> Subscription {
        self.store.borrow().subscribe(move |_| listener())
    }

    fn refresh(&self) -> bool {
        Binding::refresh(self)
    }

    fn kind(&self) -> &'static str {
        type_name::<Self>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

type Subscriptions = SmallVec<[(StoreId, Subscription); 2]>;

/// Per-unit batched subscription state.
struct SyncHooks {
    unit: u64,
    dev_checks: bool,
    render: RenderHandle,
    hooks: RefCell<Vec<Rc<dyn SyncHook>>>,
    cursor: Cell<usize>,
    tick: Cell<u64>,
    subscriptions: RefCell<Subscriptions>,
    stores_dirty: Cell<bool>,
}

impl Extension for SyncHooks {
    fn teardown(&self) {
        let subscriptions = std::mem::take(&mut *self.subscriptions.borrow_mut());
        drop(subscriptions);
        self.hooks.borrow_mut().clear();
    }
}

impl SyncHooks {
    fn new(unit: &UnitHooks) -> Self {
        Self {
            unit: unit.unit_id(),
            dev_checks: unit.dev_checks(),
            render: unit.render_handle(),
            hooks: RefCell::new(Vec::new()),
            cursor: Cell::new(0),
            tick: Cell::new(0),
            subscriptions: RefCell::new(SmallVec::new()),
            stores_dirty: Cell::new(false),
        }
    }

    fn use_sync<T, V, A>(&self, store: &T, selector: &Selector<T::State, V, A>, args: A) -> V
    where
        T: ReadonlyStore,
        V: Clone + PartialEq + 'static,
        A: Clone + PartialEq + 'static,
    {
        let index = self.cursor.get();
        self.cursor.set(index + 1);

        let existing = self.hooks.borrow().get(index).cloned();
        if let Some(hook) = existing {
            if let Some(binding) = hook.as_any().downcast_ref::<Binding<T, V, A>>() {
                if binding.rebind(store, selector, args) {
                    self.stores_dirty.set(true);
                }
                return binding.read();
            }
            if self.dev_checks {
                diagnostics::report(Diagnostic::HookOrderChanged {
                    unit: self.unit,
                    slot: index,
                    expected: type_name::<Binding<T, V, A>>(),
                    found: hook.kind(),
                });
            }
        }

        let binding = Rc::new(Binding::new(store, selector, args));
        let value = binding.value.borrow().clone();
        let hook: Rc<dyn SyncHook> = binding;
        let mut hooks = self.hooks.borrow_mut();
        if index < hooks.len() {
            hooks[index] = hook;
        } else {
            hooks.push(hook);
        }
        self.stores_dirty.set(true);
        value
    }

    /// Combined snapshot: refresh every hook, bump the tick on any change.
    fn get_snapshot(&self) -> u64 {
        let hooks: SmallVec<[Rc<dyn SyncHook>; 8]> = self.hooks.borrow().iter().cloned().collect();
        let mut changed = false;
        for hook in &hooks {
            changed |= hook.refresh();
        }
        if changed {
            self.tick.set(self.tick.get() + 1);
        }
        self.tick.get()
    }

    fn check_for_updates(&self) {
        let before = self.tick.get();
        if self.get_snapshot() != before {
            self.render.request();
        }
    }

    fn finish(self: &Rc<Self>, unit: &UnitHooks) {
        let used = self.cursor.get();
        {
            let mut hooks = self.hooks.borrow_mut();
            if hooks.len() > used {
                hooks.truncate(used);
                self.stores_dirty.set(true);
            }
        }
        if self.stores_dirty.replace(false) {
            let weak = Rc::downgrade(self);
            unit.queue_passive(move || {
                if let Some(sync) = weak.upgrade() {
                    sync.resubscribe();
                }
            });
        }
    }

    /// Subscribe to the union of distinct stores, keeping live subscriptions.
    fn resubscribe(self: &Rc<Self>) {
        let mut wanted: SmallVec<[(StoreId, Rc<dyn SyncHook>); 4]> = SmallVec::new();
        for hook in self.hooks.borrow().iter() {
            let id = hook.store_id();
            if !wanted.iter().any(|(w, _)| *w == id) {
                wanted.push((id, Rc::clone(hook)));
            }
        }

        let stale: Subscriptions = {
            let mut subscriptions = self.subscriptions.borrow_mut();
            let (keep, stale): (Subscriptions, Subscriptions) = std::mem::take(&mut *subscriptions)
                .into_iter()
                .partition(|(id, _)| wanted.iter().any(|(w, _)| w == id));
            *subscriptions = keep;
            stale
        };
        drop(stale);

        let weak = Rc::downgrade(self);
        let listener: Rc<dyn Fn()> = Rc::new(move || {
            if let Some(sync) = weak.upgrade() {
                sync.check_for_updates();
            }
        });
        for (id, hook) in wanted {
            let subscribed = self.subscriptions.borrow().iter().any(|(s, _)| *s == id);
            if !subscribed {
                let subscription = hook.subscribe(Rc::clone(&listener));
                self.subscriptions.borrow_mut().push((id, subscription));
            }
        }
        tracing::trace!(
            unit = self.unit,
            stores = self.subscriptions.borrow().len(),
            "sync hooks subscribed"
        );

        self.check_for_updates();
    }
}

/// Lifecycle that installs and maintains the batched subscription.
pub(crate) fn sync_lifecycle() -> LifecycleHooks {
    LifecycleHooks::new()
        .before(|unit| {
            let sync = unit.extension_or_insert(|| SyncHooks::new(unit));
            sync.cursor.set(0);
        })
        .after(|unit| {
            if let Some(sync) = unit.extension::<SyncHooks>() {
                sync.finish(unit);
            }
        })
}

// ---------------------------------------------------------------------------
// Legacy path
// ---------------------------------------------------------------------------

fn use_legacy<T, V, A>(
    cx: &RenderContext<'_>,
    store: &T,
    selector: &Selector<T::State, V, A>,
    args: A,
) -> V
where
    T: ReadonlyStore,
    V: Clone + PartialEq + 'static,
    A: Clone + PartialEq + 'static,
{
    let (binding, fresh) = cx
        .hooks()
        .slot(|| Binding::new(store, selector, args.clone()));
    if !fresh {
        binding.rebind(store, selector, args);
    }
    let value = binding.read();

    let render = cx.render_handle();
    let weak = Rc::downgrade(&binding);
    cx.use_effect(store.store_id(), move || {
        let binding = weak.upgrade()?;
        let listener_binding = Rc::downgrade(&binding);
        let listener_render = render.clone();
        let subscription = binding.store.borrow().subscribe(move |_| {
            if let Some(binding) = listener_binding.upgrade()
                && binding.refresh()
            {
                listener_render.request();
            }
        });
        if binding.refresh() {
            render.request();
        }
        Some(Box::new(move || subscription.unsubscribe()) as Cleanup)
    });
    value
}

#[cfg(test)]
mod tests {
    use prim_core::{Key, Store, create_selector, create_selector_with_args, key};

    use super::*;
    use crate::config::{RuntimeConfig, SubscriptionStrategy};
    use crate::runtime::Runtime;

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Counter {
        count: i32,
        label: String,
    }

    const COUNT: Key<Counter, i32> = key!(Counter, count: i32);
    const LABEL: Key<Counter, String> = key!(Counter, label: String);

    fn runtime(strategy: SubscriptionStrategy) -> Runtime {
        Runtime::new(
            RuntimeConfig::default()
                .with_subscription(strategy)
                .with_dev_checks(true),
        )
    }

    const BOTH: [SubscriptionStrategy; 2] = [SubscriptionStrategy::Fast, SubscriptionStrategy::Legacy];

    #[test]
    fn reads_current_selection() {
        for strategy in BOTH {
            let rt = runtime(strategy);
            let store = Store::new(Counter {
                count: 3,
                ..Counter::default()
            });
            let count = create_selector(|c: &Counter| c.count);
            let unit = rt.create_unit();
            assert_eq!(rt.render(&unit, |cx| use_store(cx, &store, &count)), 3);
        }
    }

    #[test]
    fn rerender_requested_only_for_selected_changes() {
        for strategy in BOTH {
            let rt = runtime(strategy);
            let store = Store::new(Counter::default());
            let count = create_selector(|c: &Counter| c.count);
            let unit = rt.create_unit();
            rt.render(&unit, |cx| use_store(cx, &store, &count));

            store.set(LABEL, "unrelated".to_string());
            assert!(!unit.needs_render(), "{strategy:?}");
            assert_eq!(unit.render_requests(), 0);

            store.set(COUNT, 1);
            assert!(unit.needs_render(), "{strategy:?}");
            assert_eq!(unit.render_requests(), 1);

            let seen = rt.render(&unit, |cx| use_store(cx, &store, &count));
            assert_eq!(seen, 1);
            assert!(!unit.needs_render());
        }
    }

    #[test]
    fn fast_path_subscribes_once_per_distinct_store() {
        let rt = runtime(SubscriptionStrategy::Fast);
        let a = Store::new(Counter::default());
        let b = Store::new(Counter::default());
        let count = create_selector(|c: &Counter| c.count);
        let label = create_selector(|c: &Counter| c.label.clone());
        let unit = rt.create_unit();

        rt.render(&unit, |cx| {
            assert!(is_batched(cx));
            use_store(cx, &a, &count);
            use_store(cx, &a, &label);
            use_store(cx, &b, &count);
        });
        assert_eq!(a.listener_count(), 1);
        assert_eq!(b.listener_count(), 1);
    }

    #[test]
    fn legacy_path_subscribes_per_call() {
        let rt = runtime(SubscriptionStrategy::Legacy);
        let a = Store::new(Counter::default());
        let count = create_selector(|c: &Counter| c.count);
        let label = create_selector(|c: &Counter| c.label.clone());
        let unit = rt.create_unit();

        rt.render(&unit, |cx| {
            assert!(!is_batched(cx));
            use_store(cx, &a, &count);
            use_store(cx, &a, &label);
        });
        assert_eq!(a.listener_count(), 2);

        // Unchanged store: the subscriptions survive re-renders.
        rt.render(&unit, |cx| {
            use_store(cx, &a, &count);
            use_store(cx, &a, &label);
        });
        assert_eq!(a.listener_count(), 2);
    }

    #[test]
    fn switching_store_moves_the_subscription() {
        for strategy in BOTH {
            let rt = runtime(strategy);
            let a = Store::new(Counter::default());
            let b = Store::new(Counter {
                count: 9,
                ..Counter::default()
            });
            let count = create_selector(|c: &Counter| c.count);
            let unit = rt.create_unit();

            assert_eq!(rt.render(&unit, |cx| use_store(cx, &a, &count)), 0);
            assert_eq!(rt.render(&unit, |cx| use_store(cx, &b, &count)), 9);
            assert_eq!(a.listener_count(), 0, "{strategy:?}");
            assert_eq!(b.listener_count(), 1, "{strategy:?}");

            a.set(COUNT, 1);
            assert!(!unit.needs_render());
            b.set(COUNT, 10);
            assert!(unit.needs_render());
        }
    }

    #[test]
    fn changed_args_recompute_the_slot() {
        for strategy in BOTH {
            let rt = runtime(strategy);
            let store = Store::new(Counter {
                count: 4,
                ..Counter::default()
            });
            let scaled = create_selector_with_args(|c: &Counter, k: &i32| c.count * k);
            let unit = rt.create_unit();
            assert_eq!(rt.render(&unit, |cx| use_store_with(cx, &store, &scaled, 2)), 8);
            assert_eq!(rt.render(&unit, |cx| use_store_with(cx, &store, &scaled, 3)), 12);

            // The listener compares against the latest args.
            store.set(COUNT, 5);
            assert!(unit.needs_render());
            assert_eq!(rt.render(&unit, |cx| use_store_with(cx, &store, &scaled, 3)), 15);
        }
    }

    #[test]
    fn change_between_render_and_subscribe_is_caught() {
        for strategy in BOTH {
            let rt = runtime(strategy);
            let store = Store::new(Counter::default());
            let count = create_selector(|c: &Counter| c.count);
            let unit = rt.create_unit();
            let writer = store.clone();
            rt.render(&unit, |cx| {
                use_store(cx, &store, &count);
                cx.use_layout_effect((), move || {
                    writer.set(COUNT, 42);
                    None
                });
            });
            assert!(unit.needs_render(), "{strategy:?}");
        }
    }

    #[test]
    fn dropped_calls_release_their_stores() {
        let rt = runtime(SubscriptionStrategy::Fast);
        let a = Store::new(Counter::default());
        let b = Store::new(Counter::default());
        let count = create_selector(|c: &Counter| c.count);
        let unit = rt.create_unit();

        rt.render(&unit, |cx| {
            use_store(cx, &a, &count);
            use_store(cx, &b, &count);
        });
        rt.render(&unit, |cx| {
            use_store(cx, &a, &count);
        });
        assert_eq!(a.listener_count(), 1);
        assert_eq!(b.listener_count(), 0);
    }

    #[test]
    fn unmount_unsubscribes() {
        for strategy in BOTH {
            let rt = runtime(strategy);
            let store = Store::new(Counter::default());
            let count = create_selector(|c: &Counter| c.count);
            let unit = rt.create_unit();
            rt.render(&unit, |cx| use_store(cx, &store, &count));
            assert_eq!(store.listener_count(), 1);

            rt.unmount(&unit);
            assert_eq!(store.listener_count(), 0, "{strategy:?}");
            store.set(COUNT, 1);
            assert_eq!(unit.render_requests(), 0);
        }
    }

    #[test]
    fn combined_snapshot_tick_is_monotonic() {
        let rt = runtime(SubscriptionStrategy::Fast);
        let store = Store::new(Counter::default());
        let count = create_selector(|c: &Counter| c.count);
        let unit = rt.create_unit();
        let sync = rt.render(&unit, |cx| {
            use_store(cx, &store, &count);
            cx.hooks().extension::<SyncHooks>()
        });
        let Some(sync) = sync else {
            panic!("fast runtime installs the sync extension");
        };

        let t0 = sync.get_snapshot();
        assert_eq!(sync.get_snapshot(), t0);
        store.set(LABEL, "x".into());
        assert_eq!(sync.get_snapshot(), t0);
        store.set(COUNT, 7);
        let t1 = sync.tick.get();
        assert!(t1 > t0);
        assert_eq!(sync.get_snapshot(), t1);
    }

    #[test]
    fn reordered_calls_are_reported() {
        let rt = runtime(SubscriptionStrategy::Fast);
        let store = Store::new(Counter::default());
        let count = create_selector(|c: &Counter| c.count);
        let label = create_selector(|c: &Counter| c.label.clone());
        let unit = rt.create_unit();
        rt.render(&unit, |cx| {
            use_store(cx, &store, &count);
        });
        let (value, seen) = diagnostics::capture(|| {
            rt.render(&unit, |cx| use_store(cx, &store, &label))
        });
        assert_eq!(value, "");
        assert!(matches!(
            seen.as_slice(),
            [Diagnostic::HookOrderChanged { slot: 0, .. }]
        ));
    }
}
