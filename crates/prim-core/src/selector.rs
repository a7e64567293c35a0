#![forbid(unsafe_code)]

//! Memoized selectors over store state.
//!
//! # Design
//!
//! A [`Selector<S, V, A>`] wraps a pure projection `(state, args) -> value`
//! with a single-slot memo cell `{ last_state, last_args, last_value }`:
//!
//! - same state (by `Rc` identity) and same args: the cached value is
//!   returned without running the projection;
//! - otherwise the projection runs; if its result equals the cached value,
//!   the cached value is kept and returned, so consumers holding an `Rc`
//!   result see the same pointer across unrelated state changes.
//!
//! Selectors are cheap handles; cloning shares the memo cell. Two handles
//! are the "same selector" when [`Selector::ptr_eq`] holds, which is what the
//! subscription bridge compares between renders.
//!
//! The memo holds a `Weak` to the last state, so a cached selector never
//! keeps an old state (or the stores nested in it) alive.
//!
//! # Invariants
//!
//! 1. For a given state pointer and args, the projection runs at most once
//!    while the memo slot holds them.
//! 2. A recomputation that yields an equal value returns the previously
//!    cached value.

use std::any::{Any, type_name};
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::ptr;
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;

use crate::error::StoreError;

type Compute<S, V, A> = Box<dyn Fn(&Rc<S>, &A) -> V>;

struct Memo<S, V, A> {
    state: Weak<S>,
    args: A,
    value: V,
}

struct SelectorInner<S, V, A> {
    compute: Compute<S, V, A>,
    memo: RefCell<Option<Memo<S, V, A>>>,
}

/// A memoized projection from state (and optional args) to a value.
pub struct Selector<S, V, A = ()> {
    inner: Rc<SelectorInner<S, V, A>>,
}

impl<S, V, A> Clone for Selector<S, V, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S, V: fmt::Debug, A> fmt::Debug for Selector<S, V, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let memo = self.inner.memo.borrow();
        f.debug_struct("Selector")
            .field("cached", &memo.as_ref().map(|m| &m.value))
            .finish()
    }
}

impl<S, V, A> Selector<S, V, A>
where
    S: 'static,
    V: Clone + PartialEq + 'static,
    A: Clone + PartialEq + 'static,
{
    fn from_compute(compute: Compute<S, V, A>) -> Self {
        Self {
            inner: Rc::new(SelectorInner {
                compute,
                memo: RefCell::new(None),
            }),
        }
    }

    /// Evaluate against `state` with `args`, using the memo slot.
    pub fn select_with(&self, state: &Rc<S>, args: &A) -> V {
        if let Some(memo) = self.inner.memo.borrow().as_ref()
            && ptr::eq(memo.state.as_ptr(), Rc::as_ptr(state))
            && memo.args == *args
        {
            return memo.value.clone();
        }

        // The projection may read other selectors; no borrow is held here.
        let next = (self.inner.compute)(state, args);

        let mut memo = self.inner.memo.borrow_mut();
        match memo.as_mut() {
            Some(cached) if cached.value == next => {
                cached.state = Rc::downgrade(state);
                cached.args = args.clone();
                cached.value.clone()
            }
            _ => {
                *memo = Some(Memo {
                    state: Rc::downgrade(state),
                    args: args.clone(),
                    value: next.clone(),
                });
                next
            }
        }
    }

    /// Whether two handles share the same projection and memo cell.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }
}

impl<S, V> Selector<S, V, ()>
where
    S: 'static,
    V: Clone + PartialEq + 'static,
{
    /// Evaluate against `state`.
    pub fn select(&self, state: &Rc<S>) -> V {
        self.select_with(state, &())
    }
}

/// Wrap `f` in a memoized selector.
///
/// ```
/// use std::rc::Rc;
/// use prim_core::create_selector;
///
/// #[derive(Clone)]
/// struct List { items: Vec<(u32, bool)>, title: String }
///
/// let active = create_selector(|s: &List| {
///     Rc::new(s.items.iter().filter(|i| i.1).map(|i| i.0).collect::<Vec<_>>())
/// });
/// let first = Rc::new(List { items: vec![(1, true), (2, false)], title: "a".into() });
/// let second = Rc::new(List { title: "b".into(), ..(*first).clone() });
/// assert!(Rc::ptr_eq(&active.select(&first), &active.select(&second)));
/// ```
pub fn create_selector<S, V>(f: impl Fn(&S) -> V + 'static) -> Selector<S, V>
where
    S: 'static,
    V: Clone + PartialEq + 'static,
{
    Selector::from_compute(Box::new(move |state: &Rc<S>, _: &()| f(&**state)))
}

/// Wrap `f` in a memoized selector that also takes positional args.
///
/// The args are part of the memo key.
pub fn create_selector_with_args<S, V, A>(f: impl Fn(&S, &A) -> V + 'static) -> Selector<S, V, A>
where
    S: 'static,
    V: Clone + PartialEq + 'static,
    A: Clone + PartialEq + 'static,
{
    Selector::from_compute(Box::new(move |state: &Rc<S>, args: &A| f(&**state, args)))
}

/// Combine two selectors; `combine` re-runs only when an input value changes.
pub fn create_selector_memoized<S, X, Y, V>(
    first: &Selector<S, X>,
    second: &Selector<S, Y>,
    combine: impl Fn(&X, &Y) -> V + 'static,
) -> Selector<S, V>
where
    S: 'static,
    X: Clone + PartialEq + 'static,
    Y: Clone + PartialEq + 'static,
    V: Clone + PartialEq + 'static,
{
    let first = first.clone();
    let second = second.clone();
    let last: RefCell<Option<(X, Y, V)>> = RefCell::new(None);
    Selector::from_compute(Box::new(move |state: &Rc<S>, _: &()| {
        let x = first.select(state);
        let y = second.select(state);
        if let Some((lx, ly, lv)) = last.borrow().as_ref()
            && *lx == x
            && *ly == y
        {
            return lv.clone();
        }
        let value = combine(&x, &y);
        *last.borrow_mut() = Some((x, y, value.clone()));
        value
    }))
}

/// A fixed map from selector name to selector, set at store construction.
pub struct Selectors<S> {
    map: FxHashMap<&'static str, Rc<dyn Any>>,
    _state: PhantomData<fn(&S)>,
}

impl<S> Default for Selectors<S> {
    fn default() -> Self {
        Self {
            map: FxHashMap::default(),
            _state: PhantomData,
        }
    }
}

impl<S> fmt::Debug for Selectors<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.map.keys().collect();
        names.sort_unstable();
        f.debug_struct("Selectors").field("names", &names).finish()
    }
}

impl<S: 'static> Selectors<S> {
    /// Create an empty selector map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `selector` under `name`, replacing any previous entry.
    #[must_use]
    pub fn with<V, A>(mut self, name: &'static str, selector: Selector<S, V, A>) -> Self
    where
        V: Clone + PartialEq + 'static,
        A: Clone + PartialEq + 'static,
    {
        self.map.insert(name, Rc::new(selector));
        self
    }

    /// Whether a selector named `name` exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    /// Number of registered selectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether no selectors are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Look up a selector by name and type.
    pub fn get<V, A>(&self, name: &str) -> Result<Selector<S, V, A>, StoreError>
    where
        V: Clone + PartialEq + 'static,
        A: Clone + PartialEq + 'static,
    {
        let entry = self.map.get(name).ok_or_else(|| StoreError::UnknownSelector {
            name: name.to_owned(),
        })?;
        entry
            .downcast_ref::<Selector<S, V, A>>()
            .cloned()
            .ok_or_else(|| StoreError::SelectorType {
                name: name.to_owned(),
                expected: type_name::<Selector<S, V, A>>(),
            })
    }
}
