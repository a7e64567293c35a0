#![forbid(unsafe_code)]

//! Typed state keys and partial-state patches.
//!
//! A [`Key<S, V>`] names one field of a state record `S` and knows how to
//! read and write it. Keys are the unit of controlled/uncontrolled tracking,
//! diagnostics and patch filtering, so every key carries a stable name.
//!
//! A [`Patch<S>`] is an ordered list of key writes that a store merges
//! shallowly into its current state (the `apply` operation).
//!
//! # Example
//!
//! ```
//! use prim_core::{key, Key, Patch};
//!
//! #[derive(Clone, Default, PartialEq, Debug)]
//! struct Menu {
//!     open: bool,
//!     highlighted: Option<usize>,
//! }
//!
//! const OPEN: Key<Menu, bool> = key!(Menu, open: bool);
//! const HIGHLIGHTED: Key<Menu, Option<usize>> = key!(Menu, highlighted: Option<usize>);
//!
//! let patch = Patch::new().set(OPEN, true).set(HIGHLIGHTED, Some(2));
//! let mut menu = Menu::default();
//! assert!(patch.differs(&menu));
//! patch.merge_into(&mut menu);
//! assert_eq!(menu, Menu { open: true, highlighted: Some(2) });
//! ```

use std::fmt;
use std::rc::Rc;

/// A named, typed lens onto one field of a state record.
///
/// Keys are `Copy` and usually declared as constants with [`key!`].
pub struct Key<S, V> {
    name: &'static str,
    get: fn(&S) -> &V,
    set: fn(&mut S, V),
}

impl<S, V> Clone for Key<S, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S, V> Copy for Key<S, V> {}

impl<S, V> fmt::Debug for Key<S, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Key").field(&self.name).finish()
    }
}

impl<S, V> Key<S, V> {
    /// Build a key from a name and accessor functions.
    ///
    /// Prefer the [`key!`] macro, which derives both accessors from a field.
    #[must_use]
    pub const fn new(name: &'static str, get: fn(&S) -> &V, set: fn(&mut S, V)) -> Self {
        Self { name, get, set }
    }

    /// The key's name, used for controlled tracking and diagnostics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Borrow the field from a state record.
    #[inline]
    pub fn get<'a>(&self, state: &'a S) -> &'a V {
        (self.get)(state)
    }

    /// Write the field on a state record.
    #[inline]
    pub fn write(&self, state: &mut S, value: V) {
        (self.set)(state, value);
    }
}

/// Declare a [`Key`] for a named field of a state struct.
///
/// ```
/// use prim_core::{key, Key};
///
/// #[derive(Clone)]
/// struct Dialog { open: bool }
///
/// const OPEN: Key<Dialog, bool> = key!(Dialog, open: bool);
/// assert_eq!(OPEN.name(), "open");
/// ```
#[macro_export]
macro_rules! key {
    ($state:ty, $field:ident : $value:ty) => {{
        fn get(state: &$state) -> &$value {
            &state.$field
        }
        fn set(state: &mut $state, value: $value) {
            state.$field = value;
        }
        $crate::Key::<$state, $value>::new(::core::stringify!($field), get, set)
    }};
}

/// One write inside a [`Patch`], with its value type erased.
trait PatchEntry<S> {
    fn name(&self) -> &'static str;
    fn differs(&self, state: &S) -> bool;
    fn write(&self, state: &mut S);
}

struct Entry<S, V> {
    key: Key<S, V>,
    value: V,
}

impl<S, V: Clone + PartialEq> PatchEntry<S> for Entry<S, V> {
    fn name(&self) -> &'static str {
        self.key.name()
    }

    fn differs(&self, state: &S) -> bool {
        *self.key.get(state) != self.value
    }

    fn write(&self, state: &mut S) {
        self.key.write(state, self.value.clone());
    }
}

/// An ordered set of field writes merged shallowly into a state record.
///
/// When the same key appears more than once, the last write wins.
pub struct Patch<S> {
    entries: Vec<Rc<dyn PatchEntry<S>>>,
}

impl<S> Clone for Patch<S> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<S> Default for Patch<S> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<S> fmt::Debug for Patch<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| e.name()))
            .finish()
    }
}

impl<S: 'static> Patch<S> {
    /// Create an empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a write and return the patch (builder form).
    #[must_use]
    pub fn set<V>(mut self, key: Key<S, V>, value: V) -> Self
    where
        V: Clone + PartialEq + 'static,
    {
        self.push(key, value);
        self
    }

    /// Add a write in place.
    pub fn push<V>(&mut self, key: Key<S, V>, value: V)
    where
        V: Clone + PartialEq + 'static,
    {
        self.entries.push(Rc::new(Entry { key, value }));
    }

    /// Number of writes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the patch has no writes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Key names in write order.
    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|e| e.name())
    }

    /// True if any write would change `state`.
    #[must_use]
    pub fn differs(&self, state: &S) -> bool {
        self.entries.iter().any(|e| e.differs(state))
    }

    /// Apply every write to `state`.
    pub fn merge_into(&self, state: &mut S) {
        for entry in &self.entries {
            entry.write(state);
        }
    }

    /// A patch holding only the writes whose key satisfies `keep`.
    #[must_use]
    pub fn retain_keys(&self, mut keep: impl FnMut(&'static str) -> bool) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|e| keep(e.name()))
                .cloned()
                .collect(),
        }
    }
}
