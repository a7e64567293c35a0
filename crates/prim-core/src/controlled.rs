#![forbid(unsafe_code)]

//! Per-key controlled/uncontrolled bookkeeping shared by the store variants.
//!
//! A key is *controlled* when its authoritative value comes from the owner
//! every render, and *uncontrolled* when the store owns it after seeding it
//! from a default.
//!
//! # Invariants
//!
//! 1. The *baseline* classification of a key is recorded on its first
//!    registration and never changes afterwards.
//! 2. The *current* classification follows the latest registration and is
//!    what write suppression consults.
//! 3. A registration that disagrees with the baseline yields a
//!    [`Diagnostic::ControlledSwitch`] once per key.
//! 4. Filtering never reorders the remaining writes of a patch.

use std::any::Any;
use std::cell::RefCell;
use std::collections::hash_map::Entry as MapEntry;
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::diagnostics::Diagnostic;
use crate::key::{Key, Patch};
use crate::store::StoreId;

type Preserve<S> = Rc<dyn Fn(&S, &mut S)>;

struct KeyState<S> {
    baseline: bool,
    current: bool,
    warned_switch: bool,
    warned_default: bool,
    /// First default seen for the key, compared structurally later.
    default: Option<Box<dyn Any>>,
    /// Copies the key's value from the current state into a replacement.
    preserve: Preserve<S>,
}

/// Outcome of [`ControlledKeys::register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// True for the first registration of the key.
    pub first: bool,
    /// Set when the registration contradicts the baseline (reported once).
    pub switched: Option<Diagnostic>,
}

/// Tracks which keys of a store are controlled.
pub struct ControlledKeys<S> {
    store: StoreId,
    keys: RefCell<FxHashMap<&'static str, KeyState<S>>>,
}

impl<S> fmt::Debug for ControlledKeys<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys = self.keys.borrow();
        let mut entries: Vec<_> = keys
            .iter()
            .map(|(name, state)| (*name, state.current))
            .collect();
        entries.sort_unstable();
        f.debug_struct("ControlledKeys")
            .field("store", &self.store)
            .field("keys", &entries)
            .finish()
    }
}

impl<S: 'static> ControlledKeys<S> {
    /// Create an empty tracker for the store `store`.
    #[must_use]
    pub fn new(store: StoreId) -> Self {
        Self {
            store,
            keys: RefCell::new(FxHashMap::default()),
        }
    }

    /// Record a registration of `key`.
    pub fn register<V>(&self, key: Key<S, V>, is_controlled: bool) -> Registration
    where
        V: Clone + 'static,
    {
        let mut keys = self.keys.borrow_mut();
        let state = match keys.entry(key.name()) {
            MapEntry::Vacant(slot) => {
                slot.insert(KeyState {
                    baseline: is_controlled,
                    current: is_controlled,
                    warned_switch: false,
                    warned_default: false,
                    default: None,
                    preserve: Rc::new(move |from: &S, to: &mut S| {
                        key.write(to, key.get(from).clone());
                    }),
                });
                return Registration {
                    first: true,
                    switched: None,
                };
            }
            MapEntry::Occupied(slot) => slot.into_mut(),
        };

        state.current = is_controlled;
        let switched = if state.baseline != is_controlled && !state.warned_switch {
            state.warned_switch = true;
            Some(Diagnostic::ControlledSwitch {
                store: self.store,
                key: key.name(),
                initially_controlled: state.baseline,
            })
        } else {
            None
        };
        Registration {
            first: false,
            switched,
        }
    }

    /// Compare `default` with the first default seen for an uncontrolled key.
    ///
    /// The first call records the default. Later calls return a
    /// [`Diagnostic::DefaultValueChanged`] once if the value differs.
    pub fn check_default<V>(&self, key: Key<S, V>, default: &V) -> Option<Diagnostic>
    where
        V: Clone + PartialEq + 'static,
    {
        let mut keys = self.keys.borrow_mut();
        let state = keys.get_mut(key.name())?;
        if state.current {
            return None;
        }
        match state.default.as_ref() {
            None => {
                state.default = Some(Box::new(default.clone()));
                None
            }
            Some(first) => {
                let changed = first.downcast_ref::<V>().is_some_and(|first| first != default);
                if changed && !state.warned_default {
                    state.warned_default = true;
                    Some(Diagnostic::DefaultValueChanged {
                        store: self.store,
                        key: key.name(),
                    })
                } else {
                    None
                }
            }
        }
    }

    /// Whether `name` is currently registered as controlled.
    #[must_use]
    pub fn is_controlled(&self, name: &str) -> bool {
        self.keys.borrow().get(name).is_some_and(|s| s.current)
    }

    /// The classification recorded on first registration, if any.
    #[must_use]
    pub fn baseline(&self, name: &str) -> Option<bool> {
        self.keys.borrow().get(name).map(|s| s.baseline)
    }

    /// Whether any key is currently controlled.
    #[must_use]
    pub fn any_controlled(&self) -> bool {
        self.keys.borrow().values().any(|s| s.current)
    }

    /// Drop writes to controlled keys from `patch`.
    #[must_use]
    pub fn filter_patch(&self, patch: &Patch<S>) -> Patch<S> {
        let keys = self.keys.borrow();
        patch.retain_keys(|name| !keys.get(name).is_some_and(|s| s.current))
    }

    /// Copy every controlled key's value from `current` into `next`.
    pub fn preserve_controlled(&self, current: &S, next: &mut S) {
        let preserves: Vec<Preserve<S>> = self
            .keys
            .borrow()
            .values()
            .filter(|s| s.current)
            .map(|s| Rc::clone(&s.preserve))
            .collect();
        for preserve in preserves {
            preserve(current, next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Store, key};

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Field {
        value: i32,
        touched: bool,
    }

    const VALUE: Key<Field, i32> = key!(Field, value: i32);
    const TOUCHED: Key<Field, bool> = key!(Field, touched: bool);

    fn tracker() -> ControlledKeys<Field> {
        ControlledKeys::new(Store::new(()).id())
    }

    #[test]
    fn first_registration_sets_baseline() {
        let keys = tracker();
        let reg = keys.register(VALUE, true);
        assert!(reg.first);
        assert_eq!(reg.switched, None);
        assert_eq!(keys.baseline("value"), Some(true));
        assert!(keys.is_controlled("value"));
        assert!(!keys.is_controlled("touched"));
    }

    #[test]
    fn switch_is_reported_once_against_baseline() {
        let keys = tracker();
        keys.register(VALUE, false);
        let reg = keys.register(VALUE, true);
        assert!(matches!(
            reg.switched,
            Some(Diagnostic::ControlledSwitch {
                key: "value",
                initially_controlled: false,
                ..
            })
        ));
        // Back to the baseline, then away again: no repeat.
        assert_eq!(keys.register(VALUE, false).switched, None);
        assert_eq!(keys.register(VALUE, true).switched, None);
        assert_eq!(keys.baseline("value"), Some(false));
        assert!(keys.is_controlled("value"));
    }

    #[test]
    fn default_change_detected_structurally() {
        let keys = tracker();
        keys.register(VALUE, false);
        assert_eq!(keys.check_default(VALUE, &1), None);
        assert_eq!(keys.check_default(VALUE, &1), None);
        assert!(matches!(
            keys.check_default(VALUE, &2),
            Some(Diagnostic::DefaultValueChanged { key: "value", .. })
        ));
        assert_eq!(keys.check_default(VALUE, &3), None);
    }

    #[test]
    fn default_ignored_for_controlled_keys() {
        let keys = tracker();
        keys.register(VALUE, true);
        assert_eq!(keys.check_default(VALUE, &1), None);
        assert_eq!(keys.check_default(VALUE, &2), None);
    }

    #[test]
    fn filter_and_preserve_controlled_keys() {
        let keys = tracker();
        keys.register(VALUE, true);
        keys.register(TOUCHED, false);
        assert!(keys.any_controlled());

        let patch = Patch::new().set(VALUE, 9).set(TOUCHED, true);
        let filtered = keys.filter_patch(&patch);
        assert_eq!(filtered.keys().collect::<Vec<_>>(), vec!["touched"]);

        let current = Field {
            value: 5,
            touched: false,
        };
        let mut next = Field {
            value: 9,
            touched: true,
        };
        keys.preserve_controlled(&current, &mut next);
        assert_eq!(
            next,
            Field {
                value: 5,
                touched: true
            }
        );
    }
}
