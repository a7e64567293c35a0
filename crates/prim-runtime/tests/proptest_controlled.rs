//! Property tests for controlled-key locking.
//!
//! Random sequences of `set`, `apply` and `update` against a store with one
//! controlled key must never move that key off the owner's value, while
//! uncontrolled keys follow the last write.

use std::rc::Rc;

use prim_core::{Key, Patch, key};
use prim_runtime::{ControllableStore, ReactStore, Runtime, RuntimeConfig};
use proptest::prelude::*;

#[derive(Clone, Debug, Default, PartialEq)]
struct Slider {
    value: i32,
    step: i32,
    label: String,
}

const VALUE: Key<Slider, i32> = key!(Slider, value: i32);
const STEP: Key<Slider, i32> = key!(Slider, step: i32);
const LABEL: Key<Slider, String> = key!(Slider, label: String);

#[derive(Clone, Debug)]
enum Write {
    SetValue(i32),
    SetStep(i32),
    Apply { value: i32, label: String },
    Replace(Slider),
}

fn write_strategy() -> impl Strategy<Value = Write> {
    prop_oneof![
        (-50i32..50).prop_map(Write::SetValue),
        (-50i32..50).prop_map(Write::SetStep),
        ((-50i32..50), "[a-z]{0,4}").prop_map(|(value, label)| Write::Apply { value, label }),
        ((-50i32..50), (-50i32..50), "[a-z]{0,4}").prop_map(|(value, step, label)| {
            Write::Replace(Slider { value, step, label })
        }),
    ]
}

/// Expected uncontrolled fields after `writes`, starting from `start`.
fn model(start: &Slider, writes: &[Write]) -> (i32, String) {
    let mut step = start.step;
    let mut label = start.label.clone();
    for write in writes {
        match write {
            Write::SetValue(_) => {}
            Write::SetStep(s) => step = *s,
            Write::Apply { label: l, .. } => label = l.clone(),
            Write::Replace(next) => {
                step = next.step;
                label = next.label.clone();
            }
        }
    }
    (step, label)
}

proptest! {
    #[test]
    fn react_store_controlled_key_never_moves(
        owner in -50i32..50,
        writes in prop::collection::vec(write_strategy(), 0..24),
    ) {
        let rt = Runtime::new(RuntimeConfig::default());
        let store = ReactStore::new(Slider::default());
        let unit = rt.create_unit();
        rt.render(&unit, |cx| store.use_controlled_prop(cx, VALUE, Some(owner), 0));
        let start = Slider::clone(&store.state());

        for write in &writes {
            match write.clone() {
                Write::SetValue(v) => store.set(VALUE, v),
                Write::SetStep(s) => store.set(STEP, s),
                Write::Apply { value, label } => {
                    store.apply(Patch::new().set(VALUE, value).set(LABEL, label));
                }
                Write::Replace(next) => store.update(next),
            }
            prop_assert_eq!(store.state().value, owner);
        }

        let (step, label) = model(&start, &writes);
        prop_assert_eq!(store.state().step, step);
        prop_assert_eq!(&store.state().label, &label);
    }

    #[test]
    fn controllable_store_reports_every_set_but_keeps_owner_value(
        owner in -50i32..50,
        attempts in prop::collection::vec(-50i32..50, 1..16),
    ) {
        let rt = Runtime::new(RuntimeConfig::default());
        let store = ControllableStore::new(Slider::default());
        let unit = rt.create_unit();
        let seen: Rc<std::cell::RefCell<Vec<i32>>> = Rc::default();
        let log = Rc::clone(&seen);
        rt.render(&unit, |cx| {
            store.use_controlled_prop(cx, VALUE, Some(owner), 0, move |v| log.borrow_mut().push(*v));
        });

        for v in &attempts {
            store.set(VALUE, *v);
        }
        prop_assert_eq!(&*seen.borrow(), &attempts);
        prop_assert_eq!(store.state().value, owner);
    }

    #[test]
    fn uncontrolled_key_follows_last_set(
        default in -50i32..50,
        values in prop::collection::vec(-50i32..50, 1..16),
    ) {
        let rt = Runtime::new(RuntimeConfig::default());
        let store = ReactStore::new(Slider::default());
        let unit = rt.create_unit();
        rt.render(&unit, |cx| store.use_controlled_prop(cx, VALUE, None, default));
        prop_assert_eq!(store.state().value, default);

        for v in &values {
            store.set(VALUE, *v);
        }
        prop_assert_eq!(Some(store.state().value), values.last().copied());
    }
}
