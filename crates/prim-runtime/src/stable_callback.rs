#![forbid(unsafe_code)]

//! Identity-stable callbacks with swappable behavior.
//!
//! A [`StableCallback`] is a shared cell holding the current implementation.
//! Handles never change identity, so long-lived listeners can capture one
//! once and still call the latest closure installed by a render.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

type Callback<A, R> = Rc<dyn Fn(A) -> R>;

/// A callback whose identity survives implementation changes.
///
/// Multiple arguments are passed as a tuple.
pub struct StableCallback<A, R = ()> {
    current: Rc<RefCell<Callback<A, R>>>,
}

impl<A, R> Clone for StableCallback<A, R> {
    fn clone(&self) -> Self {
        Self {
            current: Rc::clone(&self.current),
        }
    }
}

impl<A, R> PartialEq for StableCallback<A, R> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.current, &other.current)
    }
}

impl<A, R> Eq for StableCallback<A, R> {}

impl<A, R> fmt::Debug for StableCallback<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StableCallback")
            .field("id", &Rc::as_ptr(&self.current))
            .finish()
    }
}

/// A no-op returning `R::default()`.
impl<A: 'static, R: Default + 'static> Default for StableCallback<A, R> {
    fn default() -> Self {
        Self::new(|_| R::default())
    }
}

impl<A: 'static, R: 'static> StableCallback<A, R> {
    /// Wrap `f`.
    pub fn new(f: impl Fn(A) -> R + 'static) -> Self {
        let f: Callback<A, R> = Rc::new(f);
        Self {
            current: Rc::new(RefCell::new(f)),
        }
    }

    /// Install a new implementation; every handle sees it.
    pub fn set(&self, f: impl Fn(A) -> R + 'static) {
        self.set_shared(Rc::new(f));
    }

    pub(crate) fn set_shared(&self, f: Callback<A, R>) {
        *self.current.borrow_mut() = f;
    }

    /// Invoke the current implementation.
    ///
    /// The implementation may replace itself while running.
    pub fn call(&self, args: A) -> R {
        let current = Rc::clone(&self.current.borrow());
        current(args)
    }

    /// Whether both handles share one cell.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.current, &b.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn default_is_noop() {
        let cb: StableCallback<i32, u8> = StableCallback::default();
        assert_eq!(cb.call(5), 0);
    }

    #[test]
    fn set_changes_behavior_not_identity() {
        let cb = StableCallback::new(|x: i32| x + 1);
        let held = cb.clone();
        assert_eq!(held.call(1), 2);
        cb.set(|x: i32| x * 10);
        assert_eq!(held.call(1), 10);
        assert!(StableCallback::ptr_eq(&cb, &held));
        assert_eq!(cb, held);
        assert_ne!(cb, StableCallback::new(|x: i32| x));
    }

    #[test]
    fn callback_may_replace_itself() {
        let cb: StableCallback<(), u32> = StableCallback::new(|()| 1);
        let inner = cb.clone();
        let calls = Rc::new(Cell::new(0u32));
        let c = Rc::clone(&calls);
        cb.set(move |()| {
            c.set(c.get() + 1);
            inner.set(|()| 2);
            1
        });
        assert_eq!(cb.call(()), 1);
        assert_eq!(cb.call(()), 2);
        assert_eq!(calls.get(), 1);
    }
}
