#![forbid(unsafe_code)]

//! Effect and ref hooks on [`RenderContext`].
//!
//! Each effect call claims one ordered slot recording the previous
//! dependencies and the pending cleanup. A slot *changed* when its
//! dependencies differ by `PartialEq` from the previous render's, or always
//! for the `_always` variants. Changed slots queue one job on their phase
//! queue: run the previous cleanup, then `create`, keeping whatever cleanup
//! `create` returns. Cleanups still pending at unmount run then.

use std::cell::RefCell;
use std::rc::Rc;

use crate::runtime::RenderContext;

/// Work to undo an effect, returned from its `create` closure.
pub type Cleanup = Box<dyn FnOnce()>;

type CleanupCell = Rc<RefCell<Option<Cleanup>>>;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Phase {
    Layout,
    Passive,
}

struct EffectSlot<D> {
    deps: RefCell<Option<D>>,
    cleanup: CleanupCell,
}

fn run_effect(cleanup: &CleanupCell, create: impl FnOnce() -> Option<Cleanup>) {
    let previous = cleanup.borrow_mut().take();
    if let Some(previous) = previous {
        previous();
    }
    let next = create();
    *cleanup.borrow_mut() = next;
}

impl RenderContext<'_> {
    fn effect<D: PartialEq + 'static>(
        &self,
        phase: Phase,
        deps: Option<D>,
        create: impl FnOnce() -> Option<Cleanup> + 'static,
    ) {
        let hooks = self.hooks();
        let (slot, fresh) = hooks.slot(|| EffectSlot::<D> {
            deps: RefCell::new(None),
            cleanup: Rc::new(RefCell::new(None)),
        });
        if fresh {
            let cleanup = Rc::clone(&slot.cleanup);
            hooks.on_teardown(move || {
                let pending = cleanup.borrow_mut().take();
                if let Some(pending) = pending {
                    pending();
                }
            });
        }

        let did_change = {
            let mut previous = slot.deps.borrow_mut();
            let did_change = match (previous.as_ref(), deps.as_ref()) {
                (Some(prev), Some(next)) => prev != next,
                _ => true,
            };
            *previous = deps;
            did_change
        };
        if !did_change {
            return;
        }

        let cleanup = Rc::clone(&slot.cleanup);
        let job = move || run_effect(&cleanup, create);
        match phase {
            Phase::Layout => hooks.queue_layout(job),
            Phase::Passive => hooks.queue_passive(job),
        }
    }

    /// Passive-phase effect re-run when `deps` change.
    pub fn use_effect<D: PartialEq + 'static>(
        &self,
        deps: D,
        create: impl FnOnce() -> Option<Cleanup> + 'static,
    ) {
        self.effect(Phase::Passive, Some(deps), create);
    }

    /// Passive-phase effect run after every render.
    pub fn use_effect_always(&self, create: impl FnOnce() -> Option<Cleanup> + 'static) {
        self.effect::<()>(Phase::Passive, None, create);
    }

    /// Layout-phase effect re-run when `deps` change.
    pub fn use_layout_effect<D: PartialEq + 'static>(
        &self,
        deps: D,
        create: impl FnOnce() -> Option<Cleanup> + 'static,
    ) {
        self.effect(Phase::Layout, Some(deps), create);
    }

    /// Layout-phase effect run after every render.
    pub fn use_layout_effect_always(&self, create: impl FnOnce() -> Option<Cleanup> + 'static) {
        self.effect::<()>(Phase::Layout, None, create);
    }

    /// Run `create` once after the first commit; its cleanup runs at unmount.
    pub fn use_on_mount(&self, create: impl FnOnce() -> Option<Cleanup> + 'static) {
        self.effect(Phase::Passive, Some(()), create);
    }

    /// A mutable cell that persists across renders.
    pub fn use_ref<T: 'static>(&self, init: impl FnOnce() -> T) -> Rc<RefCell<T>> {
        self.hooks().slot(|| RefCell::new(init())).0
    }
}
