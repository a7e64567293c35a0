#![forbid(unsafe_code)]

//! Ordered per-unit hook bookkeeping.
//!
//! # Design
//!
//! Every rendering unit owns one [`UnitHooks`]. During a render, each hook
//! call claims the next *slot* by position, so slot `i` on render N is the
//! same logical registration as slot `i` on render N+1. Slots are
//! type-erased (`Rc<dyn Any>`); a slot that holds a different type than the
//! caller asks for is replaced and reported as
//! [`Diagnostic::HookOrderChanged`] instead of being reused.
//!
//! Besides slots, a unit carries:
//!
//! - **extensions**: at most one value per type, installed by lifecycle
//!   hooks (the batched store subscription lives here);
//! - **commit queues**: layout-phase and passive-phase jobs, drained by the
//!   runtime after the render closure returns;
//! - **teardown registry**: jobs run once when the unit unmounts.
//!
//! [`LifecycleHooks`] registered on the runtime run before and after every
//! render of every unit and receive the unit's `UnitHooks`.
//!
//! # Invariants
//!
//! 1. The cursor is zero when a render starts and counts slot accesses.
//! 2. `did_initialize` is false until the first commit finishes.
//! 3. Jobs queued while a queue drains run in the same drain.
//! 4. Teardown jobs run in registration order, before slots are dropped.

use std::any::{Any, TypeId, type_name};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use prim_core::diagnostics::{self, Diagnostic};

/// A deferred unit of commit-phase work.
pub type Job = Box<dyn FnOnce()>;

type LifecycleFn = Rc<dyn Fn(&UnitHooks)>;

/// Callbacks run around every render.
#[derive(Clone, Default)]
pub struct LifecycleHooks {
    before: Option<LifecycleFn>,
    after: Option<LifecycleFn>,
}

impl fmt::Debug for LifecycleHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleHooks")
            .field("before", &self.before.is_some())
            .field("after", &self.after.is_some())
            .finish()
    }
}

impl LifecycleHooks {
    /// Empty hooks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` before the render closure.
    #[must_use]
    pub fn before(mut self, f: impl Fn(&UnitHooks) + 'static) -> Self {
        self.before = Some(Rc::new(f));
        self
    }

    /// Run `f` after the render closure, before commit.
    #[must_use]
    pub fn after(mut self, f: impl Fn(&UnitHooks) + 'static) -> Self {
        self.after = Some(Rc::new(f));
        self
    }

    pub(crate) fn run_before(&self, hooks: &UnitHooks) {
        if let Some(before) = &self.before {
            before(hooks);
        }
    }

    pub(crate) fn run_after(&self, hooks: &UnitHooks) {
        if let Some(after) = &self.after {
            after(hooks);
        }
    }
}

/// Per-unit state that outlives a single render.
///
/// Extensions get a chance to release resources when the unit unmounts.
pub trait Extension: Any {
    /// Called once at unmount, before the extension is dropped.
    fn teardown(&self) {}
}

struct SlotCell {
    kind: &'static str,
    value: Rc<dyn Any>,
}

struct ExtensionCell {
    type_id: TypeId,
    value: Rc<dyn Any>,
    hooks: Rc<dyn Extension>,
}

/// Ordered hook state for one rendering unit.
pub struct UnitHooks {
    id: u64,
    me: Weak<UnitHooks>,
    dev_checks: bool,
    did_initialize: Cell<bool>,
    mounted: Cell<bool>,
    needs_render: Cell<bool>,
    render_requests: Cell<u64>,
    render_count: Cell<u64>,
    cursor: Cell<usize>,
    slots: RefCell<Vec<SlotCell>>,
    extensions: RefCell<Vec<ExtensionCell>>,
    layout: RefCell<Vec<Job>>,
    passive: RefCell<Vec<Job>>,
    teardown: RefCell<Vec<Job>>,
}

impl fmt::Debug for UnitHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitHooks")
            .field("id", &self.id)
            .field("did_initialize", &self.did_initialize.get())
            .field("mounted", &self.mounted.get())
            .field("cursor", &self.cursor.get())
            .field("slots", &self.slots.borrow().len())
            .field("extensions", &self.extensions.borrow().len())
            .finish()
    }
}

impl UnitHooks {
    pub(crate) fn new(id: u64, dev_checks: bool) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            id,
            me: me.clone(),
            dev_checks,
            did_initialize: Cell::new(false),
            mounted: Cell::new(false),
            needs_render: Cell::new(true),
            render_requests: Cell::new(0),
            render_count: Cell::new(0),
            cursor: Cell::new(0),
            slots: RefCell::new(Vec::new()),
            extensions: RefCell::new(Vec::new()),
            layout: RefCell::new(Vec::new()),
            passive: RefCell::new(Vec::new()),
            teardown: RefCell::new(Vec::new()),
        })
    }

    /// Unit identity.
    #[must_use]
    pub fn unit_id(&self) -> u64 {
        self.id
    }

    /// False during the first render and its commit.
    #[must_use]
    pub fn did_initialize(&self) -> bool {
        self.did_initialize.get()
    }

    /// Whether development diagnostics are enabled for this unit.
    #[must_use]
    pub fn dev_checks(&self) -> bool {
        self.dev_checks
    }

    /// Slots claimed so far in the current render.
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor.get()
    }

    /// Number of slots held.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.borrow().len()
    }

    /// Claim the next ordered slot, creating it with `init` when absent.
    ///
    /// Returns the slot value and whether this call created it.
    pub fn slot<T: 'static>(&self, init: impl FnOnce() -> T) -> (Rc<T>, bool) {
        let index = self.cursor.get();
        self.cursor.set(index + 1);

        let existing = self.slots.borrow().get(index).map(|cell| {
            (cell.kind, Rc::clone(&cell.value))
        });
        if let Some((kind, value)) = existing {
            if let Ok(value) = value.downcast::<T>() {
                return (value, false);
            }
            if self.dev_checks {
                diagnostics::report(Diagnostic::HookOrderChanged {
                    unit: self.id,
                    slot: index,
                    expected: type_name::<T>(),
                    found: kind,
                });
            }
        }

        let value = Rc::new(init());
        let cell = SlotCell {
            kind: type_name::<T>(),
            value: Rc::clone(&value) as Rc<dyn Any>,
        };
        let mut slots = self.slots.borrow_mut();
        if index < slots.len() {
            slots[index] = cell;
        } else {
            slots.push(cell);
        }
        (value, true)
    }

    /// The extension of type `T`, if installed.
    #[must_use]
    pub fn extension<T: Extension>(&self) -> Option<Rc<T>> {
        let value = self
            .extensions
            .borrow()
            .iter()
            .find(|cell| cell.type_id == TypeId::of::<T>())
            .map(|cell| Rc::clone(&cell.value))?;
        value.downcast::<T>().ok()
    }

    /// The extension of type `T`, installing `init()` when absent.
    pub fn extension_or_insert<T: Extension>(&self, init: impl FnOnce() -> T) -> Rc<T> {
        if let Some(existing) = self.extension::<T>() {
            return existing;
        }
        let value = Rc::new(init());
        self.extensions.borrow_mut().push(ExtensionCell {
            type_id: TypeId::of::<T>(),
            value: Rc::clone(&value) as Rc<dyn Any>,
            hooks: Rc::clone(&value) as Rc<dyn Extension>,
        });
        value
    }

    /// Queue a layout-phase job for the current commit.
    pub fn queue_layout(&self, job: impl FnOnce() + 'static) {
        self.layout.borrow_mut().push(Box::new(job));
    }

    /// Queue a passive-phase job for the current commit.
    pub fn queue_passive(&self, job: impl FnOnce() + 'static) {
        self.passive.borrow_mut().push(Box::new(job));
    }

    /// Register a job to run when the unit unmounts.
    pub fn on_teardown(&self, job: impl FnOnce() + 'static) {
        self.teardown.borrow_mut().push(Box::new(job));
    }

    /// A weak handle that schedules re-renders of this unit.
    #[must_use]
    pub fn render_handle(&self) -> RenderHandle {
        RenderHandle {
            unit: self.me.clone(),
        }
    }

    pub(crate) fn is_mounted(&self) -> bool {
        self.mounted.get()
    }

    pub(crate) fn needs_render(&self) -> bool {
        self.needs_render.get()
    }

    pub(crate) fn render_requests(&self) -> u64 {
        self.render_requests.get()
    }

    pub(crate) fn render_count(&self) -> u64 {
        self.render_count.get()
    }

    fn request_render(&self) {
        if !self.mounted.get() {
            return;
        }
        self.needs_render.set(true);
        self.render_requests.set(self.render_requests.get() + 1);
        tracing::trace!(unit = self.id, "render requested");
    }

    pub(crate) fn begin_render(&self) {
        self.cursor.set(0);
        self.needs_render.set(false);
        self.mounted.set(true);
    }

    pub(crate) fn end_render(&self) {
        self.render_count.set(self.render_count.get() + 1);
        let used = self.cursor.get();
        let held = self.slots.borrow().len();
        if used < held {
            if self.did_initialize.get() && self.dev_checks {
                diagnostics::report(Diagnostic::HookOrderChanged {
                    unit: self.id,
                    slot: used,
                    expected: "<none>",
                    found: self.slots.borrow()[used].kind,
                });
            }
            // Trailing slots belong to hooks that were not called this time.
            self.slots.borrow_mut().truncate(used);
        }
    }

    pub(crate) fn commit(&self) {
        drain(&self.layout);
        drain(&self.passive);
        self.did_initialize.set(true);
    }

    pub(crate) fn unmount(&self) {
        if !self.mounted.replace(false) {
            return;
        }
        self.needs_render.set(false);
        drain(&self.teardown);
        let extensions = std::mem::take(&mut *self.extensions.borrow_mut());
        for cell in &extensions {
            cell.hooks.teardown();
        }
        drop(extensions);
        self.layout.borrow_mut().clear();
        self.passive.borrow_mut().clear();
        let slots = std::mem::take(&mut *self.slots.borrow_mut());
        drop(slots);
        self.cursor.set(0);
        self.did_initialize.set(false);
    }
}

fn drain(queue: &RefCell<Vec<Job>>) {
    loop {
        let jobs = std::mem::take(&mut *queue.borrow_mut());
        if jobs.is_empty() {
            break;
        }
        for job in jobs {
            job();
        }
    }
}

/// Schedules re-renders of a unit without keeping it alive.
#[derive(Clone)]
pub struct RenderHandle {
    unit: Weak<UnitHooks>,
}

impl fmt::Debug for RenderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderHandle")
            .field("unit", &self.unit.upgrade().map(|u| u.id))
            .finish()
    }
}

impl RenderHandle {
    /// Mark the unit as needing a render. Ignored once it is unmounted.
    pub fn request(&self) {
        if let Some(unit) = self.unit.upgrade() {
            unit.request_render();
        }
    }
}
