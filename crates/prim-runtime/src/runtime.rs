#![forbid(unsafe_code)]

//! A minimal host runtime: render, commit, unmount.
//!
//! # Design
//!
//! [`Runtime`] owns the configuration and the registered
//! [`LifecycleHooks`]. A [`RenderUnit`] is one component instance; rendering
//! it runs, in order:
//!
//! 1. every lifecycle `before` hook,
//! 2. the render closure with a [`RenderContext`],
//! 3. every lifecycle `after` hook,
//! 4. the layout-phase queue,
//! 5. the passive-phase queue.
//!
//! The render context is an explicit value, never a global, so rendering
//! one unit from inside another unit's render closure keeps both cursors
//! intact.
//!
//! When the runtime is built with [`SubscriptionStrategy::Fast`] it
//! registers the batched store subscription lifecycle on construction.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::config::{RuntimeConfig, SubscriptionStrategy};
use crate::fast_hooks::{LifecycleHooks, RenderHandle, UnitHooks};
use crate::use_store;

struct RuntimeInner {
    config: RuntimeConfig,
    lifecycle: RefCell<Vec<LifecycleHooks>>,
    next_unit: Cell<u64>,
}

/// Drives renders and commits of rendering units.
///
/// Cloning yields another handle to the same runtime.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("lifecycle_hooks", &self.inner.lifecycle.borrow().len())
            .finish()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl Runtime {
    /// Build a runtime with `config`.
    #[must_use]
    pub fn new(config: RuntimeConfig) -> Self {
        let runtime = Self {
            inner: Rc::new(RuntimeInner {
                config,
                lifecycle: RefCell::new(Vec::new()),
                next_unit: Cell::new(1),
            }),
        };
        if config.subscription == SubscriptionStrategy::Fast {
            runtime.register(use_store::sync_lifecycle());
        }
        tracing::debug!(
            subscription = config.subscription.as_str(),
            dev_checks = config.dev_checks,
            "runtime created"
        );
        runtime
    }

    /// The configuration this runtime was built with.
    #[must_use]
    pub fn config(&self) -> RuntimeConfig {
        self.inner.config
    }

    /// Install lifecycle callbacks for every subsequent render.
    pub fn register(&self, hooks: LifecycleHooks) {
        self.inner.lifecycle.borrow_mut().push(hooks);
    }

    /// Create a new, not yet mounted, rendering unit.
    #[must_use]
    pub fn create_unit(&self) -> RenderUnit {
        let id = self.inner.next_unit.get();
        self.inner.next_unit.set(id + 1);
        RenderUnit {
            hooks: UnitHooks::new(id, self.inner.config.dev_checks),
        }
    }

    /// Render `unit` with `f` and commit.
    ///
    /// Rendering an unmounted unit mounts it afresh.
    pub fn render<R>(&self, unit: &RenderUnit, f: impl FnOnce(&RenderContext<'_>) -> R) -> R {
        let hooks = &*unit.hooks;
        let first = !hooks.did_initialize();
        hooks.begin_render();

        // Snapshot so lifecycle hooks may register more hooks.
        let lifecycle = self.inner.lifecycle.borrow().clone();
        for l in &lifecycle {
            l.run_before(hooks);
        }
        let out = f(&RenderContext {
            runtime: self,
            hooks,
        });
        for l in &lifecycle {
            l.run_after(hooks);
        }
        hooks.end_render();
        hooks.commit();

        tracing::debug!(
            unit = hooks.unit_id(),
            first,
            slots = hooks.slot_count(),
            "unit rendered"
        );
        out
    }

    /// Render `unit` again if something requested it. Returns whether it ran.
    pub fn render_if_needed(
        &self,
        unit: &RenderUnit,
        f: impl FnOnce(&RenderContext<'_>),
    ) -> bool {
        if !unit.is_mounted() || !unit.needs_render() {
            return false;
        }
        self.render(unit, f);
        true
    }

    /// Run effect cleanups and extension teardown, then drop every slot.
    pub fn unmount(&self, unit: &RenderUnit) {
        unit.hooks.unmount();
        tracing::debug!(unit = unit.id(), "unit unmounted");
    }
}

/// One component instance.
#[derive(Clone)]
pub struct RenderUnit {
    hooks: Rc<UnitHooks>,
}

impl fmt::Debug for RenderUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderUnit")
            .field("id", &self.id())
            .field("mounted", &self.is_mounted())
            .field("needs_render", &self.needs_render())
            .field("render_count", &self.render_count())
            .finish()
    }
}

impl RenderUnit {
    /// Unit identity, unique within its runtime.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.hooks.unit_id()
    }

    /// Whether a store change asked for a re-render since the last render.
    #[must_use]
    pub fn needs_render(&self) -> bool {
        self.hooks.needs_render()
    }

    /// Total re-render requests received while mounted.
    #[must_use]
    pub fn render_requests(&self) -> u64 {
        self.hooks.render_requests()
    }

    /// Completed renders.
    #[must_use]
    pub fn render_count(&self) -> u64 {
        self.hooks.render_count()
    }

    /// Whether the unit has rendered and not been unmounted.
    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.hooks.is_mounted()
    }

    /// A weak re-render handle.
    #[must_use]
    pub fn render_handle(&self) -> RenderHandle {
        self.hooks.render_handle()
    }
}

/// Hook-call context passed to a render closure.
#[derive(Clone, Copy)]
pub struct RenderContext<'a> {
    runtime: &'a Runtime,
    hooks: &'a UnitHooks,
}

impl fmt::Debug for RenderContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderContext")
            .field("unit", &self.hooks.unit_id())
            .field("cursor", &self.hooks.cursor())
            .finish()
    }
}

impl<'a> RenderContext<'a> {
    /// The runtime driving this render.
    #[must_use]
    pub fn runtime(&self) -> &'a Runtime {
        self.runtime
    }

    /// The unit's hook bookkeeping.
    #[must_use]
    pub fn hooks(&self) -> &'a UnitHooks {
        self.hooks
    }

    /// Runtime configuration.
    #[must_use]
    pub fn config(&self) -> RuntimeConfig {
        self.runtime.config()
    }

    /// Whether development diagnostics are enabled.
    #[must_use]
    pub fn dev_checks(&self) -> bool {
        self.hooks.dev_checks()
    }

    /// True while the unit renders for the first time.
    #[must_use]
    pub fn is_first_render(&self) -> bool {
        !self.hooks.did_initialize()
    }

    /// Identity of the unit being rendered.
    #[must_use]
    pub fn unit_id(&self) -> u64 {
        self.hooks.unit_id()
    }

    /// A weak handle that re-renders this unit.
    #[must_use]
    pub fn render_handle(&self) -> RenderHandle {
        self.hooks.render_handle()
    }
}
