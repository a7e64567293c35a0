#![forbid(unsafe_code)]

//! Runtime: render-phase hooks over `prim-core` stores.
//!
//! # Role in prim
//! `prim-runtime` models the host rendering engine just far enough for the
//! store layer to be exercised: units render, then commit layout-phase work,
//! then passive-phase work, and finally unmount. On top of that it provides
//! the hooks components call while rendering.
//!
//! # Primary responsibilities
//! - **Runtime / RenderUnit / RenderContext**: render, commit, unmount, with
//!   the context threaded explicitly through every hook call.
//! - **Fast hooks**: ordered per-unit slots, extensions and commit queues.
//! - **use_store**: selection-level subscriptions, batched per unit (fast)
//!   or per call (legacy).
//! - **ReactStore / ControllableStore**: controlled and uncontrolled state,
//!   synced values, named selectors, observation, change callbacks.
//!
//! # Example
//!
//! ```
//! use prim_core::{key, Key};
//! use prim_runtime::{ReactStore, Runtime, RuntimeConfig};
//!
//! #[derive(Clone, Default)]
//! struct Field { value: i32 }
//!
//! const VALUE: Key<Field, i32> = key!(Field, value: i32);
//!
//! let runtime = Runtime::new(RuntimeConfig::default());
//! let store = ReactStore::new(Field::default());
//! let unit = runtime.create_unit();
//!
//! runtime.render(&unit, |cx| store.use_controlled_prop(cx, VALUE, None, 1));
//! assert_eq!(store.state().value, 1);
//!
//! runtime.render(&unit, |cx| store.use_controlled_prop(cx, VALUE, Some(7), 1));
//! store.set(VALUE, 8);
//! assert_eq!(store.state().value, 7);
//! ```

pub mod config;
pub mod controllable;
pub mod effects;
pub mod fast_hooks;
pub mod react_store;
pub mod runtime;
pub mod stable_callback;
pub mod use_store;

pub use config::{RuntimeConfig, SubscriptionStrategy};
pub use controllable::ControllableStore;
pub use effects::Cleanup;
pub use fast_hooks::{Extension, Job, LifecycleHooks, RenderHandle, UnitHooks};
pub use react_store::{ElementSetter, ReactStore};
pub use runtime::{RenderContext, RenderUnit, Runtime};
pub use stable_callback::StableCallback;
pub use use_store::{is_batched, use_store, use_store_with};
