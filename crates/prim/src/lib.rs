#![forbid(unsafe_code)]

//! prim public facade crate.
//!
//! Re-exports the store layer from `prim-core` and, with the default
//! `runtime` feature, the render-phase hooks from `prim-runtime`.

pub use prim_core::{
    ControlledKeys, Diagnostic, Key, Patch, ReadonlyStore, Selector, Selectors, Store, StoreError,
    StoreId, Subscription, WritableStore, create_selector, create_selector_memoized,
    create_selector_with_args, diagnostics, key,
};

#[cfg(feature = "runtime")]
pub use prim_runtime::{
    ControllableStore, ReactStore, RenderContext, RenderUnit, Runtime, RuntimeConfig,
    StableCallback, SubscriptionStrategy, use_store, use_store_with,
};

pub mod prelude {
    pub use prim_core as core;
    #[cfg(feature = "runtime")]
    pub use prim_runtime as runtime;

    pub use prim_core::{Key, Patch, ReadonlyStore, Store, WritableStore, create_selector, key};
    #[cfg(feature = "runtime")]
    pub use prim_runtime::{ControllableStore, ReactStore, Runtime, RuntimeConfig, use_store};
}
