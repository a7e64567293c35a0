#![forbid(unsafe_code)]

//! Core: observable stores, typed keys, memoized selectors and
//! controlled-value bookkeeping.
//!
//! # Role in prim
//! `prim-core` is the data layer. It knows nothing about rendering phases;
//! the render-aware hooks (`use_store`, controlled props, synced values)
//! live in `prim-runtime` and are built on the primitives here.
//!
//! # Primary responsibilities
//! - **Store**: an `Rc`-replaced state with identity-based change detection
//!   and synchronous listeners.
//! - **Key / Patch**: named field lenses and batched partial writes.
//! - **Selector**: single-slot memoized projections that keep returning the
//!   same value across unrelated state changes.
//! - **ControlledKeys**: per-key controlled/uncontrolled classification and
//!   write filtering shared by the store variants.
//! - **Diagnostics**: the non-fatal misuse channel, observable in tests.
//!
//! # Example
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use prim_core::{key, Key, Patch, Store};
//!
//! #[derive(Clone, Default)]
//! struct Counter { a: i32, b: i32 }
//!
//! const A: Key<Counter, i32> = key!(Counter, a: i32);
//! const B: Key<Counter, i32> = key!(Counter, b: i32);
//!
//! let store = Store::new(Counter::default());
//! let calls = Rc::new(Cell::new(0));
//! let calls_in_listener = Rc::clone(&calls);
//! let _sub = store.subscribe(move |_| calls_in_listener.set(calls_in_listener.get() + 1));
//!
//! store.apply(Patch::new().set(A, 1).set(B, 2));
//! assert_eq!(calls.get(), 1);
//! ```

pub mod controlled;
pub mod diagnostics;
pub mod error;
pub mod key;
pub mod selector;
pub mod store;

pub use controlled::{ControlledKeys, Registration};
pub use diagnostics::Diagnostic;
pub use error::StoreError;
pub use key::{Key, Patch};
pub use selector::{
    Selector, Selectors, create_selector, create_selector_memoized, create_selector_with_args,
};
pub use store::{ReadonlyStore, Store, StoreId, Subscription, WritableStore};
