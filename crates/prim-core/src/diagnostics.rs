#![forbid(unsafe_code)]

//! Development-time diagnostics channel.
//!
//! Diagnostics describe hygiene problems (a key switching between controlled
//! and uncontrolled, an unstable key set, hook order drift). They are never
//! errors: reporting one logs a `tracing` warning and records it into any
//! active capture scope, and control flow continues unchanged.
//!
//! Whether a diagnostic is reported at all is decided by the caller (the
//! runtime gates on its `dev_checks` setting), so production builds pay
//! nothing.
//!
//! # Capture scopes
//!
//! Tests observe diagnostics through a thread-local stack of capture buffers:
//!
//! ```
//! use prim_core::diagnostics::{self, Diagnostic};
//!
//! let (_, seen) = diagnostics::capture(|| {
//!     diagnostics::report(Diagnostic::UnstableSyncedKeys {
//!         store: None,
//!         expected: vec!["a"],
//!         actual: vec!["a", "b"],
//!     });
//! });
//! assert_eq!(seen.len(), 1);
//! ```
//!
//! Scopes nest; a report is recorded into every active scope on the thread.

use std::cell::RefCell;
use std::fmt;

use crate::store::StoreId;

/// A non-fatal misuse report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A key first registered as controlled (or uncontrolled) is now
    /// registered the other way.
    ControlledSwitch {
        store: StoreId,
        key: &'static str,
        initially_controlled: bool,
    },
    /// The default value of an uncontrolled key changed after registration.
    DefaultValueChanged { store: StoreId, key: &'static str },
    /// `use_synced_values` received a different key set than on first render.
    UnstableSyncedKeys {
        store: Option<StoreId>,
        expected: Vec<&'static str>,
        actual: Vec<&'static str>,
    },
    /// An ordered hook slot was reused by a call of a different kind.
    HookOrderChanged {
        unit: u64,
        slot: usize,
        expected: &'static str,
        found: &'static str,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ControlledSwitch {
                store,
                key,
                initially_controlled,
            } => {
                let (from, to) = if *initially_controlled {
                    ("controlled", "uncontrolled")
                } else {
                    ("uncontrolled", "controlled")
                };
                write!(
                    f,
                    "{store}: a component is changing the {from} state `{key}` to be {to}; \
                     a key must stay controlled or uncontrolled for the lifetime of the store"
                )
            }
            Self::DefaultValueChanged { store, key } => write!(
                f,
                "{store}: a component is changing the default value of the uncontrolled \
                 state `{key}` after it has been initialized"
            ),
            Self::UnstableSyncedKeys {
                store,
                expected,
                actual,
            } => {
                if let Some(store) = store {
                    write!(f, "{store}: ")?;
                }
                write!(
                    f,
                    "use_synced_values expects the same prop keys on every render; \
                     keys should be stable (expected {expected:?}, got {actual:?})"
                )
            }
            Self::HookOrderChanged {
                unit,
                slot,
                expected,
                found,
            } => write!(
                f,
                "unit#{unit}: hook slot {slot} held `{found}` but `{expected}` was requested; \
                 hooks must be called in the same order on every render"
            ),
        }
    }
}

thread_local! {
    /// Active capture buffers for this thread, innermost last.
    static CAPTURE_STACK: RefCell<Vec<Vec<Diagnostic>>> = const { RefCell::new(Vec::new()) };
}

/// Emit a diagnostic: log it and record it into active capture scopes.
pub fn report(diagnostic: Diagnostic) {
    tracing::warn!(target: "prim::diagnostics", "{diagnostic}");
    CAPTURE_STACK.with(|stack| {
        for scope in stack.borrow_mut().iter_mut() {
            scope.push(diagnostic.clone());
        }
    });
}

/// Pops its capture buffer even if the closure panics.
struct CaptureGuard {
    depth: usize,
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        CAPTURE_STACK.with(|stack| {
            stack.borrow_mut().truncate(self.depth);
        });
    }
}

/// Run `f` and return its result with every diagnostic reported meanwhile.
pub fn capture<R>(f: impl FnOnce() -> R) -> (R, Vec<Diagnostic>) {
    let depth = CAPTURE_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        stack.push(Vec::new());
        stack.len() - 1
    });
    let guard = CaptureGuard { depth };
    let result = f();
    let captured = CAPTURE_STACK.with(|stack| {
        stack
            .borrow_mut()
            .get_mut(depth)
            .map(std::mem::take)
            .unwrap_or_default()
    });
    drop(guard);
    (result, captured)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Diagnostic {
        Diagnostic::DefaultValueChanged {
            store: crate::Store::new(()).id(),
            key: "value",
        }
    }

    #[test]
    fn report_without_scope_is_harmless() {
        report(sample());
    }

    #[test]
    fn capture_collects_reports() {
        let (out, seen) = capture(|| {
            report(sample());
            report(sample());
            7
        });
        assert_eq!(out, 7);
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn nested_scopes_both_record() {
        let (inner, outer) = capture(|| {
            let (_, inner) = capture(|| report(sample()));
            report(sample());
            inner
        });
        assert_eq!(inner.len(), 1);
        assert_eq!(outer.len(), 2);
    }

    #[test]
    fn scope_is_popped_after_panic() {
        let result = std::panic::catch_unwind(|| {
            let _ = capture::<()>(|| panic!("boom"));
        });
        assert!(result.is_err());
        CAPTURE_STACK.with(|stack| assert!(stack.borrow().is_empty()));
    }

    #[test]
    fn messages_name_the_key() {
        let msg = Diagnostic::ControlledSwitch {
            store: crate::Store::new(()).id(),
            key: "open",
            initially_controlled: false,
        }
        .to_string();
        assert!(msg.contains("`open`"));
        assert!(msg.contains("uncontrolled state"));

        let msg = Diagnostic::UnstableSyncedKeys {
            store: None,
            expected: vec!["a"],
            actual: vec!["b"],
        }
        .to_string();
        assert!(msg.contains("keys should be stable"));
    }
}
