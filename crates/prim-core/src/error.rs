#![forbid(unsafe_code)]

//! Configuration errors surfaced to the caller.
//!
//! These represent programmer misuse (for example reading a named selector
//! from a store built without a selector map) and are returned as `Err`
//! rather than degrading silently. Hygiene problems that should never break
//! a running UI are reported through [`crate::diagnostics`] instead.

use std::fmt;

/// Errors from store configuration lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A selector was requested by name but the store has no selector map.
    SelectorsRequired,
    /// The selector map has no entry for this name.
    UnknownSelector { name: String },
    /// The named selector exists but produces a different value or argument type.
    SelectorType {
        name: String,
        expected: &'static str,
    },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SelectorsRequired => {
                write!(f, "selectors are required to read state by selector name")
            }
            Self::UnknownSelector { name } => write!(f, "unknown selector '{name}'"),
            Self::SelectorType { name, expected } => {
                write!(f, "selector '{name}' does not have type {expected}")
            }
        }
    }
}

impl std::error::Error for StoreError {}
