//! Domain Layer
//!
//! Core signal value types, with no dependency on how signals arrive or on
//! the broker transport that eventually executes them. The orchestration
//! that moves a `Signal` through its lifecycle lives one layer out, in
//! `application`.

/// Signal value types and journal-entry normalization.
pub mod signal;

pub use signal::{
    Decision, ModifyOverrides, PendingSignal, Signal, SignalError, SignalKind, SignalStatus,
    normalize_entry,
};
