//! SQLite backend for the magpie capture store.
//!
//! Writes [`Capture`](magpie_core::capture::Capture)s into a single-file
//! store, crash-safely: every mutating stage runs inside a SQLite savepoint
//! and cancellation requests are honored only at stage boundaries.

mod encode;
mod schema;
mod store;

pub mod cancel;
pub mod error;

pub use cancel::{CancelPolicy, CancelToken, ConfirmedCancel, Uninterruptible};
pub use error::{Error, Result, Stage};
pub use store::{StoreReport, store_capture};
