//! Cooperative cancellation for the store pipeline.
//!
//! The store never observes signals directly; the caller hands it a
//! [`CancelPolicy`] and the pipeline polls it at stage boundaries (and once
//! per row during the fill). A request acknowledged at a boundary stops the
//! run before the next stage begins; a request arriving mid-fill is put to
//! the policy's confirmation hook before anything is rolled back.

use std::sync::{
  Arc,
  atomic::{AtomicBool, Ordering},
};

/// How the store reacts to an outside request to stop.
pub trait CancelPolicy {
  /// Whether a stop request is currently pending. Must not consume it.
  fn pending(&self) -> bool;

  /// Consume a pending request, if any. Called only at stage boundaries;
  /// returns whether one was consumed.
  fn consume(&self) -> bool;

  /// A request arrived while rows were being written. Returns whether to
  /// abort (rolling back the fill) or to keep going.
  fn confirm_abort(&self) -> bool;
}

/// A shared flag the caller's signal handler can set from another task.
#[derive(Clone, Default)]
pub struct CancelToken {
  flag: Arc<AtomicBool>,
}

impl CancelToken {
  pub fn new() -> Self { Self::default() }

  /// Request cancellation. Idempotent.
  pub fn request(&self) { self.flag.store(true, Ordering::SeqCst); }

  pub fn is_requested(&self) -> bool { self.flag.load(Ordering::SeqCst) }

  /// Clear and return the flag.
  pub fn take(&self) -> bool { self.flag.swap(false, Ordering::SeqCst) }
}

/// Policy that never stops; for callers with no interrupt surface.
pub struct Uninterruptible;

impl CancelPolicy for Uninterruptible {
  fn pending(&self) -> bool { false }

  fn consume(&self) -> bool { false }

  fn confirm_abort(&self) -> bool { false }
}

/// Policy backed by a [`CancelToken`], with a caller-supplied hook deciding
/// whether a mid-fill request really aborts.
pub struct ConfirmedCancel<F: Fn() -> bool> {
  token:   CancelToken,
  confirm: F,
}

impl<F: Fn() -> bool> ConfirmedCancel<F> {
  pub fn new(token: CancelToken, confirm: F) -> Self {
    Self { token, confirm }
  }
}

impl<F: Fn() -> bool> CancelPolicy for ConfirmedCancel<F> {
  fn pending(&self) -> bool { self.token.is_requested() }

  fn consume(&self) -> bool { self.token.take() }

  fn confirm_abort(&self) -> bool { (self.confirm)() }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn token_take_clears_the_flag() {
    let token = CancelToken::new();
    assert!(!token.take());
    token.request();
    assert!(token.is_requested());
    assert!(token.take());
    assert!(!token.is_requested());
  }

  #[test]
  fn confirmed_cancel_delegates_to_the_hook() {
    let token = CancelToken::new();
    let policy = ConfirmedCancel::new(token.clone(), || true);
    assert!(!policy.pending());
    token.request();
    assert!(policy.pending());
    assert!(policy.confirm_abort());
    assert!(policy.consume());
    assert!(!policy.pending());
  }
}
