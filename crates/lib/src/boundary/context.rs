//! Per-thread execution context.
//!
//! A launch worker enters its boundary for the duration of startup, so code
//! running on that thread can find the boundary it belongs to without it
//! being threaded through every call. The caller's thread never sees it.

use std::cell::RefCell;
use std::sync::Arc;

use super::IsolationBoundary;

thread_local! {
  static CURRENT: RefCell<Option<Arc<IsolationBoundary>>> = const { RefCell::new(None) };
}

/// Restores the previous context when dropped.
#[must_use = "the context is left as soon as the guard is dropped"]
pub struct ContextGuard {
  previous: Option<Arc<IsolationBoundary>>,
}

impl Drop for ContextGuard {
  fn drop(&mut self) {
    let previous = self.previous.take();
    CURRENT.with(|current| *current.borrow_mut() = previous);
  }
}

/// Make `boundary` the current context of this thread.
pub fn enter(boundary: Arc<IsolationBoundary>) -> ContextGuard {
  let previous = CURRENT.with(|current| current.borrow_mut().replace(boundary));
  ContextGuard { previous }
}

/// The boundary this thread is running in, if any.
pub fn current() -> Option<Arc<IsolationBoundary>> {
  CURRENT.with(|current| current.borrow().clone())
}
