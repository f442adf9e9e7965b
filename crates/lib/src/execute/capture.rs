//! Panic capture for target actions.
//!
//! The engine reports a panicking action as a failed target through the
//! output sink, so the process panic hook must not print the payload as well.
//! Threads marked as capturing skip the previous hook; every other thread
//! keeps the behavior it had before.

use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;
use std::thread;

use tracing::debug;

thread_local! {
  static CAPTURING: Cell<bool> = const { Cell::new(false) };
}

static INSTALL: Once = Once::new();

fn install_hook() {
  INSTALL.call_once(|| {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
      if CAPTURING.try_with(Cell::get).unwrap_or(false) {
        // The payload may carry secrets; only the location is logged here.
        let location = info.location().map(ToString::to_string).unwrap_or_default();
        debug!(%location, "panic captured");
      } else {
        previous(info);
      }
    }));
  });
}

/// Run `f`, turning a panic into `Err` without the panic hook printing it.
pub(crate) fn catch_quietly<T>(f: impl FnOnce() -> T) -> thread::Result<T> {
  install_hook();
  let was = CAPTURING.replace(true);
  let outcome = panic::catch_unwind(AssertUnwindSafe(f));
  CAPTURING.set(was);
  outcome
}

/// Mark the current thread as capturing for its whole lifetime.
///
/// Used for fan-out worker threads, whose panics surface as failed items.
pub(crate) fn capture_current_thread() {
  install_hook();
  CAPTURING.set(true);
}

#[cfg(test)]
pub(crate) fn is_capturing() -> bool {
  CAPTURING.get()
}
