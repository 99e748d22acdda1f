//! Session timer - a one-shot, cancellable deadline
//!
//! The timer lives on the async runtime, off the frame path. Firing only
//! runs the supplied callback; the callback is expected to take the session
//! lock and let the session decide whether the deadline still matters.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// One-shot deadline bound to a runtime handle
pub struct SessionTimer {
    runtime: Handle,
    pending: Option<JoinHandle<()>>,
}

impl SessionTimer {
    pub fn new(runtime: Handle) -> Self {
        SessionTimer {
            runtime,
            pending: None,
        }
    }

    /// Arm the deadline, replacing any pending one
    pub fn arm<F>(&mut self, after: Duration, on_fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel();

        let handle = self.runtime.spawn(async move {
            tokio::time::sleep(after).await;
            tracing::debug!(after_ms = after.as_millis() as u64, "session deadline reached");
            on_fire();
        });
        self.pending = Some(handle);
    }

    /// Cancel the pending deadline. Returns true if one was still waiting.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(handle) => {
                let waiting = !handle.is_finished();
                handle.abort();
                waiting
            }
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        matches!(&self.pending, Some(handle) if !handle.is_finished())
    }
}

impl Drop for SessionTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
