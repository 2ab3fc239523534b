//! Parent/child cancellation tokens shared between the engine and its helper threads.

use std::{
    sync::{Arc, Condvar, Mutex, Weak},
    time::{Duration, Instant},
};

/// Cooperative cancellation flag observable from many threads.
///
/// Tokens form a tree: cancelling a token cancels every token derived from it
/// via [`CancelToken::child`], while cancelling a child leaves its parent
/// untouched. Cancellation is one-way and idempotent.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<State>,
    cond: Condvar,
}

struct State {
    cancelled: bool,
    children: Vec<Weak<Inner>>,
}

impl CancelToken {
    /// Creates a new, uncancelled root token.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    cancelled: false,
                    children: Vec::new(),
                }),
                cond: Condvar::new(),
            }),
        }
    }

    /// Derives a child token.
    ///
    /// A child created from an already-cancelled parent starts cancelled.
    pub fn child(&self) -> Self {
        let child = CancelToken::new();
        let mut state = self.inner.state.lock().expect("cancel state poisoned");
        if state.cancelled {
            drop(state);
            child.cancel();
        } else {
            state.children.push(Arc::downgrade(&child.inner));
        }
        child
    }

    /// Cancels this token and every descendant, waking all waiters.
    ///
    /// Safe to call any number of times from any thread.
    pub fn cancel(&self) {
        let children = {
            let mut state = self.inner.state.lock().expect("cancel state poisoned");
            if state.cancelled {
                return;
            }
            state.cancelled = true;
            self.inner.cond.notify_all();
            std::mem::take(&mut state.children)
        };

        for weak in children {
            if let Some(inner) = weak.upgrade() {
                CancelToken { inner }.cancel();
            }
        }
    }

    /// Returns whether the token has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.inner
            .state
            .lock()
            .expect("cancel state poisoned")
            .cancelled
    }

    /// Blocks the calling thread until the token is cancelled.
    pub fn wait(&self) {
        let mut state = self.inner.state.lock().expect("cancel state poisoned");
        while !state.cancelled {
            state = self
                .inner
                .cond
                .wait(state)
                .expect("cancel state poisoned");
        }
    }

    /// Blocks for at most `timeout`. Returns `true` if the token was
    /// cancelled within the window, `false` if the timeout elapsed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock().expect("cancel state poisoned");
        while !state.cancelled {
            let now = Instant::now();
            let Some(remaining) = deadline.checked_duration_since(now).filter(|d| !d.is_zero())
            else {
                return false;
            };
            let (guard, result) = self
                .inner
                .cond
                .wait_timeout(state, remaining)
                .expect("cancel state poisoned");
            state = guard;
            if result.timed_out() && !state.cancelled {
                return false;
            }
        }
        true
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
