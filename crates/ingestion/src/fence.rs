//! One-shot fence
//!
//! Terminated once by the publisher, waited on by one caller, then reset by
//! that caller before the next request.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct Fence {
    terminated: Mutex<bool>,
    cv: Condvar,
}

impl Fence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until terminated.
    pub fn wait(&self) {
        let guard = self.terminated.lock().unwrap_or_else(PoisonError::into_inner);
        let _guard = self
            .cv
            .wait_while(guard, |terminated| !*terminated)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Block until terminated or `timeout` elapses. Returns whether the fence
    /// was terminated.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let guard = self.terminated.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = self
            .cv
            .wait_timeout_while(guard, timeout, |terminated| !*terminated)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }

    pub fn terminate(&self) {
        *self.terminated.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.cv.notify_all();
    }

    pub fn reset(&self) {
        *self.terminated.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }

    pub fn is_terminated(&self) -> bool {
        *self.terminated.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
