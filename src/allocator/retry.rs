//! Retry handling.
//!
//! Two distinct reasons make the allocator try again:
//!
//! - **Transient store failures** (`StoreError::Unavailable`): the single
//!   store call is repeated after a fixed delay, up to `retries` times.
//! - **Optimistic conflicts**: a guarded transaction did not apply because
//!   another caller moved the state first. The whole operation restarts
//!   from fresh reads, up to `retries` times, without delay.
//!
//! Each class has its own counter so that a burst of unavailability never
//! eats into the conflict budget and vice versa.

use crate::store::StoreError;
use log::{debug, warn};
use std::thread;
use std::time::Duration;

/// Outcome of one optimistic attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T> {
    Done(T),
    /// A guard failed; re-read and try again
    Conflict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            retries: 10,
            delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Run one store call, repeating it while it fails transiently
    pub fn call<T>(
        &self,
        what: &str,
        mut request: impl FnMut() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut remaining = self.retries;
        loop {
            match request() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && remaining > 0 => {
                    remaining -= 1;
                    warn!("{} failed ({}), {} retries left", what, e, remaining);
                    thread::sleep(self.delay);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run an optimistic operation until it is not in conflict anymore.
    ///
    /// Returns `Ok(None)` when every attempt conflicted; the caller decides
    /// which error describes that best.
    pub fn optimistic<T, E>(
        &self,
        what: &str,
        mut attempt: impl FnMut(u32) -> Result<Attempt<T>, E>,
    ) -> Result<Option<T>, E> {
        for n in 0..=self.retries {
            match attempt(n)? {
                Attempt::Done(value) => return Ok(Some(value)),
                Attempt::Conflict => debug!("{}: attempt {} lost a race", what, n + 1),
            }
        }
        Ok(None)
    }

    /// Number of attempts `optimistic` makes before giving up
    pub fn attempts(&self) -> u32 {
        self.retries + 1
    }
}
