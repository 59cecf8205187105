//! # Exclusivity Gate
//!
//! The protocol is strict request/response over one byte stream, so at most
//! one command may be in flight per connection. The gate wraps the state it
//! protects in a `tokio::sync::Mutex`: waiters suspend instead of spinning and
//! are admitted in FIFO order.
//!
//! Release is tied to `GateGuard`'s lifetime. Returning early, propagating an
//! error, or dropping the caller's future all release the gate.

use std::ops::{Deref, DerefMut};

use tokio::sync::{Mutex, MutexGuard};

/// Single-flight gate around a value of type `T`.
#[derive(Debug)]
pub struct Gate<T> {
    inner: Mutex<T>,
}

impl<T> Gate<T> {
    pub fn new(value: T) -> Self {
        Gate {
            inner: Mutex::new(value),
        }
    }

    /// Waits until no other caller holds the gate, then holds it.
    pub async fn acquire(&self) -> GateGuard<'_, T> {
        let guard = match self.inner.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::trace!("gate busy, waiting for in-flight request");
                self.inner.lock().await
            }
        };
        GateGuard { guard }
    }

    /// Returns true while some caller holds the gate.
    pub fn is_held(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}

/// Proof of admission; the gate reopens when this is dropped.
pub struct GateGuard<'a, T> {
    guard: MutexGuard<'a, T>,
}

impl<T> Deref for GateGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for GateGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}
