//! Cancellation scopes - bind in-flight requests to their owner's lifetime.
//!
//! A [`CancellationScope`] tracks one [`CancellationToken`] per running
//! operation. Dropping the scope (or calling [`CancellationScope::cancel_all`])
//! signals every outstanding token. Cancelled operations resolve to
//! `Ok(None)` instead of an error.
//!
//! # Modes
//! - **Concurrent**: any number of operations in flight at once
//! - **SingleSlot**: starting an operation cancels the previous one, so only
//!   the latest result is ever delivered

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::retry::Classify;

/// How a scope treats overlapping operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeMode {
    Concurrent,
    SingleSlot,
}

#[derive(Debug, Default)]
struct Handles {
    next_id: u64,
    /// Ordered by registration.
    active: BTreeMap<u64, CancellationToken>,
}

type SharedHandles = Arc<Mutex<Handles>>;

fn lock(handles: &SharedHandles) -> MutexGuard<'_, Handles> {
    handles.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes its handle from the scope when the operation settles or is dropped.
struct Registration {
    handles: SharedHandles,
    id: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        // Already gone if cancel_all cleared the set first.
        lock(&self.handles).active.remove(&self.id);
    }
}

/// Set of cancellation handles owned by one caller lifetime.
///
/// # Invariants
/// - every registered handle is removed exactly once, either when its
///   operation settles or when the scope cancels it
/// - dropping the scope cancels everything still registered
#[derive(Debug)]
pub struct CancellationScope {
    mode: ScopeMode,
    handles: SharedHandles,
}

impl CancellationScope {
    /// Scope that lets operations run side by side.
    pub fn new() -> Self {
        Self::with_mode(ScopeMode::Concurrent)
    }

    /// Scope where a new operation supersedes the running one.
    pub fn single_slot() -> Self {
        Self::with_mode(ScopeMode::SingleSlot)
    }

    pub fn with_mode(mode: ScopeMode) -> Self {
        Self {
            mode,
            handles: Arc::new(Mutex::new(Handles::default())),
        }
    }

    pub fn mode(&self) -> ScopeMode {
        self.mode
    }

    /// Number of operations currently registered.
    pub fn in_flight(&self) -> usize {
        lock(&self.handles).active.len()
    }

    /// Run `operation` with a fresh token tied to this scope.
    ///
    /// The handle is registered when this method is called, so in
    /// single-slot mode the previous operation is already cancelled by the
    /// time this returns. The returned future does not borrow the scope and
    /// may be spawned.
    ///
    /// Resolves to `Ok(None)` when the token fires before the operation
    /// settles, or when the operation fails with a cancellation error.
    pub fn run_cancellable<F, Fut, T, E>(
        &self,
        operation: F,
    ) -> impl Future<Output = Result<Option<T>, E>>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify,
    {
        let (registration, token) = self.register();

        async move {
            let _registration = registration;
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(None),
                outcome = operation(token.clone()) => outcome,
            };

            if token.is_cancelled() {
                return Ok(None);
            }
            match outcome {
                Ok(value) => Ok(Some(value)),
                Err(err) if err.is_cancelled() => Ok(None),
                Err(err) => Err(err),
            }
        }
    }

    fn register(&self) -> (Registration, CancellationToken) {
        let mut handles = lock(&self.handles);
        if self.mode == ScopeMode::SingleSlot && !handles.active.is_empty() {
            debug!(superseded = handles.active.len(), "Cancelling superseded operation");
            cancel_and_clear(&mut handles);
        }
        let id = handles.next_id;
        handles.next_id += 1;
        let token = CancellationToken::new();
        handles.active.insert(id, token.clone());
        let registration = Registration {
            handles: Arc::clone(&self.handles),
            id,
        };
        (registration, token)
    }

    /// Signal every registered operation and forget them.
    pub fn cancel_all(&self) {
        let mut handles = lock(&self.handles);
        if !handles.active.is_empty() {
            debug!(count = handles.active.len(), "Cancelling in-flight operations");
        }
        cancel_and_clear(&mut handles);
    }

    /// End the owner's lifetime. Equivalent to dropping the scope.
    pub fn teardown(self) {}
}

fn cancel_and_clear(handles: &mut Handles) {
    for token in handles.active.values() {
        token.cancel();
    }
    handles.active.clear();
}

impl Default for CancellationScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CancellationScope {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
