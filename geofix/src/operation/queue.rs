//! Registry of in-flight operations.
//!
//! The queue does not order or throttle anything: every submitted operation
//! gets its own task immediately and none waits on another. What it provides
//! is bookkeeping (which operations are running, since when) and a shared
//! cancellation root so a manager shutdown reaches every operation.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Completion, OperationHandle, OperationId, OperationKind, OperationState, Outcome};
use crate::error::LocationError;

struct Entry {
    kind: OperationKind,
    state: OperationState,
    started_at: Instant,
    cancel: CancellationToken,
}

/// Snapshot of one in-flight operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlightOperation {
    /// Operation identifier.
    pub id: OperationId,
    /// What it does.
    pub kind: OperationKind,
    /// `Pending` or `Executing`.
    pub state: OperationState,
    /// Time since submission.
    pub age: Duration,
}

/// Set of concurrently running operations.
pub struct OperationQueue {
    entries: Mutex<HashMap<OperationId, Entry>>,
    shutdown: CancellationToken,
}

/// Removes an operation from the queue when its task ends, however it ends.
struct FinishGuard {
    queue: Arc<OperationQueue>,
    id: OperationId,
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.queue.entries.lock().remove(&self.id);
    }
}

impl OperationQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Start an operation.
    ///
    /// `op` receives the operation id and its cancellation token and returns
    /// the future to run. Without a Tokio runtime the future is never built
    /// and the handle resolves immediately with `NoRuntime`.
    pub fn submit<T, F, Fut>(self: &Arc<Self>, kind: OperationKind, op: F) -> OperationHandle<T>
    where
        T: Outcome,
        F: FnOnce(OperationId, CancellationToken) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let id = OperationId::next();
        let cancel = self.shutdown.child_token();
        let (completion, rx) = Completion::new();
        let handle = OperationHandle::new(id, rx, cancel.clone());

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!(%id, %kind, "No Tokio runtime, operation not started");
                completion.complete(T::aborted(LocationError::NoRuntime));
                return handle;
            }
        };

        self.entries.lock().insert(
            id,
            Entry {
                kind,
                state: OperationState::Pending,
                started_at: Instant::now(),
                cancel: cancel.clone(),
            },
        );
        debug!(%id, %kind, "Operation queued");

        let future = op(id, cancel);
        let guard = FinishGuard {
            queue: Arc::clone(self),
            id,
        };

        runtime.spawn(async move {
            guard.queue.set_state(id, OperationState::Executing);
            let outcome = future.await;
            drop(guard);
            debug!(%id, "Operation finished");
            completion.complete(outcome);
        });

        handle
    }

    fn set_state(&self, id: OperationId, state: OperationState) {
        if let Some(entry) = self.entries.lock().get_mut(&id) {
            entry.state = state;
        }
    }

    /// Number of operations not yet finished.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing is running.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Snapshot of every unfinished operation, oldest first.
    pub fn in_flight(&self) -> Vec<InFlightOperation> {
        let entries = self.entries.lock();
        let mut snapshot: Vec<InFlightOperation> = entries
            .iter()
            .map(|(id, entry)| InFlightOperation {
                id: *id,
                kind: entry.kind,
                state: entry.state,
                age: entry.started_at.elapsed(),
            })
            .collect();
        snapshot.sort_by_key(|op| op.id);
        snapshot
    }

    /// Cancel one operation. Returns false if it is not in flight.
    pub fn cancel(&self, id: OperationId) -> bool {
        match self.entries.lock().get(&id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every operation, including ones submitted afterwards.
    pub fn shutdown(&self) {
        debug!(in_flight = self.len(), "Cancelling all operations");
        self.shutdown.cancel();
    }

    /// Returns true once [`shutdown`](Self::shutdown) was called.
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Default for OperationQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OperationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationQueue")
            .field("in_flight", &self.len())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
