//! Fire-and-confirm mutations.
//!
//! A write is marked in flight, run to completion on its own task, and only
//! then released. Callers re-read the affected data after it settles instead
//! of patching a local copy.

use std::{
    collections::HashSet,
    future::Future,
    sync::{Arc, Mutex},
};

use uuid::Uuid;

use crate::error::{AppError, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Create,
    Edit,
    Publish,
    Delete,
}

/// MutationKey
///
/// Identifies one operation on one target: the post id, or the author's
/// identity for `Create`. Two triggers with the same key may not overlap;
/// different kinds on the same target may.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MutationKey {
    pub kind: MutationKind,
    pub target: Uuid,
}

impl MutationKey {
    pub fn new(kind: MutationKind, target: Uuid) -> Self {
        Self { kind, target }
    }
}

/// MutationRunner
///
/// Shared through `AppState`; clones share one in-flight set.
#[derive(Clone, Default)]
pub struct MutationRunner {
    in_flight: Arc<Mutex<HashSet<MutationKey>>>,
}

/// Releases the key when the write settles, including on panic.
struct InFlight {
    key: MutationKey,
    set: Arc<Mutex<HashSet<MutationKey>>>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.key);
        }
    }
}

impl MutationRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_in_flight(&self, key: MutationKey) -> bool {
        self.in_flight
            .lock()
            .map(|set| set.contains(&key))
            .unwrap_or(false)
    }

    fn acquire(&self, key: MutationKey) -> Result<InFlight, AppError> {
        let mut set = self
            .in_flight
            .lock()
            .map_err(|_| StoreError::Unavailable("mutation registry poisoned".to_string()))?;
        if !set.insert(key) {
            tracing::info!(?key, "rejecting re-entrant mutation");
            return Err(AppError::WriteConflict);
        }
        Ok(InFlight {
            key,
            set: Arc::clone(&self.in_flight),
        })
    }

    /// submit
    ///
    /// Runs `write` on a detached task. If the caller is dropped before the
    /// write settles (client went away), the write still completes and the
    /// key is released; only the result is lost.
    pub async fn submit<T, F>(&self, key: MutationKey, write: F) -> Result<T, AppError>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, StoreError>> + Send + 'static,
    {
        let guard = self.acquire(key)?;
        let handle = tokio::spawn(async move {
            let result = write.await;
            drop(guard);
            result
        });
        match handle.await {
            Ok(result) => result.map_err(AppError::from),
            Err(e) => Err(StoreError::Task(e.to_string()).into()),
        }
    }
}
