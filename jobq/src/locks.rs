// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Advisory named lock service. Guards multi-step read-modify-write
//! sequences that are not already serialized by a job-queue key. Locks are
//! acquired with a timeout and released when the guard drops, so every exit
//! path releases.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::warn;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LockError {
    #[error("timed out acquiring lock '{0}'")]
    Timeout(String),
}

/// RAII guard for one named lock.
pub struct NamedLockGuard {
    name: Arc<str>,
    _guard: OwnedMutexGuard<()>,
}

impl NamedLockGuard {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Default)]
pub struct NamedLocks {
    locks: DashMap<Arc<str>, Arc<Mutex<()>>>,
}

impl NamedLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock with the given name, waiting at most `budget`.
    pub async fn try_lock(
        &self,
        name: &str,
        budget: Duration,
    ) -> Result<NamedLockGuard, LockError> {
        let name: Arc<str> = Arc::from(name);
        let mutex = self
            .locks
            .entry(name.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        match tokio::time::timeout(budget, mutex.lock_owned()).await {
            Ok(guard) => Ok(NamedLockGuard {
                name,
                _guard: guard,
            }),
            Err(_) => {
                warn!("could not acquire lock '{name}' within {budget:?}");
                Err(LockError::Timeout(name.to_string()))
            }
        }
    }
}
