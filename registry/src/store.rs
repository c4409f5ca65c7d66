// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The store contract the registries are built on: two logical partitions
//! (configuration intent and observed operational state) of keyed records,
//! each call independently atomic. A logical operation spanning several
//! calls is *not* atomic unless the caller serializes it (job-queue key or
//! named lock).

use crate::errors::RegistryError;
use dashmap::DashMap;
use std::hash::Hash;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Datastore {
    Config,
    Operational,
}

/// In-memory rendition of the transactional store. Per-entry locking makes
/// each read/write/merge/delete atomic for its key while distinct keys
/// proceed independently.
pub struct MemStore<K, V> {
    config: DashMap<K, V>,
    operational: DashMap<K, V>,
    #[cfg(any(test, feature = "testing"))]
    faults: std::sync::atomic::AtomicU32,
}

impl<K: Eq + Hash + Clone, V: Clone> Default for MemStore<K, V> {
    fn default() -> Self {
        Self {
            config: DashMap::new(),
            operational: DashMap::new(),
            #[cfg(any(test, feature = "testing"))]
            faults: std::sync::atomic::AtomicU32::new(0),
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> MemStore<K, V> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn partition(&self, datastore: Datastore) -> &DashMap<K, V> {
        match datastore {
            Datastore::Config => &self.config,
            Datastore::Operational => &self.operational,
        }
    }

    fn check_fault(&self) -> Result<(), RegistryError> {
        #[cfg(any(test, feature = "testing"))]
        {
            use std::sync::atomic::Ordering;
            if self.faults.load(Ordering::SeqCst) > 0 {
                self.faults.fetch_sub(1, Ordering::SeqCst);
                return Err(RegistryError::TransactionFailure(
                    "injected fault".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Make the next `n` store calls fail, to exercise failed-job paths.
    #[cfg(any(test, feature = "testing"))]
    pub fn inject_faults(&self, n: u32) {
        self.faults.store(n, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn read(&self, datastore: Datastore, key: &K) -> Result<Option<V>, RegistryError> {
        self.check_fault()?;
        Ok(self.partition(datastore).get(key).map(|e| e.value().clone()))
    }

    pub fn write(&self, datastore: Datastore, key: K, value: V) -> Result<(), RegistryError> {
        self.check_fault()?;
        self.partition(datastore).insert(key, value);
        Ok(())
    }

    /// Atomic read-modify-write of one record. Returns the updated value, or
    /// `None` when the record does not exist.
    pub fn merge(
        &self,
        datastore: Datastore,
        key: &K,
        update: impl FnOnce(&mut V),
    ) -> Result<Option<V>, RegistryError> {
        self.check_fault()?;
        match self.partition(datastore).get_mut(key) {
            Some(mut entry) => {
                update(entry.value_mut());
                Ok(Some(entry.value().clone()))
            }
            None => Ok(None),
        }
    }

    pub fn delete(&self, datastore: Datastore, key: &K) -> Result<Option<V>, RegistryError> {
        self.check_fault()?;
        Ok(self.partition(datastore).remove(key).map(|(_, v)| v))
    }

    /// Snapshot of all records in one partition.
    pub fn values(&self, datastore: Datastore) -> Vec<V> {
        self.partition(datastore)
            .iter()
            .map(|e| e.value().clone())
            .collect()
    }

    #[must_use]
    pub fn len(&self, datastore: Datastore) -> usize {
        self.partition(datastore).len()
    }

    #[must_use]
    pub fn is_empty(&self, datastore: Datastore) -> bool {
        self.partition(datastore).is_empty()
    }
}
