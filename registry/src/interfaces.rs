// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The vpn interface registry. Intent written by the association jobs lives
//! in the Config partition; a copy is committed to Operational once the
//! interface has been applied, so observed state stays inspectable on its
//! own.

use crate::errors::RegistryError;
use crate::store::{Datastore, MemStore};
use adjacency::{PortId, VpnInterface};
use tracing::debug;

#[derive(Default)]
pub struct VpnInterfaceTable {
    store: MemStore<PortId, VpnInterface>,
}

impl VpnInterfaceTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&self, datastore: Datastore, iface: VpnInterface) -> Result<(), RegistryError> {
        self.store.write(datastore, iface.name, iface)
    }

    pub fn read(
        &self,
        datastore: Datastore,
        port: PortId,
    ) -> Result<Option<VpnInterface>, RegistryError> {
        self.store.read(datastore, &port)
    }

    pub fn delete(&self, datastore: Datastore, port: PortId) -> Result<(), RegistryError> {
        self.store
            .delete(datastore, &port)?
            .ok_or(RegistryError::NoSuchVpnInterface(port))?;
        debug!("deleted vpn interface for port {port}");
        Ok(())
    }

    /// Copy the configured interface of a port into the operational
    /// partition, marking it applied.
    pub fn commit_operational(&self, port: PortId) -> Result<(), RegistryError> {
        let iface = self
            .store
            .read(Datastore::Config, &port)?
            .ok_or(RegistryError::NoSuchVpnInterface(port))?;
        self.store.write(Datastore::Operational, port, iface)
    }

    #[must_use]
    pub fn values(&self, datastore: Datastore) -> Vec<VpnInterface> {
        self.store.values(datastore)
    }

    #[must_use]
    pub fn len(&self, datastore: Datastore) -> usize {
        self.store.len(datastore)
    }

    /// Make the next `n` interface store calls fail.
    #[cfg(any(test, feature = "testing"))]
    pub fn inject_faults(&self, n: u32) {
        self.store.inject_faults(n);
    }
}
