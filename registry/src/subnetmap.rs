// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The subnetmap registry: one record per subnet tracking its network,
//! router, vpn membership and attached ports.

use crate::errors::RegistryError;
use crate::store::{Datastore, MemStore};
use adjacency::{NetworkId, PortId, RouterId, SubnetId, TenantId, VpnId};
use dashmap::DashMap;
use ipnet::IpNet;
use mac_address::MacAddress;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use tracing::{debug, error, warn};

/// Association record for one subnet. `vpn` is set iff some vpn references
/// the subnet directly or via its router or network; `router` is set only
/// while the subnet carries a router-interface port.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Subnetmap {
    pub id: SubnetId,
    pub network: NetworkId,
    pub tenant: TenantId,
    pub cidr: IpNet,
    pub router: Option<RouterId>,
    pub vpn: Option<VpnId>,
    pub ports: Vec<PortId>,        /* ordered as attached */
    pub direct_ports: Vec<PortId>, /* SR-IOV style directly attached */
    pub router_interface_port: Option<PortId>,
    pub router_interface_ip: Option<IpAddr>,
    pub router_interface_mac: Option<MacAddress>,
}

impl Subnetmap {
    #[must_use]
    pub fn new(id: SubnetId, network: NetworkId, tenant: TenantId, cidr: IpNet) -> Self {
        Self {
            id,
            network,
            tenant,
            cidr,
            router: None,
            vpn: None,
            ports: vec![],
            direct_ports: vec![],
            router_interface_port: None,
            router_interface_ip: None,
            router_interface_mac: None,
        }
    }
}

#[derive(Default)]
pub struct SubnetmapTable {
    maps: MemStore<SubnetId, Subnetmap>,
    /* ports that arrived before their subnetmap was created */
    pending: DashMap<PortId, SubnetId>,
}

impl SubnetmapTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the subnetmap for a new subnet. Fails with
    /// [`RegistryError::SubnetmapExists`] when one is already present, then
    /// replays any port that arrived before the subnet existed.
    pub fn create(
        &self,
        id: SubnetId,
        network: NetworkId,
        tenant: TenantId,
        cidr: IpNet,
    ) -> Result<Subnetmap, RegistryError> {
        if self.maps.read(Datastore::Config, &id)?.is_some() {
            error!("subnetmap for subnet {id} already exists");
            return Err(RegistryError::SubnetmapExists(id));
        }
        self.maps
            .write(Datastore::Config, id, Subnetmap::new(id, network, tenant, cidr))?;
        debug!("created subnetmap for subnet {id} ({cidr})");

        /* replay early ports */
        let replay: Vec<PortId> = self
            .pending
            .iter()
            .filter(|e| *e.value() == id)
            .map(|e| *e.key())
            .collect();
        for port in replay {
            self.pending.remove(&port);
            debug!("attaching early port {port} to subnet {id}");
            self.add_port(id, port, false)?;
        }
        self.get(id)
    }

    /// Partial merge: a field is only overwritten when the caller supplies a
    /// value for it. Clearing is a separate verb ([`Self::clear_vpn`]).
    pub fn update(
        &self,
        id: SubnetId,
        router: Option<RouterId>,
        vpn: Option<VpnId>,
    ) -> Result<Subnetmap, RegistryError> {
        self.maps
            .merge(Datastore::Config, &id, |map| {
                if router.is_some() {
                    map.router = router;
                }
                if vpn.is_some() {
                    map.vpn = vpn;
                }
            })?
            .ok_or(RegistryError::NoSuchSubnetmap(id))
    }

    pub fn clear_vpn(&self, id: SubnetId) -> Result<Subnetmap, RegistryError> {
        self.maps
            .merge(Datastore::Config, &id, |map| map.vpn = None)?
            .ok_or(RegistryError::NoSuchSubnetmap(id))
    }

    pub fn clear_router(&self, id: SubnetId) -> Result<Subnetmap, RegistryError> {
        self.maps
            .merge(Datastore::Config, &id, |map| map.router = None)?
            .ok_or(RegistryError::NoSuchSubnetmap(id))
    }

    /// Attach a port. A port for a not-yet-created subnet is remembered in
    /// the pending map instead of failing.
    pub fn add_port(
        &self,
        id: SubnetId,
        port: PortId,
        direct: bool,
    ) -> Result<(), RegistryError> {
        let updated = self.maps.merge(Datastore::Config, &id, |map| {
            let list = if direct {
                &mut map.direct_ports
            } else {
                &mut map.ports
            };
            if !list.contains(&port) {
                list.push(port);
            }
        })?;
        if updated.is_none() {
            warn!("subnet {id} not seen yet, queueing port {port}");
            self.pending.insert(port, id);
        }
        Ok(())
    }

    pub fn remove_port(
        &self,
        id: SubnetId,
        port: PortId,
        direct: bool,
    ) -> Result<(), RegistryError> {
        self.pending.remove(&port);
        let updated = self.maps.merge(Datastore::Config, &id, |map| {
            map.ports.retain(|p| *p != port);
            if direct {
                map.direct_ports.retain(|p| *p != port);
            }
        })?;
        if updated.is_none() {
            return Err(RegistryError::NoSuchSubnetmap(id));
        }
        Ok(())
    }

    /// Record the router-interface (gateway) port of the subnet.
    pub fn set_router_interface(
        &self,
        id: SubnetId,
        port: PortId,
        ip: IpAddr,
        mac: MacAddress,
    ) -> Result<Subnetmap, RegistryError> {
        self.maps
            .merge(Datastore::Config, &id, |map| {
                map.router_interface_port = Some(port);
                map.router_interface_ip = Some(ip);
                map.router_interface_mac = Some(mac);
            })?
            .ok_or(RegistryError::NoSuchSubnetmap(id))
    }

    pub fn clear_router_interface(&self, id: SubnetId) -> Result<Subnetmap, RegistryError> {
        self.maps
            .merge(Datastore::Config, &id, |map| {
                map.router_interface_port = None;
                map.router_interface_ip = None;
                map.router_interface_mac = None;
            })?
            .ok_or(RegistryError::NoSuchSubnetmap(id))
    }

    pub fn get(&self, id: SubnetId) -> Result<Subnetmap, RegistryError> {
        self.maps
            .read(Datastore::Config, &id)?
            .ok_or(RegistryError::NoSuchSubnetmap(id))
    }

    pub fn delete(&self, id: SubnetId) -> Result<Subnetmap, RegistryError> {
        self.maps
            .delete(Datastore::Config, &id)?
            .ok_or(RegistryError::NoSuchSubnetmap(id))
    }

    /// All subnetmaps currently attached to the given router.
    #[must_use]
    pub fn on_router(&self, router: RouterId) -> Vec<Subnetmap> {
        let mut subnets: Vec<Subnetmap> = self
            .maps
            .values(Datastore::Config)
            .into_iter()
            .filter(|m| m.router == Some(router))
            .collect();
        subnets.sort_by_key(|m| m.id);
        subnets
    }

    /// All subnetmaps belonging to the given network.
    #[must_use]
    pub fn on_network(&self, network: NetworkId) -> Vec<Subnetmap> {
        let mut subnets: Vec<Subnetmap> = self
            .maps
            .values(Datastore::Config)
            .into_iter()
            .filter(|m| m.network == network)
            .collect();
        subnets.sort_by_key(|m| m.id);
        subnets
    }

    #[must_use]
    pub fn values(&self) -> Vec<Subnetmap> {
        self.maps.values(Datastore::Config)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.maps.len(Datastore::Config)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.maps.is_empty(Datastore::Config)
    }
}
