// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Reverse index mapping (vpn, fixed ip) to the port carrying that ip and
//! its mac. Extra-route next hops are resolved against this index.

use crate::{PortId, VpnId};
use dashmap::DashMap;
use mac_address::MacAddress;
use std::net::IpAddr;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PortNeighbor {
    pub port: PortId,
    pub mac: MacAddress,
}

#[derive(Default)]
pub struct NeighborIndex(DashMap<(VpnId, IpAddr), PortNeighbor>);

impl NeighborIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    pub fn add(&self, vpn: VpnId, ip: IpAddr, port: PortId, mac: MacAddress) {
        self.0.insert((vpn, ip), PortNeighbor { port, mac });
    }
    #[must_use]
    pub fn get(&self, vpn: VpnId, ip: IpAddr) -> Option<PortNeighbor> {
        self.0.get(&(vpn, ip)).map(|e| *e.value())
    }
    /// Tell if `ip` resolves to some port's primary adjacency within `vpn`.
    #[must_use]
    pub fn resolves(&self, vpn: VpnId, ip: IpAddr) -> bool {
        self.0.contains_key(&(vpn, ip))
    }
    pub fn remove(&self, vpn: VpnId, ip: IpAddr) {
        self.0.remove(&(vpn, ip));
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
