// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Upstream topology inputs: ports with their fixed ips and router static
//! routes. These are snapshots of what the upstream event sources reported,
//! not records this system owns.

use crate::{PortId, SubnetId};
use ipnet::IpNet;
use mac_address::MacAddress;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Device owner reported for router gateway ports.
pub const OWNER_ROUTER_INTERFACE: &str = "network:router_interface";

/// Device owner reported for directly attached (SR-IOV) ports.
pub const OWNER_DIRECT: &str = "compute:direct";

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FixedIp {
    pub ip: IpAddr,
    pub subnet: SubnetId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub id: PortId,
    pub mac: MacAddress,
    pub fixed_ips: Vec<FixedIp>,
    pub device_owner: String,
}

impl Port {
    #[must_use]
    pub fn new(id: PortId, mac: MacAddress, device_owner: &str) -> Self {
        Self {
            id,
            mac,
            fixed_ips: vec![],
            device_owner: device_owner.to_owned(),
        }
    }
    #[must_use]
    pub fn fixed_ip(mut self, ip: IpAddr, subnet: SubnetId) -> Self {
        self.fixed_ips.push(FixedIp { ip, subnet });
        self
    }
    #[must_use]
    pub fn is_router_interface(&self) -> bool {
        self.device_owner == OWNER_ROUTER_INTERFACE
    }
    #[must_use]
    pub fn is_direct(&self) -> bool {
        self.device_owner == OWNER_DIRECT
    }
    /// The port's fixed ip on the given subnet, if any.
    #[must_use]
    pub fn ip_on_subnet(&self, subnet: SubnetId) -> Option<IpAddr> {
        self.fixed_ips
            .iter()
            .find(|f| f.subnet == subnet)
            .map(|f| f.ip)
    }
}

/// A statically configured route on a router, as reported upstream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StaticRoute {
    pub destination: IpNet,
    pub next_hop: IpAddr,
}

impl StaticRoute {
    #[must_use]
    pub fn new(destination: IpNet, next_hop: IpAddr) -> Self {
        Self {
            destination,
            next_hop,
        }
    }
}
