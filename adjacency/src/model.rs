// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! State objects for vpn interfaces and their adjacencies.

use crate::{PortId, SubnetId, VpnId};
use ipnet::IpNet;
use mac_address::MacAddress;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::net::IpAddr;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum AdjacencyKind {
    Primary,
    ExtraRoute,
}

/// One contribution to a vpn interface's route table: a directly attached
/// host prefix (Primary) or a statically routed destination (ExtraRoute).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Adjacency {
    pub ip: IpNet,                 /* /32 or /128 for primaries */
    pub mac: Option<MacAddress>,   /* primaries only */
    pub kind: AdjacencyKind,
    pub next_hops: Vec<IpAddr>,    /* ExtraRoute only; >1 entry means ECMP */
    pub subnet: SubnetId,
}

impl Adjacency {
    #[must_use]
    pub fn primary(ip: IpNet, mac: MacAddress, subnet: SubnetId) -> Self {
        Self {
            ip,
            mac: Some(mac),
            kind: AdjacencyKind::Primary,
            next_hops: vec![],
            subnet,
        }
    }
    #[must_use]
    pub fn extra_route(destination: IpNet, next_hops: Vec<IpAddr>, subnet: SubnetId) -> Self {
        Self {
            ip: destination,
            mac: None,
            kind: AdjacencyKind::ExtraRoute,
            next_hops,
            subnet,
        }
    }
    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.kind == AdjacencyKind::Primary
    }
}

impl Display for Adjacency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            AdjacencyKind::Primary => write!(f, "primary {}", self.ip),
            AdjacencyKind::ExtraRoute => {
                write!(f, "extra-route {} via {:?}", self.ip, self.next_hops)
            }
        }
    }
}

/// A port's membership in one vpn instance, carrying its adjacency list.
/// Named after the port it represents.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VpnInterface {
    pub name: PortId,
    pub vpn: VpnId,
    pub router_interface: bool,
    pub adjacencies: Vec<Adjacency>,
}

impl VpnInterface {
    #[must_use]
    pub fn new(name: PortId, vpn: VpnId, router_interface: bool) -> Self {
        Self {
            name,
            vpn,
            router_interface,
            adjacencies: vec![],
        }
    }

    /// Tell if the interface already carries a primary adjacency for `ip`.
    /// At most one primary may exist per (port, fixed-ip).
    #[must_use]
    pub fn has_primary(&self, ip: &IpNet) -> bool {
        self.adjacencies
            .iter()
            .any(|a| a.is_primary() && a.ip == *ip)
    }

    /// Merge freshly built adjacencies into the interface. Primaries already
    /// present are skipped; an extra route to a known destination replaces
    /// the stored one (the next-hop set may have changed).
    pub fn merge(&mut self, built: Vec<Adjacency>) {
        for adjacency in built {
            match adjacency.kind {
                AdjacencyKind::Primary => {
                    if !self.has_primary(&adjacency.ip) {
                        self.adjacencies.push(adjacency);
                    }
                }
                AdjacencyKind::ExtraRoute => {
                    if let Some(stored) = self
                        .adjacencies
                        .iter_mut()
                        .find(|a| !a.is_primary() && a.ip == adjacency.ip)
                    {
                        *stored = adjacency;
                    } else {
                        self.adjacencies.push(adjacency);
                    }
                }
            }
        }
    }
}
