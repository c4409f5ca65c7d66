// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Explicit read-through cache of upstream topology state: ports, routers,
//! networks and inter-vpn links. Populated by the create/update hooks of the
//! event dispatch and invalidated by the delete hooks; nothing else writes
//! to it.

use adjacency::{NetworkId, Port, PortId, RouterId, StaticRoute, SubnetId, VpnId};
use dashmap::DashMap;
use mac_address::MacAddress;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::IpAddr;

/// Fabric type of a tenant network, carried on notifications.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkTopology {
    Flat,
    Vlan,
    #[default]
    Vxlan,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetworkEntry {
    pub id: NetworkId,
    pub external: bool,
    pub topology: NetworkTopology,
}

/// One router interface (gateway) as reported with the router.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouterInterface {
    pub subnet: SubnetId,
    pub port: PortId,
    pub ip: IpAddr,
    pub mac: MacAddress,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouterEntry {
    pub id: RouterId,
    pub routes: Vec<StaticRoute>,
    pub interfaces: Vec<RouterInterface>,
}

impl RouterEntry {
    #[must_use]
    pub fn new(id: RouterId) -> Self {
        Self {
            id,
            routes: vec![],
            interfaces: vec![],
        }
    }
    #[must_use]
    pub fn route(mut self, route: StaticRoute) -> Self {
        self.routes.push(route);
        self
    }
    #[must_use]
    pub fn interface(mut self, interface: RouterInterface) -> Self {
        self.interfaces.push(interface);
        self
    }
}

/// A configured route-leak point between two vpn instances. Traffic whose
/// next hop is one of the endpoints is redirected by the routing RPC path,
/// outside this crate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InterVpnLink {
    pub name: String,
    pub first_vpn: VpnId,
    pub first_endpoint: IpAddr,
    pub second_vpn: VpnId,
    pub second_endpoint: IpAddr,
}

#[derive(Default)]
pub struct TopologyCache {
    ports: DashMap<PortId, Port>,
    routers: DashMap<RouterId, RouterEntry>,
    networks: DashMap<NetworkId, NetworkEntry>,
    links: DashMap<String, InterVpnLink>,
}

impl TopologyCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /* population hooks (create/update) */
    pub fn port_upserted(&self, port: Port) {
        self.ports.insert(port.id, port);
    }
    pub fn router_upserted(&self, router: RouterEntry) {
        self.routers.insert(router.id, router);
    }
    pub fn network_upserted(&self, network: NetworkEntry) {
        self.networks.insert(network.id, network);
    }
    pub fn link_upserted(&self, link: InterVpnLink) {
        self.links.insert(link.name.clone(), link);
    }

    /* invalidation hooks (delete) */
    pub fn port_deleted(&self, port: PortId) -> Option<Port> {
        self.ports.remove(&port).map(|(_, p)| p)
    }
    pub fn router_deleted(&self, router: RouterId) -> Option<RouterEntry> {
        self.routers.remove(&router).map(|(_, r)| r)
    }
    pub fn network_deleted(&self, network: NetworkId) -> Option<NetworkEntry> {
        self.networks.remove(&network).map(|(_, n)| n)
    }
    pub fn link_deleted(&self, name: &str) -> Option<InterVpnLink> {
        self.links.remove(name).map(|(_, l)| l)
    }

    /* readers */
    #[must_use]
    pub fn get_port(&self, port: PortId) -> Option<Port> {
        self.ports.get(&port).map(|e| e.value().clone())
    }
    #[must_use]
    pub fn get_router(&self, router: RouterId) -> Option<RouterEntry> {
        self.routers.get(&router).map(|e| e.value().clone())
    }
    #[must_use]
    pub fn get_network(&self, network: NetworkId) -> Option<NetworkEntry> {
        self.networks.get(&network).map(|e| e.value().clone())
    }

    /// Static routes of the given router; empty when routerless or unknown.
    #[must_use]
    pub fn routes_of(&self, router: Option<RouterId>) -> Vec<StaticRoute> {
        router
            .and_then(|r| self.routers.get(&r))
            .map(|e| e.value().routes.clone())
            .unwrap_or_default()
    }

    /// Inter-vpn-link endpoint ips belonging to vpn instances other than
    /// `vpn`. Static routes through any of these are never materialized as
    /// local adjacencies; the vpn's own endpoints stay resolvable.
    #[must_use]
    pub fn inter_domain_endpoints(&self, vpn: VpnId) -> HashSet<IpAddr> {
        let mut endpoints = HashSet::new();
        for entry in self.links.iter() {
            let link = entry.value();
            if link.first_vpn != vpn {
                endpoints.insert(link.first_endpoint);
            }
            if link.second_vpn != vpn {
                endpoints.insert(link.second_endpoint);
            }
        }
        endpoints
    }
}
