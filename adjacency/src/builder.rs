// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Pure computation of the adjacency list for one vpn interface, and its
//! inverse (withdrawal). All topology inputs arrive as explicit values; the
//! caller decides what to do with the result.

use crate::model::Adjacency;
use crate::neighbors::NeighborIndex;
use crate::topology::{Port, StaticRoute};
use crate::{SubnetId, VpnId};
use ipnet::IpNet;
use std::collections::{BTreeSet, HashSet};
use std::net::IpAddr;
use tracing::{debug, trace, warn};

/// What the builder needs to know about one subnet a port has a fixed ip on:
/// its cidr and the static routes of its owning router (empty when the
/// subnet has no router).
#[derive(Clone, Debug)]
pub struct SubnetContext {
    pub id: SubnetId,
    pub cidr: IpNet,
    pub routes: Vec<StaticRoute>,
}

impl SubnetContext {
    #[must_use]
    pub fn new(id: SubnetId, cidr: IpNet) -> Self {
        Self {
            id,
            cidr,
            routes: vec![],
        }
    }
    #[must_use]
    pub fn route(mut self, route: StaticRoute) -> Self {
        self.routes.push(route);
        self
    }
}

/// Inputs shared by every fixed ip of the port being built.
pub struct BuildContext<'a> {
    pub vpn: VpnId,
    pub subnets: &'a [SubnetContext],
    /// Inter-domain-link endpoints of *other* vpn instances. A static route
    /// through one of these is redirected via the routing RPC path and never
    /// materialized as a local adjacency.
    pub inter_domain_endpoints: &'a HashSet<IpAddr>,
    pub neighbors: &'a NeighborIndex,
}

/// Compute the adjacencies one port contributes to its vpn interface.
///
/// Emits a deduplicated primary per fixed ip (/32 or /128), registers the
/// fixed ip in the neighbor index, and emits at most one extra-route
/// adjacency per static-route destination carrying every resolvable next
/// hop (ECMP). When several local ports can reach a destination, the port
/// holding the lowest next-hop ip owns the adjacency.
#[must_use]
pub fn build(
    ctx: &BuildContext<'_>,
    port: &Port,
    is_router_interface: bool,
    existing: &[Adjacency],
    subnet_filter: Option<SubnetId>,
) -> Vec<Adjacency> {
    let mut built: Vec<Adjacency> = vec![];
    let filter_cidr = subnet_filter
        .and_then(|id| ctx.subnets.iter().find(|s| s.id == id))
        .map(|s| s.cidr);

    for fixed in &port.fixed_ips {
        if let Some(cidr) = filter_cidr {
            if !cidr.contains(&fixed.ip) {
                trace!("skipping fixed ip {} outside filter {cidr}", fixed.ip);
                continue;
            }
        }
        let Some(subnet) = ctx.subnets.iter().find(|s| s.id == fixed.subnet) else {
            warn!(
                "port {} has fixed ip {} on unknown subnet {}",
                port.id, fixed.ip, fixed.subnet
            );
            continue;
        };

        /* primary adjacency: host prefix, deduplicated for idempotence */
        let prefix = IpNet::from(fixed.ip);
        let present = existing
            .iter()
            .chain(built.iter())
            .any(|a| a.is_primary() && a.ip == prefix);
        if !present {
            built.push(Adjacency::primary(prefix, port.mac, subnet.id));
        }

        /* make the fixed ip resolvable as an extra-route next hop */
        ctx.neighbors.add(ctx.vpn, fixed.ip, port.id, port.mac);

        /* extra routes anchored at this fixed ip */
        let mut destinations = BTreeSet::new();
        for route in subnet.routes.iter().filter(|r| r.next_hop == fixed.ip) {
            if !destinations.insert(route.destination) {
                continue;
            }
            /* every next hop toward this destination, ECMP-grouped; one
             * destination never splits into several adjacency entries */
            let mut hops: Vec<IpAddr> = subnet
                .routes
                .iter()
                .filter(|r| r.destination == route.destination)
                .map(|r| r.next_hop)
                .filter(|nh| !ctx.inter_domain_endpoints.contains(nh))
                .filter(|nh| *nh == fixed.ip || ctx.neighbors.resolves(ctx.vpn, *nh))
                .collect();
            hops.sort_unstable();
            hops.dedup();
            let Some(anchor) = hops.first() else {
                debug!(
                    "route to {} has no local next hop, leaving it to the rpc path",
                    route.destination
                );
                continue;
            };
            if *anchor != fixed.ip {
                /* the interface holding the anchor hop owns this one */
                continue;
            }
            built.push(Adjacency::extra_route(route.destination, hops, subnet.id));
        }
    }
    debug!(
        "built {} adjacencies for port {} (router-interface: {is_router_interface})",
        built.len(),
        port.id
    );
    built
}

/// Outcome of withdrawing one subnet from an interface.
#[derive(Debug, PartialEq)]
pub enum Withdrawal {
    /// Nothing remains from other subnets; the interface can be deleted.
    RemoveInterface,
    /// The reduced adjacency set the interface must keep.
    Keep(Vec<Adjacency>),
}

/// Drop every adjacency tied to `subnet`. A withdrawn primary also leaves
/// the neighbor index, and its ip is stripped from every remaining
/// extra-route next-hop list (the adjacency goes away with its last hop).
#[must_use]
pub fn withdraw(
    vpn: VpnId,
    subnet: SubnetId,
    current: &[Adjacency],
    neighbors: &NeighborIndex,
) -> Withdrawal {
    let mut gone_ips: Vec<IpAddr> = vec![];
    let mut kept: Vec<Adjacency> = vec![];
    for adjacency in current {
        if adjacency.subnet == subnet {
            if adjacency.is_primary() {
                let ip = adjacency.ip.addr();
                neighbors.remove(vpn, ip);
                gone_ips.push(ip);
            }
            continue;
        }
        kept.push(adjacency.clone());
    }
    let kept: Vec<Adjacency> = kept
        .into_iter()
        .filter_map(|mut adjacency| {
            if adjacency.is_primary() {
                return Some(adjacency);
            }
            adjacency.next_hops.retain(|nh| !gone_ips.contains(nh));
            if adjacency.next_hops.is_empty() {
                debug!("extra route {} lost its last next hop", adjacency.ip);
                None
            } else {
                Some(adjacency)
            }
        })
        .collect();
    if kept.is_empty() {
        Withdrawal::RemoveInterface
    } else {
        Withdrawal::Keep(kept)
    }
}
