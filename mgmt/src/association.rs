// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The association orchestrator: the state machine driving subnet-to-vpn
//! and router-to-vpn membership. Registry commits happen synchronously
//! (phase 1) and return a typed [`SubnetCommit`]; adjacency computation
//! (phase 2) consumes only that value, from per-port serialized jobs.

use crate::cache::{RouterEntry, TopologyCache};
use crate::errors::{ApiError, ApiResult};
use crate::notify::{Notifier, SubnetInVpn, VpnNotification};
use adjacency::topology::OWNER_ROUTER_INTERFACE;
use adjacency::{
    BuildContext, NeighborIndex, NetworkId, Port, PortId, RouterId, SubnetContext, SubnetId,
    TenantId, VpnId, VpnInterface, Withdrawal, build, withdraw,
};
use ipnet::IpNet;
use jobq::{JobHandle, JobQueue, JobResult, NamedLocks};
use registry::{
    Datastore, IpFamily, RegistryError, Subnetmap, SubnetmapTable, TargetKind, VpnInstanceBuilder,
    VpnInterfaceTable, VpnTable, VpnTarget,
};
use std::collections::{BTreeSet, HashSet};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Budget for the advisory vpn lock guarding map read-modify-writes.
const LOCK_BUDGET: Duration = Duration::from_secs(5);

/// Phase-1 result of committing a subnet to a vpn. Carries everything the
/// per-port jobs need, so phase 2 cannot observe registry state older than
/// the commit.
#[derive(Clone, Debug)]
pub struct SubnetCommit {
    pub vpn: VpnId,
    pub subnet: SubnetId,
    pub cidr: IpNet,
    /// Builder context for the committed subnet (cidr + router routes).
    pub contexts: Vec<SubnetContext>,
    pub inter_domain_endpoints: HashSet<IpAddr>,
    /// Regular ports on the subnet, resolved against the topology cache.
    pub ports: Vec<Port>,
    /// The subnet's gateway port, moved synchronously ahead of the others.
    pub router_interface: Option<Port>,
    pub payload: SubnetInVpn,
}

/// Handles of the jobs one association operation dispatched. Production
/// callers may drop the ticket; tests and supervisors await it.
#[derive(Default)]
pub struct AssociationTicket {
    pub jobs: Vec<JobHandle>,
}

impl AssociationTicket {
    /// Wait for every dispatched job and collect the outcomes.
    pub async fn join(self) -> Vec<JobResult> {
        let mut results = Vec::with_capacity(self.jobs.len());
        for job in self.jobs {
            results.push(job.wait().await);
        }
        results
    }
    pub fn extend(&mut self, other: AssociationTicket) {
        self.jobs.extend(other.jobs);
    }
}

/// One entry of a batch vpn-creation request.
#[derive(Clone, Debug)]
pub struct VpnCreateRequest {
    pub id: VpnId,
    pub name: String,
    pub tenant: Option<TenantId>,
    pub route_distinguishers: Vec<String>,
    pub import_rts: Vec<String>,
    pub export_rts: Vec<String>,
    pub l3vni: Option<u32>,
    pub router: Option<RouterId>,
    pub networks: Vec<NetworkId>,
}

/// Structured response of a batch operation: per-item failures instead of a
/// thrown error, so partial success is possible across the batch.
pub struct BatchOutcome<K> {
    pub failures: Vec<(K, ApiError)>,
    pub ticket: AssociationTicket,
}

impl<K> Default for BatchOutcome<K> {
    fn default() -> Self {
        Self {
            failures: vec![],
            ticket: AssociationTicket::default(),
        }
    }
}

impl<K: std::fmt::Display> BatchOutcome<K> {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.failures
            .iter()
            .map(|(key, err)| format!("{key}: {err}"))
            .collect()
    }
}

pub struct VpnManager {
    subnets: SubnetmapTable,
    vpns: VpnTable,
    interfaces: Arc<VpnInterfaceTable>,
    neighbors: Arc<NeighborIndex>,
    cache: TopologyCache,
    jobs: JobQueue,
    locks: NamedLocks,
    notifier: Notifier,
}

impl Default for VpnManager {
    fn default() -> Self {
        Self::new()
    }
}

impl VpnManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            subnets: SubnetmapTable::new(),
            vpns: VpnTable::new(),
            interfaces: Arc::new(VpnInterfaceTable::new()),
            neighbors: Arc::new(NeighborIndex::new()),
            cache: TopologyCache::new(),
            jobs: JobQueue::new(),
            locks: NamedLocks::new(),
            notifier: Notifier::default(),
        }
    }

    #[must_use]
    pub fn subnets(&self) -> &SubnetmapTable {
        &self.subnets
    }
    #[must_use]
    pub fn vpns(&self) -> &VpnTable {
        &self.vpns
    }
    #[must_use]
    pub fn interfaces(&self) -> &VpnInterfaceTable {
        &self.interfaces
    }
    #[must_use]
    pub fn neighbors(&self) -> &NeighborIndex {
        &self.neighbors
    }
    #[must_use]
    pub fn cache(&self) -> &TopologyCache {
        &self.cache
    }
    #[must_use]
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /* ---- subnet-level association ---- */

    /// Associate one subnet with a vpn: commit the registry state, move the
    /// gateway port synchronously, then dispatch one build job per port.
    /// Calling this twice for the same pair converges to the same adjacency
    /// state (primary dedup).
    pub async fn add_subnet_to_vpn(
        &self,
        vpn: VpnId,
        subnet: SubnetId,
    ) -> ApiResult<AssociationTicket> {
        self.vpns.get_instance(vpn)?;
        let current = self.subnets.get(subnet)?;
        if let Some(owner) = current.vpn {
            if owner != vpn {
                return Err(ApiError::SubnetAlreadyInVpn(subnet, owner));
            }
        }
        /* expose the subnet's address family before any interface exists */
        self.bump_ip_family(vpn, current.cidr)?;

        let commit = Arc::new(self.commit_subnet(vpn, subnet)?);
        let ticket = self.dispatch_attach(&commit, None)?;
        self.notifier
            .publish(VpnNotification::SubnetAddedToVpn(commit.payload.clone()));
        info!("subnet {subnet} added to vpn {vpn}");
        Ok(ticket)
    }

    /// Remove one subnet from its vpn: dispatch a withdrawal job per port,
    /// then clear the membership and recompute the address-family set.
    pub async fn remove_subnet_from_vpn(
        &self,
        vpn: VpnId,
        subnet: SubnetId,
    ) -> ApiResult<AssociationTicket> {
        let map = self.subnets.get(subnet)?;
        if map.vpn != Some(vpn) {
            return Err(ApiError::SubnetNotInVpn(subnet, vpn));
        }
        let payload = self.subnet_payload(&map, vpn);
        let mut ticket = AssociationTicket::default();
        for port in Self::all_port_ids(&map) {
            ticket.jobs.push(self.spawn_withdraw(vpn, subnet, port));
        }
        self.subnets.clear_vpn(subnet)?;
        /* recompute after removal: the vpn must never be observed with zero
         * address families while an interface still references it */
        self.recompute_ip_family(vpn)?;
        self.notifier
            .publish(VpnNotification::SubnetRemovedFromVpn(payload));
        info!("subnet {subnet} removed from vpn {vpn}");
        Ok(ticket)
    }

    /// Move a subnet between vpns. The router-interface port moves
    /// synchronously first; dependent port moves assume the gateway
    /// adjacency already exists under the new vpn. Its failure aborts the
    /// whole call.
    pub async fn update_vpn_for_subnet(
        &self,
        old_vpn: Option<VpnId>,
        new_vpn: VpnId,
        subnet: SubnetId,
        is_being_associated: bool,
    ) -> ApiResult<AssociationTicket> {
        if is_being_associated {
            let map = self.subnets.get(subnet)?;
            self.bump_ip_family(new_vpn, map.cidr)?;
        }
        let commit = Arc::new(self.commit_subnet(new_vpn, subnet)?);
        let ticket = self.dispatch_attach(&commit, old_vpn)?;
        if let Some(old) = old_vpn {
            if !is_being_associated {
                self.recompute_ip_family(old)?;
            }
        }
        self.notifier
            .publish(VpnNotification::SubnetUpdatedInVpn(commit.payload.clone()));
        Ok(ticket)
    }

    /* ---- router-level association ---- */

    /// Associate every subnet of a router with the given vpn. Conflicts with
    /// an existing binding surface as a non-fatal error to the caller.
    pub async fn associate_router_to_vpn(
        &self,
        vpn: VpnId,
        router: RouterId,
    ) -> ApiResult<AssociationTicket> {
        self.vpns.get_instance(vpn)?;
        let _guard = self.locks.try_lock(&vpn.to_string(), LOCK_BUDGET).await?;
        if let Some(bound) = self.vpns.vpn_of_router(router) {
            /* the internal vpn (named by the router id) is the default
             * domain, not a user association */
            if bound != vpn && bound != router {
                warn!("router {router} is already bound to vpn {bound}");
                return Err(ApiError::RouterAlreadyAssociated {
                    router,
                    vpn: bound,
                });
            }
        }
        self.vpns.upsert_map(vpn, None, None, Some(router), &[])?;
        let mut ticket = AssociationTicket::default();
        for map in self.subnets.on_router(router) {
            ticket.extend(
                self.update_vpn_for_subnet(map.vpn, vpn, map.id, true)
                    .await?,
            );
        }
        info!("router {router} associated with vpn {vpn}");
        Ok(ticket)
    }

    /// Undo [`Self::associate_router_to_vpn`]: every member subnet returns
    /// to the router's internal vpn when one exists, or to no vpn at all.
    pub async fn dissociate_router_from_vpn(
        &self,
        vpn: VpnId,
        router: RouterId,
    ) -> ApiResult<AssociationTicket> {
        let _guard = self.locks.try_lock(&vpn.to_string(), LOCK_BUDGET).await?;
        if self.vpns.vpn_of_router(router) != Some(vpn) {
            return Err(ApiError::RouterNotAssociated(router, vpn));
        }
        /* the router's default domain, when it was implicitly created */
        let internal = self.vpns.get_instance(router).ok().map(|i| i.name);
        let mut ticket = AssociationTicket::default();
        for map in self.subnets.on_router(router) {
            match internal {
                Some(internal_vpn) => ticket.extend(
                    self.update_vpn_for_subnet(Some(vpn), internal_vpn, map.id, false)
                        .await?,
                ),
                None => ticket.extend(self.remove_subnet_from_vpn(vpn, map.id).await?),
            }
        }
        self.vpns.clear_map(vpn, Some(router), &[])?;
        info!("router {router} dissociated from vpn {vpn}");
        Ok(ticket)
    }

    /* ---- network-level association (batch) ---- */

    pub async fn associate_networks(
        &self,
        vpn: VpnId,
        networks: &[NetworkId],
    ) -> ApiResult<BatchOutcome<NetworkId>> {
        self.vpns.get_instance(vpn)?;
        let _guard = self.locks.try_lock(&vpn.to_string(), LOCK_BUDGET).await?;
        let mut outcome = BatchOutcome::default();
        for network in networks {
            if let Some(owner) = self.vpns.vpn_of_network(*network) {
                if owner != vpn {
                    outcome.failures.push((
                        *network,
                        ApiError::NetworkAlreadyAssociated(*network, owner),
                    ));
                    continue;
                }
            }
            self.vpns.upsert_map(vpn, None, None, None, &[*network])?;
            for map in self.subnets.on_network(*network) {
                match self.add_subnet_to_vpn(vpn, map.id).await {
                    Ok(ticket) => outcome.ticket.extend(ticket),
                    Err(err) => {
                        error!("failed to add subnet {} to vpn {vpn}: {err}", map.id);
                        outcome.failures.push((*network, err));
                    }
                }
            }
        }
        Ok(outcome)
    }

    pub async fn dissociate_networks(
        &self,
        vpn: VpnId,
        networks: &[NetworkId],
    ) -> ApiResult<BatchOutcome<NetworkId>> {
        let _guard = self.locks.try_lock(&vpn.to_string(), LOCK_BUDGET).await?;
        let mut outcome = BatchOutcome::default();
        for network in networks {
            if self.vpns.vpn_of_network(*network) != Some(vpn) {
                outcome
                    .failures
                    .push((*network, ApiError::NetworkNotAssociated(*network, vpn)));
                continue;
            }
            for map in self.subnets.on_network(*network) {
                if map.vpn != Some(vpn) {
                    continue;
                }
                match self.remove_subnet_from_vpn(vpn, map.id).await {
                    Ok(ticket) => outcome.ticket.extend(ticket),
                    Err(err) => outcome.failures.push((*network, err)),
                }
            }
            self.vpns.clear_map(vpn, None, &[*network])?;
        }
        Ok(outcome)
    }

    /* ---- vpn lifecycle ---- */

    pub async fn create_vpns(&self, requests: Vec<VpnCreateRequest>) -> BatchOutcome<VpnId> {
        let mut outcome = BatchOutcome::default();
        for request in requests {
            let vpn = request.id;
            if let Err(err) = self.create_one_vpn(request, &mut outcome).await {
                outcome.failures.push((vpn, err));
            }
        }
        outcome
    }

    async fn create_one_vpn(
        &self,
        request: VpnCreateRequest,
        outcome: &mut BatchOutcome<VpnId>,
    ) -> ApiResult {
        let vpn = request.id;
        if self.vpns.get_instance(vpn).is_ok() {
            return Err(ApiError::VpnAlreadyExists(vpn));
        }
        let mut targets: Vec<VpnTarget> = request
            .import_rts
            .iter()
            .map(|rt| VpnTarget::new(rt, TargetKind::Import))
            .collect();
        targets.extend(
            request
                .export_rts
                .iter()
                .map(|rt| VpnTarget::new(rt, TargetKind::Export)),
        );
        let instance = VpnInstanceBuilder::default()
            .name(vpn)
            .route_distinguishers(request.route_distinguishers.clone())
            .targets(targets)
            .l3vni(request.l3vni)
            .build()
            .map_err(|e| RegistryError::TransactionFailure(e.to_string()))?;
        self.vpns.upsert_instance(instance)?;
        self.vpns
            .upsert_map(vpn, Some(&request.name), request.tenant, None, &[])?;
        if let Some(router) = request.router {
            outcome
                .ticket
                .extend(self.associate_router_to_vpn(vpn, router).await?);
        }
        if !request.networks.is_empty() {
            let nets = self.associate_networks(vpn, &request.networks).await?;
            outcome.ticket.extend(nets.ticket);
            outcome
                .failures
                .extend(nets.failures.into_iter().map(|(_, err)| (vpn, err)));
        }
        info!("created vpn {vpn} ('{}')", request.name);
        Ok(())
    }

    /// Delete a vpn. Refused while subnet, router or network associations
    /// remain.
    pub fn delete_vpn(&self, vpn: VpnId) -> ApiResult {
        if self.subnets.values().iter().any(|m| m.vpn == Some(vpn)) {
            return Err(ApiError::Registry(RegistryError::VpnInUse(vpn)));
        }
        self.vpns.delete_instance(vpn)?;
        match self.vpns.delete_map(vpn) {
            Ok(()) | Err(RegistryError::NoSuchVpnMap(_)) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /* ---- port lifecycle ---- */

    /// Attach one port to a subnet. When the subnet is already part of a
    /// vpn, a single incremental build job is dispatched for the port.
    pub async fn port_added_to_subnet(
        &self,
        port: &Port,
        subnet: SubnetId,
    ) -> ApiResult<Option<JobHandle>> {
        self.cache.port_upserted(port.clone());
        self.subnets.add_port(subnet, port.id, port.is_direct())?;
        let map = match self.subnets.get(subnet) {
            Ok(map) => map,
            /* subnet not seen yet: the port sits in the pending map */
            Err(RegistryError::NoSuchSubnetmap(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let Some(vpn) = map.vpn else {
            return Ok(None);
        };
        let commit = Arc::new(self.commit_subnet(vpn, subnet)?);
        let handle = self.spawn_reconcile(&commit, port.clone(), None, Some(subnet));
        self.notifier.publish(VpnNotification::PortAddedToSubnet(
            commit.payload.clone(),
            port.id,
        ));
        Ok(Some(handle))
    }

    /// Detach one port from a subnet, withdrawing its adjacencies when the
    /// subnet is in a vpn.
    pub async fn port_removed_from_subnet(
        &self,
        port: PortId,
        subnet: SubnetId,
    ) -> ApiResult<Option<JobHandle>> {
        self.subnets.remove_port(subnet, port, true)?;
        let map = self.subnets.get(subnet)?;
        let Some(vpn) = map.vpn else {
            return Ok(None);
        };
        let handle = self.spawn_withdraw(vpn, subnet, port);
        self.notifier.publish(VpnNotification::PortRemovedFromSubnet(
            self.subnet_payload(&map, vpn),
            port,
        ));
        Ok(Some(handle))
    }

    /// A port's fixed-ip set changed: dispatch one incremental job per
    /// subnet the port now sits on. Jobs for the same port serialize, so
    /// concurrent updates converge on the state implied by the final set.
    pub async fn refresh_port(&self, port: &Port) -> ApiResult<AssociationTicket> {
        self.cache.port_upserted(port.clone());
        let mut ticket = AssociationTicket::default();
        let subnets: BTreeSet<SubnetId> = port.fixed_ips.iter().map(|f| f.subnet).collect();
        for subnet in subnets {
            let map = match self.subnets.get(subnet) {
                Ok(map) => map,
                Err(RegistryError::NoSuchSubnetmap(_)) => continue,
                Err(err) => return Err(err.into()),
            };
            let Some(vpn) = map.vpn else { continue };
            let commit = Arc::new(self.commit_subnet(vpn, subnet)?);
            ticket
                .jobs
                .push(self.spawn_reconcile(&commit, port.clone(), None, Some(subnet)));
        }
        Ok(ticket)
    }

    /// A port disappeared entirely: withdraw it from every subnet it was
    /// attached to. Already-deleted subnets are tolerated.
    pub async fn port_deleted(&self, port: PortId) -> ApiResult<AssociationTicket> {
        let mut ticket = AssociationTicket::default();
        let Some(old) = self.cache.port_deleted(port) else {
            return Ok(ticket);
        };
        let subnets: BTreeSet<SubnetId> = old.fixed_ips.iter().map(|f| f.subnet).collect();
        for subnet in subnets {
            match self.port_removed_from_subnet(port, subnet).await {
                Ok(Some(handle)) => ticket.jobs.push(handle),
                Ok(None) | Err(ApiError::Registry(RegistryError::NoSuchSubnetmap(_))) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(ticket)
    }

    /// Full port update: attach to subnets gained, refresh subnets kept,
    /// withdraw from subnets lost. The per-port key serializes this with
    /// any association job already in flight.
    pub async fn port_updated(&self, port: &Port) -> ApiResult<AssociationTicket> {
        let before: BTreeSet<SubnetId> = self
            .cache
            .get_port(port.id)
            .map(|old| old.fixed_ips.iter().map(|f| f.subnet).collect())
            .unwrap_or_default();
        let now: BTreeSet<SubnetId> = port.fixed_ips.iter().map(|f| f.subnet).collect();
        for subnet in now.difference(&before) {
            self.subnets.add_port(*subnet, port.id, port.is_direct())?;
        }
        let mut ticket = self.refresh_port(port).await?;
        for subnet in before.difference(&now) {
            match self.port_removed_from_subnet(port.id, *subnet).await {
                Ok(Some(handle)) => ticket.jobs.push(handle),
                Ok(None) | Err(ApiError::Registry(RegistryError::NoSuchSubnetmap(_))) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(ticket)
    }

    /* ---- router lifecycle ---- */

    /// The subnet gained its gateway port: record it, and when the subnet
    /// is already in a vpn apply the gateway interface synchronously.
    pub async fn router_interface_added(
        &self,
        router: RouterId,
        subnet: SubnetId,
        port: &Port,
    ) -> ApiResult {
        let ip = port
            .ip_on_subnet(subnet)
            .ok_or(ApiError::UnknownPort(port.id))?;
        self.cache.port_upserted(port.clone());
        self.subnets.update(subnet, Some(router), None)?;
        self.subnets
            .set_router_interface(subnet, port.id, ip, port.mac)?;
        let map = self.subnets.get(subnet)?;
        if let Some(vpn) = map.vpn {
            let commit = Arc::new(self.commit_subnet(vpn, subnet)?);
            if let Some(gateway) = &commit.router_interface {
                reconcile_port(&self.interfaces, &self.neighbors, &commit, gateway, None)?;
            }
        }
        Ok(())
    }

    /// The subnet lost its gateway port: withdraw the gateway interface
    /// and detach the subnet from its router.
    pub async fn router_interface_removed(
        &self,
        subnet: SubnetId,
        port: PortId,
    ) -> ApiResult<Option<JobHandle>> {
        let map = self.subnets.get(subnet)?;
        let handle = map.vpn.map(|vpn| self.spawn_withdraw(vpn, subnet, port));
        self.subnets.clear_router_interface(subnet)?;
        self.subnets.clear_router(subnet)?;
        Ok(handle)
    }

    /// Router static routes changed: rebuild the adjacencies of every vpn
    /// subnet behind the router. Extra routes whose destination vanished
    /// from the route set are dropped during reconciliation.
    pub async fn router_updated(&self, entry: RouterEntry) -> ApiResult<AssociationTicket> {
        let router = entry.id;
        for gateway in &entry.interfaces {
            match self.subnets.update(gateway.subnet, Some(router), None) {
                Ok(_) => {
                    self.subnets.set_router_interface(
                        gateway.subnet,
                        gateway.port,
                        gateway.ip,
                        gateway.mac,
                    )?;
                }
                /* the subnet may not have been seen yet */
                Err(RegistryError::NoSuchSubnetmap(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }
        self.cache.router_upserted(entry);
        let mut ticket = AssociationTicket::default();
        for map in self.subnets.on_router(router) {
            let Some(vpn) = map.vpn else { continue };
            let commit = Arc::new(self.commit_subnet(vpn, map.id)?);
            ticket.extend(self.dispatch_attach(&commit, None)?);
        }
        Ok(ticket)
    }

    /// Router deleted: withdraw every gateway interface it held and detach
    /// its subnets.
    pub async fn router_deleted(&self, router: RouterId) -> ApiResult<AssociationTicket> {
        self.cache.router_deleted(router);
        let mut ticket = AssociationTicket::default();
        for map in self.subnets.on_router(router) {
            if let (Some(port), Some(vpn)) = (map.router_interface_port, map.vpn) {
                ticket.jobs.push(self.spawn_withdraw(vpn, map.id, port));
            }
            self.subnets.clear_router_interface(map.id)?;
            self.subnets.clear_router(map.id)?;
        }
        Ok(ticket)
    }

    /// Delete a subnet record, withdrawing its vpn state first.
    pub async fn subnet_deleted(&self, subnet: SubnetId) -> ApiResult<AssociationTicket> {
        let map = self.subnets.get(subnet)?;
        let ticket = match map.vpn {
            Some(vpn) => self.remove_subnet_from_vpn(vpn, subnet).await?,
            None => AssociationTicket::default(),
        };
        self.subnets.delete(subnet)?;
        Ok(ticket)
    }

    /* ---- internals ---- */

    /// Phase 1: record the membership, snapshot everything phase 2 needs
    /// and pre-register every port primary in the neighbor index so ECMP
    /// anchor election does not depend on job interleaving.
    fn commit_subnet(&self, vpn: VpnId, subnet: SubnetId) -> ApiResult<SubnetCommit> {
        let map = self.subnets.update(subnet, None, Some(vpn))?;
        let context = SubnetContext {
            id: subnet,
            cidr: map.cidr,
            routes: self.cache.routes_of(map.router),
        };
        let mut ports = vec![];
        let mut router_interface = None;
        for id in Self::all_port_ids(&map) {
            let Some(port) = self.cache.get_port(id) else {
                warn!("port {id} on subnet {subnet} is unknown to the cache, skipping");
                continue;
            };
            if map.router_interface_port == Some(id) || port.is_router_interface() {
                router_interface = Some(port);
            } else {
                ports.push(port);
            }
        }
        /* the gateway port may have skipped the port list entirely */
        if router_interface.is_none() {
            if let (Some(port), Some(ip), Some(mac)) = (
                map.router_interface_port,
                map.router_interface_ip,
                map.router_interface_mac,
            ) {
                router_interface =
                    Some(Port::new(port, mac, OWNER_ROUTER_INTERFACE).fixed_ip(ip, subnet));
            }
        }
        for port in ports.iter().chain(router_interface.iter()) {
            for fixed in port.fixed_ips.iter().filter(|f| f.subnet == subnet) {
                self.neighbors.add(vpn, fixed.ip, port.id, port.mac);
            }
        }
        let payload = self.subnet_payload(&map, vpn);
        Ok(SubnetCommit {
            vpn,
            subnet,
            cidr: map.cidr,
            contexts: vec![context],
            inter_domain_endpoints: self.cache.inter_domain_endpoints(vpn),
            ports,
            router_interface,
            payload,
        })
    }

    /// Phase 2 dispatch: synchronous gateway move first (withdrawing from
    /// `old_vpn` when moving), then one job per remaining port.
    fn dispatch_attach(
        &self,
        commit: &Arc<SubnetCommit>,
        old_vpn: Option<VpnId>,
    ) -> ApiResult<AssociationTicket> {
        if let Some(gateway) = &commit.router_interface {
            if let Some(old) = old_vpn {
                withdraw_port(&self.interfaces, &self.neighbors, old, commit.subnet, gateway.id)?;
            }
            reconcile_port(&self.interfaces, &self.neighbors, commit, gateway, None)?;
        }
        let mut ticket = AssociationTicket::default();
        for port in &commit.ports {
            ticket
                .jobs
                .push(self.spawn_reconcile(commit, port.clone(), old_vpn, None));
        }
        Ok(ticket)
    }

    fn spawn_reconcile(
        &self,
        commit: &Arc<SubnetCommit>,
        port: Port,
        old_vpn: Option<VpnId>,
        filter: Option<SubnetId>,
    ) -> JobHandle {
        let interfaces = self.interfaces.clone();
        let neighbors = self.neighbors.clone();
        let commit = commit.clone();
        let key = port.id.to_string();
        self.jobs.enqueue(&key, async move {
            if let Some(old) = old_vpn {
                withdraw_port(&interfaces, &neighbors, old, commit.subnet, port.id)
                    .map_err(|e| e.to_string())?;
            }
            reconcile_port(&interfaces, &neighbors, &commit, &port, filter)
                .map_err(|e| e.to_string())
        })
    }

    fn spawn_withdraw(&self, vpn: VpnId, subnet: SubnetId, port: PortId) -> JobHandle {
        let interfaces = self.interfaces.clone();
        let neighbors = self.neighbors.clone();
        self.jobs.enqueue(&port.to_string(), async move {
            withdraw_port(&interfaces, &neighbors, vpn, subnet, port).map_err(|e| e.to_string())
        })
    }

    fn all_port_ids(map: &Subnetmap) -> Vec<PortId> {
        let mut ids: Vec<PortId> = vec![];
        for id in map
            .ports
            .iter()
            .chain(map.direct_ports.iter())
            .chain(map.router_interface_port.iter())
        {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }
        ids
    }

    fn subnet_payload(&self, map: &Subnetmap, vpn: VpnId) -> SubnetInVpn {
        let topology = self
            .cache
            .get_network(map.network)
            .map(|n| n.topology)
            .unwrap_or_default();
        SubnetInVpn {
            subnet: map.id,
            cidr: map.cidr,
            vpn,
            external_vpn: self.is_external_vpn(vpn),
            topology,
        }
    }

    /// A vpn is external when one of its member networks is an external
    /// (provider) network.
    #[must_use]
    pub fn is_external_vpn(&self, vpn: VpnId) -> bool {
        self.vpns
            .get_map(vpn)
            .ok()
            .and_then(|map| map.networks)
            .is_some_and(|networks| {
                networks
                    .iter()
                    .any(|n| self.cache.get_network(*n).is_some_and(|e| e.external))
            })
    }

    /// Widen the vpn's address-family set with the family of `cidr`.
    fn bump_ip_family(&self, vpn: VpnId, cidr: IpNet) -> ApiResult {
        self.vpns.widen_ip_family(vpn, family_of(cidr))?;
        Ok(())
    }

    /// Recompute the derived address-family set from the member subnets.
    fn recompute_ip_family(&self, vpn: VpnId) -> ApiResult {
        let family = self
            .subnets
            .values()
            .into_iter()
            .filter(|m| m.vpn == Some(vpn))
            .fold(IpFamily::empty(), |acc, m| acc | family_of(m.cidr));
        self.vpns.set_ip_family(vpn, family)?;
        Ok(())
    }
}

fn family_of(cidr: IpNet) -> IpFamily {
    match cidr {
        IpNet::V4(_) => IpFamily::V4,
        IpNet::V6(_) => IpFamily::V6,
    }
}

/// Reconcile one port's interface against a subnet commit: prune primaries
/// the port no longer holds on that subnet, build the missing adjacencies,
/// persist and mark applied. Runs either synchronously (gateway port) or as
/// the body of a keyed job.
fn reconcile_port(
    interfaces: &VpnInterfaceTable,
    neighbors: &NeighborIndex,
    commit: &SubnetCommit,
    port: &Port,
    filter: Option<SubnetId>,
) -> Result<(), RegistryError> {
    let mut iface = interfaces
        .read(Datastore::Config, port.id)?
        .unwrap_or_else(|| VpnInterface::new(port.id, commit.vpn, port.is_router_interface()));
    iface.vpn = commit.vpn;
    prune_stale_primaries(&mut iface, neighbors, commit, port);
    let ctx = BuildContext {
        vpn: commit.vpn,
        subnets: &commit.contexts,
        inter_domain_endpoints: &commit.inter_domain_endpoints,
        neighbors,
    };
    let built = build(&ctx, port, iface.router_interface, &iface.adjacencies, filter);
    iface.merge(built);
    if iface.adjacencies.is_empty() {
        debug!("port {} has no adjacency left, dropping interface", port.id);
        delete_if_present(interfaces, Datastore::Config, port.id)?;
        delete_if_present(interfaces, Datastore::Operational, port.id)?;
        return Ok(());
    }
    interfaces.write(Datastore::Config, iface)?;
    interfaces.commit_operational(port.id)
}

/// Primaries recorded for the committed subnet but absent from the port's
/// current fixed-ip set are withdrawn, together with the extra-route next
/// hops they resolved. Extra routes whose destination no longer appears in
/// the committed route set are dropped too.
fn prune_stale_primaries(
    iface: &mut VpnInterface,
    neighbors: &NeighborIndex,
    commit: &SubnetCommit,
    port: &Port,
) {
    let destinations: HashSet<IpNet> = commit
        .contexts
        .iter()
        .flat_map(|c| c.routes.iter().map(|r| r.destination))
        .collect();
    iface.adjacencies.retain(|adjacency| {
        adjacency.is_primary()
            || adjacency.subnet != commit.subnet
            || destinations.contains(&adjacency.ip)
    });
    let mut gone: Vec<IpAddr> = vec![];
    iface.adjacencies.retain(|adjacency| {
        if adjacency.is_primary() && adjacency.subnet == commit.subnet {
            let ip = adjacency.ip.addr();
            if !port.fixed_ips.iter().any(|f| f.ip == ip) {
                neighbors.remove(commit.vpn, ip);
                gone.push(ip);
                return false;
            }
        }
        true
    });
    if gone.is_empty() {
        return;
    }
    iface.adjacencies.retain_mut(|adjacency| {
        if adjacency.is_primary() {
            return true;
        }
        adjacency.next_hops.retain(|nh| !gone.contains(nh));
        !adjacency.next_hops.is_empty()
    });
}

/// Delete an interface record, tolerating only its absence. Store faults
/// still surface.
fn delete_if_present(
    interfaces: &VpnInterfaceTable,
    datastore: Datastore,
    port: PortId,
) -> Result<(), RegistryError> {
    match interfaces.delete(datastore, port) {
        Ok(()) | Err(RegistryError::NoSuchVpnInterface(_)) => Ok(()),
        Err(err) => Err(err),
    }
}

/// Withdraw one subnet from one port's interface, deleting the interface
/// when nothing remains.
fn withdraw_port(
    interfaces: &VpnInterfaceTable,
    neighbors: &NeighborIndex,
    vpn: VpnId,
    subnet: SubnetId,
    port: PortId,
) -> Result<(), RegistryError> {
    let Some(mut iface) = interfaces.read(Datastore::Config, port)? else {
        return Ok(());
    };
    match withdraw(vpn, subnet, &iface.adjacencies, neighbors) {
        Withdrawal::RemoveInterface => {
            interfaces.delete(Datastore::Config, port)?;
            delete_if_present(interfaces, Datastore::Operational, port)?;
        }
        Withdrawal::Keep(kept) => {
            iface.adjacencies = kept;
            interfaces.write(Datastore::Config, iface)?;
            interfaces.commit_operational(port)?;
        }
    }
    Ok(())
}
