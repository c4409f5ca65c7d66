// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The vpn registry: vpn instances (route distinguishers and targets) and
//! vpn maps (router and network membership). Multi-call read-modify-write
//! sequences against one vpn id must run under the named lock for that id;
//! each table call here is individually atomic.

use crate::errors::RegistryError;
use crate::store::{Datastore, MemStore};
use adjacency::{NetworkId, RouterId, TenantId, VpnId};
use bitflags::bitflags;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

bitflags! {
    /// Address families a vpn instance exposes. Empty means undefined (no
    /// member subnet yet); the value is derived from member subnets, never
    /// authoritative.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct IpFamily: u8 {
        const V4 = 0b01;
        const V6 = 0b10;
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VpnType {
    #[default]
    L3,
    L2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TargetKind {
    Import,
    Export,
    Both,
}

/// One route target of a vpn instance.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VpnTarget {
    pub rt: String,
    pub kind: TargetKind,
}

impl VpnTarget {
    #[must_use]
    pub fn new(rt: &str, kind: TargetKind) -> Self {
        Self {
            rt: rt.to_owned(),
            kind,
        }
    }
}

/// Identity of one vpn routing domain. The instance name is the vpn id.
#[derive(Builder, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VpnInstance {
    pub name: VpnId,
    #[builder(default)]
    pub route_distinguishers: Vec<String>,
    #[builder(default)]
    pub targets: Vec<VpnTarget>,
    #[builder(default)]
    pub ip_family: IpFamily,
    #[builder(default)]
    pub vpn_type: VpnType,
    #[builder(default)]
    pub l3vni: Option<u32>,
}

/// Membership record tying a vpn to its router and networks. The router id
/// equals the vpn id for an internal (per-router) vpn.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VpnMap {
    pub vpn: VpnId,
    pub name: Option<String>,
    pub tenant: Option<TenantId>,
    pub router: Option<RouterId>,
    pub networks: Option<BTreeSet<NetworkId>>,
}

impl VpnMap {
    /// A vpn is internal when it is the default routing domain of its
    /// router. A map with no router is never internal.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        self.router == Some(self.vpn)
    }
    #[must_use]
    pub fn has_associations(&self) -> bool {
        self.router.is_some() || self.networks.as_ref().is_some_and(|n| !n.is_empty())
    }
}

/// Collapse a target list: a target present with both Import and Export
/// kinds becomes a single Both-typed entry.
fn collapse_targets(targets: impl IntoIterator<Item = VpnTarget>) -> Vec<VpnTarget> {
    let mut kinds: BTreeMap<String, (bool, bool)> = BTreeMap::new();
    for target in targets {
        let entry = kinds.entry(target.rt).or_insert((false, false));
        match target.kind {
            TargetKind::Import => entry.0 = true,
            TargetKind::Export => entry.1 = true,
            TargetKind::Both => *entry = (true, true),
        }
    }
    kinds
        .into_iter()
        .map(|(rt, kinds)| {
            let kind = match kinds {
                (true, true) => TargetKind::Both,
                (true, false) => TargetKind::Import,
                _ => TargetKind::Export,
            };
            VpnTarget { rt, kind }
        })
        .collect()
}

#[derive(Default)]
pub struct VpnTable {
    instances: MemStore<VpnId, VpnInstance>,
    maps: MemStore<VpnId, VpnMap>,
}

impl VpnTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or merge a vpn instance. Route distinguishers and targets are
    /// merged (targets with Both-collapse); l3vni and type are overwritten
    /// when supplied.
    pub fn upsert_instance(&self, instance: VpnInstance) -> Result<VpnInstance, RegistryError> {
        let name = instance.name;
        let merged = self.instances.merge(Datastore::Config, &name, |stored| {
            for rd in &instance.route_distinguishers {
                if !stored.route_distinguishers.contains(rd) {
                    stored.route_distinguishers.push(rd.clone());
                }
            }
            let mut targets = std::mem::take(&mut stored.targets);
            targets.extend(instance.targets.iter().cloned());
            stored.targets = collapse_targets(targets);
            stored.ip_family |= instance.ip_family;
            stored.vpn_type = instance.vpn_type;
            if instance.l3vni.is_some() {
                stored.l3vni = instance.l3vni;
            }
        })?;
        match merged {
            Some(instance) => Ok(instance),
            None => {
                let mut instance = instance;
                instance.targets = collapse_targets(instance.targets);
                debug!("created vpn instance {name}");
                self.instances
                    .write(Datastore::Config, name, instance.clone())?;
                Ok(instance)
            }
        }
    }

    /// Overwrite the derived address-family set of a vpn instance.
    pub fn set_ip_family(&self, vpn: VpnId, family: IpFamily) -> Result<(), RegistryError> {
        self.instances
            .merge(Datastore::Config, &vpn, |stored| stored.ip_family = family)?
            .ok_or(RegistryError::NoSuchVpnInstance(vpn))?;
        Ok(())
    }

    /// Widen the derived address-family set of a vpn instance. The union is
    /// taken inside a single merge so concurrent wideners cannot lose a bit.
    pub fn widen_ip_family(&self, vpn: VpnId, family: IpFamily) -> Result<(), RegistryError> {
        self.instances
            .merge(Datastore::Config, &vpn, |stored| stored.ip_family |= family)?
            .ok_or(RegistryError::NoSuchVpnInstance(vpn))?;
        Ok(())
    }

    pub fn get_instance(&self, vpn: VpnId) -> Result<VpnInstance, RegistryError> {
        self.instances
            .read(Datastore::Config, &vpn)?
            .ok_or(RegistryError::NoSuchVpnInstance(vpn))
    }

    /// Delete a vpn instance. Refused while its map still records a router
    /// or network association.
    pub fn delete_instance(&self, vpn: VpnId) -> Result<(), RegistryError> {
        if let Some(map) = self.maps.read(Datastore::Config, &vpn)? {
            if map.has_associations() {
                return Err(RegistryError::VpnInUse(vpn));
            }
        }
        self.instances
            .delete(Datastore::Config, &vpn)?
            .ok_or(RegistryError::NoSuchVpnInstance(vpn))?;
        debug!("deleted vpn instance {vpn}");
        Ok(())
    }

    /// Create or merge a vpn map. Scalar fields are overwritten when
    /// supplied; the network set uses add-all semantics.
    pub fn upsert_map(
        &self,
        vpn: VpnId,
        name: Option<&str>,
        tenant: Option<TenantId>,
        router: Option<RouterId>,
        networks: &[NetworkId],
    ) -> Result<VpnMap, RegistryError> {
        let apply = |map: &mut VpnMap| {
            if let Some(name) = name {
                map.name = Some(name.to_owned());
            }
            if tenant.is_some() {
                map.tenant = tenant;
            }
            if router.is_some() {
                map.router = router;
            }
            if !networks.is_empty() {
                map.networks
                    .get_or_insert_with(BTreeSet::new)
                    .extend(networks.iter().copied());
            }
        };
        match self.maps.merge(Datastore::Config, &vpn, apply)? {
            Some(map) => Ok(map),
            None => {
                let mut map = VpnMap {
                    vpn,
                    ..VpnMap::default()
                };
                apply(&mut map);
                self.maps.write(Datastore::Config, vpn, map.clone())?;
                Ok(map)
            }
        }
    }

    /// Remove-all semantics: drop the given networks (clearing the field
    /// when the last one goes) and drop the router when it matches.
    pub fn clear_map(
        &self,
        vpn: VpnId,
        router: Option<RouterId>,
        networks: &[NetworkId],
    ) -> Result<VpnMap, RegistryError> {
        self.maps
            .merge(Datastore::Config, &vpn, |map| {
                if router.is_some() && map.router == router {
                    map.router = None;
                }
                if let Some(set) = map.networks.as_mut() {
                    for network in networks {
                        set.remove(network);
                    }
                    if set.is_empty() {
                        map.networks = None;
                    }
                }
            })?
            .ok_or(RegistryError::NoSuchVpnMap(vpn))
    }

    pub fn get_map(&self, vpn: VpnId) -> Result<VpnMap, RegistryError> {
        self.maps
            .read(Datastore::Config, &vpn)?
            .ok_or(RegistryError::NoSuchVpnMap(vpn))
    }

    pub fn delete_map(&self, vpn: VpnId) -> Result<(), RegistryError> {
        self.maps
            .delete(Datastore::Config, &vpn)?
            .ok_or(RegistryError::NoSuchVpnMap(vpn))?;
        Ok(())
    }

    /// The vpn a router is currently bound to, if any. An explicit
    /// association wins over the router's internal vpn, which also records
    /// the router.
    #[must_use]
    pub fn vpn_of_router(&self, router: RouterId) -> Option<VpnId> {
        let maps: Vec<VpnMap> = self
            .maps
            .values(Datastore::Config)
            .into_iter()
            .filter(|m| m.router == Some(router))
            .collect();
        maps.iter()
            .find(|m| !m.is_internal())
            .or_else(|| maps.first())
            .map(|m| m.vpn)
    }

    /// The vpn a network is currently associated with, if any.
    #[must_use]
    pub fn vpn_of_network(&self, network: NetworkId) -> Option<VpnId> {
        self.maps
            .values(Datastore::Config)
            .into_iter()
            .find(|m| m.networks.as_ref().is_some_and(|n| n.contains(&network)))
            .map(|m| m.vpn)
    }

    #[must_use]
    pub fn instances(&self) -> Vec<VpnInstance> {
        self.instances.values(Datastore::Config)
    }

    #[must_use]
    pub fn maps(&self) -> Vec<VpnMap> {
        self.maps.values(Datastore::Config)
    }
}
