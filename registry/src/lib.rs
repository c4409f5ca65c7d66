// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Registries over the vpn association records: subnetmaps, vpn instances
//! and maps, and vpn interfaces, backed by a two-partition keyed store.

pub mod errors;
pub mod interfaces;
pub mod store;
pub mod subnetmap;
pub mod vpn;

pub use errors::RegistryError;
pub use interfaces::VpnInterfaceTable;
pub use store::{Datastore, MemStore};
pub use subnetmap::{Subnetmap, SubnetmapTable};
pub use vpn::{IpFamily, TargetKind, VpnInstance, VpnInstanceBuilder, VpnMap, VpnTable, VpnTarget, VpnType};
