// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! VPN routing model and the per-port adjacency computation. This crate is
//! pure state and computation: it owns no locks and performs no I/O.

pub mod builder;
pub mod model;
pub mod neighbors;
pub mod topology;

pub use builder::{BuildContext, SubnetContext, Withdrawal, build, withdraw};
pub use model::{Adjacency, AdjacencyKind, VpnInterface};
pub use neighbors::{NeighborIndex, PortNeighbor};
pub use topology::{FixedIp, Port, StaticRoute};

use uuid::Uuid;

/* Topology object identifiers. These are the upstream (tenant-facing) ids;
 * a VPN id doubles as the VPN instance name. */
pub type SubnetId = Uuid;
pub type NetworkId = Uuid;
pub type RouterId = Uuid;
pub type PortId = Uuid;
pub type TenantId = Uuid;
pub type VpnId = Uuid;
