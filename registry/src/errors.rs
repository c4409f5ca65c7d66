// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The error results used by the registries.

use adjacency::{PortId, SubnetId, VpnId};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("a subnetmap for subnet {0} already exists")]
    SubnetmapExists(SubnetId),

    #[error("no subnetmap for subnet {0}")]
    NoSuchSubnetmap(SubnetId),

    #[error("no vpn instance {0}")]
    NoSuchVpnInstance(VpnId),

    #[error("no vpn map for {0}")]
    NoSuchVpnMap(VpnId),

    #[error("no vpn interface for port {0}")]
    NoSuchVpnInterface(PortId),

    #[error("vpn {0} still has subnet, router or network associations")]
    VpnInUse(VpnId),

    #[error("store transaction failed: {0}")]
    TransactionFailure(String),
}
