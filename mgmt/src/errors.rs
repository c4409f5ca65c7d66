// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The reasons why an association request may fail or be rejected.

use adjacency::{NetworkId, RouterId, SubnetId, VpnId};
use jobq::LockError;
use registry::RegistryError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ApiError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("a vpn instance {0} already exists")]
    VpnAlreadyExists(VpnId),

    #[error("router {router} is already associated with vpn {vpn}")]
    RouterAlreadyAssociated { router: RouterId, vpn: VpnId },

    #[error("router {0} is not associated with vpn {1}")]
    RouterNotAssociated(RouterId, VpnId),

    #[error("subnet {0} is not part of vpn {1}")]
    SubnetNotInVpn(SubnetId, VpnId),

    #[error("subnet {0} already belongs to vpn {1}")]
    SubnetAlreadyInVpn(SubnetId, VpnId),

    #[error("network {0} is already associated with vpn {1}")]
    NetworkAlreadyAssociated(NetworkId, VpnId),

    #[error("network {0} is not associated with vpn {1}")]
    NetworkNotAssociated(NetworkId, VpnId),

    #[error("port {0} is unknown to the topology cache")]
    UnknownPort(adjacency::PortId),
}

pub type ApiResult<T = ()> = Result<T, ApiError>;
