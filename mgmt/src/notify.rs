// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Downstream domain notifications published when vpn membership changes.
//! Consumers (NAT, fabric provisioning, ...) subscribe to a broadcast
//! channel; a slow or absent consumer never blocks the orchestrator.

use crate::cache::NetworkTopology;
use adjacency::{PortId, SubnetId, VpnId};
use ipnet::IpNet;
use std::fmt::Display;
use tokio::sync::broadcast;
use tracing::debug;

/// Common payload of every notification.
#[derive(Clone, Debug, PartialEq)]
pub struct SubnetInVpn {
    pub subnet: SubnetId,
    pub cidr: IpNet,
    pub vpn: VpnId,
    pub external_vpn: bool,
    pub topology: NetworkTopology,
}

#[derive(Clone, Debug, PartialEq)]
pub enum VpnNotification {
    SubnetAddedToVpn(SubnetInVpn),
    SubnetRemovedFromVpn(SubnetInVpn),
    SubnetUpdatedInVpn(SubnetInVpn),
    PortAddedToSubnet(SubnetInVpn, PortId),
    PortRemovedFromSubnet(SubnetInVpn, PortId),
}

impl Display for VpnNotification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VpnNotification::SubnetAddedToVpn(s) => {
                write!(f, "subnet {} ({}) added to vpn {}", s.subnet, s.cidr, s.vpn)
            }
            VpnNotification::SubnetRemovedFromVpn(s) => {
                write!(f, "subnet {} removed from vpn {}", s.subnet, s.vpn)
            }
            VpnNotification::SubnetUpdatedInVpn(s) => {
                write!(f, "subnet {} updated in vpn {}", s.subnet, s.vpn)
            }
            VpnNotification::PortAddedToSubnet(s, port) => {
                write!(f, "port {port} added to subnet {} in vpn {}", s.subnet, s.vpn)
            }
            VpnNotification::PortRemovedFromSubnet(s, port) => {
                write!(f, "port {port} removed from subnet {} in vpn {}", s.subnet, s.vpn)
            }
        }
    }
}

pub struct Notifier {
    tx: broadcast::Sender<VpnNotification>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(64)
    }
}

impl Notifier {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<VpnNotification> {
        self.tx.subscribe()
    }
    pub fn publish(&self, notification: VpnNotification) {
        debug!("notify: {notification}");
        /* no subscriber is fine */
        let _ = self.tx.send(notification);
    }
}
