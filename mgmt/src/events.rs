// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Upstream topology event intake. Events arrive from the tenant-network
//! layer in arbitrary interleavings; the dispatcher folds them into the
//! manager and never lets one bad event stall the stream.

use crate::association::VpnManager;
use crate::cache::{InterVpnLink, NetworkEntry, RouterEntry};
use crate::errors::ApiResult;
use adjacency::{NetworkId, Port, PortId, RouterId, SubnetId, TenantId};
use ipnet::IpNet;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// One change observed in the tenant topology.
#[derive(Clone, Debug)]
pub enum TopologyEvent {
    SubnetCreated {
        subnet: SubnetId,
        network: NetworkId,
        tenant: TenantId,
        cidr: IpNet,
    },
    SubnetDeleted(SubnetId),
    PortCreated(Port),
    PortUpdated(Port),
    PortDeleted(PortId),
    RouterUpserted(RouterEntry),
    RouterDeleted(RouterId),
    RouterInterfaceAdded {
        router: RouterId,
        subnet: SubnetId,
        port: Port,
    },
    RouterInterfaceRemoved {
        subnet: SubnetId,
        port: PortId,
    },
    NetworkUpserted(NetworkEntry),
    NetworkDeleted(NetworkId),
    InterVpnLinkUpserted(InterVpnLink),
    InterVpnLinkDeleted(String),
}

impl Display for TopologyEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TopologyEvent::SubnetCreated { subnet, cidr, .. } => {
                write!(f, "subnet-created {subnet} ({cidr})")
            }
            TopologyEvent::SubnetDeleted(subnet) => write!(f, "subnet-deleted {subnet}"),
            TopologyEvent::PortCreated(port) => write!(f, "port-created {}", port.id),
            TopologyEvent::PortUpdated(port) => write!(f, "port-updated {}", port.id),
            TopologyEvent::PortDeleted(port) => write!(f, "port-deleted {port}"),
            TopologyEvent::RouterUpserted(router) => write!(f, "router-upserted {}", router.id),
            TopologyEvent::RouterDeleted(router) => write!(f, "router-deleted {router}"),
            TopologyEvent::RouterInterfaceAdded { router, subnet, .. } => {
                write!(f, "router-interface-added {router} on {subnet}")
            }
            TopologyEvent::RouterInterfaceRemoved { subnet, port } => {
                write!(f, "router-interface-removed {port} on {subnet}")
            }
            TopologyEvent::NetworkUpserted(network) => {
                write!(f, "network-upserted {}", network.id)
            }
            TopologyEvent::NetworkDeleted(network) => write!(f, "network-deleted {network}"),
            TopologyEvent::InterVpnLinkUpserted(link) => {
                write!(f, "inter-vpn-link-upserted '{}'", link.name)
            }
            TopologyEvent::InterVpnLinkDeleted(name) => {
                write!(f, "inter-vpn-link-deleted '{name}'")
            }
        }
    }
}

/// Folds topology events into the manager. Per-event failures are logged
/// and swallowed; ordering guarantees come from the manager's keyed jobs,
/// not from this dispatcher.
pub struct EventDispatcher {
    manager: Arc<VpnManager>,
}

impl EventDispatcher {
    #[must_use]
    pub fn new(manager: Arc<VpnManager>) -> Self {
        Self { manager }
    }

    /// Drain an event channel until the sender side closes.
    pub async fn run(self, mut events: mpsc::Receiver<TopologyEvent>) {
        while let Some(event) = events.recv().await {
            self.dispatch(event).await;
        }
        info!("topology event channel closed");
    }

    pub async fn dispatch(&self, event: TopologyEvent) {
        let label = event.to_string();
        debug!("handling {label}");
        if let Err(err) = self.handle(event).await {
            error!("failed to handle {label}: {err}");
        }
    }

    async fn handle(&self, event: TopologyEvent) -> ApiResult {
        let manager = &self.manager;
        match event {
            TopologyEvent::SubnetCreated {
                subnet,
                network,
                tenant,
                cidr,
            } => {
                manager.subnets().create(subnet, network, tenant, cidr)?;
            }
            TopologyEvent::SubnetDeleted(subnet) => {
                manager.subnet_deleted(subnet).await?;
            }
            TopologyEvent::PortCreated(port) | TopologyEvent::PortUpdated(port) => {
                manager.port_updated(&port).await?;
            }
            TopologyEvent::PortDeleted(port) => {
                manager.port_deleted(port).await?;
            }
            TopologyEvent::RouterUpserted(router) => {
                manager.router_updated(router).await?;
            }
            TopologyEvent::RouterDeleted(router) => {
                manager.router_deleted(router).await?;
            }
            TopologyEvent::RouterInterfaceAdded {
                router,
                subnet,
                port,
            } => {
                manager.router_interface_added(router, subnet, &port).await?;
            }
            TopologyEvent::RouterInterfaceRemoved { subnet, port } => {
                manager.router_interface_removed(subnet, port).await?;
            }
            TopologyEvent::NetworkUpserted(network) => {
                manager.cache().network_upserted(network);
            }
            TopologyEvent::NetworkDeleted(network) => {
                manager.cache().network_deleted(network);
            }
            TopologyEvent::InterVpnLinkUpserted(link) => {
                manager.cache().link_upserted(link);
            }
            TopologyEvent::InterVpnLinkDeleted(name) => {
                manager.cache().link_deleted(&name);
            }
        }
        Ok(())
    }
}
