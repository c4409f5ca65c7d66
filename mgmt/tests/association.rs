// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! End-to-end association scenarios over the in-memory registries.

use vpnmgr_mgmt as mgmt;

use ipnet::IpNet;
use jobq::JobError;
use mac_address::MacAddress;
use mgmt::cache::{InterVpnLink, NetworkEntry, RouterEntry};
use mgmt::{AssociationTicket, ApiError, VpnCreateRequest, VpnManager, VpnNotification};
use pretty_assertions::assert_eq;
use registry::{Datastore, IpFamily, RegistryError, VpnInstanceBuilder};
use adjacency::topology::OWNER_ROUTER_INTERFACE;
use adjacency::{Port, StaticRoute, SubnetId, VpnId, VpnInterface};
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

fn uid(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

fn mk_ip(s: &str) -> IpAddr {
    IpAddr::from_str(s).expect("Bad ip")
}

fn mk_net(s: &str) -> IpNet {
    IpNet::from_str(s).expect("Bad prefix")
}

fn mk_mac(n: u8) -> MacAddress {
    MacAddress::new([0x02, 0, 0, 0, 0, n])
}

fn compute_port(n: u128, ip: &str, subnet: SubnetId) -> Port {
    Port::new(uid(n), mk_mac(n as u8), "compute:nova").fixed_ip(mk_ip(ip), subnet)
}

/// Manager with one vpn instance and one subnet (10.0.0.0/24) pre-created.
async fn bed(vpn: VpnId, subnet: SubnetId) -> Arc<VpnManager> {
    let manager = Arc::new(VpnManager::new());
    manager
        .vpns()
        .upsert_instance(
            VpnInstanceBuilder::default()
                .name(vpn)
                .build()
                .expect("Should succeed"),
        )
        .expect("Should succeed");
    manager
        .subnets()
        .create(subnet, uid(200), uid(201), mk_net("10.0.0.0/24"))
        .expect("Should succeed");
    manager
        .vpns()
        .upsert_map(vpn, Some("red"), Some(uid(201)), None, &[])
        .expect("Should succeed");
    manager
}

async fn join_ok(ticket: AssociationTicket) {
    for result in ticket.join().await {
        result.expect("Job should succeed");
    }
}

fn config_iface(manager: &VpnManager, port: Uuid) -> Option<VpnInterface> {
    manager
        .interfaces()
        .read(Datastore::Config, port)
        .expect("Should succeed")
}

#[tokio::test]
async fn subnet_association_creates_primary_adjacencies() {
    let (vpn, subnet) = (uid(1), uid(2));
    let manager = bed(vpn, subnet).await;
    let port = compute_port(10, "10.0.0.5", subnet);
    manager
        .port_added_to_subnet(&port, subnet)
        .await
        .expect("Should succeed");

    let ticket = manager
        .add_subnet_to_vpn(vpn, subnet)
        .await
        .expect("Should succeed");
    join_ok(ticket).await;

    let iface = config_iface(&manager, port.id).expect("Interface should exist");
    assert_eq!(iface.vpn, vpn);
    assert_eq!(iface.adjacencies.len(), 1);
    let adjacency = &iface.adjacencies[0];
    assert!(adjacency.is_primary());
    assert_eq!(adjacency.ip, mk_net("10.0.0.5/32"));
    assert_eq!(adjacency.mac, Some(mk_mac(10)));

    /* applied state committed alongside the intent */
    assert_eq!(
        manager
            .interfaces()
            .read(Datastore::Operational, port.id)
            .expect("Should succeed"),
        Some(iface)
    );
    assert!(manager.neighbors().resolves(vpn, mk_ip("10.0.0.5")));
    assert_eq!(
        manager.vpns().get_instance(vpn).expect("Should succeed").ip_family,
        IpFamily::V4
    );
}

#[tokio::test]
async fn association_is_idempotent() {
    let (vpn, subnet) = (uid(1), uid(2));
    let manager = bed(vpn, subnet).await;
    let port = compute_port(10, "10.0.0.5", subnet);
    manager
        .port_added_to_subnet(&port, subnet)
        .await
        .expect("Should succeed");

    for _ in 0..2 {
        let ticket = manager
            .add_subnet_to_vpn(vpn, subnet)
            .await
            .expect("Should succeed");
        join_ok(ticket).await;
    }

    let iface = config_iface(&manager, port.id).expect("Interface should exist");
    assert_eq!(iface.adjacencies.len(), 1);
}

#[tokio::test]
async fn subnet_in_another_vpn_is_rejected() {
    let (vpn, subnet) = (uid(1), uid(2));
    let manager = bed(vpn, subnet).await;
    join_ok(
        manager
            .add_subnet_to_vpn(vpn, subnet)
            .await
            .expect("Should succeed"),
    )
    .await;

    let other = uid(50);
    manager
        .vpns()
        .upsert_instance(
            VpnInstanceBuilder::default()
                .name(other)
                .build()
                .expect("Should succeed"),
        )
        .expect("Should succeed");
    assert_eq!(
        manager.add_subnet_to_vpn(other, subnet).await.err(),
        Some(ApiError::SubnetAlreadyInVpn(subnet, vpn))
    );
}

#[tokio::test]
async fn static_route_becomes_one_ecmp_extra_route_on_the_anchor_port() {
    let (vpn, subnet, router) = (uid(1), uid(2), uid(3));
    let manager = bed(vpn, subnet).await;
    let port_a = compute_port(10, "10.0.0.5", subnet);
    let port_b = compute_port(11, "10.0.0.6", subnet);
    for port in [&port_a, &port_b] {
        manager
            .port_added_to_subnet(port, subnet)
            .await
            .expect("Should succeed");
    }
    manager.cache().router_upserted(
        RouterEntry::new(router)
            .route(StaticRoute::new(mk_net("20.0.0.0/24"), mk_ip("10.0.0.5")))
            .route(StaticRoute::new(mk_net("20.0.0.0/24"), mk_ip("10.0.0.6"))),
    );
    manager
        .subnets()
        .update(subnet, Some(router), None)
        .expect("Should succeed");

    join_ok(
        manager
            .add_subnet_to_vpn(vpn, subnet)
            .await
            .expect("Should succeed"),
    )
    .await;

    /* the port holding the lowest resolvable next hop owns the route */
    let iface_a = config_iface(&manager, port_a.id).expect("Interface should exist");
    let extras: Vec<_> = iface_a
        .adjacencies
        .iter()
        .filter(|a| !a.is_primary())
        .collect();
    assert_eq!(extras.len(), 1);
    assert_eq!(extras[0].ip, mk_net("20.0.0.0/24"));
    assert_eq!(extras[0].next_hops, vec![mk_ip("10.0.0.5"), mk_ip("10.0.0.6")]);

    let iface_b = config_iface(&manager, port_b.id).expect("Interface should exist");
    assert!(iface_b.adjacencies.iter().all(|a| a.is_primary()));
}

#[tokio::test]
async fn inter_domain_next_hops_are_never_materialized() {
    let (vpn, subnet, router) = (uid(1), uid(2), uid(3));
    let manager = bed(vpn, subnet).await;
    let port_a = compute_port(10, "10.0.0.5", subnet);
    let port_c = compute_port(12, "10.0.0.7", subnet);
    for port in [&port_a, &port_c] {
        manager
            .port_added_to_subnet(port, subnet)
            .await
            .expect("Should succeed");
    }
    /* 10.0.0.7 is the peer vpn's endpoint of a route-leak link */
    manager.cache().link_upserted(InterVpnLink {
        name: "red-blue".to_string(),
        first_vpn: uid(60),
        first_endpoint: mk_ip("10.0.0.7"),
        second_vpn: vpn,
        second_endpoint: mk_ip("192.168.0.1"),
    });
    manager.cache().router_upserted(
        RouterEntry::new(router)
            .route(StaticRoute::new(mk_net("30.0.0.0/24"), mk_ip("10.0.0.7")))
            .route(StaticRoute::new(mk_net("30.0.0.0/24"), mk_ip("10.0.0.5"))),
    );
    manager
        .subnets()
        .update(subnet, Some(router), None)
        .expect("Should succeed");

    join_ok(
        manager
            .add_subnet_to_vpn(vpn, subnet)
            .await
            .expect("Should succeed"),
    )
    .await;

    let iface_a = config_iface(&manager, port_a.id).expect("Interface should exist");
    let extras: Vec<_> = iface_a
        .adjacencies
        .iter()
        .filter(|a| !a.is_primary())
        .collect();
    assert_eq!(extras.len(), 1);
    assert_eq!(extras[0].next_hops, vec![mk_ip("10.0.0.5")]);

    /* the link-endpoint port carries no extra route at all */
    let iface_c = config_iface(&manager, port_c.id).expect("Interface should exist");
    assert!(iface_c.adjacencies.iter().all(|a| a.is_primary()));
}

#[tokio::test]
async fn gateway_port_is_applied_synchronously() {
    let (vpn, subnet, router) = (uid(1), uid(2), uid(3));
    let manager = bed(vpn, subnet).await;
    let gateway = Port::new(uid(20), mk_mac(20), OWNER_ROUTER_INTERFACE)
        .fixed_ip(mk_ip("10.0.0.1"), subnet);
    manager
        .router_interface_added(router, subnet, &gateway)
        .await
        .expect("Should succeed");

    /* no jobs to await: the ticket may be empty, the gateway is done */
    manager
        .add_subnet_to_vpn(vpn, subnet)
        .await
        .expect("Should succeed");

    let iface = config_iface(&manager, gateway.id).expect("Interface should exist");
    assert!(iface.router_interface);
    assert_eq!(iface.adjacencies[0].ip, mk_net("10.0.0.1/32"));
}

#[tokio::test]
async fn removal_withdraws_every_interface() {
    let (vpn, subnet) = (uid(1), uid(2));
    let manager = bed(vpn, subnet).await;
    let port = compute_port(10, "10.0.0.5", subnet);
    manager
        .port_added_to_subnet(&port, subnet)
        .await
        .expect("Should succeed");
    join_ok(
        manager
            .add_subnet_to_vpn(vpn, subnet)
            .await
            .expect("Should succeed"),
    )
    .await;

    join_ok(
        manager
            .remove_subnet_from_vpn(vpn, subnet)
            .await
            .expect("Should succeed"),
    )
    .await;

    assert_eq!(config_iface(&manager, port.id), None);
    assert!(!manager.neighbors().resolves(vpn, mk_ip("10.0.0.5")));
    assert_eq!(
        manager.subnets().get(subnet).expect("Should succeed").vpn,
        None
    );
    /* family derived from member subnets: none left */
    assert_eq!(
        manager.vpns().get_instance(vpn).expect("Should succeed").ip_family,
        IpFamily::empty()
    );

    assert_eq!(
        manager.remove_subnet_from_vpn(vpn, subnet).await.err(),
        Some(ApiError::SubnetNotInVpn(subnet, vpn))
    );
}

#[tokio::test]
async fn router_association_round_trip_restores_the_internal_vpn() {
    let manager = Arc::new(VpnManager::new());
    let router = uid(3);
    let subnet = uid(2);
    let external = uid(1);
    /* the router's internal vpn: instance named by the router id */
    for vpn in [router, external] {
        manager
            .vpns()
            .upsert_instance(
                VpnInstanceBuilder::default()
                    .name(vpn)
                    .build()
                    .expect("Should succeed"),
            )
            .expect("Should succeed");
    }
    manager
        .vpns()
        .upsert_map(router, None, None, Some(router), &[])
        .expect("Should succeed");
    manager
        .subnets()
        .create(subnet, uid(200), uid(201), mk_net("10.0.0.0/24"))
        .expect("Should succeed");
    manager
        .subnets()
        .update(subnet, Some(router), None)
        .expect("Should succeed");
    let port = compute_port(10, "10.0.0.5", subnet);
    manager
        .port_added_to_subnet(&port, subnet)
        .await
        .expect("Should succeed");
    join_ok(
        manager
            .add_subnet_to_vpn(router, subnet)
            .await
            .expect("Should succeed"),
    )
    .await;

    /* hand the router's subnets over to the external vpn */
    join_ok(
        manager
            .associate_router_to_vpn(external, router)
            .await
            .expect("Should succeed"),
    )
    .await;
    let iface = config_iface(&manager, port.id).expect("Interface should exist");
    assert_eq!(iface.vpn, external);
    assert!(manager.neighbors().resolves(external, mk_ip("10.0.0.5")));
    assert!(!manager.neighbors().resolves(router, mk_ip("10.0.0.5")));

    /* a second association attempt for the same router is refused */
    assert_eq!(
        manager.associate_router_to_vpn(uid(99), router).await.err(),
        Some(ApiError::Registry(RegistryError::NoSuchVpnInstance(uid(99))))
    );

    /* hand them back */
    join_ok(
        manager
            .dissociate_router_from_vpn(external, router)
            .await
            .expect("Should succeed"),
    )
    .await;
    let iface = config_iface(&manager, port.id).expect("Interface should exist");
    assert_eq!(iface.vpn, router);
    assert_eq!(
        manager.subnets().get(subnet).expect("Should succeed").vpn,
        Some(router)
    );
    assert_eq!(manager.vpns().vpn_of_router(router), Some(router));
}

#[tokio::test]
async fn router_conflict_is_reported() {
    let (vpn, subnet) = (uid(1), uid(2));
    let manager = bed(vpn, subnet).await;
    let router = uid(3);
    manager
        .associate_router_to_vpn(vpn, router)
        .await
        .expect("Should succeed");

    let other = uid(50);
    manager
        .vpns()
        .upsert_instance(
            VpnInstanceBuilder::default()
                .name(other)
                .build()
                .expect("Should succeed"),
        )
        .expect("Should succeed");
    assert_eq!(
        manager.associate_router_to_vpn(other, router).await.err(),
        Some(ApiError::RouterAlreadyAssociated { router, vpn })
    );
}

#[tokio::test]
async fn network_dissociation_updates_every_member_interface() {
    let (vpn, subnet, second) = (uid(1), uid(2), uid(3));
    let network = uid(200); /* bed() puts the subnet on this network */
    let manager = bed(vpn, subnet).await;
    manager
        .subnets()
        .create(second, network, uid(201), mk_net("10.0.1.0/24"))
        .expect("Should succeed");
    manager.cache().network_upserted(NetworkEntry {
        id: network,
        external: false,
        topology: Default::default(),
    });
    /* five ports spread over the network's two subnets */
    for n in 0..3u128 {
        let port = compute_port(10 + n, &format!("10.0.0.{}", 5 + n), subnet);
        manager
            .port_added_to_subnet(&port, subnet)
            .await
            .expect("Should succeed");
    }
    for n in 0..2u128 {
        let port = compute_port(20 + n, &format!("10.0.1.{}", 5 + n), second);
        manager
            .port_added_to_subnet(&port, second)
            .await
            .expect("Should succeed");
    }

    let outcome = manager
        .associate_networks(vpn, &[network])
        .await
        .expect("Should succeed");
    assert!(outcome.is_success(), "{:?}", outcome.messages());
    join_ok(outcome.ticket).await;
    assert_eq!(manager.interfaces().len(Datastore::Config), 5);
    assert_eq!(manager.vpns().vpn_of_network(network), Some(vpn));

    let outcome = manager
        .dissociate_networks(vpn, &[network])
        .await
        .expect("Should succeed");
    assert!(outcome.is_success(), "{:?}", outcome.messages());
    join_ok(outcome.ticket).await;

    assert_eq!(manager.interfaces().len(Datastore::Config), 0);
    assert_eq!(manager.vpns().vpn_of_network(network), None);
    assert_eq!(
        manager.vpns().get_map(vpn).expect("Should succeed").networks,
        None
    );
    for s in [subnet, second] {
        assert_eq!(manager.subnets().get(s).expect("Should succeed").vpn, None);
    }
}

#[tokio::test]
async fn batch_creation_reports_per_item_failures() {
    let manager = Arc::new(VpnManager::new());
    let existing = uid(1);
    manager
        .vpns()
        .upsert_instance(
            VpnInstanceBuilder::default()
                .name(existing)
                .build()
                .expect("Should succeed"),
        )
        .expect("Should succeed");

    let request = |id: Uuid, name: &str| VpnCreateRequest {
        id,
        name: name.to_string(),
        tenant: Some(uid(201)),
        route_distinguishers: vec!["100:1".to_string()],
        import_rts: vec!["100:1".to_string()],
        export_rts: vec!["100:1".to_string()],
        l3vni: None,
        router: None,
        networks: vec![],
    };
    let outcome = manager
        .create_vpns(vec![request(existing, "dup"), request(uid(7), "green")])
        .await;

    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(
        outcome.failures[0],
        (existing, ApiError::VpnAlreadyExists(existing))
    );
    let created = manager.vpns().get_instance(uid(7)).expect("Should succeed");
    /* import + export of the same rt collapse into one Both target */
    assert_eq!(created.targets.len(), 1);
}

#[tokio::test]
async fn vpn_with_members_cannot_be_deleted() {
    let (vpn, subnet) = (uid(1), uid(2));
    let manager = bed(vpn, subnet).await;
    join_ok(
        manager
            .add_subnet_to_vpn(vpn, subnet)
            .await
            .expect("Should succeed"),
    )
    .await;

    assert_eq!(
        manager.delete_vpn(vpn).err(),
        Some(ApiError::Registry(RegistryError::VpnInUse(vpn)))
    );

    join_ok(
        manager
            .remove_subnet_from_vpn(vpn, subnet)
            .await
            .expect("Should succeed"),
    )
    .await;
    manager.delete_vpn(vpn).expect("Should succeed");
    assert_eq!(
        manager.vpns().get_instance(vpn),
        Err(RegistryError::NoSuchVpnInstance(vpn))
    );
}

#[tokio::test]
async fn concurrent_port_updates_converge_on_the_last_snapshot() {
    let (vpn, subnet) = (uid(1), uid(2));
    let manager = bed(vpn, subnet).await;
    let v1 = compute_port(10, "10.0.0.5", subnet);
    manager
        .port_added_to_subnet(&v1, subnet)
        .await
        .expect("Should succeed");
    join_ok(
        manager
            .add_subnet_to_vpn(vpn, subnet)
            .await
            .expect("Should succeed"),
    )
    .await;

    /* two back-to-back updates of the same port; jobs share a key, so they
     * run in submission order and the second snapshot wins */
    let v2 = compute_port(10, "10.0.0.6", subnet);
    let mut ticket = manager.refresh_port(&v1).await.expect("Should succeed");
    ticket.extend(manager.refresh_port(&v2).await.expect("Should succeed"));
    join_ok(ticket).await;

    let iface = config_iface(&manager, v1.id).expect("Interface should exist");
    assert_eq!(iface.adjacencies.len(), 1);
    assert_eq!(iface.adjacencies[0].ip, mk_net("10.0.0.6/32"));
    assert!(manager.neighbors().resolves(vpn, mk_ip("10.0.0.6")));
    assert!(!manager.neighbors().resolves(vpn, mk_ip("10.0.0.5")));
}

#[tokio::test]
async fn port_leaving_the_subnet_is_withdrawn() {
    let (vpn, subnet) = (uid(1), uid(2));
    let manager = bed(vpn, subnet).await;
    join_ok(
        manager
            .add_subnet_to_vpn(vpn, subnet)
            .await
            .expect("Should succeed"),
    )
    .await;

    /* the port arrives after the association */
    let port = compute_port(10, "10.0.0.5", subnet);
    let handle = manager
        .port_added_to_subnet(&port, subnet)
        .await
        .expect("Should succeed")
        .expect("A job should have been dispatched");
    handle.wait().await.expect("Job should succeed");
    assert!(config_iface(&manager, port.id).is_some());

    let handle = manager
        .port_removed_from_subnet(port.id, subnet)
        .await
        .expect("Should succeed")
        .expect("A job should have been dispatched");
    handle.wait().await.expect("Job should succeed");
    assert_eq!(config_iface(&manager, port.id), None);
    assert!(
        manager
            .subnets()
            .get(subnet)
            .expect("Should succeed")
            .ports
            .is_empty()
    );
}

#[tokio::test]
async fn concurrent_family_widening_keeps_both_bits() {
    let (vpn, v4_subnet, v6_subnet) = (uid(1), uid(2), uid(3));
    let manager = bed(vpn, v4_subnet).await;
    manager
        .subnets()
        .create(v6_subnet, uid(200), uid(201), mk_net("2001:db8::/64"))
        .expect("Should succeed");

    let m4 = Arc::clone(&manager);
    let m6 = Arc::clone(&manager);
    let add4 = tokio::spawn(async move { m4.add_subnet_to_vpn(vpn, v4_subnet).await });
    let add6 = tokio::spawn(async move { m6.add_subnet_to_vpn(vpn, v6_subnet).await });
    join_ok(add4.await.expect("Task should finish").expect("Should succeed")).await;
    join_ok(add6.await.expect("Task should finish").expect("Should succeed")).await;

    assert_eq!(
        manager
            .vpns()
            .get_instance(vpn)
            .expect("Should succeed")
            .ip_family,
        IpFamily::V4 | IpFamily::V6
    );
}

#[tokio::test]
async fn withdrawal_tolerates_a_missing_operational_copy() {
    let (vpn, subnet) = (uid(1), uid(2));
    let manager = bed(vpn, subnet).await;
    let port = compute_port(10, "10.0.0.5", subnet);
    manager
        .port_added_to_subnet(&port, subnet)
        .await
        .expect("Should succeed");
    join_ok(
        manager
            .add_subnet_to_vpn(vpn, subnet)
            .await
            .expect("Should succeed"),
    )
    .await;

    /* the operational copy vanished behind the manager's back */
    manager
        .interfaces()
        .delete(Datastore::Operational, port.id)
        .expect("Should succeed");

    join_ok(
        manager
            .remove_subnet_from_vpn(vpn, subnet)
            .await
            .expect("Should succeed"),
    )
    .await;
    assert_eq!(manager.interfaces().len(Datastore::Config), 0);
}

#[tokio::test]
async fn failed_job_is_observable_and_recoverable() {
    let (vpn, subnet) = (uid(1), uid(2));
    let manager = bed(vpn, subnet).await;
    let port = compute_port(10, "10.0.0.5", subnet);
    manager
        .port_added_to_subnet(&port, subnet)
        .await
        .expect("Should succeed");

    manager.interfaces().inject_faults(1);
    let results = manager
        .add_subnet_to_vpn(vpn, subnet)
        .await
        .expect("Should succeed")
        .join()
        .await;
    assert!(matches!(results[0], Err(JobError::Failed { .. })));
    assert_eq!(config_iface(&manager, port.id), None);

    /* the association survives in the registry: re-running converges */
    let ticket = manager
        .add_subnet_to_vpn(vpn, subnet)
        .await
        .expect("Should succeed");
    join_ok(ticket).await;
    assert!(config_iface(&manager, port.id).is_some());
}

#[tokio::test]
async fn notifications_follow_the_membership_changes() {
    let (vpn, subnet) = (uid(1), uid(2));
    let manager = bed(vpn, subnet).await;
    let mut rx = manager.notifier().subscribe();

    join_ok(
        manager
            .add_subnet_to_vpn(vpn, subnet)
            .await
            .expect("Should succeed"),
    )
    .await;
    match rx.try_recv().expect("A notification should be queued") {
        VpnNotification::SubnetAddedToVpn(payload) => {
            assert_eq!(payload.subnet, subnet);
            assert_eq!(payload.vpn, vpn);
            assert_eq!(payload.cidr, mk_net("10.0.0.0/24"));
        }
        other => panic!("unexpected notification: {other}"),
    }

    join_ok(
        manager
            .remove_subnet_from_vpn(vpn, subnet)
            .await
            .expect("Should succeed"),
    )
    .await;
    assert!(matches!(
        rx.try_recv(),
        Ok(VpnNotification::SubnetRemovedFromVpn(_))
    ));
}

#[tokio::test]
async fn router_route_change_retracts_stale_extra_routes() {
    let (vpn, subnet, router) = (uid(1), uid(2), uid(3));
    let manager = bed(vpn, subnet).await;
    let port = compute_port(10, "10.0.0.5", subnet);
    manager
        .port_added_to_subnet(&port, subnet)
        .await
        .expect("Should succeed");
    manager.cache().router_upserted(
        RouterEntry::new(router).route(StaticRoute::new(mk_net("20.0.0.0/24"), mk_ip("10.0.0.5"))),
    );
    manager
        .subnets()
        .update(subnet, Some(router), None)
        .expect("Should succeed");
    join_ok(
        manager
            .add_subnet_to_vpn(vpn, subnet)
            .await
            .expect("Should succeed"),
    )
    .await;
    assert_eq!(
        config_iface(&manager, port.id)
            .expect("Interface should exist")
            .adjacencies
            .len(),
        2
    );

    /* the route disappears: the rebuilt interface drops the extra route */
    join_ok(
        manager
            .router_updated(RouterEntry::new(router))
            .await
            .expect("Should succeed"),
    )
    .await;
    let iface = config_iface(&manager, port.id).expect("Interface should exist");
    assert_eq!(iface.adjacencies.len(), 1);
    assert!(iface.adjacencies[0].is_primary());
}
