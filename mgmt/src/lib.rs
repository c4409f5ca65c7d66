// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Vpn association management: the orchestrator translating tenant topology
//! into vpn routing state, the topology cache it reads from, the upstream
//! event dispatch and the downstream notifications.

pub mod association;
pub mod cache;
pub mod errors;
pub mod events;
pub mod notify;

pub use association::{AssociationTicket, BatchOutcome, VpnCreateRequest, VpnManager};
pub use errors::{ApiError, ApiResult};
pub use events::{EventDispatcher, TopologyEvent};
pub use notify::{Notifier, SubnetInVpn, VpnNotification};
