// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Keyed job coordination: a FIFO-per-key job queue and a named advisory
//! lock service. These are the only serialization mechanisms used by the
//! vpn association logic.

pub mod locks;
pub mod queue;

pub use locks::{LockError, NamedLockGuard, NamedLocks};
pub use queue::{JobError, JobHandle, JobQueue, JobResult};
