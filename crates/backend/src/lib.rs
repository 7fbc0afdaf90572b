// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

//! tyger-backend: the `BackendDriver` capability set (spec §9) and its two
//! variants — a cluster driver speaking to a Kubernetes-style API server,
//! and a local-engine driver shelling out to a container runtime CLI —
//! plus the signing service and buffer manager that sit alongside the
//! backend in the data plane (spec §4.6).
//!
//! Consumers depend on the `BackendDriver` trait's capability set only;
//! there is no shared base state between variants (spec §9: "Choose
//! tagged variants or a narrow interface, never a virtual inheritance
//! tower").

pub mod buffer_manager;
pub mod cluster;
pub mod driver;
pub mod local_engine;
pub mod retry;
pub mod signing;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use buffer_manager::{BufferManager, RelayEndpoint};
pub use cluster::ClusterBackendDriver;
pub use driver::{
    BackendDriver, BackendError, BackendEvent, ContainerObservation, ContainerSpec, ContainerState,
    VolumeMount, WorkloadHandle, WorkloadSpec,
};
pub use local_engine::LocalEngineBackendDriver;
pub use retry::Backoff;
pub use signing::{ResourceType, SasAction, SigningError, SigningService};

#[cfg(any(test, feature = "test-support"))]
pub use fake::{BackendCall, FakeBackendDriver};
