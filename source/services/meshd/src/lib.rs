// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
//! CONTEXT: meshd (v0) — mesh networking owner service
//! OWNERS: @runtime
//! STATUS: Bring-up
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Host tests in `source/services/meshd/tests/`
//!
//! Responsibilities (v0):
//! - Own the mesh L2 adapter for one interface: init the engine, spawn the
//!   worker, keep readiness markers stable.
//! - Expose the adapter so the stack glue can register the link-layer hooks.
//!
//! ADR: docs/adr/0019-mesh-l2-architecture.md

use std::sync::Arc;

use log::info;
use thiserror::Error;

use nexus_mesh::{MeshEngine, NetIfCtl, PktPool};
use nexus_mesh_l2::{MeshAdapter, MeshL2Config, WorkerHandle};

/// Errors surfaced while bringing the service up.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Worker thread could not be spawned.
    #[error("worker spawn failed: {0}")]
    Spawn(#[from] std::io::Error),
}

/// A running mesh interface: adapter context plus its worker thread.
pub struct MeshService<E: MeshEngine, N: NetIfCtl, P: PktPool> {
    adapter: Arc<MeshAdapter<E, N, P>>,
    worker: WorkerHandle,
}

impl<E, N, P> MeshService<E, N, P>
where
    E: MeshEngine + Send + 'static,
    N: NetIfCtl + Send + 'static,
    P: PktPool + Send + 'static,
{
    /// Brings the interface up: engine config, worker spawn, readiness marker.
    pub fn start(
        engine: E,
        netif: N,
        pool: P,
        config: MeshL2Config,
    ) -> Result<Self, ServiceError> {
        let adapter = MeshAdapter::init(engine, netif, pool, config);
        let worker = Arc::clone(&adapter).spawn_worker()?;
        println!("meshd: ready");
        info!("meshd: interface up, hw addr {:02x?}", adapter.hw_addr().0);
        Ok(Self { adapter, worker })
    }

    /// The link-layer surface to register with the stack.
    pub fn adapter(&self) -> &Arc<MeshAdapter<E, N, P>> {
        &self.adapter
    }

    /// Graceful stop: the worker finishes its current pass and joins.
    pub fn shutdown(self) {
        self.worker.shutdown();
        println!("meshd: stopped");
    }
}
