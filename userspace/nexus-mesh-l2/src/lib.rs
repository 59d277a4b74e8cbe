// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Thread/802.15.4 mesh L2 adapter implementing the `nexus-mesh` facade
//! OWNERS: @runtime
//! STATUS: Experimental
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests per module + integration tests in `tests/adapter.rs`
//!
//! The adapter binds a generic link-layer stack to a mesh protocol engine that
//! runs as its own logical thread. Four pieces cooperate:
//!   - `translate`: lossless, fragment-aware conversion between packet chains
//!     and engine messages, in both directions
//!   - `loopback`: bounded identity queue telling self-injected packets apart
//!     from genuine radio frames at the shared receive entry point
//!   - `adapter`: the per-interface context and the frame dispatcher (the
//!     registered link-layer surface)
//!   - `worker`: the engine's cooperative scheduling thread and its wake signal
//!
//! ADR: docs/adr/0019-mesh-l2-architecture.md

#![forbid(unsafe_code)]

pub mod adapter;
pub mod loopback;
pub mod translate;
pub mod worker;

mod addr_sync;

pub use adapter::{MeshAdapter, MeshL2Config};
pub use loopback::LoopbackQueue;
pub use worker::{WorkSignal, WorkerHandle};

/// Default 802.15.4 channel (2.4 GHz band starts at 11).
pub const DEFAULT_CHANNEL: u8 = 11;

/// Default PAN identifier.
pub const DEFAULT_PAN_ID: u16 = 0xabcd;

/// Default loopback queue depth. Matching only ever checks the newest entry;
/// the extra depth is burst tolerance for deferred ingress processing.
pub const PKT_LIST_CAPACITY: usize = 10;
