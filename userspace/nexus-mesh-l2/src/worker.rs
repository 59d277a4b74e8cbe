// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! The engine worker's wake primitive and lifecycle handle.
//!
//! The worker thread itself is spawned by [`crate::adapter::MeshAdapter`];
//! this module owns the signalling contract: level-triggered draining of
//! engine-internal work, edge-triggered wake for external events. Redundant
//! raises collapse into one wake (at-least-once, not exactly-once).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

/// Binary-count wake primitive with no payload.
pub struct WorkSignal {
    pending: Mutex<bool>,
    cond: Condvar,
}

impl WorkSignal {
    pub fn new() -> Self {
        Self { pending: Mutex::new(false), cond: Condvar::new() }
    }

    /// Posts a wake. Call after any mutation of engine-visible state, or the
    /// worker is not guaranteed to observe the change promptly.
    pub fn raise(&self) {
        let mut pending = self.pending.lock();
        *pending = true;
        self.cond.notify_one();
    }

    /// Blocks until the next wake, consuming it.
    pub fn wait(&self) {
        let mut pending = self.pending.lock();
        while !*pending {
            self.cond.wait(&mut pending);
        }
        *pending = false;
    }
}

impl Default for WorkSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to the spawned worker thread.
///
/// Dropping the handle detaches the worker, which then runs for the life of
/// the process (interface lifetime). [`WorkerHandle::shutdown`] is the
/// graceful alternative: the worker finishes its current pass and exits.
pub struct WorkerHandle {
    stop: Arc<AtomicBool>,
    signal: Arc<WorkSignal>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub(crate) fn new(
        stop: Arc<AtomicBool>,
        signal: Arc<WorkSignal>,
        thread: JoinHandle<()>,
    ) -> Self {
        Self { stop, signal, thread: Some(thread) }
    }

    /// Requests termination and joins the thread. Pending engine work already
    /// queued is drained first; undelivered loopback entries are dropped with
    /// the adapter context.
    pub fn shutdown(mut self) {
        self.stop.store(true, Ordering::Release);
        self.signal.raise();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
