// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Bounded queue of in-flight self-injected packet identities.
//!
//! A packet the adapter pushes into the stack's ingress path reappears at the
//! L2 receive hook; until then its identity is parked here. The backing store
//! is a bounded FIFO, but the matching discipline only ever consults the
//! newest entry: between a push and its matching receive call there is exactly
//! one packet in flight at that boundary, so concurrent injections match in
//! LIFO order at the single entry point.

use std::collections::VecDeque;

use parking_lot::Mutex;

use nexus_mesh::{MeshError, PktId};

struct Inner {
    entries: VecDeque<PktId>,
    capacity: usize,
}

/// Identity queue; serializes push/peek/pop internally so it can be touched
/// from both the worker thread and stack caller threads.
pub struct LoopbackQueue {
    inner: Mutex<Inner>,
}

impl LoopbackQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner { entries: VecDeque::with_capacity(capacity), capacity }),
        }
    }

    /// Parks an identity ahead of ingress delivery. At capacity the push is
    /// rejected and the caller must drop the packet; it must not be delivered.
    pub fn push(&self, id: PktId) -> Result<(), MeshError> {
        let mut inner = self.inner.lock();
        if inner.entries.len() >= inner.capacity {
            return Err(MeshError::QueueFull);
        }
        inner.entries.push_back(id);
        Ok(())
    }

    /// The most recently pushed identity, if any.
    pub fn peek_newest(&self) -> Option<PktId> {
        self.inner.lock().entries.back().copied()
    }

    /// Removes and returns the most recently pushed identity.
    pub fn pop_newest(&self) -> Option<PktId> {
        self.inner.lock().entries.pop_back()
    }

    /// Atomically pops the newest entry if it matches `id`.
    pub fn take_if_newest(&self, id: PktId) -> bool {
        let mut inner = self.inner.lock();
        if inner.entries.back() == Some(&id) {
            inner.entries.pop_back();
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}
