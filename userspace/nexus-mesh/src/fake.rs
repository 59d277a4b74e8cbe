// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Deterministic in-memory backends for mesh L2 contract tests (host-first)
//! OWNERS: @runtime
//! STATUS: Experimental
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Covered by 7 unit tests in `src/lib.rs` and the adapter
//! integration tests in `userspace/nexus-mesh-l2/tests/`
//!
//! Every fake accounts live objects (packets, fragments, messages) so tests
//! can assert exactly-once release on every path, and every failure mode the
//! contract names is injectable (pool exhaustion, append failure at a chosen
//! index, send rejection, ingress delivery failure).
//!
//! ADR: docs/adr/0019-mesh-l2-architecture.md

#![forbid(unsafe_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::{
    DeviceRole, EngineEvent, Frag, HwAddr, Ip6Addr, Ip6Prefix, MeshEngine, MeshError, MeshMessage,
    NetIfCtl, Pkt, PktId, PktPool, RadioFrame, StateFlags,
};

/// A radio frame as observed by the fake engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedFrame {
    pub psdu: Vec<u8>,
    pub len: usize,
    pub channel: u8,
    pub lqi: u8,
    pub rssi: i8,
}

impl RecordedFrame {
    fn capture(frame: &RadioFrame<'_>) -> Self {
        Self {
            psdu: frame.psdu.to_vec(),
            len: frame.len,
            channel: frame.channel,
            lqi: frame.lqi,
            rssi: frame.rssi,
        }
    }
}

#[derive(Default)]
struct PoolInner {
    next_id: u64,
    live_pkts: usize,
    live_frags: usize,
    max_pkts: usize,
    max_frags: usize,
}

/// Bounded, counting packet pool.
#[derive(Clone)]
pub struct FakePool {
    inner: Arc<Mutex<PoolInner>>,
}

impl FakePool {
    pub fn new() -> Self {
        Self::with_budget(64, 512)
    }

    pub fn with_budget(max_pkts: usize, max_frags: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PoolInner {
                next_id: 0,
                live_pkts: 0,
                live_frags: 0,
                max_pkts,
                max_frags,
            })),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn live_pkts(&self) -> usize {
        self.lock().live_pkts
    }

    pub fn live_frags(&self) -> usize {
        self.lock().live_frags
    }
}

impl Default for FakePool {
    fn default() -> Self {
        Self::new()
    }
}

impl PktPool for FakePool {
    fn alloc_pkt(&mut self) -> Result<Pkt, MeshError> {
        let mut inner = self.lock();
        if inner.live_pkts >= inner.max_pkts {
            return Err(MeshError::NoBufs);
        }
        inner.live_pkts += 1;
        inner.next_id += 1;
        Ok(Pkt::new(PktId(inner.next_id)))
    }

    fn alloc_frag(&mut self) -> Result<Frag, MeshError> {
        let mut inner = self.lock();
        if inner.live_frags >= inner.max_frags {
            return Err(MeshError::NoBufs);
        }
        inner.live_frags += 1;
        Ok(Frag::new())
    }

    fn release_frag(&mut self, _frag: Frag) {
        let mut inner = self.lock();
        inner.live_frags = inner.live_frags.saturating_sub(1);
    }

    fn release(&mut self, pkt: Pkt) {
        let mut inner = self.lock();
        inner.live_pkts = inner.live_pkts.saturating_sub(1);
        inner.live_frags = inner.live_frags.saturating_sub(pkt.frags().len());
    }
}

/// Engine-owned message with injectable append failure and live accounting.
#[derive(Debug)]
pub struct FakeMsg {
    bytes: Vec<u8>,
    appends: usize,
    fail_append_at: Option<usize>,
    live: Arc<AtomicUsize>,
}

impl FakeMsg {
    fn new(bytes: Vec<u8>, fail_append_at: Option<usize>, live: Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self { bytes, appends: 0, fail_append_at, live }
    }
}

impl MeshMessage for FakeMsg {
    fn append(&mut self, bytes: &[u8]) -> Result<(), MeshError> {
        self.appends += 1;
        if self.fail_append_at == Some(self.appends) {
            return Err(MeshError::EngineRejected);
        }
        self.bytes.extend_from_slice(bytes);
        Ok(())
    }

    fn read(&self, offset: usize, buf: &mut [u8]) -> usize {
        if offset >= self.bytes.len() {
            return 0;
        }
        let n = (self.bytes.len() - offset).min(buf.len());
        buf[..n].copy_from_slice(&self.bytes[offset..offset + n]);
        n
    }

    fn len(&self) -> usize {
        self.bytes.len()
    }
}

impl Drop for FakeMsg {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

enum Tasklet {
    DeliverIp6(Vec<u8>),
    StateChange(StateFlags),
}

struct EngineInner {
    channel: u8,
    pan_id: u16,
    eui64: HwAddr,
    ip6_enabled: bool,
    thread_enabled: bool,
    receive_filter: bool,
    diag_mode: bool,
    auto_deliver: bool,
    role: DeviceRole,
    network_name: String,
    reject_new_message: bool,
    reject_send: bool,
    fail_append_at: Option<usize>,
    sent: Vec<Vec<u8>>,
    frames: Vec<RecordedFrame>,
    diag_frames: Vec<RecordedFrame>,
    tasklets: VecDeque<Tasklet>,
    events: Vec<EngineEvent<FakeMsg>>,
    driver_polls: usize,
    unicast: Vec<(Ip6Addr, u8)>,
    multicast: Vec<Ip6Addr>,
    prefixes: Vec<Ip6Prefix>,
}

/// Deterministic in-memory protocol engine.
///
/// Scope: host-first tests and contract validation. Clones share state, so a
/// test can keep a handle for inspection after moving the engine into an
/// adapter.
#[derive(Clone)]
pub struct FakeEngine {
    inner: Arc<Mutex<EngineInner>>,
    live_msgs: Arc<AtomicUsize>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(EngineInner {
                channel: 0,
                pan_id: 0,
                eui64: HwAddr([0; 8]),
                ip6_enabled: false,
                thread_enabled: false,
                receive_filter: false,
                diag_mode: false,
                auto_deliver: false,
                role: DeviceRole::Disabled,
                network_name: String::from("fake-mesh"),
                reject_new_message: false,
                reject_send: false,
                fail_append_at: None,
                sent: Vec::new(),
                frames: Vec::new(),
                diag_frames: Vec::new(),
                tasklets: VecDeque::new(),
                events: Vec::new(),
                driver_polls: 0,
                unicast: Vec::new(),
                multicast: Vec::new(),
                prefixes: Vec::new(),
            })),
            live_msgs: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EngineInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // Failure injection.

    pub fn set_reject_new_message(&self, reject: bool) {
        self.lock().reject_new_message = reject;
    }

    pub fn set_reject_send(&self, reject: bool) {
        self.lock().reject_send = reject;
    }

    /// Makes the Nth append call (1-based) on subsequently created messages fail.
    pub fn set_fail_append_at(&self, nth: usize) {
        self.lock().fail_append_at = Some(nth);
    }

    pub fn set_diag_mode(&self, enabled: bool) {
        self.lock().diag_mode = enabled;
    }

    /// When set, every received radio frame is echoed back as a scheduled
    /// IPv6 delivery, exercising the full engine-to-stack pipeline.
    pub fn set_auto_deliver(&self, enabled: bool) {
        self.lock().auto_deliver = enabled;
    }

    pub fn set_role(&self, role: DeviceRole) {
        self.lock().role = role;
    }

    // Test stimuli.

    pub fn schedule_ip6_delivery(&self, bytes: Vec<u8>) {
        self.lock().tasklets.push_back(Tasklet::DeliverIp6(bytes));
    }

    pub fn schedule_state_change(&self, flags: StateFlags) {
        self.lock().tasklets.push_back(Tasklet::StateChange(flags));
    }

    pub fn insert_unicast(&self, addr: Ip6Addr, prefix_len: u8) {
        self.lock().unicast.push((addr, prefix_len));
    }

    pub fn insert_multicast(&self, addr: Ip6Addr) {
        self.lock().multicast.push(addr);
    }

    pub fn insert_prefix(&self, prefix: Ip6Prefix) {
        self.lock().prefixes.push(prefix);
    }

    pub fn remove_unicast(&self, addr: &Ip6Addr) {
        self.lock().unicast.retain(|(a, _)| a != addr);
    }

    pub fn remove_multicast(&self, addr: &Ip6Addr) {
        self.lock().multicast.retain(|a| a != addr);
    }

    // Inspection.

    pub fn live_messages(&self) -> usize {
        self.live_msgs.load(Ordering::SeqCst)
    }

    pub fn sent_ip6(&self) -> Vec<Vec<u8>> {
        self.lock().sent.clone()
    }

    pub fn frames(&self) -> Vec<RecordedFrame> {
        self.lock().frames.clone()
    }

    pub fn diag_frames(&self) -> Vec<RecordedFrame> {
        self.lock().diag_frames.clone()
    }

    pub fn driver_polls(&self) -> usize {
        self.lock().driver_polls
    }

    pub fn channel(&self) -> u8 {
        self.lock().channel
    }

    pub fn pan_id(&self) -> u16 {
        self.lock().pan_id
    }

    pub fn eui64(&self) -> HwAddr {
        self.lock().eui64
    }

    pub fn ip6_enabled(&self) -> bool {
        self.lock().ip6_enabled
    }

    pub fn thread_enabled(&self) -> bool {
        self.lock().thread_enabled
    }

    pub fn receive_filter_enabled(&self) -> bool {
        self.lock().receive_filter
    }
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MeshEngine for FakeEngine {
    type Msg = FakeMsg;

    fn set_channel(&mut self, channel: u8) {
        self.lock().channel = channel;
    }

    fn set_pan_id(&mut self, pan_id: u16) {
        self.lock().pan_id = pan_id;
    }

    fn set_eui64(&mut self, eui64: HwAddr) {
        self.lock().eui64 = eui64;
    }

    fn set_ip6_enabled(&mut self, enabled: bool) {
        self.lock().ip6_enabled = enabled;
    }

    fn set_thread_enabled(&mut self, enabled: bool) {
        self.lock().thread_enabled = enabled;
        if enabled {
            self.lock().role = DeviceRole::Detached;
        }
    }

    fn set_receive_filter_enabled(&mut self, enabled: bool) {
        self.lock().receive_filter = enabled;
    }

    fn new_ip6_message(&mut self) -> Result<FakeMsg, MeshError> {
        let inner = self.lock();
        if inner.reject_new_message {
            return Err(MeshError::NoBufs);
        }
        let fail_at = inner.fail_append_at;
        drop(inner);
        Ok(FakeMsg::new(Vec::new(), fail_at, Arc::clone(&self.live_msgs)))
    }

    fn ip6_send(&mut self, msg: FakeMsg) -> Result<(), MeshError> {
        let mut inner = self.lock();
        if inner.reject_send {
            return Err(MeshError::EngineRejected);
        }
        inner.sent.push(msg.bytes.clone());
        Ok(())
    }

    fn radio_frame_received(&mut self, frame: &RadioFrame<'_>) {
        let mut inner = self.lock();
        let recorded = RecordedFrame::capture(frame);
        if inner.auto_deliver {
            inner.tasklets.push_back(Tasklet::DeliverIp6(recorded.psdu.clone()));
        }
        inner.frames.push(recorded);
    }

    fn diag_frame_received(&mut self, frame: &RadioFrame<'_>) {
        self.lock().diag_frames.push(RecordedFrame::capture(frame));
    }

    fn diag_mode_enabled(&self) -> bool {
        self.lock().diag_mode
    }

    fn tasklets_pending(&self) -> bool {
        !self.lock().tasklets.is_empty()
    }

    fn process_tasklets(&mut self) {
        let tasklet = self.lock().tasklets.pop_front();
        let Some(tasklet) = tasklet else {
            return;
        };
        let event = match tasklet {
            Tasklet::DeliverIp6(bytes) => EngineEvent::Ip6Receive(FakeMsg::new(
                bytes,
                None,
                Arc::clone(&self.live_msgs),
            )),
            Tasklet::StateChange(flags) => EngineEvent::StateChanged(flags),
        };
        self.lock().events.push(event);
    }

    fn process_drivers(&mut self) {
        self.lock().driver_polls += 1;
    }

    fn take_events(&mut self) -> Vec<EngineEvent<FakeMsg>> {
        std::mem::take(&mut self.lock().events)
    }

    fn add_unicast_address(&mut self, addr: Ip6Addr) -> Result<(), MeshError> {
        let mut inner = self.lock();
        if inner.unicast.iter().any(|(a, _)| *a == addr) {
            return Err(MeshError::AlreadyExists);
        }
        inner.unicast.push((addr, 64));
        Ok(())
    }

    fn add_multicast_address(&mut self, addr: Ip6Addr) -> Result<(), MeshError> {
        let mut inner = self.lock();
        if inner.multicast.contains(&addr) {
            return Err(MeshError::AlreadyExists);
        }
        inner.multicast.push(addr);
        Ok(())
    }

    fn unicast_addresses(&self) -> Vec<(Ip6Addr, u8)> {
        self.lock().unicast.clone()
    }

    fn multicast_addresses(&self) -> Vec<Ip6Addr> {
        self.lock().multicast.clone()
    }

    fn prefixes(&self) -> Vec<Ip6Prefix> {
        self.lock().prefixes.clone()
    }

    fn device_role(&self) -> DeviceRole {
        self.lock().role
    }

    fn version(&self) -> &'static str {
        "fake-mesh/0.1"
    }

    fn network_name(&self) -> String {
        self.lock().network_name.clone()
    }
}

struct IfaceInner {
    hw: HwAddr,
    queued: VecDeque<Pkt>,
    fail_recv: bool,
    recv_errors: usize,
    unicast: Vec<(Ip6Addr, u8)>,
    multicast: Vec<Ip6Addr>,
    prefixes: Vec<Ip6Prefix>,
}

/// Deterministic interface control surface. Accepted ingress packets queue
/// until the test (standing in for the stack) picks them up and feeds them
/// back through the L2 receive hook.
#[derive(Clone)]
pub struct FakeIface {
    inner: Arc<Mutex<IfaceInner>>,
    pool: FakePool,
}

impl FakeIface {
    pub fn new(pool: FakePool) -> Self {
        Self::with_hw_addr(pool, HwAddr([0x02, 0x12, 0x4b, 0x00, 0x00, 0x00, 0x00, 0x01]))
    }

    pub fn with_hw_addr(pool: FakePool, hw: HwAddr) -> Self {
        Self {
            inner: Arc::new(Mutex::new(IfaceInner {
                hw,
                queued: VecDeque::new(),
                fail_recv: false,
                recv_errors: 0,
                unicast: Vec::new(),
                multicast: Vec::new(),
                prefixes: Vec::new(),
            })),
            pool,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, IfaceInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn set_fail_recv(&self, fail: bool) {
        self.lock().fail_recv = fail;
    }

    /// Pops the next packet the stack would process (ingress order).
    pub fn next_delivered(&self) -> Option<Pkt> {
        self.lock().queued.pop_front()
    }

    pub fn delivered_count(&self) -> usize {
        self.lock().queued.len()
    }

    pub fn recv_errors(&self) -> usize {
        self.lock().recv_errors
    }

    pub fn unicast_table(&self) -> Vec<(Ip6Addr, u8)> {
        self.lock().unicast.clone()
    }

    pub fn multicast_table(&self) -> Vec<Ip6Addr> {
        self.lock().multicast.clone()
    }

    pub fn prefix_table(&self) -> Vec<Ip6Prefix> {
        self.lock().prefixes.clone()
    }
}

impl NetIfCtl for FakeIface {
    fn hw_addr(&self) -> HwAddr {
        self.lock().hw
    }

    fn recv_data(&mut self, pkt: Pkt) -> Result<(), MeshError> {
        let mut inner = self.lock();
        if inner.fail_recv {
            inner.recv_errors += 1;
            drop(inner);
            self.pool.release(pkt);
            return Err(MeshError::NoBufs);
        }
        inner.queued.push_back(pkt);
        Ok(())
    }

    fn add_unicast(&mut self, addr: Ip6Addr, prefix_len: u8) -> Result<(), MeshError> {
        let mut inner = self.lock();
        if inner.unicast.iter().any(|(a, _)| *a == addr) {
            return Err(MeshError::AlreadyExists);
        }
        inner.unicast.push((addr, prefix_len));
        Ok(())
    }

    fn rm_unicast(&mut self, addr: &Ip6Addr) {
        self.lock().unicast.retain(|(a, _)| a != addr);
    }

    fn add_multicast(&mut self, addr: Ip6Addr) -> Result<(), MeshError> {
        let mut inner = self.lock();
        if inner.multicast.contains(&addr) {
            return Err(MeshError::AlreadyExists);
        }
        inner.multicast.push(addr);
        Ok(())
    }

    fn rm_multicast(&mut self, addr: &Ip6Addr) {
        self.lock().multicast.retain(|a| a != addr);
    }

    fn add_prefix(&mut self, prefix: Ip6Prefix) -> Result<(), MeshError> {
        let mut inner = self.lock();
        if inner.prefixes.contains(&prefix) {
            return Err(MeshError::AlreadyExists);
        }
        inner.prefixes.push(prefix);
        Ok(())
    }

    fn unicast_addrs(&self) -> Vec<Ip6Addr> {
        self.lock().unicast.iter().map(|(a, _)| *a).collect()
    }

    fn multicast_addrs(&self) -> Vec<Ip6Addr> {
        self.lock().multicast.clone()
    }
}
