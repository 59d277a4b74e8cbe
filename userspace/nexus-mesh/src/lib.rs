// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Userspace mesh networking contract v1 (Thread/802.15.4 L2 facade)
//! OWNERS: @runtime
//! STATUS: Experimental
//! API_STABILITY: Unstable
//! TEST_COVERAGE: 7 unit tests (fake backend self-checks)
//!
//! PUBLIC API:
//!   - MeshError: cross-backend error model for the mesh L2 facade
//!   - Pkt/Frag/PktId: fragment-chain packet model with pool-assigned identity
//!   - Ip6Addr/Ip6Prefix/HwAddr: basic address types (IPv6 + EUI-64)
//!   - StateFlags: engine state-change facet bitmask
//!   - RadioFrame: borrowed view of a received 802.15.4 frame
//!   - Facade traits: PktPool, NetIfCtl, MeshEngine, MeshMessage, LinkLayerDriver
//!   - Fake backends (host tests): fake::{FakeEngine, FakePool, FakeIface}
//!
//! TEST_SCENARIOS (implemented):
//!   - fake_pool_enforces_budget_and_accounting()
//!   - fake_msg_chunked_read_is_lossless()
//!   - fake_msg_append_failure_is_injectable()
//!   - fake_engine_send_consumes_message_on_success_and_failure()
//!   - fake_engine_address_add_is_idempotent()
//!   - fake_engine_tasklets_emit_events_in_order()
//!   - fake_iface_releases_packet_on_delivery_failure()
//!
//! ADR: docs/adr/0019-mesh-l2-architecture.md

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

/// Fixed capacity of a single packet fragment, in bytes.
pub const FRAG_CAPACITY: usize = 128;

/// Mesh L2 facade error model (v1).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeshError {
    /// Bounded packet/fragment/message resources exhausted (explicit backpressure).
    NoBufs,
    /// Loopback disambiguation queue is at capacity; the packet must be dropped.
    QueueFull,
    /// The protocol engine refused a message append or send.
    EngineRejected,
    /// Table entry already present (idempotent adds report this, callers demote it).
    AlreadyExists,
    /// Unexpected internal failure; must not be used to hide normal flow control.
    Internal(&'static str),
}

impl fmt::Display for MeshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeshError::NoBufs => write!(f, "no buffers"),
            MeshError::QueueFull => write!(f, "loopback queue full"),
            MeshError::EngineRejected => write!(f, "engine rejected"),
            MeshError::AlreadyExists => write!(f, "already exists"),
            MeshError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for MeshError {}

/// IPv6 address (16 bytes, network order).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Ip6Addr(pub [u8; 16]);

impl fmt::Display for Ip6Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Full form, no zero compression; good enough for diagnostics.
        for (i, pair) in self.0.chunks_exact(2).enumerate() {
            if i > 0 {
                write!(f, ":")?;
            }
            write!(f, "{:x}", u16::from_be_bytes([pair[0], pair[1]]))?;
        }
        Ok(())
    }
}

/// IPv6 on-mesh prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ip6Prefix {
    pub addr: Ip6Addr,
    pub len: u8,
}

/// Link-layer hardware address (EUI-64).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HwAddr(pub [u8; 8]);

/// Pool-assigned packet identity. Loopback matching compares identities, never content.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PktId(pub u64);

/// One fixed-capacity buffer fragment.
#[derive(Clone)]
pub struct Frag {
    data: [u8; FRAG_CAPACITY],
    len: usize,
}

impl Frag {
    pub fn new() -> Self {
        Self { data: [0; FRAG_CAPACITY], len: 0 }
    }

    /// Bytes committed so far.
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Free capacity remaining at the tail.
    pub fn tailroom(&self) -> usize {
        FRAG_CAPACITY - self.len
    }

    /// Mutable view of the free tail; pair with [`Frag::commit`].
    pub fn tail_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.len..]
    }

    /// Commits `count` bytes previously written into [`Frag::tail_mut`].
    /// Counts beyond the free capacity are clamped.
    pub fn commit(&mut self, count: usize) {
        self.len += count.min(FRAG_CAPACITY - self.len);
    }

    /// Appends `bytes` to the fragment, failing if they do not fit.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), MeshError> {
        if bytes.len() > self.tailroom() {
            return Err(MeshError::NoBufs);
        }
        self.data[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }
}

impl Default for Frag {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Frag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frag").field("len", &self.len).finish()
    }
}

/// One link/network-layer datagram: an ordered chain of fragments plus radio
/// metadata. Single owner at any time; ownership moves on every hand-off and
/// the packet is released back to its pool exactly once.
#[derive(Debug)]
pub struct Pkt {
    id: PktId,
    frags: Vec<Frag>,
    lqi: u8,
    rssi: i8,
}

impl Pkt {
    /// Pools assign identity; nothing else should mint packets.
    pub fn new(id: PktId) -> Self {
        Self { id, frags: Vec::new(), lqi: 0, rssi: 0 }
    }

    pub fn id(&self) -> PktId {
        self.id
    }

    pub fn frags(&self) -> &[Frag] {
        &self.frags
    }

    /// Chains a fragment at the tail, preserving read order.
    pub fn chain(&mut self, frag: Frag) {
        self.frags.push(frag);
    }

    /// Total payload length across the whole chain.
    pub fn total_len(&self) -> usize {
        self.frags.iter().map(Frag::len).sum()
    }

    /// Copies the chained payload out; diagnostics and test helper.
    pub fn payload(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total_len());
        for frag in &self.frags {
            out.extend_from_slice(frag.bytes());
        }
        out
    }

    pub fn lqi(&self) -> u8 {
        self.lqi
    }

    pub fn set_lqi(&mut self, lqi: u8) {
        self.lqi = lqi;
    }

    pub fn rssi(&self) -> i8 {
        self.rssi
    }

    pub fn set_rssi(&mut self, rssi: i8) {
        self.rssi = rssi;
    }
}

/// Bitmask of engine state facets that changed in one notification.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct StateFlags(u32);

impl StateFlags {
    pub const IP6_ADDRESS_ADDED: StateFlags = StateFlags(1 << 0);
    pub const IP6_ADDRESS_REMOVED: StateFlags = StateFlags(1 << 1);
    pub const ROLE: StateFlags = StateFlags(1 << 3);

    pub const fn from_bits(bits: u32) -> Self {
        StateFlags(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: StateFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for StateFlags {
    type Output = StateFlags;

    fn bitor(self, rhs: StateFlags) -> StateFlags {
        StateFlags(self.0 | rhs.0)
    }
}

impl fmt::Debug for StateFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateFlags(0x{:08x})", self.0)
    }
}

/// Borrowed view of a received 802.15.4 frame handed to the engine.
///
/// `len` covers the whole chain including the frame-check sequence; `psdu`
/// points at the final fragment, which is where radio drivers place the frame.
#[derive(Debug)]
pub struct RadioFrame<'a> {
    pub psdu: &'a [u8],
    pub len: usize,
    pub channel: u8,
    pub lqi: u8,
    pub rssi: i8,
}

/// Mesh device role as reported by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceRole {
    Disabled,
    Detached,
    Child,
    Router,
    Leader,
}

/// Notifications the engine queues for its owner; drained on the worker thread.
#[derive(Debug)]
pub enum EngineEvent<M> {
    /// An IPv6 datagram addressed to this node; ownership of the message
    /// transfers to the receiver, which must free it exactly once.
    Ip6Receive(M),
    /// One or more state facets changed.
    StateChanged(StateFlags),
}

/// Interface address-table events mirrored into the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IfaceAddrEvent {
    UnicastAdded(Ip6Addr),
    MulticastAdded(Ip6Addr),
}

/// Verdict returned to the stack from the L2 receive hook.
#[derive(Debug)]
pub enum Verdict {
    /// Keep processing; packet ownership returns to the stack.
    Continue(Pkt),
    /// The L2 consumed (and released) the packet.
    Handled,
}

/// Bounded allocator for packets and fragments. Implementations are
/// deterministic and account every live object.
pub trait PktPool {
    fn alloc_pkt(&mut self) -> Result<Pkt, MeshError>;
    fn alloc_frag(&mut self) -> Result<Frag, MeshError>;
    /// Returns an unchained fragment to the pool.
    fn release_frag(&mut self, frag: Frag);
    /// Releases a packet and every fragment chained into it.
    fn release(&mut self, pkt: Pkt);
}

/// Control surface of the owning network interface: ingress delivery plus the
/// IPv6 address/multicast/prefix tables.
pub trait NetIfCtl {
    fn hw_addr(&self) -> HwAddr;

    /// Delivers a packet into the stack's ingress path. Consumes the packet;
    /// on failure the interface has already released it.
    fn recv_data(&mut self, pkt: Pkt) -> Result<(), MeshError>;

    fn add_unicast(&mut self, addr: Ip6Addr, prefix_len: u8) -> Result<(), MeshError>;
    fn rm_unicast(&mut self, addr: &Ip6Addr);
    fn add_multicast(&mut self, addr: Ip6Addr) -> Result<(), MeshError>;
    fn rm_multicast(&mut self, addr: &Ip6Addr);
    fn add_prefix(&mut self, prefix: Ip6Prefix) -> Result<(), MeshError>;

    fn unicast_addrs(&self) -> Vec<Ip6Addr>;
    fn multicast_addrs(&self) -> Vec<Ip6Addr>;
}

/// Engine-owned message buffer: sequential append, random-offset chunked read.
pub trait MeshMessage {
    fn append(&mut self, bytes: &[u8]) -> Result<(), MeshError>;

    /// Copies up to `buf.len()` bytes starting at `offset`; returns the count
    /// actually read (zero at or past the end).
    fn read(&self, offset: usize, buf: &mut [u8]) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Facade over the mesh protocol engine instance. One instance per interface,
/// exclusively owned by the adapter context that created it.
pub trait MeshEngine {
    type Msg: MeshMessage;

    // One-shot configuration, applied at interface init.
    fn set_channel(&mut self, channel: u8);
    fn set_pan_id(&mut self, pan_id: u16);
    fn set_eui64(&mut self, eui64: HwAddr);
    fn set_ip6_enabled(&mut self, enabled: bool);
    fn set_thread_enabled(&mut self, enabled: bool);
    fn set_receive_filter_enabled(&mut self, enabled: bool);

    /// Allocates a new outbound IPv6 message.
    fn new_ip6_message(&mut self) -> Result<Self::Msg, MeshError>;

    /// Submits a message for transmission. Takes ownership on success and
    /// failure alike; the engine frees rejected messages itself.
    fn ip6_send(&mut self, msg: Self::Msg) -> Result<(), MeshError>;

    /// Reports a received radio frame. Delivery is unconditionally reported
    /// as successful to the engine.
    fn radio_frame_received(&mut self, frame: &RadioFrame<'_>);
    /// Diagnostics-mode variant of [`MeshEngine::radio_frame_received`].
    fn diag_frame_received(&mut self, frame: &RadioFrame<'_>);
    fn diag_mode_enabled(&self) -> bool;

    // Cooperative scheduling: level-triggered internal work plus one driver
    // polling hook per worker pass.
    fn tasklets_pending(&self) -> bool;
    fn process_tasklets(&mut self);
    fn process_drivers(&mut self);
    /// Drains queued notifications; called by the worker with no other engine
    /// borrow held.
    fn take_events(&mut self) -> Vec<EngineEvent<Self::Msg>>;

    // Address tables.
    fn add_unicast_address(&mut self, addr: Ip6Addr) -> Result<(), MeshError>;
    fn add_multicast_address(&mut self, addr: Ip6Addr) -> Result<(), MeshError>;
    fn unicast_addresses(&self) -> Vec<(Ip6Addr, u8)>;
    fn multicast_addresses(&self) -> Vec<Ip6Addr>;
    fn prefixes(&self) -> Vec<Ip6Prefix>;

    fn device_role(&self) -> DeviceRole;
    fn version(&self) -> &'static str;
    fn network_name(&self) -> String;
}

/// The link-layer surface registered with the stack for this interface type.
pub trait LinkLayerDriver {
    /// Receive hook: classifies an inbound delivery and returns a verdict.
    fn recv(&self, pkt: Pkt) -> Verdict;
    /// Send hook: hands an IPv6 datagram to the engine for mesh transmission.
    fn send(&self, pkt: Pkt) -> Result<(), MeshError>;
    /// Header bytes to reserve ahead of payloads (zero for this L2).
    fn reserve_header(&self) -> usize;
    /// Radio acknowledgements need no L2 handling here.
    fn handle_ack(&self, pkt: Pkt) -> Verdict;
    /// Direct radio transmit is owned by the engine and must never be called
    /// on this interface type.
    fn radio_send(&self, pkt: Pkt) -> Result<(), MeshError>;
}

#[cfg(feature = "std")]
pub mod fake;
