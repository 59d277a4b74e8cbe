// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Per-interface adapter context and the radio frame dispatcher.
//!
//! One [`MeshAdapter`] exists per interface. It exclusively owns the engine
//! instance (shared only with the worker thread it spawns), caches the
//! interface link-layer address at init, and implements the link-layer
//! surface registered with the stack: receive verdict, send, header reserve,
//! ack handling and the never-reachable direct radio transmit.
//!
//! Threading: stack entry points run on whatever caller thread delivered the
//! event; engine notifications are handled on the worker thread. Lock order
//! is engine → pool/interface everywhere; the loopback queue serializes
//! itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use log::{debug, error, info, log_enabled, trace};
use parking_lot::Mutex;

use nexus_mesh::{
    EngineEvent, HwAddr, IfaceAddrEvent, LinkLayerDriver, MeshEngine, MeshError, NetIfCtl, Pkt,
    PktPool, RadioFrame, StateFlags, Verdict,
};

use crate::worker::{WorkSignal, WorkerHandle};
use crate::{addr_sync, translate, LoopbackQueue};
use crate::{DEFAULT_CHANNEL, DEFAULT_PAN_ID, PKT_LIST_CAPACITY};

/// Interface configuration, applied once at init.
#[derive(Clone, Debug)]
pub struct MeshL2Config {
    pub channel: u8,
    pub pan_id: u16,
    pub loopback_capacity: usize,
}

impl Default for MeshL2Config {
    fn default() -> Self {
        Self {
            channel: DEFAULT_CHANNEL,
            pan_id: DEFAULT_PAN_ID,
            loopback_capacity: PKT_LIST_CAPACITY,
        }
    }
}

/// Per-interface binding of stack, engine, pool and loopback state.
pub struct MeshAdapter<E: MeshEngine, N: NetIfCtl, P: PktPool> {
    engine: Arc<Mutex<E>>,
    netif: Mutex<N>,
    pool: Mutex<P>,
    loopback: LoopbackQueue,
    signal: Arc<WorkSignal>,
    hw_addr: HwAddr,
    config: MeshL2Config,
}

impl<E: MeshEngine, N: NetIfCtl, P: PktPool> MeshAdapter<E, N, P> {
    /// Interface init hook: configures the engine (channel, PAN id, cached
    /// EUI-64, IPv6/Thread enable, receive filter) and builds the context.
    pub fn init(mut engine: E, netif: N, pool: P, config: MeshL2Config) -> Arc<Self> {
        let hw_addr = netif.hw_addr();

        engine.set_channel(config.channel);
        engine.set_pan_id(config.pan_id);
        engine.set_eui64(hw_addr);
        engine.set_ip6_enabled(true);
        engine.set_thread_enabled(true);
        engine.set_receive_filter_enabled(true);

        info!(
            "mesh l2 up: engine {} network \"{}\" channel {} pan 0x{:04x}",
            engine.version(),
            engine.network_name(),
            config.channel,
            config.pan_id
        );

        Arc::new(Self {
            engine: Arc::new(Mutex::new(engine)),
            netif: Mutex::new(netif),
            pool: Mutex::new(pool),
            loopback: LoopbackQueue::new(config.loopback_capacity),
            signal: Arc::new(WorkSignal::new()),
            hw_addr,
            config,
        })
    }

    /// Link-layer address cached at init (EUI-64 source for the engine).
    pub fn hw_addr(&self) -> HwAddr {
        self.hw_addr
    }

    /// Posts a work wake. Any call site that changes engine-visible state
    /// must raise this after the change is visible.
    pub fn signal_work(&self) {
        self.signal.raise();
    }

    /// Self-injected packets currently parked between push and their matching
    /// receive call.
    pub fn inflight_loopback(&self) -> usize {
        self.loopback.len()
    }

    /// One scheduler pass: run pending engine tasklets to completion, poll
    /// drivers once, then dispatch the notifications that were produced.
    /// Called by the worker loop; deterministic tests may drive it directly.
    pub fn poll_engine(&self) {
        {
            let mut engine = self.engine.lock();
            while engine.tasklets_pending() {
                engine.process_tasklets();
            }
            engine.process_drivers();
        }

        // Handlers run with the engine lock released; they may take it again.
        let events = self.engine.lock().take_events();
        for event in events {
            self.handle_engine_event(event);
        }
    }

    /// Stack address-table event: mirror the new address into the engine.
    pub fn on_iface_addr_event(&self, event: IfaceAddrEvent) {
        {
            let mut engine = self.engine.lock();
            addr_sync::push_iface_event(&mut *engine, event);
        }
        self.signal.raise();
    }

    fn handle_engine_event(&self, event: EngineEvent<E::Msg>) {
        match event {
            EngineEvent::Ip6Receive(msg) => self.deliver_ip6(msg),
            EngineEvent::StateChanged(flags) => self.state_changed(flags),
        }
    }

    /// Engine-originated IPv6 datagram: translate, park the identity, inject
    /// into the stack's ingress path.
    fn deliver_ip6(&self, msg: E::Msg) {
        let pkt = {
            let mut pool = self.pool.lock();
            match translate::msg_to_pkt(&mut *pool, msg) {
                Ok(pkt) => pkt,
                Err(err) => {
                    error!("mesh l2: inbound translation failed: {err}");
                    return;
                }
            }
        };
        dump_pkt("mesh l2 rx ip6", &pkt);

        if self.loopback.push(pkt.id()).is_err() {
            info!("mesh l2: loopback queue full, dropping inbound packet");
            self.pool.lock().release(pkt);
            return;
        }
        if let Err(err) = self.netif.lock().recv_data(pkt) {
            error!("mesh l2: ingress delivery failed: {err}");
            // The interface already released the packet; drop its handle too.
            self.loopback.pop_newest();
        }
    }

    fn state_changed(&self, flags: StateFlags) {
        let engine = self.engine.lock();
        info!(
            "mesh l2: state changed, flags {flags:?}, role {:?}",
            engine.device_role()
        );

        let mut netif = self.netif.lock();
        if flags.contains(StateFlags::IP6_ADDRESS_REMOVED) {
            debug!("mesh l2: engine removed addresses");
            addr_sync::prune_iface(&*engine, &mut *netif);
        }
        if flags.contains(StateFlags::IP6_ADDRESS_ADDED) {
            debug!("mesh l2: engine added addresses");
            addr_sync::mirror_engine(&*engine, &mut *netif);
        }
    }
}

impl<E, N, P> MeshAdapter<E, N, P>
where
    E: MeshEngine + Send + 'static,
    N: NetIfCtl + Send + 'static,
    P: PktPool + Send + 'static,
{
    /// Spawns the engine worker: drain pending tasklets, poll drivers once,
    /// dispatch notifications, block on the work signal, repeat.
    pub fn spawn_worker(self: Arc<Self>) -> std::io::Result<WorkerHandle> {
        let stop = Arc::new(AtomicBool::new(false));
        let signal = Arc::clone(&self.signal);
        let worker_stop = Arc::clone(&stop);
        let adapter = self;
        let thread = thread::Builder::new().name("mesh-worker".into()).spawn(move || loop {
            adapter.poll_engine();
            if worker_stop.load(Ordering::Acquire) {
                break;
            }
            adapter.signal.wait();
        })?;
        Ok(WorkerHandle::new(stop, signal, thread))
    }
}

impl<E: MeshEngine, N: NetIfCtl, P: PktPool> LinkLayerDriver for MeshAdapter<E, N, P> {
    /// Classifies an inbound delivery: self-injected packets pass straight
    /// up; anything else is a genuine radio frame for the engine.
    fn recv(&self, pkt: Pkt) -> Verdict {
        if self.loopback.take_if_newest(pkt.id()) {
            debug!("mesh l2: passing self-injected packet to upper layers");
            dump_pkt("mesh l2 injected ip6", &pkt);
            return Verdict::Continue(pkt);
        }

        debug!("mesh l2: 802.15.4 frame, handing to engine");
        dump_pkt("mesh l2 rx 15.4", &pkt);

        if let Some(last) = pkt.frags().last() {
            let frame = RadioFrame {
                psdu: last.bytes(),
                // Chain length including the frame-check sequence.
                len: pkt.total_len(),
                // Per-packet channel is not threaded through yet.
                channel: self.config.channel,
                lqi: pkt.lqi(),
                rssi: pkt.rssi(),
            };
            let mut engine = self.engine.lock();
            if engine.diag_mode_enabled() {
                engine.diag_frame_received(&frame);
            } else {
                engine.radio_frame_received(&frame);
            }
        } else {
            error!("mesh l2: dropping 802.15.4 frame with no fragments");
        }

        self.pool.lock().release(pkt);
        self.signal.raise();
        Verdict::Handled
    }

    /// Hands an IPv6 datagram to the engine for mesh transmission. The source
    /// packet is released here on every path.
    fn send(&self, pkt: Pkt) -> Result<(), MeshError> {
        debug!("mesh l2: sending ip6 packet to engine");
        dump_pkt("mesh l2 tx ip6", &pkt);

        let result = {
            let mut engine = self.engine.lock();
            match translate::pkt_to_msg(&mut *engine, &pkt) {
                Ok(msg) => engine.ip6_send(msg),
                Err(err) => Err(err),
            }
        };

        self.pool.lock().release(pkt);
        self.signal.raise();

        if let Err(err) = result {
            error!("mesh l2: send failed: {err}");
            return Err(err);
        }
        Ok(())
    }

    fn reserve_header(&self) -> usize {
        0
    }

    fn handle_ack(&self, pkt: Pkt) -> Verdict {
        Verdict::Continue(pkt)
    }

    fn radio_send(&self, pkt: Pkt) -> Result<(), MeshError> {
        self.pool.lock().release(pkt);
        error!("mesh l2: direct radio send invoked; the engine owns the radio");
        debug_assert!(false, "direct radio send on mesh l2");
        Err(MeshError::Internal("direct radio send on mesh l2"))
    }
}

fn dump_pkt(label: &str, pkt: &Pkt) {
    if !log_enabled!(log::Level::Trace) {
        return;
    }
    for (i, frag) in pkt.frags().iter().enumerate() {
        trace!("{label}: frag {i} ({} bytes): {:02x?}", frag.len(), frag.bytes());
    }
}
