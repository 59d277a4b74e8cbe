// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Integration tests for the mesh L2 adapter over the fake backends
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable
//! TEST_COVERAGE: 11 integration tests
//!
//! TEST_SCOPE:
//!   - Loopback disambiguation at the shared receive entry point
//!   - Exactly-once release of packets and messages on success and error paths
//!   - Bidirectional address mirroring
//!   - Worker liveness under the at-least-once wake contract
//!
//! DEPENDENCIES:
//!   - nexus_mesh::fake::{FakeEngine, FakeIface, FakePool}: deterministic
//!     counting backends

use std::thread;
use std::time::{Duration, Instant};

use nexus_mesh::fake::{FakeEngine, FakeIface, FakePool};
use nexus_mesh::{
    DeviceRole, IfaceAddrEvent, Ip6Addr, LinkLayerDriver, MeshEngine, MeshError, NetIfCtl, Pkt,
    PktPool, StateFlags, Verdict, FRAG_CAPACITY,
};
use nexus_mesh_l2::{MeshAdapter, MeshL2Config};

fn setup(config: MeshL2Config) -> (FakeEngine, FakeIface, FakePool, std::sync::Arc<MeshAdapter<FakeEngine, FakeIface, FakePool>>) {
    let engine = FakeEngine::new();
    let pool = FakePool::new();
    let iface = FakeIface::new(pool.clone());
    let adapter = MeshAdapter::init(engine.clone(), iface.clone(), pool.clone(), config);
    (engine, iface, pool, adapter)
}

fn make_pkt(pool: &mut FakePool, payload: &[u8]) -> Pkt {
    let mut pkt = pool.alloc_pkt().expect("pkt");
    for chunk in payload.chunks(FRAG_CAPACITY) {
        let mut frag = pool.alloc_frag().expect("frag");
        frag.append(chunk).expect("fill");
        pkt.chain(frag);
    }
    pkt
}

fn addr(tail: u8) -> Ip6Addr {
    let mut bytes = [0u8; 16];
    bytes[0] = 0xfd;
    bytes[15] = tail;
    Ip6Addr(bytes)
}

#[test]
fn init_configures_engine_once() {
    let (engine, iface, _pool, adapter) = setup(MeshL2Config::default());
    assert_eq!(engine.channel(), nexus_mesh_l2::DEFAULT_CHANNEL);
    assert_eq!(engine.pan_id(), nexus_mesh_l2::DEFAULT_PAN_ID);
    assert_eq!(engine.eui64(), iface.hw_addr());
    assert!(engine.ip6_enabled());
    assert!(engine.thread_enabled());
    assert!(engine.receive_filter_enabled());
    assert_eq!(adapter.reserve_header(), 0);
    assert_eq!(engine.device_role(), DeviceRole::Detached);
}

#[test]
fn injected_packet_passes_through_without_frame_decoding() {
    let (engine, iface, mut pool, adapter) = setup(MeshL2Config::default());
    engine.schedule_ip6_delivery(b"self-injected".to_vec());
    adapter.poll_engine();

    assert_eq!(adapter.inflight_loopback(), 1);
    let pkt = iface.next_delivered().expect("delivered upward");
    assert_eq!(pkt.payload(), b"self-injected");

    match adapter.recv(pkt) {
        Verdict::Continue(pkt) => {
            // The stack keeps processing and eventually releases the packet.
            pool.release(pkt);
        }
        Verdict::Handled => panic!("injected packet must pass through"),
    }
    assert_eq!(adapter.inflight_loopback(), 0);
    assert!(engine.frames().is_empty());
    assert_eq!(engine.live_messages(), 0);
    assert_eq!(pool.live_pkts(), 0);
    assert_eq!(pool.live_frags(), 0);
}

#[test]
fn genuine_frame_is_handed_to_engine_and_released() {
    let (engine, _iface, mut pool, adapter) = setup(MeshL2Config::default());
    let mut pkt = make_pkt(&mut pool, &[0x61; 40]);
    pkt.set_lqi(200);
    pkt.set_rssi(-42);

    assert!(matches!(adapter.recv(pkt), Verdict::Handled));

    let frames = engine.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].psdu, vec![0x61; 40]);
    assert_eq!(frames[0].len, 40);
    assert_eq!(frames[0].channel, nexus_mesh_l2::DEFAULT_CHANNEL);
    assert_eq!(frames[0].lqi, 200);
    assert_eq!(frames[0].rssi, -42);
    assert_eq!(pool.live_pkts(), 0);
    assert_eq!(pool.live_frags(), 0);
}

#[test]
fn diag_mode_routes_frames_to_diagnostics() {
    let (engine, _iface, mut pool, adapter) = setup(MeshL2Config::default());
    engine.set_diag_mode(true);
    let pkt = make_pkt(&mut pool, &[0x7e; 16]);

    assert!(matches!(adapter.recv(pkt), Verdict::Handled));
    assert!(engine.frames().is_empty());
    assert_eq!(engine.diag_frames().len(), 1);
    assert_eq!(pool.live_pkts(), 0);
}

#[test]
fn loopback_overflow_drops_packet_instead_of_duplicating() {
    let capacity = 3;
    let (engine, iface, pool, adapter) = setup(MeshL2Config {
        loopback_capacity: capacity,
        ..MeshL2Config::default()
    });

    for i in 0..capacity + 1 {
        engine.schedule_ip6_delivery(vec![i as u8; 8]);
    }
    adapter.poll_engine();

    // The overflowing packet was freed, not delivered and not leaked.
    assert_eq!(iface.delivered_count(), capacity);
    assert_eq!(adapter.inflight_loopback(), capacity);
    assert_eq!(pool.live_pkts(), capacity);
    assert_eq!(engine.live_messages(), 0);
}

#[test]
fn failed_ingress_delivery_unparks_the_identity() {
    let (engine, iface, pool, adapter) = setup(MeshL2Config::default());
    iface.set_fail_recv(true);
    engine.schedule_ip6_delivery(b"dropped".to_vec());
    adapter.poll_engine();

    assert_eq!(iface.recv_errors(), 1);
    assert_eq!(adapter.inflight_loopback(), 0);
    assert_eq!(pool.live_pkts(), 0);
    assert_eq!(pool.live_frags(), 0);
}

#[test]
fn address_sync_is_idempotent_in_both_directions() {
    let (engine, iface, _pool, adapter) = setup(MeshL2Config::default());

    // Stack → engine: the same announcement twice lands once.
    adapter.on_iface_addr_event(IfaceAddrEvent::UnicastAdded(addr(1)));
    adapter.on_iface_addr_event(IfaceAddrEvent::UnicastAdded(addr(1)));
    adapter.on_iface_addr_event(IfaceAddrEvent::MulticastAdded(addr(2)));
    assert_eq!(engine.unicast_addresses().len(), 1);
    assert_eq!(engine.multicast_addresses().len(), 1);

    // Engine → stack: the same address-added facet in two notifications.
    engine.insert_unicast(addr(3), 64);
    engine.schedule_state_change(StateFlags::IP6_ADDRESS_ADDED);
    engine.schedule_state_change(StateFlags::IP6_ADDRESS_ADDED);
    adapter.poll_engine();
    let mirrored: Vec<_> =
        iface.unicast_table().into_iter().filter(|(a, _)| *a == addr(3)).collect();
    assert_eq!(mirrored.len(), 1);

    // Removal facet prunes what the engine dropped.
    engine.remove_unicast(&addr(3));
    engine.schedule_state_change(StateFlags::IP6_ADDRESS_REMOVED);
    adapter.poll_engine();
    assert!(!iface.unicast_table().iter().any(|(a, _)| *a == addr(3)));
}

#[test]
fn worker_processes_pending_work_after_one_signal() {
    let (engine, iface, mut pool, adapter) = setup(MeshL2Config::default());
    let worker = adapter.clone().spawn_worker().expect("spawn worker");

    engine.schedule_ip6_delivery(b"wake".to_vec());
    adapter.signal_work();

    let deadline = Instant::now() + Duration::from_secs(5);
    while iface.delivered_count() == 0 {
        assert!(Instant::now() < deadline, "worker never picked up pending work");
        thread::sleep(Duration::from_millis(1));
    }
    assert!(engine.driver_polls() > 0);

    let pkt = iface.next_delivered().expect("delivered");
    match adapter.recv(pkt) {
        Verdict::Continue(pkt) => pool.release(pkt),
        Verdict::Handled => panic!("injected packet must pass through"),
    }
    worker.shutdown();
    assert_eq!(pool.live_pkts(), 0);
}

#[test]
fn send_translates_whole_chain_into_one_engine_message() {
    let (engine, _iface, mut pool, adapter) = setup(MeshL2Config::default());
    let payload: Vec<u8> = (0..300u16).map(|i| i as u8).collect();
    let pkt = make_pkt(&mut pool, &payload);
    assert_eq!(pkt.frags().len(), 3);

    adapter.send(pkt).expect("send");

    assert_eq!(engine.sent_ip6(), vec![payload]);
    assert_eq!(engine.live_messages(), 0);
    assert_eq!(pool.live_pkts(), 0);
    assert_eq!(pool.live_frags(), 0);
}

#[test]
fn send_append_failure_leaks_nothing_and_reports_once() {
    let (engine, _iface, mut pool, adapter) = setup(MeshL2Config::default());
    engine.set_fail_append_at(2);
    let pkt = make_pkt(&mut pool, &[0x33; 300]);

    assert_eq!(adapter.send(pkt).unwrap_err(), MeshError::EngineRejected);
    assert!(engine.sent_ip6().is_empty());
    assert_eq!(engine.live_messages(), 0);
    assert_eq!(pool.live_pkts(), 0);
    assert_eq!(pool.live_frags(), 0);
}

#[test]
fn radio_frame_echo_travels_the_full_pipeline() {
    let (engine, iface, mut pool, adapter) = setup(MeshL2Config::default());
    engine.set_auto_deliver(true);

    let frame = make_pkt(&mut pool, &[0x11; 60]);
    assert!(matches!(adapter.recv(frame), Verdict::Handled));

    // The engine echoes the frame payload back as an IPv6 delivery.
    adapter.poll_engine();
    let pkt = iface.next_delivered().expect("echoed datagram");
    assert_eq!(pkt.payload(), vec![0x11; 60]);
    match adapter.recv(pkt) {
        Verdict::Continue(pkt) => pool.release(pkt),
        Verdict::Handled => panic!("echoed packet must pass through"),
    }
    assert_eq!(pool.live_pkts(), 0);
    assert_eq!(pool.live_frags(), 0);
}
