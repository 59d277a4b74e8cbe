// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! IPv6 address mirroring between the interface tables and the engine.
//!
//! Both directions are idempotent in effect: duplicate adds are demoted to a
//! debug trace, removals of absent entries are no-ops.

use log::{debug, error};

use nexus_mesh::{IfaceAddrEvent, MeshEngine, MeshError, NetIfCtl};

/// Pushes a freshly announced interface address into the engine's tables.
pub(crate) fn push_iface_event<E: MeshEngine>(engine: &mut E, event: IfaceAddrEvent) {
    let (kind, result) = match event {
        IfaceAddrEvent::UnicastAdded(addr) => ("unicast", engine.add_unicast_address(addr)),
        IfaceAddrEvent::MulticastAdded(addr) => ("multicast", engine.add_multicast_address(addr)),
    };
    note_add(kind, result);
}

/// Removes interface entries the engine no longer holds (address-removed facet).
pub(crate) fn prune_iface<E: MeshEngine, N: NetIfCtl>(engine: &E, netif: &mut N) {
    let unicast = engine.unicast_addresses();
    for addr in netif.unicast_addrs() {
        if !unicast.iter().any(|(a, _)| *a == addr) {
            debug!("mesh l2: removing unicast {addr}");
            netif.rm_unicast(&addr);
        }
    }

    let multicast = engine.multicast_addresses();
    for addr in netif.multicast_addrs() {
        if !multicast.contains(&addr) {
            debug!("mesh l2: leaving multicast {addr}");
            netif.rm_multicast(&addr);
        }
    }
}

/// Adds engine prefixes, unicast addresses and multicast memberships missing
/// from the interface (address-added facet).
pub(crate) fn mirror_engine<E: MeshEngine, N: NetIfCtl>(engine: &E, netif: &mut N) {
    for prefix in engine.prefixes() {
        note_add("prefix", netif.add_prefix(prefix));
    }
    for (addr, prefix_len) in engine.unicast_addresses() {
        note_add("unicast", netif.add_unicast(addr, prefix_len));
    }
    for addr in engine.multicast_addresses() {
        note_add("multicast", netif.add_multicast(addr));
    }
}

fn note_add(kind: &str, result: Result<(), MeshError>) {
    match result {
        Ok(()) => {}
        Err(MeshError::AlreadyExists) => debug!("mesh l2: {kind} entry already mirrored"),
        Err(err) => error!("mesh l2: failed to mirror {kind} entry: {err}"),
    }
}
