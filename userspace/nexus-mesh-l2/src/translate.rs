// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Lossless translation between fragment-chain packets and engine messages.
//!
//! Both directions are pure hand-offs: no shared state, and every packet,
//! fragment and message is released exactly once on every path, error
//! branches included.

use nexus_mesh::{MeshEngine, MeshError, MeshMessage, Pkt, PktPool};

/// Builds a packet from an engine message (engine → stack direction).
///
/// Fragments are filled by chunked reads at a running offset and chained in
/// read order; a zero-length read terminates the loop and that fragment goes
/// back to the pool unused. The message is consumed and freed exactly once
/// regardless of where a failure occurs.
pub fn msg_to_pkt<P: PktPool, M: MeshMessage>(pool: &mut P, msg: M) -> Result<Pkt, MeshError> {
    let mut pkt = match pool.alloc_pkt() {
        Ok(pkt) => pkt,
        Err(err) => {
            drop(msg);
            return Err(err);
        }
    };

    let mut offset = 0;
    loop {
        let mut frag = match pool.alloc_frag() {
            Ok(frag) => frag,
            Err(err) => {
                pool.release(pkt);
                drop(msg);
                return Err(err);
            }
        };

        let read = msg.read(offset, frag.tail_mut());
        if read == 0 {
            pool.release_frag(frag);
            break;
        }
        frag.commit(read);
        pkt.chain(frag);
        offset += read;
    }

    drop(msg);
    Ok(pkt)
}

/// Builds an engine message from a packet (stack → engine direction).
///
/// Fragment payloads are appended sequentially in chain order. On any append
/// failure the partially built message is dropped and the engine's refusal is
/// reported; the source packet stays with the caller, which releases it at
/// its single release point whatever the outcome here.
pub fn pkt_to_msg<E: MeshEngine>(engine: &mut E, pkt: &Pkt) -> Result<E::Msg, MeshError> {
    let mut msg = engine.new_ip6_message()?;
    for frag in pkt.frags() {
        if msg.append(frag.bytes()).is_err() {
            drop(msg);
            return Err(MeshError::EngineRejected);
        }
    }
    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_mesh::fake::{FakeEngine, FakePool};
    use nexus_mesh::{MeshEngine, MeshMessage, FRAG_CAPACITY};

    fn message_with(engine: &mut FakeEngine, payload: &[u8]) -> <FakeEngine as MeshEngine>::Msg {
        let mut msg = engine.new_ip6_message().expect("msg");
        msg.append(payload).expect("append");
        msg
    }

    #[test]
    fn round_trip_preserves_payload_across_fragment_boundaries() {
        // Sub-fragment, exact-fragment and multi-fragment chains.
        for len in [0usize, 1, FRAG_CAPACITY - 1, FRAG_CAPACITY, FRAG_CAPACITY + 1, 300] {
            let mut engine = FakeEngine::new();
            let mut pool = FakePool::new();
            let payload: Vec<u8> = (0..len).map(|i| i as u8).collect();

            let msg = message_with(&mut engine, &payload);
            let pkt = msg_to_pkt(&mut pool, msg).expect("inbound");
            assert_eq!(pkt.total_len(), len);
            assert_eq!(pkt.payload(), payload);
            assert_eq!(pkt.frags().len(), len.div_ceil(FRAG_CAPACITY));

            let back = pkt_to_msg(&mut engine, &pkt).expect("outbound");
            let mut out = vec![0u8; len];
            assert_eq!(back.read(0, &mut out), len.min(out.len()));
            assert_eq!(out, payload);

            drop(back);
            pool.release(pkt);
            assert_eq!(engine.live_messages(), 0);
            assert_eq!(pool.live_pkts(), 0);
            assert_eq!(pool.live_frags(), 0);
        }
    }

    #[test]
    fn inbound_frag_exhaustion_releases_everything() {
        let mut engine = FakeEngine::new();
        let mut pool = FakePool::with_budget(4, 1);
        let msg = message_with(&mut engine, &[0xaa; 300]);

        assert_eq!(msg_to_pkt(&mut pool, msg).unwrap_err(), MeshError::NoBufs);
        assert_eq!(engine.live_messages(), 0);
        assert_eq!(pool.live_pkts(), 0);
        assert_eq!(pool.live_frags(), 0);
    }

    #[test]
    fn inbound_container_exhaustion_frees_message() {
        let mut engine = FakeEngine::new();
        let mut pool = FakePool::with_budget(0, 8);
        let msg = message_with(&mut engine, b"payload");

        assert_eq!(msg_to_pkt(&mut pool, msg).unwrap_err(), MeshError::NoBufs);
        assert_eq!(engine.live_messages(), 0);
    }

    #[test]
    fn outbound_append_failure_drops_partial_message() {
        let mut engine = FakeEngine::new();
        let mut pool = FakePool::new();
        engine.set_fail_append_at(2);

        let mut pkt = pool.alloc_pkt().expect("pkt");
        for _ in 0..3 {
            let mut frag = pool.alloc_frag().expect("frag");
            frag.append(&[0x55; FRAG_CAPACITY]).expect("fill");
            pkt.chain(frag);
        }

        assert_eq!(pkt_to_msg(&mut engine, &pkt).unwrap_err(), MeshError::EngineRejected);
        assert_eq!(engine.live_messages(), 0);

        // The source packet is untouched and still the caller's to release.
        assert_eq!(pkt.total_len(), 3 * FRAG_CAPACITY);
        pool.release(pkt);
        assert_eq!(pool.live_frags(), 0);
    }
}
