// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
//! CONTEXT: meshd daemon entrypoint
//! OWNERS: @runtime
//! STATUS: Bring-up
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Host tests in `source/services/meshd/tests/`
//!
//! ADR: docs/adr/0019-mesh-l2-architecture.md

fn main() -> ! {
    // Host builds have no radio-backed engine to bind yet; the service logic
    // is exercised by the host tests. The OS target wires the real engine and
    // interface here.
    println!("meshd: host build, no radio backend");
    loop {
        core::hint::spin_loop();
    }
}
