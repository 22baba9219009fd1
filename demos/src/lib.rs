// Copyright 2025 the Bracken Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Runnable demos for the Bracken broad-phase crates.
//!
//! See the `examples/` directory; run one with
//! `cargo run -p bracken_demos --example broadphase_sandbox`.
