// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Top-level container tying pressd's core types, security primitives,
// raster pipeline, device transports, and IPP protocol layer into one
// running printer application: the `System`, its printer registry, and
// the per-printer worker loop that actually moves bytes to hardware.

mod announce;
mod state;
mod system;
mod worker;

pub use system::System;
