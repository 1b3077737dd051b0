// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raster print pipeline: PNG decode/rotate/scale/dither, the PWG/Apple
// raster stream reader, and the driver callback contract both paths
// write through.

pub mod driver;
pub mod png;
pub mod pwg;

pub use driver::{Driver, Orientation, PrintOptions};
pub use png::{decode_gray, dither_row, process_png, rotate, scale_to_fit, DITHER_MATRIX};
pub use pwg::{process_raster, PageHeader};
