// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the ordered-dither inner loop at typical
// printable-page row widths.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use pressd_raster::dither_row;

/// Dithering a single row at widths from a narrow receipt printer up to a
/// 300 dpi letter-width page.
fn bench_dither_row(c: &mut Criterion) {
    let widths: &[(&str, u32)] = &[
        ("384px (58mm receipt)", 384),
        ("1200px (4in @ 300dpi)", 1200),
        ("2550px (letter @ 300dpi)", 2550),
    ];

    let mut group = c.benchmark_group("dither_row");
    for &(label, width) in widths {
        let row = vec![128u8; width as usize];
        group.bench_function(label, |b| {
            b.iter(|| {
                let packed = dither_row(black_box(&row), black_box(width), black_box(0));
                black_box(packed);
            });
        });
    }
    group.finish();
}

/// Dithering a full letter-size page (2550x3300 @ 300dpi) row by row.
fn bench_dither_full_page(c: &mut Criterion) {
    let width = 2550u32;
    let height = 3300u32;
    let row = vec![128u8; width as usize];

    c.bench_function("dither_full_page (2550x3300)", |b| {
        b.iter(|| {
            for y in 0..height {
                let packed = dither_row(black_box(&row), width, y);
                black_box(packed);
            }
        });
    });
}

criterion_group!(benches, bench_dither_row, bench_dither_full_page);
criterion_main!(benches);
