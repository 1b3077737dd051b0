// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for integrity hashing and audit logging.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use pressd_security::{hash_bytes, AuditLog};

/// SHA-256 integrity hashing at sizes from a small status page to a full
/// scanned-page raster.
fn bench_integrity_hash(c: &mut Criterion) {
    let sizes: &[(&str, usize)] = &[
        ("1 KiB", 1024),
        ("10 KiB", 10 * 1024),
        ("100 KiB", 100 * 1024),
        ("1 MiB", 1024 * 1024),
    ];

    let mut group = c.benchmark_group("integrity_hash_sha256");
    for &(label, size) in sizes {
        let data = vec![0xABu8; size];
        group.bench_function(label, |b| {
            b.iter(|| {
                let hex = hash_bytes(black_box(&data));
                black_box(hex);
            });
        });
    }
    group.finish();
}

/// Recording an audit entry to an in-memory SQLite database, including
/// WAL journalling overhead.
fn bench_audit_record(c: &mut Criterion) {
    c.bench_function("audit_record (in-memory SQLite)", |b| {
        let log = AuditLog::open_in_memory().expect("open in-memory audit log");

        b.iter(|| {
            log.record(
                black_box("alice"),
                black_box("print-job"),
                black_box("job"),
                black_box("01234567-89ab-cdef-0123-456789abcdef"),
                black_box(true),
                black_box(Some("benchmark entry")),
            )
            .expect("record failed");
        });
    });
}

criterion_group!(benches, bench_integrity_hash, bench_audit_record);
criterion_main!(benches);
