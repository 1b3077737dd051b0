// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for printer creation and job submission through
// the `System` container — the path every Print-Job request takes.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pressd_core::SystemConfig;
use pressd_ipp::backend::IppBackend;
use pressd_security::AuditLog;
use pressd_system::System;

fn test_system(spool_dir: &std::path::Path) -> std::sync::Arc<System> {
    let mut config = SystemConfig::default();
    config.spool_dir = spool_dir.to_string_lossy().into_owned();
    System::new(config, AuditLog::open_in_memory().unwrap(), "bench-system", HashMap::new(), BTreeSet::new(), BTreeSet::new())
}

fn bench_create_printer(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let system = test_system(dir.path());
    let mut counter = 0u32;

    c.bench_function("create_printer", |b| {
        b.iter(|| {
            counter += 1;
            let name = format!("printer-{counter}");
            rt.block_on(async {
                black_box(system.create_printer(&name, "socket://10.0.0.5:9100/", "generic").await.unwrap());
            });
        });
    });
}

fn bench_create_job(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let system = test_system(dir.path());
    rt.block_on(async {
        system.create_printer("office", "socket://10.0.0.5:9100/", "generic").await.unwrap();
    });

    c.bench_function("create_job", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(
                    system
                        .create_job("office", "bench.raster", "image/pwg-raster", "alice", BTreeMap::new(), vec![0u8; 256])
                        .await
                        .unwrap(),
                );
            });
        });
    });
}

criterion_group!(benches, bench_create_printer, bench_create_job);
criterion_main!(benches);
