// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the device URI parser and the health
// tracker's per-request bookkeeping — both on the hot path of every
// job dispatch.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use pressd_core::DeviceUri;
use pressd_print::HealthTracker;

fn bench_device_uri_parse(c: &mut Criterion) {
    let uris = [
        "socket://192.168.1.50:9100/",
        "usb://04b8:0202?serial=X3J201847",
        "dnssd://Canon-MX920._pdl-datastream._tcp.local./",
        "snmp://192.168.1.50/",
    ];

    let mut group = c.benchmark_group("device_uri_parse");
    for uri in uris {
        group.bench_function(uri, |b| {
            b.iter(|| {
                let parsed = DeviceUri::parse(black_box(uri));
                black_box(parsed).ok();
            });
        });
    }
    group.finish();
}

fn bench_health_tracker_request_cycle(c: &mut Criterion) {
    c.bench_function("health_tracker_success_cycle", |b| {
        let mut tracker = HealthTracker::new();
        b.iter(|| {
            let uri = "socket://192.168.1.50:9100/";
            black_box(tracker.allow_request(uri));
            tracker.record_success(uri);
        });
    });
}

criterion_group!(benches, bench_device_uri_parse, bench_health_tracker_request_cycle);
criterion_main!(benches);
