// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for IPP request parsing and response building in
// the pressd-ipp crate.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use pressd_ipp::wire::{
    parse_request, ResponseBuilder, OP_CREATE_JOB_SUBSCRIPTIONS, OP_GET_PRINTER_ATTRIBUTES, OP_PRINT_JOB, STATUS_OK,
    TAG_END_OF_ATTRIBUTES, TAG_JOB_ATTRIBUTES, TAG_OPERATION_ATTRIBUTES, TAG_PRINTER_ATTRIBUTES, VALUE_TAG_CHARSET,
    VALUE_TAG_KEYWORD, VALUE_TAG_NAME, VALUE_TAG_NATURAL_LANGUAGE,
};

fn write_attr(buf: &mut Vec<u8>, value_tag: u8, name: &str, value: &[u8]) {
    buf.push(value_tag);
    buf.extend_from_slice(&(name.len() as u16).to_be_bytes());
    buf.extend_from_slice(name.as_bytes());
    buf.extend_from_slice(&(value.len() as u16).to_be_bytes());
    buf.extend_from_slice(value);
}

fn build_test_request(operation_id: u16, request_id: u32, attrs: &[(u8, &str, &[u8])], document: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.push(0x01);
    buf.push(0x01);
    buf.extend_from_slice(&operation_id.to_be_bytes());
    buf.extend_from_slice(&request_id.to_be_bytes());
    buf.push(TAG_OPERATION_ATTRIBUTES);
    write_attr(&mut buf, VALUE_TAG_CHARSET, "attributes-charset", b"utf-8");
    write_attr(&mut buf, VALUE_TAG_NATURAL_LANGUAGE, "attributes-natural-language", b"en");
    for &(tag, name, value) in attrs {
        write_attr(&mut buf, tag, name, value);
    }
    buf.push(TAG_END_OF_ATTRIBUTES);
    buf.extend_from_slice(document);
    buf
}

/// Parsing a minimal Get-Printer-Attributes request, and a Print-Job
/// request carrying a 4 KiB raster fragment.
fn bench_parse_request(c: &mut Criterion) {
    let minimal = build_test_request(OP_GET_PRINTER_ATTRIBUTES, 42, &[], &[]);
    c.bench_function("parse_request (minimal)", |b| {
        b.iter(|| {
            let result = parse_request(black_box(&minimal));
            assert!(result.is_ok());
        });
    });

    let attrs = vec![(VALUE_TAG_NAME, "job-name", b"Benchmark Print Job" as &[u8])];
    let doc = vec![0xABu8; 4096];
    let with_doc = build_test_request(OP_PRINT_JOB, 100, &attrs, &doc);
    c.bench_function("parse_request (4 KiB document)", |b| {
        b.iter(|| {
            let result = parse_request(black_box(&with_doc));
            assert!(result.is_ok());
        });
    });

    // A Create-Job-Subscriptions request with a multi-value notify-events
    // 1setOf, which exercises the additional-value scan in get_all_strings.
    let sub_attrs = vec![
        (VALUE_TAG_KEYWORD, "notify-events", b"job-created" as &[u8]),
        (VALUE_TAG_KEYWORD, "", b"job-completed"),
        (VALUE_TAG_KEYWORD, "", b"job-state-changed"),
    ];
    let sub_request = build_test_request(OP_CREATE_JOB_SUBSCRIPTIONS, 9, &sub_attrs, &[]);
    c.bench_function("parse_request (1setOf notify-events)", |b| {
        b.iter(|| {
            let result = parse_request(black_box(&sub_request));
            assert!(result.is_ok());
        });
    });
}

/// Building a response with operation and printer attribute groups.
fn bench_build_response(c: &mut Criterion) {
    c.bench_function("build_response (printer attrs)", |b| {
        b.iter(|| {
            let mut builder = ResponseBuilder::new(black_box(STATUS_OK), black_box(1));
            builder.begin_group(TAG_OPERATION_ATTRIBUTES);
            builder.charset("attributes-charset", "utf-8");
            builder.natural_language("attributes-natural-language", "en");
            builder.begin_group(TAG_PRINTER_ATTRIBUTES);
            builder.name_attr("printer-name", "office");
            builder.keyword("printer-state", "idle");
            builder.uri("printer-uri-supported", "ipp://localhost:631/ipp/print/office");
            builder.keyword("document-format-supported", "image/pwg-raster");
            builder.keyword_additional("image/png");
            builder.integer("printer-state", 3);
            builder.boolean("printer-is-accepting-jobs", true);
            let response = builder.build();
            black_box(response);
        });
    });

    c.bench_function("build_response (job attrs)", |b| {
        b.iter(|| {
            let mut builder = ResponseBuilder::new(black_box(STATUS_OK), black_box(1));
            builder.begin_group(TAG_OPERATION_ATTRIBUTES);
            builder.charset("attributes-charset", "utf-8");
            builder.natural_language("attributes-natural-language", "en");
            builder.begin_group(TAG_JOB_ATTRIBUTES);
            builder.integer("job-id", 7);
            builder.enum_attr("job-state", 5);
            builder.keyword("job-state-reasons", "job-printing");
            let response = builder.build();
            black_box(response);
        });
    });
}

criterion_group!(benches, bench_parse_request, bench_build_response);
criterion_main!(benches);
