// Copyright 2026 the Assembly Stream Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use assembly_stream::builder::{AssemblyBuilder, node};
use assembly_stream::decoder::{Decoder, decode};
use assembly_stream::module::{RetType, ValType};
use assembly_stream::opcode::I32Op;

/// A module with `funcs` functions, each returning a chain of `depth`
/// nested additions over its two arguments.
fn build_module(funcs: u32, depth: u32) -> Vec<u8> {
    let mut b = AssemblyBuilder::new();
    let sig = b.signature(RetType::I32, vec![ValType::I32, ValType::I32]);
    let mut ids = Vec::new();
    for _ in 0..funcs {
        ids.push(b.declare(sig).unwrap());
    }
    for &f in &ids {
        let mut expr = node::i32_get_loc(0);
        for _ in 0..depth {
            expr = node::i32_binary(I32Op::Add, expr, node::i32_get_loc(1));
        }
        b.define(f, 0, 0, 0, node::stmts(vec![node::ret(expr)])).unwrap();
    }
    b.export_default(ids[0]).unwrap();
    b.build().unwrap().encode().unwrap()
}

fn bench_decode(c: &mut Criterion) {
    bench_one_chunk(c);
    bench_per_byte(c);
    bench_deep_expressions(c);
    bench_reencode(c);
}

fn bench_one_chunk(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_one_chunk");
    for &funcs in &[10u32, 100, 1000] {
        let bytes = build_module(funcs, 8);
        group.bench_with_input(BenchmarkId::from_parameter(funcs), &bytes, |b, bytes| {
            b.iter(|| {
                let a = decode(bytes).unwrap();
                black_box(a);
            });
        });
    }
    group.finish();
}

fn bench_per_byte(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_per_byte");
    for &funcs in &[10u32, 100] {
        let bytes = build_module(funcs, 8);
        group.bench_with_input(BenchmarkId::from_parameter(funcs), &bytes, |b, bytes| {
            b.iter(|| {
                let mut d = Decoder::new();
                for byte in bytes {
                    d.feed(core::slice::from_ref(byte)).unwrap();
                }
                let a = d.finish().unwrap();
                black_box(a);
            });
        });
    }
    group.finish();
}

fn bench_deep_expressions(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_deep_expression");
    for &depth in &[64u32, 512, 4096] {
        let bytes = build_module(1, depth);
        group.bench_with_input(BenchmarkId::from_parameter(depth), &bytes, |b, bytes| {
            b.iter(|| {
                let a = decode(bytes).unwrap();
                black_box(a);
            });
        });
    }
    group.finish();
}

fn bench_reencode(c: &mut Criterion) {
    let mut group = c.benchmark_group("reencode");
    for &funcs in &[100u32] {
        let bytes = build_module(funcs, 8);
        let assembly = decode(&bytes).unwrap();
        group.bench_with_input(
            BenchmarkId::from_parameter(funcs),
            &assembly,
            |b, assembly| {
                b.iter(|| {
                    let out = assembly.encode().unwrap();
                    black_box(out);
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_decode);
criterion_main!(benches);
