// Copyright 2024 Logan Magee
//
// SPDX-License-Identifier: Apache-2.0

#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use graft::{BinaryFile, delta};

const SIZES: [usize; 4] = [4 << 10, 64 << 10, 512 << 10, 4 << 20];
const LEVEL: i32 = 3;

fn noise(len: usize) -> Vec<u8> {
    let mut state = 0x9e37_79b9_7f4a_7c15u64;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state as u8
        })
        .collect()
}

// Scatter small edits every 4 KiB, like a rebuilt executable with shifted addresses
fn edited(old: &[u8]) -> Vec<u8> {
    let mut new = old.to_vec();
    for offset in (0..new.len()).step_by(4096) {
        let end = (offset + 8).min(new.len());
        new[offset..end].iter_mut().for_each(|b| *b = b.wrapping_add(1));
    }
    new
}

fn compute(c: &mut Criterion) {
    let mut group = c.benchmark_group("compute_delta");

    for size in SIZES {
        let old = noise(size);
        let new = edited(&old);

        group
            .throughput(Throughput::Bytes(size as u64))
            .bench_with_input(BenchmarkId::from_parameter(size), &(old, new), |b, (old, new)| {
                b.iter(|| delta::compute_delta(old, new, 0).unwrap());
            });
    }

    group.finish();
}

fn encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for size in SIZES {
        let old = noise(size);
        let new = edited(&old);

        group
            .throughput(Throughput::Bytes(size as u64))
            .bench_with_input(BenchmarkId::from_parameter(size), &(old, new), |b, (old, new)| {
                b.iter(|| BinaryFile::encode(old, new, LEVEL).unwrap());
            });
    }

    group.finish();
}

fn apply(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply_delta");

    for size in SIZES {
        let old = noise(size);
        let new = edited(&old);
        let instructions = delta::compute_delta(&old, &new, 0).unwrap().unwrap();

        group
            .throughput(Throughput::Bytes(size as u64))
            .bench_with_input(
                BenchmarkId::from_parameter(size),
                &(old, instructions),
                |b, (old, instructions)| {
                    b.iter(|| delta::apply_delta(old, instructions).unwrap());
                },
            );
    }

    group.finish();
}

criterion_group!(benches, compute, encode, apply);
criterion_main!(benches);
