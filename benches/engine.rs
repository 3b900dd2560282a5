// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Benchmarks for the checkout engine.
//!
//! Run with: cargo bench
//!
//! Benchmarks include:
//! - Single cart mutations and reservations
//! - Full checkout pipelines (reserve → checkout → pay → mint)
//! - Concurrent pipelines across many buyers
//! - Ticket key derivation

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rayon::prelude::*;
use rust_decimal::Decimal;
use secrecy::SecretString;
use ticketing_engine_rs::{
    CheckoutEngine, OfferId, OfferKind, PaymentMethod, SimulatedGateway, TicketId, UserId,
    derive_final_key,
};
use time::OffsetDateTime;

// =============================================================================
// Helper Functions
// =============================================================================

fn fresh_engine(stock: u32) -> CheckoutEngine {
    let engine = CheckoutEngine::new(
        SimulatedGateway::default(),
        SecretString::from("bench-salt"),
    );
    engine
        .offers()
        .publish(OfferId(1), OfferKind::Solo, Decimal::new(1000, 2), stock, None)
        .unwrap();
    engine
}

// =============================================================================
// Single-Operation Benchmarks
// =============================================================================

fn bench_add_line(c: &mut Criterion) {
    c.bench_function("add_line", |b| {
        b.iter(|| {
            let engine = fresh_engine(1_000);
            engine
                .add_line(black_box(UserId(1)), black_box(OfferId(1)), 2)
                .unwrap();
        })
    });
}

fn bench_reserve_release_cycle(c: &mut Criterion) {
    c.bench_function("reserve_release_cycle", |b| {
        let engine = fresh_engine(u32::MAX / 2);
        b.iter(|| {
            engine.offers().reserve(black_box(OfferId(1)), 1).unwrap();
            engine.offers().release(black_box(OfferId(1)), 1).unwrap();
        })
    });
}

fn bench_full_pipeline(c: &mut Criterion) {
    c.bench_function("full_pipeline", |b| {
        b.iter(|| {
            let engine = fresh_engine(1_000);
            let cart = engine.add_line(UserId(1), OfferId(1), 2).unwrap();
            engine.checkout(UserId(1), cart.cart_id).unwrap();
            engine
                .submit_payment(UserId(1), cart.cart_id, PaymentMethod::Card, "tok")
                .unwrap();
        })
    });
}

// =============================================================================
// Throughput Benchmarks
// =============================================================================

fn bench_pipeline_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline_throughput");

    for count in [10, 100, 1_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter(|| {
                let engine = fresh_engine(count as u32 * 2);
                for user in 1..=count as u64 {
                    let cart = engine.add_line(UserId(user), OfferId(1), 2).unwrap();
                    engine.checkout(UserId(user), cart.cart_id).unwrap();
                    engine
                        .submit_payment(UserId(user), cart.cart_id, PaymentMethod::Card, "tok")
                        .unwrap();
                }
            })
        });
    }

    group.finish();
}

fn bench_concurrent_pipelines(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_pipelines");
    group.sample_size(20);

    for buyers in [8, 32, 128].iter() {
        group.throughput(Throughput::Elements(*buyers as u64));
        group.bench_with_input(BenchmarkId::from_parameter(buyers), buyers, |b, &buyers| {
            b.iter(|| {
                let engine = fresh_engine(buyers as u32 * 2);
                (1..=buyers as u64).into_par_iter().for_each(|user| {
                    let cart = engine.add_line(UserId(user), OfferId(1), 2).unwrap();
                    engine.checkout(UserId(user), cart.cart_id).unwrap();
                    engine
                        .submit_payment(UserId(user), cart.cart_id, PaymentMethod::Card, "tok")
                        .unwrap();
                });
            })
        });
    }

    group.finish();
}

fn bench_contended_offer(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_offer");
    group.sample_size(20);

    group.bench_function("64_buyers_one_offer", |b| {
        b.iter(|| {
            let engine = fresh_engine(64);
            (1..=64u64).into_par_iter().for_each(|user| {
                // Half the buyers lose once stock runs out; contention on
                // the single offer mutex is the point.
                let _ = engine.add_line(UserId(user), OfferId(1), 2);
            });
        })
    });

    group.finish();
}

// =============================================================================
// Key Derivation Benchmarks
// =============================================================================

fn bench_key_derivation(c: &mut Criterion) {
    c.bench_function("derive_final_key", |b| {
        let salt = SecretString::from("bench-salt");
        let at = OffsetDateTime::now_utc();
        let mut ticket = 0u64;
        b.iter(|| {
            ticket += 1;
            derive_final_key(
                &salt,
                black_box(TicketId(ticket)),
                UserId(1),
                OfferId(1),
                at,
            )
        })
    });
}

criterion_group!(
    benches,
    bench_add_line,
    bench_reserve_release_cycle,
    bench_full_pipeline,
    bench_pipeline_throughput,
    bench_concurrent_pipelines,
    bench_contended_offer,
    bench_key_derivation,
);
criterion_main!(benches);
