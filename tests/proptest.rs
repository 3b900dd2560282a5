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

//! Property-based tests for the checkout pipeline.
//!
//! These tests verify invariants that should hold for any sequence of
//! valid cart operations and any payment outcome.

use proptest::prelude::*;
use rust_decimal::{Decimal, RoundingStrategy};
use secrecy::SecretString;
use ticketing_engine_rs::{
    CheckoutEngine, GatewayPolicy, OfferId, OfferKind, PaymentMethod, SimulatedGateway, TicketId,
    UserId, derive_final_key,
};
use time::OffsetDateTime;

// =============================================================================
// Arbitrary Strategies
// =============================================================================

/// Generate a unit price (0.01 to 500.00 with 2 decimal places).
fn arb_price() -> impl Strategy<Value = Decimal> {
    (1i64..=50_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Generate a purchasable quantity.
fn arb_quantity() -> impl Strategy<Value = u32> {
    1u32..=5
}

/// One cart mutation against a fixed offer set.
#[derive(Debug, Clone)]
enum CartOp {
    Add { offer: u64, quantity: u32 },
    Update { offer: u64, new_quantity: u32 },
    Remove { offer: u64 },
}

fn arb_cart_op(num_offers: u64) -> impl Strategy<Value = CartOp> {
    prop_oneof![
        (1..=num_offers, arb_quantity()).prop_map(|(offer, quantity)| CartOp::Add { offer, quantity }),
        (1..=num_offers, 0u32..=5).prop_map(|(offer, new_quantity)| CartOp::Update {
            offer,
            new_quantity
        }),
        (1..=num_offers).prop_map(|offer| CartOp::Remove { offer }),
    ]
}

const NUM_OFFERS: u64 = 3;
const INITIAL_STOCK: u32 = 1_000;

fn engine_with(policy: GatewayPolicy, prices: &[Decimal]) -> CheckoutEngine {
    let engine = CheckoutEngine::new(
        SimulatedGateway::new(policy),
        SecretString::from("proptest-salt"),
    );
    for (i, price) in prices.iter().enumerate() {
        engine
            .offers()
            .publish(OfferId(i as u64 + 1), OfferKind::Solo, *price, INITIAL_STOCK, None)
            .unwrap();
    }
    engine
}

fn apply_ops(engine: &CheckoutEngine, user: UserId, ops: &[CartOp]) {
    for op in ops {
        // Any single op may be rejected (line missing, stock gone); the
        // invariants must hold regardless.
        let _ = match op {
            CartOp::Add { offer, quantity } => engine.add_line(user, OfferId(*offer), *quantity),
            CartOp::Update { offer, new_quantity } => {
                engine.update_line(user, OfferId(*offer), *new_quantity)
            }
            CartOp::Remove { offer } => engine.remove_line(user, OfferId(*offer)),
        };
    }
}

// =============================================================================
// Cart Ledger Invariants
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Cart total always equals the sum of its line totals, rounded half-up.
    #[test]
    fn total_equals_sum_of_line_totals(
        prices in prop::collection::vec(arb_price(), NUM_OFFERS as usize),
        ops in prop::collection::vec(arb_cart_op(NUM_OFFERS), 1..30),
    ) {
        let engine = engine_with(GatewayPolicy::AlwaysApprove, &prices);
        let user = UserId(1);
        apply_ops(&engine, user, &ops);

        if let Some(cart_id) = engine.active_cart_id(user) {
            let cart = engine.cart_view(cart_id).unwrap();
            let expected = cart
                .lines
                .iter()
                .map(|line| line.unit_price * Decimal::from(line.quantity))
                .sum::<Decimal>()
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
            prop_assert_eq!(cart.total, expected);
        }
    }

    /// Stock conservation: for every offer, reserved-in-cart plus remaining
    /// equals the initial allotment, after any op sequence.
    #[test]
    fn stock_is_conserved_across_cart_ops(
        prices in prop::collection::vec(arb_price(), NUM_OFFERS as usize),
        ops in prop::collection::vec(arb_cart_op(NUM_OFFERS), 1..40),
    ) {
        let engine = engine_with(GatewayPolicy::AlwaysApprove, &prices);
        let user = UserId(1);
        apply_ops(&engine, user, &ops);

        let reserved_per_offer = |offer: u64| -> u32 {
            engine
                .active_cart_id(user)
                .and_then(|cart_id| engine.cart_view(cart_id))
                .map(|cart| {
                    cart.lines
                        .iter()
                        .filter(|line| line.offer_id == OfferId(offer))
                        .map(|line| line.quantity)
                        .sum()
                })
                .unwrap_or(0)
        };

        for offer in 1..=NUM_OFFERS {
            let remaining = engine.offers().snapshot(OfferId(offer)).unwrap().remaining;
            prop_assert_eq!(remaining + reserved_per_offer(offer), INITIAL_STOCK);
        }
    }

    /// Quantities never go negative and lines never hold zero quantity.
    #[test]
    fn lines_always_hold_positive_quantity(
        prices in prop::collection::vec(arb_price(), NUM_OFFERS as usize),
        ops in prop::collection::vec(arb_cart_op(NUM_OFFERS), 1..40),
    ) {
        let engine = engine_with(GatewayPolicy::AlwaysApprove, &prices);
        let user = UserId(1);
        apply_ops(&engine, user, &ops);

        if let Some(cart_id) = engine.active_cart_id(user) {
            let cart = engine.cart_view(cart_id).unwrap();
            prop_assert!(cart.lines.iter().all(|line| line.quantity > 0));
        }
    }
}

// =============================================================================
// Pipeline Invariants
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Successful payment mints exactly Σ line.quantity tickets, each with a
    /// unique 64-char key, and consumes stock permanently.
    #[test]
    fn successful_payment_mints_one_ticket_per_unit(
        prices in prop::collection::vec(arb_price(), NUM_OFFERS as usize),
        quantities in prop::collection::vec((1..=NUM_OFFERS, arb_quantity()), 1..6),
    ) {
        let engine = engine_with(GatewayPolicy::AlwaysApprove, &prices);
        let user = UserId(1);

        for (offer, quantity) in &quantities {
            engine.add_line(user, OfferId(*offer), *quantity).unwrap();
        }
        let cart_id = engine.active_cart_id(user).unwrap();
        let cart = engine.cart_view(cart_id).unwrap();
        let expected_units: u32 = cart.lines.iter().map(|line| line.quantity).sum();

        engine.checkout(user, cart_id).unwrap();
        let receipt = engine
            .submit_payment(user, cart_id, PaymentMethod::Card, "tok")
            .unwrap();

        prop_assert_eq!(receipt.tickets.len(), expected_units as usize);

        let mut keys: Vec<&str> = receipt.tickets.iter().map(|t| t.final_key.as_str()).collect();
        keys.sort_unstable();
        keys.dedup();
        prop_assert_eq!(keys.len(), expected_units as usize);
        prop_assert!(keys.iter().all(|key| key.len() == 64));

        for line in &cart.lines {
            let remaining = engine.offers().snapshot(line.offer_id).unwrap().remaining;
            prop_assert_eq!(remaining, INITIAL_STOCK - line.quantity);
        }
    }

    /// Declined payment restores every offer to its pre-checkout stock and
    /// mints nothing.
    #[test]
    fn declined_payment_restores_all_stock(
        prices in prop::collection::vec(arb_price(), NUM_OFFERS as usize),
        quantities in prop::collection::vec((1..=NUM_OFFERS, arb_quantity()), 1..6),
    ) {
        let engine = engine_with(GatewayPolicy::AlwaysDecline, &prices);
        let user = UserId(1);

        for (offer, quantity) in &quantities {
            engine.add_line(user, OfferId(*offer), *quantity).unwrap();
        }
        let cart_id = engine.active_cart_id(user).unwrap();
        engine.checkout(user, cart_id).unwrap();
        let result = engine.submit_payment(user, cart_id, PaymentMethod::Card, "tok");
        prop_assert!(result.is_err());

        for offer in 1..=NUM_OFFERS {
            let remaining = engine.offers().snapshot(OfferId(offer)).unwrap().remaining;
            prop_assert_eq!(remaining, INITIAL_STOCK);
        }
        prop_assert!(engine.tickets().all().is_empty());
    }
}

// =============================================================================
// Key Derivation Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    /// Keys are 64 hex chars and deterministic in their inputs.
    #[test]
    fn key_derivation_is_deterministic_and_fixed_length(
        ticket_id in any::<u64>(),
        user_id in any::<u64>(),
        offer_id in any::<u64>(),
        unix_ts in 0i64..=4_102_444_800, // through 2100
    ) {
        let salt = SecretString::from("proptest-salt");
        let at = OffsetDateTime::from_unix_timestamp(unix_ts).unwrap();

        let a = derive_final_key(&salt, TicketId(ticket_id), UserId(user_id), OfferId(offer_id), at);
        let b = derive_final_key(&salt, TicketId(ticket_id), UserId(user_id), OfferId(offer_id), at);

        prop_assert_eq!(&a, &b);
        prop_assert_eq!(a.len(), 64);
        prop_assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    /// Distinct ticket ids never collide, and a different salt changes the
    /// key.
    #[test]
    fn key_derivation_separates_tickets_and_salts(
        ticket_a in any::<u64>(),
        ticket_b in any::<u64>(),
        unix_ts in 0i64..=4_102_444_800,
    ) {
        prop_assume!(ticket_a != ticket_b);
        let salt = SecretString::from("proptest-salt");
        let other_salt = SecretString::from("rotated-salt");
        let at = OffsetDateTime::from_unix_timestamp(unix_ts).unwrap();

        let a = derive_final_key(&salt, TicketId(ticket_a), UserId(1), OfferId(1), at);
        let b = derive_final_key(&salt, TicketId(ticket_b), UserId(1), OfferId(1), at);
        let rotated = derive_final_key(&other_salt, TicketId(ticket_a), UserId(1), OfferId(1), at);

        prop_assert_ne!(&a, &b);
        prop_assert_ne!(&a, &rotated);
    }
}
