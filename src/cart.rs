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

//! Cart ledger.
//!
//! Carts follow a state machine:
//!
//  Open ──checkout──► CheckedOut ──payment success──► Paid
//                          │
//                          └──payment failure/rollback──► Failed
//!
//! Every mutation runs under the cart's own mutex, then reaches into the
//! offer inventory (lock order is always cart → offer), then recomputes the
//! total. Line unit prices are snapshotted when the line is first added, so
//! later price changes never move an open cart's total.

use crate::base::{CartId, OfferId, UserId};
use crate::error::CheckoutError;
use crate::offer::OfferBook;
use parking_lot::Mutex;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Currency precision for cart totals: 2 decimals, half-up.
const CURRENCY_DP: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartStatus {
    Open,
    CheckedOut,
    Paid,
    Failed,
}

impl CartStatus {
    /// Paid and Failed are terminal: no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CartStatus::Paid | CartStatus::Failed)
    }
}

/// One offer entry within a cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub offer_id: OfferId,
    pub quantity: u32,
    /// Unit price snapshotted when the line was first added.
    pub unit_price: Decimal,
}

impl CartLine {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

#[derive(Debug)]
struct CartData {
    cart_id: CartId,
    user_id: UserId,
    status: CartStatus,
    lines: Vec<CartLine>,
    total: Decimal,
    /// Amount to be paid, fixed at checkout.
    frozen_total: Option<Decimal>,
    created_at: OffsetDateTime,
}

impl CartData {
    fn new(cart_id: CartId, user_id: UserId) -> Self {
        Self {
            cart_id,
            user_id,
            status: CartStatus::Open,
            lines: Vec::new(),
            total: Decimal::ZERO,
            frozen_total: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.total >= Decimal::ZERO,
            "Invariant violated: cart total went negative: {}",
            self.total
        );
        debug_assert!(
            self.lines.iter().all(|line| line.quantity > 0),
            "Invariant violated: cart {} holds a zero-quantity line",
            self.cart_id
        );
    }

    /// `total = Σ(quantity × unit price snapshot)`, rounded half-up.
    ///
    /// Idempotent: recomputing without mutation yields the same total.
    fn recompute_total(&mut self) {
        self.total = self
            .lines
            .iter()
            .map(CartLine::line_total)
            .sum::<Decimal>()
            .round_dp_with_strategy(CURRENCY_DP, RoundingStrategy::MidpointAwayFromZero);
        self.assert_invariants();
    }

    fn require_open(&self) -> Result<(), CheckoutError> {
        if self.status == CartStatus::Open {
            Ok(())
        } else {
            Err(CheckoutError::CartNotOpen)
        }
    }

    fn line_index(&self, offer_id: OfferId) -> Option<usize> {
        self.lines.iter().position(|line| line.offer_id == offer_id)
    }
}

/// Read-only view of a cart, for receipts and the request layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartView {
    pub cart_id: CartId,
    pub user_id: UserId,
    pub status: CartStatus,
    pub total: Decimal,
    pub lines: Vec<CartLine>,
}

/// A user's cart. Mutations are serialized by the inner mutex.
#[derive(Debug)]
pub struct Cart {
    inner: Mutex<CartData>,
}

impl Cart {
    pub fn new(cart_id: CartId, user_id: UserId) -> Self {
        Self {
            inner: Mutex::new(CartData::new(cart_id, user_id)),
        }
    }

    pub fn cart_id(&self) -> CartId {
        self.inner.lock().cart_id
    }

    pub fn user_id(&self) -> UserId {
        self.inner.lock().user_id
    }

    pub fn status(&self) -> CartStatus {
        self.inner.lock().status
    }

    pub fn total(&self) -> Decimal {
        self.inner.lock().total
    }

    /// The amount frozen at checkout; `None` while the cart is still open.
    pub fn frozen_total(&self) -> Option<Decimal> {
        self.inner.lock().frozen_total
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.inner.lock().created_at
    }

    /// Snapshot of the current line set.
    pub fn lines(&self) -> Vec<CartLine> {
        self.inner.lock().lines.clone()
    }

    pub fn view(&self) -> CartView {
        let data = self.inner.lock();
        CartView {
            cart_id: data.cart_id,
            user_id: data.user_id,
            status: data.status,
            total: data.total,
            lines: data.lines.clone(),
        }
    }

    /// Reserves stock and appends or merges a line for the offer.
    ///
    /// Merging keeps the existing unit-price snapshot; only a brand-new line
    /// reads the offer's current price.
    pub fn add_line(
        &self,
        book: &OfferBook,
        offer_id: OfferId,
        quantity: u32,
    ) -> Result<Decimal, CheckoutError> {
        if quantity == 0 {
            return Err(CheckoutError::InvalidQuantity);
        }
        let mut data = self.inner.lock();
        data.require_open()?;

        // Reserve before touching the line set, so a failed reservation
        // leaves the cart untouched.
        book.reserve(offer_id, quantity)?;

        match data.line_index(offer_id) {
            Some(index) => data.lines[index].quantity += quantity,
            None => {
                let unit_price = match book.price_of(offer_id) {
                    Ok(price) => price,
                    Err(err) => {
                        // The offer vanished between reserve and price read.
                        let _ = book.release(offer_id, quantity);
                        return Err(err);
                    }
                };
                data.lines.push(CartLine {
                    offer_id,
                    quantity,
                    unit_price,
                });
            }
        }
        data.recompute_total();
        Ok(data.total)
    }

    /// Sets a line to `new_quantity`, reserving or releasing the delta.
    /// Zero removes the line entirely.
    pub fn update_line(
        &self,
        book: &OfferBook,
        offer_id: OfferId,
        new_quantity: u32,
    ) -> Result<Decimal, CheckoutError> {
        let mut data = self.inner.lock();
        data.require_open()?;

        let index = data.line_index(offer_id).ok_or(CheckoutError::LineNotFound)?;
        let current = data.lines[index].quantity;

        if new_quantity > current {
            book.reserve(offer_id, new_quantity - current)?;
        } else if new_quantity < current {
            book.release(offer_id, current - new_quantity)?;
        }

        if new_quantity == 0 {
            data.lines.remove(index);
        } else {
            data.lines[index].quantity = new_quantity;
        }
        data.recompute_total();
        Ok(data.total)
    }

    /// Removes a line and returns its reserved stock.
    pub fn remove_line(&self, book: &OfferBook, offer_id: OfferId) -> Result<Decimal, CheckoutError> {
        let mut data = self.inner.lock();
        data.require_open()?;

        let index = data.line_index(offer_id).ok_or(CheckoutError::LineNotFound)?;
        let line = data.lines.remove(index);
        book.release(line.offer_id, line.quantity)?;
        data.recompute_total();
        Ok(data.total)
    }

    /// Empties the cart, returning every line's reserved stock.
    pub fn clear(&self, book: &OfferBook) -> Result<(), CheckoutError> {
        let mut data = self.inner.lock();
        data.require_open()?;

        for line in data.lines.drain(..) {
            let _ = book.release(line.offer_id, line.quantity);
        }
        data.recompute_total();
        Ok(())
    }

    /// Open → CheckedOut. Freezes the total as the amount to be paid.
    pub fn checkout(&self) -> Result<Decimal, CheckoutError> {
        let mut data = self.inner.lock();
        data.require_open()?;
        if data.lines.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        data.recompute_total();
        data.status = CartStatus::CheckedOut;
        data.frozen_total = Some(data.total);
        Ok(data.total)
    }

    /// CheckedOut → Paid. Orchestrator-only.
    pub(crate) fn mark_paid(&self) -> Result<(), CheckoutError> {
        let mut data = self.inner.lock();
        if data.status != CartStatus::CheckedOut {
            return Err(CheckoutError::CartNotReadyForPayment);
        }
        data.status = CartStatus::Paid;
        Ok(())
    }

    /// CheckedOut → Failed, releasing every line's reservation. This is the
    /// compensating action for the stock reserved at add time; afterwards
    /// the inventory is back at its pre-checkout values.
    pub(crate) fn mark_failed(&self, book: &OfferBook) -> Result<(), CheckoutError> {
        let mut data = self.inner.lock();
        if data.status != CartStatus::CheckedOut {
            return Err(CheckoutError::CartNotReadyForPayment);
        }
        data.status = CartStatus::Failed;
        for line in &data.lines {
            let _ = book.release(line.offer_id, line.quantity);
        }
        Ok(())
    }
}
