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

//! Offer inventory.
//!
//! Each offer tracks a finite allotment of admission units. Reservation and
//! release are serialized per offer through the offer's own mutex, so two
//! carts racing for the last unit can never both win.
//!
//! Status is derived from stock and expiry:
//!
//  Available ──reserve to 0──► SoldOut ──release──► Available
//      │                                                │
//      └──expiry passed──► Expired      Withdrawn ◄──force (sticky)

use crate::base::OfferId;
use crate::error::CheckoutError;
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Category of ticket offer, carrying the number of admission units covered
/// by one purchased quantity unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferKind {
    Solo,
    Duo,
    Family,
}

impl OfferKind {
    /// Seats admitted per purchased unit.
    pub fn capacity(&self) -> u32 {
        match self {
            OfferKind::Solo => 1,
            OfferKind::Duo => 2,
            OfferKind::Family => 4,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OfferKind::Solo => "solo",
            OfferKind::Duo => "duo",
            OfferKind::Family => "family",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    Available,
    SoldOut,
    Expired,
    Withdrawn,
}

#[derive(Debug)]
struct OfferData {
    offer_id: OfferId,
    kind: OfferKind,
    remaining: u32,
    unit_price: Decimal,
    expires_at: Option<OffsetDateTime>,
    status: OfferStatus,
}

impl OfferData {
    fn new(
        offer_id: OfferId,
        kind: OfferKind,
        unit_price: Decimal,
        quantity: u32,
        expires_at: Option<OffsetDateTime>,
    ) -> Self {
        let mut data = Self {
            offer_id,
            kind,
            remaining: quantity,
            unit_price,
            expires_at,
            status: OfferStatus::Available,
        };
        data.refresh_status(OffsetDateTime::now_utc());
        data
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.unit_price >= Decimal::ZERO,
            "Invariant violated: unit price went negative: {}",
            self.unit_price
        );
        debug_assert!(
            self.status != OfferStatus::SoldOut || self.remaining == 0,
            "Invariant violated: sold-out offer {} still has {} units",
            self.offer_id,
            self.remaining
        );
    }

    /// Re-derives status from (remaining, expiry). Withdrawn is sticky.
    fn refresh_status(&mut self, now: OffsetDateTime) {
        if self.status == OfferStatus::Withdrawn {
            return;
        }
        if let Some(expires_at) = self.expires_at
            && expires_at <= now
        {
            self.status = OfferStatus::Expired;
            return;
        }
        self.status = if self.remaining == 0 {
            OfferStatus::SoldOut
        } else {
            OfferStatus::Available
        };
    }

    /// Decrements remaining stock for a reservation.
    fn reserve(&mut self, quantity: u32, now: OffsetDateTime) -> Result<(), CheckoutError> {
        if quantity == 0 {
            return Err(CheckoutError::InvalidQuantity);
        }
        self.refresh_status(now);
        match self.status {
            OfferStatus::Available => {}
            OfferStatus::SoldOut => {
                return Err(CheckoutError::InsufficientStock { remaining: 0 });
            }
            OfferStatus::Expired | OfferStatus::Withdrawn => {
                return Err(CheckoutError::OfferUnavailable);
            }
        }
        if self.remaining < quantity {
            return Err(CheckoutError::InsufficientStock {
                remaining: self.remaining,
            });
        }
        self.remaining -= quantity;
        self.refresh_status(now);
        self.assert_invariants();
        Ok(())
    }

    /// Returns previously reserved stock.
    ///
    /// Releasing never fails on status: a cart rollback must be able to put
    /// stock back even after the offer expired or was withdrawn mid-flight.
    fn release(&mut self, quantity: u32, now: OffsetDateTime) -> Result<(), CheckoutError> {
        if quantity == 0 {
            return Err(CheckoutError::InvalidQuantity);
        }
        self.remaining = self
            .remaining
            .checked_add(quantity)
            .expect("released more stock than a u32 can hold");
        self.refresh_status(now);
        self.assert_invariants();
        Ok(())
    }

    fn withdraw(&mut self) {
        self.status = OfferStatus::Withdrawn;
    }
}

/// Read-only view of an offer at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OfferSnapshot {
    pub offer_id: OfferId,
    pub kind: OfferKind,
    pub remaining: u32,
    pub unit_price: Decimal,
    pub status: OfferStatus,
}

/// A single offer with per-offer serialized stock mutation.
#[derive(Debug)]
pub struct Offer {
    inner: Mutex<OfferData>,
}

impl Offer {
    fn new(
        offer_id: OfferId,
        kind: OfferKind,
        unit_price: Decimal,
        quantity: u32,
        expires_at: Option<OffsetDateTime>,
    ) -> Self {
        Self {
            inner: Mutex::new(OfferData::new(offer_id, kind, unit_price, quantity, expires_at)),
        }
    }

    pub fn remaining(&self) -> u32 {
        self.inner.lock().remaining
    }

    pub fn unit_price(&self) -> Decimal {
        self.inner.lock().unit_price
    }

    pub fn status(&self) -> OfferStatus {
        let mut data = self.inner.lock();
        data.refresh_status(OffsetDateTime::now_utc());
        data.status
    }

    pub fn kind(&self) -> OfferKind {
        self.inner.lock().kind
    }

    pub fn snapshot(&self) -> OfferSnapshot {
        let mut data = self.inner.lock();
        data.refresh_status(OffsetDateTime::now_utc());
        OfferSnapshot {
            offer_id: data.offer_id,
            kind: data.kind,
            remaining: data.remaining,
            unit_price: data.unit_price,
            status: data.status,
        }
    }
}

/// The offer inventory: all published offers, indexed by offer ID.
///
/// Reservations against different offers proceed independently; reservations
/// against the same offer are serialized by that offer's mutex.
#[derive(Debug, Default)]
pub struct OfferBook {
    offers: DashMap<OfferId, Offer>,
}

impl OfferBook {
    pub fn new() -> Self {
        Self {
            offers: DashMap::new(),
        }
    }

    /// Publishes a new offer. Offer IDs are assigned by the caller (the
    /// admin surface) and must be unique.
    pub fn publish(
        &self,
        offer_id: OfferId,
        kind: OfferKind,
        unit_price: Decimal,
        quantity: u32,
        expires_at: Option<OffsetDateTime>,
    ) -> Result<(), CheckoutError> {
        if unit_price < Decimal::ZERO {
            return Err(CheckoutError::InvalidCommand {
                violations: vec![crate::command::Violation::new(
                    "unit_price",
                    "must not be negative",
                )],
            });
        }
        match self.offers.entry(offer_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(CheckoutError::DuplicateOffer),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(Offer::new(offer_id, kind, unit_price, quantity, expires_at));
                Ok(())
            }
        }
    }

    /// Atomically decrements remaining stock if the offer is purchasable and
    /// has at least `quantity` units left.
    pub fn reserve(&self, offer_id: OfferId, quantity: u32) -> Result<(), CheckoutError> {
        let offer = self.offers.get(&offer_id).ok_or(CheckoutError::OfferNotFound)?;
        offer.inner.lock().reserve(quantity, OffsetDateTime::now_utc())
    }

    /// Atomically returns reserved stock (line removed, quantity reduced, or
    /// payment rollback).
    pub fn release(&self, offer_id: OfferId, quantity: u32) -> Result<(), CheckoutError> {
        let offer = self.offers.get(&offer_id).ok_or(CheckoutError::OfferNotFound)?;
        offer.inner.lock().release(quantity, OffsetDateTime::now_utc())
    }

    /// Forces an offer to Withdrawn. Withdrawn offers refuse all future
    /// reservations, whatever their stock.
    pub fn withdraw(&self, offer_id: OfferId) -> Result<(), CheckoutError> {
        let offer = self.offers.get(&offer_id).ok_or(CheckoutError::OfferNotFound)?;
        offer.inner.lock().withdraw();
        Ok(())
    }

    /// Current unit price, used by the cart ledger to snapshot line prices.
    pub fn price_of(&self, offer_id: OfferId) -> Result<Decimal, CheckoutError> {
        let offer = self.offers.get(&offer_id).ok_or(CheckoutError::OfferNotFound)?;
        Ok(offer.unit_price())
    }

    /// Whether a reservation against this offer could currently succeed.
    pub fn is_purchasable(&self, offer_id: OfferId) -> bool {
        self.offers
            .get(&offer_id)
            .map(|offer| offer.status() == OfferStatus::Available)
            .unwrap_or(false)
    }

    pub fn snapshot(&self, offer_id: OfferId) -> Option<OfferSnapshot> {
        self.offers.get(&offer_id).map(|offer| offer.snapshot())
    }

    /// Human description used on receipts, e.g. `"duo offer #7 @ 25.00"`.
    pub fn describe(&self, offer_id: OfferId) -> String {
        match self.offers.get(&offer_id) {
            Some(offer) => {
                let data = offer.inner.lock();
                format!("{} offer #{} @ {}", data.kind.label(), offer_id, data.unit_price)
            }
            None => format!("offer #{offer_id}"),
        }
    }

    pub fn len(&self) -> usize {
        self.offers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offers.is_empty()
    }
}
