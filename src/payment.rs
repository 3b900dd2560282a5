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

//! Payment and gateway-transaction records.
//!
//! A payment is one checkout attempt's monetary capture record, 1:1 with
//! its cart. It owns zero-or-one transaction record, the finer-grained
//! gateway outcome:
//!
//  Payment: Pending ──► Succeeded | Failed (terminal)
//  Transaction: Authorized | Declined | Errored

use crate::base::{CartId, PaymentId, TransactionId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

/// Supported payment methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Card,
    Paypal,
    Stripe,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Paypal => "paypal",
            PaymentMethod::Stripe => "stripe",
        };
        write!(f, "{name}")
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "card" | "cb" => Ok(PaymentMethod::Card),
            "paypal" => Ok(PaymentMethod::Paypal),
            "stripe" => Ok(PaymentMethod::Stripe),
            other => Err(format!("unknown payment method: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
}

/// Gateway-level outcome, finer-grained than the payment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Authorized,
    Declined,
    Errored,
}

/// The gateway outcome record backing a payment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionRecord {
    pub transaction_id: TransactionId,
    pub amount: Decimal,
    pub status: TransactionStatus,
    /// Simulated provider payload, kept verbatim for diagnostics.
    pub details: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Set only when the charge was authorized.
    #[serde(with = "time::serde::rfc3339::option")]
    pub validated_at: Option<OffsetDateTime>,
    /// All traffic through the simulated gateway is test traffic.
    pub is_test: bool,
}

/// One checkout attempt's capture record, 1:1 with its cart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payment {
    pub payment_id: PaymentId,
    pub cart_id: CartId,
    pub user_id: UserId,
    /// Equals the cart's frozen total at submission time.
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub transaction: Option<TransactionRecord>,
}

impl Payment {
    pub fn pending(
        payment_id: PaymentId,
        cart_id: CartId,
        user_id: UserId,
        amount: Decimal,
        method: PaymentMethod,
    ) -> Self {
        Self {
            payment_id,
            cart_id,
            user_id,
            amount,
            method,
            status: PaymentStatus::Pending,
            created_at: OffsetDateTime::now_utc(),
            transaction: None,
        }
    }
}
