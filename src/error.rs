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

//! Error types for the checkout pipeline.
//!
//! Every rejection names the precondition it violated, so the request layer
//! can surface a meaningful message ("only 2 seats left") instead of a
//! generic failure. Transport status mapping happens at the boundary, never
//! here.

use crate::command::Violation;
use thiserror::Error;

/// Checkout pipeline errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CheckoutError {
    /// Command failed field-level validation before reaching the pipeline
    #[error("invalid command: {}", format_violations(.violations))]
    InvalidCommand { violations: Vec<Violation> },

    /// Quantity is zero where a positive quantity is required
    #[error("quantity must be positive")]
    InvalidQuantity,

    /// Referenced offer does not exist
    #[error("offer not found")]
    OfferNotFound,

    /// Offer exists but cannot be purchased (expired, withdrawn, or sold out)
    #[error("offer is not available for purchase")]
    OfferUnavailable,

    /// Requested quantity exceeds the offer's remaining stock
    #[error("insufficient stock: only {remaining} left")]
    InsufficientStock { remaining: u32 },

    /// An offer with this ID is already published
    #[error("offer ID already published")]
    DuplicateOffer,

    /// Referenced cart does not exist
    #[error("cart not found")]
    CartNotFound,

    /// Cart belongs to a different user
    #[error("cart does not belong to this user")]
    CartOwnerMismatch,

    /// Referenced offer has no line in the cart
    #[error("offer has no line in this cart")]
    LineNotFound,

    /// Cart mutation attempted while the cart is not open
    #[error("cart is not open")]
    CartNotOpen,

    /// Checkout attempted on a cart with no lines
    #[error("cart is empty, nothing to check out")]
    EmptyCart,

    /// Payment submitted before the cart was checked out
    #[error("cart has not been checked out for payment")]
    CartNotReadyForPayment,

    /// Payment submitted on a cart that already reached a terminal state
    #[error("cart is already finalized, payment ran exactly once")]
    CartAlreadyFinalized,

    /// The simulated gateway declined the charge
    #[error("payment declined: {reason}")]
    PaymentDeclined { reason: String },

    /// The simulated gateway errored or timed out
    #[error("payment gateway error: {details}")]
    PaymentGatewayError { details: String },

    /// Ticket minting failed after payment capture; the batch rolled back
    #[error("ticket issuance failed: {details}")]
    TicketIssuanceFailure { details: String },

    /// Referenced ticket key does not exist
    #[error("ticket not found")]
    TicketNotFound,

    /// Ticket was already scanned for admission
    #[error("ticket already scanned at {scanned_at}")]
    TicketAlreadyScanned { scanned_at: String },
}

fn format_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| format!("{}: {}", v.field, v.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl CheckoutError {
    /// Whether retrying the same command later could succeed.
    ///
    /// Gateway errors and timeouts leave the world as if payment had never
    /// been attempted, so the caller may retry after re-checkout. State
    /// machine violations and declines are final for this cart.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CheckoutError::PaymentGatewayError { .. })
    }
}
