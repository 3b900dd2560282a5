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

//! Request-layer commands.
//!
//! Commands are the validated inputs the request layer feeds the engine,
//! each tagged with the authenticated user id. Validation is explicit:
//! [`Command::validate`] returns every field-level violation at once, so the
//! caller can reject a bad request before it reaches the pipeline.

use crate::base::{CartId, OfferId, UserId};
use crate::payment::PaymentMethod;
use serde::{Deserialize, Serialize};

/// One field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub field: &'static str,
    pub message: String,
}

impl Violation {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// A user action against the checkout pipeline.
///
/// `Checkout` and `SubmitPayment` may name an explicit cart; `None` targets
/// the user's active cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    AddLine {
        user_id: UserId,
        offer_id: OfferId,
        quantity: u32,
    },
    UpdateLine {
        user_id: UserId,
        offer_id: OfferId,
        new_quantity: u32,
    },
    RemoveLine {
        user_id: UserId,
        offer_id: OfferId,
    },
    ClearCart {
        user_id: UserId,
    },
    Checkout {
        user_id: UserId,
        cart_id: Option<CartId>,
    },
    SubmitPayment {
        user_id: UserId,
        cart_id: Option<CartId>,
        method: PaymentMethod,
        token: String,
    },
}

impl Command {
    /// The authenticated user this command acts for.
    pub fn user_id(&self) -> UserId {
        match self {
            Self::AddLine { user_id, .. }
            | Self::UpdateLine { user_id, .. }
            | Self::RemoveLine { user_id, .. }
            | Self::ClearCart { user_id }
            | Self::Checkout { user_id, .. }
            | Self::SubmitPayment { user_id, .. } => *user_id,
        }
    }

    /// Checks field-level preconditions, collecting every violation.
    ///
    /// An empty list means the command may enter the pipeline. State-machine
    /// preconditions (cart open, stock available, ...) are the pipeline's
    /// own job and are not duplicated here.
    pub fn validate(&self) -> Vec<Violation> {
        let mut violations = Vec::new();
        match self {
            Self::AddLine { quantity, .. } => {
                if *quantity == 0 {
                    violations.push(Violation::new("quantity", "must be positive"));
                }
            }
            Self::UpdateLine { .. } => {
                // Zero is a valid new_quantity: it removes the line.
            }
            Self::RemoveLine { .. } | Self::ClearCart { .. } | Self::Checkout { .. } => {}
            Self::SubmitPayment { token, .. } => {
                if token.trim().is_empty() {
                    violations.push(Violation::new("token", "must not be blank"));
                }
            }
        }
        violations
    }
}
