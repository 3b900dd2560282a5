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

//! # Ticketing Engine
//!
//! This library provides a checkout processing engine for event ticketing:
//! offer inventory with finite stock, per-user carts, a simulated payment
//! gateway, and all-or-nothing issuance of cryptographically verifiable
//! tickets.
//!
//! ## Core Components
//!
//! - [`CheckoutEngine`]: Pipeline orchestrator sequencing cart → payment →
//!   ticket issuance as one logical unit of work per cart
//! - [`OfferBook`]: Offer inventory with per-offer serialized reservation
//! - [`Cart`]: Cart ledger with price-snapshotted lines and a checkout
//!   state machine
//! - [`PaymentGateway`]: Pluggable simulated gateway strategy
//! - [`TicketVault`]: Minted tickets, verification, and admission scanning
//! - [`CheckoutError`]: Error taxonomy for every pipeline rejection
//!
//! ## Example
//!
//! ```
//! use secrecy::SecretString;
//! use rust_decimal_macros::dec;
//! use ticketing_engine_rs::{
//!     CheckoutEngine, OfferId, OfferKind, PaymentMethod, SimulatedGateway, UserId,
//! };
//!
//! let engine = CheckoutEngine::new(
//!     SimulatedGateway::default(),
//!     SecretString::from("server-side-salt"),
//! );
//! engine
//!     .offers()
//!     .publish(OfferId(1), OfferKind::Solo, dec!(10.00), 10, None)
//!     .unwrap();
//!
//! let cart = engine.add_line(UserId(1), OfferId(1), 2).unwrap();
//! let amount = engine.checkout(UserId(1), cart.cart_id).unwrap();
//! assert_eq!(amount, dec!(20.00));
//!
//! let receipt = engine
//!     .submit_payment(UserId(1), cart.cart_id, PaymentMethod::Card, "tok_demo")
//!     .unwrap();
//! assert_eq!(receipt.tickets.len(), 2);
//! ```
//!
//! ## Thread Safety
//!
//! Many carts and checkouts proceed in parallel. Reservations against the
//! same offer are serialized per offer, so two carts can never both claim
//! the last unit; payment runs exactly once per cart.

mod base;
pub mod cart;
pub mod command;
mod engine;
pub mod error;
pub mod gateway;
pub mod offer;
pub mod payment;
pub mod ticket;

pub use base::{CartId, OfferId, PaymentId, TicketId, TransactionId, UserId};
pub use cart::{Cart, CartLine, CartStatus, CartView};
pub use command::{Command, Violation};
pub use engine::{CheckoutEngine, Outcome, PaymentReceipt};
pub use error::CheckoutError;
pub use gateway::{ChargeRequest, GatewayPolicy, GatewayVerdict, PaymentGateway, SimulatedGateway};
pub use offer::{OfferBook, OfferKind, OfferSnapshot, OfferStatus};
pub use payment::{Payment, PaymentMethod, PaymentStatus, TransactionRecord, TransactionStatus};
pub use ticket::{Ticket, TicketReceipt, TicketVault, derive_final_key};
