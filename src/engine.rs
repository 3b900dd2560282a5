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

//! Checkout pipeline orchestrator.
//!
//! The [`CheckoutEngine`] sequences cart ledger → payment simulator →
//! ticket issuer as one logical unit of work per cart: either the cart ends
//! Paid with a full ticket set, or it ends Failed with every reservation
//! released and zero tickets.
//!
//! # Thread Safety
//!
//! The engine uses [`DashMap`] for the entity maps, so checkouts for
//! different carts proceed in parallel. Per-cart and per-offer mutations are
//! serialized by the entities' own mutexes (lock order cart → offer), and
//! the payment map's entry API is the exactly-once gate for
//! `submit_payment`.

use crate::base::{CartId, OfferId, PaymentId, TicketId, TransactionId, UserId};
use crate::cart::{Cart, CartStatus, CartView};
use crate::command::Command;
use crate::error::CheckoutError;
use crate::gateway::{ChargeRequest, GatewayVerdict, PaymentGateway};
use crate::offer::OfferBook;
use crate::payment::{Payment, PaymentMethod, PaymentStatus, TransactionRecord, TransactionStatus};
use crate::ticket::{Ticket, TicketReceipt, TicketVault};
use dashmap::DashMap;
use rust_decimal::Decimal;
use secrecy::SecretString;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{error, info, warn};

/// Everything the request layer gets back from a successful payment: the
/// capture record plus one receipt per minted ticket.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PaymentReceipt {
    pub payment: Payment,
    pub tickets: Vec<TicketReceipt>,
}

/// Result of routing a [`Command`] through the engine.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Cart mutation: the cart as it now stands.
    Cart(CartView),
    /// Checkout: the frozen amount to be paid.
    CheckedOut { cart_id: CartId, amount: Decimal },
    /// Payment success: capture record and ticket receipts.
    Paid(Box<PaymentReceipt>),
}

/// Checkout engine orchestrating offers, carts, payments, and tickets.
///
/// # Invariants
///
/// - At most one non-terminal cart per user; terminal carts stay for
///   history.
/// - At most one payment per cart, enforced atomically.
/// - A Paid cart has exactly `Σ line.quantity` tickets; a Failed cart has
///   zero and its reservations are back in stock.
/// - The gateway answers within `gateway_timeout` or the charge counts as
///   errored and the compensating release runs.
pub struct CheckoutEngine {
    offers: OfferBook,
    users: DashMap<UserId, String>,
    /// All carts ever created, indexed by cart ID.
    carts: DashMap<CartId, Arc<Cart>>,
    /// Each user's current non-terminal cart.
    active: DashMap<UserId, CartId>,
    /// Payments indexed by cart; the 1:1 mapping doubles as the
    /// exactly-once gate.
    payments: DashMap<CartId, Payment>,
    tickets: TicketVault,
    gateway: Arc<dyn PaymentGateway>,
    gateway_timeout: Duration,
    salt: SecretString,
    cart_seq: AtomicU64,
    payment_seq: AtomicU64,
    transaction_seq: AtomicU64,
    ticket_seq: AtomicU64,
}

impl CheckoutEngine {
    pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(5);

    /// Creates an engine over an empty inventory.
    ///
    /// `salt` is the server-side secret for ticket key derivation; it is
    /// never embedded in ticket data.
    pub fn new(gateway: impl PaymentGateway + 'static, salt: SecretString) -> Self {
        Self {
            offers: OfferBook::new(),
            users: DashMap::new(),
            carts: DashMap::new(),
            active: DashMap::new(),
            payments: DashMap::new(),
            tickets: TicketVault::new(),
            gateway: Arc::new(gateway),
            gateway_timeout: Self::DEFAULT_GATEWAY_TIMEOUT,
            salt,
            cart_seq: AtomicU64::new(1),
            payment_seq: AtomicU64::new(1),
            transaction_seq: AtomicU64::new(1),
            ticket_seq: AtomicU64::new(1),
        }
    }

    /// Bounds every gateway call; a silent gateway counts as errored.
    pub fn with_gateway_timeout(mut self, timeout: Duration) -> Self {
        self.gateway_timeout = timeout;
        self
    }

    pub fn offers(&self) -> &OfferBook {
        &self.offers
    }

    pub fn tickets(&self) -> &TicketVault {
        &self.tickets
    }

    /// Records a display name for receipts.
    pub fn register_user(&self, user_id: UserId, name: impl Into<String>) {
        self.users.insert(user_id, name.into());
    }

    fn display_name(&self, user_id: UserId) -> String {
        self.users
            .get(&user_id)
            .map(|name| name.clone())
            .unwrap_or_else(|| format!("user-{user_id}"))
    }

    /// Routes a command through the pipeline after explicit validation.
    pub fn process(&self, command: Command) -> Result<Outcome, CheckoutError> {
        let violations = command.validate();
        if !violations.is_empty() {
            return Err(CheckoutError::InvalidCommand { violations });
        }
        match command {
            Command::AddLine {
                user_id,
                offer_id,
                quantity,
            } => self.add_line(user_id, offer_id, quantity).map(Outcome::Cart),
            Command::UpdateLine {
                user_id,
                offer_id,
                new_quantity,
            } => self
                .update_line(user_id, offer_id, new_quantity)
                .map(Outcome::Cart),
            Command::RemoveLine { user_id, offer_id } => {
                self.remove_line(user_id, offer_id).map(Outcome::Cart)
            }
            Command::ClearCart { user_id } => self.clear_cart(user_id).map(Outcome::Cart),
            Command::Checkout { user_id, cart_id } => {
                let cart_id = self.resolve_cart_id(user_id, cart_id)?;
                let amount = self.checkout(user_id, cart_id)?;
                Ok(Outcome::CheckedOut { cart_id, amount })
            }
            Command::SubmitPayment {
                user_id,
                cart_id,
                method,
                token,
            } => {
                let cart_id = self.resolve_cart_id(user_id, cart_id)?;
                self.submit_payment(user_id, cart_id, method, &token)
                    .map(|receipt| Outcome::Paid(Box::new(receipt)))
            }
        }
    }

    /// The user's current open-or-checked-out cart, created lazily.
    pub fn active_cart(&self, user_id: UserId) -> Arc<Cart> {
        let cart_id = *self.active.entry(user_id).or_insert_with(|| {
            let cart_id = CartId(self.cart_seq.fetch_add(1, Ordering::SeqCst));
            self.carts.insert(cart_id, Arc::new(Cart::new(cart_id, user_id)));
            info!(%user_id, %cart_id, "opened new cart");
            cart_id
        });
        // The active mapping only ever points at a cart in `carts`.
        self.carts.get(&cart_id).map(|c| Arc::clone(&c)).unwrap()
    }

    pub fn active_cart_id(&self, user_id: UserId) -> Option<CartId> {
        self.active.get(&user_id).map(|id| *id)
    }

    fn resolve_cart_id(
        &self,
        user_id: UserId,
        explicit: Option<CartId>,
    ) -> Result<CartId, CheckoutError> {
        explicit
            .or_else(|| self.active_cart_id(user_id))
            .ok_or(CheckoutError::CartNotFound)
    }

    fn owned_cart(&self, user_id: UserId, cart_id: CartId) -> Result<Arc<Cart>, CheckoutError> {
        let cart = self
            .carts
            .get(&cart_id)
            .map(|c| Arc::clone(&c))
            .ok_or(CheckoutError::CartNotFound)?;
        if cart.user_id() != user_id {
            return Err(CheckoutError::CartOwnerMismatch);
        }
        Ok(cart)
    }

    // === Cart Ledger Operations ===

    pub fn add_line(
        &self,
        user_id: UserId,
        offer_id: OfferId,
        quantity: u32,
    ) -> Result<CartView, CheckoutError> {
        let cart = self.active_cart(user_id);
        cart.add_line(&self.offers, offer_id, quantity)?;
        info!(%user_id, %offer_id, quantity, total = %cart.total(), "line added to cart");
        Ok(cart.view())
    }

    pub fn update_line(
        &self,
        user_id: UserId,
        offer_id: OfferId,
        new_quantity: u32,
    ) -> Result<CartView, CheckoutError> {
        let cart = self.active_cart(user_id);
        cart.update_line(&self.offers, offer_id, new_quantity)?;
        Ok(cart.view())
    }

    pub fn remove_line(&self, user_id: UserId, offer_id: OfferId) -> Result<CartView, CheckoutError> {
        let cart = self.active_cart(user_id);
        cart.remove_line(&self.offers, offer_id)?;
        Ok(cart.view())
    }

    pub fn clear_cart(&self, user_id: UserId) -> Result<CartView, CheckoutError> {
        let cart = self.active_cart(user_id);
        cart.clear(&self.offers)?;
        Ok(cart.view())
    }

    /// Freezes the cart for payment. Open → CheckedOut.
    pub fn checkout(&self, user_id: UserId, cart_id: CartId) -> Result<Decimal, CheckoutError> {
        let cart = self.owned_cart(user_id, cart_id)?;
        let amount = cart.checkout()?;
        info!(%user_id, %cart_id, %amount, "cart checked out");
        Ok(amount)
    }

    // === Payment Pipeline ===

    /// Runs the payment for a checked-out cart, exactly once per cart.
    ///
    /// On authorization the cart's tickets are minted all-or-nothing and the
    /// cart ends Paid. On decline, gateway error, or timeout the cart ends
    /// Failed and every line's reservation is released, so the inventory is
    /// indistinguishable from "payment never attempted". Only the Failed
    /// payment record remains, for diagnostics.
    pub fn submit_payment(
        &self,
        user_id: UserId,
        cart_id: CartId,
        method: PaymentMethod,
        token: &str,
    ) -> Result<PaymentReceipt, CheckoutError> {
        let cart = self.owned_cart(user_id, cart_id)?;
        match cart.status() {
            CartStatus::Open => return Err(CheckoutError::CartNotReadyForPayment),
            CartStatus::Paid | CartStatus::Failed => {
                return Err(CheckoutError::CartAlreadyFinalized);
            }
            CartStatus::CheckedOut => {}
        }
        let amount = cart
            .frozen_total()
            .ok_or(CheckoutError::CartNotReadyForPayment)?;

        // Exactly-once gate: the vacant-entry insert wins; a concurrent or
        // repeated submission finds the entry occupied.
        let payment_id = PaymentId(self.payment_seq.fetch_add(1, Ordering::SeqCst));
        match self.payments.entry(cart_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(CheckoutError::CartAlreadyFinalized);
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(Payment::pending(payment_id, cart_id, user_id, amount, method));
            }
        }
        info!(%user_id, %cart_id, %payment_id, %amount, %method, "payment submitted");

        let verdict = self.charge_with_deadline(ChargeRequest {
            cart_id,
            user_id,
            amount,
            method,
            token: token.to_string(),
        });
        let now = OffsetDateTime::now_utc();

        match verdict {
            GatewayVerdict::Authorized => self.settle_authorized(&cart, user_id, cart_id, amount, now),
            GatewayVerdict::Declined { reason } => {
                self.settle_failed(
                    &cart,
                    cart_id,
                    TransactionStatus::Declined,
                    reason.clone(),
                    now,
                );
                warn!(%cart_id, %reason, "payment declined, reservations released");
                Err(CheckoutError::PaymentDeclined { reason })
            }
            GatewayVerdict::Errored { details } => {
                self.settle_failed(
                    &cart,
                    cart_id,
                    TransactionStatus::Errored,
                    details.clone(),
                    now,
                );
                warn!(%cart_id, %details, "payment errored, reservations released");
                Err(CheckoutError::PaymentGatewayError { details })
            }
        }
    }

    /// Payment captured: mint one ticket per admission unit, all-or-nothing.
    fn settle_authorized(
        &self,
        cart: &Cart,
        user_id: UserId,
        cart_id: CartId,
        amount: Decimal,
        now: OffsetDateTime,
    ) -> Result<PaymentReceipt, CheckoutError> {
        let lines = cart.lines();
        let mut batch = Vec::new();
        for line in &lines {
            for _ in 0..line.quantity {
                // Ticket ids are drawn before key derivation; the id is a
                // key input.
                let ticket_id = TicketId(self.ticket_seq.fetch_add(1, Ordering::SeqCst));
                batch.push(Ticket::mint(&self.salt, ticket_id, user_id, line.offer_id, now));
            }
        }

        match self.tickets.mint_batch(batch.clone()) {
            Ok(()) => {
                self.record_outcome(
                    cart_id,
                    PaymentStatus::Succeeded,
                    TransactionStatus::Authorized,
                    "authorized by simulated gateway".to_string(),
                    Some(now),
                    now,
                );
                cart.mark_paid()?;
                self.active.remove_if(&user_id, |_, active_id| *active_id == cart_id);

                let receipts = batch
                    .iter()
                    .map(|ticket| self.receipt_for(ticket))
                    .collect::<Vec<_>>();
                info!(%cart_id, tickets = receipts.len(), "payment succeeded, tickets minted");

                let payment = self
                    .payments
                    .get(&cart_id)
                    .map(|p| p.clone())
                    .ok_or(CheckoutError::CartNotFound)?;
                Ok(PaymentReceipt {
                    payment,
                    tickets: receipts,
                })
            }
            Err(err) => {
                // Money captured but no ticket set to back it. The cart
                // fails and stock returns, while the transaction record
                // carries the reconciliation marker.
                self.record_outcome(
                    cart_id,
                    PaymentStatus::Succeeded,
                    TransactionStatus::Authorized,
                    format!("captured but unfulfilled, requires reconciliation: {err}"),
                    Some(now),
                    now,
                );
                cart.mark_failed(&self.offers)?;
                self.active.remove_if(&user_id, |_, active_id| *active_id == cart_id);
                error!(%cart_id, %amount, %err, "ticket issuance failed after capture");
                Err(err)
            }
        }
    }

    /// Compensating path: record the outcome, fail the cart, release stock.
    fn settle_failed(
        &self,
        cart: &Cart,
        cart_id: CartId,
        status: TransactionStatus,
        details: String,
        now: OffsetDateTime,
    ) {
        self.record_outcome(cart_id, PaymentStatus::Failed, status, details, None, now);
        if cart.mark_failed(&self.offers).is_ok() {
            self.active
                .remove_if(&cart.user_id(), |_, active_id| *active_id == cart_id);
        }
    }

    fn record_outcome(
        &self,
        cart_id: CartId,
        payment_status: PaymentStatus,
        transaction_status: TransactionStatus,
        details: String,
        validated_at: Option<OffsetDateTime>,
        now: OffsetDateTime,
    ) {
        if let Some(mut payment) = self.payments.get_mut(&cart_id) {
            payment.status = payment_status;
            payment.transaction = Some(TransactionRecord {
                transaction_id: TransactionId(self.transaction_seq.fetch_add(1, Ordering::SeqCst)),
                amount: payment.amount,
                status: transaction_status,
                details,
                created_at: now,
                validated_at,
                is_test: true,
            });
        }
    }

    /// Runs the gateway call with a hard deadline. A gateway that never
    /// answers must not leave stock reserved forever, so a timeout is an
    /// errored verdict and takes the compensating path.
    fn charge_with_deadline(&self, request: ChargeRequest) -> GatewayVerdict {
        let (sender, receiver) = crossbeam::channel::bounded(1);
        let gateway = Arc::clone(&self.gateway);
        std::thread::spawn(move || {
            let verdict = gateway.charge(&request);
            let _ = sender.send(verdict);
        });
        match receiver.recv_timeout(self.gateway_timeout) {
            Ok(verdict) => verdict,
            Err(_) => GatewayVerdict::Errored {
                details: format!(
                    "gateway did not answer within {}ms",
                    self.gateway_timeout.as_millis()
                ),
            },
        }
    }

    fn receipt_for(&self, ticket: &Ticket) -> TicketReceipt {
        TicketReceipt {
            ticket_id: ticket.ticket_id,
            final_key: ticket.final_key.clone(),
            user_id: ticket.user_id,
            user_name: self.display_name(ticket.user_id),
            offer_descriptions: vec![self.offers.describe(ticket.offer_id)],
            purchased_at: ticket.purchased_at,
        }
    }

    // === Queries ===

    pub fn cart_view(&self, cart_id: CartId) -> Option<CartView> {
        self.carts.get(&cart_id).map(|cart| cart.view())
    }

    pub fn payment_for_cart(&self, cart_id: CartId) -> Option<Payment> {
        self.payments.get(&cart_id).map(|payment| payment.clone())
    }

    /// Receipt lookup by final key, for displaying a purchased ticket.
    pub fn verify_ticket(&self, final_key: &str) -> Option<TicketReceipt> {
        self.tickets
            .find_by_key(final_key)
            .map(|ticket| self.receipt_for(&ticket))
    }

    /// Single-use admission scan by final key.
    pub fn scan_ticket(&self, final_key: &str) -> Result<TicketReceipt, CheckoutError> {
        let ticket = self.tickets.scan(final_key)?;
        Ok(self.receipt_for(&ticket))
    }
}
