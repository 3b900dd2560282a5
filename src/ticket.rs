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

//! Tickets and the ticket vault.
//!
//! One ticket is minted per admission unit: a cart line of quantity N yields
//! N independently verifiable tickets. Each ticket carries a final key
//! derived one-way from (ticket id, user id, offer id, purchase timestamp)
//! under a server-side salt; without the salt the key can be checked against
//! a presented ticket but not forged or inverted.

use crate::base::{OfferId, TicketId, UserId};
use crate::error::CheckoutError;
use dashmap::DashMap;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Derives a ticket's final key.
///
/// SHA-256 over the salt followed by a canonical `id|user|offer|unix-ts`
/// string, hex-encoded: a 64-character opaque key. The ticket id is part of
/// the input, so no two tickets of the same purchase share a key.
pub fn derive_final_key(
    salt: &SecretString,
    ticket_id: TicketId,
    user_id: UserId,
    offer_id: OfferId,
    purchased_at: OffsetDateTime,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.expose_secret().as_bytes());
    hasher.update(
        format!(
            "{}|{}|{}|{}",
            ticket_id,
            user_id,
            offer_id,
            purchased_at.unix_timestamp()
        )
        .as_bytes(),
    );
    format!("{:x}", hasher.finalize())
}

/// One verifiable admission unit. Immutable once minted, except for the
/// single scan transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ticket {
    pub ticket_id: TicketId,
    /// Unique derived verification key; the unforgeable proof of
    /// authenticity.
    pub final_key: String,
    pub user_id: UserId,
    pub offer_id: OfferId,
    #[serde(with = "time::serde::rfc3339")]
    pub purchased_at: OffsetDateTime,
    pub scanned: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub scanned_at: Option<OffsetDateTime>,
}

impl Ticket {
    pub fn mint(
        salt: &SecretString,
        ticket_id: TicketId,
        user_id: UserId,
        offer_id: OfferId,
        purchased_at: OffsetDateTime,
    ) -> Self {
        let final_key = derive_final_key(salt, ticket_id, user_id, offer_id, purchased_at);
        Self {
            ticket_id,
            final_key,
            user_id,
            offer_id,
            purchased_at,
            scanned: false,
            scanned_at: None,
        }
    }
}

/// Receipt DTO handed back to the request layer after issuance, and by the
/// verification endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicketReceipt {
    pub ticket_id: TicketId,
    pub final_key: String,
    pub user_id: UserId,
    pub user_name: String,
    pub offer_descriptions: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub purchased_at: OffsetDateTime,
}

/// All minted tickets, indexed by id and by final key.
#[derive(Debug, Default)]
pub struct TicketVault {
    tickets: DashMap<TicketId, Ticket>,
    by_key: DashMap<String, TicketId>,
}

impl TicketVault {
    pub fn new() -> Self {
        Self {
            tickets: DashMap::new(),
            by_key: DashMap::new(),
        }
    }

    /// Stores a whole purchase's tickets, all-or-nothing.
    ///
    /// A duplicate final key anywhere in the batch (or against already
    /// vaulted tickets) aborts the entire batch and leaves the vault exactly
    /// as it was; a purchase must never be backed by a partial ticket set.
    pub fn mint_batch(&self, batch: Vec<Ticket>) -> Result<(), CheckoutError> {
        let mut claimed: Vec<String> = Vec::with_capacity(batch.len());
        let mut duplicate: Option<TicketId> = None;
        for ticket in &batch {
            // The entry guard must drop before any other access to the key
            // map, so the duplicate is only noted here.
            match self.by_key.entry(ticket.final_key.clone()) {
                dashmap::mapref::entry::Entry::Occupied(_) => {
                    duplicate = Some(ticket.ticket_id);
                }
                dashmap::mapref::entry::Entry::Vacant(entry) => {
                    entry.insert(ticket.ticket_id);
                    claimed.push(ticket.final_key.clone());
                }
            }
            if duplicate.is_some() {
                break;
            }
        }
        if let Some(ticket_id) = duplicate {
            // Roll back the keys claimed so far.
            for key in claimed {
                self.by_key.remove(&key);
            }
            return Err(CheckoutError::TicketIssuanceFailure {
                details: format!("duplicate final key for ticket {ticket_id}"),
            });
        }
        for ticket in batch {
            self.tickets.insert(ticket.ticket_id, ticket);
        }
        Ok(())
    }

    pub fn get(&self, ticket_id: TicketId) -> Option<Ticket> {
        self.tickets.get(&ticket_id).map(|t| t.clone())
    }

    pub fn find_by_key(&self, final_key: &str) -> Option<Ticket> {
        let ticket_id = *self.by_key.get(final_key)?;
        self.get(ticket_id)
    }

    /// Admission check: marks the ticket scanned, exactly once.
    pub fn scan(&self, final_key: &str) -> Result<Ticket, CheckoutError> {
        let ticket_id = *self
            .by_key
            .get(final_key)
            .ok_or(CheckoutError::TicketNotFound)?;
        let mut ticket = self
            .tickets
            .get_mut(&ticket_id)
            .ok_or(CheckoutError::TicketNotFound)?;
        if ticket.scanned {
            let scanned_at = ticket
                .scanned_at
                .and_then(|at| at.format(&Rfc3339).ok())
                .unwrap_or_else(|| "an earlier time".into());
            return Err(CheckoutError::TicketAlreadyScanned { scanned_at });
        }
        ticket.scanned = true;
        ticket.scanned_at = Some(OffsetDateTime::now_utc());
        Ok(ticket.clone())
    }

    /// Every vaulted ticket, ordered by ticket id. Used for report output.
    pub fn all(&self) -> Vec<Ticket> {
        let mut tickets: Vec<Ticket> = self.tickets.iter().map(|entry| entry.clone()).collect();
        tickets.sort_by_key(|t| t.ticket_id.0);
        tickets
    }

    /// Tickets owned by a user, ordered by ticket id.
    pub fn tickets_of(&self, user_id: UserId) -> Vec<Ticket> {
        let mut tickets: Vec<Ticket> = self
            .tickets
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.clone())
            .collect();
        tickets.sort_by_key(|t| t.ticket_id.0);
        tickets
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn salt() -> SecretString {
        SecretString::from("unit-test-salt")
    }

    fn mint(id: u64) -> Ticket {
        Ticket::mint(
            &salt(),
            TicketId(id),
            UserId(1),
            OfferId(1),
            datetime!(2024-07-26 12:00:00 UTC),
        )
    }

    #[test]
    fn key_is_fixed_length_hex() {
        let ticket = mint(1);
        assert_eq!(ticket.final_key.len(), 64);
        assert!(ticket.final_key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn key_is_deterministic() {
        assert_eq!(mint(1).final_key, mint(1).final_key);
    }

    #[test]
    fn key_changes_with_every_input() {
        let base = mint(1);
        let at = datetime!(2024-07-26 12:00:00 UTC);

        let other_ticket = Ticket::mint(&salt(), TicketId(2), UserId(1), OfferId(1), at);
        let other_user = Ticket::mint(&salt(), TicketId(1), UserId(2), OfferId(1), at);
        let other_offer = Ticket::mint(&salt(), TicketId(1), UserId(1), OfferId(2), at);
        let other_time = Ticket::mint(
            &salt(),
            TicketId(1),
            UserId(1),
            OfferId(1),
            datetime!(2024-07-26 12:00:01 UTC),
        );

        for other in [other_ticket, other_user, other_offer, other_time] {
            assert_ne!(base.final_key, other.final_key);
        }
    }

    #[test]
    fn key_depends_on_salt() {
        let at = datetime!(2024-07-26 12:00:00 UTC);
        let a = derive_final_key(&SecretString::from("salt-a"), TicketId(1), UserId(1), OfferId(1), at);
        let b = derive_final_key(&SecretString::from("salt-b"), TicketId(1), UserId(1), OfferId(1), at);
        assert_ne!(a, b);
    }

    #[test]
    fn mint_batch_stores_all() {
        let vault = TicketVault::new();
        vault.mint_batch(vec![mint(1), mint(2), mint(3)]).unwrap();
        assert_eq!(vault.len(), 3);
        assert!(vault.get(TicketId(2)).is_some());
    }

    #[test]
    fn mint_batch_rolls_back_on_duplicate_key() {
        let vault = TicketVault::new();
        // Same id twice derives the same key.
        let result = vault.mint_batch(vec![mint(1), mint(2), mint(1)]);
        assert!(matches!(
            result,
            Err(CheckoutError::TicketIssuanceFailure { .. })
        ));
        assert!(vault.is_empty());
        assert!(vault.find_by_key(&mint(2).final_key).is_none());
    }

    #[test]
    fn mint_batch_rejects_key_already_vaulted() {
        let vault = TicketVault::new();
        vault.mint_batch(vec![mint(1)]).unwrap();

        let result = vault.mint_batch(vec![mint(2), mint(1)]);
        assert!(matches!(
            result,
            Err(CheckoutError::TicketIssuanceFailure { .. })
        ));
        // The earlier batch is untouched, the new one fully rolled back.
        assert_eq!(vault.len(), 1);
        assert!(vault.find_by_key(&mint(2).final_key).is_none());
    }

    #[test]
    fn find_by_key_round_trips() {
        let vault = TicketVault::new();
        let ticket = mint(1);
        let key = ticket.final_key.clone();
        vault.mint_batch(vec![ticket]).unwrap();

        let found = vault.find_by_key(&key).unwrap();
        assert_eq!(found.ticket_id, TicketId(1));
        assert!(vault.find_by_key("no-such-key").is_none());
    }

    #[test]
    fn scan_is_single_use() {
        let vault = TicketVault::new();
        let ticket = mint(1);
        let key = ticket.final_key.clone();
        vault.mint_batch(vec![ticket]).unwrap();

        let scanned = vault.scan(&key).unwrap();
        assert!(scanned.scanned);
        assert!(scanned.scanned_at.is_some());

        let again = vault.scan(&key);
        assert!(matches!(
            again,
            Err(CheckoutError::TicketAlreadyScanned { .. })
        ));
    }

    #[test]
    fn scan_unknown_key_fails() {
        let vault = TicketVault::new();
        assert_eq!(vault.scan("missing"), Err(CheckoutError::TicketNotFound));
    }

    #[test]
    fn tickets_of_filters_and_sorts() {
        let vault = TicketVault::new();
        let at = datetime!(2024-07-26 12:00:00 UTC);
        vault
            .mint_batch(vec![
                Ticket::mint(&salt(), TicketId(3), UserId(1), OfferId(1), at),
                Ticket::mint(&salt(), TicketId(1), UserId(1), OfferId(1), at),
                Ticket::mint(&salt(), TicketId(2), UserId(9), OfferId(1), at),
            ])
            .unwrap();

        let mine = vault.tickets_of(UserId(1));
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].ticket_id, TicketId(1));
        assert_eq!(mine[1].ticket_id, TicketId(3));
    }
}
