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

use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use ticketing_engine_rs::{
    CheckoutEngine, Command, GatewayPolicy, OfferId, OfferKind, SimulatedGateway, UserId,
};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Ticketing Engine - Process checkout command CSV files
///
/// Seeds the offer inventory from an offers CSV, runs a stream of cart and
/// payment commands against the engine, and outputs the minted tickets to
/// stdout.
#[derive(Parser, Debug)]
#[command(name = "ticketing-engine-rs")]
#[command(about = "A checkout engine that processes ticketing command CSVs", long_about = None)]
struct Args {
    /// Path to CSV file with offers
    ///
    /// Expected format: offer,kind,price,quantity,expires
    #[arg(value_name = "OFFERS")]
    offers: PathBuf,

    /// Path to CSV file with commands
    ///
    /// Expected format: op,user,offer,quantity,method,token
    /// Example: cargo run -- offers.csv commands.csv > tickets.csv
    #[arg(value_name = "COMMANDS")]
    commands: PathBuf,

    /// Probability (0.0..=1.0) that the simulated gateway declines a charge
    #[arg(long, default_value_t = 0.0)]
    decline_rate: f64,

    /// Injected gateway latency in milliseconds
    #[arg(long)]
    gateway_latency_ms: Option<u64>,

    /// Gateway deadline in milliseconds; slower charges count as errored
    #[arg(long, default_value_t = 5_000)]
    gateway_timeout_ms: u64,

    /// Server-side secret for ticket key derivation
    #[arg(long, default_value = "dev-only-salt")]
    salt: String,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Parse command line arguments
    let args = Args::parse();

    let policy = if args.decline_rate > 0.0 {
        GatewayPolicy::DeclineRate {
            rate: args.decline_rate,
        }
    } else {
        GatewayPolicy::AlwaysApprove
    };
    let mut gateway = SimulatedGateway::new(policy);
    if let Some(latency_ms) = args.gateway_latency_ms {
        gateway = gateway.with_latency(Duration::from_millis(latency_ms));
    }
    let engine = CheckoutEngine::new(gateway, SecretString::from(args.salt))
        .with_gateway_timeout(Duration::from_millis(args.gateway_timeout_ms));

    // Seed the inventory
    let offers_file = match File::open(&args.offers) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.offers.display(), e);
            process::exit(1);
        }
    };
    if let Err(e) = load_offers(&engine, BufReader::new(offers_file)) {
        eprintln!("Error loading offers: {}", e);
        process::exit(1);
    }

    // Process commands from CSV
    let commands_file = match File::open(&args.commands) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.commands.display(), e);
            process::exit(1);
        }
    };
    if let Err(e) = process_commands(&engine, BufReader::new(commands_file)) {
        eprintln!("Error processing commands: {}", e);
        process::exit(1);
    }

    // Write minted tickets to stdout
    if let Err(e) = write_tickets(&engine, std::io::stdout()) {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

/// Raw CSV record for an offer.
///
/// Fields: `offer, kind, price, quantity, expires`
#[derive(Debug, Deserialize)]
struct OfferRecord {
    offer: u64,
    kind: String,
    price: Decimal,
    quantity: u32,
    #[serde(default)]
    expires: Option<String>,
}

impl OfferRecord {
    /// Returns `None` for unknown kinds or unparseable expiry timestamps.
    fn into_parts(self) -> Option<(OfferId, OfferKind, Decimal, u32, Option<OffsetDateTime>)> {
        let kind = match self.kind.to_lowercase().as_str() {
            "solo" => OfferKind::Solo,
            "duo" => OfferKind::Duo,
            "family" => OfferKind::Family,
            _ => return None,
        };
        let expires = match self.expires.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(OffsetDateTime::parse(raw, &Rfc3339).ok()?),
        };
        Some((OfferId(self.offer), kind, self.price, self.quantity, expires))
    }
}

/// Raw CSV record for a command.
///
/// Fields: `op, user, offer, quantity, method, token`
/// - `op`: add, update, remove, clear, checkout, pay
/// - `offer` and `quantity` apply to line ops; `method` and `token` to pay.
#[derive(Debug, Deserialize)]
struct CommandRecord {
    op: String,
    user: u64,
    #[serde(deserialize_with = "csv::invalid_option", default)]
    offer: Option<u64>,
    #[serde(deserialize_with = "csv::invalid_option", default)]
    quantity: Option<u32>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    token: Option<String>,
}

impl CommandRecord {
    /// Converts a CSV record to a pipeline command.
    ///
    /// Returns `None` for unknown ops or missing required fields.
    fn into_command(self) -> Option<Command> {
        let user_id = UserId(self.user);

        match self.op.to_lowercase().as_str() {
            "add" => Some(Command::AddLine {
                user_id,
                offer_id: OfferId(self.offer?),
                quantity: self.quantity?,
            }),
            "update" => Some(Command::UpdateLine {
                user_id,
                offer_id: OfferId(self.offer?),
                new_quantity: self.quantity?,
            }),
            "remove" => Some(Command::RemoveLine {
                user_id,
                offer_id: OfferId(self.offer?),
            }),
            "clear" => Some(Command::ClearCart { user_id }),
            "checkout" => Some(Command::Checkout {
                user_id,
                cart_id: None,
            }),
            "pay" => {
                let token = match self.token {
                    Some(token) if !token.trim().is_empty() => token,
                    _ => "tok_simulated".to_string(),
                };
                Some(Command::SubmitPayment {
                    user_id,
                    cart_id: None,
                    method: self.method?.parse().ok()?,
                    token,
                })
            }
            _ => None,
        }
    }
}

/// Seeds the offer inventory from a CSV reader. Malformed rows are skipped.
pub fn load_offers<R: Read>(engine: &CheckoutEngine, reader: R) -> Result<(), csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for result in rdr.deserialize::<OfferRecord>() {
        match result {
            Ok(record) => {
                let Some((offer_id, kind, price, quantity, expires)) = record.into_parts() else {
                    #[cfg(debug_assertions)]
                    eprintln!("Skipping invalid offer record");
                    continue;
                };
                if let Err(e) = engine.offers().publish(offer_id, kind, price, quantity, expires) {
                    #[cfg(debug_assertions)]
                    eprintln!("Skipping offer {}: {}", offer_id, e);
                }
            }
            Err(e) => {
                #[cfg(debug_assertions)]
                eprintln!("Skipping malformed offer row: {}", e);
                continue;
            }
        }
    }

    Ok(())
}

/// Processes commands from a CSV reader.
///
/// Streaming parse, so arbitrarily long command files never load fully into
/// memory. Malformed rows and rejected commands are skipped; rejections are
/// the engine's business outcomes (declined payments, sold-out offers) and
/// must not stop the stream.
pub fn process_commands<R: Read>(engine: &CheckoutEngine, reader: R) -> Result<(), csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for result in rdr.deserialize::<CommandRecord>() {
        match result {
            Ok(record) => {
                let Some(command) = record.into_command() else {
                    #[cfg(debug_assertions)]
                    eprintln!("Skipping invalid command record");
                    continue;
                };

                if let Err(e) = engine.process(command) {
                    #[cfg(debug_assertions)]
                    eprintln!("Command rejected: {}", e);
                }
            }
            Err(e) => {
                #[cfg(debug_assertions)]
                eprintln!("Skipping malformed command row: {}", e);
                continue;
            }
        }
    }

    Ok(())
}

/// Writes all minted tickets to a CSV writer.
///
/// Columns: `ticket, user, offer, purchased_at, final_key`
pub fn write_tickets<W: Write>(engine: &CheckoutEngine, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    wtr.write_record(["ticket", "user", "offer", "purchased_at", "final_key"])?;
    for ticket in engine.tickets().all() {
        let purchased_at = ticket
            .purchased_at
            .format(&Rfc3339)
            .unwrap_or_else(|_| ticket.purchased_at.unix_timestamp().to_string());
        wtr.write_record([
            ticket.ticket_id.to_string(),
            ticket.user_id.to_string(),
            ticket.offer_id.to_string(),
            purchased_at,
            ticket.final_key,
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
