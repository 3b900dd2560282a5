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

//! Simulated payment gateway.
//!
//! The gateway is a pluggable strategy: the engine only depends on the
//! [`PaymentGateway`] trait and treats the verdict as the single source of
//! truth for the charge outcome. [`SimulatedGateway`] implements the
//! configuration-driven policies used by the CLI, the demo server, and the
//! tests.

use crate::base::{CartId, UserId};
use crate::payment::PaymentMethod;
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A charge request forwarded to the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeRequest {
    pub cart_id: CartId,
    pub user_id: UserId,
    pub amount: Decimal,
    pub method: PaymentMethod,
    /// Opaque instrument token supplied by the request layer.
    pub token: String,
}

/// Exactly one verdict per charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayVerdict {
    Authorized,
    Declined { reason: String },
    Errored { details: String },
}

/// Outcome policy for the simulated gateway.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayPolicy {
    /// Every charge is authorized.
    AlwaysApprove,
    /// Every charge is declined.
    AlwaysDecline,
    /// Each charge is declined with the given probability (0.0..=1.0).
    DeclineRate { rate: f64 },
}

pub trait PaymentGateway: Send + Sync {
    /// Runs the charge and returns exactly one verdict.
    fn charge(&self, request: &ChargeRequest) -> GatewayVerdict;
}

/// Gateway simulator with a configurable outcome policy and an optional
/// injected latency (used by the timeout tests).
#[derive(Debug, Clone)]
pub struct SimulatedGateway {
    policy: GatewayPolicy,
    latency: Option<Duration>,
}

impl SimulatedGateway {
    pub fn new(policy: GatewayPolicy) -> Self {
        Self {
            policy,
            latency: None,
        }
    }

    /// Delays every charge by `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new(GatewayPolicy::AlwaysApprove)
    }
}

impl PaymentGateway for SimulatedGateway {
    fn charge(&self, request: &ChargeRequest) -> GatewayVerdict {
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }
        let declined = match self.policy {
            GatewayPolicy::AlwaysApprove => false,
            GatewayPolicy::AlwaysDecline => true,
            GatewayPolicy::DeclineRate { rate } => {
                rand::thread_rng().gen_bool(rate.clamp(0.0, 1.0))
            }
        };
        if declined {
            GatewayVerdict::Declined {
                reason: format!("charge of {} declined by issuer", request.amount),
            }
        } else {
            GatewayVerdict::Authorized
        }
    }
}
