// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Credit Engine Contributors
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

//! Error types for the credit ledger.

use crate::base::{AuthorId, PayoutId, SubscriptionId, TenantId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Credit ledger errors.
///
/// Validation failures are all-or-nothing: an operation that returns an
/// error has mutated no balance, counter, or ledger row.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    /// No wallet exists for the tenant
    #[error("no wallet for tenant {0}")]
    WalletNotFound(TenantId),

    /// No earnings balance exists for the author
    #[error("no balance for author {0}")]
    AuthorNotFound(AuthorId),

    /// Referenced payout request does not exist
    #[error("payout {0} not found")]
    PayoutNotFound(PayoutId),

    /// Referenced subscription does not exist
    #[error("subscription {0} not found")]
    SubscriptionNotFound(SubscriptionId),

    /// Subscription tier name is not in the configured tier table
    #[error("unknown subscription tier '{0}'")]
    UnknownTier(String),

    /// Debit would drive the wallet balance negative
    #[error("insufficient credits: requested {requested}, available {available}")]
    InsufficientCredits {
        requested: Decimal,
        available: Decimal,
    },

    /// Payout exceeds the author's available balance
    #[error(
        "insufficient balance for payout: requested {requested_cents} cents, \
         available {available_cents} cents"
    )]
    InsufficientBalanceForPayout {
        requested_cents: i64,
        available_cents: i64,
    },

    /// Spend limit exceeded with budget pause enabled
    #[error("budget exceeded: {reason}")]
    BudgetExceeded { reason: String },

    /// Amount is zero, negative where a positive is required, or below a
    /// configured minimum
    #[error("invalid amount")]
    InvalidAmount,

    /// Payout already reached a terminal state
    #[error("payout {0} already processed")]
    AlreadyProcessed(PayoutId),

    /// Configuration could not be loaded or parsed
    #[error("config error: {0}")]
    Config(String),
}
