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

//! # Credit Engine
//!
//! This library provides the credit ledger and budget-enforcement engine
//! for a multi-tenant AI-agent platform: tenant wallets with an immutable
//! transaction trail, hour/day spend limits, marketplace revenue splits,
//! and author payouts.
//!
//! ## Core Components
//!
//! - [`CreditEngine`]: In-process facade over all of the below
//! - [`WalletStore`]: Per-tenant balances mutated through one atomic delta path
//! - [`TransactionJournal`]: Global append-only audit log
//! - [`BudgetGuard`]: Advisory hour/day spend-rate limiter
//! - [`CommissionEngine`]: Deterministic platform/author revenue split
//! - [`PayoutWorkflow`]: Reservation-based author withdrawals
//!
//! ## Example
//!
//! ```
//! use credit_engine_rs::{CreditEngine, TaskId, TenantId};
//! use rust_decimal_macros::dec;
//!
//! let engine = CreditEngine::default();
//!
//! // Wallets are created lazily with a signup bonus.
//! let wallet = engine.get_or_create_wallet(TenantId(1));
//! assert_eq!(wallet.balance, dec!(1000));
//!
//! // Debit a task execution; the returned row snapshots the new balance.
//! let tx = engine
//!     .consume(TenantId(1), dec!(300), TaskId(42), "draft quarterly report")
//!     .unwrap();
//! assert_eq!(tx.balance_after, dec!(700));
//! ```
//!
//! ## Thread Safety
//!
//! Mutations to one wallet (or one author balance) serialize through a
//! per-key mutex; operations on different keys run fully in parallel.

pub mod base;
mod budget;
mod commission;
pub mod config;
mod engine;
pub mod error;
mod journal;
mod payout;
mod subscription;
mod transaction;
mod wallet;

pub use base::{
    AuthorId, EarningId, PayoutId, SubscriptionId, TaskId, TemplateId, TenantId, TransactionId,
    UserId,
};
pub use budget::{BudgetDecision, BudgetGuard, HourlyUsage, UsageSummary};
pub use commission::{
    AuthorAccounts, AuthorBalance, AuthorEarning, CommissionEngine, EarningStatus,
    COMMISSION_RATE_PERCENT, commission_split,
};
pub use config::EngineConfig;
pub use engine::CreditEngine;
pub use error::LedgerError;
pub use journal::TransactionJournal;
pub use payout::{PayoutRecord, PayoutStatus, PayoutWorkflow};
pub use subscription::{Subscription, SubscriptionBook, SubscriptionTier};
pub use transaction::{Delta, MetadataValue, Transaction, TransactionKind, TransactionRef};
pub use wallet::{SpendLimits, WalletSnapshot, WalletStore};
