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

//! Ledger transaction records.
//!
//! A [`Transaction`] is an immutable row: once appended it is never updated
//! or deleted. `balance_after` is a point-in-time audit snapshot of the
//! wallet balance the instant the row was written.

use crate::base::{PayoutId, SubscriptionId, TaskId, TemplateId, TenantId, TransactionId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Category of a balance-affecting event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Subscription,
    Purchase,
    Bonus,
    Consumption,
    Refund,
    Adjustment,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Subscription => "subscription",
            Self::Purchase => "purchase",
            Self::Bonus => "bonus",
            Self::Consumption => "consumption",
            Self::Refund => "refund",
            Self::Adjustment => "adjustment",
        };
        f.write_str(name)
    }
}

/// Typed link from a transaction to the record that caused it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionRef {
    Task(TaskId),
    Template(TemplateId),
    Subscription(SubscriptionId),
    Payout(PayoutId),
}

/// Value in a transaction's open metadata map.
///
/// Content varies by transaction kind, so the map is intentionally untyped
/// beyond these primitives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Immutable ledger row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub tenant_id: TenantId,
    pub kind: TransactionKind,
    /// Signed credit delta; negative for consumption.
    pub amount: Decimal,
    /// Wallet balance immediately after this transaction was applied.
    pub balance_after: Decimal,
    pub reference: Option<TransactionRef>,
    pub description: String,
    pub metadata: HashMap<String, MetadataValue>,
    pub created_at: DateTime<Utc>,
}

/// A requested balance mutation, handed to `WalletStore::apply_delta`.
#[derive(Debug, Clone)]
pub struct Delta {
    pub amount: Decimal,
    pub kind: TransactionKind,
    pub reference: Option<TransactionRef>,
    pub description: String,
    pub metadata: HashMap<String, MetadataValue>,
}

impl Delta {
    pub fn new(amount: Decimal, kind: TransactionKind, description: impl Into<String>) -> Self {
        Self {
            amount,
            kind,
            reference: None,
            description: description.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_reference(mut self, reference: TransactionRef) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: MetadataValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}
