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

//! Author payout requests.
//!
//! State machine:
//!
//  Pending ──begin_processing──► Processing ──complete──► Completed
//     │                              │
//     └───────complete/fail──────────┴──fail──► Failed
//!
//! `Completed` and `Failed` are terminal. Settlement callbacks arrive
//! at-least-once from an external process, so `complete_payout` and
//! `fail_payout` reject replays on a terminal record with
//! [`LedgerError::AlreadyProcessed`] and mutate nothing.

use crate::base::{AuthorId, PayoutId};
use crate::commission::AuthorAccounts;
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Lifecycle state of a payout request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// One withdrawal of previously earned author balance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayoutRecord {
    pub id: PayoutId,
    pub author_id: AuthorId,
    pub amount_cents: i64,
    pub status: PayoutStatus,
    /// External settlement reference, set on completion.
    pub external_ref: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Reserves and releases author balance against withdrawal requests.
///
/// Payout records live inside the author account's mutex, so the
/// check-then-reserve in [`request_payout`](Self::request_payout) runs in
/// the same critical section that credits earnings, closing the race
/// window between two concurrent requests against one balance.
pub struct PayoutWorkflow {
    accounts: Arc<AuthorAccounts>,
    /// Routes a payout id back to the author account holding its record.
    index: DashMap<PayoutId, AuthorId>,
    next_payout_id: AtomicU64,
    min_payout_cents: i64,
}

impl PayoutWorkflow {
    pub fn new(accounts: Arc<AuthorAccounts>, min_payout_cents: i64) -> Self {
        Self {
            accounts,
            index: DashMap::new(),
            next_payout_id: AtomicU64::new(1),
            min_payout_cents,
        }
    }

    /// Reserves `amount_cents` of the author's available balance and opens
    /// a pending payout request.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] - Below the configured minimum.
    /// - [`LedgerError::AuthorNotFound`] - The author has no earnings yet.
    /// - [`LedgerError::InsufficientBalanceForPayout`] - The request
    ///   exceeds the currently derived available balance.
    pub fn request_payout(
        &self,
        author: AuthorId,
        amount_cents: i64,
    ) -> Result<PayoutId, LedgerError> {
        if amount_cents < self.min_payout_cents {
            return Err(LedgerError::InvalidAmount);
        }
        let account = self.accounts.get(author)?;
        let mut data = account.inner.lock();

        let available = data.available_cents();
        if amount_cents > available {
            return Err(LedgerError::InsufficientBalanceForPayout {
                requested_cents: amount_cents,
                available_cents: available,
            });
        }

        let id = PayoutId(self.next_payout_id.fetch_add(1, Ordering::Relaxed));
        let now = Utc::now();
        data.pending_payout_cents += amount_cents;
        data.payouts.insert(
            id,
            PayoutRecord {
                id,
                author_id: author,
                amount_cents,
                status: PayoutStatus::Pending,
                external_ref: None,
                failure_reason: None,
                created_at: now,
                updated_at: now,
            },
        );
        data.assert_invariants();
        drop(data);

        self.index.insert(id, author);
        info!(%author, payout = %id, amount_cents, "payout requested, funds reserved");
        Ok(id)
    }

    /// Marks a payout as picked up by the external settlement process.
    ///
    /// Calling this twice is harmless; only a terminal record rejects.
    pub fn begin_processing(&self, payout: PayoutId) -> Result<(), LedgerError> {
        let account = self.account_for(payout)?;
        let mut data = account.inner.lock();
        let record = data
            .payouts
            .get_mut(&payout)
            .ok_or(LedgerError::PayoutNotFound(payout))?;
        match record.status {
            PayoutStatus::Pending => {
                record.status = PayoutStatus::Processing;
                record.updated_at = Utc::now();
                Ok(())
            }
            PayoutStatus::Processing => Ok(()),
            PayoutStatus::Completed | PayoutStatus::Failed => {
                Err(LedgerError::AlreadyProcessed(payout))
            }
        }
    }

    /// Settles a payout: moves the reserved amount from pending to paid out.
    ///
    /// Idempotent per payout id: replays of the settlement callback fail
    /// with [`LedgerError::AlreadyProcessed`] without moving funds twice.
    pub fn complete_payout(&self, payout: PayoutId, external_ref: &str) -> Result<(), LedgerError> {
        let account = self.account_for(payout)?;
        let mut data = account.inner.lock();
        let record = data
            .payouts
            .get_mut(&payout)
            .ok_or(LedgerError::PayoutNotFound(payout))?;
        match record.status {
            PayoutStatus::Pending | PayoutStatus::Processing => {}
            PayoutStatus::Completed | PayoutStatus::Failed => {
                return Err(LedgerError::AlreadyProcessed(payout));
            }
        }

        record.status = PayoutStatus::Completed;
        record.external_ref = Some(external_ref.to_string());
        record.updated_at = Utc::now();
        let amount = record.amount_cents;
        let author = record.author_id;

        data.pending_payout_cents -= amount;
        data.total_paid_out_cents += amount;
        data.assert_invariants();

        info!(%author, payout = %payout, amount_cents = amount, external_ref, "payout completed");
        Ok(())
    }

    /// Fails a payout and releases the reservation back to the available
    /// balance, so funds are never permanently locked.
    pub fn fail_payout(&self, payout: PayoutId, reason: &str) -> Result<(), LedgerError> {
        let account = self.account_for(payout)?;
        let mut data = account.inner.lock();
        let record = data
            .payouts
            .get_mut(&payout)
            .ok_or(LedgerError::PayoutNotFound(payout))?;
        match record.status {
            PayoutStatus::Pending | PayoutStatus::Processing => {}
            PayoutStatus::Completed | PayoutStatus::Failed => {
                return Err(LedgerError::AlreadyProcessed(payout));
            }
        }

        record.status = PayoutStatus::Failed;
        record.failure_reason = Some(reason.to_string());
        record.updated_at = Utc::now();
        let amount = record.amount_cents;
        let author = record.author_id;

        data.pending_payout_cents -= amount;
        data.assert_invariants();

        info!(%author, payout = %payout, amount_cents = amount, reason, "payout failed, reservation released");
        Ok(())
    }

    /// Snapshot of one payout request.
    pub fn payout(&self, payout: PayoutId) -> Result<PayoutRecord, LedgerError> {
        let account = self.account_for(payout)?;
        let data = account.inner.lock();
        data.payouts
            .get(&payout)
            .cloned()
            .ok_or(LedgerError::PayoutNotFound(payout))
    }

    /// All payout requests for an author, oldest first.
    pub fn payouts_for_author(
        &self,
        author: AuthorId,
    ) -> Result<Vec<PayoutRecord>, LedgerError> {
        let account = self.accounts.get(author)?;
        let data = account.inner.lock();
        let mut payouts: Vec<PayoutRecord> = data.payouts.values().cloned().collect();
        payouts.sort_by_key(|record| record.id);
        Ok(payouts)
    }

    fn account_for(
        &self,
        payout: PayoutId,
    ) -> Result<Arc<crate::commission::AuthorAccount>, LedgerError> {
        let author = self
            .index
            .get(&payout)
            .map(|entry| *entry.value())
            .ok_or(LedgerError::PayoutNotFound(payout))?;
        self.accounts.get(author)
    }
}
