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

//! Marketplace revenue split and author earning accounts.
//!
//! The split is deterministic and reproducible from the sale amount alone:
//! the platform takes the integer floor of 20%, the author receives the
//! exact remainder, and the two always sum back to the sale amount.
//!
//! Author accounts hold the earning totals *and* the payout records behind
//! one mutex, so the payout workflow's check-then-reserve runs in the same
//! critical section that sale credits do.

use crate::base::{AuthorId, EarningId, PayoutId, TemplateId, TenantId, UserId};
use crate::error::LedgerError;
use crate::payout::PayoutRecord;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Platform cut of every marketplace sale, in percent.
pub const COMMISSION_RATE_PERCENT: i64 = 20;

/// Splits a sale into `(commission_cents, author_earning_cents)`.
///
/// The commission is the integer floor of 20%; the author gets the exact
/// remainder, so the parts always sum to `sale_amount_cents`.
pub fn commission_split(sale_amount_cents: i64) -> (i64, i64) {
    let commission = sale_amount_cents * COMMISSION_RATE_PERCENT / 100;
    (commission, sale_amount_cents - commission)
}

/// Settlement state of an earning row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EarningStatus {
    Pending,
    Settled,
}

/// Immutable record of one marketplace sale.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorEarning {
    pub id: EarningId,
    pub author_id: AuthorId,
    pub template_id: TemplateId,
    pub purchaser_id: UserId,
    pub purchaser_tenant: TenantId,
    pub sale_amount_cents: i64,
    pub commission_cents: i64,
    pub author_earning_cents: i64,
    pub status: EarningStatus,
    pub external_ref: String,
    pub created_at: DateTime<Utc>,
}

/// Snapshot of an author's balance.
///
/// `available_balance_cents` is derived at snapshot time and never stored:
/// `total_earned − total_paid_out − pending_payout`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorBalance {
    pub author_id: AuthorId,
    pub total_earned_cents: i64,
    pub total_paid_out_cents: i64,
    pub pending_payout_cents: i64,
    pub available_balance_cents: i64,
}

#[derive(Debug)]
pub(crate) struct AuthorAccountData {
    pub(crate) author_id: AuthorId,
    pub(crate) total_earned_cents: i64,
    pub(crate) total_paid_out_cents: i64,
    pub(crate) pending_payout_cents: i64,
    /// Earning rows, oldest first.
    pub(crate) earnings: Vec<Arc<AuthorEarning>>,
    /// Payout requests indexed by id, transitioned under this lock.
    pub(crate) payouts: HashMap<PayoutId, PayoutRecord>,
}

impl AuthorAccountData {
    fn new(author_id: AuthorId) -> Self {
        Self {
            author_id,
            total_earned_cents: 0,
            total_paid_out_cents: 0,
            pending_payout_cents: 0,
            earnings: Vec::new(),
            payouts: HashMap::new(),
        }
    }

    pub(crate) fn available_cents(&self) -> i64 {
        self.total_earned_cents - self.total_paid_out_cents - self.pending_payout_cents
    }

    pub(crate) fn snapshot(&self) -> AuthorBalance {
        AuthorBalance {
            author_id: self.author_id,
            total_earned_cents: self.total_earned_cents,
            total_paid_out_cents: self.total_paid_out_cents,
            pending_payout_cents: self.pending_payout_cents,
            available_balance_cents: self.available_cents(),
        }
    }

    pub(crate) fn assert_invariants(&self) {
        debug_assert!(
            self.available_cents() >= 0,
            "Invariant violated: available balance went negative: {}",
            self.available_cents()
        );
        debug_assert!(
            self.pending_payout_cents >= 0,
            "Invariant violated: pending payout went negative: {}",
            self.pending_payout_cents
        );
    }
}

/// Author earnings account.
#[derive(Debug)]
pub struct AuthorAccount {
    pub(crate) inner: Mutex<AuthorAccountData>,
}

impl AuthorAccount {
    fn new(author_id: AuthorId) -> Self {
        Self {
            inner: Mutex::new(AuthorAccountData::new(author_id)),
        }
    }

    pub fn balance(&self) -> AuthorBalance {
        self.inner.lock().snapshot()
    }
}

/// Registry of author accounts, shared by the commission engine and the
/// payout workflow.
#[derive(Debug, Default)]
pub struct AuthorAccounts {
    accounts: DashMap<AuthorId, Arc<AuthorAccount>>,
}

impl AuthorAccounts {
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
        }
    }

    pub(crate) fn get_or_create(&self, author: AuthorId) -> Arc<AuthorAccount> {
        self.accounts
            .entry(author)
            .or_insert_with(|| Arc::new(AuthorAccount::new(author)))
            .clone()
    }

    pub(crate) fn get(&self, author: AuthorId) -> Result<Arc<AuthorAccount>, LedgerError> {
        self.accounts
            .get(&author)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(LedgerError::AuthorNotFound(author))
    }
}

/// Records marketplace sales and maintains author earning totals.
pub struct CommissionEngine {
    accounts: Arc<AuthorAccounts>,
    min_sale_cents: i64,
    next_earning_id: AtomicU64,
}

impl CommissionEngine {
    pub fn new(accounts: Arc<AuthorAccounts>, min_sale_cents: i64) -> Self {
        Self {
            accounts,
            min_sale_cents,
            next_earning_id: AtomicU64::new(1),
        }
    }

    /// Records one template sale and credits the author's earning total.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidAmount`] - The sale is below the configured
    /// minimum price.
    pub fn record_sale(
        &self,
        author: AuthorId,
        template: TemplateId,
        purchaser: UserId,
        purchaser_tenant: TenantId,
        sale_amount_cents: i64,
        external_ref: &str,
    ) -> Result<EarningId, LedgerError> {
        if sale_amount_cents < self.min_sale_cents {
            return Err(LedgerError::InvalidAmount);
        }

        let (commission_cents, author_earning_cents) = commission_split(sale_amount_cents);
        let id = EarningId(self.next_earning_id.fetch_add(1, Ordering::Relaxed));
        let earning = Arc::new(AuthorEarning {
            id,
            author_id: author,
            template_id: template,
            purchaser_id: purchaser,
            purchaser_tenant,
            sale_amount_cents,
            commission_cents,
            author_earning_cents,
            status: EarningStatus::Settled,
            external_ref: external_ref.to_string(),
            created_at: Utc::now(),
        });

        let account = self.accounts.get_or_create(author);
        let mut data = account.inner.lock();
        data.total_earned_cents += author_earning_cents;
        data.earnings.push(earning);
        data.assert_invariants();

        info!(
            %author,
            %template,
            sale_cents = sale_amount_cents,
            commission_cents,
            author_earning_cents,
            "recorded sale"
        );
        Ok(id)
    }

    /// Author balance with the derived available amount.
    pub fn author_balance(&self, author: AuthorId) -> Result<AuthorBalance, LedgerError> {
        Ok(self.accounts.get(author)?.balance())
    }

    /// Newest-first earning history for the author UI.
    pub fn earnings_for_author(
        &self,
        author: AuthorId,
    ) -> Result<Vec<Arc<AuthorEarning>>, LedgerError> {
        let account = self.accounts.get(author)?;
        let data = account.inner.lock();
        Ok(data.earnings.iter().rev().cloned().collect())
    }
}
